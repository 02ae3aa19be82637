use tracing::debug;

use crate::{
    engine::{EngineError, TextGenerationEngine},
    error::ServiceError,
    model::{ChatMessage, GenerationOptions, GenerationRequest, GenerationResponse},
};

/// System turn first, then the user's prompt.
pub fn build_conversation(request: &GenerationRequest) -> [ChatMessage; 2] {
    [
        ChatMessage::system(request.system_prompt.clone()),
        ChatMessage::user(request.prompt.clone()),
    ]
}

impl GenerationOptions {
    /// Options for a chat completion: only new text is returned and padding
    /// uses the tokenizer's end-of-sequence id.
    pub fn for_request(request: &GenerationRequest, eos_token_id: Option<u32>) -> Self {
        Self {
            max_new_tokens: request.max_new_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            top_k: request.top_k,
            do_sample: request.do_sample,
            repetition_penalty: request.repetition_penalty,
            return_full_text: false,
            pad_token_id: eos_token_id,
        }
    }
}

/// Returns the first candidate's text untouched.
pub fn invoke(
    engine: &dyn TextGenerationEngine,
    request: &GenerationRequest,
) -> Result<GenerationResponse, ServiceError> {
    let conversation = build_conversation(request);
    let options = GenerationOptions::for_request(request, engine.eos_token_id());
    debug!(
        max_new_tokens = options.max_new_tokens,
        do_sample = options.do_sample,
        "invoking engine"
    );

    let candidates = {
        let _inference = engine.inference_mode();
        engine.generate(&conversation, &options)
    }
    .map_err(ServiceError::Generation)?;

    let first = candidates
        .into_iter()
        .next()
        .ok_or(ServiceError::Generation(EngineError::NoCandidates))?;

    Ok(GenerationResponse {
        generated_text: first.generated_text,
    })
}
