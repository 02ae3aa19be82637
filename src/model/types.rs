use serde::{Deserialize, Serialize};

pub const DEFAULT_PROMPT: &str = "Explain quantum mechanics clearly and concisely.";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful and knowledgeable assistant.";
pub const DEFAULT_MAX_NEW_TOKENS: u32 = 256;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_TOP_P: f64 = 0.9;
pub const DEFAULT_TOP_K: u32 = 50;
pub const DEFAULT_DO_SAMPLE: bool = true;
pub const DEFAULT_REPETITION_PENALTY: f64 = 1.1;

const RESPONSE_PLACEHOLDER: &str = "Generated text will appear here";

/// Integer fields are signed so that negative input reaches the bound check.
#[derive(Debug, Clone, Default)]
pub struct RawGenerationRequest {
    pub prompt: Option<String>,
    pub system_prompt: Option<String>,
    pub max_new_tokens: Option<i64>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<i64>,
    pub do_sample: Option<bool>,
    pub repetition_penalty: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_prompt: String,
    pub max_new_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub do_sample: bool,
    pub repetition_penalty: f64,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            top_k: DEFAULT_TOP_K,
            do_sample: DEFAULT_DO_SAMPLE,
            repetition_penalty: DEFAULT_REPETITION_PENALTY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub generated_text: String,
}

impl Default for GenerationResponse {
    fn default() -> Self {
        Self {
            generated_text: RESPONSE_PLACEHOLDER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationOptions {
    pub max_new_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub do_sample: bool,
    pub repetition_penalty: f64,
    /// When false the engine returns only newly generated text, not the prompt.
    pub return_full_text: bool,
    /// Padding id; set to the tokenizer's end-of-sequence id.
    pub pad_token_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub generated_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelMetadata {
    pub model_id: String,
    pub device: String,
    pub dtype: String,
    pub eos_token_id: Option<u32>,
}
