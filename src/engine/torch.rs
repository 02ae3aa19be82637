use std::{fs, path::Path, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tch::{Device, IValue, Kind, NoGradGuard, Tensor};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use super::{
    ChatTemplate, EngineError, EngineHandle, EngineLoader, InferenceGuard, LogitsSampler,
    ModelFiles, TextGenerationEngine, fetch_model_files,
};
use crate::{
    config::{AppConfig, DevicePreference, Precision},
    model::{Candidate, ChatMessage, GenerationOptions, ModelMetadata},
};

impl InferenceGuard for NoGradGuard {}

/// Loads a TorchScript causal LM from the Hugging Face hub.
pub struct TorchEngineLoader {
    config: AppConfig,
}

impl TorchEngineLoader {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EngineLoader for TorchEngineLoader {
    async fn load(&self) -> Result<EngineHandle, EngineError> {
        let files = fetch_model_files(
            &self.config.model_id,
            self.config.revision.as_deref(),
            &self.config.model_artifact,
            self.config.download_timeout,
        )
        .await?;

        let model_id = self.config.model_id.clone();
        let device = resolve_device(self.config.device);
        let kind = resolve_kind(self.config.precision, device);

        let engine = tokio::task::spawn_blocking(move || {
            TorchEngine::from_files(model_id, &files, device, kind)
        })
        .await
        .map_err(|e| EngineError::Artifact(format!("model load task failed: {e}")))??;

        Ok(Arc::new(engine))
    }
}

pub struct TorchEngine {
    model_id: String,
    device: Device,
    kind: Kind,
    tokenizer: Tokenizer,
    template: ChatTemplate,
    eos_token_id: Option<u32>,
    module: Mutex<tch::CModule>,
}

impl TorchEngine {
    pub fn from_files(
        model_id: String,
        files: &ModelFiles,
        device: Device,
        kind: Kind,
    ) -> Result<Self, EngineError> {
        let tokenizer = Tokenizer::from_file(files.tokenizer.as_path())
            .map_err(|e| EngineError::Tokenizer(e.to_string()))?;
        let template = ChatTemplate::from_tokenizer_config(files.tokenizer_config.as_deref())?;

        let eos_token_id = template
            .eos_token()
            .and_then(|token| tokenizer.token_to_id(token))
            .or(config_eos_token_id(files.model_config.as_deref())?);

        let mut module = tch::CModule::load_on_device(&files.module, device)
            .map_err(|e| EngineError::Artifact(e.to_string()))?;
        module.to(device, kind, false);
        module.set_eval();

        info!(model_id, ?device, ?kind, ?eos_token_id, "model loaded");

        Ok(Self {
            model_id,
            device,
            kind,
            tokenizer,
            template,
            eos_token_id,
            module: Mutex::new(module),
        })
    }

    fn forward_last_logits(
        &self,
        module: &tch::CModule,
        input_ids: &[i64],
    ) -> Result<Tensor, EngineError> {
        let input = Tensor::from_slice(input_ids)
            .reshape([1, input_ids.len() as i64])
            .to(self.device);

        // Traced causal LMs return either logits or a (logits, past) tuple.
        let logits = match module
            .forward_is(&[IValue::Tensor(input)])
            .map_err(|e| EngineError::Execution(e.to_string()))?
        {
            IValue::Tensor(t) => t,
            IValue::Tuple(items) => match items.into_iter().next() {
                Some(IValue::Tensor(t)) => t,
                _ => {
                    return Err(EngineError::Execution(
                        "expected logits tensor as first tuple element".into(),
                    ));
                }
            },
            _ => return Err(EngineError::Execution("unexpected model output format".into())),
        };

        // [1, seq_len, vocab] -> [vocab]
        Ok(logits.select(1, -1).squeeze_dim(0).to_kind(Kind::Float))
    }
}

impl TextGenerationEngine for TorchEngine {
    fn eos_token_id(&self) -> Option<u32> {
        self.eos_token_id
    }

    fn inference_mode(&self) -> Box<dyn InferenceGuard + '_> {
        Box::new(tch::no_grad_guard())
    }

    fn generate(
        &self,
        conversation: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<Vec<Candidate>, EngineError> {
        let sampler = LogitsSampler::new(options)?;
        let prompt = self.template.render(conversation)?;

        // The template already carries the model's special tokens.
        let encoding = self
            .tokenizer
            .encode(prompt.as_str(), false)
            .map_err(|e| EngineError::Tokenizer(e.to_string()))?;
        let prompt_ids: Vec<u32> = encoding.get_ids().to_vec();
        if prompt_ids.is_empty() {
            return Err(EngineError::Tokenizer("prompt encoded to zero tokens".into()));
        }

        let mut input_ids: Vec<i64> = prompt_ids.iter().map(|&id| i64::from(id)).collect();
        let eos = self.eos_token_id.map(i64::from);
        let module = self.module.lock();

        for _ in 0..options.max_new_tokens {
            let logits = self.forward_last_logits(&module, &input_ids)?;
            let next = sampler.next_token(&logits, &input_ids)?;
            if Some(next) == eos {
                break;
            }
            input_ids.push(next);
        }
        drop(module);

        let new_ids = input_ids[prompt_ids.len()..]
            .iter()
            .map(|&id| u32::try_from(id))
            .collect::<Result<Vec<u32>, _>>()
            .map_err(|e| EngineError::Execution(format!("sampled token id out of range: {e}")))?;
        debug!(prompt_tokens = prompt_ids.len(), generated = new_ids.len(), "decoding finished");

        let completion = self
            .tokenizer
            .decode(&new_ids, true)
            .map_err(|e| EngineError::Tokenizer(e.to_string()))?;
        let generated_text = if options.return_full_text {
            format!("{prompt}{completion}")
        } else {
            completion
        };

        Ok(vec![Candidate { generated_text }])
    }

    fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            model_id: self.model_id.clone(),
            device: format!("{:?}", self.device),
            dtype: format!("{:?}", self.kind),
            eos_token_id: self.eos_token_id,
        }
    }
}

fn resolve_device(preference: DevicePreference) -> Device {
    match preference {
        DevicePreference::Auto => Device::cuda_if_available(),
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Cuda(idx) if tch::Cuda::is_available() => Device::Cuda(idx),
        DevicePreference::Cuda(_) => Device::Cpu,
    }
}

fn resolve_kind(precision: Precision, device: Device) -> Kind {
    match precision {
        Precision::Float32 => Kind::Float,
        Precision::Float16 => Kind::Half,
        Precision::BFloat16 => Kind::BFloat16,
        Precision::Auto if device == Device::Cpu => Kind::Float,
        Precision::Auto => Kind::Half,
    }
}

/// `eos_token_id` in `config.json` is a number or a list of numbers.
fn config_eos_token_id(path: Option<&Path>) -> Result<Option<u32>, EngineError> {
    let Some(path) = path else {
        return Ok(None);
    };
    let raw = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&raw)
        .map_err(|e| EngineError::Artifact(format!("config.json: {e}")))?;
    let id = match value.get("eos_token_id") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::Array(ids)) => ids.first().and_then(Value::as_u64),
        _ => None,
    };
    Ok(id.and_then(|id| u32::try_from(id).ok()))
}
