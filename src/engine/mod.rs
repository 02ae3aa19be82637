mod hub;
#[cfg(feature = "tch-backend")]
mod sampling;
mod template;

#[cfg(feature = "tch-backend")]
pub mod torch;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Candidate, ChatMessage, GenerationOptions, ModelMetadata};

pub use hub::{ModelFiles, fetch_model_files, run_with_deadline};
#[cfg(feature = "tch-backend")]
pub use sampling::LogitsSampler;
pub use template::ChatTemplate;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("model download failed: {0}")]
    Download(String),
    #[error("model download did not finish within {0:?}")]
    DownloadTimeout(std::time::Duration),
    #[error("model artifact invalid: {0}")]
    Artifact(String),
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
    #[error("chat template error: {0}")]
    Template(String),
    #[error("invalid generation options: {0}")]
    InvalidOptions(String),
    #[error("model execution failed: {0}")]
    Execution(String),
    #[error("engine returned no candidates")]
    NoCandidates,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Held while a generation call runs.
pub trait InferenceGuard {}

pub trait TextGenerationEngine: Send + Sync {
    fn eos_token_id(&self) -> Option<u32>;

    fn inference_mode(&self) -> Box<dyn InferenceGuard + '_>;

    /// Candidates come back best first.
    fn generate(
        &self,
        conversation: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<Vec<Candidate>, EngineError>;

    fn metadata(&self) -> ModelMetadata;
}

pub type EngineHandle = Arc<dyn TextGenerationEngine>;

#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(&self) -> Result<EngineHandle, EngineError>;
}
