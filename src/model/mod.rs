pub mod invoker;
mod lifecycle;
mod types;
mod validation;

pub use invoker::{build_conversation, invoke};
pub use lifecycle::{InferenceHandler, LifecycleState};
pub use types::{
    Candidate, ChatMessage, GenerationOptions, GenerationRequest, GenerationResponse,
    ModelMetadata, RawGenerationRequest, Role,
};
pub use validation::ValidationError;
