pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod server;

pub use config::AppConfig;
pub use engine::{EngineError, EngineHandle, EngineLoader, InferenceGuard, TextGenerationEngine};
pub use error::ServiceError;
pub use model::{GenerationRequest, GenerationResponse, InferenceHandler, LifecycleState};
pub use server::build_router;
