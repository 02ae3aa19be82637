use parking_lot::RwLock;
use serde::Serialize;
use tokio::task;
use tracing::{error, info, warn};

use crate::{
    engine::{EngineError, EngineHandle, EngineLoader},
    error::ServiceError,
    model::{GenerationRequest, GenerationResponse, ModelMetadata, invoker},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Uninitialized,
    Ready,
    Finalized,
}

enum Slot {
    Uninitialized,
    Ready(EngineHandle),
    Finalized,
}

/// Uninitialized -> Ready -> Finalized, never backwards.
pub struct InferenceHandler {
    slot: RwLock<Slot>,
}

impl Default for InferenceHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceHandler {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(Slot::Uninitialized),
        }
    }

    /// Loads the engine. A failed load leaves the handler uninitialized.
    pub async fn initialize(&self, loader: &dyn EngineLoader) -> Result<(), ServiceError> {
        match self.state() {
            LifecycleState::Uninitialized => {}
            LifecycleState::Ready => return Err(ServiceError::AlreadyInitialized),
            LifecycleState::Finalized => return Err(ServiceError::Finalized),
        }

        let engine = loader.load().await.map_err(|err| {
            error!(error = %err, "engine initialization failed");
            ServiceError::Initialization(err)
        })?;

        let mut slot = self.slot.write();
        match *slot {
            Slot::Uninitialized => {
                info!(model_id = %engine.metadata().model_id, "inference handler ready");
                *slot = Slot::Ready(engine);
                Ok(())
            }
            // Lost a race with a concurrent initialize or finalize.
            Slot::Ready(_) => Err(ServiceError::AlreadyInitialized),
            Slot::Finalized => Err(ServiceError::Finalized),
        }
    }

    pub async fn infer(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, ServiceError> {
        let engine = self.engine()?;
        task::spawn_blocking(move || invoker::invoke(engine.as_ref(), &request))
            .await
            .map_err(|err| {
                ServiceError::Generation(EngineError::Execution(format!(
                    "inference task failed: {err}"
                )))
            })?
    }

    pub fn infer_blocking(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ServiceError> {
        let engine = self.engine()?;
        invoker::invoke(engine.as_ref(), request)
    }

    /// Releases the engine handle. Harmless before initialize and on repeat.
    pub fn finalize(&self) {
        let mut slot = self.slot.write();
        match *slot {
            Slot::Ready(_) => {
                *slot = Slot::Finalized;
                info!("inference handler finalized");
            }
            Slot::Uninitialized => warn!("finalize called before initialize, ignoring"),
            Slot::Finalized => {}
        }
    }

    pub fn state(&self) -> LifecycleState {
        match *self.slot.read() {
            Slot::Uninitialized => LifecycleState::Uninitialized,
            Slot::Ready(_) => LifecycleState::Ready,
            Slot::Finalized => LifecycleState::Finalized,
        }
    }

    pub fn metadata(&self) -> Option<ModelMetadata> {
        match &*self.slot.read() {
            Slot::Ready(engine) => Some(engine.metadata()),
            _ => None,
        }
    }

    fn engine(&self) -> Result<EngineHandle, ServiceError> {
        match &*self.slot.read() {
            Slot::Ready(engine) => Ok(engine.clone()),
            Slot::Uninitialized => Err(ServiceError::NotInitialized),
            Slot::Finalized => Err(ServiceError::Finalized),
        }
    }
}
