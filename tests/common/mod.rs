//! Test doubles for the engine boundary.

#![allow(dead_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use chat_generation_service::{
    EngineError, EngineHandle, EngineLoader, InferenceGuard, TextGenerationEngine,
    model::{Candidate, ChatMessage, GenerationOptions, ModelMetadata},
};

pub struct ActiveFlag(Arc<AtomicBool>);

impl InferenceGuard for ActiveFlag {}

impl Drop for ActiveFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Replies with fixed text (or a fixed failure) and records every call.
pub struct ScriptedEngine {
    reply: Result<String, String>,
    pub calls: AtomicUsize,
    pub in_inference: Arc<AtomicBool>,
    pub last_call: Mutex<Option<(Vec<ChatMessage>, GenerationOptions)>>,
}

impl ScriptedEngine {
    pub fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self::with_reply(Ok(text.to_string())))
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self::with_reply(Err(message.to_string())))
    }

    fn with_reply(reply: Result<String, String>) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
            in_inference: Arc::new(AtomicBool::new(false)),
            last_call: Mutex::new(None),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextGenerationEngine for ScriptedEngine {
    fn eos_token_id(&self) -> Option<u32> {
        Some(200_002)
    }

    fn inference_mode(&self) -> Box<dyn InferenceGuard + '_> {
        self.in_inference.store(true, Ordering::SeqCst);
        Box::new(ActiveFlag(self.in_inference.clone()))
    }

    fn generate(
        &self,
        conversation: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<Vec<Candidate>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_call.lock() = Some((conversation.to_vec(), options.clone()));
        match &self.reply {
            Ok(text) => Ok(vec![
                Candidate {
                    generated_text: text.clone(),
                },
                Candidate {
                    generated_text: "second candidate".into(),
                },
            ]),
            Err(message) => Err(EngineError::Execution(message.clone())),
        }
    }

    fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            model_id: "scripted/test-model".into(),
            device: "Cpu".into(),
            dtype: "Float".into(),
            eos_token_id: Some(200_002),
        }
    }
}

/// Hands out a prepared engine.
pub struct StaticLoader(pub Arc<ScriptedEngine>);

#[async_trait]
impl EngineLoader for StaticLoader {
    async fn load(&self) -> Result<EngineHandle, EngineError> {
        Ok(self.0.clone())
    }
}

/// Fails the way an unreachable hub does once the deadline passes.
pub struct UnreachableLoader(pub Duration);

#[async_trait]
impl EngineLoader for UnreachableLoader {
    async fn load(&self) -> Result<EngineHandle, EngineError> {
        let timeout = self.0;
        chat_generation_service::engine::run_with_deadline(timeout, async move {
            tokio::time::sleep(timeout * 10).await;
            Err(EngineError::Download("never reached".into()))
        })
        .await
    }
}
