use std::{fs, path::Path};

use minijinja::{Environment, ErrorKind, context};
use serde_json::Value;

use super::EngineError;
use crate::model::ChatMessage;

/// Jinja `chat_template` from `tokenizer_config.json`, or a plain role layout.
pub struct ChatTemplate {
    source: Option<String>,
    bos_token: Option<String>,
    eos_token: Option<String>,
    env: Environment<'static>,
}

impl ChatTemplate {
    pub fn from_tokenizer_config(path: Option<&Path>) -> Result<Self, EngineError> {
        let Some(path) = path else {
            return Ok(Self::new(None, None, None));
        };
        let raw = fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&raw)
            .map_err(|e| EngineError::Artifact(format!("tokenizer_config.json: {e}")))?;
        Ok(Self::from_config_value(&value))
    }

    pub fn from_config_value(value: &Value) -> Self {
        Self::new(
            chat_template_source(value.get("chat_template")),
            special_token(value.get("bos_token")),
            special_token(value.get("eos_token")),
        )
    }

    pub fn new(source: Option<String>, bos_token: Option<String>, eos_token: Option<String>) -> Self {
        let mut env = Environment::new();
        env.add_function("raise_exception", |msg: String| -> Result<String, minijinja::Error> {
            Err(minijinja::Error::new(ErrorKind::InvalidOperation, msg))
        });
        Self {
            source,
            bos_token,
            eos_token,
            env,
        }
    }

    pub fn eos_token(&self) -> Option<&str> {
        self.eos_token.as_deref()
    }

    /// Formats `messages` and opens an assistant turn for the model to fill.
    pub fn render(&self, messages: &[ChatMessage]) -> Result<String, EngineError> {
        let Some(source) = self.source.as_deref() else {
            return Ok(plain_layout(messages));
        };
        self.env
            .render_str(
                source,
                context! {
                    messages => messages,
                    add_generation_prompt => true,
                    bos_token => self.bos_token.as_deref().unwrap_or_default(),
                    eos_token => self.eos_token.as_deref().unwrap_or_default(),
                },
            )
            .map_err(|e| EngineError::Template(e.to_string()))
    }
}

fn plain_layout(messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    for message in messages {
        prompt.push_str(message.role.as_str());
        prompt.push_str(": ");
        prompt.push_str(&message.content);
        prompt.push('\n');
    }
    prompt.push_str("assistant: ");
    prompt
}

/// `chat_template` is either a string or a list of named templates.
fn chat_template_source(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Array(named) => {
            let pick = named
                .iter()
                .find(|t| t.get("name").and_then(Value::as_str) == Some("default"))
                .or_else(|| named.first())?;
            pick.get("template").and_then(Value::as_str).map(str::to_string)
        }
        _ => None,
    }
}

/// Special tokens appear either as plain strings or as `{"content": ...}`.
fn special_token(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj.get("content").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}
