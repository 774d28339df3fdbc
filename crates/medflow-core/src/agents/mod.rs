//! Agents — LLM-backed collaborators the workflows call into.
//!
//! An `AgentInvoker` is the raw capability (send instructions and messages,
//! get text or a structured object back). An `Agent` pairs an invoker with an
//! `AgentProfile` so call sites only supply the prompt.

pub mod caller;
pub mod profile;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::workflow::schema::{validate, Schema, ValidationError};

pub use caller::{AgentAdapter, AgentCallConfig, HttpAgentInvoker};
pub use profile::{AgentProfile, ProfileLoader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One call to an agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRequest {
    pub instructions: String,
    pub messages: Vec<Message>,
    /// When set, the agent must answer with an object of this shape.
    pub output_schema: Option<Schema>,
    /// Overrides the invoker's default model.
    pub model: Option<String>,
}

impl AgentRequest {
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            messages: Vec::new(),
            output_schema: None,
            model: None,
        }
    }

    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::user(content));
        self
    }

    pub fn with_output_schema(mut self, schema: Schema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// Text of the last user message, if any.
    pub fn prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub text: Option<String>,
    pub object: Option<Value>,
    pub model: String,
    pub usage: Option<UsageInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageInfo {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentError {
    #[error("agent not configured: {0}")]
    Configuration(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("structured output does not match schema: {0}")]
    SchemaViolation(#[from] ValidationError),
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        AgentError::Http(err.to_string())
    }
}

#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn generate(&self, request: AgentRequest) -> Result<AgentResponse, AgentError>;
}

/// A profile bound to an invoker.
#[derive(Clone)]
pub struct Agent {
    profile: AgentProfile,
    invoker: Arc<dyn AgentInvoker>,
}

impl Agent {
    pub fn new(profile: AgentProfile, invoker: Arc<dyn AgentInvoker>) -> Self {
        Self { profile, invoker }
    }

    pub fn id(&self) -> &str {
        &self.profile.id
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    fn request(&self, prompt: &str) -> AgentRequest {
        AgentRequest::new(self.profile.instructions.clone())
            .user(prompt)
            .with_model(self.profile.model.clone())
    }

    pub async fn generate_text(&self, prompt: &str) -> Result<String, AgentError> {
        tracing::debug!("[Agent] {} generating text", self.profile.id);
        let response = self.invoker.generate(self.request(prompt)).await?;
        response
            .text
            .ok_or_else(|| AgentError::InvalidResponse(format!("agent '{}' returned no text", self.profile.id)))
    }

    /// Ask for a structured object; the result is checked against `schema`.
    pub async fn generate_object(&self, prompt: &str, schema: &Schema) -> Result<Value, AgentError> {
        tracing::debug!("[Agent] {} generating object", self.profile.id);
        let request = self.request(prompt).with_output_schema(schema.clone());
        let response = self.invoker.generate(request).await?;
        let object = response.object.ok_or_else(|| {
            AgentError::InvalidResponse(format!("agent '{}' returned no object", self.profile.id))
        })?;
        Ok(validate(schema, object)?)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Invoker that answers from a script keyed by instructions prefix.
    #[derive(Default)]
    pub struct ScriptedInvoker {
        replies: Mutex<HashMap<String, Result<AgentResponse, AgentError>>>,
        pub calls: Mutex<Vec<AgentRequest>>,
    }

    impl ScriptedInvoker {
        pub fn text(self, instructions_prefix: &str, text: &str) -> Self {
            self.reply(
                instructions_prefix,
                Ok(AgentResponse {
                    text: Some(text.to_string()),
                    model: "scripted".to_string(),
                    ..Default::default()
                }),
            )
        }

        pub fn object(self, instructions_prefix: &str, object: Value) -> Self {
            self.reply(
                instructions_prefix,
                Ok(AgentResponse {
                    object: Some(object),
                    model: "scripted".to_string(),
                    ..Default::default()
                }),
            )
        }

        pub fn reply(self, instructions_prefix: &str, reply: Result<AgentResponse, AgentError>) -> Self {
            self.replies
                .lock()
                .unwrap()
                .insert(instructions_prefix.to_string(), reply);
            self
        }

        pub fn prompts(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter_map(|r| r.prompt().map(str::to_string))
                .collect()
        }
    }

    #[async_trait]
    impl AgentInvoker for ScriptedInvoker {
        async fn generate(&self, request: AgentRequest) -> Result<AgentResponse, AgentError> {
            self.calls.lock().unwrap().push(request.clone());
            let replies = self.replies.lock().unwrap();
            replies
                .iter()
                .find(|(prefix, _)| request.instructions.trim_start().starts_with(prefix.as_str()))
                .map(|(_, reply)| reply.clone())
                .unwrap_or_else(|| Err(AgentError::Configuration("no scripted reply".to_string())))
        }
    }
}
