//! HTTP agent invoker — calls OpenAI- or Anthropic-compatible chat APIs.
//!
//! The workflows never talk to a provider directly; they go through the
//! `AgentInvoker` trait, and this is the production implementation of it.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{AgentError, AgentInvoker, AgentRequest, AgentResponse, Role, UsageInfo};
use crate::workflow::schema::validate;

/// Wire format spoken by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentAdapter {
    OpenAi,
    Anthropic,
}

impl AgentAdapter {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentAdapter::OpenAi => "openai",
            AgentAdapter::Anthropic => "anthropic",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            AgentAdapter::OpenAi => "https://api.openai.com/v1",
            AgentAdapter::Anthropic => "https://api.anthropic.com",
        }
    }

    /// Environment variable the API key is read from.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            AgentAdapter::OpenAi => "OPENAI_API_KEY",
            AgentAdapter::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl FromStr for AgentAdapter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "openai-compatible" | "opencode" => Ok(AgentAdapter::OpenAi),
            "anthropic" | "claude" => Ok(AgentAdapter::Anthropic),
            other => Err(format!("Unknown adapter type: '{}'", other)),
        }
    }
}

/// Configuration for calling an agent API.
#[derive(Debug, Clone)]
pub struct AgentCallConfig {
    pub adapter: AgentAdapter,
    /// API base URL
    pub base_url: String,
    /// API key / auth token
    pub api_key: String,
    /// Model used when the request names none
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for AgentCallConfig {
    fn default() -> Self {
        Self {
            adapter: AgentAdapter::OpenAi,
            base_url: AgentAdapter::OpenAi.default_base_url().to_string(),
            api_key: String::new(),
            model: "gpt-4o".to_string(),
            temperature: None,
            max_tokens: 4096,
            timeout: Duration::from_secs(300),
        }
    }
}

pub struct HttpAgentInvoker {
    client: reqwest::Client,
    config: AgentCallConfig,
}

impl HttpAgentInvoker {
    pub fn new(config: AgentCallConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(config.timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            config,
        }
    }

    pub fn config(&self) -> &AgentCallConfig {
        &self.config
    }

    /// POST {base_url}/chat/completions with Bearer auth.
    async fn call_openai(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = openai_body(&self.config, request);

        tracing::info!(
            "[AgentCaller] Calling OpenAI API: {} (model: {})",
            url,
            body["model"].as_str().unwrap_or_default()
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let json = read_json(response).await?;
        Ok(parse_openai(&json, &self.config.model))
    }

    /// POST {base_url}/v1/messages with `x-api-key`.
    async fn call_anthropic(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));
        let body = anthropic_body(&self.config, request);

        tracing::info!(
            "[AgentCaller] Calling Anthropic API: {} (model: {})",
            url,
            body["model"].as_str().unwrap_or_default()
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let json = read_json(response).await?;
        Ok(parse_anthropic(&json, &self.config.model))
    }
}

#[async_trait]
impl AgentInvoker for HttpAgentInvoker {
    async fn generate(&self, request: AgentRequest) -> Result<AgentResponse, AgentError> {
        if self.config.api_key.trim().is_empty() {
            return Err(AgentError::Configuration(format!(
                "{} is not set for the {} adapter",
                self.config.adapter.api_key_var(),
                self.config.adapter.as_str()
            )));
        }

        let mut response = match self.config.adapter {
            AgentAdapter::OpenAi => self.call_openai(&request).await?,
            AgentAdapter::Anthropic => self.call_anthropic(&request).await?,
        };

        if let Some(schema) = &request.output_schema {
            let text = response.text.take().unwrap_or_default();
            let object = extract_json(&text).ok_or_else(|| {
                AgentError::InvalidResponse(format!("expected a JSON object, got: {}", truncate(&text, 120)))
            })?;
            response.object = Some(validate(schema, object)?);
        }

        Ok(response)
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value, AgentError> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(AgentError::Api {
            status: status.as_u16(),
            body: text,
        });
    }
    serde_json::from_str(&text)
        .map_err(|e| AgentError::InvalidResponse(format!("Failed to parse response JSON: {}", e)))
}

fn model_for<'a>(config: &'a AgentCallConfig, request: &'a AgentRequest) -> &'a str {
    request.model.as_deref().unwrap_or(&config.model)
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn openai_body(config: &AgentCallConfig, request: &AgentRequest) -> Value {
    let mut messages = Vec::new();
    if !request.instructions.trim().is_empty() {
        messages.push(json!({ "role": "system", "content": request.instructions.trim() }));
    }
    for message in &request.messages {
        messages.push(json!({ "role": role_name(message.role), "content": message.content }));
    }

    let mut body = json!({
        "model": model_for(config, request),
        "messages": messages,
    });

    if let Some(temp) = config.temperature {
        body["temperature"] = json!(temp);
    }
    if let Some(schema) = &request.output_schema {
        body["response_format"] = json!({
            "type": "json_schema",
            "json_schema": {
                "name": "output",
                "schema": schema.to_json_schema(),
            }
        });
    }
    body
}

fn anthropic_body(config: &AgentCallConfig, request: &AgentRequest) -> Value {
    let mut system = request.instructions.trim().to_string();
    if let Some(schema) = &request.output_schema {
        system.push_str(&format!(
            "\n\nRespond only with a JSON object matching this JSON Schema:\n{}",
            schema.to_json_schema()
        ));
    }

    let messages: Vec<Value> = request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| json!({ "role": role_name(m.role), "content": m.content }))
        .collect();

    let mut body = json!({
        "model": model_for(config, request),
        "max_tokens": config.max_tokens,
        "messages": messages,
    });
    if !system.is_empty() {
        body["system"] = Value::String(system);
    }
    if let Some(temp) = config.temperature {
        body["temperature"] = json!(temp);
    }
    body
}

fn parse_openai(json: &Value, default_model: &str) -> AgentResponse {
    let text = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string);

    let usage = json.get("usage").map(|u| UsageInfo {
        input_tokens: u
            .get("prompt_tokens")
            .or_else(|| u.get("input_tokens"))
            .and_then(|v| v.as_u64()),
        output_tokens: u
            .get("completion_tokens")
            .or_else(|| u.get("output_tokens"))
            .and_then(|v| v.as_u64()),
    });

    AgentResponse {
        text,
        object: None,
        model: response_model(json, default_model),
        usage,
    }
}

fn parse_anthropic(json: &Value, default_model: &str) -> AgentResponse {
    let text = json
        .get("content")
        .and_then(|c| c.as_array())
        .and_then(|arr| {
            arr.iter()
                .filter(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|block| block.get("text").and_then(|t| t.as_str()).map(str::to_string))
                .reduce(|a, b| format!("{}\n{}", a, b))
        });

    let usage = json.get("usage").map(|u| UsageInfo {
        input_tokens: u.get("input_tokens").and_then(|v| v.as_u64()),
        output_tokens: u.get("output_tokens").and_then(|v| v.as_u64()),
    });

    AgentResponse {
        text,
        object: None,
        model: response_model(json, default_model),
        usage,
    }
}

fn response_model(json: &Value, default_model: &str) -> String {
    json.get("model")
        .and_then(|m| m.as_str())
        .unwrap_or(default_model)
        .to_string()
}

/// Pull a JSON object out of model text, tolerating code fences and chatter
/// around it.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim);
    if let Some(inner) = unfenced {
        if let Ok(value) = serde_json::from_str::<Value>(inner) {
            return Some(value);
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{}...", cut)
    }
}
