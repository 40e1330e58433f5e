//! Chat-completion client (Groq, OpenAI-compatible API).
//!
//! Failures never escape: both modes log and hand back `None`, so callers
//! simply skip whatever depended on the response.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A parsed structured response. `kind` is the `tool`/`type` discriminant.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub kind: String,
    pub payload: serde_json::Value,
}

/// Default system instructions when the caller supplies none.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful Telegram assistant. Keep answers concise and friendly.";

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Free-text mode: prior turns, then the new user text.
    async fn chat(&self, history: &[Message], text: &str, system: Option<&str>) -> Option<String>;

    /// Structured mode: the response must be a JSON object carrying a
    /// string `tool` or `type` field.
    async fn decide(&self, messages: &[Message]) -> Option<Decision>;
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Empty response")]
    Empty,
    #[error("Missing discriminant: expected a string 'tool' or 'type' field")]
    MissingDiscriminant,
}

/// Build the wire message list for free-text mode.
pub fn chat_messages(history: &[Message], text: &str, system: Option<&str>) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(system.unwrap_or(DEFAULT_SYSTEM_PROMPT)));
    messages.extend(history.iter().filter(|m| m.role != Role::System).cloned());
    messages.push(Message::user(text));
    messages
}

/// Parse a structured response body into a [`Decision`].
pub fn parse_decision(text: &str) -> Result<Decision, LlmError> {
    let value: serde_json::Value = serde_json::from_str(text.trim()).map_err(|e| LlmError::Parse(e.to_string()))?;
    let kind = ["tool", "type"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .filter(|k| !k.trim().is_empty())
        .ok_or(LlmError::MissingDiscriminant)?
        .to_string();
    Ok(Decision { kind, payload: value })
}

pub struct GroqClient {
    api_key: String,
    base_url: String,
    chat_model: String,
    json_model: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl GroqClient {
    pub fn new(api_key: String, base_url: String, chat_model: String, json_model: String) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            chat_model,
            json_model,
            http: reqwest::Client::new(),
        }
    }

    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
        temperature: f32,
        json: bool,
    ) -> Result<String, LlmError> {
        let request = ApiRequest {
            model,
            messages: messages
                .iter()
                .map(|m| ApiMessage { role: m.role.as_str(), content: &m.content })
                .collect(),
            temperature,
            max_tokens: 1024,
            response_format: json.then_some(ResponseFormat { kind: "json_object" }),
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{status}: {body}")));
        }

        let api_response: ApiResponse = response.json().await.map_err(|e| LlmError::Parse(e.to_string()))?;

        api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(LlmError::Empty)
    }
}

#[async_trait]
impl LlmClient for GroqClient {
    async fn chat(&self, history: &[Message], text: &str, system: Option<&str>) -> Option<String> {
        let messages = chat_messages(history, text, system);
        match self.complete(&self.chat_model, &messages, 0.7, false).await {
            Ok(reply) => {
                debug!("LLM reply: {} chars", reply.len());
                Some(reply)
            }
            Err(e) => {
                error!("LLM chat failed: {e}");
                None
            }
        }
    }

    async fn decide(&self, messages: &[Message]) -> Option<Decision> {
        let result = match self.complete(&self.json_model, messages, 0.2, true).await {
            Ok(body) => parse_decision(&body),
            Err(e) => Err(e),
        };
        match result {
            Ok(decision) => Some(decision),
            Err(e) => {
                error!("LLM decision failed: {e}");
                None
            }
        }
    }
}
