//! OpenRouter completion client
//!
//! One-shot and streaming calls against the chat-completion endpoint,
//! authenticated with a bearer credential fixed at construction. Clients
//! are handed out through [`ClientCache`], keyed by the credential string,
//! so a changed key always yields a fresh client instead of a stale one.

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::StatusCode;

use crate::api::error::ChatError;
use crate::api::{
    ChatMessage, ChatRequest, ChatResponse, GenerationParams, DEFAULT_MAX_TOKENS,
    DEFAULT_TEMPERATURE, DEFAULT_TOP_P,
};
use crate::core::chat_stream::CompletionStream;
use crate::utils::url::construct_api_url;

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// The two identifying headers OpenRouter asks callers to send.
const APP_REFERER: &str = "https://github.com/vietrp/vietrp";
const APP_TITLE: &str = "VietRP Chat";

/// A client bound to one credential.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CompletionClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, OPENROUTER_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn post_completion(&self, request: &ChatRequest) -> reqwest::RequestBuilder {
        self.http
            .post(construct_api_url(&self.base_url, "chat/completions"))
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", APP_REFERER)
            .header("X-Title", APP_TITLE)
            .json(request)
    }

    /// One-shot completion. The first choice's message content is the
    /// usable result.
    pub async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        params: GenerationParams,
    ) -> Result<ChatResponse, ChatError> {
        let request = build_request(model, messages, params, false);
        let response = self
            .post_completion(&request)
            .send()
            .await
            .map_err(|err| ChatError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|err| ChatError::Transport(err.to_string()))
    }

    /// Streaming completion: returns a lazy fragment sequence over the
    /// chunked response body. The consumer accumulates the fragments; the
    /// client holds no conversation state.
    pub async fn chat_stream(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        params: GenerationParams,
    ) -> Result<CompletionStream, ChatError> {
        let request = build_request(model, messages, params, true);
        let response = self
            .post_completion(&request)
            .send()
            .await
            .map_err(|err| ChatError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let chunks = response.bytes_stream().map(|item| {
            item.map(|bytes| bytes.to_vec())
                .map_err(|err| ChatError::Transport(err.to_string()))
        });
        Ok(CompletionStream::new(chunks))
    }
}

fn build_request(
    model: &str,
    messages: Vec<ChatMessage>,
    params: GenerationParams,
    stream: bool,
) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages,
        temperature: params.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        max_tokens: params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        top_p: params.top_p.unwrap_or(DEFAULT_TOP_P),
        stream: stream.then_some(true),
    }
}

fn status_error(status: StatusCode, body: &str) -> ChatError {
    let message = extract_error_message(body)
        .unwrap_or_else(|| format!("API Error: {}", status.as_u16()));

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        ChatError::Auth(message)
    } else {
        ChatError::Api(message)
    }
}

/// Pull the human-readable message out of an error body when there is one.
fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .or_else(|| value.get("message"))
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Where the orchestrator gets its fragment streams from. The seam exists
/// so generation flows can be driven by a scripted backend in tests.
#[async_trait]
pub trait CompletionBackend: Send {
    async fn open_stream(
        &mut self,
        api_key: &str,
        model: &str,
        messages: Vec<ChatMessage>,
        params: GenerationParams,
    ) -> Result<CompletionStream, ChatError>;
}

/// Clients keyed by credential. An unchanged key reuses its client; a new
/// key gets a fresh one, so no call can go out with a stale credential.
#[derive(Debug, Default)]
pub struct ClientCache {
    clients: HashMap<String, CompletionClient>,
}

impl ClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client_for(&mut self, api_key: &str) -> &CompletionClient {
        self.clients
            .entry(api_key.to_string())
            .or_insert_with(|| CompletionClient::new(api_key))
    }
}

#[async_trait]
impl CompletionBackend for ClientCache {
    async fn open_stream(
        &mut self,
        api_key: &str,
        model: &str,
        messages: Vec<ChatMessage>,
        params: GenerationParams,
    ) -> Result<CompletionStream, ChatError> {
        self.client_for(api_key)
            .chat_stream(messages, model, params)
            .await
    }
}
