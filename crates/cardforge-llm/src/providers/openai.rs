use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use cardforge_core::config::LlmConfig;
use cardforge_core::error::{CardforgeError, Result};
use cardforge_core::traits::TextGenerator;
use cardforge_core::types::GenerateRequest;

use crate::streaming::{SseEvent, SseStream};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible client. Works with OpenAI, Ollama, vLLM, Groq, OpenRouter, etc.
pub struct OpenAiGenerator {
    http: Client,
    url: String,
    api_key: Option<String>,
}

impl OpenAiGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            http: http_client(config.timeout_secs)?,
            url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_API_URL.to_string()),
            api_key: config.api_key.clone(),
        })
    }
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| CardforgeError::LlmRequest(format!("failed to build HTTP client: {}", e)))
}

// Request types
#[derive(Serialize)]
pub(crate) struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize, Debug, PartialEq)]
pub(crate) struct OaiMessage {
    role: &'static str,
    content: String,
}

impl ChatRequest {
    /// Streaming chat body for one request. `model` is omitted for
    /// deployments that pin it in the URL.
    pub(crate) fn streaming(request: &GenerateRequest, include_model: bool) -> Self {
        Self {
            model: include_model.then(|| request.model.clone()),
            messages: convert_messages(request),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: true,
        }
    }
}

// Response types
#[derive(Deserialize, Debug)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDeltaContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamDeltaContent {
    #[serde(default)]
    content: Option<String>,
}

/// What one SSE chunk contributes to the completion.
#[derive(Debug, PartialEq)]
pub(crate) enum ChunkDelta {
    Text(String),
    Finish(String),
}

pub(crate) fn convert_messages(request: &GenerateRequest) -> Vec<OaiMessage> {
    let mut messages = Vec::with_capacity(2);
    if !request.system_prompt.trim().is_empty() {
        messages.push(OaiMessage {
            role: "system",
            content: request.system_prompt.clone(),
        });
    }
    messages.push(OaiMessage {
        role: "user",
        content: request.user_prompt.clone(),
    });
    messages
}

pub(crate) fn parse_chunk(event: &SseEvent) -> Vec<ChunkDelta> {
    if event.data.trim() == "[DONE]" {
        return vec![];
    }

    match serde_json::from_str::<StreamChunk>(&event.data) {
        Ok(chunk) => {
            let mut deltas = Vec::new();
            // Azure sends a leading chunk with no choices (content filter results).
            let Some(choice) = chunk.choices.into_iter().next() else {
                return deltas;
            };

            if let Some(text) = choice.delta.and_then(|d| d.content) {
                if !text.is_empty() {
                    deltas.push(ChunkDelta::Text(text));
                }
            }
            if let Some(reason) = choice.finish_reason {
                deltas.push(ChunkDelta::Finish(reason));
            }
            deltas
        }
        Err(e) => {
            warn!(data = %event.data, error = %e, "Failed to parse OpenAI SSE chunk");
            vec![]
        }
    }
}

/// Send a streaming chat request and concatenate the text deltas.
pub(crate) async fn send_and_collect(req: RequestBuilder, service: &str) -> Result<String> {
    let response = req.send().await.map_err(|e| request_error(service, e))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown".to_string());
        return Err(CardforgeError::LlmRequest(format!("HTTP {}: {}", status, body)));
    }

    let mut events = SseStream::new(response.bytes_stream());
    let mut text = String::new();
    let mut finish_reason = None;

    while let Some(event) = events.next().await {
        for delta in parse_chunk(&event?) {
            match delta {
                ChunkDelta::Text(t) => text.push_str(&t),
                ChunkDelta::Finish(reason) => finish_reason = Some(reason),
            }
        }
    }

    match finish_reason.as_deref() {
        Some("content_filter") => {
            return Err(CardforgeError::LlmRequest(
                "completion blocked by content filter".into(),
            ))
        }
        Some("length") => warn!("Completion hit max_tokens, output may be truncated"),
        _ => {}
    }

    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(CardforgeError::LlmParse("empty completion".into()));
    }
    debug!(chars = text.chars().count(), "Completion received");
    Ok(text)
}

/// Connection failures and timeouts mean the service is unreachable;
/// everything else is a failed request.
pub(crate) fn request_error(service: &str, e: reqwest::Error) -> CardforgeError {
    if e.is_connect() || e.is_timeout() {
        CardforgeError::ExternalUnavailable {
            service: service.to_string(),
            message: e.to_string(),
        }
    } else {
        CardforgeError::LlmRequest(e.to_string())
    }
}

impl TextGenerator for OpenAiGenerator {
    fn generate(&self, request: GenerateRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            debug!(model = %request.model, url = %self.url, "Sending chat completion");
            let body = ChatRequest::streaming(&request, true);

            let mut req = self.http.post(&self.url).json(&body);
            if let Some(api_key) = &self.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            send_and_collect(req, "llm").await
        })
    }
}
