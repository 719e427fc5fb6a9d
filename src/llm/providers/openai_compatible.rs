//! OpenAI-compatible chat completion provider (`/v1/chat/completions`).
//!
//! Exposes `complete` and `stream` over the shared [`CompletionRequest`]
//! shape. All OpenAI wire types are private to this module — callers never
//! see them. The provider is stateless: conversation history is whatever
//! the caller puts in the request.

use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::llm::sse::{SseDecoder, SseLine};
use crate::llm::{ChatMessage, CompletionRequest, LlmResponse, LlmUsage, ProviderError, StreamChunk};

// ── Public provider ───────────────────────────────────────────────────────────

/// Adapter for any HTTP endpoint implementing `/v1/chat/completions`.
///
/// Covers OpenAI, Groq, OpenAI-compatible local servers (Ollama, LM Studio…)
/// and other hosted alternatives. Constructed once at startup, then cheaply
/// cloned because `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    api_base_url: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
}

impl OpenAiCompatibleProvider {
    /// Build a provider from config values and an optional API key.
    ///
    /// `api_key` is `None` for keyless local models. When present it is sent
    /// as `Authorization: Bearer <key>` on every request.
    pub fn new(
        api_base_url: String,
        model: String,
        temperature: f32,
        timeout_seconds: u64,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, api_base_url, model, temperature, api_key })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Lightweight reachability check.
    ///
    /// Sends a HEAD request to the configured endpoint. Any HTTP response
    /// (including 4xx) means the server is reachable. Only a transport-level
    /// failure (connection refused, timeout) is treated as unreachable.
    pub async fn ping(&self) -> Result<(), ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build ping client: {e}")))?;
        let mut req = client.head(&self.api_base_url);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req.send()
            .await
            .map(|_| ())
            .map_err(|e| ProviderError::Request(format!("unreachable: {e}")))
    }

    fn payload<'a>(&'a self, request: &'a CompletionRequest, stream: bool) -> ChatCompletionRequest<'a> {
        // Some models (gpt-5 family) do not accept a temperature parameter.
        let temperature = if self.model.starts_with("gpt-5") {
            None
        } else {
            Some(request.temperature.unwrap_or(self.temperature))
        };

        ChatCompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature,
            max_completion_tokens: request.max_tokens,
            stream,
        }
    }

    async fn send(&self, payload: &ChatCompletionRequest<'_>) -> Result<reqwest::Response, ProviderError> {
        debug!(
            model = %payload.model,
            temperature = ?payload.temperature,
            messages = payload.messages.len(),
            stream = payload.stream,
            "sending LLM request"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full LLM request payload");
        }

        let mut req = self.client.post(&self.api_base_url).json(payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            error!(url = %self.api_base_url, error = %e, "LLM HTTP request failed (transport)");
            ProviderError::Request(e.to_string())
        })?;

        check_status(response).await
    }

    /// Send the request and wait for the whole reply. `text` is empty when
    /// the provider returned no content.
    pub async fn complete(&self, request: &CompletionRequest) -> Result<LlmResponse, ProviderError> {
        let payload = self.payload(request, false);
        let response = self.send(&payload).await?;

        let parsed = response.json::<ChatCompletionResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize LLM response");
            ProviderError::Request(format!("failed to parse response body: {e}"))
        })?;

        debug!(choices = parsed.choices.len(), "received LLM response");

        // Missing content comes back as an empty string; callers pick their own fallback.
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        if text.is_empty() {
            warn!("LLM response carried no content");
        }

        let usage = parsed.usage.map(|u| LlmUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });
        if let Some(u) = &usage {
            debug!(input_tokens = u.input_tokens, output_tokens = u.output_tokens, "llm usage");
        }

        Ok(LlmResponse { text, usage })
    }

    /// Send the request with `stream: true` and forward each content delta.
    ///
    /// Deltas are forwarded in arrival order; empty deltas (role headers,
    /// finish frames) are skipped. After `[DONE]` or end of body a single
    /// [`StreamChunk::done`] is sent. Malformed frames are logged and skipped.
    pub async fn stream(
        &self,
        request: &CompletionRequest,
        tx: mpsc::Sender<StreamChunk>,
    ) -> Result<String, ProviderError> {
        let payload = self.payload(request, true);
        let response = self.send(&payload).await?;

        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut full = String::new();

        'outer: while let Some(next) = body.next().await {
            let bytes = next.map_err(|e| {
                error!(error = %e, "LLM stream interrupted");
                ProviderError::Stream(e.to_string())
            })?;

            for line in decoder.push(&bytes) {
                match line {
                    SseLine::Done => break 'outer,
                    SseLine::Data(data) => {
                        let Some(delta) = parse_delta(&data) else { continue };
                        full.push_str(&delta);
                        if tx.send(StreamChunk::content(delta)).await.is_err() {
                            debug!("stream receiver dropped — stopping");
                            return Ok(full);
                        }
                    }
                }
            }
        }

        if let Some(SseLine::Data(data)) = decoder.finish() {
            if let Some(delta) = parse_delta(&data) {
                full.push_str(&delta);
                let _ = tx.send(StreamChunk::content(delta)).await;
            }
        }

        let _ = tx.send(StreamChunk::done()).await;
        debug!(chars = full.len(), "LLM stream complete");
        Ok(full)
    }
}

/// Extract `choices[0].delta.content` from one stream frame.
/// Returns `None` for empty deltas and for frames that do not parse.
fn parse_delta(data: &str) -> Option<String> {
    match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|s| !s.is_empty()),
        Err(e) => {
            warn!(error = %e, "skipping malformed stream frame");
            None
        }
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageData>,
}

#[derive(Debug, Deserialize)]
struct UsageData {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

// Error envelope used by OpenAI and compatible APIs.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Consume the response and return it if successful, or a structured error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let message = if let Ok(env) = serde_json::from_str::<ErrorEnvelope>(&body) {
        let code = env
            .error
            .code
            .map(|v| match v {
                serde_json::Value::String(s) => format!(" [code={s}]"),
                other => format!(" [code={other}]"),
            })
            .unwrap_or_default();
        format!("HTTP {status}{code}: {}", env.error.message)
    } else {
        format!("HTTP {status}: {body}")
    };

    error!(%status, %message, "LLM request returned HTTP error");
    Err(ProviderError::Request(message))
}
