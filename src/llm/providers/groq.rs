//! Groq chat completion provider.
//!
//! Groq serves an OpenAI-compatible API, so this wraps the generic provider
//! and reads the `[llm.groq]` config section. Selected with
//! `llm.default = "groq"`.

use tokio::sync::mpsc;

use crate::llm::{CompletionRequest, LlmResponse, ProviderError, StreamChunk};

use super::openai_compatible::OpenAiCompatibleProvider;

#[derive(Debug, Clone)]
pub struct GroqProvider {
    inner: OpenAiCompatibleProvider,
}

impl GroqProvider {
    pub fn new(
        api_base_url: String,
        model: String,
        temperature: f32,
        timeout_seconds: u64,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        if api_key.is_none() {
            return Err(ProviderError::Request(
                "groq requires an API key (set GROQ_API_KEY or LLM_API_KEY)".into(),
            ));
        }
        let inner = OpenAiCompatibleProvider::new(api_base_url, model, temperature, timeout_seconds, api_key)?;
        Ok(Self { inner })
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<LlmResponse, ProviderError> {
        self.inner.complete(request).await
    }

    pub async fn stream(
        &self,
        request: &CompletionRequest,
        tx: mpsc::Sender<StreamChunk>,
    ) -> Result<String, ProviderError> {
        self.inner.stream(request, tx).await
    }

    pub async fn ping(&self) -> Result<(), ProviderError> {
        self.inner.ping().await
    }
}
