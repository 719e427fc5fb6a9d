//! Dummy LLM provider — echoes the last user message back prefixed with `[echo]`.
//! Used for tests and for running the server without an API key.

use tokio::sync::mpsc;

use crate::llm::{CompletionRequest, LlmResponse, ProviderError, StreamChunk};

#[derive(Debug, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    fn reply(request: &CompletionRequest) -> String {
        format!("[echo] {}", request.last_user_content().unwrap_or_default())
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<LlmResponse, ProviderError> {
        Ok(LlmResponse { text: Self::reply(request), usage: None })
    }

    /// Streams the echo one word at a time (whitespace kept with its word).
    pub async fn stream(
        &self,
        request: &CompletionRequest,
        tx: mpsc::Sender<StreamChunk>,
    ) -> Result<String, ProviderError> {
        let text = Self::reply(request);
        for piece in text.split_inclusive(' ') {
            if tx.send(StreamChunk::content(piece)).await.is_err() {
                return Ok(text);
            }
        }
        let _ = tx.send(StreamChunk::done()).await;
        Ok(text)
    }
}
