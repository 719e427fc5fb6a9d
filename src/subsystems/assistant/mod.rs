//! Coding assistant procedures: prompt assembly, LLM calls, and the
//! persistence side effects of the signed-in variants.

pub mod analysis;
pub mod prompt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::error::AppError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, ProviderError, StreamChunk};
use crate::subsystems::store::{ChatRole, NewAnalysis, NewChatMessage, Store};

use analysis::{CodeAnalysis, DEFAULT_REVIEW_SCORE, extract_score, parse_analysis};
use prompt::{AnalysisType, PromptBuilder, Strategy};

const STREAM_BUFFER: usize = 32;

pub const REVIEW_FAILED: &str = "Unable to analyze code at this time";
pub const CHAT_FAILED: &str = "Unable to process your message at this time.";

// Stand-ins for a reply that came back without content.
pub const EMPTY_REVIEW: &str = "Analysis completed";
pub const EMPTY_CHAT: &str = "I couldn't process your request.";

/// One prior turn supplied by the caller of the `chat` subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Item delivered to a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Chunk(StreamChunk),
    /// The provider failed; nothing follows.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewOutcome {
    pub success: bool,
    pub analysis: String,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefactorOutcome {
    pub success: bool,
    pub refactored_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatReply {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub code: String,
    pub language: String,
    pub analysis_type: AnalysisType,
    pub snippet_id: Option<i64>,
}

// ── Request builders ──────────────────────────────────────────────────────────

pub fn analysis_request(code: &str, language: &str) -> CompletionRequest {
    let prompt = PromptBuilder::new()
        .append(prompt::ANALYSIS)
        .with_vars([("language", language), ("code", code)])
        .build();
    CompletionRequest::new(vec![ChatMessage::user(prompt)])
        .temperature(0.3)
        .max_tokens(2048)
}

pub fn refactor_request(code: &str, language: &str, strategy: Strategy) -> CompletionRequest {
    let prompt = PromptBuilder::new()
        .append(prompt::REFACTOR)
        .with_vars([
            ("language", language),
            ("strategy", strategy.instructions()),
            ("code", code),
        ])
        .build();
    CompletionRequest::new(vec![ChatMessage::user(prompt)])
        .temperature(0.5)
        .max_tokens(4096)
}

pub fn generate_request(requirement: &str, language: &str) -> CompletionRequest {
    let prompt = PromptBuilder::new()
        .append(prompt::GENERATE)
        .with_vars([("language", language), ("prompt", requirement)])
        .build();
    CompletionRequest::new(vec![ChatMessage::user(prompt)])
        .temperature(0.7)
        .max_tokens(4096)
}

/// System prompt, then the caller's history in order, then the new message.
pub fn chat_request(message: &str, history: &[HistoryMessage]) -> CompletionRequest {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(prompt::CHAT_SYSTEM));
    messages.extend(history.iter().map(|h| match h.role {
        ChatRole::User => ChatMessage::user(h.content.clone()),
        ChatRole::Assistant => ChatMessage::assistant(h.content.clone()),
    }));
    messages.push(ChatMessage::user(message));
    CompletionRequest::new(messages).temperature(0.7).max_tokens(2048)
}

fn review_request(code: &str, language: &str, analysis_type: AnalysisType) -> CompletionRequest {
    let system = PromptBuilder::new()
        .append(prompt::REVIEW_SYSTEM)
        .with_vars([("language", language), ("analysis_type", analysis_type.as_str())])
        .build();
    CompletionRequest::new(vec![ChatMessage::system(system), ChatMessage::user(code)])
}

fn refactor_once_request(code: &str, language: &str) -> CompletionRequest {
    let system = PromptBuilder::new()
        .append(prompt::REFACTOR_ONCE_SYSTEM)
        .var("language", language)
        .build();
    CompletionRequest::new(vec![ChatMessage::system(system), ChatMessage::user(code)])
}

// ── Assistant ─────────────────────────────────────────────────────────────────

/// Shared handle used by the RPC layer. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Assistant {
    llm: LlmProvider,
    store: Store,
}

impl Assistant {
    pub fn new(llm: LlmProvider, store: Store) -> Self {
        Self { llm, store }
    }

    pub fn llm(&self) -> &LlmProvider {
        &self.llm
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Score and list issues in `code`. Provider failures are returned.
    pub async fn analyze_code(&self, code: &str, language: &str) -> Result<CodeAnalysis, ProviderError> {
        let reply = self.llm.complete(&analysis_request(code, language)).await?;
        let analysis = parse_analysis(&reply.text);
        debug!(
            complexity = analysis.complexity,
            security = analysis.security,
            performance = analysis.performance,
            issues = analysis.issues.len(),
            "code analysed"
        );
        Ok(analysis)
    }

    /// Start streaming `request` on a background task.
    ///
    /// Chunks arrive in provider order and end with the `done` marker, or
    /// with a single [`StreamEvent::Failed`] when the provider errors.
    /// Dropping the receiver stops the upstream request.
    pub fn stream(&self, request: CompletionRequest) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let llm = self.llm.clone();

        tokio::spawn(async move {
            let (chunk_tx, mut chunk_rx) = mpsc::channel::<StreamChunk>(STREAM_BUFFER);
            let forward_tx = tx.clone();
            let forward = async move {
                while let Some(chunk) = chunk_rx.recv().await {
                    if forward_tx.send(StreamEvent::Chunk(chunk)).await.is_err() {
                        break;
                    }
                }
            };

            let (result, ()) = tokio::join!(llm.stream(&request, chunk_tx), forward);
            if let Err(e) = result {
                warn!(error = %e, "stream failed");
                let _ = tx.send(StreamEvent::Failed(e.to_string())).await;
            }
        });

        rx
    }

    /// Free-form review for a signed-in user.
    ///
    /// When `snippet_id` names one of the user's snippets the result is also
    /// stored in `analysisResults`. Failures are logged and reported through
    /// `success: false`.
    pub async fn review_code(&self, user_id: i64, req: ReviewRequest) -> ReviewOutcome {
        let reply = match self
            .llm
            .complete(&review_request(&req.code, &req.language, req.analysis_type))
            .await
        {
            Ok(r) => r,
            Err(e) => {
                error!(user_id, error = %e, "code review failed");
                return ReviewOutcome { success: false, analysis: REVIEW_FAILED.into(), score: 0 };
            }
        };

        let score = extract_score(&reply.text).unwrap_or(DEFAULT_REVIEW_SCORE);
        let analysis = if reply.text.is_empty() { EMPTY_REVIEW.to_string() } else { reply.text };

        if let Some(snippet_id) = req.snippet_id {
            let record = NewAnalysis {
                snippet_id,
                user_id,
                analysis_type: req.analysis_type.as_str().to_string(),
                result: analysis.clone(),
                score: Some(score),
            };
            let saved = self
                .store
                .run(move |s| match s.get_snippet(snippet_id, user_id)? {
                    Some(_) => s.save_analysis(record).map(Some),
                    None => Ok(None),
                })
                .await;
            match saved {
                Ok(Some(row)) => debug!(user_id, snippet_id, analysis_id = row.id, "analysis saved"),
                Ok(None) => warn!(user_id, snippet_id, "snippet not found — analysis not saved"),
                Err(e) => warn!(user_id, snippet_id, error = %e, "failed to save analysis"),
            }
        }

        ReviewOutcome { success: true, analysis, score }
    }

    /// One-shot refactor. On failure, or an empty reply, the original code
    /// is handed back.
    pub async fn refactor_once(&self, code: &str, language: &str) -> RefactorOutcome {
        match self.llm.complete(&refactor_once_request(code, language)).await {
            Ok(reply) if reply.text.is_empty() => {
                RefactorOutcome { success: true, refactored_code: code.to_string() }
            }
            Ok(reply) => RefactorOutcome { success: true, refactored_code: reply.text },
            Err(e) => {
                error!(error = %e, "refactor failed");
                RefactorOutcome { success: false, refactored_code: code.to_string() }
            }
        }
    }

    /// Persisted chat turn: store the question, ask the model, store the
    /// answer.
    pub async fn send_message(&self, user_id: i64, message: &str, snippet_id: Option<i64>) -> ChatReply {
        match self.try_send_message(user_id, message, snippet_id).await {
            Ok(answer) => ChatReply { success: true, message: answer },
            Err(e) => {
                error!(user_id, error = %e, "chat message failed");
                ChatReply { success: false, message: CHAT_FAILED.into() }
            }
        }
    }

    async fn try_send_message(
        &self,
        user_id: i64,
        message: &str,
        snippet_id: Option<i64>,
    ) -> Result<String, AppError> {
        let question = NewChatMessage {
            user_id,
            snippet_id,
            role: ChatRole::User,
            message: message.to_string(),
        };
        self.store.run(move |s| s.save_chat_message(question)).await?;

        let request = CompletionRequest::new(vec![
            ChatMessage::system(prompt::ASSISTANT_SYSTEM),
            ChatMessage::user(message),
        ]);
        let reply = self
            .llm
            .complete(&request)
            .await
            .map_err(|e| AppError::Llm(e.to_string()))?;
        let text = if reply.text.is_empty() { EMPTY_CHAT.to_string() } else { reply.text };

        let answer = NewChatMessage {
            user_id,
            snippet_id,
            role: ChatRole::Assistant,
            message: text.clone(),
        };
        self.store.run(move |s| s.save_chat_message(answer)).await?;

        Ok(text)
    }
}
