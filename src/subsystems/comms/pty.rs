//! PTY (console) channel: an interactive coding chat in the terminal.
//!
//! Reads a line, streams the model's reply to the terminal as it arrives,
//! and keeps the whole conversation as context for the next turn. Replies
//! that contain fenced code are printed again as a framed result block.
//! Ends on `exit`/`quit`, end of input, or the shutdown token (Ctrl-C).
//!
//! Input and output are generic so tests can drive a session in memory.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, StreamChunk};
use crate::subsystems::assistant::prompt;

const SEPARATOR: &str = "------------------------------------------------------------";

/// Running conversation: the system prompt followed by every turn so far.
#[derive(Debug, Clone)]
pub struct ChatSession {
    history: Vec<ChatMessage>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self { history: vec![ChatMessage::system(prompt::TERMINAL_SYSTEM)] }
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Request for the next turn: full history plus `input`.
    pub fn request(&self, input: &str) -> CompletionRequest {
        let mut messages = self.history.clone();
        messages.push(ChatMessage::user(input));
        CompletionRequest::new(messages).temperature(0.7).max_tokens(4096)
    }

    /// Record a finished turn.
    pub fn record(&mut self, input: &str, reply: &str) {
        self.history.push(ChatMessage::user(input));
        self.history.push(ChatMessage::assistant(reply));
    }
}

fn is_exit(input: &str) -> bool {
    matches!(input.to_ascii_lowercase().as_str(), "exit" | "quit")
}

/// Run the console chat until the user leaves, input ends, or `shutdown`
/// fires. A provider error is printed and ends the session.
pub async fn run_pty<R, W>(
    llm: &LlmProvider,
    input: R,
    mut output: W,
    shutdown: CancellationToken,
) -> Result<(), AppError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("pty channel started");
    output
        .write_all(b"CodeBuddy: terminal coding assistant\nType your request, or 'exit' to quit.\n\n")
        .await?;

    let mut lines = input.lines();
    let mut session = ChatSession::new();

    loop {
        output.write_all(b"You: ").await?;
        output.flush().await?;

        let line = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("pty channel shutting down");
                break;
            }
            line = lines.next_line() => line,
        };

        let input = match line {
            Ok(Some(l)) => l.trim().to_string(),
            Ok(None) => {
                info!("pty stdin closed");
                break;
            }
            Err(e) => {
                warn!("pty read error: {e}");
                break;
            }
        };
        if input.is_empty() {
            continue;
        }
        if is_exit(&input) {
            break;
        }

        debug!(chars = input.len(), turns = session.history().len(), "pty turn");
        output.write_all(b"\nCodeBuddy: ").await?;

        let request = session.request(&input);
        let turn = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            res = stream_reply(llm, &request, &mut output) => Some(res),
        };

        match turn {
            None => {
                info!("pty channel shutting down mid-reply");
                break;
            }
            Some(Ok(reply)) => {
                output.write_all(b"\n").await?;
                if let Some(rendered) = render_reply(&reply) {
                    output.write_all(b"\nResult:\n").await?;
                    output.write_all(rendered.as_bytes()).await?;
                }
                output.write_all(format!("{SEPARATOR}\n").as_bytes()).await?;
                session.record(&input, &reply);
            }
            Some(Err(e)) => {
                warn!(error = %e, "pty reply failed");
                output.write_all(format!("\nError: {e}\n").as_bytes()).await?;
                break;
            }
        }
    }

    output.write_all(b"\nBye!\n").await?;
    output.flush().await?;
    Ok(())
}

/// Stream one reply into `output` chunk by chunk and return the full text.
async fn stream_reply<W>(
    llm: &LlmProvider,
    request: &CompletionRequest,
    output: &mut W,
) -> Result<String, AppError>
where
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::channel::<StreamChunk>(32);
    let print = async {
        while let Some(chunk) = rx.recv().await {
            if chunk.done {
                continue;
            }
            output.write_all(chunk.chunk.as_bytes()).await?;
            output.flush().await?;
        }
        Ok::<(), std::io::Error>(())
    };

    let (reply, printed) = tokio::join!(llm.stream(request, tx), print);
    printed?;
    reply.map_err(|e| AppError::Llm(e.to_string()))
}

/// Terminal rendering of a reply that contains fenced code, or `None`.
///
/// Fenced blocks are framed and labelled with their language; heading
/// markers are dropped from prose lines.
pub fn render_reply(reply: &str) -> Option<String> {
    if !reply.contains("```") {
        return None;
    }

    let mut out = String::new();
    let mut in_code = false;
    for line in reply.lines() {
        let trimmed = line.trim_start();
        if let Some(lang) = trimmed.strip_prefix("```") {
            if in_code {
                out.push_str("└────\n");
            } else {
                let lang = lang.trim();
                out.push_str(&format!("┌── {}\n", if lang.is_empty() { "code" } else { lang }));
            }
            in_code = !in_code;
        } else if in_code {
            out.push_str(&format!("│ {line}\n"));
        } else {
            out.push_str(trimmed.trim_start_matches('#').trim_start());
            out.push('\n');
        }
    }
    if in_code {
        out.push_str("└────\n");
    }
    Some(out)
}
