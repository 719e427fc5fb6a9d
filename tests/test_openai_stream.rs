//! OpenAI-compatible provider against a mock `/v1/chat/completions`.

use tokio::sync::mpsc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use codebuddy::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use codebuddy::llm::{ChatMessage, CompletionRequest, LlmProvider, StreamChunk};
use codebuddy::subsystems::assistant::{self, StreamEvent};
use codebuddy::subsystems::assistant::prompt::Strategy;

fn provider(server: &MockServer) -> OpenAiCompatibleProvider {
    OpenAiCompatibleProvider::new(
        format!("{}/v1/chat/completions", server.uri()),
        "test-model".into(),
        0.7,
        5,
        Some("sk-test".into()),
    )
    .unwrap()
}

fn request() -> CompletionRequest {
    CompletionRequest::new(vec![ChatMessage::user("write hello world")])
        .temperature(0.5)
        .max_tokens(64)
}

const STREAM_BODY: &str = concat!(
    "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"fn \"}}]}\n\n",
    ": keep-alive\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"main()\"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
    "data: [DONE]\n\n",
);

#[tokio::test]
async fn stream_forwards_deltas_then_done() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(serde_json::json!({ "stream": true, "max_completion_tokens": 64 })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(STREAM_BODY),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (tx, mut rx) = mpsc::channel(16);
    let full = provider(&server).stream(&request(), tx).await.unwrap();
    assert_eq!(full, "fn main()");

    let mut items = Vec::new();
    while let Some(item) = rx.recv().await {
        items.push(item);
    }
    assert_eq!(
        items,
        vec![StreamChunk::content("fn "), StreamChunk::content("main()"), StreamChunk::done()]
    );
}

#[tokio::test]
async fn complete_returns_trimmed_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "  hello  " } }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 3 }
        })))
        .mount(&server)
        .await;

    let reply = provider(&server).complete(&request()).await.unwrap();
    assert_eq!(reply.text, "hello");
    let usage = reply.usage.unwrap();
    assert_eq!(usage.input_tokens, 12);
    assert_eq!(usage.output_tokens, 3);
}

#[tokio::test]
async fn http_error_surfaces_provider_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "error": { "message": "rate limited", "code": "rate_limit_exceeded" }
        })))
        .mount(&server)
        .await;

    let err = provider(&server).complete(&request()).await.unwrap_err().to_string();
    assert!(err.contains("429"));
    assert!(err.contains("rate limited"));
    assert!(err.contains("rate_limit_exceeded"));
}

#[tokio::test]
async fn failed_stream_becomes_single_error_event() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let tmp = tempfile::TempDir::new().unwrap();
    let store = codebuddy::subsystems::store::Store::open(&tmp.path().join("t.db"), None).unwrap();
    let assistant = assistant::Assistant::new(LlmProvider::OpenAiCompatible(provider(&server)), store);

    let mut rx = assistant.stream(assistant::refactor_request("x", "rust", Strategy::Secure));
    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
        events.push(ev);
    }
    assert_eq!(events.len(), 1);
    match &events[0] {
        StreamEvent::Failed(message) => assert!(message.contains("upstream exploded")),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_content_is_empty_text_not_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": null } }]
        })))
        .mount(&server)
        .await;

    let reply = provider(&server).complete(&request()).await.unwrap();
    assert_eq!(reply.text, "");
    assert!(reply.usage.is_none());
}
