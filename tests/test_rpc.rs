//! End-to-end tests for the HTTP router: tRPC envelopes, auth gating,
//! subscriptions over event-stream, and the persisted procedures.
//!
//! The router is driven in-process with `tower::ServiceExt::oneshot`
//! against the echo provider and a throwaway SQLite file.

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::Router;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use codebuddy::config::Config;
use codebuddy::llm::LlmProvider;
use codebuddy::llm::providers;
use codebuddy::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use codebuddy::subsystems::assistant::{self, Assistant};
use codebuddy::subsystems::auth::{self, Sessions};
use codebuddy::subsystems::comms::CommsState;
use codebuddy::subsystems::comms::axum_channel::build_router;
use codebuddy::subsystems::store::{Store, UserUpsert};

struct Harness {
    _tmp: TempDir,
    router: Router,
    store: Store,
    sessions: Sessions,
    cookie_name: String,
}

impl Harness {
    fn new() -> Self {
        Self::build(|_| {}, None)
    }

    /// Router whose assistant talks to `llm` instead of the echo provider.
    fn with_llm(llm: LlmProvider) -> Self {
        Self::build(|_| {}, Some(llm))
    }

    fn build(tweak: impl FnOnce(&mut Config), llm: Option<LlmProvider>) -> Self {
        let tmp = TempDir::new().unwrap();
        let mut cfg = Config::test_default(tmp.path());
        tweak(&mut cfg);
        let store = Store::open(&cfg.database_path(), cfg.auth.owner_open_id.clone()).unwrap();
        let llm = llm.unwrap_or_else(|| providers::build(&cfg.llm, None).unwrap());
        let state = CommsState::new(&cfg, Assistant::new(llm, store.clone())).unwrap();
        let router = build_router(Arc::new(state), None, cfg.http.body_limit_bytes);
        Self {
            _tmp: tmp,
            router,
            store,
            sessions: Sessions::new("test-secret", &cfg.auth),
            cookie_name: cfg.auth.cookie_name.clone(),
        }
    }

    /// Create `open_id` in the store and return a `Cookie` header value for it.
    async fn sign_in(&self, open_id: &str) -> String {
        let upsert = UserUpsert {
            open_id: open_id.to_string(),
            name: Some("Ada".into()),
            ..UserUpsert::default()
        };
        self.store.run(move |s| s.upsert_user(upsert)).await.unwrap();
        let token = self.sessions.sign(open_id, "Ada").unwrap();
        format!("{}={token}", self.cookie_name)
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap().to_vec();
        (status, headers, body)
    }

    async fn query(&self, path: &str, input: Option<Value>, cookie: Option<&str>) -> (StatusCode, Value) {
        let mut uri = format!("/api/trpc/{path}");
        if let Some(input) = input {
            uri.push_str("?input=");
            uri.push_str(&encode_component(&input.to_string()));
        }
        let mut req = Request::get(uri);
        if let Some(c) = cookie {
            req = req.header(header::COOKIE, c);
        }
        let (status, _, body) = self.send(req.body(Body::empty()).unwrap()).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn mutate(&self, path: &str, input: Value, cookie: Option<&str>) -> (StatusCode, Value) {
        let mut req = Request::post(format!("/api/trpc/{path}"))
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(c) = cookie {
            req = req.header(header::COOKIE, c);
        }
        let (status, _, body) = self.send(req.body(Body::from(input.to_string())).unwrap()).await;
        (status, serde_json::from_slice(&body).unwrap())
    }
}

/// Compatible provider pointed at `server`.
fn mock_llm(server: &MockServer) -> LlmProvider {
    let p = OpenAiCompatibleProvider::new(
        format!("{}/v1/chat/completions", server.uri()),
        "mock-model".into(),
        0.7,
        5,
        None,
    )
    .unwrap();
    LlmProvider::OpenAiCompatible(p)
}

/// Provider whose every call fails with HTTP 500.
async fn failing_llm() -> (MockServer, LlmProvider) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model overloaded"))
        .mount(&server)
        .await;
    let llm = mock_llm(&server);
    (server, llm)
}

/// Provider whose every reply has empty content.
async fn silent_llm() -> (MockServer, LlmProvider) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "" } }]
        })))
        .mount(&server)
        .await;
    let llm = mock_llm(&server);
    (server, llm)
}

fn encode_component(s: &str) -> String {
    let mut out = String::new();
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

// ── Envelopes & routing ──────────────────────────────────────────────────────

#[tokio::test]
async fn health_query_is_wrapped_in_result_data() {
    let h = Harness::new();
    let (status, body) = h.query("system.health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["data"]["ok"], true);
    assert_eq!(body["result"]["data"]["provider"], "dummy");
}

#[tokio::test]
async fn unknown_procedure_is_not_found() {
    let h = Harness::new();
    let (status, body) = h.query("nope.nothing", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["data"]["code"], "NOT_FOUND");
    assert_eq!(body["error"]["data"]["httpStatus"], 404);
    assert_eq!(body["error"]["data"]["path"], "nope.nothing");
}

#[tokio::test]
async fn mutation_over_get_is_rejected() {
    let h = Harness::new();
    let (status, body) = h.query("auth.logout", None, None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"]["data"]["code"], "METHOD_NOT_SUPPORTED");
}

#[tokio::test]
async fn protected_procedure_requires_session() {
    let h = Harness::new();
    let (status, body) = h.query("projects.list", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Please login (10001)");
    assert_eq!(body["error"]["data"]["code"], "UNAUTHORIZED");

    let forged = format!("{}=not-a-token", h.cookie_name);
    let (status, _) = h.query("projects.list", None, Some(&forged)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_input_is_bad_request() {
    let h = Harness::new();
    let (status, body) = h.mutate("analyzeCode", json!({ "code": "" }), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Code is required");

    let (status, body) = h.mutate("analyzeCode", json!({ "language": "rust" }), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["data"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn unknown_api_path_is_json_404() {
    let h = Harness::new();
    let (status, _, body) = h
        .send(Request::get("/api/does-not-exist").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn root_serves_status_page_without_bundle() {
    let h = Harness::new();
    let (status, headers, body) = h.send(Request::get("/").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/html"));
    assert!(String::from_utf8_lossy(&body).contains("CodeBuddy"));
}

// ── Auth ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn me_is_null_when_anonymous_and_user_when_signed_in() {
    let h = Harness::new();
    let (_, body) = h.query("auth.me", None, None).await;
    assert!(body["result"]["data"].is_null());

    let cookie = h.sign_in("user-1").await;
    let (status, body) = h.query("auth.me", None, Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["data"]["openId"], "user-1");
    assert_eq!(body["result"]["data"]["role"], "user");
}

#[tokio::test]
async fn owner_signs_in_as_admin() {
    let h = Harness::new();
    let cookie = h.sign_in("owner-open-id").await;
    let (_, body) = h.query("auth.me", None, Some(&cookie)).await;
    assert_eq!(body["result"]["data"]["role"], "admin");
}

#[tokio::test]
async fn logout_clears_cookie() {
    let h = Harness::new();
    let req = Request::post("/api/trpc/auth.logout").body(Body::empty()).unwrap();
    let (status, headers, body) = h.send(req).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["result"]["data"]["success"], true);
    let cookie = headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("app_session_id="));
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn oauth_login_redirects_to_portal() {
    let h = Harness::new();
    let req = Request::get("/api/oauth/login")
        .header(header::HOST, "buddy.local")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = h.send(req).await;
    assert_eq!(status, StatusCode::FOUND);
    let location = headers[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("http://localhost:0/portal"));
    assert!(location.contains("appId=test-app"));
}

#[tokio::test]
async fn oauth_callback_requires_code_and_state() {
    let h = Harness::new();
    let req = Request::get("/api/oauth/callback?code=abc").body(Body::empty()).unwrap();
    let (status, _, _) = h.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ── Assistant procedures ─────────────────────────────────────────────────────

#[tokio::test]
async fn analyze_code_returns_bounded_scores() {
    let h = Harness::new();
    let (status, body) = h
        .mutate("analyzeCode", json!({ "code": "fn main() {}", "language": "rust" }), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["result"]["data"];
    for key in ["complexity", "security", "performance"] {
        let score = data[key].as_u64().unwrap();
        assert!(score <= 100, "{key} out of range: {score}");
    }
    assert!(data["issues"].is_array());
}

#[tokio::test]
async fn generate_subscription_streams_until_done() {
    let h = Harness::new();
    let input = encode_component(&json!({ "prompt": "a fizzbuzz", "language": "python" }).to_string());
    let req = Request::get(format!("/api/trpc/generateCode?input={input}"))
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = h.send(req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/event-stream"));

    let items: Vec<Value> = String::from_utf8(body)
        .unwrap()
        .lines()
        .filter_map(|l| l.strip_prefix("data:"))
        .map(|d| serde_json::from_str(d.trim()).unwrap())
        .collect();
    let last = items.last().unwrap();
    assert_eq!(last["done"], true);
    assert_eq!(last["chunk"], "");
    assert!(items[..items.len() - 1].iter().all(|i| i["done"] == false));
    let text: String = items.iter().filter_map(|i| i["chunk"].as_str()).collect();
    assert!(text.starts_with("[echo]"));
}

#[tokio::test]
async fn subscription_validates_before_streaming() {
    let h = Harness::new();
    let (status, body) = h.query("chat", Some(json!({ "message": "" })), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Message is required");
}

// ── Persisted procedures ─────────────────────────────────────────────────────

#[tokio::test]
async fn projects_and_snippets_round_trip() {
    let h = Harness::new();
    let cookie = h.sign_in("user-1").await;

    let (status, body) = h
        .mutate("projects.create", json!({ "name": "Sandbox" }), Some(&cookie))
        .await;
    assert_eq!(status, StatusCode::OK);
    let project = &body["result"]["data"];
    assert_eq!(project["language"], "javascript");
    let project_id = project["id"].as_i64().unwrap();

    let (_, body) = h.query("projects.list", None, Some(&cookie)).await;
    assert_eq!(body["result"]["data"].as_array().unwrap().len(), 1);

    let (status, body) = h
        .mutate(
            "snippets.create",
            json!({ "projectId": project_id, "title": "hello", "code": "print(1)", "language": "python" }),
            Some(&cookie),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let snippet_id = body["result"]["data"]["id"].as_i64().unwrap();

    let (status, body) = h.query("snippets.get", Some(json!({ "id": snippet_id })), Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["data"]["code"], "print(1)");

    // Another user cannot read it.
    let other = h.sign_in("user-2").await;
    let (status, body) = h.query("snippets.get", Some(json!({ "id": snippet_id })), Some(&other)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "Snippet not found");
    let (_, body) = h.query("snippets.list", None, Some(&other)).await;
    assert!(body["result"]["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn review_is_saved_against_owned_snippet() {
    let h = Harness::new();
    let cookie = h.sign_in("user-1").await;

    let (_, body) = h.mutate("projects.create", json!({ "name": "P" }), Some(&cookie)).await;
    let project_id = body["result"]["data"]["id"].as_i64().unwrap();
    let (_, body) = h
        .mutate(
            "snippets.create",
            json!({ "projectId": project_id, "title": "t", "code": "x = 1" }),
            Some(&cookie),
        )
        .await;
    let snippet_id = body["result"]["data"]["id"].as_i64().unwrap();

    let (status, body) = h
        .mutate(
            "code.analyzeCode",
            json!({ "code": "x = 1", "analysisType": "security", "snippetId": snippet_id }),
            Some(&cookie),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["data"]["success"], true);
    assert_eq!(body["result"]["data"]["score"], 70);

    let (_, body) = h
        .query("snippets.analysis", Some(json!({ "snippetId": snippet_id })), Some(&cookie))
        .await;
    let rows = body["result"]["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["analysisType"], "security");
    assert_eq!(rows[0]["score"], 70);
}

#[tokio::test]
async fn review_rejects_unknown_analysis_type() {
    let h = Harness::new();
    let cookie = h.sign_in("user-1").await;
    let (status, _) = h
        .mutate("code.analyzeCode", json!({ "code": "x", "analysisType": "style" }), Some(&cookie))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn refactor_once_returns_model_text() {
    let h = Harness::new();
    let cookie = h.sign_in("user-1").await;
    let (status, body) = h
        .mutate("code.refactorCode", json!({ "code": "let a=1" }), Some(&cookie))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["data"]["success"], true);
    assert_eq!(body["result"]["data"]["refactoredCode"], "[echo] let a=1");
}

#[tokio::test]
async fn chat_messages_are_persisted_in_order() {
    let h = Harness::new();
    let cookie = h.sign_in("user-1").await;

    let (status, body) = h
        .mutate("chat.sendMessage", json!({ "message": "what is a closure?" }), Some(&cookie))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["data"]["success"], true);
    assert_eq!(body["result"]["data"]["message"], "[echo] what is a closure?");

    let (_, body) = h.query("chat.getHistory", None, Some(&cookie)).await;
    let rows = body["result"]["data"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["role"], "user");
    assert_eq!(rows[1]["role"], "assistant");

    let other = h.sign_in("user-2").await;
    let (_, body) = h.query("chat.getHistory", Some(json!({})), Some(&other)).await;
    assert!(body["result"]["data"].as_array().unwrap().is_empty());
}

// ── Provider failures ────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_subscription_ends_with_error_event() {
    let (_server, llm) = failing_llm().await;
    let h = Harness::with_llm(llm);
    let input = encode_component(&json!({ "message": "hi" }).to_string());
    let req = Request::get(format!("/api/trpc/chat?input={input}")).body(Body::empty()).unwrap();
    let (status, _, body) = h.send(req).await;
    assert_eq!(status, StatusCode::OK);

    let body = String::from_utf8(body).unwrap();
    assert!(body.contains("event: error"));
    let frame = body
        .lines()
        .filter_map(|l| l.strip_prefix("data:"))
        .last()
        .unwrap();
    let frame: Value = serde_json::from_str(frame.trim()).unwrap();
    assert!(frame["message"].as_str().unwrap().contains("model overloaded"));
    assert!(!body.contains("\"done\":true"));
}

#[tokio::test]
async fn failed_public_analysis_is_internal_error() {
    let (_server, llm) = failing_llm().await;
    let h = Harness::with_llm(llm);
    let (status, body) = h.mutate("analyzeCode", json!({ "code": "x" }), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["data"]["code"], "INTERNAL_SERVER_ERROR");
}

#[tokio::test]
async fn failed_review_reports_zero_score() {
    let (_server, llm) = failing_llm().await;
    let h = Harness::with_llm(llm);
    let cookie = h.sign_in("user-1").await;
    let (status, body) = h
        .mutate("code.analyzeCode", json!({ "code": "x", "analysisType": "quality" }), Some(&cookie))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["result"]["data"],
        json!({ "success": false, "analysis": assistant::REVIEW_FAILED, "score": 0 })
    );
}

#[tokio::test]
async fn failed_refactor_hands_back_input() {
    let (_server, llm) = failing_llm().await;
    let h = Harness::with_llm(llm);
    let cookie = h.sign_in("user-1").await;
    let (_, body) = h
        .mutate("code.refactorCode", json!({ "code": "var a = 1" }), Some(&cookie))
        .await;
    assert_eq!(body["result"]["data"], json!({ "success": false, "refactoredCode": "var a = 1" }));
}

#[tokio::test]
async fn failed_chat_keeps_question_only() {
    let (_server, llm) = failing_llm().await;
    let h = Harness::with_llm(llm);
    let cookie = h.sign_in("user-1").await;
    let (_, body) = h.mutate("chat.sendMessage", json!({ "message": "why?" }), Some(&cookie)).await;
    assert_eq!(body["result"]["data"], json!({ "success": false, "message": assistant::CHAT_FAILED }));

    let (_, body) = h.query("chat.getHistory", None, Some(&cookie)).await;
    let rows = body["result"]["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["role"], "user");
    assert_eq!(rows[0]["message"], "why?");
}

// ── Empty replies ────────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_analysis_reply_gives_neutral_scores() {
    let (_server, llm) = silent_llm().await;
    let h = Harness::with_llm(llm);
    let (status, body) = h.mutate("analyzeCode", json!({ "code": "x" }), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["result"]["data"],
        json!({ "complexity": 50, "security": 50, "performance": 50, "issues": [] })
    );
}

#[tokio::test]
async fn empty_replies_use_fallback_text() {
    let (_server, llm) = silent_llm().await;
    let h = Harness::with_llm(llm);
    let cookie = h.sign_in("user-1").await;

    let (_, body) = h
        .mutate("code.analyzeCode", json!({ "code": "x", "analysisType": "performance" }), Some(&cookie))
        .await;
    assert_eq!(body["result"]["data"]["success"], true);
    assert_eq!(body["result"]["data"]["analysis"], assistant::EMPTY_REVIEW);

    let (_, body) = h
        .mutate("code.refactorCode", json!({ "code": "let keep = 1" }), Some(&cookie))
        .await;
    assert_eq!(body["result"]["data"], json!({ "success": true, "refactoredCode": "let keep = 1" }));

    let (_, body) = h.mutate("chat.sendMessage", json!({ "message": "hello?" }), Some(&cookie)).await;
    assert_eq!(body["result"]["data"], json!({ "success": true, "message": assistant::EMPTY_CHAT }));
    let (_, body) = h.query("chat.getHistory", None, Some(&cookie)).await;
    let rows = body["result"]["data"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1]["message"], assistant::EMPTY_CHAT);
}

#[tokio::test]
async fn analysis_list_is_private_to_author() {
    let h = Harness::new();
    let cookie = h.sign_in("user-1").await;
    let (_, body) = h.mutate("projects.create", json!({ "name": "P" }), Some(&cookie)).await;
    let project_id = body["result"]["data"]["id"].as_i64().unwrap();
    let (_, body) = h
        .mutate("snippets.create", json!({ "projectId": project_id, "title": "t", "code": "c" }), Some(&cookie))
        .await;
    let snippet_id = body["result"]["data"]["id"].as_i64().unwrap();
    h.mutate(
        "code.analyzeCode",
        json!({ "code": "c", "analysisType": "quality", "snippetId": snippet_id }),
        Some(&cookie),
    )
    .await;

    let other = h.sign_in("user-2").await;
    let (status, body) = h
        .query("snippets.analysis", Some(json!({ "snippetId": snippet_id })), Some(&other))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["result"]["data"].as_array().unwrap().is_empty());
}

// ── OAuth sign-in ────────────────────────────────────────────────────────────

#[tokio::test]
async fn oauth_callback_signs_user_in() {
    let oauth = MockServer::start().await;
    let redirect_uri = "http://buddy.local/api/oauth/callback";
    Mock::given(method("POST"))
        .and(path("/webdev.v1.WebDevAuthPublicService/ExchangeToken"))
        .and(body_partial_json(json!({
            "clientId": "test-app",
            "code": "code-1",
            "redirectUri": redirect_uri,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accessToken": "at-1" })))
        .expect(1)
        .mount(&oauth)
        .await;
    Mock::given(method("POST"))
        .and(path("/webdev.v1.WebDevAuthPublicService/GetUserInfo"))
        .and(body_partial_json(json!({ "accessToken": "at-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "openId": "oauth-user",
            "name": "Grace",
            "email": "grace@example.com",
            "platform": "github",
        })))
        .expect(1)
        .mount(&oauth)
        .await;

    let oauth_url = oauth.uri();
    let h = Harness::build(|cfg| cfg.auth.oauth_server_url = oauth_url, None);

    let state = encode_component(&auth::encode_state(redirect_uri));
    let req = Request::get(format!("/api/oauth/callback?code=code-1&state={state}"))
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = h.send(req).await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(headers[header::LOCATION], "/");

    let set_cookie = headers[header::SET_COOKIE].to_str().unwrap();
    assert!(set_cookie.contains("HttpOnly"));
    let cookie = set_cookie.split(';').next().unwrap().to_string();
    assert!(cookie.starts_with("app_session_id="));

    let (_, body) = h.query("auth.me", None, Some(&cookie)).await;
    let me = &body["result"]["data"];
    assert_eq!(me["openId"], "oauth-user");
    assert_eq!(me["name"], "Grace");
    assert_eq!(me["loginMethod"], "github");
}

#[tokio::test]
async fn oauth_callback_upstream_failure_is_500() {
    let oauth = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad code"))
        .mount(&oauth)
        .await;

    let oauth_url = oauth.uri();
    let h = Harness::build(|cfg| cfg.auth.oauth_server_url = oauth_url, None);
    let state = encode_component(&auth::encode_state("http://buddy.local/api/oauth/callback"));
    let req = Request::get(format!("/api/oauth/callback?code=nope&state={state}"))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = h.send(req).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"], "oauth_failed");
}
