//! `/api/trpc/{procedure}` — tRPC-compatible procedure endpoint.
//!
//! Queries arrive as `GET ?input=<json>`, mutations as `POST` with a JSON
//! body, and subscriptions as `GET` answered with `text/event-stream`.
//! Results are wrapped as `{"result":{"data":…}}`; failures as
//! `{"error":{"message","code","data":{"code","httpStatus","path"}}}`.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::StreamExt;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::llm::CompletionRequest;
use crate::subsystems::assistant::prompt::{AnalysisType, Strategy};
use crate::subsystems::assistant::{self, HistoryMessage, ReviewRequest, StreamEvent};
use crate::subsystems::comms::is_secure_request;
use crate::subsystems::store::{NewProject, NewSnippet, User};

use super::AxumState;

// ── Procedure table ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Kind {
    Query,
    Mutation,
    Subscription,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Procedure {
    SystemHealth,
    AuthMe,
    AuthLogout,
    AnalyzeCode,
    RefactorCode,
    GenerateCode,
    Chat,
    CodeAnalyzeCode,
    CodeRefactorCode,
    ProjectsList,
    ProjectsCreate,
    SnippetsList,
    SnippetsGet,
    SnippetsCreate,
    SnippetsAnalysis,
    ChatSendMessage,
    ChatGetHistory,
}

impl Procedure {
    pub(super) fn parse(path: &str) -> Option<Self> {
        use Procedure::*;
        Some(match path {
            "system.health" => SystemHealth,
            "auth.me" => AuthMe,
            "auth.logout" => AuthLogout,
            "analyzeCode" => AnalyzeCode,
            "refactorCode" => RefactorCode,
            "generateCode" => GenerateCode,
            "chat" => Chat,
            "code.analyzeCode" => CodeAnalyzeCode,
            "code.refactorCode" => CodeRefactorCode,
            "projects.list" => ProjectsList,
            "projects.create" => ProjectsCreate,
            "snippets.list" => SnippetsList,
            "snippets.get" => SnippetsGet,
            "snippets.create" => SnippetsCreate,
            "snippets.analysis" => SnippetsAnalysis,
            "chat.sendMessage" => ChatSendMessage,
            "chat.getHistory" => ChatGetHistory,
            _ => return None,
        })
    }

    pub(super) fn kind(self) -> Kind {
        use Procedure::*;
        match self {
            SystemHealth | AuthMe | ProjectsList | SnippetsList | SnippetsGet | SnippetsAnalysis
            | ChatGetHistory => Kind::Query,
            RefactorCode | GenerateCode | Chat => Kind::Subscription,
            AuthLogout | AnalyzeCode | CodeAnalyzeCode | CodeRefactorCode | ProjectsCreate
            | SnippetsCreate | ChatSendMessage => Kind::Mutation,
        }
    }

    pub(super) fn requires_auth(self) -> bool {
        use Procedure::*;
        !matches!(
            self,
            SystemHealth | AuthMe | AuthLogout | AnalyzeCode | RefactorCode | GenerateCode | Chat
        )
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ErrorCode {
    BadRequest,
    Unauthorized,
    NotFound,
    MethodNotSupported,
    InternalServerError,
}

impl ErrorCode {
    fn name(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::MethodNotSupported => "METHOD_NOT_SUPPORTED",
            ErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
        }
    }

    /// JSON-RPC style numeric code.
    fn json_rpc(self) -> i32 {
        match self {
            ErrorCode::BadRequest => -32600,
            ErrorCode::Unauthorized => -32001,
            ErrorCode::NotFound => -32004,
            ErrorCode::MethodNotSupported => -32005,
            ErrorCode::InternalServerError => -32603,
        }
    }

    fn status(self) -> StatusCode {
        match self {
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::MethodNotSupported => StatusCode::METHOD_NOT_ALLOWED,
            ErrorCode::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug)]
pub(super) struct RpcError {
    code: ErrorCode,
    message: String,
    path: String,
}

impl RpcError {
    fn new(code: ErrorCode, path: &str, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), path: path.to_string() }
    }

    fn internal(path: &str, message: impl std::fmt::Display) -> Self {
        Self::new(ErrorCode::InternalServerError, path, message.to_string())
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        match self.code {
            ErrorCode::InternalServerError => {
                error!(path = %self.path, message = %self.message, "rpc error")
            }
            code => warn!(path = %self.path, code = code.name(), message = %self.message, "rpc error"),
        }
        let status = self.code.status();
        let body = json!({
            "error": {
                "message": self.message,
                "code": self.code.json_rpc(),
                "data": {
                    "code": self.code.name(),
                    "httpStatus": status.as_u16(),
                    "path": self.path,
                }
            }
        });
        (status, Json(body)).into_response()
    }
}

// ── Inputs ────────────────────────────────────────────────────────────────────

fn default_language() -> String {
    "javascript".to_string()
}

#[derive(Debug, Deserialize)]
struct AnalyzeInput {
    code: String,
    #[serde(default = "default_language")]
    language: String,
}

#[derive(Debug, Deserialize)]
struct RefactorInput {
    code: String,
    #[serde(default = "default_language")]
    language: String,
    #[serde(default)]
    strategy: Strategy,
}

#[derive(Debug, Deserialize)]
struct GenerateInput {
    prompt: String,
    #[serde(default = "default_language")]
    language: String,
}

#[derive(Debug, Deserialize)]
struct ChatInput {
    message: String,
    #[serde(default)]
    history: Vec<HistoryMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CodeAnalyzeInput {
    code: String,
    #[serde(default = "default_language")]
    language: String,
    analysis_type: AnalysisType,
    #[serde(default)]
    snippet_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct CodeRefactorInput {
    code: String,
    #[serde(default = "default_language")]
    language: String,
}

#[derive(Debug, Deserialize)]
struct ProjectCreateInput {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "default_language")]
    language: String,
}

#[derive(Debug, Deserialize)]
struct SnippetGetInput {
    id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnippetCreateInput {
    project_id: i64,
    title: String,
    code: String,
    #[serde(default = "default_language")]
    language: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnippetAnalysisInput {
    snippet_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageInput {
    message: String,
    #[serde(default)]
    snippet_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryInput {
    #[serde(default)]
    snippet_id: Option<i64>,
}

fn decode<T: DeserializeOwned>(path: &str, input: Value) -> Result<T, RpcError> {
    serde_json::from_value(input).map_err(|e| RpcError::new(ErrorCode::BadRequest, path, e.to_string()))
}

fn require_non_empty(path: &str, value: &str, message: &str) -> Result<(), RpcError> {
    if value.is_empty() {
        return Err(RpcError::new(ErrorCode::BadRequest, path, message));
    }
    Ok(())
}

/// Missing input (absent query param or empty body) means `{}`.
fn parse_input(path: &str, raw: Option<&[u8]>) -> Result<Value, RpcError> {
    match raw {
        None => Ok(json!({})),
        Some(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(json!({})),
        Some(bytes) => {
            let value: Value = serde_json::from_slice(bytes).map_err(|e| {
                RpcError::new(ErrorCode::BadRequest, path, format!("invalid JSON input: {e}"))
            })?;
            Ok(if value.is_null() { json!({}) } else { value })
        }
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// Successful call: the `data` payload plus an optional `Set-Cookie`.
struct RpcOutput {
    data: Value,
    set_cookie: Option<String>,
}

impl RpcOutput {
    fn data(data: Value) -> Self {
        Self { data, set_cookie: None }
    }
}

impl IntoResponse for RpcOutput {
    fn into_response(self) -> Response {
        let mut resp = Json(json!({ "result": { "data": self.data } })).into_response();
        if let Some(cookie) = self.set_cookie.and_then(|c| HeaderValue::from_str(&c).ok()) {
            resp.headers_mut().insert(header::SET_COOKIE, cookie);
        }
        resp
    }
}

/// GET /api/trpc/{procedure} — queries and subscriptions.
pub(super) async fn get_procedure(
    State(state): State<AxumState>,
    Path(path): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let request_id = uuid::Uuid::new_v4();
    let span = info_span!("rpc", procedure = %path, %request_id, method = "GET");
    async move {
        let procedure = match resolve(&path, Kind::Query) {
            Ok(p) => p,
            Err(e) => return e.into_response(),
        };
        let input = match parse_input(&path, params.get("input").map(|s| s.as_bytes())) {
            Ok(v) => v,
            Err(e) => return e.into_response(),
        };
        let user = match authorize(&state, procedure, &path, &headers).await {
            Ok(u) => u,
            Err(e) => return e.into_response(),
        };

        let result = if procedure.kind() == Kind::Subscription {
            subscribe(&state, procedure, &path, input).map(IntoResponse::into_response)
        } else {
            call(&state, procedure, &path, user, input, &headers)
                .await
                .map(IntoResponse::into_response)
        };
        result.unwrap_or_else(IntoResponse::into_response)
    }
    .instrument(span)
    .await
}

/// POST /api/trpc/{procedure} — mutations.
pub(super) async fn post_procedure(
    State(state): State<AxumState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = uuid::Uuid::new_v4();
    let span = info_span!("rpc", procedure = %path, %request_id, method = "POST");
    async move {
        let procedure = match resolve(&path, Kind::Mutation) {
            Ok(p) => p,
            Err(e) => return e.into_response(),
        };
        let input = match parse_input(&path, (!body.is_empty()).then_some(&body[..])) {
            Ok(v) => v,
            Err(e) => return e.into_response(),
        };
        let user = match authorize(&state, procedure, &path, &headers).await {
            Ok(u) => u,
            Err(e) => return e.into_response(),
        };

        call(&state, procedure, &path, user, input, &headers)
            .await
            .map(IntoResponse::into_response)
            .unwrap_or_else(IntoResponse::into_response)
    }
    .instrument(span)
    .await
}

/// Look up the procedure and check it may be called with this HTTP method.
/// `GET` carries queries and subscriptions; `POST` carries mutations.
fn resolve(path: &str, method_kind: Kind) -> Result<Procedure, RpcError> {
    let procedure = Procedure::parse(path).ok_or_else(|| {
        RpcError::new(ErrorCode::NotFound, path, format!("No procedure found on path \"{path}\""))
    })?;
    let allowed = match method_kind {
        Kind::Mutation => procedure.kind() == Kind::Mutation,
        _ => procedure.kind() != Kind::Mutation,
    };
    if !allowed {
        return Err(RpcError::new(
            ErrorCode::MethodNotSupported,
            path,
            format!("Unsupported HTTP method for procedure \"{path}\""),
        ));
    }
    Ok(procedure)
}

async fn authorize(
    state: &AxumState,
    procedure: Procedure,
    path: &str,
    headers: &HeaderMap,
) -> Result<Option<User>, RpcError> {
    let user = state.comms.current_user(headers).await;
    if procedure.requires_auth() && user.is_none() {
        return Err(RpcError::new(ErrorCode::Unauthorized, path, "Please login (10001)"));
    }
    if let Some(u) = &user {
        debug!(user_id = u.id, "authenticated request");
    }
    Ok(user)
}

fn signed_in<'a>(user: &'a Option<User>, path: &str) -> Result<&'a User, RpcError> {
    user.as_ref()
        .ok_or_else(|| RpcError::new(ErrorCode::Unauthorized, path, "Please login (10001)"))
}

fn to_value<T: serde::Serialize>(path: &str, value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal(path, e))
}

/// Run a query or mutation.
async fn call(
    state: &AxumState,
    procedure: Procedure,
    path: &str,
    user: Option<User>,
    input: Value,
    headers: &HeaderMap,
) -> Result<RpcOutput, RpcError> {
    let comms = &state.comms;
    let store = comms.store();

    let data = match procedure {
        Procedure::SystemHealth => json!({
            "ok": true,
            "provider": comms.provider(),
            "model": comms.model(),
        }),

        Procedure::AuthMe => to_value(path, &user)?,

        Procedure::AuthLogout => {
            let cookie = comms.sessions().clear_cookie(is_secure_request(headers));
            return Ok(RpcOutput { data: json!({ "success": true }), set_cookie: Some(cookie) });
        }

        Procedure::AnalyzeCode => {
            let input: AnalyzeInput = decode(path, input)?;
            require_non_empty(path, &input.code, "Code is required")?;
            let analysis = comms
                .assistant()
                .analyze_code(&input.code, &input.language)
                .await
                .map_err(|e| RpcError::internal(path, e))?;
            to_value(path, analysis)?
        }

        Procedure::CodeAnalyzeCode => {
            let user = signed_in(&user, path)?;
            let input: CodeAnalyzeInput = decode(path, input)?;
            let outcome = comms
                .assistant()
                .review_code(
                    user.id,
                    ReviewRequest {
                        code: input.code,
                        language: input.language,
                        analysis_type: input.analysis_type,
                        snippet_id: input.snippet_id,
                    },
                )
                .await;
            to_value(path, outcome)?
        }

        Procedure::CodeRefactorCode => {
            signed_in(&user, path)?;
            let input: CodeRefactorInput = decode(path, input)?;
            let outcome = comms.assistant().refactor_once(&input.code, &input.language).await;
            to_value(path, outcome)?
        }

        Procedure::ProjectsList => {
            let user_id = signed_in(&user, path)?.id;
            let projects = store
                .run(move |s| s.list_projects(user_id))
                .await
                .map_err(|e| RpcError::internal(path, e))?;
            to_value(path, projects)?
        }

        Procedure::ProjectsCreate => {
            let user_id = signed_in(&user, path)?.id;
            let input: ProjectCreateInput = decode(path, input)?;
            require_non_empty(path, &input.name, "Name is required")?;
            let project = NewProject {
                name: input.name,
                description: input.description,
                language: input.language,
            };
            let created = store
                .run(move |s| s.create_project(user_id, project))
                .await
                .map_err(|e| RpcError::internal(path, e))?;
            to_value(path, created)?
        }

        Procedure::SnippetsList => {
            let user_id = signed_in(&user, path)?.id;
            let snippets = store
                .run(move |s| s.list_snippets(user_id))
                .await
                .map_err(|e| RpcError::internal(path, e))?;
            to_value(path, snippets)?
        }

        Procedure::SnippetsGet => {
            let user_id = signed_in(&user, path)?.id;
            let SnippetGetInput { id } = decode(path, input)?;
            let snippet = store
                .run(move |s| s.get_snippet(id, user_id))
                .await
                .map_err(|e| RpcError::internal(path, e))?
                .ok_or_else(|| RpcError::new(ErrorCode::NotFound, path, "Snippet not found"))?;
            to_value(path, snippet)?
        }

        Procedure::SnippetsCreate => {
            let user_id = signed_in(&user, path)?.id;
            let input: SnippetCreateInput = decode(path, input)?;
            require_non_empty(path, &input.title, "Title is required")?;
            let snippet = NewSnippet {
                project_id: input.project_id,
                title: input.title,
                code: input.code,
                language: input.language,
            };
            let created = store
                .run(move |s| s.create_snippet(user_id, snippet))
                .await
                .map_err(|e| RpcError::internal(path, e))?;
            to_value(path, created)?
        }

        Procedure::SnippetsAnalysis => {
            let user_id = signed_in(&user, path)?.id;
            let SnippetAnalysisInput { snippet_id } = decode(path, input)?;
            let results = store
                .run(move |s| s.list_analysis(snippet_id, user_id))
                .await
                .map_err(|e| RpcError::internal(path, e))?;
            to_value(path, results)?
        }

        Procedure::ChatSendMessage => {
            let user_id = signed_in(&user, path)?.id;
            let input: SendMessageInput = decode(path, input)?;
            require_non_empty(path, &input.message, "Message is required")?;
            let reply = comms
                .assistant()
                .send_message(user_id, &input.message, input.snippet_id)
                .await;
            to_value(path, reply)?
        }

        Procedure::ChatGetHistory => {
            let user_id = signed_in(&user, path)?.id;
            let HistoryInput { snippet_id } = decode(path, input)?;
            let history = store
                .run(move |s| s.chat_history(user_id, snippet_id))
                .await
                .map_err(|e| RpcError::internal(path, e))?;
            to_value(path, history)?
        }

        Procedure::RefactorCode | Procedure::GenerateCode | Procedure::Chat => {
            return Err(RpcError::new(
                ErrorCode::MethodNotSupported,
                path,
                "subscriptions are served over event-stream",
            ));
        }
    };

    Ok(RpcOutput::data(data))
}

/// Validate a subscription's input and build its completion request.
fn subscription_request(
    procedure: Procedure,
    path: &str,
    input: Value,
) -> Result<CompletionRequest, RpcError> {
    match procedure {
        Procedure::RefactorCode => {
            let input: RefactorInput = decode(path, input)?;
            require_non_empty(path, &input.code, "Code is required")?;
            Ok(assistant::refactor_request(&input.code, &input.language, input.strategy))
        }
        Procedure::GenerateCode => {
            let input: GenerateInput = decode(path, input)?;
            require_non_empty(path, &input.prompt, "Prompt is required")?;
            Ok(assistant::generate_request(&input.prompt, &input.language))
        }
        Procedure::Chat => {
            let input: ChatInput = decode(path, input)?;
            require_non_empty(path, &input.message, "Message is required")?;
            Ok(assistant::chat_request(&input.message, &input.history))
        }
        _ => Err(RpcError::new(ErrorCode::MethodNotSupported, path, "not a subscription")),
    }
}

/// Answer a subscription with an event stream of `{chunk, done}` items.
/// A provider failure becomes a final `error` event.
fn subscribe(
    state: &AxumState,
    procedure: Procedure,
    path: &str,
    input: Value,
) -> Result<Sse<impl futures_util::Stream<Item = Result<Event, Infallible>> + use<>>, RpcError> {
    let request = subscription_request(procedure, path, input)?;
    debug!(messages = request.messages.len(), "subscription started");

    let rx = state.comms.assistant().stream(request);
    let events = ReceiverStream::new(rx).map(|ev| {
        let event = match ev {
            StreamEvent::Chunk(chunk) => Event::default()
                .data(serde_json::to_string(&chunk).unwrap_or_else(|_| "{}".to_string())),
            StreamEvent::Failed(message) => Event::default()
                .event("error")
                .data(json!({ "message": message }).to_string()),
        };
        Ok::<_, Infallible>(event)
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
