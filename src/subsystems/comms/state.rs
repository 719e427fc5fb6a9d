//! Shared state for the HTTP channel — capability boundary for handlers.
//!
//! Handlers receive an `Arc<CommsState>` and are restricted to the typed
//! methods below: the assistant (LLM + store), session handling, and the
//! OAuth client. Configuration is copied in at construction so handlers
//! never see secrets.

use axum::http::{HeaderMap, header};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::subsystems::assistant::Assistant;
use crate::subsystems::auth::Sessions;
use crate::subsystems::auth::oauth::OAuthClient;
use crate::subsystems::store::{Store, User};

pub struct CommsState {
    assistant: Assistant,
    sessions: Sessions,
    oauth: OAuthClient,
    provider: String,
    model: String,
    app_id: String,
    oauth_portal_url: String,
}

impl CommsState {
    pub fn new(config: &Config, assistant: Assistant) -> Result<Self, AppError> {
        let secret = match &config.jwt_secret {
            Some(s) => s.clone(),
            None => {
                warn!("JWT_SECRET not set — sessions will not survive a restart");
                uuid::Uuid::new_v4().to_string()
            }
        };

        let oauth = OAuthClient::new(&config.auth.oauth_server_url, &config.auth.app_id)
            .map_err(|e| AppError::Auth(e.to_string()))?;

        Ok(Self {
            assistant,
            sessions: Sessions::new(&secret, &config.auth),
            oauth,
            provider: config.llm.provider.clone(),
            model: config.llm.active_model().to_string(),
            app_id: config.auth.app_id.clone(),
            oauth_portal_url: config.auth.oauth_portal_url.clone(),
        })
    }

    pub fn assistant(&self) -> &Assistant {
        &self.assistant
    }

    pub fn store(&self) -> &Store {
        self.assistant.store()
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    pub fn oauth(&self) -> &OAuthClient {
        &self.oauth
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn oauth_portal_url(&self) -> &str {
        &self.oauth_portal_url
    }

    /// Resolve the signed-in user from the request's session cookie.
    ///
    /// Missing cookie, bad token, unknown user and store errors all yield
    /// `None`: an anonymous request.
    pub async fn current_user(&self, headers: &HeaderMap) -> Option<User> {
        let token = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|h| self.sessions.token_from_cookie_header(h))?;

        let claims = match self.sessions.verify(token) {
            Ok(c) => c,
            Err(e) => {
                debug!(error = %e, "session cookie rejected");
                return None;
            }
        };

        let open_id = claims.open_id;
        match self.store().run(move |s| s.get_user_by_open_id(&open_id)).await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "session user lookup failed");
                None
            }
        }
    }
}

/// `true` when the request reached us over HTTPS, directly or via a proxy.
pub fn is_secure_request(headers: &HeaderMap) -> bool {
    headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').any(|p| p.trim().eq_ignore_ascii_case("https")))
        .unwrap_or(false)
}

/// `scheme://host` of the request, for building absolute callback URLs.
pub fn request_origin(headers: &HeaderMap) -> String {
    let scheme = if is_secure_request(headers) { "https" } else { "http" };
    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get(header::HOST))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{scheme}://{host}")
}
