//! `/api/oauth/*` — sign-in redirect and OAuth callback.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::subsystems::auth::{self, decode_state};
use crate::subsystems::comms::{is_secure_request, request_origin};
use crate::subsystems::store::{User, UserUpsert, now_iso8601};

use super::AxumState;
use super::api::json_error;

const CALLBACK_PATH: &str = "/api/oauth/callback";

#[derive(Debug, Deserialize)]
pub(super) struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
}

fn redirect(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// GET /api/oauth/login — send the browser to the portal.
pub(super) async fn login(State(state): State<AxumState>, headers: HeaderMap) -> Response {
    let redirect_uri = format!("{}{CALLBACK_PATH}", request_origin(&headers));
    let comms = &state.comms;
    match auth::login_url(comms.oauth_portal_url(), comms.app_id(), &redirect_uri) {
        Ok(url) => redirect(&url),
        Err(e) => {
            error!(error = %e, "cannot build login url");
            (StatusCode::INTERNAL_SERVER_ERROR, json_error("oauth_config", e)).into_response()
        }
    }
}

/// GET /api/oauth/callback?code&state — finish sign-in, set the session
/// cookie and return to `/`.
pub(super) async fn callback(
    State(state): State<AxumState>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Response {
    let (Some(code), Some(oauth_state)) = (params.code, params.state) else {
        return (
            StatusCode::BAD_REQUEST,
            json_error("bad_request", "code and state are required"),
        )
            .into_response();
    };

    match finish_sign_in(&state, &code, &oauth_state).await {
        Ok(user) => {
            let name = user.name.clone().unwrap_or_default();
            let sessions = state.comms.sessions();
            match sessions.sign(&user.open_id, &name) {
                Ok(token) => {
                    info!(user_id = user.id, "user signed in");
                    let cookie = sessions.session_cookie(&token, is_secure_request(&headers));
                    (
                        StatusCode::FOUND,
                        [(header::SET_COOKIE, cookie), (header::LOCATION, "/".to_string())],
                    )
                        .into_response()
                }
                Err(e) => {
                    error!(error = %e, "failed to sign session token");
                    (StatusCode::INTERNAL_SERVER_ERROR, json_error("oauth_failed", "OAuth callback failed"))
                        .into_response()
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "oauth callback failed");
            (StatusCode::INTERNAL_SERVER_ERROR, json_error("oauth_failed", "OAuth callback failed"))
                .into_response()
        }
    }
}

/// Exchange the code, fetch the profile and upsert the user row.
async fn finish_sign_in(state: &AxumState, code: &str, oauth_state: &str) -> Result<User, AppError> {
    let redirect_uri = decode_state(oauth_state).map_err(|e| AppError::Auth(e.to_string()))?;
    let oauth = state.comms.oauth();

    let access_token = oauth
        .exchange_code(code, &redirect_uri)
        .await
        .map_err(|e| AppError::Auth(e.to_string()))?;
    let info = oauth
        .user_info(&access_token)
        .await
        .map_err(|e| AppError::Auth(e.to_string()))?;

    let upsert = UserUpsert {
        open_id: info.open_id.clone(),
        name: info.name.clone(),
        email: info.email.clone(),
        login_method: info.login_method(),
        role: None,
        last_signed_in: Some(now_iso8601()),
    };
    state.comms.store().run(move |s| s.upsert_user(upsert)).await
}
