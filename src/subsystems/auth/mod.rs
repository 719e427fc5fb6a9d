//! Sessions and OAuth sign-in.
//!
//! A session is an HS256 JWT carried in an `HttpOnly` cookie. The OAuth
//! portal round trip (see [`oauth`]) ends by upserting the user and issuing
//! such a token. Resolving a request to a user never fails loudly: any
//! problem with the cookie simply yields an anonymous request.

pub mod oauth;

use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AuthConfig;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("session token error: {0}")]
    Token(String),
    #[error("invalid oauth state")]
    InvalidState,
    #[error("oauth request failed: {0}")]
    OAuth(String),
}

/// JWT payload of a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    pub open_id: String,
    pub app_id: String,
    pub name: String,
    pub exp: u64,
}

/// Issues, verifies and (de)serializes session cookies.
#[derive(Clone)]
pub struct Sessions {
    encoding: EncodingKey,
    decoding: DecodingKey,
    app_id: String,
    cookie_name: String,
    ttl_secs: u64,
}

impl std::fmt::Debug for Sessions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sessions")
            .field("app_id", &self.app_id)
            .field("cookie_name", &self.cookie_name)
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl Sessions {
    pub fn new(secret: &str, auth: &AuthConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            app_id: auth.app_id.clone(),
            cookie_name: auth.cookie_name.clone(),
            ttl_secs: u64::from(auth.session_ttl_days) * 24 * 60 * 60,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Sign a session token for `open_id` valid for the configured TTL.
    pub fn sign(&self, open_id: &str, name: &str) -> Result<String, AuthError> {
        let claims = SessionClaims {
            open_id: open_id.to_string(),
            app_id: self.app_id.clone(),
            name: name.to_string(),
            exp: unix_now() + self.ttl_secs,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Token(e.to_string()))
    }

    /// Verify signature and expiry; the token must name a non-empty openId.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let data = decode::<SessionClaims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| AuthError::Token(e.to_string()))?;
        if data.claims.open_id.is_empty() {
            return Err(AuthError::Token("missing openId".into()));
        }
        Ok(data.claims)
    }

    /// `Set-Cookie` value carrying `token`.
    pub fn session_cookie(&self, token: &str, secure: bool) -> String {
        cookie(&self.cookie_name, token, self.ttl_secs, secure)
    }

    /// `Set-Cookie` value that removes the session cookie.
    pub fn clear_cookie(&self, secure: bool) -> String {
        cookie(&self.cookie_name, "", 0, secure)
    }

    /// Pull the session token out of a `Cookie` request header.
    pub fn token_from_cookie_header<'a>(&self, header: &'a str) -> Option<&'a str> {
        header.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == self.cookie_name && !value.is_empty()).then_some(value)
        })
    }
}

fn cookie(name: &str, value: &str, max_age: u64, secure: bool) -> String {
    let mut c = format!("{name}={value}; Path=/; HttpOnly; SameSite=None; Max-Age={max_age}");
    if secure {
        c.push_str("; Secure");
    }
    c
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// OAuth `state` parameter: the base64 of the redirect URI.
pub fn encode_state(redirect_uri: &str) -> String {
    STANDARD.encode(redirect_uri)
}

pub fn decode_state(state: &str) -> Result<String, AuthError> {
    let bytes = STANDARD.decode(state).map_err(|_| AuthError::InvalidState)?;
    String::from_utf8(bytes).map_err(|_| AuthError::InvalidState)
}

/// Portal URL that starts the sign-in flow and returns to `redirect_uri`.
pub fn login_url(portal: &str, app_id: &str, redirect_uri: &str) -> Result<String, AuthError> {
    let base = format!("{}/app-auth", portal.trim_end_matches('/'));
    let state = encode_state(redirect_uri);
    let url = reqwest::Url::parse_with_params(
        &base,
        &[
            ("appId", app_id),
            ("redirectUri", redirect_uri),
            ("state", state.as_str()),
            ("type", "signIn"),
        ],
    )
    .map_err(|e| AuthError::OAuth(format!("invalid portal url '{portal}': {e}")))?;
    Ok(url.to_string())
}
