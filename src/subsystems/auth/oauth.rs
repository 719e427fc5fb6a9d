//! Server-to-server calls of the OAuth provider: trade an authorization
//! code for an access token, then fetch the signed-in user's profile.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::AuthError;

const EXCHANGE_TOKEN_PATH: &str = "/webdev.v1.WebDevAuthPublicService/ExchangeToken";
const GET_USER_INFO_PATH: &str = "/webdev.v1.WebDevAuthPublicService/GetUserInfo";

/// Profile returned by the provider for an access token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthUserInfo {
    pub open_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub login_method: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
}

impl OAuthUserInfo {
    /// `loginMethod`, falling back to `platform` for older providers.
    pub fn login_method(&self) -> Option<String> {
        self.login_method.clone().or_else(|| self.platform.clone())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeTokenRequest<'a> {
    client_id: &'a str,
    grant_type: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeTokenResponse {
    access_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GetUserInfoRequest<'a> {
    access_token: &'a str,
}

#[derive(Debug, Clone)]
pub struct OAuthClient {
    client: Client,
    server_url: String,
    app_id: String,
}

impl OAuthClient {
    pub fn new(server_url: &str, app_id: &str) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AuthError::OAuth(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
            app_id: app_id.to_string(),
        })
    }

    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String, AuthError> {
        let body = ExchangeTokenRequest {
            client_id: &self.app_id,
            grant_type: "authorization_code",
            code,
            redirect_uri,
        };
        let resp: ExchangeTokenResponse = self.post(EXCHANGE_TOKEN_PATH, &body).await?;
        debug!("oauth code exchanged for access token");
        Ok(resp.access_token)
    }

    pub async fn user_info(&self, access_token: &str) -> Result<OAuthUserInfo, AuthError> {
        let info: OAuthUserInfo =
            self.post(GET_USER_INFO_PATH, &GetUserInfoRequest { access_token }).await?;
        if info.open_id.is_empty() {
            return Err(AuthError::OAuth("provider returned an empty openId".into()));
        }
        Ok(info)
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, AuthError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{path}", self.server_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AuthError::OAuth(format!("{path}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(%status, path, "oauth provider returned an error");
            return Err(AuthError::OAuth(format!("{path}: HTTP {status}: {text}")));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| AuthError::OAuth(format!("{path}: bad response body: {e}")))
    }
}
