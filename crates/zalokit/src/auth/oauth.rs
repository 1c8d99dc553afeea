//! OAuth 2.0 client for the platform token endpoints
//!
//! Handles authorization-URL construction, authorization-code exchange,
//! and refresh-token rotation. All token-endpoint traffic is form-encoded
//! and authenticated with the app secret.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use super::types::{Credential, OAuthErrorBody, PkceChallenge, TokenResponse};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::utils::mask_sensitive;

const USER_AGENT: &str = concat!("zalokit/", env!("CARGO_PKG_VERSION"));

/// OAuth operations, abstracted for dependency injection and testing
#[async_trait]
pub trait OAuthApi: Send + Sync {
    /// Build the authorization URL the end user must visit
    ///
    /// Deterministic, no network call. `state` is the caller-supplied
    /// anti-CSRF value echoed back on the redirect.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if no redirect URI is configured
    fn authorization_url(&self, state: &str, pkce: Option<&PkceChallenge>) -> Result<String>;

    /// Exchange an authorization code for a credential
    ///
    /// Never retried: authorization codes are single-use.
    ///
    /// # Errors
    /// Returns [`Error::Authentication`] if the code is rejected
    async fn exchange_code(&self, code: &str, code_verifier: Option<&str>) -> Result<Credential>;

    /// Exchange a refresh token for a new credential
    ///
    /// When the response omits a replacement refresh token, the one passed
    /// in is carried forward.
    ///
    /// # Errors
    /// Returns [`Error::Authentication`] if the refresh token is rejected
    async fn refresh(&self, refresh_token: &str) -> Result<Credential>;
}

/// OAuth client for the production token endpoints
#[derive(Debug, Clone)]
pub struct OAuthClient {
    config: AppConfig,
    http: Client,
}

impl OAuthClient {
    /// Create a new OAuth client
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the HTTP client cannot be built
    pub fn new(config: AppConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| Error::Configuration(format!("failed to build HTTP client: {err}")))?;

        Ok(Self { config, http })
    }

    fn token_url(&self) -> String {
        format!("{}/access_token", self.config.oauth_base_url)
    }

    fn permission_url(&self) -> String {
        format!("{}/permission", self.config.oauth_base_url)
    }

    async fn token_request(
        &self,
        form: &[(&str, &str)],
        previous_refresh_token: Option<String>,
    ) -> Result<Credential> {
        let response = self
            .http
            .post(self.token_url())
            .form(form)
            .send()
            .await
            .map_err(|err| {
                Error::Authentication(format!("network error during authentication: {err}"))
            })?;

        let status = response.status();
        let body: serde_json::Value = response.json().await.map_err(|err| {
            Error::Authentication(format!("failed to parse token endpoint response: {err}"))
        })?;

        // The token endpoint reports rejections in the body, sometimes with
        // a 200 status. An error field always wins over the HTTP status.
        if body.get("error").is_some_and(|e| !e.is_null()) {
            let message = serde_json::from_value::<OAuthErrorBody>(body.clone())
                .map_or_else(|_| body.to_string(), |parsed| parsed.to_string());
            return Err(Error::Authentication(message));
        }

        if !status.is_success() {
            return Err(Error::Authentication(format!(
                "token endpoint returned status {status}"
            )));
        }

        let token_response: TokenResponse = serde_json::from_value(body).map_err(|err| {
            Error::Authentication(format!("malformed token endpoint response: {err}"))
        })?;

        Ok(token_response.into_credential(previous_refresh_token))
    }
}

#[async_trait]
impl OAuthApi for OAuthClient {
    fn authorization_url(&self, state: &str, pkce: Option<&PkceChallenge>) -> Result<String> {
        let redirect_uri = self.config.redirect_uri.as_deref().ok_or_else(|| {
            Error::Configuration("redirect_uri is required to build an authorization URL".into())
        })?;

        let mut params = vec![
            ("app_id", self.config.app_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("state", state),
        ];

        if let Some(pkce) = pkce {
            params.push(("code_challenge", pkce.code_challenge.as_str()));
            params.push(("code_challenge_method", pkce.code_challenge_method.as_str()));
        }

        let query = params
            .iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        Ok(format!("{}?{query}", self.permission_url()))
    }

    async fn exchange_code(&self, code: &str, code_verifier: Option<&str>) -> Result<Credential> {
        let mut form = vec![
            ("app_id", self.config.app_id.as_str()),
            ("app_secret", self.config.app_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
        ];

        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier));
        }

        info!(app_id = %mask_sensitive(&self.config.app_id, 4), "exchanging authorization code");
        let credential = self.token_request(&form, None).await?;
        debug!("authorization code exchange succeeded");

        Ok(credential)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Credential> {
        if refresh_token.is_empty() {
            return Err(Error::Authentication("no refresh token available".into()));
        }

        let form = [
            ("app_id", self.config.app_id.as_str()),
            ("app_secret", self.config.app_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        info!(app_id = %mask_sensitive(&self.config.app_id, 4), "refreshing access token");
        let credential =
            self.token_request(&form, Some(refresh_token.to_string())).await?;
        debug!("refresh token exchange succeeded");

        Ok(credential)
    }
}
