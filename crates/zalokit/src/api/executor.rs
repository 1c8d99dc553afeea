//! Authenticated request execution
//!
//! Wraps every outbound API call: attaches the current access token,
//! classifies error responses, refreshes-and-retries once on an
//! unauthorized response, and surfaces rate-limit signals with their
//! `retry_after`. The single 401→refresh→retry attempt is the only
//! automatic retry in the SDK.

use std::sync::Arc;

use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use super::request::{ApiRequest, ApiResponse};
use crate::auth::token_manager::TokenManager;
use crate::config::AppConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::utils::request_id;

const USER_AGENT: &str = concat!("zalokit/", env!("CARGO_PKG_VERSION"));

/// Executes endpoint-agnostic API requests with bearer authentication
pub struct RequestExecutor {
    http: Client,
    tokens: Arc<TokenManager>,
    base_url: String,
}

impl RequestExecutor {
    /// Create a new executor
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the HTTP client cannot be built
    pub fn new(config: &AppConfig, tokens: Arc<TokenManager>) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| Error::Configuration(format!("failed to build HTTP client: {err}")))?;

        Ok(Self { http, tokens, base_url: config.api_base_url.clone() })
    }

    /// The token manager backing this executor
    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Execute an API request
    ///
    /// Obtains a valid access token (refreshing proactively if the current
    /// one is stale), performs the call, and classifies the response. An
    /// unauthorized response triggers exactly one token refresh and one
    /// retry of the original request; a second rejection is surfaced as
    /// [`Error::Authentication`].
    ///
    /// # Errors
    /// See [`Error`] for the classification of failure responses.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        let id = request_id();
        let token = self.tokens.access_token().await?;

        debug!(request_id = %id, method = %request.method, path = %request.path, "api request");

        match self.attempt(&request, &token).await {
            Ok(response) => Ok(response),
            Err(err) if err.kind() == ErrorKind::Authentication => {
                warn!(request_id = %id, "unauthorized response; refreshing token and retrying once");
                let credential = self.tokens.refresh_after_rejection(&token).await?;

                self.attempt(&request, &credential.access_token).await.map_err(|retry_err| {
                    if retry_err.kind() == ErrorKind::Authentication {
                        Error::Authentication(
                            "request still unauthorized after token refresh".into(),
                        )
                    } else {
                        retry_err
                    }
                })
            }
            Err(err) => Err(err),
        }
    }

    async fn attempt(&self, request: &ApiRequest, token: &str) -> Result<ApiResponse> {
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self.http.request(request.method.clone(), &url).bearer_auth(token);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        classify(response).await
    }
}

/// Classify an HTTP response into the error taxonomy
async fn classify(response: reqwest::Response) -> Result<ApiResponse> {
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Authentication(if body.is_empty() {
            "access token rejected (401)".to_string()
        } else {
            format!("access token rejected (401): {body}")
        }));
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(rate_limited(response).await);
    }

    if status.is_client_error() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Validation(format!("request rejected ({status}): {body}")));
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Api {
            message: format!("server error ({status}): {body}"),
            code: None,
            http_status: Some(status.as_u16()),
        });
    }

    let envelope: ApiResponse = response.json().await.map_err(|err| Error::Api {
        message: format!("failed to parse response body: {err}"),
        code: None,
        http_status: Some(status.as_u16()),
    })?;

    if envelope.error != 0 {
        return Err(Error::Api {
            message: if envelope.message.is_empty() {
                format!("API request failed with code {}", envelope.error)
            } else {
                envelope.message.clone()
            },
            code: Some(envelope.error),
            http_status: Some(status.as_u16()),
        });
    }

    Ok(envelope)
}

/// Build a rate-limit error, preferring the `Retry-After` header and
/// falling back to a `retry_after` field in the JSON body. No value is
/// fabricated when the server sent none.
async fn rate_limited(response: reqwest::Response) -> Error {
    let header_retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());

    let body = response.text().await.unwrap_or_default();
    let retry_after = header_retry_after.or_else(|| {
        serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| value.get("retry_after").and_then(serde_json::Value::as_u64))
    });

    Error::RateLimit {
        retry_after,
        message: if body.is_empty() { "too many requests".to_string() } else { body },
    }
}
