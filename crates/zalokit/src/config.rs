//! Application configuration
//!
//! Immutable settings consumed at client construction: app credentials,
//! OAuth redirect, token storage location, and endpoint/timeout overrides.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Production OAuth endpoint base
pub const DEFAULT_OAUTH_BASE_URL: &str = "https://oauth.zaloapp.com/v4";

/// Production Open API endpoint base
pub const DEFAULT_API_BASE_URL: &str = "https://openapi.zalo.me";

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default early-refresh window: a token is treated as stale this many
/// seconds before its recorded expiry
pub const DEFAULT_REFRESH_THRESHOLD_SECS: i64 = 60;

/// Application configuration, immutable after client construction
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Zalo application id
    pub app_id: String,
    /// Zalo application secret
    pub app_secret: String,
    /// OAuth redirect URI; required only for authorization-URL construction
    pub redirect_uri: Option<String>,
    /// Path for durable token persistence; no persistence when unset
    pub token_storage_path: Option<PathBuf>,
    /// OAuth endpoint base, overridable for tests
    pub oauth_base_url: String,
    /// Open API endpoint base, overridable for tests
    pub api_base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Seconds before recorded expiry at which a token counts as stale
    pub refresh_threshold_secs: i64,
}

impl AppConfig {
    /// Create a configuration from app credentials
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if either credential is empty
    pub fn new(app_id: impl Into<String>, app_secret: impl Into<String>) -> Result<Self> {
        let app_id = app_id.into();
        let app_secret = app_secret.into();

        if app_id.trim().is_empty() {
            return Err(Error::Configuration("app_id must not be empty".into()));
        }
        if app_secret.trim().is_empty() {
            return Err(Error::Configuration("app_secret must not be empty".into()));
        }

        Ok(Self {
            app_id,
            app_secret,
            redirect_uri: None,
            token_storage_path: None,
            oauth_base_url: DEFAULT_OAUTH_BASE_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            refresh_threshold_secs: DEFAULT_REFRESH_THRESHOLD_SECS,
        })
    }

    /// Load configuration from the environment
    ///
    /// Reads `ZALO_APP_ID` and `ZALO_APP_SECRET` (required) plus
    /// `ZALO_REDIRECT_URI` and `ZALO_TOKEN_STORAGE_PATH` (optional).
    /// A `.env` file is honoured when present. Values are validated for
    /// presence only.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if a required variable is missing
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let app_id = require_env("ZALO_APP_ID")?;
        let app_secret = require_env("ZALO_APP_SECRET")?;

        let mut config = Self::new(app_id, app_secret)?;
        config.redirect_uri = std::env::var("ZALO_REDIRECT_URI").ok().filter(|v| !v.is_empty());
        config.token_storage_path = std::env::var("ZALO_TOKEN_STORAGE_PATH")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Ok(config)
    }

    /// Set the OAuth redirect URI
    #[must_use]
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    /// Set the token storage path
    #[must_use]
    pub fn with_token_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_storage_path = Some(path.into());
        self
    }

    /// Override the OAuth endpoint base
    #[must_use]
    pub fn with_oauth_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.oauth_base_url = trim_trailing_slash(base_url.into());
        self
    }

    /// Override the Open API endpoint base
    #[must_use]
    pub fn with_api_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api_base_url = trim_trailing_slash(base_url.into());
        self
    }

    /// Override the per-request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the early-refresh window
    #[must_use]
    pub fn with_refresh_threshold_secs(mut self, seconds: i64) -> Self {
        self.refresh_threshold_secs = seconds;
        self
    }
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Configuration(format!("environment variable {name} is not set")))
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}
