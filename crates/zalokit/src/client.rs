//! The client facade
//!
//! Wires configuration, the token manager, the request executor, and the
//! endpoint modules into one entry point. All multi-recipient semantics
//! stay inside the batch dispatcher; the facade only delegates.

use std::sync::Arc;

use tracing::info;

use crate::api::{BatchDispatcher, RequestExecutor, DEFAULT_BATCH_CONCURRENCY};
use crate::auth::{
    Credential, FileTokenStore, OAuthApi, OAuthClient, PkceChallenge, RefreshHook, TokenManager,
    TokenStore,
};
use crate::config::AppConfig;
use crate::contacts::ContactsApi;
use crate::error::{Error, Result};
use crate::groups::GroupsApi;
use crate::messaging::MessagingApi;

/// Client for the Zalo Official Account API
///
/// # Example
///
/// ```no_run
/// use zalokit::{AppConfig, ZaloClient};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = AppConfig::new("app-id", "app-secret")?
///         .with_redirect_uri("https://example.com/callback")
///         .with_token_storage_path("/var/lib/myapp/zalo-tokens.json");
///
///     let client = ZaloClient::builder().config(config).build().await?;
///
///     // After completing the OAuth flow in a browser:
///     client.authenticate("authorization-code", None).await?;
///
///     client.messaging().send_text("user-id", "Hello from ZaloKit!", None).await?;
///     Ok(())
/// }
/// ```
pub struct ZaloClient {
    tokens: Arc<TokenManager>,
    executor: Arc<RequestExecutor>,
    messaging: MessagingApi,
    contacts: ContactsApi,
    groups: GroupsApi,
}

impl ZaloClient {
    /// Start building a client
    #[must_use]
    pub fn builder() -> ZaloClientBuilder {
        ZaloClientBuilder::default()
    }

    /// Build a client from environment variables
    ///
    /// Reads `ZALO_APP_ID`, `ZALO_APP_SECRET`, and the optional
    /// `ZALO_REDIRECT_URI`, `ZALO_TOKEN_STORAGE_PATH`, `ZALO_ACCESS_TOKEN`,
    /// and `ZALO_REFRESH_TOKEN`.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] when required variables are missing
    pub async fn from_env() -> Result<Self> {
        let config = AppConfig::from_env()?;

        let mut builder = Self::builder().config(config);
        if let Ok(access_token) = std::env::var("ZALO_ACCESS_TOKEN") {
            if !access_token.is_empty() {
                let refresh_token =
                    std::env::var("ZALO_REFRESH_TOKEN").ok().filter(|v| !v.is_empty());
                builder = builder.access_token(access_token, refresh_token);
            }
        }

        builder.build().await
    }

    // ==== Authentication ====

    /// The token manager backing this client
    #[must_use]
    pub fn auth(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Build the authorization URL the end user must visit
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if no redirect URI is configured
    pub fn authorization_url(
        &self,
        state: &str,
        pkce: Option<&PkceChallenge>,
    ) -> Result<String> {
        self.tokens.authorization_url(state, pkce)
    }

    /// Complete the OAuth flow with an authorization code
    ///
    /// # Errors
    /// Returns [`Error::Authentication`] if the code is rejected
    pub async fn authenticate(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Credential> {
        self.tokens.exchange_code(code, code_verifier).await
    }

    /// Inject a pre-existing access token
    ///
    /// # Errors
    /// Returns [`Error::Validation`] for an empty token and
    /// [`Error::Storage`] if persistence fails
    pub async fn set_access_token(
        &self,
        access_token: impl Into<String> + Send,
        refresh_token: Option<String>,
    ) -> Result<()> {
        self.tokens.set_access_token(access_token, refresh_token).await
    }

    /// Force a token refresh
    ///
    /// # Errors
    /// See [`TokenManager::refresh`]
    pub async fn refresh_token(&self) -> Result<Credential> {
        self.tokens.refresh().await
    }

    /// Whether a credential is present
    pub async fn is_authenticated(&self) -> bool {
        self.tokens.is_authenticated().await
    }

    /// Clear the credential and any persisted state
    ///
    /// # Errors
    /// Returns [`Error::Storage`] if persisted state cannot be removed
    pub async fn logout(&self) -> Result<()> {
        self.tokens.logout().await
    }

    // ==== API surfaces ====

    /// Messaging operations
    #[must_use]
    pub fn messaging(&self) -> &MessagingApi {
        &self.messaging
    }

    /// Contact operations
    #[must_use]
    pub fn contacts(&self) -> &ContactsApi {
        &self.contacts
    }

    /// Group operations
    #[must_use]
    pub fn groups(&self) -> &GroupsApi {
        &self.groups
    }

    /// The underlying request executor, for endpoints this SDK does not
    /// wrap
    #[must_use]
    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.executor
    }
}

/// Builder for [`ZaloClient`]
#[derive(Default)]
pub struct ZaloClientBuilder {
    config: Option<AppConfig>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    on_token_refresh: Option<RefreshHook>,
    broadcast_concurrency: Option<usize>,
    token_store: Option<Arc<dyn TokenStore>>,
    oauth: Option<Arc<dyn OAuthApi>>,
}

impl ZaloClientBuilder {
    /// Set the application configuration (required)
    #[must_use]
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Start from a pre-existing access token (and optional refresh token)
    #[must_use]
    pub fn access_token(
        mut self,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
    ) -> Self {
        self.access_token = Some(access_token.into());
        self.refresh_token = refresh_token;
        self
    }

    /// Register a hook invoked after every successful token refresh
    #[must_use]
    pub fn on_token_refresh<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Credential) + Send + Sync + 'static,
    {
        self.on_token_refresh = Some(Arc::new(hook));
        self
    }

    /// Bound the number of in-flight recipient operations in broadcasts
    #[must_use]
    pub fn broadcast_concurrency(mut self, concurrency: usize) -> Self {
        self.broadcast_concurrency = Some(concurrency);
        self
    }

    /// Inject a token store, overriding the file store derived from the
    /// configured storage path
    #[must_use]
    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    /// Inject an OAuth transport, overriding the production client
    #[must_use]
    pub fn oauth_api(mut self, oauth: Arc<dyn OAuthApi>) -> Self {
        self.oauth = Some(oauth);
        self
    }

    /// Build the client
    ///
    /// Loads any persisted credential, then installs an injected token if
    /// one was provided (the injected token wins).
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] when no configuration was set or
    /// construction fails, and [`Error::Storage`] if an injected token
    /// cannot be persisted
    pub async fn build(self) -> Result<ZaloClient> {
        let config = self
            .config
            .ok_or_else(|| Error::Configuration("app configuration not set".into()))?;

        let oauth: Arc<dyn OAuthApi> = match self.oauth {
            Some(oauth) => oauth,
            None => Arc::new(OAuthClient::new(config.clone())?),
        };

        let store: Option<Arc<dyn TokenStore>> = self.token_store.or_else(|| {
            config
                .token_storage_path
                .as_ref()
                .map(|path| Arc::new(FileTokenStore::new(path)) as Arc<dyn TokenStore>)
        });

        let tokens =
            Arc::new(TokenManager::new(oauth, store, config.refresh_threshold_secs));
        tokens.initialize().await;

        if let Some(hook) = self.on_token_refresh {
            tokens.on_token_refresh(hook).await;
        }

        if let Some(access_token) = self.access_token {
            tokens.set_access_token(access_token, self.refresh_token).await?;
        }

        let executor = Arc::new(RequestExecutor::new(&config, tokens.clone())?);
        let dispatcher = BatchDispatcher::new(
            self.broadcast_concurrency.unwrap_or(DEFAULT_BATCH_CONCURRENCY),
        );

        info!(app_id = %crate::utils::mask_sensitive(&config.app_id, 4), "client initialized");

        Ok(ZaloClient {
            tokens: tokens.clone(),
            executor: executor.clone(),
            messaging: MessagingApi::new(executor.clone(), dispatcher),
            contacts: ContactsApi::new(executor.clone()),
            groups: GroupsApi::new(executor),
        })
    }
}
