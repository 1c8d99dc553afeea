//! Token lifecycle management
//!
//! Owns the authoritative in-memory credential slot: staleness decisions,
//! coalesced refresh, durable persistence, and the refresh-notification
//! hook. All reads go through [`TokenManager::access_token`]; all writes
//! go through [`TokenManager::refresh`], [`TokenManager::set_access_token`],
//! [`TokenManager::exchange_code`], or [`TokenManager::logout`].

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::oauth::OAuthApi;
use super::store::TokenStore;
use super::types::{Credential, PkceChallenge};
use crate::error::{Error, Result};

/// Callback invoked with the new credential after every successful refresh
pub type RefreshHook = Arc<dyn Fn(&Credential) + Send + Sync>;

/// The credential slot: current credential plus a generation counter.
///
/// The generation bumps on every write, letting refresh waiters detect
/// that a concurrent caller already did the work.
#[derive(Default)]
struct CredentialSlot {
    credential: Option<Credential>,
    generation: u64,
}

/// Token manager with coalesced refresh
///
/// Concurrency contract: at most one refresh is in flight at any time.
/// Callers that observe a stale token while a refresh is running wait on
/// the refresh gate and then observe that refresh's result instead of
/// issuing a duplicate network call.
pub struct TokenManager {
    oauth: Arc<dyn OAuthApi>,
    store: Option<Arc<dyn TokenStore>>,
    slot: RwLock<CredentialSlot>,
    refresh_gate: Mutex<()>,
    refresh_threshold_secs: i64,
    on_refresh: RwLock<Option<RefreshHook>>,
}

impl TokenManager {
    /// Create a new token manager
    ///
    /// # Arguments
    /// * `oauth` - OAuth transport for exchange and refresh
    /// * `store` - optional durable persistence
    /// * `refresh_threshold_secs` - seconds before recorded expiry at
    ///   which a token counts as stale
    #[must_use]
    pub fn new(
        oauth: Arc<dyn OAuthApi>,
        store: Option<Arc<dyn TokenStore>>,
        refresh_threshold_secs: i64,
    ) -> Self {
        Self {
            oauth,
            store,
            slot: RwLock::new(CredentialSlot::default()),
            refresh_gate: Mutex::new(()),
            refresh_threshold_secs,
            on_refresh: RwLock::new(None),
        }
    }

    /// Load any persisted credential into the slot
    ///
    /// Called once at client construction. Returns `true` when a stored
    /// credential was found.
    pub async fn initialize(&self) -> bool {
        let Some(store) = &self.store else { return false };

        match store.load().await {
            Some(credential) => {
                self.install(credential).await;
                info!("token manager initialized with stored credential");
                true
            }
            None => {
                debug!("no stored credential found");
                false
            }
        }
    }

    /// Register the refresh-notification hook
    ///
    /// Invoked synchronously with the new credential exactly once per
    /// successful refresh. A panicking hook is isolated and never unwinds
    /// the refresh itself.
    pub async fn on_token_refresh(&self, hook: RefreshHook) {
        *self.on_refresh.write().await = Some(hook);
    }

    /// Check whether a credential is present
    pub async fn is_authenticated(&self) -> bool {
        self.slot.read().await.credential.is_some()
    }

    /// Snapshot of the current credential, if any
    pub async fn credential(&self) -> Option<Credential> {
        self.slot.read().await.credential.clone()
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
        self.oauth.authorization_url(state, pkce)
    }

    /// Exchange an authorization code and install the resulting credential
    ///
    /// # Errors
    /// Returns [`Error::Authentication`] if the code is rejected and
    /// [`Error::Storage`] if persistence fails after a successful exchange
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Credential> {
        if code.trim().is_empty() {
            return Err(Error::Validation("authorization code must not be empty".into()));
        }

        let credential = self.oauth.exchange_code(code, code_verifier).await?;
        self.install(credential.clone()).await;
        info!("authorization code exchanged for access token");

        self.persist(&credential).await?;
        Ok(credential)
    }

    /// Inject a token directly, bypassing the OAuth exchange
    ///
    /// The injected credential has no recorded expiry and is treated as
    /// valid until the remote endpoint reports otherwise.
    ///
    /// # Errors
    /// Returns [`Error::Validation`] for an empty token and
    /// [`Error::Storage`] if persistence fails
    pub async fn set_access_token(
        &self,
        access_token: impl Into<String> + Send,
        refresh_token: Option<String>,
    ) -> Result<()> {
        let access_token = access_token.into();
        if access_token.trim().is_empty() {
            return Err(Error::Validation("access_token must not be empty".into()));
        }

        let credential = Credential::new(access_token, refresh_token, None);
        self.install(credential.clone()).await;
        info!("access token set directly");

        self.persist(&credential).await
    }

    /// Get a valid access token, refreshing first if the current one is
    /// stale
    ///
    /// # Errors
    /// - [`Error::Authentication`] when no credential is present
    /// - [`Error::TokenExpired`] when stale with no refresh token
    /// - [`Error::Authentication`] when the refresh is rejected
    /// - [`Error::Storage`] when the refreshed token cannot be persisted
    pub async fn access_token(&self) -> Result<String> {
        {
            let slot = self.slot.read().await;
            match &slot.credential {
                Some(credential) if !credential.is_stale(self.refresh_threshold_secs) => {
                    return Ok(credential.access_token.clone());
                }
                Some(_) => {}
                None => {
                    return Err(Error::Authentication(
                        "not authenticated: exchange an authorization code or set a token first"
                            .into(),
                    ));
                }
            }
        }

        let credential = self
            .coalesced_refresh(|credential| credential.is_stale(self.refresh_threshold_secs))
            .await?;
        Ok(credential.access_token)
    }

    /// Refresh the credential, coalescing concurrent attempts
    ///
    /// # Errors
    /// - [`Error::Authentication`] when not authenticated or the refresh
    ///   token is rejected
    /// - [`Error::TokenExpired`] when no refresh token is available
    /// - [`Error::Storage`] when the new credential cannot be persisted
    ///   (the in-memory credential is already updated)
    pub async fn refresh(&self) -> Result<Credential> {
        self.coalesced_refresh(|_credential| true).await
    }

    /// Refresh after the remote endpoint rejected `rejected_token`
    ///
    /// If the slot already holds a different token (a concurrent caller
    /// refreshed first), that token is returned without a network call.
    pub(crate) async fn refresh_after_rejection(
        &self,
        rejected_token: &str,
    ) -> Result<Credential> {
        self.coalesced_refresh(|credential| credential.access_token == rejected_token).await
    }

    /// The single check-then-refresh sequence, held under the refresh gate
    ///
    /// `needs_refresh` is re-evaluated against the slot after the gate is
    /// acquired, so callers whose reason to refresh has evaporated (a
    /// concurrent refresh landed first) observe that refresh's result
    /// instead of issuing a duplicate network call.
    async fn coalesced_refresh<P>(&self, needs_refresh: P) -> Result<Credential>
    where
        P: Fn(&Credential) -> bool + Send,
    {
        let start_generation = self.slot.read().await.generation;
        let _gate = self.refresh_gate.lock().await;

        let refresh_token = {
            let slot = self.slot.read().await;
            let Some(credential) = &slot.credential else {
                return Err(Error::Authentication(
                    "not authenticated: nothing to refresh".into(),
                ));
            };

            if slot.generation != start_generation || !needs_refresh(credential) {
                debug!("refresh coalesced with a concurrent caller");
                return Ok(credential.clone());
            }

            credential.refresh_token.clone().ok_or(Error::TokenExpired)?
        };

        let credential = self.oauth.refresh(&refresh_token).await?;
        self.install(credential.clone()).await;
        info!("access token refreshed");

        // Persist first, then notify; a storage failure still surfaces
        // after the hook observed the successful refresh.
        let persisted = self.persist(&credential).await;
        self.notify_refresh(&credential).await;
        persisted?;

        Ok(credential)
    }

    /// Clear the credential slot and any persisted state
    ///
    /// # Errors
    /// Returns [`Error::Storage`] if persisted state cannot be removed
    pub async fn logout(&self) -> Result<()> {
        {
            let mut slot = self.slot.write().await;
            slot.credential = None;
            slot.generation = slot.generation.wrapping_add(1);
        }
        info!("logged out; credential cleared");

        match &self.store {
            Some(store) => store.clear().await,
            None => Ok(()),
        }
    }

    async fn install(&self, credential: Credential) {
        let mut slot = self.slot.write().await;
        slot.credential = Some(credential);
        slot.generation = slot.generation.wrapping_add(1);
    }

    async fn persist(&self, credential: &Credential) -> Result<()> {
        match &self.store {
            Some(store) => store.save(credential).await,
            None => Ok(()),
        }
    }

    async fn notify_refresh(&self, credential: &Credential) {
        let hook = self.on_refresh.read().await.clone();
        if let Some(hook) = hook {
            if catch_unwind(AssertUnwindSafe(|| hook(credential))).is_err() {
                warn!("token refresh hook panicked; ignoring");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;

    use super::*;
    use crate::testing::{MemoryTokenStore, MockOAuthApi};

    fn expired_credential() -> Credential {
        Credential {
            access_token: "stale-access".into(),
            refresh_token: Some("valid-refresh".into()),
            expires_at: Some(Utc::now() - chrono::Duration::seconds(30)),
            obtained_at: Utc::now() - chrono::Duration::hours(1),
        }
    }

    fn manager_with(
        oauth: Arc<MockOAuthApi>,
        store: Arc<MemoryTokenStore>,
    ) -> TokenManager {
        TokenManager::new(oauth, Some(store), 60)
    }

    #[tokio::test]
    async fn access_token_without_credential_is_authentication_error() {
        let manager = manager_with(Arc::new(MockOAuthApi::new()), Arc::new(MemoryTokenStore::new()));
        let result = manager.access_token().await;
        assert!(matches!(result, Err(Error::Authentication(_))));
    }

    #[tokio::test]
    async fn set_access_token_persists_and_authenticates() {
        let store = Arc::new(MemoryTokenStore::new());
        let manager = manager_with(Arc::new(MockOAuthApi::new()), store.clone());

        manager.set_access_token("direct-token", Some("direct-refresh".into())).await.unwrap();

        assert!(manager.is_authenticated().await);
        assert_eq!(manager.access_token().await.unwrap(), "direct-token");
        assert_eq!(store.stored().await.unwrap().access_token, "direct-token");
    }

    #[tokio::test]
    async fn set_empty_access_token_is_rejected() {
        let manager = manager_with(Arc::new(MockOAuthApi::new()), Arc::new(MemoryTokenStore::new()));
        let result = manager.set_access_token("  ", None).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn injected_token_without_expiry_never_triggers_refresh() {
        let oauth = Arc::new(MockOAuthApi::new());
        let manager = manager_with(oauth.clone(), Arc::new(MemoryTokenStore::new()));

        manager.set_access_token("optimistic", None).await.unwrap();
        for _ in 0..3 {
            assert_eq!(manager.access_token().await.unwrap(), "optimistic");
        }

        assert_eq!(oauth.refresh_call_count(), 0);
    }

    #[tokio::test]
    async fn stale_credential_is_refreshed_on_access() {
        let oauth = Arc::new(MockOAuthApi::new());
        let store = Arc::new(MemoryTokenStore::new());
        store.seed(expired_credential()).await;

        let manager = manager_with(oauth.clone(), store.clone());
        assert!(manager.initialize().await);

        let token = manager.access_token().await.unwrap();
        assert_eq!(token, "refreshed-1");
        assert_eq!(oauth.refresh_call_count(), 1);
        // The refreshed credential was persisted.
        assert_eq!(store.stored().await.unwrap().access_token, "refreshed-1");
    }

    #[tokio::test]
    async fn access_after_refresh_does_not_refresh_again() {
        let oauth = Arc::new(MockOAuthApi::new());
        let store = Arc::new(MemoryTokenStore::new());
        store.seed(expired_credential()).await;

        let manager = manager_with(oauth.clone(), store);
        manager.initialize().await;

        let refreshed = manager.refresh().await.unwrap();
        assert_eq!(manager.access_token().await.unwrap(), refreshed.access_token);
        assert_eq!(oauth.refresh_call_count(), 1);
    }

    #[tokio::test]
    async fn stale_credential_without_refresh_token_is_token_expired() {
        let oauth = Arc::new(MockOAuthApi::new());
        let store = Arc::new(MemoryTokenStore::new());
        let mut credential = expired_credential();
        credential.refresh_token = None;
        store.seed(credential).await;

        let manager = manager_with(oauth.clone(), store);
        manager.initialize().await;

        let result = manager.access_token().await;
        assert!(matches!(result, Err(Error::TokenExpired)));
        assert_eq!(oauth.refresh_call_count(), 0);
    }

    #[tokio::test]
    async fn rejected_refresh_is_authentication_error() {
        let oauth = Arc::new(MockOAuthApi::new());
        oauth.set_fail_refresh(true);
        let store = Arc::new(MemoryTokenStore::new());
        store.seed(expired_credential()).await;

        let manager = manager_with(oauth.clone(), store);
        manager.initialize().await;

        let result = manager.access_token().await;
        assert!(matches!(result, Err(Error::Authentication(_))));
        assert_eq!(oauth.refresh_call_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_stale_readers_coalesce_into_one_refresh() {
        let oauth = Arc::new(MockOAuthApi::new());
        oauth.set_refresh_delay_ms(50);
        let store = Arc::new(MemoryTokenStore::new());
        store.seed(expired_credential()).await;

        let manager = Arc::new(manager_with(oauth.clone(), store));
        manager.initialize().await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move { manager.access_token().await }));
        }

        let mut tokens = Vec::new();
        for handle in handles {
            tokens.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(oauth.refresh_call_count(), 1);
        assert!(tokens.iter().all(|token| token == "refreshed-1"));
    }

    #[tokio::test]
    async fn refresh_hook_fires_exactly_once_per_refresh() {
        let oauth = Arc::new(MockOAuthApi::new());
        let store = Arc::new(MemoryTokenStore::new());
        store.seed(expired_credential()).await;

        let manager = manager_with(oauth, store);
        manager.initialize().await;

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_hook = calls.clone();
        manager
            .on_token_refresh(Arc::new(move |credential: &Credential| {
                assert!(!credential.access_token.is_empty());
                calls_in_hook.fetch_add(1, Ordering::SeqCst);
            }))
            .await;

        manager.refresh().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A second explicit refresh fires the hook again.
        manager.refresh().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panicking_hook_does_not_unwind_the_refresh() {
        let oauth = Arc::new(MockOAuthApi::new());
        let store = Arc::new(MemoryTokenStore::new());
        store.seed(expired_credential()).await;

        let manager = manager_with(oauth, store);
        manager.initialize().await;
        manager
            .on_token_refresh(Arc::new(|_credential: &Credential| {
                panic!("hook exploded");
            }))
            .await;

        let credential = manager.refresh().await.unwrap();
        assert_eq!(credential.access_token, "refreshed-1");
    }

    #[tokio::test]
    async fn storage_failure_surfaces_but_memory_is_updated() {
        let oauth = Arc::new(MockOAuthApi::new());
        let store = Arc::new(MemoryTokenStore::new());
        store.seed(expired_credential()).await;

        let manager = manager_with(oauth, store.clone());
        manager.initialize().await;
        store.set_fail_saves(true);

        let result = manager.refresh().await;
        assert!(matches!(result, Err(Error::Storage(_))));

        // The in-memory credential still rotated; the caller just knows a
        // restart will lose it.
        assert_eq!(manager.access_token().await.unwrap(), "refreshed-1");
    }

    #[tokio::test]
    async fn exchange_code_installs_and_persists() {
        let oauth = Arc::new(MockOAuthApi::new());
        let store = Arc::new(MemoryTokenStore::new());
        let manager = manager_with(oauth.clone(), store.clone());

        let credential = manager.exchange_code("fresh-code", None).await.unwrap();

        assert!(!credential.access_token.is_empty());
        assert_eq!(oauth.exchange_call_count(), 1);
        assert!(store.stored().await.is_some());
    }

    #[tokio::test]
    async fn rejected_code_is_authentication_error() {
        let oauth = Arc::new(MockOAuthApi::new());
        oauth.set_fail_exchange(true);
        let manager = manager_with(oauth, Arc::new(MemoryTokenStore::new()));

        let result = manager.exchange_code("used-code", None).await;
        assert!(matches!(result, Err(Error::Authentication(_))));
        assert!(!manager.is_authenticated().await);
    }

    #[tokio::test]
    async fn logout_clears_slot_and_store() {
        let oauth = Arc::new(MockOAuthApi::new());
        let store = Arc::new(MemoryTokenStore::new());
        let manager = manager_with(oauth, store.clone());

        manager.set_access_token("token", None).await.unwrap();
        manager.logout().await.unwrap();

        assert!(!manager.is_authenticated().await);
        assert!(store.stored().await.is_none());
    }
}
