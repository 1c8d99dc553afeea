//! Test doubles for the OAuth and token-storage seams
//!
//! Used by the crate's own tests and available to downstream integration
//! tests through the `test-utils` feature. These mocks never touch the
//! network or the filesystem.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::auth::oauth::OAuthApi;
use crate::auth::store::TokenStore;
use crate::auth::types::{Credential, PkceChallenge};
use crate::error::{Error, Result};

/// In-memory token store
///
/// Counts saves and can be told to fail them, for exercising the
/// storage-failure path.
#[derive(Default)]
pub struct MemoryTokenStore {
    credential: Mutex<Option<Credential>>,
    fail_saves: AtomicBool,
    save_count: AtomicUsize,
}

impl MemoryTokenStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a credential in the store without counting it as a save
    pub async fn seed(&self, credential: Credential) {
        *self.credential.lock().await = Some(credential);
    }

    /// Snapshot of the stored credential
    pub async fn stored(&self) -> Option<Credential> {
        self.credential.lock().await.clone()
    }

    /// Make subsequent saves fail with a storage error
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Option<Credential> {
        self.credential.lock().await.clone()
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Storage("simulated write failure".into()));
        }

        *self.credential.lock().await = Some(credential.clone());
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.credential.lock().await = None;
        Ok(())
    }
}

/// Scripted OAuth transport
///
/// Counts exchange and refresh calls, can fail either, and can delay the
/// refresh to widen race windows in coalescing tests. Refreshed access
/// tokens are `refreshed-1`, `refreshed-2`, ... in call order.
#[derive(Default)]
pub struct MockOAuthApi {
    exchange_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    fail_exchange: AtomicBool,
    fail_refresh: AtomicBool,
    refresh_delay_ms: AtomicU64,
    rotate_refresh_token: AtomicBool,
}

impl MockOAuthApi {
    /// Create a mock that succeeds on every call
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of exchange calls seen
    #[must_use]
    pub fn exchange_call_count(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    /// Number of refresh calls seen
    #[must_use]
    pub fn refresh_call_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Make subsequent exchanges fail as rejected codes
    pub fn set_fail_exchange(&self, fail: bool) {
        self.fail_exchange.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent refreshes fail as rejected refresh tokens
    pub fn set_fail_refresh(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }

    /// Delay each refresh, widening race windows in concurrency tests
    pub fn set_refresh_delay_ms(&self, millis: u64) {
        self.refresh_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Rotate the refresh token on every refresh (single-use policy)
    pub fn set_rotate_refresh_token(&self, rotate: bool) {
        self.rotate_refresh_token.store(rotate, Ordering::SeqCst);
    }
}

#[async_trait]
impl OAuthApi for MockOAuthApi {
    fn authorization_url(&self, state: &str, _pkce: Option<&PkceChallenge>) -> Result<String> {
        Ok(format!("https://oauth.invalid/permission?app_id=mock&state={state}"))
    }

    async fn exchange_code(&self, code: &str, _code_verifier: Option<&str>) -> Result<Credential> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_exchange.load(Ordering::SeqCst) {
            return Err(Error::Authentication("authorization code rejected".into()));
        }

        Ok(Credential::new(
            format!("exchanged-{code}"),
            Some("mock-refresh".into()),
            Some(3600),
        ))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Credential> {
        let call = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;

        let delay = self.refresh_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(Error::Authentication("refresh token rejected".into()));
        }

        let refresh_token = if self.rotate_refresh_token.load(Ordering::SeqCst) {
            format!("mock-refresh-{call}")
        } else {
            refresh_token.to_string()
        };

        Ok(Credential::new(format!("refreshed-{call}"), Some(refresh_token), Some(3600)))
    }
}
