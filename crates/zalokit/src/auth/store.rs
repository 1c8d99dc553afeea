//! Durable token persistence
//!
//! The store holds a serialized snapshot of the credential, never a live
//! reference. Missing or corrupt storage is treated as first-run; a
//! failed write is surfaced because silently losing a refreshed token is
//! unacceptable.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::types::Credential;
use crate::error::{Error, Result};

/// Credential persistence seam
///
/// Abstracted so tests can inject an in-memory store.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Load the persisted credential, if any
    ///
    /// Missing or unreadable state is first-run, not an error.
    async fn load(&self) -> Option<Credential>;

    /// Persist a credential snapshot
    ///
    /// # Errors
    /// Returns [`Error::Storage`] on write failure
    async fn save(&self, credential: &Credential) -> Result<()>;

    /// Remove any persisted credential
    ///
    /// # Errors
    /// Returns [`Error::Storage`] if existing state cannot be removed
    async fn clear(&self) -> Result<()>;
}

/// File-backed token store
///
/// Writes the credential as a human-inspectable JSON document at the
/// configured path, creating parent directories as needed.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Create a store backed by the given path
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Option<Credential> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) => {
                debug!(path = %self.path.display(), error = %err, "no stored credential");
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(credential) => {
                debug!(path = %self.path.display(), "loaded stored credential");
                Some(credential)
            }
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "stored credential is corrupt; treating as first run"
                );
                None
            }
        }
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|err| {
                    Error::Storage(format!(
                        "failed to create token storage directory {}: {err}",
                        parent.display()
                    ))
                })?;
            }
        }

        let contents = serde_json::to_string_pretty(credential)
            .map_err(|err| Error::Storage(format!("failed to serialize credential: {err}")))?;

        tokio::fs::write(&self.path, contents).await.map_err(|err| {
            Error::Storage(format!("failed to write {}: {err}", self.path.display()))
        })?;

        debug!(path = %self.path.display(), "credential persisted");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::Storage(format!(
                "failed to remove {}: {err}",
                self.path.display()
            ))),
        }
    }
}
