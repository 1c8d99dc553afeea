//! Authentication: OAuth flows, the credential slot, and persistence
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ TokenManager │  credential slot, staleness, coalesced refresh
//! └──────┬───────┘
//!        ├──► OAuthApi / OAuthClient   (token endpoint HTTP)
//!        └──► TokenStore / FileTokenStore  (durable persistence)
//! ```
//!
//! The manager owns the only live credential; everything else sees
//! snapshots. Both collaborators are traits so tests inject in-memory
//! doubles.

pub mod oauth;
pub mod store;
pub mod token_manager;
pub mod types;

pub use oauth::{OAuthApi, OAuthClient};
pub use store::{FileTokenStore, TokenStore};
pub use token_manager::{RefreshHook, TokenManager};
pub use types::{Credential, OAuthErrorBody, PkceChallenge, TokenResponse};
