//! Client SDK for the Zalo Official Account HTTP API.
//!
//! Provides OAuth 2.0 authentication with durable token persistence,
//! transparent refresh-and-retry request execution, partial-failure-aware
//! broadcasts, and typed surfaces for messaging, contacts, and groups.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐
//! │ ZaloClient │  facade + builder
//! └─────┬──────┘
//!       ├──► MessagingApi / ContactsApi / GroupsApi
//!       │         │
//!       │         └──► RequestExecutor   (bearer auth, classification,
//!       │                   │             401→refresh→retry once)
//!       │                   └──► TokenManager  (credential slot,
//!       │                             │         coalesced refresh)
//!       │                             ├──► OAuthClient  (token endpoints)
//!       │                             └──► TokenStore   (JSON persistence)
//!       └──► BatchDispatcher  (index-aligned per-recipient outcomes)
//! ```
//!
//! # Guarantees
//!
//! - Exactly the right token is attached to every outbound call; a stale
//!   token is refreshed before the call, a rejected one refreshed and the
//!   call retried exactly once.
//! - Concurrent callers observing a stale token coalesce into a single
//!   refresh network call.
//! - A broadcast returns one outcome per recipient, in input order; one
//!   recipient's failure never aborts the rest.
//!
//! # Quick start
//!
//! ```no_run
//! use zalokit::{AppConfig, ZaloClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ZaloClient::builder()
//!         .config(AppConfig::new("app-id", "app-secret")?)
//!         .access_token("existing-access-token", Some("refresh-token".into()))
//!         .build()
//!         .await?;
//!
//!     let receipt = client.messaging().send_text("user-id", "hello", None).await?;
//!     println!("sent: {:?}", receipt.message_id);
//!
//!     let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
//!     let result = client.messaging().broadcast_text(&ids, "announcement").await?;
//!     println!("{} delivered, {} failed", result.succeeded(), result.failed());
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod contacts;
pub mod error;
pub mod groups;
pub mod messaging;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use api::{
    ApiRequest, ApiResponse, BatchDispatcher, BatchResult, RequestExecutor, RequestOutcome,
};
pub use auth::{
    Credential, FileTokenStore, OAuthApi, OAuthClient, PkceChallenge, RefreshHook, TokenManager,
    TokenStore,
};
pub use client::{ZaloClient, ZaloClientBuilder};
pub use config::AppConfig;
pub use contacts::{ContactsApi, FollowerInfo, FollowerPage, Gender, UserProfile};
pub use error::{Error, ErrorDescriptor, ErrorKind, Result};
pub use groups::{Group, GroupMember, GroupRole, GroupsApi};
pub use messaging::{ImageSource, LinkPreview, MessageReceipt, MessagingApi};
