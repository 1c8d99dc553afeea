//! Credential types and OAuth wire formats
//!
//! Defines the in-memory/persisted credential state plus the request and
//! response shapes exchanged with the OAuth token endpoint.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OAuth access and refresh tokens with expiry metadata
///
/// Owned exclusively by the token manager; the token store only ever sees
/// a serialized snapshot. If `expires_at` is absent the token is treated
/// as valid until the remote endpoint reports otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Bearer token attached to API calls
    pub access_token: String,

    /// Refresh token for obtaining new access tokens
    /// Optional because direct injection and some grants don't carry one
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Absolute expiry timestamp (UTC), when the server reported one
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,

    /// When this credential was obtained
    pub obtained_at: DateTime<Utc>,
}

impl Credential {
    /// Create a credential obtained now
    ///
    /// `expires_in` is the server-reported lifetime in seconds; zero or
    /// negative lifetimes are treated as "no recorded expiry".
    #[must_use]
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_in: Option<i64>,
    ) -> Self {
        let obtained_at = Utc::now();
        let expires_at = expires_in
            .filter(|seconds| *seconds > 0)
            .map(|seconds| obtained_at + chrono::Duration::seconds(seconds));

        Self { access_token, refresh_token, expires_at, obtained_at }
    }

    /// Check whether the access token is stale
    ///
    /// A token is stale at or after `expires_at - threshold_secs`. A
    /// credential without a recorded expiry is optimistically treated as
    /// valid until the remote endpoint itself reports it invalid.
    #[must_use]
    pub fn is_stale(&self, threshold_secs: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() + chrono::Duration::seconds(threshold_secs) >= expires_at,
            None => false,
        }
    }

    /// Seconds until the recorded expiry, when one exists
    #[must_use]
    pub fn seconds_until_expiry(&self) -> Option<i64> {
        self.expires_at.map(|expires_at| (expires_at - Utc::now()).num_seconds())
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Credential(access_token={}, refresh_token={})",
            crate::utils::mask_sensitive(&self.access_token, 4),
            if self.refresh_token.is_some() { "set" } else { "unset" },
        )
    }
}

/// Token endpoint success response
///
/// The platform omits `refresh_token` when the old one stays valid and
/// sometimes omits `expires_in` entirely.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    /// New access token
    pub access_token: String,
    /// Replacement refresh token, when the server rotates it
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl TokenResponse {
    /// Convert into a [`Credential`], carrying the previous refresh token
    /// forward when the server did not rotate it
    ///
    /// This supports both refresh-token policies (single-use rotating and
    /// reusable) without hard-coding either.
    #[must_use]
    pub fn into_credential(self, previous_refresh_token: Option<String>) -> Credential {
        let refresh_token = self.refresh_token.or(previous_refresh_token);
        Credential::new(self.access_token, refresh_token, self.expires_in)
    }
}

/// Token endpoint error response
#[derive(Debug, Deserialize)]
pub struct OAuthErrorBody {
    /// Server error code (e.g. `invalid_grant`)
    pub error: String,
    /// Optional human-readable description
    #[serde(default)]
    pub error_description: Option<String>,
}

impl fmt::Display for OAuthErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{}: {}", self.error, description),
            None => write!(f, "{}", self.error),
        }
    }
}

/// PKCE parameters passed through to the authorization URL
///
/// The SDK does not generate PKCE material; callers that run the flow
/// with PKCE supply the challenge here and the verifier at exchange time.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// Code challenge derived from the caller's verifier
    pub code_challenge: String,
    /// Challenge method, `S256` or `plain`
    pub code_challenge_method: String,
}

impl PkceChallenge {
    /// Create an `S256` challenge
    #[must_use]
    pub fn s256(code_challenge: impl Into<String>) -> Self {
        Self { code_challenge: code_challenge.into(), code_challenge_method: "S256".to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_credential_is_not_stale() {
        let credential =
            Credential::new("access".into(), Some("refresh".into()), Some(3600));

        assert!(!credential.is_stale(60));
        // A threshold larger than the lifetime makes it stale immediately.
        assert!(credential.is_stale(7200));
    }

    #[test]
    fn credential_without_expiry_is_optimistically_valid() {
        let credential = Credential::new("access".into(), None, None);

        assert!(credential.expires_at.is_none());
        assert!(!credential.is_stale(60));
        assert!(credential.seconds_until_expiry().is_none());
    }

    #[test]
    fn zero_lifetime_means_no_recorded_expiry() {
        let credential = Credential::new("access".into(), None, Some(0));
        assert!(credential.expires_at.is_none());
    }

    #[test]
    fn seconds_until_expiry_tracks_lifetime() {
        let credential = Credential::new("access".into(), None, Some(3600));
        let seconds = credential.seconds_until_expiry().unwrap();
        assert!(seconds > 3590 && seconds <= 3600);
    }

    #[test]
    fn serde_round_trip_preserves_all_fields() {
        let credential =
            Credential::new("access".into(), Some("refresh".into()), Some(3600));

        let json = serde_json::to_string(&credential).unwrap();
        let restored: Credential = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, credential);
    }

    #[test]
    fn token_response_keeps_old_refresh_token_when_not_rotated() {
        let response = TokenResponse {
            access_token: "new-access".into(),
            refresh_token: None,
            expires_in: Some(3600),
        };

        let credential = response.into_credential(Some("old-refresh".into()));
        assert_eq!(credential.refresh_token.as_deref(), Some("old-refresh"));
    }

    #[test]
    fn token_response_prefers_rotated_refresh_token() {
        let response = TokenResponse {
            access_token: "new-access".into(),
            refresh_token: Some("new-refresh".into()),
            expires_in: Some(3600),
        };

        let credential = response.into_credential(Some("old-refresh".into()));
        assert_eq!(credential.refresh_token.as_deref(), Some("new-refresh"));
    }

    #[test]
    fn display_masks_the_access_token() {
        let credential =
            Credential::new("super-secret-token".into(), Some("refresh".into()), None);
        let rendered = credential.to_string();

        assert!(!rendered.contains("super-secret-token"));
        assert!(rendered.contains("supe"));
    }

    #[test]
    fn oauth_error_body_display() {
        let body = OAuthErrorBody {
            error: "invalid_grant".into(),
            error_description: Some("refresh token revoked".into()),
        };
        assert_eq!(body.to_string(), "invalid_grant: refresh token revoked");

        let bare = OAuthErrorBody { error: "invalid_request".into(), error_description: None };
        assert_eq!(bare.to_string(), "invalid_request");
    }
}
