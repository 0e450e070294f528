//! # Error Handling
//!
//! Domain error type shared by the OAuth flow, the credential validator, the
//! remote API client and the sync engine, plus the structured payload that is
//! persisted on failed sync jobs.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use thiserror::Error;

use crate::crypto::CryptoError;

/// Longest upstream body carried verbatim inside an error.
const BODY_SNIPPET_LIMIT: usize = 200;

/// Why a stored credential cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    /// No credential is stored for the user
    Missing,
    /// `expires_at` has passed
    Expired,
    /// The credential was already flagged for re-authorization
    Revoked,
    /// The provider reported the token as invalid
    Unauthorized,
    /// The provider could not be asked (non-success introspection response)
    Unknown,
}

impl InvalidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidReason::Missing => "missing",
            InvalidReason::Expired => "expired",
            InvalidReason::Revoked => "revoked",
            InvalidReason::Unauthorized => "unauthorized",
            InvalidReason::Unknown => "unknown",
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by every public operation of this crate.
#[derive(Debug, Error)]
pub enum AdsError {
    #[error("OAuth state does not match the issued value")]
    InvalidState,

    #[error("no PKCE code verifier stored for this authorization flow")]
    MissingVerifier,

    #[error("{message}")]
    Upstream { status: u16, message: String },

    #[error("credential is not usable: {reason}")]
    CredentialInvalid { reason: InvalidReason },

    #[error("persistence error: {0}")]
    Persistence(#[from] sea_orm::DbErr),

    #[error("credential cipher error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("pagination exceeded {max_pages} pages")]
    PaginationLimit { max_pages: usize },

    #[error("invalid configuration: {0}")]
    Configuration(String),
}

pub type Result<T, E = AdsError> = std::result::Result<T, E>;

impl AdsError {
    /// Build an upstream error from a provider status and message, falling
    /// back to a truncated body when the provider sent no structured message.
    pub fn upstream(status: u16, message: Option<String>, body: Option<&str>) -> Self {
        let message = message
            .filter(|m| !m.trim().is_empty())
            .or_else(|| body.map(body_snippet).filter(|b| !b.is_empty()))
            .unwrap_or_else(|| format!("provider returned HTTP {status}"));
        AdsError::Upstream { status, message }
    }

    /// Stable machine-readable tag for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AdsError::InvalidState => "invalid_state",
            AdsError::MissingVerifier => "missing_verifier",
            AdsError::Upstream { .. } => "upstream_error",
            AdsError::CredentialInvalid { .. } => "credential_invalid",
            AdsError::Persistence(_) => "persistence_error",
            AdsError::Crypto(_) => "crypto_error",
            AdsError::Transport(_) => "transport_error",
            AdsError::MalformedResponse(_) => "malformed_response",
            AdsError::PaginationLimit { .. } => "pagination_limit",
            AdsError::Configuration(_) => "configuration_error",
        }
    }

    /// Reason carried by a credential error, if any.
    pub fn invalid_reason(&self) -> Option<InvalidReason> {
        match self {
            AdsError::CredentialInvalid { reason } => Some(*reason),
            _ => None,
        }
    }

    /// JSON payload persisted on a failed sync job.
    pub fn to_payload(&self) -> JsonValue {
        let mut payload = json!({
            "kind": self.kind(),
            "message": self.to_string(),
            "recordedAt": Utc::now().to_rfc3339(),
        });

        match self {
            AdsError::Upstream { status, .. } => {
                payload["status"] = json!(status);
            }
            AdsError::CredentialInvalid { reason } => {
                payload["reason"] = json!(reason.as_str());
            }
            _ => {}
        }

        payload
    }
}

/// Truncate an upstream body so error payloads stay small.
fn body_snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() > BODY_SNIPPET_LIMIT {
        let truncated: String = trimmed.chars().take(BODY_SNIPPET_LIMIT).collect();
        format!("{}...", truncated)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_prefers_provider_message() {
        let err = AdsError::upstream(400, Some("Invalid OAuth access token.".into()), Some("{}"));
        assert_eq!(err.to_string(), "Invalid OAuth access token.");
        assert_eq!(err.kind(), "upstream_error");
    }

    #[test]
    fn upstream_falls_back_to_truncated_body() {
        let body = "x".repeat(500);
        let err = AdsError::upstream(502, None, Some(&body));
        let AdsError::Upstream { status, message } = err else {
            panic!("expected upstream error");
        };
        assert_eq!(status, 502);
        assert_eq!(message.chars().count(), BODY_SNIPPET_LIMIT + 3);
        assert!(message.ends_with("..."));
    }

    #[test]
    fn upstream_without_body_uses_status_message() {
        let err = AdsError::upstream(503, Some("  ".into()), None);
        assert_eq!(err.to_string(), "provider returned HTTP 503");
    }

    #[test]
    fn payload_carries_kind_message_and_extras() {
        let upstream = AdsError::upstream(400, Some("boom".into()), None).to_payload();
        assert_eq!(upstream["kind"], "upstream_error");
        assert_eq!(upstream["message"], "boom");
        assert_eq!(upstream["status"], 400);
        assert!(upstream["recordedAt"].is_string());

        let invalid = AdsError::CredentialInvalid {
            reason: InvalidReason::Expired,
        }
        .to_payload();
        assert_eq!(invalid["reason"], "expired");
        assert_eq!(invalid["message"], "credential is not usable: expired");
    }

    #[test]
    fn persistence_message_is_verbatim() {
        let err = AdsError::from(sea_orm::DbErr::Custom("disk full".into()));
        assert_eq!(err.kind(), "persistence_error");
        assert!(err.to_payload()["message"]
            .as_str()
            .unwrap()
            .contains("disk full"));
    }
}
