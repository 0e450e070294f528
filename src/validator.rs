//! # Credential Validator
//!
//! Single source of truth for whether a stored credential may be used. The
//! only sanctioned way to obtain a plaintext token is
//! [`CredentialValidator::ensure_valid_token`].

use chrono::Utc;
use metrics::counter;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::crypto::{CryptoKey, SecretToken, decrypt_token};
use crate::error::{AdsError, InvalidReason, Result};
use crate::facebook::GraphOAuthClient;
use crate::repositories::CredentialRepository;

/// Result of checking one user's credential.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Valid(ValidToken),
    Invalid(InvalidReason),
}

/// A credential confirmed usable, with its decrypted token.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidToken {
    pub credential_id: Uuid,
    pub access_token: SecretToken,
}

#[derive(Clone)]
pub struct CredentialValidator {
    credentials: CredentialRepository,
    oauth: GraphOAuthClient,
    crypto_key: CryptoKey,
}

impl CredentialValidator {
    pub fn new(
        credentials: CredentialRepository,
        oauth: GraphOAuthClient,
        crypto_key: CryptoKey,
    ) -> Self {
        Self {
            credentials,
            oauth,
            crypto_key,
        }
    }

    /// Check the user's credential locally, then against `debug_token`.
    ///
    /// Expiry, a non-success introspection response and an invalid token all
    /// set `requires_reauth`. Transport and decryption failures are returned
    /// as errors without touching the credential.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn validate(&self, user_id: &str) -> Result<ValidationOutcome> {
        let outcome = self.check(user_id).await?;

        let label = match &outcome {
            ValidationOutcome::Valid(_) => "valid",
            ValidationOutcome::Invalid(reason) => reason.as_str(),
        };
        counter!("credential_validation_total", "outcome" => label).increment(1);

        Ok(outcome)
    }

    async fn check(&self, user_id: &str) -> Result<ValidationOutcome> {
        let Some(credential) = self.credentials.find_by_user(user_id).await? else {
            return Ok(ValidationOutcome::Invalid(InvalidReason::Missing));
        };

        if credential.requires_reauth {
            return Ok(ValidationOutcome::Invalid(InvalidReason::Revoked));
        }

        if credential.is_expired_at(Utc::now()) {
            self.credentials.mark_requires_reauth(credential.id).await?;
            info!(credential_id = %credential.id, "Credential expired; re-authorization required");
            return Ok(ValidationOutcome::Invalid(InvalidReason::Expired));
        }

        let token = decrypt_token(
            &self.crypto_key,
            &credential.user_id,
            &credential.access_token_ciphertext,
        )?;

        let introspection = match self.oauth.debug_token(&token).await {
            Ok(introspection) => introspection,
            Err(AdsError::Upstream { status, message }) => {
                warn!(credential_id = %credential.id, status, "Token introspection failed: {}", message);
                self.credentials.mark_requires_reauth(credential.id).await?;
                return Ok(ValidationOutcome::Invalid(InvalidReason::Unknown));
            }
            Err(err) => return Err(err),
        };

        if !introspection.is_valid {
            self.credentials.mark_requires_reauth(credential.id).await?;
            info!(credential_id = %credential.id, "Provider reports token invalid");
            return Ok(ValidationOutcome::Invalid(InvalidReason::Unauthorized));
        }

        self.credentials
            .record_validation(credential.id, introspection.expires_at)
            .await?;

        Ok(ValidationOutcome::Valid(ValidToken {
            credential_id: credential.id,
            access_token: token,
        }))
    }

    /// Plaintext token for `user_id`, or [`AdsError::CredentialInvalid`].
    pub async fn ensure_valid_token(&self, user_id: &str) -> Result<ValidToken> {
        match self.validate(user_id).await? {
            ValidationOutcome::Valid(token) => Ok(token),
            ValidationOutcome::Invalid(reason) => Err(AdsError::CredentialInvalid { reason }),
        }
    }
}
