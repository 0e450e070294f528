//! # OAuth Flow Controller
//!
//! Authorization-request and callback legs of the PKCE flow. The callback
//! exchanges the code, upgrades the token when possible, stores the
//! encrypted credential with every reachable account, and runs the initial
//! sync under a tracked job.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::crypto::{CryptoKey, encrypt_token};
use crate::error::{AdsError, Result};
use crate::facebook::oauth::TokenGrant;
use crate::facebook::{AdAccountRecord, AdsApiFactory, GraphOAuthClient};
use crate::job_tracker::SyncJobTracker;
use crate::models::credential;
use crate::repositories::{AdsRepository, CredentialRepository, NewCredential, OAuthSessionRepository};
use crate::sync_engine::{RefreshParams, SyncCounts, SyncEngine};

/// Lifetime assumed when the provider omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

const STATE_BYTES: usize = 32;
const VERIFIER_BYTES: usize = 64;

/// Where to send the user, plus the issued state for correlation.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: Url,
    pub state: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of a completed callback.
#[derive(Debug, Clone)]
pub struct ConnectedCredential {
    pub credential: credential::Model,
    pub accounts: Vec<AdAccountRecord>,
    pub sync_job_id: Uuid,
    pub synced: SyncCounts,
}

/// Random URL-safe token of `len` bytes of entropy.
pub fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64_url::encode(&bytes)
}

/// `base64url(sha256(verifier))`, the S256 PKCE challenge.
/// Absolute expiry for a grant lifetime. Lifetimes chrono cannot represent
/// fall back to [`DEFAULT_TOKEN_LIFETIME_SECS`].
pub fn token_expiry(now: DateTime<Utc>, expires_in: Option<i64>) -> DateTime<Utc> {
    let fallback = now + Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS);
    let Some(secs) = expires_in else {
        return fallback;
    };

    match Duration::try_seconds(secs).and_then(|lifetime| now.checked_add_signed(lifetime)) {
        Some(expires_at) => expires_at,
        None => {
            warn!(expires_in = secs, "Token lifetime out of range; assuming default");
            fallback
        }
    }
}

pub fn code_challenge(code_verifier: &str) -> String {
    let digest = Sha256::digest(code_verifier.as_bytes());
    base64_url::encode(&digest)
}

#[derive(Clone)]
pub struct OAuthFlow {
    oauth: GraphOAuthClient,
    api_factory: Arc<dyn AdsApiFactory>,
    sessions: OAuthSessionRepository,
    credentials: CredentialRepository,
    ads: AdsRepository,
    engine: SyncEngine,
    tracker: SyncJobTracker,
    crypto_key: CryptoKey,
}

impl OAuthFlow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        oauth: GraphOAuthClient,
        api_factory: Arc<dyn AdsApiFactory>,
        sessions: OAuthSessionRepository,
        credentials: CredentialRepository,
        ads: AdsRepository,
        engine: SyncEngine,
        tracker: SyncJobTracker,
        crypto_key: CryptoKey,
    ) -> Self {
        Self {
            oauth,
            api_factory,
            sessions,
            credentials,
            ads,
            engine,
            tracker,
            crypto_key,
        }
    }

    /// Issue state and verifier, store them, and build the consent URL.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn initiate(&self, user_id: &str) -> Result<AuthorizationRequest> {
        let state = random_token(STATE_BYTES);
        let code_verifier = random_token(VERIFIER_BYTES);
        let challenge = code_challenge(&code_verifier);

        let session = self
            .sessions
            .create(
                user_id,
                &state,
                Some(code_verifier),
                self.oauth.app().state_ttl_seconds,
            )
            .await?;

        let url = self.oauth.authorize_url(&state, &challenge)?;

        info!("Authorization flow started");

        Ok(AuthorizationRequest {
            url,
            state,
            expires_at: session.expires_at.with_timezone(&Utc),
        })
    }

    /// Handle the provider redirect for `user_id`.
    ///
    /// The stored session is consumed before anything is checked. Nothing is
    /// persisted unless the exchange and the account listing both succeed.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn complete(&self, user_id: &str, code: &str, state: &str) -> Result<ConnectedCredential> {
        let session = self
            .sessions
            .take_for_user(user_id)
            .await?
            .ok_or(AdsError::InvalidState)?;

        if !bool::from(session.state.as_bytes().ct_eq(state.as_bytes())) {
            warn!("OAuth state mismatch");
            return Err(AdsError::InvalidState);
        }

        let code_verifier = session
            .code_verifier
            .filter(|v| !v.is_empty())
            .ok_or(AdsError::MissingVerifier)?;

        let short_lived = self.oauth.exchange_code(code, &code_verifier).await?;
        let grant = self.upgrade(short_lived).await;

        let expires_at = token_expiry(Utc::now(), grant.expires_in);

        let api = self.api_factory.for_token(grant.access_token.clone());
        let accounts = api.accounts().await?;

        let ciphertext = encrypt_token(&self.crypto_key, user_id, grant.access_token.expose())?;
        let credential = self
            .credentials
            .upsert_for_user(NewCredential {
                user_id: user_id.to_string(),
                account_ids: accounts.iter().map(|a| a.id.clone()).collect(),
                access_token_ciphertext: ciphertext,
                refresh_token_ciphertext: None,
                expires_at,
            })
            .await?;

        self.ads
            .upsert_accounts(user_id, credential.id, &accounts, false)
            .await?;

        info!(
            credential_id = %credential.id,
            accounts = accounts.len(),
            "Credential stored; starting initial sync"
        );

        let run = self
            .tracker
            .track(user_id, credential.id, || {
                self.engine.refresh(RefreshParams {
                    user_id,
                    credential_id: credential.id,
                    api: api.as_ref(),
                    since: None,
                    mark_initial_sync: true,
                })
            })
            .await?;

        Ok(ConnectedCredential {
            credential,
            accounts,
            sync_job_id: run.job_id,
            synced: run.output,
        })
    }

    /// Try the long-lived exchange, keeping the short-lived token on failure.
    async fn upgrade(&self, short_lived: TokenGrant) -> TokenGrant {
        match self.oauth.exchange_long_lived(&short_lived.access_token).await {
            Ok(long_lived) => TokenGrant {
                expires_in: long_lived.expires_in.or(short_lived.expires_in),
                access_token: long_lived.access_token,
            },
            Err(err) => {
                warn!(kind = err.kind(), "Long-lived token exchange failed; keeping short-lived token: {}", err);
                short_lived
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_matches_rfc7636_example() {
        assert_eq!(
            code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn token_expiry_tolerates_absurd_lifetimes() {
        let now = Utc::now();
        let fallback = now + Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS);

        assert_eq!(token_expiry(now, None), fallback);
        assert_eq!(token_expiry(now, Some(5_184_000)), now + Duration::days(60));
        assert_eq!(token_expiry(now, Some(i64::MAX)), fallback);
        assert_eq!(token_expiry(now, Some(i64::MAX / 1000)), fallback);
    }

    #[test]
    fn random_tokens_are_url_safe_and_distinct() {
        let a = random_token(STATE_BYTES);
        let b = random_token(STATE_BYTES);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(a.len(), 43);
        assert_eq!(random_token(VERIFIER_BYTES).len(), 86);
    }
}
