//! # Sync Service
//!
//! Entry points that turn a user id into a tracked sync pass: validate the
//! credential, bind an API client to the token, and run the engine under a
//! SyncJob.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use tracing::instrument;

use crate::error::Result;
use crate::facebook::AdsApiFactory;
use crate::job_tracker::{SyncJobTracker, TrackedRun};
use crate::sync_engine::{RefreshParams, SyncCounts, SyncEngine};
use crate::validator::CredentialValidator;

#[derive(Clone)]
pub struct SyncService {
    validator: CredentialValidator,
    api_factory: Arc<dyn AdsApiFactory>,
    engine: SyncEngine,
    tracker: SyncJobTracker,
    lookback_days: u32,
}

impl SyncService {
    pub fn new(
        validator: CredentialValidator,
        api_factory: Arc<dyn AdsApiFactory>,
        engine: SyncEngine,
        tracker: SyncJobTracker,
        lookback_days: u32,
    ) -> Self {
        Self {
            validator,
            api_factory,
            engine,
            tracker,
            lookback_days,
        }
    }

    /// User-requested refresh; `since` narrows the insight window.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn manual_refresh(
        &self,
        user_id: &str,
        since: Option<NaiveDate>,
    ) -> Result<TrackedRun<SyncCounts>> {
        self.run(user_id, since, false).await
    }

    /// Full pull that stamps every account as initially synced.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn initialize_workspace(&self, user_id: &str) -> Result<TrackedRun<SyncCounts>> {
        self.run(user_id, None, true).await
    }

    /// Background refresh over the trailing lookback window.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn scheduled_refresh(&self, user_id: &str) -> Result<TrackedRun<SyncCounts>> {
        let since = Utc::now().date_naive() - Duration::days(i64::from(self.lookback_days));
        self.run(user_id, Some(since), false).await
    }

    async fn run(
        &self,
        user_id: &str,
        since: Option<NaiveDate>,
        mark_initial_sync: bool,
    ) -> Result<TrackedRun<SyncCounts>> {
        let token = self.validator.ensure_valid_token(user_id).await?;
        let api = self.api_factory.for_token(token.access_token);

        self.tracker
            .track(user_id, token.credential_id, || {
                self.engine.refresh(RefreshParams {
                    user_id,
                    credential_id: token.credential_id,
                    api: api.as_ref(),
                    since,
                    mark_initial_sync,
                })
            })
            .await
    }
}
