//! # Refresh Scheduler
//!
//! Background task that periodically refreshes every usable credential over
//! the configured lookback window, purges stale OAuth sessions and reports
//! how many users need to re-authorize.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use metrics::{counter, gauge, histogram};
use rand::Rng;
use tokio::sync::Semaphore;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::RefreshConfig;
use crate::error::Result;
use crate::repositories::{CredentialRepository, OAuthSessionRepository};
use crate::sync_service::SyncService;

/// Upper bound of the per-credential jitter before the factor is applied.
const JITTER_WINDOW_MS: f64 = 60_000.0;

/// Counters for one tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickStats {
    pub eligible: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub sessions_purged: u64,
    pub requiring_reauth: u64,
}

#[derive(Clone)]
pub struct RefreshScheduler {
    config: RefreshConfig,
    credentials: CredentialRepository,
    sessions: OAuthSessionRepository,
    sync: SyncService,
}

impl RefreshScheduler {
    pub fn new(
        config: RefreshConfig,
        credentials: CredentialRepository,
        sessions: OAuthSessionRepository,
        sync: SyncService,
    ) -> Self {
        Self {
            config,
            credentials,
            sessions,
            sync,
        }
    }

    /// Run the refresh loop until the provided shutdown token fires
    #[instrument(skip_all)]
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            tick_seconds = self.config.tick_seconds,
            "Starting refresh scheduler"
        );
        let tick_interval = Duration::from_secs(self.config.tick_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Refresh scheduler shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let tick_started = Instant::now();
                    if let Err(err) = self.tick().await {
                        error!(error = %err, "Refresh tick failed");
                    }
                    histogram!("scheduled_refresh_tick_duration_ms")
                        .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Refresh scheduler stopped");
    }

    /// Execute one tick. Individual user failures are counted, not returned.
    #[instrument(skip_all)]
    pub async fn tick(&self) -> Result<TickStats> {
        let mut stats = TickStats::default();

        stats.sessions_purged = self.sessions.purge_expired().await?;

        let eligible = self.credentials.list_eligible_for_refresh(Utc::now()).await?;
        stats.eligible = eligible.len() as u64;
        info!(eligible = stats.eligible, "Found credentials eligible for refresh");

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1) as usize));
        let mut handles = Vec::with_capacity(eligible.len());

        for credential in eligible {
            let semaphore = semaphore.clone();
            let scheduler = self.clone();
            let user_id = credential.user_id;

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                scheduler.refresh_with_jitter(&user_id).await
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(Ok(())) => stats.succeeded += 1,
                Ok(Err(())) => stats.failed += 1,
                Err(e) => {
                    stats.failed += 1;
                    error!(error = ?e, "Refresh task panicked or was cancelled");
                }
            }
        }

        stats.requiring_reauth = self.credentials.count_requiring_reauth(Utc::now()).await?;

        gauge!("credentials_requiring_reauth").set(stats.requiring_reauth as f64);
        counter!("scheduled_refresh_success_total").increment(stats.succeeded);
        counter!("scheduled_refresh_failure_total").increment(stats.failed);

        debug!(
            eligible = stats.eligible,
            succeeded = stats.succeeded,
            failed = stats.failed,
            sessions_purged = stats.sessions_purged,
            requiring_reauth = stats.requiring_reauth,
            "Refresh tick completed"
        );

        Ok(stats)
    }

    async fn refresh_with_jitter(&self, user_id: &str) -> std::result::Result<(), ()> {
        let jitter_ms = self.compute_jitter_ms();
        if jitter_ms > 0 {
            debug!(user_id = %user_id, jitter_ms, "Applying jitter before refresh");
            sleep(Duration::from_millis(jitter_ms)).await;
        }

        match self.sync.scheduled_refresh(user_id).await {
            Ok(run) => {
                info!(user_id = %user_id, job_id = %run.job_id, insights = run.output.insights, "Scheduled refresh completed");
                Ok(())
            }
            Err(err) => {
                warn!(user_id = %user_id, kind = err.kind(), "Scheduled refresh failed: {}", err);
                Err(())
            }
        }
    }

    fn compute_jitter_ms(&self) -> u64 {
        if self.config.jitter_factor <= 0.0 {
            return 0;
        }

        let max_delay_ms = (JITTER_WINDOW_MS * self.config.jitter_factor) as u64;
        rand::thread_rng().gen_range(0..=max_delay_ms)
    }
}
