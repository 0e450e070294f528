//! # Sync Job Tracker
//!
//! Wraps a unit of sync work in a SyncJob row: RUNNING before the work starts,
//! exactly one SUCCESS or FAILED transition afterwards, and the original
//! error handed back to the caller. Work for one user is serialized through
//! [`UserLocks`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as SyncMutex, PoisonError};
use std::time::Instant;

use metrics::{counter, histogram};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::repositories::SyncJobRepository;

type LockTable = Arc<SyncMutex<HashMap<String, Arc<Mutex<()>>>>>;

/// In-process, per-user async locks. Entries live only while a holder or
/// waiter exists.
#[derive(Clone, Default)]
pub struct UserLocks {
    locks: LockTable,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and hold the lock for `user_id`.
    pub async fn acquire(&self, user_id: &str) -> UserLockGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(user_id.to_string()).or_default().clone()
        };
        UserLockGuard {
            guard: Some(lock.lock_owned().await),
            user_id: user_id.to_string(),
            locks: self.locks.clone(),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Held lock for one user; releasing the last reference prunes its entry.
pub struct UserLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    user_id: String,
    locks: LockTable,
}

impl Drop for UserLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.user_id);
        }
    }
}

/// Output of tracked work together with the job that recorded it.
#[derive(Debug, Clone)]
pub struct TrackedRun<T> {
    pub job_id: Uuid,
    pub output: T,
}

#[derive(Clone)]
pub struct SyncJobTracker {
    jobs: SyncJobRepository,
    locks: UserLocks,
}

impl SyncJobTracker {
    pub fn new(jobs: SyncJobRepository, locks: UserLocks) -> Self {
        Self { jobs, locks }
    }

    pub fn jobs(&self) -> &SyncJobRepository {
        &self.jobs
    }

    /// Run `work` under a fresh SyncJob for `user_id`.
    ///
    /// On failure the job is marked FAILED with the error payload and the
    /// work's error is returned unchanged, even if recording the failure
    /// itself fails. Likewise a failed SUCCESS write is logged and the
    /// committed output is still returned.
    #[instrument(skip_all, fields(user_id = %user_id, credential_id = %credential_id))]
    pub async fn track<T, F, Fut>(
        &self,
        user_id: &str,
        credential_id: Uuid,
        work: F,
    ) -> Result<TrackedRun<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _guard = self.locks.acquire(user_id).await;

        let job = self.jobs.create_running(user_id, credential_id).await?;
        let started = Instant::now();

        let outcome = work().await;
        histogram!("ads_sync_duration_ms").record(started.elapsed().as_millis() as f64);

        match outcome {
            Ok(output) => {
                if let Err(mark_err) = self.jobs.mark_succeeded(job.id).await {
                    counter!("ads_sync_job_status_write_failures_total").increment(1);
                    error!(job_id = %job.id, "Failed to record sync job success: {}", mark_err);
                }
                counter!("ads_sync_runs_total", "outcome" => "success").increment(1);
                info!(job_id = %job.id, "Sync job succeeded");
                Ok(TrackedRun {
                    job_id: job.id,
                    output,
                })
            }
            Err(err) => {
                counter!("ads_sync_runs_total", "outcome" => "failure").increment(1);
                warn!(job_id = %job.id, kind = err.kind(), "Sync job failed: {}", err);

                if let Err(mark_err) = self.jobs.mark_failed(job.id, err.to_payload()).await {
                    error!(job_id = %job.id, "Failed to record sync job failure: {}", mark_err);
                }

                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_user_is_serialized() {
        let locks = UserLocks::new();
        let guard = locks.acquire("user_1").await;

        let contender = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = contender.acquire("user_1").await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("second acquire completes")
            .unwrap();
    }

    #[tokio::test]
    async fn released_locks_are_pruned() {
        let locks = UserLocks::new();
        let guard = locks.acquire("user_1").await;
        let contender = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = contender.acquire("user_1").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(guard);
        assert_eq!(locks.len(), 1, "waiter keeps the entry alive");

        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn different_users_do_not_block() {
        let locks = UserLocks::new();
        let _a = locks.acquire("user_a").await;
        tokio::time::timeout(Duration::from_millis(200), locks.acquire("user_b"))
            .await
            .expect("independent lock");
    }
}
