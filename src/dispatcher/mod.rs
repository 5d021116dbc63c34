//! The dispatcher: the worker loop. Polls pending jobs, acquires the
//! cluster-scoped lock, dispatches to a typed handler, and reconciles the
//! result back onto the job and (on terminal failure) the cluster.
//!
//! Each pending job gets its own concurrent task bounded by a lock and a
//! heartbeat that extends the lock's TTL for the duration of the handler.

mod handler;
mod lock_guard;

pub use handler::{HandlerContext, HandlerRegistry, JobHandler};
pub use lock_guard::LockGuard;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clusters::{Cluster, ClusterStatus};
use crate::jobs::{Job, JobQueue, JobType};
use crate::locks::{AcquireOutcome, LockManager};
use crate::{Error, HandlerOutcome};

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub worker_id: String,
    pub poll_interval: Duration,
    pub lock_ttl: Duration,
    pub work_dir_root: std::path::PathBuf,
    pub max_concurrent: i64,
    pub retry_backoff: Duration,
    pub max_retries: i32,
}

pub struct Dispatcher {
    pool: PgPool,
    queue: Arc<dyn JobQueue>,
    locks: Arc<dyn LockManager>,
    registry: Arc<HandlerRegistry>,
    config: DispatcherConfig,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        pool: PgPool,
        queue: Arc<dyn JobQueue>,
        locks: Arc<dyn LockManager>,
        registry: Arc<HandlerRegistry>,
        config: DispatcherConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self { pool, queue, locks, registry, config, shutdown }
    }

    /// Runs until `shutdown` fires. Never starts a new poll cycle after
    /// that point; in-flight per-job tasks are given until they return (no
    /// hard deadline here — the process wiring applies the grace period by
    /// racing this future against a timeout before it force-exits).
    pub async fn run(self: Arc<Self>) {
        info!(worker_id = %self.config.worker_id, "dispatcher starting");

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let jobs = match self.queue.fetch_pending(self.config.max_concurrent).await {
                Ok(jobs) => jobs,
                Err(err) => {
                    error!(error = %err, "failed to fetch pending jobs");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            if jobs.is_empty() {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
                continue;
            }

            debug!(count = jobs.len(), "claimed jobs");

            let tasks: Vec<_> = jobs
                .into_iter()
                .map(|job| {
                    let dispatcher = self.clone();
                    tokio::spawn(async move { dispatcher.process_job(job).await })
                })
                .collect();

            futures::future::join_all(tasks).await;
        }

        info!(worker_id = %self.config.worker_id, "dispatcher stopped");
    }

    async fn process_job(&self, job: Job) {
        let job_id = job.id;
        let cluster_id = job.cluster_id;

        match self
            .locks
            .try_acquire(cluster_id, job_id, &self.config.worker_id, self.config.lock_ttl)
            .await
        {
            Ok(AcquireOutcome::Held) => {
                debug!(job_id = %job_id, cluster_id = %cluster_id, "cluster lock held, leaving job pending");
                return;
            }
            Ok(AcquireOutcome::Acquired) => {}
            Err(err) => {
                error!(job_id = %job_id, error = %err, "failed to acquire cluster lock");
                return;
            }
        }

        let guard = LockGuard::new(self.locks.clone(), cluster_id, job_id);

        if let Err(err) = self.queue.mark_started(job_id).await {
            error!(job_id = %job_id, error = %err, "failed to mark job started");
            guard.release().await;
            return;
        }

        let handler = match self.registry.get(job.job_type) {
            Some(handler) => handler,
            None => {
                error!(job_id = %job_id, job_type = ?job.job_type, "no handler registered for job type");
                let _ = self.queue.mark_failed(job_id, "NO_HANDLER", "no handler registered for job type").await;
                guard.release().await;
                return;
            }
        };

        let heartbeat_cancel = CancellationToken::new();
        let heartbeat_handle = self.spawn_heartbeat(cluster_id, job_id, heartbeat_cancel.clone());

        let ctx = HandlerContext {
            pool: self.pool.clone(),
            work_dir_root: self.config.work_dir_root.clone(),
            cancellation: self.shutdown.clone(),
        };

        let outcome = match AssertUnwindSafe(handler.handle(&job, &ctx)).catch_unwind().await {
            Ok(Ok(())) => HandlerOutcome::Success,
            Ok(Err(err)) => HandlerOutcome::from(err),
            Err(panic) => {
                let message = panic_message(&panic);
                error!(job_id = %job_id, panic = %message, "handler panicked");
                classify_panic_message(&message)
            }
        };

        heartbeat_cancel.cancel();
        let _ = heartbeat_handle.await;

        self.reconcile(&job, outcome, guard).await;
    }

    fn spawn_heartbeat(
        &self,
        cluster_id: crate::common::ClusterId,
        job_id: crate::common::JobId,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let locks = self.locks.clone();
        let interval = (self.config.lock_ttl / 3).max(Duration::from_secs(1));
        let ttl = self.config.lock_ttl;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = locks.extend(cluster_id, job_id, ttl).await {
                            warn!(job_id = %job_id, error = %err, "lock heartbeat failed");
                        }
                    }
                }
            }
        })
    }

    async fn reconcile(&self, job: &Job, outcome: HandlerOutcome, guard: LockGuard) {
        let job_id = job.id;

        match outcome {
            HandlerOutcome::Success => {
                if let Err(err) = self.queue.mark_succeeded(job_id).await {
                    error!(job_id = %job_id, error = %err, "failed to mark job succeeded");
                }
            }
            HandlerOutcome::Cancelled => {
                // Shutdown raced the handler; leave the job PENDING (no
                // attempt increment) so the next process picks it back up.
                debug!(job_id = %job_id, "job cancelled by shutdown, leaving pending for retry");
            }
            HandlerOutcome::TransientFailure { code, message } => {
                warn!(job_id = %job_id, code = %code, message = %message, "job failed transiently");
                self.retry_or_fail(job, &code, &message).await;
            }
            HandlerOutcome::PermanentFailure { code, message } => {
                warn!(job_id = %job_id, code = %code, message = %message, "job failed permanently");
                if let Err(err) = self.queue.mark_failed(job_id, &code, &message).await {
                    error!(job_id = %job_id, error = %err, "failed to mark job failed");
                }
                self.finalize_cluster_failure(job).await;
            }
        }

        guard.release().await;
    }

    async fn retry_or_fail(&self, job: &Job, code: &str, message: &str) {
        let job_id = job.id;
        // The dispatcher's own `max_retries` is a process-wide ceiling on
        // attempts, independent of whatever `max_attempts` the job was
        // enqueued with — whichever bound is tighter wins.
        let attempt_cap = job.max_attempts.min(self.config.max_retries);
        if job.attempt + 1 >= attempt_cap {
            if let Err(err) = self.queue.mark_failed(job_id, code, message).await {
                error!(job_id = %job_id, error = %err, "failed to mark job failed");
            }
            self.finalize_cluster_failure(job).await;
            return;
        }

        let backoff = self.config.retry_backoff * 2u32.pow(job.attempt.max(0) as u32);
        if let Err(err) = self.queue.retry_after(job_id, backoff).await {
            error!(job_id = %job_id, error = %err, "failed to schedule job retry");
        }
    }

    /// CREATE failures transition the cluster to FAILED; DESTROY-family
    /// failures leave the cluster's status alone for operator review
    /// (§4.7 step 5).
    async fn finalize_cluster_failure(&self, job: &Job) {
        if job.job_type != JobType::Create {
            return;
        }

        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(err) => {
                error!(cluster_id = %job.cluster_id, error = %err, "failed to open transaction for cluster failure transition");
                return;
            }
        };

        let cluster = match Cluster::get_for_update(job.cluster_id, &mut tx).await {
            Ok(c) => c,
            Err(err) => {
                error!(cluster_id = %job.cluster_id, error = %err, "failed to load cluster for failure transition");
                return;
            }
        };

        if !cluster.status.is_legal_transition(ClusterStatus::Failed) {
            let _ = tx.rollback().await;
            return;
        }

        let cluster = match cluster.transition_to(ClusterStatus::Failed) {
            Ok(c) => c,
            Err(err) => {
                error!(cluster_id = %job.cluster_id, error = %err, "illegal cluster transition to FAILED");
                let _ = tx.rollback().await;
                return;
            }
        };

        if let Err(err) = sqlx::query(
            "UPDATE clusters SET status = $1, updated_at = now() WHERE id = $2",
        )
        .bind(cluster.status)
        .bind(cluster.id)
        .execute(&mut *tx)
        .await
        {
            error!(cluster_id = %job.cluster_id, error = %err, "failed to persist cluster FAILED transition");
            let _ = tx.rollback().await;
            return;
        }

        if let Err(err) = tx.commit().await {
            error!(cluster_id = %job.cluster_id, error = %err, "failed to commit cluster FAILED transition");
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Fallback classifier for panic messages, which never carry a typed
/// `Error`. Defaults to permanent, since an uncaught panic inside a handler
/// almost always indicates a programming error rather than an environmental
/// hiccup.
fn classify_panic_message(message: &str) -> HandlerOutcome {
    let lower = message.to_lowercase();
    if lower.contains("timeout") || lower.contains("connection") || lower.contains("unavailable") {
        HandlerOutcome::TransientFailure { code: "PANIC".to_string(), message: message.to_string() }
    } else {
        HandlerOutcome::PermanentFailure { code: "PANIC".to_string(), message: message.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_panic_message_prefers_transient_on_timeout_wording() {
        let outcome = classify_panic_message("request timeout after 30s");
        assert!(matches!(outcome, HandlerOutcome::TransientFailure { .. }));
    }

    #[test]
    fn classify_panic_message_defaults_to_permanent() {
        let outcome = classify_panic_message("index out of bounds: the len is 0 but the index is 3");
        assert!(matches!(outcome, HandlerOutcome::PermanentFailure { .. }));
    }
}
