//! The janitor (§4.10): an independent periodic reaper, never touching the
//! cluster lock itself. Runs four ordered sweeps every tick so their
//! ordering is guaranteed and a single log line can summarize totals. Uses
//! a `tokio_cron_scheduler` fixed-interval job rather than a cron
//! expression, since the tick period here is an operator-tunable
//! `Duration`, not a calendar schedule.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing::{info, warn};

use crate::clusters::{Cluster, ClusterFilter, ClusterStatus, UsageSample};
use crate::common::Page;
use crate::errors::Result;
use crate::jobs::{JobQueue, JobType};
use crate::locks::LockManager;

#[derive(Debug, Clone)]
pub struct JanitorConfig {
    pub tick_interval: Duration,
    pub stuck_job_threshold: Duration,
    pub idempotency_ttl: Duration,
}

pub struct Janitor {
    pool: PgPool,
    queue: Arc<dyn JobQueue>,
    locks: Arc<dyn LockManager>,
    config: JanitorConfig,
}

#[derive(Debug, Default)]
struct TickSummary {
    destroys_enqueued: u64,
    jobs_marked_stuck: u64,
    locks_reaped: u64,
    idempotency_keys_gced: u64,
}

impl Janitor {
    pub fn new(pool: PgPool, queue: Arc<dyn JobQueue>, locks: Arc<dyn LockManager>, config: JanitorConfig) -> Self {
        Self { pool, queue, locks, config }
    }

    /// Wraps `self` in a `tokio_cron_scheduler::JobScheduler` with a single
    /// fixed-interval entry, started before returning. Dropping the returned
    /// scheduler stops future ticks; in-flight ticks still run to
    /// completion.
    pub async fn spawn_scheduled(self: Arc<Self>) -> anyhow::Result<JobScheduler> {
        let scheduler = JobScheduler::new().await?;

        let janitor = self.clone();
        let job = CronJob::new_repeated_async(self.config.tick_interval, move |_uuid, _lock| {
            let janitor = janitor.clone();
            Box::pin(async move {
                if let Err(err) = janitor.tick().await {
                    tracing::error!(error = %err, "janitor tick failed");
                }
            })
        })?;

        scheduler.add(job).await?;
        scheduler.start().await?;
        info!(tick_interval = ?self.config.tick_interval, "janitor scheduler started");
        Ok(scheduler)
    }

    /// Runs the four sweeps in order. Each sweep's own failures are logged
    /// and do not abort the remaining sweeps — one sweep's outage shouldn't
    /// starve the others.
    pub async fn tick(&self) -> Result<()> {
        let mut summary = TickSummary::default();

        if let Err(err) = self.ttl_sweep(&mut summary).await {
            warn!(error = %err, "janitor TTL sweep failed");
        }
        if let Err(err) = self.stuck_job_sweep(&mut summary).await {
            warn!(error = %err, "janitor stuck-job sweep failed");
        }
        if let Err(err) = self.expired_lock_sweep(&mut summary).await {
            warn!(error = %err, "janitor expired-lock sweep failed");
        }
        if let Err(err) = self.idempotency_gc(&mut summary).await {
            warn!(error = %err, "janitor idempotency GC failed");
        }

        info!(
            destroys_enqueued = summary.destroys_enqueued,
            jobs_marked_stuck = summary.jobs_marked_stuck,
            locks_reaped = summary.locks_reaped,
            idempotency_keys_gced = summary.idempotency_keys_gced,
            "janitor tick complete"
        );

        Ok(())
    }

    /// 1. For each cluster with `destroy_at <= now` and status in
    /// {READY, FAILED} and no live destroy job, enqueue JANITOR_DESTROY.
    async fn ttl_sweep(&self, summary: &mut TickSummary) -> Result<()> {
        let now = chrono::Utc::now();

        for status in [ClusterStatus::Ready, ClusterStatus::Failed] {
            let filter = ClusterFilter { status: Some(status), ..Default::default() };
            let mut offset = 0i64;
            loop {
                let page = Page::new(Some(100), Some(offset));
                let paged = Cluster::list(&filter, page, &self.pool).await?;
                if paged.rows.is_empty() {
                    break;
                }

                for cluster in &paged.rows {
                    let Some(destroy_at) = cluster.destroy_at else { continue };
                    if destroy_at > now {
                        continue;
                    }

                    let has_live_destroy = self.queue.has_live_job(cluster.id, JobType::Destroy).await?
                        || self.queue.has_live_job(cluster.id, JobType::JanitorDestroy).await?;
                    if has_live_destroy {
                        continue;
                    }

                    self.queue.enqueue(cluster.id, JobType::JanitorDestroy, 3).await?;
                    summary.destroys_enqueued += 1;
                    info!(cluster_id = %cluster.id, "TTL expired, enqueued janitor destroy");

                    let sample = UsageSample::new(cluster.id, 0, 0);
                    if let Err(err) = sample.record(&self.pool).await {
                        warn!(cluster_id = %cluster.id, error = %err, "failed to record opportunistic usage sample");
                    }
                }

                offset += paged.rows.len() as i64;
                if offset >= paged.total {
                    break;
                }
            }
        }

        Ok(())
    }

    /// 2. For each job RUNNING with `started_at < now - stuck_threshold`,
    /// mark it FAILED(WORKER_TIMEOUT), release its lock, fail the cluster.
    async fn stuck_job_sweep(&self, summary: &mut TickSummary) -> Result<()> {
        let stuck = self.queue.get_stuck(self.config.stuck_job_threshold).await?;

        for job in stuck {
            warn!(job_id = %job.id, cluster_id = %job.cluster_id, "job stuck in RUNNING, reaping");

            self.queue.mark_failed(job.id, "WORKER_TIMEOUT", "job exceeded the stuck-job threshold").await?;
            self.locks.release(job.cluster_id, job.id).await?;

            if let Ok(cluster) = Cluster::find_by_id(job.cluster_id, &self.pool).await {
                if cluster.status.is_legal_transition(ClusterStatus::Failed) {
                    let mut tx = self.pool.begin().await.map_err(crate::errors::Error::from_sqlx)?;
                    let locked = Cluster::get_for_update(job.cluster_id, &mut tx).await?;
                    if let Ok(failed) = locked.transition_to(ClusterStatus::Failed) {
                        sqlx::query("UPDATE clusters SET status = $1, updated_at = now() WHERE id = $2")
                            .bind(failed.status)
                            .bind(failed.id)
                            .execute(&mut *tx)
                            .await
                            .map_err(crate::errors::Error::from_sqlx)?;
                        tx.commit().await.map_err(crate::errors::Error::from_sqlx)?;
                    } else {
                        tx.rollback().await.map_err(crate::errors::Error::from_sqlx)?;
                    }
                }
            }

            crate::clusters::AuditEvent::new(
                job.cluster_id,
                Some(job.id),
                "job.stuck_reaped",
                serde_json::json!({ "threshold_secs": self.config.stuck_job_threshold.as_secs() }),
            )
            .record(&self.pool)
            .await?;

            summary.jobs_marked_stuck += 1;
        }

        Ok(())
    }

    /// 3. `reap_expired()`; log each reaped lock.
    async fn expired_lock_sweep(&self, summary: &mut TickSummary) -> Result<()> {
        let reaped = self.locks.reap_expired().await?;
        for lock in &reaped {
            warn!(cluster_id = %lock.cluster_id, job_id = %lock.job_id, locked_by = %lock.locked_by, "reaped expired lock");
        }
        summary.locks_reaped = reaped.len() as u64;
        Ok(())
    }

    /// 4. Delete idempotency keys past expiry.
    async fn idempotency_gc(&self, summary: &mut TickSummary) -> Result<()> {
        summary.idempotency_keys_gced = crate::idempotency::gc_expired(&self.pool).await?;
        Ok(())
    }
}
