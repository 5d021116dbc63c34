//! `JobQueue`: the durable FIFO-ish queue over the persistence gateway
//! (§4.6). The trait/struct split lets a second, in-memory implementation
//! ([`crate::jobs::InMemoryJobQueue`]) exist side by side for dispatcher
//! unit tests without a database.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use std::time::Duration;

use super::model::{Job, JobStatus, JobType};
use crate::common::sql::Record;
use crate::common::{ClusterId, JobId};
use crate::errors::{Error, Result};

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, cluster_id: ClusterId, job_type: JobType, max_attempts: i32) -> Result<Job>;
    async fn fetch_pending(&self, limit: i64) -> Result<Vec<Job>>;
    async fn mark_started(&self, id: JobId) -> Result<Job>;
    async fn mark_succeeded(&self, id: JobId) -> Result<Job>;
    async fn mark_failed(&self, id: JobId, code: &str, message: &str) -> Result<Job>;
    /// Moves the job back to PENDING and increments `attempt`, immediately
    /// re-poll-eligible. Used when the dispatcher wants a fast retry.
    async fn increment_attempt(&self, id: JobId) -> Result<Job>;
    /// Sets status=RETRYING and schedules the transition back to PENDING
    /// after `backoff` — visibly in-flight-but-backing-off rather than
    /// immediately poll-eligible again (§4.6 expanded).
    async fn retry_after(&self, id: JobId, backoff: Duration) -> Result<Job>;
    async fn get_stuck(&self, threshold: Duration) -> Result<Vec<Job>>;
    async fn find_by_id(&self, id: JobId) -> Result<Job>;
    /// Whether a cluster has a live (non-terminal) job of the given type —
    /// used by the janitor's TTL sweep to avoid double-enqueuing a destroy.
    async fn has_live_job(&self, cluster_id: ClusterId, job_type: JobType) -> Result<bool>;
}

pub struct PostgresJobQueue {
    pool: PgPool,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn enqueue(&self, cluster_id: ClusterId, job_type: JobType, max_attempts: i32) -> Result<Job> {
        Job::new(cluster_id, job_type, max_attempts).insert(&self.pool).await
    }

    async fn fetch_pending(&self, limit: i64) -> Result<Vec<Job>> {
        // Durable stand-in for the in-process backoff timer (§4.6
        // expanded): flip any RETRYING job whose `next_run_at` has passed
        // back to PENDING before selecting, so a retry schedule survives
        // the worker process that set it dying mid-backoff — no job is
        // stranded in RETRYING forever waiting on a timer that's gone.
        sqlx::query(
            "UPDATE jobs SET status = 'pending', next_run_at = NULL, updated_at = now() \
             WHERE status = 'retrying' AND next_run_at <= now()",
        )
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;

        sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs WHERE status = 'pending' ORDER BY created_at ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from_sqlx)
    }

    async fn mark_started(&self, id: JobId) -> Result<Job> {
        let mut job = Job::find_by_id(id, &self.pool).await?;
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        job.update(&self.pool).await
    }

    async fn mark_succeeded(&self, id: JobId) -> Result<Job> {
        let mut job = Job::find_by_id(id, &self.pool).await?;
        job.status = JobStatus::Succeeded;
        job.ended_at = Some(Utc::now());
        job.update(&self.pool).await
    }

    async fn mark_failed(&self, id: JobId, code: &str, message: &str) -> Result<Job> {
        let mut job = Job::find_by_id(id, &self.pool).await?;
        job.status = JobStatus::Failed;
        job.error_code = Some(code.to_string());
        job.error_message = Some(message.to_string());
        job.ended_at = Some(Utc::now());
        job.update(&self.pool).await
    }

    async fn increment_attempt(&self, id: JobId) -> Result<Job> {
        let mut job = Job::find_by_id(id, &self.pool).await?;
        job.attempt += 1;
        job.status = JobStatus::Pending;
        job.update(&self.pool).await
    }

    async fn retry_after(&self, id: JobId, backoff: Duration) -> Result<Job> {
        let mut job = Job::find_by_id(id, &self.pool).await?;
        job.attempt += 1;
        job.status = JobStatus::Retrying;
        job.next_run_at = Some(
            Utc::now()
                + ChronoDuration::from_std(backoff).map_err(|e| Error::Internal(e.to_string()))?,
        );
        job.update(&self.pool).await
    }

    async fn get_stuck(&self, threshold: Duration) -> Result<Vec<Job>> {
        let cutoff: DateTime<Utc> = Utc::now() - ChronoDuration::from_std(threshold)
            .map_err(|e| Error::Internal(e.to_string()))?;
        sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs WHERE status = 'running' AND started_at < $1",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from_sqlx)
    }

    async fn find_by_id(&self, id: JobId) -> Result<Job> {
        Job::find_by_id(id, &self.pool).await
    }

    async fn has_live_job(&self, cluster_id: ClusterId, job_type: JobType) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM jobs
                WHERE cluster_id = $1 AND type = $2
                  AND status IN ('pending', 'running', 'retrying')
            )
            "#,
        )
        .bind(cluster_id)
        .bind(job_type)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        Ok(exists)
    }
}
