//! The `Job` entity (§3): a unit of work targeting exactly one cluster.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use crate::common::sql::Record;
use crate::common::{ClusterId, JobId};
use crate::errors::{Error, Result};

/// Closed enumeration of handler-dispatchable job types (§9 "dynamic
/// dispatch on job type → tagged variant"). `ScaleWorkers` and
/// `OrphanSweep` are reserved: registered in the handler registry but their
/// handler returns `PermanentFailure { code: "NOT_IMPLEMENTED", .. }`
/// immediately, per the open question resolved in DESIGN.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_type", rename_all = "snake_case")]
pub enum JobType {
    Create,
    Destroy,
    JanitorDestroy,
    ScaleWorkers,
    OrphanSweep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Retrying,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub id: JobId,
    pub cluster_id: ClusterId,
    pub job_type: JobType,
    pub status: JobStatus,
    pub attempt: i32,
    pub max_attempts: i32,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Json<serde_json::Value>,
    /// Set while `status == Retrying`: when the job becomes poll-eligible
    /// again. `None` otherwise.
    pub next_run_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Build a brand-new PENDING job ready for `JobQueue::enqueue`.
    pub fn new(cluster_id: ClusterId, job_type: JobType, max_attempts: i32) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            cluster_id,
            job_type,
            status: JobStatus::Pending,
            attempt: 0,
            max_attempts,
            error_code: None,
            error_message: None,
            started_at: None,
            ended_at: None,
            created_at: now,
            updated_at: now,
            metadata: Json(serde_json::Value::Object(Default::default())),
            next_run_at: None,
        }
    }

    /// §3 invariant: attempt count never exceeds max_attempts.
    pub fn has_attempts_remaining(&self) -> bool {
        self.attempt < self.max_attempts
    }
}

#[async_trait]
impl Record for Job {
    const TABLE: &'static str = "jobs";
    type Id = JobId;

    async fn find_by_id(id: JobId, db: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(db)
            .await
            .map_err(Error::from_sqlx)?
            .ok_or_else(|| Error::NotFound(format!("job {id}")))
    }

    async fn insert(&self, db: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (
                id, cluster_id, type, status, attempt, max_attempts,
                error_code, error_message, started_at, ended_at,
                created_at, updated_at, metadata, next_run_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.cluster_id)
        .bind(self.job_type)
        .bind(self.status)
        .bind(self.attempt)
        .bind(self.max_attempts)
        .bind(&self.error_code)
        .bind(&self.error_message)
        .bind(self.started_at)
        .bind(self.ended_at)
        .bind(self.created_at)
        .bind(self.updated_at)
        .bind(&self.metadata)
        .bind(self.next_run_at)
        .fetch_one(db)
        .await
        .map_err(Error::from_sqlx)
    }

    async fn update(&self, db: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs SET
                status = $2, attempt = $3, error_code = $4, error_message = $5,
                started_at = $6, ended_at = $7, updated_at = now(), metadata = $8,
                next_run_at = $9
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.status)
        .bind(self.attempt)
        .bind(&self.error_code)
        .bind(&self.error_message)
        .bind(self.started_at)
        .bind(self.ended_at)
        .bind(&self.metadata)
        .bind(self.next_run_at)
        .fetch_optional(db)
        .await
        .map_err(Error::from_sqlx)?
        .ok_or_else(|| Error::NotFound(format!("job {}", self.id)))
    }

    async fn delete(&self, db: &PgPool) -> Result<()> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(self.id)
            .execute(db)
            .await
            .map_err(Error::from_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("job {}", self.id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_starts_pending_at_attempt_zero() {
        let job = Job::new(ClusterId::new(), JobType::Create, 3);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempt, 0);
        assert!(job.has_attempts_remaining());
    }

    #[test]
    fn attempts_remaining_is_false_at_max() {
        let mut job = Job::new(ClusterId::new(), JobType::Create, 1);
        job.attempt = 1;
        assert!(!job.has_attempts_remaining());
    }
}
