//! The cluster-scoped exclusion lock (§4.5): at-most-one lease per cluster,
//! built directly on the persistence gateway.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::time::Duration;

use crate::common::{ClusterId, JobId};
use crate::errors::{Error, Result};

mod memory;
pub use memory::InMemoryLockManager;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobLock {
    pub cluster_id: ClusterId,
    pub job_id: JobId,
    pub locked_by: String,
    pub locked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of a `try_acquire` call — not an `Error`, since losing the race
/// is a normal, expected event (§7: `LockHeld` "is swallowed").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired,
    Held,
}

#[async_trait]
pub trait LockManager: Send + Sync {
    async fn try_acquire(
        &self,
        cluster_id: ClusterId,
        job_id: JobId,
        worker_id: &str,
        ttl: Duration,
    ) -> Result<AcquireOutcome>;

    /// Heartbeat: updates `expires_at` only if the `(cluster_id, job_id)`
    /// pair still matches. No-op (not an error) if the lock moved on.
    async fn extend(&self, cluster_id: ClusterId, job_id: JobId, new_ttl: Duration) -> Result<()>;

    /// Idempotent: deletes only matching rows.
    async fn release(&self, cluster_id: ClusterId, job_id: JobId) -> Result<()>;

    /// Deletes rows with `expires_at < now`, returning the reaped set so
    /// the janitor can act on them (fail the job, etc).
    async fn reap_expired(&self) -> Result<Vec<JobLock>>;
}

pub struct PostgresLockManager {
    pool: PgPool,
}

impl PostgresLockManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockManager for PostgresLockManager {
    async fn try_acquire(
        &self,
        cluster_id: ClusterId,
        job_id: JobId,
        worker_id: &str,
        ttl: Duration,
    ) -> Result<AcquireOutcome> {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).map_err(|e| Error::Internal(e.to_string()))?;

        let row = sqlx::query_as::<_, JobLock>(
            r#"
            INSERT INTO job_locks (cluster_id, job_id, locked_by, locked_at, expires_at)
            VALUES ($1, $2, $3, now(), $4)
            ON CONFLICT (cluster_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(cluster_id)
        .bind(job_id)
        .bind(worker_id)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;

        match row {
            Some(lock) if lock.job_id == job_id => Ok(AcquireOutcome::Acquired),
            _ => Ok(AcquireOutcome::Held),
        }
    }

    async fn extend(&self, cluster_id: ClusterId, job_id: JobId, new_ttl: Duration) -> Result<()> {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(new_ttl).map_err(|e| Error::Internal(e.to_string()))?;
        sqlx::query(
            "UPDATE job_locks SET expires_at = $1 WHERE cluster_id = $2 AND job_id = $3",
        )
        .bind(expires_at)
        .bind(cluster_id)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        Ok(())
    }

    async fn release(&self, cluster_id: ClusterId, job_id: JobId) -> Result<()> {
        sqlx::query("DELETE FROM job_locks WHERE cluster_id = $1 AND job_id = $2")
            .bind(cluster_id)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }

    async fn reap_expired(&self) -> Result<Vec<JobLock>> {
        sqlx::query_as::<_, JobLock>(
            "DELETE FROM job_locks WHERE expires_at < now() RETURNING *",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from_sqlx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_outcome_equality() {
        assert_eq!(AcquireOutcome::Acquired, AcquireOutcome::Acquired);
        assert_ne!(AcquireOutcome::Acquired, AcquireOutcome::Held);
    }
}
