//! An in-memory [`LockManager`] for dispatcher unit tests, paired with
//! [`crate::jobs::InMemoryJobQueue`].

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::{AcquireOutcome, JobLock, LockManager};
use crate::common::{ClusterId, JobId};
use crate::errors::{Error, Result};

#[derive(Default)]
pub struct InMemoryLockManager {
    locks: Mutex<HashMap<ClusterId, JobLock>>,
}

impl InMemoryLockManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockManager for InMemoryLockManager {
    async fn try_acquire(
        &self,
        cluster_id: ClusterId,
        job_id: JobId,
        worker_id: &str,
        ttl: Duration,
    ) -> Result<AcquireOutcome> {
        let mut locks = self.locks.lock().unwrap();
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(ttl).map_err(|e| Error::Internal(e.to_string()))?;

        match locks.get(&cluster_id) {
            Some(existing) if existing.expires_at > now => Ok(AcquireOutcome::Held),
            _ => {
                locks.insert(
                    cluster_id,
                    JobLock {
                        cluster_id,
                        job_id,
                        locked_by: worker_id.to_string(),
                        locked_at: now,
                        expires_at,
                    },
                );
                Ok(AcquireOutcome::Acquired)
            }
        }
    }

    async fn extend(&self, cluster_id: ClusterId, job_id: JobId, new_ttl: Duration) -> Result<()> {
        let mut locks = self.locks.lock().unwrap();
        if let Some(lock) = locks.get_mut(&cluster_id) {
            if lock.job_id == job_id {
                lock.expires_at = Utc::now()
                    + chrono::Duration::from_std(new_ttl).map_err(|e| Error::Internal(e.to_string()))?;
            }
        }
        Ok(())
    }

    async fn release(&self, cluster_id: ClusterId, job_id: JobId) -> Result<()> {
        let mut locks = self.locks.lock().unwrap();
        if locks.get(&cluster_id).map(|l| l.job_id) == Some(job_id) {
            locks.remove(&cluster_id);
        }
        Ok(())
    }

    async fn reap_expired(&self) -> Result<Vec<JobLock>> {
        let mut locks = self.locks.lock().unwrap();
        let now = Utc::now();
        let (expired, live): (Vec<_>, Vec<_>) = locks.drain().partition(|(_, l)| l.expires_at < now);
        *locks = live.into_iter().collect();
        Ok(expired.into_iter().map(|(_, l)| l).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_is_held_until_release() {
        let locks = InMemoryLockManager::new();
        let cluster_id = ClusterId::new();
        let job_a = JobId::new();
        let job_b = JobId::new();

        assert_eq!(
            locks.try_acquire(cluster_id, job_a, "worker-a", Duration::from_secs(60)).await.unwrap(),
            AcquireOutcome::Acquired
        );
        assert_eq!(
            locks.try_acquire(cluster_id, job_b, "worker-b", Duration::from_secs(60)).await.unwrap(),
            AcquireOutcome::Held
        );

        locks.release(cluster_id, job_a).await.unwrap();
        assert_eq!(
            locks.try_acquire(cluster_id, job_b, "worker-b", Duration::from_secs(60)).await.unwrap(),
            AcquireOutcome::Acquired
        );
    }

    #[tokio::test]
    async fn reap_expired_removes_only_past_due_locks() {
        let locks = InMemoryLockManager::new();
        let cluster_id = ClusterId::new();
        let job_id = JobId::new();
        locks
            .try_acquire(cluster_id, job_id, "worker-a", Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let reaped = locks.reap_expired().await.unwrap();
        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].cluster_id, cluster_id);
    }
}
