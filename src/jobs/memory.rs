//! An in-memory [`JobQueue`] for unit tests of the dispatcher that don't
//! need a real database (§4.6 expanded).

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::model::{Job, JobStatus, JobType};
use super::queue::JobQueue;
use crate::common::{ClusterId, JobId};
use crate::errors::{Error, Result};

#[derive(Default)]
pub struct InMemoryJobQueue {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: snapshot every job currently held, for assertions.
    pub fn all(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, cluster_id: ClusterId, job_type: JobType, max_attempts: i32) -> Result<Job> {
        let job = Job::new(cluster_id, job_type, max_attempts);
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(job)
    }

    async fn fetch_pending(&self, limit: i64) -> Result<Vec<Job>> {
        let jobs = self.jobs.lock().unwrap();
        let mut pending: Vec<Job> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|j| j.created_at);
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn mark_started(&self, id: JobId) -> Result<Job> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&id).ok_or_else(|| Error::NotFound(format!("job {id}")))?;
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        Ok(job.clone())
    }

    async fn mark_succeeded(&self, id: JobId) -> Result<Job> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&id).ok_or_else(|| Error::NotFound(format!("job {id}")))?;
        job.status = JobStatus::Succeeded;
        job.ended_at = Some(Utc::now());
        Ok(job.clone())
    }

    async fn mark_failed(&self, id: JobId, code: &str, message: &str) -> Result<Job> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&id).ok_or_else(|| Error::NotFound(format!("job {id}")))?;
        job.status = JobStatus::Failed;
        job.error_code = Some(code.to_string());
        job.error_message = Some(message.to_string());
        job.ended_at = Some(Utc::now());
        Ok(job.clone())
    }

    async fn increment_attempt(&self, id: JobId) -> Result<Job> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&id).ok_or_else(|| Error::NotFound(format!("job {id}")))?;
        job.attempt += 1;
        job.status = JobStatus::Pending;
        Ok(job.clone())
    }

    async fn retry_after(&self, id: JobId, _backoff: Duration) -> Result<Job> {
        // Deterministic for tests: skip the real sleep, go straight back to
        // pending so assertions don't need to await a timer.
        self.increment_attempt(id).await
    }

    async fn get_stuck(&self, threshold: Duration) -> Result<Vec<Job>> {
        let cutoff = Utc::now() - chrono::Duration::from_std(threshold).unwrap();
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .values()
            .filter(|j| j.status == JobStatus::Running && j.started_at.map(|s| s < cutoff).unwrap_or(false))
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: JobId) -> Result<Job> {
        self.jobs
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("job {id}")))
    }

    async fn has_live_job(&self, cluster_id: ClusterId, job_type: JobType) -> Result<bool> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs.values().any(|j| {
            j.cluster_id == cluster_id
                && j.job_type == job_type
                && matches!(j.status, JobStatus::Pending | JobStatus::Running | JobStatus::Retrying)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_then_fetch_pending() {
        let queue = InMemoryJobQueue::new();
        let cluster_id = ClusterId::new();
        let job = queue.enqueue(cluster_id, JobType::Create, 3).await.unwrap();

        let pending = queue.fetch_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, job.id);
    }

    #[tokio::test]
    async fn mark_started_then_succeeded() {
        let queue = InMemoryJobQueue::new();
        let job = queue.enqueue(ClusterId::new(), JobType::Create, 3).await.unwrap();
        queue.mark_started(job.id).await.unwrap();
        let job = queue.mark_succeeded(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert!(job.ended_at.is_some());
    }

    #[tokio::test]
    async fn increment_attempt_returns_job_to_pending() {
        let queue = InMemoryJobQueue::new();
        let job = queue.enqueue(ClusterId::new(), JobType::Create, 3).await.unwrap();
        queue.mark_started(job.id).await.unwrap();
        let job = queue.increment_attempt(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempt, 1);
    }

    #[tokio::test]
    async fn has_live_job_detects_pending_destroy() {
        let queue = InMemoryJobQueue::new();
        let cluster_id = ClusterId::new();
        assert!(!queue.has_live_job(cluster_id, JobType::Destroy).await.unwrap());
        queue.enqueue(cluster_id, JobType::Destroy, 3).await.unwrap();
        assert!(queue.has_live_job(cluster_id, JobType::Destroy).await.unwrap());
    }
}
