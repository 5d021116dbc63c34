//! RAII lock release: the happy path calls [`LockGuard::release`]
//! explicitly, which releases and disarms the guard; every other exit
//! (early return, panic unwinding past the guard) runs `Drop` still armed,
//! which spawns a detached best-effort release. Rust has no async `Drop`,
//! so this is the closest equivalent to a guaranteed-exit release path
//! without a `scopeguard`-style sync closure (release itself is an async
//! database call).

use std::sync::Arc;

use crate::common::{ClusterId, JobId};
use crate::locks::LockManager;

pub struct LockGuard {
    locks: Arc<dyn LockManager>,
    cluster_id: ClusterId,
    job_id: JobId,
    armed: bool,
}

impl LockGuard {
    pub fn new(locks: Arc<dyn LockManager>, cluster_id: ClusterId, job_id: JobId) -> Self {
        Self { locks, cluster_id, job_id, armed: true }
    }

    /// Releases the lock now, then disarms `Drop` so it doesn't fire a
    /// second, redundant release.
    pub async fn release(mut self) {
        let _ = self.locks.release(self.cluster_id, self.job_id).await;
        self.armed = false;
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let locks = self.locks.clone();
        let cluster_id = self.cluster_id;
        let job_id = self.job_id;
        tokio::spawn(async move {
            let _ = locks.release(cluster_id, job_id).await;
        });
    }
}
