//! The handler seam: one [`JobHandler`] impl per [`JobType`], looked up by
//! the dispatcher through a [`HandlerRegistry`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::errors::Result;
use crate::jobs::{Job, JobType};

/// Everything a handler needs beyond the job row itself: a pool handle for
/// its own gateway calls, the work_dir root to derive its per-cluster
/// working directory from, and the process-wide shutdown token so a
/// long-running installer invocation can honor cancellation between steps.
pub struct HandlerContext {
    pub pool: PgPool,
    pub work_dir_root: PathBuf,
    pub cancellation: CancellationToken,
}

impl HandlerContext {
    pub fn work_dir_for(&self, cluster_id: crate::common::ClusterId) -> PathBuf {
        self.work_dir_root.join(cluster_id.to_string())
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job, ctx: &HandlerContext) -> Result<()>;
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job_type: JobType, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_type, handler);
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&job_type).cloned()
    }
}
