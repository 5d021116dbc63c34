//! The DESTROY/JANITOR_DESTROY job handler (§4.9): convergent teardown. A
//! missing work_dir is treated as "already destroyed"; a failing installer
//! exit does not block the transition to DESTROYED once the work_dir has
//! been consumed, since there is no synchronous operator channel in this
//! core to gate convergence on (decision recorded in DESIGN.md).

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::clusters::{ArtifactType, Cluster, ClusterArtifact, ClusterStatus};
use crate::common::sql::Record;
use crate::dispatcher::{HandlerContext, JobHandler};
use crate::errors::{Error, Result};
use crate::handlers::installer::{self, InstallerMode};
use crate::jobs::Job;

use super::{sha256_hex, transition_cluster};

pub struct DestroyHandler {
    installer_binary_path: PathBuf,
    timeout: Duration,
}

impl DestroyHandler {
    pub fn new(installer_binary_path: PathBuf, timeout: Duration) -> Self {
        Self { installer_binary_path, timeout }
    }

    /// Converges `cluster` to DESTROYED. The state machine only allows
    /// `Destroying -> Destroyed` (§3), so a cluster arriving here straight
    /// from READY/FAILED (the no-work-dir path) is routed through
    /// DESTROYING first rather than skipping the edge.
    async fn finalize(&self, cluster: &Cluster, job: &Job, ctx: &HandlerContext, destroy_warning: bool) -> Result<()> {
        if cluster.status != ClusterStatus::Destroyed {
            if cluster.status != ClusterStatus::Destroying {
                transition_cluster(&ctx.pool, cluster.id, ClusterStatus::Destroying).await?;
            }
            transition_cluster(&ctx.pool, cluster.id, ClusterStatus::Destroyed).await?;
        }

        let kind = if destroy_warning { "cluster.destroy_warning" } else { "cluster.destroyed" };
        crate::clusters::AuditEvent::new(cluster.id, Some(job.id), kind, serde_json::json!({}))
            .record(&ctx.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl JobHandler for DestroyHandler {
    async fn handle(&self, job: &Job, ctx: &HandlerContext) -> Result<()> {
        let cluster = Cluster::find_by_id(job.cluster_id, &ctx.pool).await?;

        if cluster.status == ClusterStatus::Destroyed {
            // Already converged by a prior attempt; nothing left to do.
            return Ok(());
        }

        let work_dir = ctx.work_dir_for(cluster.id);
        let work_dir_exists = tokio::fs::try_exists(&work_dir).await.unwrap_or(false);

        if !work_dir_exists {
            info!(cluster_id = %cluster.id, "no work dir found, treating cluster as already destroyed");
            return self.finalize(&cluster, job, ctx, false).await;
        }

        if cluster.status != ClusterStatus::Destroying {
            transition_cluster(&ctx.pool, cluster.id, ClusterStatus::Destroying).await?;
        }

        let install_result = installer::run(
            &self.installer_binary_path,
            InstallerMode::Destroy,
            &work_dir,
            self.timeout,
            &ctx.cancellation,
        )
        .await;

        // A shutdown-cancelled teardown must not be recorded as a completed
        // destroy (§5 "handlers must honor cancellation"): propagate it
        // unconverged so the dispatcher leaves the job PENDING for retry,
        // rather than folding it into the best-effort "installer failed"
        // convergence path below.
        if let Err(Error::Cancelled) = &install_result {
            return Err(Error::Cancelled);
        }

        let destroy_warning = if let Err(err) = &install_result {
            warn!(cluster_id = %cluster.id, error = %err, "installer destroy exited non-zero, converging anyway");
            true
        } else {
            false
        };

        let log_path = work_dir.join(".openshift_install.log");
        if let Ok(bytes) = tokio::fs::read(&log_path).await {
            let artifact = ClusterArtifact {
                id: crate::common::ClusterArtifactId::new(),
                cluster_id: cluster.id,
                artifact_type: ArtifactType::DestroyLog,
                storage_uri: format!("file://{}", log_path.display()),
                checksum: sha256_hex(&bytes),
                size_bytes: bytes.len() as i64,
                created_at: chrono::Utc::now(),
            };
            if let Err(err) = artifact.insert(&ctx.pool).await {
                warn!(cluster_id = %cluster.id, error = %err, "failed to record destroy log artifact");
            }
        }

        if let Err(err) = tokio::fs::remove_dir_all(&work_dir).await {
            warn!(cluster_id = %cluster.id, error = %err, "failed to remove work dir after destroy");
        }

        self.finalize(&cluster, job, ctx, destroy_warning).await
    }
}
