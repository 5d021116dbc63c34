//! The CREATE job handler (§4.8): renders an install descriptor, invokes the
//! external installer, and records the resulting outputs/artifacts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::clusters::{ArtifactType, Cluster, ClusterArtifact, ClusterOutputs, ClusterStatus};
use crate::common::sql::Record;
use crate::dispatcher::{HandlerContext, JobHandler};
use crate::errors::{Error, Result};
use crate::handlers::installer::{self, InstallerMode};
use crate::jobs::Job;
use crate::profiles::ProfileRegistry;
use crate::render::{InstallDescriptorRenderer, InstallDescriptorRequest, TagPair};

use super::{sha256_hex, transition_cluster};

#[derive(Debug, Deserialize)]
struct CreateJobMetadata {
    pull_secret: String,
}

/// Shape of the installer's `metadata.json`, written into work_dir on a
/// successful create. Only the fields this core actually consumes are
/// modeled — the rest of the document is opaque per §3's "location
/// reference, not parsed contents" wording.
#[derive(Debug, Deserialize)]
struct InstallerMetadata {
    #[serde(rename = "clusterName")]
    #[allow(dead_code)]
    cluster_name: Option<String>,
    #[serde(default)]
    api_url: Option<String>,
    #[serde(default)]
    console_url: Option<String>,
}

pub struct CreateHandler {
    profiles: ProfileRegistry,
    renderer: Arc<InstallDescriptorRenderer>,
    installer_binary_path: PathBuf,
    timeout: Duration,
}

impl CreateHandler {
    pub fn new(
        profiles: ProfileRegistry,
        renderer: Arc<InstallDescriptorRenderer>,
        installer_binary_path: PathBuf,
        timeout: Duration,
    ) -> Self {
        Self { profiles, renderer, installer_binary_path, timeout }
    }

    async fn capture_log_artifact(&self, cluster_id: crate::common::ClusterId, work_dir: &Path, pool: &sqlx::PgPool) {
        let log_path = work_dir.join(".openshift_install.log");
        match tokio::fs::read(&log_path).await {
            Ok(bytes) => {
                let checksum = sha256_hex(&bytes);
                let artifact = ClusterArtifact {
                    id: crate::common::ClusterArtifactId::new(),
                    cluster_id,
                    artifact_type: ArtifactType::Log,
                    storage_uri: format!("file://{}", log_path.display()),
                    checksum,
                    size_bytes: bytes.len() as i64,
                    created_at: chrono::Utc::now(),
                };
                if let Err(err) = artifact.insert(pool).await {
                    warn!(cluster_id = %cluster_id, error = %err, "failed to record install log artifact");
                }
            }
            Err(err) => {
                warn!(cluster_id = %cluster_id, error = %err, "install log unavailable for capture");
            }
        }
    }
}

#[async_trait]
impl JobHandler for CreateHandler {
    async fn handle(&self, job: &Job, ctx: &HandlerContext) -> Result<()> {
        let cluster = Cluster::find_by_id(job.cluster_id, &ctx.pool).await?;

        if cluster.status != ClusterStatus::Pending {
            return Err(Error::Permanent {
                code: "ILLEGAL_PRECONDITION".to_string(),
                message: format!("create handler requires PENDING, cluster is {:?}", cluster.status),
            });
        }

        let profile = self.profiles.get(&cluster.profile).ok_or_else(|| Error::Permanent {
            code: "UNKNOWN_PROFILE".to_string(),
            message: format!("profile {} is not loaded", cluster.profile),
        })?;

        let metadata: CreateJobMetadata = serde_json::from_value(job.metadata.0.clone()).map_err(|e| Error::Permanent {
            code: "MISSING_PULL_SECRET".to_string(),
            message: format!("job metadata does not carry a usable pull secret: {e}"),
        })?;

        let cluster = transition_cluster(&ctx.pool, cluster.id, ClusterStatus::Creating).await?;

        let work_dir = ctx.work_dir_for(cluster.id);
        tokio::fs::create_dir_all(&work_dir)
            .await
            .map_err(|e| Error::Internal(format!("creating work dir {}: {e}", work_dir.display())))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o755);
            tokio::fs::set_permissions(&work_dir, perms)
                .await
                .map_err(|e| Error::Internal(format!("setting work dir permissions: {e}")))?;
        }

        let tags: Vec<TagPair> = sorted_tags(&cluster.effective_tags.0);
        let request = InstallDescriptorRequest {
            cluster_name: cluster.name.clone(),
            base_domain: cluster.base_domain.clone(),
            region: cluster.region.clone(),
            version: cluster.version.clone(),
            ssh_public_key: cluster.ssh_public_key.clone(),
            pull_secret: metadata.pull_secret,
            tags,
            control_plane_replicas: profile.compute.control_plane.replicas,
            control_plane_instance_type: profile.compute.control_plane.instance_type.clone(),
            worker_replicas: profile.compute.workers.replicas,
            worker_instance_type: profile.compute.workers.instance_type.clone(),
            platform_config: profile
                .platform_config
                .get(profile.platform.as_str())
                .cloned()
                .unwrap_or(serde_json::Value::Null),
        };

        let rendered = self.renderer.render(&request, &profile)?;
        let descriptor_path = work_dir.join("install-config.yaml");
        tokio::fs::write(&descriptor_path, &rendered)
            .await
            .map_err(|e| Error::Internal(format!("writing install descriptor: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&descriptor_path, perms)
                .await
                .map_err(|e| Error::Internal(format!("setting install descriptor permissions: {e}")))?;
        }

        let install_result = installer::run(
            &self.installer_binary_path,
            InstallerMode::Create,
            &work_dir,
            self.timeout,
            &ctx.cancellation,
        )
        .await;

        if let Err(err) = install_result {
            self.capture_log_artifact(cluster.id, &work_dir, &ctx.pool).await;
            return Err(err);
        }

        self.capture_log_artifact(cluster.id, &work_dir, &ctx.pool).await;

        let metadata_path = work_dir.join("metadata.json");
        let installer_metadata: InstallerMetadata = match tokio::fs::read(&metadata_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| Error::Permanent {
                code: "BAD_INSTALLER_METADATA".to_string(),
                message: format!("installer metadata.json is not well-formed: {e}"),
            })?,
            Err(e) => {
                return Err(Error::Permanent {
                    code: "MISSING_INSTALLER_METADATA".to_string(),
                    message: format!("installer did not produce metadata.json: {e}"),
                })
            }
        };

        let kubeconfig_path = work_dir.join("auth").join("kubeconfig");
        let kubeadmin_path = work_dir.join("auth").join("kubeadmin-password");
        for (label, path) in [("kubeconfig", &kubeconfig_path), ("kubeadmin password", &kubeadmin_path)] {
            let exists = tokio::fs::try_exists(path).await.unwrap_or(false);
            if !exists {
                return Err(Error::Permanent {
                    code: "MISSING_INSTALLER_OUTPUT".to_string(),
                    message: format!("installer did not produce the expected {label} at {}", path.display()),
                });
            }
        }

        let outputs = ClusterOutputs {
            id: crate::common::ClusterOutputsId::new(),
            cluster_id: cluster.id,
            api_url: installer_metadata.api_url.unwrap_or_default(),
            console_url: installer_metadata.console_url.unwrap_or_default(),
            kubeconfig_location: format!("file://{}", kubeconfig_path.display()),
            kubeadmin_credential_location: format!("file://{}", kubeadmin_path.display()),
            metadata_location: format!("file://{}", metadata_path.display()),
            created_at: chrono::Utc::now(),
        };
        outputs.insert(&ctx.pool).await?;

        let kubeconfig_bytes = tokio::fs::read(&kubeconfig_path).await.unwrap_or_default();
        let kubeconfig_artifact = ClusterArtifact {
            id: crate::common::ClusterArtifactId::new(),
            cluster_id: cluster.id,
            artifact_type: ArtifactType::AuthBundle,
            storage_uri: format!("file://{}", kubeconfig_path.display()),
            checksum: sha256_hex(&kubeconfig_bytes),
            size_bytes: kubeconfig_bytes.len() as i64,
            created_at: chrono::Utc::now(),
        };
        kubeconfig_artifact.insert(&ctx.pool).await?;

        let metadata_artifact = ClusterArtifact {
            id: crate::common::ClusterArtifactId::new(),
            cluster_id: cluster.id,
            artifact_type: ArtifactType::Metadata,
            storage_uri: format!("file://{}", metadata_path.display()),
            checksum: sha256_hex(&tokio::fs::read(&metadata_path).await.unwrap_or_default()),
            size_bytes: tokio::fs::metadata(&metadata_path).await.map(|m| m.len() as i64).unwrap_or(0),
            created_at: chrono::Utc::now(),
        };
        metadata_artifact.insert(&ctx.pool).await?;

        transition_cluster(&ctx.pool, cluster.id, ClusterStatus::Ready).await?;

        crate::clusters::AuditEvent::new(
            cluster.id,
            Some(job.id),
            "cluster.created",
            serde_json::json!({ "profile": cluster.profile, "version": cluster.version }),
        )
        .record(&ctx.pool)
        .await?;

        info!(cluster_id = %cluster.id, "cluster created");
        Ok(())
    }
}

fn sorted_tags(tags: &BTreeMap<String, String>) -> Vec<TagPair> {
    tags.iter().map(|(key, value)| TagPair { key: key.clone(), value: value.clone() }).collect()
}
