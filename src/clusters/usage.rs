//! `UsageSample` (expanded, §3): a periodic point-in-time snapshot of a
//! cluster's replica counts, populated opportunistically by the janitor's
//! TTL sweep (§4.10). No read path in this core consumes it; it exists so
//! the reserved `usage_samples` table (§6) is not silently dead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::common::{ClusterId, UsageSampleId};
use crate::errors::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageSample {
    pub id: UsageSampleId,
    pub cluster_id: ClusterId,
    pub control_plane_replicas: i32,
    pub worker_replicas: i32,
    pub sampled_at: DateTime<Utc>,
}

impl UsageSample {
    pub fn new(cluster_id: ClusterId, control_plane_replicas: i32, worker_replicas: i32) -> Self {
        Self {
            id: UsageSampleId::new(),
            cluster_id,
            control_plane_replicas,
            worker_replicas,
            sampled_at: Utc::now(),
        }
    }

    pub async fn record(&self, db: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO usage_samples (id, cluster_id, control_plane_replicas, worker_replicas, sampled_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(self.id)
        .bind(self.cluster_id)
        .bind(self.control_plane_replicas)
        .bind(self.worker_replicas)
        .bind(self.sampled_at)
        .execute(db)
        .await
        .map_err(Error::from_sqlx)?;
        Ok(())
    }
}
