//! `ClusterArtifact`: many-per-cluster storage references (§3).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::common::sql::Record;
use crate::common::{ClusterArtifactId, ClusterId};
use crate::errors::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "artifact_type", rename_all = "snake_case")]
pub enum ArtifactType {
    InstallDirSnapshot,
    Log,
    DestroyLog,
    AuthBundle,
    Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ClusterArtifact {
    pub id: ClusterArtifactId,
    pub cluster_id: ClusterId,
    pub artifact_type: ArtifactType,
    pub storage_uri: String,
    pub checksum: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
impl Record for ClusterArtifact {
    const TABLE: &'static str = "cluster_artifacts";
    type Id = ClusterArtifactId;

    async fn find_by_id(id: ClusterArtifactId, db: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, ClusterArtifact>("SELECT * FROM cluster_artifacts WHERE id = $1")
            .bind(id)
            .fetch_optional(db)
            .await
            .map_err(Error::from_sqlx)?
            .ok_or_else(|| Error::NotFound(format!("cluster_artifact {id}")))
    }

    async fn insert(&self, db: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, ClusterArtifact>(
            r#"
            INSERT INTO cluster_artifacts (
                id, cluster_id, artifact_type, storage_uri, checksum, size_bytes, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.cluster_id)
        .bind(self.artifact_type)
        .bind(&self.storage_uri)
        .bind(&self.checksum)
        .bind(self.size_bytes)
        .bind(self.created_at)
        .fetch_one(db)
        .await
        .map_err(Error::from_sqlx)
    }

    async fn update(&self, db: &PgPool) -> Result<Self> {
        // Artifacts are immutable once recorded; only checksum/size could
        // plausibly change if a re-upload occurs, so that's all we expose.
        sqlx::query_as::<_, ClusterArtifact>(
            r#"
            UPDATE cluster_artifacts SET checksum = $2, size_bytes = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(&self.checksum)
        .bind(self.size_bytes)
        .fetch_optional(db)
        .await
        .map_err(Error::from_sqlx)?
        .ok_or_else(|| Error::NotFound(format!("cluster_artifact {}", self.id)))
    }

    async fn delete(&self, db: &PgPool) -> Result<()> {
        let result = sqlx::query("DELETE FROM cluster_artifacts WHERE id = $1")
            .bind(self.id)
            .execute(db)
            .await
            .map_err(Error::from_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("cluster_artifact {}", self.id)));
        }
        Ok(())
    }
}

impl ClusterArtifact {
    pub async fn list_for_cluster(cluster_id: ClusterId, db: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, ClusterArtifact>(
            "SELECT * FROM cluster_artifacts WHERE cluster_id = $1 ORDER BY created_at ASC",
        )
        .bind(cluster_id)
        .fetch_all(db)
        .await
        .map_err(Error::from_sqlx)
    }
}
