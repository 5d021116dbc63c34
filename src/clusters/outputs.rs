//! `ClusterOutputs`: one-to-one sidecar with a READY cluster (§3).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::common::sql::Record;
use crate::common::{ClusterId, ClusterOutputsId};
use crate::errors::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ClusterOutputs {
    pub id: ClusterOutputsId,
    pub cluster_id: ClusterId,
    pub api_url: String,
    pub console_url: String,
    pub kubeconfig_location: String,
    pub kubeadmin_credential_location: String,
    pub metadata_location: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
impl Record for ClusterOutputs {
    const TABLE: &'static str = "cluster_outputs";
    type Id = ClusterOutputsId;

    async fn find_by_id(id: ClusterOutputsId, db: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, ClusterOutputs>("SELECT * FROM cluster_outputs WHERE id = $1")
            .bind(id)
            .fetch_optional(db)
            .await
            .map_err(Error::from_sqlx)?
            .ok_or_else(|| Error::NotFound(format!("cluster_outputs {id}")))
    }

    async fn insert(&self, db: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, ClusterOutputs>(
            r#"
            INSERT INTO cluster_outputs (
                id, cluster_id, api_url, console_url, kubeconfig_location,
                kubeadmin_credential_location, metadata_location, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.cluster_id)
        .bind(&self.api_url)
        .bind(&self.console_url)
        .bind(&self.kubeconfig_location)
        .bind(&self.kubeadmin_credential_location)
        .bind(&self.metadata_location)
        .bind(self.created_at)
        .fetch_one(db)
        .await
        .map_err(Error::from_sqlx)
    }

    async fn update(&self, db: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, ClusterOutputs>(
            r#"
            UPDATE cluster_outputs SET
                api_url = $2, console_url = $3, kubeconfig_location = $4,
                kubeadmin_credential_location = $5, metadata_location = $6
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(&self.api_url)
        .bind(&self.console_url)
        .bind(&self.kubeconfig_location)
        .bind(&self.kubeadmin_credential_location)
        .bind(&self.metadata_location)
        .fetch_optional(db)
        .await
        .map_err(Error::from_sqlx)?
        .ok_or_else(|| Error::NotFound(format!("cluster_outputs {}", self.id)))
    }

    async fn delete(&self, db: &PgPool) -> Result<()> {
        let result = sqlx::query("DELETE FROM cluster_outputs WHERE id = $1")
            .bind(self.id)
            .execute(db)
            .await
            .map_err(Error::from_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("cluster_outputs {}", self.id)));
        }
        Ok(())
    }
}

impl ClusterOutputs {
    pub async fn find_by_cluster(cluster_id: ClusterId, db: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, ClusterOutputs>("SELECT * FROM cluster_outputs WHERE cluster_id = $1")
            .bind(cluster_id)
            .fetch_optional(db)
            .await
            .map_err(Error::from_sqlx)
    }
}
