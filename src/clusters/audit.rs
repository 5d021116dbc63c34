//! `AuditEvent` (expanded, §3): an append-only fact about a cluster or job,
//! grounding the structured-logging requirement in a queryable table. Never
//! updated or deleted by the core — the janitor's GC sweeps (§4.10) do not
//! touch this table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use crate::common::{AuditEventId, ClusterId, JobId};
use crate::errors::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditEvent {
    pub id: AuditEventId,
    pub cluster_id: ClusterId,
    pub job_id: Option<JobId>,
    pub kind: String,
    pub detail: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(cluster_id: ClusterId, job_id: Option<JobId>, kind: impl Into<String>, detail: serde_json::Value) -> Self {
        Self {
            id: AuditEventId::new(),
            cluster_id,
            job_id,
            kind: kind.into(),
            detail: Json(detail),
            created_at: Utc::now(),
        }
    }

    pub async fn record(&self, db: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_events (id, cluster_id, job_id, kind, detail, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(self.id)
        .bind(self.cluster_id)
        .bind(self.job_id)
        .bind(&self.kind)
        .bind(&self.detail)
        .bind(self.created_at)
        .execute(db)
        .await
        .map_err(Error::from_sqlx)?;
        Ok(())
    }

    pub async fn list_for_cluster(cluster_id: ClusterId, db: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, AuditEvent>(
            "SELECT * FROM audit_events WHERE cluster_id = $1 ORDER BY created_at ASC",
        )
        .bind(cluster_id)
        .fetch_all(db)
        .await
        .map_err(Error::from_sqlx)
    }
}
