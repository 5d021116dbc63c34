//! The `Cluster` entity: the managed unit the rest of the core revolves
//! around.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::BTreeMap;

use crate::common::sql::Record;
use crate::common::{ClusterId, Page, Paged};
use crate::errors::{Error, Result};

/// The cloud platform a cluster is installed on. Tagged variant per §3;
/// more platforms are added here as the profile registry grows to support
/// them, never by adding a second "kind" field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "platform", rename_all = "snake_case")]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Aws,
    IbmCloud,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Aws => "aws",
            Platform::IbmCloud => "ibmcloud",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The cluster lifecycle state machine (§3). `is_legal_transition` is the
/// single source of truth the dispatcher's handlers consult before
/// mutating a cluster row — see §4.7 "state-transition safety".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "cluster_status", rename_all = "snake_case")]
pub enum ClusterStatus {
    Pending,
    Creating,
    Ready,
    Failed,
    Destroying,
    Destroyed,
    Scaling,
}

impl ClusterStatus {
    /// Whether `self -> next` is an edge in the §3 state-machine graph.
    pub fn is_legal_transition(self, next: ClusterStatus) -> bool {
        use ClusterStatus::*;
        matches!(
            (self, next),
            (Pending, Creating)
                | (Creating, Ready)
                | (Creating, Failed)
                | (Ready, Destroying)
                | (Failed, Destroying)
                | (Destroying, Destroyed)
                | (Ready, Scaling)
                | (Scaling, Ready)
                | (Scaling, Failed)
        )
    }

    /// `DESTROYED` is terminal outright; `FAILED` is terminal from the
    /// scheduler's point of view but destroy is still a legal transition.
    pub fn is_terminal_for_scheduler(self) -> bool {
        matches!(self, ClusterStatus::Destroyed)
    }
}

/// Optional filters for `Cluster::list`. `None` means "don't filter on
/// this field".
#[derive(Debug, Clone, Default)]
pub struct ClusterFilter {
    pub platform: Option<Platform>,
    pub profile: Option<String>,
    pub owner: Option<String>,
    pub team: Option<String>,
    pub status: Option<ClusterStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Cluster {
    pub id: ClusterId,
    pub name: String,
    pub platform: Platform,
    pub version: String,
    pub profile: String,
    pub region: String,
    pub base_domain: String,
    pub owner: String,
    pub owner_id: Option<String>,
    pub team: Option<String>,
    pub cost_center: Option<String>,
    pub status: ClusterStatus,
    pub requested_by: String,
    pub ttl_hours: i32,
    pub destroy_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub destroyed_at: Option<DateTime<Utc>>,
    pub request_tags: Json<BTreeMap<String, String>>,
    pub effective_tags: Json<BTreeMap<String, String>>,
    pub ssh_public_key: Option<String>,
    pub offhours_opt_in: bool,
}

#[async_trait]
impl Record for Cluster {
    const TABLE: &'static str = "clusters";
    type Id = ClusterId;

    async fn find_by_id(id: ClusterId, db: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Cluster>("SELECT * FROM clusters WHERE id = $1")
            .bind(id)
            .fetch_optional(db)
            .await
            .map_err(Error::from_sqlx)?
            .ok_or_else(|| Error::NotFound(format!("cluster {id}")))
    }

    async fn insert(&self, db: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Cluster>(
            r#"
            INSERT INTO clusters (
                id, name, platform, version, profile, region, base_domain,
                owner, owner_id, team, cost_center, status, requested_by,
                ttl_hours, destroy_at, created_at, updated_at, destroyed_at,
                request_tags, effective_tags, ssh_public_key, offhours_opt_in
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                $14, $15, $16, $17, $18, $19, $20, $21, $22
            )
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(&self.name)
        .bind(self.platform)
        .bind(&self.version)
        .bind(&self.profile)
        .bind(&self.region)
        .bind(&self.base_domain)
        .bind(&self.owner)
        .bind(&self.owner_id)
        .bind(&self.team)
        .bind(&self.cost_center)
        .bind(self.status)
        .bind(&self.requested_by)
        .bind(self.ttl_hours)
        .bind(self.destroy_at)
        .bind(self.created_at)
        .bind(self.updated_at)
        .bind(self.destroyed_at)
        .bind(&self.request_tags)
        .bind(&self.effective_tags)
        .bind(&self.ssh_public_key)
        .bind(self.offhours_opt_in)
        .fetch_one(db)
        .await
        .map_err(Error::from_sqlx)
    }

    async fn update(&self, db: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Cluster>(
            r#"
            UPDATE clusters SET
                status = $2, destroy_at = $3, updated_at = now(),
                destroyed_at = $4, effective_tags = $5, ssh_public_key = $6
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.status)
        .bind(self.destroy_at)
        .bind(self.destroyed_at)
        .bind(&self.effective_tags)
        .bind(&self.ssh_public_key)
        .fetch_optional(db)
        .await
        .map_err(Error::from_sqlx)?
        .ok_or_else(|| Error::NotFound(format!("cluster {}", self.id)))
    }

    async fn delete(&self, db: &PgPool) -> Result<()> {
        let result = sqlx::query("DELETE FROM clusters WHERE id = $1")
            .bind(self.id)
            .execute(db)
            .await
            .map_err(Error::from_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("cluster {}", self.id)));
        }
        Ok(())
    }
}

impl Cluster {
    /// Paginated, filtered listing per §4.1's "filter builders accept
    /// optional platform/profile/owner/team/status" contract.
    pub async fn list(filter: &ClusterFilter, page: Page, db: &PgPool) -> Result<Paged<Cluster>> {
        let rows = sqlx::query_as::<_, Cluster>(
            r#"
            SELECT * FROM clusters
            WHERE ($1::platform IS NULL OR platform = $1)
              AND ($2::text IS NULL OR profile = $2)
              AND ($3::text IS NULL OR owner = $3)
              AND ($4::text IS NULL OR team = $4)
              AND ($5::cluster_status IS NULL OR status = $5)
            ORDER BY created_at DESC
            LIMIT $6 OFFSET $7
            "#,
        )
        .bind(filter.platform)
        .bind(&filter.profile)
        .bind(&filter.owner)
        .bind(&filter.team)
        .bind(filter.status)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(db)
        .await
        .map_err(Error::from_sqlx)?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT count(*) FROM clusters
            WHERE ($1::platform IS NULL OR platform = $1)
              AND ($2::text IS NULL OR profile = $2)
              AND ($3::text IS NULL OR owner = $3)
              AND ($4::text IS NULL OR team = $4)
              AND ($5::cluster_status IS NULL OR status = $5)
            "#,
        )
        .bind(filter.platform)
        .bind(&filter.profile)
        .bind(&filter.owner)
        .bind(&filter.team)
        .bind(filter.status)
        .fetch_one(db)
        .await
        .map_err(Error::from_sqlx)?;

        Ok(Paged::new(rows, total))
    }

    /// Take a row lock on a cluster inside an open transaction, per §4.1's
    /// `get_for_update(id)`. Callers must commit or roll back `tx`
    /// themselves (see `crate::common::sql::transaction`).
    pub async fn get_for_update(
        id: ClusterId,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<Self> {
        sqlx::query_as::<_, Cluster>("SELECT * FROM clusters WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::from_sqlx)?
            .ok_or_else(|| Error::NotFound(format!("cluster {id}")))
    }

    /// Whether an active (non-terminal) cluster already occupies the
    /// `(name, platform, base_domain)` uniqueness key from §3/§6.
    pub async fn active_conflict_exists(
        name: &str,
        platform: Platform,
        base_domain: &str,
        db: &PgPool,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM clusters
                WHERE name = $1 AND platform = $2 AND base_domain = $3
                  AND status NOT IN ('destroyed', 'failed')
            )
            "#,
        )
        .bind(name)
        .bind(platform)
        .bind(base_domain)
        .fetch_one(db)
        .await
        .map_err(Error::from_sqlx)?;
        Ok(exists)
    }

    /// Validate and apply a status transition in-memory, returning the
    /// updated struct (caller still must persist via `update`). Aborts with
    /// `Error::Permanent` on an illegal transition per §4.7.
    pub fn transition_to(mut self, next: ClusterStatus) -> Result<Self> {
        if !self.status.is_legal_transition(next) {
            return Err(Error::Permanent {
                code: "ILLEGAL_TRANSITION".to_string(),
                message: format!("cannot move cluster {} from {:?} to {:?}", self.id, self.status, next),
            });
        }
        self.status = next;
        if next == ClusterStatus::Destroyed {
            self.destroyed_at = Some(Utc::now());
        }
        self.updated_at = Utc::now();
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions_follow_state_machine() {
        assert!(ClusterStatus::Pending.is_legal_transition(ClusterStatus::Creating));
        assert!(ClusterStatus::Creating.is_legal_transition(ClusterStatus::Ready));
        assert!(ClusterStatus::Creating.is_legal_transition(ClusterStatus::Failed));
        assert!(ClusterStatus::Ready.is_legal_transition(ClusterStatus::Destroying));
        assert!(ClusterStatus::Failed.is_legal_transition(ClusterStatus::Destroying));
        assert!(ClusterStatus::Destroying.is_legal_transition(ClusterStatus::Destroyed));
        assert!(ClusterStatus::Ready.is_legal_transition(ClusterStatus::Scaling));
        assert!(ClusterStatus::Scaling.is_legal_transition(ClusterStatus::Ready));
        assert!(ClusterStatus::Scaling.is_legal_transition(ClusterStatus::Failed));
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        assert!(!ClusterStatus::Pending.is_legal_transition(ClusterStatus::Ready));
        assert!(!ClusterStatus::Destroyed.is_legal_transition(ClusterStatus::Creating));
        assert!(!ClusterStatus::Ready.is_legal_transition(ClusterStatus::Pending));
    }

    #[test]
    fn destroyed_is_terminal_failed_is_not() {
        assert!(ClusterStatus::Destroyed.is_terminal_for_scheduler());
        assert!(!ClusterStatus::Failed.is_terminal_for_scheduler());
    }

    fn sample_cluster(status: ClusterStatus) -> Cluster {
        Cluster {
            id: ClusterId::new(),
            name: "demo".to_string(),
            platform: Platform::Aws,
            version: "4.20.3".to_string(),
            profile: "aws-minimal-test".to_string(),
            region: "us-east-1".to_string(),
            base_domain: "example.com".to_string(),
            owner: "alice".to_string(),
            owner_id: None,
            team: None,
            cost_center: None,
            status,
            requested_by: "alice".to_string(),
            ttl_hours: 24,
            destroy_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            destroyed_at: None,
            request_tags: Json(BTreeMap::new()),
            effective_tags: Json(BTreeMap::new()),
            ssh_public_key: None,
            offhours_opt_in: false,
        }
    }

    #[test]
    fn transition_to_illegal_state_is_permanent_error() {
        let cluster = sample_cluster(ClusterStatus::Pending);
        let err = cluster.transition_to(ClusterStatus::Ready).unwrap_err();
        assert!(matches!(err, Error::Permanent { .. }));
    }

    #[test]
    fn transition_to_destroyed_stamps_destroyed_at() {
        let cluster = sample_cluster(ClusterStatus::Destroying);
        let cluster = cluster.transition_to(ClusterStatus::Destroyed).unwrap();
        assert!(cluster.destroyed_at.is_some());
    }
}
