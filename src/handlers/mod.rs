//! Typed job handlers (§4.8, §4.9, §9 "reserved job types"): one
//! [`crate::dispatcher::JobHandler`] impl per [`crate::jobs::JobType`],
//! registered into a [`crate::dispatcher::HandlerRegistry`] by the process
//! binary.

mod create;
mod destroy;
pub mod installer;
mod reserved;

pub use create::CreateHandler;
pub use destroy::DestroyHandler;
pub use reserved::ReservedHandler;

use sqlx::PgPool;

use crate::clusters::{Cluster, ClusterStatus};
use crate::common::sql::Record;
use crate::common::ClusterId;
use crate::errors::{Error, Result};

/// Loads a cluster `FOR UPDATE`, validates and applies `next` in-memory, and
/// persists it, all inside one transaction (§4.7 "state-transition safety").
/// Shared by the create and destroy handlers, which otherwise duplicate
/// nothing else about how they talk to the cluster row.
pub(crate) async fn transition_cluster(pool: &PgPool, cluster_id: ClusterId, next: ClusterStatus) -> Result<Cluster> {
    let mut tx = pool.begin().await.map_err(Error::from_sqlx)?;
    let cluster = Cluster::get_for_update(cluster_id, &mut tx).await?;
    let cluster = cluster.transition_to(next)?;

    let updated = sqlx::query_as::<_, Cluster>(
        r#"
        UPDATE clusters SET
            status = $2, destroy_at = $3, updated_at = now(),
            destroyed_at = $4, effective_tags = $5, ssh_public_key = $6
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(cluster.id)
    .bind(cluster.status)
    .bind(cluster.destroy_at)
    .bind(cluster.destroyed_at)
    .bind(&cluster.effective_tags)
    .bind(&cluster.ssh_public_key)
    .fetch_one(&mut *tx)
    .await
    .map_err(Error::from_sqlx)?;

    tx.commit().await.map_err(Error::from_sqlx)?;
    Ok(updated)
}

/// Hex SHA-256, used to fingerprint captured artifacts (§3 `checksum`).
pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::Digest;
    hex::encode(sha2::Sha256::digest(bytes))
}
