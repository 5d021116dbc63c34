//! Shared persistence-gateway plumbing: the `Record` CRUD trait and a
//! transactional helper, used by every entity module under `src/clusters`,
//! `src/jobs`, and `src/profiles`.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::future::Future;

use crate::errors::{Error, Result};

/// Trait for database records with standard CRUD operations.
///
/// Each entity in `src/clusters`, `src/jobs`, etc. implements this once,
/// alongside whatever entity-specific query methods it needs (filtered
/// lists, `get_for_update`, and so on) as plain inherent methods.
#[async_trait]
pub trait Record: Sized + Send + Sync {
    /// The table name for this record type.
    const TABLE: &'static str;

    /// The ID type for this record.
    type Id;

    /// Find a record by its ID. `NotFound` if no row matches.
    async fn find_by_id(id: Self::Id, db: &PgPool) -> Result<Self>;

    /// Insert a new record, returning the row as persisted.
    async fn insert(&self, db: &PgPool) -> Result<Self>;

    /// Update an existing record. `NotFound` if zero rows changed.
    async fn update(&self, db: &PgPool) -> Result<Self>;

    /// Delete a record. `NotFound` if zero rows changed.
    async fn delete(&self, db: &PgPool) -> Result<()>;
}

/// Run `f` inside a single serializable transaction, committing on `Ok` and
/// rolling back on `Err`.
pub async fn transaction<F, Fut, T>(pool: &PgPool, f: F) -> Result<T>
where
    F: FnOnce(Transaction<'static, Postgres>) -> Fut,
    Fut: Future<Output = Result<(Transaction<'static, Postgres>, T)>>,
{
    let tx = pool
        .begin()
        .await
        .map_err(Error::from_sqlx)?;
    let (tx, value) = f(tx).await?;
    tx.commit().await.map_err(Error::from_sqlx)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_name_is_associated_const_not_instance_state() {
        // Compile-time check only: Record::TABLE must be reachable without
        // an instance, since callers use it to build raw SQL.
        fn assert_const<R: Record>() -> &'static str {
            R::TABLE
        }
        let _ = assert_const::<crate::clusters::Cluster>;
    }
}
