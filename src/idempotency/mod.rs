//! Client-supplied idempotency keys (§3 Data Model): `same key + same
//! fingerprint -> same cached response; same key + different fingerprint ->
//! conflict`.
//!
//! The natural key is the client's token itself, not a generated id, so this
//! entity sits outside the `Record` trait (no `Id` to speak of) and instead
//! exposes a small purpose-built gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{FromRow, PgPool};
use std::time::Duration;

use crate::errors::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct IdempotencyRecord {
    pub key: String,
    pub request_hash: String,
    pub response_status: i32,
    pub response_body: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Deterministic fingerprint of a request body, compared against what is
/// already on file for a given key.
pub fn fingerprint(body: &serde_json::Value) -> String {
    let canonical = serde_json::to_vec(body).unwrap_or_default();
    let digest = Sha256::digest(&canonical);
    hex::encode(digest)
}

pub enum Lookup {
    /// No record for this key — caller should do the work and then
    /// [`store`] the result.
    Miss,
    /// Same key, same fingerprint — replay this response, do no work.
    Replay(IdempotencyRecord),
}

/// Looks up `key`. If a record exists with a different fingerprint than
/// `request_hash`, that is a client-visible conflict (§7).
pub async fn check(pool: &PgPool, key: &str, request_hash: &str) -> Result<Lookup> {
    let existing = sqlx::query_as::<_, IdempotencyRecord>(
        "SELECT * FROM idempotency_keys WHERE key = $1",
    )
    .bind(key)
    .fetch_optional(pool)
    .await
    .map_err(Error::from_sqlx)?;

    match existing {
        None => Ok(Lookup::Miss),
        Some(record) if record.request_hash == request_hash => Ok(Lookup::Replay(record)),
        Some(_) => Err(Error::Conflict(format!(
            "idempotency key {key} already used with a different request body"
        ))),
    }
}

/// Persists the response for `key` so a future call with the same
/// fingerprint replays it. Insert-once: a concurrent second writer for the
/// same key loses the unique-violation race and its write is simply
/// discarded (the first writer's response is already authoritative).
pub async fn store(
    pool: &PgPool,
    key: &str,
    request_hash: &str,
    response_status: i32,
    response_body: &serde_json::Value,
    ttl: Duration,
) -> Result<()> {
    let expires_at = Utc::now()
        + chrono::Duration::from_std(ttl).map_err(|e| Error::Internal(e.to_string()))?;

    let result = sqlx::query(
        r#"
        INSERT INTO idempotency_keys (key, request_hash, response_status, response_body, created_at, expires_at)
        VALUES ($1, $2, $3, $4, now(), $5)
        ON CONFLICT (key) DO NOTHING
        "#,
    )
    .bind(key)
    .bind(request_hash)
    .bind(response_status)
    .bind(response_body)
    .bind(expires_at)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(err) => match Error::from_sqlx(err) {
            Error::Conflict(_) => Ok(()),
            other => Err(other),
        },
    }
}

/// Deletes keys past `expires_at`, returning the count removed — one of the
/// janitor's four ordered sweeps (§4.8 expanded).
pub async fn gc_expired(pool: &PgPool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM idempotency_keys WHERE expires_at < now()")
        .execute(pool)
        .await
        .map_err(Error::from_sqlx)?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_for_equal_bodies() {
        let a = serde_json::json!({"name": "demo", "region": "us-east-1"});
        let b = serde_json::json!({"name": "demo", "region": "us-east-1"});
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_differs_for_different_bodies() {
        let a = serde_json::json!({"name": "demo"});
        let b = serde_json::json!({"name": "other"});
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }
}
