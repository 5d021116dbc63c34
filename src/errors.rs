//! Shared error taxonomy for the control plane core.
//!
//! Every fallible operation in `src/clusters`, `src/jobs`, `src/locks`,
//! `src/profiles`, `src/policy`, `src/render`, `src/dispatcher`, and
//! `src/handlers` returns `Result<T, Error>`. The taxonomy mirrors §7 of the
//! specification: kinds, not exception types, so the dispatcher's retry
//! decision can be made by matching on the variant alone.

use sqlx::error::DatabaseError;

/// The kinds of failure the core distinguishes. `Transient` and `Permanent`
/// are the two kinds a job handler is expected to choose between; the rest
/// arise from the gateway, the lock manager, or policy validation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Normal race, not a bug: another worker already holds the cluster
    /// lock. The dispatcher swallows this — see `Dispatcher::run_one`.
    #[error("lock held for cluster {0}")]
    LockHeld(String),

    /// Retryable: cloud throttling, network blips, database timeouts.
    #[error("transient failure [{code}]: {message}")]
    Transient { code: String, message: String },

    /// Not retryable: installer rejected the config, quota exhausted.
    #[error("permanent failure [{code}]: {message}")]
    Permanent { code: String, message: String },

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Postgres unique-violation code, per §4.1's "unique-violation surfaces
    /// as `Conflict`" contract.
    const UNIQUE_VIOLATION: &'static str = "23505";

    /// Convert a `sqlx::Error` into the core taxonomy, promoting unique
    /// constraint violations to `Conflict` and everything else to
    /// `Internal`. `RowNotFound` becomes `NotFound` with a generic message;
    /// callers that can name the entity should prefer constructing
    /// `Error::NotFound` directly.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Error::NotFound("row".to_string()),
            sqlx::Error::Database(db_err) => {
                if db_err.code().as_deref() == Some(Self::UNIQUE_VIOLATION) {
                    Error::Conflict(describe_unique_violation(db_err.as_ref()))
                } else {
                    Error::Internal(err.to_string())
                }
            }
            _ => Error::Internal(err.to_string()),
        }
    }

    /// Whether this error should count as `Transient` for retry purposes
    /// when it escapes a handler as a bare `Error` rather than already
    /// tagged via `HandlerOutcome`.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient { .. } | Error::LockHeld(_))
    }
}

fn describe_unique_violation(db_err: &dyn DatabaseError) -> String {
    db_err
        .constraint()
        .map(|c| format!("unique constraint `{c}` violated"))
        .unwrap_or_else(|| db_err.message().to_string())
}

/// The outcome of a job handler invocation, per the "exceptions → result
/// values" design note (§9). The dispatcher matches on this (plus any
/// caught panic) to decide the retry transition in §4.7 step 5.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    Success,
    TransientFailure { code: String, message: String },
    PermanentFailure { code: String, message: String },
    Cancelled,
}

impl HandlerOutcome {
    pub fn transient(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransientFailure {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn permanent(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PermanentFailure {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, HandlerOutcome::Success)
    }
}

/// Lift a plain `Error` escaping a handler body (e.g. a gateway call with
/// `?`) into a `HandlerOutcome`, per §7's "handlers classify installer
/// failures" contract applied defensively to every other fallible step.
impl From<Error> for HandlerOutcome {
    fn from(err: Error) -> Self {
        match err {
            Error::Transient { code, message } => HandlerOutcome::TransientFailure { code, message },
            Error::Permanent { code, message } => HandlerOutcome::PermanentFailure { code, message },
            Error::Cancelled => HandlerOutcome::Cancelled,
            Error::LockHeld(cluster_id) => {
                HandlerOutcome::TransientFailure { code: "LOCK_HELD".to_string(), message: cluster_id }
            }
            other => HandlerOutcome::PermanentFailure {
                code: "INTERNAL".to_string(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(Error::Transient { code: "X".into(), message: "y".into() }.is_retryable());
        assert!(Error::LockHeld("c1".into()).is_retryable());
        assert!(!Error::Permanent { code: "X".into(), message: "y".into() }.is_retryable());
        assert!(!Error::NotFound("cluster".into()).is_retryable());
    }

    #[test]
    fn error_to_handler_outcome() {
        let outcome: HandlerOutcome = Error::Permanent { code: "QUOTA".into(), message: "denied".into() }.into();
        assert_eq!(outcome, HandlerOutcome::PermanentFailure { code: "QUOTA".into(), message: "denied".into() });
    }
}
