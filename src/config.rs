//! Process configuration, loaded once at startup from the environment.
//!
//! `dotenvy::dotenv()` is best-effort (a missing `.env` in production is
//! fine), required values use `.context(...)` so a missing var fails fast
//! with a clear message, and everything else falls back to the defaults
//! enumerated in §6.

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

/// Process-wide configuration for the control plane core.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,

    pub work_dir_root: std::path::PathBuf,
    pub worker_concurrency: usize,
    pub poll_interval: Duration,
    pub lock_ttl: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,

    pub janitor_interval: Duration,
    pub stuck_job_threshold: Duration,
    pub idempotency_ttl: Duration,

    pub installer_binary_path: std::path::PathBuf,
    pub installer_create_timeout: Duration,
    pub installer_destroy_timeout: Duration,

    pub profile_dir: std::path::PathBuf,
}

impl Config {
    /// Load configuration from the environment, applying `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,

            work_dir_root: env_path("WORK_DIR_ROOT", "./work"),
            worker_concurrency: env_parse("WORKER_CONCURRENCY", 3)?,
            poll_interval: Duration::from_secs(env_parse("POLL_INTERVAL_SECS", 10)?),
            lock_ttl: Duration::from_secs(env_parse("LOCK_TTL_SECS", 1800)?),
            max_retries: env_parse("MAX_RETRIES", 3)?,
            retry_backoff: Duration::from_secs(env_parse("RETRY_BACKOFF_SECS", 5)?),

            janitor_interval: Duration::from_secs(env_parse("JANITOR_INTERVAL_SECS", 300)?),
            stuck_job_threshold: Duration::from_secs(env_parse("STUCK_JOB_THRESHOLD_SECS", 7200)?),
            idempotency_ttl: Duration::from_secs(env_parse::<u64>("IDEMPOTENCY_TTL_HOURS", 24)? * 3600),

            installer_binary_path: env::var("INSTALLER_BINARY_PATH")
                .context("INSTALLER_BINARY_PATH must be set")?
                .into(),
            installer_create_timeout: Duration::from_secs(env_parse(
                "INSTALLER_CREATE_TIMEOUT_SECS",
                3600,
            )?),
            installer_destroy_timeout: Duration::from_secs(env_parse(
                "INSTALLER_DESTROY_TIMEOUT_SECS",
                1800,
            )?),

            profile_dir: env_path("PROFILE_DIR", "./profiles"),
        })
    }
}

fn env_path(name: &str, default: &str) -> std::path::PathBuf {
    env::var(name).unwrap_or_else(|_| default.to_string()).into()
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{name} is not valid: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-global; serialize tests that mutate them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_apply_when_optional_vars_absent() {
        let _guard = ENV_LOCK.lock().unwrap();
        for var in [
            "WORK_DIR_ROOT",
            "WORKER_CONCURRENCY",
            "POLL_INTERVAL_SECS",
            "LOCK_TTL_SECS",
        ] {
            env::remove_var(var);
        }
        env::set_var("DATABASE_URL", "postgres://localhost/test");
        env::set_var("INSTALLER_BINARY_PATH", "/usr/local/bin/openshift-install");

        let config = Config::from_env().unwrap();
        assert_eq!(config.worker_concurrency, 3);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.lock_ttl, Duration::from_secs(1800));
    }

    #[test]
    fn missing_required_var_fails_fast() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("DATABASE_URL");
        env::set_var("INSTALLER_BINARY_PATH", "/usr/local/bin/openshift-install");
        assert!(Config::from_env().is_err());
        env::set_var("DATABASE_URL", "postgres://localhost/test");
    }
}
