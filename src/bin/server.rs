//! The worker process: wires the persistence gateway, profile registry, and
//! handler registry into a [`Dispatcher`] and a [`Janitor`], then runs both
//! until a shutdown signal arrives.
//!
//! No HTTP surface here (out of scope per the core's crate docs) — this
//! binary is the dispatcher/janitor half of the control plane; whatever
//! issues requests into the `clusters`/`jobs` tables is a separate process.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use control_plane::dispatcher::{Dispatcher, DispatcherConfig, HandlerRegistry};
use control_plane::handlers::{CreateHandler, DestroyHandler, ReservedHandler};
use control_plane::janitor::{Janitor, JanitorConfig};
use control_plane::jobs::{JobType, PostgresJobQueue};
use control_plane::locks::PostgresLockManager;
use control_plane::profiles::ProfileRegistry;
use control_plane::render::InstallDescriptorRenderer;
use control_plane::Config;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,control_plane=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true).with_line_number(true))
        .init();

    tracing::info!("starting cluster control plane worker");

    let config = Config::from_env().context("loading configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.worker_concurrency as u32 + 2)
        .connect(&config.database_url)
        .await
        .context("connecting to database")?;

    let profiles = ProfileRegistry::load(&config.profile_dir).context("loading profiles")?;
    tracing::info!(count = profiles.list().len(), "loaded profiles");

    let renderer = Arc::new(InstallDescriptorRenderer::new().context("compiling install descriptor templates")?);

    let queue = Arc::new(PostgresJobQueue::new(pool.clone()));
    let locks = Arc::new(PostgresLockManager::new(pool.clone()));

    let mut registry = HandlerRegistry::new();
    registry.register(
        JobType::Create,
        Arc::new(CreateHandler::new(
            profiles.clone(),
            renderer.clone(),
            config.installer_binary_path.clone(),
            config.installer_create_timeout,
        )),
    );
    let destroy_handler = Arc::new(DestroyHandler::new(
        config.installer_binary_path.clone(),
        config.installer_destroy_timeout,
    ));
    registry.register(JobType::Destroy, destroy_handler.clone());
    registry.register(JobType::JanitorDestroy, destroy_handler);
    registry.register(JobType::ScaleWorkers, Arc::new(ReservedHandler));
    registry.register(JobType::OrphanSweep, Arc::new(ReservedHandler));
    let registry = Arc::new(registry);

    let shutdown = CancellationToken::new();

    let worker_id = format!(
        "{}-{}",
        hostname(),
        std::process::id(),
    );

    let dispatcher = Arc::new(Dispatcher::new(
        pool.clone(),
        queue.clone(),
        locks.clone(),
        registry,
        DispatcherConfig {
            worker_id,
            poll_interval: config.poll_interval,
            lock_ttl: config.lock_ttl,
            work_dir_root: config.work_dir_root.clone(),
            max_concurrent: config.worker_concurrency as i64,
            retry_backoff: config.retry_backoff,
            max_retries: config.max_retries as i32,
        },
        shutdown.clone(),
    ));

    let janitor = Arc::new(Janitor::new(
        pool.clone(),
        queue,
        locks,
        JanitorConfig {
            tick_interval: config.janitor_interval,
            stuck_job_threshold: config.stuck_job_threshold,
            idempotency_ttl: config.idempotency_ttl,
        },
    ));
    let mut janitor_scheduler = janitor.spawn_scheduled().await.context("starting janitor scheduler")?;

    let dispatcher_handle = tokio::spawn(dispatcher.clone().run());

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, stopping dispatcher");
    shutdown.cancel();

    let grace_period = Duration::from_secs(30);
    if tokio::time::timeout(grace_period, dispatcher_handle).await.is_err() {
        tracing::warn!("dispatcher did not stop within the grace period, exiting anyway");
    }

    let _ = janitor_scheduler.shutdown().await;

    tracing::info!("cluster control plane worker stopped");
    Ok(())
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "worker".to_string())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("installing SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
