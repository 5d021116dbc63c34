//! `clusterctl`: an operator CLI over the control plane core — submit jobs,
//! list loaded profiles, force a profile reload, and inspect stuck jobs.
//! Talks to the database directly; there is no HTTP surface for it to go
//! through (out of scope for this crate).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use control_plane::common::ClusterId;
use control_plane::jobs::{JobQueue, JobType, PostgresJobQueue};
use control_plane::profiles::ProfileRegistry;
use control_plane::Config;
use sqlx::postgres::PgPoolOptions;

#[derive(Parser)]
#[command(name = "clusterctl", about = "Operator CLI for the cluster control plane")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enqueue a job for an existing cluster.
    SubmitJob {
        cluster_id: ClusterId,
        #[arg(value_enum)]
        job_type: JobTypeArg,
        #[arg(long, default_value_t = 3)]
        max_attempts: i32,
    },
    /// List every loaded profile, one per line.
    ListProfiles,
    /// Force the profile registry to re-read its directory.
    ReloadProfiles,
    /// List jobs stuck in RUNNING past the configured threshold.
    StuckJobs,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum JobTypeArg {
    Create,
    Destroy,
    JanitorDestroy,
    ScaleWorkers,
    OrphanSweep,
}

impl From<JobTypeArg> for JobType {
    fn from(arg: JobTypeArg) -> Self {
        match arg {
            JobTypeArg::Create => JobType::Create,
            JobTypeArg::Destroy => JobType::Destroy,
            JobTypeArg::JanitorDestroy => JobType::JanitorDestroy,
            JobTypeArg::ScaleWorkers => JobType::ScaleWorkers,
            JobTypeArg::OrphanSweep => JobType::OrphanSweep,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let cli = Cli::parse();
    let config = Config::from_env().context("loading configuration")?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database_url)
        .await
        .context("connecting to database")?;

    match cli.command {
        Command::SubmitJob { cluster_id, job_type, max_attempts } => {
            let queue = PostgresJobQueue::new(pool);
            let job = queue.enqueue(cluster_id, job_type.into(), max_attempts).await?;
            println!("enqueued job {} ({:?}) for cluster {}", job.id, job.job_type, job.cluster_id);
        }
        Command::ListProfiles => {
            let profiles = ProfileRegistry::load(&config.profile_dir)?;
            for profile in profiles.list() {
                println!("{}\t{}\t{}", profile.name, profile.platform, profile.display_name);
            }
        }
        Command::ReloadProfiles => {
            let profiles = ProfileRegistry::load(&config.profile_dir)?;
            profiles.reload()?;
            println!("reloaded {} profiles from {}", profiles.list().len(), config.profile_dir.display());
        }
        Command::StuckJobs => {
            let queue = PostgresJobQueue::new(pool);
            let stuck = queue.get_stuck(config.stuck_job_threshold).await?;
            if stuck.is_empty() {
                println!("no stuck jobs");
            }
            for job in stuck {
                let age = job
                    .started_at
                    .map(|started| chrono::Utc::now().signed_duration_since(started))
                    .unwrap_or(chrono::Duration::zero());
                println!(
                    "{}\tcluster={}\ttype={:?}\trunning for {}s",
                    job.id,
                    job.cluster_id,
                    job.job_type,
                    age.num_seconds()
                );
            }
        }
    }

    Ok(())
}
