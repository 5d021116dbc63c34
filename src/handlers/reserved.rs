//! Reserved job types (§9, Open Question resolved): `ScaleWorkers` and
//! `OrphanSweep` are registered in the handler registry so dispatch never
//! hits `NO_HANDLER`, but neither has a real implementation yet. Both fail
//! immediately and permanently rather than retry, since retrying a
//! not-implemented operation can never succeed.

use async_trait::async_trait;
use tracing::warn;

use crate::dispatcher::{HandlerContext, JobHandler};
use crate::errors::{Error, Result};
use crate::jobs::Job;

pub struct ReservedHandler;

#[async_trait]
impl JobHandler for ReservedHandler {
    async fn handle(&self, job: &Job, _ctx: &HandlerContext) -> Result<()> {
        warn!(job_id = %job.id, job_type = ?job.job_type, "reserved job type has no implementation");
        Err(Error::Permanent {
            code: "NOT_IMPLEMENTED".to_string(),
            message: format!("{:?} is registered but not implemented", job.job_type),
        })
    }
}
