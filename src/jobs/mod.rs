//! The durable job queue (§3, §4.6): one row per asynchronous lifecycle
//! action targeting exactly one cluster.

mod memory;
mod model;
mod queue;

pub use memory::InMemoryJobQueue;
pub use model::{Job, JobStatus, JobType};
pub use queue::{JobQueue, PostgresJobQueue};
