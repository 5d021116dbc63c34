//! The managed cluster entity and its sidecar records (§3).
//!
//! `Cluster` is the unit the rest of the core revolves around: jobs target
//! it, locks guard it, the policy engine stamps its tags, and the janitor
//! sweeps it on a TTL. This module also owns the one-to-one
//! [`ClusterOutputs`] sidecar, the many-per-cluster [`ClusterArtifact`] rows,
//! and the append-only [`AuditEvent`]/[`UsageSample`] tables.

mod artifacts;
mod audit;
mod model;
mod outputs;
mod usage;

pub use artifacts::{ArtifactType, ClusterArtifact};
pub use audit::AuditEvent;
pub use model::{Cluster, ClusterFilter, ClusterStatus, Platform};
pub use outputs::ClusterOutputs;
pub use usage::UsageSample;
