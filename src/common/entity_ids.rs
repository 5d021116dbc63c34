//! Typed ID definitions for all domain entities.
//!
//! This module defines type aliases for each domain entity, providing
//! compile-time type safety for ID usage throughout the application.
//!
//! # Example
//!
//! ```rust
//! use control_plane::common::{ClusterId, JobId};
//!
//! // These are incompatible types - compiler prevents mixing them up
//! let cluster_id: ClusterId = ClusterId::new();
//! let job_id: JobId = JobId::new();
//!
//! // This would be a compile error:
//! // let wrong: JobId = cluster_id;
//! ```

// Re-export the core Id type and version markers
pub use super::id::{Id, V4, V7};

// ============================================================================
// Entity marker types
// ============================================================================

/// Marker type for Cluster entities.
pub struct Cluster;

/// Marker type for Job entities.
pub struct Job;

/// Marker type for JobLock entities.
pub struct JobLock;

/// Marker type for ClusterOutputs entities.
pub struct ClusterOutputs;

/// Marker type for ClusterArtifact entities.
pub struct ClusterArtifact;

/// Marker type for IdempotencyKey entities.
pub struct IdempotencyKey;

/// Marker type for AuditEvent entities.
pub struct AuditEvent;

/// Marker type for UsageSample entities.
pub struct UsageSample;

// ============================================================================
// Type aliases - the primary API
// ============================================================================

/// Typed ID for Cluster entities.
pub type ClusterId = Id<Cluster>;

/// Typed ID for Job entities.
pub type JobId = Id<Job>;

/// Typed ID for JobLock entities. A lock's primary key is the cluster it
/// guards, so this alias exists for readability at call sites rather than
/// as a standalone row identifier.
pub type JobLockId = Id<JobLock>;

/// Typed ID for ClusterOutputs entities.
pub type ClusterOutputsId = Id<ClusterOutputs>;

/// Typed ID for ClusterArtifact entities.
pub type ClusterArtifactId = Id<ClusterArtifact>;

/// Typed ID for IdempotencyKey entities. The natural key is the client's
/// idempotency token (a `String`), not a generated id; this alias is unused
/// by the gateway but kept for symmetry with the other entities.
pub type IdempotencyKeyId = Id<IdempotencyKey>;

/// Typed ID for AuditEvent entities.
pub type AuditEventId = Id<AuditEvent>;

/// Typed ID for UsageSample entities.
pub type UsageSampleId = Id<UsageSample>;
