//! Reconciliation pipeline: idempotency lookup, conflict detection,
//! last-write-wins resolution, audit logging, and batch coordination.

mod audit;
mod coordinator;
mod detector;
mod idempotency;
mod locks;
mod resolver;

pub use audit::{resolution_message, AuditLogger};
pub use coordinator::{
    ConflictOutcome, SyncConfig, SyncCoordinator, SyncItemError, SyncMetricsSnapshot, SyncReport,
    SyncScope,
};
pub use detector::detect;
pub use idempotency::{IdempotencyResolver, Idempotent};
pub use resolver::{resolve, Resolution, Side};
