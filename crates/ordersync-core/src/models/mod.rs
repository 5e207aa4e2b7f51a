//! Data models for ordersync

mod order;
mod resolution;
mod submission;

pub use order::{LineItem, Order, OrderId, OrderStatus, OrderVersion, SyncStatus};
pub use resolution::{
    ConflictField, ConflictResolution, NewConflictResolution, ResolutionAction, ResolutionStats,
    TimeWindow,
};
pub use submission::{LineItemSubmission, OrderSubmission, SyncRequest, ValidatedSubmission};

#[cfg(test)]
pub(crate) use order::fixtures;
