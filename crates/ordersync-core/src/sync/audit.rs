//! Append-only audit trail of reconciliation decisions

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::db::OrderGateway;
use crate::models::{ConflictField, ConflictResolution, NewConflictResolution, ResolutionAction};

/// Writes resolution records without ever failing the sync they document
pub struct AuditLogger<G> {
    gateway: Arc<G>,
    timeout: Duration,
    failures: Arc<AtomicU64>,
}

impl<G> Clone for AuditLogger<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
            timeout: self.timeout,
            failures: Arc::clone(&self.failures),
        }
    }
}

impl<G: OrderGateway> AuditLogger<G> {
    pub fn new(gateway: Arc<G>, timeout: Duration) -> Self {
        Self {
            gateway,
            timeout,
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Append one entry; returns `None` (after logging a warning) on failure
    pub async fn record(&self, entry: &NewConflictResolution) -> Option<ConflictResolution> {
        let outcome = tokio::time::timeout(self.timeout, self.gateway.append_audit_entry(entry))
            .await
            .unwrap_or_else(|_| Err(crate::Error::Timeout(self.timeout.as_millis())));

        match outcome {
            Ok(recorded) => Some(recorded),
            Err(error) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    business = entry.business_id.as_str(),
                    client_id = entry.client_generated_id.as_str(),
                    action = entry.resolution_action.as_str(),
                    %error,
                    "Failed to append conflict resolution audit entry"
                );
                None
            }
        }
    }

    /// Number of audit writes that failed since startup
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Human-readable explanation of a decision
pub fn resolution_message(
    action: ResolutionAction,
    conflict_fields: &BTreeSet<ConflictField>,
    local_timestamp: DateTime<Utc>,
    server_timestamp: DateTime<Utc>,
) -> String {
    if conflict_fields.is_empty() {
        return match action {
            ResolutionAction::LocalWins => format!(
                "No conflict found: no changes to monitored fields; local timestamp {} supersedes server timestamp {}",
                local_timestamp.to_rfc3339(),
                server_timestamp.to_rfc3339()
            ),
            _ => "No conflict found: no changes to monitored fields; server version retained"
                .to_string(),
        };
    }

    let fields = conflict_fields
        .iter()
        .map(|field| field.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    match action {
        ResolutionAction::LocalWins => format!(
            "Local version ({}) is newer than server version ({}); local values kept for: {fields}",
            local_timestamp.to_rfc3339(),
            server_timestamp.to_rfc3339()
        ),
        ResolutionAction::ServerWins if local_timestamp == server_timestamp => format!(
            "Timestamps are equal ({}); server version retained for: {fields}",
            server_timestamp.to_rfc3339()
        ),
        ResolutionAction::ServerWins => format!(
            "Server version ({}) is newer than local version ({}); local values discarded for: {fields}",
            server_timestamp.to_rfc3339(),
            local_timestamp.to_rfc3339()
        ),
        ResolutionAction::MergeRequired => format!("Manual merge required for: {fields}"),
    }
}
