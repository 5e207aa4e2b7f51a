//! Sync batch coordination
//!
//! Every item in a batch runs through the pipeline on its own task:
//! validation, idempotency lookup, detection, resolution, persistence, and
//! audit. Failures are caught at the item boundary and reported; the batch
//! itself only fails when the request is malformed as a whole.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::audit::{resolution_message, AuditLogger};
use super::detector::detect;
use super::idempotency::{IdempotencyResolver, Idempotent};
use super::locks::KeyedLocks;
use super::resolver::{resolve, Side};
use crate::db::OrderGateway;
use crate::error::{Error, Result};
use crate::models::{
    ConflictField, NewConflictResolution, Order, OrderId, ResolutionAction, SyncRequest,
    ValidatedSubmission,
};
use crate::util::compact_text;

/// Tuning knobs for batch processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Time budget for one item's persistence work
    pub item_timeout: Duration,
    /// Items reconciled in parallel
    pub max_concurrency: usize,
    /// Largest accepted batch
    pub max_batch_size: usize,
    /// Re-reads allowed when the stored order changes mid-reconciliation
    pub max_cas_retries: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            item_timeout: Duration::from_secs(10),
            max_concurrency: 8,
            max_batch_size: 500,
            max_cas_retries: 3,
        }
    }
}

/// Business scope and acting identity of one sync request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncScope {
    pub business_id: String,
    pub actor: String,
}

impl SyncScope {
    pub fn new(business_id: impl Into<String>, actor: impl Into<String>) -> Result<Self> {
        let business_id = business_id.into().trim().to_string();
        let actor = actor.into().trim().to_string();
        if business_id.is_empty() {
            return Err(Error::InvalidInput("business id is required".to_string()));
        }
        if actor.is_empty() {
            return Err(Error::InvalidInput("actor is required".to_string()));
        }
        Ok(Self { business_id, actor })
    }
}

/// An item that could not be synced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncItemError {
    /// The item exactly as submitted
    pub item: Value,
    pub error: String,
    /// Resubmitting the same item later may succeed
    pub retryable: bool,
}

/// An item whose stored counterpart differed in at least one monitored field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictOutcome {
    pub order_id: OrderId,
    pub client_generated_id: String,
    pub resolution: NewConflictResolution,
    /// Audit row id; absent when the audit write failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_id: Option<i64>,
    /// Order of record after the decision
    pub order: Order,
}

/// Per-item outcomes of one batch, each list in submission order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub synced: Vec<Order>,
    pub errors: Vec<SyncItemError>,
    pub conflicts: Vec<ConflictOutcome>,
    pub message: String,
}

impl SyncReport {
    fn from_outcomes(outcomes: impl IntoIterator<Item = ItemOutcome>) -> Self {
        let mut synced = Vec::new();
        let mut errors = Vec::new();
        let mut conflicts = Vec::new();
        for outcome in outcomes {
            match outcome {
                ItemOutcome::Synced(order) => synced.push(order),
                ItemOutcome::Conflict(conflict) => conflicts.push(*conflict),
                ItemOutcome::Failed(error) => errors.push(error),
            }
        }
        let message = summary_message(synced.len(), errors.len(), conflicts.len());
        Self {
            synced,
            errors,
            conflicts,
            message,
        }
    }
}

fn summary_message(synced: usize, errors: usize, conflicts: usize) -> String {
    let mut message = format!("{} orders synced, {errors} errors", synced + conflicts);
    if conflicts > 0 {
        message.push_str(&format!(", {conflicts} conflicts resolved"));
    }
    message
}

/// Running counters since the coordinator was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncMetricsSnapshot {
    pub batches: u64,
    pub items_synced: u64,
    pub item_errors: u64,
    pub conflicts: u64,
    pub audit_failures: u64,
}

#[derive(Default)]
struct SyncMetrics {
    batches: AtomicU64,
    items_synced: AtomicU64,
    item_errors: AtomicU64,
    conflicts: AtomicU64,
}

impl SyncMetrics {
    fn record_batch(&self, report: &SyncReport) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.items_synced
            .fetch_add(report.synced.len() as u64, Ordering::Relaxed);
        self.item_errors
            .fetch_add(report.errors.len() as u64, Ordering::Relaxed);
        self.conflicts
            .fetch_add(report.conflicts.len() as u64, Ordering::Relaxed);
    }
}

enum ItemOutcome {
    Synced(Order),
    Conflict(Box<ConflictOutcome>),
    Failed(SyncItemError),
}

impl ItemOutcome {
    fn failed(item: Value, error: &Error) -> Self {
        Self::Failed(SyncItemError {
            item,
            error: compact_text(&error.to_string()),
            retryable: error.is_retryable(),
        })
    }
}

/// What the pipeline did with an item before auditing
enum Pipeline {
    Created(Order),
    Reconciled(Reconciled),
}

struct Reconciled {
    order: Order,
    action: ResolutionAction,
    conflict_fields: BTreeSet<ConflictField>,
    local_timestamp: chrono::DateTime<Utc>,
    server_timestamp: chrono::DateTime<Utc>,
}

/// Entry point for client sync batches
pub struct SyncCoordinator<G> {
    gateway: Arc<G>,
    idempotency: IdempotencyResolver<G>,
    audit: AuditLogger<G>,
    locks: Arc<KeyedLocks>,
    metrics: Arc<SyncMetrics>,
    config: SyncConfig,
}

impl<G> Clone for SyncCoordinator<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
            idempotency: self.idempotency.clone(),
            audit: self.audit.clone(),
            locks: Arc::clone(&self.locks),
            metrics: Arc::clone(&self.metrics),
            config: self.config,
        }
    }
}

impl<G: OrderGateway + 'static> SyncCoordinator<G> {
    pub fn new(gateway: Arc<G>, config: SyncConfig) -> Self {
        Self {
            idempotency: IdempotencyResolver::new(Arc::clone(&gateway)),
            audit: AuditLogger::new(Arc::clone(&gateway), config.item_timeout),
            locks: Arc::new(KeyedLocks::default()),
            metrics: Arc::new(SyncMetrics::default()),
            gateway,
            config,
        }
    }

    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn metrics_snapshot(&self) -> SyncMetricsSnapshot {
        SyncMetricsSnapshot {
            batches: self.metrics.batches.load(Ordering::Relaxed),
            items_synced: self.metrics.items_synced.load(Ordering::Relaxed),
            item_errors: self.metrics.item_errors.load(Ordering::Relaxed),
            conflicts: self.metrics.conflicts.load(Ordering::Relaxed),
            audit_failures: self.audit.failures(),
        }
    }

    /// Reconcile a batch of client submissions
    ///
    /// Only a missing, empty, or oversized `orders` array is an error; every
    /// per-item failure is reported inside the returned [`SyncReport`].
    pub async fn sync_batch(&self, scope: &SyncScope, request: SyncRequest) -> Result<SyncReport> {
        let items = request.into_items()?;
        if items.len() > self.config.max_batch_size {
            return Err(Error::InvalidInput(format!(
                "batch of {} orders exceeds the limit of {}",
                items.len(),
                self.config.max_batch_size
            )));
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for (index, raw) in items.iter().cloned().enumerate() {
            let coordinator = self.clone();
            let scope = scope.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (index, coordinator.process_item(&scope, raw).await)
            });
        }

        let mut outcomes: Vec<Option<ItemOutcome>> = items.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(error) => {
                    tracing::error!(business = scope.business_id.as_str(), %error, "Sync item task aborted");
                }
            }
        }

        let report = SyncReport::from_outcomes(outcomes.into_iter().zip(items).map(
            |(outcome, raw)| {
                outcome.unwrap_or_else(|| {
                    ItemOutcome::failed(
                        raw,
                        &Error::ConcurrentModification("item processing aborted".to_string()),
                    )
                })
            },
        ));
        self.metrics.record_batch(&report);

        tracing::info!(
            business = scope.business_id.as_str(),
            actor = scope.actor.as_str(),
            synced = report.synced.len(),
            conflicts = report.conflicts.len(),
            errors = report.errors.len(),
            "{}",
            report.message
        );
        Ok(report)
    }

    async fn process_item(&self, scope: &SyncScope, raw: Value) -> ItemOutcome {
        let submission = match ValidatedSubmission::from_value(&raw) {
            Ok(submission) => submission,
            Err(error) => {
                tracing::warn!(business = scope.business_id.as_str(), %error, "Rejected sync item");
                return ItemOutcome::failed(raw, &error);
            }
        };

        let _guard = self
            .locks
            .lock(format!(
                "{}\u{1f}{}",
                scope.business_id, submission.client_generated_id
            ))
            .await;

        let pipeline = tokio::time::timeout(
            self.config.item_timeout,
            self.run_pipeline(scope, &submission),
        )
        .await
        .unwrap_or_else(|_| Err(Error::Timeout(self.config.item_timeout.as_millis())));

        match pipeline {
            Ok(Pipeline::Created(order)) => {
                tracing::debug!(
                    business = scope.business_id.as_str(),
                    client_id = order.client_generated_id.as_str(),
                    "Created order from first submission"
                );
                ItemOutcome::Synced(order)
            }
            Ok(Pipeline::Reconciled(reconciled)) => {
                self.audit_and_classify(scope, &submission, reconciled).await
            }
            Err(error) => {
                tracing::warn!(
                    business = scope.business_id.as_str(),
                    client_id = submission.client_generated_id.as_str(),
                    retryable = error.is_retryable(),
                    %error,
                    "Failed to sync order"
                );
                ItemOutcome::failed(raw, &error)
            }
        }
    }

    async fn run_pipeline(
        &self,
        scope: &SyncScope,
        submission: &ValidatedSubmission,
    ) -> Result<Pipeline> {
        match self
            .idempotency
            .resolve(&scope.business_id, submission)
            .await?
        {
            Idempotent::Created(order) => Ok(Pipeline::Created(order)),
            Idempotent::Existing(server) => self
                .reconcile(submission, server)
                .await
                .map(Pipeline::Reconciled),
        }
    }

    /// Decide and persist against the stored order, re-reading on a CAS miss
    async fn reconcile(
        &self,
        submission: &ValidatedSubmission,
        mut server: Order,
    ) -> Result<Reconciled> {
        let local = &submission.version;
        let mut retries = 0;

        loop {
            let conflict_fields = detect(local, &server.version);
            let resolution = resolve(local, Some(&server.version));

            let persisted = match resolution.winner {
                Side::Server => Some(server.clone()),
                Side::Local => {
                    let replacement = server.with_version(resolution.version.clone());
                    self.gateway
                        .upsert(&replacement, server.last_modified_at())
                        .await?
                }
            };

            if let Some(order) = persisted {
                return Ok(Reconciled {
                    order,
                    action: resolution.action,
                    conflict_fields,
                    local_timestamp: local.last_modified_at,
                    server_timestamp: server.last_modified_at(),
                });
            }

            if retries >= self.config.max_cas_retries {
                return Err(Error::ConcurrentModification(format!(
                    "order {} changed during reconciliation",
                    submission.client_generated_id
                )));
            }
            retries += 1;
            tracing::debug!(
                client_id = submission.client_generated_id.as_str(),
                retries,
                "Stored order moved; re-reading before deciding again"
            );
            let id = server.id;
            server = self
                .gateway
                .find_by_id(&id)
                .await?
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
        }
    }

    async fn audit_and_classify(
        &self,
        scope: &SyncScope,
        submission: &ValidatedSubmission,
        reconciled: Reconciled,
    ) -> ItemOutcome {
        let entry = NewConflictResolution {
            order_id: reconciled.order.id,
            business_id: scope.business_id.clone(),
            client_generated_id: submission.client_generated_id.clone(),
            resolution_action: reconciled.action,
            resolution_message: resolution_message(
                reconciled.action,
                &reconciled.conflict_fields,
                reconciled.local_timestamp,
                reconciled.server_timestamp,
            ),
            resolved_by: scope.actor.clone(),
            resolved_at: crate::util::storage_precision(Utc::now()),
            local_timestamp: reconciled.local_timestamp,
            server_timestamp: reconciled.server_timestamp,
            conflict_fields: reconciled.conflict_fields,
        };
        let recorded = self.audit.record(&entry).await;

        tracing::debug!(
            business = scope.business_id.as_str(),
            client_id = submission.client_generated_id.as_str(),
            action = entry.resolution_action.as_str(),
            fields = entry.conflict_fields.len(),
            "Reconciled order"
        );

        if entry.conflict_fields.is_empty() {
            return ItemOutcome::Synced(reconciled.order);
        }

        ItemOutcome::Conflict(Box::new(ConflictOutcome {
            order_id: reconciled.order.id,
            client_generated_id: submission.client_generated_id.clone(),
            audit_id: recorded.map(|resolution| resolution.id),
            resolution: entry,
            order: reconciled.order,
        }))
    }
}
