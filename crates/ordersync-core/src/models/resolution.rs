//! Conflict resolution audit model

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OrderId;
use crate::error::Error;

/// Outcome of one reconciliation decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    /// The client's version became authoritative
    LocalWins,
    /// The stored version was kept
    ServerWins,
    /// Reserved for a field-level merge strategy; never produced
    MergeRequired,
}

impl ResolutionAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocalWins => "local_wins",
            Self::ServerWins => "server_wins",
            Self::MergeRequired => "merge_required",
        }
    }
}

impl fmt::Display for ResolutionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local_wins" => Ok(Self::LocalWins),
            "server_wins" => Ok(Self::ServerWins),
            "merge_required" => Ok(Self::MergeRequired),
            other => Err(Error::InvalidInput(format!(
                "unknown resolution action: {other}"
            ))),
        }
    }
}

/// Monitored order fields compared during conflict detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictField {
    ClientName,
    ClientPhone,
    Total,
    DeliveryDate,
    DeliveryTime,
    Status,
    Notes,
}

impl ConflictField {
    pub const ALL: [Self; 7] = [
        Self::ClientName,
        Self::ClientPhone,
        Self::Total,
        Self::DeliveryDate,
        Self::DeliveryTime,
        Self::Status,
        Self::Notes,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClientName => "client_name",
            Self::ClientPhone => "client_phone",
            Self::Total => "total",
            Self::DeliveryDate => "delivery_date",
            Self::DeliveryTime => "delivery_time",
            Self::Status => "status",
            Self::Notes => "notes",
        }
    }
}

impl fmt::Display for ConflictField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolution record before the audit store assigns it an id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewConflictResolution {
    pub order_id: OrderId,
    pub business_id: String,
    pub client_generated_id: String,
    pub resolution_action: ResolutionAction,
    pub resolution_message: String,
    /// Actor that triggered the sync (end user or automated job)
    pub resolved_by: String,
    /// Wall-clock time of the decision
    pub resolved_at: DateTime<Utc>,
    pub local_timestamp: DateTime<Utc>,
    pub server_timestamp: DateTime<Utc>,
    /// Fields that differed; informational only
    pub conflict_fields: BTreeSet<ConflictField>,
}

/// Immutable audit entry for one reconciliation decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictResolution {
    /// Audit row identifier
    pub id: i64,
    #[serde(flatten)]
    pub entry: NewConflictResolution,
}

impl ConflictResolution {
    pub const fn new(id: i64, entry: NewConflictResolution) -> Self {
        Self { id, entry }
    }
}

/// Half-open time range `[since, until)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(since: DateTime<Utc>, until: DateTime<Utc>) -> crate::Result<Self> {
        if since >= until {
            return Err(Error::InvalidInput(
                "time window start must be before its end".to_string(),
            ));
        }
        Ok(Self { since, until })
    }

    /// Window ending now and spanning `span`
    pub fn trailing(span: chrono::Duration) -> Self {
        let until = Utc::now();
        Self {
            since: until - span,
            until,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.since <= instant && instant < self.until
    }
}

/// Resolution counts by action for one business over a time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionStats {
    pub window: TimeWindow,
    pub local_wins: u64,
    pub server_wins: u64,
    pub merge_required: u64,
    /// Resolutions where no monitored field differed
    pub without_field_changes: u64,
}

impl ResolutionStats {
    pub const fn empty(window: TimeWindow) -> Self {
        Self {
            window,
            local_wins: 0,
            server_wins: 0,
            merge_required: 0,
            without_field_changes: 0,
        }
    }

    pub fn record(&mut self, action: ResolutionAction, count: u64) {
        match action {
            ResolutionAction::LocalWins => self.local_wins += count,
            ResolutionAction::ServerWins => self.server_wins += count,
            ResolutionAction::MergeRequired => self.merge_required += count,
        }
    }

    pub const fn total(&self) -> u64 {
        self.local_wins + self.server_wins + self.merge_required
    }
}
