//! Last-write-wins resolution
//!
//! Pure decision logic: no storage, no clock reads.

use crate::models::{OrderVersion, ResolutionAction};

/// Which side's version becomes authoritative
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Local,
    Server,
}

/// Decision for one order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution<'a> {
    pub action: ResolutionAction,
    pub winner: Side,
    /// The version to persist, in full
    pub version: &'a OrderVersion,
}

/// Decide between the client's version and the stored one
///
/// The strictly later `last_modified_at` wins. Equal timestamps keep the
/// server version, so replaying a batch can never flip the outcome. With no
/// server version the submission is a creation and wins trivially.
pub fn resolve<'a>(local: &'a OrderVersion, server: Option<&'a OrderVersion>) -> Resolution<'a> {
    match server {
        Some(server) if server.last_modified_at >= local.last_modified_at => Resolution {
            action: ResolutionAction::ServerWins,
            winner: Side::Server,
            version: server,
        },
        _ => Resolution {
            action: ResolutionAction::LocalWins,
            winner: Side::Local,
            version: local,
        },
    }
}
