//! Incident tracking.
//!
//! Turns the stream of check results into discrete status-change events.

mod notifier;

pub use notifier::*;

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::db::{CheckResult, IncidentEvent, Status};

/// Last known status of one endpoint and when that run of status began.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointState {
    pub status: Status,
    pub since: DateTime<Utc>,
}

/// Per-endpoint state machine over `up`, `down` and `degraded`.
///
/// An endpoint without state is implicitly unknown; its first observation
/// only sets a baseline.
#[derive(Debug, Default)]
pub struct IncidentTracker {
    states: HashMap<String, EndpointState>,
}

impl IncidentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one check result. Returns an event if the status changed.
    pub fn observe(&mut self, result: &CheckResult) -> Option<IncidentEvent> {
        let Some(prev) = self.states.get_mut(&result.url) else {
            self.states.insert(
                result.url.clone(),
                EndpointState {
                    status: result.status,
                    since: result.checked_at,
                },
            );
            return None;
        };

        if prev.status == result.status {
            return None;
        }

        let event = IncidentEvent {
            url: result.url.clone(),
            prev_status: prev.status,
            new_status: result.status,
            changed_at: result.checked_at,
            error: result.error.clone(),
            was_down_since: (prev.status == Status::Down).then_some(prev.since),
        };

        *prev = EndpointState {
            status: result.status,
            since: result.checked_at,
        };

        Some(event)
    }

    pub fn state(&self, url: &str) -> Option<&EndpointState> {
        self.states.get(url)
    }
}
