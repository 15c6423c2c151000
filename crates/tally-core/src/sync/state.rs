//! Sync bookkeeping
//!
//! Lifecycle phase plus the outcome of the most recent sync cycle. Lives in
//! memory only; it is rebuilt on every start.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Initialization phase of a tracker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    #[default]
    Uninitialized,
    Loading,
    Ready,
}

/// Mutable sync state owned by the engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncState {
    pub phase: SyncPhase,
    /// A cycle is in flight
    pub syncing: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl SyncState {
    pub(crate) fn begin_cycle(&mut self) {
        self.syncing = true;
    }

    pub(crate) fn succeed(&mut self, at: DateTime<Utc>) {
        self.syncing = false;
        self.last_synced_at = Some(at);
        self.last_error = None;
    }

    pub(crate) fn fail(&mut self, message: String) {
        self.syncing = false;
        self.last_error = Some(message);
    }
}

/// Snapshot reported to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub syncing: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub pending_operations: usize,
}

impl SyncStatus {
    pub(crate) fn new(state: SyncState, pending_operations: usize) -> Self {
        Self {
            phase: state.phase,
            syncing: state.syncing,
            last_synced_at: state.last_synced_at,
            last_error: state.last_error,
            pending_operations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_uninitialized() {
        let state = SyncState::default();
        assert_eq!(state.phase, SyncPhase::Uninitialized);
        assert!(!state.syncing);
        assert!(state.last_synced_at.is_none());
    }

    #[test]
    fn test_success_clears_error() {
        let mut state = SyncState::default();
        state.begin_cycle();
        state.fail("offline".to_string());
        assert!(!state.syncing);
        assert_eq!(state.last_error.as_deref(), Some("offline"));

        state.begin_cycle();
        let now = Utc::now();
        state.succeed(now);
        assert!(state.last_error.is_none());
        assert_eq!(state.last_synced_at, Some(now));
    }

    #[test]
    fn test_failure_keeps_last_success() {
        let mut state = SyncState::default();
        let then = Utc::now();
        state.succeed(then);
        state.fail("rejected".to_string());
        assert_eq!(state.last_synced_at, Some(then));
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let status = SyncStatus::new(SyncState::default(), 3);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["phase"], "uninitialized");
        assert_eq!(json["pendingOperations"], 3);
        assert!(json["lastSyncedAt"].is_null());
    }
}
