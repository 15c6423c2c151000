//! Remote endpoint contract
//!
//! A remote is the backup/mirror the tracker pushes its pending operations
//! to. It answers every push with one acknowledgement per operation id and
//! must treat an id it has already applied as an accepted no-op.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::Event;
use crate::queue::PendingOperation;

/// Errors raised while talking to a remote
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    #[error("Failed to connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Timed out after {0:?} waiting for the remote")]
    Timeout(Duration),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Remote error: {0}")]
    Server(String),

    #[error("Remote unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of one operation in a push
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum AckStatus {
    Accepted,
    Rejected { reason: String },
}

/// Acknowledgement for a single operation id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpAck {
    pub op_id: Uuid,
    #[serde(flatten)]
    pub status: AckStatus,
}

impl OpAck {
    pub fn accepted(op_id: Uuid) -> Self {
        Self {
            op_id,
            status: AckStatus::Accepted,
        }
    }

    pub fn rejected(op_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            op_id,
            status: AckStatus::Rejected {
                reason: reason.into(),
            },
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == AckStatus::Accepted
    }
}

/// A remote store the tracker can pull from and push to
pub trait Remote: Send + Sync + 'static {
    /// Fetch the remote's full event collection
    fn pull(&self) -> impl Future<Output = Result<Vec<Event>, RemoteError>> + Send;

    /// Apply a batch of operations in order and acknowledge each one
    fn push(
        &self,
        operations: &[PendingOperation],
    ) -> impl Future<Output = Result<Vec<OpAck>, RemoteError>> + Send;

    /// Whether this remote points anywhere
    ///
    /// An unconfigured remote is skipped during initialization.
    fn is_configured(&self) -> bool {
        true
    }
}
