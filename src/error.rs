use thiserror::Error;

use crate::store::StoreError;
use crate::watermark::{ClockId, NodeId, Tsn};

/// Errors returned by every public engine operation.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Sequence unavailable: {0}")]
    SequenceUnavailable(#[source] StoreError),

    #[error("Registration failed: {0}")]
    RegistrationFailed(#[source] StoreError),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Snapshot unavailable: {0}")]
    SnapshotUnavailable(#[source] StoreError),

    /// `node_id` is `None` when the violation is on a bare sequence counter
    #[error(
        "Regression on {}: stored {}, got {}",
        regression_key(.node_id.as_deref(), .clock_id),
        .stored,
        .attempted
    )]
    Regression {
        node_id: Option<NodeId>,
        clock_id: ClockId,
        stored: Tsn,
        attempted: Tsn,
    },

    #[error("Failed to record high water mark: {0}")]
    RecordFailed(#[source] StoreError),

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Local node is not registered")]
    NodeNotRegistered,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
}

impl EngineError {
    /// True for monotonicity violations, which callers usually alert on
    /// rather than retry.
    pub fn is_regression(&self) -> bool {
        matches!(self, EngineError::Regression { .. })
    }
}

fn regression_key(node_id: Option<&str>, clock_id: &str) -> String {
    match node_id {
        Some(node_id) => format!("({}, {})", node_id, clock_id),
        None => format!("clock {}", clock_id),
    }
}

/// Reject identifiers that would make ambiguous keys in the store.
pub(crate) fn validate_identifier(id: &str) -> Result<(), EngineError> {
    if id.is_empty() || id.trim() != id || id.chars().any(char::is_control) {
        return Err(EngineError::InvalidIdentifier(id.to_string()));
    }
    Ok(())
}
