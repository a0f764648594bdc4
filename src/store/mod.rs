//! Persistent store collaborator
//!
//! The engine keeps no authoritative state in process memory. Sequence
//! counters, node identities and high water marks all live behind the
//! [`Store`] trait, whose implementations must make each operation atomic.

pub mod memory;
pub mod sqlite;
#[cfg(test)]
pub(crate) mod unreachable;

use std::sync::{Arc, PoisonError};

use thiserror::Error;

use crate::config::StoreConfig;
use crate::registry::Node;
use crate::watermark::{HighWaterMark, Tsn};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
#[cfg(test)]
pub(crate) use unreachable::UnreachableStore;

/// Error types for store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Constraint violated: {0}")]
    Constraint(String),
}

impl<T> From<PoisonError<T>> for StoreError {
    fn from(_: PoisonError<T>) -> Self {
        StoreError::Poisoned
    }
}

/// Result of an insert-or-lookup registration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    pub node: Node,
    /// False when the URL already had an identity
    pub created: bool,
}

/// Outcome of a conditional high-water-mark update
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkUpdate {
    /// Stored value was raised from `previous`
    Advanced { previous: Tsn },
    /// Stored value already equals the offered one
    Unchanged,
    /// Offered value is below the stored one; nothing was written
    Rejected { stored: Tsn },
}

/// Trait for store backends.
///
/// Every method is a single atomic operation against durable state.
pub trait Store: Send + Sync {
    /// Atomically increment the counter for `clock_id` and return the new
    /// value. The first value for a fresh clock is 1.
    fn allocate_sequence(&self, clock_id: &str) -> Result<Tsn, StoreError>;

    /// Return the identity registered for `url`, creating one if none exists.
    fn register_identity(&self, url: &str, metadata: &str) -> Result<Registration, StoreError>;

    /// Look up a node by id
    fn lookup_identity(&self, node_id: &str) -> Result<Option<Node>, StoreError>;

    /// All registered nodes, ordered by id
    fn list_identities(&self) -> Result<Vec<Node>, StoreError>;

    /// Full snapshot of the high water marks, ordered by node id then clock id
    fn query_high_water_marks(&self) -> Result<Vec<HighWaterMark>, StoreError>;

    /// Raise the mark for `(node_id, clock_id)` to `tsn` if it is higher
    /// than the stored value (absent entries count as 0).
    fn advance_high_water_mark(
        &self,
        node_id: &str,
        clock_id: &str,
        tsn: Tsn,
    ) -> Result<MarkUpdate, StoreError>;
}

/// Open the store described by `config`.
pub fn open(config: &StoreConfig) -> Result<Arc<dyn Store>, StoreError> {
    match config {
        StoreConfig::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreConfig::Sqlite {
            path,
            busy_timeout_ms,
        } => Ok(Arc::new(SqliteStore::open(
            path,
            std::time::Duration::from_millis(*busy_timeout_ms),
        )?)),
    }
}
