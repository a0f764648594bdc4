//! High water marks
//!
//! A high water mark records the highest sequence number of a clock's events
//! from a given node that the local node has durably observed. A
//! [`HighWaterMarkSet`] is the full vector of those marks, exchanged between
//! nodes as a snapshot; the [`HighWaterMarkTable`] is the store-backed view
//! the local node reads and advances.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{validate_identifier, EngineError};
use crate::store::{MarkUpdate, Store};

/// Opaque node identity assigned at registration
pub type NodeId = String;

/// Logical counter scope under which sequence numbers are issued
pub type ClockId = String;

/// Transaction sequence number
pub type Tsn = u64;

/// One `(node, clock) → tsn` entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HighWaterMark {
    pub node_id: NodeId,
    pub clock_id: ClockId,
    pub tsn: Tsn,
}

impl HighWaterMark {
    pub fn new(node_id: impl Into<NodeId>, clock_id: impl Into<ClockId>, tsn: Tsn) -> Self {
        Self {
            node_id: node_id.into(),
            clock_id: clock_id.into(),
            tsn,
        }
    }
}

/// A snapshot of high water marks, ordered by node id then clock id.
///
/// Serializes as a list of [`HighWaterMark`] entries so it can travel over
/// any transport that speaks JSON.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<HighWaterMark>", into = "Vec<HighWaterMark>")]
pub struct HighWaterMarkSet {
    marks: BTreeMap<(NodeId, ClockId), Tsn>,
}

impl HighWaterMarkSet {
    /// Create an empty set (has observed nothing)
    pub fn new() -> Self {
        Self::default()
    }

    /// Tsn observed for a pair (0 if never observed)
    pub fn get(&self, node_id: &str, clock_id: &str) -> Tsn {
        self.marks
            .get(&(node_id.to_string(), clock_id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Record a mark, keeping the larger of the stored and new value
    pub fn observe(&mut self, node_id: &str, clock_id: &str, tsn: Tsn) {
        let current = self
            .marks
            .entry((node_id.to_string(), clock_id.to_string()))
            .or_insert(0);
        if tsn > *current {
            *current = tsn;
        }
    }

    /// Merge another set into this one (pairwise max)
    pub fn merge(&mut self, other: &HighWaterMarkSet) {
        for ((node_id, clock_id), tsn) in &other.marks {
            self.observe(node_id, clock_id, *tsn);
        }
    }

    /// True if this set has observed at least everything `other` has
    pub fn dominates(&self, other: &HighWaterMarkSet) -> bool {
        other
            .marks
            .iter()
            .all(|((n, c), tsn)| self.get(n, c) >= *tsn)
    }

    /// Highest tsn for a clock across every tracked node
    pub fn max_for_clock(&self, clock_id: &str) -> Tsn {
        self.marks
            .iter()
            .filter(|((_, c), _)| c == clock_id)
            .map(|(_, tsn)| *tsn)
            .max()
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// Iterate entries in `(node_id, clock_id)` order
    pub fn iter(&self) -> impl Iterator<Item = HighWaterMark> + '_ {
        self.marks
            .iter()
            .map(|((n, c), tsn)| HighWaterMark::new(n.as_str(), c.as_str(), *tsn))
    }
}

impl From<Vec<HighWaterMark>> for HighWaterMarkSet {
    fn from(marks: Vec<HighWaterMark>) -> Self {
        marks.into_iter().collect()
    }
}

impl From<HighWaterMarkSet> for Vec<HighWaterMark> {
    fn from(set: HighWaterMarkSet) -> Self {
        set.iter().collect()
    }
}

impl FromIterator<HighWaterMark> for HighWaterMarkSet {
    fn from_iter<I: IntoIterator<Item = HighWaterMark>>(iter: I) -> Self {
        let mut set = Self::new();
        for mark in iter {
            set.observe(&mark.node_id, &mark.clock_id, mark.tsn);
        }
        set
    }
}

/// Store-backed table of the local node's high water marks.
///
/// Holds no state of its own; every call reads through to the store.
#[derive(Clone)]
pub struct HighWaterMarkTable {
    store: Arc<dyn Store>,
}

impl HighWaterMarkTable {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Full snapshot of every mark known to the local store.
    pub fn get_remote_highs(&self) -> Result<HighWaterMarkSet, EngineError> {
        let marks = self
            .store
            .query_high_water_marks()
            .map_err(EngineError::SnapshotUnavailable)?;
        Ok(marks.into_iter().collect())
    }

    /// Highest observed tsn for `clock_id` across all tracked nodes.
    pub fn check_high(&self, clock_id: &str) -> Result<Tsn, EngineError> {
        validate_identifier(clock_id)?;
        Ok(self.get_remote_highs()?.max_for_clock(clock_id))
    }

    /// Observed tsn for a single `(node, clock)` pair.
    pub fn high_for(&self, node_id: &str, clock_id: &str) -> Result<Tsn, EngineError> {
        validate_identifier(node_id)?;
        validate_identifier(clock_id)?;
        Ok(self.get_remote_highs()?.get(node_id, clock_id))
    }

    /// Advance the mark for `(node_id, clock_id)` to `tsn`.
    ///
    /// Returns `true` when the stored value was raised and `false` when it
    /// already equalled `tsn`. A lower `tsn` leaves the stored value alone
    /// and returns [`EngineError::Regression`].
    pub fn record_observed(
        &self,
        node_id: &str,
        clock_id: &str,
        tsn: Tsn,
    ) -> Result<bool, EngineError> {
        validate_identifier(node_id)?;
        validate_identifier(clock_id)?;

        match self
            .store
            .advance_high_water_mark(node_id, clock_id, tsn)
            .map_err(EngineError::RecordFailed)?
        {
            MarkUpdate::Advanced { previous } => {
                log::debug!("Advanced ({}, {}) from {} to {}", node_id, clock_id, previous, tsn);
                Ok(true)
            }
            MarkUpdate::Unchanged => Ok(false),
            MarkUpdate::Rejected { stored } => {
                log::warn!(
                    "Rejected regression on ({}, {}): stored {}, got {}",
                    node_id,
                    clock_id,
                    stored,
                    tsn
                );
                Err(EngineError::Regression {
                    node_id: Some(node_id.to_string()),
                    clock_id: clock_id.to_string(),
                    stored,
                    attempted: tsn,
                })
            }
        }
    }
}
