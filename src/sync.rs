//! Replication gap detection
//!
//! Compares the local node's high water marks against a snapshot obtained
//! from a peer and reports every `(node, clock)` pair the peer has seen
//! further than we have. Comparing is side-effect free; marks only advance
//! when the caller reports, via [`SyncCoordinator::mark_replicated`], that
//! the missing events are durably present locally.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::watermark::{ClockId, HighWaterMarkSet, HighWaterMarkTable, NodeId, Tsn};

/// Events the local node is missing for one `(node, clock)` pair
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    pub node_id: NodeId,
    pub clock_id: ClockId,
    /// Highest tsn observed locally (0 if never)
    pub local_tsn: Tsn,
    /// Highest tsn the peer has observed
    pub remote_tsn: Tsn,
}

impl Gap {
    /// Number of sequence numbers in `(local_tsn, remote_tsn]`.
    ///
    /// A gap received from elsewhere may have `local_tsn` at or above
    /// `remote_tsn`; its width is 0.
    pub fn width(&self) -> u64 {
        self.remote_tsn.saturating_sub(self.local_tsn)
    }
}

/// Pairs where `remote` is ahead of `local`, ordered by node id then clock id.
///
/// Entries only present in `local` never produce a gap.
pub fn compute_gaps(local: &HighWaterMarkSet, remote: &HighWaterMarkSet) -> Vec<Gap> {
    // HighWaterMarkSet iterates in (node_id, clock_id) order already
    remote
        .iter()
        .filter_map(|mark| {
            let local_tsn = local.get(&mark.node_id, &mark.clock_id);
            (mark.tsn > local_tsn).then(|| Gap {
                node_id: mark.node_id,
                clock_id: mark.clock_id,
                local_tsn,
                remote_tsn: mark.tsn,
            })
        })
        .collect()
}

/// Decides what the local node should pull from a peer.
#[derive(Clone)]
pub struct SyncCoordinator {
    table: HighWaterMarkTable,
}

impl SyncCoordinator {
    pub fn new(table: HighWaterMarkTable) -> Self {
        Self { table }
    }

    /// Gaps between the current local snapshot and a peer's snapshot.
    pub fn pending(&self, remote: &HighWaterMarkSet) -> Result<Vec<Gap>, EngineError> {
        let local = self.table.get_remote_highs()?;
        let gaps = compute_gaps(&local, remote);
        log::debug!(
            "Compared {} local marks with {} remote marks: {} gaps",
            local.len(),
            remote.len(),
            gaps.len()
        );
        Ok(gaps)
    }

    /// Record that the events of `gap` have been replicated locally.
    ///
    /// Call only after the events up to `gap.remote_tsn` are durable.
    pub fn mark_replicated(&self, gap: &Gap) -> Result<bool, EngineError> {
        self.table
            .record_observed(&gap.node_id, &gap.clock_id, gap.remote_tsn)
    }
}
