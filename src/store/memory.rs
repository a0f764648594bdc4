//! In-process store
//!
//! Keeps everything in a single mutex-guarded state, so each operation is
//! atomic with respect to other callers in the same process. Nothing
//! survives a restart; use [`super::SqliteStore`] for durability.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::{MarkUpdate, Registration, Store, StoreError};
use crate::registry::Node;
use crate::watermark::{ClockId, HighWaterMark, NodeId, Tsn};

#[derive(Default)]
struct MemoryState {
    sequences: HashMap<ClockId, Tsn>,
    nodes: BTreeMap<NodeId, Node>,
    by_url: HashMap<String, NodeId>,
    marks: BTreeMap<(NodeId, ClockId), Tsn>,
}

/// Store backed by process memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn allocate_sequence(&self, clock_id: &str) -> Result<Tsn, StoreError> {
        let mut state = self.state.lock()?;
        let counter = state.sequences.entry(clock_id.to_string()).or_insert(0);
        let next = counter
            .checked_add(1)
            .ok_or_else(|| StoreError::Constraint(format!("sequence {} exhausted", clock_id)))?;
        *counter = next;
        Ok(next)
    }

    fn register_identity(&self, url: &str, metadata: &str) -> Result<Registration, StoreError> {
        let mut state = self.state.lock()?;

        if let Some(id) = state.by_url.get(url) {
            let node = state
                .nodes
                .get(id)
                .cloned()
                .ok_or_else(|| StoreError::Corrupt(format!("url index points at missing node {}", id)))?;
            return Ok(Registration {
                node,
                created: false,
            });
        }

        let node = Node::new(url, metadata);
        state.by_url.insert(node.url.clone(), node.id.clone());
        state.nodes.insert(node.id.clone(), node.clone());
        Ok(Registration {
            node,
            created: true,
        })
    }

    fn lookup_identity(&self, node_id: &str) -> Result<Option<Node>, StoreError> {
        Ok(self.state.lock()?.nodes.get(node_id).cloned())
    }

    fn list_identities(&self) -> Result<Vec<Node>, StoreError> {
        Ok(self.state.lock()?.nodes.values().cloned().collect())
    }

    fn query_high_water_marks(&self) -> Result<Vec<HighWaterMark>, StoreError> {
        let state = self.state.lock()?;
        Ok(state
            .marks
            .iter()
            .map(|((n, c), tsn)| HighWaterMark::new(n.as_str(), c.as_str(), *tsn))
            .collect())
    }

    fn advance_high_water_mark(
        &self,
        node_id: &str,
        clock_id: &str,
        tsn: Tsn,
    ) -> Result<MarkUpdate, StoreError> {
        let mut state = self.state.lock()?;
        let key = (node_id.to_string(), clock_id.to_string());
        let stored = state.marks.get(&key).copied().unwrap_or(0);

        if tsn > stored {
            state.marks.insert(key, tsn);
            Ok(MarkUpdate::Advanced { previous: stored })
        } else if tsn == stored {
            Ok(MarkUpdate::Unchanged)
        } else {
            Ok(MarkUpdate::Rejected { stored })
        }
    }
}
