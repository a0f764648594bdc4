//! The engine context
//!
//! An [`Engine`] owns one shared store handle and the components built on
//! it. Callers create it explicitly and pass it around; dropping the last
//! clone of the store handle closes the underlying connection.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::registry::{Node, NodeRegistry};
use crate::sequence::SequenceGenerator;
use crate::store::{self, Store};
use crate::sync::SyncCoordinator;
use crate::watermark::{HighWaterMarkTable, Tsn};

pub struct Engine {
    store: Arc<dyn Store>,
    sequences: SequenceGenerator,
    registry: NodeRegistry,
    marks: HighWaterMarkTable,
    coordinator: SyncCoordinator,
    local_node: Option<Node>,
}

impl Engine {
    /// Build an engine over an already opened store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        let marks = HighWaterMarkTable::new(store.clone());
        Self {
            sequences: SequenceGenerator::new(store.clone()),
            registry: NodeRegistry::new(store.clone()),
            coordinator: SyncCoordinator::new(marks.clone()),
            marks,
            store,
            local_node: None,
        }
    }

    /// Open the configured store and, if the config names a node, register
    /// it as the local node.
    pub fn open(config: &EngineConfig) -> Result<Self, EngineError> {
        let store = store::open(&config.store).map_err(EngineError::StoreUnavailable)?;
        let mut engine = Self::new(store);

        if let Some(node) = &config.node {
            engine.register_local_node(&node.url, &node.metadata)?;
        }

        Ok(engine)
    }

    /// Register this process's node and remember it as the local node.
    pub fn register_local_node(&mut self, url: &str, metadata: &str) -> Result<Node, EngineError> {
        let node = self.registry.register_node(url, metadata)?;
        self.local_node = Some(node.clone());
        Ok(node)
    }

    pub fn local_node(&self) -> Option<&Node> {
        self.local_node.as_ref()
    }

    /// Next sequence number on the local node's own clock.
    pub fn next_local(&self) -> Result<Tsn, EngineError> {
        let node = self.local_node.as_ref().ok_or(EngineError::NodeNotRegistered)?;
        self.sequences.next(&node.id)
    }

    pub fn sequences(&self) -> &SequenceGenerator {
        &self.sequences
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn marks(&self) -> &HighWaterMarkTable {
        &self.marks
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NodeConfig, StoreConfig};

    #[test]
    fn test_next_local_requires_registration() {
        let mut engine = Engine::open(&EngineConfig::default()).unwrap();
        assert!(matches!(
            engine.next_local(),
            Err(EngineError::NodeNotRegistered)
        ));

        let node = engine.register_local_node("a.example", "zone1").unwrap();
        assert_eq!(engine.next_local().unwrap(), 1);
        assert_eq!(engine.sequences().next(&node.id).unwrap(), 2);
    }

    #[test]
    fn test_open_registers_configured_node() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            store: StoreConfig::sqlite(dir.path().join("nodes.db")),
            node: Some(NodeConfig {
                url: "a.example".into(),
                metadata: "zone1".into(),
            }),
        };

        let first_id = {
            let engine = Engine::open(&config).unwrap();
            engine.next_local().unwrap();
            engine.local_node().unwrap().id.clone()
        };

        // Reopening resolves the same identity and continues its clock
        let engine = Engine::open(&config).unwrap();
        assert_eq!(engine.local_node().unwrap().id, first_id);
        assert_eq!(engine.next_local().unwrap(), 2);
    }

    #[test]
    fn test_open_unwritable_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();

        // A regular file cannot be a parent directory
        let config = EngineConfig::with_store(StoreConfig::sqlite(blocker.join("nodes.db")));
        assert!(matches!(
            Engine::open(&config),
            Err(EngineError::StoreUnavailable(_))
        ));
    }
}
