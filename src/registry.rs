//! Node registration
//!
//! Nodes register an advertised URL plus free-form metadata and receive an
//! opaque identity that peers use as the node component of high water marks.
//! Registration is idempotent by URL: the store decides whether a URL already
//! has an identity, and if so that identity is returned unchanged.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::store::Store;
use crate::watermark::NodeId;

/// A registered participant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Opaque stable identity
    pub id: NodeId,

    /// Advertised endpoint
    pub url: String,

    /// Free-form description
    pub metadata: String,

    /// When the identity was first assigned
    pub registered_at: DateTime<Utc>,
}

impl Node {
    /// Create a node with a fresh identity. Only stores call this; everyone
    /// else obtains nodes through [`NodeRegistry::register`].
    pub fn new(url: &str, metadata: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            url: url.to_string(),
            metadata: metadata.to_string(),
            registered_at: Utc::now(),
        }
    }
}

/// Registry of node identities.
#[derive(Clone)]
pub struct NodeRegistry {
    store: Arc<dyn Store>,
}

impl NodeRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Register `url` and return its identity.
    ///
    /// Registering a URL that already has an identity returns that identity;
    /// the stored metadata is kept even if `metadata` differs.
    pub fn register(&self, url: &str, metadata: &str) -> Result<NodeId, EngineError> {
        Ok(self.register_node(url, metadata)?.id)
    }

    /// Like [`register`](Self::register) but returns the full record.
    pub fn register_node(&self, url: &str, metadata: &str) -> Result<Node, EngineError> {
        if url.trim().is_empty() {
            return Err(EngineError::InvalidIdentifier(url.to_string()));
        }

        let registration = self
            .store
            .register_identity(url, metadata)
            .map_err(EngineError::RegistrationFailed)?;

        let node = registration.node;
        if registration.created {
            log::info!("Registered node {} at {}", node.id, node.url);
        } else if node.metadata != metadata {
            log::warn!(
                "Node {} already registered at {}; keeping metadata {:?}, ignoring {:?}",
                node.id,
                node.url,
                node.metadata,
                metadata
            );
        } else {
            log::debug!("Node {} already registered at {}", node.id, node.url);
        }

        Ok(node)
    }

    /// Resolve a previously registered identity.
    pub fn lookup(&self, node_id: &str) -> Result<Node, EngineError> {
        self.store
            .lookup_identity(node_id)
            .map_err(EngineError::SnapshotUnavailable)?
            .ok_or_else(|| EngineError::NodeNotFound(node_id.to_string()))
    }

    /// All registered nodes, ordered by id.
    pub fn nodes(&self) -> Result<Vec<Node>, EngineError> {
        self.store
            .list_identities()
            .map_err(EngineError::SnapshotUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, SqliteStore, StoreError, UnreachableStore};

    fn registries() -> Vec<NodeRegistry> {
        vec![
            NodeRegistry::new(Arc::new(MemoryStore::new())),
            NodeRegistry::new(Arc::new(SqliteStore::open_in_memory().unwrap())),
        ]
    }

    #[test]
    fn test_register_and_lookup() {
        for registry in registries() {
            let id = registry.register("a.example", "zone1").unwrap();
            let node = registry.lookup(&id).unwrap();
            assert_eq!(node.url, "a.example");
            assert_eq!(node.metadata, "zone1");
        }
    }

    #[test]
    fn test_register_twice_same_identity() {
        for registry in registries() {
            let first = registry.register("a.example", "zone1").unwrap();
            let second = registry.register("a.example", "zone1").unwrap();
            assert_eq!(first, second);
            assert_eq!(registry.nodes().unwrap().len(), 1);
        }
    }

    #[test]
    fn test_metadata_change_keeps_original() {
        for registry in registries() {
            let id = registry.register("a.example", "zone1").unwrap();
            assert_eq!(registry.register("a.example", "zone2").unwrap(), id);
            assert_eq!(registry.lookup(&id).unwrap().metadata, "zone1");
        }
    }

    #[test]
    fn test_distinct_urls_distinct_ids() {
        for registry in registries() {
            let a = registry.register("a.example", "zone1").unwrap();
            let b = registry.register("b.example", "zone1").unwrap();
            assert_ne!(a, b);
        }
    }

    #[test]
    fn test_lookup_missing() {
        for registry in registries() {
            let result = registry.lookup("no-such-node");
            assert!(matches!(result, Err(EngineError::NodeNotFound(id)) if id == "no-such-node"));
        }
    }

    #[test]
    fn test_empty_url_rejected() {
        for registry in registries() {
            assert!(matches!(
                registry.register("", "zone1"),
                Err(EngineError::InvalidIdentifier(_))
            ));
            assert!(matches!(
                registry.register("   ", "zone1"),
                Err(EngineError::InvalidIdentifier(_))
            ));
            assert!(registry.nodes().unwrap().is_empty());
        }
    }

    #[test]
    fn test_unreachable_store() {
        let registry = NodeRegistry::new(Arc::new(UnreachableStore));

        // No identity is handed out when the store refuses
        assert!(matches!(
            registry.register("a.example", "zone1"),
            Err(EngineError::RegistrationFailed(StoreError::Io(_)))
        ));
        assert!(matches!(
            registry.register_node("a.example", "zone1"),
            Err(EngineError::RegistrationFailed(StoreError::Io(_)))
        ));
        assert!(matches!(
            registry.lookup("A1"),
            Err(EngineError::SnapshotUnavailable(StoreError::Io(_)))
        ));
        assert!(matches!(
            registry.nodes(),
            Err(EngineError::SnapshotUnavailable(StoreError::Io(_)))
        ));
    }
}
