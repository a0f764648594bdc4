// Highwater - node identity, sequence numbers and replication gap detection

pub mod config;
pub mod engine;
pub mod error;
pub mod registry;
pub mod sequence;
pub mod store;
pub mod sync;
pub mod watermark;

pub use config::{EngineConfig, NodeConfig, StoreConfig};
pub use engine::Engine;
pub use error::EngineError;
pub use registry::{Node, NodeRegistry};
pub use sequence::SequenceGenerator;
pub use store::{MemoryStore, SqliteStore, Store, StoreError};
pub use sync::{compute_gaps, Gap, SyncCoordinator};
pub use watermark::{ClockId, HighWaterMark, HighWaterMarkSet, HighWaterMarkTable, NodeId, Tsn};
