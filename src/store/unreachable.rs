//! Store whose every operation fails, for exercising error mapping

use super::{MarkUpdate, Registration, Store, StoreError};
use crate::registry::Node;
use crate::watermark::{HighWaterMark, Tsn};

/// Store that cannot be reached
pub(crate) struct UnreachableStore;

fn refused<T>() -> Result<T, StoreError> {
    Err(StoreError::Io("connection refused".into()))
}

impl Store for UnreachableStore {
    fn allocate_sequence(&self, _: &str) -> Result<Tsn, StoreError> {
        refused()
    }

    fn register_identity(&self, _: &str, _: &str) -> Result<Registration, StoreError> {
        refused()
    }

    fn lookup_identity(&self, _: &str) -> Result<Option<Node>, StoreError> {
        refused()
    }

    fn list_identities(&self) -> Result<Vec<Node>, StoreError> {
        refused()
    }

    fn query_high_water_marks(&self) -> Result<Vec<HighWaterMark>, StoreError> {
        refused()
    }

    fn advance_high_water_mark(&self, _: &str, _: &str, _: Tsn) -> Result<MarkUpdate, StoreError> {
        refused()
    }
}
