//! Sequence number generation
//!
//! Each clock identifier names an independent counter held by the store.
//! The store increments atomically, so concurrent callers on the same clock
//! always receive distinct, increasing values.

use std::sync::Arc;

use crate::error::{validate_identifier, EngineError};
use crate::store::Store;
use crate::watermark::Tsn;

/// Issues transaction sequence numbers.
#[derive(Clone)]
pub struct SequenceGenerator {
    store: Arc<dyn Store>,
}

impl SequenceGenerator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Issue the next sequence number for `clock_id`.
    ///
    /// On error no value has been handed out; the caller must not assume one
    /// was consumed or reserved.
    pub fn next(&self, clock_id: &str) -> Result<Tsn, EngineError> {
        validate_identifier(clock_id)?;

        let tsn = self
            .store
            .allocate_sequence(clock_id)
            .map_err(EngineError::SequenceUnavailable)?;

        // 0 means "nothing observed"; a counter that returns it has gone backwards
        if tsn == 0 {
            return Err(EngineError::Regression {
                node_id: None,
                clock_id: clock_id.to_string(),
                stored: 0,
                attempted: tsn,
            });
        }

        Ok(tsn)
    }
}
