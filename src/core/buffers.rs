//! The unit of data carried over links.
//!
//! Payloads are opaque to the engine and shared behind an `Arc` so that
//! fan-out branches clone references, never bytes.

use std::sync::Arc;

/// One opaque media buffer travelling producer -> consumer along a link.
#[derive(Debug, Clone)]
pub struct Buffer {
    /// Monotonically increasing per-producer sequence number.
    seq: u64,
    payload: Arc<[u8]>,
}

impl Buffer {
    pub fn new(seq: u64, payload: impl Into<Arc<[u8]>>) -> Self {
        Self {
            seq,
            payload: payload.into(),
        }
    }

    /// An empty buffer carrying only a sequence number. Useful for
    /// pacing/testing stages where payload content is irrelevant.
    pub fn empty(seq: u64) -> Self {
        Self::new(seq, Vec::new())
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
