//! Declared memories: named 2-D arrays reached only from behavioral code.
//!
//! Memories are not electrically connected; they are referenced by
//! behavioral statements and by `RamDq` ports.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use veris_common::Ident;

/// A declared memory: `reg [width-1:0] name [idx_high:idx_low]`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Memory {
    /// The memory name.
    pub name: Ident,
    /// The width in bits of a single memory position.
    width: u32,
    /// One end of the declared index range.
    idx_high: i64,
    /// The other end of the declared index range.
    idx_low: i64,
    /// Free-form attributes.
    pub attributes: BTreeMap<String, String>,
}

impl Memory {
    /// Creates a memory with the given element width and index range.
    pub fn new(name: Ident, width: u32, idx_high: i64, idx_low: i64) -> Self {
        Self {
            name,
            width,
            idx_high,
            idx_low,
            attributes: BTreeMap::new(),
        }
    }

    /// The width in bits of a single memory position.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// The number of memory positions.
    pub fn count(&self) -> u32 {
        (self.idx_high - self.idx_low).unsigned_abs() as u32 + 1
    }

    /// Converts a signed source index to a 0-based address.
    ///
    /// The source may give index ranges that are not zero based; the
    /// address is the offset from the numerically lower bound. Returns
    /// `None` when the index is outside the declared range.
    pub fn index_to_address(&self, idx: i64) -> Option<u32> {
        let lo = self.idx_high.min(self.idx_low);
        let hi = self.idx_high.max(self.idx_low);
        if idx < lo || idx > hi {
            return None;
        }
        Some((idx - lo) as u32)
    }
}
