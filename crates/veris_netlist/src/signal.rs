//! Signals: the wire/reg/tri objects that carry net properties.
//!
//! A [`Signal`] does not compute anything. It carries the declared
//! properties of a net — type, port direction, index range — and owns one
//! passive pin per bit. A set of pins connected together is normally
//! connected to exactly one of these.

use crate::ids::{PinId, ScopeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use veris_common::{Ident, Logic};

/// The semantic type of a signal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum SignalKind {
    /// Undeclared wire created by implicit declaration rules.
    Implicit,
    /// Undeclared reg created by implicit declaration rules.
    ImplicitReg,
    /// A plain wire.
    Wire,
    /// A tri-state net.
    Tri,
    /// A tri-state net that pulls to 0.
    Tri0,
    /// A tri-state net that pulls to 1.
    Tri1,
    /// A constant-0 supply net.
    Supply0,
    /// A constant-1 supply net.
    Supply1,
    /// A wired-AND net.
    Wand,
    /// A wired-OR net.
    Wor,
    /// A tri-state wired-AND net.
    Triand,
    /// A tri-state wired-OR net.
    Trior,
    /// A variable assigned by behavioral code.
    Reg,
    /// A 32-bit signed integer variable.
    Integer,
}

/// How a signal relates to the enclosing module's port list.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum PortKind {
    /// Not a port.
    NotAPort,
    /// Port with no declared direction.
    Implicit,
    /// Input port.
    Input,
    /// Output port.
    Output,
    /// Bidirectional port.
    Inout,
}

/// A named signal within a scope.
///
/// Invariant: `width() == |msb - lsb| + 1 == pins.len()`. The msb/lsb
/// indices are signed and may run in either direction; [`sb_to_idx`]
/// maps a source index to a 0-based pin number consistently for both.
///
/// [`sb_to_idx`]: Signal::sb_to_idx
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Signal {
    /// The local signal name.
    pub name: Ident,
    /// The scope this signal was declared in.
    pub scope: ScopeId,
    /// The semantic net type.
    pub kind: SignalKind,
    /// The port direction attribute.
    pub port: PortKind,
    /// Most significant bit index as written in the source.
    pub msb: i64,
    /// Least significant bit index as written in the source.
    pub lsb: i64,
    /// One passive pin per bit; pin 0 is the least significant bit.
    pub pins: Vec<PinId>,
    /// Per-pin initial value.
    ivals: Vec<Logic>,
    /// Number of expression nodes referencing this signal.
    eref: u32,
    /// True for compiler-generated temporaries.
    pub local: bool,
    /// Rise/fall/decay delay times.
    pub delays: [u64; 3],
    /// Free-form attributes.
    pub attributes: BTreeMap<String, String>,
    /// Mark bit used by traversals.
    pub mark: bool,
}

impl Signal {
    /// Creates a signal record. The pins are allocated by the design.
    pub fn new(name: Ident, scope: ScopeId, kind: SignalKind, msb: i64, lsb: i64) -> Self {
        let width = (msb - lsb).unsigned_abs() as usize + 1;
        Self {
            name,
            scope,
            kind,
            port: PortKind::NotAPort,
            msb,
            lsb,
            pins: Vec::new(),
            ivals: vec![Logic::X; width],
            eref: 0,
            local: false,
            delays: [0; 3],
            attributes: BTreeMap::new(),
            mark: false,
        }
    }

    /// The bit width of this signal.
    pub fn width(&self) -> u32 {
        (self.msb - self.lsb).unsigned_abs() as u32 + 1
    }

    /// Converts a signed source index to a 0-based pin number.
    ///
    /// Accounts for either declaration direction: for `[7:0]` the index
    /// 7 maps to pin 7, for `[0:7]` the index 0 maps to pin 7. Returns
    /// `None` if the index is outside the declared range.
    pub fn sb_to_idx(&self, sb: i64) -> Option<u32> {
        let (lo, hi) = if self.msb >= self.lsb {
            (self.lsb, self.msb)
        } else {
            (self.msb, self.lsb)
        };
        if sb < lo || sb > hi {
            return None;
        }
        if self.msb >= self.lsb {
            Some((sb - self.lsb) as u32)
        } else {
            Some((self.lsb - sb) as u32)
        }
    }

    /// The pin for the given 0-based bit index.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.width()`.
    pub fn pin(&self, idx: u32) -> PinId {
        self.pins[idx as usize]
    }

    /// The initial value of the given bit.
    pub fn ival(&self, idx: u32) -> Logic {
        self.ivals[idx as usize]
    }

    /// Sets the initial value of the given bit.
    pub fn set_ival(&mut self, idx: u32, val: Logic) {
        self.ivals[idx as usize] = val;
    }

    /// Notes one more expression node referencing this signal.
    pub fn incr_eref(&mut self) {
        self.eref += 1;
    }

    /// Notes one fewer expression node referencing this signal.
    pub fn decr_eref(&mut self) {
        debug_assert!(self.eref > 0, "eref underflow");
        self.eref -= 1;
    }

    /// The number of expression nodes currently referencing this signal.
    pub fn eref(&self) -> u32 {
        self.eref
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(msb: i64, lsb: i64) -> Signal {
        Signal::new(
            Ident::from_raw(0),
            ScopeId::from_raw(0),
            SignalKind::Wire,
            msb,
            lsb,
        )
    }

    #[test]
    fn width_from_range() {
        assert_eq!(sig(7, 0).width(), 8);
        assert_eq!(sig(0, 7).width(), 8);
        assert_eq!(sig(0, 0).width(), 1);
        assert_eq!(sig(1, 8).width(), 8);
        assert_eq!(sig(-4, 3).width(), 8);
    }

    #[test]
    fn sb_to_idx_descending_range() {
        let s = sig(7, 0);
        assert_eq!(s.sb_to_idx(0), Some(0));
        assert_eq!(s.sb_to_idx(7), Some(7));
        assert_eq!(s.sb_to_idx(3), Some(3));
    }

    #[test]
    fn sb_to_idx_ascending_range() {
        // reg [1:8] has 8 bits, msb == 1 and lsb == 8.
        let s = sig(1, 8);
        assert_eq!(s.sb_to_idx(8), Some(0));
        assert_eq!(s.sb_to_idx(1), Some(7));
    }

    #[test]
    fn msb_always_maps_to_top_pin() {
        for (m, l) in [(7i64, 0i64), (0, 7), (1, 8), (-3, 4), (4, -3)] {
            let s = sig(m, l);
            assert_eq!(s.sb_to_idx(m), Some(s.width() - 1));
            assert_eq!(s.sb_to_idx(l), Some(0));
        }
    }

    #[test]
    fn sb_to_idx_out_of_range() {
        let s = sig(7, 0);
        assert_eq!(s.sb_to_idx(8), None);
        assert_eq!(s.sb_to_idx(-1), None);
    }

    #[test]
    fn eref_counting() {
        let mut s = sig(0, 0);
        assert_eq!(s.eref(), 0);
        s.incr_eref();
        s.incr_eref();
        assert_eq!(s.eref(), 2);
        s.decr_eref();
        assert_eq!(s.eref(), 1);
    }

    #[test]
    fn initial_values_default_x() {
        let mut s = sig(3, 0);
        assert_eq!(s.ival(0), Logic::X);
        s.set_ival(0, Logic::One);
        assert_eq!(s.ival(0), Logic::One);
        assert_eq!(s.ival(1), Logic::X);
    }

    #[test]
    fn serde_roundtrip() {
        let s = sig(7, 0);
        let json = serde_json::to_string(&s).unwrap();
        let back: Signal = serde_json::from_str(&json).unwrap();
        assert_eq!(back.width(), 8);
        assert_eq!(back.kind, SignalKind::Wire);
    }
}
