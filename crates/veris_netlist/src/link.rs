//! The link/nexus graph: pins joined into circular rings.
//!
//! Every pin in the design lives in the [`LinkPool`] slab. Pins that are
//! electrically connected form a circular doubly-linked ring; an
//! unconnected pin is a singleton ring of itself. Splicing and unlinking
//! are index manipulations inside the slab, so no reference cycles
//! escape it.

use crate::arena::Arena;
use crate::ids::{NodeId, PinId, SignalId};
use serde::{Deserialize, Serialize};

/// The drive direction of a pin.
///
/// An `Input` never drives the net, a `Passive` pin never receives a
/// value (wires are passive), and an `Output` drives it. At most one
/// output per ring is a design rule diagnosed by callers, not enforced
/// here.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum PinDir {
    /// Carries the net's properties without driving or receiving.
    Passive,
    /// Receives the resolved value of the net.
    Input,
    /// Drives the net.
    Output,
}

/// The object a pin belongs to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum PinOwner {
    /// A device node pin.
    Node(NodeId),
    /// A signal bit pin.
    Signal(SignalId),
}

/// One pin in the link pool.
///
/// Pin identity is `(owner, index, inst)`: the owning object, the pin
/// index within it, and the vector-instance index for named pin families
/// like `DataA[3]`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pin {
    /// The owning node or signal.
    pub owner: PinOwner,
    /// The pin index within the owner.
    pub index: u32,
    /// The drive direction.
    pub dir: PinDir,
    /// Optional pin family name (e.g. `DataA`).
    pub name: Option<String>,
    /// Instance index within the named family.
    pub inst: u32,
    prev: PinId,
    next: PinId,
}

/// The slab of all pins in a design.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkPool {
    pins: Arena<PinId, Pin>,
}

impl LinkPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new pin as a singleton ring.
    pub fn alloc(&mut self, owner: PinOwner, index: u32, dir: PinDir) -> PinId {
        let id = self.pins.alloc(Pin {
            owner,
            index,
            dir,
            name: None,
            inst: 0,
            prev: PinId::from_raw(0),
            next: PinId::from_raw(0),
        });
        let pin = self.pins.get_mut(id);
        pin.prev = id;
        pin.next = id;
        id
    }

    /// Returns the pin record.
    pub fn pin(&self, id: PinId) -> &Pin {
        self.pins.get(id)
    }

    /// Sets the pin direction.
    pub fn set_dir(&mut self, id: PinId, dir: PinDir) {
        self.pins.get_mut(id).dir = dir;
    }

    /// Names the pin as a member of a pin family.
    pub fn set_name(&mut self, id: PinId, name: impl Into<String>, inst: u32) {
        let pin = self.pins.get_mut(id);
        pin.name = Some(name.into());
        pin.inst = inst;
    }

    /// Returns the number of pins ever allocated (live pins only).
    pub fn len(&self) -> usize {
        self.pins.len()
    }

    /// Returns `true` if no pins are allocated.
    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    /// Splices the rings containing `a` and `b` into a single ring.
    ///
    /// Connection is transitive; if the pins are already in one ring the
    /// call is a no-op, making `connect` idempotent.
    pub fn connect(&mut self, a: PinId, b: PinId) {
        if a == b || self.is_linked(a, b) {
            return;
        }
        let a_next = self.pins.get(a).next;
        let b_next = self.pins.get(b).next;
        self.pins.get_mut(a).next = b_next;
        self.pins.get_mut(b_next).prev = a;
        self.pins.get_mut(b).next = a_next;
        self.pins.get_mut(a_next).prev = b;
    }

    /// Removes `p` from its ring, restoring it to a singleton.
    ///
    /// The remainder of the former ring is left intact.
    pub fn unlink(&mut self, p: PinId) {
        let (prev, next) = {
            let pin = self.pins.get(p);
            (pin.prev, pin.next)
        };
        if next == p {
            return;
        }
        self.pins.get_mut(prev).next = next;
        self.pins.get_mut(next).prev = prev;
        let pin = self.pins.get_mut(p);
        pin.prev = p;
        pin.next = p;
    }

    /// Frees the pin entirely, unlinking it first.
    pub fn free(&mut self, p: PinId) {
        self.unlink(p);
        self.pins.remove(p);
    }

    /// Returns `true` if the pin is connected to anything else.
    pub fn has_neighbors(&self, p: PinId) -> bool {
        self.pins.get(p).next != p
    }

    /// Returns `true` if `a` and `b` share a ring. O(ring size).
    pub fn is_linked(&self, a: PinId, b: PinId) -> bool {
        if a == b {
            return true;
        }
        self.ring(a).any(|p| p == b)
    }

    /// Iterates over all pins of the ring containing `p`, starting at
    /// `p` itself.
    pub fn ring(&self, p: PinId) -> RingIter<'_> {
        RingIter {
            pool: self,
            start: p,
            cur: Some(p),
        }
    }

    /// Counts the Input pins in the ring containing `p`.
    pub fn count_inputs(&self, p: PinId) -> usize {
        self.ring(p)
            .filter(|&q| self.pins.get(q).dir == PinDir::Input)
            .count()
    }

    /// Counts the Output pins in the ring containing `p`.
    pub fn count_outputs(&self, p: PinId) -> usize {
        self.ring(p)
            .filter(|&q| self.pins.get(q).dir == PinDir::Output)
            .count()
    }

    /// Counts the signal pins in the ring containing `p`.
    pub fn count_signals(&self, p: PinId) -> usize {
        self.ring(p)
            .filter(|&q| matches!(self.pins.get(q).owner, PinOwner::Signal(_)))
            .count()
    }

    /// Finds the signal connected to the ring containing `p`, together
    /// with the signal bit index. There should normally be exactly one.
    pub fn find_ring_signal(&self, p: PinId) -> Option<(SignalId, u32)> {
        self.ring(p).find_map(|q| {
            let pin = self.pins.get(q);
            match pin.owner {
                PinOwner::Signal(sig) => Some((sig, pin.index)),
                PinOwner::Node(_) => None,
            }
        })
    }

    /// Finds the next Output pin in the ring at or after `p`, if any.
    pub fn find_ring_output(&self, p: PinId) -> Option<PinId> {
        self.ring(p)
            .find(|&q| self.pins.get(q).dir == PinDir::Output)
    }
}

/// Iterator over one ring of the pool.
pub struct RingIter<'a> {
    pool: &'a LinkPool,
    start: PinId,
    cur: Option<PinId>,
}

impl Iterator for RingIter<'_> {
    type Item = PinId;

    fn next(&mut self) -> Option<PinId> {
        let cur = self.cur?;
        let next = self.pool.pins.get(cur).next;
        self.cur = if next == self.start { None } else { Some(next) };
        Some(cur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig_pin(pool: &mut LinkPool, sig: u32, idx: u32) -> PinId {
        pool.alloc(
            PinOwner::Signal(SignalId::from_raw(sig)),
            idx,
            PinDir::Passive,
        )
    }

    fn node_pin(pool: &mut LinkPool, node: u32, idx: u32, dir: PinDir) -> PinId {
        pool.alloc(PinOwner::Node(NodeId::from_raw(node)), idx, dir)
    }

    #[test]
    fn new_pin_is_singleton() {
        let mut pool = LinkPool::new();
        let p = sig_pin(&mut pool, 0, 0);
        assert!(!pool.has_neighbors(p));
        assert_eq!(pool.ring(p).count(), 1);
        assert!(pool.is_linked(p, p));
    }

    #[test]
    fn connect_two_wires() {
        // Two wires w1 w2; connect(w1.pin(0), w2.pin(0))
        let mut pool = LinkPool::new();
        let w1 = sig_pin(&mut pool, 0, 0);
        let w2 = sig_pin(&mut pool, 1, 0);
        pool.connect(w1, w2);
        assert!(pool.is_linked(w1, w2));
        assert_eq!(pool.count_signals(w1), 2);
        // Unlink w1; the connection is gone.
        pool.unlink(w1);
        assert!(!pool.is_linked(w1, w2));
        assert_eq!(pool.ring(w2).count(), 1);
    }

    #[test]
    fn connect_is_idempotent() {
        let mut pool = LinkPool::new();
        let a = sig_pin(&mut pool, 0, 0);
        let b = sig_pin(&mut pool, 1, 0);
        pool.connect(a, b);
        pool.connect(a, b);
        pool.connect(b, a);
        assert_eq!(pool.ring(a).count(), 2);
    }

    #[test]
    fn connect_is_transitive() {
        let mut pool = LinkPool::new();
        let a = sig_pin(&mut pool, 0, 0);
        let b = sig_pin(&mut pool, 1, 0);
        let c = sig_pin(&mut pool, 2, 0);
        pool.connect(a, b);
        pool.connect(b, c);
        assert!(pool.is_linked(a, c));
        assert_eq!(pool.ring(a).count(), 3);
        assert_eq!(pool.count_signals(c), 3);
    }

    #[test]
    fn splice_two_rings() {
        let mut pool = LinkPool::new();
        let a1 = sig_pin(&mut pool, 0, 0);
        let a2 = sig_pin(&mut pool, 1, 0);
        let b1 = sig_pin(&mut pool, 2, 0);
        let b2 = sig_pin(&mut pool, 3, 0);
        pool.connect(a1, a2);
        pool.connect(b1, b2);
        pool.connect(a1, b1);
        // All four now share one ring.
        assert_eq!(pool.ring(a2).count(), 4);
        for &p in &[a1, a2, b1, b2] {
            for &q in &[a1, a2, b1, b2] {
                assert!(pool.is_linked(p, q));
            }
        }
    }

    #[test]
    fn unlink_preserves_remainder() {
        let mut pool = LinkPool::new();
        let a = sig_pin(&mut pool, 0, 0);
        let b = sig_pin(&mut pool, 1, 0);
        let c = sig_pin(&mut pool, 2, 0);
        pool.connect(a, b);
        pool.connect(b, c);
        pool.unlink(b);
        assert_eq!(pool.ring(b).count(), 1);
        assert!(pool.is_linked(a, c));
        assert_eq!(pool.ring(a).count(), 2);
    }

    #[test]
    fn direction_counts() {
        let mut pool = LinkPool::new();
        let w = sig_pin(&mut pool, 0, 0);
        let out = node_pin(&mut pool, 0, 0, PinDir::Output);
        let in1 = node_pin(&mut pool, 1, 1, PinDir::Input);
        let in2 = node_pin(&mut pool, 2, 1, PinDir::Input);
        pool.connect(w, out);
        pool.connect(w, in1);
        pool.connect(w, in2);
        assert_eq!(pool.count_inputs(w), 2);
        assert_eq!(pool.count_outputs(w), 1);
        assert_eq!(pool.count_signals(w), 1);
        assert_eq!(pool.find_ring_output(in1), Some(out));
    }

    #[test]
    fn find_ring_signal() {
        let mut pool = LinkPool::new();
        let g = node_pin(&mut pool, 0, 0, PinDir::Output);
        let s = sig_pin(&mut pool, 5, 3);
        pool.connect(g, s);
        assert_eq!(pool.find_ring_signal(g), Some((SignalId::from_raw(5), 3)));
        let lone = node_pin(&mut pool, 1, 0, PinDir::Input);
        assert_eq!(pool.find_ring_signal(lone), None);
    }

    #[test]
    fn every_pin_in_exactly_one_ring() {
        // Build a web and check each pin appears exactly once among all
        // distinct rings.
        let mut pool = LinkPool::new();
        let pins: Vec<PinId> = (0..6).map(|i| sig_pin(&mut pool, i, 0)).collect();
        pool.connect(pins[0], pins[1]);
        pool.connect(pins[1], pins[2]);
        pool.connect(pins[3], pins[4]);

        let mut seen = std::collections::HashSet::new();
        for &p in &pins {
            if seen.contains(&p) {
                continue;
            }
            for q in pool.ring(p).collect::<Vec<_>>() {
                assert!(seen.insert(q), "pin in two rings");
            }
        }
        assert_eq!(seen.len(), pins.len());
    }

    #[test]
    fn pin_naming() {
        let mut pool = LinkPool::new();
        let p = node_pin(&mut pool, 0, 4, PinDir::Input);
        pool.set_name(p, "DataA", 2);
        assert_eq!(pool.pin(p).name.as_deref(), Some("DataA"));
        assert_eq!(pool.pin(p).inst, 2);
    }

    #[test]
    fn free_removes_pin() {
        let mut pool = LinkPool::new();
        let a = sig_pin(&mut pool, 0, 0);
        let b = sig_pin(&mut pool, 1, 0);
        pool.connect(a, b);
        pool.free(a);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.ring(b).count(), 1);
    }
}
