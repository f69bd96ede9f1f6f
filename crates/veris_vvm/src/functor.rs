//! The VM functor graph.
//!
//! A functor is a fixed 4-input, 1-output evaluator. Its packed `ival`
//! byte holds the four 2-bit input values; `oval` is the current 2-bit
//! output. Fan-out is an intrusive chain of [`Ipoint`]s: a driver's
//! `out` heads the chain, and each destination's `port[p]` slot stores
//! the next chain entry, so a single word per port encodes both the
//! connection and the list threading.
//!
//! Vectors of functors are allocated contiguously so a base index plus a
//! bit offset addresses any bit.

use crate::vthread::ThreadId;
use veris_common::Logic;

/// A packed pointer to one input port of one functor.
///
/// The high bits are the functor index; the low 2 bits select the port.
/// Index 0 of the pool is reserved, so the all-zero ipoint is the null
/// chain terminator.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Ipoint(u32);

impl Ipoint {
    /// The null ipoint, terminating every fan-out chain.
    pub const NULL: Ipoint = Ipoint(0);

    /// Packs a functor index and port number.
    pub fn make(index: u32, port: u32) -> Self {
        debug_assert!(port < 4, "functor port out of range");
        Ipoint((index << 2) | port)
    }

    /// The functor index.
    pub fn index(self) -> u32 {
        self.0 >> 2
    }

    /// The port number, 0..4.
    pub fn port(self) -> u32 {
        self.0 & 0b11
    }

    /// Returns an ipoint `offset` functors further into a vector.
    pub fn offset(self, offset: u32) -> Self {
        Ipoint::make(self.index() + offset, self.port())
    }

    /// True for the null chain terminator.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// The raw packed word.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

/// The truth table of a combinational functor.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[allow(missing_docs)]
pub enum FunctorTable {
    And,
    Or,
    Nand,
    Nor,
    Not,
    Buf,
    Xor,
    Xnor,
    /// Pass port 0 through; used for variable and net bits.
    Var,
}

impl FunctorTable {
    /// Resolves an assembly type name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "AND" => Some(FunctorTable::And),
            "OR" => Some(FunctorTable::Or),
            "NAND" => Some(FunctorTable::Nand),
            "NOR" => Some(FunctorTable::Nor),
            "NOT" => Some(FunctorTable::Not),
            "BUF" => Some(FunctorTable::Buf),
            "XOR" => Some(FunctorTable::Xor),
            "XNOR" => Some(FunctorTable::Xnor),
            _ => None,
        }
    }

    /// The assembly type name.
    pub fn name(self) -> &'static str {
        match self {
            FunctorTable::And => "AND",
            FunctorTable::Or => "OR",
            FunctorTable::Nand => "NAND",
            FunctorTable::Nor => "NOR",
            FunctorTable::Not => "NOT",
            FunctorTable::Buf => "BUF",
            FunctorTable::Xor => "XOR",
            FunctorTable::Xnor => "XNOR",
            FunctorTable::Var => "VAR",
        }
    }

    /// Evaluates the packed input byte to a 2-bit output value.
    ///
    /// The 4-port tables fold all four inputs, so the declared `init`
    /// byte must park unused ports at the operation's identity value.
    pub fn eval(self, ival: u8) -> u8 {
        let p = |i: u8| Logic::from_u2((ival >> (2 * i)) & 0b11);
        let fold_and = p(0) & p(1) & p(2) & p(3);
        let fold_or = p(0) | p(1) | p(2) | p(3);
        let fold_xor = p(0) ^ p(1) ^ p(2) ^ p(3);
        let buf = |l: Logic| match l {
            Logic::Zero => Logic::Zero,
            Logic::One => Logic::One,
            Logic::X | Logic::Z => Logic::X,
        };
        let out = match self {
            FunctorTable::And => fold_and,
            FunctorTable::Or => fold_or,
            FunctorTable::Nand => !fold_and,
            FunctorTable::Nor => !fold_or,
            FunctorTable::Xor => fold_xor,
            FunctorTable::Xnor => !fold_xor,
            FunctorTable::Not => !p(0),
            FunctorTable::Buf => buf(p(0)),
            FunctorTable::Var => return p(0).as_u2(),
        };
        out.as_u2()
    }
}

/// The edge table of an event functor.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum EdgeTable {
    /// A rising edge: into 1 or out of 0.
    Posedge,
    /// A falling edge: into 0 or out of 1.
    Negedge,
    /// Any value change.
    AnyEdge,
}

impl EdgeTable {
    /// Resolves an assembly edge name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "posedge" => Some(EdgeTable::Posedge),
            "negedge" => Some(EdgeTable::Negedge),
            "edge" => Some(EdgeTable::AnyEdge),
            _ => None,
        }
    }

    /// The assembly edge name.
    pub fn name(self) -> &'static str {
        match self {
            EdgeTable::Posedge => "posedge",
            EdgeTable::Negedge => "negedge",
            EdgeTable::AnyEdge => "edge",
        }
    }

    /// Tests a transition between 2-bit values against this table.
    pub fn matches(self, old: u8, new: u8) -> bool {
        if old == new {
            return false;
        }
        let zero = Logic::Zero.as_u2();
        let one = Logic::One.as_u2();
        match self {
            EdgeTable::Posedge => old == zero || new == one,
            EdgeTable::Negedge => old == one || new == zero,
            EdgeTable::AnyEdge => true,
        }
    }
}

/// The evaluation mode of a functor.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum FunctorMode {
    /// Combinational: output follows the truth table of the inputs.
    Table(FunctorTable),
    /// Edge event: input changes matching the edge table wake the
    /// threads parked in the wait set.
    EdgeEvent {
        /// Which transitions fire the event.
        table: EdgeTable,
        /// Threads waiting on this event.
        threads: Vec<ThreadId>,
    },
    /// Named event: fired only by an explicit `%set` to this functor.
    NamedEvent {
        /// Threads waiting on this event.
        threads: Vec<ThreadId>,
    },
}

/// One functor in the pool.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Functor {
    /// Packed 2-bit-per-port input values.
    pub ival: u8,
    /// Current 2-bit output value.
    pub oval: u8,
    /// The `init` byte as declared, kept for serialization.
    pub init: u8,
    /// Head of the fan-out chain of destinations this functor drives.
    pub out: Ipoint,
    /// Per input port: the next entry of the *driver's* fan-out chain.
    pub port: [Ipoint; 4],
    /// The evaluation mode.
    pub mode: FunctorMode,
}

impl Functor {
    fn new(mode: FunctorMode) -> Self {
        Self {
            ival: 0,
            oval: Logic::X.as_u2(),
            init: 0,
            out: Ipoint::NULL,
            port: [Ipoint::NULL; 4],
            mode,
        }
    }

    /// The 2-bit value currently on the given port.
    pub fn port_value(&self, port: u32) -> u8 {
        (self.ival >> (2 * port)) & 0b11
    }

    /// Stores a 2-bit value into the given port, returning the old one.
    pub fn set_port_value(&mut self, port: u32, val: u8) -> u8 {
        let old = self.port_value(port);
        let shift = 2 * port;
        self.ival = (self.ival & !(0b11 << shift)) | ((val & 0b11) << shift);
        old
    }
}

/// The contiguous pool of all functors in a simulation.
///
/// Index 0 is reserved so that label lookups and chain pointers can use
/// zero as their null sentinel.
#[derive(Debug, Default)]
pub struct FunctorPool {
    funcs: Vec<Functor>,
}

impl FunctorPool {
    /// Creates a pool with the reserved null slot.
    pub fn new() -> Self {
        Self {
            funcs: vec![Functor::new(FunctorMode::Table(FunctorTable::Var))],
        }
    }

    /// Allocates `count` contiguous functors, returning the base index.
    pub fn allocate(&mut self, count: u32, mode: FunctorMode) -> u32 {
        let base = self.funcs.len() as u32;
        for _ in 0..count {
            self.funcs.push(Functor::new(mode.clone()));
        }
        base
    }

    /// The number of functors, including the reserved slot.
    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    /// True when only the reserved slot exists.
    pub fn is_empty(&self) -> bool {
        self.funcs.len() <= 1
    }

    /// True if `index` addresses a real functor.
    pub fn contains(&self, index: u32) -> bool {
        index != 0 && (index as usize) < self.funcs.len()
    }

    /// Returns the functor at `index`.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of range.
    pub fn get(&self, index: u32) -> &Functor {
        &self.funcs[index as usize]
    }

    /// Returns the functor at `index` mutably.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of range.
    pub fn get_mut(&mut self, index: u32) -> &mut Functor {
        &mut self.funcs[index as usize]
    }

    /// Links `dest` into the fan-out chain of the functor at
    /// `src_index`.
    ///
    /// The destination port slot inherits the old chain head, so one
    /// source can drive any number of inputs, including several ports of
    /// the same functor.
    pub fn add_dest(&mut self, src_index: u32, dest: Ipoint) {
        let chain = self.funcs[src_index as usize].out;
        let d = &mut self.funcs[dest.index() as usize];
        d.port[dest.port() as usize] = chain;
        self.funcs[src_index as usize].out = dest;
    }

    /// Iterates the fan-out chain of the functor at `src_index`.
    pub fn out_chain(&self, src_index: u32) -> OutChain<'_> {
        OutChain {
            pool: self,
            cur: self.funcs[src_index as usize].out,
        }
    }

    /// Iterates over all functors with their indices, skipping the
    /// reserved slot.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Functor)> {
        self.funcs
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, f)| (i as u32, f))
    }
}

/// Iterator over a fan-out chain.
pub struct OutChain<'a> {
    pool: &'a FunctorPool,
    cur: Ipoint,
}

impl Iterator for OutChain<'_> {
    type Item = Ipoint;

    fn next(&mut self) -> Option<Ipoint> {
        if self.cur.is_null() {
            return None;
        }
        let here = self.cur;
        self.cur = self.pool.funcs[here.index() as usize].port[here.port() as usize];
        Some(here)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipoint_packing() {
        let ip = Ipoint::make(10, 3);
        assert_eq!(ip.index(), 10);
        assert_eq!(ip.port(), 3);
        assert!(!ip.is_null());
        assert!(Ipoint::NULL.is_null());
        assert_eq!(ip.offset(2).index(), 12);
        assert_eq!(ip.offset(2).port(), 3);
    }

    #[test]
    fn and_table_eval() {
        // Ports: 1,1,1,1 -> 1
        let all_one = 0b01_01_01_01;
        assert_eq!(FunctorTable::And.eval(all_one), Logic::One.as_u2());
        // Any zero dominates.
        let with_zero = 0b01_01_00_01;
        assert_eq!(FunctorTable::And.eval(with_zero), Logic::Zero.as_u2());
        // X with no zero is X.
        let with_x = 0b01_10_01_01;
        assert_eq!(FunctorTable::And.eval(with_x), Logic::X.as_u2());
    }

    #[test]
    fn or_nor_tables() {
        let all_zero = 0b00_00_00_00;
        assert_eq!(FunctorTable::Or.eval(all_zero), Logic::Zero.as_u2());
        assert_eq!(FunctorTable::Nor.eval(all_zero), Logic::One.as_u2());
        let with_one = 0b00_00_01_00;
        assert_eq!(FunctorTable::Or.eval(with_one), Logic::One.as_u2());
        assert_eq!(FunctorTable::Nor.eval(with_one), Logic::Zero.as_u2());
    }

    #[test]
    fn xor_parity() {
        let two_ones = 0b00_00_01_01;
        assert_eq!(FunctorTable::Xor.eval(two_ones), Logic::Zero.as_u2());
        let one_one = 0b00_00_00_01;
        assert_eq!(FunctorTable::Xor.eval(one_one), Logic::One.as_u2());
        assert_eq!(FunctorTable::Xnor.eval(one_one), Logic::Zero.as_u2());
    }

    #[test]
    fn unary_tables_use_port_zero() {
        let ival = 0b00_00_00_01; // port0 = 1, others 0
        assert_eq!(FunctorTable::Not.eval(ival), Logic::Zero.as_u2());
        assert_eq!(FunctorTable::Buf.eval(ival), Logic::One.as_u2());
        assert_eq!(FunctorTable::Var.eval(ival), Logic::One.as_u2());
        let z0 = Logic::Z.as_u2(); // port0 = z
        assert_eq!(FunctorTable::Buf.eval(z0), Logic::X.as_u2());
        assert_eq!(FunctorTable::Var.eval(z0), Logic::Z.as_u2());
    }

    #[test]
    fn table_names_roundtrip() {
        for t in [
            FunctorTable::And,
            FunctorTable::Or,
            FunctorTable::Nand,
            FunctorTable::Nor,
            FunctorTable::Not,
            FunctorTable::Buf,
            FunctorTable::Xor,
            FunctorTable::Xnor,
        ] {
            assert_eq!(FunctorTable::from_name(t.name()), Some(t));
        }
        assert_eq!(FunctorTable::from_name("MAJ"), None);
    }

    #[test]
    fn edge_tables() {
        let (z0, o1, x, z) = (0u8, 1u8, 2u8, 3u8);
        assert!(EdgeTable::Posedge.matches(z0, o1));
        assert!(EdgeTable::Posedge.matches(z0, x));
        assert!(EdgeTable::Posedge.matches(x, o1));
        assert!(!EdgeTable::Posedge.matches(o1, x));
        assert!(!EdgeTable::Posedge.matches(o1, o1));
        assert!(EdgeTable::Negedge.matches(o1, z0));
        assert!(EdgeTable::Negedge.matches(o1, z));
        assert!(EdgeTable::Negedge.matches(x, z0));
        assert!(!EdgeTable::Negedge.matches(z0, x));
        assert!(EdgeTable::AnyEdge.matches(x, z));
        assert!(!EdgeTable::AnyEdge.matches(x, x));
    }

    #[test]
    fn port_value_packing() {
        let mut f = Functor::new(FunctorMode::Table(FunctorTable::And));
        assert_eq!(f.set_port_value(2, 3), 0);
        assert_eq!(f.port_value(2), 3);
        assert_eq!(f.port_value(1), 0);
        assert_eq!(f.set_port_value(2, 1), 3);
        assert_eq!(f.ival, 0b00_01_00_00);
    }

    #[test]
    fn pool_reserves_null_slot() {
        let mut pool = FunctorPool::new();
        assert!(pool.is_empty());
        let base = pool.allocate(1, FunctorMode::Table(FunctorTable::Or));
        assert_eq!(base, 1);
        assert!(pool.contains(base));
        assert!(!pool.contains(0));
    }

    #[test]
    fn vector_allocation_contiguous() {
        let mut pool = FunctorPool::new();
        let base = pool.allocate(8, FunctorMode::Table(FunctorTable::Var));
        let later = pool.allocate(1, FunctorMode::Table(FunctorTable::Var));
        assert_eq!(later, base + 8);
    }

    #[test]
    fn out_chain_threading() {
        // One source driving two ports of the same destination: the
        // chain must visit the destination twice.
        let mut pool = FunctorPool::new();
        let src = pool.allocate(1, FunctorMode::Table(FunctorTable::Var));
        let dst = pool.allocate(1, FunctorMode::Table(FunctorTable::And));
        pool.add_dest(src, Ipoint::make(dst, 0));
        pool.add_dest(src, Ipoint::make(dst, 1));
        let chain: Vec<Ipoint> = pool.out_chain(src).collect();
        assert_eq!(chain.len(), 2);
        assert!(chain.contains(&Ipoint::make(dst, 0)));
        assert!(chain.contains(&Ipoint::make(dst, 1)));
        // The destination port slots thread the chain: the head is the
        // last-linked port, whose slot points at the first-linked one.
        assert_eq!(pool.get(src).out, Ipoint::make(dst, 1));
        assert_eq!(pool.get(dst).port[1], Ipoint::make(dst, 0));
        assert_eq!(pool.get(dst).port[0], Ipoint::NULL);
    }

    #[test]
    fn out_chain_multiple_destinations() {
        let mut pool = FunctorPool::new();
        let src = pool.allocate(1, FunctorMode::Table(FunctorTable::Var));
        let a = pool.allocate(1, FunctorMode::Table(FunctorTable::Buf));
        let b = pool.allocate(1, FunctorMode::Table(FunctorTable::Not));
        pool.add_dest(src, Ipoint::make(a, 0));
        pool.add_dest(src, Ipoint::make(b, 0));
        let chain: Vec<u32> = pool.out_chain(src).map(|ip| ip.index()).collect();
        assert_eq!(chain.len(), 2);
        assert!(chain.contains(&a));
        assert!(chain.contains(&b));
    }
}
