//! Simulation threads.
//!
//! A [`VThread`] is one cooperatively scheduled instruction stream: a
//! program counter, a thread-local four-valued bit file, a scope handle,
//! and the fork/join bookkeeping. Threads only leave the scheduler at
//! suspension points (`%delay`, `%wait`, `%join`, `%vpi_call`).
//!
//! Bit file layout: bits 0..=3 read as the constants 0, 1, x, z and are
//! never written. The comparison instructions leave their flags at fixed
//! indices: [`FLAG_EQ`], [`FLAG_LT`], and [`FLAG_EQX`].

use crate::codes::CodePtr;
use crate::vpi::VpiRef;
use veris_common::Logic;

/// Identifies one thread for the lifetime of a run.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ThreadId(u32);

impl ThreadId {
    /// Creates an ID from a raw index.
    pub fn from_raw(index: u32) -> Self {
        ThreadId(index)
    }

    /// The raw index.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

/// Equality flag bit written by `%cmp/*`.
pub const FLAG_EQ: u32 = 4;
/// Less-than flag bit written by `%cmp/u` and `%cmp/s`.
pub const FLAG_LT: u32 = 5;
/// Don't-care equality flag bit written by `%cmp/x` and `%cmp/z`.
pub const FLAG_EQX: u32 = 6;

/// Where a thread currently stands with the scheduler.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ThreadState {
    /// Runnable: queued for the current step or executing.
    Ready,
    /// Parked on the time wheel by `%delay`.
    Delayed,
    /// Parked in a functor's event wait set by `%wait`.
    Waiting,
    /// Blocked in `%join` until all children end.
    Joining,
    /// Suspended inside a host system task.
    InTask,
    /// Terminated.
    Dead,
}

/// One simulation thread.
#[derive(Debug)]
pub struct VThread {
    /// The program counter.
    pub pc: CodePtr,
    /// The scope this thread runs in.
    pub scope: VpiRef,
    /// The forking parent, if any.
    pub parent: Option<ThreadId>,
    /// Live direct children.
    pub nchildren: u32,
    /// Scheduler state.
    pub state: ThreadState,
    /// Set by `%disable`; the thread is retired at its next scheduling
    /// point instead of executing.
    pub disabled: bool,
    /// The writable bit file, starting at index 4.
    bits: Vec<u8>,
}

impl VThread {
    /// Creates a thread starting at `pc` in `scope`.
    pub fn new(pc: CodePtr, scope: VpiRef) -> Self {
        Self {
            pc,
            scope,
            parent: None,
            nchildren: 0,
            state: ThreadState::Ready,
            disabled: false,
            bits: Vec::new(),
        }
    }

    /// Reads a bit. Indices 0..=3 are the constants 0, 1, x, z;
    /// uninitialized bits read as x.
    pub fn get_bit(&self, idx: u32) -> u8 {
        match idx {
            0..=3 => idx as u8,
            _ => self
                .bits
                .get((idx - 4) as usize)
                .copied()
                .unwrap_or(Logic::X.as_u2()),
        }
    }

    /// Writes a bit. Writes to the constant bits 0..=3 are ignored.
    pub fn set_bit(&mut self, idx: u32, val: u8) {
        if idx < 4 {
            return;
        }
        let slot = (idx - 4) as usize;
        if slot >= self.bits.len() {
            self.bits.resize(slot + 1, Logic::X.as_u2());
        }
        self.bits[slot] = val & 0b11;
    }

    /// Reads `count` bits starting at `base`.
    ///
    /// A `base` below 4 replicates the addressed constant, which is how
    /// immediate 0/1/x/z vectors are written in the assembly source.
    pub fn get_vec(&self, base: u32, count: u32) -> Vec<u8> {
        if base < 4 {
            return vec![base as u8; count as usize];
        }
        (0..count).map(|i| self.get_bit(base + i)).collect()
    }

    /// Writes a bit slice starting at `base`.
    pub fn set_vec(&mut self, base: u32, vals: &[u8]) {
        for (i, &v) in vals.iter().enumerate() {
            self.set_bit(base + i as u32, v);
        }
    }
}
