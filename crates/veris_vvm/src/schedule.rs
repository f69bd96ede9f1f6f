//! The discrete-event scheduler and instruction execution engine.
//!
//! A [`Runtime`] owns the functor pool, the code space, the VPI
//! registry, the host task registry, and every simulation thread.
//! Execution is single-threaded cooperative: within one time step the
//! scheduler (1) runs every ready thread until it suspends or ends,
//! (2) propagates functor updates to a fixed point as they happen,
//! waking threads through events, (3) applies non-blocking `%assign`
//! write-backs, then (4) advances to the next scheduled tick.
//!
//! Activation order within a step is deterministic from the order of
//! [`Runtime::schedule_vthread`] calls.

use crate::codes::{CodePtr, CodeSpace, Opcode};
use crate::error::VvmError;
use crate::functor::{FunctorMode, FunctorPool, Ipoint};
use crate::vpi::{TaskAction, TaskContext, VpiObject, VpiRef, VpiRegistry};
use crate::vthread::{ThreadId, ThreadState, VThread, FLAG_EQ, FLAG_EQX, FLAG_LT};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use veris_common::Logic;

/// What a scheduled event does when its time comes.
#[derive(Clone, PartialEq, Eq, Debug)]
enum SchedKind {
    /// Activate a thread.
    RunThread(ThreadId),
    /// Apply a non-blocking write-back to a functor port.
    NbAssign {
        thread: ThreadId,
        ptr: Ipoint,
        val: u8,
    },
}

/// An entry in the time wheel, ordered by time then schedule order.
#[derive(PartialEq, Eq, Debug)]
struct SchedEntry {
    time: u64,
    seq: u64,
    kind: SchedKind,
}

impl Ord for SchedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time.cmp(&other.time).then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for SchedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Default bound on functor propagation iterations within a time step.
const DEFAULT_ITERATION_LIMIT: u32 = 100_000;

/// The owning value for a whole simulation.
pub struct Runtime {
    /// The functor graph.
    pub functors: FunctorPool,
    /// The instruction tape.
    pub code: CodeSpace,
    /// The VPI object registry.
    pub vpi: VpiRegistry,
    /// Host system tasks.
    pub tasks: crate::vpi::TaskRegistry,
    /// Output lines collected from host tasks.
    pub output: Vec<String>,
    threads: Vec<VThread>,
    heap: BinaryHeap<Reverse<SchedEntry>>,
    ready: VecDeque<ThreadId>,
    prop_queue: VecDeque<(Ipoint, u8)>,
    seq: u64,
    now: u64,
    iteration_limit: u32,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Creates an empty runtime.
    pub fn new() -> Self {
        Self {
            functors: FunctorPool::new(),
            code: CodeSpace::new(),
            vpi: VpiRegistry::new(),
            tasks: crate::vpi::TaskRegistry::new(),
            output: Vec::new(),
            threads: Vec::new(),
            heap: BinaryHeap::new(),
            ready: VecDeque::new(),
            prop_queue: VecDeque::new(),
            seq: 0,
            now: 0,
            iteration_limit: DEFAULT_ITERATION_LIMIT,
        }
    }

    /// The current simulation time.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Sets the propagation iteration bound for one time step.
    pub fn set_iteration_limit(&mut self, limit: u32) {
        self.iteration_limit = limit;
    }

    /// Creates a thread without scheduling it.
    pub fn new_thread(&mut self, pc: CodePtr, scope: VpiRef) -> ThreadId {
        let id = ThreadId::from_raw(self.threads.len() as u32);
        self.threads.push(VThread::new(pc, scope));
        id
    }

    /// The thread record.
    pub fn thread(&self, id: ThreadId) -> &VThread {
        &self.threads[id.as_raw() as usize]
    }

    /// The thread record, mutable.
    pub fn thread_mut(&mut self, id: ThreadId) -> &mut VThread {
        &mut self.threads[id.as_raw() as usize]
    }

    /// The number of threads ever created.
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Schedules a thread activation `delay` ticks from now.
    pub fn schedule_vthread(&mut self, id: ThreadId, delay: u64) {
        let entry = SchedEntry {
            time: self.now + delay,
            seq: self.next_seq(),
            kind: SchedKind::RunThread(id),
        };
        self.heap.push(Reverse(entry));
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Writes a value into a functor input port and propagates the
    /// consequences to a fixed point.
    pub fn functor_set(&mut self, ip: Ipoint, val: u8) -> Result<(), VvmError> {
        self.prop_queue.push_back((ip, val));
        self.propagate()
    }

    /// Drains the propagation queue, honoring the iteration bound.
    fn propagate(&mut self) -> Result<(), VvmError> {
        let mut iterations: u32 = 0;
        while let Some((ip, val)) = self.prop_queue.pop_front() {
            iterations += 1;
            if iterations > self.iteration_limit {
                self.prop_queue.clear();
                return Err(VvmError::IterationLimit {
                    time: self.now,
                    limit: self.iteration_limit,
                });
            }
            let idx = ip.index();
            if !self.functors.contains(idx) {
                return Err(VvmError::InvalidFunctor(ip.as_raw()));
            }

            enum Outcome {
                Quiet,
                Drive(u8),
                Wake(Vec<ThreadId>, u8),
            }
            let outcome = {
                let f = self.functors.get_mut(idx);
                let old = f.set_port_value(ip.port(), val);
                match &mut f.mode {
                    FunctorMode::Table(table) => {
                        let new_oval = table.eval(f.ival);
                        if new_oval != f.oval {
                            f.oval = new_oval;
                            Outcome::Drive(new_oval)
                        } else {
                            Outcome::Quiet
                        }
                    }
                    FunctorMode::EdgeEvent { table, threads } => {
                        if table.matches(old, val) {
                            f.oval = val;
                            Outcome::Wake(std::mem::take(threads), val)
                        } else {
                            Outcome::Quiet
                        }
                    }
                    FunctorMode::NamedEvent { threads } => {
                        f.oval = val;
                        Outcome::Wake(std::mem::take(threads), val)
                    }
                }
            };

            match outcome {
                Outcome::Quiet => {}
                Outcome::Drive(new_oval) => {
                    let dests: Vec<Ipoint> = self.functors.out_chain(idx).collect();
                    for dest in dests {
                        self.prop_queue.push_back((dest, new_oval));
                    }
                }
                Outcome::Wake(woken, val) => {
                    for t in woken {
                        self.wake(t);
                    }
                    // Named-event collectors chain off this functor.
                    let dests: Vec<Ipoint> = self.functors.out_chain(idx).collect();
                    for dest in dests {
                        self.prop_queue.push_back((dest, val));
                    }
                }
            }
        }
        Ok(())
    }

    /// Resumes a thread a host task suspended from `%vpi_call`.
    pub fn resume_thread(&mut self, id: ThreadId) {
        self.wake(id);
    }

    fn wake(&mut self, id: ThreadId) {
        let t = &mut self.threads[id.as_raw() as usize];
        if matches!(
            t.state,
            ThreadState::Waiting | ThreadState::InTask | ThreadState::Joining
        ) {
            t.state = ThreadState::Ready;
            self.ready.push_back(id);
        }
    }

    /// Runs the simulation until the event queue drains.
    pub fn run(&mut self) -> Result<(), VvmError> {
        while !self.heap.is_empty() || !self.ready.is_empty() {
            if self.ready.is_empty() {
                self.now = self.heap.peek().unwrap().0.time;
            }

            // Pull every event due at the current time.
            let mut nb_writes = Vec::new();
            while let Some(Reverse(entry)) = self.heap.peek() {
                if entry.time > self.now {
                    break;
                }
                let Reverse(entry) = self.heap.pop().unwrap();
                match entry.kind {
                    SchedKind::RunThread(id) => {
                        if self.threads[id.as_raw() as usize].state != ThreadState::Dead {
                            self.ready.push_back(id);
                        }
                    }
                    SchedKind::NbAssign { thread, ptr, val } => {
                        nb_writes.push((thread, ptr, val));
                    }
                }
            }

            // Phase 1: run every ready thread until it suspends or ends.
            // Propagation happens inline and may push more ready work.
            while let Some(id) = self.ready.pop_front() {
                self.exec_thread(id)?;
            }

            // Phase 3: apply non-blocking write-backs. Writes scheduled
            // by threads that were disabled in the meantime are dropped.
            for (thread, ptr, val) in nb_writes {
                if self.threads[thread.as_raw() as usize].disabled {
                    continue;
                }
                self.functor_set(ptr, val)?;
            }
        }
        Ok(())
    }

    /// Ends a thread, notifying a joining parent.
    fn retire(&mut self, id: ThreadId) {
        let parent = {
            let t = &mut self.threads[id.as_raw() as usize];
            if t.state == ThreadState::Dead {
                return;
            }
            t.state = ThreadState::Dead;
            t.parent
        };
        if let Some(p) = parent {
            let pt = &mut self.threads[p.as_raw() as usize];
            pt.nchildren = pt.nchildren.saturating_sub(1);
            if pt.state == ThreadState::Joining && pt.nchildren == 0 {
                pt.state = ThreadState::Ready;
                self.ready.push_back(p);
            }
        }
    }

    /// Runs one thread until it suspends or ends.
    fn exec_thread(&mut self, id: ThreadId) -> Result<(), VvmError> {
        loop {
            let (pc, disabled, dead) = {
                let t = &self.threads[id.as_raw() as usize];
                (t.pc, t.disabled, t.state == ThreadState::Dead)
            };
            if dead {
                return Ok(());
            }
            if disabled {
                self.retire(id);
                return Ok(());
            }
            if pc.as_raw() as usize >= self.code.len() {
                self.retire(id);
                return Ok(());
            }

            let inst = self.code.get(pc).clone();
            self.threads[id.as_raw() as usize].pc = pc.next();

            match inst.opcode {
                Opcode::Noop => {}

                Opcode::Mov => {
                    let t = &mut self.threads[id.as_raw() as usize];
                    let vals = t.get_vec(inst.bit_idx2, inst.number as u32);
                    t.set_vec(inst.bit_idx1, &vals);
                }

                Opcode::Inv => {
                    let t = &mut self.threads[id.as_raw() as usize];
                    let n = inst.bit_idx2;
                    for i in 0..n {
                        let v = Logic::from_u2(t.get_bit(inst.bit_idx1 + i));
                        t.set_bit(inst.bit_idx1 + i, (!v).as_u2());
                    }
                }

                Opcode::And | Opcode::Or | Opcode::Xor | Opcode::Xnor => {
                    let t = &mut self.threads[id.as_raw() as usize];
                    let n = inst.number as u32;
                    let src = t.get_vec(inst.bit_idx2, n);
                    for i in 0..n {
                        let a = Logic::from_u2(t.get_bit(inst.bit_idx1 + i));
                        let b = Logic::from_u2(src[i as usize]);
                        let r = match inst.opcode {
                            Opcode::And => a & b,
                            Opcode::Or => a | b,
                            Opcode::Xor => a ^ b,
                            Opcode::Xnor => !(a ^ b),
                            _ => unreachable!(),
                        };
                        t.set_bit(inst.bit_idx1 + i, r.as_u2());
                    }
                }

                Opcode::NorR => {
                    let t = &mut self.threads[id.as_raw() as usize];
                    let src = t.get_vec(inst.bit_idx2, inst.number as u32);
                    let folded = src
                        .iter()
                        .fold(Logic::Zero, |acc, &v| acc | Logic::from_u2(v));
                    t.set_bit(inst.bit_idx1, (!folded).as_u2());
                }

                Opcode::Add => {
                    let t = &mut self.threads[id.as_raw() as usize];
                    let n = inst.number as u32;
                    let a = t.get_vec(inst.bit_idx1, n);
                    let b = t.get_vec(inst.bit_idx2, n);
                    if a.iter().chain(b.iter()).any(|&v| v > 1) {
                        for i in 0..n {
                            t.set_bit(inst.bit_idx1 + i, Logic::X.as_u2());
                        }
                    } else {
                        let mut carry = 0u8;
                        for i in 0..n {
                            let sum = a[i as usize] + b[i as usize] + carry;
                            t.set_bit(inst.bit_idx1 + i, sum & 1);
                            carry = sum >> 1;
                        }
                    }
                }

                Opcode::CmpU | Opcode::CmpS => {
                    let t = &mut self.threads[id.as_raw() as usize];
                    let n = inst.number as u32;
                    let a = t.get_vec(inst.bit_idx1, n);
                    let b = t.get_vec(inst.bit_idx2, n);
                    if a.iter().chain(b.iter()).any(|&v| v > 1) {
                        t.set_bit(FLAG_EQ, Logic::X.as_u2());
                        t.set_bit(FLAG_LT, Logic::X.as_u2());
                    } else {
                        let eq = a == b;
                        let lt = if inst.opcode == Opcode::CmpS && n > 0 {
                            let sa = a[(n - 1) as usize];
                            let sb = b[(n - 1) as usize];
                            if sa != sb {
                                sa == 1
                            } else {
                                unsigned_lt(&a, &b)
                            }
                        } else {
                            unsigned_lt(&a, &b)
                        };
                        t.set_bit(FLAG_EQ, eq as u8);
                        t.set_bit(FLAG_LT, lt as u8);
                    }
                }

                Opcode::CmpX | Opcode::CmpZ => {
                    let t = &mut self.threads[id.as_raw() as usize];
                    let n = inst.number as u32;
                    let a = t.get_vec(inst.bit_idx1, n);
                    let b = t.get_vec(inst.bit_idx2, n);
                    let z = Logic::Z.as_u2();
                    let eq = (0..n as usize).all(|i| {
                        let dont_care = if inst.opcode == Opcode::CmpX {
                            a[i] > 1 || b[i] > 1
                        } else {
                            a[i] == z || b[i] == z
                        };
                        dont_care || a[i] == b[i]
                    });
                    t.set_bit(FLAG_EQX, eq as u8);
                }

                Opcode::Jmp => {
                    self.threads[id.as_raw() as usize].pc = inst.cptr;
                }

                Opcode::Jmp0 | Opcode::Jmp1 | Opcode::Jmp0xz => {
                    let bit = self.threads[id.as_raw() as usize].get_bit(inst.bit_idx1);
                    let taken = match inst.opcode {
                        Opcode::Jmp0 => bit == 0,
                        Opcode::Jmp1 => bit == 1,
                        Opcode::Jmp0xz => bit != 1,
                        _ => unreachable!(),
                    };
                    if taken {
                        self.threads[id.as_raw() as usize].pc = inst.cptr;
                    }
                }

                Opcode::Delay => {
                    self.threads[id.as_raw() as usize].state = ThreadState::Delayed;
                    self.schedule_vthread(id, inst.number);
                    return Ok(());
                }

                Opcode::Wait => {
                    let fidx = inst.iptr.index();
                    if !self.functors.contains(fidx) {
                        return Err(VvmError::InvalidFunctor(inst.iptr.as_raw()));
                    }
                    match &mut self.functors.get_mut(fidx).mode {
                        FunctorMode::EdgeEvent { threads, .. }
                        | FunctorMode::NamedEvent { threads } => {
                            threads.push(id);
                        }
                        FunctorMode::Table(_) => {
                            return Err(VvmError::InvalidFunctor(inst.iptr.as_raw()));
                        }
                    }
                    self.threads[id.as_raw() as usize].state = ThreadState::Waiting;
                    return Ok(());
                }

                Opcode::Set => {
                    let val = self.threads[id.as_raw() as usize].get_bit(inst.bit_idx1);
                    self.functor_set(inst.iptr, val)?;
                }

                Opcode::Load => {
                    let fidx = inst.iptr.index();
                    if !self.functors.contains(fidx) {
                        return Err(VvmError::InvalidFunctor(inst.iptr.as_raw()));
                    }
                    let oval = self.functors.get(fidx).oval;
                    self.threads[id.as_raw() as usize].set_bit(inst.bit_idx1, oval);
                }

                Opcode::Assign => {
                    let val = self.threads[id.as_raw() as usize].get_bit(inst.bit_idx2);
                    let entry = SchedEntry {
                        time: self.now + u64::from(inst.bit_idx1),
                        seq: self.next_seq(),
                        kind: SchedKind::NbAssign {
                            thread: id,
                            ptr: inst.iptr,
                            val,
                        },
                    };
                    self.heap.push(Reverse(entry));
                }

                Opcode::Fork => {
                    let ext = inst.fork.as_ref().expect("fork without extension");
                    let child = self.new_thread(ext.cptr, ext.scope);
                    self.threads[child.as_raw() as usize].parent = Some(id);
                    self.threads[id.as_raw() as usize].nchildren += 1;
                    self.ready.push_back(child);
                }

                Opcode::Join => {
                    if self.threads[id.as_raw() as usize].nchildren > 0 {
                        self.threads[id.as_raw() as usize].state = ThreadState::Joining;
                        return Ok(());
                    }
                }

                Opcode::End => {
                    self.retire(id);
                    return Ok(());
                }

                Opcode::VpiCall => {
                    let handle = inst.handle.expect("%vpi_call without handle");
                    let (name, args) = match self.vpi.get(handle) {
                        VpiObject::SysTaskCall { name, args } => (name.clone(), args.clone()),
                        _ => return Err(VvmError::UnknownScope),
                    };
                    let Some(task) = self.tasks.get_mut(&name) else {
                        return Err(VvmError::UndefinedTask { name });
                    };
                    let mut ctx = TaskContext {
                        registry: &self.vpi,
                        args: &args,
                        time: self.now,
                        output: &mut self.output,
                    };
                    match task.invoke(&mut ctx) {
                        TaskAction::Done => {}
                        TaskAction::Suspend => {
                            self.threads[id.as_raw() as usize].state = ThreadState::InTask;
                            return Ok(());
                        }
                    }
                }

                Opcode::Disable => {
                    let handle = inst.handle.expect("%disable without handle");
                    if !self.vpi.is_scope(handle) {
                        return Err(VvmError::UnknownScope);
                    }
                    self.disable_scope(handle)?;
                }
            }
        }
    }

    /// Marks every thread under `scope` for retirement and pulls the
    /// waiting ones out of their wait sets.
    fn disable_scope(&mut self, scope: VpiRef) -> Result<(), VvmError> {
        let mut victims = Vec::new();
        for (i, t) in self.threads.iter().enumerate() {
            if t.state != ThreadState::Dead && self.vpi.scope_within(t.scope, scope) {
                victims.push(ThreadId::from_raw(i as u32));
            }
        }
        for id in &victims {
            let t = &mut self.threads[id.as_raw() as usize];
            t.disabled = true;
            let was_waiting = t.state == ThreadState::Waiting;
            if matches!(
                t.state,
                ThreadState::Waiting | ThreadState::Joining | ThreadState::InTask
            ) {
                t.state = ThreadState::Ready;
                self.ready.push_back(*id);
            }
            if was_waiting {
                self.remove_from_wait_sets(*id);
            }
        }
        Ok(())
    }

    /// Removes a thread from every functor wait set.
    fn remove_from_wait_sets(&mut self, id: ThreadId) {
        let count = self.functors.len() as u32;
        for idx in 1..count {
            match &mut self.functors.get_mut(idx).mode {
                FunctorMode::EdgeEvent { threads, .. } | FunctorMode::NamedEvent { threads } => {
                    threads.retain(|&t| t != id);
                }
                FunctorMode::Table(_) => {}
            }
        }
    }
}

/// Unsigned comparison of two defined bit slices, MSB last.
fn unsigned_lt(a: &[u8], b: &[u8]) -> bool {
    for i in (0..a.len()).rev() {
        if a[i] != b[i] {
            return a[i] < b[i];
        }
    }
    false
}
