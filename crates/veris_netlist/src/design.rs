//! The top-level design container.
//!
//! A [`Design`] owns everything elaboration produced: the link pool, the
//! signal/node/scope/memory registries, the behavioral processes, and
//! the maps populated by the driver. The `errors` counter is incremented
//! by elaboration when a problem is detected; a design with errors is
//! never emitted.

use crate::arena::Arena;
use crate::expr::Expr;
use crate::ids::{MemoryId, NodeId, PinId, ScopeId, SignalId};
use crate::link::{LinkPool, PinOwner};
use crate::memory::Memory;
use crate::node::{Node, NodeKind};
use crate::process::{FuncDef, ProcTop, TaskDef};
use crate::scope::{Scope, ScopeKind};
use crate::signal::{Signal, SignalKind};
use crate::target::Target;
use std::collections::HashMap;
use std::fmt::Write as _;
use veris_common::{Ident, Interner};

/// Errors from the guarded emit pass.
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    /// The design carries elaboration errors and must not be emitted.
    #[error("refusing to emit design with {count} elaboration errors")]
    HasErrors {
        /// The design error count.
        count: u32,
    },
    /// The target reported a failure for a process.
    #[error("target failed emitting a {kind} process")]
    Target {
        /// The kind of process that failed.
        kind: &'static str,
    },
}

/// A graph-rewriting pass over the design.
///
/// [`Design::functor`] visits every signal and node exactly once, letting
/// the pass rewrite the graph in place (including deleting the visited
/// object or adding new ones; additions are not re-visited).
pub trait NetFunctor {
    /// Called for every signal.
    fn signal(&mut self, _design: &mut Design, _id: SignalId) {}

    /// Called for every node.
    fn node(&mut self, _design: &mut Design, _id: NodeId) {}
}

/// A complete elaborated design.
pub struct Design {
    interner: Interner,
    /// The pin/nexus graph.
    pub links: LinkPool,
    signals: Arena<SignalId, Signal>,
    nodes: Arena<NodeId, Node>,
    scopes: Arena<ScopeId, Scope>,
    scope_paths: HashMap<String, ScopeId>,
    root: Option<ScopeId>,
    memories: Arena<MemoryId, Memory>,
    memory_paths: HashMap<String, MemoryId>,
    processes: Vec<ProcTop>,
    functions: HashMap<String, FuncDef>,
    tasks: HashMap<String, TaskDef>,
    /// Parameters under their canonical dotted names.
    parameters: HashMap<String, Expr>,
    /// Driver flags, set after elaboration.
    flags: HashMap<String, String>,
    /// Incremented when elaboration detects an error. Prevents emission.
    pub errors: u32,
    lcounter: u32,
}

impl Default for Design {
    fn default() -> Self {
        Self::new()
    }
}

impl Design {
    /// Creates an empty design.
    pub fn new() -> Self {
        Self {
            interner: Interner::new(),
            links: LinkPool::new(),
            signals: Arena::new(),
            nodes: Arena::new(),
            scopes: Arena::new(),
            scope_paths: HashMap::new(),
            root: None,
            memories: Arena::new(),
            memory_paths: HashMap::new(),
            processes: Vec::new(),
            functions: HashMap::new(),
            tasks: HashMap::new(),
            parameters: HashMap::new(),
            flags: HashMap::new(),
            errors: 0,
            lcounter: 0,
        }
    }

    /// Interns a string in the design's name table.
    pub fn intern(&self, s: &str) -> Ident {
        self.interner.get_or_intern(s)
    }

    /// Resolves an interned name back to its text.
    pub fn name_of(&self, id: Ident) -> &str {
        self.interner.resolve(id)
    }

    // === Scopes ===

    /// Creates the root scope. Calling this twice is an elaboration
    /// error; the existing root is returned.
    pub fn make_root_scope(&mut self, name: &str) -> ScopeId {
        if let Some(root) = self.root {
            self.errors += 1;
            return root;
        }
        let ident = self.intern(name);
        let id = self.scopes.alloc(Scope::root(ident));
        self.scope_paths.insert(name.to_string(), id);
        self.root = Some(id);
        id
    }

    /// The root scope, if one has been made.
    pub fn root_scope(&self) -> Option<ScopeId> {
        self.root
    }

    /// Creates a child scope under the scope at `parent_path`.
    ///
    /// A missing parent or duplicate path is counted as an elaboration
    /// error and yields `None`.
    pub fn make_scope(&mut self, parent_path: &str, kind: ScopeKind, name: &str) -> Option<ScopeId> {
        let Some(&parent) = self.scope_paths.get(parent_path) else {
            self.errors += 1;
            return None;
        };
        let path = format!("{parent_path}.{name}");
        if self.scope_paths.contains_key(&path) {
            self.errors += 1;
            return None;
        }
        let ident = self.intern(name);
        let id = self.scopes.alloc(Scope::child(parent, kind, ident));
        self.scope_paths.insert(path, id);
        Some(id)
    }

    /// Finds a scope by its fully qualified path.
    pub fn find_scope(&self, path: &str) -> Option<ScopeId> {
        self.scope_paths.get(path).copied()
    }

    /// Returns the scope record.
    pub fn scope(&self, id: ScopeId) -> &Scope {
        self.scopes.get(id)
    }

    /// The dot-joined path of a scope from the root.
    pub fn scope_path(&self, id: ScopeId) -> String {
        let scope = self.scopes.get(id);
        match scope.parent {
            Some(parent) => {
                format!("{}.{}", self.scope_path(parent), self.name_of(scope.name))
            }
            None => self.name_of(scope.name).to_string(),
        }
    }

    // === Signals ===

    /// Creates a signal in `scope` with the given index range,
    /// allocating one passive pin per bit.
    pub fn new_signal(
        &mut self,
        scope: ScopeId,
        name: &str,
        kind: SignalKind,
        msb: i64,
        lsb: i64,
    ) -> SignalId {
        let ident = self.intern(name);
        let id = self.signals.alloc(Signal::new(ident, scope, kind, msb, lsb));
        let width = self.signals.get(id).width();
        let pins: Vec<PinId> = (0..width)
            .map(|i| {
                self.links
                    .alloc(PinOwner::Signal(id), i, crate::link::PinDir::Passive)
            })
            .collect();
        self.signals.get_mut(id).pins = pins;
        id
    }

    /// Creates an anonymous local wire of the given width in `scope`.
    pub fn new_temp_signal(&mut self, scope: ScopeId, width: u32) -> SignalId {
        let path = self.scope_path(scope);
        let name = self.local_symbol(&path);
        let id = self.new_signal(scope, &name, SignalKind::Wire, width as i64 - 1, 0);
        self.signals.get_mut(id).local = true;
        id
    }

    /// Deletes a signal, freeing its pins. The remainder of each pin's
    /// ring is left intact.
    pub fn del_signal(&mut self, id: SignalId) {
        if let Some(sig) = self.signals.remove(id) {
            for pin in sig.pins {
                self.links.free(pin);
            }
        }
    }

    /// Returns the signal record.
    pub fn signal(&self, id: SignalId) -> &Signal {
        self.signals.get(id)
    }

    /// Returns the signal record mutably.
    pub fn signal_mut(&mut self, id: SignalId) -> &mut Signal {
        self.signals.get_mut(id)
    }

    /// Iterates over all live signals.
    pub fn signals(&self) -> impl Iterator<Item = (SignalId, &Signal)> {
        self.signals.iter()
    }

    /// Finds a signal by scope path and local name.
    pub fn find_signal(&self, path: &str, name: &str) -> Option<SignalId> {
        self.signals.iter().find_map(|(id, sig)| {
            if self.name_of(sig.name) == name && self.scope_path(sig.scope) == path {
                Some(id)
            } else {
                None
            }
        })
    }

    /// Clears the mark bit on every signal.
    pub fn clear_signal_marks(&mut self) {
        for (_, sig) in self.signals.iter_mut() {
            sig.mark = false;
        }
    }

    /// Finds the first unmarked signal matching `test` and marks it.
    pub fn find_signal_where(&mut self, test: impl Fn(&Signal) -> bool) -> Option<SignalId> {
        let found = self
            .signals
            .iter()
            .find(|(_, sig)| !sig.mark && test(sig))
            .map(|(id, _)| id)?;
        self.signals.get_mut(found).mark = true;
        Some(found)
    }

    // === Nodes ===

    /// Creates a node, allocating its pins per the kind's schema.
    pub fn new_node(&mut self, name: &str, kind: NodeKind) -> NodeId {
        let ident = self.intern(name);
        let id = self.nodes.alloc(Node::new(ident, kind));
        let node = self.nodes.get(id);
        let count = node.kind.pin_count();
        let dirs: Vec<crate::link::PinDir> = (0..count).map(|i| node.kind.pin_dir(i)).collect();
        let pins: Vec<PinId> = dirs
            .into_iter()
            .enumerate()
            .map(|(i, dir)| self.links.alloc(PinOwner::Node(id), i as u32, dir))
            .collect();
        self.nodes.get_mut(id).pins = pins;
        id
    }

    /// Deletes a node, freeing its pins. The remainder of each pin's
    /// ring is left intact.
    pub fn del_node(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.remove(id) {
            for pin in node.pins {
                self.links.free(pin);
            }
        }
    }

    /// Returns the node record.
    pub fn node(&self, id: NodeId) -> &Node {
        self.nodes.get(id)
    }

    /// Returns the node record mutably.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes.get_mut(id)
    }

    /// Returns `true` if the node is still live.
    pub fn has_node(&self, id: NodeId) -> bool {
        self.nodes.contains(id)
    }

    /// Iterates over all live nodes.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    /// Clears the mark bit on every node.
    pub fn clear_node_marks(&mut self) {
        for (_, node) in self.nodes.iter_mut() {
            node.mark = false;
        }
    }

    /// Finds the first unmarked node matching `test` and marks it.
    pub fn find_node_where(&mut self, test: impl Fn(&Node) -> bool) -> Option<NodeId> {
        let found = self
            .nodes
            .iter()
            .find(|(_, node)| !node.mark && test(node))
            .map(|(id, _)| id)?;
        self.nodes.get_mut(found).mark = true;
        Some(found)
    }

    // === Memories ===

    /// Declares a memory in `scope`.
    pub fn add_memory(
        &mut self,
        scope: ScopeId,
        name: &str,
        width: u32,
        idx_high: i64,
        idx_low: i64,
    ) -> MemoryId {
        let ident = self.intern(name);
        let id = self
            .memories
            .alloc(Memory::new(ident, width, idx_high, idx_low));
        let path = format!("{}.{name}", self.scope_path(scope));
        self.memory_paths.insert(path, id);
        id
    }

    /// Returns the memory record.
    pub fn memory(&self, id: MemoryId) -> &Memory {
        self.memories.get(id)
    }

    /// Finds a memory by scope path and local name.
    pub fn find_memory(&self, path: &str, name: &str) -> Option<MemoryId> {
        self.memory_paths.get(&format!("{path}.{name}")).copied()
    }

    // === Functions and tasks ===

    /// Registers a function definition under its qualified name.
    pub fn add_function(&mut self, def: FuncDef) {
        self.functions.insert(def.name.clone(), def);
    }

    /// Finds a function definition by qualified name.
    pub fn find_function(&self, name: &str) -> Option<&FuncDef> {
        self.functions.get(name)
    }

    /// Registers a task definition under its qualified name.
    pub fn add_task(&mut self, def: TaskDef) {
        self.tasks.insert(def.name.clone(), def);
    }

    /// Finds a task definition by qualified name.
    pub fn find_task(&self, name: &str) -> Option<&TaskDef> {
        self.tasks.get(name)
    }

    // === Parameters and flags ===

    /// Records a parameter under its canonical dotted name.
    pub fn set_parameter(&mut self, key: impl Into<String>, value: Expr) {
        self.parameters.insert(key.into(), value);
    }

    /// Finds a parameter by scope path and name.
    pub fn find_parameter(&self, path: &str, name: &str) -> Option<&Expr> {
        self.parameters.get(&format!("{path}.{name}"))
    }

    /// Replaces the driver flag map.
    pub fn set_flags(&mut self, flags: HashMap<String, String>) {
        self.flags = flags;
    }

    /// Looks up a driver flag; absent flags read as the empty string.
    pub fn get_flag(&self, key: &str) -> &str {
        self.flags.get(key).map(|s| s.as_str()).unwrap_or("")
    }

    // === Processes ===

    /// Adds a top-level process.
    pub fn add_process(&mut self, proc_top: ProcTop) {
        self.processes.push(proc_top);
    }

    /// The top-level processes in declaration order.
    pub fn processes(&self) -> &[ProcTop] {
        &self.processes
    }

    /// Generates a unique local symbol under `path`.
    pub fn local_symbol(&mut self, path: &str) -> String {
        self.lcounter += 1;
        format!("{path}._L{}", self.lcounter)
    }

    // === Passes ===

    /// Visits every signal and node exactly once with a rewriting pass.
    ///
    /// The snapshot of IDs is taken up front, so objects the pass deletes
    /// are skipped and objects it creates are not visited.
    pub fn functor(&mut self, pass: &mut dyn NetFunctor) {
        for id in self.signals.ids() {
            if self.signals.contains(id) {
                pass.signal(self, id);
            }
        }
        for id in self.nodes.ids() {
            if self.nodes.contains(id) {
                pass.node(self, id);
            }
        }
    }

    /// Emits the design through a target's visitor hooks.
    ///
    /// Emission is refused while `errors > 0`.
    pub fn emit(&self, target: &mut dyn Target) -> Result<(), EmitError> {
        if self.errors > 0 {
            return Err(EmitError::HasErrors { count: self.errors });
        }
        for (id, sig) in self.signals.iter() {
            target.signal(self, id, sig);
        }
        for (id, node) in self.nodes.iter() {
            match &node.kind {
                NodeKind::Logic { .. } => target.logic(self, id, node),
                NodeKind::BufZ => target.bufz(self, id, node),
                NodeKind::CaseCmp => target.case_cmp(self, id, node),
                NodeKind::Const(_) => target.constant(self, id, node),
                NodeKind::AddSub { .. } => target.add_sub(self, id, node),
                NodeKind::CxShift { .. } => target.cx_shift(self, id, node),
                NodeKind::Compare { .. } => target.compare(self, id, node),
                NodeKind::Ff { .. } => target.ff(self, id, node),
                NodeKind::Mux { .. } => target.mux(self, id, node),
                NodeKind::RamDq { .. } => target.ram_dq(self, id, node),
                NodeKind::EventProbe { .. } => target.event_probe(self, id, node),
                NodeKind::Udp(_) => target.udp(self, id, node),
            }
        }
        for proc_top in &self.processes {
            if !target.process(self, proc_top) {
                let kind = match proc_top.kind {
                    crate::process::ProcKind::Initial => "initial",
                    crate::process::ProcKind::Always => "always",
                };
                return Err(EmitError::Target { kind });
            }
        }
        Ok(())
    }

    // === RamDq port merging ===

    /// Counts the `RamDq` ports (including `node` itself) attached to the
    /// same memory as `node`.
    pub fn count_ram_partners(&self, node: NodeId) -> usize {
        let memory = match &self.nodes.get(node).kind {
            NodeKind::RamDq { memory, .. } => *memory,
            _ => return 0,
        };
        self.nodes
            .values()
            .filter(|n| matches!(&n.kind, NodeKind::RamDq { memory: m, .. } if *m == memory))
            .count()
    }

    /// Absorbs compatible `RamDq` partners into `node`.
    ///
    /// A partner is compatible when it is attached to the same memory
    /// with the same address width and its clock pins share nexuses with
    /// `node`'s. Each partner's pins are spliced into `node`'s rings and
    /// the partner is deleted, leaving one multi-port device.
    pub fn absorb_ram_partners(&mut self, node: NodeId) {
        let (memory, awidth) = match &self.nodes.get(node).kind {
            NodeKind::RamDq { memory, awidth, .. } => (*memory, *awidth),
            _ => return,
        };
        let partners: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|&(id, n)| {
                id != node
                    && matches!(
                        &n.kind,
                        NodeKind::RamDq { memory: m, awidth: a, .. } if *m == memory && *a == awidth
                    )
            })
            .map(|(id, _)| id)
            .collect();

        for partner in partners {
            let my_in = self.nodes.get(node).pin_inclock();
            let my_out = self.nodes.get(node).pin_outclock();
            let their_in = self.nodes.get(partner).pin_inclock();
            let their_out = self.nodes.get(partner).pin_outclock();
            if !self.links.is_linked(my_in, their_in) || !self.links.is_linked(my_out, their_out) {
                continue;
            }
            let count = self.nodes.get(node).pin_count();
            for idx in 0..count {
                let mine = self.nodes.get(node).pin(idx);
                let theirs = self.nodes.get(partner).pin(idx);
                self.links.connect(mine, theirs);
            }
            self.del_node(partner);
        }
    }

    /// Renders a human-readable listing of the whole design.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "SCOPES:");
        let mut paths: Vec<(&String, &ScopeId)> = self.scope_paths.iter().collect();
        paths.sort();
        for (path, &id) in paths {
            let _ = writeln!(out, "    {path} ({:?})", self.scopes.get(id).kind);
        }
        let _ = writeln!(out, "SIGNALS:");
        for (_, sig) in self.signals.iter() {
            let _ = writeln!(
                out,
                "    {}.{}: {:?} [{}:{}] eref={}",
                self.scope_path(sig.scope),
                self.name_of(sig.name),
                sig.kind,
                sig.msb,
                sig.lsb,
                sig.eref(),
            );
        }
        let _ = writeln!(out, "NODES:");
        for (_, node) in self.nodes.iter() {
            let _ = writeln!(
                out,
                "    {}: {} pins={}",
                self.name_of(node.name),
                node.kind.tag(),
                node.pin_count(),
            );
        }
        let _ = writeln!(out, "PROCESSES: {}", self.processes.len());
        let _ = writeln!(out, "ERRORS: {}", self.errors);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::GateKind;

    fn design_with_root() -> (Design, ScopeId) {
        let mut d = Design::new();
        let root = d.make_root_scope("top");
        (d, root)
    }

    #[test]
    fn scope_tree_and_paths() {
        let (mut d, root) = design_with_root();
        let child = d.make_scope("top", ScopeKind::BeginEnd, "blk").unwrap();
        assert_eq!(d.scope_path(root), "top");
        assert_eq!(d.scope_path(child), "top.blk");
        assert_eq!(d.find_scope("top.blk"), Some(child));
        assert_eq!(d.find_scope("top.missing"), None);
    }

    #[test]
    fn duplicate_scope_counts_error() {
        let (mut d, _) = design_with_root();
        d.make_scope("top", ScopeKind::BeginEnd, "blk").unwrap();
        assert!(d.make_scope("top", ScopeKind::BeginEnd, "blk").is_none());
        assert_eq!(d.errors, 1);
    }

    #[test]
    fn duplicate_root_counts_error() {
        let (mut d, root) = design_with_root();
        let again = d.make_root_scope("other");
        assert_eq!(again, root);
        assert_eq!(d.errors, 1);
    }

    #[test]
    fn signal_allocation_and_lookup() {
        let (mut d, root) = design_with_root();
        let sig = d.new_signal(root, "data", SignalKind::Wire, 7, 0);
        assert_eq!(d.signal(sig).width(), 8);
        assert_eq!(d.signal(sig).pins.len(), 8);
        assert_eq!(d.find_signal("top", "data"), Some(sig));
        assert_eq!(d.find_signal("top", "other"), None);
    }

    #[test]
    fn node_pins_match_schema() {
        let (mut d, _) = design_with_root();
        let node = d.new_node(
            "g1",
            NodeKind::Logic {
                gate: GateKind::And,
                ninputs: 2,
            },
        );
        assert_eq!(d.node(node).pins.len(), 3);
        let out = d.node(node).pin_output();
        assert_eq!(d.links.pin(out).dir, crate::link::PinDir::Output);
    }

    #[test]
    fn del_node_keeps_ring_remainder() {
        let (mut d, root) = design_with_root();
        let sig = d.new_signal(root, "w", SignalKind::Wire, 0, 0);
        let g1 = d.new_node(
            "g1",
            NodeKind::Logic {
                gate: GateKind::Buf,
                ninputs: 1,
            },
        );
        let g2 = d.new_node(
            "g2",
            NodeKind::Logic {
                gate: GateKind::Buf,
                ninputs: 1,
            },
        );
        let s = d.signal(sig).pin(0);
        let o1 = d.node(g1).pin_output();
        let i2 = d.node(g2).pin_input(0);
        d.links.connect(s, o1);
        d.links.connect(s, i2);
        d.del_node(g1);
        assert!(d.links.is_linked(s, i2));
        assert_eq!(d.links.ring(s).count(), 2);
    }

    #[test]
    fn find_node_where_marks() {
        let (mut d, _) = design_with_root();
        let a = d.new_node(
            "a",
            NodeKind::Logic {
                gate: GateKind::And,
                ninputs: 2,
            },
        );
        let b = d.new_node(
            "b",
            NodeKind::Logic {
                gate: GateKind::And,
                ninputs: 2,
            },
        );
        let is_and = |n: &Node| matches!(n.kind, NodeKind::Logic { gate: GateKind::And, .. });
        assert_eq!(d.find_node_where(is_and), Some(a));
        assert_eq!(d.find_node_where(is_and), Some(b));
        assert_eq!(d.find_node_where(is_and), None);
        d.clear_node_marks();
        assert_eq!(d.find_node_where(is_and), Some(a));
    }

    #[test]
    fn functor_visits_each_node_once() {
        struct Counter {
            nodes: usize,
            signals: usize,
        }
        impl NetFunctor for Counter {
            fn signal(&mut self, _d: &mut Design, _id: SignalId) {
                self.signals += 1;
            }
            fn node(&mut self, _d: &mut Design, _id: NodeId) {
                self.nodes += 1;
            }
        }
        let (mut d, root) = design_with_root();
        d.new_signal(root, "a", SignalKind::Wire, 0, 0);
        d.new_node(
            "g",
            NodeKind::Logic {
                gate: GateKind::Not,
                ninputs: 1,
            },
        );
        let mut pass = Counter {
            nodes: 0,
            signals: 0,
        };
        d.functor(&mut pass);
        assert_eq!(pass.nodes, 1);
        assert_eq!(pass.signals, 1);
    }

    #[test]
    fn functor_pass_can_delete_nodes() {
        struct DeleteBufs;
        impl NetFunctor for DeleteBufs {
            fn node(&mut self, design: &mut Design, id: NodeId) {
                if matches!(
                    design.node(id).kind,
                    NodeKind::Logic {
                        gate: GateKind::Buf,
                        ..
                    }
                ) {
                    design.del_node(id);
                }
            }
        }
        let (mut d, _) = design_with_root();
        d.new_node(
            "b",
            NodeKind::Logic {
                gate: GateKind::Buf,
                ninputs: 1,
            },
        );
        let kept = d.new_node(
            "n",
            NodeKind::Logic {
                gate: GateKind::Not,
                ninputs: 1,
            },
        );
        d.functor(&mut DeleteBufs);
        assert_eq!(d.nodes().count(), 1);
        assert!(d.has_node(kept));
    }

    #[test]
    fn parameters_and_flags() {
        let (mut d, _) = design_with_root();
        d.set_parameter(
            "top.WIDTH",
            Expr::Const(veris_common::LogicVec::from_u64(8, 32)),
        );
        assert!(d.find_parameter("top", "WIDTH").is_some());
        assert!(d.find_parameter("top", "DEPTH").is_none());
        let mut flags = HashMap::new();
        flags.insert("target".to_string(), "vvm".to_string());
        d.set_flags(flags);
        assert_eq!(d.get_flag("target"), "vvm");
        assert_eq!(d.get_flag("missing"), "");
    }

    #[test]
    fn memories_registered_by_path() {
        let (mut d, root) = design_with_root();
        let mem = d.add_memory(root, "ram", 8, 255, 0);
        assert_eq!(d.find_memory("top", "ram"), Some(mem));
        assert_eq!(d.memory(mem).count(), 256);
    }

    #[test]
    fn local_symbols_are_unique() {
        let (mut d, _) = design_with_root();
        let a = d.local_symbol("top");
        let b = d.local_symbol("top");
        assert_ne!(a, b);
        assert!(a.starts_with("top._L"));
    }

    #[test]
    fn temp_signal_is_local() {
        let (mut d, root) = design_with_root();
        let sig = d.new_temp_signal(root, 4);
        assert!(d.signal(sig).local);
        assert_eq!(d.signal(sig).width(), 4);
    }

    #[test]
    fn ram_partner_counting_and_absorb() {
        let (mut d, root) = design_with_root();
        let mem = d.add_memory(root, "ram", 4, 7, 0);
        let clk = d.new_signal(root, "clk", SignalKind::Wire, 0, 0);
        let a = d.new_node(
            "p0",
            NodeKind::RamDq {
                memory: mem,
                awidth: 3,
                width: 4,
            },
        );
        let b = d.new_node(
            "p1",
            NodeKind::RamDq {
                memory: mem,
                awidth: 3,
                width: 4,
            },
        );
        assert_eq!(d.count_ram_partners(a), 2);
        // Share both clock nexuses so the ports are compatible.
        let clk_pin = d.signal(clk).pin(0);
        for id in [a, b] {
            let inc = d.node(id).pin_inclock();
            let outc = d.node(id).pin_outclock();
            d.links.connect(clk_pin, inc);
            d.links.connect(clk_pin, outc);
        }
        d.absorb_ram_partners(a);
        assert_eq!(d.count_ram_partners(a), 1);
        assert!(!d.has_node(b));
    }

    #[test]
    fn dump_mentions_everything() {
        let (mut d, root) = design_with_root();
        d.new_signal(root, "q", SignalKind::Reg, 3, 0);
        d.new_node(
            "g",
            NodeKind::Logic {
                gate: GateKind::Xor,
                ninputs: 2,
            },
        );
        let text = d.dump();
        assert!(text.contains("top.q"));
        assert!(text.contains("logic"));
        assert!(text.contains("ERRORS: 0"));
    }
}
