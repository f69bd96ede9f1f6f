//! The elaborated netlist IR for the Veris Verilog toolchain.
//!
//! This crate defines the in-memory representation of a design after
//! parameter resolution, scope flattening, and gate/expression lowering.
//! It is the common language spoken by every back end.
//!
//! # Architecture
//!
//! - **[`Arena`]** provides ID-indexed storage for all IR entities, with
//!   tombstone removal so optimisation passes can rewrite the graph.
//! - **[`LinkPool`]** holds every pin; electrically connected pins form
//!   circular doubly-linked rings (nexuses).
//! - **[`Node`]** is a closed tagged union over device kinds: logic
//!   gates, LPM devices, constant drivers, event probes, and UDPs.
//! - **[`Expr`]** and **[`Stmt`]** are closed unions over expression and
//!   procedural statement kinds; transformations allocate fresh trees.
//! - **[`Design`]** is the top-level container with the error counter
//!   that gates emission.

#![warn(missing_docs)]

pub mod arena;
pub mod design;
pub mod eval;
pub mod expr;
pub mod ids;
pub mod link;
pub mod memory;
pub mod node;
pub mod process;
pub mod scope;
pub mod signal;
pub mod stmt;
pub mod synth;
pub mod target;
pub mod udp;

pub use arena::{Arena, ArenaId};
pub use design::{Design, EmitError, NetFunctor};
pub use expr::{BinaryOp, Expr, UnaryOp};
pub use ids::{MemoryId, NodeId, PinId, ScopeId, SignalId};
pub use link::{LinkPool, Pin, PinDir, PinOwner};
pub use memory::Memory;
pub use node::{EdgeKind, GateKind, Node, NodeKind};
pub use process::{FuncDef, ProcKind, ProcTop, TaskDef};
pub use scope::{Scope, ScopeKind};
pub use signal::{PortKind, Signal, SignalKind};
pub use stmt::{AssignKind, AssignLhs, BlockKind, CaseItem, CaseKind, Stmt};
pub use target::Target;
pub use udp::UdpTable;
