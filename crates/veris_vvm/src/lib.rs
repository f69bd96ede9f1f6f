//! The Veris bytecode virtual machine.
//!
//! This crate implements the simulation back half of the toolchain: a
//! textual assembly format for a register/bit-indexed instruction set,
//! the symbol-resolution pass that links functor graphs and code labels,
//! and the event-driven execution model those instructions target.
//!
//! # Architecture
//!
//! - **[`FunctorPool`]** holds the 4-input, 1-output truth-table
//!   evaluators whose fan-out chains form the structural half of a
//!   design. An [`Ipoint`] packs a functor index and a port number into
//!   one word.
//! - **[`CodeSpace`]** is the flat array of instruction records; a
//!   [`CodePtr`] is an index into it.
//! - **[`SymbolTable`]s** map labels to functors, code pointers, and VPI
//!   handles, with deferred-fixup lists for forward references.
//! - **[`Compiler`]** parses assembly text, builds the graphs, and
//!   resolves the fixup lists in [`Compiler::compile_cleanup`].
//! - **[`Runtime`]** owns the whole machine and runs the cooperative
//!   thread scheduler against the discrete-event time wheel.

#![warn(missing_docs)]

pub mod codes;
pub mod compile;
pub mod error;
pub mod functor;
pub mod schedule;
pub mod symbols;
pub mod vpi;
pub mod vthread;

pub use codes::{CodePtr, CodeSpace, Instruction, Opcode, OperandType};
pub use compile::Compiler;
pub use error::VvmError;
pub use functor::{EdgeTable, Functor, FunctorMode, FunctorPool, FunctorTable, Ipoint};
pub use schedule::Runtime;
pub use symbols::SymbolTable;
pub use vpi::{SystemTask, TaskAction, VpiObject, VpiRef, VpiRegistry};
pub use vthread::{ThreadId, VThread};
