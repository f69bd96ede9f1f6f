//! Shared foundational types used across the Veris Verilog toolchain.
//!
//! This crate provides the core value types: 4-state logic values, packed
//! logic vectors with full four-valued arithmetic, interned identifiers,
//! and common result types.

#![warn(missing_docs)]

pub mod ident;
pub mod logic;
pub mod logic_vec;
pub mod result;

pub use ident::{Ident, Interner};
pub use logic::Logic;
pub use logic_vec::LogicVec;
pub use result::{InternalError, VerisResult};
