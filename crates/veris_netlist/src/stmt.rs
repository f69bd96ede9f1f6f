//! Procedural statements.
//!
//! [`Stmt`] is a closed sum over the behavioral statement kinds that
//! survive elaboration. Statements may point at nodes and signals but
//! are not themselves linked into the net graph.

use crate::expr::Expr;
use crate::ids::{MemoryId, SignalId};
use serde::{Deserialize, Serialize};
use veris_common::{Logic, LogicVec};

/// Whether an assignment is blocking or non-blocking.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum AssignKind {
    /// `=`: the write is visible immediately.
    Blocking,
    /// `<=`: the write is deferred to the end of the time step.
    NonBlocking,
}

/// Whether a block runs its statements in sequence or in parallel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum BlockKind {
    /// A `begin`-`end` block.
    Sequential,
    /// A `fork`-`join` block.
    Parallel,
}

/// The matching flavour of a case statement.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum CaseKind {
    /// `case`: all bits must match exactly; X/Z propagate to "no match".
    Eq,
    /// `casex`: X and Z bits are don't-care.
    EqX,
    /// `casez`: Z bits are don't-care.
    EqZ,
}

impl CaseKind {
    /// Tests a case guard against the switch value.
    ///
    /// `Eq` uses logical equality, so an X or Z anywhere means no match.
    /// `EqZ` skips positions where either side is Z; `EqX` also skips X.
    pub fn matches(self, value: &LogicVec, guard: &LogicVec) -> bool {
        let width = value.width().max(guard.width());
        let value = value.resized(width);
        let guard = guard.resized(width);
        match self {
            CaseKind::Eq => value.eq_logical(&guard) == Logic::One,
            CaseKind::EqZ | CaseKind::EqX => {
                for i in 0..width {
                    let v = value.get(i);
                    let g = guard.get(i);
                    let dont_care = match self {
                        CaseKind::EqZ => v == Logic::Z || g == Logic::Z,
                        CaseKind::EqX => !v.is_defined() || !g.is_defined(),
                        CaseKind::Eq => unreachable!(),
                    };
                    if !dont_care && v != g {
                        return false;
                    }
                }
                true
            }
        }
    }
}

/// An elaborated assignment l-value.
///
/// The optional `bmux` expression selects a single bit of the target at
/// run time; when present only one bit is written.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssignLhs {
    /// The target signal.
    pub signal: SignalId,
    /// The width of the l-value.
    pub width: u32,
    /// Optional single-bit select expression.
    pub bmux: Option<Box<Expr>>,
}

/// One arm of a case statement.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaseItem {
    /// The guard expression; `None` marks the default arm.
    pub guard: Option<Expr>,
    /// The statement to run when the guard matches.
    pub stmt: Box<Stmt>,
}

/// An elaborated procedural statement.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Stmt {
    /// A procedural assignment to a signal.
    Assign {
        /// Blocking or non-blocking.
        kind: AssignKind,
        /// The target l-value.
        lhs: AssignLhs,
        /// The value expression.
        rval: Expr,
    },
    /// A procedural assignment to a memory element.
    AssignMem {
        /// Blocking or non-blocking.
        kind: AssignKind,
        /// The target memory.
        memory: MemoryId,
        /// The signal carrying the element index.
        index: SignalId,
        /// The value expression.
        rval: Expr,
    },
    /// A statement block.
    Block {
        /// Sequential or parallel execution.
        kind: BlockKind,
        /// The child statements in declaration order.
        stmts: Vec<Stmt>,
    },
    /// A case statement. Items are evaluated in declaration order and
    /// the first match wins; a default item matches if no earlier item
    /// did.
    Case {
        /// The matching flavour.
        kind: CaseKind,
        /// The switch expression.
        expr: Expr,
        /// The arms in declaration order.
        items: Vec<CaseItem>,
    },
    /// A conditional statement.
    Condit {
        /// The condition expression.
        cond: Expr,
        /// Statement to run when true.
        if_clause: Option<Box<Stmt>>,
        /// Statement to run when false.
        else_clause: Option<Box<Stmt>>,
    },
    /// A while loop: the condition is tested before each iteration.
    While {
        /// The loop condition.
        cond: Expr,
        /// The loop body.
        body: Box<Stmt>,
    },
    /// A forever loop, executed until its scope is disabled.
    Forever {
        /// The loop body.
        body: Box<Stmt>,
    },
    /// A repeat loop, executed a fixed number of times.
    Repeat {
        /// The repetition count expression.
        count: Expr,
        /// The loop body.
        body: Box<Stmt>,
    },
    /// A `#delay` statement.
    Delay {
        /// Ticks to wait.
        delay: u64,
        /// The statement to run after the delay, if any.
        stmt: Option<Box<Stmt>>,
    },
    /// An `@(...)` event wait.
    EventWait {
        /// The event name, for back ends that name the wait point.
        name: String,
        /// The event-probe nodes feeding this wait.
        probes: Vec<crate::ids::NodeId>,
        /// The statement to run after the event, if any.
        stmt: Option<Box<Stmt>>,
    },
    /// A call to a system task.
    STaskCall {
        /// The task name, including the `$`.
        name: String,
        /// The argument expressions.
        args: Vec<Expr>,
    },
    /// A call to a user-defined task.
    UTaskCall {
        /// The qualified task name.
        name: String,
    },
    /// An empty statement.
    Nop,
}
