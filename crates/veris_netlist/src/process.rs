//! Process tops and function/task definitions.

use crate::ids::SignalId;
use crate::stmt::Stmt;
use serde::{Deserialize, Serialize};

/// The kind of a top-level process.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum ProcKind {
    /// An `initial` process, run once at time zero.
    Initial,
    /// An `always` process, restarted when its statement completes.
    Always,
}

/// The top of a behavioral process: its kind and root statement.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcTop {
    /// Initial or always.
    pub kind: ProcKind,
    /// The root statement, usually a block.
    pub stmt: Stmt,
}

impl ProcTop {
    /// Creates a process top.
    pub fn new(kind: ProcKind, stmt: Stmt) -> Self {
        Self { kind, stmt }
    }
}

/// An elaborated function definition.
///
/// Port 0 is the phantom output parameter that receives the result; the
/// remaining ports are the inputs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FuncDef {
    /// The qualified function name.
    pub name: String,
    /// The port signals; port 0 is the result.
    pub ports: Vec<SignalId>,
    /// The function body.
    pub stmt: Stmt,
}

impl FuncDef {
    /// The number of ports, including the result.
    pub fn port_count(&self) -> usize {
        self.ports.len()
    }
}

/// An elaborated task definition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskDef {
    /// The qualified task name.
    pub name: String,
    /// The port signals.
    pub ports: Vec<SignalId>,
    /// The task body.
    pub stmt: Stmt,
}

impl TaskDef {
    /// The number of ports.
    pub fn port_count(&self) -> usize {
        self.ports.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proc_top_kinds() {
        let p = ProcTop::new(ProcKind::Initial, Stmt::Nop);
        assert_eq!(p.kind, ProcKind::Initial);
        let p = ProcTop::new(ProcKind::Always, Stmt::Nop);
        assert_eq!(p.kind, ProcKind::Always);
    }

    #[test]
    fn func_def_ports() {
        let f = FuncDef {
            name: "top.clog2".into(),
            ports: vec![SignalId::from_raw(0), SignalId::from_raw(1)],
            stmt: Stmt::Nop,
        };
        assert_eq!(f.port_count(), 2);
    }

    #[test]
    fn task_def_ports() {
        let t = TaskDef {
            name: "top.send".into(),
            ports: vec![],
            stmt: Stmt::Nop,
        };
        assert_eq!(t.port_count(), 0);
    }
}
