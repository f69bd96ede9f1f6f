//! The emitter boundary.
//!
//! Back ends implement [`Target`]: one hook per node kind plus hooks for
//! signals and processes. Every hook is a required method, so a back end
//! that forgets a node kind fails to compile rather than silently
//! skipping devices.

use crate::design::Design;
use crate::ids::{NodeId, SignalId};
use crate::node::Node;
use crate::process::ProcTop;
use crate::signal::Signal;

/// A code-generation back end.
///
/// [`Design::emit`] drives these hooks: first every signal, then every
/// node (dispatched on its kind), then every process. The `process` hook
/// returns `false` to abort emission.
pub trait Target {
    /// Called for every signal.
    fn signal(&mut self, design: &Design, id: SignalId, sig: &Signal);

    /// Called for every plain logic gate.
    fn logic(&mut self, design: &Design, id: NodeId, node: &Node);

    /// Called for every isolating buffer.
    fn bufz(&mut self, design: &Design, id: NodeId, node: &Node);

    /// Called for every structural case comparator.
    fn case_cmp(&mut self, design: &Design, id: NodeId, node: &Node);

    /// Called for every constant driver.
    fn constant(&mut self, design: &Design, id: NodeId, node: &Node);

    /// Called for every LPM add/subtract device.
    fn add_sub(&mut self, design: &Design, id: NodeId, node: &Node);

    /// Called for every LPM shifter.
    fn cx_shift(&mut self, design: &Design, id: NodeId, node: &Node);

    /// Called for every LPM magnitude comparator.
    fn compare(&mut self, design: &Design, id: NodeId, node: &Node);

    /// Called for every flip-flop row.
    fn ff(&mut self, design: &Design, id: NodeId, node: &Node);

    /// Called for every LPM mux.
    fn mux(&mut self, design: &Design, id: NodeId, node: &Node);

    /// Called for every memory port.
    fn ram_dq(&mut self, design: &Design, id: NodeId, node: &Node);

    /// Called for every event probe.
    fn event_probe(&mut self, design: &Design, id: NodeId, node: &Node);

    /// Called for every UDP instance.
    fn udp(&mut self, design: &Design, id: NodeId, node: &Node);

    /// Called for every top-level process. Return `false` to abort.
    fn process(&mut self, design: &Design, proc_top: &ProcTop) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::EmitError;
    use crate::node::{GateKind, NodeKind};
    use crate::process::{ProcKind, ProcTop};
    use crate::signal::SignalKind;
    use crate::stmt::Stmt;

    #[derive(Default)]
    struct CountingTarget {
        signals: usize,
        gates: usize,
        adders: usize,
        processes: usize,
        fail_processes: bool,
    }

    impl Target for CountingTarget {
        fn signal(&mut self, _d: &Design, _id: SignalId, _s: &Signal) {
            self.signals += 1;
        }
        fn logic(&mut self, _d: &Design, _id: NodeId, _n: &Node) {
            self.gates += 1;
        }
        fn bufz(&mut self, _d: &Design, _id: NodeId, _n: &Node) {}
        fn case_cmp(&mut self, _d: &Design, _id: NodeId, _n: &Node) {}
        fn constant(&mut self, _d: &Design, _id: NodeId, _n: &Node) {}
        fn add_sub(&mut self, _d: &Design, _id: NodeId, _n: &Node) {
            self.adders += 1;
        }
        fn cx_shift(&mut self, _d: &Design, _id: NodeId, _n: &Node) {}
        fn compare(&mut self, _d: &Design, _id: NodeId, _n: &Node) {}
        fn ff(&mut self, _d: &Design, _id: NodeId, _n: &Node) {}
        fn mux(&mut self, _d: &Design, _id: NodeId, _n: &Node) {}
        fn ram_dq(&mut self, _d: &Design, _id: NodeId, _n: &Node) {}
        fn event_probe(&mut self, _d: &Design, _id: NodeId, _n: &Node) {}
        fn udp(&mut self, _d: &Design, _id: NodeId, _n: &Node) {}
        fn process(&mut self, _d: &Design, _p: &ProcTop) -> bool {
            self.processes += 1;
            !self.fail_processes
        }
    }

    fn sample_design() -> Design {
        let mut d = Design::new();
        let root = d.make_root_scope("top");
        d.new_signal(root, "a", SignalKind::Wire, 3, 0);
        d.new_node(
            "g",
            NodeKind::Logic {
                gate: GateKind::And,
                ninputs: 2,
            },
        );
        d.new_node("add", NodeKind::AddSub { width: 4 });
        d.add_process(ProcTop::new(ProcKind::Initial, Stmt::Nop));
        d
    }

    #[test]
    fn emit_dispatches_by_kind() {
        let d = sample_design();
        let mut t = CountingTarget::default();
        d.emit(&mut t).unwrap();
        assert_eq!(t.signals, 1);
        assert_eq!(t.gates, 1);
        assert_eq!(t.adders, 1);
        assert_eq!(t.processes, 1);
    }

    #[test]
    fn emit_refused_with_errors() {
        let mut d = sample_design();
        d.errors = 2;
        let mut t = CountingTarget::default();
        match d.emit(&mut t) {
            Err(EmitError::HasErrors { count }) => assert_eq!(count, 2),
            other => panic!("expected HasErrors, got {other:?}"),
        }
        // Nothing was visited.
        assert_eq!(t.signals, 0);
    }

    #[test]
    fn emit_stops_when_process_hook_fails() {
        let d = sample_design();
        let mut t = CountingTarget {
            fail_processes: true,
            ..Default::default()
        };
        assert!(matches!(d.emit(&mut t), Err(EmitError::Target { .. })));
    }
}
