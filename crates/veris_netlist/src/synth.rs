//! Structural synthesis of expressions.
//!
//! [`Expr::synthesize`] lowers an expression to a net-level subgraph
//! that computes it, returning the signal carrying the result. Adders
//! lower to an LPM add/sub with its carry chain, bitwise operators to
//! per-bit gates, the ternary to a mux, comparisons to an LPM compare,
//! and concatenation wires signals directly. Shapes with no structural
//! form count an elaboration error and yield `None`.

use crate::design::Design;
use crate::expr::{BinaryOp, Expr, UnaryOp};
use crate::ids::{ScopeId, SignalId};
use crate::node::{GateKind, NodeKind};

impl Expr {
    /// Lowers this expression to gates and LPM devices in `design`.
    ///
    /// Returns the signal holding the result, or `None` (counting an
    /// error) when the expression has no structural form.
    pub fn synthesize(&self, design: &mut Design, scope: ScopeId) -> Option<SignalId> {
        match self {
            Expr::SignalRef { signal, .. } => Some(*signal),

            Expr::Const(value) => {
                let out = design.new_temp_signal(scope, value.width());
                let path = design.scope_path(scope);
                let name = design.local_symbol(&path);
                let node = design.new_node(&name, NodeKind::Const(value.clone()));
                for i in 0..value.width() {
                    let np = design.node(node).pin(i);
                    let sp = design.signal(out).pin(i);
                    design.links.connect(np, sp);
                }
                Some(out)
            }

            Expr::Binary { op, lhs, rhs, width } => match op {
                _ if op.is_bitwise() => {
                    let l = lhs.synthesize(design, scope)?;
                    let r = rhs.synthesize(design, scope)?;
                    if design.signal(l).width() != *width || design.signal(r).width() != *width {
                        design.errors += 1;
                        return None;
                    }
                    let gate = match op {
                        BinaryOp::BitAnd => GateKind::And,
                        BinaryOp::BitOr => GateKind::Or,
                        BinaryOp::BitXor => GateKind::Xor,
                        BinaryOp::BitXnor => GateKind::Xnor,
                        BinaryOp::BitNor => GateKind::Nor,
                        _ => unreachable!(),
                    };
                    let out = design.new_temp_signal(scope, *width);
                    for i in 0..*width {
                        let path = design.scope_path(scope);
                        let name = design.local_symbol(&path);
                        let g = design.new_node(&name, NodeKind::Logic { gate, ninputs: 2 });
                        let (o, a, b) = {
                            let node = design.node(g);
                            (node.pin_output(), node.pin_input(0), node.pin_input(1))
                        };
                        let sp = design.signal(out).pin(i);
                        let lp = design.signal(l).pin(i);
                        let rp = design.signal(r).pin(i);
                        design.links.connect(o, sp);
                        design.links.connect(a, lp);
                        design.links.connect(b, rp);
                    }
                    Some(out)
                }

                BinaryOp::Add | BinaryOp::Sub => {
                    let l = lhs.synthesize(design, scope)?;
                    let r = rhs.synthesize(design, scope)?;
                    if design.signal(l).width() != *width || design.signal(r).width() != *width {
                        design.errors += 1;
                        return None;
                    }
                    let out = design.new_temp_signal(scope, *width);
                    let path = design.scope_path(scope);
                    let name = design.local_symbol(&path);
                    let adder = design.new_node(&name, NodeKind::AddSub { width: *width });
                    for i in 0..*width {
                        let (pa, pb, pr) = {
                            let node = design.node(adder);
                            (node.pin_data_a(i), node.pin_data_b(i), node.pin_result(i))
                        };
                        let lp = design.signal(l).pin(i);
                        let rp = design.signal(r).pin(i);
                        let sp = design.signal(out).pin(i);
                        design.links.connect(pa, lp);
                        design.links.connect(pb, rp);
                        design.links.connect(pr, sp);
                    }
                    if *op == BinaryOp::Sub {
                        design.node_mut(adder).attributes.insert(
                            "LPM_Direction".to_string(),
                            "SUB".to_string(),
                        );
                    }
                    Some(out)
                }

                BinaryOp::Lt
                | BinaryOp::Gt
                | BinaryOp::Le
                | BinaryOp::Ge
                | BinaryOp::LogicEq
                | BinaryOp::LogicNe => {
                    let l = lhs.synthesize(design, scope)?;
                    let r = rhs.synthesize(design, scope)?;
                    let w = design.signal(l).width();
                    if design.signal(r).width() != w {
                        design.errors += 1;
                        return None;
                    }
                    let path = design.scope_path(scope);
                    let name = design.local_symbol(&path);
                    let cmp = design.new_node(&name, NodeKind::Compare { width: w });
                    for i in 0..w {
                        let (pa, pb) = {
                            let node = design.node(cmp);
                            (node.pin_data_a(i), node.pin_data_b(i))
                        };
                        let lp = design.signal(l).pin(i);
                        let rp = design.signal(r).pin(i);
                        design.links.connect(pa, lp);
                        design.links.connect(pb, rp);
                    }
                    let out = design.new_temp_signal(scope, 1);
                    let flag = {
                        let node = design.node(cmp);
                        match op {
                            BinaryOp::Lt => node.pin_alb(),
                            BinaryOp::Gt => node.pin_agb(),
                            BinaryOp::Le => node.pin_aleb(),
                            BinaryOp::Ge => node.pin_ageb(),
                            BinaryOp::LogicEq => node.pin_aeb(),
                            BinaryOp::LogicNe => node.pin_aneb(),
                            _ => unreachable!(),
                        }
                    };
                    let sp = design.signal(out).pin(0);
                    design.links.connect(flag, sp);
                    Some(out)
                }

                _ => {
                    design.errors += 1;
                    None
                }
            },

            Expr::Unary { op, operand, width } => match op {
                UnaryOp::BitNot => {
                    let input = operand.synthesize(design, scope)?;
                    if design.signal(input).width() != *width {
                        design.errors += 1;
                        return None;
                    }
                    let out = design.new_temp_signal(scope, *width);
                    for i in 0..*width {
                        let path = design.scope_path(scope);
                        let name = design.local_symbol(&path);
                        let g = design.new_node(
                            &name,
                            NodeKind::Logic {
                                gate: GateKind::Not,
                                ninputs: 1,
                            },
                        );
                        let (o, a) = {
                            let node = design.node(g);
                            (node.pin_output(), node.pin_input(0))
                        };
                        let sp = design.signal(out).pin(i);
                        let ip = design.signal(input).pin(i);
                        design.links.connect(o, sp);
                        design.links.connect(a, ip);
                    }
                    Some(out)
                }
                _ => {
                    design.errors += 1;
                    None
                }
            },

            Expr::Ternary {
                cond,
                true_val,
                false_val,
                width,
            } => {
                let sel = cond.synthesize(design, scope)?;
                if design.signal(sel).width() != 1 {
                    design.errors += 1;
                    return None;
                }
                let t = true_val.synthesize(design, scope)?;
                let f = false_val.synthesize(design, scope)?;
                if design.signal(t).width() != *width || design.signal(f).width() != *width {
                    design.errors += 1;
                    return None;
                }
                let path = design.scope_path(scope);
                let name = design.local_symbol(&path);
                let mux = design.new_node(
                    &name,
                    NodeKind::Mux {
                        width: *width,
                        size: 2,
                        sel_width: 1,
                    },
                );
                let out = design.new_temp_signal(scope, *width);
                let sel_pin = design.node(mux).pin_sel(0);
                let sp = design.signal(sel).pin(0);
                design.links.connect(sel_pin, sp);
                for i in 0..*width {
                    let (pr, p0, p1) = {
                        let node = design.node(mux);
                        (
                            node.pin_result(i),
                            node.pin_mux_data(i, 0),
                            node.pin_mux_data(i, 1),
                        )
                    };
                    // Select value 0 routes the false branch.
                    let fp = design.signal(f).pin(i);
                    let tp = design.signal(t).pin(i);
                    let op_ = design.signal(out).pin(i);
                    design.links.connect(p0, fp);
                    design.links.connect(p1, tp);
                    design.links.connect(pr, op_);
                }
                Some(out)
            }

            Expr::Concat { parts, repeat } => {
                let width = self.width();
                let out = design.new_temp_signal(scope, width);
                let mut pos = 0u32;
                // Build LSB-first: the last part is least significant.
                let mut sources = Vec::new();
                for part in parts.iter().rev() {
                    sources.push(part.synthesize(design, scope)?);
                }
                for _ in 0..*repeat {
                    for &src in &sources {
                        let w = design.signal(src).width();
                        for i in 0..w {
                            let sp = design.signal(src).pin(i);
                            let op_ = design.signal(out).pin(pos);
                            design.links.connect(sp, op_);
                            pos += 1;
                        }
                    }
                }
                Some(out)
            }

            _ => {
                design.errors += 1;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalKind;
    use veris_common::LogicVec;

    fn setup() -> (Design, ScopeId) {
        let mut d = Design::new();
        let root = d.make_root_scope("top");
        (d, root)
    }

    fn sig_expr(d: &mut Design, scope: ScopeId, name: &str, width: u32) -> (SignalId, Expr) {
        let id = d.new_signal(scope, name, SignalKind::Wire, width as i64 - 1, 0);
        (
            id,
            Expr::SignalRef {
                signal: id,
                width,
            },
        )
    }

    #[test]
    fn signal_passes_through() {
        let (mut d, root) = setup();
        let (id, e) = sig_expr(&mut d, root, "a", 4);
        assert_eq!(e.synthesize(&mut d, root), Some(id));
        assert_eq!(d.nodes().count(), 0);
    }

    #[test]
    fn bitwise_lowered_to_per_bit_gates() {
        let (mut d, root) = setup();
        let (a, ea) = sig_expr(&mut d, root, "a", 4);
        let (b, eb) = sig_expr(&mut d, root, "b", 4);
        let e = Expr::binary(BinaryOp::BitAnd, ea, eb);
        let out = e.synthesize(&mut d, root).unwrap();
        assert_eq!(d.signal(out).width(), 4);
        // One AND gate per bit.
        let gates: Vec<_> = d
            .nodes()
            .filter(|(_, n)| matches!(n.kind, NodeKind::Logic { gate: GateKind::And, .. }))
            .collect();
        assert_eq!(gates.len(), 4);
        // Bit 0 of the output ring reaches bit 0 of both operands' rings
        // through the gate.
        let (g0, _) = gates
            .iter()
            .find(|(id, _)| {
                let o = d.node(*id).pin_output();
                d.links.is_linked(o, d.signal(out).pin(0))
            })
            .copied()
            .unwrap();
        let n = d.node(g0);
        assert!(d.links.is_linked(n.pin_input(0), d.signal(a).pin(0)));
        assert!(d.links.is_linked(n.pin_input(1), d.signal(b).pin(0)));
    }

    #[test]
    fn add_lowered_to_lpm_adder() {
        let (mut d, root) = setup();
        let (a, ea) = sig_expr(&mut d, root, "a", 4);
        let (_, eb) = sig_expr(&mut d, root, "b", 4);
        let e = Expr::binary(BinaryOp::Add, ea, eb);
        let out = e.synthesize(&mut d, root).unwrap();
        let (adder, _) = d
            .nodes()
            .find(|(_, n)| matches!(n.kind, NodeKind::AddSub { .. }))
            .unwrap();
        let node = d.node(adder);
        assert!(d.links.is_linked(node.pin_data_a(2), d.signal(a).pin(2)));
        assert!(d.links.is_linked(node.pin_result(0), d.signal(out).pin(0)));
    }

    #[test]
    fn sub_marks_direction() {
        let (mut d, root) = setup();
        let (_, ea) = sig_expr(&mut d, root, "a", 2);
        let (_, eb) = sig_expr(&mut d, root, "b", 2);
        let e = Expr::binary(BinaryOp::Sub, ea, eb);
        e.synthesize(&mut d, root).unwrap();
        let (_, node) = d
            .nodes()
            .find(|(_, n)| matches!(n.kind, NodeKind::AddSub { .. }))
            .unwrap();
        assert_eq!(node.attribute("LPM_Direction"), Some("SUB"));
    }

    #[test]
    fn comparison_lowered_to_lpm_compare() {
        let (mut d, root) = setup();
        let (_, ea) = sig_expr(&mut d, root, "a", 4);
        let (_, eb) = sig_expr(&mut d, root, "b", 4);
        let e = Expr::binary(BinaryOp::Lt, ea, eb);
        let out = e.synthesize(&mut d, root).unwrap();
        assert_eq!(d.signal(out).width(), 1);
        let (cmp, _) = d
            .nodes()
            .find(|(_, n)| matches!(n.kind, NodeKind::Compare { .. }))
            .unwrap();
        let alb = d.node(cmp).pin_alb();
        assert!(d.links.is_linked(alb, d.signal(out).pin(0)));
    }

    #[test]
    fn ternary_lowered_to_mux() {
        let (mut d, root) = setup();
        let (_, ec) = sig_expr(&mut d, root, "c", 1);
        let (t, et) = sig_expr(&mut d, root, "t", 2);
        let (f, ef) = sig_expr(&mut d, root, "f", 2);
        let e = Expr::ternary(ec, et, ef);
        let out = e.synthesize(&mut d, root).unwrap();
        let (mux, _) = d
            .nodes()
            .find(|(_, n)| matches!(n.kind, NodeKind::Mux { .. }))
            .unwrap();
        let node = d.node(mux);
        assert!(d.links.is_linked(node.pin_mux_data(0, 0), d.signal(f).pin(0)));
        assert!(d.links.is_linked(node.pin_mux_data(0, 1), d.signal(t).pin(0)));
        assert!(d.links.is_linked(node.pin_result(1), d.signal(out).pin(1)));
    }

    #[test]
    fn concat_wires_directly() {
        let (mut d, root) = setup();
        let (a, ea) = sig_expr(&mut d, root, "a", 2);
        let (b, eb) = sig_expr(&mut d, root, "b", 2);
        let e = Expr::Concat {
            parts: vec![ea, eb],
            repeat: 1,
        };
        let out = e.synthesize(&mut d, root).unwrap();
        assert_eq!(d.signal(out).width(), 4);
        // Part 0 ("a") occupies the most significant bits.
        assert!(d.links.is_linked(d.signal(out).pin(3), d.signal(a).pin(1)));
        assert!(d.links.is_linked(d.signal(out).pin(0), d.signal(b).pin(0)));
        // No gates needed.
        assert_eq!(d.nodes().count(), 0);
    }

    #[test]
    fn const_synthesizes_driver_node() {
        let (mut d, root) = setup();
        let e = Expr::Const(LogicVec::from_u64(5, 3));
        let out = e.synthesize(&mut d, root).unwrap();
        let (node, _) = d
            .nodes()
            .find(|(_, n)| matches!(n.kind, NodeKind::Const(_)))
            .unwrap();
        assert!(d.links.is_linked(d.node(node).pin(0), d.signal(out).pin(0)));
    }

    #[test]
    fn width_mismatch_counts_error() {
        let (mut d, root) = setup();
        let (_, ea) = sig_expr(&mut d, root, "a", 4);
        let (_, eb) = sig_expr(&mut d, root, "b", 2);
        // Natural width is 4 but b is only 2 bits wide.
        let e = Expr::binary(BinaryOp::BitAnd, ea, eb);
        assert_eq!(e.synthesize(&mut d, root), None);
        assert!(d.errors > 0);
    }

    #[test]
    fn unsynthesizable_counts_error() {
        let (mut d, root) = setup();
        let e = Expr::SFuncCall {
            name: "$random".into(),
            args: vec![],
            width: 32,
        };
        assert_eq!(e.synthesize(&mut d, root), None);
        assert_eq!(d.errors, 1);
    }
}
