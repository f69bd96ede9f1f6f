//! Constant folding over expression trees.
//!
//! [`Expr::eval_tree`] folds an expression to a [`Expr::Const`] literal
//! when every leaf is constant, using the four-valued semantics of
//! [`LogicVec`]. Non-constant trees are returned with their constant
//! sub-trees folded. Parameter placeholders resolve through the design's
//! canonical parameter map.

use crate::design::Design;
use crate::expr::{BinaryOp, Expr, UnaryOp};
use veris_common::{Logic, LogicVec};

impl Expr {
    /// Folds this tree, returning a fresh expression.
    ///
    /// Returns a [`Expr::Const`] when every leaf is constant; otherwise
    /// returns the tree with folded children. Division by a constant
    /// zero and unresolvable parameter references count elaboration
    /// errors on the design.
    pub fn eval_tree(&self, design: &mut Design) -> Expr {
        match self {
            Expr::Binary {
                op,
                lhs,
                rhs,
                width,
            } => {
                let lf = lhs.eval_tree(design);
                let rf = rhs.eval_tree(design);
                if let (Some(lc), Some(rc)) = (lf.as_const(), rf.as_const()) {
                    if let Some(v) = eval_binary(design, *op, lc, rc, *width) {
                        return Expr::Const(v);
                    }
                }
                Expr::Binary {
                    op: *op,
                    lhs: Box::new(lf),
                    rhs: Box::new(rf),
                    width: *width,
                }
            }
            Expr::Unary { op, operand, width } => {
                let of = operand.eval_tree(design);
                if let Some(oc) = of.as_const() {
                    return Expr::Const(eval_unary(*op, oc, *width));
                }
                Expr::Unary {
                    op: *op,
                    operand: Box::new(of),
                    width: *width,
                }
            }
            Expr::Ternary {
                cond,
                true_val,
                false_val,
                width,
            } => {
                let cf = cond.eval_tree(design);
                let tf = true_val.eval_tree(design);
                let ff = false_val.eval_tree(design);
                if let Some(cc) = cf.as_const() {
                    match cc.as_condition() {
                        Logic::One => {
                            if let Some(tc) = tf.as_const() {
                                return Expr::Const(tc.resized(*width));
                            }
                            return tf;
                        }
                        Logic::Zero => {
                            if let Some(fc) = ff.as_const() {
                                return Expr::Const(fc.resized(*width));
                            }
                            return ff;
                        }
                        _ => {
                            // Unknown select: agree bit-by-bit, else X.
                            if let (Some(tc), Some(fc)) = (tf.as_const(), ff.as_const()) {
                                let t = tc.resized(*width);
                                let f = fc.resized(*width);
                                let mut v = LogicVec::new(*width);
                                for i in 0..*width {
                                    let b = if t.get(i) == f.get(i) {
                                        t.get(i)
                                    } else {
                                        Logic::X
                                    };
                                    v.set(i, b);
                                }
                                return Expr::Const(v);
                            }
                        }
                    }
                }
                Expr::Ternary {
                    cond: Box::new(cf),
                    true_val: Box::new(tf),
                    false_val: Box::new(ff),
                    width: *width,
                }
            }
            Expr::Concat { parts, repeat } => {
                let folded: Vec<Expr> = parts.iter().map(|p| p.eval_tree(design)).collect();
                if folded.iter().all(|p| p.as_const().is_some()) {
                    let values: Vec<LogicVec> = folded
                        .iter()
                        .map(|p| p.as_const().unwrap().clone())
                        .collect();
                    return Expr::Const(LogicVec::concat(&values, *repeat));
                }
                Expr::Concat {
                    parts: folded,
                    repeat: *repeat,
                }
            }
            Expr::Param { path, name, width } => {
                match design.find_parameter(path, name).cloned() {
                    Some(expr) => {
                        let mut folded = expr.eval_tree(design);
                        if *width > 0 {
                            folded.set_width(*width);
                        }
                        folded
                    }
                    None => {
                        design.errors += 1;
                        self.clone()
                    }
                }
            }
            Expr::BitSelect { signal, index } => Expr::BitSelect {
                signal: *signal,
                index: Box::new(index.eval_tree(design)),
            },
            Expr::MemoryRef {
                memory,
                index,
                width,
            } => Expr::MemoryRef {
                memory: *memory,
                index: index.as_ref().map(|i| Box::new(i.eval_tree(design))),
                width: *width,
            },
            Expr::UFuncCall {
                name,
                result,
                args,
                width,
            } => Expr::UFuncCall {
                name: name.clone(),
                result: *result,
                args: args.iter().map(|a| a.eval_tree(design)).collect(),
                width: *width,
            },
            Expr::SFuncCall { name, args, width } => Expr::SFuncCall {
                name: name.clone(),
                args: args.iter().map(|a| a.eval_tree(design)).collect(),
                width: *width,
            },
            other => other.clone(),
        }
    }
}

/// Folds one binary operation over constant operands.
///
/// Returns `None` for operators that cannot fold (none at present, but
/// the signature leaves room for width checks to refuse).
fn eval_binary(
    design: &mut Design,
    op: BinaryOp,
    lc: &LogicVec,
    rc: &LogicVec,
    width: u32,
) -> Option<LogicVec> {
    let v = match op {
        BinaryOp::Add => lc.add_wide(rc).resized(width),
        BinaryOp::Sub => lc.sub(rc).resized(width),
        BinaryOp::Mul => lc.mul(rc).resized(width),
        BinaryOp::Div | BinaryOp::Mod => {
            if rc.is_fully_defined() && rc.is_all_zero() {
                design.errors += 1;
            }
            let r = if op == BinaryOp::Div {
                lc.div(rc)
            } else {
                lc.rem(rc)
            };
            r.resized(width)
        }
        BinaryOp::BitAnd => &lc.resized(width) & &rc.resized(width),
        BinaryOp::BitOr => &lc.resized(width) | &rc.resized(width),
        BinaryOp::BitXor => &lc.resized(width) ^ &rc.resized(width),
        BinaryOp::BitXnor => lc.resized(width).xnor(&rc.resized(width)),
        BinaryOp::BitNor => lc.resized(width).nor(&rc.resized(width)),
        BinaryOp::Shl | BinaryOp::Shr => match rc.to_u64() {
            None => LogicVec::all_x(width),
            Some(n) => {
                let amount = n.min(u64::from(u32::MAX)) as u32;
                let l = lc.resized(width);
                if op == BinaryOp::Shl {
                    l.shl(amount)
                } else {
                    l.shr(amount)
                }
            }
        },
        BinaryOp::Lt => LogicVec::from_logic(lc.lt(rc)),
        BinaryOp::Gt => LogicVec::from_logic(lc.gt(rc)),
        BinaryOp::Le => LogicVec::from_logic(lc.le(rc)),
        BinaryOp::Ge => LogicVec::from_logic(lc.ge(rc)),
        BinaryOp::LogicEq => LogicVec::from_logic(lc.eq_logical(rc)),
        BinaryOp::LogicNe => LogicVec::from_logic(lc.ne_logical(rc)),
        BinaryOp::CaseEq => LogicVec::from_bool(lc.eq_case(rc)),
        BinaryOp::CaseNe => LogicVec::from_bool(lc.ne_case(rc)),
        BinaryOp::LogicAnd => LogicVec::from_logic(lc.logic_and(rc)),
        BinaryOp::LogicOr => LogicVec::from_logic(lc.logic_or(rc)),
    };
    Some(v)
}

/// Folds one unary operation over a constant operand.
fn eval_unary(op: UnaryOp, oc: &LogicVec, width: u32) -> LogicVec {
    match op {
        UnaryOp::BitNot => !&oc.resized(width),
        UnaryOp::Plus => oc.resized(width),
        UnaryOp::Minus => oc.resized(width).negated(),
        UnaryOp::LogicNot => LogicVec::from_logic(!oc.as_condition()),
        UnaryOp::RedAnd => LogicVec::from_logic(oc.red_and()),
        UnaryOp::RedOr => LogicVec::from_logic(oc.red_or()),
        UnaryOp::RedXor => LogicVec::from_logic(oc.red_xor()),
        UnaryOp::RedNand => LogicVec::from_logic(oc.red_nand()),
        UnaryOp::RedNor => LogicVec::from_logic(oc.red_nor()),
        UnaryOp::RedXnor => LogicVec::from_logic(oc.red_xnor()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stmt::CaseKind;

    fn konst(s: &str) -> Expr {
        Expr::Const(LogicVec::from_binary_str(s).unwrap())
    }

    fn fold(e: Expr) -> Expr {
        let mut d = Design::new();
        e.eval_tree(&mut d)
    }

    #[test]
    fn const_fold_add() {
        // 4'b0011 + 4'b0001 folds to 4'b0100 with width 4.
        let e = Expr::binary(BinaryOp::Add, konst("0011"), konst("0001"));
        let r = fold(e);
        assert_eq!(r.width(), 4);
        assert_eq!(format!("{r}"), "4'b0100");
    }

    #[test]
    fn const_fold_add_with_carry_width() {
        let mut e = Expr::binary(BinaryOp::Add, konst("1111"), konst("0001"));
        assert!(e.set_width(5));
        let r = fold(e);
        assert_eq!(r.as_const().unwrap().to_u64(), Some(16));
    }

    #[test]
    fn case_eq_folds_to_zero_on_z() {
        // (4'b1z01 === 4'b1001) is 0; under casez matching it matches.
        let e = Expr::binary(BinaryOp::CaseEq, konst("1z01"), konst("1001"));
        let r = fold(e);
        assert_eq!(format!("{r}"), "1'b0");

        let a = LogicVec::from_binary_str("1z01").unwrap();
        let b = LogicVec::from_binary_str("1001").unwrap();
        assert!(CaseKind::EqZ.matches(&a, &b));
    }

    #[test]
    fn logical_eq_folds_to_x_on_z() {
        let e = Expr::binary(BinaryOp::LogicEq, konst("1z01"), konst("1001"));
        let r = fold(e);
        assert_eq!(format!("{r}"), "1'bx");
    }

    #[test]
    fn div_by_const_zero_counts_error() {
        let mut d = Design::new();
        let e = Expr::binary(BinaryOp::Div, konst("0100"), konst("0000"));
        let r = e.eval_tree(&mut d);
        assert_eq!(d.errors, 1);
        assert_eq!(format!("{r}"), "4'bxxxx");
    }

    #[test]
    fn non_const_children_still_folded() {
        let sig = Expr::SignalRef {
            signal: crate::ids::SignalId::from_raw(0),
            width: 4,
        };
        let inner = Expr::binary(BinaryOp::Add, konst("0001"), konst("0001"));
        let e = Expr::binary(BinaryOp::BitAnd, sig, inner);
        let r = fold(e);
        if let Expr::Binary { rhs, .. } = &r {
            assert!(rhs.as_const().is_some());
        } else {
            panic!("expected Binary, got {r}");
        }
    }

    #[test]
    fn ternary_selects_branch() {
        let e = Expr::ternary(konst("1"), konst("1010"), konst("0101"));
        assert_eq!(format!("{}", fold(e)), "4'b1010");
        let e = Expr::ternary(konst("0"), konst("1010"), konst("0101"));
        assert_eq!(format!("{}", fold(e)), "4'b0101");
    }

    #[test]
    fn ternary_x_condition_merges_bits() {
        let e = Expr::ternary(konst("x"), konst("1010"), konst("1001"));
        assert_eq!(format!("{}", fold(e)), "4'b10xx");
    }

    #[test]
    fn concat_folds() {
        let e = Expr::Concat {
            parts: vec![konst("10"), konst("01")],
            repeat: 2,
        };
        assert_eq!(format!("{}", fold(e)), "8'b10011001");
    }

    #[test]
    fn shift_folds() {
        let e = Expr::binary(BinaryOp::Shl, konst("0011"), konst("10"));
        assert_eq!(format!("{}", fold(e)), "4'b1100");
        let e = Expr::binary(BinaryOp::Shr, konst("0110"), konst("x1"));
        assert_eq!(format!("{}", fold(e)), "4'bxxxx");
    }

    #[test]
    fn reductions_fold() {
        let e = Expr::unary(UnaryOp::RedAnd, konst("1111"));
        assert_eq!(format!("{}", fold(e)), "1'b1");
        let e = Expr::unary(UnaryOp::RedNor, konst("0000"));
        assert_eq!(format!("{}", fold(e)), "1'b1");
        let e = Expr::unary(UnaryOp::BitNot, konst("10x1"));
        assert_eq!(format!("{}", fold(e)), "4'b01x0");
    }

    #[test]
    fn param_resolves_through_design() {
        let mut d = Design::new();
        d.make_root_scope("top");
        d.set_parameter("top.WIDTH", konst("1000"));
        let e = Expr::Param {
            path: "top".into(),
            name: "WIDTH".into(),
            width: 0,
        };
        let r = e.eval_tree(&mut d);
        assert_eq!(r.as_const().unwrap().to_u64(), Some(8));
        assert_eq!(d.errors, 0);
    }

    #[test]
    fn unresolved_param_counts_error() {
        let mut d = Design::new();
        let e = Expr::Param {
            path: "top".into(),
            name: "MISSING".into(),
            width: 0,
        };
        let r = e.eval_tree(&mut d);
        assert_eq!(d.errors, 1);
        assert!(matches!(r, Expr::Param { .. }));
    }

    #[test]
    fn signal_ref_unchanged() {
        let e = Expr::SignalRef {
            signal: crate::ids::SignalId::from_raw(3),
            width: 8,
        };
        let r = fold(e.clone());
        assert_eq!(format!("{r}"), format!("{e}"));
    }
}
