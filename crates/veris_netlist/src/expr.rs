//! Expression trees.
//!
//! [`Expr`] is a closed sum over the expression kinds that survive
//! elaboration. Every variant carries a computed width. Trees are
//! immutable after elaboration: transformations like constant folding
//! allocate fresh trees, and duplication is `Clone` (preserving widths
//! and dump text).

use crate::ids::{MemoryId, ScopeId, SignalId};
use serde::{Deserialize, Serialize};
use std::fmt;
use veris_common::LogicVec;

/// A binary operator code.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    BitXnor,
    BitNor,
    Lt,
    Gt,
    Le,
    Ge,
    LogicEq,
    LogicNe,
    CaseEq,
    CaseNe,
    LogicAnd,
    LogicOr,
    Shl,
    Shr,
}

impl BinaryOp {
    /// The source-text spelling of the operator.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::BitXnor => "~^",
            BinaryOp::BitNor => "~|",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::LogicEq => "==",
            BinaryOp::LogicNe => "!=",
            BinaryOp::CaseEq => "===",
            BinaryOp::CaseNe => "!==",
            BinaryOp::LogicAnd => "&&",
            BinaryOp::LogicOr => "||",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }

    /// True for the operators whose result is always a single bit.
    pub fn is_single_bit(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt
                | BinaryOp::Gt
                | BinaryOp::Le
                | BinaryOp::Ge
                | BinaryOp::LogicEq
                | BinaryOp::LogicNe
                | BinaryOp::CaseEq
                | BinaryOp::CaseNe
                | BinaryOp::LogicAnd
                | BinaryOp::LogicOr
        )
    }

    /// True for the bit-parallel operators that require matching widths.
    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinaryOp::BitAnd
                | BinaryOp::BitOr
                | BinaryOp::BitXor
                | BinaryOp::BitXnor
                | BinaryOp::BitNor
        )
    }
}

/// A unary operator code.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum UnaryOp {
    BitNot,
    LogicNot,
    RedAnd,
    RedOr,
    RedXor,
    RedNand,
    RedNor,
    RedXnor,
    Plus,
    Minus,
}

impl UnaryOp {
    /// The source-text spelling of the operator.
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::BitNot => "~",
            UnaryOp::LogicNot => "!",
            UnaryOp::RedAnd => "&",
            UnaryOp::RedOr => "|",
            UnaryOp::RedXor => "^",
            UnaryOp::RedNand => "~&",
            UnaryOp::RedNor => "~|",
            UnaryOp::RedXnor => "~^",
            UnaryOp::Plus => "+",
            UnaryOp::Minus => "-",
        }
    }

    /// True for the reduction operators and logical not, which always
    /// yield a single bit.
    pub fn is_single_bit(self) -> bool {
        !matches!(self, UnaryOp::BitNot | UnaryOp::Plus | UnaryOp::Minus)
    }
}

/// An elaborated expression.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Expr {
    /// A literal constant.
    Const(LogicVec),
    /// A system identifier of fixed width.
    Ident {
        /// The identifier text.
        name: String,
        /// The declared width.
        width: u32,
    },
    /// A reference to a whole signal.
    SignalRef {
        /// The referenced signal.
        signal: SignalId,
        /// The signal width.
        width: u32,
    },
    /// A single-bit select `signal[index]` with a runtime index.
    BitSelect {
        /// The referenced signal.
        signal: SignalId,
        /// The bit index expression.
        index: Box<Expr>,
    },
    /// A reference to one element of a memory.
    MemoryRef {
        /// The referenced memory.
        memory: MemoryId,
        /// The address expression; absent only in special contexts.
        index: Option<Box<Expr>>,
        /// The element width.
        width: u32,
    },
    /// A binary operation.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// The left operand.
        lhs: Box<Expr>,
        /// The right operand.
        rhs: Box<Expr>,
        /// The result width.
        width: u32,
    },
    /// A unary operation.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// The operand.
        operand: Box<Expr>,
        /// The result width.
        width: u32,
    },
    /// A conditional expression `cond ? t : f`.
    Ternary {
        /// The condition.
        cond: Box<Expr>,
        /// Value when the condition is true.
        true_val: Box<Expr>,
        /// Value when the condition is false.
        false_val: Box<Expr>,
        /// The result width.
        width: u32,
    },
    /// A concatenation with optional repeat count. Part 0 sits in the
    /// most significant position.
    Concat {
        /// The parts in source order.
        parts: Vec<Expr>,
        /// How many times the whole concatenation repeats.
        repeat: u32,
    },
    /// A call to a user-defined function.
    UFuncCall {
        /// The qualified function name.
        name: String,
        /// The register receiving the result.
        result: SignalId,
        /// The argument expressions.
        args: Vec<Expr>,
        /// The result width.
        width: u32,
    },
    /// A call to a system function.
    SFuncCall {
        /// The system function name, including the `$`.
        name: String,
        /// The argument expressions.
        args: Vec<Expr>,
        /// The result width.
        width: u32,
    },
    /// A scope literal, valid only as a system-task argument.
    ScopeRef(ScopeId),
    /// An unresolved parameter placeholder.
    Param {
        /// The scope path of the parameter.
        path: String,
        /// The parameter name.
        name: String,
        /// The width assigned so far; 0 until resolved.
        width: u32,
    },
}

impl Expr {
    /// Builds a binary expression with its natural width.
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        let width = if op.is_single_bit() {
            1
        } else if matches!(op, BinaryOp::Shl | BinaryOp::Shr) {
            lhs.width()
        } else {
            lhs.width().max(rhs.width())
        };
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            width,
        }
    }

    /// Builds a unary expression with its natural width.
    pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
        let width = if op.is_single_bit() { 1 } else { operand.width() };
        Expr::Unary {
            op,
            operand: Box::new(operand),
            width,
        }
    }

    /// Builds a ternary expression with its natural width.
    pub fn ternary(cond: Expr, true_val: Expr, false_val: Expr) -> Expr {
        let width = true_val.width().max(false_val.width());
        Expr::Ternary {
            cond: Box::new(cond),
            true_val: Box::new(true_val),
            false_val: Box::new(false_val),
            width,
        }
    }

    /// The computed width of this expression.
    pub fn width(&self) -> u32 {
        match self {
            Expr::Const(v) => v.width(),
            Expr::Ident { width, .. } => *width,
            Expr::SignalRef { width, .. } => *width,
            Expr::BitSelect { .. } => 1,
            Expr::MemoryRef { width, .. } => *width,
            Expr::Binary { width, .. } => *width,
            Expr::Unary { width, .. } => *width,
            Expr::Ternary { width, .. } => *width,
            Expr::Concat { parts, repeat } => {
                parts.iter().map(Expr::width).sum::<u32>() * repeat
            }
            Expr::UFuncCall { width, .. } => *width,
            Expr::SFuncCall { width, .. } => *width,
            Expr::ScopeRef(_) => 0,
            Expr::Param { width, .. } => *width,
        }
    }

    /// Returns the literal value if this is a constant.
    pub fn as_const(&self) -> Option<&LogicVec> {
        match self {
            Expr::Const(v) => Some(v),
            _ => None,
        }
    }

    /// Attempts to coerce this expression to width `w`.
    ///
    /// Returns `true` on success, updating the widths of the tree
    /// consistently. Bitwise operators require their operands to match
    /// the result width; add/sub accept a result that discards the carry;
    /// truncating a literal fails if nonzero bits would be lost;
    /// single-bit operators only accept width 1.
    pub fn set_width(&mut self, w: u32) -> bool {
        match self {
            Expr::Const(v) => {
                if w >= v.width() {
                    *v = v.resized(w);
                    return true;
                }
                // Truncation must not lose nonzero bits.
                for i in w..v.width() {
                    if v.get(i) != veris_common::Logic::Zero {
                        return false;
                    }
                }
                *v = v.resized(w);
                true
            }
            Expr::Ident { width, .. } => *width == w,
            Expr::SignalRef { width, .. } => *width == w,
            Expr::BitSelect { .. } => w == 1,
            Expr::MemoryRef { width, .. } => *width == w,
            Expr::Binary {
                op,
                lhs,
                rhs,
                width,
            } => {
                if op.is_single_bit() {
                    return w == 1;
                }
                match op {
                    BinaryOp::Shl | BinaryOp::Shr => {
                        if lhs.set_width(w) || w >= *width {
                            *width = w;
                            true
                        } else {
                            false
                        }
                    }
                    BinaryOp::Add | BinaryOp::Sub => {
                        let natural = lhs.width().max(rhs.width());
                        // Widening extends the result; w == natural
                        // discards a wanted carry.
                        if w >= natural {
                            *width = w;
                            true
                        } else if lhs.set_width(w) && rhs.set_width(w) {
                            *width = w;
                            true
                        } else {
                            false
                        }
                    }
                    _ if op.is_bitwise() => {
                        if lhs.set_width(w) && rhs.set_width(w) {
                            *width = w;
                            true
                        } else {
                            false
                        }
                    }
                    // Mul/Div/Mod follow the add/sub policy.
                    _ => {
                        let natural = lhs.width().max(rhs.width());
                        if w >= natural || (lhs.set_width(w) && rhs.set_width(w)) {
                            *width = w;
                            true
                        } else {
                            false
                        }
                    }
                }
            }
            Expr::Unary { op, operand, width } => {
                if op.is_single_bit() {
                    return w == 1;
                }
                if operand.set_width(w) || w >= *width {
                    *width = w;
                    true
                } else {
                    false
                }
            }
            Expr::Ternary {
                true_val,
                false_val,
                width,
                ..
            } => {
                if true_val.set_width(w) && false_val.set_width(w) {
                    *width = w;
                    true
                } else {
                    false
                }
            }
            Expr::Concat { .. } => self.width() == w,
            Expr::UFuncCall { width, .. } => *width == w,
            Expr::SFuncCall { width, .. } => *width == w,
            Expr::ScopeRef(_) => false,
            Expr::Param { width, .. } => {
                *width = w;
                true
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(v) => {
                if v.is_signed() {
                    write!(f, "{}'sb{}", v.width(), v)
                } else {
                    write!(f, "{}'b{}", v.width(), v)
                }
            }
            Expr::Ident { name, .. } => write!(f, "{name}"),
            Expr::SignalRef { signal, .. } => write!(f, "$sig{}", signal.as_raw()),
            Expr::BitSelect { signal, index } => {
                write!(f, "$sig{}[{}]", signal.as_raw(), index)
            }
            Expr::MemoryRef { memory, index, .. } => match index {
                Some(idx) => write!(f, "$mem{}[{}]", memory.as_raw(), idx),
                None => write!(f, "$mem{}", memory.as_raw()),
            },
            Expr::Binary { op, lhs, rhs, .. } => {
                write!(f, "({}{}{})", lhs, op.symbol(), rhs)
            }
            Expr::Unary { op, operand, .. } => write!(f, "{}({})", op.symbol(), operand),
            Expr::Ternary {
                cond,
                true_val,
                false_val,
                ..
            } => write!(f, "({} ? {} : {})", cond, true_val, false_val),
            Expr::Concat { parts, repeat } => {
                if *repeat != 1 {
                    write!(f, "{{{}{{", repeat)?;
                } else {
                    write!(f, "{{")?;
                }
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                if *repeat != 1 {
                    write!(f, "}}}}")
                } else {
                    write!(f, "}}")
                }
            }
            Expr::UFuncCall { name, args, .. } | Expr::SFuncCall { name, args, .. } => {
                write!(f, "{name}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            Expr::ScopeRef(scope) => write!(f, "$scope{}", scope.as_raw()),
            Expr::Param { path, name, .. } => write!(f, "{path}.{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn konst(s: &str) -> Expr {
        Expr::Const(LogicVec::from_binary_str(s).unwrap())
    }

    #[test]
    fn natural_widths() {
        let add = Expr::binary(BinaryOp::Add, konst("0011"), konst("01"));
        assert_eq!(add.width(), 4);
        let cmp = Expr::binary(BinaryOp::Lt, konst("0011"), konst("0100"));
        assert_eq!(cmp.width(), 1);
        let shift = Expr::binary(BinaryOp::Shl, konst("0011"), konst("01"));
        assert_eq!(shift.width(), 4);
        let red = Expr::unary(UnaryOp::RedAnd, konst("1111"));
        assert_eq!(red.width(), 1);
        let inv = Expr::unary(UnaryOp::BitNot, konst("1111"));
        assert_eq!(inv.width(), 4);
    }

    #[test]
    fn concat_width() {
        let e = Expr::Concat {
            parts: vec![konst("10"), konst("011")],
            repeat: 2,
        };
        assert_eq!(e.width(), 10);
    }

    #[test]
    fn dup_preserves_width_and_text() {
        let e = Expr::ternary(
            Expr::binary(BinaryOp::LogicEq, konst("01"), konst("10")),
            konst("1111"),
            Expr::binary(BinaryOp::Add, konst("0001"), konst("0010")),
        );
        let d = e.clone();
        assert_eq!(d.width(), e.width());
        assert_eq!(format!("{d}"), format!("{e}"));
    }

    #[test]
    fn set_width_const_extends() {
        let mut e = konst("11");
        assert!(e.set_width(4));
        assert_eq!(e.width(), 4);
        assert_eq!(format!("{e}"), "4'b0011");
    }

    #[test]
    fn set_width_const_truncation_rules() {
        // Dropping zero bits is fine.
        let mut e = konst("0011");
        assert!(e.set_width(2));
        assert_eq!(e.width(), 2);
        // Dropping a one bit fails.
        let mut e = konst("1000");
        assert!(!e.set_width(2));
    }

    #[test]
    fn set_width_bitwise_pushes_down() {
        let mut e = Expr::binary(BinaryOp::BitAnd, konst("0011"), konst("0101"));
        assert!(e.set_width(8));
        assert_eq!(e.width(), 8);
        if let Expr::Binary { lhs, rhs, .. } = &e {
            assert_eq!(lhs.width(), 8);
            assert_eq!(rhs.width(), 8);
        } else {
            unreachable!();
        }
    }

    #[test]
    fn set_width_bitwise_fixed_signal_fails() {
        let sig = Expr::SignalRef {
            signal: SignalId::from_raw(0),
            width: 4,
        };
        let mut e = Expr::binary(BinaryOp::BitAnd, sig, konst("0101"));
        assert!(!e.set_width(8));
    }

    #[test]
    fn set_width_add_discards_carry() {
        // Natural width of the sum is 4; the carry-out form is 5.
        let mut e = Expr::binary(BinaryOp::Add, konst("1111"), konst("0001"));
        assert!(e.set_width(5));
        assert_eq!(e.width(), 5);
        let mut e = Expr::binary(BinaryOp::Add, konst("1111"), konst("0001"));
        assert!(e.set_width(4));
        assert_eq!(e.width(), 4);
    }

    #[test]
    fn set_width_comparison_only_one() {
        let mut e = Expr::binary(BinaryOp::Lt, konst("01"), konst("10"));
        assert!(e.set_width(1));
        assert!(!e.set_width(2));
    }

    #[test]
    fn display_forms() {
        let e = Expr::binary(BinaryOp::CaseEq, konst("1z01"), konst("1001"));
        assert_eq!(format!("{e}"), "(4'b1z01===4'b1001)");
        let t = Expr::ternary(konst("1"), konst("10"), konst("01"));
        assert_eq!(format!("{t}"), "(1'b1 ? 2'b10 : 2'b01)");
        let c = Expr::Concat {
            parts: vec![konst("1"), konst("0")],
            repeat: 3,
        };
        assert_eq!(format!("{c}"), "{3{1'b1, 1'b0}}");
    }

    #[test]
    fn signed_const_display() {
        let e = Expr::Const(LogicVec::from_u64(5, 4).into_signed());
        assert_eq!(format!("{e}"), "4'sb0101");
    }

    #[test]
    fn serde_roundtrip() {
        let e = Expr::binary(BinaryOp::Add, konst("01"), konst("10"));
        let json = serde_json::to_string(&e).unwrap();
        let back: Expr = serde_json::from_str(&json).unwrap();
        assert_eq!(format!("{back}"), format!("{e}"));
    }
}
