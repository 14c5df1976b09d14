//! Arena-allocated kernel expression tree.

use super::types::NumericType;
use std::fmt;

/// Dense index of an expression node, assigned in parse order.
pub type ExprId = u32;

#[derive(Debug)]
pub struct Expr<'a> {
    pub id: ExprId,
    /// Byte offset in the kernel body, for diagnostics.
    pub offset: usize,
    /// Height of the subtree rooted here; leaves are 1.
    pub depth: u32,
    pub kind: ExprKind<'a>,
}

#[derive(Debug)]
pub enum ExprKind<'a> {
    Int(i64),
    Float(f64),
    Bool(bool),
    Param(&'a str),
    Unary(UnaryOp, &'a Expr<'a>),
    Binary(BinaryOp, &'a Expr<'a>, &'a Expr<'a>),
    Compare(CmpOp, &'a Expr<'a>, &'a Expr<'a>),
    Call(Builtin, &'a [&'a Expr<'a>]),
    /// `float32(x)` and friends.
    Cast(NumericType, &'a Expr<'a>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    /// `/`, true division.
    Div,
    /// `//`
    FloorDiv,
    /// `%`, sign follows the divisor.
    Mod,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Functions callable from a kernel body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Abs,
    Min,
    Max,
    Sqrt,
    Exp,
    Log,
    Floor,
    Where,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Builtin> {
        Some(match name {
            "abs" => Builtin::Abs,
            "min" => Builtin::Min,
            "max" => Builtin::Max,
            "sqrt" => Builtin::Sqrt,
            "exp" => Builtin::Exp,
            "log" => Builtin::Log,
            "floor" => Builtin::Floor,
            "where" => Builtin::Where,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Sqrt => "sqrt",
            Builtin::Exp => "exp",
            Builtin::Log => "log",
            Builtin::Floor => "floor",
            Builtin::Where => "where",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Builtin::Min | Builtin::Max => 2,
            Builtin::Where => 3,
            _ => 1,
        }
    }
}

impl fmt::Display for Expr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Int(v) => write!(f, "{}", v),
            ExprKind::Float(v) => write!(f, "{:?}", v),
            ExprKind::Bool(v) => write!(f, "{}", if *v { "True" } else { "False" }),
            ExprKind::Param(name) => write!(f, "{}", name),
            ExprKind::Unary(UnaryOp::Neg, e) => write!(f, "(-{})", e),
            ExprKind::Unary(UnaryOp::Plus, e) => write!(f, "(+{})", e),
            ExprKind::Binary(op, l, r) => write!(f, "({} {} {})", l, op.symbol(), r),
            ExprKind::Compare(op, l, r) => {
                let sym = match op {
                    CmpOp::Eq => "==",
                    CmpOp::Ne => "!=",
                    CmpOp::Lt => "<",
                    CmpOp::Le => "<=",
                    CmpOp::Gt => ">",
                    CmpOp::Ge => ">=",
                };
                write!(f, "({} {} {})", l, sym, r)
            }
            ExprKind::Call(builtin, args) => {
                write!(f, "{}(", builtin.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            ExprKind::Cast(ty, e) => write!(f, "{}({})", ty, e),
        }
    }
}
