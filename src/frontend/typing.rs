//! Nopython type inference for kernel bodies.
//!
//! Every node gets a concrete [`NumericType`]; there is no fallback to a
//! dynamic object type. Literals are `int64`/`float64`/`bool`, arithmetic
//! follows numpy promotion, and transcendental functions keep `float32`
//! but otherwise produce `float64`.

use super::ast::{BinaryOp, Builtin, Expr, ExprKind, UnaryOp};
use super::types::NumericType;
use crate::core::error::{CompileError, CompileResult};
use crate::core::session::CompilationSession;
use bumpalo::Bump;
use hashbrown::DefaultHashBuilder;
use hashbrown::HashMap;

/// Inferred type of every node, indexed by [`Expr::id`](super::ast::Expr).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMap(Vec<NumericType>);

impl TypeMap {
    pub fn of(&self, expr: &Expr<'_>) -> NumericType {
        self.0[expr.id as usize]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Common type of two operands that must agree, e.g. both arms of `where`.
pub fn unify(a: NumericType, b: NumericType) -> NumericType {
    if a == b {
        a
    } else {
        NumericType::promote(a, b)
    }
}

type Scope<'a> = HashMap<&'a str, NumericType, DefaultHashBuilder, &'a Bump>;

/// Infer types for `root` given the kernel's typed parameters.
pub fn infer<'a>(
    session: &CompilationSession<'a>,
    root: &'a Expr<'a>,
    expr_count: u32,
    params: &[(&str, NumericType)],
) -> CompileResult<TypeMap> {
    let mut scope: Scope<'a> = HashMap::new_in(session.arena());
    for (name, ty) in params {
        let name = session.intern_str(name);
        if scope.insert(name, *ty).is_some() {
            return Err(CompileError::Typing {
                reason: format!("duplicate parameter `{}`", name),
            });
        }
    }

    let mut types = vec![NumericType::Bool; expr_count as usize];
    infer_expr(root, &scope, &mut types)?;
    Ok(TypeMap(types))
}

fn infer_expr<'a>(
    expr: &'a Expr<'a>,
    scope: &Scope<'a>,
    types: &mut [NumericType],
) -> CompileResult<NumericType> {
    let ty = match &expr.kind {
        ExprKind::Int(_) => NumericType::Int64,
        ExprKind::Float(_) => NumericType::Float64,
        ExprKind::Bool(_) => NumericType::Bool,
        ExprKind::Param(name) => *scope.get(*name).ok_or_else(|| CompileError::UnknownName {
            name: name.to_string(),
        })?,
        ExprKind::Unary(op, operand) => {
            let operand = infer_expr(operand, scope, types)?;
            match (op, operand) {
                (UnaryOp::Neg, NumericType::Bool) => NumericType::Int64,
                _ => operand,
            }
        }
        ExprKind::Binary(op, lhs, rhs) => {
            let l = infer_expr(lhs, scope, types)?;
            let r = infer_expr(rhs, scope, types)?;
            match op {
                BinaryOp::Div => NumericType::true_divide(l, r),
                _ => NumericType::promote(l, r),
            }
        }
        ExprKind::Compare(_, lhs, rhs) => {
            infer_expr(lhs, scope, types)?;
            infer_expr(rhs, scope, types)?;
            NumericType::Bool
        }
        ExprKind::Call(builtin, args) => {
            let mut arg_types = Vec::with_capacity(args.len());
            for arg in args.iter() {
                arg_types.push(infer_expr(arg, scope, types)?);
            }
            builtin_result(*builtin, &arg_types)?
        }
        ExprKind::Cast(ty, operand) => {
            infer_expr(operand, scope, types)?;
            *ty
        }
    };

    let slot = types.get_mut(expr.id as usize).ok_or_else(|| CompileError::Typing {
        reason: format!("expression id {} out of range", expr.id),
    })?;
    *slot = ty;
    Ok(ty)
}

fn builtin_result(builtin: Builtin, args: &[NumericType]) -> CompileResult<NumericType> {
    if args.len() != builtin.arity() {
        return Err(CompileError::Arity {
            callee: builtin.name().to_string(),
            expected: builtin.arity(),
            found: args.len(),
        });
    }

    let float_of = |ty: NumericType| {
        if ty == NumericType::Float32 {
            NumericType::Float32
        } else {
            NumericType::Float64
        }
    };

    Ok(match builtin {
        Builtin::Abs => match args[0] {
            NumericType::Bool => NumericType::Int64,
            other => other,
        },
        Builtin::Min | Builtin::Max => unify(args[0], args[1]),
        Builtin::Sqrt | Builtin::Exp | Builtin::Log | Builtin::Floor => float_of(args[0]),
        Builtin::Where => unify(args[1], args[2]),
    })
}
