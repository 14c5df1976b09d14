// This module lowers a typed kernel expression into one LLVM function using inkwell. The
// function takes the signature's argument types by value and returns the signature's return
// type; booleans travel as i8 across that boundary and as i1 inside the body. Arithmetic
// follows numpy scalar semantics: integer operations wrap, `//` and `%` round toward negative
// infinity with the sign of `%` following the divisor, integer division by zero yields 0,
// and float operations keep IEEE behavior. Transcendental builtins are calls to the LLVM
// math intrinsics declared on demand in the module. The function carries the code generator's
// CPU name and feature string as `target-cpu`/`target-features` attributes, which is what
// ties the emitted IR to the machine that will run it.

//! Lowering of typed kernel expressions to LLVM IR.

use super::ast::{BinaryOp, Builtin, CmpOp, Expr, ExprKind, UnaryOp};
use super::types::{NumericType, Signature};
use super::typing::TypeMap;
use crate::core::error::{CompileError, CompileResult};
use hashbrown::HashMap;
use inkwell::attributes::AttributeLoc;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum, FloatType, IntType};
use inkwell::values::{BasicValueEnum, FloatValue, FunctionValue, IntValue};
use inkwell::{FloatPredicate, IntPredicate};

/// What to emit: symbol, parameter names, ABI and target attributes.
pub struct FunctionDecl<'k> {
    pub symbol: &'k str,
    pub params: &'k [String],
    pub signature: &'k Signature,
    pub target_cpu: &'k str,
    pub target_features: &'k str,
}

/// Emit `decl.symbol` into `module` computing `root`.
pub fn lower_function<'ctx>(
    context: &'ctx Context,
    module: &Module<'ctx>,
    decl: &FunctionDecl<'_>,
    root: &Expr<'_>,
    types: &TypeMap,
) -> CompileResult<FunctionValue<'ctx>> {
    if decl.params.len() != decl.signature.args.len() {
        return Err(CompileError::BadSignature {
            signature: decl.signature.to_string(),
            reason: format!(
                "kernel takes {} parameter(s) but the signature lists {}",
                decl.params.len(),
                decl.signature.args.len()
            ),
        });
    }

    let lowerer = Lowerer {
        context,
        module,
        builder: context.create_builder(),
        types,
        scope: HashMap::new(),
    };
    lowerer.emit(decl, root)
}

struct Lowerer<'l, 'ctx> {
    context: &'ctx Context,
    module: &'l Module<'ctx>,
    builder: Builder<'ctx>,
    types: &'l TypeMap,
    scope: HashMap<String, (BasicValueEnum<'ctx>, NumericType)>,
}

impl<'l, 'ctx> Lowerer<'l, 'ctx> {
    fn emit(mut self, decl: &FunctionDecl<'_>, root: &Expr<'_>) -> CompileResult<FunctionValue<'ctx>> {
        let arg_types: Vec<BasicMetadataTypeEnum<'ctx>> = decl
            .signature
            .args
            .iter()
            .map(|ty| self.abi_type(*ty).into())
            .collect();
        let fn_type = self.abi_type(decl.signature.ret).fn_type(&arg_types, false);
        let function = self.module.add_function(decl.symbol, fn_type, None);

        for (key, value) in [("target-cpu", decl.target_cpu), ("target-features", decl.target_features)] {
            if !value.is_empty() {
                let attribute = self.context.create_string_attribute(key, value);
                function.add_attribute(AttributeLoc::Function, attribute);
            }
        }

        let entry = self.context.append_basic_block(function, "entry");
        self.builder.position_at_end(entry);

        for (index, (name, ty)) in decl.params.iter().zip(&decl.signature.args).enumerate() {
            let raw = function.get_nth_param(index as u32).ok_or_else(|| CompileError::Pipeline {
                reason: format!("missing parameter {} of {}", index, decl.symbol),
            })?;
            raw.set_name(name);
            let value = self.unpack_abi(raw, *ty)?;
            self.scope.insert(name.clone(), (value, *ty));
        }

        let result = self.lower(root)?;
        let result = self.cast(result, self.types.of(root), decl.signature.ret)?;
        let result = self.pack_abi(result, decl.signature.ret)?;
        self.builder.build_return(Some(&result))?;

        Ok(function)
    }

    /// Type of a value inside the function body.
    fn llvm_type(&self, ty: NumericType) -> BasicTypeEnum<'ctx> {
        match ty {
            NumericType::Bool => self.context.bool_type().into(),
            NumericType::Float32 => self.context.f32_type().into(),
            NumericType::Float64 => self.context.f64_type().into(),
            integer => self.context.custom_width_int_type(integer.bits()).into(),
        }
    }

    /// Type of a value crossing the function boundary.
    fn abi_type(&self, ty: NumericType) -> BasicTypeEnum<'ctx> {
        match ty {
            NumericType::Bool => self.context.i8_type().into(),
            other => self.llvm_type(other),
        }
    }

    fn int_type(&self, ty: NumericType) -> IntType<'ctx> {
        self.llvm_type(ty).into_int_type()
    }

    fn float_type(&self, ty: NumericType) -> FloatType<'ctx> {
        self.llvm_type(ty).into_float_type()
    }

    fn unpack_abi(&self, value: BasicValueEnum<'ctx>, ty: NumericType) -> CompileResult<BasicValueEnum<'ctx>> {
        if !ty.is_bool() {
            return Ok(value);
        }
        let byte = value.into_int_value();
        let zero = byte.get_type().const_zero();
        Ok(self
            .builder
            .build_int_compare(IntPredicate::NE, byte, zero, "tobool")?
            .into())
    }

    fn pack_abi(&self, value: BasicValueEnum<'ctx>, ty: NumericType) -> CompileResult<BasicValueEnum<'ctx>> {
        if !ty.is_bool() {
            return Ok(value);
        }
        Ok(self
            .builder
            .build_int_z_extend(value.into_int_value(), self.context.i8_type(), "frombool")?
            .into())
    }

    fn lower(&self, expr: &Expr<'_>) -> CompileResult<BasicValueEnum<'ctx>> {
        let ty = self.types.of(expr);
        match &expr.kind {
            ExprKind::Int(v) => Ok(self.int_type(ty).const_int(*v as u64, true).into()),
            ExprKind::Float(v) => Ok(self.float_type(ty).const_float(*v).into()),
            ExprKind::Bool(v) => Ok(self.context.bool_type().const_int(*v as u64, false).into()),
            ExprKind::Param(name) => self
                .scope
                .get(*name)
                .map(|(value, _)| *value)
                .ok_or_else(|| CompileError::UnknownName { name: name.to_string() }),
            ExprKind::Unary(op, operand) => {
                let value = self.lower_as(operand, ty)?;
                match op {
                    UnaryOp::Plus => Ok(value),
                    UnaryOp::Neg if ty.is_float() => {
                        Ok(self.builder.build_float_neg(value.into_float_value(), "neg")?.into())
                    }
                    UnaryOp::Neg => Ok(self.builder.build_int_neg(value.into_int_value(), "neg")?.into()),
                }
            }
            ExprKind::Binary(op, lhs, rhs) => {
                // Operands are brought to the result type first; for `/` that is
                // the floating type true division produces.
                let lhs = self.lower_as(lhs, ty)?;
                let rhs = self.lower_as(rhs, ty)?;
                if ty.is_float() {
                    self.float_binary(*op, lhs.into_float_value(), rhs.into_float_value(), ty)
                } else {
                    self.int_binary(*op, lhs.into_int_value(), rhs.into_int_value(), ty)
                }
            }
            ExprKind::Compare(op, lhs, rhs) => {
                let common = super::typing::unify(self.types.of(lhs), self.types.of(rhs));
                let lhs = self.lower_as(lhs, common)?;
                let rhs = self.lower_as(rhs, common)?;
                Ok(self.compare(*op, lhs, rhs, common)?.into())
            }
            ExprKind::Call(builtin, args) => self.call_builtin(*builtin, args, ty),
            ExprKind::Cast(target, operand) => {
                let value = self.lower(operand)?;
                self.cast(value, self.types.of(operand), *target)
            }
        }
    }

    /// Lower `expr` and convert it to `ty`.
    fn lower_as(&self, expr: &Expr<'_>, ty: NumericType) -> CompileResult<BasicValueEnum<'ctx>> {
        let value = self.lower(expr)?;
        self.cast(value, self.types.of(expr), ty)
    }

    fn cast(
        &self,
        value: BasicValueEnum<'ctx>,
        from: NumericType,
        to: NumericType,
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        if from == to {
            return Ok(value);
        }
        let b = &self.builder;

        if to.is_bool() {
            let truth = if from.is_float() {
                let v = value.into_float_value();
                b.build_float_compare(FloatPredicate::UNE, v, v.get_type().const_zero(), "tobool")?
            } else {
                let v = value.into_int_value();
                b.build_int_compare(IntPredicate::NE, v, v.get_type().const_zero(), "tobool")?
            };
            return Ok(truth.into());
        }

        let converted: BasicValueEnum<'ctx> = match (from.is_float(), to.is_float()) {
            (false, false) => {
                let v = value.into_int_value();
                let target = self.int_type(to);
                if from.bits() == to.bits() {
                    v.into()
                } else if from.bits() > to.bits() {
                    b.build_int_truncate(v, target, "trunc")?.into()
                } else if from.is_signed() {
                    b.build_int_s_extend(v, target, "sext")?.into()
                } else {
                    b.build_int_z_extend(v, target, "zext")?.into()
                }
            }
            (false, true) => {
                let v = value.into_int_value();
                let target = self.float_type(to);
                if from.is_signed() {
                    b.build_signed_int_to_float(v, target, "sitofp")?.into()
                } else {
                    b.build_unsigned_int_to_float(v, target, "uitofp")?.into()
                }
            }
            (true, false) => {
                let v = value.into_float_value();
                let target = self.int_type(to);
                if to.is_signed() {
                    b.build_float_to_signed_int(v, target, "fptosi")?.into()
                } else {
                    b.build_float_to_unsigned_int(v, target, "fptoui")?.into()
                }
            }
            (true, true) => {
                let v = value.into_float_value();
                let target = self.float_type(to);
                if from.bits() < to.bits() {
                    b.build_float_ext(v, target, "fpext")?.into()
                } else {
                    b.build_float_trunc(v, target, "fptrunc")?.into()
                }
            }
        };
        Ok(converted)
    }

    fn int_binary(
        &self,
        op: BinaryOp,
        lhs: IntValue<'ctx>,
        rhs: IntValue<'ctx>,
        ty: NumericType,
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        let b = &self.builder;
        let value = match op {
            BinaryOp::Add => b.build_int_add(lhs, rhs, "add")?,
            BinaryOp::Sub => b.build_int_sub(lhs, rhs, "sub")?,
            BinaryOp::Mul => b.build_int_mul(lhs, rhs, "mul")?,
            BinaryOp::FloorDiv | BinaryOp::Div => self.int_floor_div(lhs, rhs, ty)?,
            BinaryOp::Mod => self.int_floor_mod(lhs, rhs, ty)?,
        };
        Ok(value.into())
    }

    /// Divisor that cannot trap: 0 and, for signed types, -1 are replaced by 1.
    fn safe_divisor(&self, rhs: IntValue<'ctx>, ty: NumericType) -> CompileResult<(IntValue<'ctx>, IntValue<'ctx>)> {
        let b = &self.builder;
        let int_ty = rhs.get_type();
        let one = int_ty.const_int(1, false);
        let is_zero = b.build_int_compare(IntPredicate::EQ, rhs, int_ty.const_zero(), "divzero")?;
        let trap = if ty.is_signed() {
            let is_neg_one = b.build_int_compare(IntPredicate::EQ, rhs, int_ty.const_all_ones(), "divnegone")?;
            b.build_or(is_zero, is_neg_one, "divtrap")?
        } else {
            is_zero
        };
        let divisor = b.build_select(trap, one, rhs, "divisor")?.into_int_value();
        Ok((divisor, is_zero))
    }

    /// Whether a remainder must be shifted to take the divisor's sign.
    fn needs_floor_adjust(&self, rem: IntValue<'ctx>, divisor: IntValue<'ctx>) -> CompileResult<IntValue<'ctx>> {
        let b = &self.builder;
        let zero = rem.get_type().const_zero();
        let nonzero = b.build_int_compare(IntPredicate::NE, rem, zero, "remnz")?;
        let signs = b.build_xor(rem, divisor, "signs")?;
        let differ = b.build_int_compare(IntPredicate::SLT, signs, zero, "signdiff")?;
        Ok(b.build_and(nonzero, differ, "adjust")?)
    }

    fn int_floor_div(&self, lhs: IntValue<'ctx>, rhs: IntValue<'ctx>, ty: NumericType) -> CompileResult<IntValue<'ctx>> {
        let b = &self.builder;
        let zero = lhs.get_type().const_zero();
        let (divisor, is_zero) = self.safe_divisor(rhs, ty)?;

        let quotient = if ty.is_signed() {
            let q = b.build_int_signed_div(lhs, divisor, "quot")?;
            let r = b.build_int_signed_rem(lhs, divisor, "rem")?;
            let adjust = self.needs_floor_adjust(r, divisor)?;
            let one = lhs.get_type().const_int(1, false);
            let floored = b.build_int_sub(q, one, "floored")?;
            let q = b.build_select(adjust, floored, q, "floordiv")?.into_int_value();

            // x // -1 wraps like negation.
            let is_neg_one =
                b.build_int_compare(IntPredicate::EQ, rhs, rhs.get_type().const_all_ones(), "isnegone")?;
            let negated = b.build_int_neg(lhs, "negated")?;
            b.build_select(is_neg_one, negated, q, "floordiv")?.into_int_value()
        } else {
            b.build_int_unsigned_div(lhs, divisor, "quot")?
        };

        Ok(b.build_select(is_zero, zero, quotient, "floordiv")?.into_int_value())
    }

    fn int_floor_mod(&self, lhs: IntValue<'ctx>, rhs: IntValue<'ctx>, ty: NumericType) -> CompileResult<IntValue<'ctx>> {
        let b = &self.builder;
        let zero = lhs.get_type().const_zero();
        let (divisor, is_zero) = self.safe_divisor(rhs, ty)?;

        let rem = if ty.is_signed() {
            let r = b.build_int_signed_rem(lhs, divisor, "rem")?;
            let adjust = self.needs_floor_adjust(r, divisor)?;
            let shifted = b.build_int_add(r, divisor, "shifted")?;
            b.build_select(adjust, shifted, r, "mod")?.into_int_value()
        } else {
            b.build_int_unsigned_rem(lhs, divisor, "rem")?
        };

        Ok(b.build_select(is_zero, zero, rem, "mod")?.into_int_value())
    }

    fn float_binary(
        &self,
        op: BinaryOp,
        lhs: FloatValue<'ctx>,
        rhs: FloatValue<'ctx>,
        ty: NumericType,
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        let b = &self.builder;
        let value = match op {
            BinaryOp::Add => b.build_float_add(lhs, rhs, "fadd")?,
            BinaryOp::Sub => b.build_float_sub(lhs, rhs, "fsub")?,
            BinaryOp::Mul => b.build_float_mul(lhs, rhs, "fmul")?,
            BinaryOp::Div => b.build_float_div(lhs, rhs, "fdiv")?,
            BinaryOp::FloorDiv => {
                let q = b.build_float_div(lhs, rhs, "fdiv")?;
                self.call_intrinsic("floor", ty, q)?
            }
            BinaryOp::Mod => {
                let zero = lhs.get_type().const_zero();
                let r = b.build_float_rem(lhs, rhs, "frem")?;
                let nonzero = b.build_float_compare(FloatPredicate::ONE, r, zero, "remnz")?;
                let r_neg = b.build_float_compare(FloatPredicate::OLT, r, zero, "remneg")?;
                let d_neg = b.build_float_compare(FloatPredicate::OLT, rhs, zero, "divneg")?;
                let differ = b.build_xor(r_neg, d_neg, "signdiff")?;
                let adjust = b.build_and(nonzero, differ, "adjust")?;
                let shifted = b.build_float_add(r, rhs, "shifted")?;
                b.build_select(adjust, shifted, r, "fmod")?.into_float_value()
            }
        };
        Ok(value.into())
    }

    fn compare(
        &self,
        op: CmpOp,
        lhs: BasicValueEnum<'ctx>,
        rhs: BasicValueEnum<'ctx>,
        ty: NumericType,
    ) -> CompileResult<IntValue<'ctx>> {
        if ty.is_float() {
            let predicate = match op {
                CmpOp::Eq => FloatPredicate::OEQ,
                CmpOp::Ne => FloatPredicate::UNE,
                CmpOp::Lt => FloatPredicate::OLT,
                CmpOp::Le => FloatPredicate::OLE,
                CmpOp::Gt => FloatPredicate::OGT,
                CmpOp::Ge => FloatPredicate::OGE,
            };
            return Ok(self.builder.build_float_compare(
                predicate,
                lhs.into_float_value(),
                rhs.into_float_value(),
                "fcmp",
            )?);
        }

        let signed = ty.is_signed();
        let predicate = match op {
            CmpOp::Eq => IntPredicate::EQ,
            CmpOp::Ne => IntPredicate::NE,
            CmpOp::Lt if signed => IntPredicate::SLT,
            CmpOp::Lt => IntPredicate::ULT,
            CmpOp::Le if signed => IntPredicate::SLE,
            CmpOp::Le => IntPredicate::ULE,
            CmpOp::Gt if signed => IntPredicate::SGT,
            CmpOp::Gt => IntPredicate::UGT,
            CmpOp::Ge if signed => IntPredicate::SGE,
            CmpOp::Ge => IntPredicate::UGE,
        };
        Ok(self
            .builder
            .build_int_compare(predicate, lhs.into_int_value(), rhs.into_int_value(), "icmp")?)
    }

    fn call_builtin(
        &self,
        builtin: Builtin,
        args: &[&Expr<'_>],
        ty: NumericType,
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        let b = &self.builder;
        match builtin {
            Builtin::Abs => {
                let value = self.lower_as(args[0], ty)?;
                if ty.is_float() {
                    return Ok(self.call_intrinsic("fabs", ty, value.into_float_value())?.into());
                }
                if !ty.is_signed() {
                    return Ok(value);
                }
                let v = value.into_int_value();
                let negative = b.build_int_compare(IntPredicate::SLT, v, v.get_type().const_zero(), "isneg")?;
                let negated = b.build_int_neg(v, "negated")?;
                Ok(b.build_select(negative, negated, v, "abs")?)
            }
            Builtin::Min | Builtin::Max => {
                let first = self.lower_as(args[0], ty)?;
                let second = self.lower_as(args[1], ty)?;
                // The second operand wins only on a strict comparison, so ties
                // and NaNs keep the first.
                let op = if builtin == Builtin::Min { CmpOp::Lt } else { CmpOp::Gt };
                let second_wins = self.compare(op, second, first, ty)?;
                Ok(b.build_select(second_wins, second, first, builtin.name())?)
            }
            Builtin::Sqrt | Builtin::Exp | Builtin::Log | Builtin::Floor => {
                let value = self.lower_as(args[0], ty)?.into_float_value();
                Ok(self.call_intrinsic(builtin.name(), ty, value)?.into())
            }
            Builtin::Where => {
                let cond = self.lower_as(args[0], NumericType::Bool)?.into_int_value();
                let then = self.lower_as(args[1], ty)?;
                let otherwise = self.lower_as(args[2], ty)?;
                Ok(b.build_select(cond, then, otherwise, "where")?)
            }
        }
    }

    /// Call the unary float intrinsic `llvm.<name>.f32|f64`, declaring it if needed.
    fn call_intrinsic(&self, name: &str, ty: NumericType, arg: FloatValue<'ctx>) -> CompileResult<FloatValue<'ctx>> {
        let suffix = if ty == NumericType::Float32 { "f32" } else { "f64" };
        let symbol = format!("llvm.{}.{}", name, suffix);
        let function = match self.module.get_function(&symbol) {
            Some(function) => function,
            None => {
                let float_ty = arg.get_type();
                self.module
                    .add_function(&symbol, float_ty.fn_type(&[float_ty.into()], false), None)
            }
        };

        let call = self.builder.build_call(function, &[arg.into()], name)?;
        call.try_as_basic_value()
            .left()
            .map(|value| value.into_float_value())
            .ok_or_else(|| CompileError::Llvm {
                reason: format!("{} returned no value", symbol),
            })
    }
}
