//! Operators, casts and type tests.

use zlang_ast::{BinaryExpr, BinaryOp, CastExpr, IsExpr, UnaryExpr, UnaryOp};
use zlang_core::CompilationError;
use zlang_registry::{RegisterType, TypeId, primitives};

use super::compile_expr;
use crate::emit::{EmitResult, FunctionEmitter, Value};
use crate::ir::{Immediate, OpCode};

fn arithmetic(op: BinaryOp, rt: RegisterType) -> Option<OpCode> {
    match op {
        BinaryOp::Add => OpCode::add(rt),
        BinaryOp::Sub => OpCode::sub(rt),
        BinaryOp::Mul => OpCode::mul(rt),
        BinaryOp::Div => OpCode::div(rt),
        BinaryOp::Mod => OpCode::rem(rt),
        BinaryOp::BitAnd => OpCode::band(rt),
        BinaryOp::BitOr => OpCode::bor(rt),
        BinaryOp::BitXor => OpCode::xor(rt),
        BinaryOp::Shl => OpCode::shl(rt),
        BinaryOp::Shr => OpCode::shr(rt),
        BinaryOp::Eq => OpCode::eq(rt),
        BinaryOp::Ne => OpCode::ne(rt),
        BinaryOp::Lt => OpCode::lt(rt),
        BinaryOp::Le => OpCode::le(rt),
        BinaryOp::Gt => OpCode::gt(rt),
        BinaryOp::Ge => OpCode::ge(rt),
        BinaryOp::And => Some(OpCode::And),
        BinaryOp::Or => Some(OpCode::Or),
    }
}

/// Types arithmetic is defined on; `string` only supports `+`.
fn is_numeric(ty: TypeId) -> bool {
    matches!(ty, primitives::INT | primitives::BYTE | primitives::FLOAT)
}

pub(super) fn compile_binary(fe: &mut FunctionEmitter<'_>, expr: &BinaryExpr<'_>) -> EmitResult<Value> {
    let left = compile_expr(fe, expr.left)?;
    let right = compile_expr(fe, expr.right)?;
    let mismatch = |fe: &FunctionEmitter<'_>| -> CompilationError {
        CompilationError::type_mismatch(
            format!(
                "operator '{}' is not defined for '{}' and '{}'",
                expr.op,
                fe.type_name(left.ty),
                fe.type_name(right.ty)
            ),
            expr.span,
        )
    };

    let (operand, result) = if expr.op.is_logical() {
        if left.ty != primitives::BOOL || right.ty != primitives::BOOL {
            return Err(mismatch(fe).into());
        }
        (primitives::BOOL, primitives::BOOL)
    } else if expr.op.is_relational() {
        if !fe.registry.is_comparable(left.ty, right.ty) {
            return Err(mismatch(fe).into());
        }
        // `nil` compares as the other operand's type.
        let operand = fe.registry.promote(left.ty, right.ty).unwrap_or(if left.ty == primitives::NIL {
            right.ty
        } else {
            left.ty
        });
        (operand, primitives::BOOL)
    } else {
        let Some(mut operand) = fe.registry.promote(left.ty, right.ty) else {
            return Err(mismatch(fe).into());
        };
        if left.narrowed && right.narrowed {
            operand = primitives::INT;
        }
        let allowed = match operand {
            primitives::FLOAT => !expr.op.is_bitwise(),
            primitives::STRING => expr.op == BinaryOp::Add,
            _ => is_numeric(operand),
        };
        if !allowed {
            return Err(mismatch(fe).into());
        }
        (operand, operand)
    };

    let opcode = arithmetic(expr.op, fe.register_type(operand)).ok_or_else(|| mismatch(fe))?;
    let target = fe.target_for(&[left, right])?;
    fe.push(opcode, &[target, left.register, right.register], None);
    Ok(Value::temporary(target, result))
}

/// `-x` is `0 - x`; `not x` is `x == 0`.
pub(super) fn compile_unary(fe: &mut FunctionEmitter<'_>, expr: &UnaryExpr<'_>) -> EmitResult<Value> {
    let operand = compile_expr(fe, expr.operand)?;
    let (opcode, result) = match expr.op {
        UnaryOp::Neg => match operand.ty {
            // Negative bytes do not exist; the result widens.
            primitives::INT | primitives::BYTE => (OpCode::SubI32, primitives::INT),
            primitives::FLOAT => (OpCode::SubF64, primitives::FLOAT),
            _ => return Err(unary_mismatch(fe, expr, operand.ty).into()),
        },
        UnaryOp::Not => match operand.ty {
            primitives::BOOL => (OpCode::EqI32, primitives::BOOL),
            _ => return Err(unary_mismatch(fe, expr, operand.ty).into()),
        },
    };

    let zero = fe.acquire()?;
    fe.push(OpCode::LdcZero, &[zero], None);
    let zero = Value::temporary(zero, operand.ty);
    let target = fe.target_for(&[operand, zero])?;
    match expr.op {
        UnaryOp::Neg => fe.push(opcode, &[target, zero.register, operand.register], None),
        UnaryOp::Not => fe.push(opcode, &[target, operand.register, zero.register], None),
    };
    Ok(Value::temporary(target, result))
}

fn unary_mismatch(fe: &FunctionEmitter<'_>, expr: &UnaryExpr<'_>, ty: TypeId) -> CompilationError {
    CompilationError::type_mismatch(
        format!("operator '{}' is not defined for '{}'", expr.op, fe.type_name(ty)),
        expr.span,
    )
}

/// `x as T`.
///
/// Widening and reference-compatible casts only retype the value. Scalars
/// and strings convert into each other with `Conv`, selected by the source
/// register type and carrying the target register type as immediate.
pub(super) fn compile_cast(fe: &mut FunctionEmitter<'_>, expr: &CastExpr<'_>) -> EmitResult<Value> {
    let value = compile_expr(fe, expr.expr)?;
    let target_ty = fe.resolve_type(&expr.ty)?;
    if fe.registry.is_assignable(target_ty, value.ty) {
        return Ok(Value {
            ty: target_ty,
            narrowed: false,
            ..value
        });
    }

    let convertible = |rt: RegisterType| {
        matches!(
            rt,
            RegisterType::Int32 | RegisterType::Float64 | RegisterType::Unsigned8 | RegisterType::String
        )
    };
    let source_rt = fe.register_type(value.ty);
    let target_rt = fe.register_type(target_ty);
    if !convertible(source_rt) || !convertible(target_rt) {
        return Err(CompilationError::type_mismatch(
            format!("cannot cast '{}' to '{}'", fe.type_name(value.ty), fe.type_name(target_ty)),
            expr.span,
        )
        .into());
    }
    let conv = fe.select(OpCode::conv(source_rt), expr.span, || "no conversion".to_string())?;
    let target = fe.target_for(&[value])?;
    fe.push(
        conv,
        &[target, value.register],
        Some(Immediate::Int(i32::from(u8::from(target_rt)))),
    );
    Ok(Value::temporary(target, target_ty))
}

/// `x is T`: a runtime check against a struct, union or list record.
pub(super) fn compile_is(fe: &mut FunctionEmitter<'_>, expr: &IsExpr<'_>) -> EmitResult<Value> {
    let value = compile_expr(fe, expr.expr)?;
    let tested = fe.resolve_type(&expr.ty)?;
    let def = fe.registry.ty(tested);
    if !fe.is_ref(value.ty) || def.record_kind().is_none() || def.is_interface() {
        return Err(CompilationError::type_mismatch(
            format!(
                "cannot test '{}' against '{}'",
                fe.type_name(value.ty),
                fe.type_name(tested)
            ),
            expr.span,
        )
        .into());
    }
    let target = fe.target_for(&[value])?;
    fe.push(OpCode::TypeChk, &[target, value.register], Some(Immediate::Type(tested)));
    Ok(Value::temporary(target, primitives::BOOL))
}

#[cfg(test)]
mod tests {
    use bumpalo::Bump;
    use zlang_ast::{AstBuilder, BinaryOp, UnaryOp};

    use crate::emit::test_support::emit;

    #[test]
    fn arithmetic_reuses_operand_registers() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        // n = 2 * 10 / 2 - 5 + 1
        let expr = b.binary(
            b.binary(
                b.binary(
                    b.binary(b.int(2), BinaryOp::Mul, b.int(10)),
                    BinaryOp::Div,
                    b.int(2),
                ),
                BinaryOp::Sub,
                b.int(5),
            ),
            BinaryOp::Add,
            b.int(1),
        );
        let global = b.global_var("n", Some(b.named("int")), None);
        let main = b.function("main", &[], None, b.block(&[b.assign(b.name("n"), expr)]));
        let emitted = emit(&[b.module("main", &[], &[global, main])]);

        assert!(emitted.errors.is_empty(), "{:?}", emitted.errors);
        assert_eq!(
            emitted.listing("main"),
            vec![
                "Ldc_i32 r1, 2",
                "Ldc_i32 r2, 10",
                "Mul_i32 r1, r1, r2",
                "Ldc_i32 r2, 2",
                "Div_i32 r1, r1, r2",
                "Ldc_i32 r2, 5",
                "Sub_i32 r1, r1, r2",
                "Ldc_i32 r2, 1",
                "Add_i32 r1, r1, r2",
                "StGlb_i32 r1, 0",
                "Collect",
                "Halt",
            ]
        );
    }

    #[test]
    fn small_literals_combine_as_int_but_byte_operands_stay_byte() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let body = b.block(&[
            b.expr_stmt(b.binary(b.int(20), BinaryOp::Mul, b.int(20))),
            b.expr_stmt(b.binary(b.name("x"), BinaryOp::Mul, b.int(20))),
            b.expr_stmt(b.binary(b.cast(b.int(5), b.named("byte")), BinaryOp::Sub, b.int(10))),
        ]);
        let f = b.function("f", &[b.param("x", b.named("byte"))], None, body);
        let main = b.function("main", &[], None, b.block(&[]));
        let emitted = emit(&[b.module("main", &[], &[f, main])]);

        assert!(emitted.errors.is_empty(), "{:?}", emitted.errors);
        let listing = emitted.listing("f");
        assert_eq!(listing[2], "Mul_i32 r2, r2, r3");
        assert_eq!(listing[4], "Mul_u8 r2, r1, r2");
        assert_eq!(listing[7], "Sub_u8 r2, r2, r3");
    }

    #[test]
    fn mixed_int_and_byte_promote_to_int() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let f = b.function(
            "f",
            &[b.param("x", b.named("int"))],
            Some(b.named("bool")),
            b.block(&[b.ret(Some(b.binary(b.name("x"), BinaryOp::Ge, b.int(4))))]),
        );
        let main = b.function("main", &[], None, b.block(&[]));
        let emitted = emit(&[b.module("main", &[], &[f, main])]);

        assert!(emitted.errors.is_empty(), "{:?}", emitted.errors);
        assert_eq!(emitted.listing("f")[1], "Ge_i32 r2, r1, r2");
    }

    #[test]
    fn negation_and_not_compare_with_zero() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let body = b.block(&[
            b.expr_stmt(b.unary(UnaryOp::Neg, b.name("x"))),
            b.expr_stmt(b.unary(UnaryOp::Not, b.name("flag"))),
        ]);
        let f = b.function(
            "f",
            &[b.param("x", b.named("float")), b.param("flag", b.named("bool"))],
            None,
            body,
        );
        let main = b.function("main", &[], None, b.block(&[]));
        let emitted = emit(&[b.module("main", &[], &[f, main])]);

        assert!(emitted.errors.is_empty(), "{:?}", emitted.errors);
        assert_eq!(
            &emitted.listing("f")[..4],
            &["Ldc_zero r3", "Sub_f64 r3, r3, r1", "Ldc_zero r3", "Eq_i32 r3, r2, r3"]
        );
    }

    #[test]
    fn mismatched_operands_are_rejected() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let body = b.block(&[
            b.expr_stmt(b.binary(b.int(1), BinaryOp::Add, b.float(1.0))),
            b.expr_stmt(b.binary(b.string("a"), BinaryOp::Sub, b.string("b"))),
            b.expr_stmt(b.binary(b.int(1), BinaryOp::And, b.bool(true))),
            b.expr_stmt(b.binary(b.float(1.0), BinaryOp::BitAnd, b.float(2.0))),
        ]);
        let main = b.function("main", &[], None, body);
        let emitted = emit(&[b.module("main", &[], &[main])]);

        assert_eq!(emitted.errors.len(), 4, "{:?}", emitted.errors);
        assert!(emitted.errors[1].to_string().contains("operator '-' is not defined for 'string'"));
    }

    #[test]
    fn string_concatenation_and_casts() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let body = b.block(&[
            b.expr_stmt(b.binary(b.string("a"), BinaryOp::Add, b.string("b"))),
            b.expr_stmt(b.cast(b.name("x"), b.named("float"))),
            b.expr_stmt(b.cast(b.name("x"), b.named("string"))),
            b.expr_stmt(b.cast(b.name("x"), b.named("int"))),
        ]);
        let f = b.function("f", &[b.param("x", b.named("int"))], None, body);
        let main = b.function("main", &[], None, b.block(&[]));
        let emitted = emit(&[b.module("main", &[], &[f, main])]);

        assert!(emitted.errors.is_empty(), "{:?}", emitted.errors);
        let listing = emitted.listing("f");
        assert_eq!(listing[2], "Add_str r2, r2, r3");
        assert_eq!(listing[3], "Conv_i32 r2, r1, 2");
        assert_eq!(listing[4], "Conv_i32 r2, r1, 4");
        // A cast to the same type emits nothing.
        assert_eq!(listing[5], "Collect");
    }

    #[test]
    fn type_test_uses_the_type_record() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let point = b.struct_decl("Point", &[b.param("x", b.named("int"))], &[]);
        let f = b.function(
            "f",
            &[b.param("o", b.named("object"))],
            Some(b.named("bool")),
            b.block(&[b.ret(Some(b.is(b.name("o"), b.named("Point"))))]),
        );
        let main = b.function("main", &[], None, b.block(&[]));
        let emitted = emit(&[b.module("main", &[], &[point, f, main])]);

        assert!(emitted.errors.is_empty(), "{:?}", emitted.errors);
        assert!(emitted.listing("f")[1].starts_with("TypeChk r2, r1, type_"));
    }
}
