//! Literal constants.
//!
//! Integers fit in the 4-byte immediate and load with `Ldc_i32`; their type
//! narrows to `byte` below 256, but arithmetic between two narrowed literals
//! is done on `int`. Floats and strings go to the literal pool.

use ordered_float::OrderedFloat;
use zlang_ast::{LiteralExpr, LiteralKind};
use zlang_core::CompilationError;
use zlang_registry::primitives;

use crate::emit::{EmitResult, FunctionEmitter, Value};
use crate::ir::{Immediate, OpCode};

pub(super) fn compile_literal(fe: &mut FunctionEmitter<'_>, literal: &LiteralExpr<'_>) -> EmitResult<Value> {
    let (ty, opcode, immediate) = match literal.kind {
        LiteralKind::Int(value) => {
            let small = i32::try_from(value).map_err(|_| {
                CompilationError::invalid(format!("integer literal {value} does not fit in 32 bits"), literal.span)
            })?;
            (fe.registry.literal_type(value), OpCode::LdcI32, Some(Immediate::Int(small)))
        }
        LiteralKind::Float(value) => (
            primitives::FLOAT,
            OpCode::LdcF64,
            Some(Immediate::Float(OrderedFloat(value))),
        ),
        LiteralKind::Bool(true) => (primitives::BOOL, OpCode::LdcI32, Some(Immediate::Int(1))),
        LiteralKind::Bool(false) => (primitives::BOOL, OpCode::LdcZero, None),
        LiteralKind::Char(c) => (primitives::BYTE, OpCode::LdcI32, Some(Immediate::Int(i32::from(c)))),
        LiteralKind::Str(s) => (primitives::STRING, OpCode::LdcStr, Some(Immediate::Str(s.to_string()))),
        LiteralKind::Nil => (primitives::NIL, OpCode::LdcZero, None),
        LiteralKind::NullPtr => (primitives::RUNTIME_PTR, OpCode::LdcZero, None),
    };
    let target = fe.acquire()?;
    fe.push(opcode, &[target], immediate);
    Ok(Value {
        narrowed: matches!(literal.kind, LiteralKind::Int(_)) && ty == primitives::BYTE,
        ..Value::temporary(target, ty)
    })
}
