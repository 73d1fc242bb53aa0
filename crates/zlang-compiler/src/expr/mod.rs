//! Expression lowering.
//!
//! Every expression evaluates into a register and reports its type as a
//! [`Value`]. Sub-expressions are evaluated left to right; operand
//! temporaries are released before the result register is acquired, so a
//! chain of `n` nested operators keeps at most `n + 1` volatile registers
//! live.
//!
//! ## Modules
//!
//! - `literals`: constants
//! - `identifiers`: names and `self`
//! - `operators`: binary, unary, casts and `is`
//! - `calls`: functions, methods, interface methods and built-ins
//! - `member`: field and element access
//! - `create`: struct, union, array and list creation
//! - `branching`: ternaries, block expressions and union switches

mod branching;
mod calls;
mod create;
mod identifiers;
mod literals;
mod member;
mod operators;

use zlang_ast::Expr;
use zlang_core::CompilationError;

use crate::emit::{EmitResult, FunctionEmitter, Value};

pub(crate) use calls::{Invocation, invoke};
pub(crate) use member::{access_field, element_access, list_array, union_tag};

/// Evaluate an expression that must produce a value.
pub(crate) fn compile_expr(fe: &mut FunctionEmitter<'_>, expr: &Expr<'_>) -> EmitResult<Value> {
    compile_maybe_void(fe, expr)?.ok_or_else(|| {
        CompilationError::type_mismatch("expression does not produce a value", expr.span()).into()
    })
}

/// Evaluate an expression for its side effects and drop the result.
pub(crate) fn compile_effect(fe: &mut FunctionEmitter<'_>, expr: &Expr<'_>) -> EmitResult<()> {
    if let Some(value) = compile_maybe_void(fe, expr)? {
        fe.release(value);
    }
    Ok(())
}

fn compile_maybe_void(fe: &mut FunctionEmitter<'_>, expr: &Expr<'_>) -> EmitResult<Option<Value>> {
    let value = match expr {
        Expr::Literal(e) => literals::compile_literal(fe, e)?,
        Expr::Ident(e) => identifiers::compile_ident(fe, e)?,
        Expr::SelfRef(span) => identifiers::compile_self(fe, *span)?,
        Expr::Binary(e) => operators::compile_binary(fe, e)?,
        Expr::Unary(e) => operators::compile_unary(fe, e)?,
        Expr::Cast(e) => operators::compile_cast(fe, e)?,
        Expr::Is(e) => operators::compile_is(fe, e)?,
        Expr::Ternary(e) => branching::compile_ternary(fe, e)?,
        Expr::Call(e) => return calls::compile_call(fe, e),
        Expr::MethodCall(e) => return calls::compile_method_call(fe, e),
        Expr::Field(e) => member::compile_field(fe, e)?,
        Expr::Index(e) => member::compile_index(fe, e)?,
        Expr::New(e) => create::compile_new(fe, e)?,
        Expr::NewArray(e) => create::compile_new_array(fe, e)?,
        Expr::NewList(e) => create::compile_new_list(fe, e)?,
        Expr::Block(e) => branching::compile_block_expr(fe, e)?,
        Expr::Switch(e) => branching::compile_switch(fe, e)?,
    };
    Ok(Some(value))
}
