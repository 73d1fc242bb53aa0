//! Branching statements, returns and expression statements.

use zlang_ast::{ExprStmt, IfStmt, PanicStmt, ReturnStmt, WhileStmt, YieldStmt};
use zlang_core::CompilationError;

use super::compile_block;
use crate::expr::{compile_effect, compile_expr};
use crate::emit::{EmitResult, FunctionEmitter, unify};
use crate::ir::{OpCode, Register};

pub(super) fn compile_expr_stmt(fe: &mut FunctionEmitter<'_>, stmt: &ExprStmt<'_>) -> EmitResult<()> {
    compile_effect(fe, stmt.expr)
}

/// ```text
///     <cond 1>
///     Br_zero c1, next1
///     <body 1>
///     Br exit
/// next1:
///     ...
///     <else body>
/// exit:
/// ```
pub(super) fn compile_if(fe: &mut FunctionEmitter<'_>, stmt: &IfStmt<'_>) -> EmitResult<()> {
    let exit = fe.new_label();
    for branch in stmt.branches {
        let cond = compile_expr(fe, branch.cond)?;
        fe.expect_condition(cond, branch.cond.span())?;
        let next = fe.new_label();
        fe.branch_if_zero(cond.register, next);
        fe.release(cond);

        compile_block(fe, &branch.body)?;
        fe.branch(exit);
        fe.mark_nop(next)?;
    }
    if let Some(otherwise) = &stmt.otherwise {
        compile_block(fe, otherwise)?;
    }
    fe.mark_nop(exit)?;
    Ok(())
}

pub(super) fn compile_while(fe: &mut FunctionEmitter<'_>, stmt: &WhileStmt<'_>) -> EmitResult<()> {
    let top = fe.new_label();
    let exit = fe.new_label();
    fe.mark(top)?;
    let cond = compile_expr(fe, stmt.cond)?;
    fe.expect_condition(cond, stmt.cond.span())?;
    fe.branch_if_zero(cond.register, exit);
    fe.release(cond);

    fe.in_loop(|fe| compile_block(fe, &stmt.body))?;
    fe.push(OpCode::Collect, &[], None);
    fe.branch(top);
    fe.mark_nop(exit)?;
    Ok(())
}

/// Store the value in register 0 and leave through the epilogue.
pub(super) fn compile_return(fe: &mut FunctionEmitter<'_>, stmt: &ReturnStmt<'_>) -> EmitResult<()> {
    match (stmt.value, fe.return_type()) {
        (Some(value), Some(ret)) => {
            let value = compile_expr(fe, value)?;
            let function = fe.function_name().to_string();
            fe.expect_assignable(ret, value.ty, stmt.span, || format!("'{function}' returns"))?;
            fe.mov(Register::RETURN, value.register);
            fe.release(value);
        }
        (None, None) => {}
        (Some(_), None) => {
            return Err(CompilationError::type_mismatch(
                format!("'{}' does not return a value", fe.function_name()),
                stmt.span,
            )
            .into());
        }
        (None, Some(ret)) => {
            return Err(CompilationError::type_mismatch(
                format!("'{}' must return a '{}'", fe.function_name(), fe.type_name(ret)),
                stmt.span,
            )
            .into());
        }
    }
    fe.branch_to_exit();
    Ok(())
}

/// Deliver a value to the innermost block expression.
pub(super) fn compile_yield(fe: &mut FunctionEmitter<'_>, stmt: &YieldStmt<'_>) -> EmitResult<()> {
    let Some(context) = fe.yields.current().copied() else {
        return Err(CompilationError::invalid("'yield' outside a block expression", stmt.span).into());
    };
    let value = compile_expr(fe, stmt.value)?;
    let Some(ty) = unify(fe.registry, context.ty, value.ty) else {
        return Err(CompilationError::type_mismatch(
            format!(
                "block yields '{}' here but '{}' before",
                fe.type_name(value.ty),
                context.ty.map(|t| fe.type_name(t)).unwrap_or_default()
            ),
            stmt.span,
        )
        .into());
    };
    if let Some(current) = fe.yields.current_mut() {
        current.ty = Some(ty);
    }
    fe.mov(context.target, value.register);
    fe.release(value);
    fe.branch(context.exit);
    Ok(())
}

pub(super) fn compile_panic(fe: &mut FunctionEmitter<'_>, stmt: &PanicStmt<'_>) -> EmitResult<()> {
    let value = compile_expr(fe, stmt.value)?;
    fe.push(OpCode::Panic, &[value.register], None);
    fe.release(value);
    Ok(())
}
