//! Local variable declarations.

use zlang_ast::VarDecl;
use zlang_core::{CompilationError, InternalError};
use zlang_registry::primitives;

use crate::expr::compile_expr;
use crate::emit::{EmitResult, FunctionEmitter};
use crate::ir::OpCode;

/// `var x: T = init` / `let x = init`.
///
/// The initializer is evaluated before the name comes into scope, so it
/// still sees an outer binding of the same name.
pub(super) fn compile_var(fe: &mut FunctionEmitter<'_>, decl: &VarDecl<'_>) -> EmitResult<()> {
    // Locals that failed to register were reported during extraction.
    let Some(local) = fe
        .registry
        .scope(fe.scope)
        .get(decl.name.name)
        .filter(|l| fe.is_pending(*l))
    else {
        return Ok(());
    };
    let slot = fe.slot(local)?;

    let value = decl.init.map(|init| compile_expr(fe, init)).transpose()?;
    let ty = match (fe.registry.symbol(local).ty, value) {
        (Some(ty), Some(value)) => {
            fe.expect_assignable(ty, value.ty, decl.span, || format!("cannot initialize '{}'", decl.name))?;
            ty
        }
        (Some(ty), None) => ty,
        (None, Some(value)) if value.ty == primitives::NIL => {
            return Err(CompilationError::type_mismatch(
                format!("cannot infer the type of '{}' from 'nil'", decl.name),
                decl.name.span,
            )
            .into());
        }
        (None, Some(value)) => {
            fe.registry.infer_type(local, value.ty)?;
            value.ty
        }
        (None, None) => {
            return Err(InternalError::Invariant(format!("local '{}' has neither type nor initializer", decl.name)).into());
        }
    };

    let is_ref = fe.is_ref(ty);
    // A declaration inside a loop overwrites the previous iteration's value.
    if is_ref && fe.loop_depth > 0 {
        fe.push(OpCode::RemoveRef, &[slot], None);
    }
    match value {
        Some(value) => {
            fe.mov(slot, value.register);
            fe.release(value);
            if is_ref {
                fe.push(OpCode::AddRef, &[slot], None);
            }
        }
        None => {
            fe.push(OpCode::LdcZero, &[slot], None);
        }
    }
    fe.declare(local);
    Ok(())
}
