//! Names and `self`.

use zlang_ast::Ident;
use zlang_core::{CompilationError, Span};
use zlang_registry::SymbolKind;

use crate::emit::{EmitResult, FunctionEmitter, Value};
use crate::ir::{Immediate, OpCode};

/// Parameters and locals are read in place; module-level variables are
/// loaded. Another module's `var` may not be read, its `let` may.
pub(super) fn compile_ident(fe: &mut FunctionEmitter<'_>, ident: &Ident<'_>) -> EmitResult<Value> {
    let symbol = fe.resolve(ident.name, ident.span)?;
    let kind = &fe.registry.symbol(symbol).kind;
    if !matches!(kind, SymbolKind::Variable | SymbolKind::Constant) {
        return Err(CompilationError::type_mismatch(
            format!("'{}' is a {}, not a value", ident.name, kind.describe()),
            ident.span,
        )
        .into());
    }
    let mutable = matches!(kind, SymbolKind::Variable);
    let ty = fe.symbol_type(symbol, ident.span)?;

    if !fe.is_global(symbol) {
        return Ok(Value::fixed(fe.slot(symbol)?, ty));
    }

    let module = fe.registry.symbol_module(symbol);
    if mutable && fe.is_foreign(module) {
        return Err(CompilationError::ForeignAccessDenied {
            message: format!(
                "cannot read 'var {}' of module '{}'; only its constants are visible",
                ident.name,
                fe.module_name(module)
            ),
            span: ident.span,
        }
        .into());
    }
    let address = fe.registry.symbol(symbol).require_address()?;
    let rt = fe.register_type(ty);
    let load = fe.select(OpCode::ld_glb(rt), ident.span, || format!("'{}' has no storage", ident.name))?;
    let target = fe.acquire()?;
    fe.push(load, &[target], Some(Immediate::Int(address)));
    Ok(Value::temporary(target, ty))
}

pub(super) fn compile_self(fe: &mut FunctionEmitter<'_>, span: Span) -> EmitResult<Value> {
    fe.receiver()
        .map(|(register, ty)| Value::fixed(register, ty))
        .ok_or_else(|| CompilationError::invalid("'self' outside a method", span).into())
}
