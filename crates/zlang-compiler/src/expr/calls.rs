//! Calls of functions, methods, interface methods and built-ins.
//!
//! Arguments go into a contiguous register range above every live
//! register, the receiver (if any) first:
//!
//! ```text
//!     Mov      a0, receiver
//!     <arg 1>  -> a1
//!     ...
//!     Call     result, a0, #function
//! ```
//!
//! The callee sees the range as its registers `1..`; its register 0 comes
//! back in `result`.

use zlang_ast::{CallExpr, Expr, MethodCallExpr};
use zlang_core::{CompilationError, Span};
use zlang_registry::{BuiltIn, SymbolId, SymbolKind, TypeId};

use super::compile_expr;
use crate::emit::{EmitResult, FunctionEmitter, Value};
use crate::ir::{Immediate, OpCode};

/// What a call site invokes.
#[derive(Debug, Clone)]
pub(crate) struct Invocation<'x> {
    opcode: OpCode,
    immediate: Immediate,
    name: &'x str,
    params: &'x [TypeId],
    ret: Option<TypeId>,
}

impl<'x> Invocation<'x> {
    pub fn builtin(builtin: BuiltIn, name: &'x str, params: &'x [TypeId], ret: Option<TypeId>) -> Self {
        Self {
            opcode: OpCode::Invoke,
            immediate: Immediate::BuiltIn(builtin),
            name,
            params,
            ret,
        }
    }

    fn function(opcode: OpCode, function: SymbolId, name: &'x str, params: &'x [TypeId], ret: Option<TypeId>) -> Self {
        Self {
            opcode,
            immediate: Immediate::Function(function),
            name,
            params,
            ret,
        }
    }

    fn check_arity(&self, found: usize, span: Span) -> EmitResult<()> {
        if self.params.len() == found {
            return Ok(());
        }
        Err(CompilationError::ArityMismatch {
            name: self.name.to_string(),
            expected: self.params.len(),
            found,
            span,
        }
        .into())
    }
}

/// Emit a call. Returns `None` for calls without a result.
///
/// The receiver is consumed; the arity must already match.
pub(crate) fn invoke(
    fe: &mut FunctionEmitter<'_>,
    invocation: Invocation<'_>,
    receiver: Option<Value>,
    args: &[Expr<'_>],
    span: Span,
) -> EmitResult<Option<Value>> {
    invocation.check_arity(args.len(), span)?;
    let offset = usize::from(receiver.is_some());
    let range = fe.acquire_range(args.len() + offset)?;

    if let Some(receiver) = receiver {
        fe.mov(range[0], receiver.register);
        fe.release(receiver);
    }
    for (i, (arg, param)) in args.iter().zip(invocation.params).enumerate() {
        let value = compile_expr(fe, arg)?;
        fe.expect_assignable(*param, value.ty, arg.span(), || {
            format!("argument {} of '{}'", i + 1, invocation.name)
        })?;
        fe.mov(range[i + offset], value.register);
        fe.release(value);
    }
    for register in &range {
        fe.release_register(*register);
    }

    let result = match invocation.ret {
        Some(_) => fe.acquire()?,
        None => crate::ir::Register::RETURN,
    };
    let first = range.first().copied().unwrap_or(result);
    fe.push(invocation.opcode, &[result, first], Some(invocation.immediate));
    Ok(invocation.ret.map(|ty| Value::temporary(result, ty)))
}

fn param_types(fe: &FunctionEmitter<'_>, function: SymbolId) -> Vec<TypeId> {
    fe.registry
        .callable(function)
        .map(|c| c.params.iter().filter_map(|p| fe.registry.symbol(*p).ty).collect())
        .unwrap_or_default()
}

/// `name(args)`
pub(super) fn compile_call(fe: &mut FunctionEmitter<'_>, expr: &CallExpr<'_>) -> EmitResult<Option<Value>> {
    let callee = fe.resolve(expr.callee.name, expr.callee.span)?;
    let symbol = fe.registry.symbol(callee);
    if !matches!(symbol.kind, SymbolKind::Function(_)) {
        return Err(CompilationError::type_mismatch(
            format!("'{}' is a {}, not a function", expr.callee.name, symbol.kind.describe()),
            expr.callee.span,
        )
        .into());
    }
    let ret = symbol.ty;
    let params = param_types(fe, callee);
    let invocation = Invocation::function(OpCode::Call, callee, expr.callee.name, &params, ret);
    invoke(fe, invocation, None, expr.args, expr.span)
}

/// `receiver.method(args)`
///
/// Built-in members of arrays, lists and strings take precedence; then
/// the receiver type's methods and the methods of its interfaces.
pub(super) fn compile_method_call(fe: &mut FunctionEmitter<'_>, expr: &MethodCallExpr<'_>) -> EmitResult<Option<Value>> {
    let mark = fe.position();
    let receiver = compile_expr(fe, expr.receiver)?;
    let method = expr.method.name;

    if let Some(builtin) = fe.registry.resolve_builtin(receiver.ty, method) {
        let signature = fe.registry.builtin_signature(builtin, receiver.ty);
        let invocation = Invocation::builtin(builtin, method, &signature.params, signature.ret);
        if let Err(err) = invocation.check_arity(expr.args.len(), expr.span) {
            fe.truncate(mark);
            return Err(err);
        }
        return invoke(fe, invocation, Some(receiver), expr.args, expr.span);
    }

    let Some(member) = fe.registry.resolve_member(receiver.ty, method) else {
        fe.truncate(mark);
        return Err(CompilationError::UnresolvedSymbol {
            name: format!("{}.{}", fe.type_name(receiver.ty), method),
            span: expr.method.span,
        }
        .into());
    };
    let symbol = fe.registry.symbol(member);
    let ret = symbol.ty;
    let kind = symbol.kind.describe();
    let opcode = match symbol.kind {
        SymbolKind::Method(_) => Some(OpCode::Call),
        SymbolKind::InterfaceMethod(_) => Some(OpCode::CallVirt),
        _ => None,
    };
    let Some(opcode) = opcode else {
        fe.truncate(mark);
        return Err(CompilationError::type_mismatch(
            format!("'{}.{}' is a {kind}, not a method", fe.type_name(receiver.ty), method),
            expr.method.span,
        )
        .into());
    };
    let params = param_types(fe, member);
    let name = format!("{}.{}", fe.type_name(receiver.ty), method);
    let invocation = Invocation::function(opcode, member, &name, &params, ret);
    if let Err(err) = invocation.check_arity(expr.args.len(), expr.span) {
        fe.truncate(mark);
        return Err(err);
    }
    invoke(fe, invocation, Some(receiver), expr.args, expr.span)
}

#[cfg(test)]
mod tests {
    use bumpalo::Bump;
    use zlang_ast::{AstBuilder, BinaryOp};
    use zlang_core::CompilationError;

    use crate::emit::test_support::emit;

    #[test]
    fn arguments_fill_a_range_above_live_registers() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let add = b.function(
            "add",
            &[b.param("a", b.named("int")), b.param("b", b.named("int"))],
            Some(b.named("int")),
            b.block(&[b.ret(Some(b.binary(b.name("a"), BinaryOp::Add, b.name("b"))))]),
        );
        let body = b.block(&[b.var("r", None, Some(b.call("add", &[b.int(1), b.int(2)])))]);
        let main = b.function("main", &[], None, body);
        let emitted = emit(&[b.module("main", &[], &[add, main])]);

        assert!(emitted.errors.is_empty(), "{:?}", emitted.errors);
        let listing = emitted.listing("main");
        assert_eq!(&listing[..4], &["Ldc_i32 r4, 1", "Mov r2, r4", "Ldc_i32 r4, 2", "Mov r3, r4"]);
        assert!(listing[4].starts_with("Call r2, r2, sym_"), "{listing:#?}");
        assert_eq!(listing[5], "Mov r1, r2");
    }

    #[test]
    fn arity_is_checked_before_emitting() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let f = b.function(
            "f",
            &[
                b.param("a", b.named("int")),
                b.param("b", b.named("int")),
                b.param("c", b.named("int")),
            ],
            None,
            b.block(&[]),
        );
        let body = b.block(&[b.expr_stmt(b.call("f", &[b.int(1), b.int(2)]))]);
        let main = b.function("main", &[], None, body);
        let emitted = emit(&[b.module("main", &[], &[f, main])]);

        assert_eq!(emitted.errors.len(), 1);
        assert!(matches!(
            emitted.errors[0].error,
            CompilationError::ArityMismatch { expected: 3, found: 2, .. }
        ));
        assert_eq!(emitted.listing("main"), vec!["Collect", "Halt"]);
    }

    #[test]
    fn builtins_invoke_negative_addresses() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let body = b.block(&[
            b.expr_stmt(b.method_call(b.name("xs"), "add", &[b.int(7)])),
            b.ret(Some(b.method_call(b.name("xs"), "get", &[b.int(0)]))),
        ]);
        let f = b.function(
            "f",
            &[b.param("xs", b.list_type(b.named("int")))],
            Some(b.named("int")),
            body,
        );
        let main = b.function("main", &[], None, b.block(&[]));
        let emitted = emit(&[b.module("main", &[], &[f, main])]);

        assert!(emitted.errors.is_empty(), "{:?}", emitted.errors);
        let listing = emitted.listing("f");
        assert!(listing.contains(&"Invoke r0, r2, builtin -5".to_string()), "{listing:#?}");
        assert!(listing.contains(&"Invoke r2, r2, builtin -8".to_string()), "{listing:#?}");
    }

    #[test]
    fn interface_methods_dispatch_virtually() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let shape = b.interface_decl(
            "Shape",
            &[b.interface_method("area", &[], Some(b.named("float")))],
        );
        let f = b.function(
            "measure",
            &[b.param("s", b.named("Shape"))],
            Some(b.named("float")),
            b.block(&[b.ret(Some(b.method_call(b.name("s"), "area", &[])))]),
        );
        let main = b.function("main", &[], None, b.block(&[]));
        let emitted = emit(&[b.module("main", &[], &[shape, f, main])]);

        assert!(emitted.errors.is_empty(), "{:?}", emitted.errors);
        let listing = emitted.listing("measure");
        assert_eq!(listing[1], "Mov r2, r1");
        assert!(listing[2].starts_with("CallVirt r2, r2, sym_"), "{listing:#?}");
    }

    #[test]
    fn method_arity_mismatch_discards_the_receiver() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let body = b.block(&[b.expr_stmt(b.method_call(b.string("abc"), "length", &[b.int(1)]))]);
        let main = b.function("main", &[], None, body);
        let emitted = emit(&[b.module("main", &[], &[main])]);

        assert_eq!(emitted.errors.len(), 1);
        assert!(matches!(emitted.errors[0].error, CompilationError::ArityMismatch { .. }));
        assert_eq!(emitted.listing("main"), vec!["Collect", "Halt"]);
    }

    #[test]
    fn argument_types_are_checked() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let f = b.function("f", &[b.param("s", b.named("string"))], None, b.block(&[]));
        let body = b.block(&[b.expr_stmt(b.call("f", &[b.int(1)]))]);
        let main = b.function("main", &[], None, body);
        let emitted = emit(&[b.module("main", &[], &[f, main])]);

        assert_eq!(emitted.errors.len(), 1);
        assert!(
            emitted.errors[0]
                .to_string()
                .contains("argument 1 of 'f': expected 'string', found 'byte'")
        );
    }
}
