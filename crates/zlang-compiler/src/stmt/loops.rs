//! Numeric and iterator `for` loops.

use zlang_ast::{ForEachStmt, ForRangeStmt};
use zlang_core::CompilationError;
use zlang_registry::{BuiltIn, TypeKind, primitives};

use super::compile_block;
use crate::expr::{Invocation, compile_expr, invoke, list_array};
use crate::emit::{EmitResult, FunctionEmitter, Value};
use crate::ir::OpCode;

/// Copy a fixed-register value into a temporary so the loop body cannot
/// change it.
fn pin(fe: &mut FunctionEmitter<'_>, value: Value) -> EmitResult<Value> {
    if value.temporary {
        return Ok(value);
    }
    let register = fe.acquire()?;
    fe.mov(register, value.register);
    Ok(Value::temporary(register, value.ty))
}

/// ```text
///     Mov var, from
/// top:
///     Lt_i32 c, var, to
///     Br_zero c, exit
///     <body>
///     Add_i32 var, var, step
///     Collect
///     Br top
/// exit:
/// ```
pub(super) fn compile_for_range(fe: &mut FunctionEmitter<'_>, stmt: &ForRangeStmt<'_>) -> EmitResult<()> {
    let scope = fe.scope_of(stmt.id)?;
    let Some(var) = fe.registry.scope(scope).get(stmt.var.name) else {
        return Ok(());
    };
    let slot = fe.slot(var)?;

    let mut bounds = Vec::with_capacity(3);
    for bound in [Some(stmt.from), Some(stmt.to), stmt.step] {
        let value = match bound {
            Some(expr) => {
                let value = compile_expr(fe, expr)?;
                fe.expect_assignable(primitives::INT, value.ty, expr.span(), || "loop bound".to_string())?;
                value
            }
            None => {
                let one = fe.acquire()?;
                fe.load_int(one, 1);
                Value::temporary(one, primitives::INT)
            }
        };
        bounds.push(value);
    }
    let from = bounds[0];
    let to = pin(fe, bounds[1])?;
    let step = pin(fe, bounds[2])?;

    fe.with_scope(scope, |fe| -> EmitResult<()> {
        fe.mov(slot, from.register);
        fe.release(from);
        fe.declare(var);

        let top = fe.new_label();
        let exit = fe.new_label();
        fe.mark(top)?;
        let cond = fe.acquire()?;
        fe.push(OpCode::LtI32, &[cond, slot, to.register], None);
        fe.branch_if_zero(cond, exit);
        fe.release_register(cond);

        fe.in_loop(|fe| compile_block(fe, &stmt.body))?;
        fe.push(OpCode::AddI32, &[slot, slot, step.register], None);
        fe.push(OpCode::Collect, &[], None);
        fe.branch(top);
        fe.mark_nop(exit)?;
        Ok(())
    })?;
    fe.release(to);
    fe.release(step);
    Ok(())
}

/// Iterate the backing array with a hidden index register.
///
/// The array is retained for the duration of the loop so that a
/// temporary iterable survives the per-iteration `Collect`.
pub(super) fn compile_for_each(fe: &mut FunctionEmitter<'_>, stmt: &ForEachStmt<'_>) -> EmitResult<()> {
    let scope = fe.scope_of(stmt.id)?;
    let Some(var) = fe.registry.scope(scope).get(stmt.var.name) else {
        return Ok(());
    };
    let slot = fe.slot(var)?;

    let iterable = compile_expr(fe, stmt.iterable)?;
    let (element, size_of) = match fe.registry.ty(iterable.ty).kind {
        TypeKind::Array { element } => (element, BuiltIn::ArraySize),
        TypeKind::List { element, .. } => (element, BuiltIn::ListSize),
        _ => {
            return Err(CompilationError::type_mismatch(
                format!("cannot iterate over '{}'", fe.type_name(iterable.ty)),
                stmt.iterable.span(),
            )
            .into());
        }
    };

    let size = invoke(
        fe,
        Invocation::builtin(size_of, "size", &[], Some(primitives::INT)),
        Some(Value::fixed(iterable.register, iterable.ty)),
        &[],
        stmt.span,
    )?
    .ok_or_else(|| CompilationError::invalid("'size' yields no value", stmt.span))?;
    let array = match size_of {
        BuiltIn::ListSize => list_array(fe, iterable)?,
        _ => pin(fe, iterable)?,
    };
    fe.registry.infer_type(var, element)?;
    fe.push(OpCode::AddRef, &[array.register], None);

    let index = fe.acquire()?;
    fe.push(OpCode::LdcZero, &[index], None);
    let one = fe.acquire()?;
    fe.load_int(one, 1);

    let rt = fe.register_type(element);
    let load = fe.select(OpCode::ld_elem(rt), stmt.span, || "element has no storage".to_string())?;
    let is_ref = fe.is_ref(element);

    fe.with_scope(scope, |fe| -> EmitResult<()> {
        let top = fe.new_label();
        let exit = fe.new_label();
        fe.mark(top)?;
        let cond = fe.acquire()?;
        fe.push(OpCode::LtI32, &[cond, index, size.register], None);
        fe.branch_if_zero(cond, exit);
        fe.release_register(cond);

        if is_ref {
            fe.push(OpCode::RemoveRef, &[slot], None);
        }
        fe.push(load, &[slot, array.register, index], None);
        if is_ref {
            fe.push(OpCode::AddRef, &[slot], None);
        }
        fe.declare(var);

        fe.in_loop(|fe| compile_block(fe, &stmt.body))?;
        fe.push(OpCode::AddI32, &[index, index, one], None);
        fe.push(OpCode::Collect, &[], None);
        fe.branch(top);
        fe.mark_nop(exit)?;
        Ok(())
    })?;

    fe.push(OpCode::RemoveRef, &[array.register], None);
    for register in [index, one] {
        fe.release_register(register);
    }
    fe.release(size);
    fe.release(array);
    Ok(())
}

#[cfg(test)]
mod tests {
    use bumpalo::Bump;
    use zlang_ast::{AstBuilder, BinaryOp};
    use zlang_registry::primitives;

    use crate::emit::test_support::emit;

    #[test]
    fn range_loop_with_default_step() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let body = b.block(&[b.for_range("i", b.int(0), b.int(3), None, b.block(&[]))]);
        let main = b.function("main", &[], None, body);
        let emitted = emit(&[b.module("main", &[], &[main])]);

        assert!(emitted.errors.is_empty(), "{:?}", emitted.errors);
        assert_eq!(
            emitted.listing("main"),
            vec![
                "Ldc_i32 r2, 0",
                "Ldc_i32 r3, 3",
                "Ldc_i32 r4, 1",
                "Mov r1, r2",
                "Lt_i32 r2, r1, r3",
                "Br_zero r2, L2",
                "Add_i32 r1, r1, r4",
                "Collect",
                "Br L1",
                "Nop",
                "Collect",
                "Halt",
            ]
        );
    }

    #[test]
    fn array_loop_reads_elements_by_hidden_index() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let body = b.block(&[
            b.var("sum", Some(b.named("int")), Some(b.int(0))),
            b.for_each(
                "x",
                b.name("xs"),
                b.block(&[b.assign(b.name("sum"), b.binary(b.name("sum"), BinaryOp::Add, b.name("x")))]),
            ),
            b.ret(Some(b.name("sum"))),
        ]);
        let total = b.function(
            "total",
            &[b.param("xs", b.array_type(b.named("int")))],
            Some(b.named("int")),
            body,
        );
        let main = b.function("main", &[], None, b.block(&[]));
        let emitted = emit(&[b.module("main", &[], &[total, main])]);

        assert!(emitted.errors.is_empty(), "{:?}", emitted.errors);
        let listing = emitted.listing("total");
        for expected in [
            "Invoke r4, r4, builtin -1",
            "Mov r5, r1",
            "AddRef r5",
            "Ldc_zero r6",
            "LdElem_i32 r3, r5, r6",
            "Add_i32 r6, r6, r7",
            "RemoveRef r5",
        ] {
            assert!(listing.iter().any(|l| l == expected), "missing {expected} in {listing:#?}");
        }

        let function = emitted.function("total").function;
        let x = emitted.registry.callable(function).unwrap().locals[1];
        assert_eq!(emitted.registry.symbol(x).ty, Some(primitives::INT));
    }

    #[test]
    fn list_loop_reads_the_backing_array() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let body = b.block(&[b.for_each("s", b.name("names"), b.block(&[]))]);
        let f = b.function(
            "each",
            &[b.param("names", b.list_type(b.named("string")))],
            None,
            body,
        );
        let main = b.function("main", &[], None, b.block(&[]));
        let emitted = emit(&[b.module("main", &[], &[f, main])]);

        assert!(emitted.errors.is_empty(), "{:?}", emitted.errors);
        let listing = emitted.listing("each");
        assert!(listing.contains(&"Invoke r3, r3, builtin -3".to_string()), "{listing:#?}");
        assert!(listing.contains(&"LdFld_ref r4, r1, 4".to_string()), "{listing:#?}");
        // The string element is released before each load and retained after it.
        let load = listing.iter().position(|l| l == "LdElem_ref r2, r4, r5").unwrap();
        assert_eq!(listing[load - 1], "RemoveRef r2");
        assert_eq!(listing[load + 1], "AddRef r2");
    }

    #[test]
    fn iterating_a_scalar_is_rejected() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let body = b.block(&[b.for_each("c", b.int(5), b.block(&[]))]);
        let main = b.function("main", &[], None, body);
        let emitted = emit(&[b.module("main", &[], &[main])]);

        assert_eq!(emitted.errors.len(), 1);
        assert!(emitted.errors[0].to_string().contains("cannot iterate over 'byte'"));
    }
}
