//! Assignment.
//!
//! Every store of a reference releases the value it overwrites and retains
//! the new one. The old value is released before the store, the new one
//! retained after it; first initialization only retains.

use zlang_ast::{AssignStmt, Expr, FieldExpr, Ident, IndexExpr};
use zlang_core::{CompilationError, Span};
use zlang_registry::{SymbolId, SymbolKind, primitives};

use crate::expr::{access_field, compile_expr, element_access, union_tag};
use crate::emit::{EmitResult, FunctionEmitter, Value};
use crate::ir::{Immediate, OpCode};

pub(super) fn compile_assign(fe: &mut FunctionEmitter<'_>, stmt: &AssignStmt<'_>) -> EmitResult<()> {
    match stmt.target {
        Expr::Ident(name) => assign_name(fe, name, stmt.value),
        Expr::Field(target) => assign_field(fe, target, stmt.value),
        Expr::Index(target) => assign_element(fe, target, stmt.value),
        Expr::SelfRef(span) => Err(CompilationError::NotAssignable {
            name: "self".to_string(),
            span: *span,
        }
        .into()),
        other => Err(CompilationError::NotAssignable {
            name: "expression".to_string(),
            span: other.span(),
        }
        .into()),
    }
}

fn assign_name(fe: &mut FunctionEmitter<'_>, name: &Ident<'_>, value: &Expr<'_>) -> EmitResult<()> {
    let symbol = fe.resolve(name.name, name.span)?;
    if !matches!(fe.registry.symbol(symbol).kind, SymbolKind::Variable) {
        return Err(CompilationError::NotAssignable {
            name: name.name.to_string(),
            span: name.span,
        }
        .into());
    }
    let ty = fe.symbol_type(symbol, name.span)?;

    if fe.is_global(symbol) {
        let module = fe.registry.symbol_module(symbol);
        if fe.is_foreign(module) {
            return Err(CompilationError::ForeignAccessDenied {
                message: format!(
                    "cannot assign '{}' of module '{}'",
                    name.name,
                    fe.module_name(module)
                ),
                span: name.span,
            }
            .into());
        }
        let value = compile_expr(fe, value)?;
        fe.expect_assignable(ty, value.ty, name.span, || format!("cannot assign to '{name}'"))?;
        store_global(fe, symbol, value, false, name.span)?;
        fe.release(value);
        return Ok(());
    }

    let slot = fe.slot(symbol)?;
    let value = compile_expr(fe, value)?;
    fe.expect_assignable(ty, value.ty, name.span, || format!("cannot assign to '{name}'"))?;
    let is_ref = fe.is_ref(ty);
    if is_ref {
        fe.push(OpCode::RemoveRef, &[slot], None);
    }
    fe.mov(slot, value.register);
    if is_ref {
        fe.push(OpCode::AddRef, &[slot], None);
    }
    fe.release(value);
    Ok(())
}

/// Store `value` into a module-level variable. `first` marks the
/// initializer's store, which has no previous value to release.
pub(crate) fn store_global(
    fe: &mut FunctionEmitter<'_>,
    global: SymbolId,
    value: Value,
    first: bool,
    span: Span,
) -> EmitResult<()> {
    let ty = fe.symbol_type(global, span)?;
    let rt = fe.register_type(ty);
    let address = fe.registry.symbol(global).require_address()?;
    let store = fe.select(OpCode::st_glb(rt), span, || format!("cannot store a '{}'", fe.type_name(ty)))?;

    let is_ref = fe.is_ref(ty);
    if is_ref && !first {
        let old = fe.acquire()?;
        fe.push(OpCode::LdGlbRef, &[old], Some(Immediate::Int(address)));
        fe.push(OpCode::RemoveRef, &[old], None);
        fe.release_register(old);
    }
    fe.push(store, &[value.register], Some(Immediate::Int(address)));
    if is_ref {
        fe.push(OpCode::AddRef, &[value.register], None);
    }
    Ok(())
}

fn assign_field(fe: &mut FunctionEmitter<'_>, target: &FieldExpr<'_>, value: &Expr<'_>) -> EmitResult<()> {
    let object = compile_expr(fe, target.object)?;
    let field = access_field(fe, object.ty, &target.field)?;
    let value = compile_expr(fe, value)?;
    fe.expect_assignable(field.ty, value.ty, target.span, || {
        format!("cannot assign to field '{}'", target.field)
    })?;

    let rt = fe.register_type(field.ty);
    let store = fe.select(OpCode::st_fld(rt), target.span, || "field has no storage".to_string())?;
    let is_ref = fe.is_ref(field.ty);
    let tag = union_tag(fe, object.ty, field.symbol);

    match tag {
        Some(tag) if is_ref => {
            // The payload slot is shared; only a value of this same field is ours to release.
            let skip = fe.new_label();
            let flag = fe.acquire()?;
            fe.push(OpCode::LdFldU8, &[flag, object.register], Some(Immediate::Int(tag.flag_offset)));
            let id = fe.acquire()?;
            fe.load_int(id, tag.id as i32);
            fe.push(OpCode::EqU8, &[flag, flag, id], None);
            fe.branch_if_zero(flag, skip);
            fe.push(OpCode::LdFldRef, &[id, object.register], Some(Immediate::Int(field.offset)));
            fe.push(OpCode::RemoveRef, &[id], None);
            fe.mark_nop(skip)?;
            fe.release_register(flag);
            fe.release_register(id);
        }
        None if is_ref => {
            let old = fe.acquire()?;
            fe.push(OpCode::LdFldRef, &[old, object.register], Some(Immediate::Int(field.offset)));
            fe.push(OpCode::RemoveRef, &[old], None);
            fe.release_register(old);
        }
        _ => {}
    }

    fe.push(store, &[value.register, object.register], Some(Immediate::Int(field.offset)));
    if let Some(tag) = tag {
        let id = fe.acquire()?;
        fe.load_int(id, tag.id as i32);
        fe.push(OpCode::StFldU8, &[id, object.register], Some(Immediate::Int(tag.flag_offset)));
        fe.release_register(id);
    }
    if is_ref {
        fe.push(OpCode::AddRef, &[value.register], None);
    }
    fe.release(value);
    fe.release(object);
    Ok(())
}

fn assign_element(fe: &mut FunctionEmitter<'_>, target: &IndexExpr<'_>, value: &Expr<'_>) -> EmitResult<()> {
    let object = compile_expr(fe, target.object)?;
    let index = compile_expr(fe, target.index)?;
    fe.expect_assignable(primitives::INT, index.ty, target.index.span(), || "array index".to_string())?;
    let (array, element) = element_access(fe, object, target.span)?;
    let value = compile_expr(fe, value)?;
    fe.expect_assignable(element, value.ty, target.span, || "cannot store element".to_string())?;

    let rt = fe.register_type(element);
    let store = fe.select(OpCode::st_elem(rt), target.span, || "element has no storage".to_string())?;
    let is_ref = fe.is_ref(element);
    if is_ref {
        let old = fe.acquire()?;
        fe.push(OpCode::LdElemRef, &[old, array.register, index.register], None);
        fe.push(OpCode::RemoveRef, &[old], None);
        fe.release_register(old);
    }
    fe.push(store, &[value.register, array.register, index.register], None);
    if is_ref {
        fe.push(OpCode::AddRef, &[value.register], None);
    }
    fe.release(value);
    fe.release(index);
    fe.release(array);
    Ok(())
}

#[cfg(test)]
mod tests {
    use bumpalo::Bump;
    use zlang_ast::AstBuilder;
    use zlang_core::CompilationError;

    use crate::emit::test_support::emit;

    #[test]
    fn reference_reassignment_releases_then_retains() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let body = b.block(&[b.assign(b.name("s"), b.string("new"))]);
        let f = b.function("f", &[b.param("s", b.named("string"))], None, body);
        let main = b.function("main", &[], None, b.block(&[]));
        let emitted = emit(&[b.module("main", &[], &[f, main])]);

        assert!(emitted.errors.is_empty(), "{:?}", emitted.errors);
        assert_eq!(
            emitted.listing("f"),
            vec![
                "AddRef r1",
                "Ldc_str r2, \"new\"",
                "RemoveRef r1",
                "Mov r1, r2",
                "AddRef r1",
                "RemoveRef r1",
                "Collect",
                "Ret",
            ]
        );
    }

    #[test]
    fn global_reassignment_releases_previous_value() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let global = b.global_var("name", Some(b.named("string")), None);
        let body = b.block(&[b.assign(b.name("name"), b.string("z"))]);
        let main = b.function("main", &[], None, body);
        let emitted = emit(&[b.module("main", &[], &[global, main])]);

        assert!(emitted.errors.is_empty(), "{:?}", emitted.errors);
        assert_eq!(
            emitted.listing("main"),
            vec![
                "Ldc_str r1, \"z\"",
                "LdGlb_ref r2, 0",
                "RemoveRef r2",
                "StGlb_ref r1, 0",
                "AddRef r1",
                "Collect",
                "Halt",
            ]
        );
    }

    #[test]
    fn union_field_store_sets_the_flag() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let shape = b.union_decl(
            "Value",
            &[b.param("i", b.named("int")), b.param("f", b.named("float"))],
            &[],
        );
        let body = b.block(&[b.assign(b.field(b.name("v"), "f"), b.float(1.5))]);
        let f = b.function("set", &[b.param("v", b.named("Value"))], None, body);
        let main = b.function("main", &[], None, b.block(&[]));
        let emitted = emit(&[b.module("main", &[], &[shape, f, main])]);

        assert!(emitted.errors.is_empty(), "{:?}", emitted.errors);
        let listing = emitted.listing("set");
        assert_eq!(listing[1], "Ldc_f64 r2, 1.5");
        assert_eq!(listing[2], "StFld_f64 r2, r1, 0");
        assert_eq!(listing[3], "Ldc_i32 r3, 1");
        assert_eq!(listing[4], "StFld_u8 r3, r1, 8");
    }

    #[test]
    fn constants_and_foreign_globals_reject_assignment() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let dep = b.module("dep", &[], &[b.global_var("counter", Some(b.named("int")), None)]);
        let body = b.block(&[
            b.let_("k", None, b.int(1)),
            b.assign(b.name("k"), b.int(2)),
            b.assign(b.name("counter"), b.int(3)),
        ]);
        let main = b.function("main", &[], None, body);
        let emitted = emit(&[dep, b.module("app", &["dep"], &[main])]);

        assert_eq!(emitted.errors.len(), 2, "{:?}", emitted.errors);
        assert!(matches!(
            emitted.errors[0].error,
            CompilationError::NotAssignable { ref name, .. } if name == "k"
        ));
        assert!(matches!(
            emitted.errors[1].error,
            CompilationError::ForeignAccessDenied { .. }
        ));
    }
}
