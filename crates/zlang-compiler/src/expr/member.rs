//! Field and element access.

use zlang_ast::{FieldExpr, Ident, IndexExpr};
use zlang_core::{CompilationError, Span};
use zlang_registry::{SymbolId, SymbolKind, TypeId, TypeKind, primitives};

use super::compile_expr;
use crate::emit::{EmitResult, FunctionEmitter, Value};
use crate::ir::{Immediate, OpCode};

/// A resolved value field.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FieldAccess {
    pub symbol: SymbolId,
    pub ty: TypeId,
    pub offset: i32,
}

/// Location of the active-field flag of a union and the id of one field.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UnionTag {
    pub flag_offset: i32,
    pub id: u32,
}

/// Resolve `field` on a value of type `owner`.
///
/// Fields of types declared in another module are private to it.
pub(crate) fn access_field(fe: &FunctionEmitter<'_>, owner: TypeId, field: &Ident<'_>) -> EmitResult<FieldAccess> {
    let Some(symbol) = fe.registry.resolve_member(owner, field.name) else {
        return Err(CompilationError::UnresolvedSymbol {
            name: format!("{}.{}", fe.type_name(owner), field.name),
            span: field.span,
        }
        .into());
    };
    let member = fe.registry.symbol(symbol);
    if !matches!(member.kind, SymbolKind::Field) {
        return Err(CompilationError::type_mismatch(
            format!("'{}.{}' is a {}, not a field", fe.type_name(owner), field.name, member.kind.describe()),
            field.span,
        )
        .into());
    }

    let module = fe.registry.ty(owner).module;
    if fe.is_foreign(module) {
        return Err(CompilationError::ForeignAccessDenied {
            message: format!(
                "cannot access field '{}' of '{}' declared in module '{}'",
                field.name,
                fe.type_name(owner),
                fe.module_name(module)
            ),
            span: field.span,
        }
        .into());
    }

    Ok(FieldAccess {
        symbol,
        ty: fe.symbol_type(symbol, field.span)?,
        offset: member.require_address()?,
    })
}

/// The flag location and field id when `field` belongs to a union.
pub(crate) fn union_tag(fe: &FunctionEmitter<'_>, owner: TypeId, field: SymbolId) -> Option<UnionTag> {
    let def = fe.registry.ty(owner);
    if !def.is_union() {
        return None;
    }
    let flag = def.aggregate()?.flag?;
    Some(UnionTag {
        flag_offset: fe.registry.symbol(flag).address()?,
        id: fe.registry.field_id(owner, field)?,
    })
}

/// The array holding the elements of `object`, and the element type.
///
/// Arrays are their own storage; lists keep theirs in `@array`.
pub(crate) fn element_access(fe: &mut FunctionEmitter<'_>, object: Value, span: Span) -> EmitResult<(Value, TypeId)> {
    match fe.registry.ty(object.ty).kind {
        TypeKind::Array { element } => Ok((object, element)),
        TypeKind::List { element, .. } => Ok((list_array(fe, object)?, element)),
        _ => Err(CompilationError::type_mismatch(format!("cannot index '{}'", fe.type_name(object.ty)), span).into()),
    }
}

/// Load the backing array of a list, consuming the list value.
pub(crate) fn list_array(fe: &mut FunctionEmitter<'_>, list: Value) -> EmitResult<Value> {
    let field = fe.registry.resolve_member(list.ty, "@array").ok_or_else(|| {
        zlang_core::InternalError::Invariant(format!("'{}' has no backing array", fe.type_name(list.ty)))
    })?;
    let symbol = fe.registry.symbol(field);
    let offset = symbol.require_address()?;
    let array_ty = symbol
        .ty
        .ok_or_else(|| zlang_core::InternalError::Invariant("untyped '@array' field".to_string()))?;

    let target = fe.target_for(&[list])?;
    fe.push(OpCode::LdFldRef, &[target, list.register], Some(Immediate::Int(offset)));
    Ok(Value::temporary(target, array_ty))
}

/// `object.field`
pub(super) fn compile_field(fe: &mut FunctionEmitter<'_>, expr: &FieldExpr<'_>) -> EmitResult<Value> {
    let object = compile_expr(fe, expr.object)?;
    let field = access_field(fe, object.ty, &expr.field)?;
    let rt = fe.register_type(field.ty);
    let load = fe.select(OpCode::ld_fld(rt), expr.span, || format!("field '{}' has no storage", expr.field))?;
    let target = fe.target_for(&[object])?;
    fe.push(load, &[target, object.register], Some(Immediate::Int(field.offset)));
    Ok(Value::temporary(target, field.ty))
}

/// `object[index]`
pub(super) fn compile_index(fe: &mut FunctionEmitter<'_>, expr: &IndexExpr<'_>) -> EmitResult<Value> {
    let object = compile_expr(fe, expr.object)?;
    let index = compile_expr(fe, expr.index)?;
    fe.expect_assignable(primitives::INT, index.ty, expr.index.span(), || "array index".to_string())?;
    let (array, element) = element_access(fe, object, expr.span)?;
    let rt = fe.register_type(element);
    let load = fe.select(OpCode::ld_elem(rt), expr.span, || "element has no storage".to_string())?;
    let target = fe.target_for(&[array, index])?;
    fe.push(load, &[target, array.register, index.register], None);
    Ok(Value::temporary(target, element))
}

#[cfg(test)]
mod tests {
    use bumpalo::Bump;
    use zlang_ast::AstBuilder;
    use zlang_core::CompilationError;

    use crate::emit::test_support::emit;

    #[test]
    fn struct_fields_load_at_their_offset() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let point = b.struct_decl(
            "Point",
            &[b.param("x", b.named("int")), b.param("y", b.named("float"))],
            &[],
        );
        let f = b.function(
            "f",
            &[b.param("p", b.named("Point"))],
            Some(b.named("float")),
            b.block(&[b.ret(Some(b.field(b.name("p"), "y")))]),
        );
        let main = b.function("main", &[], None, b.block(&[]));
        let emitted = emit(&[b.module("main", &[], &[point, f, main])]);

        assert!(emitted.errors.is_empty(), "{:?}", emitted.errors);
        assert_eq!(emitted.listing("f")[1], "LdFld_f64 r2, r1, 4");
    }

    #[test]
    fn list_indexing_goes_through_the_backing_array() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let f = b.function(
            "f",
            &[b.param("xs", b.list_type(b.named("int")))],
            Some(b.named("int")),
            b.block(&[b.ret(Some(b.index(b.name("xs"), b.int(2))))]),
        );
        let main = b.function("main", &[], None, b.block(&[]));
        let emitted = emit(&[b.module("main", &[], &[f, main])]);

        assert!(emitted.errors.is_empty(), "{:?}", emitted.errors);
        assert_eq!(
            &emitted.listing("f")[1..4],
            &["Ldc_i32 r2, 2", "LdFld_ref r3, r1, 4", "LdElem_i32 r2, r3, r2"]
        );
    }

    #[test]
    fn foreign_fields_are_private() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let dep = b.module("dep", &[], &[b.struct_decl("Secret", &[b.param("v", b.named("int"))], &[])]);
        let f = b.function(
            "peek",
            &[b.param("s", b.named("Secret"))],
            Some(b.named("int")),
            b.block(&[b.ret(Some(b.field(b.name("s"), "v")))]),
        );
        let main = b.function("main", &[], None, b.block(&[]));
        let emitted = emit(&[dep, b.module("app", &["dep"], &[f, main])]);

        assert!(
            emitted
                .errors
                .iter()
                .any(|d| matches!(d.error, CompilationError::ForeignAccessDenied { .. })),
            "{:?}",
            emitted.errors
        );
    }

    #[test]
    fn unknown_field_and_non_indexable_values() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let point = b.struct_decl("Point", &[b.param("x", b.named("int"))], &[]);
        let body = b.block(&[
            b.expr_stmt(b.field(b.name("p"), "z")),
            b.expr_stmt(b.index(b.name("p"), b.int(0))),
        ]);
        let f = b.function("f", &[b.param("p", b.named("Point"))], None, body);
        let main = b.function("main", &[], None, b.block(&[]));
        let emitted = emit(&[b.module("main", &[], &[point, f, main])]);

        assert_eq!(emitted.errors.len(), 2, "{:?}", emitted.errors);
        assert!(matches!(
            &emitted.errors[0].error,
            CompilationError::UnresolvedSymbol { name, .. } if name == "Point.z"
        ));
        assert!(emitted.errors[1].to_string().contains("cannot index 'Point'"));
    }
}
