//! Object, array and list creation.

use zlang_ast::{NewArrayExpr, NewExpr, NewListExpr, TypeExpr};
use zlang_core::CompilationError;
use zlang_registry::{BuiltIn, SymbolId, TypeKind, primitives};

use super::{Invocation, access_field, compile_expr, invoke, union_tag};
use crate::emit::{EmitResult, FunctionEmitter, Value};
use crate::ir::{Immediate, OpCode};

/// Initial capacity of the backing array of a new list.
const LIST_CAPACITY: i32 = 16;

/// `Type { field: value, ... }`
///
/// ```text
///     NewObj    obj, #Type
///     <value>
///     StFld     value, obj, #offset
///     AddRef    value                  ; reference fields
///     Ldc_i32   id, <field id>         ; unions
///     StFld_u8  id, obj, #flag
/// ```
pub(super) fn compile_new(fe: &mut FunctionEmitter<'_>, expr: &NewExpr<'_>) -> EmitResult<Value> {
    let ty = fe.resolve_type(&TypeExpr::Named(expr.ty))?;
    let def = fe.registry.ty(ty);
    let is_union = match def.kind {
        TypeKind::Struct(_) => false,
        TypeKind::Union(_) => true,
        _ => {
            return Err(CompilationError::type_mismatch(
                format!("cannot create a value of '{}' with field initializers", def.name),
                expr.span,
            )
            .into());
        }
    };
    if fe.is_foreign(def.module) {
        return Err(CompilationError::ForeignAccessDenied {
            message: format!(
                "cannot create '{}' outside its module '{}'",
                def.name,
                fe.module_name(def.module)
            ),
            span: expr.span,
        }
        .into());
    }
    if is_union && expr.fields.len() != 1 {
        return Err(CompilationError::invalid(
            format!("union '{}' is created with exactly one field", fe.type_name(ty)),
            expr.span,
        )
        .into());
    }

    let object = fe.acquire()?;
    fe.push(OpCode::NewObj, &[object], Some(Immediate::Type(ty)));

    let mut seen: Vec<SymbolId> = Vec::with_capacity(expr.fields.len());
    for init in expr.fields {
        let field = access_field(fe, ty, &init.name)?;
        if seen.contains(&field.symbol) {
            return Err(CompilationError::invalid(
                format!("field '{}' is initialized twice", init.name),
                init.name.span,
            )
            .into());
        }
        seen.push(field.symbol);

        let value = compile_expr(fe, init.value)?;
        fe.expect_assignable(field.ty, value.ty, init.value.span(), || {
            format!("field '{}' of '{}'", init.name, fe.type_name(ty))
        })?;
        let rt = fe.register_type(field.ty);
        let store = fe.select(OpCode::st_fld(rt), init.name.span, || "field has no storage".to_string())?;
        fe.push(store, &[value.register, object], Some(Immediate::Int(field.offset)));
        if fe.is_ref(field.ty) {
            fe.push(OpCode::AddRef, &[value.register], None);
        }
        fe.release(value);

        if let Some(tag) = union_tag(fe, ty, field.symbol) {
            let id = fe.acquire()?;
            fe.load_int(id, tag.id as i32);
            fe.push(OpCode::StFldU8, &[id, object], Some(Immediate::Int(tag.flag_offset)));
            fe.release_register(id);
        }
    }
    Ok(Value::temporary(object, ty))
}

/// `T[size]` or `T[] { a, b, c }`
pub(super) fn compile_new_array(fe: &mut FunctionEmitter<'_>, expr: &NewArrayExpr<'_>) -> EmitResult<Value> {
    let element = fe.resolve_type(&expr.element)?;
    let array_ty = fe.registry.array_of(element);
    let rt = fe.register_type(element);
    let new_arr = fe.select(OpCode::new_arr(rt), expr.span, || {
        format!("cannot create an array of '{}'", fe.type_name(element))
    })?;

    let size = match expr.size {
        Some(_) if !expr.elements.is_empty() => {
            return Err(CompilationError::invalid(
                "an array is created with either a size or elements",
                expr.span,
            )
            .into());
        }
        Some(size) => {
            let value = compile_expr(fe, size)?;
            fe.expect_assignable(primitives::INT, value.ty, size.span(), || "array size".to_string())?;
            value
        }
        None => {
            let count = i32::try_from(expr.elements.len())
                .map_err(|_| CompilationError::invalid("too many array elements", expr.span))?;
            let register = fe.acquire()?;
            fe.load_int(register, count);
            Value::temporary(register, primitives::INT)
        }
    };
    let array = fe.target_for(&[size])?;
    fe.push(new_arr, &[array, size.register], None);

    if !expr.elements.is_empty() {
        let store = fe.select(OpCode::st_elem(rt), expr.span, || "element has no storage".to_string())?;
        let is_ref = fe.is_ref(element);
        for (i, item) in expr.elements.iter().enumerate() {
            let value = compile_expr(fe, item)?;
            fe.expect_assignable(element, value.ty, item.span(), || format!("element {i}"))?;
            let index = fe.acquire()?;
            fe.load_int(index, i as i32);
            fe.push(store, &[value.register, array, index], None);
            if is_ref {
                fe.push(OpCode::AddRef, &[value.register], None);
            }
            fe.release_register(index);
            fe.release(value);
        }
    }
    Ok(Value::temporary(array, array_ty))
}

/// `List<T> { a, b, c }`: an empty list with a fresh backing array, then
/// one `add` per element.
pub(super) fn compile_new_list(fe: &mut FunctionEmitter<'_>, expr: &NewListExpr<'_>) -> EmitResult<Value> {
    let element = fe.resolve_type(&expr.element)?;
    let list_ty = fe.registry.list_of(element);
    let array_field = fe.registry.resolve_member(list_ty, "@array").ok_or_else(|| {
        zlang_core::InternalError::Invariant(format!("'{}' has no backing array", fe.type_name(list_ty)))
    })?;
    let array_offset = fe.registry.symbol(array_field).require_address()?;
    let rt = fe.register_type(element);
    let new_arr = fe.select(OpCode::new_arr(rt), expr.span, || {
        format!("cannot create a list of '{}'", fe.type_name(element))
    })?;

    let list = fe.acquire()?;
    fe.push(OpCode::NewObj, &[list], Some(Immediate::Type(list_ty)));
    let capacity = fe.acquire()?;
    fe.load_int(capacity, LIST_CAPACITY);
    let array = fe.acquire()?;
    fe.push(new_arr, &[array, capacity], None);
    fe.push(OpCode::StFldRef, &[array, list], Some(Immediate::Int(array_offset)));
    fe.push(OpCode::AddRef, &[array], None);
    fe.release_register(array);
    fe.release_register(capacity);

    let params = [element];
    for item in expr.elements {
        invoke(
            fe,
            Invocation::builtin(BuiltIn::ListAdd, "add", &params, None),
            Some(Value::fixed(list, list_ty)),
            std::slice::from_ref(item),
            item.span(),
        )?;
    }
    Ok(Value::temporary(list, list_ty))
}

#[cfg(test)]
mod tests {
    use bumpalo::Bump;
    use zlang_ast::AstBuilder;
    use zlang_core::CompilationError;

    use crate::emit::test_support::emit;

    #[test]
    fn struct_creation_stores_each_initializer() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let person = b.struct_decl(
            "Person",
            &[b.param("age", b.named("int")), b.param("name", b.named("string"))],
            &[],
        );
        let body = b.block(&[b.var(
            "p",
            None,
            Some(b.new_object("Person", &[("name", b.string("ada")), ("age", b.int(36))])),
        )]);
        let main = b.function("main", &[], None, body);
        let emitted = emit(&[b.module("main", &[], &[person, main])]);

        assert!(emitted.errors.is_empty(), "{:?}", emitted.errors);
        let listing = emitted.listing("main");
        assert!(listing[0].starts_with("NewObj r2, type_"), "{listing:#?}");
        assert_eq!(
            &listing[1..6],
            &["Ldc_str r3, \"ada\"", "StFld_ref r3, r2, 4", "AddRef r3", "Ldc_i32 r3, 36", "StFld_i32 r3, r2, 0"]
        );
    }

    #[test]
    fn union_creation_sets_the_flag() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let shape = b.union_decl(
            "Number",
            &[b.param("i", b.named("int")), b.param("f", b.named("float"))],
            &[],
        );
        let body = b.block(&[b.expr_stmt(b.new_object("Number", &[("f", b.float(2.5))]))]);
        let main = b.function("main", &[], None, body);
        let emitted = emit(&[b.module("main", &[], &[shape, main])]);

        assert!(emitted.errors.is_empty(), "{:?}", emitted.errors);
        assert_eq!(
            &emitted.listing("main")[1..5],
            &["Ldc_f64 r2, 2.5", "StFld_f64 r2, r1, 0", "Ldc_i32 r2, 1", "StFld_u8 r2, r1, 8"]
        );
    }

    #[test]
    fn union_needs_exactly_one_field_and_foreign_types_are_sealed() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let dep = b.module("dep", &[], &[b.struct_decl("Token", &[b.param("v", b.named("int"))], &[])]);
        let number = b.union_decl("Number", &[b.param("i", b.named("int"))], &[]);
        let body = b.block(&[
            b.expr_stmt(b.new_object("Number", &[])),
            b.expr_stmt(b.new_object("Token", &[])),
        ]);
        let main = b.function("main", &[], None, body);
        let emitted = emit(&[dep, b.module("app", &["dep"], &[number, main])]);

        assert_eq!(emitted.errors.len(), 2, "{:?}", emitted.errors);
        assert!(emitted.errors[0].to_string().contains("exactly one field"));
        assert!(matches!(
            emitted.errors[1].error,
            CompilationError::ForeignAccessDenied { .. }
        ));
    }

    #[test]
    fn array_literal_stores_by_index() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let body = b.block(&[b.expr_stmt(b.array_literal(b.named("int"), &[b.int(5), b.int(6)]))]);
        let main = b.function("main", &[], None, body);
        let emitted = emit(&[b.module("main", &[], &[main])]);

        assert!(emitted.errors.is_empty(), "{:?}", emitted.errors);
        assert_eq!(
            &emitted.listing("main")[..8],
            &[
                "Ldc_i32 r1, 2",
                "NewArr_i32 r1, r1",
                "Ldc_i32 r2, 5",
                "Ldc_i32 r3, 0",
                "StElem_i32 r2, r1, r3",
                "Ldc_i32 r2, 6",
                "Ldc_i32 r3, 1",
                "StElem_i32 r2, r1, r3",
            ]
        );
    }

    #[test]
    fn list_creation_allocates_capacity_then_adds() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let body = b.block(&[b.expr_stmt(b.new_list(b.named("int"), &[b.int(9)]))]);
        let main = b.function("main", &[], None, body);
        let emitted = emit(&[b.module("main", &[], &[main])]);

        assert!(emitted.errors.is_empty(), "{:?}", emitted.errors);
        let listing = emitted.listing("main");
        assert!(listing[0].starts_with("NewObj r1, type_"));
        assert_eq!(
            &listing[1..9],
            &[
                "Ldc_i32 r2, 16",
                "NewArr_i32 r3, r2",
                "StFld_ref r3, r1, 4",
                "AddRef r3",
                "Mov r2, r1",
                "Ldc_i32 r4, 9",
                "Mov r3, r4",
                "Invoke r0, r2, builtin -5",
            ]
        );
    }
}
