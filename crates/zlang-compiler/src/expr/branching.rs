//! Value-producing control flow: ternaries, block expressions and union
//! switches.
//!
//! Each form acquires its result register before any branch, every arm
//! moves its value there and jumps to a shared exit label. The result type
//! is the unification of all arm types.

use zlang_ast::{BlockExpr, SwitchExpr, TernaryExpr};
use zlang_core::{CompilationError, InternalError, Span};
use zlang_registry::{SymbolId, TypeId};

use super::compile_expr;
use crate::emit::{EmitResult, FunctionEmitter, Value, unify};
use crate::ir::{Immediate, OpCode, Register};

/// Fold one more arm type into the result type.
fn merge(fe: &FunctionEmitter<'_>, seen: Option<TypeId>, next: TypeId, span: Span) -> EmitResult<TypeId> {
    unify(fe.registry, seen, next).ok_or_else(|| {
        CompilationError::type_mismatch(
            format!(
                "arms yield '{}' and '{}'",
                seen.map(|t| fe.type_name(t)).unwrap_or_default(),
                fe.type_name(next)
            ),
            span,
        )
        .into()
    })
}

/// `then if cond else otherwise`
pub(super) fn compile_ternary(fe: &mut FunctionEmitter<'_>, expr: &TernaryExpr<'_>) -> EmitResult<Value> {
    let target = fe.acquire()?;
    let exit = fe.new_label();
    let otherwise = fe.new_label();

    let cond = compile_expr(fe, expr.cond)?;
    fe.expect_condition(cond, expr.cond.span())?;
    fe.branch_if_zero(cond.register, otherwise);
    fe.release(cond);

    let then = compile_expr(fe, expr.then)?;
    fe.mov(target, then.register);
    fe.release(then);
    fe.branch(exit);

    fe.mark(otherwise)?;
    let other = compile_expr(fe, expr.otherwise)?;
    fe.mov(target, other.register);
    fe.release(other);
    fe.mark_nop(exit)?;

    let ty = merge(fe, Some(then.ty), other.ty, expr.span)?;
    Ok(Value::temporary(target, ty))
}

/// `{ ... yield v ... }`
pub(super) fn compile_block_expr(fe: &mut FunctionEmitter<'_>, expr: &BlockExpr<'_>) -> EmitResult<Value> {
    let target = fe.acquire()?;
    let exit = fe.new_label();
    fe.yields.push(target, exit);
    let body = crate::stmt::compile_block(fe, &expr.block);
    let context = fe.yields.pop();
    body?;
    fe.mark_nop(exit)?;

    match context.and_then(|c| c.ty) {
        Some(ty) => Ok(Value::temporary(target, ty)),
        None => Err(CompilationError::invalid("block expression never yields a value", expr.span).into()),
    }
}

/// A union switch:
///
/// ```text
///     LdFld_u8  flag, subject, #flag_offset
/// clause:
///     Ldc_i32   c, <field id>
///     Eq_u8     c, flag, c
///     Br_zero   c, next
///     LdFld     binding, subject, #0
///     <body>    -> result
///     Br        exit
/// next:
///     ...
///     <else>    -> result
/// exit:
///     Nop
/// ```
pub(super) fn compile_switch(fe: &mut FunctionEmitter<'_>, expr: &SwitchExpr<'_>) -> EmitResult<Value> {
    let subject = compile_expr(fe, expr.subject)?;
    let union = subject.ty;
    let (fields, flag) = match fe.registry.ty(union).aggregate() {
        Some(aggregate) if fe.registry.ty(union).is_union() => (aggregate.fields.clone(), aggregate.flag),
        _ => {
            return Err(CompilationError::type_mismatch(
                format!("cannot switch over '{}'", fe.type_name(union)),
                expr.subject.span(),
            )
            .into());
        }
    };
    let flag = flag.ok_or_else(|| InternalError::Invariant(format!("union '{}' has no flag", fe.type_name(union))))?;
    let flag_offset = fe.registry.symbol(flag).require_address()?;

    // Validate every clause before emitting anything.
    let mut handled: Vec<SymbolId> = Vec::with_capacity(expr.clauses.len());
    for clause in expr.clauses {
        let field = fe
            .registry
            .resolve_member(union, clause.field.name)
            .filter(|f| fields.contains(f))
            .ok_or_else(|| CompilationError::UnresolvedSymbol {
                name: format!("{}.{}", fe.type_name(union), clause.field.name),
                span: clause.field.span,
            })?;
        if handled.contains(&field) {
            return Err(CompilationError::invalid(
                format!("'{}' is handled twice", clause.field.name),
                clause.field.span,
            )
            .into());
        }
        handled.push(field);
    }
    if expr.otherwise.is_none() {
        let missing: Vec<String> = fields
            .iter()
            .filter(|f| !handled.contains(f))
            .map(|f| fe.registry.symbol(*f).name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(CompilationError::NonExhaustiveUnionSwitch {
                union_name: fe.type_name(union),
                missing,
                span: expr.span,
            }
            .into());
        }
    }

    let flag_register = fe.acquire()?;
    fe.push(OpCode::LdFldU8, &[flag_register, subject.register], Some(Immediate::Int(flag_offset)));
    let target = fe.acquire()?;
    let exit = fe.new_label();
    let mut ty = None;

    for (clause, field) in expr.clauses.iter().zip(&handled) {
        let next = fe.new_label();
        let id = fe.registry.field_id(union, *field).ok_or_else(|| {
            InternalError::Invariant(format!("'{}' is not a field of '{}'", clause.field, fe.type_name(union)))
        })?;
        let cond = fe.acquire()?;
        fe.load_int(cond, id as i32);
        fe.push(OpCode::EqU8, &[cond, flag_register, cond], None);
        fe.branch_if_zero(cond, next);
        fe.release_register(cond);

        let scope = fe.scope_of(clause.id)?;
        let body = fe.with_scope(scope, |fe| -> EmitResult<Value> {
            if let Some(binding) = clause.binding {
                let local = fe.registry.scope(scope).get(binding.name);
                if let Some(local) = local {
                    bind_payload(fe, local, subject.register, *field, clause.field.span)?;
                }
            }
            compile_expr(fe, clause.body)
        })?;
        ty = Some(merge(fe, ty, body.ty, clause.span)?);
        fe.mov(target, body.register);
        fe.release(body);
        fe.branch(exit);
        fe.mark(next)?;
    }

    if let Some(otherwise) = expr.otherwise {
        let body = compile_expr(fe, otherwise)?;
        ty = Some(merge(fe, ty, body.ty, otherwise.span())?);
        fe.mov(target, body.register);
        fe.release(body);
    }
    fe.mark_nop(exit)?;
    fe.release_register(flag_register);
    fe.release(subject);

    let ty = ty.ok_or_else(|| CompilationError::invalid("switch has no arms", expr.span))?;
    Ok(Value::temporary(target, ty))
}

/// Load the active payload into a clause binding.
fn bind_payload(
    fe: &mut FunctionEmitter<'_>,
    local: SymbolId,
    subject: Register,
    field: SymbolId,
    span: Span,
) -> EmitResult<()> {
    let offset = fe.registry.symbol(field).require_address()?;
    let ty = fe.symbol_type(field, span)?;
    fe.registry.infer_type(local, ty)?;

    let slot = fe.slot(local)?;
    let rt = fe.register_type(ty);
    let load = fe.select(OpCode::ld_fld(rt), span, || "payload has no storage".to_string())?;
    let is_ref = fe.is_ref(ty);
    if is_ref && fe.loop_depth > 0 {
        fe.push(OpCode::RemoveRef, &[slot], None);
    }
    fe.push(load, &[slot, subject], Some(Immediate::Int(offset)));
    if is_ref {
        fe.push(OpCode::AddRef, &[slot], None);
    }
    fe.declare(local);
    Ok(())
}

#[cfg(test)]
mod tests {
    use bumpalo::Bump;
    use zlang_ast::{AstBuilder, BinaryOp};
    use zlang_core::CompilationError;
    use zlang_registry::primitives;

    use crate::emit::test_support::emit;

    fn shape<'a>(b: &AstBuilder<'a>) -> zlang_ast::Item<'a> {
        b.union_decl(
            "Shape",
            &[b.param("circle", b.named("float")), b.param("square", b.named("int"))],
            &[],
        )
    }

    #[test]
    fn ternary_moves_both_arms_into_one_register() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let body = b.block(&[b.ret(Some(b.ternary(
            b.int(1),
            b.binary(b.name("x"), BinaryOp::Gt, b.int(0)),
            b.int(2),
        )))]);
        let f = b.function("f", &[b.param("x", b.named("int"))], Some(b.named("int")), body);
        let main = b.function("main", &[], None, b.block(&[]));
        let emitted = emit(&[b.module("main", &[], &[f, main])]);

        assert!(emitted.errors.is_empty(), "{:?}", emitted.errors);
        assert_eq!(
            &emitted.listing("f")[..9],
            &[
                "Ldc_i32 r3, 0",
                "Gt_i32 r3, r1, r3",
                "Br_zero r3, L2",
                "Ldc_i32 r3, 1",
                "Mov r2, r3",
                "Br L1",
                "Ldc_i32 r3, 2",
                "Mov r2, r3",
                "Nop",
            ]
        );
    }

    #[test]
    fn block_expression_takes_the_type_of_its_yields() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let value = b.block_expr(&[
            b.if_(b.name("flag"), b.block(&[b.yield_(b.int(1))]), None),
            b.yield_(b.int(1000)),
        ]);
        let body = b.block(&[b.var("n", None, Some(value))]);
        let f = b.function("f", &[b.param("flag", b.named("bool"))], None, body);
        let main = b.function("main", &[], None, b.block(&[]));
        let emitted = emit(&[b.module("main", &[], &[f, main])]);

        assert!(emitted.errors.is_empty(), "{:?}", emitted.errors);
        let function = emitted.function("f").function;
        let n = emitted.registry.callable(function).unwrap().locals[0];
        assert_eq!(emitted.registry.symbol(n).ty, Some(primitives::INT));
    }

    #[test]
    fn block_expression_without_yield_is_rejected() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let body = b.block(&[b.expr_stmt(b.block_expr(&[]))]);
        let main = b.function("main", &[], None, body);
        let emitted = emit(&[b.module("main", &[], &[main])]);

        assert_eq!(emitted.errors.len(), 1);
        assert!(emitted.errors[0].to_string().contains("never yields"));
    }

    #[test]
    fn switch_compares_the_flag_per_clause() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let value = b.switch(
            b.name("s"),
            &[
                b.clause("circle", Some("c"), b.int(1)),
                b.clause("square", Some("q"), b.int(2)),
            ],
            None,
        );
        let area = b.function(
            "kind",
            &[b.param("s", b.named("Shape"))],
            Some(b.named("int")),
            b.block(&[b.ret(Some(value))]),
        );
        let main = b.function("main", &[], None, b.block(&[]));
        let emitted = emit(&[b.module("main", &[], &[shape(&b), area, main])]);

        assert!(emitted.errors.is_empty(), "{:?}", emitted.errors);
        assert_eq!(
            &emitted.listing("kind")[..19],
            &[
                "AddRef r1",
                "LdFld_u8 r4, r1, 8",
                "Ldc_i32 r6, 0",
                "Eq_u8 r6, r4, r6",
                "Br_zero r6, L2",
                "LdFld_f64 r2, r1, 0",
                "Ldc_i32 r6, 1",
                "Mov r5, r6",
                "Br L1",
                "Ldc_i32 r6, 1",
                "Eq_u8 r6, r4, r6",
                "Br_zero r6, L3",
                "LdFld_i32 r3, r1, 0",
                "Ldc_i32 r6, 2",
                "Mov r5, r6",
                "Br L1",
                "Nop",
                "Mov r0, r5",
                "Br L0",
            ]
        );
    }

    #[test]
    fn switch_without_else_must_cover_every_field() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let partial = b.switch(b.name("s"), &[b.clause("square", None, b.int(1))], None);
        let covered = b.switch(b.name("s"), &[b.clause("square", None, b.int(1))], Some(b.int(0)));
        let body = b.block(&[b.expr_stmt(partial), b.expr_stmt(covered)]);
        let f = b.function("f", &[b.param("s", b.named("Shape"))], None, body);
        let main = b.function("main", &[], None, b.block(&[]));
        let emitted = emit(&[b.module("main", &[], &[shape(&b), f, main])]);

        assert_eq!(emitted.errors.len(), 1, "{:?}", emitted.errors);
        match &emitted.errors[0].error {
            CompilationError::NonExhaustiveUnionSwitch { union_name, missing, .. } => {
                assert_eq!(union_name, "Shape");
                assert_eq!(missing, &vec!["circle".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
