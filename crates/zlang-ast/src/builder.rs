//! Arena-backed construction of syntax trees.
//!
//! The parser is not part of this workspace, so tests, benchmarks and
//! embedders build trees through [`AstBuilder`]. Every node is allocated in
//! the caller's [`Bump`] arena and stamped with the builder's current span
//! (set with [`AstBuilder::at`]). Scope-introducing nodes receive a fresh
//! [`NodeId`].
//!
//! ```
//! use bumpalo::Bump;
//! use zlang_ast::{AstBuilder, BinaryOp};
//!
//! let arena = Bump::new();
//! let b = AstBuilder::new(&arena);
//! let sum = b.binary(b.int(1), BinaryOp::Add, b.int(2));
//! let body = b.block(&[b.assign(b.name("n"), sum)]);
//! let main = b.function("main", &[], None, body);
//! let module = b.module("main", &[], &[b.global_var("n", Some(b.named("int")), None), main]);
//! assert_eq!(module.items.len(), 2);
//! ```

use std::cell::Cell;

use bumpalo::Bump;
use zlang_core::Span;

use crate::*;

/// Builds arena-allocated syntax trees.
pub struct AstBuilder<'ast> {
    arena: &'ast Bump,
    next_id: Cell<u32>,
    span: Cell<Span>,
}

impl<'ast> AstBuilder<'ast> {
    /// Create a builder allocating into `arena`.
    pub fn new(arena: &'ast Bump) -> Self {
        Self {
            arena,
            next_id: Cell::new(0),
            span: Cell::new(Span::point(1, 1)),
        }
    }

    /// Set the span stamped on subsequently built nodes.
    pub fn at(&self, line: u32, col: u32) -> &Self {
        self.span.set(Span::point(line, col));
        self
    }

    /// The span currently stamped on new nodes.
    pub fn span(&self) -> Span {
        self.span.get()
    }

    fn id(&self) -> NodeId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        NodeId(id)
    }

    fn str(&self, s: &str) -> &'ast str {
        self.arena.alloc_str(s)
    }

    fn slice<T: Copy>(&self, items: &[T]) -> &'ast [T] {
        self.arena.alloc_slice_copy(items)
    }

    fn expr(&self, e: Expr<'ast>) -> &'ast Expr<'ast> {
        self.arena.alloc(e)
    }

    // ========================================================================
    // Names and types
    // ========================================================================

    /// An identifier.
    pub fn ident(&self, name: &str) -> Ident<'ast> {
        Ident::new(self.str(name), self.span())
    }

    /// A named type.
    pub fn named(&self, name: &str) -> TypeExpr<'ast> {
        TypeExpr::Named(self.ident(name))
    }

    /// `element[]`
    pub fn array_type(&self, element: TypeExpr<'ast>) -> TypeExpr<'ast> {
        TypeExpr::Array(self.arena.alloc(element), self.span())
    }

    /// `List<element>`
    pub fn list_type(&self, element: TypeExpr<'ast>) -> TypeExpr<'ast> {
        TypeExpr::List(self.arena.alloc(element), self.span())
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn literal(&self, kind: LiteralKind<'ast>) -> Expr<'ast> {
        Expr::Literal(self.arena.alloc(LiteralExpr {
            kind,
            span: self.span(),
        }))
    }

    /// Integer literal.
    pub fn int(&self, value: i64) -> Expr<'ast> {
        self.literal(LiteralKind::Int(value))
    }

    /// Float literal.
    pub fn float(&self, value: f64) -> Expr<'ast> {
        self.literal(LiteralKind::Float(value))
    }

    /// Boolean literal.
    pub fn bool(&self, value: bool) -> Expr<'ast> {
        self.literal(LiteralKind::Bool(value))
    }

    /// Character literal.
    pub fn char(&self, value: u8) -> Expr<'ast> {
        self.literal(LiteralKind::Char(value))
    }

    /// String literal.
    pub fn string(&self, value: &str) -> Expr<'ast> {
        self.literal(LiteralKind::Str(self.str(value)))
    }

    /// `nil`
    pub fn nil(&self) -> Expr<'ast> {
        self.literal(LiteralKind::Nil)
    }

    /// `null_ptr`
    pub fn null_ptr(&self) -> Expr<'ast> {
        self.literal(LiteralKind::NullPtr)
    }

    /// A name reference.
    pub fn name(&self, name: &str) -> Expr<'ast> {
        Expr::Ident(self.ident(name))
    }

    /// `self`
    pub fn self_ref(&self) -> Expr<'ast> {
        Expr::SelfRef(self.span())
    }

    /// `left op right`
    pub fn binary(&self, left: Expr<'ast>, op: BinaryOp, right: Expr<'ast>) -> Expr<'ast> {
        Expr::Binary(self.arena.alloc(BinaryExpr {
            left: self.expr(left),
            op,
            right: self.expr(right),
            span: self.span(),
        }))
    }

    /// `op operand`
    pub fn unary(&self, op: UnaryOp, operand: Expr<'ast>) -> Expr<'ast> {
        Expr::Unary(self.arena.alloc(UnaryExpr {
            op,
            operand: self.expr(operand),
            span: self.span(),
        }))
    }

    /// `expr as ty`
    pub fn cast(&self, expr: Expr<'ast>, ty: TypeExpr<'ast>) -> Expr<'ast> {
        Expr::Cast(self.arena.alloc(CastExpr {
            expr: self.expr(expr),
            ty,
            span: self.span(),
        }))
    }

    /// `expr is ty`
    pub fn is(&self, expr: Expr<'ast>, ty: TypeExpr<'ast>) -> Expr<'ast> {
        Expr::Is(self.arena.alloc(IsExpr {
            expr: self.expr(expr),
            ty,
            span: self.span(),
        }))
    }

    /// `then if cond else otherwise`
    pub fn ternary(&self, then: Expr<'ast>, cond: Expr<'ast>, otherwise: Expr<'ast>) -> Expr<'ast> {
        Expr::Ternary(self.arena.alloc(TernaryExpr {
            then: self.expr(then),
            cond: self.expr(cond),
            otherwise: self.expr(otherwise),
            span: self.span(),
        }))
    }

    /// `callee(args)`
    pub fn call(&self, callee: &str, args: &[Expr<'ast>]) -> Expr<'ast> {
        Expr::Call(self.arena.alloc(CallExpr {
            callee: self.ident(callee),
            args: self.slice(args),
            span: self.span(),
        }))
    }

    /// `receiver.method(args)`
    pub fn method_call(&self, receiver: Expr<'ast>, method: &str, args: &[Expr<'ast>]) -> Expr<'ast> {
        Expr::MethodCall(self.arena.alloc(MethodCallExpr {
            receiver: self.expr(receiver),
            method: self.ident(method),
            args: self.slice(args),
            span: self.span(),
        }))
    }

    /// `object.field`
    pub fn field(&self, object: Expr<'ast>, field: &str) -> Expr<'ast> {
        Expr::Field(self.arena.alloc(FieldExpr {
            object: self.expr(object),
            field: self.ident(field),
            span: self.span(),
        }))
    }

    /// `object[index]`
    pub fn index(&self, object: Expr<'ast>, index: Expr<'ast>) -> Expr<'ast> {
        Expr::Index(self.arena.alloc(IndexExpr {
            object: self.expr(object),
            index: self.expr(index),
            span: self.span(),
        }))
    }

    /// `Type { name: value, ... }`
    pub fn new_object(&self, ty: &str, fields: &[(&str, Expr<'ast>)]) -> Expr<'ast> {
        let inits: Vec<FieldInit<'ast>> = fields
            .iter()
            .map(|(name, value)| FieldInit {
                name: self.ident(name),
                value: self.expr(*value),
            })
            .collect();
        Expr::New(self.arena.alloc(NewExpr {
            ty: self.ident(ty),
            fields: self.slice(&inits),
            span: self.span(),
        }))
    }

    /// `element[size]`
    pub fn new_array(&self, element: TypeExpr<'ast>, size: Expr<'ast>) -> Expr<'ast> {
        Expr::NewArray(self.arena.alloc(NewArrayExpr {
            element,
            size: Some(self.expr(size)),
            elements: &[],
            span: self.span(),
        }))
    }

    /// `element[] { elements }`
    pub fn array_literal(&self, element: TypeExpr<'ast>, elements: &[Expr<'ast>]) -> Expr<'ast> {
        Expr::NewArray(self.arena.alloc(NewArrayExpr {
            element,
            size: None,
            elements: self.slice(elements),
            span: self.span(),
        }))
    }

    /// `List<element> { elements }`
    pub fn new_list(&self, element: TypeExpr<'ast>, elements: &[Expr<'ast>]) -> Expr<'ast> {
        Expr::NewList(self.arena.alloc(NewListExpr {
            element,
            elements: self.slice(elements),
            span: self.span(),
        }))
    }

    /// `{ stmts }` used as a value.
    pub fn block_expr(&self, stmts: &[Stmt<'ast>]) -> Expr<'ast> {
        let block = self.block(stmts);
        Expr::Block(self.arena.alloc(BlockExpr {
            block,
            span: self.span(),
        }))
    }

    /// A switch clause handling `field`, binding the payload to `binding`.
    pub fn clause(&self, field: &str, binding: Option<&str>, body: Expr<'ast>) -> SwitchClause<'ast> {
        SwitchClause {
            id: self.id(),
            field: self.ident(field),
            binding: binding.map(|b| self.ident(b)),
            body: self.expr(body),
            span: self.span(),
        }
    }

    /// `switch subject { clauses, else => otherwise }`
    pub fn switch(
        &self,
        subject: Expr<'ast>,
        clauses: &[SwitchClause<'ast>],
        otherwise: Option<Expr<'ast>>,
    ) -> Expr<'ast> {
        Expr::Switch(self.arena.alloc(SwitchExpr {
            subject: self.expr(subject),
            clauses: self.slice(clauses),
            otherwise: otherwise.map(|e| self.expr(e)),
            span: self.span(),
        }))
    }

    // ========================================================================
    // Statements
    // ========================================================================

    /// A braced block.
    pub fn block(&self, stmts: &[Stmt<'ast>]) -> Block<'ast> {
        Block {
            id: self.id(),
            stmts: self.slice(stmts),
            span: self.span(),
        }
    }

    fn var_decl(
        &self,
        name: &str,
        ty: Option<TypeExpr<'ast>>,
        init: Option<Expr<'ast>>,
        mutable: bool,
    ) -> &'ast VarDecl<'ast> {
        self.arena.alloc(VarDecl {
            name: self.ident(name),
            ty,
            init: init.map(|e| self.expr(e)),
            mutable,
            span: self.span(),
        })
    }

    /// `var name: ty = init`
    pub fn var(&self, name: &str, ty: Option<TypeExpr<'ast>>, init: Option<Expr<'ast>>) -> Stmt<'ast> {
        Stmt::Var(self.var_decl(name, ty, init, true))
    }

    /// `let name: ty = init`
    pub fn let_(&self, name: &str, ty: Option<TypeExpr<'ast>>, init: Expr<'ast>) -> Stmt<'ast> {
        Stmt::Var(self.var_decl(name, ty, Some(init), false))
    }

    /// `target = value`
    pub fn assign(&self, target: Expr<'ast>, value: Expr<'ast>) -> Stmt<'ast> {
        Stmt::Assign(self.arena.alloc(AssignStmt {
            target: self.expr(target),
            value: self.expr(value),
            span: self.span(),
        }))
    }

    /// An expression statement.
    pub fn expr_stmt(&self, expr: Expr<'ast>) -> Stmt<'ast> {
        Stmt::Expr(self.arena.alloc(ExprStmt {
            expr: self.expr(expr),
            span: self.span(),
        }))
    }

    /// `if cond { then } else { otherwise }`
    pub fn if_(&self, cond: Expr<'ast>, then: Block<'ast>, otherwise: Option<Block<'ast>>) -> Stmt<'ast> {
        self.if_chain(&[(cond, then)], otherwise)
    }

    /// `if c1 { } else if c2 { } ... else { }`
    pub fn if_chain(
        &self,
        branches: &[(Expr<'ast>, Block<'ast>)],
        otherwise: Option<Block<'ast>>,
    ) -> Stmt<'ast> {
        let branches: Vec<CondBlock<'ast>> = branches
            .iter()
            .map(|(cond, body)| CondBlock {
                cond: self.expr(*cond),
                body: *body,
            })
            .collect();
        Stmt::If(self.arena.alloc(IfStmt {
            branches: self.slice(&branches),
            otherwise,
            span: self.span(),
        }))
    }

    /// `while cond { body }`
    pub fn while_(&self, cond: Expr<'ast>, body: Block<'ast>) -> Stmt<'ast> {
        Stmt::While(self.arena.alloc(WhileStmt {
            cond: self.expr(cond),
            body,
            span: self.span(),
        }))
    }

    /// `for var in from..to [step step] { body }`
    pub fn for_range(
        &self,
        var: &str,
        from: Expr<'ast>,
        to: Expr<'ast>,
        step: Option<Expr<'ast>>,
        body: Block<'ast>,
    ) -> Stmt<'ast> {
        Stmt::ForRange(self.arena.alloc(ForRangeStmt {
            id: self.id(),
            var: self.ident(var),
            from: self.expr(from),
            to: self.expr(to),
            step: step.map(|e| self.expr(e)),
            body,
            span: self.span(),
        }))
    }

    /// `for var in iterable { body }`
    pub fn for_each(&self, var: &str, iterable: Expr<'ast>, body: Block<'ast>) -> Stmt<'ast> {
        Stmt::ForEach(self.arena.alloc(ForEachStmt {
            id: self.id(),
            var: self.ident(var),
            iterable: self.expr(iterable),
            body,
            span: self.span(),
        }))
    }

    /// `return [value]`
    pub fn ret(&self, value: Option<Expr<'ast>>) -> Stmt<'ast> {
        Stmt::Return(self.arena.alloc(ReturnStmt {
            value: value.map(|e| self.expr(e)),
            span: self.span(),
        }))
    }

    /// `yield value`
    pub fn yield_(&self, value: Expr<'ast>) -> Stmt<'ast> {
        Stmt::Yield(self.arena.alloc(YieldStmt {
            value: self.expr(value),
            span: self.span(),
        }))
    }

    /// `panic value`
    pub fn panic(&self, value: Expr<'ast>) -> Stmt<'ast> {
        Stmt::Panic(self.arena.alloc(PanicStmt {
            value: self.expr(value),
            span: self.span(),
        }))
    }

    /// A nested block statement.
    pub fn block_stmt(&self, stmts: &[Stmt<'ast>]) -> Stmt<'ast> {
        Stmt::Block(self.arena.alloc(self.block(stmts)))
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    /// `name: ty`
    pub fn param(&self, name: &str, ty: TypeExpr<'ast>) -> Param<'ast> {
        Param {
            name: self.ident(name),
            ty,
            span: self.span(),
        }
    }

    fn idents(&self, names: &[&str]) -> &'ast [Ident<'ast>] {
        let idents: Vec<Ident<'ast>> = names.iter().map(|n| self.ident(n)).collect();
        self.slice(&idents)
    }

    /// `struct name { fields } is implements`
    pub fn struct_decl(&self, name: &str, fields: &[Param<'ast>], implements: &[&str]) -> Item<'ast> {
        Item::Struct(self.arena.alloc(StructDecl {
            id: self.id(),
            name: self.ident(name),
            fields: self.slice(fields),
            implements: self.idents(implements),
            span: self.span(),
        }))
    }

    /// `union name { fields } is implements`
    pub fn union_decl(&self, name: &str, fields: &[Param<'ast>], implements: &[&str]) -> Item<'ast> {
        Item::Union(self.arena.alloc(UnionDecl {
            id: self.id(),
            name: self.ident(name),
            fields: self.slice(fields),
            implements: self.idents(implements),
            span: self.span(),
        }))
    }

    /// An interface method signature.
    pub fn interface_method(
        &self,
        name: &str,
        params: &[Param<'ast>],
        ret: Option<TypeExpr<'ast>>,
    ) -> InterfaceMember<'ast> {
        InterfaceMember::Method(InterfaceMethodDecl {
            id: self.id(),
            name: self.ident(name),
            params: self.slice(params),
            ret,
            span: self.span(),
        })
    }

    /// `interface name { members }`
    pub fn interface_decl(&self, name: &str, members: &[InterfaceMember<'ast>]) -> Item<'ast> {
        Item::Interface(self.arena.alloc(InterfaceDecl {
            id: self.id(),
            name: self.ident(name),
            members: self.slice(members),
            span: self.span(),
        }))
    }

    fn function_decl(
        &self,
        receiver: Option<&str>,
        name: &str,
        params: &[Param<'ast>],
        ret: Option<TypeExpr<'ast>>,
        body: Block<'ast>,
    ) -> Item<'ast> {
        Item::Function(self.arena.alloc(FunctionDecl {
            id: self.id(),
            receiver: receiver.map(|r| self.ident(r)),
            name: self.ident(name),
            params: self.slice(params),
            ret,
            body,
            span: self.span(),
        }))
    }

    /// `fn name(params) -> ret { body }`
    pub fn function(
        &self,
        name: &str,
        params: &[Param<'ast>],
        ret: Option<TypeExpr<'ast>>,
        body: Block<'ast>,
    ) -> Item<'ast> {
        self.function_decl(None, name, params, ret, body)
    }

    /// `fn receiver::name(params) -> ret { body }`
    pub fn method(
        &self,
        receiver: &str,
        name: &str,
        params: &[Param<'ast>],
        ret: Option<TypeExpr<'ast>>,
        body: Block<'ast>,
    ) -> Item<'ast> {
        self.function_decl(Some(receiver), name, params, ret, body)
    }

    /// Module-level `var`.
    pub fn global_var(&self, name: &str, ty: Option<TypeExpr<'ast>>, init: Option<Expr<'ast>>) -> Item<'ast> {
        Item::Global(self.var_decl(name, ty, init, true))
    }

    /// Module-level `let`.
    pub fn global_let(&self, name: &str, ty: Option<TypeExpr<'ast>>, init: Expr<'ast>) -> Item<'ast> {
        Item::Global(self.var_decl(name, ty, Some(init), false))
    }

    /// A module parsed from `<name>.zl`.
    pub fn module(&self, name: &str, uses: &[&str], items: &[Item<'ast>]) -> Module<'ast> {
        let file = format!("{name}.zl");
        Module {
            id: self.id(),
            name: self.str(name),
            file: self.str(&file),
            uses: self.idents(uses),
            items: self.slice(items),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_nodes_get_distinct_ids() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let inner = b.block(&[]);
        let outer = b.block(&[b.block_stmt(&[])]);
        assert_ne!(inner.id, outer.id);
    }

    #[test]
    fn at_sets_span_of_following_nodes() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let first = b.at(3, 7).name("x");
        let second = b.at(4, 1).int(1);
        assert_eq!(first.span(), Span::point(3, 7));
        assert_eq!(second.span(), Span::point(4, 1));
    }

    #[test]
    fn method_records_receiver() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let item = b.method("Point", "len", &[], Some(b.named("int")), b.block(&[]));
        match item {
            Item::Function(f) => {
                assert!(f.is_method());
                assert_eq!(f.receiver.map(|r| r.name), Some("Point"));
                assert_eq!(f.name.name, "len");
            }
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn module_file_name_follows_module_name() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let module = b.module("dep", &["core"], &[]);
        assert_eq!(module.file, "dep.zl");
        assert_eq!(module.uses[0].name, "core");
    }

    #[test]
    fn type_expr_display() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let ty = b.list_type(b.array_type(b.named("int")));
        assert_eq!(ty.to_string(), "List<int[]>");
    }

    #[test]
    fn places_are_assignable_forms() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        assert!(b.name("x").is_place());
        assert!(b.field(b.self_ref(), "x").is_place());
        assert!(!b.int(1).is_place());
    }
}
