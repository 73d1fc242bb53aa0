//! Completion Pass (Pass 2) - fill in everything that refers to types.
//!
//! Every aggregate name is bound after registration, so field types,
//! implemented interfaces and signatures can be resolved in any order.
//!
//! ## Responsibilities
//!
//! - Add struct and union fields and close their layouts
//! - Attach implemented interfaces and declare interface methods
//! - Declare functions and methods with their parameters
//! - Walk every body and declare its locals, creating block, `for` and
//!   switch-clause scopes
//! - Declare module-level variables; their initializers run in the
//!   module's init function, so locals of initializer block expressions
//!   belong to it
//! - Check the entry point and build the virtual table of every aggregate
//!   implementing interfaces

use tracing::debug;
use zlang_ast::{
    Block, Expr, FunctionDecl, InterfaceDecl, InterfaceMember, Item, LiteralKind, Module, Param,
    Stmt, VarDecl,
};
use zlang_core::{CompilationError, Diagnostics, InternalError};
use zlang_registry::{
    FunctionKind, ScopeId, ScopeKind, SymbolId, SymbolKind, SymbolRegistry, TypeId, TypeKind,
    primitives,
};

use crate::ScopeMap;
use crate::type_resolver::TypeResolver;

/// Output of the completion pass.
#[derive(Debug, Default)]
pub struct CompletionOutput {
    /// Number of struct and union fields added.
    pub fields_registered: usize,
    /// Number of functions, methods and interface methods declared.
    pub functions_registered: usize,
    /// Number of module-level variables declared.
    pub globals_registered: usize,
    /// Number of locals declared across all functions.
    pub locals_registered: usize,
    /// The `main` function, when it exists and is well-formed.
    pub entry_point: Option<SymbolId>,
    /// Collected errors.
    pub errors: Diagnostics,
}

/// The module being completed.
#[derive(Clone, Copy)]
struct ModuleContext<'m> {
    scope: ScopeId,
    file: &'m str,
    init: SymbolId,
}

/// Pass 2: complete aggregates, signatures, locals and globals.
pub struct CompletionPass<'a> {
    registry: &'a mut SymbolRegistry,
    scopes: &'a mut ScopeMap,
    diagnostics: Diagnostics,
    output: CompletionOutput,
}

impl<'a> CompletionPass<'a> {
    /// Create a new completion pass.
    pub fn new(registry: &'a mut SymbolRegistry, scopes: &'a mut ScopeMap) -> Self {
        Self {
            registry,
            scopes,
            diagnostics: Diagnostics::new(),
            output: CompletionOutput::default(),
        }
    }

    /// Run the completion pass over every module, in order.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn run(mut self, modules: &[Module<'_>]) -> Result<CompletionOutput, InternalError> {
        for module in modules {
            // Modules that failed to register are skipped.
            let (Some(scope), Some(init)) = (self.scopes.try_get(module.id), self.scopes.init(module.id)) else {
                continue;
            };
            let cx = ModuleContext {
                scope,
                file: module.file,
                init,
            };
            for item in module.items {
                self.visit_item(cx, item)?;
            }
        }

        self.output.entry_point = self.check_entry_point(modules);
        self.check_virtual_tables(modules);

        debug!(
            fields = self.output.fields_registered,
            functions = self.output.functions_registered,
            globals = self.output.globals_registered,
            locals = self.output.locals_registered,
            errors = self.diagnostics.len(),
            "completion pass finished"
        );
        self.output.errors = self.diagnostics;
        Ok(self.output)
    }

    fn report(&mut self, cx: ModuleContext<'_>, error: CompilationError) {
        self.diagnostics.report(cx.file, error);
    }

    fn visit_item(&mut self, cx: ModuleContext<'_>, item: &Item<'_>) -> Result<(), InternalError> {
        match item {
            Item::Struct(decl) => self.complete_aggregate(cx, decl.name.name, decl.fields, decl.implements),
            Item::Union(decl) => self.complete_aggregate(cx, decl.name.name, decl.fields, decl.implements),
            Item::Interface(decl) => self.complete_interface(cx, decl),
            Item::Function(decl) => self.declare_function(cx, decl),
            Item::Global(decl) => self.declare_global(cx, decl),
        }
    }

    // ==========================================================================
    // Aggregates
    // ==========================================================================

    /// The type declared as `name` in the module, if registration succeeded.
    fn own_type(&self, cx: ModuleContext<'_>, name: &str) -> Option<TypeId> {
        self.registry
            .scope(cx.scope)
            .get(name)
            .and_then(|s| self.registry.symbol(s).kind.named_type())
    }

    fn complete_aggregate(
        &mut self,
        cx: ModuleContext<'_>,
        name: &str,
        fields: &[Param<'_>],
        implements: &[zlang_ast::Ident<'_>],
    ) -> Result<(), InternalError> {
        let Some(ty) = self.own_type(cx, name) else {
            return Ok(());
        };

        for field in fields {
            let field_ty = match TypeResolver::new(self.registry).resolve(cx.scope, &field.ty) {
                Ok(t) => t,
                Err(e) => {
                    self.report(cx, e);
                    continue;
                }
            };
            match self.registry.add_field(ty, field.name.name, field_ty, field.name.span) {
                Ok(_) => self.output.fields_registered += 1,
                Err(e) => self.report(cx, e),
            }
        }

        for iface in implements {
            match self.registry.resolve_type(cx.scope, iface.name) {
                Some(i) if self.registry.ty(i).is_interface() => self.registry.add_interface(ty, i)?,
                Some(_) => self.report(
                    cx,
                    CompilationError::type_mismatch(format!("'{}' is not an interface", iface.name), iface.span),
                ),
                None => self.report(cx, CompilationError::unresolved(iface.name, iface.span)),
            }
        }

        self.registry.finish_aggregate(ty)
    }

    fn complete_interface(&mut self, cx: ModuleContext<'_>, decl: &InterfaceDecl<'_>) -> Result<(), InternalError> {
        let Some(ty) = self.own_type(cx, decl.name.name) else {
            return Ok(());
        };
        let scope = self.scopes.get(decl.id)?;

        for member in decl.members {
            let InterfaceMember::Method(method) = member else {
                continue;
            };
            let Some((params, ret)) = self.resolve_signature(cx, method.params, method.ret.as_ref()) else {
                continue;
            };
            let function = match self.registry.declare_function(
                FunctionKind::InterfaceMethod,
                scope,
                method.name.name,
                ret,
                method.name.span,
            ) {
                Ok(f) => f,
                Err(e) => {
                    self.report(cx, e);
                    continue;
                }
            };
            self.output.functions_registered += 1;
            self.add_params(cx, function, method.params, &params);
            let params_scope = self.callable_scope(function)?;
            self.scopes.insert(method.id, params_scope)?;
        }
        debug!(interface = %self.registry.type_name(ty), "completed interface");
        Ok(())
    }

    // ==========================================================================
    // Functions and methods
    // ==========================================================================

    /// Resolve parameter and return types; `None` after reporting a failure.
    fn resolve_signature(
        &mut self,
        cx: ModuleContext<'_>,
        params: &[Param<'_>],
        ret: Option<&zlang_ast::TypeExpr<'_>>,
    ) -> Option<(Vec<TypeId>, Option<TypeId>)> {
        let mut ok = true;
        let mut types = Vec::with_capacity(params.len());
        for param in params {
            match TypeResolver::new(self.registry).resolve(cx.scope, &param.ty) {
                Ok(t) => types.push(t),
                Err(e) => {
                    self.report(cx, e);
                    ok = false;
                }
            }
        }
        let ret = match TypeResolver::new(self.registry).resolve_opt(cx.scope, ret) {
            Ok(r) => r,
            Err(e) => {
                self.report(cx, e);
                ok = false;
                None
            }
        };
        ok.then_some((types, ret))
    }

    fn add_params(&mut self, cx: ModuleContext<'_>, function: SymbolId, params: &[Param<'_>], types: &[TypeId]) {
        for (param, ty) in params.iter().zip(types) {
            if let Err(e) = self.registry.add_param(function, param.name.name, *ty, param.name.span) {
                self.report(cx, e);
            }
        }
    }

    fn callable_scope(&self, function: SymbolId) -> Result<ScopeId, InternalError> {
        self.registry
            .callable(function)
            .map(|c| c.scope)
            .ok_or_else(|| InternalError::Invariant(format!("'{}' is not callable", self.registry.symbol(function).name)))
    }

    /// The member scope a method on `receiver` is declared in.
    ///
    /// Methods can only be added to structs and unions of the same module.
    fn receiver_scope(
        &mut self,
        cx: ModuleContext<'_>,
        receiver: &zlang_ast::Ident<'_>,
    ) -> Option<ScopeId> {
        let Some(ty) = self.registry.resolve_type(cx.scope, receiver.name) else {
            self.report(cx, CompilationError::unresolved(receiver.name, receiver.span));
            return None;
        };
        let def = self.registry.ty(ty);
        let scope = match &def.kind {
            TypeKind::Struct(a) | TypeKind::Union(a) => a.scope,
            _ => {
                self.report(
                    cx,
                    CompilationError::invalid(
                        format!("methods can only be declared on structs and unions, not '{}'", def.name),
                        receiver.span,
                    ),
                );
                return None;
            }
        };
        if def.module != Some(cx.scope) {
            let owner = def.module.map_or("<builtin>", |m| self.registry.module_name(m)).to_string();
            self.report(
                cx,
                CompilationError::ForeignAccessDenied {
                    message: format!("methods of '{}' can only be declared in module '{owner}'", receiver.name),
                    span: receiver.span,
                },
            );
            return None;
        }
        Some(scope)
    }

    fn declare_function(&mut self, cx: ModuleContext<'_>, decl: &FunctionDecl<'_>) -> Result<(), InternalError> {
        let (kind, scope) = match &decl.receiver {
            Some(receiver) => match self.receiver_scope(cx, receiver) {
                Some(scope) => (FunctionKind::Method, scope),
                None => return Ok(()),
            },
            None => (FunctionKind::Function, cx.scope),
        };
        let Some((params, ret)) = self.resolve_signature(cx, decl.params, decl.ret.as_ref()) else {
            return Ok(());
        };

        let function = match self
            .registry
            .declare_function(kind, scope, decl.name.name, ret, decl.name.span)
        {
            Ok(f) => f,
            Err(e) => {
                self.report(cx, e);
                return Ok(());
            }
        };
        self.output.functions_registered += 1;
        self.add_params(cx, function, decl.params, &params);

        let params_scope = self.callable_scope(function)?;
        self.scopes.insert(decl.id, params_scope)?;
        self.scopes.insert_function(decl.id, function);

        // The body shares the parameter scope: a local may not shadow a parameter.
        let mut locals = LocalCollector {
            pass: self,
            cx,
            function,
        };
        locals.body(params_scope, &decl.body)
    }

    // ==========================================================================
    // Globals
    // ==========================================================================

    /// The type of a global without annotation: only literal initializers
    /// give one.
    fn literal_type(&self, init: Option<&Expr<'_>>) -> Option<TypeId> {
        let Some(Expr::Literal(literal)) = init else {
            return None;
        };
        match literal.kind {
            LiteralKind::Int(v) => Some(self.registry.literal_type(v)),
            LiteralKind::Float(_) => Some(primitives::FLOAT),
            LiteralKind::Bool(_) => Some(primitives::BOOL),
            LiteralKind::Char(_) => Some(primitives::BYTE),
            LiteralKind::Str(_) => Some(primitives::STRING),
            LiteralKind::NullPtr => Some(primitives::RUNTIME_PTR),
            LiteralKind::Nil => None,
        }
    }

    fn declare_global(&mut self, cx: ModuleContext<'_>, decl: &VarDecl<'_>) -> Result<(), InternalError> {
        if let Some(init) = decl.init {
            let init_scope = self.callable_scope(cx.init)?;
            let mut locals = LocalCollector {
                pass: self,
                cx,
                function: cx.init,
            };
            locals.expr(init_scope, init)?;
        }

        let ty = match &decl.ty {
            Some(ty) => match TypeResolver::new(self.registry).resolve(cx.scope, ty) {
                Ok(t) => t,
                Err(e) => {
                    self.report(cx, e);
                    return Ok(());
                }
            },
            None => match self.literal_type(decl.init) {
                Some(t) => t,
                None => {
                    self.report(
                        cx,
                        CompilationError::type_mismatch(
                            format!("global '{}' needs a type annotation or a literal initializer", decl.name),
                            decl.name.span,
                        ),
                    );
                    return Ok(());
                }
            },
        };

        match self
            .registry
            .add_global(cx.scope, decl.name.name, ty, decl.mutable, decl.name.span)
        {
            Ok(_) => self.output.globals_registered += 1,
            Err(e) => self.report(cx, e),
        }
        Ok(())
    }

    // ==========================================================================
    // Program checks
    // ==========================================================================

    fn check_entry_point(&mut self, modules: &[Module<'_>]) -> Option<SymbolId> {
        for module in modules {
            let Some(scope) = self.scopes.try_get(module.id) else {
                continue;
            };
            let Some(main) = self.registry.scope(scope).get("main") else {
                continue;
            };
            let symbol = self.registry.symbol(main);
            let SymbolKind::Function(callable) = &symbol.kind else {
                continue;
            };
            if !callable.params.is_empty() || symbol.ty.is_some() {
                let span = symbol.span;
                self.diagnostics.report(
                    module.file,
                    CompilationError::invalid("'main' must not take parameters or return a value", span),
                );
                return None;
            }
            return Some(main);
        }

        let file = modules.last().map_or("", |m| m.file);
        self.diagnostics.report(file, CompilationError::MissingEntryPoint);
        None
    }

    fn check_virtual_tables(&mut self, modules: &[Module<'_>]) {
        let implementers: Vec<TypeId> = self
            .registry
            .types()
            .filter(|(_, t)| !t.is_interface() && t.aggregate().is_some_and(|a| !a.interfaces.is_empty()))
            .map(|(id, _)| id)
            .collect();

        for ty in implementers {
            if let Err(e) = self.registry.virtual_table(ty) {
                let file = self
                    .registry
                    .ty(ty)
                    .module
                    .and_then(|m| modules.iter().find(|module| self.scopes.try_get(module.id) == Some(m)))
                    .map_or("", |m| m.file);
                self.diagnostics.report(file, e);
            }
        }
    }
}

// ============================================================================
// Locals
// ============================================================================

/// Walks one function body, declaring locals and creating nested scopes.
struct LocalCollector<'p, 'a, 'm> {
    pass: &'p mut CompletionPass<'a>,
    cx: ModuleContext<'m>,
    function: SymbolId,
}

impl LocalCollector<'_, '_, '_> {
    fn declare(&mut self, scope: ScopeId, name: &zlang_ast::Ident<'_>, ty: Option<TypeId>, mutable: bool) {
        match self
            .pass
            .registry
            .add_local(self.function, scope, name.name, ty, mutable, name.span)
        {
            Ok(_) => self.pass.output.locals_registered += 1,
            Err(e) => self.pass.report(self.cx, e),
        }
    }

    /// Statements of `block` directly in `scope`.
    fn body(&mut self, scope: ScopeId, block: &Block<'_>) -> Result<(), InternalError> {
        self.pass.scopes.insert(block.id, scope)?;
        for stmt in block.stmts {
            self.stmt(scope, stmt)?;
        }
        Ok(())
    }

    /// `block` in a fresh scope nested in `enclosing`.
    fn block(&mut self, enclosing: ScopeId, block: &Block<'_>) -> Result<(), InternalError> {
        let scope = self.pass.registry.create_scope(ScopeKind::Block, enclosing);
        self.body(scope, block)
    }

    fn stmt(&mut self, scope: ScopeId, stmt: &Stmt<'_>) -> Result<(), InternalError> {
        match stmt {
            Stmt::Var(decl) => {
                if let Some(init) = decl.init {
                    self.expr(scope, init)?;
                }
                let ty = match TypeResolver::new(self.pass.registry).resolve_opt(scope, decl.ty.as_ref()) {
                    Ok(t) => t,
                    Err(e) => {
                        self.pass.report(self.cx, e);
                        return Ok(());
                    }
                };
                if ty.is_none() && decl.init.is_none() {
                    self.pass.report(
                        self.cx,
                        CompilationError::type_mismatch(
                            format!("'{}' needs a type or an initializer", decl.name),
                            decl.name.span,
                        ),
                    );
                    return Ok(());
                }
                self.declare(scope, &decl.name, ty, decl.mutable);
            }
            Stmt::Assign(s) => {
                self.expr(scope, s.target)?;
                self.expr(scope, s.value)?;
            }
            Stmt::Expr(s) => self.expr(scope, s.expr)?,
            Stmt::If(s) => {
                for branch in s.branches {
                    self.expr(scope, branch.cond)?;
                    self.block(scope, &branch.body)?;
                }
                if let Some(otherwise) = &s.otherwise {
                    self.block(scope, otherwise)?;
                }
            }
            Stmt::While(s) => {
                self.expr(scope, s.cond)?;
                self.block(scope, &s.body)?;
            }
            Stmt::ForRange(s) => {
                self.expr(scope, s.from)?;
                self.expr(scope, s.to)?;
                if let Some(step) = s.step {
                    self.expr(scope, step)?;
                }
                let loop_scope = self.pass.registry.create_scope(ScopeKind::Block, scope);
                self.pass.scopes.insert(s.id, loop_scope)?;
                self.declare(loop_scope, &s.var, Some(primitives::INT), false);
                self.block(loop_scope, &s.body)?;
            }
            Stmt::ForEach(s) => {
                self.expr(scope, s.iterable)?;
                let loop_scope = self.pass.registry.create_scope(ScopeKind::Block, scope);
                self.pass.scopes.insert(s.id, loop_scope)?;
                // Typed from the iterable's element type during emission.
                self.declare(loop_scope, &s.var, None, false);
                self.block(loop_scope, &s.body)?;
            }
            Stmt::Return(s) => {
                if let Some(value) = s.value {
                    self.expr(scope, value)?;
                }
            }
            Stmt::Yield(s) => self.expr(scope, s.value)?,
            Stmt::Panic(s) => self.expr(scope, s.value)?,
            Stmt::Block(b) => self.block(scope, b)?,
        }
        Ok(())
    }

    fn exprs(&mut self, scope: ScopeId, exprs: &[Expr<'_>]) -> Result<(), InternalError> {
        for e in exprs {
            self.expr(scope, e)?;
        }
        Ok(())
    }

    fn expr(&mut self, scope: ScopeId, expr: &Expr<'_>) -> Result<(), InternalError> {
        match expr {
            Expr::Literal(_) | Expr::Ident(_) | Expr::SelfRef(_) => {}
            Expr::Binary(e) => {
                self.expr(scope, e.left)?;
                self.expr(scope, e.right)?;
            }
            Expr::Unary(e) => self.expr(scope, e.operand)?,
            Expr::Cast(e) => self.expr(scope, e.expr)?,
            Expr::Is(e) => self.expr(scope, e.expr)?,
            Expr::Ternary(e) => {
                self.expr(scope, e.cond)?;
                self.expr(scope, e.then)?;
                self.expr(scope, e.otherwise)?;
            }
            Expr::Call(e) => self.exprs(scope, e.args)?,
            Expr::MethodCall(e) => {
                self.expr(scope, e.receiver)?;
                self.exprs(scope, e.args)?;
            }
            Expr::Field(e) => self.expr(scope, e.object)?,
            Expr::Index(e) => {
                self.expr(scope, e.object)?;
                self.expr(scope, e.index)?;
            }
            Expr::New(e) => {
                for field in e.fields {
                    self.expr(scope, field.value)?;
                }
            }
            Expr::NewArray(e) => {
                if let Some(size) = e.size {
                    self.expr(scope, size)?;
                }
                self.exprs(scope, e.elements)?;
            }
            Expr::NewList(e) => self.exprs(scope, e.elements)?,
            Expr::Block(e) => self.block(scope, &e.block)?,
            Expr::Switch(e) => {
                self.expr(scope, e.subject)?;
                for clause in e.clauses {
                    let clause_scope = self.pass.registry.create_scope(ScopeKind::Block, scope);
                    self.pass.scopes.insert(clause.id, clause_scope)?;
                    if let Some(binding) = &clause.binding {
                        // Typed from the union field during emission.
                        self.declare(clause_scope, binding, None, false);
                    }
                    self.expr(clause_scope, clause.body)?;
                }
                if let Some(otherwise) = e.otherwise {
                    self.expr(scope, otherwise)?;
                }
            }
        }
        Ok(())
    }
}
