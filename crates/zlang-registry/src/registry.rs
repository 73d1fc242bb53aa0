//! SymbolRegistry - the scope, symbol and type store of one compilation.
//!
//! # Storage Model
//!
//! - **Scopes**, **symbols** and **types** live in flat vectors addressed by
//!   [`ScopeId`], [`SymbolId`] and [`TypeId`].
//! - Scope 0 is the global scope. It binds the built-in type names and the
//!   module names. Its lookup searches every module's table first, so that
//!   top-level names are visible program-wide. Module names are a separate
//!   namespace: a module may declare a member with its own name. Access rules
//!   between modules are enforced by the emitter, not here.
//! - Array and list types are memoized per element type.
//!
//! # Lifecycle
//!
//! Symbol extraction populates the registry. Afterwards only addresses
//! (function records, assigned by the encoder) and the types of locals whose
//! type is inferred from their initializer are filled in.
//!
//! # Example
//!
//! ```
//! use zlang_core::Span;
//! use zlang_registry::{AggregateKind, SymbolRegistry, primitives};
//!
//! let mut registry = SymbolRegistry::new();
//! let module = registry.declare_module("geometry", Span::default()).unwrap();
//! let point = registry
//!     .declare_aggregate(AggregateKind::Struct, module, "Point", Span::default())
//!     .unwrap();
//! registry.add_field(point, "x", primitives::INT, Span::default()).unwrap();
//! registry.add_field(point, "y", primitives::FLOAT, Span::default()).unwrap();
//! registry.finish_aggregate(point).unwrap();
//!
//! assert_eq!(registry.instance_size(point), 12);
//! ```

use rustc_hash::FxHashMap;
use tracing::{debug, trace};
use zlang_core::{CompilationError, InternalError, Span};

use crate::{
    Aggregate, Callable, RegisterType, Scope, ScopeId, ScopeKind, Symbol, SymbolId, SymbolKind,
    TypeDef, TypeId, TypeKind, primitives,
};

/// Maximum number of value fields in a union; field ids must fit the flag byte.
pub const MAX_UNION_FIELDS: usize = 255;

/// The kind of a user-declared aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Struct,
    Union,
    Interface,
}

/// The kind of a function-like symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Function,
    Method,
    InterfaceMethod,
}

/// Scope, symbol and type storage.
#[derive(Debug)]
pub struct SymbolRegistry {
    scopes: Vec<Scope>,
    symbols: Vec<Symbol>,
    types: Vec<TypeDef>,

    /// Memoized `T[]` per element type.
    arrays: FxHashMap<TypeId, TypeId>,
    /// Memoized `List<T>` per element type.
    lists: FxHashMap<TypeId, TypeId>,

    /// Module scopes in declaration order.
    modules: Vec<ScopeId>,
    /// Bytes of global storage handed out so far.
    global_size: u32,
}

impl Default for SymbolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolRegistry {
    /// The global scope.
    pub const GLOBAL: ScopeId = ScopeId::new(0);

    /// Create a registry holding the global scope and the built-in types.
    pub fn new() -> Self {
        let mut registry = Self {
            scopes: vec![Scope::new(ScopeKind::Global, None, None)],
            symbols: Vec::new(),
            types: Vec::new(),
            arrays: FxHashMap::default(),
            lists: FxHashMap::default(),
            modules: Vec::new(),
            global_size: 0,
        };

        for (index, name) in primitives::NAMES.iter().enumerate() {
            let kind = match TypeId::new(index as u32) {
                primitives::INT | primitives::BOOL => TypeKind::Primitive(RegisterType::Int32),
                primitives::FLOAT => TypeKind::Primitive(RegisterType::Float64),
                primitives::BYTE => TypeKind::Primitive(RegisterType::Unsigned8),
                primitives::OBJECT => TypeKind::Primitive(RegisterType::Ref),
                primitives::RUNTIME_PTR => TypeKind::Primitive(RegisterType::NativePtr),
                primitives::STRING => TypeKind::String,
                primitives::NIL => TypeKind::Nil,
                _ => TypeKind::Any,
            };
            let id = registry.push_type(name.to_string(), kind, None, Span::default());

            // `nil` is a literal, not a type name.
            if id != primitives::NIL {
                let symbol = registry.push_symbol(
                    Self::GLOBAL,
                    Symbol::new(*name, SymbolKind::BuiltInType(id), None, Span::default()),
                );
                registry.types[id.index()].symbol = Some(symbol);
            }
        }

        registry
    }

    // ==========================================================================
    // Accessors
    // ==========================================================================

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn ty(&self, id: TypeId) -> &TypeDef {
        &self.types[id.index()]
    }

    /// All types with their ids, in creation order.
    pub fn types(&self) -> impl Iterator<Item = (TypeId, &TypeDef)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, t)| (TypeId::new(i as u32), t))
    }

    /// Module scopes in declaration order.
    pub fn modules(&self) -> &[ScopeId] {
        &self.modules
    }

    /// Size of the global segment.
    pub fn global_size(&self) -> u32 {
        self.global_size
    }

    /// The callable part of a function, method or interface method.
    pub fn callable(&self, id: SymbolId) -> Option<&Callable> {
        self.symbol(id).kind.callable()
    }

    /// The module scope enclosing `scope`.
    pub fn module_of(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scope(scope).module
    }

    /// The module that defines `symbol`, `None` for built-ins and members of
    /// composite types.
    pub fn symbol_module(&self, symbol: SymbolId) -> Option<ScopeId> {
        self.module_of(self.symbol(symbol).scope)
    }

    /// The name of the module whose scope is `module`.
    pub fn module_name(&self, module: ScopeId) -> &str {
        match self.scope(module).owner {
            Some(symbol) => &self.symbol(symbol).name,
            None => "<global>",
        }
    }

    // ==========================================================================
    // Type properties
    // ==========================================================================

    pub fn type_name(&self, id: TypeId) -> &str {
        &self.ty(id).name
    }

    pub fn register_type(&self, id: TypeId) -> RegisterType {
        self.ty(id).register_type()
    }

    /// Whether values of `id` are reference counted.
    pub fn is_ref(&self, id: TypeId) -> bool {
        self.ty(id).is_ref()
    }

    /// Bytes occupied by a value of `id` in a field, element or global.
    pub fn value_size(&self, id: TypeId) -> u32 {
        self.register_type(id).size()
    }

    /// Bytes of an instance of an aggregate, 0 for anything else.
    pub fn instance_size(&self, id: TypeId) -> u32 {
        self.ty(id).aggregate().map_or(0, |a| a.size)
    }

    // ==========================================================================
    // Scopes and name resolution
    // ==========================================================================

    /// Create a function, method or block scope.
    pub fn create_scope(&mut self, kind: ScopeKind, enclosing: ScopeId) -> ScopeId {
        let module = match kind {
            ScopeKind::Module => None,
            _ => self.module_of(enclosing),
        };
        let id = ScopeId::new(self.scopes.len() as u32);
        self.scopes.push(Scope::new(kind, Some(enclosing), module));
        if kind == ScopeKind::Module {
            self.scopes[id.index()].module = Some(id);
        }
        id
    }

    fn check_define(&self, scope: ScopeId, name: &str, span: Span) -> Result<(), CompilationError> {
        let duplicate = self.scope(scope).contains(name)
            || (self.scope(scope).kind == ScopeKind::Module && self.is_top_level(name));
        if duplicate {
            return Err(CompilationError::DuplicateSymbol {
                name: name.to_string(),
                span,
            });
        }
        Ok(())
    }

    /// Whether `name` is taken by a built-in or by a member of any module.
    /// Module names live in their own namespace.
    fn is_top_level(&self, name: &str) -> bool {
        let builtin = self
            .scope(Self::GLOBAL)
            .get(name)
            .is_some_and(|id| !matches!(self.symbol(id).kind, SymbolKind::Module { .. }));
        builtin || self.modules.iter().any(|module| self.scope(*module).contains(name))
    }

    /// Bind `symbol` in `scope`.
    ///
    /// Fails with `DuplicateSymbol` if the scope already binds the name. Top
    /// level names must be unique across all modules.
    pub fn define(&mut self, scope: ScopeId, symbol: Symbol) -> Result<SymbolId, CompilationError> {
        self.check_define(scope, &symbol.name, symbol.span)?;
        Ok(self.push_symbol(scope, symbol))
    }

    fn push_symbol(&mut self, scope: ScopeId, mut symbol: Symbol) -> SymbolId {
        let id = SymbolId::new(self.symbols.len() as u32);
        trace!(name = %symbol.name, %scope, "define");
        symbol.scope = scope;
        self.scopes[scope.index()].insert(symbol.name.clone(), id);
        self.symbols.push(symbol);
        id
    }

    fn push_type(&mut self, name: String, kind: TypeKind, module: Option<ScopeId>, span: Span) -> TypeId {
        let id = TypeId::new(self.types.len() as u32);
        self.types.push(TypeDef {
            name,
            kind,
            module,
            symbol: None,
            span,
        });
        id
    }

    /// Find the nearest definition of `name` visible from `scope`.
    pub fn resolve(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.scope(id);
            if s.kind == ScopeKind::Global {
                // Module members shadow module names.
                return self
                    .modules
                    .iter()
                    .find_map(|module| self.scope(*module).get(name))
                    .or_else(|| s.get(name));
            }
            if let Some(symbol) = s.get(name) {
                return Some(symbol);
            }
            current = s.enclosing;
        }
        None
    }

    /// Like [`resolve`](Self::resolve), failing with `UnresolvedSymbol`.
    pub fn lookup(&self, scope: ScopeId, name: &str, span: Span) -> Result<SymbolId, CompilationError> {
        self.resolve(scope, name)
            .ok_or_else(|| CompilationError::unresolved(name, span))
    }

    /// Resolve a type name visible from `scope`.
    pub fn resolve_type(&self, scope: ScopeId, name: &str) -> Option<TypeId> {
        self.resolve(scope, name)
            .and_then(|id| self.symbol(id).kind.named_type())
    }

    /// Find a member of an aggregate: its own members first, then those of
    /// each implemented interface.
    pub fn resolve_member(&self, ty: TypeId, name: &str) -> Option<SymbolId> {
        let aggregate = self.ty(ty).aggregate()?;
        self.scope(aggregate.scope).get(name).or_else(|| {
            aggregate.interfaces.iter().find_map(|iface| {
                self.ty(*iface)
                    .aggregate()
                    .and_then(|a| self.scope(a.scope).get(name))
            })
        })
    }

    // ==========================================================================
    // Modules and aggregates
    // ==========================================================================

    /// Create a module scope and bind the module name globally.
    pub fn declare_module(&mut self, name: &str, span: Span) -> Result<ScopeId, CompilationError> {
        self.check_define(Self::GLOBAL, name, span)?;
        let scope = self.create_scope(ScopeKind::Module, Self::GLOBAL);
        let symbol = self.push_symbol(
            Self::GLOBAL,
            Symbol::new(name, SymbolKind::Module { scope }, None, span),
        );
        self.scopes[scope.index()].owner = Some(symbol);
        self.modules.push(scope);
        debug!(module = name, %scope, "declared module");
        Ok(scope)
    }

    /// Create a struct, union or interface type with its member scope and
    /// bind its name in `module`.
    pub fn declare_aggregate(
        &mut self,
        kind: AggregateKind,
        module: ScopeId,
        name: &str,
        span: Span,
    ) -> Result<TypeId, CompilationError> {
        self.check_define(module, name, span)?;

        let id = TypeId::new(self.types.len() as u32);
        let scope_kind = match kind {
            AggregateKind::Struct => ScopeKind::Struct(id),
            AggregateKind::Union => ScopeKind::Union(id),
            AggregateKind::Interface => ScopeKind::Interface(id),
        };
        let scope = self.create_scope(scope_kind, module);
        let aggregate = Aggregate::new(scope);
        let (type_kind, symbol_kind) = match kind {
            AggregateKind::Struct => (TypeKind::Struct(aggregate), SymbolKind::Struct(id)),
            AggregateKind::Union => (TypeKind::Union(aggregate), SymbolKind::Union(id)),
            AggregateKind::Interface => (TypeKind::Interface(aggregate), SymbolKind::Interface(id)),
        };
        self.push_type(name.to_string(), type_kind, Some(module), span);

        let symbol = self.push_symbol(module, Symbol::new(name, symbol_kind, None, span));
        self.types[id.index()].symbol = Some(symbol);
        self.scopes[scope.index()].owner = Some(symbol);
        Ok(id)
    }

    fn aggregate_mut(&mut self, ty: TypeId) -> Result<&mut Aggregate, InternalError> {
        let name = self.ty(ty).name.clone();
        self.types[ty.index()]
            .aggregate_mut()
            .ok_or_else(|| InternalError::Invariant(format!("'{name}' is not an aggregate")))
    }

    /// Append a value field to a struct or union.
    ///
    /// Struct fields are laid out sequentially; union fields all start at
    /// offset 0 and the value slot grows to the largest field.
    pub fn add_field(
        &mut self,
        ty: TypeId,
        name: &str,
        field_ty: TypeId,
        span: Span,
    ) -> Result<SymbolId, CompilationError> {
        let is_union = self.ty(ty).is_union();
        let scope = match self.ty(ty).aggregate() {
            Some(aggregate) => aggregate.scope,
            None => return Err(CompilationError::invalid(format!("'{}' has no fields", self.type_name(ty)), span)),
        };
        if is_union && self.ty(ty).aggregate().map_or(0, |a| a.fields.len()) >= MAX_UNION_FIELDS {
            return Err(CompilationError::invalid(
                format!("union '{}' has more than {MAX_UNION_FIELDS} fields", self.type_name(ty)),
                span,
            ));
        }

        let field_size = self.value_size(field_ty);
        let symbol = self.define(scope, Symbol::new(name, SymbolKind::Field, Some(field_ty), span))?;

        let aggregate = self.types[ty.index()]
            .aggregate_mut()
            .ok_or_else(|| CompilationError::invalid("not an aggregate", span))?;
        let offset = if is_union {
            aggregate.size = aggregate.size.max(field_size);
            0
        } else {
            let offset = aggregate.size;
            aggregate.size += field_size;
            offset
        };
        aggregate.fields.push(symbol);
        self.assign_address(symbol, offset as i32, span)?;
        Ok(symbol)
    }

    /// Attach an implemented interface to a struct or union.
    pub fn add_interface(&mut self, ty: TypeId, interface: TypeId) -> Result<(), InternalError> {
        let aggregate = self.aggregate_mut(ty)?;
        if !aggregate.interfaces.contains(&interface) {
            aggregate.interfaces.push(interface);
        }
        Ok(())
    }

    /// Close the layout of a struct or union.
    ///
    /// For structs this checks that the fields end exactly at the instance
    /// size. For unions it adds the `@flag` byte after the value slot.
    pub fn finish_aggregate(&mut self, ty: TypeId) -> Result<(), InternalError> {
        let type_name = self.ty(ty).name.clone();
        match &self.ty(ty).kind {
            TypeKind::Struct(aggregate) => {
                let end = aggregate.fields.last().map_or(Ok(0), |last| {
                    let field = self.symbol(*last);
                    let size = field.ty.map_or(0, |t| self.value_size(t));
                    field.require_address().map(|offset| offset as u32 + size)
                })?;
                if end != aggregate.size {
                    return Err(InternalError::LayoutMismatch {
                        type_name,
                        end,
                        size: aggregate.size,
                    });
                }
            }
            TypeKind::Union(aggregate) => {
                if aggregate.flag.is_some() {
                    return Ok(());
                }
                let scope = aggregate.scope;
                let offset = aggregate.size;
                let flag = self.push_symbol(
                    scope,
                    Symbol::new("@flag", SymbolKind::Field, Some(primitives::BYTE), Span::default()),
                );
                self.symbols[flag.index()].set_address(offset as i32)?;
                let aggregate = self.aggregate_mut(ty)?;
                aggregate.flag = Some(flag);
                aggregate.size = offset + RegisterType::Unsigned8.size();
            }
            _ => {}
        }
        debug!(ty = %type_name, size = self.instance_size(ty), "finished layout");
        Ok(())
    }

    /// The id of a union value field: its position in declaration order.
    pub fn field_id(&self, union: TypeId, field: SymbolId) -> Option<u32> {
        let aggregate = self.ty(union).aggregate()?;
        aggregate
            .fields
            .iter()
            .position(|f| *f == field)
            .map(|p| p as u32)
    }

    /// Whether `ty` directly implements `interface`.
    pub fn implements(&self, ty: TypeId, interface: TypeId) -> bool {
        self.ty(ty)
            .aggregate()
            .is_some_and(|a| a.interfaces.contains(&interface))
    }

    // ==========================================================================
    // Composite types
    // ==========================================================================

    /// The array type `element[]`.
    pub fn array_of(&mut self, element: TypeId) -> TypeId {
        if let Some(id) = self.arrays.get(&element) {
            return *id;
        }
        let name = format!("{}[]", self.type_name(element));
        let id = self.push_type(name, TypeKind::Array { element }, None, Span::default());
        self.arrays.insert(element, id);
        id
    }

    /// The list type `List<element>`, an aggregate with hidden `@size` and
    /// `@array` fields.
    pub fn list_of(&mut self, element: TypeId) -> TypeId {
        if let Some(id) = self.lists.get(&element) {
            return *id;
        }
        let array = self.array_of(element);
        let id = TypeId::new(self.types.len() as u32);
        let scope = self.create_scope(ScopeKind::Struct(id), Self::GLOBAL);
        let name = format!("List<{}>", self.type_name(element));
        self.push_type(
            name,
            TypeKind::List {
                element,
                array,
                aggregate: Aggregate::new(scope),
            },
            None,
            Span::default(),
        );

        let mut fields = Vec::with_capacity(2);
        let mut offset = 0;
        for (field, field_ty) in [("@size", primitives::INT), ("@array", array)] {
            let symbol = self.push_symbol(
                scope,
                Symbol::new(field, SymbolKind::Field, Some(field_ty), Span::default()),
            );
            let assigned = self.symbols[symbol.index()].set_address(offset);
            debug_assert!(assigned.is_ok(), "{assigned:?}");
            offset += self.value_size(field_ty) as i32;
            fields.push(symbol);
        }
        if let Some(aggregate) = self.types[id.index()].aggregate_mut() {
            aggregate.fields = fields;
            aggregate.size = offset as u32;
        }
        self.lists.insert(element, id);
        id
    }

    // ==========================================================================
    // Functions, parameters, locals and globals
    // ==========================================================================

    /// Declare a function in `scope`.
    ///
    /// Free functions are bound in their module scope. Methods are bound in
    /// the aggregate's member scope, and interface methods in the
    /// interface's scope; both get a `self` constant in register 1. The
    /// parameter scope of functions and methods encloses the module scope.
    pub fn declare_function(
        &mut self,
        kind: FunctionKind,
        scope: ScopeId,
        name: &str,
        ret: Option<TypeId>,
        span: Span,
    ) -> Result<SymbolId, CompilationError> {
        self.check_define(scope, name, span)?;

        let owner = self.scope(scope).kind.aggregate();
        let (scope_kind, enclosing) = match kind {
            FunctionKind::Function => (ScopeKind::Function, scope),
            FunctionKind::Method => (
                ScopeKind::Method,
                self.module_of(scope).unwrap_or(Self::GLOBAL),
            ),
            FunctionKind::InterfaceMethod => (ScopeKind::Method, scope),
        };
        let params_scope = self.create_scope(scope_kind, enclosing);
        let callable = Callable::new(params_scope, owner);
        let symbol_kind = match kind {
            FunctionKind::Function => SymbolKind::Function(callable),
            FunctionKind::Method => SymbolKind::Method(callable),
            FunctionKind::InterfaceMethod => SymbolKind::InterfaceMethod(callable),
        };
        let function = self.push_symbol(scope, Symbol::new(name, symbol_kind, ret, span));
        self.scopes[params_scope.index()].owner = Some(function);

        if let (Some(owner), FunctionKind::Method | FunctionKind::InterfaceMethod) = (owner, kind) {
            let receiver = self.push_symbol(
                params_scope,
                Symbol::new("self", SymbolKind::Constant, Some(owner), span),
            );
            self.assign_address(receiver, 1, span)?;
            if let Some(callable) = self.symbols[function.index()].kind.callable_mut() {
                callable.receiver = Some(receiver);
            }
        }
        Ok(function)
    }

    fn next_register(&self, function: SymbolId) -> Result<i32, InternalError> {
        self.callable(function)
            .map(|c| c.fixed_registers() as i32 + 1)
            .ok_or_else(|| InternalError::Invariant(format!("'{}' is not callable", self.symbol(function).name)))
    }

    /// Add a parameter; it takes the next register after `self` and the
    /// parameters declared so far. All parameters precede the locals.
    pub fn add_param(
        &mut self,
        function: SymbolId,
        name: &str,
        ty: TypeId,
        span: Span,
    ) -> Result<SymbolId, CompilationError> {
        let callable = self
            .callable(function)
            .ok_or_else(|| CompilationError::invalid("parameters need a function", span))?;
        if !callable.locals.is_empty() {
            return Err(CompilationError::invalid("parameters must precede locals", span));
        }
        let scope = callable.scope;
        let register = self
            .next_register(function)
            .map_err(|e| CompilationError::invalid(e.to_string(), span))?;

        let param = self.define(scope, Symbol::new(name, SymbolKind::Variable, Some(ty), span))?;
        self.assign_address(param, register, span)?;
        if let Some(callable) = self.symbols[function.index()].kind.callable_mut() {
            callable.params.push(param);
        }
        Ok(param)
    }

    /// Add a local of `function` in `scope`; it takes the next free register.
    ///
    /// `ty` is `None` for locals whose type comes from their initializer; the
    /// emitter fills it in with [`infer_type`](Self::infer_type).
    pub fn add_local(
        &mut self,
        function: SymbolId,
        scope: ScopeId,
        name: &str,
        ty: Option<TypeId>,
        mutable: bool,
        span: Span,
    ) -> Result<SymbolId, CompilationError> {
        let register = self
            .next_register(function)
            .map_err(|e| CompilationError::invalid(e.to_string(), span))?;
        let kind = if mutable { SymbolKind::Variable } else { SymbolKind::Constant };
        let local = self.define(scope, Symbol::new(name, kind, ty, span))?;
        self.assign_address(local, register, span)?;
        if let Some(callable) = self.symbols[function.index()].kind.callable_mut() {
            callable.locals.push(local);
        }
        Ok(local)
    }

    /// Add a module-level variable at the next global offset.
    pub fn add_global(
        &mut self,
        module: ScopeId,
        name: &str,
        ty: TypeId,
        mutable: bool,
        span: Span,
    ) -> Result<SymbolId, CompilationError> {
        let kind = if mutable { SymbolKind::Variable } else { SymbolKind::Constant };
        let global = self.define(module, Symbol::new(name, kind, Some(ty), span))?;
        self.assign_address(global, self.global_size as i32, span)?;
        self.global_size += self.value_size(ty);
        Ok(global)
    }

    /// Record the type of a local declared without one.
    pub fn infer_type(&mut self, symbol: SymbolId, ty: TypeId) -> Result<(), InternalError> {
        let s = &mut self.symbols[symbol.index()];
        match s.ty {
            None => {
                s.ty = Some(ty);
                Ok(())
            }
            Some(existing) if existing == ty => Ok(()),
            Some(_) => Err(InternalError::Invariant(format!(
                "type of '{}' is already known",
                s.name
            ))),
        }
    }

    fn assign_address(&mut self, symbol: SymbolId, address: i32, span: Span) -> Result<(), CompilationError> {
        self.symbols[symbol.index()]
            .set_address(address)
            .map_err(|e| CompilationError::invalid(e.to_string(), span))
    }

    /// Assign a symbol's address, once.
    pub fn set_address(&mut self, symbol: SymbolId, address: i32) -> Result<(), InternalError> {
        self.symbols[symbol.index()].set_address(address)
    }
}
