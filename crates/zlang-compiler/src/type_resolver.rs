//! Type resolution for converting AST type expressions to registry types.
//!
//! [`TypeResolver`] turns a [`TypeExpr`] into a [`TypeId`]: named types are
//! looked up from the current scope (any module's struct, union or
//! interface is visible), `T[]` and `List<T>` are materialized on demand.
//!
//! ## Example
//!
//! ```ignore
//! let mut resolver = TypeResolver::new(&mut registry);
//! let ty = resolver.resolve(module_scope, &type_expr)?;
//! ```

use zlang_ast::TypeExpr;
use zlang_core::CompilationError;
use zlang_registry::{ScopeId, SymbolRegistry, TypeId};

/// Resolves AST type expressions against the registry.
pub struct TypeResolver<'reg> {
    registry: &'reg mut SymbolRegistry,
}

impl<'reg> TypeResolver<'reg> {
    pub fn new(registry: &'reg mut SymbolRegistry) -> Self {
        Self { registry }
    }

    /// Resolve `ty` as seen from `scope`.
    ///
    /// Fails with `UnresolvedSymbol` when a named type does not exist, and
    /// with `TypeMismatch` when the name refers to something that is not a
    /// type.
    pub fn resolve(&mut self, scope: ScopeId, ty: &TypeExpr<'_>) -> Result<TypeId, CompilationError> {
        match ty {
            TypeExpr::Named(ident) => {
                let symbol = self.registry.lookup(scope, ident.name, ident.span)?;
                self.registry.symbol(symbol).kind.named_type().ok_or_else(|| {
                    CompilationError::type_mismatch(format!("'{}' is not a type", ident.name), ident.span)
                })
            }
            TypeExpr::Array(element, _) => {
                let element = self.resolve(scope, element)?;
                Ok(self.registry.array_of(element))
            }
            TypeExpr::List(element, _) => {
                let element = self.resolve(scope, element)?;
                Ok(self.registry.list_of(element))
            }
        }
    }

    /// Resolve an optional type, `None` standing for void.
    pub fn resolve_opt(
        &mut self,
        scope: ScopeId,
        ty: Option<&TypeExpr<'_>>,
    ) -> Result<Option<TypeId>, CompilationError> {
        ty.map(|t| self.resolve(scope, t)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use bumpalo::Bump;
    use zlang_ast::AstBuilder;
    use zlang_core::Span;
    use zlang_registry::{AggregateKind, primitives};

    use super::*;

    #[test]
    fn resolves_named_and_composite_types() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let mut registry = SymbolRegistry::new();
        let module = registry.declare_module("main", Span::default()).unwrap();
        let point = registry
            .declare_aggregate(AggregateKind::Struct, module, "Point", Span::default())
            .unwrap();

        let mut resolver = TypeResolver::new(&mut registry);
        assert_eq!(resolver.resolve(module, &b.named("int")), Ok(primitives::INT));
        assert_eq!(resolver.resolve(module, &b.named("Point")), Ok(point));

        let points = resolver.resolve(module, &b.list_type(b.named("Point"))).unwrap();
        let floats = resolver.resolve(module, &b.array_type(b.named("float"))).unwrap();
        assert_eq!(resolver.resolve_opt(module, None), Ok(None));

        assert_eq!(registry.type_name(points), "List<Point>");
        assert_eq!(registry.type_name(floats), "float[]");
    }

    #[test]
    fn unknown_and_non_type_names_fail() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let mut registry = SymbolRegistry::new();
        let module = registry.declare_module("main", Span::default()).unwrap();
        registry
            .add_global(module, "counter", primitives::INT, true, Span::default())
            .unwrap();

        let mut resolver = TypeResolver::new(&mut registry);
        assert!(matches!(
            resolver.resolve(module, &b.named("Missing")),
            Err(CompilationError::UnresolvedSymbol { .. })
        ));
        assert!(matches!(
            resolver.resolve(module, &b.named("counter")),
            Err(CompilationError::TypeMismatch { .. })
        ));
    }
}
