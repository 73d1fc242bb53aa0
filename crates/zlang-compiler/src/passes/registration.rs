//! Registration Pass (Pass 1) - declare modules and aggregate types.
//!
//! Only names are bound here. Field types, interface lists and function
//! signatures may refer to types declared later or in other modules, so
//! they are completed in [`completion`](super::completion) once every type
//! exists.
//!
//! ## Responsibilities
//!
//! - Create one module scope per module and bind the module name
//! - Declare structs, unions and interfaces with their member scopes
//! - Synthesize the `@init:<module>` function holding global initializers
//! - Reject interface members that are not methods

use tracing::debug;
use zlang_ast::{InterfaceMember, Item, Module};
use zlang_core::{CompilationError, Diagnostics, InternalError, Span};
use zlang_registry::{AggregateKind, FunctionKind, SymbolRegistry};

use crate::ScopeMap;

/// Output of the registration pass.
#[derive(Debug, Default)]
pub struct RegistrationOutput {
    /// Number of modules declared.
    pub modules_registered: usize,
    /// Number of structs, unions and interfaces declared.
    pub types_registered: usize,
    /// Collected errors (the next pass still runs).
    pub errors: Diagnostics,
}

/// Pass 1: declare modules and aggregate types.
pub struct RegistrationPass<'a> {
    registry: &'a mut SymbolRegistry,
    scopes: &'a mut ScopeMap,
    diagnostics: Diagnostics,
    modules_registered: usize,
    types_registered: usize,
}

impl<'a> RegistrationPass<'a> {
    /// Create a new registration pass.
    pub fn new(registry: &'a mut SymbolRegistry, scopes: &'a mut ScopeMap) -> Self {
        Self {
            registry,
            scopes,
            diagnostics: Diagnostics::new(),
            modules_registered: 0,
            types_registered: 0,
        }
    }

    /// Run the registration pass over every module, in order.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn run(mut self, modules: &[Module<'_>]) -> Result<RegistrationOutput, InternalError> {
        for module in modules {
            self.visit_module(module)?;
        }

        debug!(
            modules = self.modules_registered,
            types = self.types_registered,
            errors = self.diagnostics.len(),
            "registration pass finished"
        );
        Ok(RegistrationOutput {
            modules_registered: self.modules_registered,
            types_registered: self.types_registered,
            errors: self.diagnostics,
        })
    }

    fn visit_module(&mut self, module: &Module<'_>) -> Result<(), InternalError> {
        let scope = match self.registry.declare_module(module.name, Span::default()) {
            Ok(scope) => scope,
            Err(e) => {
                self.diagnostics.report(module.file, e);
                return Ok(());
            }
        };
        self.scopes.insert(module.id, scope)?;
        self.modules_registered += 1;

        let init_name = format!("@init:{}", module.name);
        let init = self
            .registry
            .declare_function(FunctionKind::Function, scope, &init_name, None, Span::default())
            .map_err(|e| InternalError::Invariant(format!("cannot declare {init_name}: {e}")))?;
        self.scopes.insert_init(module.id, init);

        for item in module.items {
            let (kind, id, name) = match item {
                Item::Struct(decl) => (AggregateKind::Struct, decl.id, decl.name),
                Item::Union(decl) => (AggregateKind::Union, decl.id, decl.name),
                Item::Interface(decl) => {
                    for member in decl.members {
                        if let InterfaceMember::Field(field) = member {
                            self.diagnostics.report(
                                module.file,
                                CompilationError::invalid(
                                    format!(
                                        "interface '{}' declares field '{}'; interfaces only declare methods",
                                        decl.name, field.name
                                    ),
                                    field.span,
                                ),
                            );
                        }
                    }
                    (AggregateKind::Interface, decl.id, decl.name)
                }
                Item::Function(_) | Item::Global(_) => continue,
            };

            match self.registry.declare_aggregate(kind, scope, name.name, name.span) {
                Ok(ty) => {
                    let members = self
                        .registry
                        .ty(ty)
                        .aggregate()
                        .map(|a| a.scope)
                        .ok_or_else(|| InternalError::Invariant(format!("'{name}' has no member scope")))?;
                    self.scopes.insert(id, members)?;
                    self.types_registered += 1;
                }
                Err(e) => self.diagnostics.report(module.file, e),
            }
        }
        Ok(())
    }
}
