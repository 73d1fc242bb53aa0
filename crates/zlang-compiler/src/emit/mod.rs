//! IR emission.
//!
//! One walk over every function body, producing a register-machine
//! instruction list per function. Types are checked while emitting; local
//! errors abandon the statement they occur in and are collected, internal
//! errors abort.
//!
//! ## Architecture
//!
//! ```text
//! Emitter                     per program
//! └── FunctionEmitter         per function (and per module init)
//!     ├── RegisterAllocator   volatile register pool
//!     ├── YieldStack          enclosing block expressions
//!     ├── LabelTable          deferred branch targets
//!     ├── crate::stmt         statements, loops, assignment
//!     └── crate::expr         expressions, calls, creation
//! ```
//!
//! ## Reference counting
//!
//! Every store of a reference into a variable, field or element releases
//! the previous value and retains the new one; first initialization only
//! retains. Reference parameters are retained in the prologue. All exits
//! go through one epilogue that releases every reference parameter and
//! local, runs `Collect` and returns. Loops run `Collect` once per
//! iteration.

mod function;
mod registers;
mod yields;

use thiserror::Error;
use tracing::debug;
use zlang_ast::{Item, Module};
use zlang_core::{CompilationError, Diagnostics, InternalError};
use zlang_registry::{ScopeId, SymbolId, SymbolKind, SymbolRegistry, TypeId};

use crate::ScopeMap;
use crate::ir::{FunctionCode, Register};

pub use registers::{LiveSet, RegisterAllocator};
pub use yields::{YieldContext, YieldStack, unify};

pub(crate) use function::FunctionEmitter;

/// Failure of one statement or expression.
#[derive(Debug, Error)]
pub(crate) enum EmitError {
    /// A problem in the program; reported, then emission continues.
    #[error(transparent)]
    Compile(#[from] CompilationError),
    /// A compiler invariant broke; emission stops.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

pub(crate) type EmitResult<T> = Result<T, EmitError>;

/// An emitted expression: the register holding it and its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Value {
    pub register: Register,
    pub ty: TypeId,
    /// Whether the register came from the volatile pool and must be
    /// released by whoever consumes the value.
    pub temporary: bool,
    /// An integer literal typed `byte` only because it is small.
    pub narrowed: bool,
}

impl Value {
    pub fn temporary(register: Register, ty: TypeId) -> Self {
        Self {
            register,
            ty,
            temporary: true,
            narrowed: false,
        }
    }

    /// A value living in a parameter or local register.
    pub fn fixed(register: Register, ty: TypeId) -> Self {
        Self {
            register,
            ty,
            temporary: false,
            narrowed: false,
        }
    }
}

/// The module whose code is being emitted.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ModuleContext<'m> {
    pub scope: ScopeId,
    pub file: &'m str,
}

/// Output of emission.
#[derive(Debug, Default)]
pub struct EmitOutput {
    /// Function code in module order, each module's init function first.
    pub functions: Vec<FunctionCode>,
    /// Module-level variables in global-segment order.
    pub globals: Vec<SymbolId>,
    /// Number of instructions emitted.
    pub instructions: usize,
    /// Collected errors.
    pub errors: Diagnostics,
}

/// Emits every function of a program.
pub struct Emitter<'a> {
    registry: &'a mut SymbolRegistry,
    scopes: &'a ScopeMap,
    diagnostics: Diagnostics,
    functions: Vec<FunctionCode>,
}

impl<'a> Emitter<'a> {
    pub fn new(registry: &'a mut SymbolRegistry, scopes: &'a ScopeMap) -> Self {
        Self {
            registry,
            scopes,
            diagnostics: Diagnostics::new(),
            functions: Vec::new(),
        }
    }

    /// Emit all modules, in order. `entry` is the `main` function, if any.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn run(mut self, modules: &[Module<'_>], entry: Option<SymbolId>) -> Result<EmitOutput, InternalError> {
        // Init functions the entry point calls before user code.
        let inits: Vec<SymbolId> = modules
            .iter()
            .filter(|m| {
                m.items
                    .iter()
                    .any(|item| matches!(item, Item::Global(decl) if decl.init.is_some()))
            })
            .filter_map(|m| self.scopes.init(m.id))
            .collect();

        for module in modules {
            let (Some(scope), Some(init)) = (self.scopes.try_get(module.id), self.scopes.init(module.id)) else {
                continue;
            };
            let cx = ModuleContext {
                scope,
                file: module.file,
            };

            let mut emitter = FunctionEmitter::new(self.registry, self.scopes, &mut self.diagnostics, cx, init, false)?;
            emitter.prologue(&[])?;
            for item in module.items {
                if let Item::Global(decl) = item {
                    emitter.global_initializer(decl)?;
                }
            }
            self.functions.push(emitter.finish()?);

            for item in module.items {
                let Item::Function(decl) = item else {
                    continue;
                };
                let Some(function) = self.scopes.function(decl.id) else {
                    continue;
                };
                let is_entry = entry == Some(function);
                let mut emitter =
                    FunctionEmitter::new(self.registry, self.scopes, &mut self.diagnostics, cx, function, is_entry)?;
                emitter.prologue(if is_entry { &inits } else { &[] })?;
                emitter.body(&decl.body)?;
                self.functions.push(emitter.finish()?);
            }
        }

        let globals = self.globals();
        let instructions = self.functions.iter().map(|f| f.instructions.len()).sum();
        debug!(
            functions = self.functions.len(),
            instructions,
            errors = self.diagnostics.len(),
            "emission finished"
        );
        Ok(EmitOutput {
            functions: self.functions,
            globals,
            instructions,
            errors: self.diagnostics,
        })
    }

    /// Module-level variables, ordered by address.
    fn globals(&self) -> Vec<SymbolId> {
        let mut globals: Vec<SymbolId> = self
            .registry
            .modules()
            .iter()
            .flat_map(|m| self.registry.scope(*m).symbols().iter().copied())
            .filter(|s| {
                matches!(
                    self.registry.symbol(*s).kind,
                    SymbolKind::Variable | SymbolKind::Constant
                )
            })
            .collect();
        globals.sort_by_key(|s| self.registry.symbol(*s).address());
        globals
    }
}
