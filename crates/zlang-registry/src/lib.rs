//! Symbol and type model of the zlang backend.
//!
//! ## Architecture
//!
//! ```text
//! SymbolRegistry
//! ├── scopes   Vec<Scope>    global → module → function/method → block
//! │                          module → struct/union/interface (members)
//! ├── symbols  Vec<Symbol>   variables, constants, fields, functions, types
//! └── types    Vec<TypeDef>  primitives, string, arrays, lists, aggregates
//! ```
//!
//! Enclosing links are [`ScopeId`]s, so scopes form a tree without
//! back-references. Symbol extraction fills the registry; emission and
//! encoding read it.
//!
//! ## Modules
//!
//! - `registry`: storage, definition, resolution and layout
//! - `conversion`: assignability, promotion and literal typing
//! - `vtable`: interface dispatch tables
//! - `builtins`: array, list and string members

mod builtins;
mod conversion;
mod ids;
mod registry;
mod scope;
mod symbol;
mod types;
mod vtable;

pub use builtins::{BuiltIn, BuiltInSignature};
pub use ids::{ScopeId, SymbolId, TypeId};
pub use registry::{AggregateKind, FunctionKind, MAX_UNION_FIELDS, SymbolRegistry};
pub use scope::{Scope, ScopeKind};
pub use symbol::{Callable, Symbol, SymbolKind};
pub use types::{Aggregate, RegisterType, TypeDef, TypeKind, TypeRecordKind, primitives};
pub use vtable::{VTableEntry, VirtualTable};
