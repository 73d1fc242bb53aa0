//! Symbol extraction passes.
//!
//! - [`registration`]: Pass 1 - declare modules, aggregate types and module
//!   init functions so every type name is known
//! - [`completion`]: Pass 2 - fields, interfaces, function signatures,
//!   locals and globals, plus the entry-point and virtual-table checks
//!
//! Both passes record the scope of every scope-introducing node in the
//! [`ScopeMap`](crate::ScopeMap) consumed by emission.

pub mod completion;
pub mod registration;

pub use completion::{CompletionOutput, CompletionPass};
pub use registration::{RegistrationOutput, RegistrationPass};
