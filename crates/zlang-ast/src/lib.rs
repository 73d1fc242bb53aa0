//! Syntax tree consumed by the zlang backend.
//!
//! The lexer and parser live outside this workspace; they hand the backend a
//! list of [`Module`]s allocated in a `bumpalo` arena. Every node is `Copy`
//! and borrows from the arena for `'ast`.
//!
//! Nodes that introduce a scope (modules, type declarations, functions,
//! blocks, `for` statements and switch clauses) carry a [`NodeId`]. Symbol
//! extraction maps each id to the scope it creates and emission looks scopes
//! up by id.
//!
//! ## Modules
//!
//! - [`node`]: node identities and identifiers
//! - [`types`]: type expressions
//! - [`ops`]: operators
//! - [`expr`], [`stmt`], [`decl`]: the tree proper
//! - [`builder`]: [`AstBuilder`] for constructing trees in code

pub mod builder;
pub mod decl;
pub mod expr;
pub mod node;
pub mod ops;
pub mod stmt;
pub mod types;

pub use builder::AstBuilder;
pub use decl::*;
pub use expr::*;
pub use node::*;
pub use ops::*;
pub use stmt::*;
pub use types::*;
