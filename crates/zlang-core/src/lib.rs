//! Core types shared by every crate of the zlang backend.
//!
//! ## Modules
//!
//! - [`span`]: source positions carried by syntax nodes and symbols
//! - [`error`]: the error taxonomy (semantic, internal and image errors)
//! - [`diagnostics`]: file-qualified, accumulated compilation errors

pub mod diagnostics;
pub mod error;
pub mod span;

pub use diagnostics::{Diagnostic, Diagnostics};
pub use error::{CompilationError, CompileError, ImageError, InternalError};
pub use span::Span;
