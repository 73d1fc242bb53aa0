//! zlang: compiler backend for the zlang register machine.
//!
//! Takes the syntax trees of a program's modules, resolves every name and
//! type, emits register-machine instructions and encodes them into a binary
//! image.
//!
//! ## Architecture
//!
//! ```text
//! &[Module]  ──►  RegistrationPass  ──►  CompletionPass  ──►  Emitter  ──►  Encoder  ──►  image
//!  (zlang-ast)          └──────────── SymbolRegistry ────────────┘            (bytecode)
//! ```
//!
//! ## Crates
//!
//! - [`ast`]: the syntax tree and [`AstBuilder`](ast::AstBuilder)
//! - [`registry`]: scopes, symbols, types and virtual tables
//! - [`compiler`]: extraction passes, emission and encoding
//! - `zlang-core`: spans, errors and diagnostics, re-exported here
//!
//! ## Example
//!
//! ```
//! use zlang::Bump;
//! use zlang::ast::AstBuilder;
//!
//! let arena = Bump::new();
//! let b = AstBuilder::new(&arena);
//! let main = b.function("main", &[], None, b.block(&[]));
//! let module = b.module("main", &[], &[main]);
//!
//! let compiled = zlang::compile(&[module], zlang::CompilerOptions::default()).unwrap();
//! assert_eq!(&compiled.image[..2], b"ZL");
//! ```

pub use bumpalo::Bump;
pub use zlang_ast as ast;
pub use zlang_compiler as compiler;
pub use zlang_registry as registry;

pub use zlang_compiler::bytecode::{EncoderOptions, ImageFlags, ImageHeader, ImageReader};
pub use zlang_compiler::{CompiledProgram, Compiler, CompilerOptions, Program};
pub use zlang_core::{CompilationError, CompileError, Diagnostic, Diagnostics, ImageError, InternalError, Span};

/// Compile `modules`, given in dependency order, into an image.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn compile(modules: &[ast::Module<'_>], options: CompilerOptions) -> Result<CompiledProgram, CompileError> {
    let result = Compiler::new(options).compile(modules);
    if let Err(err) = &result {
        tracing::debug!(
            internal = err.is_internal(),
            diagnostics = err.diagnostics().len(),
            "compilation failed"
        );
    }
    result
}
