//! zlang compiler backend
//!
//! Turns the syntax trees of a program's modules into a bytecode image for
//! the zlang register machine.
//!
//! ## Architecture
//!
//! - **Pass 1 (Registration)**: declare modules, aggregate types and module
//!   init functions
//! - **Pass 2 (Completion)**: fields, signatures, locals and globals; entry
//!   point and virtual-table checks
//! - **Emission**: type-check every body and emit register-machine IR
//! - **Encoding**: lay out and write the binary image
//!
//! Each phase collects the errors of the compiled program and the next phase
//! only runs when the previous one reported none.
//!
//! ## Modules
//!
//! - [`passes`]: the two symbol extraction passes
//! - [`emit`]: IR emission with register allocation and reference counting
//! - `stmt` and `expr`: statement and expression lowering used by [`emit`]
//! - [`ir`]: instructions, opcodes, labels and the emitted [`Program`]
//! - [`bytecode`]: image encoding and decoding
//! - [`scope_map`]: syntax node to scope mapping shared by the phases
//! - [`type_resolver`]: type expressions to registry types

pub mod bytecode;
pub mod emit;
mod expr;
pub mod ir;
pub mod passes;
pub mod scope_map;
mod stmt;
pub mod type_resolver;

pub use bytecode::{EncodeOutput, Encoder, EncoderOptions, ImageReader};
pub use emit::{EmitOutput, Emitter};
pub use ir::Program;
pub use passes::{CompletionOutput, CompletionPass, RegistrationOutput, RegistrationPass};
pub use scope_map::ScopeMap;
pub use type_resolver::TypeResolver;

pub use zlang_core::{CompilationError, CompileError, Diagnostic, InternalError};

use tracing::{debug, info_span};
use zlang_ast::Module;
use zlang_core::Diagnostics;
use zlang_registry::SymbolRegistry;

/// Options of a compilation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompilerOptions {
    pub encoder: EncoderOptions,
}

impl CompilerOptions {
    pub fn with_encoder(mut self, encoder: EncoderOptions) -> Self {
        self.encoder = encoder;
        self
    }
}

/// A successfully compiled program.
#[derive(Debug)]
pub struct CompiledProgram {
    /// The emitted IR, with every address assigned.
    pub program: Program,
    /// The encoded image.
    pub image: Vec<u8>,
}

impl CompiledProgram {
    /// Read access to the image.
    pub fn reader(&self) -> Result<ImageReader<'_>, zlang_core::ImageError> {
        ImageReader::new(&self.image)
    }
}

/// Runs every phase over a program.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CompilerOptions,
}

impl Compiler {
    pub fn new(options: CompilerOptions) -> Self {
        Self { options }
    }

    /// Compile `modules`, given in dependency order.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn compile(&self, modules: &[Module<'_>]) -> Result<CompiledProgram, CompileError> {
        let mut program = emit_program(modules)?;

        let encoded = info_span!("encoding").in_scope(|| Encoder::new(&mut program, self.options.encoder).run())?;
        check(encoded.errors)?;
        debug!(
            instructions = program.instruction_count(),
            image = encoded.image.len(),
            "compiled program"
        );
        Ok(CompiledProgram {
            program,
            image: encoded.image,
        })
    }
}

/// Run extraction and emission.
pub fn emit_program(modules: &[Module<'_>]) -> Result<Program, CompileError> {
    let mut registry = SymbolRegistry::new();
    let mut scopes = ScopeMap::new();

    let registration =
        info_span!("registration").in_scope(|| RegistrationPass::new(&mut registry, &mut scopes).run(modules))?;
    check(registration.errors)?;

    let completion =
        info_span!("completion").in_scope(|| CompletionPass::new(&mut registry, &mut scopes).run(modules))?;
    let entry = completion.entry_point;
    check(completion.errors)?;
    // A missing entry point is always reported above.
    let entry = entry.ok_or_else(|| InternalError::Invariant("no entry point".to_string()))?;

    let emitted = info_span!("emission").in_scope(|| Emitter::new(&mut registry, &scopes).run(modules, Some(entry)))?;
    check(emitted.errors)?;

    Ok(Program {
        registry,
        functions: emitted.functions,
        entry,
        globals: emitted.globals,
    })
}

fn check(errors: Diagnostics) -> Result<(), CompileError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(CompileError::Diagnostics(errors.into_vec()))
    }
}
