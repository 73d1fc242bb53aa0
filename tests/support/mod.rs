//! Shared helpers for the integration tests.

pub mod machine;

use zlang::ast::Module;
use zlang::compiler::{CompletionPass, EmitOutput, Emitter, RegistrationPass, ScopeMap};
use zlang::registry::SymbolRegistry;
use zlang::{CompileError, CompiledProgram, CompilerOptions, Diagnostic};

pub use machine::Machine;

/// Compile with default options, panicking on errors.
pub fn compile(modules: &[Module<'_>]) -> CompiledProgram {
    zlang::compile(modules, CompilerOptions::default()).unwrap_or_else(|err| panic!("{err}"))
}

/// Compile, expecting diagnostics.
pub fn diagnostics(modules: &[Module<'_>]) -> Vec<Diagnostic> {
    match zlang::compile(modules, CompilerOptions::default()) {
        Ok(_) => panic!("expected compilation to fail"),
        Err(CompileError::Internal(err)) => panic!("internal error: {err}"),
        Err(err) => err.diagnostics().to_vec(),
    }
}

/// Compile and run to `Halt`.
pub fn run(compiled: &CompiledProgram) -> Machine<'_> {
    let mut machine = Machine::new(&compiled.image).unwrap();
    machine.run().unwrap_or_else(|trap| panic!("{trap:?}\n{}", compiled.program.disassemble()));
    machine
}

/// Run extraction and emission even when a phase reports errors.
pub fn emit_anyway(modules: &[Module<'_>]) -> (SymbolRegistry, EmitOutput) {
    let mut registry = SymbolRegistry::new();
    let mut scopes = ScopeMap::new();
    RegistrationPass::new(&mut registry, &mut scopes).run(modules).unwrap();
    let completion = CompletionPass::new(&mut registry, &mut scopes).run(modules).unwrap();
    let output = Emitter::new(&mut registry, &scopes)
        .run(modules, completion.entry_point)
        .unwrap();
    (registry, output)
}
