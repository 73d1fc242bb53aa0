//! The emitted program: per-function instruction lists plus the registry.

use std::fmt::Write as _;

use zlang_registry::{SymbolId, SymbolRegistry, TypeId};

use super::{Instruction, LabelTable};

/// The instructions of one function.
#[derive(Debug, Clone)]
pub struct FunctionCode {
    pub function: SymbolId,
    /// Display name, `Type::method` for methods.
    pub name: String,
    pub instructions: Vec<Instruction>,
    pub labels: LabelTable,
}

/// The output of emission.
///
/// Functions appear in module order; within a module the init function
/// comes first, then functions and methods in declaration order. The
/// registry is owned here so the encoder can assign function record
/// addresses.
#[derive(Debug)]
pub struct Program {
    pub registry: SymbolRegistry,
    pub functions: Vec<FunctionCode>,
    /// The `main` function.
    pub entry: SymbolId,
    /// Module-level variables in global-segment order.
    pub globals: Vec<SymbolId>,
}

impl Program {
    /// Every instruction of the program, function by function.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.functions.iter().flat_map(|f| f.instructions.iter())
    }

    /// Total number of instructions.
    pub fn instruction_count(&self) -> usize {
        self.functions.iter().map(|f| f.instructions.len()).sum()
    }

    /// The code of `function`.
    pub fn function(&self, function: SymbolId) -> Option<&FunctionCode> {
        self.functions.iter().find(|f| f.function == function)
    }

    /// Find a function's code by display name.
    pub fn function_named(&self, name: &str) -> Option<&FunctionCode> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Index of the first instruction of `function` in [`instructions`](Self::instructions).
    pub fn entry_instruction(&self, function: SymbolId) -> Option<usize> {
        let mut index = 0;
        for code in &self.functions {
            if code.function == function {
                return Some(index);
            }
            index += code.instructions.len();
        }
        None
    }

    /// Types that get a constant-segment record, in creation order.
    pub fn types(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.registry
            .types()
            .filter(|(_, t)| t.record_kind().is_some())
            .map(|(id, _)| id)
    }

    /// A module-level variable by name.
    pub fn global(&self, name: &str) -> Option<SymbolId> {
        self.globals
            .iter()
            .copied()
            .find(|g| self.registry.symbol(*g).name == name)
    }

    /// Human-readable listing of every function.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        for code in &self.functions {
            let _ = writeln!(out, "{}:", code.name);
            for (index, instr) in code.instructions.iter().enumerate() {
                for (id, label) in code.labels.iter() {
                    if label.target() == Some(index) {
                        let _ = writeln!(out, "{id}:");
                    }
                }
                let _ = writeln!(out, "    {instr}");
            }
        }
        out
    }
}
