//! Instructions and their operands.

use std::fmt;

use ordered_float::OrderedFloat;
use zlang_registry::{BuiltIn, SymbolId, TypeId};

use super::{LabelId, OpCode};

/// A virtual-machine register.
///
/// Register 0 holds return values. In a function with `n` parameters and
/// locals, registers `1..=n` hold them and the rest are scratch space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Register(pub u8);

impl Register {
    /// The return-value register.
    pub const RETURN: Register = Register(0);
    /// The highest usable register.
    pub const MAX: Register = Register(255);

    pub fn number(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// The optional 4-byte operand of an instruction, before encoding.
///
/// Everything except `Int` is an indirection resolved by the encoder:
/// constants become literal-pool addresses, functions and types become
/// record addresses and labels become code addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Immediate {
    /// A literal integer, global offset or field offset.
    Int(i32),
    /// A float constant.
    Float(OrderedFloat<f64>),
    /// A string constant.
    Str(String),
    /// A function, method or interface method record.
    Function(SymbolId),
    /// A built-in method.
    BuiltIn(BuiltIn),
    /// A type record.
    Type(TypeId),
    /// A branch target within the same function.
    Label(LabelId),
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int(v) => write!(f, "{v}"),
            Immediate::Float(v) => write!(f, "{}", v.0),
            Immediate::Str(s) => write!(f, "{s:?}"),
            Immediate::Function(id) => write!(f, "{id}"),
            Immediate::BuiltIn(b) => write!(f, "builtin {}", b.address()),
            Immediate::Type(id) => write!(f, "{id}"),
            Immediate::Label(id) => write!(f, "{id}"),
        }
    }
}

/// One emitted instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: OpCode,
    /// Register operands; only the first `opcode.operands().registers` are used.
    pub registers: [Register; 3],
    pub immediate: Option<Immediate>,
}

impl Instruction {
    pub fn new(opcode: OpCode) -> Self {
        Self {
            opcode,
            registers: [Register::RETURN; 3],
            immediate: None,
        }
    }

    /// Builder-style: set the register operands in order.
    pub fn with_registers(mut self, registers: &[Register]) -> Self {
        for (slot, register) in self.registers.iter_mut().zip(registers) {
            *slot = *register;
        }
        self
    }

    /// Builder-style: set the immediate.
    pub fn with_immediate(mut self, immediate: Immediate) -> Self {
        self.immediate = Some(immediate);
        self
    }

    /// The register operands used by the opcode.
    pub fn used_registers(&self) -> &[Register] {
        &self.registers[..self.opcode.operands().registers as usize]
    }

    /// The branch target, for `Br` and `Br_zero`.
    pub fn label(&self) -> Option<LabelId> {
        match self.immediate {
            Some(Immediate::Label(id)) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        let mut separator = " ";
        for register in self.used_registers() {
            write!(f, "{separator}{register}")?;
            separator = ", ";
        }
        if let Some(immediate) = &self.immediate {
            write!(f, "{separator}{immediate}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_shows_used_operands_only() {
        let instr = Instruction::new(OpCode::LdcI32)
            .with_registers(&[Register(3)])
            .with_immediate(Immediate::Int(42));
        assert_eq!(instr.to_string(), "Ldc_i32 r3, 42");
        assert_eq!(instr.used_registers(), &[Register(3)]);

        let add = Instruction::new(OpCode::AddI32).with_registers(&[Register(4), Register(2), Register(3)]);
        assert_eq!(add.to_string(), "Add_i32 r4, r2, r3");
        assert_eq!(Instruction::new(OpCode::Ret).to_string(), "Ret");
    }

    #[test]
    fn label_is_read_from_immediate() {
        let br = Instruction::new(OpCode::Br).with_immediate(Immediate::Label(LabelId(2)));
        assert_eq!(br.label(), Some(LabelId(2)));
        assert_eq!(Instruction::new(OpCode::Nop).label(), None);
    }
}
