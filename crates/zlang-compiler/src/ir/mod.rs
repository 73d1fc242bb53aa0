//! Register-machine intermediate representation.
//!
//! - [`OpCode`]: the instruction set and its operand shapes
//! - [`Instruction`]: opcode, registers and an unresolved immediate
//! - [`LabelTable`]: deferred branch targets per function
//! - [`Program`]: everything emission produces

mod instruction;
mod label;
mod opcode;
mod program;

pub use instruction::{Immediate, Instruction, Register};
pub use label::{Label, LabelId, LabelTable};
pub use opcode::{OpCode, Operands};
pub use program::{FunctionCode, Program};
