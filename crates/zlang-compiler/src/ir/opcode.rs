//! Register-machine operation codes.
//!
//! Each opcode is a single byte followed by its register operands (one byte
//! each) and, for some opcodes, a 4-byte immediate. Typed families (`LdGlb`,
//! `Add`, `Eq`, ...) have one variant per register type; the selectors at
//! the bottom of this module pick the variant for an operand type.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use zlang_registry::RegisterType;

/// Register-machine operation codes.
///
/// Operand notation: `rT` target register, `rS` source register, `#imm` the
/// 4-byte immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum OpCode {
    Nop = 0,

    // =========================================================================
    // Memory
    // =========================================================================
    /// `rT, #global_offset`
    LdGlbI32 = 1,
    LdGlbF64 = 2,
    LdGlbU8 = 3,
    LdGlbRef = 4,
    LdGlbPtr = 5,
    /// `rT, rObject, #field_offset`
    LdFldI32 = 6,
    LdFldF64 = 7,
    LdFldU8 = 8,
    LdFldRef = 9,
    LdFldPtr = 10,
    /// `rT, rArray, rIndex`
    LdElemI32 = 11,
    LdElemF64 = 12,
    LdElemU8 = 13,
    LdElemRef = 14,
    LdElemPtr = 15,
    /// `rS, #global_offset`
    StGlbI32 = 16,
    StGlbF64 = 17,
    StGlbU8 = 18,
    StGlbRef = 19,
    StGlbPtr = 20,
    /// `rS, rObject, #field_offset`
    StFldI32 = 21,
    StFldF64 = 22,
    StFldU8 = 23,
    StFldRef = 24,
    StFldPtr = 25,
    /// `rS, rArray, rIndex`
    StElemI32 = 26,
    StElemF64 = 27,
    StElemU8 = 28,
    StElemRef = 29,
    StElemPtr = 30,

    // =========================================================================
    // Constants
    // =========================================================================
    /// `rT, #value`
    LdcI32 = 31,
    /// `rT, #string_constant`
    LdcStr = 32,
    /// `rT, #float_constant`
    LdcF64 = 33,
    /// `rT`, clears all 8 bytes of the register
    LdcZero = 34,

    // =========================================================================
    // Arithmetic and comparison, all `rT, rLeft, rRight`
    // =========================================================================
    AddI32 = 35,
    AddF64 = 36,
    AddU8 = 37,
    /// String concatenation
    AddStr = 38,
    SubI32 = 39,
    SubF64 = 40,
    SubU8 = 41,
    MulI32 = 42,
    MulF64 = 43,
    MulU8 = 44,
    DivI32 = 45,
    DivF64 = 46,
    DivU8 = 47,
    EqI32 = 48,
    EqF64 = 49,
    EqU8 = 50,
    EqStr = 51,
    EqRef = 52,
    EqPtr = 53,
    NeI32 = 54,
    NeF64 = 55,
    NeU8 = 56,
    NeStr = 57,
    NeRef = 58,
    NePtr = 59,
    GtI32 = 60,
    GtF64 = 61,
    GtU8 = 62,
    GtStr = 63,
    GeI32 = 64,
    GeF64 = 65,
    GeU8 = 66,
    GeStr = 67,
    LtI32 = 68,
    LtF64 = 69,
    LtU8 = 70,
    LtStr = 71,
    LeI32 = 72,
    LeF64 = 73,
    LeU8 = 74,
    LeStr = 75,
    And = 76,
    Or = 77,

    // =========================================================================
    // Control flow
    // =========================================================================
    /// `rT, rS`
    Mov = 78,
    /// `rCond, #label`, branches when the condition is zero
    BrZero = 79,
    /// `#label`
    Br = 80,
    /// `rResult, rFirstArg, #function_record`
    Call = 81,
    Ret = 82,
    Halt = 83,

    // =========================================================================
    // Conversion, by source register type: `rT, rS, #target_register_type`
    // =========================================================================
    ConvI32 = 84,
    ConvF64 = 85,
    ConvU8 = 86,
    ConvStr = 87,
    ConvRef = 88,
    ConvPtr = 89,

    // =========================================================================
    // Heap
    // =========================================================================
    /// `rT, #type_record`
    NewObj = 90,
    /// `rT, #size`
    NewStr = 91,
    /// `rT, rSize`
    NewArrI32 = 92,
    NewArrF64 = 93,
    NewArrU8 = 94,
    NewArrRef = 95,
    NewArrPtr = 96,
    /// `rS`
    AddRef = 97,
    /// `rS`
    RemoveRef = 98,
    /// `rResult, rFirstArg, #builtin`
    Invoke = 99,
    /// `rResult, rFirstArg, #interface_method_record`
    CallVirt = 100,
    /// `rT, rS, #type_record`
    TypeChk = 101,

    // =========================================================================
    // Integer arithmetic, all `rT, rLeft, rRight`
    // =========================================================================
    ModI32 = 102,
    ModF64 = 103,
    ModU8 = 104,
    BandI32 = 105,
    BandU8 = 106,
    BorI32 = 107,
    BorU8 = 108,
    XorI32 = 109,
    XorU8 = 110,
    LShiftI32 = 111,
    LShiftU8 = 112,
    RShiftI32 = 113,
    RShiftU8 = 114,

    // =========================================================================
    // Runtime services
    // =========================================================================
    /// Reclaim objects whose reference count dropped to zero.
    Collect = 115,
    /// `rS`, aborts execution reporting the value
    Panic = 116,
}

/// Operand shape of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operands {
    /// Number of one-byte register operands.
    pub registers: u8,
    /// Whether a 4-byte immediate follows the registers.
    pub immediate: bool,
}

impl Operands {
    const fn new(registers: u8, immediate: bool) -> Self {
        Self { registers, immediate }
    }

    /// Encoded size of the instruction in bytes.
    pub const fn encoded_len(self) -> usize {
        1 + self.registers as usize + if self.immediate { 4 } else { 0 }
    }
}

impl OpCode {
    /// The operand shape.
    pub fn operands(self) -> Operands {
        use OpCode::*;
        match self {
            Nop | Ret | Halt | Collect => Operands::new(0, false),
            Br => Operands::new(0, true),
            LdcZero | AddRef | RemoveRef | Panic => Operands::new(1, false),
            LdGlbI32 | LdGlbF64 | LdGlbU8 | LdGlbRef | LdGlbPtr | StGlbI32 | StGlbF64 | StGlbU8
            | StGlbRef | StGlbPtr | LdcI32 | LdcStr | LdcF64 | BrZero | NewObj | NewStr => {
                Operands::new(1, true)
            }
            Mov | NewArrI32 | NewArrF64 | NewArrU8 | NewArrRef | NewArrPtr => Operands::new(2, false),
            LdFldI32 | LdFldF64 | LdFldU8 | LdFldRef | LdFldPtr | StFldI32 | StFldF64 | StFldU8
            | StFldRef | StFldPtr | Call | Invoke | CallVirt | TypeChk | ConvI32 | ConvF64
            | ConvU8 | ConvStr | ConvRef | ConvPtr => Operands::new(2, true),
            _ => Operands::new(3, false),
        }
    }

    /// Whether the immediate is a branch target.
    pub fn is_branch(self) -> bool {
        matches!(self, OpCode::Br | OpCode::BrZero)
    }

    /// Whether control never falls through to the next instruction.
    pub fn is_terminator(self) -> bool {
        matches!(self, OpCode::Ret | OpCode::Halt | OpCode::Panic)
    }

    /// The disassembly mnemonic, e.g. `LdGlb_i32`.
    pub fn mnemonic(self) -> &'static str {
        use OpCode::*;
        match self {
            Nop => "Nop",
            LdGlbI32 => "LdGlb_i32",
            LdGlbF64 => "LdGlb_f64",
            LdGlbU8 => "LdGlb_u8",
            LdGlbRef => "LdGlb_ref",
            LdGlbPtr => "LdGlb_ptr",
            LdFldI32 => "LdFld_i32",
            LdFldF64 => "LdFld_f64",
            LdFldU8 => "LdFld_u8",
            LdFldRef => "LdFld_ref",
            LdFldPtr => "LdFld_ptr",
            LdElemI32 => "LdElem_i32",
            LdElemF64 => "LdElem_f64",
            LdElemU8 => "LdElem_u8",
            LdElemRef => "LdElem_ref",
            LdElemPtr => "LdElem_ptr",
            StGlbI32 => "StGlb_i32",
            StGlbF64 => "StGlb_f64",
            StGlbU8 => "StGlb_u8",
            StGlbRef => "StGlb_ref",
            StGlbPtr => "StGlb_ptr",
            StFldI32 => "StFld_i32",
            StFldF64 => "StFld_f64",
            StFldU8 => "StFld_u8",
            StFldRef => "StFld_ref",
            StFldPtr => "StFld_ptr",
            StElemI32 => "StElem_i32",
            StElemF64 => "StElem_f64",
            StElemU8 => "StElem_u8",
            StElemRef => "StElem_ref",
            StElemPtr => "StElem_ptr",
            LdcI32 => "Ldc_i32",
            LdcStr => "Ldc_str",
            LdcF64 => "Ldc_f64",
            LdcZero => "Ldc_zero",
            AddI32 => "Add_i32",
            AddF64 => "Add_f64",
            AddU8 => "Add_u8",
            AddStr => "Add_str",
            SubI32 => "Sub_i32",
            SubF64 => "Sub_f64",
            SubU8 => "Sub_u8",
            MulI32 => "Mul_i32",
            MulF64 => "Mul_f64",
            MulU8 => "Mul_u8",
            DivI32 => "Div_i32",
            DivF64 => "Div_f64",
            DivU8 => "Div_u8",
            EqI32 => "Eq_i32",
            EqF64 => "Eq_f64",
            EqU8 => "Eq_u8",
            EqStr => "Eq_str",
            EqRef => "Eq_ref",
            EqPtr => "Eq_ptr",
            NeI32 => "Ne_i32",
            NeF64 => "Ne_f64",
            NeU8 => "Ne_u8",
            NeStr => "Ne_str",
            NeRef => "Ne_ref",
            NePtr => "Ne_ptr",
            GtI32 => "Gt_i32",
            GtF64 => "Gt_f64",
            GtU8 => "Gt_u8",
            GtStr => "Gt_str",
            GeI32 => "Ge_i32",
            GeF64 => "Ge_f64",
            GeU8 => "Ge_u8",
            GeStr => "Ge_str",
            LtI32 => "Lt_i32",
            LtF64 => "Lt_f64",
            LtU8 => "Lt_u8",
            LtStr => "Lt_str",
            LeI32 => "Le_i32",
            LeF64 => "Le_f64",
            LeU8 => "Le_u8",
            LeStr => "Le_str",
            And => "And",
            Or => "Or",
            Mov => "Mov",
            BrZero => "Br_zero",
            Br => "Br",
            Call => "Call",
            Ret => "Ret",
            Halt => "Halt",
            ConvI32 => "Conv_i32",
            ConvF64 => "Conv_f64",
            ConvU8 => "Conv_u8",
            ConvStr => "Conv_str",
            ConvRef => "Conv_ref",
            ConvPtr => "Conv_ptr",
            NewObj => "NewObj",
            NewStr => "NewStr",
            NewArrI32 => "NewArr_i32",
            NewArrF64 => "NewArr_f64",
            NewArrU8 => "NewArr_u8",
            NewArrRef => "NewArr_ref",
            NewArrPtr => "NewArr_ptr",
            AddRef => "AddRef",
            RemoveRef => "RemoveRef",
            Invoke => "Invoke",
            CallVirt => "CallVirt",
            TypeChk => "TypeChk",
            ModI32 => "Mod_i32",
            ModF64 => "Mod_f64",
            ModU8 => "Mod_u8",
            BandI32 => "Band_i32",
            BandU8 => "Band_u8",
            BorI32 => "Bor_i32",
            BorU8 => "Bor_u8",
            XorI32 => "Xor_i32",
            XorU8 => "Xor_u8",
            LShiftI32 => "LShift_i32",
            LShiftU8 => "LShift_u8",
            RShiftI32 => "RShift_i32",
            RShiftU8 => "RShift_u8",
            Collect => "Collect",
            Panic => "Panic",
        }
    }

    // =========================================================================
    // Typed selectors
    // =========================================================================

    /// `[i32, f64, u8, ref, ptr]` family member for a storage class.
    fn storage(rt: RegisterType, family: [OpCode; 5]) -> Option<OpCode> {
        match rt {
            RegisterType::Int32 => Some(family[0]),
            RegisterType::Float64 => Some(family[1]),
            RegisterType::Unsigned8 => Some(family[2]),
            RegisterType::String | RegisterType::Ref => Some(family[3]),
            RegisterType::NativePtr => Some(family[4]),
            RegisterType::Void => None,
        }
    }

    /// `[i32, f64, u8, str]` family member for an arithmetic or ordering operand.
    fn scalar(rt: RegisterType, family: [Option<OpCode>; 4]) -> Option<OpCode> {
        match rt {
            RegisterType::Int32 => family[0],
            RegisterType::Float64 => family[1],
            RegisterType::Unsigned8 => family[2],
            RegisterType::String => family[3],
            _ => None,
        }
    }

    pub fn ld_glb(rt: RegisterType) -> Option<OpCode> {
        use OpCode::*;
        Self::storage(rt, [LdGlbI32, LdGlbF64, LdGlbU8, LdGlbRef, LdGlbPtr])
    }

    pub fn st_glb(rt: RegisterType) -> Option<OpCode> {
        use OpCode::*;
        Self::storage(rt, [StGlbI32, StGlbF64, StGlbU8, StGlbRef, StGlbPtr])
    }

    pub fn ld_fld(rt: RegisterType) -> Option<OpCode> {
        use OpCode::*;
        Self::storage(rt, [LdFldI32, LdFldF64, LdFldU8, LdFldRef, LdFldPtr])
    }

    pub fn st_fld(rt: RegisterType) -> Option<OpCode> {
        use OpCode::*;
        Self::storage(rt, [StFldI32, StFldF64, StFldU8, StFldRef, StFldPtr])
    }

    pub fn ld_elem(rt: RegisterType) -> Option<OpCode> {
        use OpCode::*;
        Self::storage(rt, [LdElemI32, LdElemF64, LdElemU8, LdElemRef, LdElemPtr])
    }

    pub fn st_elem(rt: RegisterType) -> Option<OpCode> {
        use OpCode::*;
        Self::storage(rt, [StElemI32, StElemF64, StElemU8, StElemRef, StElemPtr])
    }

    pub fn new_arr(rt: RegisterType) -> Option<OpCode> {
        use OpCode::*;
        Self::storage(rt, [NewArrI32, NewArrF64, NewArrU8, NewArrRef, NewArrPtr])
    }

    pub fn add(rt: RegisterType) -> Option<OpCode> {
        use OpCode::*;
        Self::scalar(rt, [Some(AddI32), Some(AddF64), Some(AddU8), Some(AddStr)])
    }

    pub fn sub(rt: RegisterType) -> Option<OpCode> {
        use OpCode::*;
        Self::scalar(rt, [Some(SubI32), Some(SubF64), Some(SubU8), None])
    }

    pub fn mul(rt: RegisterType) -> Option<OpCode> {
        use OpCode::*;
        Self::scalar(rt, [Some(MulI32), Some(MulF64), Some(MulU8), None])
    }

    pub fn div(rt: RegisterType) -> Option<OpCode> {
        use OpCode::*;
        Self::scalar(rt, [Some(DivI32), Some(DivF64), Some(DivU8), None])
    }

    pub fn rem(rt: RegisterType) -> Option<OpCode> {
        use OpCode::*;
        Self::scalar(rt, [Some(ModI32), Some(ModF64), Some(ModU8), None])
    }

    pub fn band(rt: RegisterType) -> Option<OpCode> {
        use OpCode::*;
        Self::scalar(rt, [Some(BandI32), None, Some(BandU8), None])
    }

    pub fn bor(rt: RegisterType) -> Option<OpCode> {
        use OpCode::*;
        Self::scalar(rt, [Some(BorI32), None, Some(BorU8), None])
    }

    pub fn xor(rt: RegisterType) -> Option<OpCode> {
        use OpCode::*;
        Self::scalar(rt, [Some(XorI32), None, Some(XorU8), None])
    }

    pub fn shl(rt: RegisterType) -> Option<OpCode> {
        use OpCode::*;
        Self::scalar(rt, [Some(LShiftI32), None, Some(LShiftU8), None])
    }

    pub fn shr(rt: RegisterType) -> Option<OpCode> {
        use OpCode::*;
        Self::scalar(rt, [Some(RShiftI32), None, Some(RShiftU8), None])
    }

    pub fn gt(rt: RegisterType) -> Option<OpCode> {
        use OpCode::*;
        Self::scalar(rt, [Some(GtI32), Some(GtF64), Some(GtU8), Some(GtStr)])
    }

    pub fn ge(rt: RegisterType) -> Option<OpCode> {
        use OpCode::*;
        Self::scalar(rt, [Some(GeI32), Some(GeF64), Some(GeU8), Some(GeStr)])
    }

    pub fn lt(rt: RegisterType) -> Option<OpCode> {
        use OpCode::*;
        Self::scalar(rt, [Some(LtI32), Some(LtF64), Some(LtU8), Some(LtStr)])
    }

    pub fn le(rt: RegisterType) -> Option<OpCode> {
        use OpCode::*;
        Self::scalar(rt, [Some(LeI32), Some(LeF64), Some(LeU8), Some(LeStr)])
    }

    pub fn eq(rt: RegisterType) -> Option<OpCode> {
        use OpCode::*;
        match rt {
            RegisterType::Int32 => Some(EqI32),
            RegisterType::Float64 => Some(EqF64),
            RegisterType::Unsigned8 => Some(EqU8),
            RegisterType::String => Some(EqStr),
            RegisterType::Ref => Some(EqRef),
            RegisterType::NativePtr => Some(EqPtr),
            RegisterType::Void => None,
        }
    }

    pub fn ne(rt: RegisterType) -> Option<OpCode> {
        use OpCode::*;
        match rt {
            RegisterType::Int32 => Some(NeI32),
            RegisterType::Float64 => Some(NeF64),
            RegisterType::Unsigned8 => Some(NeU8),
            RegisterType::String => Some(NeStr),
            RegisterType::Ref => Some(NeRef),
            RegisterType::NativePtr => Some(NePtr),
            RegisterType::Void => None,
        }
    }

    /// Conversion selected by the source register type.
    pub fn conv(source: RegisterType) -> Option<OpCode> {
        use OpCode::*;
        match source {
            RegisterType::Int32 => Some(ConvI32),
            RegisterType::Float64 => Some(ConvF64),
            RegisterType::Unsigned8 => Some(ConvU8),
            RegisterType::String => Some(ConvStr),
            RegisterType::Ref => Some(ConvRef),
            RegisterType::NativePtr => Some(ConvPtr),
            RegisterType::Void => None,
        }
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
