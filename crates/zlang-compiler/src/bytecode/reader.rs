//! Decoding of encoded images.
//!
//! The reader borrows an image and decodes parts of it on request:
//! instructions for disassembly, records and literals by constant address,
//! global values by global address and the heap entry chain.

use std::fmt::{self, Write as _};

use zlang_core::ImageError;
use zlang_registry::{RegisterType, TypeRecordKind};

use super::records::TYPE_RECORD_FIXED_SIZE;
use super::{AGGREGATE_TYPE_BIT, FREE_SLOT, HEAP_ENTRY_HEADER_SIZE, ImageFlags, ImageHeader, MAX_INTERFACES, TYPE_NAME_LEN};
use crate::ir::OpCode;

/// One instruction of the code segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInstruction {
    /// Address within the code segment.
    pub offset: usize,
    pub opcode: OpCode,
    registers: [u8; 3],
    pub immediate: Option<i32>,
}

impl DecodedInstruction {
    /// The register operands.
    pub fn registers(&self) -> &[u8] {
        &self.registers[..self.opcode.operands().registers as usize]
    }

    /// Register operand `index`.
    pub fn register(&self, index: usize) -> usize {
        self.registers[index] as usize
    }

    /// Address of the next instruction.
    pub fn next(&self) -> usize {
        self.offset + self.opcode.operands().encoded_len()
    }
}

impl fmt::Display for DecodedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        let mut separator = " ";
        for register in self.registers() {
            write!(f, "{separator}r{register}")?;
            separator = ", ";
        }
        if let Some(immediate) = self.immediate {
            write!(f, "{separator}{immediate}")?;
        }
        Ok(())
    }
}

/// A decoded type record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRecord {
    pub name: String,
    pub kind: TypeRecordKind,
    pub instance_size: u32,
    /// Record addresses of the implemented interfaces.
    pub interfaces: Vec<u32>,
    /// `(interface method record, function record)` pairs.
    pub vtable: Vec<(i32, i32)>,
    /// Register type ids of the fields, in layout order.
    pub field_tags: Vec<u8>,
}

impl TypeRecord {
    /// Encoded size of the record, so the next record starts at
    /// `address + size()`.
    pub fn size(&self) -> u32 {
        let unpadded = TYPE_RECORD_FIXED_SIZE + 8 * self.vtable.len() + self.field_tags.len() + 1;
        unpadded.next_multiple_of(4) as u32
    }
}

/// The header of a heap object or free slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapEntry {
    /// Offset of the entry header within the heap.
    pub offset: usize,
    pub type_word: u32,
    pub ref_count: u32,
    /// Size of the data following the header.
    pub size: u32,
}

impl HeapEntry {
    pub fn is_free(&self) -> bool {
        self.ref_count == FREE_SLOT
    }

    /// The type record address, for aggregate instances.
    pub fn type_record(&self) -> Option<u32> {
        (self.type_word & AGGREGATE_TYPE_BIT != 0).then_some(self.type_word & !AGGREGATE_TYPE_BIT)
    }

    /// The element register type, for arrays.
    pub fn element_type(&self) -> Option<RegisterType> {
        if self.type_record().is_some() {
            return None;
        }
        u8::try_from(self.type_word).ok().and_then(|t| RegisterType::try_from(t).ok())
    }
}

/// A value read from the global segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GlobalValue {
    Int(i32),
    Float(f64),
    Byte(u8),
    /// A heap reference; strings are references as well.
    Ref(u32),
    Ptr(u64),
}

/// Read access to an encoded image.
#[derive(Debug, Clone, Copy)]
pub struct ImageReader<'a> {
    bytes: &'a [u8],
    header: ImageHeader,
}

impl<'a> ImageReader<'a> {
    /// Validate the header and segment sizes of `bytes`.
    pub fn new(bytes: &'a [u8]) -> Result<Self, ImageError> {
        let header = ImageHeader::read(bytes)?;
        let end = header.heap_offset();
        if bytes.len() < end {
            return Err(ImageError::Truncated {
                offset: bytes.len(),
                needed: end - bytes.len(),
            });
        }
        Ok(Self { bytes, header })
    }

    pub fn header(&self) -> &ImageHeader {
        &self.header
    }

    pub fn code(&self) -> &'a [u8] {
        &self.bytes[self.header.code_offset()..self.header.const_offset()]
    }

    pub fn constants(&self) -> &'a [u8] {
        &self.bytes[self.header.const_offset()..self.header.global_offset()]
    }

    pub fn globals(&self) -> &'a [u8] {
        &self.bytes[self.header.global_offset()..self.header.heap_offset()]
    }

    /// The heap, if the image carries one.
    pub fn heap(&self) -> Option<&'a [u8]> {
        self.header
            .flags
            .contains(ImageFlags::MEMORY_IMAGE)
            .then(|| &self.bytes[self.header.heap_offset()..])
    }

    // ==========================================================================
    // Code
    // ==========================================================================

    /// Decode the instruction at code address `offset`.
    pub fn instruction_at(&self, offset: usize) -> Result<DecodedInstruction, ImageError> {
        let code = self.code();
        let byte = *code.get(offset).ok_or(ImageError::Truncated { offset, needed: 1 })?;
        let opcode = OpCode::try_from(byte).map_err(|_| ImageError::UnknownOpcode { opcode: byte, offset })?;
        let operands = opcode.operands();
        let count = operands.registers as usize;
        let raw = slice(code, offset + 1, count)?;
        let mut registers = [0u8; 3];
        registers[..count].copy_from_slice(raw);
        let immediate = if operands.immediate {
            Some(read_i32(code, offset + 1 + count)?)
        } else {
            None
        };
        Ok(DecodedInstruction {
            offset,
            opcode,
            registers,
            immediate,
        })
    }

    /// Decode the whole code segment.
    pub fn instructions(&self) -> Result<Vec<DecodedInstruction>, ImageError> {
        let mut decoded = Vec::new();
        let mut offset = 0;
        while offset < self.code().len() {
            let instruction = self.instruction_at(offset)?;
            offset = instruction.next();
            decoded.push(instruction);
        }
        Ok(decoded)
    }

    /// One instruction per line, prefixed with its code address.
    pub fn disassemble(&self) -> Result<String, ImageError> {
        let mut out = String::new();
        for instruction in self.instructions()? {
            let _ = writeln!(out, "{:06}  {instruction}", instruction.offset);
        }
        Ok(out)
    }

    // ==========================================================================
    // Constants
    // ==========================================================================

    /// The code address stored in a function record, `-1` for interface methods.
    pub fn function_entry(&self, address: u32) -> Result<i32, ImageError> {
        read_i32(self.constants(), address as usize)
    }

    /// The string constant at `address`.
    pub fn string_at(&self, address: u32) -> Result<&'a str, ImageError> {
        let constants = self.constants();
        let at = address as usize;
        let len = u16::from_ne_bytes(array(constants, at)?) as usize;
        let bytes = slice(constants, at + 2, len)?;
        std::str::from_utf8(bytes).map_err(|_| ImageError::MalformedRecord { address: at })
    }

    /// The float constant at `address`.
    pub fn float_at(&self, address: u32) -> Result<f64, ImageError> {
        Ok(f64::from_ne_bytes(array(self.constants(), address as usize)?))
    }

    /// The type record at `address`.
    pub fn type_record(&self, address: u32) -> Result<TypeRecord, ImageError> {
        let constants = self.constants();
        let at = address as usize;
        let malformed = || ImageError::MalformedRecord { address: at };

        let name_bytes = slice(constants, at, TYPE_NAME_LEN)?;
        let name_len = name_bytes.iter().position(|b| *b == 0).unwrap_or(TYPE_NAME_LEN);
        let name = std::str::from_utf8(&name_bytes[..name_len]).map_err(|_| malformed())?;
        let mut cursor = at + TYPE_NAME_LEN;

        let kind = TypeRecordKind::try_from(read_i32(constants, cursor)?).map_err(|_| malformed())?;
        let instance_size = read_u32(constants, cursor + 4)?;
        let interface_count = read_u32(constants, cursor + 8)? as usize;
        if interface_count > MAX_INTERFACES {
            return Err(malformed());
        }
        cursor += 12;
        let mut interfaces = Vec::with_capacity(interface_count);
        for slot in 0..interface_count {
            interfaces.push(read_u32(constants, cursor + 4 * slot)?);
        }
        cursor += 4 * MAX_INTERFACES;

        let vtable_len = read_u32(constants, cursor)? as usize;
        cursor += 4;
        let mut vtable = Vec::with_capacity(vtable_len);
        for _ in 0..vtable_len {
            vtable.push((read_i32(constants, cursor)?, read_i32(constants, cursor + 4)?));
            cursor += 8;
        }

        let mut field_tags = Vec::new();
        loop {
            let tag = *constants.get(cursor).ok_or(ImageError::Truncated {
                offset: cursor,
                needed: 1,
            })?;
            cursor += 1;
            if tag == 0 {
                break;
            }
            field_tags.push(tag);
        }

        Ok(TypeRecord {
            name: name.to_string(),
            kind,
            instance_size,
            interfaces,
            vtable,
            field_tags,
        })
    }

    // ==========================================================================
    // Globals and heap
    // ==========================================================================

    /// The global at segment offset `address`, read as `register_type`.
    pub fn global(&self, address: u32, register_type: RegisterType) -> Result<GlobalValue, ImageError> {
        read_value(self.globals(), address as usize, register_type)
    }

    /// Walk the heap entry chain.
    pub fn heap_entries(&self) -> Result<Vec<HeapEntry>, ImageError> {
        let Some(heap) = self.heap() else {
            return Ok(Vec::new());
        };
        let mut entries = Vec::new();
        let mut offset = 0;
        while offset + HEAP_ENTRY_HEADER_SIZE <= heap.len() {
            let entry = HeapEntry {
                offset,
                type_word: read_u32(heap, offset)?,
                ref_count: read_u32(heap, offset + 4)?,
                size: read_u32(heap, offset + 8)?,
            };
            offset += HEAP_ENTRY_HEADER_SIZE + entry.size as usize;
            entries.push(entry);
        }
        Ok(entries)
    }
}

/// Read a value of `register_type` at `offset` of `bytes`.
pub(crate) fn read_value(bytes: &[u8], offset: usize, register_type: RegisterType) -> Result<GlobalValue, ImageError> {
    Ok(match register_type {
        RegisterType::Int32 => GlobalValue::Int(read_i32(bytes, offset)?),
        RegisterType::Float64 => GlobalValue::Float(f64::from_ne_bytes(array(bytes, offset)?)),
        RegisterType::Unsigned8 => GlobalValue::Byte(array::<1>(bytes, offset)?[0]),
        RegisterType::String | RegisterType::Ref => GlobalValue::Ref(read_u32(bytes, offset)?),
        RegisterType::NativePtr => GlobalValue::Ptr(u64::from_ne_bytes(array(bytes, offset)?)),
        RegisterType::Void => GlobalValue::Int(0),
    })
}

fn slice(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8], ImageError> {
    bytes
        .get(offset..offset + len)
        .ok_or(ImageError::Truncated { offset, needed: len })
}

fn array<const N: usize>(bytes: &[u8], offset: usize) -> Result<[u8; N], ImageError> {
    let mut out = [0u8; N];
    out.copy_from_slice(slice(bytes, offset, N)?);
    Ok(out)
}

fn read_i32(bytes: &[u8], offset: usize) -> Result<i32, ImageError> {
    Ok(i32::from_ne_bytes(array(bytes, offset)?))
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, ImageError> {
    Ok(u32::from_ne_bytes(array(bytes, offset)?))
}
