//! Program to image encoding.
//!
//! Encoding runs in two phases. Layout sizes every instruction and record
//! and assigns the function record addresses, so every immediate is known
//! before the first byte is written. Writing then renders the segments in
//! image order.

use rustc_hash::FxHashMap;
use tracing::debug;
use zlang_core::{CompilationError, Diagnostics, InternalError};
use zlang_registry::{SymbolId, SymbolKind, TypeId, TypeRecordKind};

use super::options::effective_heap_size;
use super::records::{TypeRecordPlan, write_type_record};
use super::{
    ByteWriter, EncoderOptions, FREE_SLOT, HEADER_SIZE, HEAP_ENTRY_HEADER_SIZE, ImageFlags, ImageHeader, LiteralPool,
    MAJOR_VERSION, MINOR_VERSION, NO_CODE,
};
use crate::ir::{FunctionCode, Immediate, Instruction, Program};

/// Output of encoding.
#[derive(Debug)]
pub struct EncodeOutput {
    pub image: Vec<u8>,
    pub header: ImageHeader,
    /// `FieldOverflow` and other format limits hit while encoding.
    pub errors: Diagnostics,
}

/// Code addresses of one function's instructions.
#[derive(Debug, Default)]
struct FunctionLayout {
    /// Address of each instruction.
    offsets: Vec<u32>,
    /// Address just past the last instruction.
    end: u32,
}

impl FunctionLayout {
    /// The address of instruction `index`; one past the end is allowed.
    fn address(&self, index: usize) -> Option<u32> {
        if index == self.offsets.len() {
            return Some(self.end);
        }
        self.offsets.get(index).copied()
    }

    fn entry(&self) -> u32 {
        self.offsets.first().copied().unwrap_or(self.end)
    }
}

/// A function record: the symbol and the code address it stores.
#[derive(Debug, Clone, Copy)]
struct FunctionRecord {
    symbol: SymbolId,
    entry: i32,
}

/// Writes the image of an emitted program.
///
/// The encoder assigns every function, method and interface method its
/// record address in the program's registry.
pub struct Encoder<'p> {
    program: &'p mut Program,
    options: EncoderOptions,
    diagnostics: Diagnostics,
    type_addresses: FxHashMap<TypeId, u32>,
}

impl<'p> Encoder<'p> {
    pub fn new(program: &'p mut Program, options: EncoderOptions) -> Self {
        Self {
            program,
            options,
            diagnostics: Diagnostics::new(),
            type_addresses: FxHashMap::default(),
        }
    }

    /// Encode the program.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn run(mut self) -> Result<EncodeOutput, InternalError> {
        // Layout
        let code_layout = self.layout_code();
        let code_size = code_layout.last().map_or(0, |l| l.end);

        let mut types = self.plan_types();
        let mut offset = 0usize;
        for plan in &mut types {
            plan.address = offset as u32;
            self.type_addresses.insert(plan.ty, plan.address);
            offset += plan.size();
        }
        let records = self.assign_function_records(&code_layout, &mut offset)?;
        let mut pool = LiteralPool::new(offset);
        self.collect_literals(&mut pool);

        // Code segment
        let mut code = ByteWriter::with_capacity(code_size as usize);
        for (function, layout) in self.program.functions.iter().zip(&code_layout) {
            for instruction in &function.instructions {
                self.encode_instruction(&mut code, instruction, function, layout, &pool)?;
            }
        }
        debug!(size = code.position(), "encoded code segment");

        // Constant segment
        let mut constants = ByteWriter::with_capacity(offset + pool.size());
        self.write_type_records(&mut constants, &types)?;
        for record in &records {
            constants.write_i32(record.entry);
        }
        constants.write_bytes(pool.as_bytes());
        debug!(
            size = constants.position(),
            types = types.len(),
            functions = records.len(),
            literals = pool.len(),
            "encoded constant segment"
        );

        let registry = &self.program.registry;
        let global_size = registry.global_size();
        let preceding = (HEADER_SIZE + code.position() + constants.position()) as u32 + global_size;
        let heap_size = effective_heap_size(&self.options, preceding);

        let mut flags = ImageFlags::empty();
        flags.set(ImageFlags::MEMORY_IMAGE, self.options.memory_image);
        flags.set(ImageFlags::LIMIT_HEAP_SIZE, self.options.limit_heap_size);
        let header = ImageHeader {
            major: MAJOR_VERSION,
            minor: MINOR_VERSION,
            code_size: code.position() as u32,
            const_size: constants.position() as u32,
            global_size,
            entry_point: registry.symbol(self.program.entry).require_address()?,
            register_count: self.register_count(),
            max_stack_depth: self.options.max_stack_depth,
            heap_size,
            flags,
        };

        let mut image = ByteWriter::with_capacity(preceding as usize);
        header.write(&mut image);
        image.write_bytes(code.as_bytes());
        image.write_bytes(constants.as_bytes());
        image.zeros(global_size as usize);
        if self.options.memory_image {
            write_heap(&mut image, heap_size);
        }
        debug!(size = image.position(), heap_size, "encoded image");

        Ok(EncodeOutput {
            image: image.into_bytes(),
            header,
            errors: self.diagnostics,
        })
    }

    // ==========================================================================
    // Layout
    // ==========================================================================

    fn layout_code(&self) -> Vec<FunctionLayout> {
        let mut address = 0u32;
        self.program
            .functions
            .iter()
            .map(|function| {
                let offsets = function
                    .instructions
                    .iter()
                    .map(|instruction| {
                        let at = address;
                        address += instruction.opcode.operands().encoded_len() as u32;
                        at
                    })
                    .collect();
                FunctionLayout { offsets, end: address }
            })
            .collect()
    }

    /// Interfaces first, then structs, unions and lists, each in creation order.
    fn plan_types(&mut self) -> Vec<TypeRecordPlan> {
        let mut interfaces = Vec::new();
        let mut others = Vec::new();
        let candidates: Vec<(TypeId, TypeRecordKind)> = self
            .program
            .registry
            .types()
            .filter_map(|(id, def)| def.record_kind().map(|kind| (id, kind)))
            .collect();

        for (ty, kind) in candidates {
            let vtable: Result<Vec<(SymbolId, SymbolId)>, CompilationError> = match kind {
                TypeRecordKind::Interface => Ok(Vec::new()),
                _ => self
                    .program
                    .registry
                    .virtual_table(ty)
                    .map(|table| table.entries.iter().map(|e| (e.method, e.implementation)).collect()),
            };
            let vtable = vtable.unwrap_or_else(|error| {
                self.report_type(ty, error);
                Vec::new()
            });
            let plan = TypeRecordPlan::new(&self.program.registry, ty, kind, vtable);
            if kind == TypeRecordKind::Interface {
                interfaces.push(plan);
            } else {
                others.push(plan);
            }
        }
        interfaces.extend(others);
        interfaces
    }

    /// One record per function with code, then one per interface method.
    fn assign_function_records(
        &mut self,
        code_layout: &[FunctionLayout],
        offset: &mut usize,
    ) -> Result<Vec<FunctionRecord>, InternalError> {
        let mut records: Vec<FunctionRecord> = self
            .program
            .functions
            .iter()
            .zip(code_layout)
            .map(|(function, layout)| FunctionRecord {
                symbol: function.function,
                entry: layout.entry() as i32,
            })
            .collect();

        let registry = &self.program.registry;
        for (_, def) in registry.types() {
            let Some(aggregate) = def.aggregate().filter(|_| def.is_interface()) else {
                continue;
            };
            records.extend(
                registry
                    .scope(aggregate.scope)
                    .symbols()
                    .iter()
                    .filter(|s| matches!(registry.symbol(**s).kind, SymbolKind::InterfaceMethod(_)))
                    .map(|s| FunctionRecord {
                        symbol: *s,
                        entry: NO_CODE,
                    }),
            );
        }

        for record in &records {
            self.program.registry.set_address(record.symbol, *offset as i32)?;
            *offset += 4;
        }
        Ok(records)
    }

    fn collect_literals(&mut self, pool: &mut LiteralPool) {
        let mut overflows = Vec::new();
        for function in &self.program.functions {
            for instruction in &function.instructions {
                let result = match &instruction.immediate {
                    Some(Immediate::Float(value)) => Ok(pool.add_float(value.0)),
                    Some(Immediate::Str(value)) => pool.add_str(value),
                    _ => continue,
                };
                if let Err(error) = result {
                    overflows.push((function.function, error));
                }
            }
        }
        for (function, error) in overflows {
            let file = self.module_of_symbol(function);
            self.diagnostics.report(&file, error);
        }
    }

    /// The highest register used anywhere, plus one.
    fn register_count(&self) -> u32 {
        self.program
            .instructions()
            .flat_map(|i| i.used_registers().iter())
            .map(|r| u32::from(r.number()) + 1)
            .max()
            .unwrap_or(1)
    }

    // ==========================================================================
    // Writing
    // ==========================================================================

    fn encode_instruction(
        &self,
        out: &mut ByteWriter,
        instruction: &Instruction,
        function: &FunctionCode,
        layout: &FunctionLayout,
        pool: &LiteralPool,
    ) -> Result<(), InternalError> {
        out.write_u8(u8::from(instruction.opcode));
        for register in instruction.used_registers() {
            out.write_u8(register.number());
        }
        if !instruction.opcode.operands().immediate {
            return Ok(());
        }
        let Some(immediate) = &instruction.immediate else {
            return Err(InternalError::Invariant(format!(
                "'{}' in '{}' has no immediate",
                instruction.opcode, function.name
            )));
        };
        let value = self.resolve(immediate, function, layout, pool)?;
        out.write_i32(value);
        Ok(())
    }

    /// The 4-byte value of an immediate.
    ///
    /// Labels are resolved here, per branching instruction, so labels no
    /// branch refers to never need a target.
    fn resolve(
        &self,
        immediate: &Immediate,
        function: &FunctionCode,
        layout: &FunctionLayout,
        pool: &LiteralPool,
    ) -> Result<i32, InternalError> {
        let registry = &self.program.registry;
        let value = match immediate {
            Immediate::Int(value) => *value,
            Immediate::Float(value) => pool
                .get(&super::Literal::Float(*value))
                .map_or(0, |a| a as i32),
            // Strings that overflowed were reported; their address is 0.
            Immediate::Str(value) => pool
                .get(&super::Literal::Str(value.clone()))
                .map_or(0, |a| a as i32),
            Immediate::Function(symbol) => registry.symbol(*symbol).require_address()?,
            Immediate::BuiltIn(builtin) => builtin.address(),
            Immediate::Type(ty) => self.type_addresses.get(ty).copied().ok_or_else(|| {
                InternalError::Invariant(format!("'{}' has no type record", registry.type_name(*ty)))
            })? as i32,
            Immediate::Label(label) => {
                let target = function.labels.resolve(*label, &function.name)?;
                layout
                    .address(target)
                    .ok_or_else(|| InternalError::Invariant(format!("{label} in '{}' is out of range", function.name)))?
                    as i32
            }
        };
        Ok(value)
    }

    fn write_type_records(&mut self, out: &mut ByteWriter, types: &[TypeRecordPlan]) -> Result<(), InternalError> {
        for plan in types {
            let registry = &self.program.registry;
            let def = registry.ty(plan.ty);
            let interfaces: Vec<u32> = def
                .aggregate()
                .map(|a| a.interfaces.iter().filter_map(|i| self.type_addresses.get(i).copied()).collect())
                .unwrap_or_default();
            let mut vtable = Vec::with_capacity(plan.vtable.len());
            for (method, implementation) in &plan.vtable {
                vtable.push((
                    registry.symbol(*method).require_address()?,
                    registry.symbol(*implementation).require_address()?,
                ));
            }
            let errors = write_type_record(out, &def.name, plan, registry.instance_size(plan.ty), &interfaces, &vtable);
            for error in errors {
                self.report_type(plan.ty, error);
            }
        }
        Ok(())
    }

    // ==========================================================================
    // Diagnostics
    // ==========================================================================

    /// Encoding errors carry no source file; they are reported against the
    /// declaring module's name.
    fn report_type(&mut self, ty: TypeId, error: CompilationError) {
        let file = self
            .program
            .registry
            .ty(ty)
            .module
            .map_or_else(String::new, |m| self.program.registry.module_name(m).to_string());
        self.diagnostics.report(&file, error);
    }

    fn module_of_symbol(&self, symbol: SymbolId) -> String {
        let registry = &self.program.registry;
        registry
            .symbol_module(symbol)
            .map_or_else(String::new, |m| registry.module_name(m).to_string())
    }
}

/// Append a zeroed heap that starts with one free entry spanning it.
fn write_heap(out: &mut ByteWriter, heap_size: u32) {
    let start = out.position();
    if heap_size as usize >= HEAP_ENTRY_HEADER_SIZE {
        out.write_u32(0);
        out.write_u32(FREE_SLOT);
        out.write_u32(heap_size - HEAP_ENTRY_HEADER_SIZE as u32);
    }
    let written = out.position() - start;
    out.zeros(heap_size as usize - written);
}

#[cfg(test)]
mod tests {
    use bumpalo::Bump;
    use zlang_ast::{AstBuilder, BinaryOp};

    use super::*;
    use crate::bytecode::ImageReader;
    use crate::test_support::program;

    #[test]
    fn header_describes_the_segments() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let n = b.global_var("n", Some(b.named("int")), None);
        let main = b.function("main", &[], None, b.block(&[b.assign(b.name("n"), b.int(3))]));
        let mut program = program(&[b.module("main", &[], &[n, main])]);
        let output = Encoder::new(&mut program, EncoderOptions::default()).run().unwrap();

        assert!(output.errors.is_empty());
        let header = output.header;
        let code_size: usize = program
            .instructions()
            .map(|i| i.opcode.operands().encoded_len())
            .sum();
        assert_eq!(header.code_size as usize, code_size);
        assert_eq!(header.global_size, 4);
        assert!(!header.flags.contains(ImageFlags::MEMORY_IMAGE));
        assert_eq!(
            output.image.len(),
            HEADER_SIZE + header.code_size as usize + header.const_size as usize + 4
        );

        let main = program.function_named("main").unwrap().function;
        assert_eq!(program.registry.symbol(main).address(), Some(header.entry_point));
    }

    #[test]
    fn function_records_hold_entry_addresses() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let helper = b.function("helper", &[], Some(b.named("int")), b.block(&[b.ret(Some(b.int(1)))]));
        let main = b.function("main", &[], None, b.block(&[b.expr_stmt(b.call("helper", &[]))]));
        let mut program = program(&[b.module("main", &[], &[helper, main])]);
        let output = Encoder::new(&mut program, EncoderOptions::default()).run().unwrap();
        let reader = ImageReader::new(&output.image).unwrap();

        let mut entry = 0i32;
        for code in &program.functions {
            let record = program.registry.symbol(code.function).address().unwrap();
            assert_eq!(reader.function_entry(record as u32).unwrap(), entry);
            entry += code
                .instructions
                .iter()
                .map(|i| i.opcode.operands().encoded_len() as i32)
                .sum::<i32>();
        }
    }

    #[test]
    fn branches_resolve_to_code_addresses() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let body = b.block(&[
            b.var("i", None, Some(b.int(0))),
            b.while_(
                b.binary(b.name("i"), BinaryOp::Lt, b.int(3)),
                b.block(&[b.assign(b.name("i"), b.binary(b.name("i"), BinaryOp::Add, b.int(1)))]),
            ),
        ]);
        let main = b.function("main", &[], None, body);
        let mut program = program(&[b.module("main", &[], &[main])]);
        let output = Encoder::new(&mut program, EncoderOptions::default()).run().unwrap();
        let reader = ImageReader::new(&output.image).unwrap();
        let decoded = reader.instructions().unwrap();

        let addresses: Vec<i32> = decoded.iter().map(|d| d.offset as i32).collect();
        for instruction in decoded.iter().filter(|d| d.opcode.is_branch()) {
            let target = instruction.immediate.unwrap();
            assert!(addresses.contains(&target), "{instruction} jumps into the middle of an instruction");
        }
    }

    #[test]
    fn literals_are_pooled_once() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let body = b.block(&[
            b.var("a", None, Some(b.string("same"))),
            b.var("b", None, Some(b.string("same"))),
            b.var("x", None, Some(b.float(0.5))),
            b.var("y", None, Some(b.float(0.5))),
        ]);
        let main = b.function("main", &[], None, body);
        let mut program = program(&[b.module("main", &[], &[main])]);
        let output = Encoder::new(&mut program, EncoderOptions::default()).run().unwrap();
        let reader = ImageReader::new(&output.image).unwrap();
        let decoded = reader.instructions().unwrap();

        let strings: Vec<i32> = decoded
            .iter()
            .filter(|d| d.opcode == crate::ir::OpCode::LdcStr)
            .filter_map(|d| d.immediate)
            .collect();
        assert_eq!(strings.len(), 2);
        assert_eq!(strings[0], strings[1]);
        assert_eq!(reader.string_at(strings[0] as u32).unwrap(), "same");

        let floats: Vec<i32> = decoded
            .iter()
            .filter(|d| d.opcode == crate::ir::OpCode::LdcF64)
            .filter_map(|d| d.immediate)
            .collect();
        assert_eq!(floats[0], floats[1]);
        assert_eq!(floats[0] % 8, 0);
        assert_eq!(reader.float_at(floats[0] as u32).unwrap(), 0.5);
    }

    #[test]
    fn interfaces_come_first_and_vtables_point_at_records() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let circle = b.struct_decl("Circle", &[b.param("r", b.named("float"))], &["Shape"]);
        let shape = b.interface_decl("Shape", &[b.interface_method("area", &[], Some(b.named("float")))]);
        let area = b.method(
            "Circle",
            "area",
            &[],
            Some(b.named("float")),
            b.block(&[b.ret(Some(b.field(b.self_ref(), "r")))]),
        );
        let main = b.function("main", &[], None, b.block(&[]));
        let mut program = program(&[b.module("main", &[], &[circle, shape, area, main])]);
        let output = Encoder::new(&mut program, EncoderOptions::default()).run().unwrap();
        assert!(output.errors.is_empty(), "{}", output.errors);
        let reader = ImageReader::new(&output.image).unwrap();

        let shape_record = reader.type_record(0).unwrap();
        assert_eq!(shape_record.name, "Shape");
        assert_eq!(shape_record.kind, TypeRecordKind::Interface);

        let circle_record = reader.type_record(shape_record.size()).unwrap();
        assert_eq!(circle_record.name, "Circle");
        assert_eq!(circle_record.interfaces, vec![0]);
        assert_eq!(circle_record.vtable.len(), 1);
        let (method, implementation) = circle_record.vtable[0];
        assert_eq!(reader.function_entry(method as u32).unwrap(), NO_CODE);
        assert!(reader.function_entry(implementation as u32).unwrap() >= 0);
    }

    #[test]
    fn memory_image_starts_with_a_free_heap_entry() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let main = b.function("main", &[], None, b.block(&[]));
        let mut program = program(&[b.module("main", &[], &[main])]);
        let options = EncoderOptions::default()
            .with_memory_image(true)
            .with_heap_size(1024)
            .with_limit_heap_size(true);
        let output = Encoder::new(&mut program, options).run().unwrap();
        let reader = ImageReader::new(&output.image).unwrap();

        assert_eq!(output.header.heap_size, 1024);
        assert_eq!(output.image.len(), output.header.heap_offset() + 1024);
        let entries = reader.heap_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_free());
        assert_eq!(entries[0].size, 1024 - 12);
    }

    #[test]
    fn unlimited_heap_rounds_the_image_to_a_bucket() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let main = b.function("main", &[], None, b.block(&[]));
        let mut program = program(&[b.module("main", &[], &[main])]);
        let options = EncoderOptions::default().with_memory_image(true).with_heap_size(1024);
        let output = Encoder::new(&mut program, options).run().unwrap();

        assert_eq!(output.image.len(), 16 * 1024);
    }

    #[test]
    fn overlong_type_names_are_reported() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let name = "T".repeat(70);
        let ty = b.struct_decl(&name, &[b.param("v", b.named("int"))], &[]);
        let main = b.function("main", &[], None, b.block(&[]));
        let mut program = program(&[b.module("main", &[], &[ty, main])]);
        let output = Encoder::new(&mut program, EncoderOptions::default()).run().unwrap();

        assert_eq!(output.errors.len(), 1);
        assert!(matches!(
            output.errors.iter().next().map(|d| &d.error),
            Some(CompilationError::FieldOverflow { max: 63, .. })
        ));
    }
}
