//! A small interpreter for encoded images.
//!
//! Covers constants, globals, arithmetic, comparisons, conversions, branches,
//! calls, object and array creation, and field and element access. Objects
//! live in a side table; a reference is a tagged index into it, so it never
//! collides with a string constant address. Reference counting instructions
//! are accepted and ignored.

use zlang::ImageReader;
use zlang::compiler::bytecode::{DecodedInstruction, GlobalValue};
use zlang::compiler::ir::OpCode;
use zlang::registry::RegisterType;
use zlang::{ImageError, Program};

const STEP_LIMIT: usize = 1_000_000;

/// Set on every object reference.
const OBJECT_TAG: u32 = 0x4000_0000;

/// Why execution stopped before `Halt`.
#[derive(Debug)]
pub enum Trap {
    Image(ImageError),
    Unsupported(OpCode),
    DivideByZero { offset: usize },
    NilReference { offset: usize },
    OutOfBounds { offset: usize, index: usize },
    Panic(u64),
    StepLimit,
}

impl From<ImageError> for Trap {
    fn from(err: ImageError) -> Self {
        Trap::Image(err)
    }
}

/// A heap object created by `NewObj` or `NewArr`.
#[derive(Debug)]
pub struct Object {
    /// Type record address, for struct, union and list instances.
    pub record: Option<u32>,
    /// Element storage class, for arrays.
    pub element: Option<RegisterType>,
    pub bytes: Vec<u8>,
}

impl Object {
    /// Element values of an array.
    pub fn elements(&self) -> Vec<GlobalValue> {
        let Some(element) = self.element else {
            return Vec::new();
        };
        let width = element.size() as usize;
        (0..self.bytes.len() / width)
            .map(|i| decode(&self.bytes, i * width, element))
            .collect()
    }
}

struct Frame {
    registers: Vec<u64>,
    return_to: usize,
    result: usize,
}

pub struct Machine<'a> {
    reader: ImageReader<'a>,
    globals: Vec<u8>,
    objects: Vec<Object>,
    steps: usize,
}

impl<'a> Machine<'a> {
    pub fn new(image: &'a [u8]) -> Result<Self, Trap> {
        let reader = ImageReader::new(image)?;
        Ok(Self {
            reader,
            globals: reader.globals().to_vec(),
            objects: Vec::new(),
            steps: 0,
        })
    }

    /// Run from the entry point until `Halt`.
    pub fn run(&mut self) -> Result<(), Trap> {
        let header = *self.reader.header();
        let register_count = header.register_count.max(1) as usize;
        let mut pc = self.entry(header.entry_point as u32)?;
        let mut frames = vec![Frame {
            registers: vec![0; register_count],
            return_to: 0,
            result: 0,
        }];

        loop {
            self.steps += 1;
            if self.steps > STEP_LIMIT {
                return Err(Trap::StepLimit);
            }
            let instr = self.reader.instruction_at(pc)?;
            let Some(frame) = frames.last_mut() else {
                return Ok(());
            };
            let mut next = instr.next();

            match instr.opcode {
                OpCode::Nop | OpCode::AddRef | OpCode::RemoveRef | OpCode::Collect => {}
                OpCode::Halt => return Ok(()),
                OpCode::Panic => return Err(Trap::Panic(frame.registers[instr.register(0)])),
                OpCode::Br => next = immediate(&instr) as usize,
                OpCode::BrZero => {
                    if frame.registers[instr.register(0)] == 0 {
                        next = immediate(&instr) as usize;
                    }
                }
                OpCode::Call => {
                    let entry = self.entry(immediate(&instr) as u32)?;
                    let first = instr.register(1);
                    let mut registers = vec![0; register_count];
                    for (slot, value) in registers.iter_mut().skip(1).zip(frame.registers.iter().skip(first)) {
                        *slot = *value;
                    }
                    frames.push(Frame {
                        registers,
                        return_to: next,
                        result: instr.register(0),
                    });
                    next = entry;
                }
                OpCode::Ret => {
                    let Some(done) = frames.pop() else {
                        return Ok(());
                    };
                    let Some(caller) = frames.last_mut() else {
                        return Ok(());
                    };
                    caller.registers[done.result] = done.registers[0];
                    next = done.return_to;
                }
                _ => self.execute(&instr, &mut frame.registers)?,
            }
            pc = next;
        }
    }

    /// Value of a module-level variable after running.
    pub fn global(&self, program: &Program, name: &str) -> GlobalValue {
        let symbol = program.registry.symbol(program.global(name).unwrap());
        let offset = symbol.address().unwrap() as usize;
        let register_type = program.registry.register_type(symbol.ty.unwrap());
        decode(&self.globals, offset, register_type)
    }

    /// The string constant a `Ldc_str` loaded, by its constant address.
    pub fn string(&self, address: u32) -> &'a str {
        self.reader.string_at(address).unwrap()
    }

    /// The object behind a reference.
    pub fn object(&self, reference: u32) -> &Object {
        assert_ne!(reference & OBJECT_TAG, 0, "{reference:#x} is not an object reference");
        &self.objects[(reference & !OBJECT_TAG) as usize]
    }

    /// A field of a struct or union instance, by name. Union instances also
    /// answer for their `@flag` byte.
    pub fn field(&self, program: &Program, reference: u32, name: &str) -> GlobalValue {
        let object = self.object(reference);
        let record = self.reader.type_record(object.record.unwrap()).unwrap();
        let registry = &program.registry;
        let ty = program
            .types()
            .find(|t| registry.type_name(*t) == record.name)
            .unwrap();
        let field = registry.symbol(registry.resolve_member(ty, name).unwrap());
        let register_type = registry.register_type(field.ty.unwrap());
        decode(&object.bytes, field.address().unwrap() as usize, register_type)
    }

    fn entry(&self, record: u32) -> Result<usize, Trap> {
        let entry = self.reader.function_entry(record)?;
        usize::try_from(entry).map_err(|_| Trap::Unsupported(OpCode::CallVirt))
    }

    fn allocate(&mut self, object: Object) -> u64 {
        self.objects.push(object);
        u64::from((self.objects.len() as u32 - 1) | OBJECT_TAG)
    }

    fn object_mut(&mut self, reference: u64, offset: usize) -> Result<&mut Object, Trap> {
        let reference = reference as u32;
        if reference & OBJECT_TAG == 0 {
            return Err(Trap::NilReference { offset });
        }
        self.objects
            .get_mut((reference & !OBJECT_TAG) as usize)
            .ok_or(Trap::NilReference { offset })
    }

    /// Byte range of element `index` of the array behind `reference`.
    fn element(&mut self, reference: u64, index: u64, rt: RegisterType, offset: usize) -> Result<(&mut Object, usize), Trap> {
        let width = rt.size() as usize;
        let object = self.object_mut(reference, offset)?;
        let index = index as u32 as usize;
        if (index + 1) * width > object.bytes.len() {
            return Err(Trap::OutOfBounds { offset, index });
        }
        Ok((object, index * width))
    }

    fn execute(&mut self, instr: &DecodedInstruction, r: &mut [u64]) -> Result<(), Trap> {
        use OpCode::*;

        let t = instr.register(0);
        let (a, b) = if instr.registers().len() == 3 {
            (r[instr.register(1)], r[instr.register(2)])
        } else {
            (0, 0)
        };
        let at = instr.offset;

        let value = match instr.opcode {
            LdcI32 => int(immediate(instr)),
            LdcF64 => float(self.reader.float_at(immediate(instr) as u32)?),
            LdcStr => immediate(instr) as u32 as u64,
            LdcZero => 0,
            Mov => r[instr.register(1)],

            LdGlbI32 | LdGlbF64 | LdGlbU8 | LdGlbRef | LdGlbPtr => {
                let rt = storage(instr.opcode)?;
                load(&self.globals, immediate(instr) as usize, rt)
            }
            StGlbI32 | StGlbF64 | StGlbU8 | StGlbRef | StGlbPtr => {
                let rt = storage(instr.opcode)?;
                store(&mut self.globals, immediate(instr) as usize, rt, r[t]);
                return Ok(());
            }

            NewObj => {
                let record = immediate(instr) as u32;
                let size = self.reader.type_record(record)?.instance_size as usize;
                self.allocate(Object {
                    record: Some(record),
                    element: None,
                    bytes: vec![0; size],
                })
            }
            NewArrI32 | NewArrF64 | NewArrU8 | NewArrRef | NewArrPtr => {
                let rt = storage(instr.opcode)?;
                let count = as_int(r[instr.register(1)]).max(0) as usize;
                self.allocate(Object {
                    record: None,
                    element: Some(rt),
                    bytes: vec![0; count * rt.size() as usize],
                })
            }
            LdFldI32 | LdFldF64 | LdFldU8 | LdFldRef | LdFldPtr => {
                let rt = storage(instr.opcode)?;
                let object = self.object_mut(r[instr.register(1)], at)?;
                load(&object.bytes, immediate(instr) as usize, rt)
            }
            StFldI32 | StFldF64 | StFldU8 | StFldRef | StFldPtr => {
                let rt = storage(instr.opcode)?;
                let object = self.object_mut(r[instr.register(1)], at)?;
                store(&mut object.bytes, immediate(instr) as usize, rt, r[t]);
                return Ok(());
            }
            LdElemI32 | LdElemF64 | LdElemU8 | LdElemRef | LdElemPtr => {
                let rt = storage(instr.opcode)?;
                let (object, start) = self.element(a, b, rt, at)?;
                load(&object.bytes, start, rt)
            }
            StElemI32 | StElemF64 | StElemU8 | StElemRef | StElemPtr => {
                let rt = storage(instr.opcode)?;
                let (object, start) = self.element(a, b, rt, at)?;
                store(&mut object.bytes, start, rt, r[t]);
                return Ok(());
            }

            AddI32 => int(as_int(a).wrapping_add(as_int(b))),
            SubI32 => int(as_int(a).wrapping_sub(as_int(b))),
            MulI32 => int(as_int(a).wrapping_mul(as_int(b))),
            DivI32 | ModI32 if as_int(b) == 0 => return Err(Trap::DivideByZero { offset: at }),
            DivI32 => int(as_int(a).wrapping_div(as_int(b))),
            ModI32 => int(as_int(a).wrapping_rem(as_int(b))),
            BandI32 => int(as_int(a) & as_int(b)),
            BorI32 => int(as_int(a) | as_int(b)),
            XorI32 => int(as_int(a) ^ as_int(b)),
            LShiftI32 => int(as_int(a).wrapping_shl(as_int(b) as u32)),
            RShiftI32 => int(as_int(a).wrapping_shr(as_int(b) as u32)),

            AddU8 => (a as u8).wrapping_add(b as u8) as u64,
            SubU8 => (a as u8).wrapping_sub(b as u8) as u64,
            MulU8 => (a as u8).wrapping_mul(b as u8) as u64,
            DivU8 | ModU8 if b as u8 == 0 => return Err(Trap::DivideByZero { offset: at }),
            DivU8 => ((a as u8) / (b as u8)) as u64,
            ModU8 => ((a as u8) % (b as u8)) as u64,
            BandU8 => ((a as u8) & (b as u8)) as u64,
            BorU8 => ((a as u8) | (b as u8)) as u64,
            XorU8 => ((a as u8) ^ (b as u8)) as u64,
            LShiftU8 => (a as u8).wrapping_shl(b as u32) as u64,
            RShiftU8 => (a as u8).wrapping_shr(b as u32) as u64,

            AddF64 => float(as_float(a) + as_float(b)),
            SubF64 => float(as_float(a) - as_float(b)),
            MulF64 => float(as_float(a) * as_float(b)),
            DivF64 => float(as_float(a) / as_float(b)),

            EqI32 => truth(as_int(a) == as_int(b)),
            NeI32 => truth(as_int(a) != as_int(b)),
            GtI32 => truth(as_int(a) > as_int(b)),
            GeI32 => truth(as_int(a) >= as_int(b)),
            LtI32 => truth(as_int(a) < as_int(b)),
            LeI32 => truth(as_int(a) <= as_int(b)),
            EqU8 => truth(a as u8 == b as u8),
            NeU8 => truth(a as u8 != b as u8),
            GtU8 => truth((a as u8) > (b as u8)),
            GeU8 => truth((a as u8) >= (b as u8)),
            LtU8 => truth((a as u8) < (b as u8)),
            LeU8 => truth((a as u8) <= (b as u8)),
            EqF64 => truth(as_float(a) == as_float(b)),
            NeF64 => truth(as_float(a) != as_float(b)),
            GtF64 => truth(as_float(a) > as_float(b)),
            GeF64 => truth(as_float(a) >= as_float(b)),
            LtF64 => truth(as_float(a) < as_float(b)),
            LeF64 => truth(as_float(a) <= as_float(b)),
            EqRef | EqPtr | EqStr => truth(a == b),
            NeRef | NePtr | NeStr => truth(a != b),
            And => truth(a != 0 && b != 0),
            Or => truth(a != 0 || b != 0),

            ConvI32 | ConvF64 | ConvU8 => {
                let source = r[instr.register(1)];
                let target = u8::try_from(immediate(instr))
                    .ok()
                    .and_then(|t| RegisterType::try_from(t).ok())
                    .ok_or(Trap::Unsupported(instr.opcode))?;
                convert(instr.opcode, source, target).ok_or(Trap::Unsupported(instr.opcode))?
            }

            other => return Err(Trap::Unsupported(other)),
        };
        r[t] = value;
        Ok(())
    }
}

fn immediate(instr: &DecodedInstruction) -> i32 {
    instr.immediate.unwrap_or_default()
}

/// Storage class of a load, store or array creation.
fn storage(opcode: OpCode) -> Result<RegisterType, Trap> {
    use OpCode::*;

    Ok(match opcode {
        LdGlbI32 | StGlbI32 | LdFldI32 | StFldI32 | LdElemI32 | StElemI32 | NewArrI32 => RegisterType::Int32,
        LdGlbF64 | StGlbF64 | LdFldF64 | StFldF64 | LdElemF64 | StElemF64 | NewArrF64 => RegisterType::Float64,
        LdGlbU8 | StGlbU8 | LdFldU8 | StFldU8 | LdElemU8 | StElemU8 | NewArrU8 => RegisterType::Unsigned8,
        LdGlbRef | StGlbRef | LdFldRef | StFldRef | LdElemRef | StElemRef | NewArrRef => RegisterType::Ref,
        LdGlbPtr | StGlbPtr | LdFldPtr | StFldPtr | LdElemPtr | StElemPtr | NewArrPtr => RegisterType::NativePtr,
        other => return Err(Trap::Unsupported(other)),
    })
}

/// Read a register value of class `rt` from `bytes`.
fn load(bytes: &[u8], offset: usize, rt: RegisterType) -> u64 {
    let width = rt.size() as usize;
    let mut raw = [0u8; 8];
    raw[..width].copy_from_slice(&bytes[offset..offset + width]);
    match width {
        1 => u64::from(raw[0]),
        4 => u64::from(u32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]])),
        _ => u64::from_ne_bytes(raw),
    }
}

fn store(bytes: &mut [u8], offset: usize, rt: RegisterType, value: u64) {
    match rt.size() {
        1 => bytes[offset] = value as u8,
        4 => bytes[offset..offset + 4].copy_from_slice(&(value as u32).to_ne_bytes()),
        _ => bytes[offset..offset + 8].copy_from_slice(&value.to_ne_bytes()),
    }
}

fn decode(bytes: &[u8], offset: usize, rt: RegisterType) -> GlobalValue {
    let raw = load(bytes, offset, rt);
    match rt {
        RegisterType::Int32 | RegisterType::Void => GlobalValue::Int(as_int(raw)),
        RegisterType::Float64 => GlobalValue::Float(as_float(raw)),
        RegisterType::Unsigned8 => GlobalValue::Byte(raw as u8),
        RegisterType::NativePtr => GlobalValue::Ptr(raw),
        RegisterType::String | RegisterType::Ref => GlobalValue::Ref(raw as u32),
    }
}

fn int(value: i32) -> u64 {
    value as u32 as u64
}

fn as_int(bits: u64) -> i32 {
    bits as u32 as i32
}

fn float(value: f64) -> u64 {
    value.to_bits()
}

fn as_float(bits: u64) -> f64 {
    f64::from_bits(bits)
}

fn truth(value: bool) -> u64 {
    value as u64
}

fn convert(opcode: OpCode, source: u64, target: RegisterType) -> Option<u64> {
    let value = match opcode {
        OpCode::ConvI32 => as_int(source) as f64,
        OpCode::ConvU8 => (source as u8) as f64,
        OpCode::ConvF64 => as_float(source),
        _ => return None,
    };
    Some(match target {
        RegisterType::Int32 if opcode == OpCode::ConvF64 => int(value as i32),
        RegisterType::Int32 => int(match opcode {
            OpCode::ConvU8 => (source as u8) as i32,
            _ => as_int(source),
        }),
        RegisterType::Unsigned8 => match opcode {
            OpCode::ConvF64 => (value as i64 as u8) as u64,
            _ => (source as u8) as u64,
        },
        RegisterType::Float64 => float(value),
        _ => return None,
    })
}
