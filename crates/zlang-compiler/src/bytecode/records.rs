//! Type and function records of the constant segment.
//!
//! ```text
//! type record
//!     name           [u8; 64]   zero padded, at most 63 bytes
//!     kind           i32        TypeRecordKind
//!     size           i32        instance size
//!     interfaces     i32        count
//!     interface      [i32; 8]   type record addresses, zero padded
//!     vtable         i32        entry count
//!     entries        [(i32, i32)]  (interface method record, function record)
//!     field tags     [u8]       register type ids, layout order, 0 terminated
//!     padding        to 4 bytes
//!
//! function record
//!     entry          i32        code address, -1 for interface methods
//! ```

use zlang_core::CompilationError;
use zlang_registry::{RegisterType, SymbolId, SymbolRegistry, TypeId, TypeRecordKind};

use super::{ByteWriter, MAX_INTERFACES, TYPE_NAME_LEN};

/// Bytes of a type record before the v-table entries.
pub(crate) const TYPE_RECORD_FIXED_SIZE: usize = TYPE_NAME_LEN + 4 * 3 + 4 * MAX_INTERFACES + 4;

/// A type record to be written, with everything needed to size it.
#[derive(Debug, Clone)]
pub(crate) struct TypeRecordPlan {
    pub ty: TypeId,
    pub kind: TypeRecordKind,
    /// Constant-segment address, set once every earlier record is sized.
    pub address: u32,
    /// `(interface method, implementation)` pairs.
    pub vtable: Vec<(SymbolId, SymbolId)>,
    /// Register type ids of the instance fields, in layout order.
    pub field_tags: Vec<u8>,
}

impl TypeRecordPlan {
    /// Plan the record of `ty`. The v-table must already be known to be valid.
    pub fn new(registry: &SymbolRegistry, ty: TypeId, kind: TypeRecordKind, vtable: Vec<(SymbolId, SymbolId)>) -> Self {
        let def = registry.ty(ty);
        let field_tags = def
            .aggregate()
            .map(|aggregate| {
                aggregate
                    .fields
                    .iter()
                    .chain(aggregate.flag.iter())
                    .map(|field| {
                        registry
                            .symbol(*field)
                            .ty
                            .map_or(RegisterType::Void, |t| registry.register_type(t))
                    })
                    .map(u8::from)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            ty,
            kind,
            address: 0,
            vtable,
            field_tags,
        }
    }

    /// Encoded size, including padding.
    pub fn size(&self) -> usize {
        let unpadded = TYPE_RECORD_FIXED_SIZE + 8 * self.vtable.len() + self.field_tags.len() + 1;
        unpadded.next_multiple_of(4)
    }
}

/// Write one type record.
///
/// `interfaces` are the record addresses of the implemented interfaces and
/// `vtable` the resolved `(interface method, implementation)` record
/// addresses. Overlong names and interface lists are truncated and
/// reported as `FieldOverflow`; the record keeps its planned size.
pub(crate) fn write_type_record(
    out: &mut ByteWriter,
    name: &str,
    plan: &TypeRecordPlan,
    instance_size: u32,
    interfaces: &[u32],
    vtable: &[(i32, i32)],
) -> Vec<CompilationError> {
    let mut errors = Vec::new();
    let start = out.position();

    if name.len() >= TYPE_NAME_LEN {
        errors.push(CompilationError::FieldOverflow {
            what: "type name",
            value: name.to_string(),
            max: TYPE_NAME_LEN - 1,
            unit: "bytes",
        });
    }
    out.write_fixed(name.as_bytes(), TYPE_NAME_LEN - 1);
    out.write_u8(0);
    out.write_i32(i32::from(plan.kind));
    out.write_u32(instance_size);

    if interfaces.len() > MAX_INTERFACES {
        errors.push(CompilationError::FieldOverflow {
            what: "interface list of",
            value: name.to_string(),
            max: MAX_INTERFACES,
            unit: "interfaces",
        });
    }
    let count = interfaces.len().min(MAX_INTERFACES);
    out.write_u32(count as u32);
    for slot in 0..MAX_INTERFACES {
        out.write_u32(interfaces.get(slot).copied().unwrap_or(0));
    }

    out.write_u32(vtable.len() as u32);
    for (method, implementation) in vtable {
        out.write_i32(*method);
        out.write_i32(*implementation);
    }
    out.write_bytes(&plan.field_tags);
    out.write_u8(0);

    let written = out.position() - start;
    out.zeros(plan.size().saturating_sub(written));
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use zlang_core::Span;
    use zlang_registry::{AggregateKind, primitives};

    fn point(registry: &mut SymbolRegistry) -> TypeId {
        let module = registry.declare_module("main", Span::point(1, 1)).unwrap();
        let ty = registry
            .declare_aggregate(AggregateKind::Struct, module, "Point", Span::point(1, 1))
            .unwrap();
        registry.add_field(ty, "x", primitives::INT, Span::point(2, 1)).unwrap();
        registry.add_field(ty, "y", primitives::FLOAT, Span::point(3, 1)).unwrap();
        registry.add_field(ty, "name", primitives::STRING, Span::point(4, 1)).unwrap();
        registry.finish_aggregate(ty).unwrap();
        ty
    }

    #[test]
    fn field_tags_follow_layout() {
        let mut registry = SymbolRegistry::new();
        let ty = point(&mut registry);
        let plan = TypeRecordPlan::new(&registry, ty, TypeRecordKind::Struct, Vec::new());
        assert_eq!(plan.field_tags, vec![1, 2, 4]);
        // 112 fixed + 3 tags + terminator, padded.
        assert_eq!(plan.size(), 116);
    }

    #[test]
    fn list_records_carry_hidden_fields() {
        let mut registry = SymbolRegistry::new();
        let list = registry.list_of(primitives::BYTE);
        let plan = TypeRecordPlan::new(&registry, list, TypeRecordKind::List, Vec::new());
        assert_eq!(plan.field_tags, vec![1, 5]);
    }

    #[test]
    fn record_bytes() {
        let mut registry = SymbolRegistry::new();
        let ty = point(&mut registry);
        let entry = (SymbolId::new(0), SymbolId::new(1));
        let plan = TypeRecordPlan::new(&registry, ty, TypeRecordKind::Struct, vec![entry]);
        let mut out = ByteWriter::new();
        let errors = write_type_record(&mut out, "Point", &plan, 16, &[200], &[(300, 400)]);
        let bytes = out.into_bytes();

        assert!(errors.is_empty());
        assert_eq!(bytes.len(), plan.size());
        assert_eq!(&bytes[..6], b"Point\0");
        assert_eq!(&bytes[64..68], &1i32.to_ne_bytes());
        assert_eq!(&bytes[68..72], &16u32.to_ne_bytes());
        assert_eq!(&bytes[72..76], &1u32.to_ne_bytes());
        assert_eq!(&bytes[76..80], &200u32.to_ne_bytes());
        assert_eq!(&bytes[108..112], &1u32.to_ne_bytes());
        assert_eq!(&bytes[112..116], &300i32.to_ne_bytes());
        assert_eq!(&bytes[116..120], &400i32.to_ne_bytes());
    }

    #[test]
    fn long_names_and_interface_lists_overflow() {
        let mut registry = SymbolRegistry::new();
        let ty = point(&mut registry);
        let plan = TypeRecordPlan::new(&registry, ty, TypeRecordKind::Struct, Vec::new());
        let name = "N".repeat(64);
        let mut out = ByteWriter::new();
        let errors = write_type_record(&mut out, &name, &plan, 16, &[4; 9], &[]);

        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], CompilationError::FieldOverflow { max: 63, .. }));
        assert!(matches!(errors[1], CompilationError::FieldOverflow { max: 8, .. }));
        assert_eq!(out.position(), plan.size());
        assert_eq!(out.as_bytes()[63], 0);
    }
}
