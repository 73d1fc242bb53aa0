//! Type definitions.
//!
//! Every type has a [`RegisterType`], the storage class that selects the
//! instruction variant operating on it. Reference types (`object`, `string`,
//! arrays, lists, structs, unions, interfaces) are reference counted.

use std::cell::OnceCell;
use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use zlang_core::Span;

use crate::{ScopeId, SymbolId, TypeId, VirtualTable};

/// Physical storage class of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum RegisterType {
    Void = 0,
    Int32 = 1,
    Float64 = 2,
    Unsigned8 = 3,
    String = 4,
    Ref = 5,
    NativePtr = 6,
}

impl RegisterType {
    /// Size in bytes of a value of this class in a field, element or global.
    pub const fn size(self) -> u32 {
        match self {
            RegisterType::Void => 0,
            RegisterType::Int32 => 4,
            RegisterType::Float64 => 8,
            RegisterType::Unsigned8 => 1,
            RegisterType::String => 4,
            RegisterType::Ref => 4,
            RegisterType::NativePtr => 8,
        }
    }

    /// Whether values of this class are reference counted.
    pub const fn is_ref(self) -> bool {
        matches!(self, RegisterType::String | RegisterType::Ref)
    }

    /// Mnemonic suffix used in disassembly.
    pub const fn suffix(self) -> &'static str {
        match self {
            RegisterType::Void => "void",
            RegisterType::Int32 => "i32",
            RegisterType::Float64 => "f64",
            RegisterType::Unsigned8 => "u8",
            RegisterType::String => "str",
            RegisterType::Ref => "ref",
            RegisterType::NativePtr => "ptr",
        }
    }
}

/// Ids of the types every registry starts with.
pub mod primitives {
    use crate::TypeId;

    pub const INT: TypeId = TypeId::new(0);
    pub const FLOAT: TypeId = TypeId::new(1);
    pub const BYTE: TypeId = TypeId::new(2);
    pub const BOOL: TypeId = TypeId::new(3);
    pub const OBJECT: TypeId = TypeId::new(4);
    pub const RUNTIME_PTR: TypeId = TypeId::new(5);
    pub const STRING: TypeId = TypeId::new(6);
    pub const NIL: TypeId = TypeId::new(7);
    pub const ANY: TypeId = TypeId::new(8);

    /// Source names of the built-in types, indexed by id.
    pub(crate) const NAMES: [&str; 9] = [
        "int",
        "float",
        "byte",
        "bool",
        "object",
        "runtime_ptr",
        "string",
        "nil",
        "any",
    ];
}

/// Layout and membership of a struct, union, interface or list.
#[derive(Debug)]
pub struct Aggregate {
    /// The member scope.
    pub scope: ScopeId,
    /// Implemented interfaces, in declaration order.
    pub interfaces: Vec<TypeId>,
    /// Value fields in layout order (for unions, in field-id order).
    pub fields: Vec<SymbolId>,
    /// Instance size in bytes.
    pub size: u32,
    /// The `@flag` field of a union.
    pub flag: Option<SymbolId>,
    pub(crate) vtable: OnceCell<VirtualTable>,
}

impl Aggregate {
    pub(crate) fn new(scope: ScopeId) -> Self {
        Self {
            scope,
            interfaces: Vec::new(),
            fields: Vec::new(),
            size: 0,
            flag: None,
            vtable: OnceCell::new(),
        }
    }
}

/// The shape of a type.
#[derive(Debug)]
pub enum TypeKind {
    /// `int`, `float`, `byte`, `bool`, `object`, `runtime_ptr`
    Primitive(RegisterType),
    /// `string`
    String,
    /// `T[]`
    Array { element: TypeId },
    /// `List<T>`, an aggregate over a backing `T[]`
    List {
        element: TypeId,
        array: TypeId,
        aggregate: Aggregate,
    },
    Struct(Aggregate),
    Union(Aggregate),
    Interface(Aggregate),
    /// Type of the `nil` literal
    Nil,
    /// Accepts any value
    Any,
}

/// Kind tag of a type record in the constant segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum TypeRecordKind {
    Struct = 1,
    Union = 2,
    Interface = 3,
    List = 4,
}

/// A type known to the registry.
#[derive(Debug)]
pub struct TypeDef {
    /// Display name (`int`, `Point`, `int[]`, `List<Point>`).
    pub name: String,
    /// The shape.
    pub kind: TypeKind,
    /// The module scope that declared the type, `None` for built-in and
    /// composite types.
    pub module: Option<ScopeId>,
    /// The symbol naming the type, if any.
    pub symbol: Option<SymbolId>,
    /// Declaration site.
    pub span: Span,
}

impl TypeDef {
    /// The storage class of values of this type.
    pub fn register_type(&self) -> RegisterType {
        match &self.kind {
            TypeKind::Primitive(rt) => *rt,
            TypeKind::String => RegisterType::String,
            TypeKind::Array { .. }
            | TypeKind::List { .. }
            | TypeKind::Struct(_)
            | TypeKind::Union(_)
            | TypeKind::Interface(_)
            | TypeKind::Nil
            | TypeKind::Any => RegisterType::Ref,
        }
    }

    /// Whether values of this type are reference counted.
    pub fn is_ref(&self) -> bool {
        self.register_type().is_ref()
    }

    /// The aggregate part of a struct, union, interface or list.
    pub fn aggregate(&self) -> Option<&Aggregate> {
        match &self.kind {
            TypeKind::Struct(a) | TypeKind::Union(a) | TypeKind::Interface(a) => Some(a),
            TypeKind::List { aggregate, .. } => Some(aggregate),
            _ => None,
        }
    }

    pub(crate) fn aggregate_mut(&mut self) -> Option<&mut Aggregate> {
        match &mut self.kind {
            TypeKind::Struct(a) | TypeKind::Union(a) | TypeKind::Interface(a) => Some(a),
            TypeKind::List { aggregate, .. } => Some(aggregate),
            _ => None,
        }
    }

    /// The kind of constant-segment record this type gets, if any.
    pub fn record_kind(&self) -> Option<TypeRecordKind> {
        match &self.kind {
            TypeKind::Struct(_) => Some(TypeRecordKind::Struct),
            TypeKind::Union(_) => Some(TypeRecordKind::Union),
            TypeKind::Interface(_) => Some(TypeRecordKind::Interface),
            TypeKind::List { .. } => Some(TypeRecordKind::List),
            _ => None,
        }
    }

    pub fn is_interface(&self) -> bool {
        matches!(self.kind, TypeKind::Interface(_))
    }

    pub fn is_union(&self) -> bool {
        matches!(self.kind, TypeKind::Union(_))
    }

    /// The element type of an array or list.
    pub fn element(&self) -> Option<TypeId> {
        match &self.kind {
            TypeKind::Array { element } | TypeKind::List { element, .. } => Some(*element),
            _ => None,
        }
    }
}

impl fmt::Display for TypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_type_sizes() {
        assert_eq!(RegisterType::Void.size(), 0);
        assert_eq!(RegisterType::Int32.size(), 4);
        assert_eq!(RegisterType::Float64.size(), 8);
        assert_eq!(RegisterType::Unsigned8.size(), 1);
        assert_eq!(RegisterType::String.size(), 4);
        assert_eq!(RegisterType::Ref.size(), 4);
        assert_eq!(RegisterType::NativePtr.size(), 8);
    }

    #[test]
    fn register_type_numbering() {
        assert_eq!(u8::from(RegisterType::String), 4);
        assert_eq!(RegisterType::try_from(6u8), Ok(RegisterType::NativePtr));
        assert!(RegisterType::try_from(7u8).is_err());
    }

    #[test]
    fn only_strings_and_refs_are_counted() {
        assert!(RegisterType::String.is_ref());
        assert!(RegisterType::Ref.is_ref());
        assert!(!RegisterType::NativePtr.is_ref());
        assert!(!RegisterType::Int32.is_ref());
    }
}
