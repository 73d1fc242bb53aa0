//! Built-in members of arrays, lists and strings.
//!
//! Built-ins are not symbols. A member access on an array, list or string
//! resolves here by name, and the call site invokes the fixed negative
//! address instead of a constant-segment record.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{SymbolRegistry, TypeId, TypeKind, primitives};

/// A built-in method, numbered by its invoke address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(i8)]
pub enum BuiltIn {
    ArraySize = -1,
    ArrayCopy = -2,
    ListSize = -3,
    ListCapacity = -4,
    ListAdd = -5,
    ListRemove = -6,
    ListSet = -7,
    ListGet = -8,
    StringLength = -9,
}

/// Parameter and return types of a built-in applied to a receiver type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltInSignature {
    pub params: Vec<TypeId>,
    pub ret: Option<TypeId>,
}

impl BuiltIn {
    /// The address passed to `Invoke`.
    pub fn address(self) -> i32 {
        i8::from(self) as i32
    }

    /// The built-in with the given invoke address.
    pub fn from_address(address: i32) -> Option<Self> {
        i8::try_from(address).ok().and_then(|a| Self::try_from(a).ok())
    }

    /// The member name as written in source.
    pub fn name(self) -> &'static str {
        match self {
            BuiltIn::ArraySize | BuiltIn::ListSize => "size",
            BuiltIn::ArrayCopy => "copy",
            BuiltIn::ListCapacity => "capacity",
            BuiltIn::ListAdd => "add",
            BuiltIn::ListRemove => "remove",
            BuiltIn::ListSet => "set",
            BuiltIn::ListGet => "get",
            BuiltIn::StringLength => "length",
        }
    }
}

impl SymbolRegistry {
    /// Resolve `name` as a built-in member of `receiver`.
    pub fn resolve_builtin(&self, receiver: TypeId, name: &str) -> Option<BuiltIn> {
        let builtin = match (&self.ty(receiver).kind, name) {
            (TypeKind::Array { .. }, "size") => BuiltIn::ArraySize,
            (TypeKind::Array { .. }, "copy") => BuiltIn::ArrayCopy,
            (TypeKind::List { .. }, "size") => BuiltIn::ListSize,
            (TypeKind::List { .. }, "capacity") => BuiltIn::ListCapacity,
            (TypeKind::List { .. }, "add") => BuiltIn::ListAdd,
            (TypeKind::List { .. }, "remove") => BuiltIn::ListRemove,
            (TypeKind::List { .. }, "set") => BuiltIn::ListSet,
            (TypeKind::List { .. }, "get") => BuiltIn::ListGet,
            (TypeKind::String, "length") => BuiltIn::StringLength,
            _ => return None,
        };
        Some(builtin)
    }

    /// The signature of `builtin` called on `receiver`.
    pub fn builtin_signature(&self, builtin: BuiltIn, receiver: TypeId) -> BuiltInSignature {
        let element = self.ty(receiver).element().unwrap_or(primitives::ANY);
        let (params, ret) = match builtin {
            BuiltIn::ArraySize | BuiltIn::ListSize | BuiltIn::ListCapacity | BuiltIn::StringLength => {
                (vec![], Some(primitives::INT))
            }
            BuiltIn::ArrayCopy => (vec![], Some(receiver)),
            BuiltIn::ListAdd => (vec![element], None),
            BuiltIn::ListRemove => (vec![primitives::INT], None),
            BuiltIn::ListSet => (vec![primitives::INT, element], None),
            BuiltIn::ListGet => (vec![primitives::INT], Some(element)),
        };
        BuiltInSignature { params, ret }
    }
}
