//! Type compatibility rules.
//!
//! There are no user-defined conversions. A value of type `source` can be
//! stored where `target` is expected when [`SymbolRegistry::is_assignable`]
//! holds; arithmetic operands are unified by [`SymbolRegistry::promote`].

use crate::{SymbolRegistry, TypeId, primitives};

impl SymbolRegistry {
    /// Whether a `source` value can be assigned to a `target` slot.
    ///
    /// Holds when:
    /// - the types are identical;
    /// - `target` is `any`;
    /// - `target` is `object` and `source` is a reference type or `nil`;
    /// - `target` is any reference type and `source` is `nil`;
    /// - `target` is `int` and `source` is `bool` or `byte`;
    /// - `target` is an interface that `source` implements.
    pub fn is_assignable(&self, target: TypeId, source: TypeId) -> bool {
        if target == source || target == primitives::ANY {
            return true;
        }
        if source == primitives::NIL {
            return self.is_ref(target);
        }
        if target == primitives::OBJECT {
            return self.is_ref(source);
        }
        if target == primitives::INT {
            return source == primitives::BOOL || source == primitives::BYTE;
        }
        self.ty(target).is_interface() && self.implements(source, target)
    }

    /// The common type of two arithmetic operands.
    ///
    /// Identical types promote to themselves and `byte`/`int` mixes to `int`.
    /// There is no implicit conversion between `int` and `float`.
    pub fn promote(&self, a: TypeId, b: TypeId) -> Option<TypeId> {
        use primitives::{BYTE, INT};
        match (a, b) {
            _ if a == b => Some(a),
            (INT, BYTE) | (BYTE, INT) => Some(INT),
            _ => None,
        }
    }

    /// Whether `a` and `b` may be compared with each other.
    pub fn is_comparable(&self, a: TypeId, b: TypeId) -> bool {
        self.is_assignable(a, b) || self.is_assignable(b, a)
    }

    /// The type of an integer literal: `byte` below 256, `int` otherwise.
    pub fn literal_type(&self, value: i64) -> TypeId {
        if (0..256).contains(&value) {
            primitives::BYTE
        } else {
            primitives::INT
        }
    }
}
