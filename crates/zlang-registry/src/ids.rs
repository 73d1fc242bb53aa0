//! Index identities for scopes, symbols and types.
//!
//! The registry owns every scope, symbol and type in flat vectors; these ids
//! are indices into them. Enclosing-scope links and type references are ids,
//! never borrows, so the scope graph has no ownership cycles.

use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            /// Create an id from its index.
            #[inline]
            pub const fn new(index: u32) -> Self {
                Self(index)
            }

            /// Get the underlying index.
            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Identifies a scope in the registry.
    ScopeId,
    "scope_"
);

define_id!(
    /// Identifies a symbol in the registry.
    SymbolId,
    "sym_"
);

define_id!(
    /// Identifies a type in the registry.
    TypeId,
    "type_"
);
