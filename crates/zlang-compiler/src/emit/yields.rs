//! Value contexts for block expressions.
//!
//! A block expression allocates its result register up front. Every
//! `yield` inside it moves into that register and branches to the shared
//! exit label. Block expressions nest, so the contexts form a stack; a
//! `yield` always targets the innermost one.

use zlang_registry::{SymbolRegistry, TypeId};

use crate::ir::{LabelId, Register};

/// One enclosing block expression.
#[derive(Debug, Clone, Copy)]
pub struct YieldContext {
    /// Register receiving the yielded value.
    pub target: Register,
    /// Label after the block expression.
    pub exit: LabelId,
    /// Type of the values yielded so far.
    pub ty: Option<TypeId>,
}

/// Stack of block expressions being emitted (innermost last).
#[derive(Debug, Default)]
pub struct YieldStack {
    contexts: Vec<YieldContext>,
}

impl YieldStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, target: Register, exit: LabelId) {
        self.contexts.push(YieldContext { target, exit, ty: None });
    }

    pub fn pop(&mut self) -> Option<YieldContext> {
        self.contexts.pop()
    }

    pub fn current(&self) -> Option<&YieldContext> {
        self.contexts.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut YieldContext> {
        self.contexts.last_mut()
    }

    pub fn depth(&self) -> usize {
        self.contexts.len()
    }
}

/// Combine the type of one more result with the types seen so far.
///
/// The result is the wider of the two when one is assignable to the other,
/// `None` when they are incompatible.
pub fn unify(registry: &SymbolRegistry, seen: Option<TypeId>, next: TypeId) -> Option<TypeId> {
    match seen {
        None => Some(next),
        Some(seen) if registry.is_assignable(seen, next) => Some(seen),
        Some(seen) if registry.is_assignable(next, seen) => Some(next),
        Some(_) => None,
    }
}
