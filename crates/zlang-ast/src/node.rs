//! Node identities and identifiers.

use std::fmt;

use zlang_core::Span;

/// Identity of a syntax node that introduces a scope.
///
/// Modules, type declarations, functions, blocks, `for` statements and
/// switch clauses carry a `NodeId`; symbol extraction maps each of them to
/// the scope it creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A name as written in source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ident<'ast> {
    /// The identifier text.
    pub name: &'ast str,
    /// Source location.
    pub span: Span,
}

impl<'ast> Ident<'ast> {
    /// Create an identifier.
    pub fn new(name: &'ast str, span: Span) -> Self {
        Self { name, span }
    }
}

impl fmt::Display for Ident<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
