//! Type expressions as written in declarations and casts.

use std::fmt;

use zlang_core::Span;

use crate::Ident;

/// A type reference: a named type, `T[]`, or `List<T>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeExpr<'ast> {
    /// A named type (`int`, `string`, a struct, ...).
    Named(Ident<'ast>),
    /// An array of the element type.
    Array(&'ast TypeExpr<'ast>, Span),
    /// A list of the element type.
    List(&'ast TypeExpr<'ast>, Span),
}

impl<'ast> TypeExpr<'ast> {
    /// Get the span of this type expression.
    pub fn span(&self) -> Span {
        match self {
            Self::Named(ident) => ident.span,
            Self::Array(_, span) => *span,
            Self::List(_, span) => *span,
        }
    }
}

impl fmt::Display for TypeExpr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(ident) => write!(f, "{}", ident.name),
            Self::Array(element, _) => write!(f, "{}[]", element),
            Self::List(element, _) => write!(f, "List<{}>", element),
        }
    }
}
