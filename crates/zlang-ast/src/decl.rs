//! Module-level declarations.
//!
//! A [`Module`] is one parsed source file. Its items are struct, union and
//! interface declarations, functions (including methods written as
//! `fn Type::name(...)`), and module-level variables.

use zlang_core::Span;

use crate::{Block, Expr, Ident, NodeId, TypeExpr};

/// A parsed module.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Module<'ast> {
    /// Node identity (the module scope).
    pub id: NodeId,
    /// The module name, unique within a program.
    pub name: &'ast str,
    /// The source file the module was parsed from.
    pub file: &'ast str,
    /// Modules this one depends on.
    pub uses: &'ast [Ident<'ast>],
    /// Top-level items in declaration order.
    pub items: &'ast [Item<'ast>],
}

/// A top-level item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Item<'ast> {
    /// `struct Name { ... } is Iface`
    Struct(&'ast StructDecl<'ast>),
    /// `union Name { ... }`
    Union(&'ast UnionDecl<'ast>),
    /// `interface Name { ... }`
    Interface(&'ast InterfaceDecl<'ast>),
    /// `fn name(...)` or `fn Type::name(...)`
    Function(&'ast FunctionDecl<'ast>),
    /// `var name: T = ...` or `let name = ...` at module level
    Global(&'ast VarDecl<'ast>),
}

impl<'ast> Item<'ast> {
    /// Get the span of this item.
    pub fn span(&self) -> Span {
        match self {
            Self::Struct(d) => d.span,
            Self::Union(d) => d.span,
            Self::Interface(d) => d.span,
            Self::Function(d) => d.span,
            Self::Global(d) => d.span,
        }
    }
}

/// A named and typed slot: a parameter or a field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Param<'ast> {
    /// The name.
    pub name: Ident<'ast>,
    /// The declared type.
    pub ty: TypeExpr<'ast>,
    /// Source location.
    pub span: Span,
}

/// A struct declaration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StructDecl<'ast> {
    /// Node identity (the struct scope).
    pub id: NodeId,
    /// The type name.
    pub name: Ident<'ast>,
    /// Fields in declaration (and layout) order.
    pub fields: &'ast [Param<'ast>],
    /// Names of implemented interfaces.
    pub implements: &'ast [Ident<'ast>],
    /// Source location.
    pub span: Span,
}

/// A union declaration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnionDecl<'ast> {
    /// Node identity (the union scope).
    pub id: NodeId,
    /// The type name.
    pub name: Ident<'ast>,
    /// Alternatives in declaration order; the order defines field ids.
    pub fields: &'ast [Param<'ast>],
    /// Names of implemented interfaces.
    pub implements: &'ast [Ident<'ast>],
    /// Source location.
    pub span: Span,
}

/// An interface declaration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterfaceDecl<'ast> {
    /// Node identity (the interface scope).
    pub id: NodeId,
    /// The interface name.
    pub name: Ident<'ast>,
    /// Members as written; only methods are legal.
    pub members: &'ast [InterfaceMember<'ast>],
    /// Source location.
    pub span: Span,
}

/// A member of an interface body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InterfaceMember<'ast> {
    /// A method signature.
    Method(InterfaceMethodDecl<'ast>),
    /// A field; rejected during symbol extraction.
    Field(Param<'ast>),
}

/// A method signature inside an interface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterfaceMethodDecl<'ast> {
    /// Node identity (the method's parameter scope).
    pub id: NodeId,
    /// The method name.
    pub name: Ident<'ast>,
    /// Parameters, excluding `self`.
    pub params: &'ast [Param<'ast>],
    /// Return type, absent for void.
    pub ret: Option<TypeExpr<'ast>>,
    /// Source location.
    pub span: Span,
}

/// A function or method declaration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FunctionDecl<'ast> {
    /// Node identity (the function scope).
    pub id: NodeId,
    /// For methods, the receiver type in `fn Type::name`.
    pub receiver: Option<Ident<'ast>>,
    /// The function name.
    pub name: Ident<'ast>,
    /// Parameters, excluding `self`.
    pub params: &'ast [Param<'ast>],
    /// Return type, absent for void.
    pub ret: Option<TypeExpr<'ast>>,
    /// The function body.
    pub body: Block<'ast>,
    /// Source location.
    pub span: Span,
}

impl FunctionDecl<'_> {
    /// Whether this declares a method.
    pub fn is_method(&self) -> bool {
        self.receiver.is_some()
    }
}

/// A variable (`var`) or constant (`let`) declaration.
///
/// Used both at module level and as a statement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VarDecl<'ast> {
    /// The bound name.
    pub name: Ident<'ast>,
    /// Declared type; inferred from the initializer when absent.
    pub ty: Option<TypeExpr<'ast>>,
    /// The initializer.
    pub init: Option<&'ast Expr<'ast>>,
    /// `true` for `var`, `false` for `let`.
    pub mutable: bool,
    /// Source location.
    pub span: Span,
}
