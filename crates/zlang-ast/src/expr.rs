//! Expression nodes.
//!
//! Provides nodes for:
//! - Literals and names
//! - Operators, casts and type tests
//! - Calls (free functions, methods, built-in members)
//! - Field access and indexing
//! - Object, array and list creation
//! - Value-producing forms: ternary, block expressions and union switches

use zlang_core::Span;

use crate::{BinaryOp, Block, Ident, NodeId, TypeExpr, UnaryOp};

/// An expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Expr<'ast> {
    /// Literal value
    Literal(&'ast LiteralExpr<'ast>),
    /// Name reference
    Ident(Ident<'ast>),
    /// `self` inside a method
    SelfRef(Span),
    /// Binary operation
    Binary(&'ast BinaryExpr<'ast>),
    /// Unary prefix operation
    Unary(&'ast UnaryExpr<'ast>),
    /// `expr as T`
    Cast(&'ast CastExpr<'ast>),
    /// `expr is T`
    Is(&'ast IsExpr<'ast>),
    /// `then if cond else otherwise`
    Ternary(&'ast TernaryExpr<'ast>),
    /// Call of a free function
    Call(&'ast CallExpr<'ast>),
    /// `receiver.method(args)`
    MethodCall(&'ast MethodCallExpr<'ast>),
    /// `object.field`
    Field(&'ast FieldExpr<'ast>),
    /// `object[index]`
    Index(&'ast IndexExpr<'ast>),
    /// `Type { field: value, ... }`
    New(&'ast NewExpr<'ast>),
    /// `T[size]` or `T[] { a, b, c }`
    NewArray(&'ast NewArrayExpr<'ast>),
    /// `List<T> { a, b, c }`
    NewList(&'ast NewListExpr<'ast>),
    /// `{ ... yield v ... }`
    Block(&'ast BlockExpr<'ast>),
    /// `switch u { field x => ..., else => ... }`
    Switch(&'ast SwitchExpr<'ast>),
}

impl<'ast> Expr<'ast> {
    /// Get the span of this expression.
    pub fn span(&self) -> Span {
        match self {
            Self::Literal(e) => e.span,
            Self::Ident(e) => e.span,
            Self::SelfRef(span) => *span,
            Self::Binary(e) => e.span,
            Self::Unary(e) => e.span,
            Self::Cast(e) => e.span,
            Self::Is(e) => e.span,
            Self::Ternary(e) => e.span,
            Self::Call(e) => e.span,
            Self::MethodCall(e) => e.span,
            Self::Field(e) => e.span,
            Self::Index(e) => e.span,
            Self::New(e) => e.span,
            Self::NewArray(e) => e.span,
            Self::NewList(e) => e.span,
            Self::Block(e) => e.span,
            Self::Switch(e) => e.span,
        }
    }

    /// Whether this expression can appear on the left of `=`.
    pub fn is_place(&self) -> bool {
        matches!(self, Self::Ident(_) | Self::Field(_) | Self::Index(_))
    }
}

/// A literal value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiteralExpr<'ast> {
    /// The value.
    pub kind: LiteralKind<'ast>,
    /// Source location.
    pub span: Span,
}

/// Literal values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LiteralKind<'ast> {
    /// Integer literal
    Int(i64),
    /// Floating-point literal
    Float(f64),
    /// `true` / `false`
    Bool(bool),
    /// Character literal, a byte
    Char(u8),
    /// String literal, unescaped
    Str(&'ast str),
    /// `nil`
    Nil,
    /// `null_ptr`
    NullPtr,
}

/// `left op right`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinaryExpr<'ast> {
    /// Left operand.
    pub left: &'ast Expr<'ast>,
    /// The operator.
    pub op: BinaryOp,
    /// Right operand.
    pub right: &'ast Expr<'ast>,
    /// Source location.
    pub span: Span,
}

/// `op operand`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnaryExpr<'ast> {
    /// The operator.
    pub op: UnaryOp,
    /// The operand.
    pub operand: &'ast Expr<'ast>,
    /// Source location.
    pub span: Span,
}

/// `expr as T`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CastExpr<'ast> {
    /// The converted value.
    pub expr: &'ast Expr<'ast>,
    /// Target type.
    pub ty: TypeExpr<'ast>,
    /// Source location.
    pub span: Span,
}

/// `expr is T`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsExpr<'ast> {
    /// The tested value.
    pub expr: &'ast Expr<'ast>,
    /// The aggregate type tested for.
    pub ty: TypeExpr<'ast>,
    /// Source location.
    pub span: Span,
}

/// `then if cond else otherwise`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TernaryExpr<'ast> {
    /// Value when the condition holds.
    pub then: &'ast Expr<'ast>,
    /// The condition, must be `bool`.
    pub cond: &'ast Expr<'ast>,
    /// Value otherwise.
    pub otherwise: &'ast Expr<'ast>,
    /// Source location.
    pub span: Span,
}

/// `callee(args)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallExpr<'ast> {
    /// The called function.
    pub callee: Ident<'ast>,
    /// Arguments in order.
    pub args: &'ast [Expr<'ast>],
    /// Source location.
    pub span: Span,
}

/// `receiver.method(args)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MethodCallExpr<'ast> {
    /// The receiver, passed as `self`.
    pub receiver: &'ast Expr<'ast>,
    /// The method name.
    pub method: Ident<'ast>,
    /// Arguments in order, excluding the receiver.
    pub args: &'ast [Expr<'ast>],
    /// Source location.
    pub span: Span,
}

/// `object.field`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldExpr<'ast> {
    /// The accessed object.
    pub object: &'ast Expr<'ast>,
    /// The field name.
    pub field: Ident<'ast>,
    /// Source location.
    pub span: Span,
}

/// `object[index]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexExpr<'ast> {
    /// The array or list.
    pub object: &'ast Expr<'ast>,
    /// The element index, an integer.
    pub index: &'ast Expr<'ast>,
    /// Source location.
    pub span: Span,
}

/// A `field: value` pair in an object creation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldInit<'ast> {
    /// The initialized field.
    pub name: Ident<'ast>,
    /// Its value.
    pub value: &'ast Expr<'ast>,
}

/// `Type { field: value, ... }`
///
/// For unions exactly one field is given and it selects the active
/// alternative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewExpr<'ast> {
    /// The struct or union type.
    pub ty: Ident<'ast>,
    /// Field initializers; unnamed fields stay zero.
    pub fields: &'ast [FieldInit<'ast>],
    /// Source location.
    pub span: Span,
}

/// Array creation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewArrayExpr<'ast> {
    /// Element type.
    pub element: TypeExpr<'ast>,
    /// Explicit size; when absent the size is the element count.
    pub size: Option<&'ast Expr<'ast>>,
    /// Initial elements.
    pub elements: &'ast [Expr<'ast>],
    /// Source location.
    pub span: Span,
}

/// List creation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewListExpr<'ast> {
    /// Element type.
    pub element: TypeExpr<'ast>,
    /// Initial elements, appended in order.
    pub elements: &'ast [Expr<'ast>],
    /// Source location.
    pub span: Span,
}

/// A block whose value comes from `yield` statements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockExpr<'ast> {
    /// The body.
    pub block: Block<'ast>,
    /// Source location.
    pub span: Span,
}

/// A union switch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwitchExpr<'ast> {
    /// The union value.
    pub subject: &'ast Expr<'ast>,
    /// One clause per handled alternative.
    pub clauses: &'ast [SwitchClause<'ast>],
    /// The `else` arm.
    pub otherwise: Option<&'ast Expr<'ast>>,
    /// Source location.
    pub span: Span,
}

/// `field binding => body`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwitchClause<'ast> {
    /// Node identity (scope holding the binding).
    pub id: NodeId,
    /// The union alternative this clause handles.
    pub field: Ident<'ast>,
    /// Name bound to the payload.
    pub binding: Option<Ident<'ast>>,
    /// The clause value.
    pub body: &'ast Expr<'ast>,
    /// Source location.
    pub span: Span,
}
