//! Statement nodes.

use zlang_core::Span;

use crate::{Expr, Ident, NodeId, VarDecl};

/// A statement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stmt<'ast> {
    /// Local `var`/`let` declaration
    Var(&'ast VarDecl<'ast>),
    /// Assignment to a variable, field or element
    Assign(&'ast AssignStmt<'ast>),
    /// Expression evaluated for its effect
    Expr(&'ast ExprStmt<'ast>),
    /// `if` / `else if` / `else`
    If(&'ast IfStmt<'ast>),
    /// `while cond { ... }`
    While(&'ast WhileStmt<'ast>),
    /// `for i in from..to [step s] { ... }`
    ForRange(&'ast ForRangeStmt<'ast>),
    /// `for x in iterable { ... }`
    ForEach(&'ast ForEachStmt<'ast>),
    /// `return [value]`
    Return(&'ast ReturnStmt<'ast>),
    /// `yield value` inside a block expression
    Yield(&'ast YieldStmt<'ast>),
    /// `panic value`
    Panic(&'ast PanicStmt<'ast>),
    /// Nested block
    Block(&'ast Block<'ast>),
}

impl<'ast> Stmt<'ast> {
    /// Get the span of this statement.
    pub fn span(&self) -> Span {
        match self {
            Self::Var(s) => s.span,
            Self::Assign(s) => s.span,
            Self::Expr(s) => s.span,
            Self::If(s) => s.span,
            Self::While(s) => s.span,
            Self::ForRange(s) => s.span,
            Self::ForEach(s) => s.span,
            Self::Return(s) => s.span,
            Self::Yield(s) => s.span,
            Self::Panic(s) => s.span,
            Self::Block(s) => s.span,
        }
    }
}

/// A braced sequence of statements with its own scope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block<'ast> {
    /// Node identity (the block scope).
    pub id: NodeId,
    /// Statements in order.
    pub stmts: &'ast [Stmt<'ast>],
    /// Source location.
    pub span: Span,
}

/// `target = value`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssignStmt<'ast> {
    /// A name, field access or index expression.
    pub target: &'ast Expr<'ast>,
    /// The assigned value.
    pub value: &'ast Expr<'ast>,
    /// Source location.
    pub span: Span,
}

/// An expression statement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExprStmt<'ast> {
    /// The expression.
    pub expr: &'ast Expr<'ast>,
    /// Source location.
    pub span: Span,
}

/// A condition with the block it guards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CondBlock<'ast> {
    /// The condition, must be `bool`.
    pub cond: &'ast Expr<'ast>,
    /// The guarded block.
    pub body: Block<'ast>,
}

/// `if c1 { } else if c2 { } else { }`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IfStmt<'ast> {
    /// The `if` branch followed by every `else if` branch.
    pub branches: &'ast [CondBlock<'ast>],
    /// The `else` block.
    pub otherwise: Option<Block<'ast>>,
    /// Source location.
    pub span: Span,
}

/// `while cond { body }`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WhileStmt<'ast> {
    /// The loop condition, must be `bool`.
    pub cond: &'ast Expr<'ast>,
    /// The loop body.
    pub body: Block<'ast>,
    /// Source location.
    pub span: Span,
}

/// `for var in from..to [step step] { body }`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForRangeStmt<'ast> {
    /// Node identity (scope holding the loop variable).
    pub id: NodeId,
    /// The loop variable, typed `int`.
    pub var: Ident<'ast>,
    /// Inclusive lower bound.
    pub from: &'ast Expr<'ast>,
    /// Exclusive upper bound.
    pub to: &'ast Expr<'ast>,
    /// Increment, 1 when absent.
    pub step: Option<&'ast Expr<'ast>>,
    /// The loop body.
    pub body: Block<'ast>,
    /// Source location.
    pub span: Span,
}

/// `for var in iterable { body }` over an array or list
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForEachStmt<'ast> {
    /// Node identity (scope holding the loop variable).
    pub id: NodeId,
    /// The loop variable, typed as the element type.
    pub var: Ident<'ast>,
    /// The array or list to iterate.
    pub iterable: &'ast Expr<'ast>,
    /// The loop body.
    pub body: Block<'ast>,
    /// Source location.
    pub span: Span,
}

/// `return [value]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnStmt<'ast> {
    /// The returned value.
    pub value: Option<&'ast Expr<'ast>>,
    /// Source location.
    pub span: Span,
}

/// `yield value`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YieldStmt<'ast> {
    /// The value produced by the enclosing block expression.
    pub value: &'ast Expr<'ast>,
    /// Source location.
    pub span: Span,
}

/// `panic value`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanicStmt<'ast> {
    /// The value reported by the runtime.
    pub value: &'ast Expr<'ast>,
    /// Source location.
    pub span: Span,
}
