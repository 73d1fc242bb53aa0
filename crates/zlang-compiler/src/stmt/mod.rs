//! Statement lowering.
//!
//! Each statement is emitted under a register snapshot: a local error is
//! reported, the registers it acquired are handed back and emission goes on
//! with the next statement.
//!
//! ## Modules
//!
//! - `var_decl`: local declarations
//! - `assign`: stores to locals, globals, fields and elements
//! - `control`: `if`, `while`, `return`, `yield`, `panic`, expression statements
//! - `loops`: numeric and iterator `for`

mod assign;
mod control;
mod loops;
mod var_decl;

use zlang_ast::{Block, Stmt};
use zlang_core::InternalError;

use crate::emit::{EmitResult, FunctionEmitter};

pub(crate) use assign::store_global;

/// Emit the statements of `block` in the scope recorded for it.
pub(crate) fn compile_block(fe: &mut FunctionEmitter<'_>, block: &Block<'_>) -> Result<(), InternalError> {
    let scope = fe.scopes.get(block.id)?;
    fe.with_scope(scope, |fe| {
        for stmt in block.stmts {
            compile_stmt(fe, stmt)?;
        }
        Ok(())
    })
}

fn compile_stmt(fe: &mut FunctionEmitter<'_>, stmt: &Stmt<'_>) -> Result<(), InternalError> {
    let saved = fe.registers.snapshot();
    let result = lower(fe, stmt);
    fe.settle(result, saved)
}

fn lower(fe: &mut FunctionEmitter<'_>, stmt: &Stmt<'_>) -> EmitResult<()> {
    match stmt {
        Stmt::Var(decl) => var_decl::compile_var(fe, decl),
        Stmt::Assign(s) => assign::compile_assign(fe, s),
        Stmt::Expr(s) => control::compile_expr_stmt(fe, s),
        Stmt::If(s) => control::compile_if(fe, s),
        Stmt::While(s) => control::compile_while(fe, s),
        Stmt::ForRange(s) => loops::compile_for_range(fe, s),
        Stmt::ForEach(s) => loops::compile_for_each(fe, s),
        Stmt::Return(s) => control::compile_return(fe, s),
        Stmt::Yield(s) => control::compile_yield(fe, s),
        Stmt::Panic(s) => control::compile_panic(fe, s),
        Stmt::Block(block) => Ok(compile_block(fe, block)?),
    }
}
