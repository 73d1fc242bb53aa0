//! Mapping from scope-introducing syntax nodes to registry scopes.
//!
//! Symbol extraction records one entry per module, type declaration,
//! function, block, `for` statement and switch clause. Emission looks
//! scopes up here and never re-creates them.

use rustc_hash::FxHashMap;
use zlang_ast::NodeId;
use zlang_core::InternalError;
use zlang_registry::{ScopeId, SymbolId};

/// Scopes, functions and module init functions by syntax node.
#[derive(Debug, Default)]
pub struct ScopeMap {
    scopes: FxHashMap<NodeId, ScopeId>,
    functions: FxHashMap<NodeId, SymbolId>,
    inits: FxHashMap<NodeId, SymbolId>,
}

impl ScopeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the scope introduced by `node`.
    ///
    /// A node introduces at most one scope; a second registration is an
    /// internal error.
    pub fn insert(&mut self, node: NodeId, scope: ScopeId) -> Result<(), InternalError> {
        if self.scopes.insert(node, scope).is_some() {
            return Err(InternalError::DuplicateScope { node: node.0 });
        }
        Ok(())
    }

    /// The scope introduced by `node`.
    pub fn get(&self, node: NodeId) -> Result<ScopeId, InternalError> {
        self.try_get(node)
            .ok_or(InternalError::MissingScope { node: node.0 })
    }

    pub fn try_get(&self, node: NodeId) -> Option<ScopeId> {
        self.scopes.get(&node).copied()
    }

    /// Record the function or method symbol declared by `node`.
    pub fn insert_function(&mut self, node: NodeId, function: SymbolId) {
        self.functions.insert(node, function);
    }

    /// The function or method declared by `node`, if its declaration succeeded.
    pub fn function(&self, node: NodeId) -> Option<SymbolId> {
        self.functions.get(&node).copied()
    }

    /// Record the synthesized init function of the module `node`.
    pub fn insert_init(&mut self, module: NodeId, init: SymbolId) {
        self.inits.insert(module, init);
    }

    /// The init function of the module `node`.
    pub fn init(&self, module: NodeId) -> Option<SymbolId> {
        self.inits.get(&module).copied()
    }

    /// Number of scope entries.
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}
