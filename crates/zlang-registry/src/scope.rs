//! Lexical scopes.

use rustc_hash::FxHashMap;

use crate::{ScopeId, SymbolId, TypeId};

/// What introduced a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Module,
    Function,
    Method,
    Block,
    Struct(TypeId),
    Union(TypeId),
    Interface(TypeId),
}

impl ScopeKind {
    /// The aggregate type of a struct, union or interface scope.
    pub fn aggregate(self) -> Option<TypeId> {
        match self {
            ScopeKind::Struct(t) | ScopeKind::Union(t) | ScopeKind::Interface(t) => Some(t),
            _ => None,
        }
    }
}

/// A name table with an enclosing link.
///
/// Symbols iterate in definition order; lookup is by hash.
#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    /// The enclosing scope, `None` only for the global scope.
    pub enclosing: Option<ScopeId>,
    /// The module this scope belongs to, `None` for the global scope and
    /// for built-in composite types.
    pub module: Option<ScopeId>,
    /// The symbol that introduced the scope: the module, function or type.
    pub owner: Option<SymbolId>,
    symbols: Vec<SymbolId>,
    names: FxHashMap<String, SymbolId>,
}

impl Scope {
    pub(crate) fn new(kind: ScopeKind, enclosing: Option<ScopeId>, module: Option<ScopeId>) -> Self {
        Self {
            kind,
            enclosing,
            module,
            owner: None,
            symbols: Vec::new(),
            names: FxHashMap::default(),
        }
    }

    /// Look a name up in this scope's own table.
    pub fn get(&self, name: &str) -> Option<SymbolId> {
        self.names.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Symbols in definition order.
    pub fn symbols(&self) -> &[SymbolId] {
        &self.symbols
    }

    pub(crate) fn insert(&mut self, name: String, id: SymbolId) {
        self.symbols.push(id);
        self.names.insert(name, id);
    }
}
