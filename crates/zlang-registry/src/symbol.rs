//! Symbols: named entities bound in scopes.

use zlang_core::{InternalError, Span};

use crate::{ScopeId, SymbolId, TypeId};

/// Parameters and locals of a function, method or interface method.
#[derive(Debug, Clone)]
pub struct Callable {
    /// The parameter scope.
    pub scope: ScopeId,
    /// Declared parameters in order, excluding `self`.
    pub params: Vec<SymbolId>,
    /// The `self` parameter of a method (register 1).
    pub receiver: Option<SymbolId>,
    /// Locals in register order.
    pub locals: Vec<SymbolId>,
    /// The aggregate a method belongs to.
    pub owner: Option<TypeId>,
}

impl Callable {
    pub(crate) fn new(scope: ScopeId, owner: Option<TypeId>) -> Self {
        Self {
            scope,
            params: Vec::new(),
            receiver: None,
            locals: Vec::new(),
            owner,
        }
    }

    /// Number of fixed registers: `self`, parameters and locals.
    ///
    /// Registers `1..=fixed_registers()` hold them; register 0 is the
    /// return value.
    pub fn fixed_registers(&self) -> u32 {
        (self.receiver.is_some() as usize + self.params.len() + self.locals.len()) as u32
    }

    /// `self` (if any) followed by the parameters.
    pub fn all_params(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.receiver.iter().copied().chain(self.params.iter().copied())
    }
}

/// What a symbol names.
#[derive(Debug, Clone)]
pub enum SymbolKind {
    /// A `var`: local, parameter or global.
    Variable,
    /// A `let`: local, global or `self`.
    Constant,
    /// A struct, union or list field.
    Field,
    /// A free function, including module init functions.
    Function(Callable),
    /// A method of a struct or union.
    Method(Callable),
    /// A method signature of an interface.
    InterfaceMethod(Callable),
    Struct(TypeId),
    Union(TypeId),
    Interface(TypeId),
    /// A built-in type name bound in the global scope.
    BuiltInType(TypeId),
    Module { scope: ScopeId },
}

impl SymbolKind {
    /// The callable part of a function-like symbol.
    pub fn callable(&self) -> Option<&Callable> {
        match self {
            SymbolKind::Function(c) | SymbolKind::Method(c) | SymbolKind::InterfaceMethod(c) => Some(c),
            _ => None,
        }
    }

    pub(crate) fn callable_mut(&mut self) -> Option<&mut Callable> {
        match self {
            SymbolKind::Function(c) | SymbolKind::Method(c) | SymbolKind::InterfaceMethod(c) => Some(c),
            _ => None,
        }
    }

    /// The type named by a type symbol.
    pub fn named_type(&self) -> Option<TypeId> {
        match self {
            SymbolKind::Struct(t)
            | SymbolKind::Union(t)
            | SymbolKind::Interface(t)
            | SymbolKind::BuiltInType(t) => Some(*t),
            _ => None,
        }
    }

    /// Whether the symbol holds a value (variable, constant or field).
    pub fn is_value(&self) -> bool {
        matches!(self, SymbolKind::Variable | SymbolKind::Constant | SymbolKind::Field)
    }

    /// Short description used in diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::Field => "field",
            SymbolKind::Function(_) => "function",
            SymbolKind::Method(_) => "method",
            SymbolKind::InterfaceMethod(_) => "interface method",
            SymbolKind::Struct(_) => "struct",
            SymbolKind::Union(_) => "union",
            SymbolKind::Interface(_) => "interface",
            SymbolKind::BuiltInType(_) => "type",
            SymbolKind::Module { .. } => "module",
        }
    }
}

/// A named entity.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Value type, or return type of a function; `None` for void functions
    /// and for type and module symbols.
    pub ty: Option<TypeId>,
    pub span: Span,
    /// The scope the symbol is defined in.
    pub scope: ScopeId,
    address: Option<i32>,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind, ty: Option<TypeId>, span: Span) -> Self {
        Self {
            name: name.into(),
            kind,
            ty,
            span,
            // Filled in by `SymbolRegistry::define`.
            scope: ScopeId::new(0),
            address: None,
        }
    }

    /// The storage address: register, global offset, field offset or
    /// constant-segment record, depending on the kind.
    pub fn address(&self) -> Option<i32> {
        self.address
    }

    /// Assign the address. Assigning the same value again is a no-op; a
    /// different value is an internal error.
    pub fn set_address(&mut self, address: i32) -> Result<(), InternalError> {
        match self.address {
            None => {
                self.address = Some(address);
                Ok(())
            }
            Some(old) if old == address => Ok(()),
            Some(old) => Err(InternalError::AddressReassigned {
                symbol: self.name.clone(),
                old,
                new: address,
            }),
        }
    }

    /// The address, or an internal error when it was never assigned.
    pub fn require_address(&self) -> Result<i32, InternalError> {
        self.address.ok_or_else(|| InternalError::MissingAddress {
            symbol: self.name.clone(),
        })
    }

    /// Whether assignment to this symbol is allowed at all.
    pub fn is_mutable(&self) -> bool {
        matches!(self.kind, SymbolKind::Variable | SymbolKind::Field)
    }
}
