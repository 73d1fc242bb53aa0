//! Virtual tables for interface dispatch.
//!
//! A struct or union implementing interfaces gets one table mapping every
//! interface method to its own method with the same name, parameter types
//! (excluding `self`) and return type. Tables are built on first request
//! and cached on the aggregate.

use zlang_core::CompilationError;

use crate::{SymbolId, SymbolKind, SymbolRegistry, TypeId};

/// One dispatch slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VTableEntry {
    /// The interface declaring the method.
    pub interface: TypeId,
    /// The interface method, the dispatch key.
    pub method: SymbolId,
    /// The aggregate's implementation.
    pub implementation: SymbolId,
}

/// Dispatch table of one aggregate, in interface then method declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualTable {
    pub entries: Vec<VTableEntry>,
}

impl VirtualTable {
    /// The implementation of an interface method.
    pub fn lookup(&self, method: SymbolId) -> Option<SymbolId> {
        self.entries
            .iter()
            .find(|e| e.method == method)
            .map(|e| e.implementation)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SymbolRegistry {
    /// The virtual table of `ty`, built and cached on first use.
    ///
    /// Fails with `MissingImplementation` naming the first interface method
    /// without a matching method. Types that are not structs or unions have
    /// an empty table.
    pub fn virtual_table(&self, ty: TypeId) -> Result<&VirtualTable, CompilationError> {
        let Some(aggregate) = self.ty(ty).aggregate() else {
            return Err(CompilationError::invalid(
                format!("'{}' has no virtual table", self.type_name(ty)),
                self.ty(ty).span,
            ));
        };
        if let Some(table) = aggregate.vtable.get() {
            return Ok(table);
        }
        let table = self.build_virtual_table(ty)?;
        Ok(aggregate.vtable.get_or_init(|| table))
    }

    fn build_virtual_table(&self, ty: TypeId) -> Result<VirtualTable, CompilationError> {
        let def = self.ty(ty);
        let mut table = VirtualTable::default();
        let Some(aggregate) = def.aggregate() else {
            return Ok(table);
        };
        if def.is_interface() {
            return Ok(table);
        }

        for interface in &aggregate.interfaces {
            let Some(iface) = self.ty(*interface).aggregate() else {
                continue;
            };
            for method in self.scope(iface.scope).symbols() {
                if !matches!(self.symbol(*method).kind, SymbolKind::InterfaceMethod(_)) {
                    continue;
                }
                let name = &self.symbol(*method).name;
                let implementation = self
                    .scope(aggregate.scope)
                    .get(name)
                    .filter(|candidate| self.same_signature(*candidate, *method))
                    .ok_or_else(|| CompilationError::MissingImplementation {
                        type_name: def.name.clone(),
                        interface: self.type_name(*interface).to_string(),
                        method: name.clone(),
                        span: def.span,
                    })?;
                table.entries.push(VTableEntry {
                    interface: *interface,
                    method: *method,
                    implementation,
                });
            }
        }
        Ok(table)
    }

    fn same_signature(&self, concrete: SymbolId, declared: SymbolId) -> bool {
        let (concrete, declared) = (self.symbol(concrete), self.symbol(declared));
        let (SymbolKind::Method(c), Some(d)) = (&concrete.kind, declared.kind.callable()) else {
            return false;
        };
        concrete.ty == declared.ty
            && c.params.len() == d.params.len()
            && c
                .params
                .iter()
                .zip(&d.params)
                .all(|(a, b)| self.symbol(*a).ty == self.symbol(*b).ty)
    }
}
