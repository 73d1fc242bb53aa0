//! Per-function emission state and the helpers shared by statements and
//! expressions.

use rustc_hash::FxHashSet;
use tracing::debug;
use zlang_ast::{Block, TypeExpr, VarDecl};
use zlang_core::{CompilationError, Diagnostics, InternalError, Span};
use zlang_registry::{
    Callable, RegisterType, ScopeId, ScopeKind, SymbolId, SymbolRegistry, TypeId,
};

use super::{EmitError, EmitResult, ModuleContext, RegisterAllocator, Value, YieldStack};
use crate::{expr, stmt};
use crate::ScopeMap;
use crate::ir::{FunctionCode, Immediate, Instruction, LabelId, LabelTable, OpCode, Register};
use crate::type_resolver::TypeResolver;

/// Emits the instructions of one function.
pub(crate) struct FunctionEmitter<'e> {
    pub registry: &'e mut SymbolRegistry,
    pub scopes: &'e ScopeMap,
    diagnostics: &'e mut Diagnostics,
    pub module: ModuleContext<'e>,

    pub function: SymbolId,
    name: String,
    callable: Callable,
    ret: Option<TypeId>,
    is_entry: bool,

    /// The innermost scope of the code being emitted.
    pub scope: ScopeId,
    /// Locals whose declaration has been emitted.
    declared: FxHashSet<SymbolId>,
    /// Number of enclosing loops.
    pub loop_depth: u32,

    pub registers: RegisterAllocator,
    pub yields: YieldStack,
    instructions: Vec<Instruction>,
    labels: LabelTable,
    /// Target of every `return`: the shared epilogue.
    exit: LabelId,
}

impl<'e> FunctionEmitter<'e> {
    pub fn new(
        registry: &'e mut SymbolRegistry,
        scopes: &'e ScopeMap,
        diagnostics: &'e mut Diagnostics,
        module: ModuleContext<'e>,
        function: SymbolId,
        is_entry: bool,
    ) -> Result<Self, InternalError> {
        let symbol = registry.symbol(function);
        let callable = symbol
            .kind
            .callable()
            .cloned()
            .ok_or_else(|| InternalError::Invariant(format!("'{}' is not callable", symbol.name)))?;
        let name = match callable.owner {
            Some(owner) => format!("{}::{}", registry.type_name(owner), symbol.name),
            None => symbol.name.clone(),
        };
        let ret = symbol.ty;

        let mut registers = RegisterAllocator::new();
        registers.reset(&name, callable.fixed_registers())?;
        let mut labels = LabelTable::new();
        let exit = labels.create();

        Ok(Self {
            registry,
            scopes,
            diagnostics,
            module,
            function,
            name,
            scope: callable.scope,
            callable,
            ret,
            is_entry,
            declared: FxHashSet::default(),
            loop_depth: 0,
            registers,
            yields: YieldStack::new(),
            instructions: Vec::new(),
            labels,
            exit,
        })
    }

    // ==========================================================================
    // Function structure
    // ==========================================================================

    /// Retain reference parameters and, for the entry point, run the module
    /// initializers.
    pub fn prologue(&mut self, inits: &[SymbolId]) -> Result<(), InternalError> {
        let params: Vec<SymbolId> = self.callable.all_params().collect();
        for param in params {
            let symbol = self.registry.symbol(param);
            if symbol.ty.is_some_and(|t| self.registry.is_ref(t)) {
                let register = Register(symbol.require_address()? as u8);
                self.push(OpCode::AddRef, &[register], None);
            }
        }
        for init in inits {
            self.push(
                OpCode::Call,
                &[Register::RETURN, Register::RETURN],
                Some(Immediate::Function(*init)),
            );
        }
        Ok(())
    }

    /// Emit a function body.
    pub fn body(&mut self, block: &Block<'_>) -> Result<(), InternalError> {
        stmt::compile_block(self, block)
    }

    /// Evaluate a module-level variable's initializer into the global.
    pub fn global_initializer(&mut self, decl: &VarDecl<'_>) -> Result<(), InternalError> {
        let Some(init) = decl.init else {
            return Ok(());
        };
        let Some(global) = self.registry.scope(self.module.scope).get(decl.name.name) else {
            // Declaration failed; already reported.
            return Ok(());
        };
        if !self.registry.symbol(global).kind.is_value() {
            return Ok(());
        }
        let saved = self.registers.snapshot();
        let result = (|| -> EmitResult<()> {
            let value = expr::compile_expr(self, init)?;
            let ty = self.symbol_type(global, decl.name.span)?;
            self.expect_assignable(ty, value.ty, decl.name.span, || {
                format!("cannot initialize global '{}'", decl.name)
            })?;
            stmt::store_global(self, global, value, true, decl.name.span)?;
            self.release(value);
            Ok(())
        })();
        self.settle(result, saved)
    }

    /// Close a statement: report a local error and hand back every register
    /// acquired since `saved`.
    pub fn settle(&mut self, result: EmitResult<()>, saved: super::LiveSet) -> Result<(), InternalError> {
        self.registers.restore(saved);
        match result {
            Ok(()) => Ok(()),
            Err(EmitError::Compile(error)) => {
                self.report(error);
                Ok(())
            }
            Err(EmitError::Internal(error)) => Err(error),
        }
    }

    /// Whether control cannot fall off the end of the emitted code.
    fn ends_with_exit(&self) -> bool {
        match self.instructions.last() {
            Some(last) if last.opcode == OpCode::Panic => true,
            Some(last) => last.opcode == OpCode::Br && last.label() == Some(self.exit),
            None => false,
        }
    }

    /// Check the trailing return, emit the epilogue and hand back the code.
    pub fn finish(mut self) -> Result<FunctionCode, InternalError> {
        if self.ret.is_some() && !self.ends_with_exit() {
            let span = self.registry.symbol(self.function).span;
            self.report(CompilationError::MissingReturn {
                function: self.name.clone(),
                span,
            });
        }

        self.mark(self.exit)?;
        let returns_ref = self.ret.is_some_and(|t| self.registry.is_ref(t));
        if returns_ref {
            self.push(OpCode::AddRef, &[Register::RETURN], None);
        }
        let slots: Vec<SymbolId> = self
            .callable
            .all_params()
            .chain(self.callable.locals.iter().copied())
            .collect();
        for slot in slots {
            let symbol = self.registry.symbol(slot);
            if symbol.ty.is_some_and(|t| self.registry.is_ref(t)) {
                let register = Register(symbol.require_address()? as u8);
                self.push(OpCode::RemoveRef, &[register], None);
            }
        }
        self.push(OpCode::Collect, &[], None);
        if returns_ref {
            self.push(OpCode::RemoveRef, &[Register::RETURN], None);
        }
        self.push(if self.is_entry { OpCode::Halt } else { OpCode::Ret }, &[], None);

        debug!(
            function = %self.name,
            instructions = self.instructions.len(),
            registers = u32::from(self.registers.high_water()) + 1,
            "emitted function"
        );
        Ok(FunctionCode {
            function: self.function,
            name: self.name,
            instructions: self.instructions,
            labels: self.labels,
        })
    }

    // ==========================================================================
    // Instructions and labels
    // ==========================================================================

    /// Append an instruction, returning its index.
    pub fn push(&mut self, opcode: OpCode, registers: &[Register], immediate: Option<Immediate>) -> usize {
        let mut instruction = Instruction::new(opcode).with_registers(registers);
        instruction.immediate = immediate;
        self.instructions.push(instruction);
        self.instructions.len() - 1
    }

    /// Number of instructions emitted so far.
    pub fn position(&self) -> usize {
        self.instructions.len()
    }

    /// Drop instructions emitted after `position`.
    pub fn truncate(&mut self, position: usize) {
        self.instructions.truncate(position);
    }

    pub fn new_label(&mut self) -> LabelId {
        self.labels.create()
    }

    /// Point `label` at the next instruction to be emitted.
    pub fn mark(&mut self, label: LabelId) -> Result<(), InternalError> {
        self.labels.set_target(label, self.instructions.len())
    }

    /// Point `label` at a `Nop` emitted now.
    pub fn mark_nop(&mut self, label: LabelId) -> Result<(), InternalError> {
        self.mark(label)?;
        self.push(OpCode::Nop, &[], None);
        Ok(())
    }

    pub fn branch(&mut self, label: LabelId) {
        let index = self.push(OpCode::Br, &[], Some(Immediate::Label(label)));
        self.labels.add_source(label, index);
    }

    /// Branch to `label` when `condition` is zero.
    pub fn branch_if_zero(&mut self, condition: Register, label: LabelId) {
        let index = self.push(OpCode::BrZero, &[condition], Some(Immediate::Label(label)));
        self.labels.add_source(label, index);
    }

    /// Branch to the epilogue.
    pub fn branch_to_exit(&mut self) {
        self.branch(self.exit);
    }

    /// `Mov dst, src` unless they are the same register.
    pub fn mov(&mut self, dst: Register, src: Register) {
        if dst != src {
            self.push(OpCode::Mov, &[dst, src], None);
        }
    }

    pub fn load_int(&mut self, register: Register, value: i32) {
        self.push(OpCode::LdcI32, &[register], Some(Immediate::Int(value)));
    }

    // ==========================================================================
    // Registers
    // ==========================================================================

    pub fn acquire(&mut self) -> EmitResult<Register> {
        Ok(self.registers.acquire()?)
    }

    pub fn acquire_range(&mut self, count: usize) -> EmitResult<Vec<Register>> {
        Ok(self.registers.acquire_range(count)?)
    }

    /// Release the values' temporary registers, then acquire a target.
    pub fn target_for(&mut self, values: &[Value]) -> EmitResult<Register> {
        let released: Vec<Register> = values.iter().filter(|v| v.temporary).map(|v| v.register).collect();
        Ok(self.registers.acquire_after_release(&released)?)
    }

    pub fn release(&mut self, value: Value) {
        if value.temporary {
            self.registers.release(value.register);
        }
    }

    pub fn release_register(&mut self, register: Register) {
        self.registers.release(register);
    }

    // ==========================================================================
    // Scopes and names
    // ==========================================================================

    /// Run `f` with `scope` as the innermost scope.
    pub fn with_scope<T>(&mut self, scope: ScopeId, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = std::mem::replace(&mut self.scope, scope);
        let result = f(self);
        self.scope = saved;
        result
    }

    /// Run `f` as the body of a loop.
    pub fn in_loop<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.loop_depth += 1;
        let result = f(self);
        self.loop_depth -= 1;
        result
    }

    pub fn declare(&mut self, local: SymbolId) {
        self.declared.insert(local);
    }

    /// A local of this function whose declaration has not been reached.
    pub fn is_pending(&self, symbol: SymbolId) -> bool {
        self.callable.locals.contains(&symbol) && !self.declared.contains(&symbol)
    }

    /// Resolve `name` from the current scope.
    ///
    /// Locals are visible from their declaration on; a name used before its
    /// local declaration refers to an outer binding, if any.
    pub fn resolve(&self, name: &str, span: Span) -> EmitResult<SymbolId> {
        let mut current = Some(self.scope);
        while let Some(id) = current {
            let scope = self.registry.scope(id);
            if scope.kind == ScopeKind::Global {
                break;
            }
            if let Some(symbol) = scope.get(name).filter(|s| !self.is_pending(*s)) {
                return Ok(symbol);
            }
            current = scope.enclosing;
        }
        self.registry
            .resolve(SymbolRegistry::GLOBAL, name)
            .ok_or_else(|| CompilationError::unresolved(name, span).into())
    }

    /// The scope introduced by a syntax node.
    pub fn scope_of(&self, node: zlang_ast::NodeId) -> EmitResult<ScopeId> {
        Ok(self.scopes.get(node)?)
    }

    pub fn resolve_type(&mut self, ty: &TypeExpr<'_>) -> EmitResult<TypeId> {
        Ok(TypeResolver::new(self.registry).resolve(self.scope, ty)?)
    }

    /// The value type of a symbol, which must be known by now.
    pub fn symbol_type(&self, symbol: SymbolId, span: Span) -> EmitResult<TypeId> {
        let symbol = self.registry.symbol(symbol);
        symbol.ty.ok_or_else(|| {
            CompilationError::type_mismatch(format!("the type of '{}' is not known here", symbol.name), span).into()
        })
    }

    /// The register of a parameter or local.
    pub fn slot(&self, symbol: SymbolId) -> EmitResult<Register> {
        let address = self.registry.symbol(symbol).require_address()?;
        u8::try_from(address)
            .map(Register)
            .map_err(|_| InternalError::Invariant(format!("register {address} out of range")).into())
    }

    /// Whether `symbol` is a module-level variable.
    pub fn is_global(&self, symbol: SymbolId) -> bool {
        let s = self.registry.symbol(symbol);
        s.kind.is_value() && self.registry.scope(s.scope).kind == ScopeKind::Module
    }

    /// Whether `module` is a module other than the one being emitted.
    pub fn is_foreign(&self, module: Option<ScopeId>) -> bool {
        module.is_some_and(|m| m != self.module.scope)
    }

    pub fn module_name(&self, module: Option<ScopeId>) -> String {
        module.map_or_else(|| "<builtin>".to_string(), |m| self.registry.module_name(m).to_string())
    }

    /// The type of `self` in a method.
    pub fn receiver(&self) -> Option<(Register, TypeId)> {
        self.callable.receiver.and(self.callable.owner).map(|owner| (Register(1), owner))
    }

    pub fn return_type(&self) -> Option<TypeId> {
        self.ret
    }

    pub fn function_name(&self) -> &str {
        &self.name
    }

    // ==========================================================================
    // Types
    // ==========================================================================

    pub fn register_type(&self, ty: TypeId) -> RegisterType {
        self.registry.register_type(ty)
    }

    pub fn is_ref(&self, ty: TypeId) -> bool {
        self.registry.is_ref(ty)
    }

    pub fn type_name(&self, ty: TypeId) -> String {
        self.registry.type_name(ty).to_string()
    }

    /// `TypeMismatch` unless a `source` value fits a `target` slot.
    pub fn expect_assignable(
        &self,
        target: TypeId,
        source: TypeId,
        span: Span,
        context: impl FnOnce() -> String,
    ) -> EmitResult<()> {
        if self.registry.is_assignable(target, source) {
            return Ok(());
        }
        Err(CompilationError::type_mismatch(
            format!(
                "{}: expected '{}', found '{}'",
                context(),
                self.registry.type_name(target),
                self.registry.type_name(source)
            ),
            span,
        )
        .into())
    }

    /// `TypeMismatch` unless `value` is a `bool`.
    pub fn expect_condition(&self, value: Value, span: Span) -> EmitResult<()> {
        if value.ty == zlang_registry::primitives::BOOL {
            return Ok(());
        }
        Err(CompilationError::type_mismatch(
            format!("condition must be 'bool', found '{}'", self.registry.type_name(value.ty)),
            span,
        )
        .into())
    }

    /// Pick an opcode variant, failing with `TypeMismatch` when the operand
    /// type has none.
    pub fn select(
        &self,
        opcode: Option<OpCode>,
        span: Span,
        message: impl FnOnce() -> String,
    ) -> EmitResult<OpCode> {
        opcode.ok_or_else(|| CompilationError::type_mismatch(message(), span).into())
    }

    pub fn report(&mut self, error: CompilationError) {
        self.diagnostics.report(self.module.file, error);
    }
}
