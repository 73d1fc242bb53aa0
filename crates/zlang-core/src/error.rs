//! Error types for every phase of the zlang backend.
//!
//! ## Error Hierarchy
//!
//! ```text
//! CompileError (top-level result of a compilation)
//! ├── Diagnostics     - one or more accumulated CompilationErrors, each tied to a file
//! └── InternalError   - an invariant of the compiler itself was violated (aborts)
//!
//! ImageError          - a bytecode image could not be decoded
//! ```
//!
//! [`CompilationError`]s describe mistakes in the compiled program. They are
//! local to one declaration, statement or expression, so every phase collects
//! them and keeps going. [`InternalError`]s mean the compiler is inconsistent
//! and stop compilation immediately.

use thiserror::Error;

use crate::{Diagnostic, Span};

// ============================================================================
// Compilation Errors
// ============================================================================

/// Semantic errors found while extracting symbols, emitting IR or encoding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompilationError {
    /// A name was defined twice in the same scope.
    #[error("duplicate definition of '{name}'")]
    DuplicateSymbol {
        /// The duplicated name.
        name: String,
        /// Where the second definition occurred.
        span: Span,
    },

    /// A name could not be found in the scope chain.
    #[error("'{name}' is not defined in this context")]
    UnresolvedSymbol {
        /// The name that was looked up.
        name: String,
        /// Where the name was referenced.
        span: Span,
    },

    /// Assignment, argument, return, condition or operator types do not fit.
    #[error("{message}")]
    TypeMismatch {
        /// Description of the mismatch.
        message: String,
        /// Where the mismatch occurred.
        span: Span,
    },

    /// Code in one module touched state owned by another module.
    #[error("{message}")]
    ForeignAccessDenied {
        /// What was accessed and from where.
        message: String,
        /// Where the access occurred.
        span: Span,
    },

    /// An aggregate implements an interface without a matching method.
    #[error("'{type_name}' does not implement '{interface}.{method}'")]
    MissingImplementation {
        /// The implementing aggregate.
        type_name: String,
        /// The interface declaring the method.
        interface: String,
        /// The interface method without a concrete counterpart.
        method: String,
        /// Where the aggregate is declared.
        span: Span,
    },

    /// A call passed the wrong number of arguments.
    #[error("'{name}' expects {expected} arguments, but {found} were given")]
    ArityMismatch {
        /// The called function or method.
        name: String,
        /// Number of declared parameters.
        expected: usize,
        /// Number of arguments at the call site.
        found: usize,
        /// Where the call occurred.
        span: Span,
    },

    /// A union switch without `else` does not cover every field.
    #[error("switch over '{union_name}' does not handle {}", missing.join(", "))]
    NonExhaustiveUnionSwitch {
        /// The switched-over union type.
        union_name: String,
        /// Field names without a clause, in declaration order.
        missing: Vec<String>,
        /// Where the switch occurred.
        span: Span,
    },

    /// A value-returning function can fall off its end.
    #[error("function '{function}' must return a value")]
    MissingReturn {
        /// The function missing a trailing return.
        function: String,
        /// Where the function is declared.
        span: Span,
    },

    /// A value did not fit the fixed-width field of the bytecode format.
    #[error("{what} '{value}' exceeds the maximum of {max} {unit}")]
    FieldOverflow {
        /// The kind of value being encoded (type name, string constant, ...).
        what: &'static str,
        /// The offending value, possibly shortened for display.
        value: String,
        /// The maximum encodable length.
        max: usize,
        /// What `max` counts, e.g. `bytes`.
        unit: &'static str,
    },

    /// A binding declared with `let` (or `self`) was assigned.
    #[error("'{name}' is not assignable")]
    NotAssignable {
        /// The immutable binding.
        name: String,
        /// Where the assignment occurred.
        span: Span,
    },

    /// No `fn main()` without parameters and return type exists.
    #[error("missing entry point: expected a function 'fn main()' without parameters and return type")]
    MissingEntryPoint,

    /// Any other invalid construct.
    #[error("{message}")]
    InvalidOperation {
        /// Description of the problem.
        message: String,
        /// Where it occurred.
        span: Span,
    },
}

impl CompilationError {
    /// Get the span where this error occurred.
    pub fn span(&self) -> Span {
        match self {
            CompilationError::DuplicateSymbol { span, .. } => *span,
            CompilationError::UnresolvedSymbol { span, .. } => *span,
            CompilationError::TypeMismatch { span, .. } => *span,
            CompilationError::ForeignAccessDenied { span, .. } => *span,
            CompilationError::MissingImplementation { span, .. } => *span,
            CompilationError::ArityMismatch { span, .. } => *span,
            CompilationError::NonExhaustiveUnionSwitch { span, .. } => *span,
            CompilationError::MissingReturn { span, .. } => *span,
            CompilationError::FieldOverflow { .. } => Span::default(),
            CompilationError::NotAssignable { span, .. } => *span,
            CompilationError::MissingEntryPoint => Span::default(),
            CompilationError::InvalidOperation { span, .. } => *span,
        }
    }

    /// Shorthand for a [`CompilationError::TypeMismatch`].
    pub fn type_mismatch(message: impl Into<String>, span: Span) -> Self {
        CompilationError::TypeMismatch {
            message: message.into(),
            span,
        }
    }

    /// Shorthand for a [`CompilationError::InvalidOperation`].
    pub fn invalid(message: impl Into<String>, span: Span) -> Self {
        CompilationError::InvalidOperation {
            message: message.into(),
            span,
        }
    }

    /// Shorthand for a [`CompilationError::UnresolvedSymbol`].
    pub fn unresolved(name: impl Into<String>, span: Span) -> Self {
        CompilationError::UnresolvedSymbol {
            name: name.into(),
            span,
        }
    }
}

// ============================================================================
// Internal Errors
// ============================================================================

/// Violations of the compiler's own invariants.
///
/// These are never caused by the compiled program and abort compilation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InternalError {
    /// A branch references a label whose target was never set.
    #[error("label {label} in '{function}' was branched to but never targeted")]
    UntargetedLabel {
        /// The function containing the label.
        function: String,
        /// The label index.
        label: usize,
    },

    /// The volatile register pool of a function ran out.
    #[error("register pool exhausted in '{function}'")]
    RegisterPoolExhausted {
        /// The function being emitted.
        function: String,
    },

    /// A syntax node was registered with two scopes.
    #[error("syntax node {node} already introduces a scope")]
    DuplicateScope {
        /// The node id.
        node: u32,
    },

    /// A syntax node that introduces a scope has none in the scope map.
    #[error("syntax node {node} has no scope")]
    MissingScope {
        /// The node id.
        node: u32,
    },

    /// A symbol address was assigned a second, different value.
    #[error("address of '{symbol}' reassigned from {old} to {new}")]
    AddressReassigned {
        /// The symbol name.
        symbol: String,
        /// The address assigned first.
        old: i32,
        /// The conflicting address.
        new: i32,
    },

    /// A symbol needed an address that was never assigned.
    #[error("'{symbol}' has no address")]
    MissingAddress {
        /// The symbol name.
        symbol: String,
    },

    /// Field offsets of an aggregate do not add up to its size.
    #[error("layout of '{type_name}' is inconsistent: fields end at {end}, size is {size}")]
    LayoutMismatch {
        /// The aggregate.
        type_name: String,
        /// Where the last field ends.
        end: u32,
        /// The computed size.
        size: u32,
    },

    /// Anything else that should be unreachable.
    #[error("internal error: {0}")]
    Invariant(String),
}

// ============================================================================
// Image Errors
// ============================================================================

/// Errors raised while decoding a bytecode image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    /// The buffer ends before the expected data.
    #[error("image truncated: needed {needed} bytes at offset {offset}")]
    Truncated {
        /// Offset of the read.
        offset: usize,
        /// Number of bytes requested.
        needed: usize,
    },

    /// The image does not start with the format magic.
    #[error("not a zlang image")]
    BadMagic,

    /// The image was written by an incompatible format version.
    #[error("unsupported image version {major}.{minor}")]
    UnsupportedVersion {
        /// Major version found.
        major: u8,
        /// Minor version found.
        minor: u8,
    },

    /// A constant-segment record holds a value outside its domain.
    #[error("malformed record at constant address {address}")]
    MalformedRecord {
        /// Address of the record within the constant segment.
        address: usize,
    },

    /// The code segment contains an unknown opcode.
    #[error("unknown opcode {opcode} at code offset {offset}")]
    UnknownOpcode {
        /// The raw opcode byte.
        opcode: u8,
        /// Offset within the code segment.
        offset: usize,
    },
}

// ============================================================================
// Top-level Error
// ============================================================================

/// The error returned by a failed compilation.
///
/// Partial output is never returned alongside errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// The program has semantic errors; all of them are listed in order.
    #[error("compilation failed with {} error(s):\n{}", .0.len(), render(.0))]
    Diagnostics(Vec<Diagnostic>),

    /// The compiler hit an internal inconsistency.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl CompileError {
    /// The accumulated diagnostics, or an empty slice for internal errors.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CompileError::Diagnostics(diagnostics) => diagnostics,
            CompileError::Internal(_) => &[],
        }
    }

    /// Check if this is an internal error.
    pub fn is_internal(&self) -> bool {
        matches!(self, CompileError::Internal(_))
    }
}

fn render(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compilation_error_span() {
        let span = Span::new(10, 5, 3);
        let err = CompilationError::UnresolvedSymbol {
            name: "Foo".to_string(),
            span,
        };
        assert_eq!(err.span(), span);
        assert_eq!(err.to_string(), "'Foo' is not defined in this context");
    }

    #[test]
    fn field_overflow_has_no_span() {
        let err = CompilationError::FieldOverflow {
            what: "type name",
            value: "X".repeat(70),
            max: 63,
            unit: "bytes",
        };
        assert_eq!(err.span(), Span::default());
        assert!(err.to_string().ends_with("exceeds the maximum of 63 bytes"));
    }

    #[test]
    fn non_exhaustive_switch_names_missing_fields() {
        let err = CompilationError::NonExhaustiveUnionSwitch {
            union_name: "Shape".to_string(),
            missing: vec!["b".to_string(), "c".to_string()],
            span: Span::default(),
        };
        assert_eq!(err.to_string(), "switch over 'Shape' does not handle b, c");
    }

    #[test]
    fn compile_error_renders_each_diagnostic() {
        let err = CompileError::Diagnostics(vec![
            Diagnostic::new("a.zl", CompilationError::MissingEntryPoint),
            Diagnostic::new(
                "b.zl",
                CompilationError::NotAssignable {
                    name: "x".to_string(),
                    span: Span::new(2, 3, 1),
                },
            ),
        ]);
        let text = err.to_string();
        assert!(text.starts_with("compilation failed with 2 error(s):"));
        assert!(text.contains("b.zl:2:3: 'x' is not assignable"));
        assert_eq!(err.diagnostics().len(), 2);
        assert!(!err.is_internal());
    }

    #[test]
    fn internal_error_converts() {
        let err: CompileError = InternalError::RegisterPoolExhausted {
            function: "main".to_string(),
        }
        .into();
        assert!(err.is_internal());
        assert!(err.diagnostics().is_empty());
    }
}
