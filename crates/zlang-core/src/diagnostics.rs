//! Accumulated, file-qualified compilation errors.
//!
//! Every phase of the backend records local errors into a [`Diagnostics`]
//! collector instead of returning on the first one, so a single compilation
//! reports every independent problem.

use std::fmt;

use crate::CompilationError;

/// A single compilation error tied to the file it was found in.
///
/// # Examples
///
/// ```rust
/// use zlang_core::{CompilationError, Diagnostic, Span};
///
/// let diagnostic = Diagnostic::new(
///     "main.zl",
///     CompilationError::unresolved("foo", Span::new(10, 5, 3)),
/// );
///
/// assert_eq!(diagnostic.to_string(), "main.zl:10:5: 'foo' is not defined in this context");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// The source file of the module where the error occurred.
    pub file: String,
    /// The error itself.
    pub error: CompilationError,
}

impl Diagnostic {
    /// Create a diagnostic for an error found in `file`.
    pub fn new(file: impl Into<String>, error: CompilationError) -> Self {
        Self {
            file: file.into(),
            error,
        }
    }

    /// The line of the error (1-based, 0 when unknown).
    pub fn line(&self) -> u32 {
        self.error.span().line
    }

    /// The column of the error (1-based, 0 when unknown).
    pub fn col(&self) -> u32 {
        self.error.span().col
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let span = self.error.span();
        if span.is_unknown() {
            write!(f, "{}: {}", self.file, self.error)
        } else {
            write!(f, "{}:{}:{}: {}", self.file, span.line, span.col, self.error)
        }
    }
}

/// An ordered collection of diagnostics.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    diagnostics: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Creates a new, empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error found in `file`.
    pub fn report(&mut self, file: &str, error: CompilationError) {
        self.diagnostics.push(Diagnostic::new(file, error));
    }

    /// Append every diagnostic of another collection.
    pub fn extend(&mut self, other: Diagnostics) {
        self.diagnostics.extend(other.diagnostics);
    }

    /// Whether no error has been recorded.
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// The number of recorded errors.
    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    /// Iterate over the recorded diagnostics in report order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Consume the collection.
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diagnostic in &self.diagnostics {
            writeln!(f, "{}", diagnostic)?;
        }
        Ok(())
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.into_iter()
    }
}
