//! Diagnostic bag
//!
//! Accumulates diagnostics across every compiler phase. The bag is the only
//! piece of mutable state shared across phases (see design notes in
//! SPEC_FULL.md §9); each phase is handed a `&mut DiagnosticBag` explicitly
//! rather than reaching for a global.

use std::fmt;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A single diagnostic, produced by any phase.
///
/// `line` is 1-based, `column` is 0-based, matching SourceLocation (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
    pub file: Option<String>,
    pub line: usize,
    pub column: usize,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        code: &'static str,
        message: impl Into<String>,
        line: usize,
        column: usize,
    ) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            file: None,
            line,
            column,
        }
    }

    pub fn error(code: &'static str, message: impl Into<String>, line: usize, column: usize) -> Self {
        Self::new(Severity::Error, code, message, line, column)
    }

    pub fn warning(code: &'static str, message: impl Into<String>, line: usize, column: usize) -> Self {
        Self::new(Severity::Warning, code, message, line, column)
    }

    pub fn info(code: &'static str, message: impl Into<String>, line: usize, column: usize) -> Self {
        Self::new(Severity::Info, code, message, line, column)
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = self.file.as_deref().unwrap_or("<input>");
        write!(
            f,
            "{}:{}:{}: {}[{}]: {}",
            file, self.line, self.column, self.severity, self.code, self.message
        )
    }
}

/// Accumulates diagnostics for a single compiler run.
///
/// Invariant: once pushed, a diagnostic is never mutated. Sorting is a
/// read-only operation applied to a snapshot (`sorted()`), leaving
/// insertion order intact in `self.items` for phases that still need to
/// append (e.g. a later phase running after an earlier one already
/// sorted for a partial report).
#[derive(Debug, Clone, Default)]
pub struct DiagnosticBag {
    items: Vec<Diagnostic>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diag: Diagnostic) {
        self.items.push(diag);
    }

    pub fn extend(&mut self, diags: impl IntoIterator<Item = Diagnostic>) {
        self.items.extend(diags);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|d| d.severity == Severity::Warning)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Diagnostics sorted by (line, column), per the Diagnostic invariant (§3).
    pub fn sorted(&self) -> Vec<Diagnostic> {
        let mut out = self.items.clone();
        out.sort_by_key(|d| (d.line, d.column));
        out
    }

    pub fn into_sorted(self) -> Vec<Diagnostic> {
        let mut out = self.items;
        out.sort_by_key(|d| (d.line, d.column));
        out
    }

    /// Drops warnings and info diagnostics, keeping only errors — used
    /// when a caller opts out of warnings via `AnalysisOptions`.
    pub fn from_errors_only(bag: DiagnosticBag) -> DiagnosticBag {
        DiagnosticBag { items: bag.items.into_iter().filter(|d| d.severity == Severity::Error).collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_by_line_then_column() {
        let mut bag = DiagnosticBag::new();
        bag.push(Diagnostic::error("E001", "b", 2, 0));
        bag.push(Diagnostic::error("E001", "a", 1, 5));
        bag.push(Diagnostic::error("E001", "c", 1, 2));
        let sorted = bag.into_sorted();
        assert_eq!(
            sorted.iter().map(|d| d.message.as_str()).collect::<Vec<_>>(),
            vec!["c", "a", "b"]
        );
    }

    #[test]
    fn has_errors_ignores_warnings() {
        let mut bag = DiagnosticBag::new();
        bag.push(Diagnostic::warning("W500", "unreachable", 1, 0));
        assert!(!bag.has_errors());
        bag.push(Diagnostic::error("E001", "oops", 1, 0));
        assert!(bag.has_errors());
    }

    #[test]
    fn display_format() {
        let d = Diagnostic::error("E110", "bad target", 3, 4).with_file("a.lash");
        assert_eq!(format!("{d}"), "a.lash:3:4: error[E110]: bad target");
    }
}
