//! Crate-level error type.
//!
//! `LashError` covers conditions that abort a phase outright rather than
//! being reported as a `Diagnostic` (see SPEC_FULL.md §2): unreadable
//! `@import` targets, CLI-level I/O failures. Diagnostics (syntax errors,
//! semantic errors) are never represented as `LashError` — they accumulate
//! in the `DiagnosticBag` and the pipeline simply halts without panicking.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LashError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("import cycle detected: {0}")]
    ImportCycle(String),

    #[error("internal compiler error: {0}")]
    Internal(String),
}

pub type LashResult<T> = Result<T, LashError>;
