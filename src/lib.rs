//! lash - a source-to-source compiler from Lash to Bash
//!
//! This crate implements the full pipeline described in SPEC_FULL.md:
//! preprocessing, lexing, parsing, semantic analysis, and Bash code
//! generation, plus the `AnalysisResult` API consumed by editor tooling
//! and tests (§6.3).

pub mod analysis;
pub mod ast;
pub mod codegen;
pub mod diagnostics;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod preprocess;
pub mod symbols;

use std::fs;
use std::path::Path;

use analysis::ExprTypes;
use ast::Program;
use diagnostics::{Diagnostic, DiagnosticBag};
use error::LashError;
use symbols::SymbolIndex;

pub use ast::types::*;

/// Options controlling how much work `analyze*` does beyond the required
/// phases (§6.3). Both default to on; an embedder that only wants
/// errors (e.g. a fast "is this valid" check) can turn warnings off, and
/// anything that isn't an LSP skips building the symbol index.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisOptions {
    pub include_warnings: bool,
    pub build_symbol_index: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self { include_warnings: true, build_symbol_index: false }
    }
}

/// Result of running the full analysis pipeline over one source file.
pub struct AnalysisResult {
    pub program: Option<Program>,
    pub diagnostics: Vec<Diagnostic>,
    pub symbols: Option<SymbolIndex>,
    pub has_errors: bool,
    pub types: ExprTypes,
}

/// Runs preprocessing, lexing, parsing, and the full analysis pipeline
/// over `path`, reading it (and any `import`ed files) from disk.
pub fn analyze_path(path: &Path, options: AnalysisOptions) -> Result<AnalysisResult, LashError> {
    let text = fs::read_to_string(path).map_err(|e| LashError::Io { path: path.to_path_buf(), source: e })?;
    let virtual_path = path.display().to_string();
    Ok(analyze_source(&text, &virtual_path, options))
}

/// Runs the same pipeline over in-memory source text, e.g. for an LSP's
/// "analyze the buffer" request or a unit test.
pub fn analyze_source(text: &str, virtual_path: &str, options: AnalysisOptions) -> AnalysisResult {
    let mut bag = DiagnosticBag::new();

    let resolver = preprocess::FsImportResolver;
    let preprocessed = preprocess::preprocess(text, Some(virtual_path), &resolver, &mut bag);

    let tokens = match lexer::tokenize(&preprocessed) {
        Ok(t) => t,
        Err(e) => {
            bag.push(Diagnostic::error("E000", e.message.clone(), e.loc.line, e.loc.column));
            return finish(None, bag, None, ExprTypes::default(), virtual_path);
        }
    };

    let program = parser::parse(tokens, &preprocessed, &mut bag);

    let mut symbols = if options.build_symbol_index { Some(SymbolIndex::new()) } else { None };
    let types = analysis::analyze(&program, &mut bag, symbols.as_mut());

    if !options.include_warnings {
        bag = DiagnosticBag::from_errors_only(bag);
    }

    finish(Some(program), bag, symbols, types, virtual_path)
}

fn finish(
    program: Option<Program>,
    bag: DiagnosticBag,
    symbols: Option<SymbolIndex>,
    types: ExprTypes,
    virtual_path: &str,
) -> AnalysisResult {
    let has_errors = bag.has_errors();
    let diagnostics = bag.into_sorted().into_iter().map(|d| d.with_file(virtual_path)).collect();
    AnalysisResult { program, diagnostics, symbols, has_errors, types }
}

/// Compiles Lash source straight through to Bash text, for callers that
/// don't need the intermediate `AnalysisResult` (the CLI's main path).
pub fn compile(text: &str, virtual_path: &str) -> CompileResult {
    let result = analyze_source(text, virtual_path, AnalysisOptions::default());
    if result.has_errors {
        return CompileResult { bash: None, diagnostics: result.diagnostics, unsupported: Vec::new() };
    }
    let program = result.program.expect("no errors implies a parsed program");
    let generated = codegen::generate(&program, &result.types);
    CompileResult {
        bash: Some(generated.bash),
        diagnostics: result.diagnostics,
        unsupported: generated.unsupported,
    }
}

pub struct CompileResult {
    pub bash: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub unsupported: Vec<String>,
}
