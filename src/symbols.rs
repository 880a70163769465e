//! Symbol index: an optional side product of name resolution consumed by
//! editor tooling (an LSP, outline view, "find references") rather than by
//! the compiler pipeline itself. Building it is gated behind
//! `AnalysisOptions::build_symbol_index` so a plain `lashc` compile never
//! pays for it.

use crate::ast::Loc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Const,
    Function,
    Param,
    Enum,
    EnumMember,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolInfo {
    pub name: String,
    pub kind: SymbolKind,
    pub declared_at: Loc,
}

/// A use of a name — a read, a call, an enum access — tied back to its
/// declaration when resolution found one.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolReference {
    pub name: String,
    pub used_at: Loc,
    pub resolved_to: Option<Loc>,
}

#[derive(Debug, Clone, Default)]
pub struct SymbolIndex {
    pub symbols: Vec<SymbolInfo>,
    pub references: Vec<SymbolReference>,
}

impl SymbolIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: impl Into<String>, kind: SymbolKind, declared_at: Loc) {
        self.symbols.push(SymbolInfo { name: name.into(), kind, declared_at });
    }

    pub fn reference(&mut self, name: impl Into<String>, used_at: Loc, resolved_to: Option<Loc>) {
        self.references.push(SymbolReference { name: name.into(), used_at, resolved_to });
    }

    /// All references that resolved to `declared_at` — the "find references"
    /// query an LSP would run against a symbol under the cursor.
    pub fn references_to(&self, declared_at: Loc) -> Vec<&SymbolReference> {
        self.references.iter().filter(|r| r.resolved_to == Some(declared_at)).collect()
    }
}
