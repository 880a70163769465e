//! Semantic analysis pipeline: name resolution, type checking, flow/constant
//! safety, and the non-fatal warning pass. Each phase walks the (immutable)
//! AST in source order and only runs if the previous phase left the
//! `DiagnosticBag` error-free — warnings never gate a later phase.

pub mod flow;
pub mod resolve;
pub mod typeck;
pub mod warn;

use crate::ast::{ExpressionType, NodeId, Program};
use crate::diagnostics::DiagnosticBag;
use crate::symbols::SymbolIndex;

/// Side table of inferred expression types, keyed by `Expr::id`. Kept
/// separate from the AST so the tree itself never needs a mutable pass
/// after parsing (SPEC_FULL.md §9).
#[derive(Debug, Clone, Default)]
pub struct ExprTypes {
    types: Vec<Option<ExpressionType>>,
}

impl ExprTypes {
    pub fn set(&mut self, id: NodeId, ty: ExpressionType) {
        if self.types.len() <= id {
            self.types.resize(id + 1, None);
        }
        self.types[id] = Some(ty);
    }

    pub fn get(&self, id: NodeId) -> ExpressionType {
        self.types.get(id).copied().flatten().unwrap_or_default()
    }
}

/// Runs every phase in order, stopping after any phase that leaves the bag
/// holding an error (warnings never stop later phases, but there are none
/// after the warning pass itself).
pub fn analyze(
    program: &Program,
    bag: &mut DiagnosticBag,
    mut symbols: Option<&mut SymbolIndex>,
) -> ExprTypes {
    resolve::resolve(program, bag, symbols.as_deref_mut());
    if bag.has_errors() {
        return ExprTypes::default();
    }
    let types = typeck::check(program, bag);
    if bag.has_errors() {
        return types;
    }
    flow::check(program, bag);
    if bag.has_errors() {
        return types;
    }
    warn::check(program, bag);
    types
}
