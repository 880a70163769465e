//! Definite assignment (E300), constant safety (E301-E303), and codegen
//! feasibility (E400-E401). Runs after type checking, on an AST already
//! known to be name- and type-correct.
//!
//! Definite assignment is approximated with a single flat "assigned so
//! far" set rather than a fully scope-structured one: branch merges
//! (`if`/`else`) intersect per-branch outcomes, loops and function bodies
//! are checked against a snapshot without feeding assignments back to the
//! caller (a loop or a call may run zero times). This is cheaper than a
//! true per-scope dataflow lattice and matches the common case the
//! invariant exists to catch — reading a variable before any initializer
//! has run on the path actually taken.

use std::collections::{HashMap, HashSet};

use crate::ast::*;
use crate::diagnostics::DiagnosticBag;

struct Flow {
    assigned: HashSet<String>,
    consts: HashMap<String, i64>,
}

pub fn check(program: &Program, bag: &mut DiagnosticBag) {
    let mut f = Flow { assigned: HashSet::new(), consts: HashMap::new() };
    f.assigned.insert("argv".to_string());
    f.scan_feasibility(&program.statements, bag);
    f.walk_stmts(&program.statements, bag);
}

impl Flow {
    fn err(&self, bag: &mut DiagnosticBag, code: &'static str, loc: Loc, message: impl Into<String>) {
        bag.push(crate::diagnostics::Diagnostic::error(code, message, loc.line, loc.column));
    }

    /// Pre-scan for the codegen-feasibility checks that need whole-program
    /// or whole-statement knowledge rather than the running "assigned so
    /// far" state the main walk tracks.
    fn scan_feasibility(&mut self, stmts: &[Stmt], bag: &mut DiagnosticBag) {
        for stmt in stmts {
            if let StmtKind::Expression(e) = &stmt.kind {
                if let ExprKind::Pipe(stages) = &e.kind {
                    if stages.len() == 1 {
                        if let ExprKind::Identifier(_) = &stages[0].kind {
                            self.err(
                                bag,
                                "E400",
                                e.span.start,
                                "pipeline assignment sink requires at least one preceding stage",
                            );
                        }
                    }
                }
            }
            if let StmtKind::Subshell(s) = &stmt.kind {
                if s.into.is_some() {
                    if let Some(last) = s.body.last() {
                        if let StmtKind::Subshell(inner) = &last.kind {
                            if inner.into.is_some() {
                                self.err(
                                    bag,
                                    "E401",
                                    stmt.span.start,
                                    "nested subshell capture as the final statement makes the outer 'into' capture observe the inner assignment's status, not the inner subshell's result",
                                );
                            }
                        }
                    }
                }
            }

            match &stmt.kind {
                StmtKind::Subshell(s) => self.scan_feasibility(&s.body, bag),
                StmtKind::FunctionDeclaration(f) => self.scan_feasibility(&f.body, bag),
                StmtKind::If(s) => {
                    for c in &s.clauses {
                        self.scan_feasibility(&c.body, bag);
                    }
                    if let Some(e) = &s.else_branch {
                        self.scan_feasibility(e, bag);
                    }
                }
                StmtKind::Switch(s) => {
                    for c in &s.cases {
                        self.scan_feasibility(&c.body, bag);
                    }
                }
                StmtKind::For(s) => self.scan_feasibility(&s.body, bag),
                StmtKind::While(s) => self.scan_feasibility(&s.body, bag),
                StmtKind::Until(s) => self.scan_feasibility(&s.body, bag),
                _ => {}
            }
        }
    }

    fn walk_stmts(&mut self, stmts: &[Stmt], bag: &mut DiagnosticBag) {
        for stmt in stmts {
            self.walk_stmt(stmt, bag);
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt, bag: &mut DiagnosticBag) {
        let loc = stmt.span.start;
        match &stmt.kind {
            StmtKind::VariableDeclaration(d) => {
                if let Some(v) = &d.value {
                    self.check_reads(v, bag);
                    if d.kind == DeclKind::Const {
                        if let Some(n) = self.const_eval(v) {
                            self.consts.insert(d.name.clone(), n);
                        }
                    }
                    self.assigned.insert(d.name.clone());
                }
            }
            StmtKind::Assignment(a) => {
                self.check_reads(&a.value, bag);
                match &a.target {
                    AssignTarget::Identifier(name) => {
                        if a.operator == AssignOp::AddAssign && !self.assigned.contains(name) {
                            self.err(bag, "E300", loc, format!("'{name}' read before it is assigned"));
                        }
                        self.assigned.insert(name.clone());
                        self.consts.remove(name);
                    }
                    AssignTarget::Index { name, index } => {
                        self.check_reads(index, bag);
                        if !self.assigned.contains(name) {
                            self.err(bag, "E300", loc, format!("'{name}' read before it is assigned"));
                        }
                    }
                }
            }
            StmtKind::FunctionDeclaration(f) => {
                let mut inner = Flow { assigned: self.assigned.clone(), consts: self.consts.clone() };
                for p in &f.params {
                    inner.assigned.insert(p.name.clone());
                }
                inner.walk_stmts(&f.body, bag);
            }
            StmtKind::EnumDeclaration(_) => {}
            StmtKind::If(s) => {
                for c in &s.clauses {
                    self.check_reads(&c.condition, bag);
                }
                let entry = self.assigned.clone();
                let mut branch_results = Vec::new();
                for clause in &s.clauses {
                    self.assigned = entry.clone();
                    self.walk_stmts(&clause.body, bag);
                    branch_results.push(self.assigned.clone());
                }
                if let Some(else_body) = &s.else_branch {
                    self.assigned = entry.clone();
                    self.walk_stmts(else_body, bag);
                    branch_results.push(self.assigned.clone());
                    let mut merged = branch_results[0].clone();
                    for r in &branch_results[1..] {
                        merged.retain(|v| r.contains(v));
                    }
                    self.assigned = merged;
                } else {
                    self.assigned = entry;
                }
            }
            StmtKind::Switch(s) => {
                self.check_reads(&s.scrutinee, bag);
                let entry = self.assigned.clone();
                for case in &s.cases {
                    self.check_reads(&case.pattern, bag);
                    self.assigned = entry.clone();
                    self.walk_stmts(&case.body, bag);
                }
                self.assigned = entry;
            }
            StmtKind::For(s) => {
                match &s.iterable {
                    ForIterable::Range { start, end } => {
                        self.check_reads(start, bag);
                        self.check_reads(end, bag);
                        if let (Some(_), Some(step_val)) = (self.const_eval(start), s.step.as_ref().and_then(|e| self.const_eval(e))) {
                            if step_val <= 0 {
                                self.err(bag, "E303", loc, "'for' step must be a positive constant");
                            }
                        }
                    }
                    ForIterable::Expr(e) => self.check_reads(e, bag),
                    ForIterable::Glob(_) => {}
                }
                if let Some(step) = &s.step {
                    self.check_reads(step, bag);
                    if let Some(v) = self.const_eval(step) {
                        if v <= 0 {
                            self.err(bag, "E303", loc, "'for' step must be a positive constant");
                        }
                    }
                }
                let entry = self.assigned.clone();
                self.assigned.insert(s.variable.clone());
                self.walk_stmts(&s.body, bag);
                self.assigned = entry;
            }
            StmtKind::While(s) => {
                self.check_reads(&s.condition, bag);
                let entry = self.assigned.clone();
                self.walk_stmts(&s.body, bag);
                self.assigned = entry;
            }
            StmtKind::Until(s) => {
                self.check_reads(&s.condition, bag);
                let entry = self.assigned.clone();
                self.walk_stmts(&s.body, bag);
                self.assigned = entry;
            }
            StmtKind::Return(s) => {
                if let Some(v) = &s.value {
                    self.check_reads(v, bag);
                }
            }
            StmtKind::Shift(s) => {
                if let Some(v) = &s.amount {
                    self.check_reads(v, bag);
                    if let Some(n) = self.const_eval(v) {
                        if n <= 0 {
                            self.err(bag, "E302", loc, "'shift' amount must be a positive constant");
                        }
                    }
                }
            }
            StmtKind::Subshell(s) => {
                self.walk_stmts(&s.body, bag);
                self.apply_into(&s.into, loc, bag);
            }
            StmtKind::Wait(s) => {
                if let WaitTarget::Target(e) = &s.target {
                    self.check_reads(e, bag);
                }
                self.apply_into(&s.into, loc, bag);
            }
            StmtKind::Break | StmtKind::Continue => {}
            StmtKind::Expression(e) => self.check_pipe_reads(e, bag),
            StmtKind::Shell(s) => self.check_reads(&s.expr, bag),
            StmtKind::Test(s) => {
                for a in &s.args {
                    self.check_reads(a, bag);
                }
            }
            StmtKind::Command(_) => {}
            StmtKind::Trap(s) => self.check_reads(&s.handler, bag),
            StmtKind::Untrap(_) => {}
        }
    }

    fn apply_into(&mut self, into: &Option<IntoCapture>, loc: Loc, bag: &mut DiagnosticBag) {
        let Some(cap) = into else { return };
        if cap.name.is_empty() {
            return;
        }
        if matches!(cap.mode, BindingMode::Auto) && !self.assigned.contains(&cap.name) {
            self.err(bag, "E300", loc, format!("'{}' read before it is assigned", cap.name));
        }
        self.assigned.insert(cap.name.clone());
    }

    fn check_pipe_reads(&mut self, e: &Expr, bag: &mut DiagnosticBag) {
        if let ExprKind::Pipe(stages) = &e.kind {
            for (i, stage) in stages.iter().enumerate() {
                if i == stages.len() - 1 {
                    if let ExprKind::Identifier(name) = &stage.kind {
                        self.assigned.insert(name.clone());
                        continue;
                    }
                }
                self.check_reads(stage, bag);
            }
            return;
        }
        self.check_reads(e, bag);
    }

    fn check_reads(&mut self, e: &Expr, bag: &mut DiagnosticBag) {
        match &e.kind {
            ExprKind::Literal(_) | ExprKind::Null | ExprKind::Raw(_) => {}
            ExprKind::Identifier(name) => {
                if !self.assigned.contains(name) {
                    self.err(bag, "E300", e.span.start, format!("'{name}' read before it is assigned"));
                }
            }
            ExprKind::Binary(op, l, r) => {
                self.check_reads(l, bag);
                self.check_reads(r, bag);
                if matches!(op, BinaryOp::Div | BinaryOp::Mod) {
                    if let Some(0) = self.const_eval(r) {
                        self.err(bag, "E301", e.span.start, format!("{op} by constant zero"));
                    }
                }
            }
            ExprKind::Unary(_, inner) => self.check_reads(inner, bag),
            ExprKind::Range(s, e2) => {
                self.check_reads(s, bag);
                self.check_reads(e2, bag);
            }
            ExprKind::Pipe(stages) => {
                for s in stages {
                    self.check_reads(s, bag);
                }
            }
            ExprKind::Redirect(inner, specs) => {
                self.check_reads(inner, bag);
                for r in specs {
                    if let Some(t) = &r.target {
                        self.check_reads(t, bag);
                    }
                }
            }
            ExprKind::Call(_, args) => {
                for a in args {
                    self.check_reads(a, bag);
                }
            }
            ExprKind::ShellCapture(inner) => self.check_reads(inner, bag),
            ExprKind::Index(base, idx) => {
                self.check_reads(base, bag);
                self.check_reads(idx, bag);
            }
            ExprKind::EnumAccess(_, _) => {}
            ExprKind::Array(items) => {
                for i in items {
                    self.check_reads(i, bag);
                }
            }
        }
    }

    /// Folds literal integer arithmetic and known `const` lookups — just
    /// enough to catch `x / 0` and non-positive literal step/shift amounts
    /// without a full constant-propagation pass.
    fn const_eval(&self, e: &Expr) -> Option<i64> {
        match &e.kind {
            ExprKind::Literal(LiteralExpr { value: LiteralValue::Int(n), .. }) => Some(*n),
            ExprKind::Identifier(name) => self.consts.get(name).copied(),
            ExprKind::Unary(UnaryOp::Neg, inner) => self.const_eval(inner).map(|n| -n),
            ExprKind::Unary(UnaryOp::Plus, inner) => self.const_eval(inner),
            ExprKind::Binary(op, l, r) => {
                let lv = self.const_eval(l)?;
                let rv = self.const_eval(r)?;
                match op {
                    BinaryOp::Add => Some(lv + rv),
                    BinaryOp::Sub => Some(lv - rv),
                    BinaryOp::Mul => Some(lv * rv),
                    BinaryOp::Div if rv != 0 => Some(lv / rv),
                    BinaryOp::Mod if rv != 0 => Some(lv % rv),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// Exposed for the codegen constant-folding pass, which needs the same
/// literal-arithmetic folding rule applied during emission (§4.7).
pub fn const_eval_pub(e: &Expr) -> Option<i64> {
    let f = Flow { assigned: HashSet::new(), consts: HashMap::new() };
    f.const_eval(e)
}

#[cfg(test)]
mod tests {
    use crate::{analyze_source, AnalysisOptions};

    fn codes(src: &str) -> Vec<&'static str> {
        analyze_source(src, "test.lash", AnalysisOptions::default()).diagnostics.iter().map(|d| d.code).collect()
    }

    #[test]
    fn flags_read_before_assignment_across_non_exhaustive_if() {
        let src = "let y\nif true\n  y = 1\nend\nlet z = y\n";
        assert!(codes(src).contains(&"E300"));
    }

    #[test]
    fn exhaustive_if_else_assignment_merges_clean() {
        let src = "let y\nif true\n  y = 1\nelse\n  y = 2\nend\nlet z = y\n";
        assert!(!codes(src).contains(&"E300"));
    }

    #[test]
    fn flags_division_by_constant_zero() {
        let src = "let x = 1 / 0\n";
        assert!(codes(src).contains(&"E301"));
    }

    #[test]
    fn flags_non_positive_shift_amount() {
        let src = "shift 0\n";
        assert!(codes(src).contains(&"E302"));
    }

    #[test]
    fn flags_non_positive_for_step() {
        let src = "for i in 0..10 step 0\nend\n";
        assert!(codes(src).contains(&"E303"));
    }

    #[test]
    fn multi_stage_pipeline_with_identifier_sink_is_accepted() {
        let src = "let sink\necho hi | grep h | sink\n";
        assert!(!codes(src).contains(&"E300"));
    }

    #[test]
    fn nested_subshell_capture_as_final_statement_is_an_error() {
        let src = "subshell into outer\n  echo hi\n  subshell into inner\n    echo bye\n  end\nend\n";
        assert!(codes(src).contains(&"E401"));
    }

    #[test]
    fn subshell_capture_not_shadowed_by_a_trailing_nested_capture_is_accepted() {
        let src = "subshell into outer\n  subshell into inner\n    echo bye\n  end\n  echo hi\nend\n";
        assert!(!codes(src).contains(&"E401"));
    }
}
