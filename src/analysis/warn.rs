//! Non-fatal diagnostics (W500-W509). Runs last, after the AST is known to
//! be name-, type-, and flow-correct, so these checks never need to guard
//! against the malformed trees earlier phases would have already rejected.

use std::collections::HashMap;

use crate::ast::*;
use crate::diagnostics::{Diagnostic, DiagnosticBag};

pub fn check(program: &Program, bag: &mut DiagnosticBag) {
    let has_background_subshell = scan_background_subshells(&program.statements);
    for stmt in &program.statements {
        check_wait_jobs(stmt, has_background_subshell, bag);
    }
    let mut w = Warn { scopes: vec![Scope::default()] };
    w.check_block(&program.statements, bag);
    w.finish_scope(bag);
}

fn scan_background_subshells(stmts: &[Stmt]) -> bool {
    stmts.iter().any(|stmt| match &stmt.kind {
        StmtKind::Subshell(s) => s.run_in_background || scan_background_subshells(&s.body),
        StmtKind::FunctionDeclaration(f) => scan_background_subshells(&f.body),
        StmtKind::If(s) => {
            s.clauses.iter().any(|c| scan_background_subshells(&c.body))
                || s.else_branch.as_deref().is_some_and(scan_background_subshells)
        }
        StmtKind::Switch(s) => s.cases.iter().any(|c| scan_background_subshells(&c.body)),
        StmtKind::For(s) => scan_background_subshells(&s.body),
        StmtKind::While(s) => scan_background_subshells(&s.body),
        StmtKind::Until(s) => scan_background_subshells(&s.body),
        _ => false,
    })
}

fn check_wait_jobs(stmt: &Stmt, has_background_subshell: bool, bag: &mut DiagnosticBag) {
    if let StmtKind::Wait(s) = &stmt.kind {
        if matches!(s.target, WaitTarget::Jobs) && !has_background_subshell {
            bag.push(Diagnostic::warning(
                "W502",
                "'wait jobs' has no tracked background subshell ('subshell ... end &') to wait on",
                stmt.span.start.line,
                stmt.span.start.column,
            ));
        }
    }
    let nested: &[Stmt] = match &stmt.kind {
        StmtKind::Subshell(s) => &s.body,
        StmtKind::FunctionDeclaration(f) => &f.body,
        StmtKind::For(s) => &s.body,
        StmtKind::While(s) => &s.body,
        StmtKind::Until(s) => &s.body,
        _ => &[],
    };
    for s in nested {
        check_wait_jobs(s, has_background_subshell, bag);
    }
    match &stmt.kind {
        StmtKind::If(s) => {
            for c in &s.clauses {
                for inner in &c.body {
                    check_wait_jobs(inner, has_background_subshell, bag);
                }
            }
            if let Some(e) = &s.else_branch {
                for inner in e {
                    check_wait_jobs(inner, has_background_subshell, bag);
                }
            }
        }
        StmtKind::Switch(s) => {
            for c in &s.cases {
                for inner in &c.body {
                    check_wait_jobs(inner, has_background_subshell, bag);
                }
            }
        }
        _ => {}
    }
}

#[derive(Default)]
struct Usage {
    declared_at: Loc,
    used: bool,
    reassigned: bool,
    is_param: bool,
    is_function: bool,
    is_const_or_global: bool,
}

#[derive(Default)]
struct Scope {
    names: HashMap<String, Usage>,
}

struct Warn {
    scopes: Vec<Scope>,
}

impl Warn {
    fn declare(&mut self, name: &str, loc: Loc, is_param: bool, is_function: bool, is_const_or_global: bool, bag: &mut DiagnosticBag) {
        for scope in &self.scopes {
            if let Some(existing) = scope.names.get(name) {
                bag.push(Diagnostic::warning(
                    "W501",
                    format!("'{name}' shadows a binding declared at line {}", existing.declared_at.line),
                    loc.line,
                    loc.column,
                ));
                break;
            }
        }
        self.scopes.last_mut().unwrap().names.insert(
            name.to_string(),
            Usage { declared_at: loc, used: false, reassigned: false, is_param, is_function, is_const_or_global },
        );
    }

    fn mark_used(&mut self, name: &str) {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(u) = scope.names.get_mut(name) {
                u.used = true;
                return;
            }
        }
    }

    fn mark_reassigned(&mut self, name: &str) {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(u) = scope.names.get_mut(name) {
                u.reassigned = true;
                u.used = true;
                return;
            }
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    fn pop_scope(&mut self, bag: &mut DiagnosticBag) {
        if let Some(scope) = self.scopes.pop() {
            self.emit_unused(&scope, bag);
        }
    }

    fn finish_scope(&mut self, bag: &mut DiagnosticBag) {
        if let Some(scope) = self.scopes.pop() {
            self.emit_unused(&scope, bag);
        }
    }

    fn emit_unused(&self, scope: &Scope, bag: &mut DiagnosticBag) {
        let mut entries: Vec<_> = scope.names.iter().collect();
        entries.sort_by_key(|(_, u)| (u.declared_at.line, u.declared_at.column));
        for (name, u) in entries {
            if !u.used {
                let code = if u.is_function { "W505" } else if u.is_param { "W504" } else { "W503" };
                let what = if u.is_function { "function" } else if u.is_param { "parameter" } else { "variable" };
                bag.push(Diagnostic::warning(
                    code,
                    format!("{what} '{name}' is never used"),
                    u.declared_at.line,
                    u.declared_at.column,
                ));
            } else if !u.is_param && !u.is_function && !u.is_const_or_global && !u.reassigned {
                bag.push(Diagnostic::warning(
                    "W509",
                    format!("'{name}' is never reassigned; consider declaring it 'const'"),
                    u.declared_at.line,
                    u.declared_at.column,
                ));
            }
        }
    }

    fn check_block(&mut self, stmts: &[Stmt], bag: &mut DiagnosticBag) {
        let mut terminated = false;
        for stmt in stmts {
            if terminated {
                bag.push(Diagnostic::warning(
                    "W500",
                    "unreachable code after 'return'/'break'/'continue'",
                    stmt.span.start.line,
                    stmt.span.start.column,
                ));
                break;
            }
            self.check_stmt(stmt, bag);
            if matches!(stmt.kind, StmtKind::Return(_) | StmtKind::Break | StmtKind::Continue) {
                terminated = true;
            }
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt, bag: &mut DiagnosticBag) {
        match &stmt.kind {
            StmtKind::VariableDeclaration(d) => {
                if let Some(v) = &d.value {
                    self.check_expr(v);
                }
                let is_const_or_global = d.is_global || d.kind == DeclKind::Const;
                self.declare(&d.name, stmt.span.start, false, false, is_const_or_global, bag);
            }
            StmtKind::Assignment(a) => {
                self.check_expr(&a.value);
                match &a.target {
                    AssignTarget::Identifier(name) => self.mark_reassigned(name),
                    AssignTarget::Index { name, index } => {
                        self.mark_used(name);
                        self.check_expr(index);
                    }
                }
            }
            StmtKind::FunctionDeclaration(f) => {
                self.declare(&f.name, stmt.span.start, false, true, true, bag);
                self.push_scope();
                for p in &f.params {
                    if let Some(d) = &p.default {
                        self.check_expr(d);
                    }
                    self.declare(&p.name, stmt.span.start, true, false, true, bag);
                }
                self.check_block(&f.body, bag);
                self.pop_scope(bag);
            }
            StmtKind::EnumDeclaration(_) => {}
            StmtKind::If(s) => {
                for c in &s.clauses {
                    self.check_expr(&c.condition);
                    self.push_scope();
                    self.check_block(&c.body, bag);
                    self.pop_scope(bag);
                }
                if let Some(e) = &s.else_branch {
                    self.push_scope();
                    self.check_block(e, bag);
                    self.pop_scope(bag);
                }
            }
            StmtKind::Switch(s) => {
                self.check_expr(&s.scrutinee);
                for c in &s.cases {
                    self.check_expr(&c.pattern);
                    self.push_scope();
                    self.check_block(&c.body, bag);
                    self.pop_scope(bag);
                }
            }
            StmtKind::For(s) => {
                match &s.iterable {
                    ForIterable::Range { start, end } => {
                        self.check_expr(start);
                        self.check_expr(end);
                    }
                    ForIterable::Expr(e) => self.check_expr(e),
                    ForIterable::Glob(_) => {}
                }
                if let Some(step) = &s.step {
                    self.check_expr(step);
                }
                self.push_scope();
                self.declare(&s.variable, stmt.span.start, false, false, true, bag);
                self.mark_used(&s.variable);
                self.check_block(&s.body, bag);
                self.pop_scope(bag);
            }
            StmtKind::While(s) => {
                self.check_expr(&s.condition);
                self.push_scope();
                self.check_block(&s.body, bag);
                self.pop_scope(bag);
            }
            StmtKind::Until(s) => {
                self.check_expr(&s.condition);
                self.push_scope();
                self.check_block(&s.body, bag);
                self.pop_scope(bag);
            }
            StmtKind::Return(s) => {
                if let Some(v) = &s.value {
                    self.check_expr(v);
                }
            }
            StmtKind::Shift(s) => {
                if let Some(v) = &s.amount {
                    self.check_expr(v);
                }
            }
            StmtKind::Subshell(s) => {
                self.push_scope();
                self.check_block(&s.body, bag);
                self.pop_scope(bag);
                if let Some(cap) = &s.into {
                    if matches!(cap.mode, BindingMode::Let | BindingMode::Const) {
                        self.declare(&cap.name, stmt.span.start, false, false, cap.mode == BindingMode::Const, bag);
                    } else {
                        self.mark_used(&cap.name);
                    }
                }
            }
            StmtKind::Wait(s) => {
                if let WaitTarget::Target(e) = &s.target {
                    self.check_expr(e);
                }
                if let Some(cap) = &s.into {
                    if matches!(cap.mode, BindingMode::Let | BindingMode::Const) {
                        self.declare(&cap.name, stmt.span.start, false, false, cap.mode == BindingMode::Const, bag);
                    } else {
                        self.mark_used(&cap.name);
                    }
                }
            }
            StmtKind::Break | StmtKind::Continue => {}
            StmtKind::Expression(e) => self.check_expr(e),
            StmtKind::Shell(s) => self.check_expr(&s.expr),
            StmtKind::Test(s) => {
                for a in &s.args {
                    self.check_expr(a);
                }
            }
            StmtKind::Command(_) => {}
            StmtKind::Trap(s) => self.check_expr(&s.handler),
            StmtKind::Untrap(_) => {}
        }
    }

    fn check_expr(&mut self, e: &Expr) {
        match &e.kind {
            ExprKind::Literal(_) | ExprKind::Null | ExprKind::Raw(_) => {}
            ExprKind::Identifier(name) => self.mark_used(name),
            ExprKind::Binary(_, l, r) => {
                self.check_expr(l);
                self.check_expr(r);
            }
            ExprKind::Unary(_, inner) => self.check_expr(inner),
            ExprKind::Range(s, e2) => {
                self.check_expr(s);
                self.check_expr(e2);
            }
            ExprKind::Pipe(stages) => {
                for s in stages {
                    self.check_expr(s);
                }
            }
            ExprKind::Redirect(inner, specs) => {
                self.check_expr(inner);
                for r in specs {
                    if let Some(t) = &r.target {
                        self.check_expr(t);
                    }
                }
            }
            ExprKind::Call(name, args) => {
                self.mark_used(name);
                for a in args {
                    self.check_expr(a);
                }
            }
            ExprKind::ShellCapture(inner) => self.check_expr(inner),
            ExprKind::Index(base, idx) => {
                self.check_expr(base);
                self.check_expr(idx);
            }
            ExprKind::EnumAccess(_, _) => {}
            ExprKind::Array(items) => {
                for i in items {
                    self.check_expr(i);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{analyze_source, AnalysisOptions};

    fn codes(src: &str) -> Vec<&'static str> {
        analyze_source(src, "test.lash", AnalysisOptions::default()).diagnostics.iter().map(|d| d.code).collect()
    }

    #[test]
    fn wait_jobs_without_background_subshell_warns() {
        assert!(codes("wait jobs\n").contains(&"W502"));
    }

    #[test]
    fn wait_jobs_with_tracked_background_subshell_is_silent() {
        let src = "subshell\n  sh \"x\"\nend &\nwait jobs\n";
        assert!(!codes(src).contains(&"W502"));
    }

    #[test]
    fn shadowed_binding_in_nested_scope_warns() {
        let src = "let x = 1\nif true\n  let x = 2\n  let y = x\nend\n";
        assert!(codes(src).contains(&"W501"));
    }

    #[test]
    fn unused_variable_warns() {
        assert!(codes("let unused = 1\n").contains(&"W503"));
    }

    #[test]
    fn never_reassigned_used_variable_suggests_const() {
        let src = "let x = 1\nlet y = x\n";
        assert!(codes(src).contains(&"W509"));
    }

    #[test]
    fn statement_after_return_is_unreachable() {
        let src = "fn f()\n  return 1\n  let dead = 2\nend\nf()\n";
        assert!(codes(src).contains(&"W500"));
    }
}
