//! Name resolution: scope stack, function/enum pre-pass, control-flow
//! context checks. A "closest enclosing scope" walk generalized from a
//! single runtime environment chain to a static, pre-execution pass.

use std::collections::HashMap;

use crate::ast::*;
use crate::diagnostics::DiagnosticBag;
use crate::symbols::{SymbolIndex, SymbolKind};

const TRAP_SIGNALS: &[&str] = &[
    "EXIT", "INT", "TERM", "HUP", "QUIT", "USR1", "USR2", "ERR", "PIPE", "ALRM",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Global,
    Function,
    Block,
    Loop,
}

struct Scope {
    kind: ScopeKind,
    bindings: HashMap<String, Binding>,
}

#[derive(Clone, Copy)]
struct Binding {
    mutable: bool,
    declared_at: Loc,
}

struct FunctionSig {
    required: usize,
    total: usize,
}

struct Resolver<'s> {
    scopes: Vec<Scope>,
    functions: HashMap<String, FunctionSig>,
    enums: HashMap<String, Vec<String>>,
    fn_depth: usize,
    loop_depth: usize,
    symbols: Option<&'s mut SymbolIndex>,
}

pub fn resolve(program: &Program, bag: &mut DiagnosticBag, symbols: Option<&mut SymbolIndex>) {
    let mut r = Resolver {
        scopes: vec![Scope { kind: ScopeKind::Global, bindings: HashMap::new() }],
        functions: HashMap::new(),
        enums: HashMap::new(),
        fn_depth: 0,
        loop_depth: 0,
        symbols,
    };
    r.predeclare(&program.statements, bag);
    for stmt in &program.statements {
        r.resolve_stmt(stmt, bag);
    }
}

impl<'s> Resolver<'s> {
    fn push(&mut self, kind: ScopeKind) {
        self.scopes.push(Scope { kind, bindings: HashMap::new() });
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str, mutable: bool, loc: Loc, kind: SymbolKind, bag: &mut DiagnosticBag) {
        let scope = self.scopes.last_mut().unwrap();
        if scope.bindings.contains_key(name) {
            bag.push(crate::diagnostics::Diagnostic::error(
                "E112",
                format!("duplicate declaration of '{name}' in this scope"),
                loc.line,
                loc.column,
            ));
        }
        scope.bindings.insert(name.to_string(), Binding { mutable, declared_at: loc });
        if let Some(s) = self.symbols.as_deref_mut() {
            s.declare(name, kind, loc);
        }
    }

    fn declare_global(&mut self, name: &str, mutable: bool, loc: Loc, kind: SymbolKind, bag: &mut DiagnosticBag) {
        let global = &mut self.scopes[0];
        if global.bindings.contains_key(name) {
            bag.push(crate::diagnostics::Diagnostic::error(
                "E112",
                format!("duplicate declaration of '{name}' in this scope"),
                loc.line,
                loc.column,
            ));
        }
        global.bindings.insert(name.to_string(), Binding { mutable, declared_at: loc });
        if let Some(s) = self.symbols.as_deref_mut() {
            s.declare(name, kind, loc);
        }
    }

    fn lookup(&self, name: &str) -> Option<Binding> {
        for scope in self.scopes.iter().rev() {
            if let Some(b) = scope.bindings.get(name) {
                return Some(*b);
            }
        }
        None
    }

    /// Like `lookup`, but for a `global` assignment: it must bind into the
    /// outermost scope, so a nearer same-named local would otherwise shadow
    /// the binding the assignment is actually supposed to target.
    fn lookup_global(&self, name: &str) -> Option<Binding> {
        self.scopes[0].bindings.get(name).copied()
    }

    fn in_loop(&self) -> bool {
        self.loop_depth > 0
    }

    /// Pre-pass: declares every top-level function/enum in `stmts` so later
    /// statements in the same block can forward-reference them.
    fn predeclare(&mut self, stmts: &[Stmt], bag: &mut DiagnosticBag) {
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::FunctionDeclaration(f) => {
                    if self.functions.contains_key(&f.name) {
                        bag.push(crate::diagnostics::Diagnostic::error(
                            "E112",
                            format!("duplicate declaration of function '{}'", f.name),
                            stmt.span.start.line,
                            stmt.span.start.column,
                        ));
                    }
                    let required = f.params.iter().take_while(|p| p.default.is_none()).count();
                    self.functions.insert(
                        f.name.clone(),
                        FunctionSig { required, total: f.params.len() },
                    );
                    if let Some(s) = self.symbols.as_deref_mut() {
                        s.declare(&f.name, SymbolKind::Function, stmt.span.start);
                    }
                }
                StmtKind::EnumDeclaration(e) => {
                    if self.enums.contains_key(&e.name) {
                        bag.push(crate::diagnostics::Diagnostic::error(
                            "E112",
                            format!("duplicate declaration of enum '{}'", e.name),
                            stmt.span.start.line,
                            stmt.span.start.column,
                        ));
                    }
                    self.enums.insert(e.name.clone(), e.members.clone());
                    if let Some(s) = self.symbols.as_deref_mut() {
                        s.declare(&e.name, SymbolKind::Enum, stmt.span.start);
                    }
                }
                _ => {}
            }
        }
    }

    fn resolve_block(&mut self, stmts: &[Stmt], kind: ScopeKind, bag: &mut DiagnosticBag) {
        self.push(kind);
        self.predeclare(stmts, bag);
        for s in stmts {
            self.resolve_stmt(s, bag);
        }
        self.pop();
    }

    fn resolve_stmt(&mut self, stmt: &Stmt, bag: &mut DiagnosticBag) {
        let loc = stmt.span.start;
        match &stmt.kind {
            StmtKind::VariableDeclaration(d) => {
                if let Some(v) = &d.value {
                    self.resolve_expr(v, bag);
                }
                let kind = if d.kind == DeclKind::Const { SymbolKind::Const } else { SymbolKind::Variable };
                if d.is_global {
                    self.declare_global(&d.name, d.kind == DeclKind::Let, loc, kind, bag);
                } else {
                    self.declare(&d.name, d.kind == DeclKind::Let, loc, kind, bag);
                }
            }
            StmtKind::Assignment(a) => {
                self.resolve_expr(&a.value, bag);
                let target_binding = |r: &Self, name: &str| {
                    if a.is_global { r.lookup_global(name) } else { r.lookup(name) }
                };
                match &a.target {
                    AssignTarget::Identifier(name) => match target_binding(self, name) {
                        None => self.err(bag, "E111", loc, format!("undeclared name '{name}'")),
                        Some(b) if !b.mutable => {
                            self.err(bag, "E110", loc, format!("cannot assign to const '{name}'"))
                        }
                        Some(b) => self.reference(name, loc, Some(b.declared_at)),
                    },
                    AssignTarget::Index { name, index } => {
                        self.resolve_expr(index, bag);
                        match target_binding(self, name) {
                            None => self.err(bag, "E111", loc, format!("undeclared name '{name}'")),
                            Some(b) => self.reference(name, loc, Some(b.declared_at)),
                        }
                    }
                }
            }
            StmtKind::FunctionDeclaration(f) => {
                self.fn_depth += 1;
                self.push(ScopeKind::Function);
                let mut seen = std::collections::HashSet::new();
                for p in &f.params {
                    if !seen.insert(p.name.clone()) {
                        self.err(bag, "E116", loc, format!("duplicate parameter '{}'", p.name));
                    }
                    if let Some(d) = &p.default {
                        self.resolve_expr(d, bag);
                    }
                    self.scopes.last_mut().unwrap().bindings.insert(
                        p.name.clone(),
                        Binding { mutable: true, declared_at: loc },
                    );
                    if let Some(s) = self.symbols.as_deref_mut() {
                        s.declare(&p.name, SymbolKind::Param, loc);
                    }
                }
                self.predeclare(&f.body, bag);
                for s in &f.body {
                    self.resolve_stmt(s, bag);
                }
                self.pop();
                self.fn_depth -= 1;
            }
            StmtKind::EnumDeclaration(_) => {}
            StmtKind::If(s) => {
                for clause in &s.clauses {
                    self.resolve_expr(&clause.condition, bag);
                    self.resolve_block(&clause.body, ScopeKind::Block, bag);
                }
                if let Some(body) = &s.else_branch {
                    self.resolve_block(body, ScopeKind::Block, bag);
                }
            }
            StmtKind::Switch(s) => {
                self.resolve_expr(&s.scrutinee, bag);
                for case in &s.cases {
                    self.resolve_expr(&case.pattern, bag);
                    self.resolve_block(&case.body, ScopeKind::Block, bag);
                }
            }
            StmtKind::For(s) => {
                match &s.iterable {
                    ForIterable::Range { start, end } => {
                        self.resolve_expr(start, bag);
                        self.resolve_expr(end, bag);
                    }
                    ForIterable::Expr(e) => self.resolve_expr(e, bag),
                    ForIterable::Glob(_) => {}
                }
                if let Some(step) = &s.step {
                    self.resolve_expr(step, bag);
                }
                self.loop_depth += 1;
                self.push(ScopeKind::Loop);
                self.scopes.last_mut().unwrap().bindings.insert(
                    s.variable.clone(),
                    Binding { mutable: true, declared_at: loc },
                );
                self.predeclare(&s.body, bag);
                for st in &s.body {
                    self.resolve_stmt(st, bag);
                }
                self.pop();
                self.loop_depth -= 1;
            }
            StmtKind::While(s) => {
                self.resolve_expr(&s.condition, bag);
                self.loop_depth += 1;
                self.resolve_block(&s.body, ScopeKind::Loop, bag);
                self.loop_depth -= 1;
            }
            StmtKind::Until(s) => {
                self.resolve_expr(&s.condition, bag);
                self.loop_depth += 1;
                self.resolve_block(&s.body, ScopeKind::Loop, bag);
                self.loop_depth -= 1;
            }
            StmtKind::Return(s) => {
                if self.fn_depth == 0 {
                    self.err(bag, "E115", loc, "'return' outside a function");
                }
                if let Some(v) = &s.value {
                    self.resolve_expr(v, bag);
                }
            }
            StmtKind::Shift(s) => {
                if let Some(v) = &s.amount {
                    self.resolve_expr(v, bag);
                }
            }
            StmtKind::Subshell(s) => {
                self.resolve_into(&s.into, loc, bag);
                self.resolve_block(&s.body, ScopeKind::Block, bag);
            }
            StmtKind::Wait(s) => {
                if let crate::ast::WaitTarget::Target(e) = &s.target {
                    self.resolve_expr(e, bag);
                }
                self.resolve_into(&s.into, loc, bag);
            }
            StmtKind::Break | StmtKind::Continue => {
                if !self.in_loop() {
                    self.err(bag, "E115", loc, "'break'/'continue' outside a loop");
                }
            }
            StmtKind::Expression(e) => self.resolve_pipe_aware(e, bag),
            StmtKind::Shell(s) => self.resolve_expr(&s.expr, bag),
            StmtKind::Test(s) => {
                for a in &s.args {
                    self.resolve_expr(a, bag);
                }
            }
            StmtKind::Command(s) => {
                if s.script.trim().is_empty() {
                    self.err(bag, "E118", loc, "empty command statement");
                } else if !s.is_raw_literal {
                    self.resolve_placeholders(&s.script, loc, bag);
                }
            }
            StmtKind::Trap(s) => {
                self.resolve_expr(&s.handler, bag);
                for sig in &s.signals {
                    if !TRAP_SIGNALS.contains(&sig.as_str()) {
                        self.err(bag, "E117", loc, format!("unknown trap signal '{sig}'"));
                    }
                }
            }
            StmtKind::Untrap(s) => {
                for sig in &s.signals {
                    if !TRAP_SIGNALS.contains(&sig.as_str()) {
                        self.err(bag, "E117", loc, format!("unknown trap signal '{sig}'"));
                    }
                }
            }
        }
    }

    fn resolve_into(&mut self, into: &Option<IntoCapture>, loc: Loc, bag: &mut DiagnosticBag) {
        let Some(cap) = into else { return };
        if cap.name.is_empty() {
            return;
        }
        match cap.mode {
            BindingMode::Let | BindingMode::Const => {
                self.declare(&cap.name, cap.mode == BindingMode::Let, loc, SymbolKind::Variable, bag);
            }
            BindingMode::Auto => match self.lookup(&cap.name) {
                None => self.err(bag, "E111", loc, format!("undeclared name '{}'", cap.name)),
                Some(b) if !b.mutable => {
                    self.err(bag, "E110", loc, format!("cannot assign to const '{}'", cap.name))
                }
                Some(_) => {}
            },
        }
    }

    /// A pipeline's tail stage, if a bare identifier, is an implicit sink
    /// declaration (or reassignment) rather than a read — see
    /// "pipe-with-assignment sink rewriting" (§4.2).
    fn resolve_pipe_aware(&mut self, e: &Expr, bag: &mut DiagnosticBag) {
        if let ExprKind::Pipe(stages) = &e.kind {
            for (i, stage) in stages.iter().enumerate() {
                if i == stages.len() - 1 {
                    if let ExprKind::Identifier(name) = &stage.kind {
                        match self.lookup(name) {
                            None => {
                                self.declare(name, true, stage.span.start, SymbolKind::Variable, bag)
                            }
                            Some(b) if !b.mutable => self.err(
                                bag,
                                "E110",
                                stage.span.start,
                                format!("cannot assign to const '{name}'"),
                            ),
                            Some(b) => self.reference(name, stage.span.start, Some(b.declared_at)),
                        }
                        continue;
                    }
                }
                self.resolve_expr(stage, bag);
            }
            return;
        }
        self.resolve_expr(e, bag);
    }

    /// `{a.b.c}` placeholders inside an interpolated string or a bare
    /// command's script text name a single variable by its joined Bash
    /// name (`a_b_c`), mirroring codegen's `interp::join_path` — so
    /// resolution looks the joined name up rather than treating `a` as a
    /// variable with fields `b.c`.
    fn resolve_placeholders(&mut self, text: &str, loc: Loc, bag: &mut DiagnosticBag) {
        for part in crate::interp::parse_interpolation(text) {
            if let crate::interp::InterpPart::Placeholder(path) = part {
                let joined = crate::interp::join_path(&path);
                match self.lookup(&joined) {
                    None => self.err(bag, "E111", loc, format!("undeclared name '{joined}'")),
                    Some(b) => self.reference(&joined, loc, Some(b.declared_at)),
                }
            }
        }
    }

    fn resolve_expr(&mut self, e: &Expr, bag: &mut DiagnosticBag) {
        match &e.kind {
            ExprKind::Literal(lit) => {
                if lit.is_interpolated {
                    if let LiteralValue::Str(text) = &lit.value {
                        self.resolve_placeholders(text, e.span.start, bag);
                    }
                }
            }
            ExprKind::Null => {}
            ExprKind::Raw(text) => self.resolve_placeholders(text, e.span.start, bag),
            ExprKind::Identifier(name) => match self.lookup(name) {
                None => self.err(bag, "E111", e.span.start, format!("undeclared name '{name}'")),
                Some(b) => self.reference(name, e.span.start, Some(b.declared_at)),
            },
            ExprKind::Binary(_, l, r) => {
                self.resolve_expr(l, bag);
                self.resolve_expr(r, bag);
            }
            ExprKind::Unary(_, inner) => self.resolve_expr(inner, bag),
            ExprKind::Range(s, e2) => {
                self.resolve_expr(s, bag);
                self.resolve_expr(e2, bag);
            }
            ExprKind::Pipe(stages) => {
                for s in stages {
                    self.resolve_expr(s, bag);
                }
            }
            ExprKind::Redirect(inner, specs) => {
                self.resolve_expr(inner, bag);
                for r in specs {
                    if let Some(t) = &r.target {
                        self.resolve_expr(t, bag);
                    }
                }
            }
            ExprKind::Call(name, args) => {
                let loc = e.span.start;
                match self.functions.get(name) {
                    None => self.err(bag, "E113", loc, format!("unknown function '{name}'")),
                    Some(sig) => {
                        if args.len() < sig.required || args.len() > sig.total {
                            self.err(
                                bag,
                                "E114",
                                loc,
                                format!(
                                    "function '{name}' expects between {} and {} arguments, found {}",
                                    sig.required,
                                    sig.total,
                                    args.len()
                                ),
                            );
                        }
                    }
                }
                for a in args {
                    self.resolve_expr(a, bag);
                }
            }
            ExprKind::ShellCapture(inner) => self.resolve_expr(inner, bag),
            ExprKind::Index(base, idx) => {
                self.resolve_expr(base, bag);
                self.resolve_expr(idx, bag);
            }
            ExprKind::EnumAccess(enum_name, member) => {
                let loc = e.span.start;
                match self.enums.get(enum_name) {
                    None => self.err(bag, "E111", loc, format!("undeclared enum '{enum_name}'")),
                    Some(members) if !members.contains(member) => self.err(
                        bag,
                        "E111",
                        loc,
                        format!("Unknown enum member '{enum_name}::{member}'"),
                    ),
                    Some(_) => {}
                }
            }
            ExprKind::Array(items) => {
                for i in items {
                    self.resolve_expr(i, bag);
                }
            }
        }
    }

    fn err(&self, bag: &mut DiagnosticBag, code: &'static str, loc: Loc, message: impl Into<String>) {
        bag.push(crate::diagnostics::Diagnostic::error(code, message, loc.line, loc.column));
    }

    fn reference(&mut self, name: &str, used_at: Loc, resolved_to: Option<Loc>) {
        if let Some(s) = self.symbols.as_deref_mut() {
            s.reference(name, used_at, resolved_to);
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
    fn undeclared_identifier_is_an_error() {
        assert!(codes("let x = y\n").contains(&"E111"));
    }

    #[test]
    fn reassigning_a_const_is_an_error() {
        assert!(codes("const x = 1\nx = 2\n").contains(&"E110"));
    }

    #[test]
    fn duplicate_declaration_in_same_scope_is_an_error() {
        assert!(codes("let x = 1\nlet x = 2\n").contains(&"E112"));
    }

    #[test]
    fn break_outside_loop_is_an_error() {
        assert!(codes("break\n").contains(&"E115"));
    }

    #[test]
    fn calling_undeclared_function_is_an_error() {
        assert!(codes("missing_fn()\n").contains(&"E113"));
    }

    #[test]
    fn wrong_arity_call_is_an_error() {
        let src = "fn f(a)\n  return a\nend\nf()\n";
        assert!(codes(src).contains(&"E114"));
    }

    #[test]
    fn global_assignment_targets_outermost_scope_past_a_local_shadow() {
        let src = "let x = 1\nfn f()\n  const x = 2\n  global x = 3\nend\nf()\n";
        assert!(!codes(src).contains(&"E110"));
    }

    #[test]
    fn global_assignment_with_no_outer_binding_is_undeclared() {
        let src = "fn f()\n  global x = 3\nend\nf()\n";
        assert!(codes(src).contains(&"E111"));
    }
}
