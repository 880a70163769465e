//! Bash generator (SPEC_FULL.md §4.7).
//!
//! Takes an error-free `Program` (plus the type side-table from analysis)
//! and renders Bash source text. Anything the generator cannot lower is
//! recorded into `unsupported` rather than the `DiagnosticBag` — codegen
//! runs after the bag is already known error-free, so a second diagnostic
//! channel keeps "couldn't emit this" distinct from "this source is
//! invalid".

use std::collections::HashSet;
use std::fmt::Write as _;

use crate::analysis::flow::const_eval_pub;
use crate::analysis::ExprTypes;
use crate::ast::*;

const HEREDOC_SENTINEL: &str = "LASH_HEREDOC";

pub struct CodegenResult {
    pub bash: String,
    pub unsupported: Vec<String>,
}

pub fn generate(program: &Program, types: &ExprTypes) -> CodegenResult {
    let mut cg = Codegen {
        out: String::new(),
        unsupported: Vec::new(),
        assoc_arrays: HashSet::new(),
        uses_argv: false,
        uses_jobs: false,
        types,
    };
    cg.scan_program(program);

    let mut body = String::new();
    cg.out = String::new();
    for stmt in &program.statements {
        cg.emit_stmt(stmt, 0, &mut body);
    }

    let mut out = String::new();
    let _ = writeln!(out, "#!/usr/bin/env bash");
    if cg.uses_argv {
        let _ = writeln!(out, "declare -a __lash_argv=(\"$@\")");
    }
    if cg.uses_jobs {
        let _ = writeln!(out, "declare -a __lash_jobs=()");
    }
    out.push_str(&body);

    CodegenResult { bash: out, unsupported: cg.unsupported }
}

struct Codegen<'t> {
    out: String,
    unsupported: Vec<String>,
    assoc_arrays: HashSet<String>,
    uses_argv: bool,
    uses_jobs: bool,
    types: &'t ExprTypes,
}

impl<'t> Codegen<'t> {
    fn scan_program(&mut self, program: &Program) {
        for stmt in &program.statements {
            self.scan_stmt(stmt);
        }
    }

    fn scan_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::VariableDeclaration(d) => {
                if let Some(v) = &d.value {
                    self.scan_expr(v);
                    if let ExprKind::Array(items) = &v.kind {
                        if items.iter().any(|i| matches!(&i.kind, ExprKind::Literal(l) if matches!(l.value, LiteralValue::Str(_)))) {
                            // only a first string-KEY assignment forces associative;
                            // plain string array literals stay indexed.
                        }
                    }
                }
            }
            StmtKind::Assignment(a) => {
                self.scan_expr(&a.value);
                if let AssignTarget::Index { name, index } = &a.target {
                    self.scan_expr(index);
                    if matches!(&index.kind, ExprKind::Literal(l) if matches!(l.value, LiteralValue::Str(_))) {
                        self.assoc_arrays.insert(name.clone());
                    }
                }
            }
            StmtKind::FunctionDeclaration(f) => {
                for p in &f.params {
                    if let Some(d) = &p.default {
                        self.scan_expr(d);
                    }
                }
                for s in &f.body {
                    self.scan_stmt(s);
                }
            }
            StmtKind::EnumDeclaration(_) => {}
            StmtKind::If(s) => {
                for c in &s.clauses {
                    self.scan_expr(&c.condition);
                    for st in &c.body {
                        self.scan_stmt(st);
                    }
                }
                if let Some(e) = &s.else_branch {
                    for st in e {
                        self.scan_stmt(st);
                    }
                }
            }
            StmtKind::Switch(s) => {
                self.scan_expr(&s.scrutinee);
                for c in &s.cases {
                    self.scan_expr(&c.pattern);
                    for st in &c.body {
                        self.scan_stmt(st);
                    }
                }
            }
            StmtKind::For(s) => {
                match &s.iterable {
                    ForIterable::Range { start, end } => {
                        self.scan_expr(start);
                        self.scan_expr(end);
                    }
                    ForIterable::Expr(e) => {
                        if let ExprKind::Identifier(name) = &e.kind {
                            if name == "argv" {
                                self.uses_argv = true;
                            }
                        }
                        self.scan_expr(e);
                    }
                    ForIterable::Glob(_) => {}
                }
                if let Some(step) = &s.step {
                    self.scan_expr(step);
                }
                for st in &s.body {
                    self.scan_stmt(st);
                }
            }
            StmtKind::While(s) => {
                self.scan_expr(&s.condition);
                for st in &s.body {
                    self.scan_stmt(st);
                }
            }
            StmtKind::Until(s) => {
                self.scan_expr(&s.condition);
                for st in &s.body {
                    self.scan_stmt(st);
                }
            }
            StmtKind::Return(s) => {
                if let Some(v) = &s.value {
                    self.scan_expr(v);
                }
            }
            StmtKind::Shift(s) => {
                self.uses_argv = true;
                if let Some(v) = &s.amount {
                    self.scan_expr(v);
                }
            }
            StmtKind::Subshell(s) => {
                for st in &s.body {
                    self.scan_stmt(st);
                }
            }
            StmtKind::Wait(s) => {
                if matches!(s.target, WaitTarget::Jobs) {
                    self.uses_jobs = true;
                }
                if let WaitTarget::Target(e) = &s.target {
                    self.scan_expr(e);
                }
            }
            StmtKind::Break | StmtKind::Continue => {}
            StmtKind::Expression(e) => self.scan_expr(e),
            StmtKind::Shell(s) => self.scan_expr(&s.expr),
            StmtKind::Test(s) => {
                for a in &s.args {
                    self.scan_expr(a);
                }
            }
            StmtKind::Command(c) => {
                if c.script.contains("argv") {
                    self.uses_argv = true;
                }
            }
            StmtKind::Trap(s) => self.scan_expr(&s.handler),
            StmtKind::Untrap(_) => {}
        }
    }

    fn scan_expr(&mut self, e: &Expr) {
        match &e.kind {
            ExprKind::Literal(_) | ExprKind::Null => {}
            ExprKind::Identifier(name) => {
                if name == "argv" {
                    self.uses_argv = true;
                }
            }
            ExprKind::Raw(text) => {
                if text.contains("argv") {
                    self.uses_argv = true;
                }
            }
            ExprKind::Binary(_, l, r) => {
                self.scan_expr(l);
                self.scan_expr(r);
            }
            ExprKind::Unary(UnaryOp::Len, inner) => {
                if let ExprKind::Identifier(name) = &inner.kind {
                    if name == "argv" {
                        self.uses_argv = true;
                    }
                }
                self.scan_expr(inner);
            }
            ExprKind::Unary(_, inner) => self.scan_expr(inner),
            ExprKind::Range(s, e2) => {
                self.scan_expr(s);
                self.scan_expr(e2);
            }
            ExprKind::Pipe(stages) => stages.iter().for_each(|s| self.scan_expr(s)),
            ExprKind::Redirect(inner, specs) => {
                self.scan_expr(inner);
                for r in specs {
                    if let Some(t) = &r.target {
                        self.scan_expr(t);
                    }
                }
            }
            ExprKind::Call(_, args) => args.iter().for_each(|a| self.scan_expr(a)),
            ExprKind::ShellCapture(inner) => self.scan_expr(inner),
            ExprKind::Index(base, idx) => {
                if let ExprKind::Identifier(name) = &base.kind {
                    if name == "argv" {
                        self.uses_argv = true;
                    }
                }
                self.scan_expr(base);
                self.scan_expr(idx);
            }
            ExprKind::EnumAccess(_, _) => {}
            ExprKind::Array(items) => items.iter().for_each(|i| self.scan_expr(i)),
        }
    }

    fn indent(level: usize) -> String {
        "  ".repeat(level)
    }

    fn note(&mut self, what: impl Into<String>) {
        self.unsupported.push(what.into());
    }

    // -------------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------------

    fn emit_stmt(&mut self, stmt: &Stmt, level: usize, out: &mut String) {
        let ind = Self::indent(level);
        match &stmt.kind {
            StmtKind::VariableDeclaration(d) => self.emit_var_decl(d, level, out),
            StmtKind::Assignment(a) => self.emit_assignment(a, level, out),
            StmtKind::FunctionDeclaration(f) => self.emit_function(f, level, out),
            StmtKind::EnumDeclaration(_) => {}
            StmtKind::If(s) => self.emit_if(s, level, out),
            StmtKind::Switch(s) => self.emit_switch(s, level, out),
            StmtKind::For(s) => self.emit_for(s, level, out),
            StmtKind::While(s) => self.emit_while(s, level, out, false),
            StmtKind::Until(s) => self.emit_until(s, level, out),
            StmtKind::Return(s) => {
                if let Some(v) = &s.value {
                    let rendered = self.render_value_expr(v);
                    let _ = writeln!(out, "{ind}echo {rendered}");
                }
                let _ = writeln!(out, "{ind}return 0");
            }
            StmtKind::Shift(s) => {
                let n = s.amount.as_ref().map(|e| self.render_arith(e)).unwrap_or_else(|| "1".to_string());
                let _ = writeln!(out, "{ind}__lash_shift_n=$(( {n} ))");
                let _ = writeln!(out, "{ind}if (( __lash_shift_n > 0 )); then");
                let _ = writeln!(out, "{ind}  __lash_argv=(\"${{__lash_argv[@]:__lash_shift_n}}\")");
                let _ = writeln!(out, "{ind}fi");
            }
            StmtKind::Subshell(s) => self.emit_subshell(s, level, out),
            StmtKind::Wait(s) => self.emit_wait(s, level, out),
            StmtKind::Break => {
                let _ = writeln!(out, "{ind}break");
            }
            StmtKind::Continue => {
                let _ = writeln!(out, "{ind}continue");
            }
            StmtKind::Expression(e) => self.emit_expr_stmt(e, level, out),
            StmtKind::Shell(s) => {
                let rendered = self.render_shell_capture_payload(&s.expr);
                let _ = writeln!(out, "{ind}{rendered}");
            }
            StmtKind::Test(s) => {
                let args: Vec<String> = s.args.iter().map(|a| self.render_value_expr(a)).collect();
                let _ = writeln!(out, "{ind}[ {} ]", args.join(" "));
            }
            StmtKind::Command(c) => {
                let rendered = if c.is_raw_literal { c.script.clone() } else { self.substitute_placeholders(&c.script) };
                let _ = writeln!(out, "{ind}{rendered}");
            }
            StmtKind::Trap(t) => {
                let handler = self.render_value_expr(&t.handler);
                let signals = t.signals.join(" ");
                let _ = writeln!(out, "{ind}trap {handler} {signals}");
            }
            StmtKind::Untrap(t) => {
                let signals = t.signals.join(" ");
                let _ = writeln!(out, "{ind}trap - {signals}");
            }
        }
    }

    fn emit_var_decl(&mut self, d: &VariableDecl, level: usize, out: &mut String) {
        let ind = Self::indent(level);
        let is_function_local = level > 0 && !d.is_global;
        let rhs = d.value.as_ref().map(|v| self.render_rhs(&d.name, v)).unwrap_or_else(|| "\"\"".to_string());

        let prefix = match (is_function_local, d.kind) {
            (true, DeclKind::Let) => "local ",
            (true, DeclKind::Const) => "local -r ",
            (false, DeclKind::Let) => "",
            (false, DeclKind::Const) => "readonly ",
        };
        if self.assoc_arrays.contains(&d.name) {
            let _ = writeln!(out, "{ind}declare -A {}=()", d.name);
        }
        let _ = writeln!(out, "{ind}{prefix}{}={rhs}", d.name);
    }

    fn emit_assignment(&mut self, a: &Assignment, level: usize, out: &mut String) {
        let ind = Self::indent(level);
        match &a.target {
            AssignTarget::Identifier(name) => {
                let rhs = self.render_rhs(name, &a.value);
                let op = if a.operator == AssignOp::AddAssign { "+=" } else { "=" };
                let _ = writeln!(out, "{ind}{name}{op}{rhs}");
            }
            AssignTarget::Index { name, index } => {
                let idx = if self.assoc_arrays.contains(name) {
                    self.render_value_expr(index)
                } else {
                    self.render_arith(index)
                };
                let rhs = self.render_value_expr(&a.value);
                let op = if a.operator == AssignOp::AddAssign { "+=" } else { "=" };
                let _ = writeln!(out, "{ind}{name}[{idx}]{op}{rhs}");
            }
        }
    }

    fn emit_function(&mut self, f: &FunctionDecl, level: usize, out: &mut String) {
        let ind = Self::indent(level);
        let _ = writeln!(out, "{ind}{}() {{", f.name);
        for (i, p) in f.params.iter().enumerate() {
            let pos = i + 1;
            if let Some(default) = &p.default {
                let d = self.render_value_expr(default);
                let _ = writeln!(out, "{}  local {}=\"${{{}:-{}}}\"", ind, p.name, pos, d.trim_matches('"'));
            } else {
                let _ = writeln!(out, "{}  local {}=\"${{{}}}\"", ind, p.name, pos);
            }
        }
        for stmt in &f.body {
            self.emit_stmt(stmt, level + 1, out);
        }
        let _ = writeln!(out, "{ind}}}");
    }

    fn emit_if(&mut self, s: &IfStmt, level: usize, out: &mut String) {
        let ind = Self::indent(level);
        let mut emitted_any = false;
        let mut else_eliminated = false;

        for clause in &s.clauses {
            if let Some(v) = const_eval_pub(&clause.condition) {
                if v == 0 {
                    self.note(format!("eliminated always-false branch at line {}", clause.condition.span.start.line));
                    continue;
                } else {
                    // always true: emit body unconditionally, skip remaining clauses/else.
                    if !emitted_any {
                        for st in &clause.body {
                            self.emit_stmt(st, level, out);
                        }
                    } else {
                        let _ = writeln!(out, "{ind}else");
                        for st in &clause.body {
                            self.emit_stmt(st, level + 1, out);
                        }
                        let _ = writeln!(out, "{ind}fi");
                    }
                    else_eliminated = true;
                    break;
                }
            }
            let cond = self.render_condition(&clause.condition);
            let kw = if emitted_any { "elif" } else { "if" };
            let _ = writeln!(out, "{ind}{kw} {cond}; then");
            for st in &clause.body {
                self.emit_stmt(st, level + 1, out);
            }
            emitted_any = true;
        }

        if else_eliminated {
            return;
        }

        if !emitted_any {
            return;
        }

        if let Some(else_body) = &s.else_branch {
            let _ = writeln!(out, "{ind}else");
            for st in else_body {
                self.emit_stmt(st, level + 1, out);
            }
        }
        let _ = writeln!(out, "{ind}fi");
    }

    fn emit_switch(&mut self, s: &SwitchStmt, level: usize, out: &mut String) {
        let ind = Self::indent(level);
        let scrutinee = self.render_value_expr(&s.scrutinee);
        let _ = writeln!(out, "{ind}case {scrutinee} in");
        for case in &s.cases {
            let pat = self.render_case_pattern(&case.pattern);
            let _ = writeln!(out, "{}  {pat})", ind);
            for st in &case.body {
                self.emit_stmt(st, level + 2, out);
            }
            let _ = writeln!(out, "{}  ;;", ind);
        }
        let _ = writeln!(out, "{ind}esac");
    }

    fn emit_for(&mut self, s: &ForStmt, level: usize, out: &mut String) {
        let ind = Self::indent(level);
        match &s.iterable {
            ForIterable::Range { start, end } => {
                let start_s = self.render_arith(start);
                let end_s = self.render_arith(end);
                let step_s = s.step.as_ref().map(|e| self.render_arith(e));
                let seq = match step_s {
                    Some(step) => format!("$(seq {start_s} {step} {end_s})"),
                    None => format!("$(seq {start_s} {end_s})"),
                };
                let _ = writeln!(out, "{ind}for {} in {seq}; do", s.variable);
            }
            ForIterable::Expr(e) => {
                if let ExprKind::Identifier(name) = &e.kind {
                    if name == "argv" {
                        let _ = writeln!(out, "{ind}for {} in \"$@\"; do", s.variable);
                    } else {
                        let _ = writeln!(out, "{ind}for {} in \"${{{name}[@]}}\"; do", s.variable);
                    }
                } else {
                    let rendered = self.render_value_expr(e);
                    let _ = writeln!(out, "{ind}for {} in {rendered}; do", s.variable);
                }
            }
            ForIterable::Glob(pattern) => {
                let _ = writeln!(out, "{ind}for {} in {pattern}; do", s.variable);
            }
        }
        for st in &s.body {
            self.emit_stmt(st, level + 1, out);
        }
        let _ = writeln!(out, "{ind}done");
    }

    fn emit_while(&mut self, s: &WhileStmt, level: usize, out: &mut String, _until: bool) {
        let ind = Self::indent(level);
        let cond = self.render_condition(&s.condition);
        let _ = writeln!(out, "{ind}while {cond}; do");
        for st in &s.body {
            self.emit_stmt(st, level + 1, out);
        }
        let _ = writeln!(out, "{ind}done");
    }

    fn emit_until(&mut self, s: &UntilStmt, level: usize, out: &mut String) {
        let ind = Self::indent(level);
        let cond = self.render_condition(&s.condition);
        let _ = writeln!(out, "{ind}until {cond}; do");
        for st in &s.body {
            self.emit_stmt(st, level + 1, out);
        }
        let _ = writeln!(out, "{ind}done");
    }

    fn emit_subshell(&mut self, s: &SubshellStmt, level: usize, out: &mut String) {
        let ind = Self::indent(level);
        let _ = writeln!(out, "{ind}(");
        for st in &s.body {
            self.emit_stmt(st, level + 1, out);
        }
        if s.run_in_background {
            let _ = writeln!(out, "{ind}) &");
            if let Some(cap) = &s.into {
                let _ = writeln!(out, "{ind}{}=$!", cap.name);
                if self.uses_jobs {
                    let _ = writeln!(out, "{ind}__lash_jobs+=(\"$!\")");
                }
            } else if self.uses_jobs {
                let _ = writeln!(out, "{ind}__lash_jobs+=(\"$!\")");
            }
        } else {
            let _ = write!(out, "{ind})");
            match &s.into {
                Some(cap) => {
                    let _ = writeln!(out, "; {}=$?", cap.name);
                }
                None => {
                    let _ = writeln!(out);
                }
            }
        }
    }

    fn emit_wait(&mut self, s: &WaitStmt, level: usize, out: &mut String) {
        let ind = Self::indent(level);
        match &s.target {
            WaitTarget::Default => {
                let _ = writeln!(out, "{ind}wait");
            }
            WaitTarget::Target(e) => {
                let rendered = self.render_value_expr(e);
                let _ = writeln!(out, "{ind}wait {rendered}");
                if let Some(cap) = &s.into {
                    let _ = writeln!(out, "{ind}{}=$?", cap.name);
                }
            }
            WaitTarget::Jobs => {
                let status = s.into.as_ref().map(|c| c.name.clone()).unwrap_or_else(|| "__lash_wait_status".to_string());
                let _ = writeln!(out, "{ind}for pid in \"${{__lash_jobs[@]}}\"; do");
                let _ = writeln!(out, "{ind}  wait \"${{pid}}\"");
                let _ = writeln!(out, "{ind}  {status}=$?");
                let _ = writeln!(out, "{ind}done");
            }
        }
    }

    fn emit_expr_stmt(&mut self, e: &Expr, level: usize, out: &mut String) {
        let ind = Self::indent(level);
        if let ExprKind::Redirect(inner, specs) = &e.kind {
            let base = self.render_pipeline_stage(inner);
            let redirects: Vec<String> = specs.iter().map(|r| self.render_redirect(r)).collect();
            let _ = writeln!(out, "{ind}{base} {}", redirects.join(" "));
            return;
        }
        if let ExprKind::Pipe(stages) = &e.kind {
            if stages.len() > 1 {
                if let ExprKind::Identifier(sink) = &stages[stages.len() - 1].kind {
                    let head: Vec<String> = stages[..stages.len() - 1]
                        .iter()
                        .map(|s| self.render_pipeline_stage(s))
                        .collect();
                    let _ = writeln!(out, "{ind}{}=$({})", sink, head.join(" | "));
                    return;
                }
            }
            let rendered: Vec<String> = stages.iter().map(|s| self.render_pipeline_stage(s)).collect();
            let _ = writeln!(out, "{ind}{}", rendered.join(" | "));
            return;
        }
        if let ExprKind::Call(name, args) = &e.kind {
            let rendered_args: Vec<String> = args.iter().map(|a| self.render_value_expr(a)).collect();
            let _ = writeln!(out, "{ind}{name} {}", rendered_args.join(" "));
            return;
        }
        let rendered = self.render_value_expr(e);
        let _ = writeln!(out, "{ind}{rendered}");
    }

    fn render_redirect(&mut self, r: &RedirectSpec) -> String {
        let fd = r.fd.map(|n| n.to_string()).unwrap_or_default();
        let amp = if r.both { "&" } else { "" };
        match r.operator {
            RedirectOp::Write => format!("{fd}{amp}> {}", r.target.as_deref().map(|t| self.render_value_expr(t)).unwrap_or_default()),
            RedirectOp::Append => format!("{fd}{amp}>> {}", r.target.as_deref().map(|t| self.render_value_expr(t)).unwrap_or_default()),
            RedirectOp::Read => format!("{fd}< {}", r.target.as_deref().map(|t| self.render_value_expr(t)).unwrap_or_default()),
            RedirectOp::ReadWrite => format!("{fd}<> {}", r.target.as_deref().map(|t| self.render_value_expr(t)).unwrap_or_default()),
            RedirectOp::HereString => format!("{fd}<<< {}", r.target.as_deref().map(|t| self.render_value_expr(t)).unwrap_or_default()),
            RedirectOp::Heredoc => {
                let payload = r.target.as_deref().map(|t| self.render_value_expr(t)).unwrap_or_default();
                format!("{fd}<<'{HEREDOC_SENTINEL}'\n{}\n{HEREDOC_SENTINEL}", payload.trim_matches('"'))
            }
            RedirectOp::FdDup => format!("{fd}>&{}", r.dup_fd.map(|n| n.to_string()).unwrap_or_default()),
            RedirectOp::FdClose => format!("{fd}>&-"),
        }
    }

    fn render_pipeline_stage(&mut self, e: &Expr) -> String {
        match &e.kind {
            ExprKind::Raw(text) => self.substitute_placeholders(text),
            ExprKind::Call(name, args) => {
                let rendered_args: Vec<String> = args.iter().map(|a| self.render_value_expr(a)).collect();
                format!("{name} {}", rendered_args.join(" "))
            }
            _ => self.render_value_expr(e),
        }
    }

    // -------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------

    /// Render an expression as it would appear embedded in a larger
    /// command (used for args, conditions that fall back to `[ ... ]`,
    /// etc.) — a bare `${x}`-style reference, not an assignment RHS.
    fn render_value_expr(&mut self, e: &Expr) -> String {
        match &e.kind {
            ExprKind::Literal(lit) => self.render_literal(lit),
            ExprKind::Null => "\"\"".to_string(),
            ExprKind::Identifier(name) => {
                if name == "argv" {
                    self.uses_argv = true;
                    "\"${__lash_argv[@]}\"".to_string()
                } else {
                    format!("\"${{{name}}}\"")
                }
            }
            ExprKind::Raw(text) => self.substitute_placeholders(text),
            ExprKind::Binary(op, l, r) if is_arith_op(*op) => format!("$(( {} ))", self.render_arith(e)),
            ExprKind::Binary(_, _, _) => self.render_condition(e),
            ExprKind::Unary(UnaryOp::Len, inner) => self.render_len(inner),
            ExprKind::Unary(UnaryOp::Neg, inner) => format!("$(( -({}) ))", self.render_arith(inner)),
            ExprKind::Unary(UnaryOp::Plus, inner) => self.render_value_expr(inner),
            ExprKind::Unary(UnaryOp::Not, _) => self.render_condition(e),
            ExprKind::Range(s, e2) => {
                self.note("range used outside 'for' has no direct Bash value form");
                format!("{}..{}", self.render_arith(s), self.render_arith(e2))
            }
            ExprKind::Pipe(stages) => {
                let rendered: Vec<String> = stages.iter().map(|s| self.render_pipeline_stage(s)).collect();
                format!("$({})", rendered.join(" | "))
            }
            ExprKind::Redirect(inner, _specs) => {
                self.note("redirect in expression position is only supported at statement level");
                self.render_value_expr(inner)
            }
            ExprKind::Call(name, args) => {
                let rendered_args: Vec<String> = args.iter().map(|a| self.render_value_expr(a)).collect();
                format!("$({name} {})", rendered_args.join(" "))
            }
            ExprKind::ShellCapture(inner) => {
                format!("$({})", self.render_shell_capture_payload(inner))
            }
            ExprKind::Index(base, idx) => {
                if let ExprKind::Identifier(name) = &base.kind {
                    if name == "argv" {
                        self.uses_argv = true;
                        let i = self.render_arith(idx);
                        return format!("\"${{__lash_argv[{i}]}}\"");
                    }
                    let i = if self.assoc_arrays.contains(name) {
                        self.render_value_expr(idx)
                    } else {
                        self.render_arith(idx)
                    };
                    return format!("\"${{{name}[{i}]}}\"");
                }
                self.note("indexing a non-identifier base is not supported");
                "\"\"".to_string()
            }
            ExprKind::EnumAccess(enum_name, member) => format!("\"{enum_name}{member}\""),
            ExprKind::Array(items) => {
                let rendered: Vec<String> = items.iter().map(|i| self.render_value_expr(i)).collect();
                format!("({})", rendered.join(" "))
            }
        }
    }

    /// Render the right-hand side of `let`/`const`/`=` — same as
    /// `render_value_expr` except array literals and arithmetic RHS drop
    /// the surrounding quotes bare assignment expects.
    fn render_rhs(&mut self, _target: &str, e: &Expr) -> String {
        match &e.kind {
            ExprKind::Array(items) => {
                let rendered: Vec<String> = items.iter().map(|i| self.render_value_expr(i)).collect();
                format!("({})", rendered.join(" "))
            }
            ExprKind::Binary(op, _, _) if is_arith_op(*op) => format!("$(( {} ))", self.render_arith(e)),
            ExprKind::Literal(LiteralExpr { value: LiteralValue::Int(_), .. }) => self.render_value_expr(e).trim_matches('"').to_string(),
            _ => self.render_value_expr(e),
        }
    }

    fn render_literal(&mut self, lit: &LiteralExpr) -> String {
        match &lit.value {
            LiteralValue::Int(n) => n.to_string(),
            LiteralValue::Bool(b) => if *b { "1".to_string() } else { "0".to_string() },
            LiteralValue::Str(s) => {
                if lit.is_interpolated {
                    format!("\"{}\"", self.render_interpolated(s))
                } else if lit.is_multiline {
                    format!("\"{}\"", escape_bash_string(s))
                } else {
                    format!("\"{}\"", escape_bash_string(s))
                }
            }
        }
    }

    fn render_interpolated(&mut self, s: &str) -> String {
        let mut result = String::new();
        for part in crate::interp::parse_interpolation(s) {
            match part {
                crate::interp::InterpPart::Text(t) => result.push_str(&escape_bash_string(&t)),
                crate::interp::InterpPart::Placeholder(path) => {
                    let joined = crate::interp::join_path(&path);
                    let _ = write!(result, "${{{joined}}}");
                }
            }
        }
        result
    }

    /// Substitute `{name}` placeholders in raw/command-statement text with
    /// `${name}`, leaving everything else verbatim.
    fn substitute_placeholders(&mut self, text: &str) -> String {
        let mut result = String::new();
        for part in crate::interp::parse_interpolation(text) {
            match part {
                crate::interp::InterpPart::Text(t) => result.push_str(&t),
                crate::interp::InterpPart::Placeholder(path) => {
                    let joined = crate::interp::join_path(&path);
                    let _ = write!(result, "${{{joined}}}");
                }
            }
        }
        result
    }

    fn render_len(&mut self, inner: &Expr) -> String {
        if let ExprKind::Identifier(name) = &inner.kind {
            if name == "argv" {
                self.uses_argv = true;
                return "\"${#__lash_argv[@]}\"".to_string();
            }
            if self.types.get(inner.id) == ExpressionType::String {
                return format!("\"${{#{name}}}\"");
            }
            return format!("\"${{#{name}[@]}}\"");
        }
        self.note("'#' length operator only supports identifier operands directly");
        "0".to_string()
    }

    /// Render an arithmetic sub-expression (inside `$(( ))` / `(( ))`),
    /// without the surrounding construct or quoting.
    fn render_arith(&mut self, e: &Expr) -> String {
        match &e.kind {
            ExprKind::Literal(LiteralExpr { value: LiteralValue::Int(n), .. }) => n.to_string(),
            ExprKind::Literal(LiteralExpr { value: LiteralValue::Bool(b), .. }) => if *b { "1".into() } else { "0".into() },
            ExprKind::Identifier(name) => format!("{name}"),
            ExprKind::Index(base, idx) => {
                if let ExprKind::Identifier(name) = &base.kind {
                    let i = self.render_arith(idx);
                    return format!("{name}[{i}]");
                }
                self.note("arithmetic over a non-identifier index base is not supported");
                "0".to_string()
            }
            ExprKind::Unary(UnaryOp::Len, inner) => {
                if let ExprKind::Identifier(name) = &inner.kind {
                    return format!("${{#{name}[@]}}");
                }
                "0".to_string()
            }
            ExprKind::Unary(UnaryOp::Neg, inner) => format!("-({})", self.render_arith(inner)),
            ExprKind::Unary(UnaryOp::Plus, inner) => self.render_arith(inner),
            ExprKind::Unary(UnaryOp::Not, inner) => format!("!({})", self.render_arith(inner)),
            ExprKind::Binary(op, l, r) => {
                let lv = self.render_arith(l);
                let rv = self.render_arith(r);
                format!("{lv} {} {rv}", bash_arith_op(*op))
            }
            ExprKind::Call(name, args) => {
                let rendered_args: Vec<String> = args.iter().map(|a| self.render_value_expr(a)).collect();
                format!("$({name} {})", rendered_args.join(" "))
            }
            _ => {
                self.note("non-arithmetic expression used in arithmetic context");
                self.render_value_expr(e)
            }
        }
    }

    /// Render a boolean condition for `if`/`while`/`until` (the `cond` in
    /// `if cond; then`), choosing `(( ))`, `[[ ]]`, or a `[ ]` fallback.
    fn render_condition(&mut self, e: &Expr) -> String {
        match &e.kind {
            ExprKind::Binary(BinaryOp::Eq, l, r) if is_string_like(l) || is_string_like(r) => {
                format!("[[ {} == {} ]]", self.render_bare_value(l), self.render_bare_value(r))
            }
            ExprKind::Binary(BinaryOp::Ne, l, r) if is_string_like(l) || is_string_like(r) => {
                format!("[[ {} != {} ]]", self.render_bare_value(l), self.render_bare_value(r))
            }
            ExprKind::Binary(op, ..) if is_numeric_cmp(*op) => format!("(( {} ))", self.render_arith(e)),
            ExprKind::Binary(BinaryOp::And, l, r) => {
                format!("{} && {}", self.render_condition(l), self.render_condition(r))
            }
            ExprKind::Binary(BinaryOp::Or, l, r) => {
                format!("{} || {}", self.render_condition(l), self.render_condition(r))
            }
            ExprKind::Unary(UnaryOp::Not, inner) => format!("! {}", self.render_condition(inner)),
            ExprKind::Literal(LiteralExpr { value: LiteralValue::Bool(b), .. }) => {
                if *b { "true".to_string() } else { "false".to_string() }
            }
            _ => format!("[ {} -ne 0 ]", self.render_arith(e)),
        }
    }

    fn render_bare_value(&mut self, e: &Expr) -> String {
        let rendered = self.render_value_expr(e);
        rendered
    }

    fn render_case_pattern(&mut self, e: &Expr) -> String {
        match &e.kind {
            ExprKind::Literal(LiteralExpr { value: LiteralValue::Str(s), is_interpolated: false, .. }) => {
                if s.chars().any(|c| "*?[]|&;()<>$`\\\"' \t".contains(c)) {
                    format!("\"{}\"", escape_bash_string(s))
                } else {
                    s.clone()
                }
            }
            _ => self.render_value_expr(e),
        }
    }

    /// `$sh EXPR` — renders EXPR's string payload, expanding interpolation
    /// placeholders, with the single-quote-breakout rule for placeholders
    /// that occur inside a single-quoted span of the payload.
    fn render_shell_capture_payload(&mut self, e: &Expr) -> String {
        let text = match &e.kind {
            ExprKind::Literal(LiteralExpr { value: LiteralValue::Str(s), .. }) => s.clone(),
            ExprKind::Raw(s) => s.clone(),
            _ => {
                self.note("'$sh' payload must be a string literal or raw command text");
                return self.render_value_expr(e);
            }
        };
        let mut result = String::new();
        let mut in_single = false;
        for part in crate::interp::parse_interpolation(&text) {
            match part {
                crate::interp::InterpPart::Text(t) => {
                    for c in t.chars() {
                        if c == '\'' {
                            in_single = !in_single;
                        }
                        result.push(c);
                    }
                }
                crate::interp::InterpPart::Placeholder(path) => {
                    let joined = crate::interp::join_path(&path);
                    if in_single {
                        let _ = write!(result, "'\"${{{joined}}}\"'");
                    } else {
                        let _ = write!(result, "${{{joined}}}");
                    }
                }
            }
        }
        result
    }
}

fn is_arith_op(op: BinaryOp) -> bool {
    matches!(op, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod)
}

fn is_numeric_cmp(op: BinaryOp) -> bool {
    matches!(op, BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge)
}

fn is_string_like(e: &Expr) -> bool {
    matches!(
        &e.kind,
        ExprKind::Literal(LiteralExpr { value: LiteralValue::Str(_), .. }) | ExprKind::EnumAccess(_, _)
    )
}

fn bash_arith_op(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Gt => ">",
        BinaryOp::Le => "<=",
        BinaryOp::Ge => ">=",
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
    }
}

#[cfg(test)]
mod tests {
    fn bash(src: &str) -> String {
        let result = crate::compile(src, "test.lash");
        assert!(result.bash.is_some(), "expected successful compile, got {:?}", result.diagnostics);
        result.bash.unwrap()
    }

    #[test]
    fn always_false_constant_branch_is_eliminated() {
        let out = bash("if 1 - 1\n  let x = 1\nend\nlet y = 2\n");
        assert!(!out.contains("x=1"));
        assert!(out.contains("y=2"));
    }

    #[test]
    fn always_true_constant_branch_short_circuits_else() {
        let out = bash("if 2 - 1\n  let x = 1\nelse\n  let x = 2\nend\n");
        assert!(out.contains("x=1"));
        assert!(!out.contains("x=2"));
    }

    #[test]
    fn numeric_comparison_uses_arithmetic_conditional() {
        let out = bash("if 1 < 2\n  let a = 1\nend\n");
        assert!(out.contains("(( 1 < 2 ))"));
    }

    #[test]
    fn string_equality_uses_bracket_conditional() {
        let out = bash("if \"a\" == \"b\"\n  let a = 1\nend\n");
        assert!(out.contains("[[ \"a\" == \"b\" ]]"));
    }

    #[test]
    fn string_keyed_index_assignment_forces_associative_array() {
        let out = bash("let arr = [1]\narr[\"k\"] = 2\n");
        assert!(out.contains("declare -A arr=()"));
        assert!(out.contains("arr[\"k\"]=2"));
    }

    #[test]
    fn length_of_a_string_variable_uses_string_length_form() {
        let out = bash("let s = \"hello\"\nlet n = #s\n");
        assert!(out.contains("\"${#s}\""));
        assert!(!out.contains("\"${#s[@]}\""));
    }

    #[test]
    fn length_of_an_array_variable_uses_array_length_form() {
        let out = bash("let arr = [1, 2, 3]\nlet n = #arr\n");
        assert!(out.contains("\"${#arr[@]}\""));
    }
}

fn escape_bash_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' | '$' | '`' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}
