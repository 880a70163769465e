//! Type checker: assigns every expression an `ExpressionType` from
//! {Number, String, Bool, Array, Unknown} per SPEC_FULL.md §4.4, and tracks
//! each array-typed variable's key kind (numeric vs. string) to flag mixed
//! associative/indexed use (E202).

use std::collections::HashMap;

use crate::ast::*;
use crate::diagnostics::DiagnosticBag;

use super::ExprTypes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyKind {
    Numeric,
    StringKey,
}

struct Checker {
    scopes: Vec<HashMap<String, ExpressionType>>,
    array_keys: HashMap<String, KeyKind>,
    types: ExprTypes,
}

pub fn check(program: &Program, bag: &mut DiagnosticBag) -> ExprTypes {
    let mut c = Checker {
        scopes: vec![HashMap::new()],
        array_keys: HashMap::new(),
        types: ExprTypes::default(),
    };
    c.scopes[0].insert("argv".to_string(), ExpressionType::Array);
    for stmt in &program.statements {
        c.check_stmt(stmt, bag);
    }
    c.types
}

impl Checker {
    fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    fn set_var(&mut self, name: &str, ty: ExpressionType) {
        for scope in self.scopes.iter_mut().rev() {
            if scope.contains_key(name) {
                scope.insert(name.to_string(), ty);
                return;
            }
        }
        self.scopes.last_mut().unwrap().insert(name.to_string(), ty);
    }

    fn var_type(&self, name: &str) -> ExpressionType {
        for scope in self.scopes.iter().rev() {
            if let Some(t) = scope.get(name) {
                return *t;
            }
        }
        ExpressionType::Unknown
    }

    fn err(&self, bag: &mut DiagnosticBag, code: &'static str, loc: Loc, message: impl Into<String>) {
        bag.push(crate::diagnostics::Diagnostic::error(code, message, loc.line, loc.column));
    }

    fn check_block(&mut self, stmts: &[Stmt], bag: &mut DiagnosticBag) {
        self.push();
        for s in stmts {
            self.check_stmt(s, bag);
        }
        self.pop();
    }

    fn check_stmt(&mut self, stmt: &Stmt, bag: &mut DiagnosticBag) {
        match &stmt.kind {
            StmtKind::VariableDeclaration(d) => {
                let ty = d.value.as_ref().map(|v| self.check_expr(v, bag)).unwrap_or_default();
                self.set_var(&d.name, ty);
                if let Some(Expr { kind: ExprKind::Array(_), .. }) = &d.value {
                    self.array_keys.remove(&d.name);
                }
            }
            StmtKind::Assignment(a) => {
                let value_ty = self.check_expr(&a.value, bag);
                match &a.target {
                    AssignTarget::Identifier(name) => self.set_var(name, value_ty),
                    AssignTarget::Index { name, index } => {
                        let idx_ty = self.check_expr(index, bag);
                        self.check_array_key(name, idx_ty, stmt.span.start, bag);
                    }
                }
            }
            StmtKind::FunctionDeclaration(f) => {
                self.push();
                for p in &f.params {
                    let ty = p.default.as_ref().map(|d| self.check_expr(d, bag)).unwrap_or_default();
                    self.scopes.last_mut().unwrap().insert(p.name.clone(), ty);
                }
                for s in &f.body {
                    self.check_stmt(s, bag);
                }
                self.pop();
            }
            StmtKind::EnumDeclaration(_) => {}
            StmtKind::If(s) => {
                for clause in &s.clauses {
                    self.check_bool_context(&clause.condition, bag);
                    self.check_block(&clause.body, bag);
                }
                if let Some(body) = &s.else_branch {
                    self.check_block(body, bag);
                }
            }
            StmtKind::Switch(s) => {
                self.check_expr(&s.scrutinee, bag);
                for case in &s.cases {
                    self.check_expr(&case.pattern, bag);
                    self.check_block(&case.body, bag);
                }
            }
            StmtKind::For(s) => {
                let var_ty = match &s.iterable {
                    ForIterable::Range { start, end } => {
                        self.require_number(start, bag);
                        self.require_number(end, bag);
                        ExpressionType::Number
                    }
                    ForIterable::Expr(e) => {
                        let t = self.check_expr(e, bag);
                        if t == ExpressionType::Array { ExpressionType::Unknown } else { t }
                    }
                    ForIterable::Glob(_) => ExpressionType::String,
                };
                if let Some(step) = &s.step {
                    self.require_number(step, bag);
                }
                self.push();
                self.scopes.last_mut().unwrap().insert(s.variable.clone(), var_ty);
                for st in &s.body {
                    self.check_stmt(st, bag);
                }
                self.pop();
            }
            StmtKind::While(s) => {
                self.check_bool_context(&s.condition, bag);
                self.check_block(&s.body, bag);
            }
            StmtKind::Until(s) => {
                self.check_bool_context(&s.condition, bag);
                self.check_block(&s.body, bag);
            }
            StmtKind::Return(s) => {
                if let Some(v) = &s.value {
                    self.check_expr(v, bag);
                }
            }
            StmtKind::Shift(s) => {
                if let Some(v) = &s.amount {
                    self.require_number(v, bag);
                }
            }
            StmtKind::Subshell(s) => self.check_block(&s.body, bag),
            StmtKind::Wait(s) => {
                if let WaitTarget::Target(e) = &s.target {
                    self.check_expr(e, bag);
                }
            }
            StmtKind::Break | StmtKind::Continue => {}
            StmtKind::Expression(e) => {
                self.check_pipe_aware(e, bag);
            }
            StmtKind::Shell(s) => {
                self.check_expr(&s.expr, bag);
            }
            StmtKind::Test(s) => {
                for a in &s.args {
                    self.check_expr(a, bag);
                }
            }
            StmtKind::Command(_) => {}
            StmtKind::Trap(s) => {
                self.check_expr(&s.handler, bag);
            }
            StmtKind::Untrap(_) => {}
        }
    }

    fn check_array_key(&mut self, name: &str, idx_ty: ExpressionType, loc: Loc, bag: &mut DiagnosticBag) {
        let kind = match idx_ty {
            ExpressionType::String => KeyKind::StringKey,
            _ => KeyKind::Numeric,
        };
        match self.array_keys.get(name) {
            None => {
                self.array_keys.insert(name.to_string(), kind);
            }
            Some(existing) if *existing != kind => {
                self.err(
                    bag,
                    "E202",
                    loc,
                    format!("array '{name}' is used with both numeric and string keys"),
                );
            }
            _ => {}
        }
    }

    fn check_bool_context(&mut self, e: &Expr, bag: &mut DiagnosticBag) {
        let ty = self.check_expr(e, bag);
        if !matches!(ty, ExpressionType::Bool | ExpressionType::Number | ExpressionType::Unknown) {
            self.err(bag, "E200", e.span.start, "condition must be a boolean, number, or unknown-typed expression");
        }
    }

    fn require_number(&mut self, e: &Expr, bag: &mut DiagnosticBag) {
        let ty = self.check_expr(e, bag);
        if !matches!(ty, ExpressionType::Number | ExpressionType::Unknown) {
            self.err(bag, "E200", e.span.start, "expected a number here");
        }
    }

    fn check_pipe_aware(&mut self, e: &Expr, bag: &mut DiagnosticBag) -> ExpressionType {
        if let ExprKind::Pipe(stages) = &e.kind {
            for (i, stage) in stages.iter().enumerate() {
                if i == stages.len() - 1 {
                    if let ExprKind::Identifier(name) = &stage.kind {
                        self.set_var(name, ExpressionType::String);
                        continue;
                    }
                }
                self.check_expr(stage, bag);
            }
            self.types.set(e.id, ExpressionType::String);
            return ExpressionType::String;
        }
        self.check_expr(e, bag)
    }

    fn check_expr(&mut self, e: &Expr, bag: &mut DiagnosticBag) -> ExpressionType {
        let ty = self.infer(e, bag);
        self.types.set(e.id, ty);
        ty
    }

    fn infer(&mut self, e: &Expr, bag: &mut DiagnosticBag) -> ExpressionType {
        match &e.kind {
            ExprKind::Literal(lit) => match lit.value {
                LiteralValue::Int(_) => ExpressionType::Number,
                LiteralValue::Str(_) => ExpressionType::String,
                LiteralValue::Bool(_) => ExpressionType::Bool,
            },
            ExprKind::Null | ExprKind::Raw(_) => ExpressionType::Unknown,
            ExprKind::Identifier(name) => self.var_type(name),
            ExprKind::Binary(op, l, r) => self.infer_binary(*op, l, r, e.span.start, bag),
            ExprKind::Unary(op, inner) => self.infer_unary(*op, inner, e.span.start, bag),
            ExprKind::Range(s, e2) => {
                self.require_number(s, bag);
                self.require_number(e2, bag);
                ExpressionType::Array
            }
            ExprKind::Pipe(stages) => {
                for s in stages {
                    self.check_expr(s, bag);
                }
                ExpressionType::String
            }
            ExprKind::Redirect(inner, specs) => {
                let ty = self.check_expr(inner, bag);
                for r in specs {
                    if let Some(t) = &r.target {
                        self.check_expr(t, bag);
                    }
                }
                ty
            }
            ExprKind::Call(_, args) => {
                for a in args {
                    self.check_expr(a, bag);
                }
                ExpressionType::Unknown
            }
            ExprKind::ShellCapture(inner) => {
                self.check_expr(inner, bag);
                ExpressionType::String
            }
            ExprKind::Index(base, idx) => {
                let idx_ty = self.check_expr(idx, bag);
                if let ExprKind::Identifier(name) = &base.kind {
                    self.check_array_key(name, idx_ty, e.span.start, bag);
                }
                self.check_expr(base, bag);
                ExpressionType::Unknown
            }
            ExprKind::EnumAccess(_, _) => ExpressionType::String,
            ExprKind::Array(items) => {
                for item in items {
                    self.check_expr(item, bag);
                }
                ExpressionType::Array
            }
        }
    }

    fn infer_binary(&mut self, op: BinaryOp, l: &Expr, r: &Expr, loc: Loc, bag: &mut DiagnosticBag) -> ExpressionType {
        let lt = self.check_expr(l, bag);
        let rt = self.check_expr(r, bag);
        let unknown = lt == ExpressionType::Unknown || rt == ExpressionType::Unknown;
        match op {
            BinaryOp::Add => {
                if lt == ExpressionType::String || rt == ExpressionType::String {
                    let ok = |t: ExpressionType| matches!(t, ExpressionType::Number | ExpressionType::String | ExpressionType::Unknown);
                    if ok(lt) && ok(rt) {
                        ExpressionType::String
                    } else {
                        self.err(bag, "E200", loc, "cannot concatenate a non-string, non-number value");
                        ExpressionType::Unknown
                    }
                } else if lt == ExpressionType::Number && rt == ExpressionType::Number {
                    ExpressionType::Number
                } else if unknown {
                    ExpressionType::Unknown
                } else {
                    self.err(bag, "E200", loc, "'+' requires numbers or at least one string operand");
                    ExpressionType::Unknown
                }
            }
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                if lt == ExpressionType::Number && rt == ExpressionType::Number {
                    ExpressionType::Number
                } else if unknown {
                    ExpressionType::Unknown
                } else {
                    self.err(bag, "E200", loc, format!("'{op}' requires number operands"));
                    ExpressionType::Unknown
                }
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                if unknown || lt == rt {
                    ExpressionType::Bool
                } else {
                    self.err(bag, "E200", loc, "cannot compare values of different types");
                    ExpressionType::Bool
                }
            }
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
                if unknown || (lt == ExpressionType::Number && rt == ExpressionType::Number) {
                    ExpressionType::Bool
                } else {
                    self.err(bag, "E200", loc, format!("'{op}' requires number operands"));
                    ExpressionType::Bool
                }
            }
            BinaryOp::And | BinaryOp::Or => {
                let ok = |t: ExpressionType| matches!(t, ExpressionType::Bool | ExpressionType::Number | ExpressionType::Unknown);
                if !ok(lt) || !ok(rt) {
                    self.err(bag, "E200", loc, format!("'{op}' requires boolean or number operands"));
                }
                ExpressionType::Bool
            }
        }
    }

    fn infer_unary(&mut self, op: UnaryOp, inner: &Expr, loc: Loc, bag: &mut DiagnosticBag) -> ExpressionType {
        let ty = self.check_expr(inner, bag);
        match op {
            UnaryOp::Neg | UnaryOp::Plus => {
                if matches!(ty, ExpressionType::Number | ExpressionType::Unknown) {
                    ExpressionType::Number
                } else {
                    self.err(bag, "E200", loc, "unary '+'/'-' requires a number");
                    ExpressionType::Unknown
                }
            }
            UnaryOp::Not => {
                if matches!(ty, ExpressionType::Bool | ExpressionType::Number | ExpressionType::Unknown) {
                    ExpressionType::Bool
                } else {
                    self.err(bag, "E200", loc, "'!' requires a boolean or number");
                    ExpressionType::Bool
                }
            }
            UnaryOp::Len => {
                if matches!(ty, ExpressionType::Array | ExpressionType::String | ExpressionType::Unknown) {
                    ExpressionType::Number
                } else {
                    self.err(bag, "E200", loc, "'#' requires an array or string");
                    ExpressionType::Number
                }
            }
        }
    }
}
