//! Recursive-descent parser for Lash.
//!
//! A `Parser { tokens, pos }` cursor over a flat token vector, no
//! backtracking combinator library. Expression precedence is climbed by
//! hand (`parse_or` -> `parse_and` -> ... -> `parse_unary` ->
//! `parse_postfix` -> `parse_primary`) rather than a generic Pratt table.
//!
//! A line that does not fit any Lash production is not a parse error: it
//! is lowered to an opaque `CommandStmt` (or, mid-pipeline, `ExprKind::Raw`)
//! carrying the original source text verbatim. This is the "bare command
//! rewriting" rule, and it is why the parser carries the preprocessed
//! source text alongside the token stream — reconstructing the verbatim
//! fragment requires slicing the original line, not reprinting tokens.

use crate::ast::*;
use crate::diagnostics::DiagnosticBag;
use crate::lexer::{Token, TokenKind};

const MAX_PARSE_ITERATIONS: usize = 200_000;

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    next_node_id: NodeId,
    lines: Vec<&'a str>,
    iterations: usize,
}

/// Parses a full program. Syntax errors are pushed into `bag` as `E001`
/// diagnostics; the parser resynchronizes at the next newline and keeps
/// going, so a single pass can surface more than one error.
pub fn parse(tokens: Vec<Token>, source: &str, bag: &mut DiagnosticBag) -> Program {
    let mut parser = Parser {
        tokens,
        pos: 0,
        next_node_id: 0,
        lines: source.lines().collect(),
        iterations: 0,
    };
    let statements = parser.parse_block(&[TokenKind::Eof], bag);
    Program { statements }
}

impl<'a> Parser<'a> {
    fn alloc_id(&mut self) -> NodeId {
        let id = self.next_node_id;
        self.next_node_id += 1;
        id
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let i = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[i]
    }

    fn kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn loc(&self) -> Loc {
        self.peek().loc
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_newlines(&mut self) {
        while self.at(TokenKind::Newline) {
            self.advance();
        }
    }

    /// Slices verbatim source text between two locations (used to rebuild
    /// bare-command / glob-pattern fragments). Falls back to a trimmed
    /// multi-line join if the span crosses lines, which is rare for the
    /// single-line constructs this is used for.
    fn slice(&self, from: Loc, to: Loc) -> String {
        if from.line == to.line {
            let line = self.lines.get(from.line - 1).copied().unwrap_or("");
            let end = to.column.min(line.len());
            let start = from.column.min(end);
            return line.get(start..end).unwrap_or("").trim().to_string();
        }
        let mut out = String::new();
        for l in from.line..=to.line {
            if let Some(text) = self.lines.get(l - 1) {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out.trim().to_string()
    }

    /// Verbatim text of the current logical line from `from` up to (not
    /// including) the next newline/EOF.
    fn slice_to_eol(&self, from: Loc) -> String {
        let line = self.lines.get(from.line - 1).copied().unwrap_or("");
        line.get(from.column.min(line.len())..).unwrap_or("").trim().to_string()
    }

    fn err(&mut self, bag: &mut DiagnosticBag, code: &'static str, message: impl Into<String>) {
        let loc = self.loc();
        bag.push(crate::diagnostics::Diagnostic::error(code, message, loc.line, loc.column));
    }

    /// Skips tokens until a statement boundary (`Newline`/`Eof`) or one of
    /// `stop` is reached — used to resynchronize after a syntax error.
    fn recover(&mut self, stop: &[TokenKind]) {
        while !self.at(TokenKind::Newline)
            && !self.at(TokenKind::Eof)
            && !stop.contains(&self.kind())
        {
            self.advance();
        }
    }

    // -------------------------------------------------------------------
    // Statement sequences
    // -------------------------------------------------------------------

    fn parse_block(&mut self, terminators: &[TokenKind], bag: &mut DiagnosticBag) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            self.iterations += 1;
            if self.iterations > MAX_PARSE_ITERATIONS {
                self.err(bag, "E001", "parser exceeded maximum iteration budget");
                break;
            }
            if terminators.contains(&self.kind()) || self.at(TokenKind::Eof) {
                break;
            }
            if let Some(stmt) = self.parse_statement(bag) {
                stmts.push(stmt);
            }
        }
        stmts
    }

    /// Parses a block, then requires the closing `end` keyword. Reports a
    /// structural error naming the opening keyword/line if EOF is hit first.
    fn parse_ended_block(
        &mut self,
        opener: &str,
        opener_line: usize,
        bag: &mut DiagnosticBag,
    ) -> Vec<Stmt> {
        let body = self.parse_block(&[TokenKind::End], bag);
        if self.at(TokenKind::End) {
            self.advance();
        } else {
            self.err(
                bag,
                "E001",
                format!(
                    "unexpected end of file: missing 'end' to close '{opener}' opened at line {opener_line}"
                ),
            );
        }
        body
    }

    fn parse_statement(&mut self, bag: &mut DiagnosticBag) -> Option<Stmt> {
        let start = self.loc();
        let kind = match self.kind() {
            TokenKind::Global => self.parse_global(bag),
            TokenKind::Let | TokenKind::Const => self.parse_var_decl(false, bag),
            TokenKind::Fn => self.parse_fn_decl(bag),
            TokenKind::Enum => self.parse_enum_decl(bag),
            TokenKind::If => self.parse_if(bag),
            TokenKind::Switch => self.parse_switch(bag),
            TokenKind::For => self.parse_for(bag),
            TokenKind::While => self.parse_while(bag),
            TokenKind::Until => self.parse_until(bag),
            TokenKind::Return => self.parse_return(bag),
            TokenKind::Shift => self.parse_shift(bag),
            TokenKind::Subshell => self.parse_subshell(bag),
            TokenKind::Wait => self.parse_wait(bag),
            TokenKind::Break => {
                self.advance();
                Some(StmtKind::Break)
            }
            TokenKind::Continue => {
                self.advance();
                Some(StmtKind::Continue)
            }
            TokenKind::Sh => self.parse_sh(bag),
            TokenKind::Trap => self.parse_trap(bag),
            TokenKind::Untrap => self.parse_untrap(bag),
            TokenKind::Test => self.parse_test(bag),
            _ => self.parse_assignment_or_expr(bag),
        }?;
        let end = self.loc();
        Some(Stmt::new(Span::new(start, end), kind))
    }

    // -------------------------------------------------------------------
    // Declarations
    // -------------------------------------------------------------------

    fn parse_global(&mut self, bag: &mut DiagnosticBag) -> Option<StmtKind> {
        self.advance(); // global
        match self.kind() {
            TokenKind::Let | TokenKind::Const => self.parse_var_decl(true, bag),
            _ => self.parse_assignment(true, bag),
        }
    }

    fn parse_var_decl(&mut self, is_global: bool, bag: &mut DiagnosticBag) -> Option<StmtKind> {
        let decl_kind = if self.eat(TokenKind::Let) {
            DeclKind::Let
        } else if self.eat(TokenKind::Const) {
            DeclKind::Const
        } else {
            self.err(bag, "E001", "expected 'let' or 'const'");
            self.recover(&[]);
            return None;
        };
        let name = self.expect_identifier(bag)?;
        let value = if self.eat(TokenKind::Assign) {
            Some(self.parse_expr(bag)?)
        } else {
            None
        };
        Some(StmtKind::VariableDeclaration(VariableDecl {
            kind: decl_kind,
            is_global,
            name,
            value,
        }))
    }

    fn expect_identifier(&mut self, bag: &mut DiagnosticBag) -> Option<String> {
        if self.at(TokenKind::Identifier) {
            Some(self.advance().text)
        } else {
            self.err(bag, "E001", format!("expected identifier, found {:?}", self.kind()));
            self.recover(&[]);
            None
        }
    }

    fn parse_fn_decl(&mut self, bag: &mut DiagnosticBag) -> Option<StmtKind> {
        let opener_line = self.loc().line;
        self.advance(); // fn
        let name = self.expect_identifier(bag)?;
        let mut params = Vec::new();
        if self.eat(TokenKind::LParen) {
            while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
                let pname = self.expect_identifier(bag)?;
                let default = if self.eat(TokenKind::Assign) {
                    Some(self.parse_expr(bag)?)
                } else {
                    None
                };
                params.push(Param { name: pname, default });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            if !self.eat(TokenKind::RParen) {
                self.err(bag, "E001", "expected ')' after parameter list");
            }
        }
        let body = self.parse_ended_block("fn", opener_line, bag);
        Some(StmtKind::FunctionDeclaration(FunctionDecl { name, params, body }))
    }

    fn parse_enum_decl(&mut self, bag: &mut DiagnosticBag) -> Option<StmtKind> {
        let opener_line = self.loc().line;
        self.advance(); // enum
        let name = self.expect_identifier(bag)?;
        let mut members = Vec::new();
        self.skip_newlines();
        while self.at(TokenKind::Identifier) {
            members.push(self.advance().text);
            self.skip_newlines();
        }
        if self.at(TokenKind::End) {
            self.advance();
        } else {
            self.err(
                bag,
                "E001",
                format!("unexpected end of file: missing 'end' to close 'enum' opened at line {opener_line}"),
            );
        }
        Some(StmtKind::EnumDeclaration(EnumDecl { name, members }))
    }

    // -------------------------------------------------------------------
    // Control flow
    // -------------------------------------------------------------------

    fn parse_if(&mut self, bag: &mut DiagnosticBag) -> Option<StmtKind> {
        let opener_line = self.loc().line;
        self.advance(); // if
        let mut clauses = Vec::new();
        let cond = self.parse_expr(bag)?;
        let body = self.parse_block(&[TokenKind::Elif, TokenKind::Else, TokenKind::End], bag);
        clauses.push(IfClause { condition: cond, body });
        while self.at(TokenKind::Elif) {
            self.advance();
            let cond = self.parse_expr(bag)?;
            let body = self.parse_block(&[TokenKind::Elif, TokenKind::Else, TokenKind::End], bag);
            clauses.push(IfClause { condition: cond, body });
        }
        let else_branch = if self.eat(TokenKind::Else) {
            Some(self.parse_block(&[TokenKind::End], bag))
        } else {
            None
        };
        if self.at(TokenKind::End) {
            self.advance();
        } else {
            self.err(
                bag,
                "E001",
                format!("unexpected end of file: missing 'end' to close 'if' opened at line {opener_line}"),
            );
        }
        Some(StmtKind::If(IfStmt { clauses, else_branch }))
    }

    fn parse_switch(&mut self, bag: &mut DiagnosticBag) -> Option<StmtKind> {
        let opener_line = self.loc().line;
        self.advance(); // switch
        let scrutinee = self.parse_expr(bag)?;
        self.skip_newlines();
        let mut cases = Vec::new();
        while self.at(TokenKind::Case) {
            self.advance();
            let pattern = self.parse_expr(bag)?;
            self.eat(TokenKind::Colon);
            let body = self.parse_block(&[TokenKind::Case, TokenKind::End], bag);
            cases.push(SwitchCase { pattern, body });
        }
        if self.at(TokenKind::End) {
            self.advance();
        } else {
            self.err(
                bag,
                "E001",
                format!("unexpected end of file: missing 'end' to close 'switch' opened at line {opener_line}"),
            );
        }
        Some(StmtKind::Switch(SwitchStmt { scrutinee, cases }))
    }

    fn parse_for(&mut self, bag: &mut DiagnosticBag) -> Option<StmtKind> {
        let opener_line = self.loc().line;
        self.advance(); // for
        let variable = self.expect_identifier(bag)?;
        if !self.eat(TokenKind::In) {
            self.err(bag, "E001", "expected 'in' in 'for' loop");
        }
        let iterable = self.parse_for_iterable(bag)?;
        let step = if self.eat(TokenKind::Step) { Some(self.parse_expr(bag)?) } else { None };
        let body = self.parse_ended_block("for", opener_line, bag);
        Some(StmtKind::For(ForStmt { variable, iterable, step, body }))
    }

    fn parse_for_iterable(&mut self, bag: &mut DiagnosticBag) -> Option<ForIterable> {
        let start = self.loc();
        let checkpoint = self.pos;
        match self.try_parse_expr() {
            Some(first) if self.at(TokenKind::DotDot) => {
                self.advance();
                let end = self.parse_expr(bag)?;
                Some(ForIterable::Range { start: first, end })
            }
            Some(e) if self.at(TokenKind::Step) || self.at(TokenKind::Newline) || self.at(TokenKind::Eof) => {
                Some(ForIterable::Expr(e))
            }
            _ => {
                self.pos = checkpoint;
                let boundary = self.find_line_boundary(&[TokenKind::Step]);
                let text = self.slice(start, boundary);
                self.pos = self.index_of_loc(boundary);
                Some(ForIterable::Glob(text))
            }
        }
    }

    fn parse_while(&mut self, bag: &mut DiagnosticBag) -> Option<StmtKind> {
        let opener_line = self.loc().line;
        self.advance();
        let condition = self.parse_expr(bag)?;
        let body = self.parse_ended_block("while", opener_line, bag);
        Some(StmtKind::While(WhileStmt { condition, body }))
    }

    fn parse_until(&mut self, bag: &mut DiagnosticBag) -> Option<StmtKind> {
        let opener_line = self.loc().line;
        self.advance();
        let condition = self.parse_expr(bag)?;
        let body = self.parse_ended_block("until", opener_line, bag);
        Some(StmtKind::Until(UntilStmt { condition, body }))
    }

    fn parse_return(&mut self, bag: &mut DiagnosticBag) -> Option<StmtKind> {
        self.advance();
        let value = if self.at(TokenKind::Newline) || self.at(TokenKind::Eof) {
            None
        } else {
            Some(self.parse_expr(bag)?)
        };
        Some(StmtKind::Return(ReturnStmt { value }))
    }

    fn parse_shift(&mut self, bag: &mut DiagnosticBag) -> Option<StmtKind> {
        self.advance();
        let amount = if self.at(TokenKind::Newline) || self.at(TokenKind::Eof) {
            None
        } else {
            Some(self.parse_expr(bag)?)
        };
        Some(StmtKind::Shift(ShiftStmt { amount }))
    }

    fn parse_into_capture(&mut self) -> Option<IntoCapture> {
        if !self.eat(TokenKind::Into) {
            return None;
        }
        let mode = if self.eat(TokenKind::Let) {
            BindingMode::Let
        } else if self.eat(TokenKind::Const) {
            BindingMode::Const
        } else {
            BindingMode::Auto
        };
        let name = if self.at(TokenKind::Identifier) { self.advance().text } else { String::new() };
        Some(IntoCapture { mode, name })
    }

    fn parse_subshell(&mut self, bag: &mut DiagnosticBag) -> Option<StmtKind> {
        let opener_line = self.loc().line;
        self.advance();
        let into = self.parse_into_capture();
        let body = self.parse_block(&[TokenKind::End], bag);
        if self.at(TokenKind::End) {
            self.advance();
        } else {
            self.err(
                bag,
                "E001",
                format!("unexpected end of file: missing 'end' to close 'subshell' opened at line {opener_line}"),
            );
        }
        let run_in_background = self.eat(TokenKind::Amp);
        Some(StmtKind::Subshell(SubshellStmt { into, run_in_background, body }))
    }

    fn parse_wait(&mut self, bag: &mut DiagnosticBag) -> Option<StmtKind> {
        self.advance();
        let target = if self.eat(TokenKind::Jobs) {
            WaitTarget::Jobs
        } else if self.at(TokenKind::Into) || self.at(TokenKind::Newline) || self.at(TokenKind::Eof) {
            WaitTarget::Default
        } else {
            WaitTarget::Target(self.parse_expr(bag)?)
        };
        let into = self.parse_into_capture();
        Some(StmtKind::Wait(WaitStmt { target, into }))
    }

    fn parse_sh(&mut self, bag: &mut DiagnosticBag) -> Option<StmtKind> {
        self.advance();
        let expr = self.parse_expr(bag)?;
        Some(StmtKind::Shell(ShellStmt { expr }))
    }

    fn parse_trap(&mut self, bag: &mut DiagnosticBag) -> Option<StmtKind> {
        self.advance();
        let handler = self.parse_postfix(bag)?;
        let mut signals = Vec::new();
        while self.at(TokenKind::Identifier) {
            signals.push(self.advance().text);
        }
        if signals.is_empty() {
            self.err(bag, "E001", "expected at least one signal name after 'trap'");
        }
        Some(StmtKind::Trap(TrapStmt { handler, signals }))
    }

    fn parse_untrap(&mut self, bag: &mut DiagnosticBag) -> Option<StmtKind> {
        self.advance();
        let mut signals = Vec::new();
        while self.at(TokenKind::Identifier) {
            signals.push(self.advance().text);
        }
        if signals.is_empty() {
            self.err(bag, "E001", "expected at least one signal name after 'untrap'");
        }
        Some(StmtKind::Untrap(UntrapStmt { signals }))
    }

    fn parse_test(&mut self, bag: &mut DiagnosticBag) -> Option<StmtKind> {
        self.advance();
        let mut args = Vec::new();
        while !self.at(TokenKind::Newline) && !self.at(TokenKind::Eof) {
            args.push(self.parse_postfix(bag)?);
        }
        Some(StmtKind::Test(TestStmt { args }))
    }

    // -------------------------------------------------------------------
    // Assignment / expression statements / bare commands
    // -------------------------------------------------------------------

    fn parse_assignment_or_expr(&mut self, bag: &mut DiagnosticBag) -> Option<StmtKind> {
        if self.looks_like_assignment() {
            return self.parse_assignment(false, bag);
        }
        self.parse_command_or_expr_stmt(bag)
    }

    fn looks_like_assignment(&self) -> bool {
        if !self.at(TokenKind::Identifier) {
            return false;
        }
        if matches!(self.peek_at(1).kind, TokenKind::Assign | TokenKind::PlusAssign) {
            return true;
        }
        matches!(self.peek_at(1).kind, TokenKind::LBracket)
            && self.find_matching_assign_after_index()
    }

    fn find_matching_assign_after_index(&self) -> bool {
        let mut i = self.pos + 1;
        if self.tokens.get(i).map(|t| t.kind) != Some(TokenKind::LBracket) {
            return false;
        }
        let mut depth = 0;
        loop {
            match self.tokens.get(i).map(|t| t.kind) {
                Some(TokenKind::LBracket) => depth += 1,
                Some(TokenKind::RBracket) => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                Some(TokenKind::Newline) | Some(TokenKind::Eof) | None => return false,
                _ => {}
            }
            i += 1;
        }
        matches!(
            self.tokens.get(i + 1).map(|t| t.kind),
            Some(TokenKind::Assign) | Some(TokenKind::PlusAssign)
        )
    }

    fn parse_assignment(&mut self, is_global: bool, bag: &mut DiagnosticBag) -> Option<StmtKind> {
        let name = self.expect_identifier(bag)?;
        let target = if self.eat(TokenKind::LBracket) {
            let index = self.parse_expr(bag)?;
            if !self.eat(TokenKind::RBracket) {
                self.err(bag, "E001", "expected ']' after index expression");
            }
            AssignTarget::Index { name, index }
        } else {
            AssignTarget::Identifier(name)
        };
        let operator = if self.eat(TokenKind::PlusAssign) {
            AssignOp::AddAssign
        } else if self.eat(TokenKind::Assign) {
            AssignOp::Assign
        } else {
            self.err(bag, "E001", "expected '=' or '+=' in assignment");
            return None;
        };
        let value = self.parse_expr(bag)?;
        Some(StmtKind::Assignment(Assignment { is_global, operator, target, value }))
    }

    /// The catch-all production: tries a structured pipeline/expression
    /// first; if it does not cleanly consume the whole logical line, the
    /// line is a bare shell command instead.
    fn parse_command_or_expr_stmt(&mut self, bag: &mut DiagnosticBag) -> Option<StmtKind> {
        let start = self.loc();

        if self.at(TokenKind::RawLine) {
            let text = self.advance().text;
            return Some(StmtKind::Command(CommandStmt { script: text, is_raw_literal: false }));
        }

        if self.at(TokenKind::RawString) {
            let text = self.advance().text;
            return Some(StmtKind::Command(CommandStmt { script: text, is_raw_literal: true }));
        }

        let checkpoint = self.pos;
        if let Some(expr) = self.try_parse_command_expr() {
            if self.at(TokenKind::Newline) || self.at(TokenKind::Eof) {
                return Some(StmtKind::Expression(expr));
            }
        }
        self.pos = checkpoint;
        let boundary = self.find_line_boundary(&[]);
        let text = self.slice(start, boundary);
        self.pos = self.index_of_loc(boundary);
        if text.is_empty() {
            // A lone stray token: consume it so we make forward progress.
            self.advance();
            return None;
        }
        Some(StmtKind::Command(CommandStmt { script: text, is_raw_literal: false }))
    }

    /// Position of the first token at or after `loc` — used after slicing
    /// a raw fragment by source location to resynchronize the cursor.
    fn index_of_loc(&self, loc: Loc) -> usize {
        for (i, t) in self.tokens.iter().enumerate().skip(self.pos.saturating_sub(1)) {
            if t.loc.line > loc.line || (t.loc.line == loc.line && t.loc.column >= loc.column) {
                return i;
            }
        }
        self.tokens.len() - 1
    }

    fn find_line_boundary(&self, extra_stops: &[TokenKind]) -> Loc {
        let mut i = self.pos;
        while i < self.tokens.len() {
            let k = self.tokens[i].kind;
            if k == TokenKind::Newline || k == TokenKind::Eof || extra_stops.contains(&k) {
                return self.tokens[i].loc;
            }
            i += 1;
        }
        self.tokens.last().map(|t| t.loc).unwrap_or_default()
    }

    /// A full pipeline expression (one or more `|`-joined stages) with
    /// optional trailing redirections, used as the RHS of an expression
    /// statement. Returns `None` (without diagnostics) on structural
    /// failure so the caller can fall back to bare-command text.
    fn try_parse_command_expr(&mut self) -> Option<Expr> {
        let start = self.loc();
        let mut stages = vec![self.parse_pipeline_stage()?];
        while self.at(TokenKind::Pipe) {
            self.advance();
            stages.push(self.parse_pipeline_stage()?);
        }
        let mut expr = if stages.len() == 1 {
            stages.pop().unwrap()
        } else {
            let end = self.loc();
            let id = self.alloc_id();
            Expr::new(id, Span::new(start, end), ExprKind::Pipe(stages))
        };
        let mut redirects = Vec::new();
        while let Some(r) = self.try_parse_redirect() {
            redirects.push(r);
        }
        if !redirects.is_empty() {
            let end = self.loc();
            let id = self.alloc_id();
            expr = Expr::new(id, Span::new(start, end), ExprKind::Redirect(Box::new(expr), redirects));
        }
        Some(expr)
    }

    /// One pipeline stage: a structured expression if the tokens fit one
    /// cleanly up to the next `|`/redirect/newline, else the verbatim
    /// source text of the stage (`ExprKind::Raw`).
    fn parse_pipeline_stage(&mut self) -> Option<Expr> {
        let start = self.loc();
        let checkpoint = self.pos;
        if let Some(e) = self.try_parse_expr() {
            if matches!(
                self.kind(),
                TokenKind::Pipe | TokenKind::Newline | TokenKind::Eof
            ) || self.is_at_redirect()
            {
                return Some(e);
            }
        }
        self.pos = checkpoint;
        let boundary = self.find_line_boundary(&[TokenKind::Pipe]);
        let text = self.slice(start, boundary);
        self.pos = self.index_of_loc(boundary);
        if text.is_empty() {
            return None;
        }
        let id = self.alloc_id();
        Some(Expr::new(id, Span::new(start, boundary), ExprKind::Raw(text)))
    }

    fn is_at_redirect(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::DGreat
                | TokenKind::Fd2DGreat
                | TokenKind::AmpDGreat
                | TokenKind::Fd2Great
                | TokenKind::AmpGreat
                | TokenKind::LessGreat
                | TokenKind::TLess
                | TokenKind::DLess
                | TokenKind::Gt
                | TokenKind::Lt
        ) || (self.at(TokenKind::Integer) && matches!(self.peek_at(1).kind, TokenKind::Gt | TokenKind::Lt))
    }

    // -------------------------------------------------------------------
    // Redirections
    // -------------------------------------------------------------------

    fn try_parse_redirect(&mut self) -> Option<RedirectSpec> {
        // n>&m / n>&- : Integer Gt Amp (Integer | Minus)
        if self.at(TokenKind::Integer)
            && self.peek_at(1).kind == TokenKind::Gt
            && self.peek_at(2).kind == TokenKind::Amp
        {
            let fd: i32 = self.advance().text.parse().unwrap_or(0);
            self.advance(); // >
            self.advance(); // &
            if self.eat(TokenKind::Minus) {
                return Some(RedirectSpec {
                    fd: Some(fd),
                    both: false,
                    operator: RedirectOp::FdClose,
                    target: None,
                    dup_fd: None,
                });
            }
            if self.at(TokenKind::Integer) {
                let dup_fd: i32 = self.advance().text.parse().unwrap_or(0);
                return Some(RedirectSpec {
                    fd: Some(fd),
                    both: false,
                    operator: RedirectOp::FdDup,
                    target: None,
                    dup_fd: Some(dup_fd),
                });
            }
            return None;
        }

        let (operator, fd, both) = match self.kind() {
            TokenKind::DGreat => (RedirectOp::Append, None, false),
            TokenKind::Fd2DGreat => (RedirectOp::Append, Some(2), false),
            TokenKind::AmpDGreat => (RedirectOp::Append, None, true),
            TokenKind::Gt => (RedirectOp::Write, None, false),
            TokenKind::Fd2Great => (RedirectOp::Write, Some(2), false),
            TokenKind::AmpGreat => (RedirectOp::Write, None, true),
            TokenKind::LessGreat => (RedirectOp::ReadWrite, None, false),
            TokenKind::TLess => (RedirectOp::HereString, None, false),
            TokenKind::DLess => (RedirectOp::Heredoc, None, false),
            TokenKind::Lt => (RedirectOp::Read, None, false),
            _ => return None,
        };
        self.advance();
        let target = self.parse_postfix(&mut DiagnosticBag::new())?;
        Some(RedirectSpec { fd, both, operator, target: Some(Box::new(target)), dup_fd: None })
    }

    // -------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------

    fn parse_expr(&mut self, bag: &mut DiagnosticBag) -> Option<Expr> {
        let checkpoint = self.pos;
        if let Some(e) = self.try_parse_expr() {
            return Some(e);
        }
        self.pos = checkpoint;
        self.err(bag, "E001", format!("expected expression, found {:?}", self.kind()));
        self.recover(&[]);
        None
    }

    /// Attempts a full expression parse without emitting diagnostics;
    /// returns `None` on any structural mismatch so callers can fall back
    /// to the bare-command/glob-pattern textual rules.
    fn try_parse_expr(&mut self) -> Option<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Option<Expr> {
        let start = self.loc();
        let mut lhs = self.parse_and()?;
        while self.at(TokenKind::OrOr) {
            self.advance();
            let rhs = self.parse_and()?;
            let id = self.alloc_id();
            let end = self.loc();
            lhs = Expr::new(id, Span::new(start, end), ExprKind::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs)));
        }
        Some(lhs)
    }

    fn parse_and(&mut self) -> Option<Expr> {
        let start = self.loc();
        let mut lhs = self.parse_equality()?;
        while self.at(TokenKind::AndAnd) {
            self.advance();
            let rhs = self.parse_equality()?;
            let id = self.alloc_id();
            let end = self.loc();
            lhs = Expr::new(id, Span::new(start, end), ExprKind::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs)));
        }
        Some(lhs)
    }

    fn parse_equality(&mut self) -> Option<Expr> {
        let start = self.loc();
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match self.kind() {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::Ne,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_comparison()?;
            let id = self.alloc_id();
            let end = self.loc();
            lhs = Expr::new(id, Span::new(start, end), ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)));
        }
        Some(lhs)
    }

    fn parse_comparison(&mut self) -> Option<Expr> {
        let start = self.loc();
        let mut lhs = self.parse_range()?;
        loop {
            let op = match self.kind() {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::LtEq => BinaryOp::Le,
                TokenKind::GtEq => BinaryOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_range()?;
            let id = self.alloc_id();
            let end = self.loc();
            lhs = Expr::new(id, Span::new(start, end), ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)));
        }
        Some(lhs)
    }

    fn parse_range(&mut self) -> Option<Expr> {
        let start = self.loc();
        let lhs = self.parse_additive()?;
        if self.at(TokenKind::DotDot) {
            self.advance();
            let rhs = self.parse_additive()?;
            let id = self.alloc_id();
            let end = self.loc();
            return Some(Expr::new(id, Span::new(start, end), ExprKind::Range(Box::new(lhs), Box::new(rhs))));
        }
        Some(lhs)
    }

    fn parse_additive(&mut self) -> Option<Expr> {
        let start = self.loc();
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            let id = self.alloc_id();
            let end = self.loc();
            lhs = Expr::new(id, Span::new(start, end), ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)));
        }
        Some(lhs)
    }

    fn parse_multiplicative(&mut self) -> Option<Expr> {
        let start = self.loc();
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            let id = self.alloc_id();
            let end = self.loc();
            lhs = Expr::new(id, Span::new(start, end), ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)));
        }
        Some(lhs)
    }

    fn parse_unary(&mut self) -> Option<Expr> {
        let start = self.loc();
        let op = match self.kind() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Hash => Some(UnaryOp::Len),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            let id = self.alloc_id();
            let end = self.loc();
            return Some(Expr::new(id, Span::new(start, end), ExprKind::Unary(op, Box::new(operand))));
        }
        self.parse_postfix(&mut DiagnosticBag::new())
    }

    fn parse_postfix(&mut self, bag: &mut DiagnosticBag) -> Option<Expr> {
        let start = self.loc();
        let mut expr = self.parse_primary(bag)?;
        loop {
            if self.at(TokenKind::LBracket) {
                self.advance();
                let index = self.parse_or()?;
                if !self.eat(TokenKind::RBracket) {
                    return None;
                }
                let id = self.alloc_id();
                let end = self.loc();
                expr = Expr::new(id, Span::new(start, end), ExprKind::Index(Box::new(expr), Box::new(index)));
                continue;
            }
            break;
        }
        Some(expr)
    }

    fn parse_primary(&mut self, bag: &mut DiagnosticBag) -> Option<Expr> {
        let start = self.loc();
        match self.kind() {
            TokenKind::Integer => {
                let text = self.advance().text;
                let value = text.parse::<i64>().ok()?;
                let id = self.alloc_id();
                Some(Expr::new(
                    id,
                    Span::point(start),
                    ExprKind::Literal(LiteralExpr {
                        value: LiteralValue::Int(value),
                        is_interpolated: false,
                        is_multiline: false,
                    }),
                ))
            }
            TokenKind::Str => {
                let text = self.advance().text;
                let id = self.alloc_id();
                Some(Expr::new(
                    id,
                    Span::point(start),
                    ExprKind::Literal(LiteralExpr {
                        value: LiteralValue::Str(text),
                        is_interpolated: false,
                        is_multiline: false,
                    }),
                ))
            }
            TokenKind::InterpString => {
                let text = self.advance().text;
                let id = self.alloc_id();
                Some(Expr::new(
                    id,
                    Span::point(start),
                    ExprKind::Literal(LiteralExpr {
                        value: LiteralValue::Str(text),
                        is_interpolated: true,
                        is_multiline: false,
                    }),
                ))
            }
            TokenKind::RawString => {
                let text = self.advance().text;
                let id = self.alloc_id();
                Some(Expr::new(
                    id,
                    Span::point(start),
                    ExprKind::Literal(LiteralExpr {
                        value: LiteralValue::Str(text),
                        is_interpolated: false,
                        is_multiline: true,
                    }),
                ))
            }
            TokenKind::True | TokenKind::False => {
                let val = self.advance().kind == TokenKind::True;
                let id = self.alloc_id();
                Some(Expr::new(
                    id,
                    Span::point(start),
                    ExprKind::Literal(LiteralExpr {
                        value: LiteralValue::Bool(val),
                        is_interpolated: false,
                        is_multiline: false,
                    }),
                ))
            }
            TokenKind::Null => {
                self.advance();
                let id = self.alloc_id();
                Some(Expr::new(id, Span::point(start), ExprKind::Null))
            }
            TokenKind::DollarSh => {
                self.advance();
                let inner = self.parse_postfix(bag)?;
                let id = self.alloc_id();
                let end = self.loc();
                Some(Expr::new(id, Span::new(start, end), ExprKind::ShellCapture(Box::new(inner))))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_or()?;
                if !self.eat(TokenKind::RParen) {
                    self.err(bag, "E001", "expected ')'");
                    return None;
                }
                Some(inner)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !self.at(TokenKind::RBracket) && !self.at(TokenKind::Eof) {
                    items.push(self.parse_or()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                if !self.eat(TokenKind::RBracket) {
                    self.err(bag, "E001", "expected ']' to close array literal");
                    return None;
                }
                let id = self.alloc_id();
                let end = self.loc();
                Some(Expr::new(id, Span::new(start, end), ExprKind::Array(items)))
            }
            TokenKind::Identifier => {
                let name = self.advance().text;
                if self.at(TokenKind::LParen) {
                    self.advance();
                    let mut args = Vec::new();
                    while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
                        args.push(self.parse_or()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                    if !self.eat(TokenKind::RParen) {
                        self.err(bag, "E001", "expected ')' after call arguments");
                        return None;
                    }
                    let id = self.alloc_id();
                    let end = self.loc();
                    return Some(Expr::new(id, Span::new(start, end), ExprKind::Call(name, args)));
                }
                if self.at(TokenKind::ColonColon) {
                    self.advance();
                    let member = self.expect_identifier(bag)?;
                    let id = self.alloc_id();
                    let end = self.loc();
                    return Some(Expr::new(id, Span::new(start, end), ExprKind::EnumAccess(name, member)));
                }
                let id = self.alloc_id();
                Some(Expr::new(id, Span::point(start), ExprKind::Identifier(name)))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticBag;

    fn parse_src(src: &str) -> (Program, DiagnosticBag) {
        let mut bag = DiagnosticBag::new();
        let tokens = crate::lexer::tokenize(src).unwrap();
        let program = parse(tokens, src, &mut bag);
        (program, bag)
    }

    #[test]
    fn parses_let_declaration() {
        let (program, bag) = parse_src("let x = 1\n");
        assert!(!bag.has_errors());
        assert_eq!(program.statements.len(), 1);
        match &program.statements[0].kind {
            StmtKind::VariableDeclaration(d) => {
                assert_eq!(d.name, "x");
                assert_eq!(d.kind, DeclKind::Let);
                assert!(d.value.is_some());
            }
            other => panic!("expected VariableDeclaration, got {other:?}"),
        }
    }

    #[test]
    fn parses_if_elif_else() {
        let (program, bag) = parse_src("if 1\n  let a = 1\nelif 2\n  let b = 2\nelse\n  let c = 3\nend\n");
        assert!(!bag.has_errors());
        match &program.statements[0].kind {
            StmtKind::If(s) => {
                assert_eq!(s.clauses.len(), 2);
                assert!(s.else_branch.is_some());
            }
            other => panic!("expected If, got {other:?}"),
        }
    }

    #[test]
    fn parses_function_with_default_param() {
        let (program, bag) = parse_src("fn greet(name = \"world\")\n  return name\nend\n");
        assert!(!bag.has_errors());
        match &program.statements[0].kind {
            StmtKind::FunctionDeclaration(f) => {
                assert_eq!(f.name, "greet");
                assert_eq!(f.params.len(), 1);
                assert!(f.params[0].default.is_some());
            }
            other => panic!("expected FunctionDeclaration, got {other:?}"),
        }
    }

    #[test]
    fn unrecognized_expression_falls_back_to_bare_command() {
        let (program, bag) = parse_src("echo hello world\n");
        assert!(!bag.has_errors());
        match &program.statements[0].kind {
            StmtKind::Command(c) => assert!(c.script.contains("echo")),
            other => panic!("expected Command fallback, got {other:?}"),
        }
    }

    #[test]
    fn missing_end_is_a_parse_error() {
        let (_program, bag) = parse_src("if 1\n  let a = 1\n");
        assert!(bag.has_errors());
    }
}
