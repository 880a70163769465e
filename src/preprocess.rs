//! Source normalizer / preprocessor.
//!
//! Runs line by line over the raw source: CRLF normalization, shebang
//! stripping, comment stripping (respecting quoted spans), and directive
//! evaluation (`@if`/`@elif`/`@else`/`@end`, `@define`/`@undef`,
//! `@import`, `@raw`, `@warning`/`@error`) with a line-oriented scanning
//! style: no external regex for the core scan. A lightweight span tracker
//! carries `/* ... */` and `[[ ... ]]` state across line boundaries so a
//! `@`-prefixed line inside either is left as inert text rather than
//! dispatched as a directive.

use std::collections::HashMap;

use crate::diagnostics::{Diagnostic, DiagnosticBag};
use crate::error::{LashError, LashResult};

/// A sentinel marking a verbatim `@raw` line in the preprocessor's output.
/// Private-use codepoints so ordinary Lash source can never collide with it.
pub const RAW_LINE_SENTINEL: &str = "\u{E000}LASHRAW\u{E000}";

/// Resolves `@import "path"` targets relative to the importing file.
pub trait ImportResolver {
    fn read(&self, importing_file: Option<&str>, path: &str) -> LashResult<String>;
}

/// Reads import targets from the real filesystem.
pub struct FsImportResolver;

impl ImportResolver for FsImportResolver {
    fn read(&self, importing_file: Option<&str>, path: &str) -> LashResult<String> {
        let resolved = match importing_file.and_then(|f| std::path::Path::new(f).parent()) {
            Some(dir) if !path.starts_with('/') => dir.join(path),
            _ => std::path::PathBuf::from(path),
        };
        std::fs::read_to_string(&resolved).map_err(|source| LashError::Io { path: resolved, source })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum DirValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl DirValue {
    fn to_bool(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Str(s) => !s.is_empty(),
        }
    }

    fn canonical_string(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(n) => n.to_string(),
            Self::Str(s) => s.clone(),
        }
    }

    fn parse_literal(raw: &str) -> Self {
        if let Ok(n) = raw.parse::<i64>() {
            return Self::Int(n);
        }
        match raw {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => Self::Str(raw.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DirVal {
    Undefined,
    Known,
}

/// One value produced while evaluating a directive condition: either the
/// language-level "undefined" sentinel, or a concrete value.
#[derive(Debug, Clone, PartialEq)]
enum Eval {
    Undefined,
    Value(DirValue),
}

impl Eval {
    fn to_bool(&self) -> bool {
        match self {
            Self::Undefined => false,
            Self::Value(v) => v.to_bool(),
        }
    }
}

struct CondFrame {
    parent_active: bool,
    any_branch_matched: bool,
    is_active: bool,
    else_seen: bool,
    start_line: usize,
}

struct RawFrame {
    start_line: usize,
}

/// Lexical span a line may be sitting inside of, carried across lines so
/// `@` sequences inside a `/* ... */` comment or a `[[ ... ]]` multiline
/// literal are never mistaken for live directives (§4.1 directive context).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpanState {
    Normal,
    BlockComment,
    RawLiteral,
}

/// Scans `line` for the lexer's comment/string/raw-literal tokens and
/// returns the span state in effect at the end of it. Only tracks enough
/// to know whether a later line's leading `@` sits in directive context;
/// it does not need to be a full lexer.
fn scan_spans(mut state: SpanState, line: &str) -> SpanState {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match state {
            SpanState::RawLiteral => {
                if chars[i] == ']' && chars.get(i + 1) == Some(&']') {
                    state = SpanState::Normal;
                    i += 2;
                } else {
                    i += 1;
                }
            }
            SpanState::BlockComment => {
                if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                    state = SpanState::Normal;
                    i += 2;
                } else {
                    i += 1;
                }
            }
            SpanState::Normal => {
                if chars[i] == '"' {
                    i += 1;
                    while i < chars.len() && chars[i] != '"' {
                        if chars[i] == '\\' {
                            i += 1;
                        }
                        i += 1;
                    }
                    i += 1;
                } else if chars[i] == '/' && chars.get(i + 1) == Some(&'/') {
                    break;
                } else if chars[i] == '/' && chars.get(i + 1) == Some(&'*') {
                    state = SpanState::BlockComment;
                    i += 2;
                } else if chars[i] == '[' && chars.get(i + 1) == Some(&'[') {
                    state = SpanState::RawLiteral;
                    i += 2;
                } else {
                    i += 1;
                }
            }
        }
    }
    state
}

struct Preprocessor<'a> {
    symbols: HashMap<String, DirValue>,
    resolver: &'a dyn ImportResolver,
    file: Option<String>,
    bag_codes_seen: Vec<&'static str>,
    block_depth: usize,
    span_state: SpanState,
}

/// Runs the preprocessor over `src`, returning the transformed text.
/// Diagnostics (unknown directive, structural errors, `@warning`/`@error`)
/// are pushed to `bag`; fatal import IO failures are also reported as
/// diagnostics (E013) rather than propagated, since the pipeline always
/// continues to collect diagnostics across a phase (§7 propagation policy).
pub fn preprocess(
    src: &str,
    file: Option<&str>,
    resolver: &dyn ImportResolver,
    bag: &mut DiagnosticBag,
) -> String {
    let mut pp = Preprocessor {
        symbols: HashMap::new(),
        resolver,
        file: file.map(str::to_string),
        bag_codes_seen: Vec::new(),
        block_depth: 0,
        span_state: SpanState::Normal,
    };
    pp.run(src, bag)
}

impl<'a> Preprocessor<'a> {
    fn run(&mut self, src: &str, bag: &mut DiagnosticBag) -> String {
        let normalized = normalize(src);
        let mut cond_stack: Vec<CondFrame> = Vec::new();
        let mut raw_stack: Vec<RawFrame> = Vec::new();
        let mut out_lines: Vec<String> = Vec::new();

        for (idx, raw_line) in normalized.lines().enumerate() {
            let line_no = idx + 1;

            if !raw_stack.is_empty() {
                let trimmed = raw_line.trim_start();
                if trimmed.starts_with("@end") {
                    raw_stack.pop();
                    out_lines.push(String::new());
                    continue;
                }
                out_lines.push(format!("{RAW_LINE_SENTINEL}{raw_line}"));
                continue;
            }

            let active = cond_stack.iter().all(|f| f.is_active);
            let entering_span = self.span_state;
            self.span_state = scan_spans(self.span_state, raw_line);

            if entering_span != SpanState::Normal {
                // A line entered while already inside a block comment or a
                // [[ ... ]] literal is inert text, even if it starts with
                // '@' — directives only fire in directive context.
                out_lines.push(if active { raw_line.to_string() } else { String::new() });
                continue;
            }

            let trimmed = raw_line.trim_start();

            if trimmed.starts_with('@') {
                let emitted = self.directive(trimmed, line_no, active, &mut cond_stack, &mut raw_stack, bag);
                out_lines.push(emitted.unwrap_or_default());
                continue;
            }

            if !active {
                out_lines.push(String::new());
                continue;
            }

            self.track_block_depth(trimmed);
            out_lines.push(raw_line.to_string());
        }

        for frame in &cond_stack {
            self.err(bag, "E012", "unclosed '@if' block", frame.start_line);
        }
        for frame in &raw_stack {
            self.err(bag, "E012", "unclosed '@raw' block", frame.start_line);
        }

        out_lines.join("\n")
    }

    fn track_block_depth(&mut self, trimmed: &str) {
        let first_word = trimmed.split_whitespace().next().unwrap_or("");
        if matches!(first_word, "fn" | "if" | "for" | "while" | "switch" | "enum" | "subshell") {
            self.block_depth += 1;
        } else if first_word == "end" {
            self.block_depth = self.block_depth.saturating_sub(1);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn directive(
        &mut self,
        line: &str,
        line_no: usize,
        parent_active: bool,
        cond_stack: &mut Vec<CondFrame>,
        raw_stack: &mut Vec<RawFrame>,
        bag: &mut DiagnosticBag,
    ) -> Option<String> {
        let rest = &line[1..];
        let (name, arg) = match rest.find(char::is_whitespace) {
            Some(i) => (&rest[..i], rest[i..].trim_start()),
            None => (rest.trim_end(), ""),
        };

        match name {
            "if" => {
                if arg.is_empty() {
                    self.err(bag, "E011", "'@if' requires a condition", line_no);
                }
                let active = parent_active && self.eval_condition(arg, line_no, bag).to_bool();
                cond_stack.push(CondFrame {
                    parent_active,
                    any_branch_matched: active,
                    is_active: active,
                    else_seen: false,
                    start_line: line_no,
                });
                None
            }
            "elif" => {
                let Some(frame) = cond_stack.last_mut() else {
                    self.err(bag, "E012", "'@elif' without matching '@if'", line_no);
                    return None;
                };
                if frame.else_seen {
                    self.err(bag, "E012", "'@elif' after '@else'", line_no);
                }
                if arg.is_empty() {
                    self.err(bag, "E011", "'@elif' requires a condition", line_no);
                }
                let parent = frame.parent_active;
                let already = frame.any_branch_matched;
                let cond = self.eval_condition(arg, line_no, bag).to_bool();
                let frame = cond_stack.last_mut().unwrap();
                frame.is_active = parent && !already && cond;
                frame.any_branch_matched |= frame.is_active;
                None
            }
            "else" => {
                let Some(frame) = cond_stack.last_mut() else {
                    self.err(bag, "E012", "'@else' without matching '@if'", line_no);
                    return None;
                };
                if frame.else_seen {
                    self.err(bag, "E012", "duplicate '@else'", line_no);
                }
                frame.else_seen = true;
                frame.is_active = frame.parent_active && !frame.any_branch_matched;
                frame.any_branch_matched |= frame.is_active;
                None
            }
            "end" => {
                if cond_stack.pop().is_none() {
                    self.err(bag, "E012", "'@end' without matching '@if'", line_no);
                }
                None
            }
            "define" => {
                if !parent_active {
                    return None;
                }
                self.define(arg, line_no, bag);
                None
            }
            "undef" => {
                if !parent_active {
                    return None;
                }
                let name = arg.trim();
                if !is_valid_symbol_name(name) {
                    self.err(bag, "E011", format!("invalid symbol name '{name}'"), line_no);
                } else {
                    self.symbols.remove(name);
                }
                None
            }
            "import" => {
                if !parent_active {
                    return None;
                }
                Some(self.import(arg, line_no, bag))
            }
            "raw" => {
                if !arg.is_empty() {
                    self.err(bag, "E015", "'@raw' takes no argument; did you mean a bare '@raw'?", line_no);
                }
                if parent_active {
                    raw_stack.push(RawFrame { start_line: line_no });
                }
                Some(String::new())
            }
            "warning" => {
                if parent_active {
                    bag.push(Diagnostic::warning("W500", arg.to_string(), line_no, 0));
                }
                None
            }
            "error" => {
                if parent_active {
                    bag.push(Diagnostic::error("E011", arg.to_string(), line_no, 0));
                }
                None
            }
            other => {
                self.err(bag, "E010", format!("unknown directive '@{other}'"), line_no);
                None
            }
        }
    }

    fn define(&mut self, arg: &str, line_no: usize, bag: &mut DiagnosticBag) {
        let (name, value) = match arg.split_once('=') {
            Some((n, v)) => (n.trim(), v.trim().to_string()),
            None => match arg.split_once(char::is_whitespace) {
                Some((n, v)) => (n.trim(), v.trim().to_string()),
                None => (arg.trim(), String::new()),
            },
        };
        if !is_valid_symbol_name(name) {
            self.err(bag, "E011", format!("invalid symbol name '{name}'"), line_no);
            return;
        }
        let value = if value.is_empty() { DirValue::Bool(true) } else { DirValue::parse_literal(&value) };
        self.symbols.insert(name.to_string(), value);
    }

    fn import(&mut self, arg: &str, line_no: usize, bag: &mut DiagnosticBag) -> String {
        if self.block_depth > 0 {
            self.err(bag, "E014", "'@import' is not allowed inside a runtime block", line_no);
            return String::new();
        }
        let Some((path, tail)) = parse_quoted_path(arg) else {
            self.err(bag, "E011", "'@import' expects a quoted path", line_no);
            return String::new();
        };

        let content = match self.resolver.read(self.file.as_deref(), &path) {
            Ok(c) => c,
            Err(e) => {
                self.err(bag, "E013", format!("cannot import '{path}': {e}"), line_no);
                return String::new();
            }
        };
        let normalized = normalize(&content);

        let tail = tail.trim();
        if tail.is_empty() {
            let mut sub_bag = DiagnosticBag::new();
            let spliced = preprocess(&normalized, Some(&path), self.resolver, &mut sub_bag);
            for d in sub_bag.iter() {
                bag.push(d.clone());
            }
            return spliced;
        }

        let tail = tail.strip_prefix("into").map(str::trim).unwrap_or(tail);
        let (binding, name) = if let Some(n) = tail.strip_prefix("let").map(str::trim) {
            ("let", n)
        } else if let Some(n) = tail.strip_prefix("const").map(str::trim) {
            ("const", n)
        } else {
            ("let", tail)
        };
        if !is_valid_symbol_name(name) {
            self.err(bag, "E011", format!("invalid import target name '{name}'"), line_no);
            return String::new();
        }
        format!("{binding} {name} = [[{normalized}]]")
    }

    fn eval_condition(&mut self, expr: &str, line_no: usize, bag: &mut DiagnosticBag) -> Eval {
        let mut parser = CondExprParser::new(expr);
        match parser.parse_expr() {
            Ok(val) => {
                if !parser.at_end() {
                    self.err(bag, "E011", "trailing tokens in '@if' condition", line_no);
                }
                self.resolve(val)
            }
            Err(msg) => {
                self.err(bag, "E011", msg, line_no);
                Eval::Undefined
            }
        }
    }

    fn resolve(&self, node: CondNode) -> Eval {
        match node {
            CondNode::True => Eval::Value(DirValue::Bool(true)),
            CondNode::False => Eval::Value(DirValue::Bool(false)),
            CondNode::Int(n) => Eval::Value(DirValue::Int(n)),
            CondNode::Str(s) => Eval::Value(DirValue::Str(s)),
            CondNode::Defined(name) => Eval::Value(DirValue::Bool(self.symbols.contains_key(&name))),
            CondNode::Ident(name) => match self.symbols.get(&name) {
                Some(v) => Eval::Value(v.clone()),
                None => Eval::Undefined,
            },
            CondNode::Not(inner) => Eval::Value(DirValue::Bool(!self.resolve(*inner).to_bool())),
            CondNode::And(l, r) => {
                Eval::Value(DirValue::Bool(self.resolve(*l).to_bool() && self.resolve(*r).to_bool()))
            }
            CondNode::Or(l, r) => {
                Eval::Value(DirValue::Bool(self.resolve(*l).to_bool() || self.resolve(*r).to_bool()))
            }
            CondNode::Eq(l, r) => Eval::Value(DirValue::Bool(self.values_equal(*l, *r))),
            CondNode::Ne(l, r) => Eval::Value(DirValue::Bool(!self.values_equal(*l, *r))),
        }
    }

    fn values_equal(&self, l: CondNode, r: CondNode) -> bool {
        let l = self.resolve(l);
        let r = self.resolve(r);
        match (&l, &r) {
            (Eval::Undefined, Eval::Undefined) => true,
            (Eval::Undefined, _) | (_, Eval::Undefined) => false,
            (Eval::Value(DirValue::Int(a)), Eval::Value(DirValue::Int(b))) => a == b,
            (Eval::Value(DirValue::Str(a)), Eval::Value(DirValue::Str(b))) => a == b,
            (Eval::Value(DirValue::Bool(a)), Eval::Value(DirValue::Bool(b))) => a == b,
            (Eval::Value(a), Eval::Value(b)) => a.canonical_string() == b.canonical_string(),
        }
    }

    fn err(&mut self, bag: &mut DiagnosticBag, code: &'static str, message: impl Into<String>, line_no: usize) {
        self.bag_codes_seen.push(code);
        bag.push(Diagnostic::error(code, message, line_no, 0));
    }
}

fn is_valid_symbol_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().is_some_and(|c| c == '_' || c.is_alphabetic())
        && s.chars().all(|c| c == '_' || c.is_alphanumeric())
}

fn parse_quoted_path(arg: &str) -> Option<(String, &str)> {
    let arg = arg.trim_start();
    let rest = arg.strip_prefix('"')?;
    let end = rest.find('"')?;
    Some((rest[..end].to_string(), &rest[end + 1..]))
}

/// CRLF -> LF, strip a leading shebang line while keeping the newline so
/// line numbers in diagnostics still match the original source (§4.1).
pub fn normalize(src: &str) -> String {
    let lf = src.replace("\r\n", "\n").replace('\r', "\n");
    if let Some(rest) = lf.strip_prefix("#!") {
        match rest.find('\n') {
            Some(i) => rest[i..].trim_start_matches('\n').to_string(),
            None => String::new(),
        }
    } else {
        lf
    }
}

// ---------------------------------------------------------------------------
// Directive condition mini-parser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum CondNode {
    True,
    False,
    Int(i64),
    Str(String),
    Ident(String),
    Defined(String),
    Not(Box<CondNode>),
    And(Box<CondNode>, Box<CondNode>),
    Or(Box<CondNode>, Box<CondNode>),
    Eq(Box<CondNode>, Box<CondNode>),
    Ne(Box<CondNode>, Box<CondNode>),
}

struct CondExprParser<'a> {
    chars: Vec<char>,
    pos: usize,
    _src: &'a str,
}

impl<'a> CondExprParser<'a> {
    fn new(src: &'a str) -> Self {
        Self { chars: src.chars().collect(), pos: 0, _src: src }
    }

    fn at_end(&mut self) -> bool {
        self.skip_ws();
        self.pos >= self.chars.len()
    }

    fn skip_ws(&mut self) {
        while matches!(self.chars.get(self.pos), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.get(self.pos).copied()
    }

    fn starts_with(&mut self, s: &str) -> bool {
        self.skip_ws();
        let sc: Vec<char> = s.chars().collect();
        sc.iter().enumerate().all(|(i, c)| self.chars.get(self.pos + i) == Some(c))
    }

    fn consume(&mut self, n: usize) {
        self.pos += n;
    }

    fn parse_expr(&mut self) -> Result<CondNode, String> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<CondNode, String> {
        let mut left = self.parse_and()?;
        loop {
            if self.starts_with("||") {
                self.consume(2);
                let right = self.parse_and()?;
                left = CondNode::Or(Box::new(left), Box::new(right));
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<CondNode, String> {
        let mut left = self.parse_equality()?;
        loop {
            if self.starts_with("&&") {
                self.consume(2);
                let right = self.parse_equality()?;
                left = CondNode::And(Box::new(left), Box::new(right));
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<CondNode, String> {
        let left = self.parse_unary()?;
        if self.starts_with("==") {
            self.consume(2);
            let right = self.parse_unary()?;
            return Ok(CondNode::Eq(Box::new(left), Box::new(right)));
        }
        if self.starts_with("!=") {
            self.consume(2);
            let right = self.parse_unary()?;
            return Ok(CondNode::Ne(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<CondNode, String> {
        if self.peek() == Some('!') {
            self.consume(1);
            let inner = self.parse_unary()?;
            return Ok(CondNode::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<CondNode, String> {
        self.skip_ws();
        match self.peek() {
            Some('(') => {
                self.consume(1);
                let inner = self.parse_expr()?;
                self.skip_ws();
                if self.peek() != Some(')') {
                    return Err("expected ')' in '@if' condition".to_string());
                }
                self.consume(1);
                Ok(inner)
            }
            Some('"') => {
                self.consume(1);
                let mut s = String::new();
                loop {
                    match self.chars.get(self.pos) {
                        None => return Err("unterminated string in '@if' condition".to_string()),
                        Some('"') => {
                            self.consume(1);
                            break;
                        }
                        Some(c) => {
                            s.push(*c);
                            self.consume(1);
                        }
                    }
                }
                Ok(CondNode::Str(s))
            }
            Some(c) if c.is_ascii_digit() => {
                let mut s = String::new();
                while matches!(self.chars.get(self.pos), Some(c) if c.is_ascii_digit()) {
                    s.push(self.chars[self.pos]);
                    self.consume(1);
                }
                s.parse::<i64>().map(CondNode::Int).map_err(|_| "invalid number in condition".to_string())
            }
            Some(c) if c == '_' || c.is_alphabetic() => {
                let mut s = String::new();
                while matches!(self.chars.get(self.pos), Some(c) if c.is_alphanumeric() || *c == '_') {
                    s.push(self.chars[self.pos]);
                    self.consume(1);
                }
                match s.as_str() {
                    "true" => Ok(CondNode::True),
                    "false" => Ok(CondNode::False),
                    "defined" => {
                        self.skip_ws();
                        if self.peek() != Some('(') {
                            return Err("expected '(' after 'defined'".to_string());
                        }
                        self.consume(1);
                        self.skip_ws();
                        let mut name = String::new();
                        while matches!(self.chars.get(self.pos), Some(c) if c.is_alphanumeric() || *c == '_') {
                            name.push(self.chars[self.pos]);
                            self.consume(1);
                        }
                        self.skip_ws();
                        if self.peek() != Some(')') {
                            return Err("expected ')' after 'defined(NAME'".to_string());
                        }
                        self.consume(1);
                        Ok(CondNode::Defined(name))
                    }
                    _ => Ok(CondNode::Ident(s)),
                }
            }
            Some(c) => Err(format!("unexpected character '{c}' in '@if' condition")),
            None => Err("missing condition".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopResolver;
    impl ImportResolver for NoopResolver {
        fn read(&self, _importing_file: Option<&str>, _path: &str) -> LashResult<String> {
            Err(LashError::Internal("no imports in this test".into()))
        }
    }

    fn run(src: &str) -> (String, DiagnosticBag) {
        let mut bag = DiagnosticBag::new();
        let out = preprocess(src, None, &NoopResolver, &mut bag);
        (out, bag)
    }

    #[test]
    fn strips_shebang_keeping_line_numbers() {
        let (out, bag) = run("#!/usr/bin/env lash\nlet x = 1\n");
        assert!(!bag.has_errors());
        assert_eq!(out.lines().nth(1).unwrap(), "let x = 1");
    }

    #[test]
    fn normalizes_crlf() {
        assert_eq!(normalize("a\r\nb\r\n"), "a\nb\n");
    }

    #[test]
    fn if_true_keeps_branch() {
        let (out, bag) = run("@if true\nlet x = 1\n@else\nlet x = 2\n@end\n");
        assert!(!bag.has_errors());
        assert!(out.contains("let x = 1"));
        assert!(!out.contains("let x = 2"));
    }

    #[test]
    fn if_false_takes_else() {
        let (out, bag) = run("@if false\nlet x = 1\n@else\nlet x = 2\n@end\n");
        assert!(!bag.has_errors());
        assert!(out.contains("let x = 2"));
    }

    #[test]
    fn defined_checks_symbol_table() {
        let (out, _) = run("@define FOO\n@if defined(FOO)\nlet x = 1\n@end\n");
        assert!(out.contains("let x = 1"));
    }

    #[test]
    fn undefined_symbol_is_falsy_and_self_equal() {
        let (out, bag) = run("@if BAR == BAR\nlet x = 1\n@end\n");
        assert!(!bag.has_errors());
        assert!(out.contains("let x = 1"));
    }

    #[test]
    fn elif_after_else_is_an_error() {
        let (_, bag) = run("@if false\n@else\n@elif true\n@end\n");
        assert!(bag.errors().any(|d| d.code == "E012"));
    }

    #[test]
    fn unknown_directive_reports_e010() {
        let (_, bag) = run("@bogus\n");
        assert!(bag.errors().any(|d| d.code == "E010"));
    }

    #[test]
    fn raw_block_is_sentineled_verbatim() {
        let (out, bag) = run("@raw\nrm -rf /tmp/x\n@end\n");
        assert!(!bag.has_errors());
        assert!(out.contains(&format!("{RAW_LINE_SENTINEL}rm -rf /tmp/x")));
    }

    #[test]
    fn unclosed_if_reports_structural_error() {
        let (_, bag) = run("@if true\nlet x = 1\n");
        assert!(bag.errors().any(|d| d.code == "E012"));
    }

    #[test]
    fn raw_with_trailing_argument_reports_e015() {
        let (_, bag) = run("@raw oops\nrm -rf /tmp/x\n@end\n");
        assert!(bag.errors().any(|d| d.code == "E015"));
    }

    #[test]
    fn directive_inside_block_comment_is_inert() {
        let (out, bag) = run("/* @if FOO\n@end */\nlet x = 1\n");
        assert!(!bag.has_errors());
        assert!(out.contains("let x = 1"));
    }

    #[test]
    fn directive_inside_raw_literal_is_inert() {
        let (out, bag) = run("let x = [[\n@if y\n]]\nlet z = 2\n");
        assert!(!bag.has_errors());
        assert!(out.contains("@if y"));
        assert!(out.contains("let z = 2"));
    }
}
