//! Lexer for Lash scripts.
//!
//! Tokenizes preprocessed source into a flat `Vec<Token>` via a plain
//! character-cursor scan, with no external regex dependency for the core
//! token grammar.

use std::fmt;

use crate::ast::Loc;
use crate::preprocess::RAW_LINE_SENTINEL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Eof,

    Identifier,
    Integer,
    // A plain (non-interpolated) string literal, already escape-decoded.
    Str,
    // $"..." interpolated string literal, already escape-decoded.
    InterpString,
    // [[ ... ]] raw multiline string, content preserved verbatim.
    RawString,

    // Keywords
    Global,
    Let,
    Const,
    Fn,
    End,
    Enum,
    If,
    Elif,
    Else,
    Switch,
    Case,
    For,
    In,
    Step,
    While,
    Until,
    Return,
    Shift,
    Subshell,
    Into,
    Wait,
    Jobs,
    Break,
    Continue,
    Sh,
    Trap,
    Untrap,
    Test,
    True,
    False,
    Null,

    // Punctuation & operators
    Assign,     // =
    PlusAssign, // +=
    EqEq,       // ==
    NotEq,      // !=
    Lt,         // <
    Gt,         // >
    LtEq,       // <=
    GtEq,       // >=
    AndAnd,     // &&
    OrOr,       // ||
    DotDot,     // ..
    Plus,       // +
    Minus,      // -
    Star,       // *
    Slash,      // /
    Percent,    // %
    Bang,       // !
    Hash,       // #
    ColonColon, // ::
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Pipe,
    Semicolon,
    Newline,

    // Redirections
    DGreat,    // >>
    Fd2DGreat, // 2>>
    AmpDGreat, // &>>
    Fd2Great,  // 2>
    AmpGreat,  // &>
    LessGreat, // <>
    TLess,     // <<<
    DLess,     // <<
    Amp,       // & (background marker, fd-dup/fd-close operand)

    DollarSh, // $sh (expression-level shell capture)
    Dot,      // . — appears only inside bare shell-command fragments
    /// A single character outside the Lash token grammar (e.g. `~`, `@`,
    /// `\`). Never rejected at the lexer stage — bare shell-like lines are
    /// made of these plus Identifier/Integer/Str runs, and it is the
    /// parser's job (not the lexer's) to decide such a line is opaque
    /// command text rather than a malformed Lash expression.
    Other,
    /// A whole source line, already stripped of the preprocessor's
    /// `RAW_LINE_SENTINEL` marker, carried through verbatim from an
    /// `@raw` block.
    RawLine,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub loc: Loc,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:?})", self.kind, self.text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub loc: Loc,
}

fn keyword(word: &str) -> Option<TokenKind> {
    Some(match word {
        "global" => TokenKind::Global,
        "let" => TokenKind::Let,
        "const" => TokenKind::Const,
        "fn" => TokenKind::Fn,
        "end" => TokenKind::End,
        "enum" => TokenKind::Enum,
        "if" => TokenKind::If,
        "elif" => TokenKind::Elif,
        "else" => TokenKind::Else,
        "switch" => TokenKind::Switch,
        "case" => TokenKind::Case,
        "for" => TokenKind::For,
        "in" => TokenKind::In,
        "step" => TokenKind::Step,
        "while" => TokenKind::While,
        "until" => TokenKind::Until,
        "return" => TokenKind::Return,
        "shift" => TokenKind::Shift,
        "subshell" => TokenKind::Subshell,
        "into" => TokenKind::Into,
        "wait" => TokenKind::Wait,
        "jobs" => TokenKind::Jobs,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "sh" => TokenKind::Sh,
        "trap" => TokenKind::Trap,
        "untrap" => TokenKind::Untrap,
        "test" => TokenKind::Test,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        _ => return None,
    })
}

pub struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    src: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
            line: 1,
            column: 0,
            src,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn loc(&self) -> Loc {
        Loc::new(self.line, self.column)
    }

    fn starts_with(&self, s: &str) -> bool {
        let sc: Vec<char> = s.chars().collect();
        for (i, c) in sc.iter().enumerate() {
            if self.peek_at(i) != Some(*c) {
                return false;
            }
        }
        true
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            let start = self.loc();
            let Some(c) = self.peek() else {
                tokens.push(Token { kind: TokenKind::Eof, text: String::new(), loc: start });
                break;
            };

            if c == '\n' {
                self.advance();
                tokens.push(Token { kind: TokenKind::Newline, text: "\n".into(), loc: start });
                continue;
            }

            if self.starts_with(RAW_LINE_SENTINEL) {
                for _ in 0..RAW_LINE_SENTINEL.chars().count() {
                    self.advance();
                }
                let mut text = String::new();
                while self.peek().is_some() && self.peek() != Some('\n') {
                    text.push(self.advance().unwrap());
                }
                tokens.push(Token { kind: TokenKind::RawLine, text, loc: start });
                continue;
            }

            if c.is_ascii_digit() {
                tokens.push(self.lex_number(start));
                continue;
            }

            if c == '_' || c.is_alphabetic() {
                tokens.push(self.lex_identifier(start));
                continue;
            }

            if c == '"' {
                tokens.push(self.lex_string(start, false)?);
                continue;
            }

            if c == '$' && self.peek_at(1) == Some('"') {
                self.advance();
                tokens.push(self.lex_string(start, true)?);
                continue;
            }

            if self.starts_with("$sh") && !matches!(self.peek_at(3), Some(c) if c.is_alphanumeric() || c == '_') {
                self.advance();
                self.advance();
                self.advance();
                tokens.push(Token { kind: TokenKind::DollarSh, text: "$sh".into(), loc: start });
                continue;
            }

            if self.starts_with("[[") {
                tokens.push(self.lex_raw_string(start)?);
                continue;
            }

            tokens.push(self.lex_operator(start));
        }
        Ok(tokens)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while matches!(self.peek(), Some(' ') | Some('\t') | Some('\r')) {
                self.advance();
            }
            if self.starts_with("//") {
                while self.peek().is_some() && self.peek() != Some('\n') {
                    self.advance();
                }
                continue;
            }
            if self.starts_with("/*") {
                self.advance();
                self.advance();
                while self.peek().is_some() && !self.starts_with("*/") {
                    self.advance();
                }
                self.advance();
                self.advance();
                continue;
            }
            break;
        }
    }

    fn lex_number(&mut self, start: Loc) -> Token {
        let mut text = String::new();
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            text.push(self.advance().unwrap());
        }
        Token { kind: TokenKind::Integer, text, loc: start }
    }

    fn lex_identifier(&mut self, start: Loc) -> Token {
        let mut text = String::new();
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            text.push(self.advance().unwrap());
        }
        let kind = keyword(&text).unwrap_or(TokenKind::Identifier);
        Token { kind, text, loc: start }
    }

    fn lex_escape(&mut self) -> char {
        match self.advance() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('\\') => '\\',
            Some('"') => '"',
            Some('$') => '$',
            Some('0') => '\0',
            Some(other) => other,
            None => '\\',
        }
    }

    fn lex_string(&mut self, start: Loc, interpolated: bool) -> Result<Token, LexError> {
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(LexError {
                        message: "unterminated string literal".into(),
                        loc: start,
                    })
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    value.push(self.lex_escape());
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
        Ok(Token {
            kind: if interpolated { TokenKind::InterpString } else { TokenKind::Str },
            text: value,
            loc: start,
        })
    }

    fn lex_raw_string(&mut self, start: Loc) -> Result<Token, LexError> {
        self.advance();
        self.advance(); // consume [[
        let mut value = String::new();
        loop {
            if self.starts_with("]]") {
                self.advance();
                self.advance();
                break;
            }
            match self.advance() {
                None => {
                    return Err(LexError {
                        message: "unterminated [[ ... ]] literal".into(),
                        loc: start,
                    })
                }
                Some(c) => value.push(c),
            }
        }
        Ok(Token { kind: TokenKind::RawString, text: value, loc: start })
    }

    fn lex_operator(&mut self, start: Loc) -> Token {
        // fd-prefixed redirections: a bare digit run immediately preceding
        // `>` / `<` is only meaningful as a redirection fd; the parser
        // recognizes `2` followed directly by `>`/`>>` via lookahead on
        // plain Integer tokens, so here we only special-case the common
        // `2>`, `2>>` spellings when the whole token is unambiguous.
        macro_rules! tok {
            ($kind:expr, $len:expr) => {{
                let mut text = String::new();
                for _ in 0..$len {
                    text.push(self.advance().unwrap());
                }
                return Token { kind: $kind, text, loc: start };
            }};
        }

        if self.starts_with("2>>") {
            tok!(TokenKind::Fd2DGreat, 3);
        }
        if self.starts_with("&>>") {
            tok!(TokenKind::AmpDGreat, 3);
        }
        if self.starts_with("2>") {
            tok!(TokenKind::Fd2Great, 2);
        }
        if self.starts_with("&>") {
            tok!(TokenKind::AmpGreat, 2);
        }
        if self.starts_with("<<<") {
            tok!(TokenKind::TLess, 3);
        }
        if self.starts_with("<<") {
            tok!(TokenKind::DLess, 2);
        }
        if self.starts_with("<>") {
            tok!(TokenKind::LessGreat, 2);
        }
        if self.starts_with(">>") {
            tok!(TokenKind::DGreat, 2);
        }
        if self.starts_with("::") {
            tok!(TokenKind::ColonColon, 2);
        }
        if self.starts_with("..") {
            tok!(TokenKind::DotDot, 2);
        }
        if self.starts_with("==") {
            tok!(TokenKind::EqEq, 2);
        }
        if self.starts_with("!=") {
            tok!(TokenKind::NotEq, 2);
        }
        if self.starts_with("<=") {
            tok!(TokenKind::LtEq, 2);
        }
        if self.starts_with(">=") {
            tok!(TokenKind::GtEq, 2);
        }
        if self.starts_with("&&") {
            tok!(TokenKind::AndAnd, 2);
        }
        if self.starts_with("||") {
            tok!(TokenKind::OrOr, 2);
        }
        if self.starts_with("+=") {
            tok!(TokenKind::PlusAssign, 2);
        }

        let c = self.advance().unwrap();
        let kind = match c {
            '=' => TokenKind::Assign,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '!' => TokenKind::Bang,
            '#' => TokenKind::Hash,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '|' => TokenKind::Pipe,
            '&' => TokenKind::Amp,
            ';' => TokenKind::Semicolon,
            '.' => TokenKind::Dot,
            _ => TokenKind::Other,
        };
        Token { kind, text: c.to_string(), loc: start }
    }
}

pub fn tokenize(src: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(src).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_keywords_and_identifiers() {
        let toks = tokenize("let x = 1").unwrap();
        let kinds: Vec<_> = toks.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![TokenKind::Let, TokenKind::Identifier, TokenKind::Assign, TokenKind::Integer, TokenKind::Eof]
        );
    }

    #[test]
    fn lexes_interpolated_string() {
        let toks = tokenize(r#"$"Hi {name}""#).unwrap();
        assert_eq!(toks[0].kind, TokenKind::InterpString);
        assert_eq!(toks[0].text, "Hi {name}");
    }

    #[test]
    fn lexes_raw_multiline_string() {
        let toks = tokenize("[[\nhello\nworld\n]]").unwrap();
        assert_eq!(toks[0].kind, TokenKind::RawString);
        assert_eq!(toks[0].text, "\nhello\nworld\n");
    }

    #[test]
    fn lexes_redirection_operators() {
        let toks = tokenize(">> 2>> &>> 2> &> < <> <<< <<").unwrap();
        let kinds: Vec<_> = toks.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::DGreat,
                TokenKind::Fd2DGreat,
                TokenKind::AmpDGreat,
                TokenKind::Fd2Great,
                TokenKind::AmpGreat,
                TokenKind::Lt,
                TokenKind::LessGreat,
                TokenKind::TLess,
                TokenKind::DLess,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn skips_comments() {
        let toks = tokenize("let x = 1 // comment\nlet y = /* block */ 2").unwrap();
        let kinds: Vec<_> = toks.iter().map(|t| t.kind).collect();
        assert!(!kinds.contains(&TokenKind::Slash));
    }

    #[test]
    fn reports_unterminated_string() {
        let err = tokenize("\"abc").unwrap_err();
        assert!(err.message.contains("unterminated"));
    }
}
