//! Lexer for the MyLang programming language
//!
//! Transforms source code into a flat stream of tokens. Lexical errors do not
//! stop the scan: each one is recorded and the lexer keeps going, so a single
//! pass reports every problem in the file.

use crate::error::{SyntaxError, SyntaxErrorCode};
use lazy_static::lazy_static;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

/// Token types for the MyLang language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    // Literals
    String,
    Int,
    Float,
    Identifier,
    Nil,
    Boolean,

    // Keywords
    Var,
    Func,
    Async,
    Await,
    Return,
    If,
    Else,
    For,
    In,
    While,
    Break,
    Continue,
    Match,
    Case,
    Default,
    Enum,
    Import,
    Export,
    Throw,
    Defer,
    Try,
    Catch,
    Finally,
    As,
    Const,
    Readonly,

    // Operators
    Plus,         // +
    Minus,        // -
    Star,         // *
    Slash,        // /
    Percent,      // %
    Increment,    // ++
    Decrement,    // --
    Assign,       // =
    PlusAssign,   // +=
    MinusAssign,  // -=
    StarAssign,   // *=
    SlashAssign,  // /=
    Equal,        // ==
    NotEqual,     // !=
    Less,         // <
    LessEqual,    // <=
    Greater,      // >
    GreaterEqual, // >=
    And,          // &&
    Or,           // ||
    Not,          // !
    Question,     // ?
    Ellipsis,     // ...

    // Structural
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Dot,
    Semicolon,
    Colon,

    EndOf,
}

impl TokenKind {
    /// True for the keyword kinds; these may still be used as property names
    pub fn is_keyword(&self) -> bool {
        KEYWORDS.values().any(|k| k == self)
    }
}

lazy_static! {
    static ref KEYWORDS: HashMap<&'static str, TokenKind> = {
        let mut m = HashMap::new();
        m.insert("var", TokenKind::Var);
        m.insert("func", TokenKind::Func);
        m.insert("async", TokenKind::Async);
        m.insert("await", TokenKind::Await);
        m.insert("return", TokenKind::Return);
        m.insert("if", TokenKind::If);
        m.insert("else", TokenKind::Else);
        m.insert("for", TokenKind::For);
        m.insert("in", TokenKind::In);
        m.insert("while", TokenKind::While);
        m.insert("break", TokenKind::Break);
        m.insert("continue", TokenKind::Continue);
        m.insert("match", TokenKind::Match);
        m.insert("case", TokenKind::Case);
        m.insert("default", TokenKind::Default);
        m.insert("enum", TokenKind::Enum);
        m.insert("import", TokenKind::Import);
        m.insert("export", TokenKind::Export);
        m.insert("throw", TokenKind::Throw);
        m.insert("defer", TokenKind::Defer);
        m.insert("try", TokenKind::Try);
        m.insert("catch", TokenKind::Catch);
        m.insert("finally", TokenKind::Finally);
        m.insert("as", TokenKind::As);
        m.insert("const", TokenKind::Const);
        m.insert("readonly", TokenKind::Readonly);
        m.insert("nil", TokenKind::Nil);
        m.insert("true", TokenKind::Boolean);
        m.insert("false", TokenKind::Boolean);
        m
    };
}

/// 1-based source location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Position { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A token with position information
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub position: Position,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, position: Position) -> Self {
        Token {
            kind,
            value: value.into(),
            position,
        }
    }
}

/// Result of a full lexical pass
#[derive(Debug, Clone)]
pub struct LexOutput {
    pub tokens: Vec<Token>,
    pub errors: Vec<SyntaxError>,
}

impl LexOutput {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Convenience wrapper around [`Lexer::analyze`]
pub fn analyze(source: &str) -> LexOutput {
    Lexer::analyze(source)
}

/// Lexer for tokenizing MyLang source code
pub struct Lexer<'a> {
    source: Peekable<Chars<'a>>,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    errors: Vec<SyntaxError>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source: source.chars().peekable(),
            line: 1,
            column: 1,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Scan the whole source, collecting tokens and errors
    pub fn analyze(source: &str) -> LexOutput {
        let mut lexer = Lexer::new(source);
        lexer.run();
        log::trace!(
            "lexed {} tokens with {} errors",
            lexer.tokens.len(),
            lexer.errors.len()
        );
        LexOutput {
            tokens: lexer.tokens,
            errors: lexer.errors,
        }
    }

    fn run(&mut self) {
        loop {
            self.skip_whitespace();
            let start = self.position();
            let Some(ch) = self.advance() else {
                break;
            };
            self.scan_token(ch, start);
        }
        let end = self.position();
        self.tokens.push(Token::new(TokenKind::EndOf, "", end));
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.source.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn peek(&mut self) -> Option<&char> {
        self.source.peek()
    }

    fn peek_is(&mut self, expected: char) -> bool {
        self.peek() == Some(&expected)
    }

    /// Character after the next one, without consuming anything
    fn peek_second(&self) -> Option<char> {
        let mut chars = self.source.clone();
        chars.next();
        chars.next()
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek_is(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn push(&mut self, kind: TokenKind, value: impl Into<String>, position: Position) {
        self.tokens.push(Token::new(kind, value, position));
    }

    fn error(&mut self, code: SyntaxErrorCode, message: impl Into<String>, position: Position) {
        self.errors.push(SyntaxError::new(code, message, position));
    }

    fn skip_whitespace(&mut self) {
        while let Some(&ch) = self.peek() {
            match ch {
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance();
                }
                '/' if self.peek_second() == Some('/') => {
                    while let Some(&ch) = self.peek() {
                        if ch == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => return,
            }
        }
    }

    fn scan_token(&mut self, ch: char, start: Position) {
        match ch {
            '"' | '\'' => self.scan_string(ch, start),
            '0'..='9' => self.scan_number(ch, start),
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                self.scan_identifier(ch, start)
            }

            '+' => {
                if self.match_char('+') {
                    self.push(TokenKind::Increment, "++", start)
                } else if self.match_char('=') {
                    self.push(TokenKind::PlusAssign, "+=", start)
                } else {
                    self.push(TokenKind::Plus, "+", start)
                }
            }
            '-' => {
                if self.match_char('-') {
                    self.push(TokenKind::Decrement, "--", start)
                } else if self.match_char('=') {
                    self.push(TokenKind::MinusAssign, "-=", start)
                } else {
                    self.push(TokenKind::Minus, "-", start)
                }
            }
            '*' => {
                if self.match_char('=') {
                    self.push(TokenKind::StarAssign, "*=", start)
                } else {
                    self.push(TokenKind::Star, "*", start)
                }
            }
            '/' => {
                if self.match_char('=') {
                    self.push(TokenKind::SlashAssign, "/=", start)
                } else {
                    self.push(TokenKind::Slash, "/", start)
                }
            }
            '%' => self.push(TokenKind::Percent, "%", start),
            '=' => {
                if self.match_char('=') {
                    self.push(TokenKind::Equal, "==", start)
                } else {
                    self.push(TokenKind::Assign, "=", start)
                }
            }
            '!' => {
                if self.match_char('=') {
                    self.push(TokenKind::NotEqual, "!=", start)
                } else {
                    self.push(TokenKind::Not, "!", start)
                }
            }
            '<' => {
                if self.match_char('=') {
                    self.push(TokenKind::LessEqual, "<=", start)
                } else {
                    self.push(TokenKind::Less, "<", start)
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.push(TokenKind::GreaterEqual, ">=", start)
                } else {
                    self.push(TokenKind::Greater, ">", start)
                }
            }
            '&' => {
                if self.match_char('&') {
                    self.push(TokenKind::And, "&&", start)
                } else {
                    self.unexpected('&', start)
                }
            }
            '|' => {
                if self.match_char('|') {
                    self.push(TokenKind::Or, "||", start)
                } else {
                    self.unexpected('|', start)
                }
            }
            '?' => self.push(TokenKind::Question, "?", start),
            '.' => {
                if self.peek_is('.') && self.peek_second() == Some('.') {
                    self.advance();
                    self.advance();
                    self.push(TokenKind::Ellipsis, "...", start)
                } else {
                    self.push(TokenKind::Dot, ".", start)
                }
            }

            '(' => self.push(TokenKind::LeftParen, "(", start),
            ')' => self.push(TokenKind::RightParen, ")", start),
            '{' => self.push(TokenKind::LeftBrace, "{", start),
            '}' => self.push(TokenKind::RightBrace, "}", start),
            '[' => self.push(TokenKind::LeftBracket, "[", start),
            ']' => self.push(TokenKind::RightBracket, "]", start),
            ',' => self.push(TokenKind::Comma, ",", start),
            ';' => self.push(TokenKind::Semicolon, ";", start),
            ':' => self.push(TokenKind::Colon, ":", start),

            other => self.unexpected(other, start),
        }
    }

    fn unexpected(&mut self, ch: char, start: Position) {
        self.error(
            SyntaxErrorCode::InvalidUnexpectedToken,
            format!("Invalid or unexpected token '{}'", ch),
            start,
        );
    }

    fn scan_string(&mut self, quote: char, start: Position) {
        let mut value = String::new();

        loop {
            match self.advance() {
                Some(ch) if ch == quote => break,
                Some(ch) => value.push(ch),
                None => {
                    self.error(
                        SyntaxErrorCode::UnterminatedStringLiteral,
                        "Unterminated string literal",
                        start,
                    );
                    return;
                }
            }
        }

        if self.peek_is(quote) {
            let at = self.position();
            while self.match_char(quote) {}
            self.error(
                SyntaxErrorCode::MultipleConsecutiveQuotes,
                format!("Multiple consecutive quotes ({})", quote),
                at,
            );
            return;
        }

        self.push(TokenKind::String, value, start);
    }

    fn scan_number(&mut self, first: char, start: Position) {
        let mut literal = String::from(first);
        self.take_digits(&mut literal);

        let mut is_float = false;
        if self.peek_is('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            literal.push('.');
            self.advance();
            self.take_digits(&mut literal);
        }

        // `1.2.3`: a second fractional part is never valid
        if is_float && self.peek_is('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
            while self.peek_is('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
                literal.push('.');
                self.advance();
                self.take_digits(&mut literal);
            }
            self.error(
                SyntaxErrorCode::InvalidNumberLiteral,
                format!("Invalid number literal '{}'", literal),
                start,
            );
            return;
        }

        let kind = if is_float {
            TokenKind::Float
        } else {
            TokenKind::Int
        };
        self.push(kind, literal, start);
    }

    fn take_digits(&mut self, literal: &mut String) {
        while let Some(&ch) = self.peek() {
            if ch.is_ascii_digit() {
                literal.push(ch);
                self.advance();
            } else {
                break;
            }
        }
    }

    fn scan_identifier(&mut self, first: char, start: Position) {
        let mut ident = String::from(first);

        while let Some(&ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '$' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        let kind = KEYWORDS
            .get(ident.as_str())
            .copied()
            .unwrap_or(TokenKind::Identifier);
        self.push(kind, ident, start);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::analyze(source)
            .tokens
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        let output = Lexer::analyze("var x = 42;");
        assert!(output.is_ok());
        assert_eq!(
            kinds("var x = 42;"),
            vec![
                TokenKind::Var,
                TokenKind::Identifier,
                TokenKind::Assign,
                TokenKind::Int,
                TokenKind::Semicolon,
                TokenKind::EndOf,
            ]
        );
        assert_eq!(output.tokens[3].value, "42");
    }

    #[test]
    fn test_positions_are_one_based() {
        let output = Lexer::analyze("var a\n  b");
        assert_eq!(output.tokens[0].position, Position::new(1, 1));
        assert_eq!(output.tokens[1].position, Position::new(1, 5));
        assert_eq!(output.tokens[2].position, Position::new(2, 3));
    }

    #[test]
    fn test_string_literal_without_escapes() {
        let output = Lexer::analyze(r#"'it\n' "ok""#);
        assert!(output.is_ok());
        assert_eq!(output.tokens[0].value, "it\\n");
        assert_eq!(output.tokens[1].value, "ok");
    }

    #[test]
    fn test_string_errors() {
        let output = Lexer::analyze(r#""abc"" "never closed"#);
        let codes: Vec<_> = output.errors.iter().map(|e| e.code).collect();
        assert_eq!(
            codes,
            vec![
                SyntaxErrorCode::MultipleConsecutiveQuotes,
                SyntaxErrorCode::UnterminatedStringLiteral,
            ]
        );
    }

    #[test]
    fn test_empty_string_is_valid() {
        let output = Lexer::analyze("var s = '';");
        assert!(output.is_ok());
        assert_eq!(output.tokens[3].kind, TokenKind::String);
        assert_eq!(output.tokens[3].value, "");
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("1 2.5 3.x"),
            vec![
                TokenKind::Int,
                TokenKind::Float,
                TokenKind::Int,
                TokenKind::Dot,
                TokenKind::Identifier,
                TokenKind::EndOf,
            ]
        );
        let output = Lexer::analyze("1.2.3");
        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.errors[0].code, SyntaxErrorCode::InvalidNumberLiteral);
    }

    #[test]
    fn test_keywords_are_exact_match() {
        assert_eq!(
            kinds("nil nil2 true false readonly"),
            vec![
                TokenKind::Nil,
                TokenKind::Identifier,
                TokenKind::Boolean,
                TokenKind::Boolean,
                TokenKind::Readonly,
                TokenKind::EndOf,
            ]
        );
    }

    #[test]
    fn test_operator_merging() {
        assert_eq!(
            kinds("++ += -- -= == != <= >= && || ... ."),
            vec![
                TokenKind::Increment,
                TokenKind::PlusAssign,
                TokenKind::Decrement,
                TokenKind::MinusAssign,
                TokenKind::Equal,
                TokenKind::NotEqual,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::And,
                TokenKind::Or,
                TokenKind::Ellipsis,
                TokenKind::Dot,
                TokenKind::EndOf,
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("a // comment\n/ b"),
            vec![
                TokenKind::Identifier,
                TokenKind::Slash,
                TokenKind::Identifier,
                TokenKind::EndOf,
            ]
        );
    }

    #[test]
    fn test_errors_are_collected_and_scan_continues() {
        let output = Lexer::analyze("var a = 1 @ 2 # 3");
        assert_eq!(output.errors.len(), 2);
        assert!(output
            .errors
            .iter()
            .all(|e| e.code == SyntaxErrorCode::InvalidUnexpectedToken));
        assert_eq!(output.errors[1].position, Position::new(1, 15));
        assert_eq!(output.tokens.last().map(|t| t.kind), Some(TokenKind::EndOf));
        assert_eq!(
            output
                .tokens
                .iter()
                .filter(|t| t.kind == TokenKind::Int)
                .count(),
            3
        );
    }
}
