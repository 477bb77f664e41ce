//! Error types for the MyLang language
//!
//! Lexing and parsing raise [`SyntaxError`]s carrying a fixed code; evaluation
//! raises [`RuntimeError`]s that accumulate a synthetic stack of frames as they
//! propagate outward through the evaluator.

use crate::lexer::Position;
use crate::value::Value;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type alias for MyLang operations
pub type Result<T> = std::result::Result<T, MyLangError>;

/// Fixed set of syntax error codes shared by the lexer and the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyntaxErrorCode {
    InvalidUnexpectedToken,
    UnterminatedStringLiteral,
    MultipleConsecutiveQuotes,
    InvalidNumberLiteral,
    UnexpectedToken,
    UnexpectedEndOfInput,
    ExpectedToken,
    RestInvalid,
    InvalidAssignmentTarget,
    InvalidImport,
    InvalidExport,
}

impl fmt::Display for SyntaxErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyntaxErrorCode::InvalidUnexpectedToken => "InvalidUnexpectedToken",
            SyntaxErrorCode::UnterminatedStringLiteral => "UnterminatedStringLiteral",
            SyntaxErrorCode::MultipleConsecutiveQuotes => "MultipleConsecutiveQuotes",
            SyntaxErrorCode::InvalidNumberLiteral => "InvalidNumberLiteral",
            SyntaxErrorCode::UnexpectedToken => "UnexpectedToken",
            SyntaxErrorCode::UnexpectedEndOfInput => "UnexpectedEndOfInput",
            SyntaxErrorCode::ExpectedToken => "ExpectedToken",
            SyntaxErrorCode::RestInvalid => "RestInvalid",
            SyntaxErrorCode::InvalidAssignmentTarget => "InvalidAssignmentTarget",
            SyntaxErrorCode::InvalidImport => "InvalidImport",
            SyntaxErrorCode::InvalidExport => "InvalidExport",
        };
        write!(f, "{}", name)
    }
}

/// A lexical or grammatical error
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("SyntaxError: {message} [{code}] at {position}")]
pub struct SyntaxError {
    pub code: SyntaxErrorCode,
    pub message: String,
    pub position: Position,
}

impl SyntaxError {
    pub fn new(code: SyntaxErrorCode, message: impl Into<String>, position: Position) -> Self {
        SyntaxError {
            code,
            message: message.into(),
            position,
        }
    }
}

/// Kinds of evaluation-time errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BaseError,
    FileReadFaild,
    ImportFaildError,
    AssignmentError,
    FunctionCallError,
    ArgumentsError,
    TypeError,
    ReferenceError,
    /// A value raised by a `throw` statement
    ThrownError,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::BaseError => "BaseError",
            ErrorKind::FileReadFaild => "FileReadFaild",
            ErrorKind::ImportFaildError => "ImportFaildError",
            ErrorKind::AssignmentError => "AssignmentError",
            ErrorKind::FunctionCallError => "FunctionCallError",
            ErrorKind::ArgumentsError => "ArgumentsError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::ThrownError => "Error",
        }
    }
}

/// Structured evaluation error
///
/// `files` holds "frame" strings of the form `<label> (<file>:<line>:<col>)`,
/// outermost first. Frames are added by the evaluator while the error
/// unwinds, so the list is a trace of static AST positions rather than of
/// dynamic call frames.
#[derive(Debug, Clone)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
    pub code: Option<String>,
    pub cause: Option<Value>,
    pub files: Vec<String>,
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        RuntimeError {
            kind,
            message: message.into(),
            code: None,
            cause: None,
            files: Vec::new(),
        }
    }

    pub fn base(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BaseError, message)
    }

    pub fn assignment(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AssignmentError, message)
    }

    pub fn function_call(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FunctionCallError, message)
    }

    pub fn arguments(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ArgumentsError, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    pub fn reference(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ReferenceError, message)
    }

    pub fn import(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ImportFaildError, message)
    }

    pub fn file_read(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FileReadFaild, message)
    }

    /// Wrap a user value raised with `throw`
    pub fn thrown(value: Value) -> Self {
        RuntimeError {
            kind: ErrorKind::ThrownError,
            message: value.to_string(),
            code: None,
            cause: Some(value),
            files: Vec::new(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_cause(mut self, cause: Value) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Prepend a frame unless an identical one is already recorded
    pub fn push_frame(&mut self, frame: String) {
        if !self.files.contains(&frame) {
            self.files.insert(0, frame);
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name(), self.message)?;
        for frame in &self.files {
            write!(f, "\n - {}", frame)?;
        }
        let thrown_value = self.kind == ErrorKind::ThrownError;
        match (&self.code, &self.cause) {
            (Some(code), Some(cause)) if !thrown_value => {
                write!(f, " {{code: {}, cause: {}}}", code, cause)
            }
            (Some(code), _) => write!(f, " {{code: {}}}", code),
            (None, Some(cause)) if !thrown_value => write!(f, " {{cause: {}}}", cause),
            _ => Ok(()),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Main error type for MyLang operations
#[derive(Error, Debug)]
pub enum MyLangError {
    /// Every lexical error found in the source, reported together
    #[error("{}", format_lex_errors(.0))]
    Lex(Vec<SyntaxError>),

    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

fn format_lex_errors(errors: &[SyntaxError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_are_prepended_and_deduplicated() {
        let mut err = RuntimeError::assignment("x is constant");
        err.push_frame("AssignmentExpression (main.ml:3:5)".to_string());
        err.push_frame("ExpressionStatement (main.ml:3:5)".to_string());
        err.push_frame("AssignmentExpression (main.ml:3:5)".to_string());

        assert_eq!(
            err.files,
            vec![
                "ExpressionStatement (main.ml:3:5)".to_string(),
                "AssignmentExpression (main.ml:3:5)".to_string(),
            ]
        );
    }

    #[test]
    fn test_display_renders_frames_and_code() {
        let mut err = RuntimeError::import("Cannot import 'x'").with_code("E_IMPORT");
        err.push_frame("ImportDeclaration (main.ml:1:1)".to_string());
        assert_eq!(
            err.to_string(),
            "ImportFaildError: Cannot import 'x'\n - ImportDeclaration (main.ml:1:1) {code: E_IMPORT}"
        );
    }

    #[test]
    fn test_thrown_value_display() {
        let err = RuntimeError::thrown(Value::Str("boom".to_string()));
        assert_eq!(err.to_string(), "Error: boom");
        assert!(matches!(err.cause, Some(Value::Str(ref s)) if s == "boom"));
    }
}
