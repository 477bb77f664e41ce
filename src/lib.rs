//! MyLang Programming Language
//!
//! A small dynamically-typed scripting language: a hand-written lexer and
//! recursive-descent parser feeding a tree-walking interpreter with lexical
//! scopes, closures, enums, modules and cooperative `async`/`await`.
//!
//! ```no_run
//! use mylang::{config::RunOptions, interpreter::Interpreter};
//!
//! let mut interpreter = Interpreter::new(RunOptions::new("/tmp", "/tmp/main.ml"));
//! let value = interpreter.run_source("var x = 2; x * 21").unwrap();
//! assert_eq!(value.to_string(), "42");
//! ```

pub mod ast;
pub mod config;
pub mod environment;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod modules;
pub mod parser;
pub mod runtime;
pub mod stdlib;
pub mod value;

pub use error::{MyLangError, Result};
pub use interpreter::Interpreter;
pub use value::Value;
