//! HCL-lite: the subset of HCL native syntax needed to inventory Terraform.
//!
//! The parser produces a syntax tree only. Nothing is evaluated: references,
//! function calls and operators are preserved as [`Value::Reference`] or
//! [`Value::Expression`].

pub mod body;
pub mod lexer;
pub mod parser;
pub mod value;

use std::fmt;

pub use body::{Attribute, Block, Body};
pub use parser::parse;
pub use value::{Reference, Scalar, Value};

/// A syntax error at a position in a source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for SyntaxError {}
