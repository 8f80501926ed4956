// ABOUTME: Error types for the lexing, parsing, and evaluation stages

use crate::value::Value;
use thiserror::Error;

// ===== Arity constant strings (eliminates allocations in error paths) =====
pub const ARITY_ONE: &str = "1";
pub const ARITY_TWO: &str = "2";
pub const ARITY_ONE_OR_TWO: &str = "1-2";
pub const ARITY_TWO_OR_THREE: &str = "2-3";
pub const ARITY_AT_LEAST_ONE: &str = "at least 1";

/// Syntax error raised by the parser on the first unexpected token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (line {line}, column {column})")]
pub struct SyntaxError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, line: u32, column: u32) -> Self {
        SyntaxError {
            message: message.into(),
            line,
            column,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum EvalError {
    /// Type mismatch with function name, expected type, actual type, and position
    #[error("{function}: expected {expected}, got {actual} at argument {position}")]
    TypeMismatch {
        function: String,
        expected: String,
        actual: String,
        position: usize,
    },

    /// Arity error with function name, expected count/range, and actual count
    #[error("{function}: expected {expected} argument{}, got {actual}", if *.expected == "1" { "" } else { "s" })]
    ArityError {
        function: String,
        expected: String, // "2", "1-2", "at least 1"
        actual: usize,
    },

    /// Runtime error with function context
    #[error("{function}: {message}")]
    RuntimeError { function: String, message: String },

    // ===== Interpreter-level errors =====
    #[error("attempt to call a non-function value")]
    NotCallable,

    #[error("attempt to index a {0} value")]
    NotIndexable(&'static str),

    #[error("attempt to perform arithmetic on a {0} value")]
    Arithmetic(&'static str),

    #[error("division by zero")]
    DivisionByZero,

    #[error("attempt to compare {0} with {1}")]
    Comparison(&'static str, &'static str),

    #[error("attempt to get length of a {0} value")]
    Length(&'static str),

    #[error("number has no integer representation")]
    NoIntegerRepresentation,

    #[error("table index is nil")]
    TableIndexNil,

    #[error("table index is NaN")]
    TableIndexNan,

    #[error("invalid assignment target")]
    InvalidAssignment,

    #[error("'for' {0} must be a number")]
    ForNotNumber(&'static str),

    #[error("'for' step is zero")]
    ForStepZero,

    #[error("break outside of a loop")]
    BreakOutsideLoop,

    #[error("call stack overflow")]
    StackOverflow,
}

impl EvalError {
    /// Create a type mismatch error with full context
    pub fn type_error(function: &str, expected: &str, actual: &Value, position: usize) -> Self {
        EvalError::TypeMismatch {
            function: function.to_string(),
            expected: expected.to_string(),
            actual: actual.type_name().to_string(),
            position,
        }
    }

    /// Create an arity error with expected and actual counts
    pub fn arity_error(function: &str, expected: impl Into<String>, actual: usize) -> Self {
        EvalError::ArityError {
            function: function.to_string(),
            expected: expected.into(),
            actual,
        }
    }

    /// Create a runtime error with function context
    pub fn runtime_error(function: &str, message: impl Into<String>) -> Self {
        EvalError::RuntimeError {
            function: function.to_string(),
            message: message.into(),
        }
    }
}

/// Top-level failure surfaced by [`crate::interpreter::execute`], labeled
/// with the pipeline stage that failed.
#[derive(Error, Debug)]
pub enum InterpreterError {
    #[error("lexical analysis failed: {message} (line {line}, column {column})")]
    Lexical {
        message: String,
        line: u32,
        column: u32,
    },

    #[error("parse failed: {0}")]
    Parse(#[from] SyntaxError),

    #[error("execution failed: {0}")]
    Execution(#[from] EvalError),
}
