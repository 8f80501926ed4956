// ABOUTME: Entry points gluing the lexer, parser, and evaluator behind execute()

use crate::env::Scope;
use crate::error::InterpreterError;
use crate::eval::Evaluator;
use crate::globals::default_globals;
use crate::lexer::{self, TokenKind};
use crate::parser::Parser;
use crate::value::{Table, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// Runs a program against a fresh default sandbox (see
/// [`crate::globals::default_globals`]). The result is the first value of
/// the program's terminating `return`, or the last statement's value.
pub fn execute(source: &str) -> Result<Value, InterpreterError> {
    execute_with(source, default_globals())
}

/// Runs a program against a caller-supplied sandbox table. Unresolved name
/// lookups fall through to the sandbox, and top-level writes mirror into it,
/// so the caller can inspect them after execution.
pub fn execute_with(
    source: &str,
    sandbox: Rc<RefCell<Table>>,
) -> Result<Value, InterpreterError> {
    let tokens = lexer::tokenize(source);

    // Lexical errors travel in-band; reject the stream on the first one
    for token in &tokens {
        if let TokenKind::Error(message) = &token.kind {
            return Err(InterpreterError::Lexical {
                message: message.clone(),
                line: token.line,
                column: token.column,
            });
        }
    }

    let program = Parser::new(tokens).parse_program()?;

    let root = Scope::root(sandbox);
    let value = Evaluator::new().run(&program, &root)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_runs_the_whole_pipeline() {
        match execute("return 1 + 2 * 3") {
            Ok(Value::Number(n)) => assert_eq!(n, 7.0),
            other => panic!("expected 7, got {:?}", other),
        }
    }

    #[test]
    fn test_lexical_failure_is_labeled_with_position() {
        let err = execute("local s = \"oops").unwrap_err();
        assert_eq!(
            err.to_string(),
            "lexical analysis failed: unclosed string (line 1, column 11)"
        );
    }

    #[test]
    fn test_parse_failure_is_labeled() {
        let err = execute("if x then").unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("parse failed: "), "got {:?}", message);
        assert!(message.contains("'end'"), "got {:?}", message);
    }

    #[test]
    fn test_execution_failure_is_labeled() {
        let err = execute("return 1 / 0").unwrap_err();
        assert_eq!(err.to_string(), "execution failed: division by zero");
    }

    #[test]
    fn test_top_level_writes_mirror_into_the_sandbox() {
        let sandbox = default_globals();
        execute_with("x = 41 x = x + 1 local y = 7", Rc::clone(&sandbox)).unwrap();

        assert_eq!(sandbox.borrow().get_str("x"), Value::Number(42.0));
        // Program-level locals land in the root scope, which is the sandbox
        assert_eq!(sandbox.borrow().get_str("y"), Value::Number(7.0));
    }

    #[test]
    fn test_custom_sandbox_supplies_bindings() {
        let sandbox = Rc::new(RefCell::new(Table::new()));
        sandbox.borrow_mut().set_str("seed", Value::Number(20.0));
        let result = execute_with("return seed + 1", Rc::clone(&sandbox)).unwrap();
        assert_eq!(result, Value::Number(21.0));
    }

    #[test]
    fn test_unbound_names_read_nil() {
        match execute("return missing == nil") {
            Ok(Value::Bool(b)) => assert!(b),
            other => panic!("expected true, got {:?}", other),
        }
    }

    #[test]
    fn test_sandbox_functions_are_callable() {
        let sandbox = default_globals();
        let result = execute_with("return math.max(3, 9, 4)", sandbox).unwrap();
        assert_eq!(result, Value::Number(9.0));
    }
}
