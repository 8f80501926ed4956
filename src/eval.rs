// ABOUTME: Tree-walking evaluator with sentinel-based control flow

use crate::ast::{
    BinaryOp, Block, Expr, FunctionBody, FunctionName, Program, Stmt, TableField, UnaryOp,
};
use crate::config::MAX_CALL_DEPTH;
use crate::env::Scope;
use crate::error::EvalError;
use crate::value::{Closure, Table, Value};
use std::rc::Rc;

/// Control-flow sentinel bubbled through block evaluation. `return` and
/// `break` are internal values distinct from any user-visible type; blocks
/// and loops inspect them and either act or propagate unchanged.
#[derive(Debug)]
pub enum Flow {
    Normal(Value),
    Break,
    Return(Vec<Value>),
}

#[derive(Debug, Default)]
pub struct Evaluator {
    depth: usize,
}

impl Evaluator {
    pub fn new() -> Self {
        Evaluator::default()
    }

    /// Evaluates a program's block directly in the root scope, so top-level
    /// writes land in the sandbox. A terminating `return` collapses to its
    /// first value; otherwise the last statement's value is the result.
    pub fn run(&mut self, program: &Program, root: &Rc<Scope>) -> Result<Value, EvalError> {
        match self.exec_block(&program.block, root)? {
            Flow::Normal(value) => Ok(value),
            Flow::Return(values) => Ok(values.into_iter().next().unwrap_or(Value::Nil)),
            Flow::Break => Err(EvalError::BreakOutsideLoop),
        }
    }

    // ========================================================================
    // Statements
    // ========================================================================

    /// Runs the statements of a block in the given scope. Callers that open
    /// a lexical region (loops, branches, calls, `do`) pass a fresh child.
    fn exec_block(&mut self, block: &Block, scope: &Rc<Scope>) -> Result<Flow, EvalError> {
        let mut last = Value::Nil;
        for stmt in &block.statements {
            match self.exec_stmt(stmt, scope)? {
                Flow::Normal(value) => last = value,
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal(last))
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: &Rc<Scope>) -> Result<Flow, EvalError> {
        match stmt {
            Stmt::Local { names, values } => {
                let mut evaluated = Vec::with_capacity(values.len());
                for value in values {
                    evaluated.push(self.eval_expr(value, scope)?);
                }
                for (i, name) in names.iter().enumerate() {
                    let value = evaluated.get(i).cloned().unwrap_or(Value::Nil);
                    scope.declare(name, value);
                }
                Ok(Flow::Normal(Value::Nil))
            }

            Stmt::Assign { target, value } => {
                self.exec_assign(target, value, scope)?;
                Ok(Flow::Normal(Value::Nil))
            }

            Stmt::If { arms, else_body } => {
                for (condition, body) in arms {
                    if self.eval_expr(condition, scope)?.is_truthy() {
                        return self.exec_block(body, &Scope::child(scope));
                    }
                }
                match else_body {
                    Some(body) => self.exec_block(body, &Scope::child(scope)),
                    None => Ok(Flow::Normal(Value::Nil)),
                }
            }

            Stmt::While { condition, body } => {
                while self.eval_expr(condition, scope)?.is_truthy() {
                    match self.exec_block(body, &Scope::child(scope))? {
                        Flow::Normal(_) => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal(Value::Nil))
            }

            Stmt::NumericFor {
                variable,
                start,
                finish,
                step,
                body,
            } => self.exec_numeric_for(variable, start, finish, step.as_ref(), body, scope),

            Stmt::Repeat { body, condition } => {
                loop {
                    // The condition is evaluated in the body's scope, so
                    // locals declared in the body are visible to it.
                    let body_scope = Scope::child(scope);
                    match self.exec_block(body, &body_scope)? {
                        Flow::Normal(_) => {
                            if self.eval_expr(condition, &body_scope)?.is_truthy() {
                                break;
                            }
                        }
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal(Value::Nil))
            }

            Stmt::Function { name, func } => {
                let closure = Value::Function(Rc::new(Closure {
                    func: Rc::clone(func),
                    env: Rc::clone(scope),
                }));
                match name {
                    FunctionName::Plain(name) => scope.assign(name, closure),
                    FunctionName::Method { table, method } => {
                        match scope.get(table) {
                            Value::Table(t) => t.borrow_mut().set_str(method, closure),
                            other => return Err(EvalError::NotIndexable(other.type_name())),
                        };
                    }
                }
                Ok(Flow::Normal(Value::Nil))
            }

            Stmt::LocalFunction { name, func } => {
                // The closure captures the scope that owns its own slot, so
                // the function can call itself by name.
                let closure = Value::Function(Rc::new(Closure {
                    func: Rc::clone(func),
                    env: Rc::clone(scope),
                }));
                scope.declare(name, closure);
                Ok(Flow::Normal(Value::Nil))
            }

            Stmt::Return(exprs) => {
                let mut values = Vec::with_capacity(exprs.len());
                for expr in exprs {
                    values.push(self.eval_expr(expr, scope)?);
                }
                Ok(Flow::Return(values))
            }

            Stmt::Break => Ok(Flow::Break),

            Stmt::Do(body) => self.exec_block(body, &Scope::child(scope)),

            Stmt::Expression(expr) => Ok(Flow::Normal(self.eval_expr(expr, scope)?)),
        }
    }

    fn exec_assign(&mut self, target: &Expr, value: &Expr, scope: &Rc<Scope>) -> Result<(), EvalError> {
        match target {
            Expr::Name(name) => {
                let value = self.eval_expr(value, scope)?;
                scope.assign(name, value);
                Ok(())
            }
            Expr::Index { prefix, index } => {
                let table = self.eval_indexable(prefix, scope)?;
                let key = self.eval_expr(index, scope)?;
                let value = self.eval_expr(value, scope)?;
                let result = table.borrow_mut().set(&key, value);
                result
            }
            Expr::Member { prefix, name } => {
                let table = self.eval_indexable(prefix, scope)?;
                let value = self.eval_expr(value, scope)?;
                table.borrow_mut().set_str(name, value);
                Ok(())
            }
            _ => Err(EvalError::InvalidAssignment),
        }
    }

    fn exec_numeric_for(
        &mut self,
        variable: &str,
        start: &Expr,
        finish: &Expr,
        step: Option<&Expr>,
        body: &Block,
        scope: &Rc<Scope>,
    ) -> Result<Flow, EvalError> {
        // Bounds are evaluated once, before the first iteration
        let start = self.eval_for_number(start, scope, "initial value")?;
        let finish = self.eval_for_number(finish, scope, "limit")?;
        let step = match step {
            Some(expr) => self.eval_for_number(expr, scope, "step")?,
            None => 1.0,
        };
        if step == 0.0 {
            return Err(EvalError::ForStepZero);
        }

        // The loop variable lives in a loop-private scope shared across
        // iterations; each body run still gets its own scope for locals.
        let loop_scope = Scope::child(scope);
        let mut i = start;
        while (step > 0.0 && i <= finish) || (step < 0.0 && i >= finish) {
            loop_scope.declare(variable, Value::Number(i));
            match self.exec_block(body, &Scope::child(&loop_scope))? {
                Flow::Normal(_) => {}
                Flow::Break => break,
                flow @ Flow::Return(_) => return Ok(flow),
            }
            i += step;
        }
        Ok(Flow::Normal(Value::Nil))
    }

    fn eval_for_number(
        &mut self,
        expr: &Expr,
        scope: &Rc<Scope>,
        what: &'static str,
    ) -> Result<f64, EvalError> {
        match self.eval_expr(expr, scope)? {
            Value::Number(n) => Ok(n),
            _ => Err(EvalError::ForNotNumber(what)),
        }
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    pub fn eval_expr(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Result<Value, EvalError> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Nil => Ok(Value::Nil),
            Expr::Name(name) => Ok(scope.get(name)),

            Expr::Binary { op, left, right } => match op {
                // `and`/`or` short-circuit and yield the deciding operand
                BinaryOp::And => {
                    let left = self.eval_expr(left, scope)?;
                    if left.is_truthy() {
                        self.eval_expr(right, scope)
                    } else {
                        Ok(left)
                    }
                }
                BinaryOp::Or => {
                    let left = self.eval_expr(left, scope)?;
                    if left.is_truthy() {
                        Ok(left)
                    } else {
                        self.eval_expr(right, scope)
                    }
                }
                _ => {
                    let left = self.eval_expr(left, scope)?;
                    let right = self.eval_expr(right, scope)?;
                    apply_binary(*op, left, right)
                }
            },

            Expr::Unary { op, operand } => {
                let operand = self.eval_expr(operand, scope)?;
                apply_unary(*op, operand)
            }

            Expr::Function(func) => Ok(Value::Function(Rc::new(Closure {
                func: Rc::clone(func),
                env: Rc::clone(scope),
            }))),

            Expr::Call { prefix, args } => {
                let callee = self.eval_expr(prefix, scope)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_expr(arg, scope)?);
                }
                self.call_value(callee, values)
            }

            Expr::Index { prefix, index } => {
                let table = self.eval_indexable(prefix, scope)?;
                let key = self.eval_expr(index, scope)?;
                let value = table.borrow().get(&key);
                Ok(value)
            }

            Expr::Member { prefix, name } => {
                let table = self.eval_indexable(prefix, scope)?;
                let value = table.borrow().get_str(name);
                Ok(value)
            }

            Expr::Table(fields) => self.eval_table_constructor(fields, scope),
        }
    }

    fn eval_indexable(
        &mut self,
        prefix: &Expr,
        scope: &Rc<Scope>,
    ) -> Result<Rc<std::cell::RefCell<Table>>, EvalError> {
        match self.eval_expr(prefix, scope)? {
            Value::Table(table) => Ok(table),
            other => Err(EvalError::NotIndexable(other.type_name())),
        }
    }

    fn eval_table_constructor(
        &mut self,
        fields: &[TableField],
        scope: &Rc<Scope>,
    ) -> Result<Value, EvalError> {
        let mut table = Table::new();
        let mut next_index = 1usize;
        for field in fields {
            match field {
                TableField::Positional(expr) => {
                    let value = self.eval_expr(expr, scope)?;
                    table.set_index(next_index, value);
                    next_index += 1;
                }
                TableField::Named { key, value } => {
                    let value = self.eval_expr(value, scope)?;
                    table.set_str(key, value);
                }
                TableField::Keyed { key, value } => {
                    let key = self.eval_expr(key, scope)?;
                    let value = self.eval_expr(value, scope)?;
                    table.set(&key, value)?;
                }
            }
        }
        Ok(Value::table(table))
    }

    /// Calls a value with already-evaluated arguments. Closures bind
    /// parameters positionally in a fresh child of their captured
    /// environment: missing arguments become nil, extras are discarded.
    pub fn call_value(&mut self, callee: Value, args: Vec<Value>) -> Result<Value, EvalError> {
        match callee {
            Value::Builtin(f) => f(&args),
            Value::Function(closure) => {
                if self.depth >= MAX_CALL_DEPTH {
                    return Err(EvalError::StackOverflow);
                }
                let scope = Scope::child(&closure.env);
                bind_params(&closure.func, &scope, args);

                self.depth += 1;
                let result = self.exec_block(&closure.func.body, &scope);
                self.depth -= 1;

                match result? {
                    Flow::Return(values) => Ok(values.into_iter().next().unwrap_or(Value::Nil)),
                    Flow::Normal(_) => Ok(Value::Nil),
                    Flow::Break => Err(EvalError::BreakOutsideLoop),
                }
            }
            _ => Err(EvalError::NotCallable),
        }
    }
}

fn bind_params(func: &FunctionBody, scope: &Rc<Scope>, args: Vec<Value>) {
    let mut args = args.into_iter();
    for param in &func.params {
        scope.declare(param, args.next().unwrap_or(Value::Nil));
    }
}

// ============================================================================
// Operator semantics
// ============================================================================

fn apply_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Add => numeric(left, right, |a, b| Ok(a + b)),
        BinaryOp::Sub => numeric(left, right, |a, b| Ok(a - b)),
        BinaryOp::Mul => numeric(left, right, |a, b| Ok(a * b)),
        BinaryOp::Div => numeric(left, right, |a, b| {
            if b == 0.0 {
                Err(EvalError::DivisionByZero)
            } else {
                Ok(a / b)
            }
        }),
        BinaryOp::Mod => numeric(left, right, |a, b| Ok(a % b)),

        BinaryOp::Eq => Ok(Value::Bool(left == right)),
        BinaryOp::Ne => Ok(Value::Bool(left != right)),

        BinaryOp::Lt => ordering(left, right, |a, b| a < b, |a, b| a < b),
        BinaryOp::Le => ordering(left, right, |a, b| a <= b, |a, b| a <= b),
        BinaryOp::Gt => ordering(left, right, |a, b| a > b, |a, b| a > b),
        BinaryOp::Ge => ordering(left, right, |a, b| a >= b, |a, b| a >= b),

        BinaryOp::Concat => Ok(Value::Str(format!("{}{}", left, right))),

        BinaryOp::And | BinaryOp::Or => {
            unreachable!("short-circuit operators are evaluated in eval_expr")
        }
    }
}

fn numeric(
    left: Value,
    right: Value,
    apply: impl Fn(f64, f64) -> Result<f64, EvalError>,
) -> Result<Value, EvalError> {
    let a = as_number(&left)?;
    let b = as_number(&right)?;
    Ok(Value::Number(apply(a, b)?))
}

fn as_number(value: &Value) -> Result<f64, EvalError> {
    match value {
        Value::Number(n) => Ok(*n),
        other => Err(EvalError::Arithmetic(other.type_name())),
    }
}

fn ordering(
    left: Value,
    right: Value,
    numbers: impl Fn(f64, f64) -> bool,
    strings: impl Fn(&str, &str) -> bool,
) -> Result<Value, EvalError> {
    match (&left, &right) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(numbers(*a, *b))),
        (Value::Str(a), Value::Str(b)) => Ok(Value::Bool(strings(a, b))),
        _ => Err(EvalError::Comparison(left.type_name(), right.type_name())),
    }
}

fn apply_unary(op: UnaryOp, operand: Value) -> Result<Value, EvalError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
        UnaryOp::Neg => match operand {
            Value::Number(n) => Ok(Value::Number(-n)),
            other => Err(EvalError::Arithmetic(other.type_name())),
        },
        UnaryOp::Len => match operand {
            Value::Str(s) => Ok(Value::Number(s.chars().count() as f64)),
            Value::Table(t) => Ok(Value::Number(t.borrow().len() as f64)),
            other => Err(EvalError::Length(other.type_name())),
        },
        UnaryOp::BitNot => match operand {
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => {
                Ok(Value::Number(!(n as i64) as f64))
            }
            Value::Number(_) => Err(EvalError::NoIntegerRepresentation),
            other => Err(EvalError::Arithmetic(other.type_name())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use std::cell::RefCell;

    /// Runs source against an empty sandbox: pure language semantics, no
    /// builtins.
    fn eval_source(source: &str) -> Result<Value, EvalError> {
        let program = Parser::new(Lexer::new(source))
            .parse_program()
            .expect("test source should parse");
        let sandbox = Rc::new(RefCell::new(Table::new()));
        let root = Scope::root(sandbox);
        Evaluator::new().run(&program, &root)
    }

    fn eval_number(source: &str) -> f64 {
        match eval_source(source) {
            Ok(Value::Number(n)) => n,
            other => panic!("expected number from {:?}, got {:?}", source, other),
        }
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(eval_number("return 1 + 2 * 3"), 7.0);
        assert_eq!(eval_number("return (1 + 2) * 3"), 9.0);
        assert_eq!(eval_number("return 2 * 3 + 4 * 5"), 26.0);
    }

    #[test]
    fn test_left_associative_subtraction() {
        assert_eq!(eval_number("return 10 - 4 - 3"), 3.0);
        assert_eq!(eval_number("return 100 / 10 / 2"), 5.0);
    }

    #[test]
    fn test_numeric_for_sums_range() {
        assert_eq!(
            eval_number("local s = 0; for i = 1, 10 do s = s + i end; return s"),
            55.0
        );
    }

    #[test]
    fn test_numeric_for_negative_step() {
        assert_eq!(
            eval_number("local s = 0; for i = 3, 1, -1 do s = s + i end; return s"),
            6.0
        );
    }

    #[test]
    fn test_numeric_for_skips_when_range_is_empty() {
        assert_eq!(
            eval_number("local s = 0; for i = 5, 1 do s = s + i end; return s"),
            0.0
        );
    }

    #[test]
    fn test_numeric_for_step_zero_is_error() {
        let result = eval_source("for i = 1, 10, 0 do end");
        assert!(matches!(result, Err(EvalError::ForStepZero)));
    }

    #[test]
    fn test_numeric_for_bounds_must_be_numbers() {
        let result = eval_source("for i = 'a', 10 do end");
        assert!(matches!(result, Err(EvalError::ForNotNumber("initial value"))));
    }

    #[test]
    fn test_recursive_local_function() {
        let source = "local function fib(n) \
            if n <= 1 then return n end \
            return fib(n - 1) + fib(n - 2) \
        end \
        return fib(10)";
        assert_eq!(eval_number(source), 55.0);
    }

    #[test]
    fn test_closure_captures_defining_environment() {
        let source = "local function mk(x) return function() return x end end \
            local g = mk(42) \
            return g()";
        assert_eq!(eval_number(source), 42.0);
    }

    #[test]
    fn test_closure_writes_survive_the_defining_call() {
        let source = "local function counter() \
            local n = 0 \
            return function() n = n + 1 return n end \
        end \
        local c = counter() \
        c() c() \
        return c()";
        assert_eq!(eval_number(source), 3.0);
    }

    #[test]
    fn test_short_circuit_and_never_calls_rhs() {
        let source = "local t = {n = 0} \
            local function f() t.n = t.n + 1 return true end \
            local a = false and f() \
            local b = true or f() \
            return t.n";
        assert_eq!(eval_number(source), 0.0);
    }

    #[test]
    fn test_and_or_yield_operands() {
        assert_eq!(eval_number("return nil or 5"), 5.0);
        assert_eq!(eval_number("return 2 and 3"), 3.0);
        assert!(matches!(eval_source("return false or nil"), Ok(Value::Nil)));
        assert!(matches!(eval_source("return nil and 1"), Ok(Value::Nil)));
    }

    #[test]
    fn test_local_shadowing_in_do_block() {
        assert_eq!(eval_number("local x = 1 do local x = 2 end return x"), 1.0);
    }

    #[test]
    fn test_assignment_reaches_enclosing_scope() {
        assert_eq!(eval_number("local x = 1 do x = 2 end return x"), 2.0);
    }

    #[test]
    fn test_repeat_runs_body_before_condition() {
        assert_eq!(
            eval_number("local i = 0; repeat i = i + 1 until i == 3; return i"),
            3.0
        );
    }

    #[test]
    fn test_repeat_condition_sees_body_locals() {
        let source = "local i = 0 \
            repeat local done = i >= 2 i = i + 1 until done \
            return i";
        assert_eq!(eval_number(source), 3.0);
    }

    #[test]
    fn test_while_with_break() {
        let source = "local i = 0 \
            while true do i = i + 1 if i == 5 then break end end \
            return i";
        assert_eq!(eval_number(source), 5.0);
    }

    #[test]
    fn test_break_stops_only_the_inner_loop() {
        let source = "local hits = 0 \
            for i = 1, 3 do \
                while true do break end \
                hits = hits + 1 \
            end \
            return hits";
        assert_eq!(eval_number(source), 3.0);
    }

    #[test]
    fn test_break_outside_loop_is_error() {
        assert!(matches!(eval_source("break"), Err(EvalError::BreakOutsideLoop)));
    }

    #[test]
    fn test_return_collapses_to_first_value() {
        let source = "local t = {a = 1, [2] = 'two', 3} return t.a, t[2], t[1]";
        assert_eq!(eval_number(source), 1.0);
    }

    #[test]
    fn test_table_constructor_positional_indices() {
        assert_eq!(eval_number("local t = {10, 20, 30} return t[2]"), 20.0);
        assert_eq!(eval_number("return #{10, 20, 30}"), 3.0);
    }

    #[test]
    fn test_table_mutation_through_index_and_member() {
        let source = "local t = {} t.a = 1 t['b'] = 2 t[1] = 3 \
            return t.a + t.b + t[1]";
        assert_eq!(eval_number(source), 6.0);
    }

    #[test]
    fn test_tables_are_reference_values() {
        let source = "local a = {n = 1} local b = a b.n = 5 return a.n";
        assert_eq!(eval_number(source), 5.0);
    }

    #[test]
    fn test_method_definition_binds_self_from_first_argument() {
        let source = "local account = {balance = 100} \
            function account:deposit(amount) self.balance = self.balance + amount end \
            account.deposit(account, 50) \
            return account.balance";
        assert_eq!(eval_number(source), 150.0);
    }

    #[test]
    fn test_missing_args_are_nil_and_extras_discarded() {
        let source = "local function second(a, b) return b end \
            local t = {} \
            t.missing = second(1) \
            t.extra = second(1, 2, 3) \
            return t.extra";
        assert_eq!(eval_number(source), 2.0);
        assert!(matches!(
            eval_source("local function second(a, b) return b end return second(1)"),
            Ok(Value::Nil)
        ));
    }

    #[test]
    fn test_function_without_return_yields_nil() {
        assert!(matches!(
            eval_source("local function f() local x = 1 end return f()"),
            Ok(Value::Nil)
        ));
    }

    #[test]
    fn test_program_without_return_yields_last_statement_value() {
        assert!(matches!(eval_source("1 + 1"), Ok(Value::Number(n)) if n == 2.0));
        assert!(matches!(eval_source("local x = 5"), Ok(Value::Nil)));
    }

    #[test]
    fn test_arguments_evaluate_left_to_right() {
        let source = "local t = {n = 0} \
            local function bump() t.n = t.n + 1 return t.n end \
            local r = {bump(), bump()} \
            return r[1] * 10 + r[2]";
        assert_eq!(eval_number(source), 12.0);
    }

    #[test]
    fn test_concat_coerces_numbers() {
        match eval_source("return 'n=' .. 42") {
            Ok(Value::Str(s)) => assert_eq!(s, "n=42"),
            other => panic!("expected string, got {:?}", other),
        }
        match eval_source("return 1 .. 2") {
            Ok(Value::Str(s)) => assert_eq!(s, "12"),
            other => panic!("expected string, got {:?}", other),
        }
    }

    #[test]
    fn test_equality_and_inequality() {
        assert!(matches!(eval_source("return 1 ~= 2"), Ok(Value::Bool(true))));
        assert!(matches!(eval_source("return 'a' == 'a'"), Ok(Value::Bool(true))));
        assert!(matches!(eval_source("return 1 == '1'"), Ok(Value::Bool(false))));
        assert!(matches!(eval_source("return {} == {}"), Ok(Value::Bool(false))));
        assert!(matches!(
            eval_source("local t = {} local u = t return t == u"),
            Ok(Value::Bool(true))
        ));
    }

    #[test]
    fn test_string_ordering() {
        assert!(matches!(
            eval_source("return 'apple' < 'banana'"),
            Ok(Value::Bool(true))
        ));
    }

    #[test]
    fn test_comparing_mixed_types_is_error() {
        assert!(matches!(
            eval_source("return 1 < 'a'"),
            Err(EvalError::Comparison("number", "string"))
        ));
    }

    #[test]
    fn test_unary_operators() {
        assert_eq!(eval_number("return -(-3)"), 3.0);
        assert_eq!(eval_number("return #'hello'"), 5.0);
        assert_eq!(eval_number("return ~0"), -1.0);
        assert!(matches!(eval_source("return not nil"), Ok(Value::Bool(true))));
        assert!(matches!(eval_source("return not 0"), Ok(Value::Bool(false))));
    }

    #[test]
    fn test_bitwise_complement_requires_integer() {
        assert!(matches!(
            eval_source("return ~0.5"),
            Err(EvalError::NoIntegerRepresentation)
        ));
    }

    #[test]
    fn test_division_by_zero_is_error() {
        assert!(matches!(eval_source("return 1 / 0"), Err(EvalError::DivisionByZero)));
    }

    #[test]
    fn test_arithmetic_on_nil_is_error() {
        assert!(matches!(
            eval_source("return nil + 1"),
            Err(EvalError::Arithmetic("nil"))
        ));
        assert!(matches!(
            eval_source("return 1 + 'x'"),
            Err(EvalError::Arithmetic("string"))
        ));
    }

    #[test]
    fn test_calling_a_non_function_is_error() {
        assert!(matches!(
            eval_source("local x = 5 return x()"),
            Err(EvalError::NotCallable)
        ));
    }

    #[test]
    fn test_indexing_nil_is_error() {
        assert!(matches!(
            eval_source("local t return t.field"),
            Err(EvalError::NotIndexable("nil"))
        ));
        assert!(matches!(
            eval_source("local x = 1 return x[1]"),
            Err(EvalError::NotIndexable("number"))
        ));
    }

    #[test]
    fn test_missing_table_entry_reads_nil() {
        assert!(matches!(eval_source("local t = {} return t.absent"), Ok(Value::Nil)));
    }

    #[test]
    fn test_invalid_assignment_target_is_error() {
        assert!(matches!(
            eval_source("(1) = 2"),
            Err(EvalError::InvalidAssignment)
        ));
    }

    #[test]
    fn test_runaway_recursion_overflows_in_language() {
        assert!(matches!(
            eval_source("local function spin() return spin() end return spin()"),
            Err(EvalError::StackOverflow)
        ));
    }

    #[test]
    fn test_global_function_statement_uses_assignment_rules() {
        let source = "function twice(n) return n * 2 end return twice(21)";
        assert_eq!(eval_number(source), 42.0);
    }

    #[test]
    fn test_anonymous_function_expression() {
        let source = "local apply = function(f, x) return f(x) end \
            return apply(function(n) return n + 1 end, 41)";
        assert_eq!(eval_number(source), 42.0);
    }

    #[test]
    fn test_if_elseif_else_chain() {
        let source = "local function grade(n) \
            if n >= 90 then return 'a' \
            elseif n >= 80 then return 'b' \
            elseif n >= 70 then return 'c' \
            else return 'f' end \
        end \
        return grade(85)";
        match eval_source(source) {
            Ok(Value::Str(s)) => assert_eq!(s, "b"),
            other => panic!("expected string, got {:?}", other),
        }
    }

    #[test]
    fn test_while_false_condition_never_runs_body() {
        assert_eq!(eval_number("local n = 0 while false do n = 1 end return n"), 0.0);
    }
}
