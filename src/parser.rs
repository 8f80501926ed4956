// ABOUTME: Recursive-descent parser turning the token stream into an AST

use crate::ast::{
    BinaryOp, Block, Expr, FunctionBody, FunctionName, Program, Stmt, TableField, UnaryOp,
};
use crate::error::SyntaxError;
use crate::lexer::{Keyword, Op, Punct, Token, TokenKind};
use std::rc::Rc;

type PResult<T> = Result<T, SyntaxError>;

/// Parser over any token source that terminates with `Eof`. Maintains two
/// tokens of lookahead (`current` and `next`) and aborts on the first
/// unexpected token.
pub struct Parser<I: Iterator<Item = Token>> {
    tokens: I,
    current: Token,
    next: Token,
}

impl<I: Iterator<Item = Token>> Parser<I> {
    pub fn new(tokens: impl IntoIterator<Item = Token, IntoIter = I>) -> Self {
        let mut tokens = tokens.into_iter();
        let current = tokens.next().unwrap_or(Token {
            kind: TokenKind::Eof,
            line: 1,
            column: 1,
        });
        let next = tokens.next().unwrap_or_else(|| Token {
            kind: TokenKind::Eof,
            line: current.line,
            column: current.column,
        });
        Parser {
            tokens,
            current,
            next,
        }
    }

    /// Parses a whole program: a block spanning the entire input.
    pub fn parse_program(mut self) -> PResult<Program> {
        let block = self.parse_block()?;
        if self.current.kind != TokenKind::Eof {
            return Err(self.unexpected("<eof>"));
        }
        Ok(Program { block })
    }

    // ========================================================================
    // Token plumbing
    // ========================================================================

    /// Shifts both lookahead slots by one and returns the consumed token.
    fn advance(&mut self) -> Token {
        let incoming = self.tokens.next().unwrap_or(Token {
            kind: TokenKind::Eof,
            line: self.next.line,
            column: self.next.column,
        });
        std::mem::replace(&mut self.current, std::mem::replace(&mut self.next, incoming))
    }

    fn check_keyword(&self, kw: Keyword) -> bool {
        self.current.kind == TokenKind::Keyword(kw)
    }

    fn check_op(&self, op: Op) -> bool {
        self.current.kind == TokenKind::Op(op)
    }

    fn check_punct(&self, punct: Punct) -> bool {
        self.current.kind == TokenKind::Punct(punct)
    }

    fn expect_keyword(&mut self, kw: Keyword) -> PResult<()> {
        if self.check_keyword(kw) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", kw.as_str())))
        }
    }

    fn expect_op(&mut self, op: Op) -> PResult<()> {
        if self.check_op(op) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", op.as_str())))
        }
    }

    fn expect_punct(&mut self, punct: Punct) -> PResult<()> {
        if self.check_punct(punct) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", punct.as_str())))
        }
    }

    fn expect_ident(&mut self, what: &str) -> PResult<String> {
        match &self.current.kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn unexpected(&self, expected: &str) -> SyntaxError {
        SyntaxError::new(
            format!("expected {}, found {}", expected, self.current.kind),
            self.current.line,
            self.current.column,
        )
    }

    fn error_here(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(message, self.current.line, self.current.column)
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn at_block_end(&self) -> bool {
        matches!(
            self.current.kind,
            TokenKind::Eof
                | TokenKind::Keyword(Keyword::End)
                | TokenKind::Keyword(Keyword::Elseif)
                | TokenKind::Keyword(Keyword::Else)
                | TokenKind::Keyword(Keyword::Until)
        )
    }

    /// A sequence of statements terminated by `end`, `elseif`, `else`,
    /// `until`, or eof. The terminator is left for the caller to consume.
    fn parse_block(&mut self) -> PResult<Block> {
        let mut statements = Vec::new();
        while !self.at_block_end() {
            if self.check_punct(Punct::Semi) {
                self.advance();
                continue;
            }
            if let Some(stmt) = self.parse_statement()? {
                statements.push(stmt);
            }
        }
        Ok(Block { statements })
    }

    fn parse_statement(&mut self) -> PResult<Option<Stmt>> {
        let stmt = match &self.current.kind {
            TokenKind::Keyword(Keyword::Local) => self.parse_local()?,
            TokenKind::Keyword(Keyword::If) => self.parse_if()?,
            TokenKind::Keyword(Keyword::While) => self.parse_while()?,
            TokenKind::Keyword(Keyword::For) => self.parse_for()?,
            TokenKind::Keyword(Keyword::Repeat) => self.parse_repeat()?,
            TokenKind::Keyword(Keyword::Function) => self.parse_function_statement()?,
            TokenKind::Keyword(Keyword::Return) => self.parse_return()?,
            TokenKind::Keyword(Keyword::Break) => {
                self.advance();
                Stmt::Break
            }
            TokenKind::Keyword(Keyword::Do) => {
                self.advance();
                let body = self.parse_block()?;
                self.expect_keyword(Keyword::End)?;
                Stmt::Do(body)
            }
            TokenKind::Error(message) => {
                let message = message.clone();
                return Err(self.error_here(message));
            }
            _ if self.starts_expression() => self.parse_expression_statement()?,
            _ => {
                // Best-effort resynchronization: skip one token
                self.advance();
                return Ok(None);
            }
        };
        Ok(Some(stmt))
    }

    fn starts_expression(&self) -> bool {
        matches!(
            self.current.kind,
            TokenKind::Number(_)
                | TokenKind::Str(_)
                | TokenKind::Ident(_)
                | TokenKind::Keyword(
                    Keyword::True | Keyword::False | Keyword::Nil | Keyword::Function | Keyword::Not
                )
                | TokenKind::Op(Op::Minus | Op::Tilde | Op::Hash)
                | TokenKind::Punct(Punct::LParen | Punct::LBrace)
        )
    }

    fn parse_local(&mut self) -> PResult<Stmt> {
        self.advance();
        if self.check_keyword(Keyword::Function) {
            self.advance();
            let name = self.expect_ident("function name")?;
            let func = self.parse_function_body(false)?;
            return Ok(Stmt::LocalFunction {
                name,
                func: Rc::new(func),
            });
        }

        let mut names = vec![self.expect_ident("identifier")?];
        while self.check_punct(Punct::Comma) {
            self.advance();
            names.push(self.expect_ident("identifier")?);
        }

        let mut values = Vec::new();
        if self.check_op(Op::Assign) {
            self.advance();
            values = self.parse_expression_list()?;
        }
        Ok(Stmt::Local { names, values })
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        self.advance();
        let condition = self.parse_expression()?;
        self.expect_keyword(Keyword::Then)?;
        let body = self.parse_block()?;
        let mut arms = vec![(condition, body)];

        while self.check_keyword(Keyword::Elseif) {
            self.advance();
            let condition = self.parse_expression()?;
            self.expect_keyword(Keyword::Then)?;
            let body = self.parse_block()?;
            arms.push((condition, body));
        }

        let else_body = if self.check_keyword(Keyword::Else) {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };
        self.expect_keyword(Keyword::End)?;
        Ok(Stmt::If { arms, else_body })
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        self.advance();
        let condition = self.parse_expression()?;
        self.expect_keyword(Keyword::Do)?;
        let body = self.parse_block()?;
        self.expect_keyword(Keyword::End)?;
        Ok(Stmt::While { condition, body })
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        self.advance();
        let variable = self.expect_ident("identifier")?;
        if self.check_keyword(Keyword::In) {
            return Err(self.error_here("generic 'for' loops are not supported"));
        }
        self.expect_op(Op::Assign)?;
        let start = self.parse_expression()?;
        self.expect_punct(Punct::Comma)?;
        let finish = self.parse_expression()?;
        let step = if self.check_punct(Punct::Comma) {
            self.advance();
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect_keyword(Keyword::Do)?;
        let body = self.parse_block()?;
        self.expect_keyword(Keyword::End)?;
        Ok(Stmt::NumericFor {
            variable,
            start,
            finish,
            step,
            body,
        })
    }

    fn parse_repeat(&mut self) -> PResult<Stmt> {
        self.advance();
        let body = self.parse_block()?;
        self.expect_keyword(Keyword::Until)?;
        let condition = self.parse_expression()?;
        Ok(Stmt::Repeat { body, condition })
    }

    fn parse_function_statement(&mut self) -> PResult<Stmt> {
        self.advance();
        let first = self.expect_ident("function name")?;

        if self.check_op(Op::Colon) {
            self.advance();
            let method = self.expect_ident("method name")?;
            let func = self.parse_function_body(true)?;
            return Ok(Stmt::Function {
                name: FunctionName::Method {
                    table: first,
                    method,
                },
                func: Rc::new(func),
            });
        }

        let func = self.parse_function_body(false)?;
        Ok(Stmt::Function {
            name: FunctionName::Plain(first),
            func: Rc::new(func),
        })
    }

    /// `(params) block end`; method bodies get `self` as an implicit first
    /// parameter, bound from the first invocation argument.
    fn parse_function_body(&mut self, method: bool) -> PResult<FunctionBody> {
        self.expect_punct(Punct::LParen)?;
        let mut params = Vec::new();
        if method {
            params.push("self".to_string());
        }
        if !self.check_punct(Punct::RParen) {
            params.push(self.expect_ident("parameter name")?);
            while self.check_punct(Punct::Comma) {
                self.advance();
                params.push(self.expect_ident("parameter name")?);
            }
        }
        self.expect_punct(Punct::RParen)?;
        let body = self.parse_block()?;
        self.expect_keyword(Keyword::End)?;
        Ok(FunctionBody { params, body })
    }

    fn parse_return(&mut self) -> PResult<Stmt> {
        self.advance();
        if self.at_block_end() || self.check_punct(Punct::Semi) {
            return Ok(Stmt::Return(Vec::new()));
        }
        Ok(Stmt::Return(self.parse_expression_list()?))
    }

    fn parse_expression_statement(&mut self) -> PResult<Stmt> {
        let expr = self.parse_expression()?;
        if self.check_op(Op::Assign) {
            self.advance();
            let value = self.parse_expression()?;
            return Ok(Stmt::Assign {
                target: expr,
                value,
            });
        }
        Ok(Stmt::Expression(expr))
    }

    fn parse_expression_list(&mut self) -> PResult<Vec<Expr>> {
        let mut exprs = vec![self.parse_expression()?];
        while self.check_punct(Punct::Comma) {
            self.advance();
            exprs.push(self.parse_expression()?);
        }
        Ok(exprs)
    }

    // ========================================================================
    // Expressions, lowest precedence first
    // ========================================================================

    pub fn parse_expression(&mut self) -> PResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        let mut left = self.parse_and()?;
        while self.check_keyword(Keyword::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let mut left = self.parse_relational()?;
        while self.check_keyword(Keyword::And) {
            self.advance();
            let right = self.parse_relational()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> PResult<Expr> {
        let mut left = self.parse_concat()?;
        while let Some(op) = self.relational_op() {
            self.advance();
            let right = self.parse_concat()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn relational_op(&self) -> Option<BinaryOp> {
        match self.current.kind {
            TokenKind::Op(Op::Eq) => Some(BinaryOp::Eq),
            TokenKind::Op(Op::Ne) => Some(BinaryOp::Ne),
            TokenKind::Op(Op::Lt) => Some(BinaryOp::Lt),
            TokenKind::Op(Op::Gt) => Some(BinaryOp::Gt),
            TokenKind::Op(Op::Le) => Some(BinaryOp::Le),
            TokenKind::Op(Op::Ge) => Some(BinaryOp::Ge),
            _ => None,
        }
    }

    // `..` is right-associative: `a .. b .. c` is `a .. (b .. c)`.
    fn parse_concat(&mut self) -> PResult<Expr> {
        let left = self.parse_additive()?;
        if self.check_op(Op::Concat) {
            self.advance();
            let right = self.parse_concat()?;
            return Ok(binary(BinaryOp::Concat, left, right));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Op(Op::Plus) => BinaryOp::Add,
                TokenKind::Op(Op::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Op(Op::Star) => BinaryOp::Mul,
                TokenKind::Op(Op::Slash) => BinaryOp::Div,
                TokenKind::Op(Op::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let op = match self.current.kind {
            TokenKind::Keyword(Keyword::Not) => UnaryOp::Not,
            TokenKind::Op(Op::Minus) => UnaryOp::Neg,
            TokenKind::Op(Op::Tilde) => UnaryOp::BitNot,
            TokenKind::Op(Op::Hash) => UnaryOp::Len,
            _ => return self.parse_primary(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        match &self.current.kind {
            TokenKind::Number(n) => {
                let n = *n;
                self.advance();
                Ok(Expr::Number(n))
            }
            TokenKind::Str(s) => {
                let s = s.clone();
                self.advance();
                Ok(Expr::Str(s))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            TokenKind::Keyword(Keyword::Nil) => {
                self.advance();
                Ok(Expr::Nil)
            }
            TokenKind::Keyword(Keyword::Function) => {
                self.advance();
                let func = self.parse_function_body(false)?;
                Ok(Expr::Function(Rc::new(func)))
            }
            TokenKind::Punct(Punct::LParen) => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect_punct(Punct::RParen)?;
                Ok(expr)
            }
            TokenKind::Punct(Punct::LBrace) => self.parse_table_constructor(),
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                self.parse_suffixed(Expr::Name(name))
            }
            TokenKind::Error(message) => {
                let message = message.clone();
                Err(self.error_here(message))
            }
            _ => Err(self.error_here(format!("unexpected token {}", self.current.kind))),
        }
    }

    /// Greedy postfix chain after a variable: `(args)`, `[expr]`, `.name`.
    /// Each step wraps the previous tree as its prefix.
    fn parse_suffixed(&mut self, mut expr: Expr) -> PResult<Expr> {
        loop {
            if self.check_punct(Punct::LParen) {
                self.advance();
                let mut args = Vec::new();
                if !self.check_punct(Punct::RParen) {
                    args = self.parse_expression_list()?;
                }
                self.expect_punct(Punct::RParen)?;
                expr = Expr::Call {
                    prefix: Box::new(expr),
                    args,
                };
            } else if self.check_punct(Punct::LBracket) {
                self.advance();
                let index = self.parse_expression()?;
                self.expect_punct(Punct::RBracket)?;
                expr = Expr::Index {
                    prefix: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.check_op(Op::Dot) {
                self.advance();
                let name = self.expect_ident("field name")?;
                expr = Expr::Member {
                    prefix: Box::new(expr),
                    name,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_table_constructor(&mut self) -> PResult<Expr> {
        self.expect_punct(Punct::LBrace)?;
        let mut fields = Vec::new();
        loop {
            if self.check_punct(Punct::RBrace) {
                self.advance();
                return Ok(Expr::Table(fields));
            }
            fields.push(self.parse_table_field()?);
            if self.check_punct(Punct::Comma) {
                self.advance();
            }
        }
    }

    fn parse_table_field(&mut self) -> PResult<TableField> {
        // `name = expr` needs the second lookahead token to distinguish a
        // named field from a plain identifier expression.
        if let TokenKind::Ident(name) = &self.current.kind {
            if self.next.kind == TokenKind::Op(Op::Assign) {
                let key = name.clone();
                self.advance();
                self.advance();
                let value = self.parse_expression()?;
                return Ok(TableField::Named { key, value });
            }
        }
        if self.check_punct(Punct::LBracket) {
            self.advance();
            let key = self.parse_expression()?;
            self.expect_punct(Punct::RBracket)?;
            self.expect_op(Op::Assign)?;
            let value = self.parse_expression()?;
            return Ok(TableField::Keyed { key, value });
        }
        Ok(TableField::Positional(self.parse_expression()?))
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}
