//! Expression parsing with precedence climbing.
//!
//! This module implements expression parsing using the precedence climbing
//! algorithm, which handles operator precedence and associativity correctly.

use super::ast::{BinaryOperator, Expr};
use super::error::SyntaxError;
use super::parser::Parser;
use super::token::{Keyword, TokenKind};

/// Operator precedence levels (higher = binds tighter).
///
/// Precedence (low to high):
/// 1. OR
/// 2. AND
/// 3. NOT (unary)
/// 4. =, <>, <, <=, >, >=, IS, IN, BETWEEN, LIKE
/// 5. +, -
/// 6. *, /
/// 7. Unary -
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    Lowest = 0,
    Or = 1,
    And = 2,
    Not = 3,
    Comparison = 4,
    AddSub = 5,
    MulDiv = 6,
    Neg = 7,
}

impl Precedence {
    /// Returns the next higher precedence level.
    pub fn next(self) -> Self {
        match self {
            Precedence::Lowest => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Not,
            Precedence::Not => Precedence::Comparison,
            Precedence::Comparison => Precedence::AddSub,
            Precedence::AddSub => Precedence::MulDiv,
            Precedence::MulDiv => Precedence::Neg,
            Precedence::Neg => Precedence::Neg,
        }
    }
}

impl Parser {
    /// Parses an expression.
    pub fn parse_expr(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_expr_with_precedence(Precedence::Lowest)
    }

    /// Parses an expression with minimum precedence.
    pub(crate) fn parse_expr_with_precedence(
        &mut self,
        min_prec: Precedence,
    ) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_unary_expr()?;

        loop {
            let Some((op, prec)) = self.peek_binary_op() else {
                break;
            };
            if prec < min_prec {
                break;
            }

            self.advance(); // operator

            let right = self.parse_expr_with_precedence(prec.next())?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Maps the current token to a binary operator and its precedence.
    fn peek_binary_op(&self) -> Option<(BinaryOperator, Precedence)> {
        let op = match self.peek_kind()? {
            TokenKind::Plus => (BinaryOperator::Add, Precedence::AddSub),
            TokenKind::Minus => (BinaryOperator::Sub, Precedence::AddSub),
            TokenKind::Asterisk => (BinaryOperator::Mul, Precedence::MulDiv),
            TokenKind::Slash => (BinaryOperator::Div, Precedence::MulDiv),
            TokenKind::Eq => (BinaryOperator::Eq, Precedence::Comparison),
            TokenKind::Neq => (BinaryOperator::Neq, Precedence::Comparison),
            TokenKind::Lt => (BinaryOperator::Lt, Precedence::Comparison),
            TokenKind::LtEq => (BinaryOperator::LtEq, Precedence::Comparison),
            TokenKind::Gt => (BinaryOperator::Gt, Precedence::Comparison),
            TokenKind::GtEq => (BinaryOperator::GtEq, Precedence::Comparison),
            TokenKind::Keyword(Keyword::And) => (BinaryOperator::And, Precedence::And),
            TokenKind::Keyword(Keyword::Or) => (BinaryOperator::Or, Precedence::Or),
            _ => return None,
        };
        Some(op)
    }

    /// Parses a unary expression (NOT, -) or a postfix expression.
    fn parse_unary_expr(&mut self) -> Result<Expr, SyntaxError> {
        if self.consume_keyword(Keyword::Not) {
            // NOT EXISTS folds into the Exists node directly.
            if self.check_keyword(Keyword::Exists) {
                return self.parse_exists(true);
            }
            let operand = self.parse_expr_with_precedence(Precedence::Not)?;
            return Ok(Expr::Not(Box::new(operand)));
        }

        if self.consume_token(TokenKind::Minus) {
            let operand = self.parse_expr_with_precedence(Precedence::Neg)?;
            return Ok(Expr::Neg(Box::new(operand)));
        }

        self.parse_postfix_expr()
    }

    /// Parses postfix predicates: IS [NOT] NULL, [NOT] IN, [NOT] BETWEEN,
    /// [NOT] LIKE.
    fn parse_postfix_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_primary_expr()?;

        loop {
            // IS [NOT] NULL
            if self.consume_keyword(Keyword::Is) {
                let negated = self.consume_keyword(Keyword::Not);
                self.expect_keyword(Keyword::Null)?;
                expr = Expr::IsNull {
                    expr: Box::new(expr),
                    negated,
                };
                continue;
            }

            // A NOT here must introduce IN / BETWEEN / LIKE.
            let negated = self.consume_keyword(Keyword::Not);

            if self.consume_keyword(Keyword::In) {
                self.expect_token(TokenKind::LParen)?;
                if self.check_keyword(Keyword::Select) {
                    let subquery = self.parse_select_stmt()?;
                    self.expect_token(TokenKind::RParen)?;
                    expr = Expr::InSubquery {
                        expr: Box::new(expr),
                        subquery: Box::new(subquery),
                        negated,
                    };
                } else {
                    let list = self.parse_expr_list()?;
                    self.expect_token(TokenKind::RParen)?;
                    expr = Expr::InList {
                        expr: Box::new(expr),
                        list,
                        negated,
                    };
                }
                continue;
            }

            if self.consume_keyword(Keyword::Between) {
                let low = self.parse_expr_with_precedence(Precedence::AddSub)?;
                self.expect_keyword(Keyword::And)?;
                let high = self.parse_expr_with_precedence(Precedence::AddSub)?;
                expr = Expr::Between {
                    expr: Box::new(expr),
                    low: Box::new(low),
                    high: Box::new(high),
                    negated,
                };
                continue;
            }

            if self.consume_keyword(Keyword::Like) {
                let pattern = self.parse_expr_with_precedence(Precedence::AddSub)?;
                expr = Expr::Like {
                    expr: Box::new(expr),
                    pattern: Box::new(pattern),
                    negated,
                };
                continue;
            }

            if negated {
                let span = self.current_span();
                return Err(SyntaxError::unexpected_token(
                    "IN, BETWEEN, or LIKE after NOT",
                    &self.current_token_name(),
                    span,
                ));
            }

            break;
        }

        Ok(expr)
    }

    /// Parses a primary expression: literal, column reference, function
    /// call, EXISTS, scalar subquery, or a parenthesized expression.
    fn parse_primary_expr(&mut self) -> Result<Expr, SyntaxError> {
        if self.consume_keyword(Keyword::Null) {
            return Ok(Expr::Null);
        }

        if self.check_keyword(Keyword::Exists) {
            return self.parse_exists(false);
        }

        match self.peek_kind().cloned() {
            Some(TokenKind::Integer(n)) => {
                self.advance();
                Ok(Expr::Integer(n))
            }
            Some(TokenKind::Float(n)) => {
                self.advance();
                Ok(Expr::Float(n))
            }
            Some(TokenKind::String(s)) => {
                self.advance();
                Ok(Expr::String(s))
            }
            Some(TokenKind::Identifier(name)) => {
                self.advance();

                // Function call
                if self.consume_token(TokenKind::LParen) {
                    let args = self.parse_function_args()?;
                    self.expect_token(TokenKind::RParen)?;
                    return Ok(Expr::Function { name, args });
                }

                // Qualified column reference
                if self.consume_token(TokenKind::Dot) {
                    let column = self.expect_identifier()?;
                    return Ok(Expr::ColumnRef {
                        table: Some(name),
                        column,
                    });
                }

                Ok(Expr::ColumnRef {
                    table: None,
                    column: name,
                })
            }
            Some(TokenKind::LParen) => {
                self.advance();
                if self.check_keyword(Keyword::Select) {
                    let subquery = self.parse_select_stmt()?;
                    self.expect_token(TokenKind::RParen)?;
                    return Ok(Expr::Subquery(Box::new(subquery)));
                }
                let expr = self.parse_expr()?;
                self.expect_token(TokenKind::RParen)?;
                Ok(expr)
            }
            _ => {
                let span = self.current_span();
                Err(SyntaxError::unexpected_token(
                    "an expression",
                    &self.current_token_name(),
                    span,
                ))
            }
        }
    }

    /// Parses EXISTS (SELECT ...); the keyword is still unconsumed.
    fn parse_exists(&mut self, negated: bool) -> Result<Expr, SyntaxError> {
        self.expect_keyword(Keyword::Exists)?;
        self.expect_token(TokenKind::LParen)?;
        let subquery = self.parse_select_stmt()?;
        self.expect_token(TokenKind::RParen)?;
        Ok(Expr::Exists {
            subquery: Box::new(subquery),
            negated,
        })
    }

    /// Parses function arguments, allowing `*` as the sole argument for
    /// COUNT(*). The `*` is represented as an unqualified `ColumnRef`
    /// named `*` (the planner resolves it).
    fn parse_function_args(&mut self) -> Result<Vec<Expr>, SyntaxError> {
        if self.check_token(TokenKind::RParen) {
            return Ok(vec![]);
        }
        if self.consume_token(TokenKind::Asterisk) {
            return Ok(vec![Expr::ColumnRef {
                table: None,
                column: "*".to_string(),
            }]);
        }
        self.parse_expr_list()
    }

    /// Parses a comma-separated expression list.
    pub(crate) fn parse_expr_list(&mut self) -> Result<Vec<Expr>, SyntaxError> {
        let mut list = vec![self.parse_expr()?];
        while self.consume_token(TokenKind::Comma) {
            list.push(self.parse_expr()?);
        }
        Ok(list)
    }
}
