//! Recursive-descent formula parser.
//!
//! ```text
//! comparison := sum (cmp_op sum)*
//! sum        := term (("+" | "-") term)*
//! term       := unary (("*" | "/" | "//" | "%") unary)*
//! unary      := ("+" | "-") unary | power
//! power      := atom ("**" unary)?
//! atom       := NUMBER | NAME | NAME "(" [comparison ("," comparison)*] ")" | "(" comparison ")"
//! ```
//!
//! `**` is right-associative and binds tighter than a unary sign on its left,
//! so `-2 ** 2` is `-4` and `2 ** -1` is `0.5`.

use super::ast::{BinaryOp, CompareOp, Expr, Function, UnaryOp};
use super::lexer::{tokenize, Token, TokenKind};
use super::FormulaError;

/// Parse a formula into an expression tree.
pub fn parse(source: &str) -> Result<Expr, FormulaError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(FormulaError::Empty);
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.comparison()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(unexpected(token, "end of formula")),
    }
}

/// Limit on syntax tree depth. Parentheses, calls, unary signs, `**` and
/// every chained binary operand each count one level.
const MAX_DEPTH: usize = 128;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|token| &token.kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: &TokenKind, expected: &'static str) -> Result<(), FormulaError> {
        match self.advance() {
            Some(token) if &token.kind == kind => Ok(()),
            Some(token) => Err(unexpected(&token, expected)),
            None => Err(FormulaError::UnexpectedEnd(expected)),
        }
    }

    fn enter(&mut self) -> Result<(), FormulaError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(FormulaError::TooDeep(MAX_DEPTH));
        }
        Ok(())
    }

    fn comparison(&mut self) -> Result<Expr, FormulaError> {
        self.enter()?;
        let expr = self.comparison_inner();
        self.depth -= 1;
        expr
    }

    fn comparison_inner(&mut self) -> Result<Expr, FormulaError> {
        let first = self.sum()?;
        let mut rest = Vec::new();

        while let Some(op) = self.peek_kind().and_then(compare_op) {
            self.pos += 1;
            rest.push((op, self.sum()?));
        }

        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn sum(&mut self) -> Result<Expr, FormulaError> {
        let depth = self.depth;
        let expr = self.sum_chain();
        self.depth = depth;
        expr
    }

    fn sum_chain(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            self.enter()?;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let depth = self.depth;
        let expr = self.term_chain();
        self.depth = depth;
        expr
    }

    fn term_chain(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                Some(TokenKind::DoubleSlash) => BinaryOp::FloorDiv,
                Some(TokenKind::Percent) => BinaryOp::Mod,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            self.enter()?;
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        let op = match self.peek_kind() {
            Some(TokenKind::Plus) => UnaryOp::Plus,
            Some(TokenKind::Minus) => UnaryOp::Neg,
            _ => return self.power(),
        };
        self.pos += 1;
        self.enter()?;
        let operand = self.unary();
        self.depth -= 1;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand?),
        })
    }

    fn power(&mut self) -> Result<Expr, FormulaError> {
        let base = self.atom()?;
        if self.peek_kind() == Some(&TokenKind::DoubleStar) {
            self.pos += 1;
            self.enter()?;
            let exponent = self.unary();
            self.depth -= 1;
            let exponent = exponent?;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr, FormulaError> {
        let token = self
            .advance()
            .ok_or(FormulaError::UnexpectedEnd("a number, name or '('"))?;

        match token.kind {
            TokenKind::Number(value) => Ok(Expr::Number(value)),
            TokenKind::Ident(name) => {
                if self.peek_kind() == Some(&TokenKind::LParen) {
                    self.pos += 1;
                    self.call(name)
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            TokenKind::LParen => {
                let inner = self.comparison()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            _ => Err(unexpected(&token, "a number, name or '('")),
        }
    }

    /// Parse call arguments after the opening parenthesis.
    fn call(&mut self, name: String) -> Result<Expr, FormulaError> {
        let function = Function::from_name(&name).ok_or(FormulaError::UnknownFunction(name))?;

        let mut args = Vec::new();
        if self.peek_kind() == Some(&TokenKind::RParen) {
            self.pos += 1;
        } else {
            loop {
                args.push(self.comparison()?);
                match self.advance() {
                    Some(Token {
                        kind: TokenKind::Comma,
                        ..
                    }) => {}
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => break,
                    Some(token) => return Err(unexpected(&token, "',' or ')'")),
                    None => return Err(FormulaError::UnexpectedEnd("',' or ')'")),
                }
            }
        }

        let (min, max) = function.arity();
        if args.len() < min || max.is_some_and(|max| args.len() > max) {
            return Err(FormulaError::Arity {
                function: function.name(),
                expected: function.arity_text(),
                found: args.len(),
            });
        }

        Ok(Expr::Call { function, args })
    }
}

fn compare_op(kind: &TokenKind) -> Option<CompareOp> {
    match kind {
        TokenKind::Lt => Some(CompareOp::Lt),
        TokenKind::Le => Some(CompareOp::Le),
        TokenKind::Gt => Some(CompareOp::Gt),
        TokenKind::Ge => Some(CompareOp::Ge),
        TokenKind::EqEq => Some(CompareOp::Eq),
        TokenKind::NotEq => Some(CompareOp::Ne),
        _ => None,
    }
}

fn unexpected(token: &Token, expected: &'static str) -> FormulaError {
    FormulaError::UnexpectedToken {
        found: token.kind.describe(),
        expected,
        offset: token.offset,
    }
}
