use crate::{
    ast::{BinOp, Expr, LogicalOp, Program, Token, UnaryOp},
    lexer::{LexError, Lexer},
};
use std::mem;
use thiserror::Error;

/// Errors raised while building the AST from a token stream.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("unexpected token '{found}', expecting '{expected}'")]
    Expected { expected: String, found: String },

    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),

    #[error("invalid assignment target: left side of '=' must be an identifier or member path")]
    InvalidAssignmentTarget,

    #[error("unknown filter '{0}'")]
    UnknownFilter(String),
}

/// Recursive-descent, precedence-climbing parser for the expression language.
///
/// Grammar, lowest to highest precedence:
///
/// ```text
/// program     : statement (';' statement)*
/// statement   : filterChain
/// filterChain : assignment ('|' identifier (':' assignment)*)*
/// assignment  : ternary ('=' assignment)?
/// ternary     : logicalOr ('?' assignment ':' assignment)?
/// logicalOr   : logicalAnd ('||' logicalAnd)*
/// logicalAnd  : equality ('&&' equality)*
/// equality    : relational (('=='|'!='|'==='|'!==') relational)*
/// relational  : additive (('<'|'>'|'<='|'>=') additive)*
/// additive    : multiplicative (('+'|'-') multiplicative)*
/// multiplicative : unary (('*'|'/'|'%') unary)*
/// unary       : ('+'|'-'|'!') unary | postfix
/// postfix     : primary ('.' identifier | '[' assignment ']' | '(' args ')')*
/// primary     : literal | array | object | identifier | '(' filterChain ')'
/// ```
pub struct Parser {
    lexer: Lexer,
    current_token: Token,
}

impl Parser {
    pub fn new(mut lexer: Lexer) -> Result<Self, ParseError> {
        let current_token = lexer.next_token()?;
        Ok(Parser {
            lexer,
            current_token,
        })
    }

    fn advance(&mut self) -> Result<(), ParseError> {
        self.current_token = self.lexer.next_token()?;
        Ok(())
    }

    /// Replaces the current token with Eof and returns it, then advances.
    fn take(&mut self) -> Result<Token, ParseError> {
        let token = mem::replace(&mut self.current_token, Token::Eof);
        self.current_token = self.lexer.next_token()?;
        Ok(token)
    }

    fn check(&self, token: &Token) -> bool {
        mem::discriminant(&self.current_token) == mem::discriminant(token)
    }

    fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        if !self.check(&expected) {
            return Err(ParseError::Expected {
                expected: expected.describe(),
                found: self.current_token.describe(),
            });
        }
        self.advance()
    }

    fn expect_identifier(&mut self) -> Result<String, ParseError> {
        match &self.current_token {
            Token::Identifier(_) => match self.take()? {
                Token::Identifier(name) => Ok(name),
                _ => unreachable!(),
            },
            other => Err(ParseError::Expected {
                expected: "identifier".to_string(),
                found: other.describe(),
            }),
        }
    }

    /// Parses a complete `;`-separated statement program.
    pub fn parse(&mut self) -> Result<Program, ParseError> {
        let mut body = vec![];

        loop {
            if self.check(&Token::Eof) {
                break;
            }
            body.push(self.parse_filter_chain()?);
            if self.check(&Token::Semicolon) {
                while self.check(&Token::Semicolon) {
                    self.advance()?;
                }
            } else {
                break;
            }
        }

        self.expect(Token::Eof)?;
        Ok(Program { body })
    }

    /// Parses a single expression without the surrounding statement layer.
    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_filter_chain()
    }

    fn parse_filter_chain(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_assignment()?;

        while self.check(&Token::Pipe) {
            self.advance()?;
            let name = self.expect_identifier()?;

            let mut args = vec![];
            while self.check(&Token::Colon) {
                self.advance()?;
                args.push(self.parse_assignment()?);
            }

            expr = Expr::Filter {
                name,
                input: Box::new(expr),
                args,
            };
        }
        Ok(expr)
    }

    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_ternary()?;

        if self.check(&Token::Assign) {
            if !matches!(left, Expr::Identifier(_) | Expr::Access { .. }) {
                return Err(ParseError::InvalidAssignmentTarget);
            }
            self.advance()?;
            // Right-associative
            let right = self.parse_assignment()?;
            return Ok(Expr::Assign {
                target: Box::new(left),
                value: Box::new(right),
            });
        }
        Ok(left)
    }

    fn parse_ternary(&mut self) -> Result<Expr, ParseError> {
        let test = self.parse_or()?;

        if self.check(&Token::Question) {
            self.advance()?;
            let consequent = self.parse_assignment()?;
            self.expect(Token::Colon)?;
            let alternate = self.parse_assignment()?;
            return Ok(Expr::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            });
        }
        Ok(test)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;

        while self.check(&Token::OrOr) {
            self.advance()?;
            let right = self.parse_and()?;
            left = Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_equality()?;

        while self.check(&Token::AndAnd) {
            self.advance()?;
            let right = self.parse_equality()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_relational()?;

        loop {
            let op = match &self.current_token {
                Token::EqEq => BinOp::Equal,
                Token::NotEq => BinOp::NotEqual,
                Token::EqEqEq => BinOp::StrictEqual,
                Token::NotEqEq => BinOp::StrictNotEqual,
                _ => break,
            };

            self.advance()?;
            let right = self.parse_relational()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_additive()?;

        loop {
            let op = match &self.current_token {
                Token::Lt => BinOp::LessThan,
                Token::Gt => BinOp::GreaterThan,
                Token::LtEq => BinOp::LessEqual,
                Token::GtEq => BinOp::GreaterEqual,
                _ => break,
            };

            self.advance()?;
            let right = self.parse_additive()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match &self.current_token {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Subtract,
                _ => break,
            };

            self.advance()?;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match &self.current_token {
                Token::Star => BinOp::Multiply,
                Token::Slash => BinOp::Divide,
                Token::Percent => BinOp::Modulo,
                _ => break,
            };

            self.advance()?;
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match &self.current_token {
            Token::Plus => UnaryOp::Plus,
            Token::Minus => UnaryOp::Minus,
            Token::Bang => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };

        self.advance()?;
        let operand = self.parse_unary()?; // right-associative: !!a, --a
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    /// Parses a primary expression with postfix chaining of member access
    /// and calls, applied left to right.
    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.check(&Token::Dot) {
                self.advance()?;
                let name = self.expect_identifier()?;
                expr = Expr::Access {
                    object: Box::new(expr),
                    key: Box::new(Expr::Key(name)),
                    computed: false,
                };
            } else if self.check(&Token::LBracket) {
                self.advance()?;
                let key = self.parse_assignment()?;
                self.expect(Token::RBracket)?;
                expr = Expr::Access {
                    object: Box::new(expr),
                    key: Box::new(key),
                    computed: true,
                };
            } else if self.check(&Token::LParen) {
                self.advance()?;
                let args = self.parse_call_args()?;
                self.expect(Token::RParen)?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = vec![];
        if !self.check(&Token::RParen) {
            loop {
                args.push(self.parse_assignment()?);
                if self.check(&Token::Comma) {
                    self.advance()?;
                } else {
                    break;
                }
            }
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match &self.current_token {
            Token::LParen => {
                self.advance()?;
                let expr = self.parse_filter_chain()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Token::LBracket => {
                self.advance()?;
                self.parse_array_literal()
            }
            Token::LBrace => {
                self.advance()?;
                self.parse_object_literal()
            }
            Token::Integer(_)
            | Token::Float(_)
            | Token::String(_)
            | Token::Boolean(_)
            | Token::Null
            | Token::This
            | Token::Identifier(_) => match self.take()? {
                Token::Integer(n) => Ok(Expr::Integer(n)),
                Token::Float(n) => Ok(Expr::Float(n)),
                Token::String(s) => Ok(Expr::Str(s)),
                Token::Boolean(b) => Ok(Expr::Boolean(b)),
                Token::Null => Ok(Expr::Null),
                Token::This => Ok(Expr::This),
                Token::Identifier(name) => Ok(Expr::Identifier(name)),
                _ => unreachable!(),
            },
            token => Err(ParseError::UnexpectedToken(token.describe())),
        }
    }

    /// Array literal, with an optional trailing comma: `[1, 2, 3,]`.
    fn parse_array_literal(&mut self) -> Result<Expr, ParseError> {
        let mut elements = vec![];

        while !self.check(&Token::RBracket) {
            elements.push(self.parse_assignment()?);
            if self.check(&Token::Comma) {
                self.advance()?;
            } else {
                break;
            }
        }

        self.expect(Token::RBracket)?;
        Ok(Expr::Array(elements))
    }

    /// Object literal with identifier, string, or number keys.
    fn parse_object_literal(&mut self) -> Result<Expr, ParseError> {
        let mut pairs = vec![];

        if !self.check(&Token::RBrace) {
            // Unlike arrays, a trailing comma is not allowed here
            loop {
                let key = match self.take()? {
                    Token::Identifier(name) => name,
                    Token::String(s) => s,
                    Token::Integer(n) => n.to_string(),
                    Token::Float(n) => n.to_string(),
                    other => {
                        return Err(ParseError::Expected {
                            expected: "object key".to_string(),
                            found: other.describe(),
                        });
                    }
                };

                self.expect(Token::Colon)?;
                let value = self.parse_assignment()?;
                pairs.push((key, value));

                if self.check(&Token::Comma) {
                    self.advance()?;
                } else {
                    break;
                }
            }
        }

        self.expect(Token::RBrace)?;
        Ok(Expr::Object(pairs))
    }
}
