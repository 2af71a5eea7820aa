use crate::ast::Token;
use thiserror::Error;

/// Errors raised while tokenizing an expression source string.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    #[error("unexpected character '{ch}' at position {position}")]
    UnexpectedCharacter { ch: char, position: usize },

    #[error("malformed number '{text}' at position {position}")]
    MalformedNumber { text: String, position: usize },

    #[error("invalid exponent at position {position}")]
    InvalidExponent { position: usize },

    #[error("unmatched quote: string starting at position {position} is never closed")]
    UnterminatedString { position: usize },

    #[error("invalid unicode escape at position {position}: expected 4 hex digits")]
    InvalidUnicodeEscape { position: usize },
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
        }
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            // NBSP included: expressions get copy-pasted out of documents
            if matches!(ch, ' ' | '\t' | '\r' | '\n' | '\u{000B}' | '\u{00A0}') {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn is_ident_start(ch: char) -> bool {
        ch.is_ascii_alphabetic() || ch == '_' || ch == '$'
    }

    fn is_ident_continue(ch: char) -> bool {
        Self::is_ident_start(ch) || ch.is_ascii_digit()
    }

    fn read_identifier(&mut self) -> String {
        let mut result = String::new();
        while let Some(ch) = self.current_char() {
            if Self::is_ident_continue(ch) {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        result
    }

    /// Reads a numeric literal: digits with an optional fraction and an
    /// optional case-insensitive exponent (`1e10`, `1e-10`, `1E+10`).
    /// A trailing `e`, or an exponent sign with no following digit, is an
    /// error rather than a shorter match.
    fn read_number(&mut self) -> Result<Token, LexError> {
        let start = self.position;
        let mut text = String::new();
        let mut is_float = false;

        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.advance();
            } else if ch == '.' && !is_float {
                is_float = true;
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if matches!(self.current_char(), Some('e') | Some('E')) {
            is_float = true;
            text.push('e');
            self.advance();
            if matches!(self.current_char(), Some('+') | Some('-')) {
                text.push(self.current_char().unwrap());
                self.advance();
            }
            if !self.current_char().is_some_and(|c| c.is_ascii_digit()) {
                return Err(LexError::InvalidExponent {
                    position: self.position,
                });
            }
            while let Some(ch) = self.current_char() {
                if ch.is_ascii_digit() {
                    text.push(ch);
                    self.advance();
                } else {
                    break;
                }
            }
        }

        if is_float {
            match text.parse::<f64>() {
                Ok(n) => Ok(Token::Float(n)),
                Err(_) => Err(LexError::MalformedNumber {
                    text,
                    position: start,
                }),
            }
        } else {
            match text.parse::<i64>() {
                Ok(n) => Ok(Token::Integer(n)),
                // Digit runs too long for i64 still lex as numbers
                Err(_) => text.parse::<f64>().map(Token::Float).map_err(|_| {
                    LexError::MalformedNumber {
                        text,
                        position: start,
                    }
                }),
            }
        }
    }

    fn read_string(&mut self, quote: char) -> Result<Token, LexError> {
        let start = self.position;
        self.advance(); // consume opening quote

        let mut result = String::new();
        while let Some(ch) = self.current_char() {
            match ch {
                c if c == quote => {
                    self.advance();
                    return Ok(Token::String(result));
                }
                '\\' => {
                    self.advance(); // consume backslash
                    match self.current_char() {
                        Some('n') => result.push('\n'),
                        Some('f') => result.push('\u{000C}'),
                        Some('r') => result.push('\r'),
                        Some('t') => result.push('\t'),
                        Some('v') => result.push('\u{000B}'),
                        Some('u') => {
                            let code = self.read_unicode_escape()?;
                            result.push(code);
                            // read_unicode_escape leaves position on the last
                            // hex digit; the shared advance below moves past it
                        }
                        // Unknown escapes pass the character through unchanged
                        Some(other) => result.push(other),
                        None => {
                            return Err(LexError::UnterminatedString { position: start });
                        }
                    }
                    self.advance();
                }
                _ => {
                    result.push(ch);
                    self.advance();
                }
            }
        }

        Err(LexError::UnterminatedString { position: start })
    }

    /// Reads the 4 hex digits of a `\uXXXX` escape. Called with the current
    /// character on `u`.
    fn read_unicode_escape(&mut self) -> Result<char, LexError> {
        let position = self.position;
        let mut code: u32 = 0;
        for offset in 1..=4 {
            let digit = self
                .peek_char(offset)
                .and_then(|c| c.to_digit(16))
                .ok_or(LexError::InvalidUnicodeEscape { position })?;
            code = code * 16 + digit;
        }
        self.position += 4;
        char::from_u32(code).ok_or(LexError::InvalidUnicodeEscape { position })
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace();

        let token = match self.current_char() {
            None => Token::Eof,
            Some(ch) if ch.is_ascii_digit() => self.read_number()?,
            Some('.') if self.peek_char(1).is_some_and(|c| c.is_ascii_digit()) => {
                self.read_number()?
            }
            Some('"') => self.read_string('"')?,
            Some('\'') => self.read_string('\'')?,
            Some(ch) if Self::is_ident_start(ch) => {
                let ident = self.read_identifier();
                match ident.as_str() {
                    "true" => Token::Boolean(true),
                    "false" => Token::Boolean(false),
                    "null" => Token::Null,
                    "this" => Token::This,
                    _ => Token::Identifier(ident),
                }
            }
            Some('[') => {
                self.advance();
                Token::LBracket
            }
            Some(']') => {
                self.advance();
                Token::RBracket
            }
            Some('{') => {
                self.advance();
                Token::LBrace
            }
            Some('}') => {
                self.advance();
                Token::RBrace
            }
            Some('(') => {
                self.advance();
                Token::LParen
            }
            Some(')') => {
                self.advance();
                Token::RParen
            }
            Some(',') => {
                self.advance();
                Token::Comma
            }
            Some(':') => {
                self.advance();
                Token::Colon
            }
            Some(';') => {
                self.advance();
                Token::Semicolon
            }
            Some('.') => {
                self.advance();
                Token::Dot
            }
            Some('?') => {
                self.advance();
                Token::Question
            }
            Some('+') => {
                self.advance();
                Token::Plus
            }
            Some('-') => {
                self.advance();
                Token::Minus
            }
            Some('*') => {
                self.advance();
                Token::Star
            }
            Some('/') => {
                self.advance();
                Token::Slash
            }
            Some('%') => {
                self.advance();
                Token::Percent
            }
            Some('=') => {
                // Longest match: === then == then =
                if self.peek_char(1) == Some('=') {
                    if self.peek_char(2) == Some('=') {
                        self.advance();
                        self.advance();
                        self.advance();
                        Token::EqEqEq
                    } else {
                        self.advance();
                        self.advance();
                        Token::EqEq
                    }
                } else {
                    self.advance();
                    Token::Assign
                }
            }
            Some('!') => {
                if self.peek_char(1) == Some('=') {
                    if self.peek_char(2) == Some('=') {
                        self.advance();
                        self.advance();
                        self.advance();
                        Token::NotEqEq
                    } else {
                        self.advance();
                        self.advance();
                        Token::NotEq
                    }
                } else {
                    self.advance();
                    Token::Bang
                }
            }
            Some('<') => {
                if self.peek_char(1) == Some('=') {
                    self.advance();
                    self.advance();
                    Token::LtEq
                } else {
                    self.advance();
                    Token::Lt
                }
            }
            Some('>') => {
                if self.peek_char(1) == Some('=') {
                    self.advance();
                    self.advance();
                    Token::GtEq
                } else {
                    self.advance();
                    Token::Gt
                }
            }
            Some('&') => {
                if self.peek_char(1) == Some('&') {
                    self.advance();
                    self.advance();
                    Token::AndAnd
                } else {
                    return Err(LexError::UnexpectedCharacter {
                        ch: '&',
                        position: self.position,
                    });
                }
            }
            Some('|') => {
                if self.peek_char(1) == Some('|') {
                    self.advance();
                    self.advance();
                    Token::OrOr
                } else {
                    self.advance();
                    Token::Pipe
                }
            }
            Some(ch) => {
                return Err(LexError::UnexpectedCharacter {
                    ch,
                    position: self.position,
                });
            }
        };

        Ok(token)
    }
}

#[test]
fn test_keywords() {
    let mut lexer = Lexer::new("true false null this other");
    assert_eq!(lexer.next_token(), Ok(Token::Boolean(true)));
    assert_eq!(lexer.next_token(), Ok(Token::Boolean(false)));
    assert_eq!(lexer.next_token(), Ok(Token::Null));
    assert_eq!(lexer.next_token(), Ok(Token::This));
    assert_eq!(lexer.next_token(), Ok(Token::Identifier("other".to_string())));
    assert_eq!(lexer.next_token(), Ok(Token::Eof));
}

#[test]
fn test_longest_match_operators() {
    let mut lexer = Lexer::new("= == === ! != !== | ||");
    assert_eq!(lexer.next_token(), Ok(Token::Assign));
    assert_eq!(lexer.next_token(), Ok(Token::EqEq));
    assert_eq!(lexer.next_token(), Ok(Token::EqEqEq));
    assert_eq!(lexer.next_token(), Ok(Token::Bang));
    assert_eq!(lexer.next_token(), Ok(Token::NotEq));
    assert_eq!(lexer.next_token(), Ok(Token::NotEqEq));
    assert_eq!(lexer.next_token(), Ok(Token::Pipe));
    assert_eq!(lexer.next_token(), Ok(Token::OrOr));
}
