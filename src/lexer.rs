use rust_decimal::{Decimal, prelude::ToPrimitive};
use std::str::FromStr;
use thiserror::Error;

use crate::ast::{Position, SpannedToken, Token};

/// Errors raised while splitting selector text into tokens.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    #[error("Unterminated string literal starting at {position}")]
    UnterminatedString { position: Position },

    #[error("Unexpected character '{ch}' at {position}")]
    UnexpectedCharacter { ch: char, position: Position },

    #[error("Invalid number '{text}' at {position}")]
    InvalidNumber { text: String, position: Position },
}

impl LexError {
    pub fn position(&self) -> Position {
        match self {
            LexError::UnterminatedString { position }
            | LexError::UnexpectedCharacter { position, .. }
            | LexError::InvalidNumber { position, .. } => *position,
        }
    }
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        if self.current_char() == Some('\n') {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.position += 1;
    }

    fn here(&self) -> Position {
        Position {
            offset: self.position,
            line: self.line,
            column: self.column,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn is_identifier_start(ch: char) -> bool {
        ch.is_alphabetic() || ch == '_' || ch == '$'
    }

    fn is_identifier_part(ch: char) -> bool {
        ch.is_alphanumeric() || ch == '_' || ch == '$' || ch == '.'
    }

    fn read_identifier(&mut self) -> String {
        let mut result = String::new();
        while let Some(ch) = self.current_char() {
            if Self::is_identifier_part(ch) {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        result
    }

    fn read_string(&mut self, start: Position) -> Result<String, LexError> {
        let mut result = String::new();
        self.advance(); // opening quote

        while let Some(ch) = self.current_char() {
            if ch == '\'' {
                if self.peek_char(1) == Some('\'') {
                    result.push('\'');
                    self.advance();
                    self.advance();
                    continue;
                }
                self.advance();
                return Ok(result);
            }
            result.push(ch);
            self.advance();
        }

        Err(LexError::UnterminatedString { position: start })
    }

    fn read_number(&mut self, start: Position) -> Result<Token, LexError> {
        let mut number = String::new();
        let mut is_double = false;

        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() {
                number.push(ch);
                self.advance();
            } else if ch == '.' && !is_double && self.fraction_follows() {
                is_double = true;
                number.push(ch);
                self.advance();
            } else if (ch == 'e' || ch == 'E') && self.exponent_follows() {
                is_double = true;
                number.push(ch);
                self.advance();
                if let Some(sign @ ('+' | '-')) = self.current_char() {
                    number.push(sign);
                    self.advance();
                }
                while let Some(d) = self.current_char().filter(|c| c.is_ascii_digit()) {
                    number.push(d);
                    self.advance();
                }
                break;
            } else {
                break;
            }
        }

        let invalid = || LexError::InvalidNumber {
            text: number.clone(),
            position: start,
        };

        if is_double {
            // `.5` and `5.`
            let mut text = number.clone();
            if text.starts_with('.') {
                text.insert(0, '0');
            }
            if text.ends_with('.') {
                text.push('0');
            }
            return text
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(Token::Double)
                .ok_or_else(invalid);
        }

        match number.parse::<i64>() {
            Ok(n) => Ok(Token::Long(n)),
            // Too wide for a long, keep it as a double
            Err(_) => Decimal::from_str(&number)
                .ok()
                .and_then(|d| d.to_f64())
                .or_else(|| number.parse::<f64>().ok())
                .filter(|n| n.is_finite())
                .map(Token::Double)
                .ok_or_else(invalid),
        }
    }

    /// A `.` continues a number when digits follow or when it ends the number.
    fn fraction_follows(&self) -> bool {
        match self.peek_char(1) {
            Some(c) if c.is_ascii_digit() => true,
            Some(c) => !Self::is_identifier_part(c) && c != '.',
            None => true,
        }
    }

    fn exponent_follows(&self) -> bool {
        match self.peek_char(1) {
            Some(c) if c.is_ascii_digit() => true,
            Some('+' | '-') => self.peek_char(2).is_some_and(|c| c.is_ascii_digit()),
            _ => false,
        }
    }

    pub fn next_token(&mut self) -> Result<SpannedToken, LexError> {
        self.skip_whitespace();
        let position = self.here();

        let token = match self.current_char() {
            None => Token::Eof,
            Some(',') => {
                self.advance();
                Token::Comma
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
            Some('=') => {
                self.advance();
                Token::Eq
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
            Some('<') => match self.peek_char(1) {
                Some('=') => {
                    self.advance();
                    self.advance();
                    Token::LtEq
                }
                Some('>') => {
                    self.advance();
                    self.advance();
                    Token::NotEq
                }
                _ => {
                    self.advance();
                    Token::Lt
                }
            },
            Some('(') => {
                self.advance();
                Token::LParen
            }
            Some(')') => {
                self.advance();
                Token::RParen
            }
            Some('[') => {
                self.advance();
                Token::LBracket
            }
            Some(']') => {
                self.advance();
                Token::RBracket
            }
            Some('\'') => Token::String(self.read_string(position)?),
            Some(ch) if Self::is_identifier_start(ch) => {
                let ident = self.read_identifier();
                Token::keyword(&ident).unwrap_or(Token::Identifier(ident))
            }
            Some(ch) if ch.is_ascii_digit() => self.read_number(position)?,
            Some('.') if self.peek_char(1).is_some_and(|c| c.is_ascii_digit()) => {
                self.read_number(position)?
            }
            Some(ch) => return Err(LexError::UnexpectedCharacter { ch, position }),
        };

        Ok(SpannedToken { token, position })
    }
}

/// Splits `input` into tokens, always ending with [`Token::Eof`].
pub fn tokenize(input: &str) -> Result<Vec<SpannedToken>, LexError> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let next = lexer.next_token()?;
        let done = next.token == Token::Eof;
        tokens.push(next);
        if done {
            return Ok(tokens);
        }
    }
}

#[test]
fn test_keywords() {
    let mut lexer = Lexer::new("and OR Not between true FALSE null");
    assert_eq!(lexer.next_token().unwrap().token, Token::And);
    assert_eq!(lexer.next_token().unwrap().token, Token::Or);
    assert_eq!(lexer.next_token().unwrap().token, Token::Not);
    assert_eq!(lexer.next_token().unwrap().token, Token::Between);
    assert_eq!(lexer.next_token().unwrap().token, Token::Boolean(true));
    assert_eq!(lexer.next_token().unwrap().token, Token::Boolean(false));
    assert_eq!(lexer.next_token().unwrap().token, Token::Null);
}

#[test]
fn test_comparison_chain() {
    let mut lexer = Lexer::new("price <> 5");
    assert_eq!(
        lexer.next_token().unwrap().token,
        Token::Identifier("price".to_string())
    );
    assert_eq!(lexer.next_token().unwrap().token, Token::NotEq);
    assert_eq!(lexer.next_token().unwrap().token, Token::Long(5));
    assert_eq!(lexer.next_token().unwrap().token, Token::Eof);
}
