use std::{mem, sync::Arc};

use thiserror::Error;

use crate::{
    ast::{BinOp, Expr, LikePattern, Position, SpannedToken, Token, UnaryOp, ValueSet},
    functions::{CallConvention, FunctionError, FunctionRegistry, Qualifier, Tag},
    lexer::{LexError, tokenize},
    value::Value,
};

/// Errors raised while compiling selector text. No tree is produced.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("Expected {expected}, found {found} at {position}")]
    Unexpected {
        position: Position,
        expected: String,
        found: String,
    },

    #[error("Function '{function}' called with an empty argument list at {position}")]
    EmptyArguments { position: Position, function: String },

    #[error("Unknown function '{name}' at {position}")]
    UnknownFunction { position: Position, name: String },

    #[error("Invalid call to '{function}' at {position}: {source}")]
    InvalidArguments {
        position: Position,
        function: String,
        #[source]
        source: FunctionError,
    },

    #[error("Invalid LIKE pattern {pattern} at {position}")]
    InvalidPattern { position: Position, pattern: String },

    #[error("Selector nests deeper than {limit} levels at {position}")]
    TooDeep { position: Position, limit: usize },
}

impl ParseError {
    pub fn position(&self) -> Position {
        match self {
            ParseError::Lex(e) => e.position(),
            ParseError::Unexpected { position, .. }
            | ParseError::EmptyArguments { position, .. }
            | ParseError::UnknownFunction { position, .. }
            | ParseError::InvalidArguments { position, .. }
            | ParseError::InvalidPattern { position, .. }
            | ParseError::TooDeep { position, .. } => *position,
        }
    }
}

/// Parentheses, `NOT`, unary minus and call arguments open a nesting level.
pub const MAX_NESTING: usize = 128;

/// Upper bound on the height of a parsed tree. Every operator in an
/// `AND`/`OR`/arithmetic chain adds a level on top of the nesting.
pub const MAX_HEIGHT: usize = 512;

pub struct Parser {
    tokens: Vec<SpannedToken>,
    index: usize,
    registry: Arc<FunctionRegistry>,
    nesting: usize,
    height: usize,
}

impl Parser {
    /// Parser over a token sequence; an end-of-input token is appended when missing.
    pub fn new(mut tokens: Vec<SpannedToken>, registry: Arc<FunctionRegistry>) -> Self {
        if tokens.last().is_none_or(|t| t.token != Token::Eof) {
            let position = tokens.last().map(|t| t.position).unwrap_or_else(Position::start);
            tokens.push(SpannedToken {
                token: Token::Eof,
                position,
            });
        }
        Parser {
            tokens,
            index: 0,
            registry,
            nesting: 0,
            height: 0,
        }
    }

    pub fn from_source(input: &str, registry: Arc<FunctionRegistry>) -> Result<Self, ParseError> {
        Ok(Self::new(tokenize(input)?, registry))
    }

    fn current(&self) -> &SpannedToken {
        &self.tokens[self.index]
    }

    fn peek(&self) -> &Token {
        let next = (self.index + 1).min(self.tokens.len() - 1);
        &self.tokens[next].token
    }

    fn advance(&mut self) -> SpannedToken {
        let last = self.tokens.len() - 1;
        if self.index >= last {
            return self.tokens[last].clone();
        }
        let position = self.tokens[self.index].position;
        let token = mem::replace(&mut self.tokens[self.index].token, Token::Eof);
        self.index += 1;
        SpannedToken { token, position }
    }

    fn check(&self, token: &Token) -> bool {
        mem::discriminant(&self.current().token) == mem::discriminant(token)
    }

    fn unexpected(&self, expected: impl Into<String>) -> ParseError {
        ParseError::Unexpected {
            position: self.current().position,
            expected: expected.into(),
            found: self.current().token.to_string(),
        }
    }

    fn too_deep(&self, limit: usize) -> ParseError {
        ParseError::TooDeep {
            position: self.current().position,
            limit,
        }
    }

    /// Opens a nesting level; paired with `ascend` once the nested part is parsed.
    fn descend(&mut self) -> Result<(), ParseError> {
        if self.nesting >= MAX_NESTING {
            return Err(self.too_deep(MAX_NESTING));
        }
        self.nesting += 1;
        self.grow()
    }

    fn ascend(&mut self) {
        self.nesting -= 1;
        self.height -= 1;
    }

    fn grow(&mut self) -> Result<(), ParseError> {
        if self.height >= MAX_HEIGHT {
            return Err(self.too_deep(MAX_HEIGHT));
        }
        self.height += 1;
        Ok(())
    }

    fn expect(&mut self, expected: Token) -> Result<SpannedToken, ParseError> {
        if !self.check(&expected) {
            return Err(self.unexpected(format!("'{}'", expected)));
        }
        Ok(self.advance())
    }

    /// Parses a complete selector; trailing tokens are an error.
    pub fn parse(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_expression()?;
        if !self.check(&Token::Eof) {
            return Err(self.unexpected("end of input"));
        }
        Ok(expr)
    }

    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let height = self.height;
        let mut left = self.parse_and()?;

        while self.check(&Token::Or) {
            self.advance();
            self.grow()?;
            let right = self.parse_and()?;
            left = Expr::binary(BinOp::Or, left, right);
        }
        self.height = height;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let height = self.height;
        let mut left = self.parse_not()?;

        while self.check(&Token::And) {
            self.advance();
            self.grow()?;
            let right = self.parse_not()?;
            left = Expr::binary(BinOp::And, left, right);
        }
        self.height = height;
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.check(&Token::Not) {
            self.advance();
            self.descend()?;
            let operand = self.parse_not()?;
            self.ascend();
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_additive()?;

        let op = match &self.current().token {
            Token::Eq => Some(BinOp::Equal),
            Token::NotEq => Some(BinOp::NotEqual),
            Token::Lt => Some(BinOp::LessThan),
            Token::Gt => Some(BinOp::GreaterThan),
            Token::LtEq => Some(BinOp::LessEqual),
            Token::GtEq => Some(BinOp::GreaterEqual),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let right = self.parse_additive()?;
            return Ok(Expr::binary(op, left, right));
        }

        // `x NOT BETWEEN`, `x NOT IN`, `x NOT LIKE`
        let negated = self.check(&Token::Not)
            && matches!(self.peek(), Token::Between | Token::In | Token::Like);
        if negated {
            self.advance();
        }

        match &self.current().token {
            Token::Between => self.parse_between(left, negated),
            Token::In => self.parse_in(left, negated),
            Token::Like => self.parse_like(left, negated),
            Token::Is => self.parse_is_null(left),
            _ => Ok(left),
        }
    }

    fn parse_between(&mut self, expr: Expr, negated: bool) -> Result<Expr, ParseError> {
        self.advance(); // BETWEEN
        // Bounds stop below AND so the keyword separates them
        let low = self.parse_additive()?;
        self.expect(Token::And)?;
        let high = self.parse_additive()?;
        Ok(Expr::Between {
            expr: Box::new(expr),
            low: Box::new(low),
            high: Box::new(high),
            negated,
        })
    }

    fn parse_in(&mut self, expr: Expr, negated: bool) -> Result<Expr, ParseError> {
        self.advance(); // IN
        self.expect(Token::LParen)?;

        let mut values = vec![self.parse_literal_value()?];
        while self.check(&Token::Comma) {
            self.advance();
            values.push(self.parse_literal_value()?);
        }
        self.expect(Token::RParen)?;

        Ok(Expr::In {
            expr: Box::new(expr),
            list: ValueSet::new(values),
            negated,
        })
    }

    fn parse_literal_value(&mut self) -> Result<Value, ParseError> {
        let negative = self.check(&Token::Minus);
        if negative {
            self.advance();
        }
        let value = match &self.current().token {
            Token::String(s) if !negative => Value::String(s.clone()),
            Token::Boolean(b) if !negative => Value::Boolean(*b),
            Token::Long(n) if negative => Value::Long(-n),
            Token::Long(n) => Value::Long(*n),
            Token::Double(n) if negative => Value::Double(-n),
            Token::Double(n) => Value::Double(*n),
            _ => return Err(self.unexpected("literal")),
        };
        self.advance();
        Ok(value)
    }

    fn parse_like(&mut self, expr: Expr, negated: bool) -> Result<Expr, ParseError> {
        self.advance(); // LIKE
        let position = self.current().position;
        let pattern = match self.advance().token {
            Token::String(s) => s,
            other => {
                return Err(ParseError::Unexpected {
                    position,
                    expected: "pattern string".to_string(),
                    found: other.to_string(),
                });
            }
        };

        let escape = if self.check(&Token::Escape) {
            self.advance();
            match &self.current().token {
                Token::String(s) if s.chars().count() == 1 => {
                    let ch = s.chars().next();
                    self.advance();
                    ch
                }
                _ => return Err(self.unexpected("single character escape string")),
            }
        } else {
            None
        };

        let pattern = LikePattern::new(&pattern, escape).map_err(|_| ParseError::InvalidPattern {
            position,
            pattern: Value::String(pattern.clone()).to_string(),
        })?;

        Ok(Expr::Like {
            expr: Box::new(expr),
            pattern,
            negated,
        })
    }

    fn parse_is_null(&mut self, expr: Expr) -> Result<Expr, ParseError> {
        self.advance(); // IS
        let negated = self.check(&Token::Not);
        if negated {
            self.advance();
        }
        self.expect(Token::Null)?;
        Ok(Expr::IsNull {
            expr: Box::new(expr),
            negated,
        })
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let height = self.height;
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match &self.current().token {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Subtract,
                _ => break,
            };

            self.advance();
            self.grow()?;
            let right = self.parse_multiplicative()?;
            left = Expr::binary(op, left, right);
        }
        self.height = height;
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let height = self.height;
        let mut left = self.parse_unary()?;

        loop {
            let op = match &self.current().token {
                Token::Star => BinOp::Multiply,
                Token::Slash => BinOp::Divide,
                _ => break,
            };

            self.advance();
            self.grow()?;
            let right = self.parse_unary()?;
            left = Expr::binary(op, left, right);
        }
        self.height = height;
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if !self.check(&Token::Minus) {
            return self.parse_primary();
        }
        self.advance();
        self.descend()?;
        let operand = self.parse_unary()?;
        self.ascend();

        // Fold negative literals so `-5` is a literal, not an operation
        Ok(match operand {
            Expr::Literal(Value::Long(n)) if n.checked_neg().is_some() => Expr::long(-n),
            Expr::Literal(Value::Double(n)) => Expr::double(-n),
            operand => Expr::Unary {
                op: UnaryOp::Negate,
                operand: Box::new(operand),
            },
        })
    }

    /// Parse primary expressions: literals, identifiers, calls and `( ... )`
    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match &self.current().token {
            Token::Identifier(_) if matches!(self.peek(), Token::LParen) => self.parse_call(),
            Token::LParen => {
                self.advance();
                self.descend()?;
                let expr = self.parse_expression()?;
                self.ascend();
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Token::Long(_)
            | Token::Double(_)
            | Token::String(_)
            | Token::Boolean(_)
            | Token::Null
            | Token::Identifier(_) => Ok(match self.advance().token {
                Token::Long(n) => Expr::long(n),
                Token::Double(n) => Expr::double(n),
                Token::String(s) => Expr::string(s),
                Token::Boolean(b) => Expr::boolean(b),
                Token::Identifier(name) => Expr::Identifier(name),
                _ => Expr::Literal(Value::Null),
            }),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_call(&mut self) -> Result<Expr, ParseError> {
        let SpannedToken { token, position } = self.advance();
        let Token::Identifier(name) = token else {
            return Err(self.unexpected("function name"));
        };
        self.expect(Token::LParen)?;

        if self.check(&Token::RParen) {
            return Err(ParseError::EmptyArguments {
                position,
                function: name,
            });
        }

        self.descend()?;
        let loaded = match self.registry.convention(&name) {
            CallConvention::Arguments => {
                let args = self.parse_arguments()?;
                self.registry
                    .load(None, &name, None, args)
                    .map(Expr::Function)
            }
            CallConvention::Tagged => {
                let tag = self.parse_tag()?;
                let args = self.parse_remaining_arguments()?;
                self.registry
                    .load(Some(&name), &tag.name.clone(), Some(tag), args)
                    .map(Expr::Function)
            }
            CallConvention::Qualified => {
                let first = self.advance();
                let qualifier = match first.token {
                    Token::String(function) => Qualifier::Name(function),
                    Token::Identifier(field) => Qualifier::Identifier(field),
                    other => {
                        return Err(ParseError::Unexpected {
                            position: first.position,
                            expected: "function name string or qualifier identifier".to_string(),
                            found: other.to_string(),
                        });
                    }
                };
                let args = self.parse_remaining_arguments()?;
                self.registry.load_parser(qualifier, args)
            }
        };
        self.ascend();

        loaded.map_err(|e| match e {
            FunctionError::UnknownFunction(name) => ParseError::UnknownFunction { position, name },
            source => ParseError::InvalidArguments {
                position,
                function: name,
                source,
            },
        })
    }

    /// `expr (, expr)* )`
    fn parse_arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = vec![self.parse_expression()?];
        while self.check(&Token::Comma) {
            self.advance();
            args.push(self.parse_expression()?);
        }
        self.expect(Token::RParen)?;
        Ok(args)
    }

    /// Arguments after a leading tag or qualifier: `(, expr)* )`
    fn parse_remaining_arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        if self.check(&Token::Comma) {
            self.advance();
            self.parse_arguments()
        } else {
            self.expect(Token::RParen)?;
            Ok(Vec::new())
        }
    }

    /// `name` or `name[index]`
    fn parse_tag(&mut self) -> Result<Tag, ParseError> {
        let name = match &self.current().token {
            Token::Identifier(name) => name.clone(),
            _ => return Err(self.unexpected("tag identifier")),
        };
        self.advance();

        if !self.check(&Token::LBracket) {
            return Ok(Tag::new(name));
        }
        self.advance();
        let index = match self.current().token {
            Token::Long(n) => n,
            _ => return Err(self.unexpected("tag index")),
        };
        self.advance();
        self.expect(Token::RBracket)?;
        Ok(Tag::indexed(name, index))
    }
}

/// Parses `input` with the process-wide function registry.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    Parser::from_source(input, FunctionRegistry::global())?.parse()
}
