use std::fmt;

/// Location of a token in the selector text.
///
/// `offset` counts characters (not bytes) from the start of the input,
/// `line` and `column` are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn start() -> Self {
        Position {
            offset: 0,
            line: 1,
            column: 1,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    /// Decimal number
    ///
    /// # Examples
    /// ```text
    /// 3.14
    /// 1.5e3
    /// ```
    Double(f64),

    /// Integer
    ///
    /// # Examples
    /// ```text
    /// 42
    /// 0
    /// ```
    Long(i64),

    /// String literal enclosed in single quotes, `''` escapes a quote
    ///
    /// # Examples
    /// ```text
    /// 'hello'
    /// 'it''s'
    /// ```
    String(String),

    /// `TRUE` or `FALSE`, in any case
    Boolean(bool),

    // Identifiers
    /// Attribute name or function name
    ///
    /// Starts with a letter, `_` or `$`, continues with letters, digits,
    /// `_`, `$` and `.`. Unicode letters and numerics are accepted.
    ///
    /// # Examples
    /// ```text
    /// temperature
    /// secondLevel.data
    /// CO₂
    /// ```
    Identifier(String),

    // Keywords
    And,
    Or,
    Not,
    Like,
    Escape,
    Between,
    In,
    Is,
    Null,

    // Comparison
    /// `=`
    Eq,
    /// `<>`
    NotEq,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    LtEq,
    /// `>=`
    GtEq,

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,

    // Delimiters
    LParen,
    RParen,

    /// Only valid inside a tagged function argument, `applypca[2]`
    LBracket,
    RBracket,

    Comma,

    /// End of input
    Eof,
}

impl Token {
    /// Maps a word to its keyword token, ignoring case.
    pub fn keyword(word: &str) -> Option<Token> {
        let token = match word.to_ascii_uppercase().as_str() {
            "AND" => Token::And,
            "OR" => Token::Or,
            "NOT" => Token::Not,
            "LIKE" => Token::Like,
            "ESCAPE" => Token::Escape,
            "BETWEEN" => Token::Between,
            "IN" => Token::In,
            "IS" => Token::Is,
            "NULL" => Token::Null,
            "TRUE" => Token::Boolean(true),
            "FALSE" => Token::Boolean(false),
            _ => return None,
        };
        Some(token)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Double(n) => write!(f, "{:?}", n),
            Token::Long(n) => write!(f, "{}", n),
            Token::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Token::Boolean(true) => f.write_str("TRUE"),
            Token::Boolean(false) => f.write_str("FALSE"),
            Token::Identifier(name) => f.write_str(name),
            Token::And => f.write_str("AND"),
            Token::Or => f.write_str("OR"),
            Token::Not => f.write_str("NOT"),
            Token::Like => f.write_str("LIKE"),
            Token::Escape => f.write_str("ESCAPE"),
            Token::Between => f.write_str("BETWEEN"),
            Token::In => f.write_str("IN"),
            Token::Is => f.write_str("IS"),
            Token::Null => f.write_str("NULL"),
            Token::Eq => f.write_str("="),
            Token::NotEq => f.write_str("<>"),
            Token::Lt => f.write_str("<"),
            Token::Gt => f.write_str(">"),
            Token::LtEq => f.write_str("<="),
            Token::GtEq => f.write_str(">="),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::LBracket => f.write_str("["),
            Token::RBracket => f.write_str("]"),
            Token::Comma => f.write_str(","),
            Token::Eof => f.write_str("end of input"),
        }
    }
}

/// A token together with the position of its first character.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub position: Position,
}
