//! JSON payload decoding and dotted-path lookup.
//!
//! A path such as `arrayData.1.bill` is split on `.` and walked one segment
//! at a time. Numeric segments index arrays; every other segment (and a
//! numeric one applied to an object) is an object key. Anything that does
//! not line up with the document resolves to [`Value::Null`].
//!
//! Payloads are decoded strictly first. Bodies that are not valid JSON get
//! a second, lenient pass that accepts the relaxed notation some producers
//! emit: unquoted keys, `;` between members, `=` between key and value and
//! single-quoted strings.
//!
//! ```
//! use selector_lang::json::{JsonPath, decode_payload};
//! use selector_lang::Value;
//!
//! let doc = decode_payload(b"{test:10; second:{value:430}}").unwrap();
//! assert_eq!(JsonPath::parse("second.value").lookup(&doc), Value::Long(430));
//! ```

use std::{fmt, str::FromStr};

use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde_json::{Map, Number, Value as JsonValue};

use crate::value::Value;

/// Decodes a message body, returning `None` for empty or undecodable bodies.
pub fn decode_payload(bytes: &[u8]) -> Option<JsonValue> {
    let text = std::str::from_utf8(bytes).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str(text) {
        Ok(value) => Some(value),
        Err(_) => LenientReader::new(text).read_document(),
    }
}

/// Converts a terminal JSON node into a selector value.
///
/// Integral numbers that fit a long become [`Value::Long`], all other
/// numbers [`Value::Double`]. Objects, arrays and `null` are not scalars
/// and map to [`Value::Null`].
pub fn to_value(node: &JsonValue) -> Value {
    match node {
        JsonValue::Bool(b) => Value::Boolean(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Long(i),
            None => n.as_f64().map(Value::Double).unwrap_or(Value::Null),
        },
        JsonValue::String(s) => Value::String(s.clone()),
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => Value::Null,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Segment {
    key: String,
    index: Option<usize>,
}

/// A pre-split dotted path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JsonPath {
    segments: Vec<Segment>,
}

impl JsonPath {
    pub fn parse(path: &str) -> Self {
        let segments = path
            .split('.')
            .map(|part| Segment {
                key: part.to_string(),
                index: part
                    .bytes()
                    .all(|b| b.is_ascii_digit())
                    .then(|| part.parse::<usize>().ok())
                    .flatten(),
            })
            .collect();
        JsonPath { segments }
    }

    /// Walks the path from `root`; returns the node it lands on.
    pub fn walk<'a>(&self, root: &'a JsonValue) -> Option<&'a JsonValue> {
        self.segments
            .iter()
            .try_fold(root, |node, segment| match (node, segment.index) {
                (JsonValue::Array(items), Some(index)) => items.get(index),
                (JsonValue::Array(_), None) => None,
                (JsonValue::Object(map), _) => map.get(&segment.key),
                _ => None,
            })
    }

    pub fn lookup(&self, root: &JsonValue) -> Value {
        self.walk(root).map(to_value).unwrap_or(Value::Null)
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(&segment.key)?;
        }
        Ok(())
    }
}

/// Same nesting limit serde_json applies to strict documents.
const MAX_NESTING: usize = 128;

/// Reader for relaxed JSON. Returns `None` on anything it cannot make sense of,
/// including containers nested deeper than [`MAX_NESTING`].
struct LenientReader {
    input: Vec<char>,
    position: usize,
    depth: usize,
}

impl LenientReader {
    fn new(input: &str) -> Self {
        LenientReader {
            input: input.chars().collect(),
            position: 0,
            depth: 0,
        }
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while self.current_char().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn eat(&mut self, ch: char) -> bool {
        self.skip_whitespace();
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn read_document(mut self) -> Option<JsonValue> {
        let value = self.read_value()?;
        self.skip_whitespace();
        self.current_char().is_none().then_some(value)
    }

    fn read_value(&mut self) -> Option<JsonValue> {
        self.skip_whitespace();
        match self.current_char()? {
            open @ ('{' | '[') => {
                if self.depth >= MAX_NESTING {
                    return None;
                }
                self.depth += 1;
                let value = if open == '{' {
                    self.read_object()
                } else {
                    self.read_array()
                };
                self.depth -= 1;
                value
            }
            quote @ ('"' | '\'') => self.read_string(quote).map(JsonValue::String),
            _ => self.read_word().map(|word| word_to_json(&word)),
        }
    }

    fn read_object(&mut self) -> Option<JsonValue> {
        self.advance(); // {
        let mut map = Map::new();

        loop {
            if self.eat('}') {
                return Some(JsonValue::Object(map));
            }
            self.skip_whitespace();
            let key = match self.current_char()? {
                quote @ ('"' | '\'') => self.read_string(quote)?,
                _ => self.read_word()?,
            };
            if !(self.eat(':') || self.eat('=')) {
                return None;
            }
            let value = self.read_value()?;
            map.insert(key, value);

            if !(self.eat(',') || self.eat(';')) {
                return self.eat('}').then_some(JsonValue::Object(map));
            }
        }
    }

    fn read_array(&mut self) -> Option<JsonValue> {
        self.advance(); // [
        let mut items = Vec::new();

        loop {
            if self.eat(']') {
                return Some(JsonValue::Array(items));
            }
            items.push(self.read_value()?);
            if !(self.eat(',') || self.eat(';')) {
                return self.eat(']').then_some(JsonValue::Array(items));
            }
        }
    }

    fn read_string(&mut self, quote: char) -> Option<String> {
        let mut result = String::new();
        self.advance(); // opening quote

        while let Some(ch) = self.current_char() {
            match ch {
                c if c == quote => {
                    self.advance();
                    return Some(result);
                }
                '\\' => {
                    self.advance();
                    let escaped = match self.current_char()? {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        'b' => '\u{8}',
                        'f' => '\u{c}',
                        'u' => {
                            let hex: String = self
                                .input
                                .get(self.position + 1..self.position + 5)?
                                .iter()
                                .collect();
                            self.position += 4;
                            char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?
                        }
                        other => other,
                    };
                    result.push(escaped);
                    self.advance();
                }
                _ => {
                    result.push(ch);
                    self.advance();
                }
            }
        }

        None
    }

    fn read_word(&mut self) -> Option<String> {
        let mut word = String::new();
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() || matches!(ch, ',' | ';' | ':' | '=' | '{' | '}' | '[' | ']') {
                break;
            }
            word.push(ch);
            self.advance();
        }
        (!word.is_empty()).then_some(word)
    }
}

fn word_to_json(word: &str) -> JsonValue {
    match word {
        "true" => JsonValue::Bool(true),
        "false" => JsonValue::Bool(false),
        "null" => JsonValue::Null,
        _ => number_to_json(word).unwrap_or_else(|| JsonValue::String(word.to_string())),
    }
}

fn number_to_json(word: &str) -> Option<JsonValue> {
    let first = word.chars().next()?;
    if !(first.is_ascii_digit() || first == '-' || first == '+') {
        return None;
    }
    let decimal = if word.contains(['e', 'E']) {
        Decimal::from_scientific(word).ok()?
    } else {
        Decimal::from_str(word).ok()?
    };
    let integral = !word.contains(['.', 'e', 'E']);

    if integral && let Some(n) = decimal.to_i64() {
        return Some(JsonValue::Number(n.into()));
    }
    Number::from_f64(decimal.to_f64()?).map(JsonValue::Number)
}
