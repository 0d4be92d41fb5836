use std::{
    fmt,
    hash::{Hash, Hasher},
};

/// A scalar value produced by evaluating a selector.
///
/// Integers and floating point numbers are kept apart: `20` and `20.0` are
/// different values, even though they compare equal under `=`.
///
/// `Null` doubles as the "unknown" sentinel. An identifier the message does
/// not carry, arithmetic on a non-number, or a JSON path that leads nowhere
/// all evaluate to `Null`, which then takes part in three-valued logic.
///
/// # Examples
///
/// ```
/// use selector_lang::Value;
///
/// let long = Value::Long(42);
/// let double = Value::Double(4.2);
/// let string = Value::from("hello");
///
/// assert_eq!(long.as_f64(), Some(42.0));
/// assert_eq!(double.type_name(), "double");
/// assert_eq!(string.to_string(), "'hello'");
/// assert!(Value::Null.is_null());
/// ```
#[derive(Debug, Clone)]
pub enum Value {
    /// Unknown or absent
    Null,

    /// `TRUE` / `FALSE`
    Boolean(bool),

    /// 64-bit signed integer
    Long(i64),

    /// 64-bit float
    Double(f64),

    /// UTF-8 string
    String(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truth value for logical operators; anything but a boolean is unknown.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as float, promoting integers
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Long(n) => Some(*n as f64),
            Value::Double(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Long(_) => "long",
            Value::Double(_) => "double",
            Value::String(_) => "string",
        }
    }
}

// Structural equality: Long(1) != Double(1.0). All NaNs are equal to each
// other so that literal trees stay usable as hash keys.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => {
                (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
            }
            (Value::String(a), Value::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            Value::Long(n) => n.hash(state),
            Value::Double(n) if n.is_nan() => f64::NAN.to_bits().hash(state),
            Value::Double(n) => n.to_bits().hash(state),
            Value::String(s) => s.hash(state),
        }
    }
}

/// Renders the value as a selector literal.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Boolean(true) => f.write_str("TRUE"),
            Value::Boolean(false) => f.write_str("FALSE"),
            Value::Long(n) => write!(f, "{}", n),
            Value::Double(n) => write!(f, "{:?}", n),
            Value::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Long(n as i64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn long_and_double_are_distinct_values() {
        assert_ne!(Value::Long(20), Value::Double(20.0));
        assert_eq!(Value::Double(f64::NAN), Value::Double(f64::NAN));
    }

    #[test]
    fn values_hash_structurally() {
        let mut set = HashSet::new();
        set.insert(Value::from("a"));
        set.insert(Value::from("a"));
        set.insert(Value::Long(1));
        set.insert(Value::Double(1.0));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn display_quotes_strings() {
        assert_eq!(Value::from("it's").to_string(), "'it''s'");
        assert_eq!(Value::Double(20.0).to_string(), "20.0");
        assert_eq!(Value::Null.to_string(), "NULL");
    }
}
