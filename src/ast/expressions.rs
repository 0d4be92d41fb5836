use std::{
    collections::{HashMap, HashSet},
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use parking_lot::RwLock;
use regex::Regex;

use crate::{
    ast::{BinOp, UnaryOp},
    functions::{FunctionCall, FunctionError, FunctionOperator, FunctionRegistry},
    value::Value,
};

/// Abstract Syntax Tree node representing a compiled selector expression.
///
/// Trees are immutable once built and own their children, so a tree can be
/// evaluated from many threads at once. Equality and hashing are
/// structural: two compilations of the same text produce equal trees.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Literal value
    ///
    /// # Examples
    /// ```text
    /// 42
    /// 'hello'
    /// TRUE
    /// ```
    Literal(Value),

    /// Message attribute reference, resolved at evaluation time
    ///
    /// # Examples
    /// ```text
    /// temperature
    /// header.priority
    /// ```
    Identifier(String),

    /// `NOT expr` or `-expr`
    Unary { op: UnaryOp, operand: Box<Expr> },

    /// Binary operation (arithmetic, comparison, logical)
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Inclusive range test
    ///
    /// # Example
    /// ```text
    /// age BETWEEN 18 AND 65
    /// ```
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },

    /// Membership test against a literal list
    ///
    /// # Example
    /// ```text
    /// country IN ('UK', 'US', 'NZ')
    /// ```
    In {
        expr: Box<Expr>,
        list: ValueSet,
        negated: bool,
    },

    /// Wildcard match, `%` for any run and `_` for any single character
    ///
    /// # Example
    /// ```text
    /// name LIKE 'a\_%' ESCAPE '\'
    /// ```
    Like {
        expr: Box<Expr>,
        pattern: LikePattern,
        negated: bool,
    },

    /// `expr IS NULL` / `expr IS NOT NULL`
    IsNull { expr: Box<Expr>, negated: bool },

    /// Call bound to a registered function when the selector was compiled
    ///
    /// # Examples
    /// ```text
    /// json('secondLevel.data')
    /// pca(applypca[2], scd41.arff, CO₂, temperature, humidity)
    /// ```
    Function(Arc<FunctionCall>),

    /// Call whose function name is read from a message attribute when the
    /// selector is evaluated
    ///
    /// # Example
    /// ```text
    /// parse(protocol, 'value')
    /// ```
    QualifiedCall(QualifiedCall),
}

impl Expr {
    pub fn long(n: i64) -> Self {
        Expr::Literal(Value::Long(n))
    }

    pub fn double(n: f64) -> Self {
        Expr::Literal(Value::Double(n))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Expr::Literal(Value::String(s.into()))
    }

    pub fn boolean(b: bool) -> Self {
        Expr::Literal(Value::Boolean(b))
    }

    pub fn identifier(name: impl Into<String>) -> Self {
        Expr::Identifier(name.into())
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// The literal string or identifier name, if this node is one.
    ///
    /// Functions use this for arguments that name something (a model, a
    /// path) instead of producing a value.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Expr::Literal(Value::String(s)) => Some(s),
            Expr::Identifier(name) => Some(name),
            _ => None,
        }
    }
}

/// Canonical, deterministic rendering. Compound sub-expressions are
/// parenthesised so the output re-parses to the same tree.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::Identifier(name) => f.write_str(name),
            Expr::Unary { op, operand } => {
                write!(f, "{}", op)?;
                write_operand(f, operand)
            }
            Expr::Binary { op, left, right } => {
                write_operand(f, left)?;
                write!(f, " {} ", op)?;
                write_operand(f, right)
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                write_operand(f, expr)?;
                f.write_str(if *negated { " NOT BETWEEN " } else { " BETWEEN " })?;
                write_operand(f, low)?;
                f.write_str(" AND ")?;
                write_operand(f, high)
            }
            Expr::In {
                expr,
                list,
                negated,
            } => {
                write_operand(f, expr)?;
                f.write_str(if *negated { " NOT IN (" } else { " IN (" })?;
                for (i, value) in list.values().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                f.write_str(")")
            }
            Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                write_operand(f, expr)?;
                f.write_str(if *negated { " NOT LIKE " } else { " LIKE " })?;
                write!(f, "{}", Value::String(pattern.pattern().to_string()))?;
                if let Some(escape) = pattern.escape() {
                    write!(f, " ESCAPE {}", Value::String(escape.to_string()))?;
                }
                Ok(())
            }
            Expr::IsNull { expr, negated } => {
                write_operand(f, expr)?;
                f.write_str(if *negated { " IS NOT NULL" } else { " IS NULL" })
            }
            Expr::Function(call) => write!(f, "{}", call),
            Expr::QualifiedCall(call) => write!(f, "{}", call),
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expr) -> fmt::Result {
    match expr {
        Expr::Literal(_) | Expr::Identifier(_) | Expr::Function(_) | Expr::QualifiedCall(_) => {
            write!(f, "{}", expr)
        }
        _ => write!(f, "({})", expr),
    }
}

/// The literal list of an `IN` test.
///
/// Keeps the list in source order (for rendering and identity) next to a
/// hash set used for membership checks.
#[derive(Debug, Clone)]
pub struct ValueSet {
    values: Vec<Value>,
    set: HashSet<Value>,
}

impl ValueSet {
    pub fn new(values: Vec<Value>) -> Self {
        let mut set = HashSet::with_capacity(values.len());
        let values = values
            .into_iter()
            .filter(|v| set.insert(v.clone()))
            .collect();
        ValueSet { values, set }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Membership with numeric promotion, so `5 IN (5.0)` holds.
    pub fn contains(&self, value: &Value) -> bool {
        if self.set.contains(value) {
            return true;
        }
        match value {
            Value::Long(n) => self.set.contains(&Value::Double(*n as f64)),
            Value::Double(d) if d.fract() == 0.0 && d.is_finite() => {
                self.set.contains(&Value::Long(*d as i64))
            }
            _ => false,
        }
    }
}

impl PartialEq for ValueSet {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl Eq for ValueSet {}

impl Hash for ValueSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.values.hash(state);
    }
}

/// A `LIKE` pattern compiled to an anchored regular expression.
#[derive(Debug, Clone)]
pub struct LikePattern {
    pattern: String,
    escape: Option<char>,
    regex: Regex,
}

impl LikePattern {
    pub fn new(pattern: &str, escape: Option<char>) -> Result<Self, regex::Error> {
        let regex = Regex::new(&like_to_regex(pattern, escape))?;
        Ok(LikePattern {
            pattern: pattern.to_string(),
            escape,
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn escape(&self) -> Option<char> {
        self.escape
    }

    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for LikePattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && self.escape == other.escape
    }
}

impl Eq for LikePattern {}

impl Hash for LikePattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pattern.hash(state);
        self.escape.hash(state);
    }
}

fn like_to_regex(pattern: &str, escape: Option<char>) -> String {
    let mut result = String::with_capacity(pattern.len() * 2 + 8);
    result.push_str("(?s)^");
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        if Some(c) == escape {
            // Escaped character is taken literally; a trailing escape matches itself
            let literal = chars.next().unwrap_or(c);
            result.push_str(&regex::escape(&literal.to_string()));
            continue;
        }
        match c {
            '%' => result.push_str(".*"),
            '_' => result.push('.'),
            _ => result.push_str(&regex::escape(&c.to_string())),
        }
    }

    result.push('$');
    result
}

/// A function call whose name comes from a message attribute.
///
/// The attribute is resolved on every evaluation and looked up in the
/// registry captured at compile time. An unknown name makes the call
/// evaluate to `FALSE` instead of failing. Operators bound for a name are
/// kept for later messages; clones share them.
#[derive(Clone)]
pub struct QualifiedCall {
    pub qualifier: String,
    pub args: Vec<Expr>,
    pub registry: Arc<FunctionRegistry>,
    operators: Arc<RwLock<HashMap<String, Arc<dyn FunctionOperator>>>>,
}

impl QualifiedCall {
    pub fn new(qualifier: String, args: Vec<Expr>, registry: Arc<FunctionRegistry>) -> Self {
        QualifiedCall {
            qualifier,
            args,
            registry,
            operators: Arc::default(),
        }
    }

    /// The operator for `name`, binding it on first use. Only successful
    /// bindings are kept, so the cache never outgrows the registry.
    pub fn bind(&self, name: &str) -> Result<Arc<dyn FunctionOperator>, FunctionError> {
        let key = name.to_lowercase();
        if let Some(operator) = self.operators.read().get(&key) {
            return Ok(operator.clone());
        }
        let operator = self.registry.operator(None, &key, None, &self.args)?;
        self.operators.write().insert(key, operator.clone());
        Ok(operator)
    }
}

impl fmt::Debug for QualifiedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QualifiedCall")
            .field("qualifier", &self.qualifier)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

impl PartialEq for QualifiedCall {
    fn eq(&self, other: &Self) -> bool {
        self.qualifier == other.qualifier && self.args == other.args
    }
}

impl Eq for QualifiedCall {}

impl Hash for QualifiedCall {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.qualifier.hash(state);
        self.args.hash(state);
    }
}

impl fmt::Display for QualifiedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse({}", self.qualifier)?;
        for arg in &self.args {
            write!(f, ", {}", arg)?;
        }
        f.write_str(")")
    }
}
