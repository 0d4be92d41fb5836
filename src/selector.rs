//! Compiled selectors: the entry point for brokers.
//!
//! ```
//! use selector_lang::{compile, Message};
//!
//! let selector = compile("priority > 5 AND region IN ('EU', 'UK')").unwrap();
//! let message = Message::builder()
//!     .field("priority", 7)
//!     .field("region", "UK")
//!     .build();
//! assert!(selector.evaluate(&message).unwrap());
//! ```

use std::{
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use parking_lot::Mutex;
use tracing::debug;

use crate::{
    ast::Expr,
    evaluator::{EvalError, Evaluator},
    functions::FunctionRegistry,
    parser::{ParseError, Parser},
    resolver::IdentifierResolver,
    value::Value,
};

/// A selector compiled once and evaluated against many messages.
///
/// Immutable and `Send + Sync`; share it behind an `Arc` and evaluate from
/// as many threads as needed. Equality and hashing look at the compiled
/// tree, so differently spaced texts of the same selector are equal.
#[derive(Debug, Clone)]
pub struct CompiledSelector {
    text: String,
    root: Expr,
}

impl CompiledSelector {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn expression(&self) -> &Expr {
        &self.root
    }

    /// Whether the message is selected. Unknown results are not selected.
    pub fn evaluate(&self, resolver: &dyn IdentifierResolver) -> Result<bool, EvalError> {
        Evaluator::new(resolver).matches(&self.root)
    }

    /// The raw value of the expression, for selectors used as scalar functions.
    pub fn evaluate_value(&self, resolver: &dyn IdentifierResolver) -> Result<Value, EvalError> {
        Evaluator::new(resolver).evaluate(&self.root)
    }
}

impl PartialEq for CompiledSelector {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

impl Eq for CompiledSelector {}

impl Hash for CompiledSelector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.root.hash(state);
    }
}

impl fmt::Display for CompiledSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}

/// Compiles `text` against the process-wide function registry.
pub fn compile(text: &str) -> Result<CompiledSelector, ParseError> {
    compile_with(text, FunctionRegistry::global())
}

pub fn compile_with(
    text: &str,
    registry: Arc<FunctionRegistry>,
) -> Result<CompiledSelector, ParseError> {
    let root = Parser::from_source(text, registry)?.parse()?;
    debug!(selector = text, "compiled selector");
    Ok(CompiledSelector {
        text: text.to_string(),
        root,
    })
}

/// Compiles each distinct selector text once.
pub struct SelectorCache {
    registry: Arc<FunctionRegistry>,
    entries: Mutex<HashMap<String, Arc<CompiledSelector>>>,
}

impl SelectorCache {
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        SelectorCache {
            registry,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn compile(&self, text: &str) -> Result<Arc<CompiledSelector>, ParseError> {
        if let Some(selector) = self.entries.lock().get(text) {
            debug!(selector = text, "selector served from cache");
            return Ok(selector.clone());
        }

        // Compiled without holding the lock; a concurrent compile of the same text loses
        let compiled = Arc::new(compile_with(text, self.registry.clone())?);
        Ok(self
            .entries
            .lock()
            .entry(text.to_string())
            .or_insert(compiled)
            .clone())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for SelectorCache {
    fn default() -> Self {
        Self::new(FunctionRegistry::global())
    }
}
