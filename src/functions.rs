//! # Function Registry
//!
//! Selectors call functions by name: `json('order.total')`,
//! `model_exists(scd41.arff)`, `pca(applypca[2], scd41.arff, CO₂)`.
//! A [`FunctionRegistry`] maps each name to a factory that checks the
//! arguments and produces a [`FunctionOperator`]. The parser binds every call
//! when the selector is compiled, so an unknown function or a bad argument
//! list is a compile error.
//!
//! ## Call Conventions
//!
//! How the parser reads the argument list is configured per function family
//! when the family is registered (see [`CallConvention`]):
//!
//! - `Arguments` - every argument is an expression: `json('a.b')`
//! - `Tagged` - the first argument names the family member, optionally with
//!   an index: `pca(applypca[2], model, x, y)` looks up `applypca` in the
//!   `pca` family
//! - `Qualified` - the first argument names the function to call. A string
//!   literal is looked up at compile time, `parse('json', 'a')`. A bare
//!   identifier is read from the message at evaluation time,
//!   `parse(protocol, 'a')`, and an unknown name makes the call `FALSE`.
//!
//! ## Identity
//!
//! Bound calls compare and hash by family, name, tag and arguments, never by
//! address. [`FunctionRegistry::load`] also interns them, so compiling the
//! same call twice hands back the same shared [`FunctionCall`]. The pool only
//! holds weak references: a call leaves it once the last expression using it
//! is dropped.
//!
//! ## Lifecycle
//!
//! Register everything before sharing the registry; registration needs
//! `&mut self` and the shared registry is read-only. The intern pool is the
//! only interior state and is guarded by a mutex.

pub mod json;
pub mod ml;

use std::{
    collections::{HashMap, hash_map::RandomState},
    fmt,
    hash::{BuildHasher, Hash, Hasher},
    sync::{Arc, Weak},
};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::trace;

use crate::{
    ast::{Expr, QualifiedCall},
    model::{ModelError, ModelStoreRef},
    resolver::IdentifierResolver,
    value::Value,
};

#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Function '{function}' expects {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: String,
        found: usize,
    },

    #[error("Function '{function}': {reason}")]
    InvalidArgument { function: String, reason: String },

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// A computation callable from a selector.
///
/// Operators are built by a registry factory and may keep whatever they
/// took from the argument list at that point (a pre-split path, a model
/// name). Those leading arguments are reported by `bound_arguments`; the
/// rest are evaluated on every call and passed to `compute` in order.
pub trait FunctionOperator: Send + Sync {
    fn name(&self) -> &str;

    /// Number of leading arguments consumed when the call was bound.
    fn bound_arguments(&self) -> usize {
        0
    }

    fn compute(
        &self,
        args: &[Value],
        resolver: &dyn IdentifierResolver,
    ) -> Result<Value, FunctionError>;

    /// Canonical text of a call to this operator.
    fn render(&self, call: &FunctionCall, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (call.family(), call.tag()) {
            (Some(family), Some(tag)) => {
                write!(f, "{}({}", family, tag)?;
                for arg in call.args() {
                    write!(f, ", {}", arg)?;
                }
            }
            _ => {
                write!(f, "{}(", call.name())?;
                for (i, arg) in call.args().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
            }
        }
        f.write_str(")")
    }
}

/// Leading sub-selector of a tagged call, `applypca[2]` or `distance`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    pub name: String,
    pub index: Option<i64>,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Tag {
            name: name.into(),
            index: None,
        }
    }

    pub fn indexed(name: impl Into<String>, index: i64) -> Self {
        Tag {
            name: name.into(),
            index: Some(index),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(index) = self.index {
            write!(f, "[{}]", index)?;
        }
        Ok(())
    }
}

/// What a factory gets to look at when binding a call.
#[derive(Debug, Clone, Copy)]
pub struct FunctionArgs<'a> {
    pub family: Option<&'a str>,
    pub name: &'a str,
    pub tag: Option<&'a Tag>,
    pub args: &'a [Expr],
}

impl FunctionArgs<'_> {
    /// Fails unless there are between `min` and `max` arguments.
    pub fn expect_arity(&self, min: usize, max: Option<usize>) -> Result<(), FunctionError> {
        let found = self.args.len();
        if found >= min && max.is_none_or(|max| found <= max) {
            return Ok(());
        }
        let expected = match max {
            Some(max) if max == min => min.to_string(),
            Some(max) => format!("{} to {}", min, max),
            None => format!("at least {}", min),
        };
        Err(FunctionError::Arity {
            function: self.name.to_string(),
            expected,
            found,
        })
    }

    pub fn invalid(&self, reason: impl Into<String>) -> FunctionError {
        FunctionError::InvalidArgument {
            function: self.name.to_string(),
            reason: reason.into(),
        }
    }
}

pub type FunctionFactory = Arc<
    dyn Fn(&FunctionArgs<'_>) -> Result<Arc<dyn FunctionOperator>, FunctionError> + Send + Sync,
>;

/// How the parser reads the argument list of a function family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallConvention {
    #[default]
    Arguments,
    Tagged,
    Qualified,
}

/// A call bound to its operator.
pub struct FunctionCall {
    family: Option<String>,
    name: String,
    tag: Option<Tag>,
    args: Vec<Expr>,
    operator: Arc<dyn FunctionOperator>,
}

impl FunctionCall {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Option<&Tag> {
        self.tag.as_ref()
    }

    /// All arguments as written, excluding the tag.
    pub fn args(&self) -> &[Expr] {
        &self.args
    }

    /// Arguments evaluated on every call.
    pub fn operands(&self) -> &[Expr] {
        let skip = self.operator.bound_arguments().min(self.args.len());
        &self.args[skip..]
    }

    pub fn operator(&self) -> &Arc<dyn FunctionOperator> {
        &self.operator
    }
}

impl PartialEq for FunctionCall {
    fn eq(&self, other: &Self) -> bool {
        self.family == other.family
            && self.name == other.name
            && self.tag == other.tag
            && self.args == other.args
    }
}

impl Eq for FunctionCall {}

impl Hash for FunctionCall {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.family.hash(state);
        self.name.hash(state);
        self.tag.hash(state);
        self.args.hash(state);
    }
}

impl fmt::Debug for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionCall")
            .field("family", &self.family)
            .field("name", &self.name)
            .field("tag", &self.tag)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.operator.render(self, f)
    }
}

/// Where a qualified call gets its function name from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Qualifier {
    /// Function name given in the selector text
    Name(String),
    /// Message attribute holding the function name
    Identifier(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FunctionKey {
    family: Option<String>,
    name: String,
}

impl FunctionKey {
    fn new(family: Option<&str>, name: &str) -> Self {
        FunctionKey {
            family: family.map(str::to_lowercase),
            name: name.to_lowercase(),
        }
    }
}

static GLOBAL: Lazy<Arc<FunctionRegistry>> =
    Lazy::new(|| Arc::new(FunctionRegistry::with_builtins(ModelStoreRef::Current)));

/// Bound calls bucketed by structural hash, held weakly.
#[derive(Default)]
struct InternPool {
    hasher: RandomState,
    buckets: HashMap<u64, Vec<Weak<FunctionCall>>>,
    sweep_at: usize,
}

impl InternPool {
    fn get_or_insert(&mut self, call: FunctionCall) -> Arc<FunctionCall> {
        let hash = self.hasher.hash_one(&call);
        let bucket = self.buckets.entry(hash).or_default();
        if let Some(existing) = bucket
            .iter()
            .filter_map(Weak::upgrade)
            .find(|live| **live == call)
        {
            trace!(function = %call.name, "reusing interned function call");
            return existing;
        }

        bucket.retain(|entry| entry.strong_count() > 0);
        let call = Arc::new(call);
        bucket.push(Arc::downgrade(&call));

        if self.buckets.len() >= self.sweep_at {
            self.sweep();
        }
        call
    }

    /// Drops buckets whose calls are all gone.
    fn sweep(&mut self) {
        self.buckets.retain(|_, bucket| {
            bucket.retain(|entry| entry.strong_count() > 0);
            !bucket.is_empty()
        });
        self.sweep_at = (self.buckets.len() * 2).max(64);
    }

    fn live(&self) -> usize {
        self.buckets
            .values()
            .flatten()
            .filter(|entry| entry.strong_count() > 0)
            .count()
    }
}

#[derive(Default)]
pub struct FunctionRegistry {
    factories: HashMap<FunctionKey, FunctionFactory>,
    conventions: HashMap<String, CallConvention>,
    interned: Mutex<InternPool>,
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in functions. Model functions use `store`.
    pub fn with_builtins(store: ModelStoreRef) -> Self {
        let mut registry = Self::new();
        json::register(&mut registry);
        ml::register(&mut registry, store);
        registry
    }

    /// The process-wide registry with built-ins bound to the current model store.
    pub fn global() -> Arc<FunctionRegistry> {
        GLOBAL.clone()
    }

    /// Registers a factory under `name`, inside `family` when given.
    /// Names are case-insensitive; a later registration replaces an earlier one.
    pub fn register<F>(&mut self, family: Option<&str>, name: &str, factory: F)
    where
        F: Fn(&FunctionArgs<'_>) -> Result<Arc<dyn FunctionOperator>, FunctionError>
            + Send
            + Sync
            + 'static,
    {
        self.factories
            .insert(FunctionKey::new(family, name), Arc::new(factory));
    }

    /// Sets how calls spelled `family(...)` are parsed.
    pub fn register_family(&mut self, family: &str, convention: CallConvention) {
        self.conventions.insert(family.to_lowercase(), convention);
    }

    pub fn convention(&self, name: &str) -> CallConvention {
        self.conventions
            .get(&name.to_lowercase())
            .copied()
            .unwrap_or_default()
    }

    pub fn contains(&self, family: Option<&str>, name: &str) -> bool {
        self.factories.contains_key(&FunctionKey::new(family, name))
    }

    /// Builds an operator for the given call without binding or interning it.
    pub fn operator(
        &self,
        family: Option<&str>,
        name: &str,
        tag: Option<&Tag>,
        args: &[Expr],
    ) -> Result<Arc<dyn FunctionOperator>, FunctionError> {
        let key = FunctionKey::new(family, name);
        let factory = self.factories.get(&key).ok_or_else(|| {
            FunctionError::UnknownFunction(match family {
                Some(family) => format!("{}({})", family, name),
                None => name.to_string(),
            })
        })?;
        factory(&FunctionArgs {
            family: key.family.as_deref(),
            name: &key.name,
            tag,
            args,
        })
    }

    /// Binds a call and returns the shared instance for it.
    pub fn load(
        &self,
        family: Option<&str>,
        name: &str,
        tag: Option<Tag>,
        args: Vec<Expr>,
    ) -> Result<Arc<FunctionCall>, FunctionError> {
        let operator = self.operator(family, name, tag.as_ref(), &args)?;
        let key = FunctionKey::new(family, name);
        let call = FunctionCall {
            family: key.family,
            name: key.name,
            tag,
            args,
            operator,
        };
        Ok(self.intern(call))
    }

    /// Loads a payload parser, either by name or through a message attribute.
    pub fn load_parser(
        self: &Arc<Self>,
        qualifier: Qualifier,
        args: Vec<Expr>,
    ) -> Result<Expr, FunctionError> {
        match qualifier {
            Qualifier::Name(name) => Ok(Expr::Function(self.load(None, &name, None, args)?)),
            Qualifier::Identifier(field) => {
                if args.is_empty() {
                    return Err(FunctionError::Arity {
                        function: "parse".to_string(),
                        expected: "at least 1".to_string(),
                        found: 0,
                    });
                }
                Ok(Expr::QualifiedCall(QualifiedCall::new(
                    field,
                    args,
                    self.clone(),
                )))
            }
        }
    }

    fn intern(&self, call: FunctionCall) -> Arc<FunctionCall> {
        self.interned.lock().get_or_insert(call)
    }

    /// Number of distinct bound calls still held by a live expression.
    pub fn interned_len(&self) -> usize {
        self.interned.lock().live()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self
            .factories
            .keys()
            .map(|key| match &key.family {
                Some(family) => format!("{}.{}", family, key.name),
                None => key.name.clone(),
            })
            .collect();
        names.sort();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .field("conventions", &self.conventions)
            .finish_non_exhaustive()
    }
}
