use std::{borrow::Cow, collections::HashMap};

use serde_json::Value as JsonValue;

use crate::{json, value::Value};

/// Supplies attribute values to a selector while it is evaluated.
///
/// Implemented by whatever carries the message. `resolve` returns `None` for
/// an attribute the message does not have; the selector treats that as
/// unknown rather than as an error.
///
/// The opaque payload is optional. Resolvers that can decode it once and
/// keep the result should override [`IdentifierResolver::payload`];
/// the default decodes `opaque_data` on every call.
///
/// # Examples
///
/// ```
/// use selector_lang::{IdentifierResolver, Value};
///
/// let resolver = |name: &str| match name {
///     "temperature" => Some(Value::Double(20.9)),
///     _ => None,
/// };
/// assert_eq!(resolver.resolve("temperature"), Some(Value::Double(20.9)));
/// assert_eq!(resolver.resolve("humidity"), None);
/// ```
pub trait IdentifierResolver {
    fn resolve(&self, name: &str) -> Option<Value>;

    /// Raw message body, if any.
    fn opaque_data(&self) -> Option<&[u8]> {
        None
    }

    /// The message body decoded as JSON, `None` when absent or undecodable.
    fn payload(&self) -> Option<Cow<'_, JsonValue>> {
        self.opaque_data()
            .and_then(json::decode_payload)
            .map(Cow::Owned)
    }
}

impl<F> IdentifierResolver for F
where
    F: Fn(&str) -> Option<Value>,
{
    fn resolve(&self, name: &str) -> Option<Value> {
        self(name)
    }
}

impl IdentifierResolver for HashMap<String, Value> {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// Resolves nothing. Useful for selectors made only of literals.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyResolver;

impl IdentifierResolver for EmptyResolver {
    fn resolve(&self, _name: &str) -> Option<Value> {
        None
    }
}
