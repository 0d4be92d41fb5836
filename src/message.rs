//! A minimal message: named attributes plus an opaque body.
//!
//! Brokers normally implement [`IdentifierResolver`] on their own envelope
//! type. This one is enough for tests, the command line tool and embedding
//! code that has no envelope of its own.

use std::{borrow::Cow, collections::HashMap};

use once_cell::sync::OnceCell;
use serde_json::Value as JsonValue;

use crate::{json, resolver::IdentifierResolver, value::Value};

#[derive(Debug, Default)]
pub struct Message {
    fields: HashMap<String, Value>,
    opaque_data: Option<Vec<u8>>,
    decoded: OnceCell<Option<JsonValue>>,
}

impl Message {
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    pub fn fields(&self) -> &HashMap<String, Value> {
        &self.fields
    }
}

impl IdentifierResolver for Message {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }

    fn opaque_data(&self) -> Option<&[u8]> {
        self.opaque_data.as_deref()
    }

    // Decoded at most once per message, however many selectors look at it
    fn payload(&self) -> Option<Cow<'_, JsonValue>> {
        self.decoded
            .get_or_init(|| self.opaque_data.as_deref().and_then(json::decode_payload))
            .as_ref()
            .map(Cow::Borrowed)
    }
}

#[derive(Debug, Default)]
pub struct MessageBuilder {
    fields: HashMap<String, Value>,
    opaque_data: Option<Vec<u8>>,
}

impl MessageBuilder {
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn data_map(mut self, fields: HashMap<String, Value>) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn opaque_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.opaque_data = Some(data.into());
        self
    }

    pub fn build(self) -> Message {
        Message {
            fields: self.fields,
            opaque_data: self.opaque_data,
            decoded: OnceCell::new(),
        }
    }
}
