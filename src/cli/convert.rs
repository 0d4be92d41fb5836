//! JSON <-> selector Value conversion utilities

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use crate::{Value, cli::CliError};

/// Reads a JSON object of scalars into message fields.
///
/// `null` members are dropped so the attribute is absent, which is how a
/// selector sees a missing value anyway.
pub fn fields_from_json(text: &str) -> Result<HashMap<String, Value>, CliError> {
    let JsonValue::Object(members) = serde_json::from_str::<JsonValue>(text)? else {
        return Err(CliError::InvalidFields);
    };

    let mut fields = HashMap::with_capacity(members.len());
    for (name, member) in members {
        let value = match member {
            JsonValue::Null => continue,
            JsonValue::Bool(b) => Value::Boolean(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Long(i),
                None => Value::Double(n.as_f64().ok_or(CliError::InvalidFields)?),
            },
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(_) | JsonValue::Object(_) => return Err(CliError::InvalidFields),
        };
        fields.insert(name, value);
    }
    Ok(fields)
}

/// Convert a selector Value to serde_json::Value
pub fn value_to_json(v: Value) -> JsonValue {
    match v {
        Value::Null => JsonValue::Null,
        Value::Boolean(b) => JsonValue::Bool(b),
        Value::Long(i) => JsonValue::Number(i.into()),
        Value::Double(f) => serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::String(s) => JsonValue::String(s),
    }
}
