//! Compile a selector and evaluate it against one message

use super::{CliError, fields_from_json};
use crate::{Message, Value, compile};

/// Options for the check command
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// The selector to compile
    pub selector: String,
    /// Message fields as a JSON object
    pub fields: Option<String>,
    /// Opaque message payload
    pub payload: Option<String>,
    /// Only validate syntax, don't evaluate
    pub syntax_only: bool,
    /// Report the expression's value instead of whether it selects
    pub value: bool,
}

/// Result of a check operation
#[derive(Debug)]
pub enum CheckResult {
    /// Syntax is valid; carries the canonical form of the selector
    SyntaxValid(String),
    /// Whether the message is selected
    Selected(bool),
    /// The expression's value
    Value(Value),
}

/// Execute a selector check operation
pub fn execute_check(options: &CheckOptions) -> Result<CheckResult, CliError> {
    let selector = compile(&options.selector)?;

    if options.syntax_only {
        return Ok(CheckResult::SyntaxValid(selector.to_string()));
    }

    let mut builder = Message::builder();
    if let Some(fields) = &options.fields {
        builder = builder.data_map(fields_from_json(fields)?);
    }
    if let Some(payload) = &options.payload {
        builder = builder.opaque_data(payload.as_bytes());
    }
    let message = builder.build();

    if options.value {
        Ok(CheckResult::Value(selector.evaluate_value(&message)?))
    } else {
        Ok(CheckResult::Selected(selector.evaluate(&message)?))
    }
}
