//! CLI support for selector-lang
//!
//! Provides programmatic access to the `selector` command so other tools can
//! embed the same check and documentation behaviour.

mod check;
mod convert;
mod docs;

pub use check::{CheckOptions, CheckResult, execute_check};
pub use convert::{fields_from_json, value_to_json};
pub use docs::{DocCategory, get_doc_category, get_docs_overview};

use std::io;

use thiserror::Error;

/// Errors that can occur during CLI operations
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Parse error: {0}")]
    Parse(#[from] crate::ParseError),

    #[error("Evaluation error: {0}")]
    Eval(#[from] crate::EvalError),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Message fields must be a JSON object of scalar values")]
    InvalidFields,

    #[error("Unknown category: '{0}'\nRun 'selector docs' to see available categories.")]
    UnknownCategory(String),
}
