//! # Selector Language - Abstract Syntax Tree
//!
//! This module defines the tree a selector compiles to. Selectors are
//! SQL92-style predicates over message attributes, as used by JMS brokers
//! to decide which messages a subscription receives.
//!
//! ## Architecture Overview
//!
//! - **[tokens]** - Lexical tokens produced by the lexer, with positions
//! - **[expressions]** - Expression nodes (literals, identifiers, operations,
//!   `BETWEEN`/`IN`/`LIKE`, function calls)
//! - **[operators]** - Binary and unary operators
//!
//! ## Quick Start
//!
//! ```text
//! priority > 5 AND (region IN ('EU', 'UK') OR json('order.total') >= 100)
//! ```
//!
//! ## Precedence
//!
//! Loosest to tightest:
//!
//! 1. `OR`
//! 2. `AND`
//! 3. `NOT`
//! 4. comparison: `= <> < <= > >= LIKE BETWEEN IN IS`
//! 5. `+ -`
//! 6. `* /`
//! 7. unary `-`
//! 8. literals, identifiers, `( ... )`, function calls
//!
//! ## Unknown Values
//!
//! An attribute the message does not carry evaluates to `NULL`. Comparisons
//! against `NULL` are false, `AND`/`OR` follow three-valued logic, and a
//! selector whose result is unknown does not select the message.
pub mod expressions;
pub mod operators;
pub mod tokens;

pub use expressions::{Expr, LikePattern, QualifiedCall, ValueSet};
pub use operators::{BinOp, UnaryOp};
pub use tokens::{Position, SpannedToken, Token};
