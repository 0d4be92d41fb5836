pub mod ast;
pub mod cli;
pub mod evaluator;
pub mod functions;
pub mod json;
pub mod lexer;
pub mod message;
pub mod model;
pub mod parser;
pub mod resolver;
pub mod selector;
pub mod value;

pub use ast::{BinOp, Expr, Position, Token, UnaryOp};
pub use evaluator::{EvalError, Evaluator};
pub use functions::{
    CallConvention, FunctionCall, FunctionError, FunctionOperator, FunctionRegistry, Qualifier,
    Tag,
};
pub use lexer::{LexError, Lexer, tokenize};
pub use message::{Message, MessageBuilder};
pub use model::{Model, ModelError, ModelStore};
pub use parser::{ParseError, Parser};
pub use resolver::IdentifierResolver;
pub use selector::{CompiledSelector, SelectorCache, compile, compile_with};
pub use value::Value;
