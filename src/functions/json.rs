//! `json(path)`: reads a value out of the message's JSON payload.

use std::{fmt, sync::Arc};

use crate::{
    ast::Expr,
    functions::{
        CallConvention, FunctionArgs, FunctionCall, FunctionError, FunctionOperator,
        FunctionRegistry,
    },
    json::JsonPath,
    resolver::IdentifierResolver,
    value::Value,
};

pub const NAME: &str = "json";

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry.register(None, NAME, bind);
    registry.register_family("parse", CallConvention::Qualified);
}

fn bind(args: &FunctionArgs<'_>) -> Result<Arc<dyn FunctionOperator>, FunctionError> {
    args.expect_arity(1, Some(1))?;
    // Literal paths are split once; anything else is evaluated per message
    let path = match &args.args[0] {
        Expr::Literal(Value::String(path)) => Some(JsonPath::parse(path)),
        Expr::Literal(other) => {
            return Err(args.invalid(format!(
                "path must be a string, got {}",
                other.type_name()
            )));
        }
        _ => None,
    };
    Ok(Arc::new(JsonFunction { path }))
}

#[derive(Debug)]
pub struct JsonFunction {
    path: Option<JsonPath>,
}

impl FunctionOperator for JsonFunction {
    fn name(&self) -> &str {
        NAME
    }

    fn bound_arguments(&self) -> usize {
        usize::from(self.path.is_some())
    }

    fn compute(
        &self,
        args: &[Value],
        resolver: &dyn IdentifierResolver,
    ) -> Result<Value, FunctionError> {
        let Some(payload) = resolver.payload() else {
            return Ok(Value::Null);
        };
        let value = match (&self.path, args.first()) {
            (Some(path), _) => path.lookup(&payload),
            (None, Some(Value::String(path))) => JsonPath::parse(path).lookup(&payload),
            (None, _) => Value::Null,
        };
        Ok(value)
    }

    fn render(&self, call: &FunctionCall, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Parse (JSON, ")?;
        for arg in call.args() {
            write!(f, "{} ,", arg)?;
        }
        f.write_str(")")
    }
}
