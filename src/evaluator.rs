use std::cmp::Ordering;

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    ast::{BinOp, Expr, QualifiedCall, UnaryOp},
    functions::{FunctionError, FunctionOperator},
    resolver::IdentifierResolver,
    value::Value,
};

/// Errors that can occur while evaluating a selector.
///
/// Data problems never end up here: a missing attribute, a type mismatch or
/// a path that leads nowhere all evaluate to `NULL` or `FALSE`. Only a
/// function body that genuinely fails (a malformed model, say) stops the
/// evaluation.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Function '{function}' failed: {source}")]
    Function {
        function: String,
        #[source]
        source: FunctionError,
    },
}

/// Walks an expression tree against one message.
///
/// The evaluator holds nothing but the resolver, so it is cheap to create
/// one per message and the tree itself is never touched.
pub struct Evaluator<'a> {
    resolver: &'a dyn IdentifierResolver,
}

impl<'a> Evaluator<'a> {
    pub fn new(resolver: &'a dyn IdentifierResolver) -> Self {
        Evaluator { resolver }
    }

    /// Evaluates an expression to a value.
    ///
    /// # Examples
    ///
    /// ```
    /// use selector_lang::{Evaluator, Expr, Value, BinOp};
    /// use selector_lang::resolver::EmptyResolver;
    ///
    /// let expr = Expr::binary(BinOp::Add, Expr::long(2), Expr::double(0.5));
    /// let result = Evaluator::new(&EmptyResolver).evaluate(&expr).unwrap();
    /// assert_eq!(result, Value::Double(2.5));
    /// ```
    pub fn evaluate(&self, expr: &Expr) -> Result<Value, EvalError> {
        self.eval_expr(expr)
    }

    /// Evaluates an expression as a selector: only `TRUE` selects, unknown does not.
    pub fn matches(&self, expr: &Expr) -> Result<bool, EvalError> {
        Ok(self.eval_expr(expr)?.as_bool() == Some(true))
    }

    fn eval_expr(&self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Identifier(name) => Ok(self.resolver.resolve(name).unwrap_or(Value::Null)),
            Expr::Unary { op, operand } => {
                let value = self.eval_expr(operand)?;
                Ok(match op {
                    UnaryOp::Not => Value::Boolean(value.as_bool() == Some(false)),
                    UnaryOp::Negate => negate(&value),
                })
            }
            Expr::Binary { op, left, right } => match op {
                BinOp::And => self.eval_and(left, right),
                BinOp::Or => self.eval_or(left, right),
                op if op.is_comparison() => {
                    let left_val = self.eval_expr(left)?;
                    let right_val = self.eval_expr(right)?;
                    Ok(Value::Boolean(compare(*op, &left_val, &right_val)))
                }
                op => {
                    let left_val = self.eval_expr(left)?;
                    let right_val = self.eval_expr(right)?;
                    Ok(arithmetic(*op, &left_val, &right_val))
                }
            },
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let low = self.eval_expr(low)?;
                let high = self.eval_expr(high)?;
                let value = self.eval_expr(expr)?;
                let result = match (order(&value, &low), order(&value, &high)) {
                    (Some(above), Some(below)) => {
                        let inside = above != Ordering::Less && below != Ordering::Greater;
                        inside != *negated
                    }
                    _ => false,
                };
                Ok(Value::Boolean(result))
            }
            Expr::In {
                expr,
                list,
                negated,
            } => {
                let value = self.eval_expr(expr)?;
                if value.is_null() {
                    return Ok(Value::Boolean(false));
                }
                Ok(Value::Boolean(list.contains(&value) != *negated))
            }
            Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                let value = self.eval_expr(expr)?;
                let result = match value.as_str() {
                    Some(text) => pattern.matches(text) != *negated,
                    None => false,
                };
                Ok(Value::Boolean(result))
            }
            Expr::IsNull { expr, negated } => {
                let value = self.eval_expr(expr)?;
                Ok(Value::Boolean(value.is_null() != *negated))
            }
            Expr::Function(call) => self.call(call.name(), call.operator().as_ref(), call.operands()),
            Expr::QualifiedCall(call) => self.eval_qualified(call),
        }
    }

    // FALSE AND x = FALSE without looking at x; unknown AND FALSE = FALSE;
    // any other combination with an unknown side is unknown
    fn eval_and(&self, left: &Expr, right: &Expr) -> Result<Value, EvalError> {
        let left_val = self.eval_expr(left)?.as_bool();
        if left_val == Some(false) {
            return Ok(Value::Boolean(false));
        }
        let right_val = self.eval_expr(right)?.as_bool();
        Ok(match (left_val, right_val) {
            (_, Some(false)) => Value::Boolean(false),
            (Some(true), Some(true)) => Value::Boolean(true),
            _ => Value::Null,
        })
    }

    fn eval_or(&self, left: &Expr, right: &Expr) -> Result<Value, EvalError> {
        let left_val = self.eval_expr(left)?.as_bool();
        if left_val == Some(true) {
            return Ok(Value::Boolean(true));
        }
        let right_val = self.eval_expr(right)?.as_bool();
        Ok(match (left_val, right_val) {
            (_, Some(true)) => Value::Boolean(true),
            (Some(false), Some(false)) => Value::Boolean(false),
            _ => Value::Null,
        })
    }

    fn eval_qualified(&self, call: &QualifiedCall) -> Result<Value, EvalError> {
        let name = match self.resolver.resolve(&call.qualifier) {
            Some(Value::String(name)) => name,
            other => {
                debug!(qualifier = %call.qualifier, value = ?other, "qualifier does not name a function");
                return Ok(Value::Boolean(false));
            }
        };

        match call.bind(&name) {
            Ok(operator) => {
                let skip = operator.bound_arguments().min(call.args.len());
                self.call(&name, operator.as_ref(), &call.args[skip..])
            }
            Err(e) => {
                debug!(qualifier = %call.qualifier, function = %name, error = %e, "no usable function for qualifier");
                Ok(Value::Boolean(false))
            }
        }
    }

    fn call(
        &self,
        name: &str,
        operator: &dyn FunctionOperator,
        operands: &[Expr],
    ) -> Result<Value, EvalError> {
        let args = operands
            .iter()
            .map(|arg| self.eval_expr(arg))
            .collect::<Result<Vec<_>, _>>()?;

        operator.compute(&args, self.resolver).map_err(|source| {
            warn!(function = name, error = %source, "function evaluation failed");
            EvalError::Function {
                function: name.to_string(),
                source,
            }
        })
    }
}

impl Expr {
    /// Evaluates this expression against `resolver`.
    pub fn evaluate(&self, resolver: &dyn IdentifierResolver) -> Result<Value, EvalError> {
        Evaluator::new(resolver).evaluate(self)
    }
}

/// Ordering between two values, `None` when they are not comparable.
///
/// Numbers compare numerically across long and double, strings compare
/// ordinally. `NULL` compares with nothing.
fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Long(a), Value::Long(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (a, b) if a.is_numeric() && b.is_numeric() => a.as_f64()?.partial_cmp(&b.as_f64()?),
        _ => None,
    }
}

fn compare(op: BinOp, left: &Value, right: &Value) -> bool {
    if let (Value::Boolean(a), Value::Boolean(b)) = (left, right) {
        return match op {
            BinOp::Equal => a == b,
            BinOp::NotEqual => a != b,
            _ => false,
        };
    }

    let Some(ordering) = order(left, right) else {
        return false;
    };
    match op {
        BinOp::Equal => ordering == Ordering::Equal,
        BinOp::NotEqual => ordering != Ordering::Equal,
        BinOp::LessThan => ordering == Ordering::Less,
        BinOp::GreaterThan => ordering == Ordering::Greater,
        BinOp::LessEqual => ordering != Ordering::Greater,
        BinOp::GreaterEqual => ordering != Ordering::Less,
        _ => false,
    }
}

/// Long arithmetic stays long until it overflows; any double operand makes
/// the result a double. Non-numbers and integer division by zero give `NULL`.
fn arithmetic(op: BinOp, left: &Value, right: &Value) -> Value {
    if let (Value::Long(a), Value::Long(b)) = (left, right) {
        let (a, b) = (*a, *b);
        let exact = match op {
            BinOp::Add => a.checked_add(b),
            BinOp::Subtract => a.checked_sub(b),
            BinOp::Multiply => a.checked_mul(b),
            BinOp::Divide if b == 0 => return Value::Null,
            BinOp::Divide => a.checked_div(b),
            _ => return Value::Null,
        };
        return match exact {
            Some(n) => Value::Long(n),
            None => float_arithmetic(op, a as f64, b as f64),
        };
    }

    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => float_arithmetic(op, a, b),
        _ => Value::Null,
    }
}

fn float_arithmetic(op: BinOp, a: f64, b: f64) -> Value {
    match op {
        BinOp::Add => Value::Double(a + b),
        BinOp::Subtract => Value::Double(a - b),
        BinOp::Multiply => Value::Double(a * b),
        BinOp::Divide => Value::Double(a / b),
        _ => Value::Null,
    }
}

fn negate(value: &Value) -> Value {
    match value {
        Value::Long(n) => n
            .checked_neg()
            .map(Value::Long)
            .unwrap_or(Value::Double(-(*n as f64))),
        Value::Double(n) => Value::Double(-n),
        _ => Value::Null,
    }
}
