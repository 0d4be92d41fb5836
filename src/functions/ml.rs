//! Model-backed functions.
//!
//! ```text
//! model_exists(scd41.arff)
//! kmeans(distance, clusters.model, x, y)
//! naivebayes(classifyprob, spam.model, length, links)
//! pca(applypca[2], scd41.arff, CO₂, temperature, humidity)
//! pca(explainedvariance, scd41.arff, CO₂, temperature, humidity)
//! ```
//!
//! Families are tagged: the first argument picks the quantity, the second
//! names the model, the rest are features. Features that are missing or not
//! numeric reach the model as `NaN`.

use std::sync::Arc;

use crate::{
    functions::{CallConvention, FunctionArgs, FunctionError, FunctionOperator, FunctionRegistry},
    model::{ModelOperation, ModelStoreRef},
    resolver::IdentifierResolver,
    value::Value,
};

pub const MODEL_EXISTS: &str = "model_exists";

/// Tagged families and the operations each one answers.
pub const FAMILIES: &[(&str, &[&str])] = &[
    ("kmeans", &["distance"]),
    ("naivebayes", &["classifyprob"]),
    ("pca", &["applypca", "explainedvariance"]),
];

pub(crate) fn register(registry: &mut FunctionRegistry, store: ModelStoreRef) {
    let exists_store = store.clone();
    registry.register(None, MODEL_EXISTS, move |args| {
        args.expect_arity(1, Some(1))?;
        let model = model_name(args, 0)?;
        Ok(Arc::new(ModelExistsFunction {
            model,
            store: exists_store.clone(),
        }) as Arc<dyn FunctionOperator>)
    });

    for &(family, operations) in FAMILIES {
        registry.register_family(family, CallConvention::Tagged);
        for &operation in operations {
            let store = store.clone();
            registry.register(Some(family), operation, move |args| {
                bind_model_function(args, store.clone())
            });
        }
    }
}

fn model_name(args: &FunctionArgs<'_>, position: usize) -> Result<String, FunctionError> {
    args.args
        .get(position)
        .and_then(|arg| arg.as_name())
        .map(str::to_string)
        .ok_or_else(|| args.invalid("model must be named by an identifier or a string"))
}

fn bind_model_function(
    args: &FunctionArgs<'_>,
    store: ModelStoreRef,
) -> Result<Arc<dyn FunctionOperator>, FunctionError> {
    let family = args
        .family
        .ok_or_else(|| args.invalid("model functions must be called through their family"))?;
    args.expect_arity(2, None)?;
    let model = model_name(args, 0)?;
    let operation = ModelOperation {
        family: family.to_string(),
        name: args.name.to_string(),
        index: args.tag.and_then(|tag| tag.index),
    };
    Ok(Arc::new(ModelFunction {
        operation,
        model,
        store,
    }))
}

#[derive(Debug)]
pub struct ModelExistsFunction {
    model: String,
    store: ModelStoreRef,
}

impl FunctionOperator for ModelExistsFunction {
    fn name(&self) -> &str {
        MODEL_EXISTS
    }

    fn bound_arguments(&self) -> usize {
        1
    }

    fn compute(&self, _: &[Value], _: &dyn IdentifierResolver) -> Result<Value, FunctionError> {
        Ok(Value::Boolean(self.store.get().model_exists(&self.model)))
    }
}

#[derive(Debug)]
pub struct ModelFunction {
    operation: ModelOperation,
    model: String,
    store: ModelStoreRef,
}

impl FunctionOperator for ModelFunction {
    fn name(&self) -> &str {
        &self.operation.name
    }

    fn bound_arguments(&self) -> usize {
        1
    }

    fn compute(&self, args: &[Value], _: &dyn IdentifierResolver) -> Result<Value, FunctionError> {
        let instance: Vec<f64> = args
            .iter()
            .map(|v| v.as_f64().unwrap_or(f64::NAN))
            .collect();
        let model = self.store.get().load_model(&self.model)?;
        let result = model.apply(&self.operation, &instance)?;
        Ok(Value::Double(result))
    }
}
