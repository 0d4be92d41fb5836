// tests/model_tests.rs

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use selector_lang::model::{
    FileModelStore, InMemoryModelStore, ModelDecoder, ModelOperation, ModelStoreRef,
    model_store, set_model_store,
};
use selector_lang::{
    EvalError, FunctionError, FunctionRegistry, IdentifierResolver, Model, ModelError,
    ModelStore, Value, compile_with,
};

const SELECTORS: [&str; 2] = [
    "pca (applypca[2], scd41.arff , CO₂,  temperature, humidity)< 1 OR NOT model_exists(scd41.arff)",
    "pca (explainedvariance, scd41.arff , CO₂,  temperature, humidity)< 1 OR NOT model_exists(scd41.arff)",
];

/// Projects the instance onto fixed weights; `explainedvariance` reports a
/// constant ratio.
struct LinearModel {
    weights: Vec<f64>,
}

impl Model for LinearModel {
    fn apply(&self, operation: &ModelOperation, instance: &[f64]) -> Result<f64, ModelError> {
        match operation.name.as_str() {
            "applypca" => {
                if instance.len() != self.weights.len() {
                    return Err(ModelError::Compute(format!(
                        "expected {} features, got {}",
                        self.weights.len(),
                        instance.len()
                    )));
                }
                let scale = operation.index.unwrap_or(0) as f64 + 1.0;
                Ok(instance
                    .iter()
                    .zip(&self.weights)
                    .map(|(x, w)| if x.is_nan() { 0.0 } else { x * w })
                    .sum::<f64>()
                    / scale)
            }
            "explainedvariance" => Ok(0.42),
            other => Err(ModelError::Compute(format!("unsupported operation {}", other))),
        }
    }
}

fn scd41() -> Arc<dyn Model> {
    Arc::new(LinearModel {
        weights: vec![0.001, -0.01, -0.001],
    })
}

fn store_with_model() -> Arc<InMemoryModelStore> {
    let store = InMemoryModelStore::default();
    store.insert("scd41.arff", scd41());
    Arc::new(store)
}

fn registry_for(store: Arc<dyn ModelStore>) -> Arc<FunctionRegistry> {
    Arc::new(FunctionRegistry::with_builtins(ModelStoreRef::Explicit(store)))
}

fn sensor(name: &str) -> Option<Value> {
    match name {
        "CO₂" => Some(Value::Long(566)),
        "temperature" => Some(Value::Double(20.9)),
        "humidity" => Some(Value::Double(55.6)),
        _ => None,
    }
}

// ============================================================================
// Explicit store
// ============================================================================

#[test]
fn test_selectors_compile() {
    let registry = registry_for(store_with_model());
    for selector in SELECTORS {
        assert!(compile_with(selector, registry.clone()).is_ok(), "{}", selector);
    }
}

#[test]
fn test_selectors_run_model() {
    let registry = registry_for(store_with_model());
    for selector in SELECTORS {
        let compiled = compile_with(selector, registry.clone()).unwrap();
        assert!(compiled.evaluate(&sensor).unwrap(), "{}", selector);
    }
}

#[test]
fn test_model_value() {
    let registry = registry_for(store_with_model());
    let compiled = compile_with(
        "pca(applypca[0], scd41.arff, CO₂, temperature, humidity)",
        registry,
    )
    .unwrap();
    let value = compiled.evaluate_value(&sensor).unwrap();
    let expected = 566.0 * 0.001 - 20.9 * 0.01 - 55.6 * 0.001;
    match value {
        Value::Double(d) => assert!((d - expected).abs() < 1e-9),
        other => panic!("Expected double, got {:?}", other),
    }
}

#[test]
fn test_missing_features_reach_model_as_nan() {
    struct CountNan;

    impl Model for CountNan {
        fn apply(&self, _: &ModelOperation, instance: &[f64]) -> Result<f64, ModelError> {
            Ok(instance.iter().filter(|x| x.is_nan()).count() as f64)
        }
    }

    let store = InMemoryModelStore::default();
    store.insert("m", Arc::new(CountNan));
    let compiled = compile_with(
        "kmeans(distance, m, CO₂, absent, 'text', humidity)",
        registry_for(Arc::new(store)),
    )
    .unwrap();
    assert_eq!(compiled.evaluate_value(&sensor).unwrap(), Value::Double(2.0));
}

#[test]
fn test_model_exists_without_model() {
    let registry = registry_for(Arc::new(InMemoryModelStore::default()));
    let compiled = compile_with("NOT model_exists(scd41.arff)", registry.clone()).unwrap();
    assert!(compiled.evaluate(&sensor).unwrap());

    // Guarded form never touches the missing model
    let guarded = compile_with(
        "model_exists(scd41.arff) AND pca(applypca[2], scd41.arff, CO₂) < 1",
        registry,
    )
    .unwrap();
    assert!(!guarded.evaluate(&sensor).unwrap());
}

#[test]
fn test_missing_model_fails_evaluation() {
    let registry = registry_for(Arc::new(InMemoryModelStore::default()));
    let compiled = compile_with(
        "naivebayes(classifyprob[1], spam.model, CO₂) > 0.5",
        registry,
    )
    .unwrap();
    match compiled.evaluate(&sensor).unwrap_err() {
        EvalError::Function { function, source } => {
            assert_eq!(function, "classifyprob");
            assert!(matches!(
                source,
                FunctionError::Model(ModelError::NotFound(ref name)) if name == "spam.model"
            ));
        }
    }
}

#[test]
fn test_model_compute_failure_fails_evaluation() {
    let registry = registry_for(store_with_model());
    let compiled = compile_with("pca(applypca[1], scd41.arff, CO₂) > 0", registry).unwrap();
    assert!(matches!(
        compiled.evaluate(&sensor).unwrap_err(),
        EvalError::Function {
            source: FunctionError::Model(ModelError::Compute(_)),
            ..
        }
    ));
}

#[test]
fn test_model_arguments_are_checked() {
    let registry = registry_for(store_with_model());
    assert!(compile_with("pca(applypca[2], scd41.arff)", registry.clone()).is_err());
    assert!(compile_with("pca(applypca[2], 5, CO₂)", registry.clone()).is_err());
    assert!(compile_with("pca(projection, scd41.arff, CO₂)", registry.clone()).is_err());
    assert!(compile_with("model_exists(a, b)", registry).is_err());
}

#[test]
fn test_tagged_rendering() {
    let registry = registry_for(store_with_model());
    let compiled = compile_with(SELECTORS[0], registry).unwrap();
    assert_eq!(
        compiled.to_string(),
        "(pca(applypca[2], scd41.arff, CO₂, temperature, humidity) < 1) OR (NOT model_exists(scd41.arff))"
    );
}

// ============================================================================
// File store
// ============================================================================

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("selector-lang-{}-{}", name, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Decodes a model file holding comma-separated weights.
fn weights_decoder(decoded: Arc<AtomicUsize>) -> ModelDecoder {
    Arc::new(move |name: &str, bytes: &[u8]| -> Result<Arc<dyn Model>, ModelError> {
        decoded.fetch_add(1, Ordering::SeqCst);
        let text = std::str::from_utf8(bytes).map_err(|e| ModelError::Format {
            model: name.to_string(),
            reason: e.to_string(),
        })?;
        let weights = text
            .trim()
            .split(',')
            .map(|w| w.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ModelError::Format {
                model: name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Arc::new(LinearModel { weights }) as Arc<dyn Model>)
    })
}

#[test]
fn test_file_store_loads_and_caches() {
    let dir = scratch_dir("cache");
    fs::write(dir.join("scd41.arff"), "0.001, -0.01, -0.001").unwrap();
    let decoded = Arc::new(AtomicUsize::new(0));
    let store = FileModelStore::new(dir.clone(), weights_decoder(decoded.clone()));

    assert!(store.model_exists("scd41.arff"));
    assert!(!store.model_exists("other.arff"));
    assert!(store.load_model("scd41.arff").is_ok());
    assert!(store.load_model("scd41.arff").is_ok());
    assert_eq!(decoded.load(Ordering::SeqCst), 1);

    let registry = registry_for(Arc::new(store));
    for selector in SELECTORS {
        let compiled = compile_with(selector, registry.clone()).unwrap();
        assert!(compiled.evaluate(&sensor).unwrap());
    }

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_file_store_errors() {
    let dir = scratch_dir("errors");
    fs::write(dir.join("broken.arff"), "not, numbers").unwrap();
    let store = FileModelStore::new(dir.clone(), weights_decoder(Arc::new(AtomicUsize::new(0))));

    assert!(matches!(
        store.load_model("missing.arff"),
        Err(ModelError::NotFound(_))
    ));
    assert!(matches!(
        store.load_model("broken.arff"),
        Err(ModelError::Format { .. })
    ));
    assert!(matches!(
        store.load_model("../broken.arff"),
        Err(ModelError::NotFound(_))
    ));

    fs::remove_dir_all(&dir).unwrap();
}

// ============================================================================
// Process-wide store
// ============================================================================

#[test]
fn test_swap_global_store_and_restore() {
    let previous = set_model_store(store_with_model());
    let outcome = std::panic::catch_unwind(|| {
        assert!(model_store().model_exists("scd41.arff"));
        assert!(model_store().load_model("scd41.arff").is_ok());

        // The default registry reads the current store at evaluation time
        let registry = FunctionRegistry::global();
        for selector in SELECTORS {
            let compiled = compile_with(selector, registry.clone()).unwrap();
            assert!(compiled.evaluate(&sensor).unwrap());
        }
    });
    let swapped = set_model_store(previous);

    assert!(swapped.model_exists("scd41.arff"));
    assert!(!model_store().model_exists("scd41.arff"));
    if let Err(panic) = outcome {
        std::panic::resume_unwind(panic);
    }
}

#[test]
fn test_resolver_trait_object() {
    let resolver: &dyn IdentifierResolver = &sensor;
    assert_eq!(resolver.resolve("CO₂"), Some(Value::Long(566)));
    assert_eq!(resolver.resolve("pressure"), None);
}
