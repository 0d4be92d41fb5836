// tests/function_tests.rs

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use selector_lang::functions::FunctionArgs;
use selector_lang::model::ModelStoreRef;
use selector_lang::parser::{ParseError, parse};
use selector_lang::{
    CallConvention, EvalError, Expr, FunctionError, FunctionOperator, FunctionRegistry,
    IdentifierResolver, Message, Parser, Qualifier, Value, compile_with,
};

const DOCUMENT: &str = r#"{"test": 10, "value": 20, "secondLevel": { "test": 30, "data": 40 },"array": [ 10, 20],"arrayData": [{ "fred": 50}, {"bill": 60 }]}"#;

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn json_parser(path: &str) -> Expr {
    FunctionRegistry::global()
        .load_parser(Qualifier::Name("json".to_string()), vec![Expr::string(path)])
        .unwrap()
}

fn payload(body: &str) -> Message {
    Message::builder().opaque_data(body).build()
}

// ============================================================================
// Identity and rendering
// ============================================================================

#[test]
fn test_loaded_parsers_are_structurally_equal() {
    let first = json_parser("value");
    let second = json_parser("value");

    assert_eq!(first.to_string(), "Parse (JSON, 'value' ,)");
    assert_eq!(first, second);
    assert_eq!(hash_of(&first), hash_of(&second));
    assert_ne!(first, json_parser("other"));
}

#[test]
fn test_loaded_parsers_are_interned() {
    let registry = Arc::new(FunctionRegistry::with_builtins(ModelStoreRef::Current));
    let load = || match registry
        .load_parser(Qualifier::Name("json".to_string()), vec![Expr::string("a")])
        .unwrap()
    {
        Expr::Function(call) => call,
        other => panic!("Expected function, got {:?}", other),
    };

    let first = load();
    let second = load();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.interned_len(), 1);
}

#[test]
fn test_dropped_selectors_leave_the_pool() {
    let registry = Arc::new(FunctionRegistry::with_builtins(ModelStoreRef::Current));
    let selectors: Vec<_> = (0..1_000)
        .map(|i| compile_with(&format!("json('k{}') = 1", i), registry.clone()).unwrap())
        .collect();
    assert_eq!(registry.interned_len(), 1_000);

    let kept = compile_with("json('k0') = 1 OR json('k1') = 2", registry.clone()).unwrap();
    assert_eq!(registry.interned_len(), 1_000);

    drop(selectors);
    assert_eq!(registry.interned_len(), 2);

    drop(kept);
    assert_eq!(registry.interned_len(), 0);

    let again = compile_with("json('k0') = 1", registry.clone()).unwrap();
    assert!(again.evaluate(&payload(r#"{"k0": 1}"#)).unwrap());
    assert_eq!(registry.interned_len(), 1);
}

#[test]
fn test_empty_arguments_are_rejected() {
    let err = FunctionRegistry::global()
        .load_parser(Qualifier::Name("json".to_string()), Vec::new())
        .unwrap_err();
    assert!(matches!(err, FunctionError::Arity { found: 0, .. }));

    let err = FunctionRegistry::global()
        .load_parser(Qualifier::Identifier("protocol".to_string()), Vec::new())
        .unwrap_err();
    assert!(matches!(err, FunctionError::Arity { found: 0, .. }));

    assert!(matches!(
        parse("json()").unwrap_err(),
        ParseError::EmptyArguments { .. }
    ));
}

#[test]
fn test_unknown_name_is_an_error() {
    let err = FunctionRegistry::global()
        .load_parser(Qualifier::Name("secret".to_string()), vec![Expr::string("a")])
        .unwrap_err();
    assert!(matches!(err, FunctionError::UnknownFunction(ref name) if name == "secret"));
    assert!(matches!(
        parse("parse('secret', 'a')").unwrap_err(),
        ParseError::UnknownFunction { .. }
    ));
}

// ============================================================================
// JSON path walking
// ============================================================================

#[test]
fn test_json_walking() {
    let message = payload(DOCUMENT);

    assert_eq!(
        json_parser("secondLevel.data").evaluate(&message).unwrap(),
        Value::Long(40)
    );
    assert_eq!(
        json_parser("array.1").evaluate(&message).unwrap(),
        Value::Long(20)
    );
    assert_eq!(
        json_parser("arrayData.1.bill").evaluate(&message).unwrap(),
        Value::Long(60)
    );
}

#[test]
fn test_nested_arrays() {
    let message = payload(r#"{"array": [ [ 10, 20, 30],[ 40, 50, 60]]}"#);
    assert_eq!(
        json_parser("array.1.2").evaluate(&message).unwrap(),
        Value::Long(60)
    );
}

#[test]
fn test_paths_that_lead_nowhere_are_null() {
    let message = payload(DOCUMENT);
    for path in [
        "nothing",
        "array.5",
        "array.x",
        "arrayData.0.bill",
        "value.deeper",
        "secondLevel",
        "array",
    ] {
        assert_eq!(
            json_parser(path).evaluate(&message).unwrap(),
            Value::Null,
            "path {}",
            path
        );
    }
}

#[test]
fn test_empty_payload_is_null() {
    let message = payload("");
    let value = json_parser("secondLevel.data").evaluate(&message).unwrap();
    assert_eq!(value, Value::Null);
    assert_ne!(value, Value::Long(100));

    let no_payload = Message::builder().build();
    assert_eq!(
        json_parser("value").evaluate(&no_payload).unwrap(),
        Value::Null
    );
}

#[test]
fn test_relaxed_payloads() {
    let long = payload("{test:10; value:20}");
    assert_eq!(json_parser("value").evaluate(&long).unwrap(), Value::Long(20));
    assert_ne!(json_parser("value").evaluate(&long).unwrap(), Value::Long(21));

    let double = payload("{test:10.0; value:20.0}");
    assert_eq!(
        json_parser("value").evaluate(&double).unwrap(),
        Value::Double(20.0)
    );
    assert_ne!(
        json_parser("value").evaluate(&double).unwrap(),
        Value::Long(20)
    );

    let text = payload("{test:10.0; value:'hello'}");
    assert_eq!(
        json_parser("value").evaluate(&text).unwrap(),
        Value::from("hello")
    );

    let nested = payload("{test:10; value:20; second:{value:430; test:20 } }");
    assert_eq!(
        json_parser("second.value").evaluate(&nested).unwrap(),
        Value::Long(430)
    );
}

#[test]
fn test_undecodable_payload_is_null() {
    let message = payload("not json at all {");
    assert_eq!(json_parser("value").evaluate(&message).unwrap(), Value::Null);
}

#[test]
fn test_json_in_selector() {
    let expr = parse("json('secondLevel.data') = 40 AND json('arrayData.0.fred') > 49").unwrap();
    let message = payload(DOCUMENT);
    assert_eq!(expr.evaluate(&message).unwrap(), Value::Boolean(true));
}

#[test]
fn test_json_path_from_expression() {
    let expr = parse("json(field) = 40").unwrap();
    let message = Message::builder()
        .field("field", "secondLevel.data")
        .opaque_data(DOCUMENT)
        .build();
    assert_eq!(expr.evaluate(&message).unwrap(), Value::Boolean(true));
}

// ============================================================================
// Runtime qualifier dispatch
// ============================================================================

fn by_protocol() -> Expr {
    FunctionRegistry::global()
        .load_parser(
            Qualifier::Identifier("protocol".to_string()),
            vec![Expr::string("value")],
        )
        .unwrap()
}

#[test]
fn test_parse_from_identifier() {
    let message = Message::builder()
        .field("protocol", "json")
        .opaque_data("{test:10; value:20}")
        .build();
    assert_eq!(by_protocol().evaluate(&message).unwrap(), Value::Long(20));
}

#[test]
fn test_unknown_protocol_is_false() {
    let message = Message::builder()
        .field("protocol", "secret")
        .opaque_data("{test:10; value:20}")
        .build();
    assert_eq!(
        by_protocol().evaluate(&message).unwrap(),
        Value::Boolean(false)
    );
}

#[test]
fn test_missing_or_non_string_protocol_is_false() {
    let missing = payload("{value:20}");
    assert_eq!(
        by_protocol().evaluate(&missing).unwrap(),
        Value::Boolean(false)
    );

    let numeric = Message::builder()
        .field("protocol", 7)
        .opaque_data("{value:20}")
        .build();
    assert_eq!(
        by_protocol().evaluate(&numeric).unwrap(),
        Value::Boolean(false)
    );
}

#[test]
fn test_protocol_name_is_case_insensitive() {
    let message = Message::builder()
        .field("protocol", "JSON")
        .opaque_data("{value:20}")
        .build();
    assert_eq!(by_protocol().evaluate(&message).unwrap(), Value::Long(20));
}

#[test]
fn test_qualified_call_in_selector() {
    let expr = parse("parse(protocol, 'value') = 20").unwrap();
    let json = Message::builder()
        .field("protocol", "json")
        .opaque_data("{value:20}")
        .build();
    let secret = Message::builder()
        .field("protocol", "secret")
        .opaque_data("{value:20}")
        .build();
    assert_eq!(expr.evaluate(&json).unwrap(), Value::Boolean(true));
    assert_eq!(expr.evaluate(&secret).unwrap(), Value::Boolean(false));
}

// ============================================================================
// Custom functions
// ============================================================================

#[derive(Debug)]
struct Upper;

impl FunctionOperator for Upper {
    fn name(&self) -> &str {
        "upper"
    }

    fn compute(
        &self,
        args: &[Value],
        _: &dyn IdentifierResolver,
    ) -> Result<Value, FunctionError> {
        Ok(match args.first() {
            Some(Value::String(s)) => Value::String(s.to_uppercase()),
            _ => Value::Null,
        })
    }
}

#[derive(Debug)]
struct Broken;

impl FunctionOperator for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn compute(&self, _: &[Value], _: &dyn IdentifierResolver) -> Result<Value, FunctionError> {
        Err(FunctionError::InvalidArgument {
            function: "broken".to_string(),
            reason: "always fails".to_string(),
        })
    }
}

fn custom_registry() -> Arc<FunctionRegistry> {
    let mut registry = FunctionRegistry::new();
    registry.register(None, "Upper", |args: &FunctionArgs<'_>| {
        args.expect_arity(1, Some(1))?;
        Ok(Arc::new(Upper) as Arc<dyn FunctionOperator>)
    });
    registry.register(None, "broken", |_: &FunctionArgs<'_>| {
        Ok(Arc::new(Broken) as Arc<dyn FunctionOperator>)
    });
    Arc::new(registry)
}

#[test]
fn test_custom_function() {
    let selector = compile_with("upper(region) = 'EU'", custom_registry()).unwrap();
    let message = Message::builder().field("region", "eu").build();
    assert!(selector.evaluate(&message).unwrap());
    assert_eq!(selector.to_string(), "upper(region) = 'EU'");
}

#[test]
fn test_custom_registry_has_no_builtins() {
    assert!(matches!(
        compile_with("json('a') = 1", custom_registry()).unwrap_err(),
        ParseError::UnknownFunction { .. }
    ));
}

#[test]
fn test_function_failure_is_an_evaluation_error() {
    let selector = compile_with("broken(1) = 1", custom_registry()).unwrap();
    let err = selector.evaluate(&Message::builder().build()).unwrap_err();
    match err {
        EvalError::Function { function, .. } => assert_eq!(function, "broken"),
    }
}

#[test]
fn test_registry_conventions() {
    let registry = FunctionRegistry::global();
    assert_eq!(registry.convention("parse"), CallConvention::Qualified);
    assert_eq!(registry.convention("PCA"), CallConvention::Tagged);
    assert_eq!(registry.convention("json"), CallConvention::Arguments);
    assert!(registry.contains(None, "json"));
    assert!(registry.contains(Some("pca"), "explainedvariance"));
    assert!(!registry.contains(None, "applypca"));
}

#[test]
fn test_parser_with_custom_registry() {
    let mut registry = FunctionRegistry::new();
    registry.register_family("score", CallConvention::Tagged);
    registry.register(Some("score"), "fast", |_: &FunctionArgs<'_>| {
        Ok(Arc::new(Upper) as Arc<dyn FunctionOperator>)
    });
    let expr = Parser::from_source("score(fast[1], 'x')", Arc::new(registry))
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(expr.to_string(), "score(fast[1], 'x')");
}

#[test]
fn test_qualified_binding_is_reused_across_messages() {
    let bound = Arc::new(AtomicUsize::new(0));
    let counter = bound.clone();
    let mut registry = FunctionRegistry::new();
    registry.register_family("parse", CallConvention::Qualified);
    registry.register(None, "upper", move |args: &FunctionArgs<'_>| {
        counter.fetch_add(1, Ordering::SeqCst);
        args.expect_arity(1, Some(1))?;
        Ok(Arc::new(Upper) as Arc<dyn FunctionOperator>)
    });
    let selector = compile_with("parse(codec, region) = 'EU'", Arc::new(registry)).unwrap();

    let message = |codec: &str, region: &str| {
        Message::builder()
            .field("codec", codec)
            .field("region", region)
            .build()
    };
    assert!(selector.evaluate(&message("upper", "eu")).unwrap());
    assert!(selector.evaluate(&message("UPPER", "eu")).unwrap());
    assert!(!selector.evaluate(&message("upper", "us")).unwrap());
    assert!(!selector.evaluate(&message("rot13", "eu")).unwrap());
    assert!(!selector.evaluate(&message("rot13", "eu")).unwrap());

    // Clones share what was already bound
    let copy = selector.clone();
    assert!(copy.evaluate(&message("upper", "eu")).unwrap());
    assert_eq!(bound.load(Ordering::SeqCst), 1);
}
