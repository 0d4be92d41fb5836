// tests/selector_tests.rs

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use selector_lang::{CompiledSelector, Message, ParseError, SelectorCache, Value, compile};

fn order(priority: i64, region: &str, body: &str) -> Message {
    Message::builder()
        .field("priority", priority)
        .field("region", region)
        .field("protocol", "json")
        .opaque_data(body)
        .build()
}

// ============================================================================
// Compile and evaluate
// ============================================================================

#[test]
fn test_compile_and_select() {
    let selector =
        compile("priority > 5 AND region IN ('EU', 'UK') AND json('order.total') >= 100").unwrap();

    assert!(selector.evaluate(&order(7, "UK", r#"{"order": {"total": 250}}"#)).unwrap());
    assert!(!selector.evaluate(&order(3, "UK", r#"{"order": {"total": 250}}"#)).unwrap());
    assert!(!selector.evaluate(&order(7, "US", r#"{"order": {"total": 250}}"#)).unwrap());
    assert!(!selector.evaluate(&order(7, "UK", "")).unwrap());
}

#[test]
fn test_scalar_use() {
    let selector = compile("json('order.total') * 2").unwrap();
    assert_eq!(
        selector
            .evaluate_value(&order(1, "EU", r#"{"order": {"total": 1.5}}"#))
            .unwrap(),
        Value::Double(3.0)
    );
}

#[test]
fn test_text_is_kept() {
    let text = "priority>5";
    let selector = compile(text).unwrap();
    assert_eq!(selector.text(), text);
    assert_eq!(selector.to_string(), "priority > 5");
}

#[test]
fn test_compile_failure_produces_nothing() {
    let err = compile("priority > 5 AND").unwrap_err();
    assert!(matches!(err, ParseError::Unexpected { .. }));
    assert_eq!(err.position().column, 17);
}

// ============================================================================
// Identity
// ============================================================================

#[test]
fn test_equal_selectors_deduplicate() {
    let mut seen: HashSet<CompiledSelector> = HashSet::new();
    assert!(seen.insert(compile("a = 1 AND json('x') = 'y'").unwrap()));
    assert!(!seen.insert(compile("a=1 and JSON('x')='y'").unwrap()));
    assert!(!seen.insert(compile("(a = 1) AND (json('x') = 'y')").unwrap()));
    assert!(seen.insert(compile("a = 1.0 AND json('x') = 'y'").unwrap()));
    assert_eq!(seen.len(), 2);
}

#[test]
fn test_rendering_is_deterministic() {
    let first = compile("x BETWEEN 1 AND 2 OR parse(protocol, 'a.b') IS NULL").unwrap();
    let second = compile("x between 1 and 2 or parse(protocol,'a.b') is null").unwrap();
    assert_eq!(first.to_string(), second.to_string());
    assert_eq!(
        first.to_string(),
        "(x BETWEEN 1 AND 2) OR (parse(protocol, 'a.b') IS NULL)"
    );
}

// ============================================================================
// Cache
// ============================================================================

#[test]
fn test_cache_compiles_once() {
    let cache = SelectorCache::default();
    assert!(cache.is_empty());

    let first = cache.compile("priority > 5").unwrap();
    let second = cache.compile("priority > 5").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.len(), 1);

    cache.compile("priority > 6").unwrap();
    assert_eq!(cache.len(), 2);

    assert!(cache.compile("priority >").is_err());
    assert_eq!(cache.len(), 2);

    cache.clear();
    assert!(cache.is_empty());
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_shared_selector_across_threads() {
    let selector = Arc::new(compile("priority > 5 AND json('n') = priority").unwrap());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let selector = Arc::clone(&selector);
            thread::spawn(move || {
                let message = order(i, "EU", &format!("{{\"n\": {}}}", i));
                selector.evaluate(&message).unwrap()
            })
        })
        .collect();

    let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(
        results,
        vec![false, false, false, false, false, false, true, true]
    );
}

#[test]
fn test_shared_cache_across_threads() {
    let cache = Arc::new(SelectorCache::default());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.compile("region = 'EU'").unwrap())
        })
        .collect();

    let compiled: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(cache.len(), 1);
    for selector in &compiled[1..] {
        assert!(Arc::ptr_eq(&compiled[0], selector));
    }
}
