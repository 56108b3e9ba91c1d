use std::sync::Arc;

use rstest::rstest;
use xpath_engine::model::simple::{SimpleNode, doc, elem};
use xpath_engine::{
    CompiledExpressionCache, ErrorCode, EvaluationOptions, Evaluator, Language, StaticContextBuilder, Variables,
};

fn with_x() -> StaticContextBuilder {
    StaticContextBuilder::new().with_variable("x")
}

#[rstest]
fn identical_bindings_hit_without_rebinding() {
    let cache = CompiledExpressionCache::new();
    let first = cache.compile("$x + 1", &with_x().build(), Language::XPath3, false).unwrap();
    let second = cache.compile("$x + 1", &with_x().build(), Language::XPath3, false).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    let stats = cache.stats();
    assert_eq!(stats.full_hits, 1);
    assert_eq!(stats.binding_passes, 1);
}

#[rstest]
fn removing_a_referenced_variable_forces_a_new_binding_pass() {
    let cache = CompiledExpressionCache::new();
    cache.compile("$x + 1", &with_x().build(), Language::XPath3, false).unwrap();
    let err = cache.compile("$x + 1", &StaticContextBuilder::new().build(), Language::XPath3, false).unwrap_err();
    assert_eq!(err.code_enum(), ErrorCode::XPST0008);
    let stats = cache.stats();
    assert_eq!(stats.full_hits, 0);
    assert_eq!(stats.half_reuses, 1);
    assert_eq!(stats.binding_passes, 2);
}

#[rstest]
fn unrelated_namespaces_do_not_force_a_miss() {
    let cache = CompiledExpressionCache::new();
    cache.compile("$x + 1", &with_x().build(), Language::XPath3, false).unwrap();
    let ctx = with_x().with_namespace("foo", "urn:foo").with_variable("unused").build();
    cache.compile("$x + 1", &ctx, Language::XPath3, false).unwrap();
    assert_eq!(cache.stats().full_hits, 1);
    assert_eq!(cache.stats().binding_passes, 1);
}

#[rstest]
fn rebinding_a_used_prefix_adds_a_second_compilation() {
    let cache = CompiledExpressionCache::new();
    let one = StaticContextBuilder::new().with_namespace("p", "urn:one").build();
    let two = StaticContextBuilder::new().with_namespace("p", "urn:two").build();
    let a = cache.compile("p:item", &one, Language::XPath3, false).unwrap();
    let b = cache.compile("p:item", &two, Language::XPath3, false).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    // both bindings stay cached under the same key
    let again = cache.compile("p:item", &one, Language::XPath3, false).unwrap();
    assert!(Arc::ptr_eq(&a, &again));
    let stats = cache.stats();
    assert_eq!((stats.cold_compiles, stats.half_reuses, stats.full_hits), (1, 1, 1));
    assert_eq!(cache.len(), 1);
}

#[rstest]
fn evaluators_share_a_cache() {
    let tree: SimpleNode = doc().child(elem("root")).build();
    let cache = Arc::new(CompiledExpressionCache::new());
    let a = Evaluator::<SimpleNode>::new().with_cache(Arc::clone(&cache));
    let b = Evaluator::<SimpleNode>::new().with_cache(Arc::clone(&cache));
    let options = EvaluationOptions::new();
    assert!(a.evaluate_to_boolean("exists(root)", Some(&tree), &Variables::new(), &options).unwrap());
    assert!(b.evaluate_to_boolean("exists(root)", Some(&tree), &Variables::new(), &options).unwrap());
    assert_eq!(cache.stats().full_hits, 1);
}
