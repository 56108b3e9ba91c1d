use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use chrono::FixedOffset;
use rstest::{fixture, rstest};
use xpath_engine::consts::FNS;
use xpath_engine::model::simple::{SimpleNode, doc, elem_ns, text};
use xpath_engine::{ErrorCode, EvaluationOptions, Evaluator, ExpandedName, Language, Variables};

#[fixture]
fn evaluator() -> Evaluator<SimpleNode> {
    Evaluator::new()
}

#[rstest]
fn cancelled_evaluation_fails(evaluator: Evaluator<SimpleNode>) {
    let options = EvaluationOptions::new().with_cancel_flag(Arc::new(AtomicBool::new(true)));
    let err = evaluator
        .evaluate_to_string("string-join(for $i in 1 to 10 return string($i), ',')", None, &Variables::new(), &options)
        .unwrap_err();
    assert_eq!(err.code_enum(), ErrorCode::FOER0000);
    assert!(err.message.contains("cancelled"));
}

#[rstest]
fn xpath2_rejects_newer_syntax(evaluator: Evaluator<SimpleNode>) {
    let options = EvaluationOptions::new().with_language(Language::XPath2);
    let err = evaluator.evaluate_to_string("'a' || 'b'", None, &Variables::new(), &options).unwrap_err();
    assert_eq!(err.code_enum(), ErrorCode::XPST0003);
    let s = evaluator.evaluate_to_string("concat('a', 'b')", None, &Variables::new(), &options).unwrap();
    assert_eq!(s, "ab");
}

#[rstest]
fn debug_compilation_reports_spans(evaluator: Evaluator<SimpleNode>) {
    let options = EvaluationOptions::new().with_debug(true);
    let err = evaluator.evaluate_to_string("1 + nope(2)", None, &Variables::new(), &options).unwrap_err();
    assert_eq!(err.code_enum(), ErrorCode::XPST0017);
    assert!(err.span.is_some());
}

#[rstest]
fn implicit_timezone_applies_to_local_values(evaluator: Evaluator<SimpleNode>) {
    let expr = "xs:dateTime('2024-01-01T12:00:00') eq xs:dateTime('2024-01-01T10:00:00Z')";
    let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
    let options = EvaluationOptions::new().with_implicit_timezone(plus_two);
    assert!(evaluator.evaluate_to_boolean(expr, None, &Variables::new(), &options).unwrap());
    assert!(!evaluator.evaluate_to_boolean(expr, None, &Variables::new(), &EvaluationOptions::new()).unwrap());
}

#[rstest]
fn element_names_use_the_default_namespace(evaluator: Evaluator<SimpleNode>) {
    let tree = doc().child(elem_ns("root", "urn:d").child(text("x"))).build();
    let plain = EvaluationOptions::new();
    let with_default = EvaluationOptions::new().with_default_element_namespace("urn:d");
    let prefixed = EvaluationOptions::new().with_namespace("d", "urn:d");
    let vars = Variables::new();
    assert!(!evaluator.evaluate_to_boolean("exists(root)", Some(&tree), &vars, &plain).unwrap());
    assert!(evaluator.evaluate_to_boolean("exists(root)", Some(&tree), &vars, &with_default).unwrap());
    assert!(evaluator.evaluate_to_boolean("exists(d:root)", Some(&tree), &vars, &prefixed).unwrap());
}

#[rstest]
fn namespace_resolver_answers_unbound_prefixes(evaluator: Evaluator<SimpleNode>) {
    let tree = doc().child(elem_ns("root", "urn:d")).build();
    let options = EvaluationOptions::new()
        .with_namespace_resolver(|prefix: &str| (prefix == "late").then(|| "urn:d".to_string()));
    assert!(evaluator.evaluate_to_boolean("exists(late:root)", Some(&tree), &Variables::new(), &options).unwrap());
    let err = evaluator.evaluate_to_boolean("exists(other:root)", Some(&tree), &Variables::new(), &options);
    assert_eq!(err.unwrap_err().code_enum(), ErrorCode::XPST0081);
}

#[rstest]
fn function_name_resolver_maps_aliases(evaluator: Evaluator<SimpleNode>) {
    let options = EvaluationOptions::new().with_function_name_resolver(|prefix: &str, local: &str, _arity: usize| {
        (prefix.is_empty() && local == "len").then(|| ExpandedName::ns(FNS, "string-length"))
    });
    let n = evaluator.evaluate_to_number("len('abcd')", None, &Variables::new(), &options).unwrap();
    assert_eq!(n, 4.0);
}

#[rstest]
fn module_imports_bind_function_prefixes() {
    let mut evaluator = Evaluator::<SimpleNode>::new();
    evaluator
        .register_function(ExpandedName::ns("urn:lib", "answer"), &[], "xs:integer", |_ctx, _args| {
            Ok(vec![xpath_engine::XdmItem::Atomic(42i64.into())])
        })
        .unwrap();
    let options = EvaluationOptions::new().with_module_import("lib", "urn:lib");
    let n = evaluator.evaluate_to_number("lib:answer()", None, &Variables::new(), &options).unwrap();
    assert_eq!(n, 42.0);
}
