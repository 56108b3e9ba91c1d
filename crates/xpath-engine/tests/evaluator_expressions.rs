use rstest::rstest;
use xpath_engine::model::simple::SimpleNode;
use xpath_engine::xdm::XdmAtomicValue;
use xpath_engine::{AnyValue, ErrorCode, ErrorKind, EvaluationOptions, Evaluator, ReturnType, Variables, XPathResult};

fn evaluator() -> Evaluator<SimpleNode> {
    Evaluator::new()
}

fn boolean(expr: &str) -> bool {
    evaluator().evaluate_to_boolean(expr, None, &Variables::new(), &EvaluationOptions::new()).unwrap()
}

fn string(expr: &str) -> String {
    evaluator().evaluate_to_string(expr, None, &Variables::new(), &EvaluationOptions::new()).unwrap()
}

fn any(expr: &str) -> AnyValue<SimpleNode> {
    match evaluator().evaluate(expr, None, &Variables::new(), ReturnType::Any, &EvaluationOptions::new()).unwrap() {
        XPathResult::Any(v) => v,
        other => panic!("unexpected {other:?}"),
    }
}

fn error(expr: &str) -> xpath_engine::Error {
    evaluator()
        .evaluate(expr, None, &Variables::new(), ReturnType::AllResults, &EvaluationOptions::new())
        .unwrap_err()
}

#[rstest]
#[case("every $x in () satisfies false()", true)]
#[case("some $x in () satisfies true()", false)]
#[case("some $x in (1, 2, 3) satisfies $x = 2", true)]
#[case("every $x in (1, 2, 3) satisfies $x > 0", true)]
#[case("some $x in (1, 2), $y in ($x + 1, 5) satisfies $x + $y = 3", true)]
fn quantified(#[case] expr: &str, #[case] expected: bool) {
    assert_eq!(boolean(expr), expected);
}

#[rstest]
fn numeric_and_boolean_predicates() {
    assert_eq!(any("(1, 2, 3)[2]"), AnyValue::Atomic(XdmAtomicValue::Integer(2)));
    assert_eq!(
        any("(1, 2, 3)[true()]"),
        AnyValue::Atomics(vec![1i64.into(), 2i64.into(), 3i64.into()])
    );
    assert_eq!(any("(1, 2, 3)[false()]"), AnyValue::Nodes(vec![]));
    assert_eq!(any("(4, 5, 6)[position() > 1][1]"), AnyValue::Atomic(XdmAtomicValue::Integer(5)));
}

#[rstest]
#[case("(1, 2, 3)[1.5]", AnyValue::Nodes(vec![]))]
#[case("(1, 2, 3)[-1]", AnyValue::Nodes(vec![]))]
#[case("(1, 2, 3)[position()]", AnyValue::Atomics(vec![1i64.into(), 2i64.into(), 3i64.into()]))]
#[case("(1, 2, 3)[xs:decimal('2.0')]", AnyValue::Atomic(XdmAtomicValue::Integer(2)))]
#[case("(1, 2, 3)[2.0e0]", AnyValue::Atomic(XdmAtomicValue::Integer(2)))]
#[case("(1, 2, 3)[last() - 1]", AnyValue::Atomic(XdmAtomicValue::Integer(2)))]
fn computed_numeric_predicates_select_by_position(#[case] expr: &str, #[case] expected: AnyValue<SimpleNode>) {
    assert_eq!(any(expr), expected);
}

fn nested(depth: usize, open: &str, inner: &str, close: &str) -> String {
    format!("{}{inner}{}", open.repeat(depth), close.repeat(depth))
}

#[rstest]
#[case("abs(", "-1", ")", "1")]
#[case("string(", "'x'", ")", "x")]
#[case("(", "7", ")", "7")]
#[case("(1)[", "1", "]", "1")]
#[case("concat('', ", "'z'", ")", "z")]
fn deeply_nested_expressions_on_a_small_stack(
    #[case] open: &str,
    #[case] inner: &str,
    #[case] close: &str,
    #[case] expected: &str,
) {
    let expr = nested(64, open, inner, close);
    let result = std::thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(move || string(&expr))
        .unwrap()
        .join()
        .unwrap();
    assert_eq!(result, expected);
}

#[rstest]
#[case("1 + 2 * 3", "7")]
#[case("7 div 2", "3.5")]
#[case("7 idiv 2", "3")]
#[case("-7 mod 3", "-1")]
#[case("1 to 3", "1")]
#[case("concat('a', 1, true())", "a1true")]
#[case("'a' || 'b' || 'c'", "abc")]
#[case("string-join(for $i in 1 to 3 return $i * $i, ',')", "1,4,9")]
#[case("let $x := 'hi' return upper-case($x)", "HI")]
#[case("if (1 eq 1) then 'yes' else 'no'", "yes")]
#[case("substring('motor car', 6)", " car")]
#[case("translate('bar', 'abc', 'ABC')", "BAr")]
#[case("replace('abc', 'b', '[$0]')", "a[b]c")]
#[case("string-join(tokenize(' a  b '), '|')", "a|b")]
#[case("xs:integer('42') + 1", "43")]
#[case("sum((1, 2, 3) ! (. * 2))", "12")]
#[case("(-9223372036854775807 - 1) mod -1", "0")]
#[case("xs:dayTimeDuration('PT1H') div xs:double('INF')", "PT0S")]
fn string_results(#[case] expr: &str, #[case] expected: &str) {
    assert_eq!(string(expr), expected);
}

#[rstest]
#[case("1 eq 1.0")]
#[case("'10' castable as xs:integer")]
#[case("5 instance of xs:integer")]
#[case("5 instance of xs:decimal")]
#[case("not(5 instance of xs:string)")]
#[case("(1, 2) = (2, 3)")]
#[case("xs:date('2024-01-31') + xs:yearMonthDuration('P1M') eq xs:date('2024-02-29')")]
#[case("matches('Hello', '^h', 'i')")]
#[case("empty(())")]
fn true_expressions(#[case] expr: &str) {
    assert!(boolean(expr), "{expr}");
}

#[rstest]
fn unknown_function_suggests_close_names() {
    let err = error("sum3(1)");
    assert_eq!(err.code_enum(), ErrorCode::XPST0017);
    assert_eq!(err.kind(), ErrorKind::UnknownIdentifier);
    assert!(err.suggestions.iter().any(|s| s == "sum"), "{:?}", err.suggestions);
}

#[rstest]
#[case("1 div 0", ErrorCode::FOAR0001)]
#[case("1 +", ErrorCode::XPST0003)]
#[case("$undeclared", ErrorCode::XPST0008)]
#[case("'a' + 1", ErrorCode::XPTY0004)]
#[case("exactly-one((1, 2))", ErrorCode::FORG0005)]
#[case("error()", ErrorCode::FOER0000)]
#[case("xs:integer('x')", ErrorCode::FORG0001)]
#[case("(1, 2) eq 1", ErrorCode::XPTY0004)]
#[case(".", ErrorCode::XPDY0002)]
#[case("xs:dayTimeDuration('PT1H') * xs:double('NaN')", ErrorCode::FOCA0005)]
#[case("xs:dayTimeDuration('PT1H') * xs:double('INF')", ErrorCode::FODT0002)]
#[case("xs:yearMonthDuration('P1Y') div 0", ErrorCode::FODT0002)]
fn error_codes(#[case] expr: &str, #[case] code: ErrorCode) {
    let err = error(expr);
    assert_eq!(err.code_enum(), code, "{err}");
    assert_eq!(err.expression.as_deref(), Some(expr));
}

#[rstest]
fn variables_are_bound_from_host_values() {
    let vars = Variables::new().with("name", "world").with("count", 3i64);
    let s = evaluator()
        .evaluate_to_string("concat('hello ', $name, ' x', $count)", None, &vars, &EvaluationOptions::new())
        .unwrap();
    assert_eq!(s, "hello world x3");
}

#[rstest]
fn host_numbers_are_doubles() {
    let vars = Variables::new().with("n", 1.5f64);
    let ev = evaluator();
    assert!(ev.evaluate_to_boolean("$n instance of xs:double", None, &vars, &EvaluationOptions::new()).unwrap());
    let n = ev.evaluate_to_number("$n * 2", None, &vars, &EvaluationOptions::new()).unwrap();
    assert_eq!(n, 3.0);
}
