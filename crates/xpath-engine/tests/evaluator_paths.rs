use rstest::{fixture, rstest};
use xpath_engine::model::XdmNode;
use xpath_engine::model::simple::{SimpleNode, doc, elem, text};
use xpath_engine::{EvaluationOptions, Evaluator, Variables};

#[fixture]
fn tree() -> SimpleNode {
    doc()
        .child(
            elem("root")
                .attr("id", "r")
                .child(elem("a").attr("n", "1").child(text("first")))
                .child(elem("b").child(elem("a").child(text("nested"))))
                .child(elem("a").attr("n", "2").child(text("second"))),
        )
        .build()
}

fn nodes(tree: &SimpleNode, expr: &str) -> Vec<SimpleNode> {
    Evaluator::new().evaluate_to_nodes(expr, Some(tree), &Variables::new(), &EvaluationOptions::new()).unwrap()
}

fn strings(tree: &SimpleNode, expr: &str) -> Vec<String> {
    Evaluator::new().evaluate_to_strings(expr, Some(tree), &Variables::new(), &EvaluationOptions::new()).unwrap()
}

#[rstest]
fn child_steps_return_document_order(tree: SimpleNode) {
    let root = tree.first_child().unwrap();
    let found = nodes(&tree, "root/a");
    let expected: Vec<_> = root.children().filter(|c| c.name().is_some_and(|n| n.local == "a")).collect();
    assert_eq!(found, expected);
    assert_eq!(strings(&tree, "root/a"), ["first", "second"]);
}

#[rstest]
fn paths_through_attributes_keep_document_order(tree: SimpleNode) {
    assert_eq!(strings(&tree, "root/@id/../a"), ["first", "second"]);
    assert_eq!(strings(&tree, "root/a/@n/../../a"), ["first", "second"]);
}

#[rstest]
fn descendant_shorthand_merges_in_document_order(tree: SimpleNode) {
    assert_eq!(strings(&tree, "//a"), ["first", "nested", "second"]);
    assert_eq!(strings(&tree, "(//a)[last()]"), ["second"]);
}

#[rstest]
#[case("root/a[1]", &["first"])]
#[case("root/a[@n = '2']", &["second"])]
#[case("root/*[self::b]/a", &["nested"])]
#[case("//a[parent::b]", &["nested"])]
#[case("//text()[. = 'second']/ancestor::a", &["second"])]
#[case("root/a[1]/following-sibling::*[1]/a", &["nested"])]
#[case("root/a[2]/preceding::a", &["first", "nested"])]
fn axes_and_predicates(tree: SimpleNode, #[case] expr: &str, #[case] expected: &[&str]) {
    assert_eq!(strings(&tree, expr), expected);
}

#[rstest]
fn union_removes_duplicates(tree: SimpleNode) {
    assert_eq!(strings(&tree, "root/a | //a"), ["first", "nested", "second"]);
    assert_eq!(strings(&tree, "//a except root/a"), ["nested"]);
    assert_eq!(strings(&tree, "//a intersect root/a"), ["first", "second"]);
}

#[rstest]
fn first_node_of_empty_is_none(tree: SimpleNode) {
    let ev = Evaluator::new();
    let found = ev.evaluate_to_first_node("root/missing", Some(&tree), &Variables::new(), &EvaluationOptions::new());
    assert_eq!(found.unwrap(), None);
}

#[rstest]
fn attribute_values_as_strings(tree: SimpleNode) {
    assert_eq!(strings(&tree, "root/a/@n"), ["1", "2"]);
    assert_eq!(strings(&tree, "root/@*"), ["r"]);
}
