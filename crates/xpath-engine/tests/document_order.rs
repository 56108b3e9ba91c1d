use std::cmp::Ordering;

use rstest::{fixture, rstest};
use xpath_engine::model::XdmNode;
use xpath_engine::model::simple::{SimpleNode, doc, elem, text};
use xpath_engine::xdm::{NodeCache, NodeValue, compare_document_order, sort_and_dedupe};

#[fixture]
fn tree() -> SimpleNode {
    doc()
        .child(
            elem("root")
                .attr("z", "1")
                .attr("a", "2")
                .child(elem("a").attr("k", "v").child(text("one")))
                .child(elem("b").child(elem("c")))
                .child(elem("a").child(text("two"))),
        )
        .build()
}

/// Every node of the tree, attributes included, in a scrambled order.
fn all_nodes(tree: &SimpleNode, cache: &NodeCache<SimpleNode>) -> Vec<NodeValue<SimpleNode>> {
    fn walk(node: &SimpleNode, cache: &NodeCache<SimpleNode>, out: &mut Vec<NodeValue<SimpleNode>>) {
        out.push(cache.wrap(node.clone()));
        for a in node.attributes() {
            out.push(cache.wrap_attribute(node, a));
        }
        for c in node.children() {
            walk(&c, cache, out);
        }
    }
    let mut out = Vec::new();
    walk(tree, cache, &mut out);
    out.reverse();
    let mid = out.len() / 2;
    out.rotate_left(mid);
    out
}

#[rstest]
fn sort_and_dedupe_is_idempotent(tree: SimpleNode) {
    let cache = NodeCache::new();
    let mut nodes = all_nodes(&tree, &cache);
    let dupes = nodes.clone();
    nodes.extend(dupes);
    let once = sort_and_dedupe(nodes);
    let twice = sort_and_dedupe(once.clone());
    assert_eq!(once, twice);
    assert_eq!(once.len(), all_nodes(&tree, &cache).len());
}

#[rstest]
fn order_is_total_and_consistent(tree: SimpleNode) {
    let cache = NodeCache::new();
    let nodes = all_nodes(&tree, &cache);
    for a in &nodes {
        for b in &nodes {
            let ab = compare_document_order(a, b);
            let ba = compare_document_order(b, a);
            assert_eq!(ab, ba.reverse());
            assert_eq!(ab == Ordering::Equal, a == b);
        }
    }
}

#[rstest]
fn document_comes_first(tree: SimpleNode) {
    let cache = NodeCache::new();
    let sorted = sort_and_dedupe(all_nodes(&tree, &cache));
    assert_eq!(sorted[0], cache.wrap(tree.clone()));
}

#[rstest]
fn attributes_follow_owner_and_precede_children(tree: SimpleNode) {
    let cache = NodeCache::new();
    let root = tree.first_child().unwrap();
    let owner = cache.wrap(root.clone());
    let first_child = cache.wrap(root.first_child().unwrap());
    let attrs: Vec<_> = root.attributes().map(|a| cache.wrap_attribute(&root, a)).collect();
    for attr in &attrs {
        assert_eq!(compare_document_order(&owner, attr), Ordering::Less);
        assert_eq!(compare_document_order(attr, &first_child), Ordering::Less);
    }
    // ties between attributes of one element break by name
    assert_eq!(compare_document_order(&attrs[1], &attrs[0]), Ordering::Less);
}

#[rstest]
fn nodes_of_other_trees_are_ordered_by_root(tree: SimpleNode) {
    let other = doc().child(elem("x")).build();
    let cache = NodeCache::new();
    let a = cache.wrap(tree.first_child().unwrap());
    let b = cache.wrap(other.first_child().unwrap());
    let ab = compare_document_order(&a, &b);
    assert_ne!(ab, Ordering::Equal);
    assert_eq!(compare_document_order(&b, &a), ab.reverse());
}
