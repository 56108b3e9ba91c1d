//! Axis cursors.
//!
//! Each axis walks the facade lazily from one context node and yields the nodes that pass the
//! step's node test, in the axis' natural order. Facade nodes are tested on kind and name first and
//! wrapped through the node cache only when they match.

use std::rc::Rc;
use std::vec;

use crate::compiler::expr::Axis;
use crate::engine::runtime::{DynamicContext, Error};
use crate::model::{NodeKind, XdmNode};
use crate::xdm::{NodeCache, NodeTest, NodeValue, ResultOrder, Sequence, SequenceCursor, XdmItem};

use super::CancelPoll;

/// Declared order of an axis' natural output.
pub(crate) fn axis_order(axis: Axis) -> ResultOrder {
    match axis {
        Axis::Child
        | Axis::Descendant
        | Axis::DescendantOrSelf
        | Axis::Following
        | Axis::FollowingSibling
        | Axis::SelfAxis => ResultOrder::Sorted,
        Axis::Parent | Axis::Ancestor | Axis::AncestorOrSelf | Axis::Preceding | Axis::PrecedingSibling => {
            ResultOrder::ReverseSorted
        }
        Axis::Attribute | Axis::Namespace => ResultOrder::Unsorted,
    }
}

/// Evaluates `axis::test` from the context node of `ctx`.
pub(crate) fn axis_step<N: XdmNode>(ctx: &DynamicContext<N>, axis: Axis, test: &NodeTest) -> Result<Sequence<N>, Error> {
    if axis == Axis::Namespace {
        return Err(Error::not_implemented("the namespace axis"));
    }
    let node = ctx.context_node()?.clone();
    Ok(axis_from(&node, axis, test, &ctx.nodes, CancelPoll::of(ctx)))
}

pub(crate) fn axis_from<N: XdmNode>(
    node: &NodeValue<N>,
    axis: Axis,
    test: &NodeTest,
    cache: &Rc<NodeCache<N>>,
    cancel: CancelPoll,
) -> Sequence<N> {
    let principal = if axis == Axis::Attribute { NodeKind::Attribute } else { NodeKind::Element };
    let walk = Walk::start(node, axis, cache);
    Sequence::from_cursor(AxisCursor { walk, test: test.clone(), principal, cache: Rc::clone(cache), cancel })
        .with_order(axis_order(axis))
}

enum Candidate<N> {
    Tree(N),
    Value(NodeValue<N>),
}

/// Traversal state of one axis from one node.
enum Walk<N> {
    Done,
    /// Already-wrapped nodes: self, parent, ancestors, attributes.
    Values(vec::IntoIter<NodeValue<N>>),
    /// A flat list of facade nodes: children and siblings.
    Nodes(vec::IntoIter<N>),
    /// Pre-order walk: a stack of child lists.
    Descend { stack: Vec<vec::IntoIter<N>> },
    /// Everything after `climb` that is not a descendant of it, in document order.
    Following { stack: Vec<vec::IntoIter<N>>, climb: Option<N> },
    /// Everything before `climb` that is not an ancestor, nearest first.
    Preceding { buffer: Vec<N>, climb: Option<N> },
}

fn children_of<N: XdmNode>(node: &N) -> vec::IntoIter<N> {
    node.children_vec().into_iter()
}

fn siblings<N: XdmNode>(node: &N) -> Option<(Vec<N>, usize)> {
    let all = node.parent()?.children_vec();
    let at = all.iter().position(|c| c == node)?;
    Some((all, at))
}

fn subtree_preorder<N: XdmNode>(node: N, out: &mut Vec<N>) {
    let children = node.children_vec();
    out.push(node);
    for child in children {
        subtree_preorder(child, out);
    }
}

impl<N: XdmNode> Walk<N> {
    fn start(node: &NodeValue<N>, axis: Axis, cache: &NodeCache<N>) -> Self {
        let tree = node.tree_node().cloned();
        match axis {
            Axis::SelfAxis => Walk::Values(vec![node.clone()].into_iter()),
            Axis::Parent => Walk::Values(node.parent(cache).into_iter().collect::<Vec<_>>().into_iter()),
            Axis::Ancestor | Axis::AncestorOrSelf => {
                let mut chain = Vec::new();
                if axis == Axis::AncestorOrSelf {
                    chain.push(node.clone());
                }
                let mut current = node.parent(cache);
                while let Some(p) = current {
                    current = p.parent(cache);
                    chain.push(p);
                }
                Walk::Values(chain.into_iter())
            }
            Axis::Attribute => match tree {
                Some(element) if element.kind() == NodeKind::Element => Walk::Values(
                    element
                        .attributes()
                        .map(|a| cache.wrap_attribute(&element, a))
                        .collect::<Vec<_>>()
                        .into_iter(),
                ),
                _ => Walk::Done,
            },
            Axis::Child => match tree {
                Some(n) => Walk::Nodes(children_of(&n)),
                None => Walk::Done,
            },
            Axis::Descendant => match tree {
                Some(n) => Walk::Descend { stack: vec![children_of(&n)] },
                None => Walk::Done,
            },
            Axis::DescendantOrSelf => match tree {
                Some(n) => Walk::Descend { stack: vec![vec![n].into_iter()] },
                None => Walk::Values(vec![node.clone()].into_iter()),
            },
            Axis::FollowingSibling => match tree.as_ref().and_then(siblings) {
                Some((all, at)) => Walk::Nodes(all[at + 1..].to_vec().into_iter()),
                None => Walk::Done,
            },
            Axis::PrecedingSibling => match tree.as_ref().and_then(siblings) {
                Some((mut all, at)) => {
                    all.truncate(at);
                    all.reverse();
                    Walk::Nodes(all.into_iter())
                }
                None => Walk::Done,
            },
            Axis::Following => {
                let anchor = node.anchor().clone();
                // an attribute is followed by its owner's content
                let stack = if tree.is_none() { vec![children_of(&anchor)] } else { Vec::new() };
                Walk::Following { stack, climb: Some(anchor) }
            }
            Axis::Preceding => Walk::Preceding { buffer: Vec::new(), climb: Some(node.anchor().clone()) },
            Axis::Namespace => Walk::Done,
        }
    }

    fn next_candidate(&mut self) -> Option<Candidate<N>> {
        match self {
            Walk::Done => None,
            Walk::Values(it) => it.next().map(Candidate::Value),
            Walk::Nodes(it) => it.next().map(Candidate::Tree),
            Walk::Descend { stack } => loop {
                let top = stack.last_mut()?;
                match top.next() {
                    Some(n) => {
                        stack.push(children_of(&n));
                        return Some(Candidate::Tree(n));
                    }
                    None => {
                        stack.pop();
                    }
                }
            },
            Walk::Following { stack, climb } => loop {
                if let Some(top) = stack.last_mut() {
                    match top.next() {
                        Some(n) => {
                            stack.push(children_of(&n));
                            return Some(Candidate::Tree(n));
                        }
                        None => {
                            stack.pop();
                            continue;
                        }
                    }
                }
                let current = climb.take()?;
                match current.next_sibling() {
                    Some(sibling) => {
                        stack.push(children_of(&sibling));
                        *climb = Some(sibling.clone());
                        return Some(Candidate::Tree(sibling));
                    }
                    None => *climb = current.parent(),
                }
            },
            Walk::Preceding { buffer, climb } => loop {
                if let Some(n) = buffer.pop() {
                    return Some(Candidate::Tree(n));
                }
                let current = climb.take()?;
                match current.previous_sibling() {
                    Some(sibling) => {
                        subtree_preorder(sibling.clone(), buffer);
                        *climb = Some(sibling);
                    }
                    None => *climb = current.parent(),
                }
            },
        }
    }
}

struct AxisCursor<N> {
    walk: Walk<N>,
    test: NodeTest,
    principal: NodeKind,
    cache: Rc<NodeCache<N>>,
    cancel: CancelPoll,
}

impl<N: XdmNode> SequenceCursor<N> for AxisCursor<N> {
    fn next_item(&mut self) -> Option<Result<XdmItem<N>, Error>> {
        loop {
            if let Err(e) = self.cancel.check() {
                self.walk = Walk::Done;
                return Some(Err(e));
            }
            match self.walk.next_candidate()? {
                Candidate::Value(v) => {
                    if self.test.matches(&v, self.principal) {
                        return Some(Ok(XdmItem::Node(v)));
                    }
                }
                Candidate::Tree(n) => {
                    let name = if self.test.needs_name() { n.name() } else { None };
                    if self.test.matches_parts(n.kind(), name.as_ref(), self.principal) {
                        return Some(Ok(XdmItem::Node(self.cache.wrap(n))));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::simple::{SimpleNode, doc, elem, text};
    use crate::xdm::{KindTest, NameTest};
    use rstest::{fixture, rstest};

    #[fixture]
    fn tree() -> SimpleNode {
        // <r><a><a1/><a2/></a><b x="1" y="2"><b1/></b><c/></r>
        doc()
            .child(
                elem("r")
                    .child(elem("a").child(elem("a1")).child(elem("a2")))
                    .child(elem("b").attr("x", "1").attr("y", "2").child(elem("b1")))
                    .child(elem("c").child(text("t"))),
            )
            .build()
    }

    fn names(seq: Sequence<SimpleNode>) -> Vec<String> {
        seq.map(|i| match i.unwrap() {
            XdmItem::Node(n) => n.name().map(|q| q.local.clone()).unwrap_or_else(|| format!("{:?}", n.kind())),
            other => panic!("unexpected {other:?}"),
        })
        .collect()
    }

    fn find(root: &SimpleNode, path: &[usize]) -> SimpleNode {
        path.iter().fold(root.clone(), |n, i| n.children_vec()[*i].clone())
    }

    fn run(start: &SimpleNode, axis: Axis, test: NodeTest) -> Vec<String> {
        let cache = Rc::new(NodeCache::new());
        let node = cache.wrap(start.clone());
        names(axis_from(&node, axis, &test, &cache, CancelPoll::default()))
    }

    #[rstest]
    #[case(Axis::Descendant, &[0], vec!["a", "a1", "a2", "b", "b1", "c"])]
    #[case(Axis::Following, &[0, 0, 1], vec!["b", "b1", "c"])]
    #[case(Axis::Preceding, &[0, 2], vec!["b1", "b", "a2", "a1", "a"])]
    #[case(Axis::Ancestor, &[0, 1, 0], vec!["b", "r"])]
    #[case(Axis::PrecedingSibling, &[0, 2], vec!["b", "a"])]
    #[case(Axis::FollowingSibling, &[0, 0], vec!["b", "c"])]
    fn natural_order(tree: SimpleNode, #[case] axis: Axis, #[case] at: &[usize], #[case] expected: Vec<&str>) {
        let start = find(&tree, at);
        assert_eq!(run(&start, axis, NodeTest::Kind(KindTest::Element(None))), expected);
    }

    #[rstest]
    fn attribute_following_includes_owner_content(tree: SimpleNode) {
        let cache = Rc::new(NodeCache::new());
        let b = find(&tree, &[0, 1]);
        let attr = cache.wrap_attribute(&b, b.attributes().next().unwrap());
        let seq = axis_from(&attr, Axis::Following, &NodeTest::Kind(KindTest::Element(None)), &cache, CancelPoll::default());
        assert_eq!(names(seq), vec!["b1", "c"]);
    }

    #[rstest]
    fn name_tests_use_the_principal_kind(tree: SimpleNode) {
        let b = find(&tree, &[0, 1]);
        assert_eq!(run(&b, Axis::Attribute, NodeTest::Name(NameTest::Any)), vec!["x", "y"]);
        assert!(run(&b, Axis::Child, NodeTest::Name(NameTest::Exact(crate::model::QName::local("x")))).is_empty());
    }

    #[rstest]
    fn declared_orders() {
        assert_eq!(axis_order(Axis::Child), ResultOrder::Sorted);
        assert_eq!(axis_order(Axis::AncestorOrSelf), ResultOrder::ReverseSorted);
        assert_eq!(axis_order(Axis::Attribute), ResultOrder::Unsorted);
    }
}
