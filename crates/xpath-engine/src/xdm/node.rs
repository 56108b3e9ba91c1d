//! Node values, the identity cache and document order.
//!
//! A [`NodeValue`] wraps either a facade node or a synthetic attribute (owner element + name +
//! value). Wrappers are handed out by [`NodeCache`], an arena of weak records keyed by the facade's
//! stable identity: the cache never keeps a node alive and, within one generation, never produces
//! two wrappers for the same live node.

use core::cmp::Ordering;
use core::fmt;
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use crate::model::{Attribute, NodeKind, QName, XdmNode};
use crate::xdm::atomic::XdmAtomicValue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodePointer<N> {
    Tree(N),
    Attribute { owner: N, name: QName, value: String },
}

pub struct NodeRecord<N> {
    pointer: NodePointer<N>,
    kind: NodeKind,
    name: Option<QName>,
    generation: u64,
}

/// Identity of a node independent of its wrapper: facade identity, plus the expanded name for
/// attributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeKey {
    node: u64,
    attribute: Option<(Option<String>, String)>,
}

pub struct NodeValue<N>(Rc<NodeRecord<N>>);

impl<N> Clone for NodeValue<N> {
    fn clone(&self) -> Self {
        NodeValue(Rc::clone(&self.0))
    }
}

impl<N: XdmNode> NodeValue<N> {
    fn from_record(record: NodeRecord<N>) -> Self {
        NodeValue(Rc::new(record))
    }

    pub fn kind(&self) -> NodeKind {
        self.0.kind
    }

    pub fn name(&self) -> Option<&QName> {
        self.0.name.as_ref()
    }

    pub fn pointer(&self) -> &NodePointer<N> {
        &self.0.pointer
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self.0.pointer, NodePointer::Attribute { .. })
    }

    /// The facade node, or `None` for synthetic attributes.
    pub fn tree_node(&self) -> Option<&N> {
        match &self.0.pointer {
            NodePointer::Tree(n) => Some(n),
            NodePointer::Attribute { .. } => None,
        }
    }

    /// The facade node itself, or the owning element of an attribute.
    pub fn anchor(&self) -> &N {
        match &self.0.pointer {
            NodePointer::Tree(n) | NodePointer::Attribute { owner: n, .. } => n,
        }
    }

    pub fn key(&self) -> NodeKey {
        match &self.0.pointer {
            NodePointer::Tree(n) => NodeKey { node: n.identity(), attribute: None },
            NodePointer::Attribute { owner, name, .. } => NodeKey {
                node: owner.identity(),
                attribute: Some((name.ns_uri.clone(), name.local.clone())),
            },
        }
    }

    pub fn generation(&self) -> u64 {
        self.0.generation
    }

    pub fn string_value(&self) -> String {
        match &self.0.pointer {
            NodePointer::Tree(n) => n.string_value(),
            NodePointer::Attribute { value, .. } => value.clone(),
        }
    }

    /// Typed value used by atomization. Without schema types, element, document, text and
    /// attribute content is untyped; comment and processing-instruction content is a string.
    pub fn typed_value(&self) -> XdmAtomicValue {
        match self.kind() {
            NodeKind::Comment | NodeKind::ProcessingInstruction | NodeKind::Namespace => {
                XdmAtomicValue::String(self.string_value())
            }
            _ => XdmAtomicValue::UntypedAtomic(self.string_value()),
        }
    }

    pub fn parent(&self, cache: &NodeCache<N>) -> Option<NodeValue<N>> {
        match &self.0.pointer {
            NodePointer::Tree(n) => n.parent().map(|p| cache.wrap(p)),
            NodePointer::Attribute { owner, .. } => Some(cache.wrap(owner.clone())),
        }
    }

    pub fn root(&self, cache: &NodeCache<N>) -> NodeValue<N> {
        let mut current = self.anchor().clone();
        while let Some(p) = current.parent() {
            current = p;
        }
        if self.tree_node() == Some(&current) { self.clone() } else { cache.wrap(current) }
    }
}

impl<N: PartialEq> PartialEq for NodeValue<N> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || self.0.pointer == other.0.pointer
    }
}

impl<N: Eq> Eq for NodeValue<N> {}

impl<N: XdmNode> Hash for NodeValue<N> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl<N: fmt::Debug> fmt::Debug for NodeValue<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.pointer {
            NodePointer::Tree(n) => f.debug_tuple("Node").field(n).finish(),
            NodePointer::Attribute { name, value, .. } => {
                f.debug_struct("Attribute").field("name", name).field("value", value).finish()
            }
        }
    }
}

const PRUNE_THRESHOLD: usize = 4096;

/// Arena of node wrappers keyed by facade identity.
pub struct NodeCache<N> {
    generation: Cell<u64>,
    records: RefCell<HashMap<NodeKey, Weak<NodeRecord<N>>>>,
    inserts_since_prune: Cell<usize>,
}

impl<N: XdmNode> Default for NodeCache<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: XdmNode> NodeCache<N> {
    pub fn new() -> Self {
        Self {
            generation: Cell::new(0),
            records: RefCell::new(HashMap::new()),
            inserts_since_prune: Cell::new(0),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Drops every cached wrapper; wrappers handed out earlier stay valid but are no longer
    /// shared with new lookups. Call after the underlying tree changed.
    pub fn invalidate(&self) {
        self.generation.set(self.generation.get() + 1);
        self.records.borrow_mut().clear();
    }

    /// Number of cache entries whose wrapper is still alive.
    pub fn live_entries(&self) -> usize {
        self.records.borrow().values().filter(|w| w.strong_count() > 0).count()
    }

    pub fn wrap(&self, node: N) -> NodeValue<N> {
        let key = NodeKey { node: node.identity(), attribute: None };
        self.lookup_or_insert(key, || NodeRecord {
            kind: node.kind(),
            name: node.name(),
            pointer: NodePointer::Tree(node),
            generation: 0,
        })
    }

    pub fn wrap_attribute(&self, owner: &N, attribute: Attribute) -> NodeValue<N> {
        let key = NodeKey {
            node: owner.identity(),
            attribute: Some((attribute.name.ns_uri.clone(), attribute.name.local.clone())),
        };
        self.lookup_or_insert(key, || NodeRecord {
            kind: NodeKind::Attribute,
            name: Some(attribute.name.clone()),
            pointer: NodePointer::Attribute {
                owner: owner.clone(),
                name: attribute.name,
                value: attribute.value,
            },
            generation: 0,
        })
    }

    fn lookup_or_insert(
        &self,
        key: NodeKey,
        make: impl FnOnce() -> NodeRecord<N>,
    ) -> NodeValue<N> {
        let generation = self.generation.get();
        if let Some(existing) = self.records.borrow().get(&key).and_then(Weak::upgrade)
            && existing.generation == generation
        {
            return NodeValue(existing);
        }
        let mut record = make();
        record.generation = generation;
        let value = NodeValue::from_record(record);
        let mut records = self.records.borrow_mut();
        records.insert(key, Rc::downgrade(&value.0));
        let inserts = self.inserts_since_prune.get() + 1;
        if inserts >= PRUNE_THRESHOLD {
            records.retain(|_, w| w.strong_count() > 0);
            self.inserts_since_prune.set(0);
        } else {
            self.inserts_since_prune.set(inserts);
        }
        value
    }
}

type Path<N> = SmallVec<[N; 16]>;

fn path_from_root<N: XdmNode>(node: &N) -> Path<N> {
    let mut path: Path<N> = SmallVec::new();
    path.push(node.clone());
    let mut current = node.clone();
    while let Some(parent) = current.parent() {
        path.push(parent.clone());
        current = parent;
    }
    path.reverse();
    path
}

fn attribute_order(a: &QName, b: &QName) -> Ordering {
    a.lexical().cmp(&b.lexical()).then_with(|| a.ns_uri.cmp(&b.ns_uri))
}

fn sibling_order<N: XdmNode>(parent: &N, a: &N, b: &N) -> Ordering {
    for child in parent.children() {
        if &child == a {
            return Ordering::Less;
        }
        if &child == b {
            return Ordering::Greater;
        }
    }
    Ordering::Equal
}

/// Document order of two nodes.
///
/// Ancestors precede descendants; attributes follow their owner element and precede its
/// children, ordered by name. Nodes of different trees have no document order; they are ordered
/// by the identity of their roots so that sorting stays total.
pub fn compare_document_order<N: XdmNode>(a: &NodeValue<N>, b: &NodeValue<N>) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    if let (Some(x), Some(y)) = (a.tree_node(), b.tree_node())
        && let (Some(kx), Some(ky)) = (x.doc_order_key(), y.doc_order_key())
    {
        return kx.cmp(&ky);
    }
    let attr_a = match a.pointer() {
        NodePointer::Attribute { name, .. } => Some(name),
        NodePointer::Tree(_) => None,
    };
    let attr_b = match b.pointer() {
        NodePointer::Attribute { name, .. } => Some(name),
        NodePointer::Tree(_) => None,
    };
    let pa = path_from_root(a.anchor());
    let pb = path_from_root(b.anchor());
    if pa[0] != pb[0] {
        return pa[0].identity().cmp(&pb[0].identity());
    }
    let common = pa.iter().zip(pb.iter()).take_while(|(x, y)| x == y).count();
    match (common == pa.len(), common == pb.len()) {
        (true, true) => match (attr_a, attr_b) {
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => attribute_order(x, y),
            (None, None) => Ordering::Equal,
        },
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => sibling_order(&pa[common - 1], &pa[common], &pb[common]),
    }
}

/// Sorts nodes into document order and collapses duplicates in a single pass.
pub fn sort_and_dedupe<N: XdmNode>(mut nodes: Vec<NodeValue<N>>) -> Vec<NodeValue<N>> {
    nodes.sort_by(compare_document_order);
    nodes.dedup_by(|a, b| a == b);
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::simple::{SimpleNode, doc, elem, text};
    use rstest::rstest;

    fn sample() -> SimpleNode {
        doc()
            .child(
                elem("root")
                    .attr("b", "2")
                    .attr("a", "1")
                    .child(elem("x").child(text("t")))
                    .child(elem("y")),
            )
            .build()
    }

    #[rstest]
    fn cache_shares_wrappers_for_same_node() {
        let d = sample();
        let cache = NodeCache::new();
        let root = d.first_child().unwrap();
        let w1 = cache.wrap(root.clone());
        let w2 = cache.wrap(root);
        assert!(Rc::ptr_eq(&w1.0, &w2.0));
        assert_eq!(cache.live_entries(), 1);
    }

    #[rstest]
    fn cache_entry_disappears_with_wrapper() {
        let d = sample();
        let cache = NodeCache::new();
        {
            let _w = cache.wrap(d.clone());
            assert_eq!(cache.live_entries(), 1);
        }
        assert_eq!(cache.live_entries(), 0);
    }

    #[rstest]
    fn invalidate_starts_new_generation() {
        let d = sample();
        let cache = NodeCache::new();
        let before = cache.wrap(d.clone());
        cache.invalidate();
        let after = cache.wrap(d);
        assert!(!Rc::ptr_eq(&before.0, &after.0));
        assert_eq!(before, after);
        assert_eq!(after.generation(), 1);
    }

    #[rstest]
    fn attributes_sit_between_owner_and_children() {
        let d = sample();
        let cache = NodeCache::new();
        let root = d.first_child().unwrap();
        let attrs: Vec<_> =
            root.attributes().map(|a| cache.wrap_attribute(&root, a)).collect();
        let owner = cache.wrap(root.clone());
        let first_child = cache.wrap(root.first_child().unwrap());
        for a in &attrs {
            assert_eq!(compare_document_order(&owner, a), Ordering::Less);
            assert_eq!(compare_document_order(a, &first_child), Ordering::Less);
        }
        // b is declared first but a sorts first by name
        assert_eq!(compare_document_order(&attrs[1], &attrs[0]), Ordering::Less);
    }
}
