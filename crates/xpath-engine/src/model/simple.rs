//! Simple in-memory tree implementing [`XdmNode`], used in tests, benches and quick prototypes.
//!
//! Example:
//! ```
//! use xpath_engine::model::simple::{doc, elem, text};
//! use xpath_engine::model::XdmNode;
//!
//! // <root id="r"><child>Hello</child><child world="yes"/></root>
//! let document = doc()
//!     .child(
//!         elem("root")
//!             .attr("id", "r")
//!             .child(elem("child").child(text("Hello")))
//!             .child(elem("child").attr("world", "yes")),
//!     )
//!     .build();
//!
//! let root = document.first_child().unwrap();
//! assert_eq!(root.name().unwrap().local, "root");
//! assert_eq!(root.children().count(), 2);
//! assert_eq!(document.string_value(), "Hello");
//! ```
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use crate::model::{Attribute, NodeKind, QName, XdmNode};

struct Inner {
    kind: NodeKind,
    name: Option<QName>,
    value: Option<String>,
    parent: OnceLock<Weak<Inner>>,
    attributes: Vec<Attribute>,
    children: Vec<SimpleNode>,
    cached_text: OnceLock<String>,
}

/// An Arc-backed immutable node. Equality is pointer identity.
#[derive(Clone)]
pub struct SimpleNode(Arc<Inner>);

impl PartialEq for SimpleNode {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for SimpleNode {}

impl std::hash::Hash for SimpleNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for SimpleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleNode")
            .field("kind", &self.0.kind)
            .field("name", &self.0.name)
            .field("value", &self.0.value)
            .finish_non_exhaustive()
    }
}

fn parse_name(lexical: &str, ns_uri: Option<&str>) -> QName {
    match lexical.split_once(':') {
        Some((prefix, local)) => QName::with_ns(Some(prefix), local, ns_uri),
        None => QName::with_ns(None, lexical, ns_uri),
    }
}

impl SimpleNode {
    fn leaf(kind: NodeKind, name: Option<QName>, value: &str) -> Self {
        SimpleNode(Arc::new(Inner {
            kind,
            name,
            value: Some(value.to_string()),
            parent: OnceLock::new(),
            attributes: Vec::new(),
            children: Vec::new(),
            cached_text: OnceLock::new(),
        }))
    }

    pub fn document() -> SimpleNodeBuilder {
        SimpleNodeBuilder::new(NodeKind::Document, None)
    }

    pub fn element(name: &str) -> SimpleNodeBuilder {
        SimpleNodeBuilder::new(NodeKind::Element, Some(parse_name(name, None)))
    }

    /// Element in a namespace; `name` may carry a prefix (`p:item`).
    pub fn element_ns(name: &str, ns_uri: &str) -> SimpleNodeBuilder {
        SimpleNodeBuilder::new(NodeKind::Element, Some(parse_name(name, Some(ns_uri))))
    }

    pub fn text(value: &str) -> SimpleNode {
        Self::leaf(NodeKind::Text, None, value)
    }

    pub fn comment(value: &str) -> SimpleNode {
        Self::leaf(NodeKind::Comment, None, value)
    }

    pub fn pi(target: &str, data: &str) -> SimpleNode {
        Self::leaf(NodeKind::ProcessingInstruction, Some(QName::local(target)), data)
    }

    /// Pointer address, stable while any clone of this node is alive.
    fn address(&self) -> u64 {
        Arc::as_ptr(&self.0) as usize as u64
    }
}

pub struct SimpleNodeBuilder {
    kind: NodeKind,
    name: Option<QName>,
    attributes: Vec<Attribute>,
    children: Vec<SimpleNode>,
}

pub enum SimpleNodeOrBuilder {
    Built(SimpleNode),
    Builder(SimpleNodeBuilder),
}

impl From<SimpleNode> for SimpleNodeOrBuilder {
    fn from(n: SimpleNode) -> Self {
        SimpleNodeOrBuilder::Built(n)
    }
}

impl From<SimpleNodeBuilder> for SimpleNodeOrBuilder {
    fn from(b: SimpleNodeBuilder) -> Self {
        SimpleNodeOrBuilder::Builder(b)
    }
}

impl SimpleNodeBuilder {
    fn new(kind: NodeKind, name: Option<QName>) -> Self {
        Self { kind, name, attributes: Vec::new(), children: Vec::new() }
    }

    pub fn child(mut self, child: impl Into<SimpleNodeOrBuilder>) -> Self {
        let node = match child.into() {
            SimpleNodeOrBuilder::Built(n) => n,
            SimpleNodeOrBuilder::Builder(b) => b.build(),
        };
        debug_assert!(node.0.parent.get().is_none(), "node already has a parent");
        self.children.push(node);
        self
    }

    pub fn children<I>(self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<SimpleNodeOrBuilder>,
    {
        children.into_iter().fold(self, |b, c| b.child(c))
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.push(Attribute::new(parse_name(name, None), value));
        self
    }

    pub fn attr_ns(mut self, name: &str, ns_uri: &str, value: &str) -> Self {
        self.attributes.push(Attribute::new(parse_name(name, Some(ns_uri)), value));
        self
    }

    pub fn build(self) -> SimpleNode {
        let SimpleNodeBuilder { kind, name, attributes, children } = self;
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            for c in &children {
                let _ = c.0.parent.set(weak.clone());
            }
            Inner {
                kind,
                name,
                value: None,
                parent: OnceLock::new(),
                attributes,
                children,
                cached_text: OnceLock::new(),
            }
        });
        SimpleNode(inner)
    }
}

pub fn doc() -> SimpleNodeBuilder {
    SimpleNode::document()
}

pub fn elem(name: &str) -> SimpleNodeBuilder {
    SimpleNode::element(name)
}

pub fn elem_ns(name: &str, ns_uri: &str) -> SimpleNodeBuilder {
    SimpleNode::element_ns(name, ns_uri)
}

pub fn text(value: &str) -> SimpleNode {
    SimpleNode::text(value)
}

pub fn comment(value: &str) -> SimpleNode {
    SimpleNode::comment(value)
}

pub fn pi(target: &str, data: &str) -> SimpleNode {
    SimpleNode::pi(target, data)
}

impl XdmNode for SimpleNode {
    type Children<'a> = std::iter::Cloned<std::slice::Iter<'a, SimpleNode>>;
    type Attributes<'a> = std::iter::Cloned<std::slice::Iter<'a, Attribute>>;

    fn identity(&self) -> u64 {
        self.address()
    }

    fn kind(&self) -> NodeKind {
        self.0.kind
    }

    fn name(&self) -> Option<QName> {
        self.0.name.clone()
    }

    fn parent(&self) -> Option<Self> {
        self.0.parent.get().and_then(Weak::upgrade).map(SimpleNode)
    }

    fn children(&self) -> Self::Children<'_> {
        self.0.children.iter().cloned()
    }

    fn attributes(&self) -> Self::Attributes<'_> {
        self.0.attributes.iter().cloned()
    }

    fn data(&self) -> String {
        self.0.value.clone().unwrap_or_default()
    }

    fn first_child(&self) -> Option<Self> {
        self.0.children.first().cloned()
    }

    fn last_child(&self) -> Option<Self> {
        self.0.children.last().cloned()
    }

    fn string_value(&self) -> String {
        match self.0.kind {
            NodeKind::Element | NodeKind::Document => self
                .0
                .cached_text
                .get_or_init(|| {
                    let mut out = String::new();
                    for c in &self.0.children {
                        match c.0.kind {
                            NodeKind::Text => out.push_str(c.0.value.as_deref().unwrap_or("")),
                            NodeKind::Element => out.push_str(&c.string_value()),
                            _ => {}
                        }
                    }
                    out
                })
                .clone(),
            _ => self.data(),
        }
    }
}
