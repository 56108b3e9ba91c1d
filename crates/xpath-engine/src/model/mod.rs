//! Tree facade consumed by the engine.
//!
//! The engine never owns or mutates the tree it queries. Callers expose their document through
//! [`XdmNode`], a small navigation capability (parent, children, siblings, attributes, leaf data)
//! that must be synchronous and stable for the duration of one evaluation.

pub mod simple;

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    Namespace,
}

impl NodeKind {
    /// DOM `nodeType` number, used for `type-N` selector buckets.
    pub fn dom_type(self) -> u8 {
        match self {
            NodeKind::Element => 1,
            NodeKind::Attribute => 2,
            NodeKind::Text => 3,
            NodeKind::ProcessingInstruction => 7,
            NodeKind::Comment => 8,
            NodeKind::Document => 9,
            NodeKind::Namespace => 13,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
    pub ns_uri: Option<String>,
}

impl QName {
    pub fn local(local: impl Into<String>) -> Self {
        Self { prefix: None, local: local.into(), ns_uri: None }
    }

    pub fn with_ns(
        prefix: Option<&str>,
        local: impl Into<String>,
        ns_uri: Option<&str>,
    ) -> Self {
        Self {
            prefix: prefix.map(str::to_string),
            local: local.into(),
            ns_uri: ns_uri.map(str::to_string),
        }
    }

    /// Name equality per XDM: namespace URI and local part, prefix ignored.
    pub fn same_name(&self, other: &QName) -> bool {
        self.local == other.local && self.ns_uri == other.ns_uri
    }

    /// `prefix:local` or `local`.
    pub fn lexical(&self) -> String {
        match &self.prefix {
            Some(p) if !p.is_empty() => format!("{p}:{}", self.local),
            _ => self.local.clone(),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lexical())
    }
}

/// An attribute as reported by the facade. The engine turns these into synthetic attribute
/// nodes whose parent is the owning element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

impl Attribute {
    pub fn new(name: QName, value: impl Into<String>) -> Self {
        Self { name, value: value.into() }
    }
}

/// Navigation capability over an externally owned tree.
///
/// Only `identity`, `kind`, `name`, `parent`, `children`, `attributes` and `data` are required.
/// The sibling accessors have default implementations in terms of `parent().children()`;
/// adapters with cheaper native links should override them.
pub trait XdmNode: Clone + Eq + fmt::Debug + 'static {
    type Children<'a>: Iterator<Item = Self> + 'a
    where
        Self: 'a;
    type Attributes<'a>: Iterator<Item = Attribute> + 'a
    where
        Self: 'a;

    /// Stable identifier for this node, unique among live nodes of the adapter.
    fn identity(&self) -> u64;
    fn kind(&self) -> NodeKind;
    fn name(&self) -> Option<QName>;
    fn parent(&self) -> Option<Self>;
    fn children(&self) -> Self::Children<'_>;
    fn attributes(&self) -> Self::Attributes<'_>;
    /// Text content of a leaf node (text, comment, processing-instruction); empty otherwise.
    fn data(&self) -> String;

    fn first_child(&self) -> Option<Self> {
        self.children().next()
    }

    fn last_child(&self) -> Option<Self> {
        self.children().last()
    }

    fn next_sibling(&self) -> Option<Self> {
        let parent = self.parent()?;
        let mut siblings = parent.children();
        while let Some(candidate) = siblings.next() {
            if &candidate == self {
                return siblings.next();
            }
        }
        None
    }

    fn previous_sibling(&self) -> Option<Self> {
        let parent = self.parent()?;
        let mut previous = None;
        for candidate in parent.children() {
            if &candidate == self {
                return previous;
            }
            previous = Some(candidate);
        }
        None
    }

    /// `getAttribute(name)`: value of the attribute with the given expanded name.
    fn attribute(&self, name: &QName) -> Option<String> {
        self.attributes().find(|a| a.name.same_name(name)).map(|a| a.value)
    }

    /// String value: concatenated descendant text for documents and elements, leaf data otherwise.
    fn string_value(&self) -> String {
        match self.kind() {
            NodeKind::Element | NodeKind::Document => {
                let mut out = String::new();
                collect_text(self, &mut out);
                out
            }
            _ => self.data(),
        }
    }

    /// Optional global ordering hint. When both nodes return a key the engine compares keys
    /// instead of walking ancestors.
    fn doc_order_key(&self) -> Option<u64> {
        None
    }

    fn children_vec(&self) -> Vec<Self> {
        self.children().collect()
    }
}

fn collect_text<N: XdmNode>(node: &N, out: &mut String) {
    for child in node.children() {
        match child.kind() {
            NodeKind::Text => out.push_str(&child.data()),
            NodeKind::Element => collect_text(&child, out),
            _ => {}
        }
    }
}
