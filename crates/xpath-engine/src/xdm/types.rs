//! Item types, node tests and sequence types.
//!
//! These are the type predicates of the data model: `instance of`, function parameter checks and
//! axis node tests all reduce to [`ItemType::matches`] / [`NodeTest::matches`].

use core::fmt;

use crate::consts::XS;
use crate::engine::runtime::{Error, ErrorCode};
use crate::model::{NodeKind, QName, XdmNode};
use crate::xdm::atomic::AtomicType;
use crate::xdm::node::NodeValue;
use crate::xdm::XdmItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occurrence {
    ExactlyOne,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
}

impl Occurrence {
    pub fn allows_empty(self) -> bool {
        matches!(self, Occurrence::ZeroOrOne | Occurrence::ZeroOrMore)
    }

    pub fn allows_many(self) -> bool {
        matches!(self, Occurrence::ZeroOrMore | Occurrence::OneOrMore)
    }

    pub fn accepts_len(self, len: usize) -> bool {
        match len {
            0 => self.allows_empty(),
            1 => true,
            _ => self.allows_many(),
        }
    }

    pub fn indicator(self) -> &'static str {
        match self {
            Occurrence::ExactlyOne => "",
            Occurrence::ZeroOrOne => "?",
            Occurrence::ZeroOrMore => "*",
            Occurrence::OneOrMore => "+",
        }
    }
}

/// Name part of a node test. Prefixes are resolved to URIs during static binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NameTest {
    /// `prefix:local` or `local`.
    Exact(QName),
    /// `*`
    Any,
    /// `prefix:*`
    Namespace { prefix: String, ns_uri: Option<String> },
    /// `*:local`
    Local(String),
}

impl NameTest {
    pub fn matches(&self, name: Option<&QName>) -> bool {
        match (self, name) {
            (NameTest::Any, _) => true,
            (_, None) => false,
            (NameTest::Exact(q), Some(n)) => q.same_name(n),
            (NameTest::Namespace { ns_uri, .. }, Some(n)) => &n.ns_uri == ns_uri,
            (NameTest::Local(local), Some(n)) => &n.local == local,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KindTest {
    Document,
    /// `element()` / `element(name)`; `None` also covers `element(*)`.
    Element(Option<QName>),
    Attribute(Option<QName>),
    Text,
    Comment,
    ProcessingInstruction(Option<String>),
}

impl KindTest {
    pub fn node_kind(&self) -> NodeKind {
        match self {
            KindTest::Document => NodeKind::Document,
            KindTest::Element(_) => NodeKind::Element,
            KindTest::Attribute(_) => NodeKind::Attribute,
            KindTest::Text => NodeKind::Text,
            KindTest::Comment => NodeKind::Comment,
            KindTest::ProcessingInstruction(_) => NodeKind::ProcessingInstruction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeTest {
    /// `node()`
    AnyKind,
    /// Name test against the axis' principal node kind.
    Name(NameTest),
    Kind(KindTest),
}

impl NodeTest {
    pub fn matches<N: XdmNode>(&self, node: &NodeValue<N>, principal: NodeKind) -> bool {
        self.matches_parts(node.kind(), node.name(), principal)
    }

    /// Matches on kind and name alone, so axis walks can test facade nodes before wrapping them.
    pub fn matches_parts(&self, kind: NodeKind, name: Option<&QName>, principal: NodeKind) -> bool {
        match self {
            NodeTest::AnyKind => true,
            NodeTest::Name(test) => kind == principal && test.matches(name),
            NodeTest::Kind(test) => {
                if kind != test.node_kind() {
                    return false;
                }
                match test {
                    KindTest::Element(Some(q)) | KindTest::Attribute(Some(q)) => {
                        name.is_some_and(|n| q.same_name(n))
                    }
                    KindTest::ProcessingInstruction(Some(target)) => name.is_some_and(|n| &n.local == target),
                    _ => true,
                }
            }
        }
    }

    /// False when the node name cannot affect the outcome.
    pub fn needs_name(&self) -> bool {
        match self {
            NodeTest::AnyKind | NodeTest::Name(NameTest::Any) => false,
            NodeTest::Name(_) => true,
            NodeTest::Kind(
                KindTest::Element(Some(_)) | KindTest::Attribute(Some(_)) | KindTest::ProcessingInstruction(Some(_)),
            ) => true,
            NodeTest::Kind(_) => false,
        }
    }
}

impl fmt::Display for NodeTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeTest::AnyKind => f.write_str("node()"),
            NodeTest::Name(NameTest::Exact(q)) => write!(f, "{q}"),
            NodeTest::Name(NameTest::Any) => f.write_str("*"),
            NodeTest::Name(NameTest::Namespace { prefix, .. }) => write!(f, "{prefix}:*"),
            NodeTest::Name(NameTest::Local(l)) => write!(f, "*:{l}"),
            NodeTest::Kind(KindTest::Document) => f.write_str("document-node()"),
            NodeTest::Kind(KindTest::Element(n)) => match n {
                Some(q) => write!(f, "element({q})"),
                None => f.write_str("element()"),
            },
            NodeTest::Kind(KindTest::Attribute(n)) => match n {
                Some(q) => write!(f, "attribute({q})"),
                None => f.write_str("attribute()"),
            },
            NodeTest::Kind(KindTest::Text) => f.write_str("text()"),
            NodeTest::Kind(KindTest::Comment) => f.write_str("comment()"),
            NodeTest::Kind(KindTest::ProcessingInstruction(t)) => match t {
                Some(t) => write!(f, "processing-instruction({t})"),
                None => f.write_str("processing-instruction()"),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemType {
    /// `item()`
    Item,
    Node(NodeTest),
    Atomic(AtomicType),
    /// `xs:numeric` pseudo-union.
    Numeric,
    /// `function(*)`
    Function,
}

impl ItemType {
    pub fn matches<N: XdmNode>(&self, item: &XdmItem<N>) -> bool {
        match (self, item) {
            (ItemType::Item, _) => true,
            (ItemType::Node(test), XdmItem::Node(n)) => test.matches(n, NodeKind::Element),
            (ItemType::Atomic(t), XdmItem::Atomic(a)) => a.instance_of(*t),
            (ItemType::Numeric, XdmItem::Atomic(a)) => a.is_numeric(),
            (ItemType::Function, XdmItem::Function(_)) => true,
            _ => false,
        }
    }

    /// True when function conversion atomizes arguments for this type.
    pub fn is_atomic(&self) -> bool {
        matches!(self, ItemType::Atomic(_) | ItemType::Numeric)
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemType::Item => f.write_str("item()"),
            ItemType::Node(t) => write!(f, "{t}"),
            ItemType::Atomic(t) => write!(f, "{t}"),
            ItemType::Numeric => f.write_str("xs:numeric"),
            ItemType::Function => f.write_str("function(*)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SequenceType {
    /// `empty-sequence()`
    Empty,
    Of(ItemType, Occurrence),
}

impl SequenceType {
    pub fn item(occ: Occurrence) -> Self {
        SequenceType::Of(ItemType::Item, occ)
    }

    pub fn node(occ: Occurrence) -> Self {
        SequenceType::Of(ItemType::Node(NodeTest::AnyKind), occ)
    }

    pub fn atomic(t: AtomicType, occ: Occurrence) -> Self {
        SequenceType::Of(ItemType::Atomic(t), occ)
    }

    pub fn any_atomic(occ: Occurrence) -> Self {
        Self::atomic(AtomicType::AnyAtomicType, occ)
    }

    pub fn string(occ: Occurrence) -> Self {
        Self::atomic(AtomicType::String, occ)
    }

    pub fn boolean(occ: Occurrence) -> Self {
        Self::atomic(AtomicType::Boolean, occ)
    }

    pub fn integer(occ: Occurrence) -> Self {
        Self::atomic(AtomicType::Integer, occ)
    }

    pub fn double(occ: Occurrence) -> Self {
        Self::atomic(AtomicType::Double, occ)
    }

    pub fn numeric(occ: Occurrence) -> Self {
        SequenceType::Of(ItemType::Numeric, occ)
    }

    pub fn occurrence(&self) -> Option<Occurrence> {
        match self {
            SequenceType::Empty => None,
            SequenceType::Of(_, occ) => Some(*occ),
        }
    }

    /// Checks cardinality and every item against this type. No conversion is applied.
    pub fn matches<N: XdmNode>(&self, items: &[XdmItem<N>]) -> bool {
        match self {
            SequenceType::Empty => items.is_empty(),
            SequenceType::Of(item_type, occ) => {
                occ.accepts_len(items.len()) && items.iter().all(|i| item_type.matches(i))
            }
        }
    }

    /// Parses the declaration syntax used when registering functions, e.g. `xs:string?`,
    /// `item()*`, `node()`, `xs:numeric+`, `empty-sequence()`.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let text = text.trim();
        if text == "empty-sequence()" {
            return Ok(SequenceType::Empty);
        }
        let (base, occ) = match text.chars().last() {
            Some('?') => (&text[..text.len() - 1], Occurrence::ZeroOrOne),
            Some('*') if !text.ends_with("(*)") => (&text[..text.len() - 1], Occurrence::ZeroOrMore),
            Some('+') => (&text[..text.len() - 1], Occurrence::OneOrMore),
            _ => (text, Occurrence::ExactlyOne),
        };
        let item = match base.trim() {
            "item()" => ItemType::Item,
            "node()" => ItemType::Node(NodeTest::AnyKind),
            "element()" => ItemType::Node(NodeTest::Kind(KindTest::Element(None))),
            "attribute()" => ItemType::Node(NodeTest::Kind(KindTest::Attribute(None))),
            "text()" => ItemType::Node(NodeTest::Kind(KindTest::Text)),
            "comment()" => ItemType::Node(NodeTest::Kind(KindTest::Comment)),
            "document-node()" => ItemType::Node(NodeTest::Kind(KindTest::Document)),
            "processing-instruction()" => {
                ItemType::Node(NodeTest::Kind(KindTest::ProcessingInstruction(None)))
            }
            "function(*)" => ItemType::Function,
            "xs:numeric" => ItemType::Numeric,
            other => {
                let local = other.strip_prefix("xs:").ok_or_else(|| unknown_type(other))?;
                ItemType::Atomic(AtomicType::from_local_name(local).ok_or_else(|| unknown_type(other))?)
            }
        };
        Ok(SequenceType::Of(item, occ))
    }
}

fn unknown_type(name: &str) -> Error {
    Error::from_code(ErrorCode::XPST0051, format!("unknown type {name}"))
}

/// Resolves an atomic type from an expanded name (`xs` namespace only).
pub fn atomic_type_for(ns_uri: Option<&str>, local: &str) -> Option<AtomicType> {
    if ns_uri == Some(XS) { AtomicType::from_local_name(local) } else { None }
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceType::Empty => f.write_str("empty-sequence()"),
            SequenceType::Of(item, occ) => write!(f, "{item}{}", occ.indicator()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("xs:string?", SequenceType::string(Occurrence::ZeroOrOne))]
    #[case("item()*", SequenceType::item(Occurrence::ZeroOrMore))]
    #[case("xs:numeric+", SequenceType::numeric(Occurrence::OneOrMore))]
    #[case("function(*)", SequenceType::Of(ItemType::Function, Occurrence::ExactlyOne))]
    #[case("empty-sequence()", SequenceType::Empty)]
    fn parses_declarations(#[case] text: &str, #[case] expected: SequenceType) {
        assert_eq!(SequenceType::parse(text).unwrap(), expected);
        assert_eq!(SequenceType::parse(text).unwrap().to_string(), text);
    }

    #[rstest]
    fn rejects_unknown_type() {
        let err = SequenceType::parse("xs:nope").unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPST0051);
    }

    #[rstest]
    fn occurrence_cardinality() {
        assert!(!Occurrence::ExactlyOne.accepts_len(0));
        assert!(Occurrence::ZeroOrOne.accepts_len(0));
        assert!(!Occurrence::ZeroOrOne.accepts_len(2));
        assert!(Occurrence::OneOrMore.accepts_len(3));
    }
}
