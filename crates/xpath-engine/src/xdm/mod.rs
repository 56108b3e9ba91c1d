//! XPath data model: atomic values, node values, items and sequences.

pub mod atomic;
pub mod cast;
pub mod node;
pub mod sequence;
pub mod types;

use core::fmt;
use std::sync::Arc;

pub use atomic::{AtomicType, XdmAtomicValue};
pub use node::{NodeCache, NodeValue, compare_document_order, sort_and_dedupe};
pub use sequence::{ResultOrder, Sequence, SequenceCursor};
pub use types::{ItemType, KindTest, NameTest, NodeTest, Occurrence, SequenceType};

use crate::engine::registry::FunctionSignature;
use crate::engine::runtime::{Error, ErrorCode};
use crate::model::XdmNode;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExpandedName {
    pub ns_uri: Option<String>,
    pub local: String,
}

impl ExpandedName {
    pub fn new(ns_uri: Option<String>, local: impl Into<String>) -> Self {
        Self { ns_uri, local: local.into() }
    }

    pub fn ns(ns_uri: &str, local: impl Into<String>) -> Self {
        Self { ns_uri: Some(ns_uri.to_string()), local: local.into() }
    }

    pub fn local(local: impl Into<String>) -> Self {
        Self { ns_uri: None, local: local.into() }
    }
}

impl From<&str> for ExpandedName {
    fn from(local: &str) -> Self {
        ExpandedName::local(local)
    }
}

impl fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ns_uri {
            Some(ns) => write!(f, "Q{{{ns}}}{}", self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// A function value: a reference to a registered function with a fixed arity.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionItem {
    pub signature: Arc<FunctionSignature>,
    pub arity: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XdmItem<N> {
    Node(NodeValue<N>),
    Atomic(XdmAtomicValue),
    Function(FunctionItem),
}

/// Materialized sequence, as passed to and returned from function implementations.
pub type XdmSequence<N> = Vec<XdmItem<N>>;

impl<N: XdmNode> XdmItem<N> {
    pub fn is_node(&self) -> bool {
        matches!(self, XdmItem::Node(_))
    }

    pub fn as_node(&self) -> Option<&NodeValue<N>> {
        match self {
            XdmItem::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_atomic(&self) -> Option<&XdmAtomicValue> {
        match self {
            XdmItem::Atomic(a) => Some(a),
            _ => None,
        }
    }

    /// Atomization of a single item.
    pub fn atomize(&self) -> Result<XdmAtomicValue, Error> {
        match self {
            XdmItem::Atomic(a) => Ok(a.clone()),
            XdmItem::Node(n) => Ok(n.typed_value()),
            XdmItem::Function(_) => Err(Error::from_code(
                ErrorCode::FOTY0013,
                "function items cannot be atomized",
            )),
        }
    }

    pub fn string_value(&self) -> Result<String, Error> {
        match self {
            XdmItem::Atomic(a) => Ok(a.string_value()),
            XdmItem::Node(n) => Ok(n.string_value()),
            XdmItem::Function(_) => Err(Error::from_code(
                ErrorCode::FOTY0014,
                "function items have no string value",
            )),
        }
    }

    /// Short description used in error messages.
    pub fn type_label(&self) -> String {
        match self {
            XdmItem::Atomic(a) => a.type_name().to_string(),
            XdmItem::Node(n) => format!("{:?} node", n.kind()).to_lowercase(),
            XdmItem::Function(f) => format!("function {}#{}", f.signature.name, f.arity),
        }
    }
}

impl<N> From<XdmAtomicValue> for XdmItem<N> {
    fn from(a: XdmAtomicValue) -> Self {
        XdmItem::Atomic(a)
    }
}

impl<N> From<NodeValue<N>> for XdmItem<N> {
    fn from(n: NodeValue<N>) -> Self {
        XdmItem::Node(n)
    }
}

/// Atomizes every item of a materialized sequence.
pub fn atomize_all<N: XdmNode>(items: &[XdmItem<N>]) -> Result<Vec<XdmAtomicValue>, Error> {
    items.iter().map(XdmItem::atomize).collect()
}

/// A value supplied by the host application, adapted into items before binding.
#[derive(Debug, Clone)]
pub enum HostValue<N> {
    Empty,
    Boolean(bool),
    Number(f64),
    String(String),
    Strings(Vec<String>),
    Atomic(XdmAtomicValue),
    Node(N),
    Nodes(Vec<N>),
}

impl<N: XdmNode> HostValue<N> {
    pub fn into_items(self, cache: &NodeCache<N>) -> XdmSequence<N> {
        match self {
            HostValue::Empty => Vec::new(),
            HostValue::Boolean(b) => vec![XdmItem::Atomic(XdmAtomicValue::Boolean(b))],
            HostValue::Number(n) => vec![XdmItem::Atomic(XdmAtomicValue::Double(n))],
            HostValue::String(s) => vec![XdmItem::Atomic(XdmAtomicValue::String(s))],
            HostValue::Strings(v) => {
                v.into_iter().map(|s| XdmItem::Atomic(XdmAtomicValue::String(s))).collect()
            }
            HostValue::Atomic(a) => vec![XdmItem::Atomic(a)],
            HostValue::Node(n) => vec![XdmItem::Node(cache.wrap(n))],
            HostValue::Nodes(v) => v.into_iter().map(|n| XdmItem::Node(cache.wrap(n))).collect(),
        }
    }
}

impl<N> From<bool> for HostValue<N> {
    fn from(b: bool) -> Self {
        HostValue::Boolean(b)
    }
}

impl<N> From<f64> for HostValue<N> {
    fn from(n: f64) -> Self {
        HostValue::Number(n)
    }
}

impl<N> From<i64> for HostValue<N> {
    fn from(i: i64) -> Self {
        HostValue::Atomic(XdmAtomicValue::Integer(i))
    }
}

impl<N> From<&str> for HostValue<N> {
    fn from(s: &str) -> Self {
        HostValue::String(s.to_string())
    }
}

impl<N> From<String> for HostValue<N> {
    fn from(s: String) -> Self {
        HostValue::String(s)
    }
}

impl<N> From<XdmAtomicValue> for HostValue<N> {
    fn from(a: XdmAtomicValue) -> Self {
        HostValue::Atomic(a)
    }
}
