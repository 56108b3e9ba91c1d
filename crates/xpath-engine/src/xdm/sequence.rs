//! Lazy sequences with a declared result order.

use core::fmt;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::engine::runtime::{Error, ErrorCode};
use crate::model::XdmNode;
use crate::xdm::node::{NodeValue, sort_and_dedupe};
use crate::xdm::{XdmItem, XdmSequence};

/// Ordering guarantee a producer makes about the nodes it yields.
///
/// A `Sorted` sequence is in ascending document order and free of duplicate identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultOrder {
    Sorted,
    ReverseSorted,
    Unsorted,
}

/// Pull protocol behind lazy sequences.
pub trait SequenceCursor<N> {
    fn next_item(&mut self) -> Option<Result<XdmItem<N>, Error>>;
}

enum Repr<N> {
    Empty,
    One(Option<XdmItem<N>>),
    Shared { items: Rc<Vec<XdmItem<N>>>, next: usize },
    Cursor(Box<dyn SequenceCursor<N>>),
}

/// An ordered, possibly lazy collection of items.
///
/// Consumed by pulling: through [`Iterator`], [`Sequence::first`], [`Sequence::ebv`] or
/// [`Sequence::materialize`]. Pulling stops as soon as the answer is known, so `first` on a
/// lazily produced axis never walks the remainder of the tree.
pub struct Sequence<N> {
    repr: Repr<N>,
    order: ResultOrder,
}

impl<N: XdmNode> Sequence<N> {
    pub fn empty() -> Self {
        Self { repr: Repr::Empty, order: ResultOrder::Sorted }
    }

    pub fn singleton(item: XdmItem<N>) -> Self {
        Self { repr: Repr::One(Some(item)), order: ResultOrder::Sorted }
    }

    pub fn from_vec(mut items: XdmSequence<N>) -> Self {
        match items.len() {
            0 => Self::empty(),
            1 => items.pop().map_or_else(Self::empty, Self::singleton),
            _ => Self::from_shared(Rc::new(items)),
        }
    }

    pub fn from_shared(items: Rc<Vec<XdmItem<N>>>) -> Self {
        Self { repr: Repr::Shared { items, next: 0 }, order: ResultOrder::Unsorted }
    }

    pub fn from_cursor(cursor: impl SequenceCursor<N> + 'static) -> Self {
        Self { repr: Repr::Cursor(Box::new(cursor)), order: ResultOrder::Unsorted }
    }

    /// Wraps an iterator of fallible items.
    pub fn from_results<I>(iter: I) -> Self
    where
        I: Iterator<Item = Result<XdmItem<N>, Error>> + 'static,
    {
        Self::from_cursor(IterCursor(iter))
    }

    /// Nodes already in document order without duplicates.
    pub fn from_sorted_nodes(nodes: Vec<NodeValue<N>>) -> Self {
        Self::from_vec(nodes.into_iter().map(XdmItem::Node).collect()).with_order(ResultOrder::Sorted)
    }

    /// Concatenation of several sequences, consumed one after another.
    pub fn concat(parts: Vec<Sequence<N>>) -> Self {
        let mut parts: VecDeque<_> = parts.into_iter().collect();
        match parts.len() {
            0 => Self::empty(),
            1 => parts.pop_front().map_or_else(Self::empty, |s| s.with_order(ResultOrder::Unsorted)),
            _ => Self::from_cursor(ConcatCursor { parts }),
        }
    }

    pub fn with_order(mut self, order: ResultOrder) -> Self {
        self.order = order;
        self
    }

    pub fn order(&self) -> ResultOrder {
        self.order
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self.repr, Repr::Cursor(_))
    }

    pub fn first(mut self) -> Result<Option<XdmItem<N>>, Error> {
        self.next_item().transpose()
    }

    pub fn materialize(self) -> Result<XdmSequence<N>, Error> {
        match self.repr {
            Repr::Empty => Ok(Vec::new()),
            Repr::One(item) => Ok(item.into_iter().collect()),
            Repr::Shared { items, next } => {
                if next == 0 {
                    Ok(Rc::try_unwrap(items).unwrap_or_else(|rc| rc.as_ref().clone()))
                } else {
                    Ok(items[next..].to_vec())
                }
            }
            Repr::Cursor(mut cursor) => {
                let mut out = Vec::new();
                while let Some(item) = cursor.next_item() {
                    out.push(item?);
                }
                Ok(out)
            }
        }
    }

    /// Materializes into a shared vector, reusing the existing allocation when possible.
    pub fn into_shared(self) -> Result<Rc<Vec<XdmItem<N>>>, Error> {
        match self.repr {
            Repr::Shared { items, next: 0 } => Ok(items),
            _ => self.materialize().map(Rc::new),
        }
    }

    /// Effective boolean value, pulling at most two items.
    pub fn ebv(mut self) -> Result<bool, Error> {
        let Some(first) = self.next_item().transpose()? else {
            return Ok(false);
        };
        match first {
            XdmItem::Node(_) => Ok(true),
            XdmItem::Function(_) => Err(Error::from_code(
                ErrorCode::FORG0006,
                "effective boolean value is not defined for a function item",
            )),
            XdmItem::Atomic(a) => {
                if self.next_item().transpose()?.is_some() {
                    return Err(Error::from_code(
                        ErrorCode::FORG0006,
                        "effective boolean value is not defined for a sequence of two or more items starting with an atomic value",
                    ));
                }
                a.ebv()
            }
        }
    }

    /// At most one item; more is a type error naming `what`.
    pub fn zero_or_one(mut self, what: &str) -> Result<Option<XdmItem<N>>, Error> {
        let first = self.next_item().transpose()?;
        if first.is_some() && self.next_item().transpose()?.is_some() {
            return Err(Error::from_code(
                ErrorCode::XPTY0004,
                format!("{what} expects at most one item, got a sequence of more than one"),
            ));
        }
        Ok(first)
    }

    /// Materializes and sorts/dedupes nodes; non-node items are a type error.
    pub fn into_sorted_nodes(self) -> Result<Vec<NodeValue<N>>, Error> {
        let order = self.order;
        let mut nodes = Vec::new();
        for item in self {
            match item? {
                XdmItem::Node(n) => nodes.push(n),
                other => {
                    return Err(Error::from_code(
                        ErrorCode::XPTY0004,
                        format!("expected a node, found {}", other.type_label()),
                    ));
                }
            }
        }
        Ok(match order {
            ResultOrder::Sorted => nodes,
            ResultOrder::ReverseSorted => {
                nodes.reverse();
                nodes
            }
            ResultOrder::Unsorted => sort_and_dedupe(nodes),
        })
    }
}

impl<N: Clone> SequenceCursor<N> for Sequence<N> {
    fn next_item(&mut self) -> Option<Result<XdmItem<N>, Error>> {
        match &mut self.repr {
            Repr::Empty => None,
            Repr::One(slot) => slot.take().map(Ok),
            Repr::Shared { items, next } => {
                let item = items.get(*next).cloned()?;
                *next += 1;
                Some(Ok(item))
            }
            Repr::Cursor(cursor) => cursor.next_item(),
        }
    }
}

impl<N: Clone> Iterator for Sequence<N> {
    type Item = Result<XdmItem<N>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_item()
    }
}

impl<N> fmt::Debug for Sequence<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match &self.repr {
            Repr::Empty => "empty".to_string(),
            Repr::One(item) => format!("one({})", usize::from(item.is_some())),
            Repr::Shared { items, next } => format!("shared({})", items.len() - next),
            Repr::Cursor(_) => "lazy".to_string(),
        };
        f.debug_struct("Sequence").field("repr", &shape).field("order", &self.order).finish()
    }
}

struct IterCursor<I>(I);

impl<N, I> SequenceCursor<N> for IterCursor<I>
where
    I: Iterator<Item = Result<XdmItem<N>, Error>>,
{
    fn next_item(&mut self) -> Option<Result<XdmItem<N>, Error>> {
        self.0.next()
    }
}

struct ConcatCursor<N> {
    parts: VecDeque<Sequence<N>>,
}

impl<N: Clone> SequenceCursor<N> for ConcatCursor<N> {
    fn next_item(&mut self) -> Option<Result<XdmItem<N>, Error>> {
        loop {
            let front = self.parts.front_mut()?;
            match front.next_item() {
                Some(item) => return Some(item),
                None => {
                    self.parts.pop_front();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::simple::SimpleNode;
    use crate::xdm::XdmAtomicValue;
    use rstest::rstest;

    type S = Sequence<SimpleNode>;

    fn ints(values: &[i64]) -> S {
        S::from_vec(values.iter().map(|i| XdmItem::Atomic(XdmAtomicValue::Integer(*i))).collect())
    }

    #[rstest]
    fn ebv_stops_after_first_node_or_two_atomics() {
        let lazy = S::from_results((1..).map(|i| Ok(XdmItem::Atomic(XdmAtomicValue::Integer(i)))));
        let err = lazy.ebv().unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::FORG0006);
        assert!(!S::empty().ebv().unwrap());
        assert!(ints(&[3]).ebv().unwrap());
    }

    #[rstest]
    fn first_on_infinite_cursor() {
        let lazy = S::from_results((1..).map(|i| Ok(XdmItem::Atomic(XdmAtomicValue::Integer(i)))));
        assert_eq!(lazy.first().unwrap(), Some(XdmItem::Atomic(XdmAtomicValue::Integer(1))));
    }

    #[rstest]
    fn concat_preserves_part_order() {
        let seq = S::concat(vec![ints(&[1, 2]), S::empty(), ints(&[3])]);
        let values: Vec<_> = seq.materialize().unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values[2], XdmItem::Atomic(XdmAtomicValue::Integer(3)));
    }

    #[rstest]
    fn zero_or_one_rejects_many() {
        assert!(ints(&[1]).zero_or_one("test").unwrap().is_some());
        let err = ints(&[1, 2]).zero_or_one("test").unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPTY0004);
    }
}
