//! Predicates.

use std::rc::Rc;
use std::sync::Arc;

use crate::compiler::expr::Expr;
use crate::engine::runtime::{DynamicContext, Error, ErrorCode};
use crate::model::XdmNode;
use crate::xdm::{Sequence, SequenceCursor, XdmAtomicValue, XdmItem};

use super::{CancelPoll, evaluate};

pub(crate) fn evaluate_filter<N: XdmNode>(
    base: &Arc<Expr>,
    predicates: &[Arc<Expr>],
    ctx: &DynamicContext<N>,
) -> Result<Sequence<N>, Error> {
    let mut current = evaluate(base, ctx)?;
    for predicate in predicates {
        current = apply_predicate(current, predicate, ctx)?;
    }
    Ok(current)
}

/// Position selected by a numeric literal predicate, if the predicate is one.
fn literal_position(predicate: &Expr) -> Option<Option<usize>> {
    let Expr::Literal(value) = predicate else { return None };
    if !value.is_numeric() {
        return None;
    }
    let position = match value {
        XdmAtomicValue::Double(_) | XdmAtomicValue::Float(_) => {
            let f = value.as_f64()?;
            (f.fract() == 0.0 && f >= 1.0).then_some(f as usize)
        }
        XdmAtomicValue::Decimal(d) => (d.fract().is_zero() && *d >= rust_decimal::Decimal::ONE)
            .then(|| value.as_f64().map(|f| f as usize))
            .flatten(),
        other => other.as_integer().and_then(|i| usize::try_from(i).ok()).filter(|i| *i >= 1),
    };
    Some(position)
}

fn apply_predicate<N: XdmNode>(
    base: Sequence<N>,
    predicate: &Arc<Expr>,
    ctx: &DynamicContext<N>,
) -> Result<Sequence<N>, Error> {
    let order = base.order();
    if let Some(position) = literal_position(predicate) {
        let Some(position) = position else {
            return Ok(Sequence::empty());
        };
        // only the first `position` items are pulled
        let mut base = base;
        let mut item = None;
        for _ in 0..position {
            match base.next_item() {
                Some(next) => item = Some(next?),
                None => return Ok(Sequence::empty()),
            }
        }
        return Ok(item.map_or_else(Sequence::empty, Sequence::singleton).with_order(order));
    }
    let items = base.into_shared()?;
    Ok(Sequence::from_cursor(FilterCursor {
        size: items.len(),
        items,
        next: 0,
        predicate: Arc::clone(predicate),
        ctx: ctx.clone(),
        cancel: CancelPoll::of(ctx),
    })
    .with_order(order))
}

/// Truth value of a predicate result for the item at `position`.
pub(crate) fn predicate_holds<N: XdmNode>(mut result: Sequence<N>, position: usize) -> Result<bool, Error> {
    let Some(first) = result.next_item().transpose()? else {
        return Ok(false);
    };
    match first {
        XdmItem::Node(_) => Ok(true),
        XdmItem::Function(_) => Err(Error::from_code(
            ErrorCode::FORG0006,
            "effective boolean value is not defined for a function item",
        )),
        XdmItem::Atomic(value) => {
            if result.next_item().transpose()?.is_some() {
                return Err(Error::from_code(
                    ErrorCode::FORG0006,
                    "effective boolean value is not defined for a sequence of two or more atomic values",
                ));
            }
            if !value.is_numeric() {
                return value.ebv();
            }
            Ok(match value.as_integer() {
                Some(i) => usize::try_from(i).is_ok_and(|i| i == position),
                None => value.as_f64().is_some_and(|f| f == position as f64),
            })
        }
    }
}

struct FilterCursor<N> {
    items: Rc<Vec<XdmItem<N>>>,
    size: usize,
    next: usize,
    predicate: Arc<Expr>,
    ctx: DynamicContext<N>,
    cancel: CancelPoll,
}

impl<N: XdmNode> SequenceCursor<N> for FilterCursor<N> {
    fn next_item(&mut self) -> Option<Result<XdmItem<N>, Error>> {
        while self.next < self.size {
            let index = self.next;
            self.next += 1;
            let item = self.items[index].clone();
            let verdict = self.cancel.check().and_then(|_| {
                let focus = self.ctx.with_focus(item.clone(), index + 1, self.size);
                predicate_holds(evaluate(&self.predicate, &focus)?, index + 1)
            });
            match verdict {
                Ok(true) => return Some(Ok(item)),
                Ok(false) => {}
                Err(e) => {
                    self.next = self.size;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal::Decimal;

    #[rstest]
    #[case(XdmAtomicValue::Integer(2), Some(Some(2)))]
    #[case(XdmAtomicValue::Integer(0), Some(None))]
    #[case(XdmAtomicValue::Double(1.5), Some(None))]
    #[case(XdmAtomicValue::Decimal(Decimal::new(30, 1)), Some(Some(3)))]
    #[case(XdmAtomicValue::String("1".into()), None)]
    fn literal_positions(#[case] value: XdmAtomicValue, #[case] expected: Option<Option<usize>>) {
        assert_eq!(literal_position(&Expr::Literal(value)), expected);
    }
}
