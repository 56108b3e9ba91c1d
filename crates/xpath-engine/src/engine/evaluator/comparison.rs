//! Value, general and node comparisons.

use core::cmp::Ordering;
use std::sync::Arc;

use crate::compiler::expr::{Expr, NodeOp};
use crate::engine::compare::{ValueOp, general_compare, value_compare};
use crate::engine::runtime::{DynamicContext, Error, ErrorCode};
use crate::model::XdmNode;
use crate::xdm::{NodeValue, Sequence, XdmItem, compare_document_order};

use super::{atomize_sequence, boolean, evaluate};

pub(crate) fn value<N: XdmNode>(
    op: ValueOp,
    left: &Arc<Expr>,
    right: &Arc<Expr>,
    ctx: &DynamicContext<N>,
) -> Result<Sequence<N>, Error> {
    let l = atomize_sequence(evaluate(left, ctx)?)?;
    let r = atomize_sequence(evaluate(right, ctx)?)?;
    Ok(match value_compare(&l, &r, op, ctx.implicit_timezone)? {
        Some(result) => boolean(result),
        None => Sequence::empty(),
    })
}

pub(crate) fn general<N: XdmNode>(
    op: ValueOp,
    left: &Arc<Expr>,
    right: &Arc<Expr>,
    ctx: &DynamicContext<N>,
) -> Result<Sequence<N>, Error> {
    let l = atomize_sequence(evaluate(left, ctx)?)?;
    if l.is_empty() {
        return Ok(boolean(false));
    }
    let r = atomize_sequence(evaluate(right, ctx)?)?;
    Ok(boolean(general_compare(&l, &r, op, ctx.implicit_timezone)?))
}

fn single_node<N: XdmNode>(seq: Sequence<N>, op: NodeOp) -> Result<Option<NodeValue<N>>, Error> {
    let what = match op {
        NodeOp::Is => "is",
        NodeOp::Precedes => "<<",
        NodeOp::Follows => ">>",
    };
    match seq.zero_or_one(what)? {
        None => Ok(None),
        Some(XdmItem::Node(n)) => Ok(Some(n)),
        Some(other) => Err(Error::from_code(
            ErrorCode::XPTY0004,
            format!("operand of `{what}` must be a node, found {}", other.type_label()),
        )),
    }
}

pub(crate) fn node<N: XdmNode>(
    op: NodeOp,
    left: &Arc<Expr>,
    right: &Arc<Expr>,
    ctx: &DynamicContext<N>,
) -> Result<Sequence<N>, Error> {
    let Some(a) = single_node(evaluate(left, ctx)?, op)? else {
        return Ok(Sequence::empty());
    };
    let Some(b) = single_node(evaluate(right, ctx)?, op)? else {
        return Ok(Sequence::empty());
    };
    let result = match op {
        NodeOp::Is => a == b,
        NodeOp::Precedes => compare_document_order(&a, &b) == Ordering::Less,
        NodeOp::Follows => compare_document_order(&a, &b) == Ordering::Greater,
    };
    Ok(boolean(result))
}
