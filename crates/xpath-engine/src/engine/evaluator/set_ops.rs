//! `union`, `intersect` and `except` over node sequences.

use std::collections::HashSet;
use std::sync::Arc;

use crate::compiler::expr::{Expr, SetOp};
use crate::engine::runtime::{DynamicContext, Error, ErrorCode};
use crate::model::XdmNode;
use crate::xdm::{NodeValue, ResultOrder, Sequence};

use super::evaluate;
use super::path::merge_runs;

fn operand_nodes<N: XdmNode>(expr: &Arc<Expr>, ctx: &DynamicContext<N>, op: SetOp) -> Result<Vec<NodeValue<N>>, Error> {
    evaluate(expr, ctx)?.into_sorted_nodes().map_err(|e| {
        if e.code_enum() == ErrorCode::XPTY0004 {
            Error::from_code(
                ErrorCode::XPTY0004,
                format!("operands of {} must be node sequences: {}", name(op), e.message),
            )
        } else {
            e
        }
    })
}

fn name(op: SetOp) -> &'static str {
    match op {
        SetOp::Union => "union",
        SetOp::Intersect => "intersect",
        SetOp::Except => "except",
    }
}

pub(crate) fn evaluate_set_op<N: XdmNode>(
    op: SetOp,
    left: &Arc<Expr>,
    right: &Arc<Expr>,
    ctx: &DynamicContext<N>,
) -> Result<Sequence<N>, Error> {
    let l = operand_nodes(left, ctx, op)?;
    let r = operand_nodes(right, ctx, op)?;
    let nodes = match op {
        SetOp::Union => merge_runs(vec![(ResultOrder::Sorted, l), (ResultOrder::Sorted, r)]),
        SetOp::Intersect | SetOp::Except => {
            let keys: HashSet<_> = r.iter().map(NodeValue::key).collect();
            let keep = op == SetOp::Intersect;
            l.into_iter().filter(|n| keys.contains(&n.key()) == keep).collect()
        }
    };
    Ok(Sequence::from_sorted_nodes(nodes))
}
