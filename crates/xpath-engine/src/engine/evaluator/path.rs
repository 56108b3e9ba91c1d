//! Path expressions: step-by-step evaluation with document-order merging.

use core::cmp::Ordering;
use std::sync::Arc;

use crate::compiler::expr::Expr;
use crate::engine::runtime::{DynamicContext, Error, ErrorCode};
use crate::model::{NodeKind, XdmNode};
use crate::xdm::{NodeValue, ResultOrder, Sequence, XdmItem, compare_document_order, sort_and_dedupe};

use super::{CancelPoll, evaluate};

/// Above this many runs a merge falls back to sorting the concatenation.
const MERGE_FAN_IN: usize = 8;

pub(crate) fn root_node<N: XdmNode>(ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    let root = ctx.context_node()?.root(&ctx.nodes);
    if root.kind() != NodeKind::Document {
        return Err(Error::from_code(
            ErrorCode::XPDY0050,
            "the root of the tree containing the context node is not a document node",
        ));
    }
    Ok(Sequence::singleton(XdmItem::Node(root)))
}

pub(crate) fn evaluate_path<N: XdmNode>(steps: &[Arc<Expr>], ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    let Some((first, rest)) = steps.split_first() else {
        return Ok(Sequence::empty());
    };
    let mut current = evaluate(first, ctx)?;
    if rest.is_empty() {
        return finish(current);
    }
    let cancel = CancelPoll::of(ctx);
    for (i, step) in rest.iter().enumerate() {
        let last = i + 1 == rest.len();
        let inputs = step_inputs(current)?;
        current = apply_step(&inputs, step, ctx, last, &cancel)?;
    }
    Ok(current)
}

/// Nodes feeding the next step, in document order. Atomic values here are XPTY0019.
fn step_inputs<N: XdmNode>(seq: Sequence<N>) -> Result<Vec<NodeValue<N>>, Error> {
    let order = seq.order();
    let mut nodes = Vec::new();
    for item in seq {
        match item? {
            XdmItem::Node(n) => nodes.push(n),
            other => {
                return Err(Error::from_code(
                    ErrorCode::XPTY0019,
                    format!("a path step that is not the last one produced {}", other.type_label()),
                ));
            }
        }
    }
    Ok(normalize_run(nodes, order))
}

fn normalize_run<N: XdmNode>(mut nodes: Vec<NodeValue<N>>, order: ResultOrder) -> Vec<NodeValue<N>> {
    match order {
        ResultOrder::Sorted => nodes,
        ResultOrder::ReverseSorted => {
            nodes.reverse();
            nodes
        }
        ResultOrder::Unsorted => sort_and_dedupe(nodes),
    }
}

/// Single-step result: nodes are brought into document order, atomics keep production order.
fn finish<N: XdmNode>(seq: Sequence<N>) -> Result<Sequence<N>, Error> {
    if seq.order() == ResultOrder::Sorted {
        return Ok(seq);
    }
    let order = seq.order();
    let items = seq.materialize()?;
    classify_final(vec![(order, items)])
}

fn apply_step<N: XdmNode>(
    inputs: &[NodeValue<N>],
    step: &Arc<Expr>,
    ctx: &DynamicContext<N>,
    last: bool,
    cancel: &CancelPoll,
) -> Result<Sequence<N>, Error> {
    let size = inputs.len();
    if last && size == 1 {
        let seq = evaluate(step, &ctx.with_focus(XdmItem::Node(inputs[0].clone()), 1, 1))?;
        return finish(seq);
    }
    let mut runs = Vec::with_capacity(size);
    for (i, node) in inputs.iter().enumerate() {
        cancel.check()?;
        let seq = evaluate(step, &ctx.with_focus(XdmItem::Node(node.clone()), i + 1, size))?;
        let order = seq.order();
        runs.push((order, seq.materialize()?));
    }
    if last {
        return classify_final(runs);
    }
    let mut node_runs = Vec::with_capacity(runs.len());
    for (order, items) in runs {
        let mut nodes = Vec::with_capacity(items.len());
        for item in items {
            match item {
                XdmItem::Node(n) => nodes.push(n),
                other => {
                    return Err(Error::from_code(
                        ErrorCode::XPTY0019,
                        format!("a path step that is not the last one produced {}", other.type_label()),
                    ));
                }
            }
        }
        node_runs.push((order, nodes));
    }
    Ok(Sequence::from_sorted_nodes(merge_runs(node_runs)))
}

/// Final-step output: all nodes are merged into document order, all atomics are concatenated,
/// and a mixture is XPTY0018.
fn classify_final<N: XdmNode>(runs: Vec<(ResultOrder, Vec<XdmItem<N>>)>) -> Result<Sequence<N>, Error> {
    let (mut has_nodes, mut has_other) = (false, false);
    for item in runs.iter().flat_map(|(_, items)| items) {
        match item {
            XdmItem::Node(_) => has_nodes = true,
            _ => has_other = true,
        }
    }
    match (has_nodes, has_other) {
        (true, true) => Err(Error::from_code(
            ErrorCode::XPTY0018,
            "the last step of a path returned both nodes and non-node values",
        )),
        (false, _) => Ok(Sequence::from_vec(runs.into_iter().flat_map(|(_, items)| items).collect())),
        (true, false) => {
            let node_runs = runs
                .into_iter()
                .map(|(order, items)| (order, items.into_iter().filter_map(|i| match i {
                    XdmItem::Node(n) => Some(n),
                    _ => None,
                }).collect()))
                .collect();
            Ok(Sequence::from_sorted_nodes(merge_runs(node_runs)))
        }
    }
}

/// Merges per-input runs into one duplicate-free run in document order.
///
/// Each run is first brought into ascending order. Runs that already follow one another are
/// concatenated; a few overlapping runs are merged through an index array; many overlapping runs
/// are concatenated and sorted.
pub(crate) fn merge_runs<N: XdmNode>(runs: Vec<(ResultOrder, Vec<NodeValue<N>>)>) -> Vec<NodeValue<N>> {
    let runs: Vec<Vec<NodeValue<N>>> = runs
        .into_iter()
        .map(|(order, nodes)| normalize_run(nodes, order))
        .filter(|nodes| !nodes.is_empty())
        .collect();
    match runs.len() {
        0 => return Vec::new(),
        1 => return runs.into_iter().flatten().collect(),
        _ => {}
    }
    let disjoint = runs.windows(2).all(|pair| match (pair[0].last(), pair[1].first()) {
        (Some(a), Some(b)) => compare_document_order(a, b) == Ordering::Less,
        _ => true,
    });
    if disjoint {
        return runs.into_iter().flatten().collect();
    }
    if runs.len() > MERGE_FAN_IN {
        return sort_and_dedupe(runs.into_iter().flatten().collect());
    }
    let total = runs.iter().map(Vec::len).sum();
    let mut out: Vec<NodeValue<N>> = Vec::with_capacity(total);
    let mut cursor = vec![0usize; runs.len()];
    loop {
        let mut best: Option<usize> = None;
        for (r, run) in runs.iter().enumerate() {
            let Some(candidate) = run.get(cursor[r]) else { continue };
            best = match best {
                Some(b) if compare_document_order(&runs[b][cursor[b]], candidate) != Ordering::Greater => Some(b),
                _ => Some(r),
            };
        }
        let Some(b) = best else { break };
        let node = &runs[b][cursor[b]];
        if out.last() != Some(node) {
            out.push(node.clone());
        }
        cursor[b] += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::simple::{SimpleNode, doc, elem};
    use crate::xdm::NodeCache;
    use rstest::rstest;

    #[rstest]
    fn overlapping_runs_merge_without_duplicates() {
        let d: SimpleNode = doc().child(elem("r").child(elem("a")).child(elem("b")).child(elem("c"))).build();
        let cache = NodeCache::new();
        let kids: Vec<_> = d.first_child().unwrap().children().map(|n| cache.wrap(n)).collect();
        let runs = vec![
            (ResultOrder::Sorted, vec![kids[0].clone(), kids[2].clone()]),
            (ResultOrder::ReverseSorted, vec![kids[2].clone(), kids[1].clone()]),
        ];
        let merged = merge_runs(runs);
        assert_eq!(merged, kids);
    }
}
