//! Node accessors: names, root, typed and string values.

use super::{atomic, bool_result, context_node_arg, string_result};
use crate::engine::runtime::{CallCtx, Error, ErrorCode};
use crate::model::{NodeKind, QName, XdmNode};
use crate::xdm::{NodeValue, XdmAtomicValue, XdmItem, XdmSequence};

/// The node argument, or the context node for the zero-argument form.
fn node_arg<N: XdmNode>(ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<Option<NodeValue<N>>, Error> {
    let Some(arg) = args.first() else {
        return match context_node_arg(ctx)?.pop() {
            Some(XdmItem::Node(n)) => Ok(Some(n)),
            _ => Ok(None),
        };
    };
    match arg.first() {
        None => Ok(None),
        Some(XdmItem::Node(n)) => Ok(Some(n.clone())),
        Some(other) => Err(Error::from_code(
            ErrorCode::XPTY0004,
            format!("fn:{} expects a node, found {}", ctx.name.local, other.type_label()),
        )),
    }
}

/// Nodes whose name is exposed by the name accessors.
fn visible_name<N: XdmNode>(node: &NodeValue<N>) -> Option<&QName> {
    match node.kind() {
        NodeKind::Element | NodeKind::Attribute | NodeKind::ProcessingInstruction | NodeKind::Namespace => {
            node.name()
        }
        _ => None,
    }
}

pub(super) fn name_fn<N: XdmNode>(ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let node = node_arg(ctx, args)?;
    let name = node.as_ref().and_then(visible_name).map(QName::lexical).unwrap_or_default();
    Ok(string_result(name))
}

pub(super) fn local_name_fn<N: XdmNode>(ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let node = node_arg(ctx, args)?;
    let name = node.as_ref().and_then(visible_name).map(|q| q.local.clone()).unwrap_or_default();
    Ok(string_result(name))
}

pub(super) fn namespace_uri_fn<N: XdmNode>(
    ctx: &CallCtx<N>,
    args: &[XdmSequence<N>],
) -> Result<XdmSequence<N>, Error> {
    let node = node_arg(ctx, args)?;
    let uri = node.as_ref().and_then(visible_name).and_then(|q| q.ns_uri.clone()).unwrap_or_default();
    Ok(atomic(XdmAtomicValue::AnyUri(uri)))
}

pub(super) fn node_name_fn<N: XdmNode>(ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let node = node_arg(ctx, args)?;
    Ok(match node.as_ref().and_then(visible_name) {
        Some(q) => atomic(XdmAtomicValue::QName {
            ns_uri: q.ns_uri.clone(),
            prefix: q.prefix.clone(),
            local: q.local.clone(),
        }),
        None => Vec::new(),
    })
}

pub(super) fn root_fn<N: XdmNode>(ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let node = node_arg(ctx, args)?;
    Ok(match node {
        Some(n) => vec![XdmItem::Node(n.root(&ctx.dyn_ctx.nodes))],
        None => Vec::new(),
    })
}

pub(super) fn has_children_fn<N: XdmNode>(
    ctx: &CallCtx<N>,
    args: &[XdmSequence<N>],
) -> Result<XdmSequence<N>, Error> {
    let node = node_arg(ctx, args)?;
    let has = node.as_ref().and_then(NodeValue::tree_node).is_some_and(|n| n.first_child().is_some());
    Ok(bool_result(has))
}

pub(super) fn data_fn<N: XdmNode>(ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let items = match args.first() {
        Some(arg) => arg.clone(),
        None => vec![ctx.dyn_ctx.context_item()?.clone()],
    };
    items.iter().map(|item| item.atomize().map(XdmItem::Atomic)).collect()
}

pub(super) fn string_fn<N: XdmNode>(ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let value = match args.first() {
        Some(arg) => match arg.first() {
            Some(item) => item.string_value()?,
            None => String::new(),
        },
        None => ctx.dyn_ctx.context_item()?.string_value()?,
    };
    Ok(string_result(value))
}
