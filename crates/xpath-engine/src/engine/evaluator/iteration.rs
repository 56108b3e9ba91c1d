//! `for`, `let`, `!` and `to`.

use std::rc::Rc;
use std::sync::Arc;

use crate::compiler::expr::{Expr, expanded};
use crate::engine::runtime::{DeferredValue, DynamicContext, Error, ErrorCode, VariableBinding};
use crate::model::{QName, XdmNode};
use crate::xdm::cast::cast_atomic;
use crate::xdm::{AtomicType, ExpandedName, Sequence, SequenceCursor, XdmAtomicValue, XdmItem};

use super::{CancelPoll, atomize_optional, evaluate};

fn range_bound<N: XdmNode>(expr: &Arc<Expr>, ctx: &DynamicContext<N>) -> Result<Option<i64>, Error> {
    let Some(value) = atomize_optional(expr, ctx, "range operand")? else {
        return Ok(None);
    };
    let value = if value.is_untyped() { cast_atomic(&value, AtomicType::Integer)? } else { value };
    value.as_integer().map(Some).ok_or_else(|| {
        Error::from_code(
            ErrorCode::XPTY0004,
            format!("range operand must be an xs:integer, found {}", value.type_name()),
        )
    })
}

/// `start to end`, produced lazily.
pub(crate) fn range<N: XdmNode>(start: &Arc<Expr>, end: &Arc<Expr>, ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    let (Some(from), Some(to)) = (range_bound(start, ctx)?, range_bound(end, ctx)?) else {
        return Ok(Sequence::empty());
    };
    if from > to {
        return Ok(Sequence::empty());
    }
    if from == to {
        return Ok(Sequence::singleton(XdmItem::Atomic(XdmAtomicValue::Integer(from))));
    }
    Ok(Sequence::from_results((from..=to).map(|i| Ok(XdmItem::Atomic(XdmAtomicValue::Integer(i))))))
}

pub(crate) fn for_each<N: XdmNode>(
    var: &QName,
    source: &Arc<Expr>,
    body: &Arc<Expr>,
    ctx: &DynamicContext<N>,
) -> Result<Sequence<N>, Error> {
    let source = evaluate(source, ctx)?;
    Ok(Sequence::from_cursor(ForCursor {
        name: expanded(var),
        source,
        body: Arc::clone(body),
        ctx: ctx.clone(),
        current: None,
        cancel: CancelPoll::of(ctx),
    }))
}

/// Binds the value lazily: it is computed on first reference and shared afterwards.
pub(crate) fn let_binding<N: XdmNode>(
    var: &QName,
    value: &Arc<Expr>,
    body: &Arc<Expr>,
    ctx: &DynamicContext<N>,
) -> Result<Sequence<N>, Error> {
    let expr = Arc::clone(value);
    let outer = ctx.clone();
    let deferred = DeferredValue::new(move || evaluate(&expr, &outer)?.materialize());
    let scope = ctx.bind(expanded(var), VariableBinding::Deferred(Rc::new(deferred)));
    evaluate(body, &scope)
}

/// `left ! right`: `right` once per item of `left`, with that item as the focus.
pub(crate) fn simple_map<N: XdmNode>(left: &Arc<Expr>, right: &Arc<Expr>, ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    let items = evaluate(left, ctx)?.materialize()?;
    let size = items.len();
    let cancel = CancelPoll::of(ctx);
    let mut parts = Vec::with_capacity(size);
    for (i, item) in items.into_iter().enumerate() {
        cancel.check()?;
        parts.push(evaluate(right, &ctx.with_focus(item, i + 1, size))?);
    }
    Ok(Sequence::concat(parts))
}

struct ForCursor<N> {
    name: ExpandedName,
    source: Sequence<N>,
    body: Arc<Expr>,
    ctx: DynamicContext<N>,
    current: Option<Sequence<N>>,
    cancel: CancelPoll,
}

impl<N: XdmNode> SequenceCursor<N> for ForCursor<N> {
    fn next_item(&mut self) -> Option<Result<XdmItem<N>, Error>> {
        loop {
            if let Some(current) = self.current.as_mut() {
                match current.next_item() {
                    Some(item) => return Some(item),
                    None => self.current = None,
                }
            }
            let item = match self.source.next_item()? {
                Ok(item) => item,
                Err(e) => return Some(Err(e)),
            };
            let scope = self.ctx.bind(self.name.clone(), VariableBinding::single(item));
            match self.cancel.check().and_then(|_| evaluate(&self.body, &scope)) {
                Ok(seq) => self.current = Some(seq),
                Err(e) => {
                    self.source = Sequence::empty();
                    return Some(Err(e));
                }
            }
        }
    }
}
