use super::{bool_result, int_result};
use crate::engine::runtime::{CallCtx, Error, ErrorCode};
use crate::model::XdmNode;
use crate::xdm::{Sequence, XdmSequence};

pub(super) fn fn_true<N: XdmNode>(_ctx: &CallCtx<N>, _args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    Ok(bool_result(true))
}

pub(super) fn fn_false<N: XdmNode>(_ctx: &CallCtx<N>, _args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    Ok(bool_result(false))
}

pub(super) fn fn_not<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let b = Sequence::from_vec(args[0].clone()).ebv()?;
    Ok(bool_result(!b))
}

pub(super) fn fn_boolean<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let b = Sequence::from_vec(args[0].clone()).ebv()?;
    Ok(bool_result(b))
}

fn require_focus<N: XdmNode>(ctx: &CallCtx<N>) -> Result<(), Error> {
    if ctx.dyn_ctx.focus.item.is_none() {
        return Err(Error::from_code(
            ErrorCode::XPDY0002,
            format!("fn:{}() called without a context item", ctx.name.local),
        ));
    }
    Ok(())
}

pub(super) fn position_fn<N: XdmNode>(ctx: &CallCtx<N>, _args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    require_focus(ctx)?;
    Ok(int_result(ctx.dyn_ctx.focus.position as i64))
}

pub(super) fn last_fn<N: XdmNode>(ctx: &CallCtx<N>, _args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    require_focus(ctx)?;
    Ok(int_result(ctx.dyn_ctx.focus.size as i64))
}
