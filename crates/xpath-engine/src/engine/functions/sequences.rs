use super::{bool_result, opt_string};
use crate::consts::ERR_NS;
use crate::engine::compare::{atomic_equal, require_codepoint_collation};
use crate::engine::functions::strings::round_half_up;
use crate::engine::runtime::{CallCtx, Error, ErrorCode};
use crate::model::XdmNode;
use crate::xdm::{ExpandedName, XdmAtomicValue, XdmItem, XdmSequence};

pub(super) fn empty_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    Ok(bool_result(args[0].is_empty()))
}

pub(super) fn exists_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    Ok(bool_result(!args[0].is_empty()))
}

fn atomics<N: XdmNode>(arg: &[XdmItem<N>]) -> impl Iterator<Item = &XdmAtomicValue> {
    arg.iter().filter_map(XdmItem::as_atomic)
}

pub(super) fn distinct_values_fn<N: XdmNode>(
    ctx: &CallCtx<N>,
    args: &[XdmSequence<N>],
) -> Result<XdmSequence<N>, Error> {
    if let Some(collation) = args.get(1) {
        require_codepoint_collation(Some(opt_string(collation)?.as_str()))?;
    }
    let tz = ctx.dyn_ctx.implicit_timezone;
    let mut seen: Vec<XdmAtomicValue> = Vec::new();
    for value in atomics(&args[0]) {
        if !seen.iter().any(|s| atomic_equal(s, value, tz)) {
            seen.push(value.clone());
        }
    }
    Ok(seen.into_iter().map(XdmItem::Atomic).collect())
}

pub(super) fn reverse_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    Ok(args[0].iter().rev().cloned().collect())
}

fn double_arg<N: XdmNode>(arg: &[XdmItem<N>]) -> f64 {
    arg.first().and_then(XdmItem::as_atomic).and_then(XdmAtomicValue::as_f64).unwrap_or(f64::NAN)
}

pub(super) fn subsequence_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let from = round_half_up(double_arg(&args[1]));
    let to = match args.get(2) {
        Some(len) => from + round_half_up(double_arg(len)),
        None => f64::INFINITY,
    };
    Ok(args[0]
        .iter()
        .enumerate()
        .filter(|(i, _)| {
            let p = (*i + 1) as f64;
            p >= from && p < to
        })
        .map(|(_, item)| item.clone())
        .collect())
}

pub(super) fn head_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    Ok(args[0].first().cloned().into_iter().collect())
}

pub(super) fn tail_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    Ok(args[0].iter().skip(1).cloned().collect())
}

pub(super) fn index_of_fn<N: XdmNode>(ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    if let Some(collation) = args.get(2) {
        require_codepoint_collation(Some(opt_string(collation)?.as_str()))?;
    }
    let Some(search) = args[1].first().and_then(XdmItem::as_atomic) else {
        return Ok(Vec::new());
    };
    let tz = ctx.dyn_ctx.implicit_timezone;
    Ok(atomics(&args[0])
        .enumerate()
        .filter(|(_, v)| atomic_equal(v, search, tz))
        .map(|(i, _)| XdmItem::Atomic(XdmAtomicValue::Integer(i as i64 + 1)))
        .collect())
}

fn integer_arg<N: XdmNode>(arg: &[XdmItem<N>]) -> i64 {
    arg.first().and_then(XdmItem::as_atomic).and_then(XdmAtomicValue::as_integer).unwrap_or(0)
}

pub(super) fn insert_before_fn<N: XdmNode>(
    _ctx: &CallCtx<N>,
    args: &[XdmSequence<N>],
) -> Result<XdmSequence<N>, Error> {
    let target = &args[0];
    let at = (integer_arg(&args[1]).max(1) as usize - 1).min(target.len());
    let mut out = Vec::with_capacity(target.len() + args[2].len());
    out.extend_from_slice(&target[..at]);
    out.extend_from_slice(&args[2]);
    out.extend_from_slice(&target[at..]);
    Ok(out)
}

pub(super) fn remove_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let position = integer_arg(&args[1]);
    Ok(args[0]
        .iter()
        .enumerate()
        .filter(|(i, _)| *i as i64 + 1 != position)
        .map(|(_, item)| item.clone())
        .collect())
}

pub(super) fn exactly_one_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    if args[0].len() != 1 {
        return Err(Error::from_code(
            ErrorCode::FORG0005,
            format!("fn:exactly-one called with a sequence of {} items", args[0].len()),
        ));
    }
    Ok(args[0].clone())
}

pub(super) fn zero_or_one_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    if args[0].len() > 1 {
        return Err(Error::from_code(
            ErrorCode::FORG0003,
            format!("fn:zero-or-one called with a sequence of {} items", args[0].len()),
        ));
    }
    Ok(args[0].clone())
}

pub(super) fn one_or_more_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    if args[0].is_empty() {
        return Err(Error::from_code(ErrorCode::FORG0004, "fn:one-or-more called with an empty sequence"));
    }
    Ok(args[0].clone())
}

pub(super) fn unordered_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    Ok(args[0].clone())
}

/// `fn:error`: always fails, by default with `err:FOER0000`.
pub(super) fn error_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let code = match args.first().and_then(|a| a.first()).and_then(XdmItem::as_atomic) {
        Some(XdmAtomicValue::QName { ns_uri, local, .. }) => ExpandedName::new(ns_uri.clone(), local.clone()),
        _ => ExpandedName::ns(ERR_NS, "FOER0000"),
    };
    let message = match args.get(1) {
        Some(description) => opt_string(description)?,
        None => "error raised by fn:error".to_string(),
    };
    Err(Error::new_qname(code, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::runtime::DynamicContextBuilder;
    use crate::model::simple::SimpleNode;
    use rstest::rstest;

    fn ints(values: &[i64]) -> XdmSequence<SimpleNode> {
        values.iter().map(|i| XdmItem::Atomic(XdmAtomicValue::Integer(*i))).collect()
    }

    fn call(
        f: fn(&CallCtx<SimpleNode>, &[XdmSequence<SimpleNode>]) -> Result<XdmSequence<SimpleNode>, Error>,
        args: &[XdmSequence<SimpleNode>],
    ) -> Result<XdmSequence<SimpleNode>, Error> {
        let dyn_ctx = DynamicContextBuilder::<SimpleNode>::new().build();
        let name = ExpandedName::local("test");
        f(&CallCtx { dyn_ctx: &dyn_ctx, name: &name }, args)
    }

    #[rstest]
    #[case(&[1, 2, 3], 0, &[7, 1, 2, 3])]
    #[case(&[1, 2, 3], 2, &[1, 7, 2, 3])]
    #[case(&[1, 2, 3], 10, &[1, 2, 3, 7])]
    fn insert_before_clamps_position(#[case] target: &[i64], #[case] at: i64, #[case] expected: &[i64]) {
        let out = call(insert_before_fn, &[ints(target), ints(&[at]), ints(&[7])]).unwrap();
        assert_eq!(out, ints(expected));
    }

    #[rstest]
    fn distinct_values_keeps_first_occurrence() {
        let out = call(distinct_values_fn, &[ints(&[3, 1, 3, 2, 1])]).unwrap();
        assert_eq!(out, ints(&[3, 1, 2]));
    }

    #[rstest]
    fn subsequence_rounds_bounds() {
        let out = call(subsequence_fn, &[ints(&[1, 2, 3, 4, 5]), vec![XdmAtomicValue::Double(1.5).into()]]).unwrap();
        assert_eq!(out, ints(&[2, 3, 4, 5]));
    }

    #[rstest]
    fn error_defaults_to_foer0000() {
        let err = call(error_fn, &[]).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::FOER0000);
    }
}
