use core::cmp::Ordering;

use rust_decimal::Decimal;

use super::{atomic, int_result};
use crate::compiler::expr::ArithOp;
use crate::engine::compare::atomic_order;
use crate::engine::evaluator::arithmetic::arithmetic;
use crate::engine::runtime::{CallCtx, Error, ErrorCode};
use crate::model::XdmNode;
use crate::xdm::cast::cast_atomic;
use crate::xdm::{AtomicType, XdmAtomicValue, XdmItem, XdmSequence};

use super::strings::round_half_up;

fn number_of(value: Option<XdmAtomicValue>) -> f64 {
    value
        .and_then(|v| cast_atomic(&v, AtomicType::Double).ok())
        .and_then(|v| v.as_f64())
        .unwrap_or(f64::NAN)
}

pub(super) fn number_fn<N: XdmNode>(ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let value = match args.first() {
        Some(arg) => arg.first().and_then(XdmItem::as_atomic).cloned(),
        None => Some(ctx.dyn_ctx.context_item()?.atomize()?),
    };
    Ok(atomic(XdmAtomicValue::Double(number_of(value))))
}

/// Applies a rounding-style function while keeping the numeric type of the argument.
fn map_numeric<N: XdmNode>(
    args: &[XdmSequence<N>],
    on_integer: impl Fn(i64) -> Option<i64>,
    on_decimal: impl Fn(Decimal) -> Decimal,
    on_double: impl Fn(f64) -> f64,
) -> Result<XdmSequence<N>, Error> {
    let Some(value) = args[0].first().and_then(XdmItem::as_atomic) else {
        return Ok(Vec::new());
    };
    let out = match value {
        XdmAtomicValue::Decimal(d) => XdmAtomicValue::Decimal(on_decimal(*d)),
        XdmAtomicValue::Double(d) => XdmAtomicValue::Double(on_double(*d)),
        XdmAtomicValue::Float(f) => XdmAtomicValue::Float(on_double(f64::from(*f)) as f32),
        other => {
            let i = other.as_integer().ok_or_else(|| {
                Error::from_code(ErrorCode::XPTY0004, format!("expected a numeric value, found {}", other.type_name()))
            })?;
            XdmAtomicValue::Integer(
                on_integer(i).ok_or_else(|| Error::from_code(ErrorCode::FOAR0002, "integer overflow"))?,
            )
        }
    };
    Ok(atomic(out))
}

pub(super) fn abs_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    map_numeric(args, i64::checked_abs, |d| d.abs(), f64::abs)
}

pub(super) fn floor_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    map_numeric(args, Some, |d| d.floor(), f64::floor)
}

pub(super) fn ceiling_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    map_numeric(args, Some, |d| d.ceil(), f64::ceil)
}

pub(super) fn round_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let half = Decimal::new(5, 1);
    map_numeric(args, Some, |d| d.checked_add(half).map_or(d, |x| x.floor()), round_half_up)
}

/// Untyped values are treated as `xs:double`; strings and other non-numerics are rejected.
fn aggregate_values(items: &[XdmItem<impl XdmNode>], what: &str) -> Result<Vec<XdmAtomicValue>, Error> {
    items
        .iter()
        .map(|item| {
            let v = item.atomize()?;
            let v = if v.is_untyped() { cast_atomic(&v, AtomicType::Double)? } else { v };
            let summable = v.is_numeric()
                || matches!(v, XdmAtomicValue::YearMonthDuration(_) | XdmAtomicValue::DayTimeDuration(_));
            if !summable {
                return Err(Error::from_code(
                    ErrorCode::FORG0006,
                    format!("fn:{what} is not defined for {}", v.type_name()),
                ));
            }
            Ok(v)
        })
        .collect()
}

fn total<N: XdmNode>(ctx: &CallCtx<N>, values: Vec<XdmAtomicValue>, what: &str) -> Result<XdmAtomicValue, Error> {
    let tz = ctx.dyn_ctx.implicit_timezone;
    let mut iter = values.into_iter();
    let Some(first) = iter.next() else {
        return Ok(XdmAtomicValue::Integer(0));
    };
    iter.try_fold(first, |acc, v| {
        arithmetic(ArithOp::Add, acc, v, tz).map_err(|e| {
            if e.code_enum() == ErrorCode::XPTY0004 {
                Error::from_code(ErrorCode::FORG0006, format!("fn:{what}: {}", e.message))
            } else {
                e
            }
        })
    })
}

pub(super) fn sum_fn<N: XdmNode>(ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let values = aggregate_values(&args[0], "sum")?;
    if values.is_empty() {
        return Ok(match args.get(1) {
            Some(zero) => zero.clone(),
            None => int_result(0),
        });
    }
    Ok(atomic(total(ctx, values, "sum")?))
}

pub(super) fn avg_fn<N: XdmNode>(ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let values = aggregate_values(&args[0], "avg")?;
    if values.is_empty() {
        return Ok(Vec::new());
    }
    let count = XdmAtomicValue::Integer(values.len() as i64);
    let sum = total(ctx, values, "avg")?;
    Ok(atomic(arithmetic(ArithOp::Div, sum, count, ctx.dyn_ctx.implicit_timezone)?))
}

fn extreme<N: XdmNode>(ctx: &CallCtx<N>, args: &[XdmSequence<N>], keep: Ordering, what: &str) -> Result<XdmSequence<N>, Error> {
    if let Some(collation) = args.get(1) {
        crate::engine::compare::require_codepoint_collation(Some(super::opt_string(collation)?.as_str()))?;
    }
    let tz = ctx.dyn_ctx.implicit_timezone;
    let mut best: Option<XdmAtomicValue> = None;
    for item in &args[0] {
        let v = item.atomize()?;
        let v = if v.is_untyped() { cast_atomic(&v, AtomicType::Double)? } else { v };
        if matches!(v, XdmAtomicValue::Double(d) if d.is_nan()) || matches!(v, XdmAtomicValue::Float(f) if f.is_nan()) {
            return Ok(atomic(XdmAtomicValue::Double(f64::NAN)));
        }
        best = Some(match best {
            None => v,
            Some(current) => {
                let order = atomic_order(&v, &current, tz).map_err(|e| {
                    Error::from_code(ErrorCode::FORG0006, format!("fn:{what}: {}", e.message))
                })?;
                if order == Some(keep) { v } else { current }
            }
        });
    }
    Ok(best.map(atomic).unwrap_or_default())
}

pub(super) fn min_fn<N: XdmNode>(ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    extreme(ctx, args, Ordering::Less, "min")
}

pub(super) fn max_fn<N: XdmNode>(ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    extreme(ctx, args, Ordering::Greater, "max")
}

pub(super) fn count_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    Ok(int_result(args[0].len() as i64))
}
