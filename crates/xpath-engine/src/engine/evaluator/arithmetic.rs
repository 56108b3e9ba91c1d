//! Arithmetic over numerics, durations and date/time values.

use chrono::{FixedOffset, Months, NaiveDateTime, NaiveTime, TimeDelta};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;

use crate::compiler::expr::{ArithOp, Expr};
use crate::engine::compare::{instant as utc_instant, promote, time_reference_date};
use crate::engine::runtime::{DynamicContext, Error, ErrorCode};
use crate::model::XdmNode;
use crate::xdm::cast::cast_atomic;
use crate::xdm::{AtomicType, Sequence, XdmAtomicValue, XdmItem};

use super::atomize_optional;

fn overflow(op: ArithOp) -> Error {
    Error::from_code(ErrorCode::FOAR0002, format!("numeric overflow in `{}`", op.symbol()))
}

fn duration_overflow(op: ArithOp) -> Error {
    Error::from_code(ErrorCode::FODT0002, format!("duration overflow in `{}`", op.symbol()))
}

fn date_time_overflow(op: ArithOp) -> Error {
    Error::from_code(ErrorCode::FODT0001, format!("date/time overflow in `{}`", op.symbol()))
}

fn division_by_zero() -> Error {
    Error::from_code(ErrorCode::FOAR0001, "division by zero")
}

fn undefined(op: ArithOp, a: &XdmAtomicValue, b: &XdmAtomicValue) -> Error {
    Error::from_code(
        ErrorCode::XPTY0004,
        format!("`{}` is not defined for {} and {}", op.symbol(), a.type_name(), b.type_name()),
    )
}

fn untyped_as_double(v: XdmAtomicValue) -> Result<XdmAtomicValue, Error> {
    if v.is_untyped() { cast_atomic(&v, AtomicType::Double) } else { Ok(v) }
}

pub(crate) fn binary<N: XdmNode>(
    op: ArithOp,
    left: &Arc<Expr>,
    right: &Arc<Expr>,
    ctx: &DynamicContext<N>,
) -> Result<Sequence<N>, Error> {
    let Some(a) = atomize_optional(left, ctx, op.symbol())? else {
        return Ok(Sequence::empty());
    };
    let Some(b) = atomize_optional(right, ctx, op.symbol())? else {
        return Ok(Sequence::empty());
    };
    let value = arithmetic(op, untyped_as_double(a)?, untyped_as_double(b)?, ctx.implicit_timezone)?;
    Ok(Sequence::singleton(XdmItem::Atomic(value)))
}

pub(crate) fn unary<N: XdmNode>(negate: bool, operand: &Arc<Expr>, ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    let Some(v) = atomize_optional(operand, ctx, "unary operator")? else {
        return Ok(Sequence::empty());
    };
    let v = untyped_as_double(v)?;
    if !v.is_numeric() {
        return Err(Error::from_code(
            ErrorCode::XPTY0004,
            format!("unary `{}` is not defined for {}", if negate { "-" } else { "+" }, v.type_name()),
        ));
    }
    let value = if !negate {
        v
    } else {
        match v {
            XdmAtomicValue::Decimal(d) => XdmAtomicValue::Decimal(-d),
            XdmAtomicValue::Float(f) => XdmAtomicValue::Float(-f),
            XdmAtomicValue::Double(d) => XdmAtomicValue::Double(-d),
            other => {
                let i = other.as_integer().unwrap_or_default();
                XdmAtomicValue::Integer(i.checked_neg().ok_or_else(|| overflow(ArithOp::Sub))?)
            }
        }
    };
    Ok(Sequence::singleton(XdmItem::Atomic(value)))
}

/// Applies `op` to two atomic operands that are no longer untyped.
pub(crate) fn arithmetic(
    op: ArithOp,
    a: XdmAtomicValue,
    b: XdmAtomicValue,
    implicit_tz: FixedOffset,
) -> Result<XdmAtomicValue, Error> {
    if a.is_numeric() && b.is_numeric() {
        let (pa, pb) = promote(&a, &b)?;
        return match (pa, pb) {
            (XdmAtomicValue::Decimal(x), XdmAtomicValue::Decimal(y)) => decimal_op(op, x, y),
            (XdmAtomicValue::Float(x), XdmAtomicValue::Float(y)) => {
                match double_op(op, f64::from(x), f64::from(y))? {
                    XdmAtomicValue::Double(d) => Ok(XdmAtomicValue::Float(d as f32)),
                    other => Ok(other),
                }
            }
            (XdmAtomicValue::Double(x), XdmAtomicValue::Double(y)) => double_op(op, x, y),
            (x, y) => match (x.as_integer(), y.as_integer()) {
                (Some(i), Some(j)) => integer_op(op, i, j),
                _ => Err(undefined(op, &a, &b)),
            },
        };
    }
    temporal(op, &a, &b, implicit_tz)
}

fn integer_op(op: ArithOp, x: i64, y: i64) -> Result<XdmAtomicValue, Error> {
    let int = |r: Option<i64>| r.map(XdmAtomicValue::Integer).ok_or_else(|| overflow(op));
    match op {
        ArithOp::Add => int(x.checked_add(y)),
        ArithOp::Sub => int(x.checked_sub(y)),
        ArithOp::Mul => int(x.checked_mul(y)),
        ArithOp::Div => decimal_op(op, Decimal::from(x), Decimal::from(y)),
        ArithOp::IDiv | ArithOp::Mod if y == 0 => Err(division_by_zero()),
        ArithOp::IDiv => int(x.checked_div(y)),
        // i64::MIN % -1 overflows in Rust but is 0 here
        ArithOp::Mod if y == -1 => Ok(XdmAtomicValue::Integer(0)),
        ArithOp::Mod => int(x.checked_rem(y)),
    }
}

fn decimal_op(op: ArithOp, x: Decimal, y: Decimal) -> Result<XdmAtomicValue, Error> {
    let dec = |r: Option<Decimal>| r.map(XdmAtomicValue::Decimal).ok_or_else(|| overflow(op));
    match op {
        ArithOp::Add => dec(x.checked_add(y)),
        ArithOp::Sub => dec(x.checked_sub(y)),
        ArithOp::Mul => dec(x.checked_mul(y)),
        ArithOp::Div | ArithOp::IDiv | ArithOp::Mod if y.is_zero() => Err(division_by_zero()),
        ArithOp::Div => dec(x.checked_div(y)),
        ArithOp::IDiv => {
            let q = x.checked_div(y).ok_or_else(|| overflow(op))?.trunc();
            q.to_i64().map(XdmAtomicValue::Integer).ok_or_else(|| overflow(op))
        }
        ArithOp::Mod => dec(x.checked_rem(y)),
    }
}

fn double_op(op: ArithOp, x: f64, y: f64) -> Result<XdmAtomicValue, Error> {
    Ok(XdmAtomicValue::Double(match op {
        ArithOp::Add => x + y,
        ArithOp::Sub => x - y,
        ArithOp::Mul => x * y,
        ArithOp::Div => x / y,
        ArithOp::Mod => x % y,
        ArithOp::IDiv => {
            if y == 0.0 {
                return Err(division_by_zero());
            }
            let q = (x / y).trunc();
            if !q.is_finite() || q.abs() >= i64::MAX as f64 {
                return Err(overflow(op));
            }
            return Ok(XdmAtomicValue::Integer(q as i64));
        }
    }))
}

fn scale(value: i64, factor: f64, op: ArithOp) -> Result<i64, Error> {
    let scaled = (value as f64 * factor).round();
    if !scaled.is_finite() || scaled.abs() >= i64::MAX as f64 {
        return Err(duration_overflow(op));
    }
    Ok(scaled as i64)
}

/// Multiplier applied to a duration by `*` or `div` with a number. Dividing by zero overflows.
fn duration_factor(op: ArithOp, n: &XdmAtomicValue) -> Result<f64, Error> {
    let n = n.as_f64().unwrap_or(f64::NAN);
    if n.is_nan() {
        return Err(Error::from_code(
            ErrorCode::FOCA0005,
            format!("NaN is not allowed as the numeric operand of `{}` on a duration", op.symbol()),
        ));
    }
    match op {
        ArithOp::Mul => Ok(n),
        ArithOp::Div if n == 0.0 => Err(duration_overflow(op)),
        ArithOp::Div => Ok(1.0 / n),
        _ => Err(Error::from_code(
            ErrorCode::XPTY0004,
            format!("`{}` is not defined for a duration and a number", op.symbol()),
        )),
    }
}

fn duration_ratio(x: i64, y: i64) -> Result<XdmAtomicValue, Error> {
    if y == 0 {
        return Err(division_by_zero());
    }
    Decimal::from(x)
        .checked_div(Decimal::from(y))
        .map(XdmAtomicValue::Decimal)
        .ok_or_else(|| overflow(ArithOp::Div))
}

fn shift_months(value: NaiveDateTime, months: i64) -> Option<NaiveDateTime> {
    let m = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 { value.checked_add_months(m) } else { value.checked_sub_months(m) }
}

fn shift_millis(value: NaiveDateTime, millis: i64) -> Option<NaiveDateTime> {
    value.checked_add_signed(TimeDelta::try_milliseconds(millis)?)
}

fn temporal(op: ArithOp, a: &XdmAtomicValue, b: &XdmAtomicValue, tz: FixedOffset) -> Result<XdmAtomicValue, Error> {
    use XdmAtomicValue as V;
    let sign = match op {
        ArithOp::Add => 1,
        ArithOp::Sub => -1,
        _ => 0,
    };
    let too_big = || duration_overflow(op);
    let out_of_range = || date_time_overflow(op);
    let value = match (a, b) {
        (V::YearMonthDuration(x), V::YearMonthDuration(y)) => match op {
            ArithOp::Add => V::YearMonthDuration(x.checked_add(*y).ok_or_else(too_big)?),
            ArithOp::Sub => V::YearMonthDuration(x.checked_sub(*y).ok_or_else(too_big)?),
            ArithOp::Div => duration_ratio(*x, *y)?,
            _ => return Err(undefined(op, a, b)),
        },
        (V::DayTimeDuration(x), V::DayTimeDuration(y)) => match op {
            ArithOp::Add => V::DayTimeDuration(x.checked_add(*y).ok_or_else(too_big)?),
            ArithOp::Sub => V::DayTimeDuration(x.checked_sub(*y).ok_or_else(too_big)?),
            ArithOp::Div => duration_ratio(*x, *y)?,
            _ => return Err(undefined(op, a, b)),
        },
        (V::YearMonthDuration(m), n) if n.is_numeric() && matches!(op, ArithOp::Mul | ArithOp::Div) => {
            V::YearMonthDuration(scale(*m, duration_factor(op, n)?, op)?)
        }
        (n, V::YearMonthDuration(m)) if n.is_numeric() && op == ArithOp::Mul => {
            V::YearMonthDuration(scale(*m, duration_factor(op, n)?, op)?)
        }
        (V::DayTimeDuration(ms), n) if n.is_numeric() && matches!(op, ArithOp::Mul | ArithOp::Div) => {
            V::DayTimeDuration(scale(*ms, duration_factor(op, n)?, op)?)
        }
        (n, V::DayTimeDuration(ms)) if n.is_numeric() && op == ArithOp::Mul => {
            V::DayTimeDuration(scale(*ms, duration_factor(op, n)?, op)?)
        }
        (V::DateTime { value, tz: z }, V::YearMonthDuration(m)) if sign != 0 => {
            V::DateTime { value: shift_months(*value, sign * m).ok_or_else(out_of_range)?, tz: *z }
        }
        (V::DateTime { value, tz: z }, V::DayTimeDuration(ms)) if sign != 0 => {
            V::DateTime { value: shift_millis(*value, sign * ms).ok_or_else(out_of_range)?, tz: *z }
        }
        (V::YearMonthDuration(_) | V::DayTimeDuration(_), V::DateTime { .. } | V::Date { .. } | V::Time { .. })
            if op == ArithOp::Add =>
        {
            return temporal(op, b, a, tz);
        }
        (V::Date { date, tz: z }, V::YearMonthDuration(m)) if sign != 0 => V::Date {
            date: shift_months(date.and_time(NaiveTime::MIN), sign * m).ok_or_else(out_of_range)?.date(),
            tz: *z,
        },
        (V::Date { date, tz: z }, V::DayTimeDuration(ms)) if sign != 0 => V::Date {
            date: shift_millis(date.and_time(NaiveTime::MIN), sign * ms).ok_or_else(out_of_range)?.date(),
            tz: *z,
        },
        (V::Time { time, tz: z }, V::DayTimeDuration(ms)) if sign != 0 => {
            let delta = TimeDelta::try_milliseconds(sign * ms).ok_or_else(too_big)?;
            V::Time { time: time.overflowing_add_signed(delta).0, tz: *z }
        }
        (V::DateTime { value: x, tz: tx }, V::DateTime { value: y, tz: ty }) if op == ArithOp::Sub => {
            V::DayTimeDuration((utc_instant(*x, *tx, tz) - utc_instant(*y, *ty, tz)).num_milliseconds())
        }
        (V::Date { date: x, tz: tx }, V::Date { date: y, tz: ty }) if op == ArithOp::Sub => V::DayTimeDuration(
            (utc_instant(x.and_time(NaiveTime::MIN), *tx, tz) - utc_instant(y.and_time(NaiveTime::MIN), *ty, tz))
                .num_milliseconds(),
        ),
        (V::Time { time: x, tz: tx }, V::Time { time: y, tz: ty }) if op == ArithOp::Sub => {
            let day = time_reference_date();
            V::DayTimeDuration(
                (utc_instant(day.and_time(*x), *tx, tz) - utc_instant(day.and_time(*y), *ty, tz)).num_milliseconds(),
            )
        }
        _ => return Err(undefined(op, a, b)),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Offset;
    use rstest::rstest;
    use rust_decimal::prelude::FromPrimitive;

    fn run(op: ArithOp, a: XdmAtomicValue, b: XdmAtomicValue) -> Result<XdmAtomicValue, Error> {
        arithmetic(op, a, b, chrono::Utc.fix())
    }

    #[rstest]
    fn integer_division_yields_decimal() {
        let v = run(ArithOp::Div, 7i64.into(), 2i64.into()).unwrap();
        assert_eq!(v, XdmAtomicValue::Decimal(Decimal::from_f64(3.5).unwrap()));
    }

    #[rstest]
    #[case(ArithOp::Div)]
    #[case(ArithOp::IDiv)]
    #[case(ArithOp::Mod)]
    fn integer_division_by_zero(#[case] op: ArithOp) {
        assert_eq!(run(op, 1i64.into(), 0i64.into()).unwrap_err().code_enum(), ErrorCode::FOAR0001);
    }

    #[rstest]
    fn double_division_by_zero_is_infinite() {
        assert_eq!(run(ArithOp::Div, 1.0f64.into(), 0.0f64.into()).unwrap(), XdmAtomicValue::Double(f64::INFINITY));
    }

    #[rstest]
    fn integer_overflow() {
        assert_eq!(run(ArithOp::Mul, i64::MAX.into(), 2i64.into()).unwrap_err().code_enum(), ErrorCode::FOAR0002);
    }

    #[rstest]
    fn mod_keeps_dividend_sign() {
        assert_eq!(run(ArithOp::Mod, (-7i64).into(), 3i64.into()).unwrap(), XdmAtomicValue::Integer(-1));
    }

    #[rstest]
    fn min_integer_mod_minus_one_is_zero() {
        assert_eq!(run(ArithOp::Mod, i64::MIN.into(), (-1i64).into()).unwrap(), XdmAtomicValue::Integer(0));
        assert_eq!(run(ArithOp::IDiv, i64::MIN.into(), (-1i64).into()).unwrap_err().code_enum(), ErrorCode::FOAR0002);
    }

    #[rstest]
    #[case(ArithOp::Mul, f64::NAN, ErrorCode::FOCA0005)]
    #[case(ArithOp::Div, f64::NAN, ErrorCode::FOCA0005)]
    #[case(ArithOp::Mul, f64::INFINITY, ErrorCode::FODT0002)]
    #[case(ArithOp::Div, 0.0, ErrorCode::FODT0002)]
    fn duration_scaling_errors(#[case] op: ArithOp, #[case] factor: f64, #[case] expected: ErrorCode) {
        let hour = XdmAtomicValue::DayTimeDuration(3_600_000);
        assert_eq!(run(op, hour.clone(), factor.into()).unwrap_err().code_enum(), expected);
        let year = XdmAtomicValue::YearMonthDuration(12);
        assert_eq!(run(op, year, factor.into()).unwrap_err().code_enum(), expected);
    }

    #[rstest]
    fn duration_divided_by_infinity_is_zero() {
        let hour = XdmAtomicValue::DayTimeDuration(3_600_000);
        assert_eq!(run(ArithOp::Div, hour, f64::INFINITY.into()).unwrap(), XdmAtomicValue::DayTimeDuration(0));
    }

    #[rstest]
    fn duration_sum_overflow() {
        let max = XdmAtomicValue::DayTimeDuration(i64::MAX);
        let err = run(ArithOp::Add, max, XdmAtomicValue::DayTimeDuration(1)).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::FODT0002);
    }

    #[rstest]
    fn date_plus_months_clamps_to_month_end() {
        let date = crate::xdm::cast::parse_lexical("2024-01-31", AtomicType::Date).unwrap();
        let shifted = run(ArithOp::Add, date, XdmAtomicValue::YearMonthDuration(1)).unwrap();
        assert_eq!(shifted.string_value(), "2024-02-29");
    }

    #[rstest]
    fn datetime_difference_is_day_time_duration() {
        let a = crate::xdm::cast::parse_lexical("2024-01-02T00:00:00Z", AtomicType::DateTime).unwrap();
        let b = crate::xdm::cast::parse_lexical("2024-01-01T12:00:00Z", AtomicType::DateTime).unwrap();
        assert_eq!(run(ArithOp::Sub, a, b).unwrap(), XdmAtomicValue::DayTimeDuration(12 * 3600 * 1000));
    }
}
