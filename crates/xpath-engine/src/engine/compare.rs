//! Atomic comparison: the promotion ladder, value comparison and general comparison.

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use core::cmp::Ordering;

use crate::consts::CODEPOINT_COLLATION;
use crate::engine::runtime::{Error, ErrorCode};
use crate::xdm::cast::{cast_atomic, parse_double};
use crate::xdm::{AtomicType, XdmAtomicValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ValueOp {
    fn holds(self, ord: Option<Ordering>) -> bool {
        match ord {
            // unordered (NaN): only `ne` holds
            None => self == ValueOp::Ne,
            Some(o) => match self {
                ValueOp::Eq => o == Ordering::Equal,
                ValueOp::Ne => o != Ordering::Equal,
                ValueOp::Lt => o == Ordering::Less,
                ValueOp::Le => o != Ordering::Greater,
                ValueOp::Gt => o == Ordering::Greater,
                ValueOp::Ge => o != Ordering::Less,
            },
        }
    }

    fn is_equality(self) -> bool {
        matches!(self, ValueOp::Eq | ValueOp::Ne)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ValueOp::Eq => "eq",
            ValueOp::Ne => "ne",
            ValueOp::Lt => "lt",
            ValueOp::Le => "le",
            ValueOp::Gt => "gt",
            ValueOp::Ge => "ge",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum NumericRank {
    Integer,
    Decimal,
    Float,
    Double,
}

fn numeric_rank(v: &XdmAtomicValue) -> Option<NumericRank> {
    match v {
        XdmAtomicValue::Double(_) => Some(NumericRank::Double),
        XdmAtomicValue::Float(_) => Some(NumericRank::Float),
        XdmAtomicValue::Decimal(_) => Some(NumericRank::Decimal),
        other => other.as_integer().map(|_| NumericRank::Integer),
    }
}

fn to_rank(v: &XdmAtomicValue, rank: NumericRank) -> XdmAtomicValue {
    match rank {
        NumericRank::Integer => XdmAtomicValue::Integer(v.as_integer().unwrap_or_default()),
        NumericRank::Decimal => XdmAtomicValue::Decimal(v.as_decimal().unwrap_or_default()),
        NumericRank::Float => XdmAtomicValue::Float(v.as_f64().unwrap_or(f64::NAN) as f32),
        NumericRank::Double => XdmAtomicValue::Double(v.as_f64().unwrap_or(f64::NAN)),
    }
}

fn type_error(a: &XdmAtomicValue, b: &XdmAtomicValue) -> Error {
    Error::from_code(
        ErrorCode::XPTY0004,
        format!("cannot compare {} with {}", a.type_name(), b.type_name()),
    )
}

/// Brings two atomic values to a common type.
///
/// String-like values and anyURI meet at `xs:string`; numerics meet at the wider of the two
/// (integer < decimal < float < double); other values must share a primitive type. The result is
/// symmetric: `promote(b, a)` yields the swapped pair.
pub fn promote(
    a: &XdmAtomicValue,
    b: &XdmAtomicValue,
) -> Result<(XdmAtomicValue, XdmAtomicValue), Error> {
    if let (Some(ra), Some(rb)) = (numeric_rank(a), numeric_rank(b)) {
        let rank = ra.max(rb);
        return Ok((to_rank(a, rank), to_rank(b, rank)));
    }
    if let (Some(sa), Some(sb)) = (a.as_str(), b.as_str()) {
        return Ok((XdmAtomicValue::String(sa.to_string()), XdmAtomicValue::String(sb.to_string())));
    }
    if a.type_name().primitive() == b.type_name().primitive() {
        return Ok((a.clone(), b.clone()));
    }
    Err(type_error(a, b))
}

pub(crate) fn instant(value: NaiveDateTime, tz: Option<FixedOffset>, implicit: FixedOffset) -> NaiveDateTime {
    let offset = tz.unwrap_or(implicit).local_minus_utc();
    value - TimeDelta::seconds(i64::from(offset))
}

pub(crate) fn time_reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1972, 12, 31).unwrap_or_default()
}

/// Ordering of two values already of a common type; `None` when unordered (NaN).
fn order_promoted(
    a: &XdmAtomicValue,
    b: &XdmAtomicValue,
    op: ValueOp,
    implicit_tz: FixedOffset,
) -> Result<Option<Ordering>, Error> {
    use XdmAtomicValue as V;
    let ord = match (a, b) {
        (V::Integer(x), V::Integer(y)) => Some(x.cmp(y)),
        (V::Decimal(x), V::Decimal(y)) => Some(x.cmp(y)),
        (V::Float(x), V::Float(y)) => x.partial_cmp(y),
        (V::Double(x), V::Double(y)) => x.partial_cmp(y),
        (V::String(x), V::String(y)) => Some(x.cmp(y)),
        (V::Boolean(x), V::Boolean(y)) => Some(x.cmp(y)),
        (V::QName { ns_uri: na, local: la, .. }, V::QName { ns_uri: nb, local: lb, .. }) => {
            if !op.is_equality() {
                return Err(Error::from_code(
                    ErrorCode::XPTY0004,
                    format!("xs:QName values do not support {}", op.symbol()),
                ));
            }
            Some(if na == nb && la == lb { Ordering::Equal } else { Ordering::Less })
        }
        (V::DateTime { value: x, tz: tx }, V::DateTime { value: y, tz: ty }) => {
            Some(instant(*x, *tx, implicit_tz).cmp(&instant(*y, *ty, implicit_tz)))
        }
        (V::Date { date: x, tz: tx }, V::Date { date: y, tz: ty }) => Some(
            instant(x.and_time(NaiveTime::MIN), *tx, implicit_tz)
                .cmp(&instant(y.and_time(NaiveTime::MIN), *ty, implicit_tz)),
        ),
        (V::Time { time: x, tz: tx }, V::Time { time: y, tz: ty }) => {
            let day = time_reference_date();
            Some(instant(day.and_time(*x), *tx, implicit_tz).cmp(&instant(day.and_time(*y), *ty, implicit_tz)))
        }
        (V::YearMonthDuration(x), V::YearMonthDuration(y)) => Some(x.cmp(y)),
        (V::DayTimeDuration(x), V::DayTimeDuration(y)) => Some(x.cmp(y)),
        (V::YearMonthDuration(m), V::DayTimeDuration(ms))
        | (V::DayTimeDuration(ms), V::YearMonthDuration(m)) => {
            if !op.is_equality() {
                return Err(type_error(a, b));
            }
            Some(if *m == 0 && *ms == 0 { Ordering::Equal } else { Ordering::Less })
        }
        (V::AnyUri(x), V::AnyUri(y)) => Some(x.cmp(y)),
        _ => return Err(type_error(a, b)),
    };
    Ok(ord)
}

/// Value comparison of two atomic values. `xs:untypedAtomic` is compared as `xs:string`.
pub fn compare_atomic(
    a: &XdmAtomicValue,
    b: &XdmAtomicValue,
    op: ValueOp,
    implicit_tz: FixedOffset,
) -> Result<bool, Error> {
    let (pa, pb) = promote(&untyped_as_string(a), &untyped_as_string(b))?;
    Ok(op.holds(order_promoted(&pa, &pb, op, implicit_tz)?))
}

fn untyped_as_string(v: &XdmAtomicValue) -> XdmAtomicValue {
    match v {
        XdmAtomicValue::UntypedAtomic(s) => XdmAtomicValue::String(s.clone()),
        other => other.clone(),
    }
}

/// Value comparison over atomized operands: empty on either side yields `None`.
pub fn value_compare(
    left: &[XdmAtomicValue],
    right: &[XdmAtomicValue],
    op: ValueOp,
    implicit_tz: FixedOffset,
) -> Result<Option<bool>, Error> {
    match (left, right) {
        ([], _) | (_, []) => Ok(None),
        ([a], [b]) => compare_atomic(a, b, op, implicit_tz).map(Some),
        _ => Err(Error::from_code(
            ErrorCode::XPTY0004,
            format!("value comparison `{}` requires single items", op.symbol()),
        )),
    }
}

/// Converts the untyped side of a general comparison pair against its counterpart.
fn general_pair(
    a: &XdmAtomicValue,
    b: &XdmAtomicValue,
) -> Result<(XdmAtomicValue, XdmAtomicValue), Error> {
    let convert = |untyped: &str, other: &XdmAtomicValue| -> Result<XdmAtomicValue, Error> {
        if other.is_numeric() {
            parse_double(untyped.trim()).map(XdmAtomicValue::Double).ok_or_else(|| {
                Error::from_code(
                    ErrorCode::FORG0001,
                    format!("cannot compare '{untyped}' with a number"),
                )
            })
        } else if other.is_untyped() || other.type_name().is_string_like() {
            Ok(XdmAtomicValue::String(untyped.to_string()))
        } else {
            cast_atomic(&XdmAtomicValue::UntypedAtomic(untyped.to_string()), other.type_name())
        }
    };
    Ok(match (a, b) {
        (XdmAtomicValue::UntypedAtomic(x), other) => (convert(x, other)?, untyped_as_string(other)),
        (other, XdmAtomicValue::UntypedAtomic(y)) => (other.clone(), convert(y, other)?),
        _ => (a.clone(), b.clone()),
    })
}

/// General comparison: true if any pair of atomized items satisfies `op`.
pub fn general_compare(
    left: &[XdmAtomicValue],
    right: &[XdmAtomicValue],
    op: ValueOp,
    implicit_tz: FixedOffset,
) -> Result<bool, Error> {
    for a in left {
        for b in right {
            let (x, y) = general_pair(a, b)?;
            if compare_atomic(&x, &y, op, implicit_tz)? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Equality used by `distinct-values` and `index-of`: NaN equals NaN, incomparable values differ.
pub fn atomic_equal(a: &XdmAtomicValue, b: &XdmAtomicValue, implicit_tz: FixedOffset) -> bool {
    let nan = |v: &XdmAtomicValue| matches!(v, XdmAtomicValue::Double(d) if d.is_nan())
        || matches!(v, XdmAtomicValue::Float(f) if f.is_nan());
    if nan(a) && nan(b) {
        return true;
    }
    compare_atomic(a, b, ValueOp::Eq, implicit_tz).unwrap_or(false)
}

/// Three-way order used by `min`/`max`; errors for incomparable types.
pub fn atomic_order(
    a: &XdmAtomicValue,
    b: &XdmAtomicValue,
    implicit_tz: FixedOffset,
) -> Result<Option<Ordering>, Error> {
    let (pa, pb) = promote(&untyped_as_string(a), &untyped_as_string(b))?;
    order_promoted(&pa, &pb, ValueOp::Lt, implicit_tz)
}

/// Only the Unicode codepoint collation is available.
pub fn require_codepoint_collation(uri: Option<&str>) -> Result<(), Error> {
    match uri {
        None | Some(CODEPOINT_COLLATION) => Ok(()),
        Some(other) => Err(Error::not_implemented(&format!("collation {other}"))),
    }
}

/// Casts both values to `target` before comparing; used to check the promotion ladder.
pub fn compare_after_cast(
    a: &XdmAtomicValue,
    b: &XdmAtomicValue,
    target: AtomicType,
    op: ValueOp,
    implicit_tz: FixedOffset,
) -> Result<bool, Error> {
    compare_atomic(&cast_atomic(a, target)?, &cast_atomic(b, target)?, op, implicit_tz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Offset;
    use rstest::rstest;

    fn utc() -> FixedOffset {
        chrono::Utc.fix()
    }

    #[rstest]
    fn untyped_versus_number_compares_numerically() {
        let left = [XdmAtomicValue::UntypedAtomic("10".into())];
        let right = [XdmAtomicValue::Integer(9)];
        assert!(general_compare(&left, &right, ValueOp::Gt, utc()).unwrap());
        // value comparison treats untyped as string
        assert!(compare_atomic(&left[0], &right[0], ValueOp::Gt, utc()).is_err());
    }

    #[rstest]
    fn general_compare_is_existential() {
        let left = [XdmAtomicValue::Integer(1), XdmAtomicValue::Integer(2)];
        let right = [XdmAtomicValue::Integer(2), XdmAtomicValue::Integer(3)];
        assert!(general_compare(&left, &right, ValueOp::Eq, utc()).unwrap());
        assert!(general_compare(&left, &right, ValueOp::Ne, utc()).unwrap());
        assert!(!general_compare(&left, &[], ValueOp::Eq, utc()).unwrap());
    }

    #[rstest]
    fn value_compare_shapes() {
        let one = [XdmAtomicValue::Integer(1)];
        let two = [XdmAtomicValue::Integer(1), XdmAtomicValue::Integer(2)];
        assert_eq!(value_compare(&[], &one, ValueOp::Eq, utc()).unwrap(), None);
        assert_eq!(value_compare(&one, &one, ValueOp::Eq, utc()).unwrap(), Some(true));
        assert_eq!(value_compare(&two, &one, ValueOp::Eq, utc()).unwrap_err().code_enum(), ErrorCode::XPTY0004);
    }

    #[rstest]
    fn nan_is_unordered() {
        let nan = XdmAtomicValue::Double(f64::NAN);
        assert!(!compare_atomic(&nan, &nan, ValueOp::Eq, utc()).unwrap());
        assert!(compare_atomic(&nan, &nan, ValueOp::Ne, utc()).unwrap());
        assert!(atomic_equal(&nan, &nan, utc()));
    }

    #[rstest]
    fn qnames_only_support_equality() {
        let q = XdmAtomicValue::QName { ns_uri: None, prefix: None, local: "a".into() };
        assert!(compare_atomic(&q, &q, ValueOp::Eq, utc()).unwrap());
        assert!(compare_atomic(&q, &q, ValueOp::Lt, utc()).is_err());
    }

    #[rstest]
    fn date_times_compare_as_instants() {
        let a = crate::xdm::cast::parse_lexical("2024-01-01T12:00:00+02:00", AtomicType::DateTime).unwrap();
        let b = crate::xdm::cast::parse_lexical("2024-01-01T10:00:00Z", AtomicType::DateTime).unwrap();
        assert!(compare_atomic(&a, &b, ValueOp::Eq, utc()).unwrap());
    }

    #[rstest]
    fn booleans_order_false_first() {
        let f = XdmAtomicValue::Boolean(false);
        let t = XdmAtomicValue::Boolean(true);
        assert!(compare_atomic(&f, &t, ValueOp::Lt, utc()).unwrap());
    }

    #[rstest]
    fn non_codepoint_collation_is_not_implemented() {
        assert!(require_codepoint_collation(Some(CODEPOINT_COLLATION)).is_ok());
        let err = require_codepoint_collation(Some("http://example.com/c")).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::NYI0000);
    }
}
