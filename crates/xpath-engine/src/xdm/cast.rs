//! Casting between atomic types and lexical parsing of atomic values.

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::str::FromStr;

use crate::engine::runtime::{Error, ErrorCode};
use crate::xdm::atomic::{AtomicType, XdmAtomicValue};

fn invalid(target: AtomicType, text: &str) -> Error {
    Error::from_code(ErrorCode::FORG0001, format!("invalid lexical form for {target}: '{text}'"))
}

fn not_castable(from: AtomicType, to: AtomicType) -> Error {
    Error::from_code(ErrorCode::XPTY0004, format!("cannot cast {from} to {to}"))
}

/// Casts `value` to `target` following the XPath casting table.
pub fn cast_atomic(value: &XdmAtomicValue, target: AtomicType) -> Result<XdmAtomicValue, Error> {
    let source = value.type_name();
    if source == target {
        return Ok(value.clone());
    }
    if target == AtomicType::AnyAtomicType {
        return Ok(value.clone());
    }
    // String-like sources go through the lexical space of the target.
    if let Some(text) = value.as_str()
        && source != AtomicType::AnyUri
    {
        return parse_lexical(text, target);
    }
    use AtomicType as T;
    match target {
        T::UntypedAtomic => Ok(XdmAtomicValue::UntypedAtomic(value.string_value())),
        T::String => Ok(XdmAtomicValue::String(value.string_value())),
        t if t.is_string_like() => parse_lexical(&value.string_value(), t),
        T::AnyUri => match value {
            XdmAtomicValue::AnyUri(s) => Ok(XdmAtomicValue::AnyUri(s.clone())),
            _ => Err(not_castable(source, target)),
        },
        T::Boolean => match value {
            XdmAtomicValue::Double(d) => Ok(XdmAtomicValue::Boolean(*d != 0.0 && !d.is_nan())),
            XdmAtomicValue::Float(f) => Ok(XdmAtomicValue::Boolean(*f != 0.0 && !f.is_nan())),
            other => match other.as_decimal() {
                Some(d) => Ok(XdmAtomicValue::Boolean(!d.is_zero())),
                None => Err(not_castable(source, target)),
            },
        },
        T::Double => numeric_as_f64(value, source, target).map(XdmAtomicValue::Double),
        T::Float => numeric_as_f64(value, source, target).map(|d| XdmAtomicValue::Float(d as f32)),
        T::Decimal => decimal_from(value, source, target).map(XdmAtomicValue::Decimal),
        t if t.is_integer() => {
            let d = decimal_from(value, source, target)?;
            let i = d.trunc().to_i64().ok_or_else(|| {
                Error::from_code(ErrorCode::FOCA0003, format!("value {d} is out of range for {t}"))
            })?;
            integer_of(t, i)
        }
        T::DateTime => match value {
            XdmAtomicValue::Date { date, tz } => Ok(XdmAtomicValue::DateTime {
                value: date.and_time(NaiveTime::MIN),
                tz: *tz,
            }),
            _ => Err(not_castable(source, target)),
        },
        T::Date => match value {
            XdmAtomicValue::DateTime { value, tz } => {
                Ok(XdmAtomicValue::Date { date: value.date(), tz: *tz })
            }
            _ => Err(not_castable(source, target)),
        },
        T::Time => match value {
            XdmAtomicValue::DateTime { value, tz } => {
                Ok(XdmAtomicValue::Time { time: value.time(), tz: *tz })
            }
            _ => Err(not_castable(source, target)),
        },
        T::YearMonthDuration => match value {
            XdmAtomicValue::DayTimeDuration(_) => Ok(XdmAtomicValue::YearMonthDuration(0)),
            _ => Err(not_castable(source, target)),
        },
        T::DayTimeDuration => match value {
            XdmAtomicValue::YearMonthDuration(_) => Ok(XdmAtomicValue::DayTimeDuration(0)),
            _ => Err(not_castable(source, target)),
        },
        T::Duration => match value {
            XdmAtomicValue::YearMonthDuration(_) | XdmAtomicValue::DayTimeDuration(_) => {
                Ok(value.clone())
            }
            _ => Err(not_castable(source, target)),
        },
        _ => Err(not_castable(source, target)),
    }
}

/// True when `cast_atomic` would succeed.
pub fn castable(value: &XdmAtomicValue, target: AtomicType) -> bool {
    cast_atomic(value, target).is_ok()
}

fn numeric_as_f64(value: &XdmAtomicValue, from: AtomicType, to: AtomicType) -> Result<f64, Error> {
    match value {
        XdmAtomicValue::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        other => other.as_f64().ok_or_else(|| not_castable(from, to)),
    }
}

fn decimal_from(value: &XdmAtomicValue, from: AtomicType, to: AtomicType) -> Result<Decimal, Error> {
    match value {
        XdmAtomicValue::Boolean(b) => Ok(Decimal::from(u8::from(*b))),
        XdmAtomicValue::Double(_) | XdmAtomicValue::Float(_) => {
            let f = value.as_f64().unwrap_or(f64::NAN);
            if !f.is_finite() {
                return Err(Error::from_code(
                    ErrorCode::FOCA0002,
                    format!("cannot convert {} to {to}", value.string_value()),
                ));
            }
            Decimal::from_f64(f).ok_or_else(|| {
                Error::from_code(ErrorCode::FOCA0001, format!("{f} is out of range for {to}"))
            })
        }
        other => other.as_decimal().ok_or_else(|| not_castable(from, to)),
    }
}

/// Builds a value of an integer-derived type, checking the type's value space.
pub fn integer_of(target: AtomicType, i: i64) -> Result<XdmAtomicValue, Error> {
    use AtomicType as T;
    let (ok, value) = match target {
        T::Integer => (true, XdmAtomicValue::Integer(i)),
        T::Long => (true, XdmAtomicValue::Long(i)),
        T::Int => (i32::try_from(i).is_ok(), XdmAtomicValue::Int(i)),
        T::Short => (i16::try_from(i).is_ok(), XdmAtomicValue::Short(i)),
        T::Byte => (i8::try_from(i).is_ok(), XdmAtomicValue::Byte(i)),
        T::NonPositiveInteger => (i <= 0, XdmAtomicValue::NonPositiveInteger(i)),
        T::NegativeInteger => (i < 0, XdmAtomicValue::NegativeInteger(i)),
        T::NonNegativeInteger => (i >= 0, XdmAtomicValue::NonNegativeInteger(i)),
        T::PositiveInteger => (i > 0, XdmAtomicValue::PositiveInteger(i)),
        other => {
            return Err(Error::from_code(
                ErrorCode::XPTY0004,
                format!("{other} is not an integer type"),
            ));
        }
    };
    if ok {
        Ok(value)
    } else {
        Err(Error::from_code(ErrorCode::FORG0001, format!("value {i} is out of range for {target}")))
    }
}

/// Parses `text` in the lexical space of `target`. Leading and trailing whitespace is collapsed
/// for every type except `xs:string` and `xs:untypedAtomic`.
pub fn parse_lexical(text: &str, target: AtomicType) -> Result<XdmAtomicValue, Error> {
    use AtomicType as T;
    let trimmed = text.trim_matches(|c: char| matches!(c, ' ' | '\t' | '\n' | '\r'));
    match target {
        T::String | T::AnyAtomicType => Ok(XdmAtomicValue::String(text.to_string())),
        T::UntypedAtomic => Ok(XdmAtomicValue::UntypedAtomic(text.to_string())),
        T::NormalizedString => Ok(XdmAtomicValue::NormalizedString(
            text.chars().map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c }).collect(),
        )),
        T::Token => Ok(XdmAtomicValue::Token(collapse_whitespace(text))),
        T::Language => {
            let v = collapse_whitespace(text);
            if is_language(&v) { Ok(XdmAtomicValue::Language(v)) } else { Err(invalid(target, text)) }
        }
        T::Name => {
            let v = collapse_whitespace(text);
            if is_name(&v) { Ok(XdmAtomicValue::Name(v)) } else { Err(invalid(target, text)) }
        }
        T::NCName => {
            let v = collapse_whitespace(text);
            if is_ncname(&v) { Ok(XdmAtomicValue::NCName(v)) } else { Err(invalid(target, text)) }
        }
        T::AnyUri => Ok(XdmAtomicValue::AnyUri(trimmed.to_string())),
        T::Boolean => match trimmed {
            "true" | "1" => Ok(XdmAtomicValue::Boolean(true)),
            "false" | "0" => Ok(XdmAtomicValue::Boolean(false)),
            _ => Err(invalid(target, text)),
        },
        T::Double => parse_double(trimmed).map(XdmAtomicValue::Double).ok_or_else(|| invalid(target, text)),
        T::Float => parse_double(trimmed)
            .map(|d| XdmAtomicValue::Float(d as f32))
            .ok_or_else(|| invalid(target, text)),
        T::Decimal => parse_decimal(trimmed).map(XdmAtomicValue::Decimal).ok_or_else(|| invalid(target, text)),
        t if t.is_integer() => {
            let i = parse_integer(trimmed).ok_or_else(|| invalid(target, text))?;
            integer_of(t, i)
        }
        T::QName => parse_qname_literal(trimmed).ok_or_else(|| invalid(target, text)),
        T::DateTime => {
            let (body, tz) = split_timezone(trimmed).ok_or_else(|| invalid(target, text))?;
            let value = parse_date_time_body(body).ok_or_else(|| invalid(target, text))?;
            Ok(XdmAtomicValue::DateTime { value, tz })
        }
        T::Date => {
            let (body, tz) = split_timezone(trimmed).ok_or_else(|| invalid(target, text))?;
            let date = NaiveDate::parse_from_str(body, "%Y-%m-%d").map_err(|_| invalid(target, text))?;
            Ok(XdmAtomicValue::Date { date, tz })
        }
        T::Time => {
            let (body, tz) = split_timezone(trimmed).ok_or_else(|| invalid(target, text))?;
            let time = parse_time_body(body).ok_or_else(|| invalid(target, text))?;
            Ok(XdmAtomicValue::Time { time, tz })
        }
        T::Duration | T::YearMonthDuration | T::DayTimeDuration => {
            let parts = parse_duration(trimmed).ok_or_else(|| invalid(target, text))?;
            match target {
                T::YearMonthDuration if parts.millis == 0 && !parts.has_day_time => {
                    Ok(XdmAtomicValue::YearMonthDuration(parts.months))
                }
                T::DayTimeDuration if parts.months == 0 && !parts.has_year_month => {
                    Ok(XdmAtomicValue::DayTimeDuration(parts.millis))
                }
                T::Duration if !parts.has_day_time => Ok(XdmAtomicValue::YearMonthDuration(parts.months)),
                T::Duration if !parts.has_year_month => Ok(XdmAtomicValue::DayTimeDuration(parts.millis)),
                T::Duration => Err(Error::not_implemented(
                    "xs:duration values mixing year-month and day-time components",
                )),
                _ => Err(invalid(target, text)),
            }
        }
        _ => Err(invalid(target, text)),
    }
}

/// XPath `xs:double` lexical form, including `INF`, `-INF` and `NaN`.
pub fn parse_double(text: &str) -> Option<f64> {
    match text {
        "INF" | "+INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        "" => None,
        s if s.contains(|c: char| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => None,
        s => s.parse::<f64>().ok(),
    }
}

pub fn parse_decimal(text: &str) -> Option<Decimal> {
    if text.is_empty() || text.contains(['e', 'E']) {
        return None;
    }
    let digits = text.trim_start_matches(['+', '-']);
    if !digits.chars().any(|c| c.is_ascii_digit())
        || !digits.chars().all(|c| c.is_ascii_digit() || c == '.')
    {
        return None;
    }
    let normalized = if digits.starts_with('.') {
        format!("{}0{digits}", &text[..text.len() - digits.len()])
    } else {
        text.to_string()
    };
    Decimal::from_str(normalized.trim_end_matches('.')).ok()
}

pub fn parse_integer(text: &str) -> Option<i64> {
    let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse::<i64>().ok()
}

fn parse_qname_literal(text: &str) -> Option<XdmAtomicValue> {
    if let Some(rest) = text.strip_prefix("Q{") {
        let (ns, local) = rest.split_once('}')?;
        if !is_ncname(local) {
            return None;
        }
        let ns_uri = if ns.is_empty() { None } else { Some(ns.to_string()) };
        return Some(XdmAtomicValue::QName { ns_uri, prefix: None, local: local.to_string() });
    }
    match text.split_once(':') {
        None if is_ncname(text) => {
            Some(XdmAtomicValue::QName { ns_uri: None, prefix: None, local: text.to_string() })
        }
        // Prefixed names need namespace bindings; only the reserved xml prefix resolves here.
        Some(("xml", local)) if is_ncname(local) => Some(XdmAtomicValue::QName {
            ns_uri: Some(crate::consts::XML_URI.to_string()),
            prefix: Some("xml".to_string()),
            local: local.to_string(),
        }),
        _ => None,
    }
}

fn split_timezone(text: &str) -> Option<(&str, Option<FixedOffset>)> {
    if let Some(body) = text.strip_suffix('Z') {
        return Some((body, FixedOffset::east_opt(0)));
    }
    if text.len() > 6 {
        let (body, tail) = text.split_at(text.len() - 6);
        let bytes = tail.as_bytes();
        if (bytes[0] == b'+' || bytes[0] == b'-') && bytes[3] == b':' {
            let hours: i32 = tail[1..3].parse().ok()?;
            let minutes: i32 = tail[4..6].parse().ok()?;
            if hours > 14 || minutes > 59 || (hours == 14 && minutes != 0) {
                return None;
            }
            let secs = (hours * 3600 + minutes * 60) * if bytes[0] == b'-' { -1 } else { 1 };
            return Some((body, FixedOffset::east_opt(secs)));
        }
    }
    Some((text, None))
}

fn parse_time_body(body: &str) -> Option<NaiveTime> {
    if body == "24:00:00" {
        return Some(NaiveTime::MIN);
    }
    NaiveTime::parse_from_str(body, "%H:%M:%S%.f").ok()
}

fn parse_date_time_body(body: &str) -> Option<NaiveDateTime> {
    let (date, time) = body.split_once('T')?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    if time == "24:00:00" {
        return date.succ_opt().map(|d| d.and_time(NaiveTime::MIN));
    }
    Some(date.and_time(parse_time_body(time)?))
}

pub(crate) struct DurationParts {
    pub months: i64,
    pub millis: i64,
    pub has_year_month: bool,
    pub has_day_time: bool,
}

/// Parses `-?PnYnMnDTnHnMn(.n)S`.
pub(crate) fn parse_duration(text: &str) -> Option<DurationParts> {
    let (negative, rest) = match text.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, text),
    };
    let rest = rest.strip_prefix('P')?;
    if rest.is_empty() {
        return None;
    }
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) if !t.is_empty() => (d, Some(t)),
        Some(_) => return None,
        None => (rest, None),
    };
    let mut months: i64 = 0;
    let mut millis: i64 = 0;
    let mut has_year_month = false;
    let mut has_day_time = false;
    let mut number = String::new();
    let mut last_rank = 0;
    for c in date_part.chars() {
        if c.is_ascii_digit() {
            number.push(c);
            continue;
        }
        let n: i64 = number.parse().ok()?;
        number.clear();
        let rank = match c {
            'Y' => {
                months = months.checked_add(n.checked_mul(12)?)?;
                has_year_month = true;
                1
            }
            'M' => {
                months = months.checked_add(n)?;
                has_year_month = true;
                2
            }
            'D' => {
                millis = millis.checked_add(n.checked_mul(86_400_000)?)?;
                has_day_time = true;
                3
            }
            _ => return None,
        };
        if rank <= last_rank {
            return None;
        }
        last_rank = rank;
    }
    if !number.is_empty() {
        return None;
    }
    if let Some(time) = time_part {
        let mut last_rank = 0;
        for c in time.chars() {
            if c.is_ascii_digit() || (c == '.' && !number.contains('.')) {
                number.push(c);
                continue;
            }
            let rank = match c {
                'H' => {
                    let n: i64 = number.parse().ok()?;
                    millis = millis.checked_add(n.checked_mul(3_600_000)?)?;
                    1
                }
                'M' => {
                    let n: i64 = number.parse().ok()?;
                    millis = millis.checked_add(n.checked_mul(60_000)?)?;
                    2
                }
                'S' => {
                    let secs = Decimal::from_str(&number).ok()?;
                    let ms = (secs * Decimal::from(1000)).round().to_i64()?;
                    millis = millis.checked_add(ms)?;
                    3
                }
                _ => return None,
            };
            number.clear();
            if rank <= last_rank {
                return None;
            }
            last_rank = rank;
            has_day_time = true;
        }
        if !number.is_empty() {
            return None;
        }
    }
    if negative {
        months = -months;
        millis = -millis;
    }
    Some(DurationParts { months, millis, has_year_month, has_day_time })
}

fn collapse_whitespace(text: &str) -> String {
    text.split([' ', '\t', '\n', '\r']).filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ")
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == ':'
}

fn is_name_char(c: char) -> bool {
    is_name_start(c) || c.is_numeric() || matches!(c, '-' | '.' | '\u{B7}')
}

fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(is_name_start) && chars.all(is_name_char)
}

pub(crate) fn is_ncname(s: &str) -> bool {
    is_name(s) && !s.contains(':')
}

fn is_language(s: &str) -> bool {
    let mut parts = s.split('-');
    let Some(first) = parts.next() else {
        return false;
    };
    (1..=8).contains(&first.len())
        && first.chars().all(|c| c.is_ascii_alphabetic())
        && parts.all(|p| (1..=8).contains(&p.len()) && p.chars().all(|c| c.is_ascii_alphanumeric()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("12", AtomicType::Integer, XdmAtomicValue::Integer(12))]
    #[case(" true ", AtomicType::Boolean, XdmAtomicValue::Boolean(true))]
    #[case("-INF", AtomicType::Double, XdmAtomicValue::Double(f64::NEG_INFINITY))]
    #[case("P1Y2M", AtomicType::YearMonthDuration, XdmAtomicValue::YearMonthDuration(14))]
    #[case("PT1.5S", AtomicType::DayTimeDuration, XdmAtomicValue::DayTimeDuration(1500))]
    #[case("  a  b ", AtomicType::Token, XdmAtomicValue::Token("a b".into()))]
    fn parses_lexical_forms(#[case] text: &str, #[case] target: AtomicType, #[case] expected: XdmAtomicValue) {
        assert_eq!(parse_lexical(text, target).unwrap(), expected);
    }

    #[rstest]
    #[case("1.5", AtomicType::Integer)]
    #[case("maybe", AtomicType::Boolean)]
    #[case("300", AtomicType::Byte)]
    #[case("0", AtomicType::PositiveInteger)]
    #[case("P1Y", AtomicType::DayTimeDuration)]
    #[case("2024-13-01", AtomicType::Date)]
    fn rejects_invalid_forms(#[case] text: &str, #[case] target: AtomicType) {
        let err = parse_lexical(text, target).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::FORG0001);
    }

    #[rstest]
    fn date_time_keeps_timezone() {
        let v = parse_lexical("2024-02-29T10:15:00.250+02:00", AtomicType::DateTime).unwrap();
        assert_eq!(v.string_value(), "2024-02-29T10:15:00.25+02:00");
        let date = cast_atomic(&v, AtomicType::Date).unwrap();
        assert_eq!(date.string_value(), "2024-02-29+02:00");
    }

    #[rstest]
    fn numeric_casts_truncate_and_check_ranges() {
        assert_eq!(
            cast_atomic(&XdmAtomicValue::Double(3.9), AtomicType::Integer).unwrap(),
            XdmAtomicValue::Integer(3)
        );
        let err = cast_atomic(&XdmAtomicValue::Double(f64::NAN), AtomicType::Integer).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::FOCA0002);
        assert!(!castable(&XdmAtomicValue::Boolean(true), AtomicType::Date));
        assert!(castable(&XdmAtomicValue::Integer(7), AtomicType::String));
    }
}
