use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use core::fmt;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::engine::runtime::{Error, ErrorCode};

/// Closed set of atomic type names known to the engine.
///
/// Subsumption is a static parent table (see [`AtomicType::parent`]); `xs:anyAtomicType` is the
/// root, and `item()` sits above it in [`crate::xdm::types::ItemType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AtomicType {
    AnyAtomicType,
    UntypedAtomic,
    String,
    NormalizedString,
    Token,
    Language,
    Name,
    NCName,
    Boolean,
    Decimal,
    Integer,
    NonPositiveInteger,
    NegativeInteger,
    Long,
    Int,
    Short,
    Byte,
    NonNegativeInteger,
    PositiveInteger,
    Float,
    Double,
    AnyUri,
    QName,
    DateTime,
    Date,
    Time,
    Duration,
    YearMonthDuration,
    DayTimeDuration,
}

impl AtomicType {
    pub const ALL: &'static [AtomicType] = &[
        AtomicType::AnyAtomicType,
        AtomicType::UntypedAtomic,
        AtomicType::String,
        AtomicType::NormalizedString,
        AtomicType::Token,
        AtomicType::Language,
        AtomicType::Name,
        AtomicType::NCName,
        AtomicType::Boolean,
        AtomicType::Decimal,
        AtomicType::Integer,
        AtomicType::NonPositiveInteger,
        AtomicType::NegativeInteger,
        AtomicType::Long,
        AtomicType::Int,
        AtomicType::Short,
        AtomicType::Byte,
        AtomicType::NonNegativeInteger,
        AtomicType::PositiveInteger,
        AtomicType::Float,
        AtomicType::Double,
        AtomicType::AnyUri,
        AtomicType::QName,
        AtomicType::DateTime,
        AtomicType::Date,
        AtomicType::Time,
        AtomicType::Duration,
        AtomicType::YearMonthDuration,
        AtomicType::DayTimeDuration,
    ];

    pub fn local_name(self) -> &'static str {
        match self {
            AtomicType::AnyAtomicType => "anyAtomicType",
            AtomicType::UntypedAtomic => "untypedAtomic",
            AtomicType::String => "string",
            AtomicType::NormalizedString => "normalizedString",
            AtomicType::Token => "token",
            AtomicType::Language => "language",
            AtomicType::Name => "Name",
            AtomicType::NCName => "NCName",
            AtomicType::Boolean => "boolean",
            AtomicType::Decimal => "decimal",
            AtomicType::Integer => "integer",
            AtomicType::NonPositiveInteger => "nonPositiveInteger",
            AtomicType::NegativeInteger => "negativeInteger",
            AtomicType::Long => "long",
            AtomicType::Int => "int",
            AtomicType::Short => "short",
            AtomicType::Byte => "byte",
            AtomicType::NonNegativeInteger => "nonNegativeInteger",
            AtomicType::PositiveInteger => "positiveInteger",
            AtomicType::Float => "float",
            AtomicType::Double => "double",
            AtomicType::AnyUri => "anyURI",
            AtomicType::QName => "QName",
            AtomicType::DateTime => "dateTime",
            AtomicType::Date => "date",
            AtomicType::Time => "time",
            AtomicType::Duration => "duration",
            AtomicType::YearMonthDuration => "yearMonthDuration",
            AtomicType::DayTimeDuration => "dayTimeDuration",
        }
    }

    pub fn from_local_name(local: &str) -> Option<Self> {
        AtomicType::ALL.iter().copied().find(|t| t.local_name() == local)
    }

    /// Direct supertype in the subsumption lattice; `None` only for `xs:anyAtomicType`.
    pub fn parent(self) -> Option<AtomicType> {
        use AtomicType as T;
        let parent = match self {
            T::AnyAtomicType => return None,
            T::UntypedAtomic
            | T::String
            | T::Boolean
            | T::Decimal
            | T::Float
            | T::Double
            | T::AnyUri
            | T::QName
            | T::DateTime
            | T::Date
            | T::Time
            | T::Duration => T::AnyAtomicType,
            T::NormalizedString => T::String,
            T::Token => T::NormalizedString,
            T::Language | T::Name => T::Token,
            T::NCName => T::Name,
            T::Integer => T::Decimal,
            T::NonPositiveInteger | T::Long | T::NonNegativeInteger => T::Integer,
            T::NegativeInteger => T::NonPositiveInteger,
            T::Int => T::Long,
            T::Short => T::Int,
            T::Byte => T::Short,
            T::PositiveInteger => T::NonNegativeInteger,
            T::YearMonthDuration | T::DayTimeDuration => T::Duration,
        };
        Some(parent)
    }

    pub fn is_subtype_of(self, other: AtomicType) -> bool {
        let mut current = Some(self);
        while let Some(t) = current {
            if t == other {
                return true;
            }
            current = t.parent();
        }
        false
    }

    /// The primitive ancestor (the type directly below `xs:anyAtomicType`).
    pub fn primitive(self) -> AtomicType {
        let mut t = self;
        while let Some(p) = t.parent() {
            if p == AtomicType::AnyAtomicType {
                return t;
            }
            t = p;
        }
        t
    }

    /// Member of the `xs:numeric` union (decimal, float, double and their subtypes).
    pub fn is_numeric(self) -> bool {
        matches!(self.primitive(), AtomicType::Decimal | AtomicType::Float | AtomicType::Double)
    }

    pub fn is_integer(self) -> bool {
        self.is_subtype_of(AtomicType::Integer)
    }

    pub fn is_string_like(self) -> bool {
        self.is_subtype_of(AtomicType::String)
    }
}

impl fmt::Display for AtomicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xs:{}", self.local_name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum XdmAtomicValue {
    Boolean(bool),
    String(String),
    NormalizedString(String),
    Token(String),
    Language(String),
    Name(String),
    NCName(String),
    UntypedAtomic(String),
    AnyUri(String),
    Decimal(Decimal),
    Integer(i64),
    NonPositiveInteger(i64),
    NegativeInteger(i64),
    Long(i64),
    Int(i64),
    Short(i64),
    Byte(i64),
    NonNegativeInteger(i64),
    PositiveInteger(i64),
    Float(f32),
    Double(f64),
    QName { ns_uri: Option<String>, prefix: Option<String>, local: String },
    DateTime { value: NaiveDateTime, tz: Option<FixedOffset> },
    Date { date: NaiveDate, tz: Option<FixedOffset> },
    Time { time: NaiveTime, tz: Option<FixedOffset> },
    /// Total months.
    YearMonthDuration(i64),
    /// Total milliseconds.
    DayTimeDuration(i64),
}

impl XdmAtomicValue {
    pub fn type_name(&self) -> AtomicType {
        use XdmAtomicValue as V;
        match self {
            V::Boolean(_) => AtomicType::Boolean,
            V::String(_) => AtomicType::String,
            V::NormalizedString(_) => AtomicType::NormalizedString,
            V::Token(_) => AtomicType::Token,
            V::Language(_) => AtomicType::Language,
            V::Name(_) => AtomicType::Name,
            V::NCName(_) => AtomicType::NCName,
            V::UntypedAtomic(_) => AtomicType::UntypedAtomic,
            V::AnyUri(_) => AtomicType::AnyUri,
            V::Decimal(_) => AtomicType::Decimal,
            V::Integer(_) => AtomicType::Integer,
            V::NonPositiveInteger(_) => AtomicType::NonPositiveInteger,
            V::NegativeInteger(_) => AtomicType::NegativeInteger,
            V::Long(_) => AtomicType::Long,
            V::Int(_) => AtomicType::Int,
            V::Short(_) => AtomicType::Short,
            V::Byte(_) => AtomicType::Byte,
            V::NonNegativeInteger(_) => AtomicType::NonNegativeInteger,
            V::PositiveInteger(_) => AtomicType::PositiveInteger,
            V::Float(_) => AtomicType::Float,
            V::Double(_) => AtomicType::Double,
            V::QName { .. } => AtomicType::QName,
            V::DateTime { .. } => AtomicType::DateTime,
            V::Date { .. } => AtomicType::Date,
            V::Time { .. } => AtomicType::Time,
            V::YearMonthDuration(_) => AtomicType::YearMonthDuration,
            V::DayTimeDuration(_) => AtomicType::DayTimeDuration,
        }
    }

    pub fn instance_of(&self, t: AtomicType) -> bool {
        self.type_name().is_subtype_of(t)
    }

    pub fn is_numeric(&self) -> bool {
        self.type_name().is_numeric()
    }

    pub fn is_untyped(&self) -> bool {
        matches!(self, XdmAtomicValue::UntypedAtomic(_))
    }

    /// Integer payload for any `xs:integer`-derived value.
    pub fn as_integer(&self) -> Option<i64> {
        use XdmAtomicValue as V;
        match self {
            V::Integer(i)
            | V::NonPositiveInteger(i)
            | V::NegativeInteger(i)
            | V::Long(i)
            | V::Int(i)
            | V::Short(i)
            | V::Byte(i)
            | V::NonNegativeInteger(i)
            | V::PositiveInteger(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            XdmAtomicValue::Decimal(d) => Some(*d),
            other => other.as_integer().map(Decimal::from),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            XdmAtomicValue::Double(d) => Some(*d),
            XdmAtomicValue::Float(f) => Some(f64::from(*f)),
            XdmAtomicValue::Decimal(d) => d.to_f64(),
            other => other.as_integer().map(|i| i as f64),
        }
    }

    /// String payload of the string-like family, untypedAtomic and anyURI.
    pub fn as_str(&self) -> Option<&str> {
        use XdmAtomicValue as V;
        match self {
            V::String(s)
            | V::NormalizedString(s)
            | V::Token(s)
            | V::Language(s)
            | V::Name(s)
            | V::NCName(s)
            | V::UntypedAtomic(s)
            | V::AnyUri(s) => Some(s),
            _ => None,
        }
    }

    /// Canonical lexical form (the result of `fn:string`).
    pub fn string_value(&self) -> String {
        use XdmAtomicValue as V;
        match self {
            V::Boolean(b) => b.to_string(),
            V::Decimal(d) => format_decimal(*d),
            V::Float(f) => format_float(*f),
            V::Double(d) => format_double(*d),
            V::QName { prefix, local, .. } => match prefix {
                Some(p) if !p.is_empty() => format!("{p}:{local}"),
                _ => local.clone(),
            },
            V::DateTime { value, tz } => {
                format!("{}{}", format_time_fraction(value.format("%Y-%m-%dT%H:%M:%S%.f")), format_tz(*tz))
            }
            V::Date { date, tz } => format!("{}{}", date.format("%Y-%m-%d"), format_tz(*tz)),
            V::Time { time, tz } => {
                format!("{}{}", format_time_fraction(time.format("%H:%M:%S%.f")), format_tz(*tz))
            }
            V::YearMonthDuration(months) => format_year_month_duration(*months),
            V::DayTimeDuration(millis) => format_day_time_duration(*millis),
            other => match other.as_integer() {
                Some(i) => i.to_string(),
                None => other.as_str().unwrap_or_default().to_string(),
            },
        }
    }

    /// Effective boolean value of a single atomic item.
    pub fn ebv(&self) -> Result<bool, Error> {
        use XdmAtomicValue as V;
        match self {
            V::Boolean(b) => Ok(*b),
            V::Double(d) => Ok(*d != 0.0 && !d.is_nan()),
            V::Float(f) => Ok(*f != 0.0 && !f.is_nan()),
            V::Decimal(d) => Ok(!d.is_zero()),
            other => {
                if let Some(i) = other.as_integer() {
                    return Ok(i != 0);
                }
                if let Some(s) = other.as_str() {
                    return Ok(!s.is_empty());
                }
                Err(Error::from_code(
                    ErrorCode::FORG0006,
                    format!("effective boolean value is not defined for {}", other.type_name()),
                ))
            }
        }
    }
}

impl fmt::Display for XdmAtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.string_value())
    }
}

impl From<bool> for XdmAtomicValue {
    fn from(b: bool) -> Self {
        XdmAtomicValue::Boolean(b)
    }
}

impl From<i64> for XdmAtomicValue {
    fn from(i: i64) -> Self {
        XdmAtomicValue::Integer(i)
    }
}

impl From<f64> for XdmAtomicValue {
    fn from(d: f64) -> Self {
        XdmAtomicValue::Double(d)
    }
}

impl From<&str> for XdmAtomicValue {
    fn from(s: &str) -> Self {
        XdmAtomicValue::String(s.to_string())
    }
}

impl From<String> for XdmAtomicValue {
    fn from(s: String) -> Self {
        XdmAtomicValue::String(s)
    }
}

impl From<Decimal> for XdmAtomicValue {
    fn from(d: Decimal) -> Self {
        XdmAtomicValue::Decimal(d)
    }
}

pub(crate) fn format_decimal(d: Decimal) -> String {
    let n = d.normalize();
    if n.is_zero() { "0".to_string() } else { n.to_string() }
}

/// XPath canonical double: plain notation in `[1e-6, 1e6)`, scientific with a mantissa dot outside.
pub(crate) fn format_double(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "INF" } else { "-INF" }.to_string();
    }
    if v == 0.0 {
        return if v.is_sign_negative() { "-0" } else { "0" }.to_string();
    }
    let abs = v.abs();
    if (1e-6..1e6).contains(&abs) {
        return format!("{v}");
    }
    scientific(&format!("{v:E}"))
}

pub(crate) fn format_float(v: f32) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "INF" } else { "-INF" }.to_string();
    }
    if v == 0.0 {
        return if v.is_sign_negative() { "-0" } else { "0" }.to_string();
    }
    let abs = v.abs();
    if (1e-6..1e6).contains(&abs) {
        return format!("{v}");
    }
    scientific(&format!("{v:E}"))
}

fn scientific(raw: &str) -> String {
    match raw.split_once('E') {
        Some((mantissa, exp)) if !mantissa.contains('.') => format!("{mantissa}.0E{exp}"),
        _ => raw.to_string(),
    }
}

fn format_time_fraction(formatted: impl fmt::Display) -> String {
    let text = formatted.to_string();
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}

fn format_tz(tz: Option<FixedOffset>) -> String {
    match tz {
        None => String::new(),
        Some(off) if off.local_minus_utc() == 0 => "Z".to_string(),
        Some(off) => {
            let secs = off.local_minus_utc();
            let sign = if secs < 0 { '-' } else { '+' };
            let abs = secs.abs();
            format!("{sign}{:02}:{:02}", abs / 3600, (abs % 3600) / 60)
        }
    }
}

fn format_year_month_duration(months: i64) -> String {
    if months == 0 {
        return "P0M".to_string();
    }
    let sign = if months < 0 { "-" } else { "" };
    let abs = months.unsigned_abs();
    let (y, m) = (abs / 12, abs % 12);
    let mut out = format!("{sign}P");
    if y > 0 {
        out.push_str(&format!("{y}Y"));
    }
    if m > 0 {
        out.push_str(&format!("{m}M"));
    }
    out
}

fn format_day_time_duration(millis: i64) -> String {
    if millis == 0 {
        return "PT0S".to_string();
    }
    let sign = if millis < 0 { "-" } else { "" };
    let abs = millis.unsigned_abs();
    let total_secs = abs / 1000;
    let frac = abs % 1000;
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let mut out = format!("{sign}P");
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours > 0 || minutes > 0 || seconds > 0 || frac > 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if seconds > 0 || frac > 0 {
            if frac > 0 {
                let frac_str = format!("{frac:03}");
                out.push_str(&format!("{seconds}.{}S", frac_str.trim_end_matches('0')));
            } else {
                out.push_str(&format!("{seconds}S"));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(AtomicType::Byte, AtomicType::Decimal, true)]
    #[case(AtomicType::Integer, AtomicType::AnyAtomicType, true)]
    #[case(AtomicType::Decimal, AtomicType::Integer, false)]
    #[case(AtomicType::NCName, AtomicType::String, true)]
    #[case(AtomicType::DayTimeDuration, AtomicType::Duration, true)]
    #[case(AtomicType::UntypedAtomic, AtomicType::String, false)]
    fn subsumption_table(#[case] sub: AtomicType, #[case] sup: AtomicType, #[case] expected: bool) {
        assert_eq!(sub.is_subtype_of(sup), expected);
    }

    #[rstest]
    fn primitive_of_derived_types() {
        assert_eq!(AtomicType::PositiveInteger.primitive(), AtomicType::Decimal);
        assert_eq!(AtomicType::Language.primitive(), AtomicType::String);
        assert!(AtomicType::Short.is_numeric());
        assert!(!AtomicType::AnyUri.is_numeric());
    }

    #[rstest]
    #[case(1.0, "1")]
    #[case(0.5, "0.5")]
    #[case(1e7, "1.0E7")]
    #[case(1.5e-7, "1.5E-7")]
    #[case(f64::NEG_INFINITY, "-INF")]
    #[case(f64::NAN, "NaN")]
    fn canonical_double(#[case] value: f64, #[case] expected: &str) {
        assert_eq!(format_double(value), expected);
    }

    #[rstest]
    fn canonical_durations() {
        assert_eq!(XdmAtomicValue::YearMonthDuration(14).string_value(), "P1Y2M");
        assert_eq!(XdmAtomicValue::DayTimeDuration(90_061_500).string_value(), "P1DT1H1M1.5S");
        assert_eq!(XdmAtomicValue::DayTimeDuration(0).string_value(), "PT0S");
    }

    #[rstest]
    fn ebv_of_atomics() {
        assert!(!XdmAtomicValue::Double(f64::NAN).ebv().unwrap());
        assert!(XdmAtomicValue::String("x".into()).ebv().unwrap());
        assert!(!XdmAtomicValue::Integer(0).ebv().unwrap());
        let err = XdmAtomicValue::YearMonthDuration(1).ebv().unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::FORG0006);
    }
}
