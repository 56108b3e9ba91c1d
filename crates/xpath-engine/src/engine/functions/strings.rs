use std::collections::{HashMap, hash_map::Entry};

use smallvec::SmallVec;
use unicode_normalization::UnicodeNormalization;

use super::{atomic, bool_result, int_result, opt_string, string_result};
use crate::engine::compare::require_codepoint_collation;
use crate::engine::runtime::{CallCtx, Error, ErrorCode};
use crate::model::XdmNode;
use crate::xdm::{XdmAtomicValue, XdmItem, XdmSequence};

fn collation_arg<N: XdmNode>(args: &[XdmSequence<N>], index: usize) -> Result<(), Error> {
    match args.get(index) {
        Some(arg) => require_codepoint_collation(Some(opt_string(arg)?.as_str())),
        None => Ok(()),
    }
}

/// Both string operands plus an optional collation at position 2.
fn string_pair<N: XdmNode>(args: &[XdmSequence<N>]) -> Result<(String, String), Error> {
    collation_arg(args, 2)?;
    Ok((opt_string(&args[0])?, opt_string(&args[1])?))
}

/// `xs:double` argument already converted by the caller.
fn double_arg<N: XdmNode>(arg: &[XdmItem<N>]) -> f64 {
    arg.first().and_then(XdmItem::as_atomic).and_then(XdmAtomicValue::as_f64).unwrap_or(f64::NAN)
}

/// XPath `fn:round` on doubles: halves go towards positive infinity.
pub(crate) fn round_half_up(v: f64) -> f64 {
    if v.is_finite() { (v + 0.5).floor() } else { v }
}

pub(super) fn concat_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let mut out = String::new();
    for arg in args {
        out.push_str(&opt_string(arg)?);
    }
    Ok(string_result(out))
}

pub(super) fn string_length_fn<N: XdmNode>(ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let s = match args.first() {
        Some(arg) => opt_string(arg)?,
        None => ctx.dyn_ctx.context_item()?.string_value()?,
    };
    Ok(int_result(s.chars().count() as i64))
}

pub(super) fn contains_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let (s, sub) = string_pair(args)?;
    Ok(bool_result(s.contains(sub.as_str())))
}

pub(super) fn starts_with_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let (s, prefix) = string_pair(args)?;
    Ok(bool_result(s.starts_with(prefix.as_str())))
}

pub(super) fn ends_with_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let (s, suffix) = string_pair(args)?;
    Ok(bool_result(s.ends_with(suffix.as_str())))
}

/// Characters at 1-based positions `p` with `start <= p < start + len`, after rounding both.
pub(crate) fn substring_chars(s: &str, start: f64, len: Option<f64>) -> String {
    let from = round_half_up(start);
    let to = match len {
        Some(l) => from + round_half_up(l),
        None => f64::INFINITY,
    };
    s.chars()
        .enumerate()
        .filter(|(i, _)| {
            let p = (*i + 1) as f64;
            p >= from && p < to
        })
        .map(|(_, c)| c)
        .collect()
}

pub(super) fn substring_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let s = opt_string(&args[0])?;
    let start = double_arg(&args[1]);
    let len = args.get(2).map(|a| double_arg(a));
    Ok(string_result(substring_chars(&s, start, len)))
}

pub(super) fn substring_before_fn<N: XdmNode>(
    _ctx: &CallCtx<N>,
    args: &[XdmSequence<N>],
) -> Result<XdmSequence<N>, Error> {
    let (s, sub) = string_pair(args)?;
    let out = match s.find(sub.as_str()) {
        Some(idx) if !sub.is_empty() => &s[..idx],
        _ => "",
    };
    Ok(string_result(out))
}

pub(super) fn substring_after_fn<N: XdmNode>(
    _ctx: &CallCtx<N>,
    args: &[XdmSequence<N>],
) -> Result<XdmSequence<N>, Error> {
    let (s, sub) = string_pair(args)?;
    let out = match s.find(sub.as_str()) {
        Some(idx) => &s[idx + sub.len()..],
        None => "",
    };
    Ok(string_result(out))
}

pub(crate) fn normalize_space(s: &str) -> String {
    let words: SmallVec<[&str; 16]> =
        s.split([' ', '\t', '\n', '\r']).filter(|w| !w.is_empty()).collect();
    words.join(" ")
}

pub(super) fn normalize_space_fn<N: XdmNode>(
    ctx: &CallCtx<N>,
    args: &[XdmSequence<N>],
) -> Result<XdmSequence<N>, Error> {
    let s = match args.first() {
        Some(arg) => opt_string(arg)?,
        None => ctx.dyn_ctx.context_item()?.string_value()?,
    };
    Ok(string_result(normalize_space(&s)))
}

pub(super) fn normalize_unicode_fn<N: XdmNode>(
    _ctx: &CallCtx<N>,
    args: &[XdmSequence<N>],
) -> Result<XdmSequence<N>, Error> {
    let s = opt_string(&args[0])?;
    let form = match args.get(1) {
        Some(arg) => opt_string(arg)?.trim().to_ascii_uppercase(),
        None => "NFC".to_string(),
    };
    let out: String = match form.as_str() {
        "" => s,
        "NFC" => s.nfc().collect(),
        "NFD" => s.nfd().collect(),
        "NFKC" => s.nfkc().collect(),
        "NFKD" => s.nfkd().collect(),
        other => {
            return Err(Error::from_code(
                ErrorCode::FOCH0003,
                format!("unsupported normalization form {other}"),
            ));
        }
    };
    Ok(string_result(out))
}

pub(super) fn translate_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let s = opt_string(&args[0])?;
    let from = opt_string(&args[1])?;
    let to: Vec<char> = opt_string(&args[2])?.chars().collect();
    // first occurrence in the map wins; `None` deletes the character
    let mut map: HashMap<char, Option<char>> = HashMap::new();
    for (i, c) in from.chars().enumerate() {
        if let Entry::Vacant(slot) = map.entry(c) {
            slot.insert(to.get(i).copied());
        }
    }
    let out = s
        .chars()
        .filter_map(|c| match map.get(&c) {
            Some(replacement) => *replacement,
            None => Some(c),
        })
        .collect::<String>();
    Ok(string_result(out))
}

pub(super) fn upper_case_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    Ok(string_result(opt_string(&args[0])?.to_uppercase()))
}

pub(super) fn lower_case_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    Ok(string_result(opt_string(&args[0])?.to_lowercase()))
}

pub(super) fn string_join_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let sep = match args.get(1) {
        Some(arg) => opt_string(arg)?,
        None => String::new(),
    };
    let parts = args[0].iter().map(XdmItem::string_value).collect::<Result<Vec<_>, _>>()?;
    Ok(string_result(parts.join(&sep)))
}

pub(super) fn compare_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    collation_arg(args, 2)?;
    if args[0].is_empty() || args[1].is_empty() {
        return Ok(Vec::new());
    }
    let (a, b) = (opt_string(&args[0])?, opt_string(&args[1])?);
    // UTF-8 byte order is codepoint order
    Ok(int_result(a.cmp(&b) as i64))
}

pub(super) fn string_to_codepoints_fn<N: XdmNode>(
    _ctx: &CallCtx<N>,
    args: &[XdmSequence<N>],
) -> Result<XdmSequence<N>, Error> {
    let s = opt_string(&args[0])?;
    Ok(s.chars().map(|c| XdmItem::Atomic(XdmAtomicValue::Integer(i64::from(u32::from(c))))).collect())
}

pub(super) fn codepoints_to_string_fn<N: XdmNode>(
    _ctx: &CallCtx<N>,
    args: &[XdmSequence<N>],
) -> Result<XdmSequence<N>, Error> {
    let mut out = String::with_capacity(args[0].len());
    for item in &args[0] {
        let code = item.as_atomic().and_then(XdmAtomicValue::as_integer).unwrap_or(-1);
        let c = u32::try_from(code).ok().and_then(char::from_u32).ok_or_else(|| {
            Error::from_code(ErrorCode::FORG0001, format!("{code} is not a valid XML character"))
        })?;
        out.push(c);
    }
    Ok(atomic(XdmAtomicValue::String(out)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("12345", 1.5, Some(2.6), "234")]
    #[case("12345", 0.0, Some(3.0), "12")]
    #[case("12345", 5.0, Some(-3.0), "")]
    #[case("12345", -3.0, Some(5.0), "1")]
    #[case("12345", f64::NAN, Some(3.0), "")]
    #[case("12345", -42.0, Some(f64::INFINITY), "12345")]
    #[case("motor car", 6.0, None, " car")]
    fn substring_rounding(#[case] s: &str, #[case] start: f64, #[case] len: Option<f64>, #[case] expected: &str) {
        assert_eq!(substring_chars(s, start, len), expected);
    }

    #[rstest]
    #[case("  a \t b\n", "a b")]
    #[case("", "")]
    #[case("x", "x")]
    fn normalizes_whitespace(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_space(input), expected);
    }
}
