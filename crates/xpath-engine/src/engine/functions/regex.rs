//! `fn:matches`, `fn:replace` and `fn:tokenize` over `fancy-regex`.

use std::sync::Arc;

use fancy_regex::{Regex, RegexBuilder};

use super::{bool_result, opt_string, string_result};
use crate::engine::functions::strings::normalize_space;
use crate::engine::runtime::{CallCtx, Error, ErrorCode};
use crate::model::XdmNode;
use crate::xdm::{XdmAtomicValue, XdmItem, XdmSequence};

fn evaluation_error(e: fancy_regex::Error) -> Error {
    Error::from_code(ErrorCode::FORX0002, "regex evaluation error")
        .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
}

fn escape_literal(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if "\\.+*?()|[]{}^$#&-~".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Compiles `pattern` under XPath flags; returns the regex and whether `q` was given.
fn build(pattern: &str, flags: &str) -> Result<(Regex, bool), Error> {
    let literal = flags.contains('q');
    let source = if literal { escape_literal(pattern) } else { pattern.to_string() };
    let mut builder = RegexBuilder::new(&source);
    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'x' if !literal => {
                builder.verbose_mode(true);
            }
            'x' | 'q' => {}
            other => {
                return Err(Error::from_code(ErrorCode::FORX0001, format!("unsupported regex flag `{other}`")));
            }
        }
    }
    Ok((builder.build()?, literal))
}

fn flags_arg<N: XdmNode>(args: &[XdmSequence<N>], index: usize) -> Result<String, Error> {
    args.get(index).map(|a| opt_string(a)).unwrap_or_else(|| Ok(String::new()))
}

fn reject_empty_match(re: &Regex) -> Result<(), Error> {
    if re.is_match("").map_err(evaluation_error)? {
        return Err(Error::from_code(ErrorCode::FORX0003, "pattern matches the zero-length string"));
    }
    Ok(())
}

pub(super) fn matches_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let input = opt_string(&args[0])?;
    let (re, _) = build(&opt_string(&args[1])?, &flags_arg(args, 2)?)?;
    Ok(bool_result(re.is_match(&input).map_err(evaluation_error)?))
}

enum Piece {
    Text(String),
    Group(usize),
}

/// Parses an XPath replacement string: `\$` and `\\` are escapes, `$N` refers to a group. Digits
/// after the first are consumed only while the number still names an existing group.
fn parse_replacement(replacement: &str, groups: usize, literal: bool) -> Result<Vec<Piece>, Error> {
    if literal {
        return Ok(vec![Piece::Text(replacement.to_string())]);
    }
    let invalid = |msg: &str| Error::from_code(ErrorCode::FORX0004, format!("invalid replacement string: {msg}"));
    let mut pieces = Vec::new();
    let mut text = String::new();
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(e @ ('\\' | '$')) => text.push(e),
                _ => return Err(invalid("`\\` must be followed by `\\` or `$`")),
            },
            '$' => {
                let mut group = match chars.next().and_then(|d| d.to_digit(10)) {
                    Some(d) => d as usize,
                    None => return Err(invalid("`$` must be followed by a digit")),
                };
                while let Some(d) = chars.peek().and_then(|d| d.to_digit(10)) {
                    let next = group * 10 + d as usize;
                    if next >= groups {
                        break;
                    }
                    group = next;
                    chars.next();
                }
                pieces.push(Piece::Text(std::mem::take(&mut text)));
                pieces.push(Piece::Group(group));
            }
            other => text.push(other),
        }
    }
    pieces.push(Piece::Text(text));
    Ok(pieces)
}

pub(super) fn replace_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let input = opt_string(&args[0])?;
    let (re, literal) = build(&opt_string(&args[1])?, &flags_arg(args, 3)?)?;
    reject_empty_match(&re)?;
    let template = parse_replacement(&opt_string(&args[2])?, re.captures_len(), literal)?;
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for captures in re.captures_iter(&input) {
        let captures = captures.map_err(evaluation_error)?;
        let Some(whole) = captures.get(0) else { continue };
        out.push_str(&input[last..whole.start()]);
        for piece in &template {
            match piece {
                Piece::Text(t) => out.push_str(t),
                Piece::Group(g) => out.push_str(captures.get(*g).map(|m| m.as_str()).unwrap_or_default()),
            }
        }
        last = whole.end();
    }
    out.push_str(&input[last..]);
    Ok(string_result(out))
}

pub(super) fn tokenize_fn<N: XdmNode>(_ctx: &CallCtx<N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let token = |s: &str| XdmItem::Atomic(XdmAtomicValue::String(s.to_string()));
    if args.len() == 1 {
        let input = normalize_space(&opt_string(&args[0])?);
        if input.is_empty() {
            return Ok(Vec::new());
        }
        return Ok(input.split(' ').map(token).collect());
    }
    let input = opt_string(&args[0])?;
    let (re, _) = build(&opt_string(&args[1])?, &flags_arg(args, 2)?)?;
    reject_empty_match(&re)?;
    if input.is_empty() {
        return Ok(Vec::new());
    }
    re.split(&input).map(|part| part.map(token).map_err(evaluation_error)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn expand(replacement: &str, groups: usize) -> Result<String, Error> {
        let pieces = parse_replacement(replacement, groups, false)?;
        Ok(pieces
            .iter()
            .map(|p| match p {
                Piece::Text(t) => t.clone(),
                Piece::Group(g) => format!("<{g}>"),
            })
            .collect())
    }

    #[rstest]
    #[case("$1-$2", 3, "<1>-<2>")]
    #[case("$10", 2, "<1>0")]
    #[case("$10", 11, "<10>")]
    #[case("\\$5", 1, "$5")]
    fn replacement_templates(#[case] template: &str, #[case] groups: usize, #[case] expected: &str) {
        assert_eq!(expand(template, groups).unwrap(), expected);
    }

    #[rstest]
    #[case("$")]
    #[case("a\\b")]
    fn invalid_templates(#[case] template: &str) {
        assert_eq!(expand(template, 2).unwrap_err().code_enum(), ErrorCode::FORX0004);
    }

    #[rstest]
    fn rejects_unknown_flags() {
        assert_eq!(build("a", "z").unwrap_err().code_enum(), ErrorCode::FORX0001);
    }
}
