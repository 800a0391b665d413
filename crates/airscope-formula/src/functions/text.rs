//! Text functions
//!
//! Positions and lengths count characters, and positions are 1-based.

use super::{int_arg, text_arg, EvalContext};
use crate::value::{flatten, ErrorValue, Value, ValueResult};
use regex::{NoExpand, Regex};

/// Longest text a function may build, in characters
pub const MAX_TEXT_CHARS: usize = 100_000;

fn count_arg(args: &[Value], i: usize) -> ValueResult<usize> {
    let n = int_arg(args, i)?;
    usize::try_from(n).map_err(|_| ErrorValue::Value)
}

fn compile(pattern: &str) -> ValueResult<Regex> {
    Regex::new(pattern).map_err(|_| ErrorValue::Error)
}

/// 1-based character position of `needle` in `haystack` at or after `start`
fn position(haystack: &str, needle: &str, start: i64) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    let skip = usize::try_from(start.max(1) - 1).unwrap_or(0);
    let byte_offset = haystack.char_indices().nth(skip).map(|(b, _)| b)?;
    let found = haystack[byte_offset..].find(needle)?;
    Some(skip + haystack[byte_offset..byte_offset + found].chars().count() + 1)
}

/// CONCATENATE(text1, ...)
pub fn fn_concatenate(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let mut out = String::new();
    for value in flatten(args)? {
        out.push_str(&value.to_text()?);
    }
    Ok(Value::Text(out))
}

/// LEN(text)
pub fn fn_len(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    Ok(Value::Number(text_arg(args, 0)?.chars().count() as f64))
}

/// LEFT(text, count)
pub fn fn_left(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let text = text_arg(args, 0)?;
    let count = count_arg(args, 1)?;
    Ok(Value::Text(text.chars().take(count).collect()))
}

/// RIGHT(text, count)
pub fn fn_right(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let text = text_arg(args, 0)?;
    let count = count_arg(args, 1)?;
    let len = text.chars().count();
    Ok(Value::Text(text.chars().skip(len.saturating_sub(count)).collect()))
}

/// MID(text, start, count)
pub fn fn_mid(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let text = text_arg(args, 0)?;
    let start = int_arg(args, 1)?;
    if start < 1 {
        return Err(ErrorValue::Value);
    }
    let count = count_arg(args, 2)?;
    let skip = usize::try_from(start - 1).map_err(|_| ErrorValue::Value)?;
    Ok(Value::Text(text.chars().skip(skip).take(count).collect()))
}

/// UPPER(text)
pub fn fn_upper(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    Ok(Value::Text(text_arg(args, 0)?.to_uppercase()))
}

/// LOWER(text)
pub fn fn_lower(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    Ok(Value::Text(text_arg(args, 0)?.to_lowercase()))
}

/// TRIM(text): strip leading and trailing whitespace
pub fn fn_trim(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    Ok(Value::Text(text_arg(args, 0)?.trim().to_string()))
}

fn start_arg(args: &[Value]) -> ValueResult<i64> {
    match args.get(2) {
        Some(_) => int_arg(args, 2),
        None => Ok(1),
    }
}

/// FIND(needle, haystack, [start]): position, or 0 when absent
pub fn fn_find(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let needle = text_arg(args, 0)?;
    let haystack = text_arg(args, 1)?;
    let pos = position(&haystack, &needle, start_arg(args)?).unwrap_or(0);
    Ok(Value::Number(pos as f64))
}

/// SEARCH(needle, haystack, [start]): position, or blank when absent
pub fn fn_search(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let needle = text_arg(args, 0)?;
    let haystack = text_arg(args, 1)?;
    Ok(position(&haystack, &needle, start_arg(args)?)
        .map(|pos| Value::Number(pos as f64))
        .unwrap_or_default())
}

/// SUBSTITUTE(text, old, new, [index])
///
/// Replaces every non-overlapping occurrence, or only the `index`-th one.
pub fn fn_substitute(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let text = text_arg(args, 0)?;
    let old = text_arg(args, 1)?;
    let new = text_arg(args, 2)?;
    if old.is_empty() {
        return Ok(Value::Text(text));
    }
    let index = match args.get(3) {
        Some(_) => int_arg(args, 3)?,
        None => 0,
    };
    if index < 1 {
        return Ok(Value::Text(text.replace(&old, &new)));
    }
    let nth = usize::try_from(index - 1).map_err(|_| ErrorValue::Value)?;
    match text.match_indices(old.as_str()).nth(nth) {
        Some((at, _)) => Ok(Value::Text(format!(
            "{}{}{}",
            &text[..at],
            new,
            &text[at + old.len()..]
        ))),
        None => Ok(Value::Text(text)),
    }
}

/// REPLACE(text, start, count, replacement)
pub fn fn_replace(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let text = text_arg(args, 0)?;
    let start = int_arg(args, 1)?;
    if start < 1 {
        return Err(ErrorValue::Value);
    }
    let count = count_arg(args, 2)?;
    let replacement = text_arg(args, 3)?;
    let skip = usize::try_from(start - 1).map_err(|_| ErrorValue::Value)?;

    let mut out: String = text.chars().take(skip).collect();
    out.push_str(&replacement);
    out.extend(text.chars().skip(skip.saturating_add(count)));
    Ok(Value::Text(out))
}

/// REPT(text, count): results longer than [`MAX_TEXT_CHARS`] are errors
pub fn fn_rept(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let text = text_arg(args, 0)?;
    let count = count_arg(args, 1)?;
    match text.chars().count().checked_mul(count) {
        Some(total) if total <= MAX_TEXT_CHARS => Ok(Value::Text(text.repeat(count))),
        _ => Err(ErrorValue::Value),
    }
}

/// REGEX_MATCH(text, pattern)
pub fn fn_regex_match(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let text = text_arg(args, 0)?;
    let re = compile(&text_arg(args, 1)?)?;
    Ok(Value::Bool(re.is_match(&text)))
}

/// REGEX_EXTRACT(text, pattern): first match, or blank
pub fn fn_regex_extract(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let text = text_arg(args, 0)?;
    let re = compile(&text_arg(args, 1)?)?;
    Ok(re
        .find(&text)
        .map(|m| Value::Text(m.as_str().to_string()))
        .unwrap_or_default())
}

/// REGEX_REPLACE(text, pattern, replacement): replacement is literal
pub fn fn_regex_replace(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let text = text_arg(args, 0)?;
    let re = compile(&text_arg(args, 1)?)?;
    let replacement = text_arg(args, 2)?;
    Ok(Value::Text(
        re.replace_all(&text, NoExpand(&replacement)).into_owned(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(f: super::super::FunctionImpl, args: &[Value]) -> Value {
        f(args, &EvalContext::new()).into()
    }

    fn t(s: &str) -> Value {
        Value::from(s)
    }

    fn n(x: f64) -> Value {
        Value::Number(x)
    }

    #[test]
    fn test_slicing() {
        assert_eq!(call(fn_left, &[t("héllo"), n(2.0)]), t("hé"));
        assert_eq!(call(fn_right, &[t("hello"), n(3.0)]), t("llo"));
        assert_eq!(call(fn_right, &[t("hello"), n(0.0)]), t(""));
        assert_eq!(call(fn_right, &[t("hi"), n(9.0)]), t("hi"));
        assert_eq!(call(fn_mid, &[t("abcdef"), n(2.0), n(3.0)]), t("bcd"));
        assert_eq!(
            call(fn_mid, &[t("abc"), n(0.0), n(1.0)]),
            Value::Error(ErrorValue::Value)
        );
        assert_eq!(
            call(fn_left, &[t("abc"), n(-1.0)]),
            Value::Error(ErrorValue::Value)
        );
    }

    #[test]
    fn test_find_and_search() {
        assert_eq!(call(fn_find, &[t("lo"), t("hello lo")]), n(4.0));
        assert_eq!(call(fn_find, &[t("lo"), t("hello lo"), n(5.0)]), n(7.0));
        assert_eq!(call(fn_find, &[t("z"), t("hello")]), n(0.0));
        assert_eq!(call(fn_search, &[t("z"), t("hello")]), Value::Blank);
        assert_eq!(call(fn_find, &[t("é"), t("aéb")]), n(2.0));
    }

    #[test]
    fn test_substitute_and_replace() {
        assert_eq!(call(fn_substitute, &[t("a-b-c"), t("-"), t("+")]), t("a+b+c"));
        assert_eq!(
            call(fn_substitute, &[t("a-b-c"), t("-"), t("+"), n(2.0)]),
            t("a-b+c")
        );
        assert_eq!(call(fn_substitute, &[t("abc"), t(""), t("x")]), t("abc"));
        assert_eq!(
            call(fn_replace, &[t("abcdef"), n(2.0), n(3.0), t("XY")]),
            t("aXYef")
        );
    }

    #[test]
    fn test_blank_reads_as_empty_text() {
        assert_eq!(call(fn_len, &[Value::Blank]), n(0.0));
        assert_eq!(call(fn_upper, &[Value::Blank]), t(""));
        assert_eq!(
            call(fn_concatenate, &[t("a"), Value::Blank, n(3.0)]),
            t("a3")
        );
    }

    #[test]
    fn test_regex() {
        assert_eq!(call(fn_regex_match, &[t("abc123"), t(r"\d+")]), Value::Bool(true));
        assert_eq!(call(fn_regex_extract, &[t("abc123"), t(r"\d+")]), t("123"));
        assert_eq!(call(fn_regex_extract, &[t("abc"), t(r"\d+")]), Value::Blank);
        assert_eq!(
            call(fn_regex_replace, &[t("a1b2"), t(r"\d"), t("$0")]),
            t("a$0b$0")
        );
        assert_eq!(
            call(fn_regex_match, &[t("a"), t("(")]),
            Value::Error(ErrorValue::Error)
        );
    }

    #[test]
    fn test_rept_and_trim() {
        assert_eq!(call(fn_rept, &[t("ab"), n(3.0)]), t("ababab"));
        assert_eq!(call(fn_rept, &[t("ab"), n(50_000.0)]), t(&"ab".repeat(50_000)));
        assert_eq!(call(fn_rept, &[t(""), n(1e15)]), t(""));
        assert_eq!(call(fn_trim, &[t("  x y  ")]), t("x y"));
    }

    #[test]
    fn test_huge_counts_are_errors() {
        let err = Value::Error(ErrorValue::Value);
        assert_eq!(call(fn_rept, &[t("ab"), n(50_001.0)]), err);
        assert_eq!(call(fn_rept, &[t("x"), n(1e19)]), err);
        assert_eq!(call(fn_rept, &[t("x"), n(f64::INFINITY)]), err);
        assert_eq!(call(fn_rept, &[t("x"), n(f64::NAN)]), err);
        assert_eq!(call(fn_left, &[t("abc"), n(1e300)]), err);
        assert_eq!(call(fn_mid, &[t("abc"), n(f64::NEG_INFINITY), n(1.0)]), err);
        assert_eq!(call(fn_left, &[t("abc"), n(1e15)]), t("abc"));
    }
}
