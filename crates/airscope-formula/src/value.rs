//! Runtime values of evaluated formulas
//!
//! Conversions follow Airtable's loose typing: blank reads as `0` in
//! arithmetic and `""` in text, numeric text is read as a number, and errors
//! are ordinary values that flow through every operation.

use crate::ast::BinaryOperator;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// Error value kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorValue {
    /// Generic error (`ERROR()`, invalid regex, ...)
    Error,
    /// Division or MOD by zero
    DivZero,
    /// Operand of the wrong type
    Value,
}

impl ErrorValue {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorValue::Error => "#ERROR!",
            ErrorValue::DivZero => "#DIV/0!",
            ErrorValue::Value => "#VALUE!",
        }
    }

    pub fn from_code(code: &str) -> Self {
        match code {
            "#DIV/0!" => ErrorValue::DivZero,
            "#VALUE!" => ErrorValue::Value,
            _ => ErrorValue::Error,
        }
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Result of a conversion that may produce an error value
pub type ValueResult<T> = std::result::Result<T, ErrorValue>;

/// A formula value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Blank,
    Number(f64),
    Text(String),
    Bool(bool),
    /// UTC timestamp
    Date(NaiveDateTime),
    Array(Vec<Value>),
    Error(ErrorValue),
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(d: NaiveDateTime) -> Self {
        Value::Date(d)
    }
}

impl From<ValueResult<Value>> for Value {
    fn from(result: ValueResult<Value>) -> Self {
        result.unwrap_or_else(Value::Error)
    }
}

impl Value {
    pub fn is_blank(&self) -> bool {
        matches!(self, Value::Blank)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Decode a cell value as returned by the Airtable records API
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Blank,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or_default(),
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                if let Some(code) = map.get("error").and_then(|c| c.as_str()) {
                    Value::Error(ErrorValue::from_code(code))
                } else if map.contains_key("specialValue") {
                    Value::Error(ErrorValue::Value)
                } else if let Some(name) = map
                    .get("name")
                    .or_else(|| map.get("filename"))
                    .and_then(|n| n.as_str())
                {
                    // Collaborators, attachments and linked records read as their label
                    Value::Text(name.to_string())
                } else {
                    Value::Text(json.to_string())
                }
            }
        }
    }

    // === Conversions ===

    /// Numeric reading of a value (arithmetic operands)
    pub fn to_number(&self) -> ValueResult<f64> {
        match self {
            Value::Blank => Ok(0.0),
            Value::Number(n) => Ok(*n),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) if s.trim().is_empty() => Ok(0.0),
            Value::Text(s) => parse_number(s).ok_or(ErrorValue::Value),
            Value::Array(items) => {
                let items = flatten(items)?;
                match items.as_slice() {
                    [] => Ok(0.0),
                    [single] => single.to_number(),
                    _ => Err(ErrorValue::Value),
                }
            }
            Value::Date(_) => Err(ErrorValue::Value),
            Value::Error(e) => Err(*e),
        }
    }

    /// Number a value compares as, when it has one
    pub fn numeric_view(&self) -> Option<f64> {
        match self {
            Value::Blank => Some(0.0),
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => parse_number(s),
            _ => None,
        }
    }

    /// Text reading of a value (`&` operands, text functions)
    pub fn to_text(&self) -> ValueResult<String> {
        match self {
            Value::Blank => Ok(String::new()),
            Value::Number(n) => Ok(format_number(*n)),
            Value::Text(s) => Ok(s.clone()),
            Value::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
            Value::Date(d) => Ok(format_date(d)),
            Value::Array(items) => {
                let parts = flatten(items)?
                    .iter()
                    .map(Value::to_text)
                    .collect::<ValueResult<Vec<_>>>()?;
                Ok(parts.join(", "))
            }
            Value::Error(e) => Err(*e),
        }
    }

    /// Truth value (`IF`, `AND`, `OR`, ...)
    pub fn truthy(&self) -> ValueResult<bool> {
        match self {
            Value::Blank => Ok(false),
            Value::Number(n) => Ok(*n != 0.0 && !n.is_nan()),
            Value::Text(s) => Ok(!s.is_empty()),
            Value::Bool(b) => Ok(*b),
            Value::Date(_) => Ok(true),
            Value::Array(items) => Ok(!flatten(items)?.is_empty()),
            Value::Error(e) => Err(*e),
        }
    }

    /// Date reading of a value; blank reads as `None`
    pub fn to_date(&self) -> ValueResult<Option<NaiveDateTime>> {
        match self {
            Value::Blank => Ok(None),
            Value::Date(d) => Ok(Some(*d)),
            Value::Text(s) if s.trim().is_empty() => Ok(None),
            Value::Text(s) => parse_date(s).map(Some).ok_or(ErrorValue::Value),
            Value::Array(items) => {
                let items = flatten(items)?;
                match items.as_slice() {
                    [] => Ok(None),
                    [single] => single.to_date(),
                    _ => Err(ErrorValue::Value),
                }
            }
            Value::Error(e) => Err(*e),
            Value::Number(_) | Value::Bool(_) => Err(ErrorValue::Value),
        }
    }
}

/// Flatten nested arrays, failing on the first error element
pub fn flatten(values: &[Value]) -> ValueResult<Vec<Value>> {
    let mut out = Vec::with_capacity(values.len());
    flatten_into(values, &mut out)?;
    Ok(out)
}

fn flatten_into(values: &[Value], out: &mut Vec<Value>) -> ValueResult<()> {
    for value in values {
        match value {
            Value::Array(items) => flatten_into(items, out)?,
            Value::Error(e) => return Err(*e),
            other => out.push(other.clone()),
        }
    }
    Ok(())
}

/// Parse numeric text (surrounding whitespace allowed)
///
/// Accepts plain decimal notation with an optional sign and exponent.
/// Digit separators, `inf`/`nan` spellings and out-of-range literals are
/// rejected.
pub fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if !lazy_regex::regex_is_match!(r"^[+-]?(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:[eE][+-]?[0-9]+)?$", text) {
        return None;
    }
    text.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Number as text: shortest round-trip digits, never in exponent notation
///
/// Integral values print without a fractional part and `-0` keeps its sign.
pub fn format_number(n: f64) -> String {
    format!("{}", n)
}

/// ISO 8601 UTC with millisecond precision
pub fn format_date(d: &NaiveDateTime) -> String {
    d.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Parse an ISO 8601 date or date-time; offsets are converted to UTC
///
/// Accepted forms are `YYYY-MM-DD`, optionally followed by `T` or a space
/// and `HH:MM[:SS[.fff]]`, optionally followed by `Z` or `±HH:MM`. Fractions
/// are truncated to milliseconds and years outside 1-9999 are rejected.
pub fn parse_date(text: &str) -> Option<NaiveDateTime> {
    let (_, year, month, day, hour, minute, second, fraction, zone) = lazy_regex::regex_captures!(
        r"^([0-9]{4})-([0-9]{2})-([0-9]{2})(?:[T ]([0-9]{2}):([0-9]{2})(?::([0-9]{2})(?:\.([0-9]+))?)?)?(Z|[+-][0-9]{2}:[0-9]{2})?$",
        text.trim()
    )?;
    let part = |digits: &str| -> Option<u32> {
        if digits.is_empty() {
            Some(0)
        } else {
            digits.parse().ok()
        }
    };
    let millis: String = fraction.chars().chain(std::iter::repeat('0')).take(3).collect();

    let local = NaiveDate::from_ymd_opt(year.parse().ok()?, part(month)?, part(day)?)?
        .and_hms_milli_opt(part(hour)?, part(minute)?, part(second)?, part(millis.as_str())?)?;
    let utc = match zone.as_bytes().first() {
        Some(sign @ (b'+' | b'-')) => {
            let hours = part(&zone[1..3])?;
            let minutes = part(&zone[4..6])?;
            if hours > 23 || minutes > 59 {
                return None;
            }
            let offset = Duration::minutes(i64::from(hours * 60 + minutes));
            if *sign == b'+' {
                local.checked_sub_signed(offset)?
            } else {
                local.checked_add_signed(offset)?
            }
        }
        _ => local,
    };
    in_date_range(&utc).then_some(utc)
}

/// Whether a date-time falls in the supported years (1-9999)
pub fn in_date_range(d: &NaiveDateTime) -> bool {
    (1..=9999).contains(&d.year())
}

// === Comparison ===

/// Order two values the way formula comparisons do
///
/// Arrays compare as text. Dates compare chronologically when both sides
/// read as dates. Otherwise values compare numerically when both have a
/// numeric view (two texts always compare as text).
pub fn compare(a: &Value, b: &Value) -> ValueResult<Ordering> {
    match (a, b) {
        (Value::Error(e), _) | (_, Value::Error(e)) => return Err(*e),
        (Value::Blank, Value::Blank) => return Ok(Ordering::Equal),
        (Value::Array(_), _) | (_, Value::Array(_)) => {
            return Ok(a.to_text()?.cmp(&b.to_text()?));
        }
        (Value::Date(_), _) | (_, Value::Date(_)) => {
            if let (Ok(Some(da)), Ok(Some(db))) = (a.to_date(), b.to_date()) {
                return Ok(da.cmp(&db));
            }
            return Ok(a.to_text()?.cmp(&b.to_text()?));
        }
        (Value::Text(_), Value::Text(_)) => {}
        _ => {
            if let (Some(x), Some(y)) = (a.numeric_view(), b.numeric_view()) {
                return Ok(x.partial_cmp(&y).unwrap_or(Ordering::Equal));
            }
        }
    }
    Ok(a.to_text()?.cmp(&b.to_text()?))
}

// === Operators ===

/// Apply a binary operator
pub fn binary(op: BinaryOperator, a: &Value, b: &Value) -> Value {
    let result = match op {
        BinaryOperator::Add => add(a, b),
        BinaryOperator::Subtract => arithmetic(a, b, |x, y| Ok(x - y)),
        BinaryOperator::Multiply => arithmetic(a, b, |x, y| Ok(x * y)),
        BinaryOperator::Divide => arithmetic(a, b, |x, y| {
            if y == 0.0 {
                Err(ErrorValue::DivZero)
            } else {
                Ok(x / y)
            }
        }),
        BinaryOperator::Concat => concat(a, b),
        BinaryOperator::Equal => comparison(a, b, Ordering::is_eq),
        BinaryOperator::NotEqual => comparison(a, b, Ordering::is_ne),
        BinaryOperator::LessThan => comparison(a, b, Ordering::is_lt),
        BinaryOperator::LessEqual => comparison(a, b, Ordering::is_le),
        BinaryOperator::GreaterThan => comparison(a, b, Ordering::is_gt),
        BinaryOperator::GreaterEqual => comparison(a, b, Ordering::is_ge),
    };
    result.into()
}

/// Unary minus
pub fn negate(a: &Value) -> Value {
    a.to_number().map(|n| Value::Number(-n)).into()
}

fn first_error(a: &Value, b: &Value) -> ValueResult<()> {
    match (a, b) {
        (Value::Error(e), _) | (_, Value::Error(e)) => Err(*e),
        _ => Ok(()),
    }
}

fn add(a: &Value, b: &Value) -> ValueResult<Value> {
    first_error(a, b)?;
    if matches!(a, Value::Text(_)) || matches!(b, Value::Text(_)) {
        return concat(a, b);
    }
    arithmetic(a, b, |x, y| Ok(x + y))
}

fn arithmetic(
    a: &Value,
    b: &Value,
    op: impl Fn(f64, f64) -> ValueResult<f64>,
) -> ValueResult<Value> {
    first_error(a, b)?;
    op(a.to_number()?, b.to_number()?).map(Value::Number)
}

fn concat(a: &Value, b: &Value) -> ValueResult<Value> {
    first_error(a, b)?;
    Ok(Value::Text(a.to_text()? + &b.to_text()?))
}

fn comparison(a: &Value, b: &Value, test: fn(Ordering) -> bool) -> ValueResult<Value> {
    compare(a, b).map(|ordering| Value::Bool(test(ordering)))
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Blank => serializer.serialize_none(),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Date(d) => serializer.serialize_str(&format_date(d)),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Error(e) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", e.code())?;
                map.end()
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Ok(text) => f.write_str(&text),
            Err(e) => write!(f, "{}", e),
        }
    }
}
