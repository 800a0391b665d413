//! Array functions
//!
//! Lookup and rollup fields produce arrays. A non-array argument is treated
//! as a one-element array and blank as an empty one.

use super::{arg, optional, EvalContext};
use crate::value::{flatten, Value, ValueResult};

fn items(value: &Value) -> ValueResult<Vec<Value>> {
    match value {
        Value::Blank => Ok(Vec::new()),
        Value::Array(values) => flatten(values),
        other => flatten(std::slice::from_ref(other)),
    }
}

/// ARRAYJOIN(array, [separator = ", "])
pub fn fn_arrayjoin(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let separator = match optional(args, 1) {
        Some(sep) => sep.to_text()?,
        None => ", ".to_string(),
    };
    let parts = items(arg(args, 0))?
        .iter()
        .map(Value::to_text)
        .collect::<ValueResult<Vec<_>>>()?;
    Ok(Value::Text(parts.join(&separator)))
}

/// ARRAYUNIQUE(array): first occurrence of each value
pub fn fn_arrayunique(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let mut unique: Vec<Value> = Vec::new();
    for value in items(arg(args, 0))? {
        if !unique.contains(&value) {
            unique.push(value);
        }
    }
    Ok(Value::Array(unique))
}

/// ARRAYCOMPACT(array): drop blanks and empty text
pub fn fn_arraycompact(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    Ok(Value::Array(
        items(arg(args, 0))?
            .into_iter()
            .filter(|v| !matches!(v, Value::Blank) && !matches!(v, Value::Text(s) if s.is_empty()))
            .collect(),
    ))
}

/// ARRAYFLATTEN(array)
pub fn fn_arrayflatten(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    Ok(Value::Array(items(arg(args, 0))?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ErrorValue;

    fn call(f: super::super::FunctionImpl, args: &[Value]) -> Value {
        f(args, &EvalContext::new()).into()
    }

    fn nested() -> Value {
        Value::Array(vec![
            Value::from("a"),
            Value::Array(vec![Value::Blank, Value::from("b"), Value::from("")]),
            Value::from("a"),
            Value::Number(1.0),
        ])
    }

    #[test]
    fn test_arrayjoin() {
        assert_eq!(call(fn_arrayjoin, &[nested()]), Value::from("a, , b, , a, 1"));
        assert_eq!(
            call(fn_arrayjoin, &[nested(), Value::from("|")]),
            Value::from("a||b||a|1")
        );
        assert_eq!(call(fn_arrayjoin, &[Value::from("solo")]), Value::from("solo"));
    }

    #[test]
    fn test_unique_compact_flatten() {
        assert_eq!(
            call(fn_arrayunique, &[nested()]),
            Value::Array(vec![
                Value::from("a"),
                Value::Blank,
                Value::from("b"),
                Value::from(""),
                Value::Number(1.0)
            ])
        );
        assert_eq!(
            call(fn_arraycompact, &[nested()]),
            Value::Array(vec![
                Value::from("a"),
                Value::from("b"),
                Value::from("a"),
                Value::Number(1.0)
            ])
        );
        assert_eq!(
            call(fn_arrayflatten, &[nested()]),
            Value::Array(flatten(&[nested()]).unwrap())
        );
        assert_eq!(call(fn_arrayflatten, &[Value::Blank]), Value::Array(vec![]));
    }

    #[test]
    fn test_error_elements_propagate() {
        let arr = Value::Array(vec![Value::from("a"), Value::Error(ErrorValue::DivZero)]);
        assert_eq!(call(fn_arrayjoin, &[arr]), Value::Error(ErrorValue::DivZero));
    }
}
