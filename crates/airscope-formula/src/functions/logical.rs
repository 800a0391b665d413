//! Logical functions

use super::{arg, EvalContext};
use crate::value::{compare, flatten, ErrorValue, Value, ValueResult};

fn truth_values(args: &[Value]) -> ValueResult<Vec<bool>> {
    flatten(args)?.iter().map(Value::truthy).collect()
}

/// AND(logical1, ...)
pub fn fn_and(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    Ok(Value::Bool(truth_values(args)?.into_iter().all(|b| b)))
}

/// OR(logical1, ...)
pub fn fn_or(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    Ok(Value::Bool(truth_values(args)?.into_iter().any(|b| b)))
}

/// XOR(logical1, ...): true when an odd number of arguments are true
pub fn fn_xor(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let count = truth_values(args)?.into_iter().filter(|&b| b).count();
    Ok(Value::Bool(count % 2 == 1))
}

/// NOT(logical)
pub fn fn_not(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    Ok(Value::Bool(!arg(args, 0).truthy()?))
}

/// ISERROR(expr)
pub fn fn_iserror(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    Ok(Value::Bool(arg(args, 0).is_error()))
}

/// ERROR()
pub fn fn_error(_args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    Err(ErrorValue::Error)
}

/// BLANK()
pub fn fn_blank(_args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    Ok(Value::Blank)
}

/// TRUE()
pub fn fn_true(_args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    Ok(Value::Bool(true))
}

/// FALSE()
pub fn fn_false(_args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    Ok(Value::Bool(false))
}

/// IF(condition, then, [else]) over already evaluated branches
///
/// Compiled programs evaluate only the selected branch; this form backs
/// direct registry calls.
pub fn fn_if(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    if arg(args, 0).truthy()? {
        Ok(arg(args, 1).clone())
    } else {
        Ok(arg(args, 2).clone())
    }
}

/// SWITCH(expr, pattern1, result1, ..., [default])
pub fn fn_switch(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let subject = arg(args, 0);
    if let Value::Error(e) = subject {
        return Err(*e);
    }
    let rest = args.get(1..).unwrap_or_default();
    let mut pairs = rest.chunks_exact(2);
    for pair in pairs.by_ref() {
        if compare(subject, &pair[0])?.is_eq() {
            return Ok(pair[1].clone());
        }
    }
    Ok(pairs.remainder().first().cloned().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> EvalContext {
        EvalContext::new()
    }

    #[test]
    fn test_and_or_xor() {
        let t = Value::Bool(true);
        let f = Value::Blank;
        assert_eq!(fn_and(&[t.clone(), Value::Number(2.0)], &ctx()), Ok(Value::Bool(true)));
        assert_eq!(fn_and(&[t.clone(), f.clone()], &ctx()), Ok(Value::Bool(false)));
        assert_eq!(fn_or(&[f.clone(), Value::from("x")], &ctx()), Ok(Value::Bool(true)));
        assert_eq!(
            fn_xor(&[t.clone(), t.clone(), t], &ctx()),
            Ok(Value::Bool(true))
        );
        assert_eq!(fn_not(&[f], &ctx()), Ok(Value::Bool(true)));
    }

    #[test]
    fn test_if_missing_else_is_blank() {
        assert_eq!(fn_if(&[Value::Bool(false), Value::from("a")], &ctx()), Ok(Value::Blank));
    }

    #[test]
    fn test_switch() {
        let args = [
            Value::from("b"),
            Value::from("a"),
            Value::Number(1.0),
            Value::from("b"),
            Value::Number(2.0),
            Value::from("other"),
        ];
        assert_eq!(fn_switch(&args, &ctx()), Ok(Value::Number(2.0)));

        let args = [Value::from("z"), Value::from("a"), Value::Number(1.0), Value::from("default")];
        assert_eq!(fn_switch(&args, &ctx()), Ok(Value::from("default")));

        let args = [Value::from("z"), Value::from("a"), Value::Number(1.0)];
        assert_eq!(fn_switch(&args, &ctx()), Ok(Value::Blank));
    }
}
