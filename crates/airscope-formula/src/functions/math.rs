//! Numeric functions

use super::{arg, int_arg, number_arg, optional, EvalContext};
use crate::value::{flatten, format_number, parse_number, ErrorValue, Value, ValueResult};
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Numeric values among the (flattened) arguments
///
/// Numbers and numeric text count; blanks, booleans, dates and other text
/// are skipped.
fn numbers(args: &[Value]) -> ValueResult<Vec<f64>> {
    Ok(flatten(args)?
        .iter()
        .filter_map(|v| match v {
            Value::Number(n) => Some(*n),
            Value::Text(s) => parse_number(s),
            _ => None,
        })
        .collect())
}

fn finite(n: f64) -> ValueResult<Value> {
    if n.is_finite() {
        Ok(Value::Number(n))
    } else {
        Err(ErrorValue::Value)
    }
}

/// Round `n` to `places` decimal places (negative places round left of the
/// point) using decimal arithmetic
fn round_decimal(n: f64, places: i64, strategy: RoundingStrategy) -> f64 {
    if !n.is_finite() {
        return n;
    }
    let places = places.clamp(-28, 28);
    let Ok(d) = Decimal::from_str(&format_number(n)) else {
        return round_float(n, places, strategy);
    };

    let rounded = if places >= 0 {
        Some(d.round_dp_with_strategy(places as u32, strategy))
    } else {
        let mut factor = Decimal::ONE;
        for _ in 0..(-places) {
            factor = match factor.checked_mul(Decimal::TEN) {
                Some(f) => f,
                None => return round_float(n, places, strategy),
            };
        }
        d.checked_div(factor)
            .map(|q| q.round_dp_with_strategy(0, strategy))
            .and_then(|q| q.checked_mul(factor))
    };

    rounded
        .and_then(|r| r.to_string().parse::<f64>().ok())
        .unwrap_or_else(|| round_float(n, places, strategy))
}

/// Float fallback for magnitudes a decimal cannot hold
fn round_float(n: f64, places: i64, strategy: RoundingStrategy) -> f64 {
    let factor = 10f64.powi(places as i32);
    let scaled = n * factor;
    let rounded = match strategy {
        RoundingStrategy::AwayFromZero => scaled.abs().ceil().copysign(scaled),
        RoundingStrategy::ToZero => scaled.trunc(),
        _ => scaled.round(),
    };
    rounded / factor
}

fn round_with(args: &[Value], strategy: RoundingStrategy) -> ValueResult<Value> {
    let n = number_arg(args, 0)?;
    let places = int_arg(args, 1)?;
    Ok(Value::Number(round_decimal(n, places, strategy)))
}

/// ABS(number)
pub fn fn_abs(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    Ok(Value::Number(number_arg(args, 0)?.abs()))
}

/// ROUND(number, places): half away from zero
pub fn fn_round(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    round_with(args, RoundingStrategy::MidpointAwayFromZero)
}

/// ROUNDUP(number, places): away from zero
pub fn fn_roundup(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    round_with(args, RoundingStrategy::AwayFromZero)
}

/// ROUNDDOWN(number, places): toward zero
pub fn fn_rounddown(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    round_with(args, RoundingStrategy::ToZero)
}

fn significance(args: &[Value]) -> ValueResult<f64> {
    optional(args, 1).map_or(Ok(1.0), Value::to_number)
}

/// CEILING(number, [significance])
pub fn fn_ceiling(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let n = number_arg(args, 0)?;
    let sig = significance(args)?;
    if sig == 0.0 {
        return Ok(Value::Number(0.0));
    }
    finite((n / sig).ceil() * sig)
}

/// FLOOR(number, [significance])
pub fn fn_floor(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let n = number_arg(args, 0)?;
    let sig = significance(args)?;
    if sig == 0.0 {
        return Ok(Value::Number(0.0));
    }
    finite((n / sig).floor() * sig)
}

/// INT(number): greatest integer not above
pub fn fn_int(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    Ok(Value::Number(number_arg(args, 0)?.floor()))
}

/// MOD(number, divisor): remainder with the sign of `number`
pub fn fn_mod(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let n = number_arg(args, 0)?;
    let d = number_arg(args, 1)?;
    if d == 0.0 {
        return Err(ErrorValue::DivZero);
    }
    Ok(Value::Number(n % d))
}

/// POWER(base, exponent)
pub fn fn_power(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    finite(number_arg(args, 0)?.powf(number_arg(args, 1)?))
}

/// SQRT(number)
pub fn fn_sqrt(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let n = number_arg(args, 0)?;
    if n < 0.0 {
        return Err(ErrorValue::Value);
    }
    Ok(Value::Number(n.sqrt()))
}

/// EXP(power)
pub fn fn_exp(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    finite(number_arg(args, 0)?.exp())
}

/// LOG(number, [base = 10])
pub fn fn_log(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let n = number_arg(args, 0)?;
    let base = optional(args, 1).map_or(Ok(10.0), Value::to_number)?;
    if n <= 0.0 || base <= 0.0 || base == 1.0 {
        return Err(ErrorValue::Value);
    }
    finite(n.ln() / base.ln())
}

/// MAX(number1, ...): 0 when there are no numbers
pub fn fn_max(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let nums = numbers(args)?;
    Ok(Value::Number(nums.into_iter().reduce(f64::max).unwrap_or(0.0)))
}

/// MIN(number1, ...): 0 when there are no numbers
pub fn fn_min(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let nums = numbers(args)?;
    Ok(Value::Number(nums.into_iter().reduce(f64::min).unwrap_or(0.0)))
}

/// SUM(number1, ...)
pub fn fn_sum(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    Ok(Value::Number(numbers(args)?.into_iter().sum()))
}

/// AVERAGE(number1, ...): 0 when there are no numbers
pub fn fn_average(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let nums = numbers(args)?;
    if nums.is_empty() {
        return Ok(Value::Number(0.0));
    }
    Ok(Value::Number(nums.iter().sum::<f64>() / nums.len() as f64))
}

/// COUNT(value1, ...): number values
pub fn fn_count(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let count = flatten(args)?
        .iter()
        .filter(|v| matches!(v, Value::Number(_)))
        .count();
    Ok(Value::Number(count as f64))
}

/// COUNTA(value1, ...): non-empty values
pub fn fn_counta(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let count = flatten(args)?
        .iter()
        .filter(|v| match v {
            Value::Blank => false,
            Value::Text(s) => !s.is_empty(),
            _ => true,
        })
        .count();
    Ok(Value::Number(count as f64))
}

/// COUNTALL(value1, ...): all values, blanks included
pub fn fn_countall(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    Ok(Value::Number(flatten(args)?.len() as f64))
}

/// VALUE(text): number from text, ignoring `$` and thousands separators
pub fn fn_value(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let text = arg(args, 0).to_text()?;
    let cleaned = text.trim().replace(|c: char| c == ',' || c == '$', "");
    if cleaned.is_empty() {
        return Ok(Value::Blank);
    }
    parse_number(&cleaned)
        .map(Value::Number)
        .ok_or(ErrorValue::Value)
}
