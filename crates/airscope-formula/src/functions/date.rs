//! Date/time functions
//!
//! All date-times are naive UTC. Blank date arguments give blank results;
//! text that does not parse as an ISO 8601 date is an error.

use super::{arg, number_arg, text_arg, whole, EvalContext, MAX_WHOLE};
use crate::value::{in_date_range, ErrorValue, Value, ValueResult};
use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, Timelike};

/// Units accepted by DATEADD, DATETIME_DIFF and IS_SAME
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Quarters,
    Years,
}

impl DateUnit {
    /// Parse a unit specifier (`"days"`, `"d"`, `"M"`, ...)
    ///
    /// One-letter forms are case-sensitive (`m` is minutes, `M` months);
    /// spelled-out forms are not.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let unit = match text {
            "ms" => DateUnit::Milliseconds,
            "s" => DateUnit::Seconds,
            "m" => DateUnit::Minutes,
            "h" => DateUnit::Hours,
            "d" => DateUnit::Days,
            "w" => DateUnit::Weeks,
            "M" => DateUnit::Months,
            "Q" => DateUnit::Quarters,
            "y" => DateUnit::Years,
            _ => match text.to_lowercase().trim_end_matches('s') {
                "millisecond" => DateUnit::Milliseconds,
                "second" => DateUnit::Seconds,
                "minute" => DateUnit::Minutes,
                "hour" => DateUnit::Hours,
                "day" => DateUnit::Days,
                "week" => DateUnit::Weeks,
                "month" => DateUnit::Months,
                "quarter" => DateUnit::Quarters,
                "year" => DateUnit::Years,
                _ => return None,
            },
        };
        Some(unit)
    }

    /// Length in milliseconds, for fixed-length units
    fn millis(&self) -> Option<f64> {
        match self {
            DateUnit::Milliseconds => Some(1.0),
            DateUnit::Seconds => Some(1_000.0),
            DateUnit::Minutes => Some(60_000.0),
            DateUnit::Hours => Some(3_600_000.0),
            DateUnit::Days => Some(86_400_000.0),
            DateUnit::Weeks => Some(604_800_000.0),
            DateUnit::Months | DateUnit::Quarters | DateUnit::Years => None,
        }
    }

    /// Length in months, for calendar units
    fn months(&self) -> Option<i64> {
        match self {
            DateUnit::Months => Some(1),
            DateUnit::Quarters => Some(3),
            DateUnit::Years => Some(12),
            _ => None,
        }
    }
}

fn unit_arg(args: &[Value], i: usize, default: DateUnit) -> ValueResult<DateUnit> {
    match args.get(i) {
        None | Some(Value::Blank) => Ok(default),
        Some(_) => DateUnit::parse(&text_arg(args, i)?).ok_or(ErrorValue::Value),
    }
}

fn date_arg(args: &[Value], i: usize) -> ValueResult<Option<NaiveDateTime>> {
    arg(args, i).to_date()
}

fn date_part(args: &[Value], part: fn(&NaiveDateTime) -> u32) -> ValueResult<Value> {
    Ok(date_arg(args, 0)?
        .map(|d| Value::Number(f64::from(part(&d))))
        .unwrap_or_default())
}

/// Add whole months, clamping the day to the end of the target month
pub fn add_months(d: NaiveDateTime, months: i64) -> ValueResult<NaiveDateTime> {
    let magnitude = u32::try_from(months.unsigned_abs()).map_err(|_| ErrorValue::Value)?;
    let shifted = if months >= 0 {
        d.checked_add_months(Months::new(magnitude))
    } else {
        d.checked_sub_months(Months::new(magnitude))
    };
    shifted.ok_or(ErrorValue::Value)
}

/// Whole months from `b` to `a`, truncated toward zero
pub fn month_diff(a: &NaiveDateTime, b: &NaiveDateTime) -> i64 {
    let mut months = i64::from(a.year() - b.year()) * 12 + i64::from(a.month()) - i64::from(b.month());
    let a_rest = (a.day(), a.time());
    let b_rest = (b.day(), b.time());
    if months > 0 && a_rest < b_rest {
        months -= 1;
    } else if months < 0 && a_rest > b_rest {
        months += 1;
    }
    months
}

/// Start of the `unit` period containing `d`
pub fn truncate(d: &NaiveDateTime, unit: DateUnit) -> NaiveDateTime {
    let date = d.date();
    let midnight = |date: NaiveDate| date.and_hms_opt(0, 0, 0).unwrap_or(*d);
    let first_of = |year: i32, month: u32| {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(midnight)
            .unwrap_or(*d)
    };
    match unit {
        DateUnit::Milliseconds => d
            .with_nanosecond(d.nanosecond() / 1_000_000 * 1_000_000)
            .unwrap_or(*d),
        DateUnit::Seconds => d.with_nanosecond(0).unwrap_or(*d),
        DateUnit::Minutes => date.and_hms_opt(d.hour(), d.minute(), 0).unwrap_or(*d),
        DateUnit::Hours => date.and_hms_opt(d.hour(), 0, 0).unwrap_or(*d),
        DateUnit::Days => midnight(date),
        DateUnit::Weeks => midnight(date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))),
        DateUnit::Months => first_of(date.year(), date.month()),
        DateUnit::Quarters => first_of(date.year(), (date.month() - 1) / 3 * 3 + 1),
        DateUnit::Years => first_of(date.year(), 1),
    }
}

/// YEAR(date)
pub fn fn_year(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    Ok(date_arg(args, 0)?
        .map(|d| Value::Number(f64::from(d.year())))
        .unwrap_or_default())
}

/// MONTH(date): 1-12
pub fn fn_month(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    date_part(args, |d| d.month())
}

/// DAY(date): 1-31
pub fn fn_day(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    date_part(args, |d| d.day())
}

/// HOUR(date)
pub fn fn_hour(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    date_part(args, |d| d.hour())
}

/// MINUTE(date)
pub fn fn_minute(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    date_part(args, |d| d.minute())
}

/// SECOND(date)
pub fn fn_second(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    date_part(args, |d| d.second())
}

/// WEEKDAY(date): 0 = Sunday
pub fn fn_weekday(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    date_part(args, |d| d.weekday().num_days_from_sunday())
}

/// DATEADD(date, count, unit)
pub fn fn_dateadd(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let Some(date) = date_arg(args, 0)? else {
        return Ok(Value::Blank);
    };
    let count = number_arg(args, 1)?;
    let unit = unit_arg(args, 2, DateUnit::Days)?;

    let shifted = match (unit.millis(), unit.months()) {
        (Some(ms), _) => {
            let delta = (count * ms).round();
            if !delta.is_finite() || delta.abs() > MAX_WHOLE {
                return Err(ErrorValue::Value);
            }
            date.checked_add_signed(Duration::milliseconds(delta as i64))
                .ok_or(ErrorValue::Value)?
        }
        (None, Some(per)) => {
            let months = whole(count)?.checked_mul(per).ok_or(ErrorValue::Value)?;
            add_months(date, months)?
        }
        (None, None) => return Err(ErrorValue::Value),
    };
    in_range(shifted).map(Value::Date)
}

fn in_range(d: NaiveDateTime) -> ValueResult<NaiveDateTime> {
    if in_date_range(&d) {
        Ok(d)
    } else {
        Err(ErrorValue::Value)
    }
}

/// DATETIME_DIFF(date1, date2, [unit = seconds]): `date1 - date2`, truncated
pub fn fn_datetime_diff(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let (Some(a), Some(b)) = (date_arg(args, 0)?, date_arg(args, 1)?) else {
        return Ok(Value::Blank);
    };
    let unit = unit_arg(args, 2, DateUnit::Seconds)?;

    let diff = match (unit.millis(), unit.months()) {
        (Some(ms), _) => ((a - b).num_milliseconds() as f64 / ms).trunc(),
        (None, Some(per)) => (month_diff(&a, &b) / per) as f64,
        (None, None) => return Err(ErrorValue::Value),
    };
    // Normalize -0
    Ok(Value::Number(diff + 0.0))
}

fn compare_dates(
    args: &[Value],
    test: fn(&NaiveDateTime, &NaiveDateTime) -> bool,
) -> ValueResult<Value> {
    match (date_arg(args, 0)?, date_arg(args, 1)?) {
        (Some(a), Some(b)) => Ok(Value::Bool(test(&a, &b))),
        _ => Ok(Value::Blank),
    }
}

/// IS_BEFORE(date1, date2)
pub fn fn_is_before(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    compare_dates(args, |a, b| a < b)
}

/// IS_AFTER(date1, date2)
pub fn fn_is_after(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    compare_dates(args, |a, b| a > b)
}

/// IS_SAME(date1, date2, [unit]): equal at the granularity of `unit`
pub fn fn_is_same(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    let (Some(a), Some(b)) = (date_arg(args, 0)?, date_arg(args, 1)?) else {
        return Ok(Value::Blank);
    };
    let same = match args.get(2) {
        None | Some(Value::Blank) => a == b,
        Some(_) => {
            let unit = unit_arg(args, 2, DateUnit::Milliseconds)?;
            in_range(truncate(&a, unit))? == in_range(truncate(&b, unit))?
        }
    };
    Ok(Value::Bool(same))
}

/// DATESTR(date): `YYYY-MM-DD`
pub fn fn_datestr(args: &[Value], _ctx: &EvalContext) -> ValueResult<Value> {
    Ok(date_arg(args, 0)?
        .map(|d| Value::Text(d.format("%Y-%m-%d").to_string()))
        .unwrap_or_default())
}

/// TODAY(): current date at midnight UTC
pub fn fn_today(_args: &[Value], ctx: &EvalContext) -> ValueResult<Value> {
    Ok(Value::Date(truncate(&ctx.now, DateUnit::Days)))
}

/// NOW()
pub fn fn_now(_args: &[Value], ctx: &EvalContext) -> ValueResult<Value> {
    Ok(Value::Date(ctx.now))
}
