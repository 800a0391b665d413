//! Python evaluator printer
//!
//! The generated module is self-contained: a small runtime that mirrors the
//! value model of [`crate::value`] (blank is `None`, errors are `_Err`
//! instances), one `_fn_*` helper per formula function actually used, and one
//! `compute_*` function per computed field.

use super::ir::{Ir, Program};
use super::{DataAccess, GenerateOptions};
use crate::ast::BinaryOperator;
use crate::functions::registry;
use crate::value::{format_date, Value};
use std::fmt::Write;

const IMPORTS: &str = r###"import calendar as _calendar
import datetime as _dt
import decimal as _decimal
import json as _json
import math
import re
"###;

const RUNTIME: &str = r###"# === runtime ===


class _Err:
    """Formula error value."""

    __slots__ = ("code",)

    def __init__(self, code="#ERROR!"):
        self.code = code

    def __eq__(self, other):
        return isinstance(other, _Err) and other.code == self.code

    def __hash__(self):
        return hash(self.code)

    def __repr__(self):
        return "_Err(%r)" % self.code


_ERROR = _Err("#ERROR!")
_DIV0 = _Err("#DIV/0!")
_VALUE = _Err("#VALUE!")
_CODES = {e.code: e for e in (_ERROR, _DIV0, _VALUE)}


class _Raise(Exception):
    def __init__(self, err):
        super().__init__(err.code)
        self.err = err


def _propagate(fn):
    def wrapper(*args):
        for arg in args:
            if isinstance(arg, _Err):
                return arg
        try:
            return fn(*args)
        except _Raise as exc:
            return exc.err

    wrapper.__name__ = fn.__name__
    return wrapper


def _load(v):
    if isinstance(v, list):
        return [_load(x) for x in v]
    if isinstance(v, dict):
        if isinstance(v.get("error"), str):
            return _CODES.get(v["error"], _ERROR)
        if "specialValue" in v:
            return _VALUE
        label = v.get("name", v.get("filename"))
        if isinstance(label, str):
            return label
        return _json.dumps(v, sort_keys=True, separators=(",", ":"))
    if isinstance(v, int) and not isinstance(v, bool):
        return float(v)
    return v


def to_json_value(v):
    """Convert a computed value to its JSON form."""
    if isinstance(v, _Err):
        return {"error": v.code}
    if isinstance(v, _dt.datetime):
        return _fmt_date(v)
    if isinstance(v, list):
        return [to_json_value(x) for x in v]
    return v


def _flatten(values):
    out = []
    for v in values:
        if isinstance(v, (list, tuple)):
            out.extend(_flatten(v))
        elif isinstance(v, _Err):
            raise _Raise(v)
        else:
            out.append(v)
    return out


# Unicode White_Space, the set formula text trimming strips
_WS = (
    "\t\n\x0b\x0c\r \x85\xa0\u1680\u2000\u2001\u2002\u2003\u2004\u2005"
    "\u2006\u2007\u2008\u2009\u200a\u2028\u2029\u202f\u205f\u3000"
)
_NUMBER_RE = re.compile(r"[+-]?(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:[eE][+-]?[0-9]+)?")
_MAX_WHOLE = 1e15
_MAX_TEXT = 100000


def _parse_number(text):
    text = text.strip(_WS)
    if _NUMBER_RE.fullmatch(text) is None:
        return None
    n = float(text)
    return n if math.isfinite(n) else None


def _to_num(v):
    if v is None:
        return 0.0
    if isinstance(v, _Err):
        raise _Raise(v)
    if isinstance(v, bool):
        return 1.0 if v else 0.0
    if isinstance(v, (int, float)):
        return float(v)
    if isinstance(v, str):
        if not v.strip(_WS):
            return 0.0
        n = _parse_number(v)
        if n is None:
            raise _Raise(_VALUE)
        return n
    if isinstance(v, list):
        items = _flatten(v)
        if not items:
            return 0.0
        if len(items) == 1:
            return _to_num(items[0])
    raise _Raise(_VALUE)


def _num_view(v):
    if v is None:
        return 0.0
    if isinstance(v, bool):
        return 1.0 if v else 0.0
    if isinstance(v, (int, float)):
        return float(v)
    if isinstance(v, str):
        return _parse_number(v)
    return None


def _fmt_num(n):
    n = float(n)
    if math.isnan(n):
        return "NaN"
    if math.isinf(n):
        return "inf" if n > 0 else "-inf"
    sign = "-" if math.copysign(1.0, n) < 0 else ""
    mantissa, _, exponent = repr(abs(n)).partition("e")
    whole, _, fraction = mantissa.partition(".")
    digits = whole + fraction
    point = len(whole) + int(exponent or 0)
    stripped = digits.lstrip("0")
    point -= len(digits) - len(stripped)
    digits = stripped.rstrip("0")
    if not digits:
        return sign + "0"
    if point <= 0:
        return sign + "0." + "0" * -point + digits
    if point >= len(digits):
        return sign + digits + "0" * (point - len(digits))
    return sign + digits[:point] + "." + digits[point:]


def _fmt_date(d):
    return "%04d-%02d-%02dT%02d:%02d:%02d.%03dZ" % (
        d.year, d.month, d.day, d.hour, d.minute, d.second, d.microsecond // 1000
    )


def _to_text(v):
    if v is None:
        return ""
    if isinstance(v, _Err):
        raise _Raise(v)
    if isinstance(v, bool):
        return "1" if v else "0"
    if isinstance(v, (int, float)):
        return _fmt_num(v)
    if isinstance(v, str):
        return v
    if isinstance(v, _dt.datetime):
        return _fmt_date(v)
    if isinstance(v, list):
        return ", ".join(_to_text(x) for x in _flatten(v))
    return str(v)


def _truthy(v):
    if v is None:
        return False
    if isinstance(v, _Err):
        raise _Raise(v)
    if isinstance(v, bool):
        return v
    if isinstance(v, (int, float)):
        return v != 0 and not math.isnan(v)
    if isinstance(v, str):
        return v != ""
    if isinstance(v, list):
        return len(_flatten(v)) > 0
    return True


_DATE_RE = re.compile(
    r"([0-9]{4})-([0-9]{2})-([0-9]{2})"
    r"(?:[T ]([0-9]{2}):([0-9]{2})(?::([0-9]{2})(?:\.([0-9]+))?)?)?"
    r"(Z|[+-][0-9]{2}:[0-9]{2})?"
)


def _parse_date(text):
    m = _DATE_RE.fullmatch(text.strip(_WS))
    if m is None:
        return None
    year, month, day, hour, minute, second, fraction, zone = m.groups()
    millis = int((fraction or "")[:3].ljust(3, "0"))
    try:
        d = _dt.datetime(
            int(year), int(month), int(day),
            int(hour or 0), int(minute or 0), int(second or 0), millis * 1000,
        )
        if zone and zone != "Z":
            hours, minutes = int(zone[1:3]), int(zone[4:6])
            if hours > 23 or minutes > 59:
                return None
            offset = _dt.timedelta(hours=hours, minutes=minutes)
            d = d - offset if zone[0] == "+" else d + offset
    except (ValueError, OverflowError):
        return None
    return d


def _to_date(v):
    if v is None:
        return None
    if isinstance(v, _Err):
        raise _Raise(v)
    if isinstance(v, _dt.datetime):
        return v
    if isinstance(v, str):
        if not v.strip(_WS):
            return None
        d = _parse_date(v)
        if d is None:
            raise _Raise(_VALUE)
        return d
    if isinstance(v, list):
        items = _flatten(v)
        if not items:
            return None
        if len(items) == 1:
            return _to_date(items[0])
    raise _Raise(_VALUE)


def _cmp(a, b):
    return (a > b) - (a < b)


def _compare(a, b):
    if isinstance(a, _Err):
        raise _Raise(a)
    if isinstance(b, _Err):
        raise _Raise(b)
    if a is None and b is None:
        return 0
    if isinstance(a, list) or isinstance(b, list):
        return _cmp(_to_text(a), _to_text(b))
    if isinstance(a, _dt.datetime) or isinstance(b, _dt.datetime):
        try:
            da, db = _to_date(a), _to_date(b)
        except _Raise:
            da = db = None
        if da is not None and db is not None:
            return _cmp(da, db)
        return _cmp(_to_text(a), _to_text(b))
    if not (isinstance(a, str) and isinstance(b, str)):
        na, nb = _num_view(a), _num_view(b)
        if na is not None and nb is not None:
            return _cmp(na, nb)
    return _cmp(_to_text(a), _to_text(b))


@_propagate
def _op_add(a, b):
    if isinstance(a, str) or isinstance(b, str):
        return _to_text(a) + _to_text(b)
    return _to_num(a) + _to_num(b)


@_propagate
def _op_sub(a, b):
    return _to_num(a) - _to_num(b)


@_propagate
def _op_mul(a, b):
    return _to_num(a) * _to_num(b)


@_propagate
def _op_div(a, b):
    n, d = _to_num(a), _to_num(b)
    if d == 0:
        return _DIV0
    return n / d


@_propagate
def _op_concat(a, b):
    return _to_text(a) + _to_text(b)


@_propagate
def _op_eq(a, b):
    return _compare(a, b) == 0


@_propagate
def _op_ne(a, b):
    return _compare(a, b) != 0


@_propagate
def _op_lt(a, b):
    return _compare(a, b) < 0


@_propagate
def _op_le(a, b):
    return _compare(a, b) <= 0


@_propagate
def _op_gt(a, b):
    return _compare(a, b) > 0


@_propagate
def _op_ge(a, b):
    return _compare(a, b) >= 0


@_propagate
def _op_neg(a):
    return -_to_num(a)


def _if(condition, then, otherwise):
    try:
        chosen = _truthy(condition)
    except _Raise as exc:
        return exc.err
    return then() if chosen else otherwise()


def _switch(subject, cases, default):
    if isinstance(subject, _Err):
        return subject
    for pattern, result in cases:
        try:
            matched = _compare(subject, pattern()) == 0
        except _Raise as exc:
            return exc.err
        if matched:
            return result()
    return default()


def _whole(n):
    if not math.isfinite(n) or abs(n) > _MAX_WHOLE:
        raise _Raise(_VALUE)
    return int(n)


def _int(v):
    return _whole(_to_num(v))


def _count(v):
    n = _int(v)
    if n < 0:
        raise _Raise(_VALUE)
    return n


def _finite(n):
    if math.isinf(n) or math.isnan(n):
        raise _Raise(_VALUE)
    return float(n)


def _numbers(args):
    out = []
    for v in _flatten(args):
        if v is None or isinstance(v, bool):
            continue
        if isinstance(v, (int, float)):
            out.append(float(v))
        elif isinstance(v, str):
            n = _parse_number(v)
            if n is not None:
                out.append(n)
    return out


def _items(v):
    if v is None:
        return []
    if isinstance(v, list):
        return _flatten(v)
    return _flatten([v])


def _regex(pattern):
    try:
        return re.compile(_to_text(pattern))
    except re.error:
        raise _Raise(_ERROR)


def _round_decimal(n, places, mode):
    n = _to_num(n)
    places = max(-28, min(28, _int(places)))
    if not math.isfinite(n):
        return n
    try:
        quantum = _decimal.Decimal(1).scaleb(-places)
        return float(_decimal.Decimal(repr(n)).quantize(quantum, rounding=mode))
    except _decimal.InvalidOperation:
        factor = 10.0 ** places
        return round(n * factor) / factor


_UNIT_ALIASES = {
    "ms": "milliseconds",
    "s": "seconds",
    "m": "minutes",
    "h": "hours",
    "d": "days",
    "w": "weeks",
    "M": "months",
    "Q": "quarters",
    "y": "years",
}
_UNIT_MS = {
    "milliseconds": 1,
    "seconds": 1000,
    "minutes": 60000,
    "hours": 3600000,
    "days": 86400000,
    "weeks": 604800000,
}
_UNIT_MONTHS = {"months": 1, "quarters": 3, "years": 12}


def _unit(v, default):
    if v is None:
        return default
    text = _to_text(v).strip(_WS)
    if text in _UNIT_ALIASES:
        return _UNIT_ALIASES[text]
    name = text.lower().rstrip("s") + "s"
    if name in _UNIT_MS or name in _UNIT_MONTHS:
        return name
    raise _Raise(_VALUE)


def _add_months(d, months):
    total = d.year * 12 + (d.month - 1) + months
    year, month = divmod(total, 12)
    if year < 1 or year > 9999:
        raise _Raise(_VALUE)
    month += 1
    day = min(d.day, _calendar.monthrange(year, month)[1])
    return d.replace(year=year, month=month, day=day)


def _month_diff(a, b):
    months = (a.year - b.year) * 12 + a.month - b.month
    a_rest = (a.day, a.time())
    b_rest = (b.day, b.time())
    if months > 0 and a_rest < b_rest:
        months -= 1
    elif months < 0 and a_rest > b_rest:
        months += 1
    return months


def _truncate(d, unit):
    if unit == "milliseconds":
        return d.replace(microsecond=d.microsecond // 1000 * 1000)
    if unit == "seconds":
        return d.replace(microsecond=0)
    if unit == "minutes":
        return d.replace(second=0, microsecond=0)
    if unit == "hours":
        return d.replace(minute=0, second=0, microsecond=0)
    day = d.replace(hour=0, minute=0, second=0, microsecond=0)
    if unit == "days":
        return day
    if unit == "weeks":
        try:
            return day - _dt.timedelta(days=(day.weekday() + 1) % 7)
        except OverflowError:
            raise _Raise(_VALUE)
    if unit == "months":
        return day.replace(day=1)
    if unit == "quarters":
        return day.replace(month=(day.month - 1) // 3 * 3 + 1, day=1)
    return day.replace(month=1, day=1)


def _date_part(v, part):
    d = _to_date(v)
    return None if d is None else float(part(d))


def _now():
    return _dt.datetime.now(_dt.timezone.utc).replace(tzinfo=None)
"###;

/// Python source of the helper implementing a registered function
///
/// `IF` and `SWITCH` have none: they compile to the lazy `_if` / `_switch`
/// runtime forms.
pub fn helper_source(name: &str) -> Option<&'static str> {
    let source = match name {
        // Logical
        "AND" => {
            r###"@_propagate
def _fn_and(*args):
    return all(_truthy(v) for v in _flatten(args))
"###
        }
        "OR" => {
            r###"@_propagate
def _fn_or(*args):
    return any(_truthy(v) for v in _flatten(args))
"###
        }
        "XOR" => {
            r###"@_propagate
def _fn_xor(*args):
    return sum(1 for v in _flatten(args) if _truthy(v)) % 2 == 1
"###
        }
        "NOT" => {
            r###"@_propagate
def _fn_not(v):
    return not _truthy(v)
"###
        }
        "ERROR" => {
            r###"def _fn_error():
    return _ERROR
"###
        }
        "BLANK" => {
            r###"def _fn_blank():
    return None
"###
        }
        "TRUE" => {
            r###"def _fn_true():
    return True
"###
        }
        "FALSE" => {
            r###"def _fn_false():
    return False
"###
        }
        "ISERROR" => {
            r###"def _fn_iserror(v):
    return isinstance(v, _Err)
"###
        }

        // Text
        "CONCATENATE" => {
            r###"@_propagate
def _fn_concatenate(*args):
    return "".join(_to_text(v) for v in _flatten(args))
"###
        }
        "LEN" => {
            r###"@_propagate
def _fn_len(text):
    return float(len(_to_text(text)))
"###
        }
        "LEFT" => {
            r###"@_propagate
def _fn_left(text, count):
    text = _to_text(text)
    return text[:_count(count)]
"###
        }
        "RIGHT" => {
            r###"@_propagate
def _fn_right(text, count):
    text = _to_text(text)
    count = _count(count)
    return text[max(len(text) - count, 0):]
"###
        }
        "MID" => {
            r###"@_propagate
def _fn_mid(text, start, count):
    text = _to_text(text)
    start = _int(start)
    if start < 1:
        raise _Raise(_VALUE)
    count = _count(count)
    return text[start - 1:start - 1 + count]
"###
        }
        "UPPER" => {
            r###"@_propagate
def _fn_upper(text):
    return _to_text(text).upper()
"###
        }
        "LOWER" => {
            r###"@_propagate
def _fn_lower(text):
    return _to_text(text).lower()
"###
        }
        "TRIM" => {
            r###"@_propagate
def _fn_trim(text):
    return _to_text(text).strip(_WS)
"###
        }
        "FIND" => {
            r###"@_propagate
def _fn_find(needle, haystack, start=None):
    needle, haystack = _to_text(needle), _to_text(haystack)
    start = 1 if start is None else _int(start)
    if not needle:
        return 0.0
    return float(haystack.find(needle, max(start, 1) - 1) + 1)
"###
        }
        "SEARCH" => {
            r###"@_propagate
def _fn_search(needle, haystack, start=None):
    needle, haystack = _to_text(needle), _to_text(haystack)
    start = 1 if start is None else _int(start)
    if not needle:
        return None
    pos = haystack.find(needle, max(start, 1) - 1)
    return None if pos < 0 else float(pos + 1)
"###
        }
        "SUBSTITUTE" => {
            r###"@_propagate
def _fn_substitute(text, old, new, index=None):
    text, old, new = _to_text(text), _to_text(old), _to_text(new)
    if not old:
        return text
    index = 0 if index is None else _int(index)
    if index < 1:
        return text.replace(old, new)
    at = -len(old)
    for _ in range(index):
        at = text.find(old, at + len(old))
        if at < 0:
            return text
    return text[:at] + new + text[at + len(old):]
"###
        }
        "REPLACE" => {
            r###"@_propagate
def _fn_replace(text, start, count, replacement):
    text = _to_text(text)
    start = _int(start)
    if start < 1:
        raise _Raise(_VALUE)
    count = _count(count)
    replacement = _to_text(replacement)
    return text[:start - 1] + replacement + text[start - 1 + count:]
"###
        }
        "REPT" => {
            r###"@_propagate
def _fn_rept(text, count):
    text = _to_text(text)
    count = _count(count)
    if len(text) * count > _MAX_TEXT:
        raise _Raise(_VALUE)
    return text * count
"###
        }
        "REGEX_MATCH" => {
            r###"@_propagate
def _fn_regex_match(text, pattern):
    text = _to_text(text)
    return _regex(pattern).search(text) is not None
"###
        }
        "REGEX_EXTRACT" => {
            r###"@_propagate
def _fn_regex_extract(text, pattern):
    text = _to_text(text)
    match = _regex(pattern).search(text)
    return match.group(0) if match else None
"###
        }
        "REGEX_REPLACE" => {
            r###"@_propagate
def _fn_regex_replace(text, pattern, replacement):
    text = _to_text(text)
    regex = _regex(pattern)
    replacement = _to_text(replacement)
    return regex.sub(lambda _m: replacement, text)
"###
        }

        // Numeric
        "ABS" => {
            r###"@_propagate
def _fn_abs(n):
    return abs(_to_num(n))
"###
        }
        "ROUND" => {
            r###"@_propagate
def _fn_round(n, places):
    return _round_decimal(n, places, _decimal.ROUND_HALF_UP)
"###
        }
        "ROUNDUP" => {
            r###"@_propagate
def _fn_roundup(n, places):
    return _round_decimal(n, places, _decimal.ROUND_UP)
"###
        }
        "ROUNDDOWN" => {
            r###"@_propagate
def _fn_rounddown(n, places):
    return _round_decimal(n, places, _decimal.ROUND_DOWN)
"###
        }
        "CEILING" => {
            r###"@_propagate
def _fn_ceiling(n, significance=None):
    n = _to_num(n)
    sig = 1.0 if significance is None else _to_num(significance)
    if sig == 0:
        return 0.0
    try:
        return _finite(math.ceil(n / sig) * sig)
    except (OverflowError, ValueError):
        raise _Raise(_VALUE)
"###
        }
        "FLOOR" => {
            r###"@_propagate
def _fn_floor(n, significance=None):
    n = _to_num(n)
    sig = 1.0 if significance is None else _to_num(significance)
    if sig == 0:
        return 0.0
    try:
        return _finite(math.floor(n / sig) * sig)
    except (OverflowError, ValueError):
        raise _Raise(_VALUE)
"###
        }
        "INT" => {
            r###"@_propagate
def _fn_int(n):
    n = _to_num(n)
    return float(math.floor(n)) if math.isfinite(n) else n
"###
        }
        "MOD" => {
            r###"@_propagate
def _fn_mod(n, d):
    n, d = _to_num(n), _to_num(d)
    if d == 0:
        return _DIV0
    if math.isinf(n):
        return math.nan
    return math.fmod(n, d)
"###
        }
        "POWER" => {
            r###"@_propagate
def _fn_power(base, exponent):
    base, exponent = _to_num(base), _to_num(exponent)
    try:
        return _finite(math.pow(base, exponent))
    except (OverflowError, ValueError):
        raise _Raise(_VALUE)
"###
        }
        "SQRT" => {
            r###"@_propagate
def _fn_sqrt(n):
    n = _to_num(n)
    if n < 0:
        raise _Raise(_VALUE)
    return math.sqrt(n)
"###
        }
        "EXP" => {
            r###"@_propagate
def _fn_exp(n):
    n = _to_num(n)
    try:
        return _finite(math.exp(n))
    except OverflowError:
        raise _Raise(_VALUE)
"###
        }
        "LOG" => {
            r###"@_propagate
def _fn_log(n, base=None):
    n = _to_num(n)
    base = 10.0 if base is None else _to_num(base)
    if n <= 0 or base <= 0 or base == 1:
        raise _Raise(_VALUE)
    return _finite(math.log(n) / math.log(base))
"###
        }
        "MAX" => {
            r###"@_propagate
def _fn_max(*args):
    nums = _numbers(args)
    return max(nums) if nums else 0.0
"###
        }
        "MIN" => {
            r###"@_propagate
def _fn_min(*args):
    nums = _numbers(args)
    return min(nums) if nums else 0.0
"###
        }
        "SUM" => {
            r###"@_propagate
def _fn_sum(*args):
    return float(sum(_numbers(args)))
"###
        }
        "AVERAGE" => {
            r###"@_propagate
def _fn_average(*args):
    nums = _numbers(args)
    return sum(nums) / len(nums) if nums else 0.0
"###
        }
        "COUNT" => {
            r###"@_propagate
def _fn_count(*args):
    return float(sum(
        1 for v in _flatten(args)
        if isinstance(v, (int, float)) and not isinstance(v, bool)
    ))
"###
        }
        "COUNTA" => {
            r###"@_propagate
def _fn_counta(*args):
    return float(sum(1 for v in _flatten(args) if v is not None and v != ""))
"###
        }
        "COUNTALL" => {
            r###"@_propagate
def _fn_countall(*args):
    return float(len(_flatten(args)))
"###
        }
        "VALUE" => {
            r###"@_propagate
def _fn_value(text):
    cleaned = _to_text(text).strip(_WS).replace(",", "").replace("$", "")
    if not cleaned:
        return None
    n = _parse_number(cleaned)
    if n is None:
        raise _Raise(_VALUE)
    return n
"###
        }

        // Date
        "YEAR" => {
            r###"@_propagate
def _fn_year(date):
    return _date_part(date, lambda d: d.year)
"###
        }
        "MONTH" => {
            r###"@_propagate
def _fn_month(date):
    return _date_part(date, lambda d: d.month)
"###
        }
        "DAY" => {
            r###"@_propagate
def _fn_day(date):
    return _date_part(date, lambda d: d.day)
"###
        }
        "HOUR" => {
            r###"@_propagate
def _fn_hour(date):
    return _date_part(date, lambda d: d.hour)
"###
        }
        "MINUTE" => {
            r###"@_propagate
def _fn_minute(date):
    return _date_part(date, lambda d: d.minute)
"###
        }
        "SECOND" => {
            r###"@_propagate
def _fn_second(date):
    return _date_part(date, lambda d: d.second)
"###
        }
        "WEEKDAY" => {
            r###"@_propagate
def _fn_weekday(date):
    return _date_part(date, lambda d: (d.weekday() + 1) % 7)
"###
        }
        "DATEADD" => {
            r###"@_propagate
def _fn_dateadd(date, count, unit):
    d = _to_date(date)
    if d is None:
        return None
    count = _to_num(count)
    unit = _unit(unit, "days")
    if unit in _UNIT_MS:
        scaled = count * _UNIT_MS[unit]
        if not math.isfinite(scaled):
            raise _Raise(_VALUE)
        delta = float(math.floor(abs(scaled)))
        if abs(scaled) - delta >= 0.5:
            delta += 1
        delta = math.copysign(delta, scaled)
        if abs(delta) > _MAX_WHOLE:
            raise _Raise(_VALUE)
        try:
            return d + _dt.timedelta(milliseconds=delta)
        except OverflowError:
            raise _Raise(_VALUE)
    return _add_months(d, _whole(count) * _UNIT_MONTHS[unit])
"###
        }
        "DATETIME_DIFF" => {
            r###"@_propagate
def _fn_datetime_diff(date1, date2, unit=None):
    a, b = _to_date(date1), _to_date(date2)
    if a is None or b is None:
        return None
    unit = _unit(unit, "seconds")
    if unit in _UNIT_MS:
        delta = a - b
        ms = delta.days * 86400000 + delta.seconds * 1000 + delta.microseconds // 1000
        return float(int(ms / _UNIT_MS[unit]))
    return float(int(_month_diff(a, b) / _UNIT_MONTHS[unit]))
"###
        }
        "IS_BEFORE" => {
            r###"@_propagate
def _fn_is_before(date1, date2):
    a, b = _to_date(date1), _to_date(date2)
    if a is None or b is None:
        return None
    return a < b
"###
        }
        "IS_AFTER" => {
            r###"@_propagate
def _fn_is_after(date1, date2):
    a, b = _to_date(date1), _to_date(date2)
    if a is None or b is None:
        return None
    return a > b
"###
        }
        "IS_SAME" => {
            r###"@_propagate
def _fn_is_same(date1, date2, unit=None):
    a, b = _to_date(date1), _to_date(date2)
    if a is None or b is None:
        return None
    if unit is None:
        return a == b
    unit = _unit(unit, "milliseconds")
    return _truncate(a, unit) == _truncate(b, unit)
"###
        }
        "DATESTR" => {
            r###"@_propagate
def _fn_datestr(date):
    d = _to_date(date)
    return None if d is None else "%04d-%02d-%02d" % (d.year, d.month, d.day)
"###
        }
        "TODAY" => {
            r###"def _fn_today():
    return _now().replace(hour=0, minute=0, second=0, microsecond=0)
"###
        }
        "NOW" => {
            r###"def _fn_now():
    return _now()
"###
        }

        // Array
        "ARRAYJOIN" => {
            r###"@_propagate
def _fn_arrayjoin(array, separator=None):
    separator = ", " if separator is None else _to_text(separator)
    return separator.join(_to_text(v) for v in _items(array))
"###
        }
        "ARRAYUNIQUE" => {
            r###"@_propagate
def _fn_arrayunique(array):
    out = []
    for v in _items(array):
        if not any(type(v) is type(seen) and v == seen for seen in out):
            out.append(v)
    return out
"###
        }
        "ARRAYCOMPACT" => {
            r###"@_propagate
def _fn_arraycompact(array):
    return [v for v in _items(array) if v is not None and v != ""]
"###
        }
        "ARRAYFLATTEN" => {
            r###"@_propagate
def _fn_arrayflatten(array):
    return _items(array)
"###
        }
        _ => return None,
    };
    Some(source)
}

fn operator_helper(op: BinaryOperator) -> &'static str {
    match op {
        BinaryOperator::Add => "_op_add",
        BinaryOperator::Subtract => "_op_sub",
        BinaryOperator::Multiply => "_op_mul",
        BinaryOperator::Divide => "_op_div",
        BinaryOperator::Equal => "_op_eq",
        BinaryOperator::NotEqual => "_op_ne",
        BinaryOperator::LessThan => "_op_lt",
        BinaryOperator::LessEqual => "_op_le",
        BinaryOperator::GreaterThan => "_op_gt",
        BinaryOperator::GreaterEqual => "_op_ge",
        BinaryOperator::Concat => "_op_concat",
    }
}

/// Python string literal
pub fn py_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Python float literal
pub fn py_number(n: f64) -> String {
    if n.is_nan() {
        "float(\"nan\")".to_string()
    } else if n == f64::INFINITY {
        "float(\"inf\")".to_string()
    } else if n == f64::NEG_INFINITY {
        "-float(\"inf\")".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e16 {
        format!("{:.1}", n)
    } else {
        format!("{:?}", n)
    }
}

fn py_value(value: &Value) -> String {
    match value {
        Value::Blank => "None".to_string(),
        Value::Number(n) => py_number(*n),
        Value::Text(s) => py_string(s),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Date(d) => format!("_parse_date({})", py_string(&format_date(d))),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(py_value).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Error(e) => format!("_Err({})", py_string(e.code())),
    }
}

/// Renders a compiled [`Program`] as a Python module
pub struct PythonPrinter<'p> {
    program: &'p Program,
    options: GenerateOptions,
}

impl<'p> PythonPrinter<'p> {
    pub fn new(program: &'p Program, options: GenerateOptions) -> Self {
        Self { program, options }
    }

    fn record_mode(&self) -> bool {
        self.options.data_access == DataAccess::Record
    }

    fn param(&self) -> &'static str {
        if self.record_mode() {
            "record"
        } else {
            "values"
        }
    }

    /// Python expression for a compiled formula
    pub fn expr(&self, ir: &Ir) -> String {
        match ir {
            Ir::Constant(value) => py_value(value),
            Ir::Read(index) => {
                let slot = self.program.slot(*index);
                if self.record_mode() {
                    format!("record.{}", slot.attribute)
                } else {
                    format!("values.get({})", py_string(slot.field_id.as_str()))
                }
            }
            Ir::Negate(operand) => format!("_op_neg({})", self.expr(operand)),
            Ir::Binary { op, left, right } => format!(
                "{}({}, {})",
                operator_helper(*op),
                self.expr(left),
                self.expr(right)
            ),
            Ir::Call { function, args } => {
                let args: Vec<String> = args.iter().map(|a| self.expr(a)).collect();
                format!("_fn_{}({})", function.name.to_lowercase(), args.join(", "))
            }
            Ir::If {
                condition,
                then,
                otherwise,
            } => format!(
                "_if({}, lambda: {}, lambda: {})",
                self.expr(condition),
                self.expr(then),
                otherwise
                    .as_ref()
                    .map_or_else(|| "None".to_string(), |o| self.expr(o))
            ),
            Ir::Switch {
                subject,
                cases,
                default,
            } => {
                let cases: Vec<String> = cases
                    .iter()
                    .map(|(pattern, result)| {
                        format!(
                            "(lambda: {}, lambda: {})",
                            self.expr(pattern),
                            self.expr(result)
                        )
                    })
                    .collect();
                format!(
                    "_switch({}, [{}], lambda: {})",
                    self.expr(subject),
                    cases.join(", "),
                    default
                        .as_ref()
                        .map_or_else(|| "None".to_string(), |d| self.expr(d))
                )
            }
        }
    }

    /// The whole module
    pub fn print(&self) -> String {
        let mut out = String::new();
        self.write_module(&mut out);
        out
    }

    fn write_module(&self, out: &mut String) {
        let program = self.program;
        if self.options.include_header {
            self.write_header(out);
        }
        out.push_str(IMPORTS);
        if self.record_mode() {
            out.push_str("from dataclasses import dataclass\n");
        }
        out.push_str("\n\n");
        out.push_str(RUNTIME);

        let used = program.functions_used();
        let helpers: Vec<&'static str> = registry()
            .iter()
            .filter(|def| used.contains(&def.name))
            .filter_map(|def| helper_source(def.name))
            .collect();
        if !helpers.is_empty() {
            out.push_str("\n\n# === functions ===\n");
            for helper in helpers {
                out.push_str("\n\n");
                out.push_str(helper);
            }
        }

        out.push_str("\n\n# === fields ===\n");
        if self.record_mode() {
            self.write_record_class(out);
        }
        for unit in &program.units {
            let slot = program.slot(unit.slot);
            out.push_str("\n\n");
            let _ = writeln!(out, "def compute_{}({}):", slot.attribute, self.param());
            if self.options.include_header {
                let _ = writeln!(out, "    # {} ({}), depth {}", slot.name, slot.field_id, unit.depth);
                for line in unit.formula.lines() {
                    let _ = writeln!(out, "    #   {}", line);
                }
            }
            let _ = writeln!(out, "    return {}", self.expr(&unit.body));
        }

        self.write_tables(out);
        self.write_evaluate(out);
    }

    fn write_header(&self, out: &mut String) {
        let program = self.program;
        let access = if self.record_mode() {
            "Reads and writes attributes of a record object."
        } else {
            "Reads and writes a mapping keyed by field ID."
        };
        let _ = writeln!(
            out,
            "\"\"\"Formula evaluator for table {} ({}).\n\nGenerated by airscope. {}\n\"\"\"\n",
            program.table_name.replace('\\', "\\\\").replace("\"\"\"", "'''"),
            program.table_id,
            access
        );
    }

    fn write_record_class(&self, out: &mut String) {
        let _ = write!(
            out,
            "\n\n@dataclass\nclass {}:\n",
            self.program.record_type_name()
        );
        if self.program.slots.is_empty() {
            out.push_str("    pass\n");
        }
        for slot in &self.program.slots {
            let _ = writeln!(out, "    {}: object = None", slot.attribute);
        }
    }

    fn write_tables(&self, out: &mut String) {
        let program = self.program;
        let key = |slot: &super::ir::FieldSlot| {
            if self.record_mode() {
                py_string(&slot.attribute)
            } else {
                py_string(slot.field_id.as_str())
            }
        };

        out.push_str("\n\nEVALUATION_ORDER = [\n");
        for unit in &program.units {
            let slot = program.slot(unit.slot);
            let _ = writeln!(out, "    ({}, compute_{}),", key(slot), slot.attribute);
        }
        out.push_str("]\n\nINPUT_FIELDS = [\n");
        for slot in program.inputs() {
            let _ = writeln!(out, "    {},", key(slot));
        }
        out.push_str("]\n");

        if self.record_mode() {
            out.push_str("\nFIELD_IDS = {\n");
            for slot in &program.slots {
                let _ = writeln!(
                    out,
                    "    {}: {},",
                    py_string(&slot.attribute),
                    py_string(slot.field_id.as_str())
                );
            }
            out.push_str("}\n");
        }
    }

    fn write_evaluate(&self, out: &mut String) {
        if self.record_mode() {
            out.push_str(
                r###"

def evaluate(record):
    """Compute every formula field of `record` in place and return it."""
    for name in INPUT_FIELDS:
        setattr(record, name, _load(getattr(record, name)))
    for name, compute in EVALUATION_ORDER:
        setattr(record, name, compute(record))
    return record
"###,
            );
        } else {
            out.push_str(
                r###"

def evaluate(values):
    """Return a copy of `values` with every formula field computed."""
    values = {key: _load(value) for key, value in values.items()}
    for key, compute in EVALUATION_ORDER:
        values[key] = compute(values)
    return values
"###,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_every_function_has_a_helper() {
        let missing: Vec<&str> = registry()
            .iter()
            .map(|def| def.name)
            .filter(|name| !matches!(*name, "IF" | "SWITCH"))
            .filter(|name| helper_source(name).is_none())
            .collect();
        assert_eq!(missing, Vec::<&str>::new());
    }

    #[test]
    fn test_helpers_define_expected_names() {
        for def in registry().iter() {
            if let Some(source) = helper_source(def.name) {
                let signature = format!("def _fn_{}(", def.name.to_lowercase());
                assert!(source.contains(&signature), "{} helper is misnamed", def.name);
            }
        }
    }

    #[test]
    fn test_literals() {
        assert_eq!(py_number(3.0), "3.0");
        assert_eq!(py_number(-0.5), "-0.5");
        assert_eq!(py_number(0.1), "0.1");
        assert_eq!(py_number(1e20), "1e20");
        assert_eq!(py_string("say \"hi\"\n"), r#""say \"hi\"\n""#);
        assert_eq!(py_string("a\\b"), r#""a\\b""#);
        assert_eq!(py_value(&Value::Blank), "None");
        assert_eq!(py_value(&Value::Bool(true)), "True");
    }
}
