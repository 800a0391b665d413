//! Built-in Airtable functions
//!
//! The registry is the single list of functions the transpiler accepts. Each
//! entry carries its arity bounds and the in-process implementation; the
//! Python backend keys its helper sources by the same names.

pub mod array;
pub mod date;
pub mod logical;
pub mod math;
pub mod text;

use crate::error::{FormulaError, FormulaResult};
use crate::value::{ErrorValue, Value, ValueResult};
use ahash::AHashMap;
use chrono::{NaiveDateTime, Utc};
use once_cell::sync::Lazy;

/// Evaluation environment shared by all function calls of one evaluation
#[derive(Debug, Clone, Copy)]
pub struct EvalContext {
    /// Instant `NOW()` and `TODAY()` read (UTC)
    pub now: NaiveDateTime,
}

impl EvalContext {
    /// Context reading the system clock
    pub fn new() -> Self {
        Self {
            now: Utc::now().naive_utc(),
        }
    }

    /// Context with a fixed clock (for testing)
    pub fn at(now: NaiveDateTime) -> Self {
        Self { now }
    }
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Function implementation signature
pub type FunctionImpl = fn(&[Value], &EvalContext) -> ValueResult<Value>;

/// Function category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Logical,
    Text,
    Numeric,
    Date,
    Array,
}

/// Function definition
#[derive(Debug)]
pub struct FunctionDef {
    /// Function name (uppercase)
    pub name: &'static str,
    /// Minimum arguments
    pub min_args: usize,
    /// Maximum arguments (None = unlimited)
    pub max_args: Option<usize>,
    /// Implementation
    pub implementation: FunctionImpl,
    /// Return the first error argument without calling the implementation
    pub propagate_errors: bool,
    /// Reads the clock
    pub volatile: bool,
    pub category: Category,
}

impl FunctionDef {
    /// Check an argument count against the arity bounds
    pub fn check_arity(&self, actual: usize) -> FormulaResult<()> {
        let within = actual >= self.min_args && self.max_args.map_or(true, |max| actual <= max);
        if within {
            return Ok(());
        }
        let expected = match self.max_args {
            Some(max) if max == self.min_args => max.to_string(),
            Some(max) => format!("{} to {}", self.min_args, max),
            None => format!("at least {}", self.min_args),
        };
        Err(FormulaError::ArgumentCount {
            function: self.name.to_string(),
            expected,
            actual,
        })
    }

    /// Call the function on evaluated arguments
    pub fn call(&self, args: &[Value], ctx: &EvalContext) -> Value {
        if self.propagate_errors {
            if let Some(err) = args.iter().find(|v| v.is_error()) {
                return err.clone();
            }
        }
        (self.implementation)(args, ctx).into()
    }
}

type Entry = (&'static str, usize, Option<usize>, FunctionImpl);

/// Function registry
pub struct FunctionRegistry {
    functions: AHashMap<&'static str, FunctionDef>,
    /// Names in registration order
    order: Vec<&'static str>,
}

static REGISTRY: Lazy<FunctionRegistry> = Lazy::new(FunctionRegistry::new);

/// The built-in function registry
pub fn registry() -> &'static FunctionRegistry {
    &REGISTRY
}

impl FunctionRegistry {
    /// Create a registry with all built-in functions
    pub fn new() -> Self {
        let mut registry = Self {
            functions: AHashMap::new(),
            order: Vec::new(),
        };

        registry.register_logical_functions();
        registry.register_text_functions();
        registry.register_numeric_functions();
        registry.register_date_functions();
        registry.register_array_functions();

        registry
    }

    /// Look up a function by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name.to_uppercase().as_str())
    }

    /// Look up a function, failing with [`FormulaError::UnsupportedFunction`]
    pub fn require(&self, name: &str) -> FormulaResult<&FunctionDef> {
        self.get(name).ok_or_else(|| FormulaError::UnsupportedFunction {
            name: name.to_uppercase(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All definitions in registration order
    pub fn iter(&self) -> impl Iterator<Item = &FunctionDef> {
        self.order.iter().filter_map(|name| self.functions.get(name))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Register a function
    pub fn register(&mut self, def: FunctionDef) {
        let name = def.name;
        if self.functions.insert(name, def).is_none() {
            self.order.push(name);
        }
    }

    fn register_all(&mut self, category: Category, entries: &[Entry]) {
        for &(name, min_args, max_args, implementation) in entries {
            self.register(FunctionDef {
                name,
                min_args,
                max_args,
                implementation,
                propagate_errors: true,
                volatile: false,
                category,
            });
        }
    }

    fn register_logical_functions(&mut self) {
        self.register_all(
            Category::Logical,
            &[
                ("AND", 1, None, logical::fn_and),
                ("OR", 1, None, logical::fn_or),
                ("XOR", 1, None, logical::fn_xor),
                ("NOT", 1, Some(1), logical::fn_not),
                ("ERROR", 0, Some(0), logical::fn_error),
                ("BLANK", 0, Some(0), logical::fn_blank),
                ("TRUE", 0, Some(0), logical::fn_true),
                ("FALSE", 0, Some(0), logical::fn_false),
            ],
        );

        // Branching and error inspection see error arguments as values
        let lazy: [Entry; 3] = [
            ("IF", 2, Some(3), logical::fn_if),
            ("SWITCH", 3, None, logical::fn_switch),
            ("ISERROR", 1, Some(1), logical::fn_iserror),
        ];
        for (name, min_args, max_args, implementation) in lazy {
            self.register(FunctionDef {
                name,
                min_args,
                max_args,
                implementation,
                propagate_errors: false,
                volatile: false,
                category: Category::Logical,
            });
        }
    }

    fn register_text_functions(&mut self) {
        self.register_all(
            Category::Text,
            &[
                ("CONCATENATE", 1, None, text::fn_concatenate),
                ("LEN", 1, Some(1), text::fn_len),
                ("LEFT", 2, Some(2), text::fn_left),
                ("RIGHT", 2, Some(2), text::fn_right),
                ("MID", 3, Some(3), text::fn_mid),
                ("UPPER", 1, Some(1), text::fn_upper),
                ("LOWER", 1, Some(1), text::fn_lower),
                ("TRIM", 1, Some(1), text::fn_trim),
                ("FIND", 2, Some(3), text::fn_find),
                ("SEARCH", 2, Some(3), text::fn_search),
                ("SUBSTITUTE", 3, Some(4), text::fn_substitute),
                ("REPLACE", 4, Some(4), text::fn_replace),
                ("REPT", 2, Some(2), text::fn_rept),
                ("REGEX_MATCH", 2, Some(2), text::fn_regex_match),
                ("REGEX_EXTRACT", 2, Some(2), text::fn_regex_extract),
                ("REGEX_REPLACE", 3, Some(3), text::fn_regex_replace),
            ],
        );
    }

    fn register_numeric_functions(&mut self) {
        self.register_all(
            Category::Numeric,
            &[
                ("ABS", 1, Some(1), math::fn_abs),
                ("ROUND", 2, Some(2), math::fn_round),
                ("ROUNDUP", 2, Some(2), math::fn_roundup),
                ("ROUNDDOWN", 2, Some(2), math::fn_rounddown),
                ("CEILING", 1, Some(2), math::fn_ceiling),
                ("FLOOR", 1, Some(2), math::fn_floor),
                ("INT", 1, Some(1), math::fn_int),
                ("MOD", 2, Some(2), math::fn_mod),
                ("POWER", 2, Some(2), math::fn_power),
                ("SQRT", 1, Some(1), math::fn_sqrt),
                ("EXP", 1, Some(1), math::fn_exp),
                ("LOG", 1, Some(2), math::fn_log),
                ("MAX", 1, None, math::fn_max),
                ("MIN", 1, None, math::fn_min),
                ("SUM", 1, None, math::fn_sum),
                ("AVERAGE", 1, None, math::fn_average),
                ("COUNT", 1, None, math::fn_count),
                ("COUNTA", 1, None, math::fn_counta),
                ("COUNTALL", 1, None, math::fn_countall),
                ("VALUE", 1, Some(1), math::fn_value),
            ],
        );
    }

    fn register_date_functions(&mut self) {
        self.register_all(
            Category::Date,
            &[
                ("YEAR", 1, Some(1), date::fn_year),
                ("MONTH", 1, Some(1), date::fn_month),
                ("DAY", 1, Some(1), date::fn_day),
                ("HOUR", 1, Some(1), date::fn_hour),
                ("MINUTE", 1, Some(1), date::fn_minute),
                ("SECOND", 1, Some(1), date::fn_second),
                ("WEEKDAY", 1, Some(1), date::fn_weekday),
                ("DATEADD", 3, Some(3), date::fn_dateadd),
                ("DATETIME_DIFF", 2, Some(3), date::fn_datetime_diff),
                ("IS_BEFORE", 2, Some(2), date::fn_is_before),
                ("IS_AFTER", 2, Some(2), date::fn_is_after),
                ("IS_SAME", 2, Some(3), date::fn_is_same),
                ("DATESTR", 1, Some(1), date::fn_datestr),
            ],
        );

        let clock: [(&'static str, FunctionImpl); 2] =
            [("TODAY", date::fn_today), ("NOW", date::fn_now)];
        for (name, implementation) in clock {
            self.register(FunctionDef {
                name,
                min_args: 0,
                max_args: Some(0),
                implementation,
                propagate_errors: true,
                volatile: true,
                category: Category::Date,
            });
        }
    }

    fn register_array_functions(&mut self) {
        self.register_all(
            Category::Array,
            &[
                ("ARRAYJOIN", 1, Some(2), array::fn_arrayjoin),
                ("ARRAYUNIQUE", 1, Some(1), array::fn_arrayunique),
                ("ARRAYCOMPACT", 1, Some(1), array::fn_arraycompact),
                ("ARRAYFLATTEN", 1, Some(1), array::fn_arrayflatten),
            ],
        );
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// === Argument helpers shared by the implementations ===

/// Argument `i` (blank when absent)
pub(crate) fn arg(args: &[Value], i: usize) -> &Value {
    static BLANK: Value = Value::Blank;
    args.get(i).unwrap_or(&BLANK)
}

/// Optional argument; an explicit blank counts as omitted
pub(crate) fn optional(args: &[Value], i: usize) -> Option<&Value> {
    args.get(i).filter(|v| !v.is_blank())
}

pub(crate) fn text_arg(args: &[Value], i: usize) -> ValueResult<String> {
    arg(args, i).to_text()
}

pub(crate) fn number_arg(args: &[Value], i: usize) -> ValueResult<f64> {
    arg(args, i).to_number()
}

/// Largest magnitude accepted where a whole number is expected
pub(crate) const MAX_WHOLE: f64 = 1e15;

/// Whole number truncated toward zero; non-finite or huge values are errors
pub(crate) fn whole(n: f64) -> ValueResult<i64> {
    if n.is_finite() && n.abs() <= MAX_WHOLE {
        Ok(n.trunc() as i64)
    } else {
        Err(ErrorValue::Value)
    }
}

/// Integer argument, truncated toward zero
pub(crate) fn int_arg(args: &[Value], i: usize) -> ValueResult<i64> {
    whole(number_arg(args, i)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let registry = registry();
        assert!(registry.contains("round"));
        assert!(registry.contains("DATETIME_DIFF"));
        assert!(!registry.contains("VLOOKUP"));
        assert!(matches!(
            registry.require("vlookup"),
            Err(FormulaError::UnsupportedFunction { name }) if name == "VLOOKUP"
        ));
    }

    #[test]
    fn test_registration_order_is_stable() {
        let names: Vec<&str> = registry().iter().map(|d| d.name).take(3).collect();
        assert_eq!(names, vec!["AND", "OR", "XOR"]);
        assert_eq!(registry().iter().count(), registry().len());
    }

    #[test]
    fn test_arity() {
        let round = registry().get("ROUND").unwrap();
        assert!(round.check_arity(2).is_ok());
        match round.check_arity(1) {
            Err(FormulaError::ArgumentCount { expected, actual, .. }) => {
                assert_eq!(expected, "2");
                assert_eq!(actual, 1);
            }
            other => panic!("Expected ArgumentCount, got {:?}", other),
        }
        let err = registry().get("IF").unwrap().check_arity(4).unwrap_err();
        assert!(err.to_string().contains("expected 2 to 3"));
        let err = registry().get("SUM").unwrap().check_arity(0).unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn test_whole_numbers_are_bounded() {
        assert_eq!(whole(2.9), Ok(2));
        assert_eq!(whole(-2.9), Ok(-2));
        assert_eq!(whole(MAX_WHOLE), Ok(1_000_000_000_000_000));
        assert_eq!(whole(1e19), Err(ErrorValue::Value));
        assert_eq!(whole(f64::INFINITY), Err(ErrorValue::Value));
        assert_eq!(whole(f64::NAN), Err(ErrorValue::Value));
        assert_eq!(
            int_arg(&[Value::Number(-1e300)], 0),
            Err(ErrorValue::Value)
        );
    }

    #[test]
    fn test_call_propagates_errors() {
        let ctx = EvalContext::new();
        let len = registry().get("LEN").unwrap();
        let err = Value::Error(ErrorValue::DivZero);
        assert_eq!(len.call(&[err.clone()], &ctx), err);
        let iserror = registry().get("ISERROR").unwrap();
        assert_eq!(iserror.call(&[err], &ctx), Value::Bool(true));
    }
}
