//! Named filter registry and the built-in filters.
//!
//! Filters are plain functions `(input, ...args) -> output` registered under
//! a string name. The compiler resolves filter names at compile time, so a
//! [`CompiledExpression`](crate::compiler::CompiledExpression) keeps working
//! even if the registry entry is replaced afterwards.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use regex::Regex;

use crate::compiler::EvalError;
use crate::value::{ArrayRef, ObjectRef, Value};

/// A filter instance: called positionally with the piped value first, then
/// the pipe arguments left to right.
pub type FilterFn = Rc<dyn Fn(&[Value]) -> Result<Value, EvalError>>;

/// A deferred filter constructor, as used by the bulk registration form.
pub type FilterFactory = Box<dyn FnOnce() -> FilterFn>;

/// Key-to-function map of named filters.
///
/// # Examples
///
/// ```
/// use std::rc::Rc;
/// use fennel::filter::{FilterFn, FilterRegistry};
/// use fennel::value::Value;
///
/// let registry = FilterRegistry::new();
/// registry.register("double", || {
///     Rc::new(|args: &[Value]| match args.first() {
///         Some(Value::Integer(n)) => Ok(Value::Integer(n * 2)),
///         _ => Ok(Value::Undefined),
///     }) as FilterFn
/// });
/// assert!(registry.lookup("double").is_some());
/// ```
pub struct FilterRegistry {
    filters: RefCell<HashMap<String, FilterFn>>,
}

impl FilterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        FilterRegistry {
            filters: RefCell::new(HashMap::new()),
        }
    }

    /// Creates a registry pre-loaded with the built-in filters: `filter`,
    /// `uppercase`, `lowercase`, and `matches`.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register("filter", filter_filter);
        registry.register("uppercase", uppercase_filter);
        registry.register("lowercase", lowercase_filter);
        registry.register("matches", matches_filter);
        registry
    }

    /// Registers a filter under `name`. The factory runs once, immediately;
    /// the produced instance is stored and returned.
    pub fn register(&self, name: &str, factory: impl FnOnce() -> FilterFn) -> FilterFn {
        let filter = factory();
        self.filters
            .borrow_mut()
            .insert(name.to_string(), filter.clone());
        filter
    }

    /// Bulk registration from a name-to-factory map. Returns the produced
    /// instances in no particular order.
    pub fn register_map(&self, factories: HashMap<String, FilterFactory>) -> Vec<FilterFn> {
        factories
            .into_iter()
            .map(|(name, factory)| self.register(&name, factory))
            .collect()
    }

    pub fn lookup(&self, name: &str) -> Option<FilterFn> {
        self.filters.borrow().get(name).cloned()
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// String form of a value as used by the substring comparator.
fn comparison_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Integer(n) => n.to_string(),
        Value::Float(n) => n.to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Undefined => "undefined".to_string(),
        other => format!("{:?}", other),
    }
}

type Comparator = Rc<dyn Fn(&Value, &Value) -> Result<bool, EvalError>>;

/// The `filter` filter: keeps the array elements matching a predicate
/// function, a primitive pattern, or a pattern object.
///
/// Pattern objects match structurally against each element; a `$` key
/// matches against any property at that level, and a string pattern with a
/// leading `!` negates the rest of the pattern. The optional third argument
/// selects the comparator: `true` for deep equality, a function for custom
/// comparison, anything else for the default case-insensitive substring
/// match.
fn filter_filter() -> FilterFn {
    Rc::new(|args: &[Value]| {
        let input = args.first().cloned().unwrap_or(Value::Undefined);
        let Value::Array(array) = &input else {
            // Not an array: pass through untouched
            return Ok(input);
        };

        let expr = args.get(1).cloned().unwrap_or(Value::Undefined);
        let predicate = match &expr {
            Value::Function(f) => {
                let f = f.clone();
                let mut kept = Vec::new();
                for item in array.to_vec() {
                    if f.call(&Value::Undefined, &[item.clone()])?.is_truthy() {
                        kept.push(item);
                    }
                }
                return Ok(Value::Array(ArrayRef::from_vec(kept)));
            }
            Value::String(_)
            | Value::Integer(_)
            | Value::Float(_)
            | Value::Boolean(_)
            | Value::Object(_)
            | Value::Null => create_predicate(expr.clone(), args.get(2).cloned()),
            _ => return Ok(input),
        };

        let mut kept = Vec::new();
        for item in array.to_vec() {
            if predicate(&item)? {
                kept.push(item);
            }
        }
        Ok(Value::Array(ArrayRef::from_vec(kept)))
    })
}

type Predicate = Box<dyn Fn(&Value) -> Result<bool, EvalError>>;

fn create_predicate(expr: Value, comparator: Option<Value>) -> Predicate {
    let should_match_primitives = match &expr {
        Value::Object(obj) => obj.has_own("$"),
        _ => false,
    };

    let comparator: Comparator = match comparator {
        Some(Value::Boolean(true)) => Rc::new(|actual: &Value, expected: &Value| {
            Ok(actual.deep_eq(expected))
        }),
        Some(Value::Function(f)) => {
            Rc::new(move |actual: &Value, expected: &Value| {
                Ok(f.call(&Value::Undefined, &[actual.clone(), expected.clone()])?
                    .is_truthy())
            })
        }
        _ => Rc::new(|actual: &Value, expected: &Value| {
            if actual.is_undefined() {
                return Ok(false);
            }
            if matches!(actual, Value::Null) || matches!(expected, Value::Null) {
                return Ok(actual.strict_eq(expected));
            }
            let actual = comparison_string(actual).to_lowercase();
            let expected = comparison_string(expected).to_lowercase();
            Ok(actual.contains(&expected))
        }),
    };

    Box::new(move |item: &Value| {
        if should_match_primitives && !matches!(item, Value::Object(_)) {
            let Value::Object(pattern) = &expr else {
                unreachable!()
            };
            return deep_compare(item, &pattern.get_own("$"), &comparator, false, false);
        }
        deep_compare(item, &expr, &comparator, true, false)
    })
}

fn deep_compare(
    actual: &Value,
    expected: &Value,
    comparator: &Comparator,
    match_any_property: bool,
    in_wildcard: bool,
) -> Result<bool, EvalError> {
    if let Value::String(s) = expected {
        if let Some(rest) = s.strip_prefix('!') {
            let inverted = deep_compare(
                actual,
                &Value::String(rest.to_string()),
                comparator,
                match_any_property,
                false,
            )?;
            return Ok(!inverted);
        }
    }

    if let Value::Array(items) = actual {
        for item in items.to_vec() {
            if deep_compare(&item, expected, comparator, match_any_property, false)? {
                return Ok(true);
            }
        }
        return Ok(false);
    }

    if let Value::Object(actual_obj) = actual {
        if let Value::Object(expected_obj) = expected {
            if !in_wildcard {
                return object_pattern_matches(actual, actual_obj, expected_obj, comparator);
            }
        }
        if match_any_property {
            for (_, value) in actual_obj.entries() {
                if deep_compare(&value, expected, comparator, match_any_property, false)? {
                    return Ok(true);
                }
            }
            return Ok(false);
        }
        return comparator(actual, expected);
    }

    comparator(actual, expected)
}

fn object_pattern_matches(
    actual: &Value,
    actual_obj: &ObjectRef,
    expected_obj: &ObjectRef,
    comparator: &Comparator,
) -> Result<bool, EvalError> {
    for (key, expected_val) in expected_obj.entries() {
        if expected_val.is_undefined() {
            continue;
        }
        let is_wildcard = key == "$";
        let actual_val = if is_wildcard {
            actual.clone()
        } else {
            actual_obj.get_own(&key)
        };
        if !deep_compare(&actual_val, &expected_val, comparator, is_wildcard, is_wildcard)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Uppercases string input; everything else passes through unchanged.
fn uppercase_filter() -> FilterFn {
    Rc::new(|args: &[Value]| {
        let input = args.first().cloned().unwrap_or(Value::Undefined);
        match input {
            Value::String(s) => Ok(Value::String(s.to_uppercase())),
            other => Ok(other),
        }
    })
}

/// Lowercases string input; everything else passes through unchanged.
fn lowercase_filter() -> FilterFn {
    Rc::new(|args: &[Value]| {
        let input = args.first().cloned().unwrap_or(Value::Undefined);
        match input {
            Value::String(s) => Ok(Value::String(s.to_lowercase())),
            other => Ok(other),
        }
    })
}

/// `"text" | matches:'pattern'` - true when the string input matches the
/// regex pattern.
fn matches_filter() -> FilterFn {
    Rc::new(|args: &[Value]| {
        let (Some(Value::String(input)), Some(Value::String(pattern))) =
            (args.first(), args.get(1))
        else {
            return Ok(Value::Boolean(false));
        };
        let re = Regex::new(pattern)
            .map_err(|e| EvalError::Type(format!("invalid regex: {e}")))?;
        Ok(Value::Boolean(re.is_match(input)))
    })
}
