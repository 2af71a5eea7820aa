// tests/expression_tests.rs

use std::rc::Rc;

use fennel::compiler::{Compiler, EvalError};
use fennel::filter::{FilterFn, FilterRegistry};
use fennel::value::{ArrayRef, FunctionRef, ObjectRef, Value};

fn eval(source: &str) -> Result<Value, EvalError> {
    fennel::parse(source).unwrap().eval(&ObjectRef::new(), None)
}

fn eval_in(source: &str, context: &ObjectRef) -> Result<Value, EvalError> {
    fennel::parse(source).unwrap().eval(context, None)
}

fn context_from(json: serde_json::Value) -> ObjectRef {
    fennel::from_json(&json).into_object().expect("object context")
}

// ============================================================================
// Literals
// ============================================================================

#[test]
fn test_number_literals() {
    assert_eq!(eval("42").unwrap(), Value::Integer(42));
    assert_eq!(eval("4.2").unwrap(), Value::Float(4.2));
    assert_eq!(eval("11e-2").unwrap(), Value::Float(0.11));
    assert_eq!(eval(".5").unwrap(), Value::Float(0.5));
}

#[test]
fn test_string_literal_with_unicode_escape() {
    assert_eq!(eval(r#""\u00A0""#).unwrap(), Value::String("\u{00A0}".into()));
}

#[test]
fn test_array_and_object_literals() {
    let expected = fennel::from_json(&serde_json::json!({"a": 1, "b": [2, 3]}));
    assert_eq!(eval("{a:1,b:[2,3]}").unwrap(), expected);
}

#[test]
fn test_array_literals_are_fresh_per_eval() {
    let compiled = fennel::parse("[1, 2]").unwrap();
    let context = ObjectRef::new();
    let first = compiled.eval(&context, None).unwrap();
    let second = compiled.eval(&context, None).unwrap();
    assert!(!first.strict_eq(&second));
    assert_eq!(first, second);
}

#[test]
fn test_keywords() {
    assert_eq!(eval("null").unwrap(), Value::Null);
    assert_eq!(eval("true").unwrap(), Value::Boolean(true));
    let context = ObjectRef::new();
    let this = eval_in("this", &context).unwrap().into_object().unwrap();
    assert!(this.ptr_eq(&context));
}

// ============================================================================
// Member access
// ============================================================================

#[test]
fn test_missing_path_is_undefined_not_an_error() {
    assert_eq!(eval("a.b").unwrap(), Value::Undefined);
    assert_eq!(eval("a.b.c.d").unwrap(), Value::Undefined);
    let context = context_from(serde_json::json!({"a": null}));
    assert_eq!(eval_in("a.b", &context).unwrap(), Value::Undefined);
}

#[test]
fn test_nested_and_computed_access() {
    let context = context_from(serde_json::json!({
        "user": {"name": "ada"},
        "items": [10, 20, 30],
        "key": "name"
    }));
    assert_eq!(
        eval_in("user.name", &context).unwrap(),
        Value::String("ada".into())
    );
    assert_eq!(eval_in("items[1]", &context).unwrap(), Value::Integer(20));
    assert_eq!(
        eval_in("user[key]", &context).unwrap(),
        Value::String("ada".into())
    );
    assert_eq!(eval_in("items.length", &context).unwrap(), Value::Integer(3));
    assert_eq!(eval_in("items[9]", &context).unwrap(), Value::Undefined);
}

#[test]
fn test_locals_shadow_context_at_matching_keys_only() {
    let compiled = fennel::parse("a").unwrap();
    let context = context_from(serde_json::json!({"a": 1}));

    let locals = context_from(serde_json::json!({"a": 2}));
    assert_eq!(
        compiled.eval(&context, Some(&locals)).unwrap(),
        Value::Integer(2)
    );

    let unrelated = context_from(serde_json::json!({"b": 2}));
    assert_eq!(
        compiled.eval(&context, Some(&unrelated)).unwrap(),
        Value::Integer(1)
    );
}

// ============================================================================
// Assignment
// ============================================================================

#[test]
fn test_assignment_writes_to_context() {
    let context = ObjectRef::new();
    assert_eq!(eval_in("a = 3", &context).unwrap(), Value::Integer(3));
    assert_eq!(context.get("a"), Value::Integer(3));
}

#[test]
fn test_assignment_materializes_missing_intermediates() {
    let context = ObjectRef::new();
    eval_in("a.b.c = 1", &context).unwrap();
    let expected = fennel::from_json(&serde_json::json!({"a": {"b": {"c": 1}}}));
    assert_eq!(Value::Object(context), expected);
}

#[test]
fn test_assignment_into_array_index() {
    let context = context_from(serde_json::json!({"items": [1, 2, 3]}));
    eval_in("items[1] = 9", &context).unwrap();
    assert_eq!(
        context.get("items"),
        fennel::from_json(&serde_json::json!([1, 9, 3]))
    );
}

#[test]
fn test_assignment_prefers_locals_when_they_own_the_key() {
    let compiled = fennel::parse("a = 5").unwrap();
    let context = context_from(serde_json::json!({"a": 1}));
    let locals = context_from(serde_json::json!({"a": 2}));
    compiled.eval(&context, Some(&locals)).unwrap();
    assert_eq!(locals.get("a"), Value::Integer(5));
    assert_eq!(context.get("a"), Value::Integer(1));
}

#[test]
fn test_statement_sequence_returns_last_value() {
    let context = ObjectRef::new();
    assert_eq!(
        eval_in("a = 1; b = 2; a + b", &context).unwrap(),
        Value::Integer(3)
    );
    assert_eq!(eval("").unwrap(), Value::Undefined);
}

// ============================================================================
// Operators
// ============================================================================

#[test]
fn test_arithmetic() {
    assert_eq!(eval("2 + 3 * 4").unwrap(), Value::Integer(14));
    assert_eq!(eval("3 / 2").unwrap(), Value::Float(1.5));
    assert_eq!(eval("4 / 2").unwrap(), Value::Integer(2));
    assert_eq!(eval("7 % 3").unwrap(), Value::Integer(1));
    assert_eq!(eval("2.5 + 1.5").unwrap(), Value::Integer(4));
}

#[test]
fn test_undefined_operands_substitute_zero_for_plus_and_minus() {
    assert_eq!(eval("a + 1").unwrap(), Value::Integer(1));
    assert_eq!(eval("1 - a").unwrap(), Value::Integer(1));
    assert_eq!(eval("-a").unwrap(), Value::Integer(0));
    assert_eq!(eval("+a").unwrap(), Value::Integer(0));
}

#[test]
fn test_multiplication_with_undefined_is_nan() {
    match eval("a * 2").unwrap() {
        Value::Float(n) => assert!(n.is_nan()),
        other => panic!("expected NaN, got {:?}", other),
    }
}

#[test]
fn test_string_concatenation() {
    assert_eq!(eval("'a' + 'b'").unwrap(), Value::String("ab".into()));
    assert_eq!(eval("'n=' + 1").unwrap(), Value::String("n=1".into()));
}

#[test]
fn test_equality() {
    assert_eq!(eval("1 == 1.0").unwrap(), Value::Boolean(true));
    assert_eq!(eval("1 === 1.0").unwrap(), Value::Boolean(true));
    assert_eq!(eval("1 == '1'").unwrap(), Value::Boolean(false));
    assert_eq!(eval("[1,2] == [1,2]").unwrap(), Value::Boolean(true));
    assert_eq!(eval("[1,2] === [1,2]").unwrap(), Value::Boolean(false));
    assert_eq!(eval("null == a.b").unwrap(), Value::Boolean(false));
}

#[test]
fn test_integer_overflow_widens_to_float() {
    // i64::MIN built up from literals; every branch must widen, not panic
    assert_eq!(
        eval("(0 - 9223372036854775807 - 1) / (0 - 1)").unwrap(),
        Value::Float(-(i64::MIN as f64))
    );
    assert_eq!(
        eval("(0 - 9223372036854775807 - 1) % (0 - 1)").unwrap(),
        Value::Float(0.0)
    );
    assert_eq!(
        eval("-(0 - 9223372036854775807 - 1)").unwrap(),
        Value::Float(-(i64::MIN as f64))
    );
    assert_eq!(
        eval("9223372036854775807 + 1").unwrap(),
        Value::Float(i64::MAX as f64 + 1.0)
    );
}

#[test]
fn test_relational() {
    assert_eq!(eval("1 < 2").unwrap(), Value::Boolean(true));
    assert_eq!(eval("2 <= 2").unwrap(), Value::Boolean(true));
    assert_eq!(eval("'abc' < 'abd'").unwrap(), Value::Boolean(true));
    assert_eq!(eval("(0/0) < 1").unwrap(), Value::Boolean(false));
}

#[test]
fn test_logical_operators_return_operand_values() {
    assert_eq!(eval("0 || 'fallback'").unwrap(), Value::String("fallback".into()));
    assert_eq!(eval("1 && 2").unwrap(), Value::Integer(2));
    assert_eq!(eval("0 && 2").unwrap(), Value::Integer(0));
    assert_eq!(eval("!0").unwrap(), Value::Boolean(true));
}

#[test]
fn test_logical_short_circuit_skips_right_side_effects() {
    let context = ObjectRef::new();
    eval_in("false && (a = 1); true || (b = 2)", &context).unwrap();
    assert_eq!(context.get("a"), Value::Undefined);
    assert_eq!(context.get("b"), Value::Undefined);
}

#[test]
fn test_ternary() {
    assert_eq!(eval("1 < 2 ? 'yes' : 'no'").unwrap(), Value::String("yes".into()));
    let context = ObjectRef::new();
    eval_in("false ? (a = 1) : (b = 2)", &context).unwrap();
    assert_eq!(context.get("a"), Value::Undefined);
    assert_eq!(context.get("b"), Value::Integer(2));
}

// ============================================================================
// Calls
// ============================================================================

#[test]
fn test_bare_call_binds_this_to_the_supplying_bag() {
    let context = ObjectRef::new();
    context.set("tag", Value::String("ctx".into()));
    context.set(
        "whoami",
        Value::Function(FunctionRef::new(|this, _args| {
            let Value::Object(obj) = this else {
                return Ok(Value::Undefined);
            };
            Ok(obj.get("tag"))
        })),
    );
    assert_eq!(eval_in("whoami()", &context).unwrap(), Value::String("ctx".into()));
}

#[test]
fn test_member_call_binds_receiver_as_this() {
    let context = ObjectRef::new();
    let receiver = ObjectRef::new();
    receiver.set("n", Value::Integer(20));
    receiver.set(
        "double",
        Value::Function(FunctionRef::new(|this, _args| {
            let Value::Object(obj) = this else {
                return Ok(Value::Undefined);
            };
            match obj.get("n") {
                Value::Integer(n) => Ok(Value::Integer(n * 2)),
                _ => Ok(Value::Undefined),
            }
        })),
    );
    context.set("counter", Value::Object(receiver));
    assert_eq!(eval_in("counter.double()", &context).unwrap(), Value::Integer(40));
}

#[test]
fn test_call_arguments_are_evaluated() {
    let context = ObjectRef::new();
    context.set(
        "add",
        Value::Function(FunctionRef::new(|_this, args| {
            let (Some(Value::Integer(a)), Some(Value::Integer(b))) = (args.first(), args.get(1))
            else {
                return Ok(Value::Undefined);
            };
            Ok(Value::Integer(a + b))
        })),
    );
    context.set("n", Value::Integer(2));
    assert_eq!(eval_in("add(n + 1, 4)", &context).unwrap(), Value::Integer(7));
}

#[test]
fn test_calling_a_non_function_fails() {
    let context = context_from(serde_json::json!({"a": 1}));
    assert!(matches!(
        eval_in("a()", &context),
        Err(EvalError::NotCallable(_))
    ));
}

// ============================================================================
// Sandbox
// ============================================================================

#[test]
fn test_denied_member_names() {
    let context = context_from(serde_json::json!({"x": {}}));
    for source in ["x.constructor", "x.__proto__", "x['constructor']"] {
        let err = eval_in(source, &context).unwrap_err();
        assert!(err.is_security(), "{source} should be denied, got {err}");
    }
}

#[test]
fn test_denied_identifier() {
    assert!(eval("__proto__").unwrap_err().is_security());
}

#[test]
fn test_sandbox_policy_rejects_classified_values() {
    struct NoArrays;
    impl fennel::SandboxPolicy for NoArrays {
        fn has_dom_shape(&self, value: &Value) -> bool {
            matches!(value, Value::Array(_))
        }
    }

    let compiler = Compiler::with_sandbox(
        Rc::new(FilterRegistry::with_builtins()),
        Rc::new(NoArrays),
    );
    let context = context_from(serde_json::json!({"bad": [1]}));
    let err = compiler
        .parse("bad")
        .unwrap()
        .eval(&context, None)
        .unwrap_err();
    assert!(err.is_security());
}

// ============================================================================
// Filters
// ============================================================================

#[test]
fn test_filter_chain_with_args() {
    let registry = Rc::new(FilterRegistry::new());
    registry.register("repeat", || {
        Rc::new(|args: &[Value]| {
            let (Some(Value::String(s)), Some(Value::Integer(n))) = (args.first(), args.get(1))
            else {
                return Ok(Value::Undefined);
            };
            Ok(Value::String(s.repeat(*n as usize)))
        }) as FilterFn
    });
    registry.register("upcase", || {
        Rc::new(|args: &[Value]| match args.first() {
            Some(Value::String(s)) => Ok(Value::String(s.to_uppercase())),
            _ => Ok(Value::Undefined),
        }) as FilterFn
    });

    let compiler = Compiler::new(registry);
    let result = compiler
        .parse("'x' | repeat:2 | upcase")
        .unwrap()
        .eval(&ObjectRef::new(), None)
        .unwrap();
    assert_eq!(result, Value::String("XX".into()));
}

#[test]
fn test_unknown_filter_is_a_parse_error() {
    assert!(matches!(
        fennel::parse("a | nope"),
        Err(fennel::ParseError::UnknownFilter(name)) if name == "nope"
    ));
}

#[test]
fn test_compiled_expression_survives_registry_replacement() {
    let registry = Rc::new(FilterRegistry::new());
    registry.register("tag", || {
        Rc::new(|_: &[Value]| Ok(Value::String("old".into()))) as FilterFn
    });
    let compiler = Compiler::new(registry.clone());
    let compiled = compiler.parse("1 | tag").unwrap();

    registry.register("tag", || {
        Rc::new(|_: &[Value]| Ok(Value::String("new".into()))) as FilterFn
    });
    assert_eq!(
        compiled.eval(&ObjectRef::new(), None).unwrap(),
        Value::String("old".into())
    );
}

// ============================================================================
// Shared identity
// ============================================================================

#[test]
fn test_nested_object_mutation_is_visible_through_aliases() {
    let shared = ObjectRef::new();
    let context = ObjectRef::new();
    context.set("a", Value::Object(shared.clone()));

    eval_in("a.n = 7", &context).unwrap();
    assert_eq!(shared.get("n"), Value::Integer(7));
}

#[test]
fn test_array_length_after_hole_assignment() {
    let arr = ArrayRef::from_vec(vec![Value::Integer(1)]);
    let context = ObjectRef::new();
    context.set("items", Value::Array(arr.clone()));
    eval_in("items[3] = 9", &context).unwrap();
    assert_eq!(arr.len(), 4);
    assert_eq!(arr.get(1), Value::Undefined);
}
