//! Expression evaluation tests over the public surface.

use pretty_assertions::assert_eq;
use rhcl::{Error, ErrorKind, Evaluator, Scope, Value, evaluate_expr, parse_expr};

fn eval_in(src: &str, scope: &Scope) -> Result<Value, Error> {
    evaluate_expr(&parse_expr(src).unwrap(), scope)
}

fn eval(src: &str) -> Value {
    eval_in(src, &Scope::new()).unwrap()
}

fn int(i: i64) -> Value {
    Value::Int(i.into())
}

fn upper(args: Vec<Value>) -> Result<Value, Error> {
    match args.as_slice() {
        [Value::String(s)] => Ok(Value::String(s.to_uppercase())),
        [other] => Err(Error::type_error(format!(
            "upper() expects a string, got {}",
            other.kind()
        ))),
        _ => Err(Error::arity_error(
            "upper",
            format!("expected 1 argument, got {}", args.len()),
        )),
    }
}

fn sum(args: Vec<Value>) -> Result<Value, Error> {
    let mut total = num_bigint::BigInt::from(0);
    for arg in args {
        match arg {
            Value::Int(i) => total += i,
            other => {
                return Err(Error::type_error(format!(
                    "sum() expects ints, got {}",
                    other.kind()
                )));
            }
        }
    }
    Ok(Value::Int(total))
}

fn fail(_args: Vec<Value>) -> Result<Value, Error> {
    Err(Error::user("boom"))
}

// === Arithmetic and comparison ===

#[test]
fn arithmetic_follows_precedence() {
    assert_eq!(eval("1 + 2 * 3"), int(7));
    assert_eq!(eval("(1 + 2) * 3"), int(9));
}

#[test]
fn integer_division_truncates_toward_zero() {
    assert_eq!(eval("7 / 2"), int(3));
    assert_eq!(eval("-7 / 2"), int(-3));
    assert_eq!(eval("7 % 3"), int(1));
    assert_eq!(eval("-7 % 3"), int(-1));
}

#[test]
fn mixed_numeric_operands_promote_to_float() {
    assert_eq!(eval("1 + 0.5"), Value::Float(1.5));
    assert_eq!(eval("0.5 + 1"), Value::Float(1.5));
    assert_eq!(eval("10 / 4.0"), Value::Float(2.5));
}

#[test]
fn division_by_zero_is_an_error() {
    let err = eval_in("1 / 0", &Scope::new()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Type { .. }));
    assert!(err.span.is_some());
}

#[test]
fn equality_never_crosses_kinds() {
    assert_eq!(eval("1 == 1.0"), Value::Bool(false));
    assert_eq!(eval("1 != 1.0"), Value::Bool(true));
    assert_eq!(eval("null == null"), Value::Bool(true));
    assert_eq!(eval("[1, 2] == [1, 2]"), Value::Bool(true));
    assert_eq!(eval("{a = 1} == {a = 1}"), Value::Bool(true));
}

#[test]
fn strings_order_lexicographically() {
    assert_eq!(eval("\"abc\" < \"abd\""), Value::Bool(true));
    assert_eq!(eval("\"b\" >= \"a\""), Value::Bool(true));
}

#[test]
fn null_operands_fail_comparisons() {
    let err = eval_in("null < 1", &Scope::new()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Type { .. }));
}

#[test]
fn string_addition_points_to_interpolation() {
    let err = eval_in("\"a\" + \"b\"", &Scope::new()).unwrap_err();
    let ErrorKind::Type { message } = &err.kind else {
        panic!("expected a type error, got {err:?}");
    };
    assert!(message.contains("interpolation"));
}

#[test]
fn unary_operators_check_their_operand_kind() {
    assert_eq!(eval("!true"), Value::Bool(false));
    assert_eq!(eval("!!true"), Value::Bool(true));
    assert_eq!(eval("-(3)"), int(-3));
    assert!(eval_in("!1", &Scope::new()).is_err());
    assert!(eval_in("-\"a\"", &Scope::new()).is_err());
}

// === Short-circuit and conditional ===

#[test]
fn short_circuit_suppresses_errors_in_the_skipped_operand() {
    // `1 / 0` and the unbound name would both fail if evaluated.
    assert_eq!(eval("false && 1 / 0 == 0"), Value::Bool(false));
    assert_eq!(eval("true || missing"), Value::Bool(true));
}

#[test]
fn logical_operators_require_bools_when_evaluated() {
    assert!(eval_in("1 && true", &Scope::new()).is_err());
    assert!(eval_in("true && 1", &Scope::new()).is_err());
}

#[test]
fn conditional_evaluates_only_the_selected_branch() {
    assert_eq!(eval("true ? 1 : missing"), int(1));
    assert_eq!(eval("false ? missing : 2"), int(2));
}

#[test]
fn conditional_condition_must_be_bool() {
    let err = eval_in("1 ? 2 : 3", &Scope::new()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Type { .. }));
}

#[test]
fn evaluation_is_deterministic() {
    let expr = parse_expr("[for v in [3, 1, 2]: v * v if v > 1]").unwrap();
    let scope = Scope::new();
    let first = evaluate_expr(&expr, &scope).unwrap();
    let second = evaluate_expr(&expr, &scope).unwrap();
    assert_eq!(first, second);
}

// === Names and scope ===

#[test]
fn unbound_names_raise_name_errors_with_spans() {
    let err = eval_in("nope + 1", &Scope::new()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Name { ref name } if name == "nope"));
    assert_eq!(err.span, Some(rhcl::Span::new(0, 4)));
}

#[test]
fn scope_variables_resolve() {
    let mut scope = Scope::new();
    scope.declare_var("x", int(41));
    assert_eq!(eval_in("x + 1", &scope).unwrap(), int(42));
}

// === Templates ===

#[test]
fn templates_concatenate_coerced_parts() {
    let mut scope = Scope::new();
    scope.declare_var("n", int(3));
    scope.declare_var("f", Value::Float(2.5));
    scope.declare_var("b", Value::Bool(true));
    assert_eq!(
        eval_in("\"n=${n} f=${f} b=${b}\"", &scope).unwrap(),
        Value::String("n=3 f=2.5 b=true".to_owned())
    );
}

#[test]
fn template_interpolation_rejects_null_and_collections() {
    let mut scope = Scope::new();
    scope.declare_var("x", Value::Null);
    scope.declare_var("xs", Value::Array(vec![]));
    assert!(eval_in("\"${x}\"", &scope).is_err());
    assert!(eval_in("\"${xs}\"", &scope).is_err());
}

#[test]
fn nested_interpolations_evaluate_inside_out() {
    let mut scope = Scope::new();
    scope.declare_var("name", Value::String("world".to_owned()));
    scope.declare_func("upper", upper);
    assert_eq!(
        eval_in("\"hello ${upper(\"${name}\")}\"", &scope).unwrap(),
        Value::String("hello WORLD".to_owned())
    );
}

#[test]
fn heredocs_evaluate_to_their_body() {
    assert_eq!(
        eval("<<EOT\nline one\nline two\nEOT"),
        Value::String("line one\nline two\n".to_owned())
    );
}

// === Collections, indexing, splats ===

#[test]
fn arrays_and_objects_preserve_order() {
    assert_eq!(
        eval("[1, \"two\", true]").to_native(),
        serde_json::json!([1, "two", true])
    );
    assert_eq!(
        eval("{b = 1, a = 2}").to_native(),
        serde_json::json!({"b": 1, "a": 2})
    );
}

#[test]
fn computed_object_keys_must_be_strings() {
    let mut scope = Scope::new();
    scope.declare_var("k", Value::String("x".to_owned()));
    assert_eq!(
        eval_in("{(k) = 1}", &scope).unwrap().to_native(),
        serde_json::json!({"x": 1})
    );
    scope.declare_var("n", int(1));
    let err = eval_in("{(n) = 1}", &scope).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Type { .. }));
}

#[test]
fn duplicate_object_literal_keys_fail() {
    let err = eval_in("{a = 1, a = 2}", &Scope::new()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::DuplicateKey { ref key } if key == "a"));
}

#[test]
fn indexing_checks_bounds_and_keys() {
    assert_eq!(eval("[10, 20][1]"), int(20));
    assert_eq!(eval("{a = 1}[\"a\"]"), int(1));
    assert_eq!(eval("{a = 1}.a"), int(1));

    let err = eval_in("[10][3]", &Scope::new()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Key { .. }));
    let err = eval_in("{a = 1}[\"b\"]", &Scope::new()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Key { .. }));
    let err = eval_in("{a = 1}.b", &Scope::new()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Key { .. }));
    let err = eval_in("[1][\"a\"]", &Scope::new()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Type { .. }));
}

#[test]
fn attr_splat_lifts_arrays_null_and_scalars() {
    let mut scope = Scope::new();
    scope.declare_var(
        "p",
        Value::from_native(serde_json::json!([{"name": "a"}, {"name": "b"}])),
    );
    assert_eq!(
        eval_in("p.*.name", &scope).unwrap().to_native(),
        serde_json::json!(["a", "b"])
    );

    scope.declare_var("p", Value::Null);
    assert_eq!(
        eval_in("p.*.name", &scope).unwrap().to_native(),
        serde_json::json!([])
    );

    scope.declare_var("p", Value::from_native(serde_json::json!({"name": "a"})));
    assert_eq!(
        eval_in("p.*.name", &scope).unwrap().to_native(),
        serde_json::json!(["a"])
    );
}

#[test]
fn full_splat_permits_index_trailers() {
    let mut scope = Scope::new();
    scope.declare_var(
        "p",
        Value::from_native(serde_json::json!([
            {"tags": ["x", "y"]},
            {"tags": ["z"]},
        ])),
    );
    assert_eq!(
        eval_in("p[*].tags[0]", &scope).unwrap().to_native(),
        serde_json::json!(["x", "z"])
    );
}

// === For-comprehensions ===

#[test]
fn tuple_comprehension_over_array_indices_and_elements() {
    assert_eq!(
        eval("[for i, v in [\"a\", \"b\", \"c\"]: \"${i}:${v}\"]").to_native(),
        serde_json::json!(["0:a", "1:b", "2:c"])
    );
}

#[test]
fn object_comprehension_with_filter() {
    assert_eq!(
        eval("{for k, v in {a = 1, b = 2, c = 3}: k => v * v if v > 1}").to_native(),
        serde_json::json!({"b": 4, "c": 9})
    );
}

#[test]
fn object_iteration_follows_insertion_order() {
    assert_eq!(
        eval("[for k, v in {b = 1, a = 2}: k]").to_native(),
        serde_json::json!(["b", "a"])
    );
}

#[test]
fn grouping_collects_repeated_keys_into_arrays() {
    assert_eq!(
        eval("{for v in [\"a\", \"b\", \"a\"]: v => v...}").to_native(),
        serde_json::json!({"a": ["a", "a"], "b": ["b"]})
    );
}

#[test]
fn duplicate_comprehension_keys_fail_without_grouping() {
    let err = eval_in("{for v in [\"a\", \"a\"]: v => v}", &Scope::new()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::DuplicateKey { .. }));
}

#[test]
fn comprehension_filter_must_be_bool() {
    let err = eval_in("[for v in [1]: v if v]", &Scope::new()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Type { .. }));
}

#[test]
fn comprehension_collection_must_be_iterable() {
    let err = eval_in("[for v in 42: v]", &Scope::new()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Type { .. }));
}

// === Function calls ===

#[test]
fn functions_are_called_with_evaluated_arguments() {
    let mut scope = Scope::new();
    scope.declare_func("upper", upper);
    assert_eq!(
        eval_in("upper(\"abc\")", &scope).unwrap(),
        Value::String("ABC".to_owned())
    );
}

#[test]
fn missing_functions_are_name_errors() {
    let err = eval_in("nothere(1)", &Scope::new()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Name { ref name } if name == "nothere"));
}

#[test]
fn arity_failures_surface_with_the_call_span() {
    let mut scope = Scope::new();
    scope.declare_func("upper", upper);
    let err = eval_in("upper()", &scope).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Arity { ref function, .. } if function == "upper"));
    assert!(err.span.is_some());
}

#[test]
fn variadic_calls_splice_the_final_array() {
    let mut scope = Scope::new();
    scope.declare_func("sum", sum);
    scope.declare_var("rest", Value::from_native(serde_json::json!([2, 3, 4])));
    assert_eq!(eval_in("sum(1, rest...)", &scope).unwrap(), int(10));
}

#[test]
fn variadic_final_argument_must_be_an_array() {
    let mut scope = Scope::new();
    scope.declare_func("sum", sum);
    let err = eval_in("sum(1, 2...)", &scope).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Type { .. }));
}

#[test]
fn user_function_failures_keep_their_kind() {
    let mut scope = Scope::new();
    scope.declare_func("fail", fail);
    let err = eval_in("fail()", &scope).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::User { ref message } if message == "boom"));
    assert!(err.span.is_some());
}

// === Variable trace ===

#[test]
fn trace_records_the_deepest_outer_scope_paths() {
    let mut scope = Scope::new();
    scope.declare_var(
        "a",
        Value::from_native(serde_json::json!({"b": [{"c": 1}]})),
    );
    scope.declare_var("d", int(2));
    let expr = parse_expr("a.b[0].c + d").unwrap();
    let mut evaluator = Evaluator::new();
    evaluator.evaluate_expr(&expr, &scope).unwrap();
    let trace: Vec<String> = evaluator.take_trace().iter().map(ToString::to_string).collect();
    assert_eq!(trace, vec!["a.b[0].c".to_owned(), "d".to_owned()]);
}

#[test]
fn trace_skips_comprehension_bound_names() {
    let mut scope = Scope::new();
    scope.declare_var("items", Value::from_native(serde_json::json!([1, 2])));
    let expr = parse_expr("[for v in items: v]").unwrap();
    let mut evaluator = Evaluator::new();
    evaluator.evaluate_expr(&expr, &scope).unwrap();
    let trace: Vec<String> = evaluator.take_trace().iter().map(ToString::to_string).collect();
    assert_eq!(trace, vec!["items".to_owned()]);
}
