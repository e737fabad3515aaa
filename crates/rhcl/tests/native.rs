//! Tests for the native value boundary (`to_native` / `from_native`).

use pretty_assertions::assert_eq;
use rhcl::{Scope, Value, evaluate_expr, parse_expr};

#[test]
fn scalars_round_trip() {
    for native in [
        serde_json::json!(null),
        serde_json::json!(true),
        serde_json::json!(42),
        serde_json::json!(-7),
        serde_json::json!(2.5),
        serde_json::json!("text"),
    ] {
        assert_eq!(Value::from_native(native.clone()).to_native(), native);
    }
}

#[test]
fn nested_structures_round_trip_in_order() {
    let native = serde_json::json!({
        "z": [1, {"nested": "yes"}, null],
        "a": {"k2": 2, "k1": 1},
    });
    let value = Value::from_native(native.clone());
    assert_eq!(value.to_native(), native);

    let Value::Object(map) = &value else {
        panic!("expected an object");
    };
    let keys: Vec<&String> = map.keys().collect();
    assert_eq!(keys, ["z", "a"]);
}

#[test]
fn integral_json_numbers_become_ints() {
    let value = Value::from_native(serde_json::json!(5));
    assert_eq!(value, Value::Int(5.into()));
    let value = Value::from_native(serde_json::json!(5.0));
    assert_eq!(value, Value::Float(5.0));
}

#[test]
fn from_native_values_participate_in_evaluation() {
    let mut scope = Scope::new();
    scope.declare_var(
        "config",
        Value::from_native(serde_json::json!({"replicas": 3})),
    );
    let expr = parse_expr("config.replicas * 2").unwrap();
    assert_eq!(
        evaluate_expr(&expr, &scope).unwrap(),
        Value::Int(6.into())
    );
}

#[test]
fn huge_integers_degrade_to_the_nearest_float() {
    let expr = parse_expr("10000000000000000000000000000000 + 0").unwrap();
    let value = evaluate_expr(&expr, &Scope::new()).unwrap();
    let Value::Int(_) = &value else {
        panic!("expected the int to stay exact in the value domain");
    };
    let native = value.to_native();
    assert!(native.as_f64().is_some_and(|f| f > 1e30));
}
