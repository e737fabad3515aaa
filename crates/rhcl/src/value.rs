use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

use crate::{
    errors::{Error, EvalResult},
    expressions::{BinaryOperator, Literal, UnaryOperator},
};

/// A runtime value.
///
/// The value domain is closed under every operator: evaluation only ever
/// produces one of these variants, and operators dispatch on the pair of tags,
/// failing cleanly on mismatches. Values are immutable once produced.
///
/// `Int` and `Float` are distinct kinds; arithmetic between them promotes to
/// `Float`. Object keys are always strings and keep insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    /// Arbitrary-precision integer.
    Int(BigInt),
    /// IEEE-754 double.
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
}

impl From<&Literal> for Value {
    /// Converts a parse-time literal into its runtime counterpart.
    ///
    /// This is the only place parse-time data crosses into runtime semantics.
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Null => Self::Null,
            Literal::Bool(b) => Self::Bool(*b),
            Literal::Int(i) => Self::Int(i.clone()),
            Literal::Float(f) => Self::Float(*f),
            Literal::Str(s) => Self::String(s.clone()),
        }
    }
}

impl Value {
    /// The kind name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    /// Coerces a scalar to its string form, for template interpolation and
    /// object index keys.
    ///
    /// Null, arrays, and objects do not stringify.
    pub(crate) fn coerce_to_string(&self) -> EvalResult<String> {
        match self {
            Self::Bool(b) => Ok(b.to_string()),
            Self::Int(i) => Ok(i.to_string()),
            Self::Float(f) => Ok(ryu::Buffer::new().format(*f).to_owned()),
            Self::String(s) => Ok(s.clone()),
            other => Err(Error::type_error(format!(
                "cannot convert {} value to string",
                other.kind()
            ))),
        }
    }

    /// Looks up `.name` on an object.
    pub(crate) fn get_attr(&self, name: &str) -> EvalResult<Self> {
        match self {
            Self::Object(map) => map.get(name).cloned().ok_or_else(|| {
                Error::key_error(format!("object has no attribute {name:?}"))
            }),
            Self::Array(_) => Err(Error::type_error(format!(
                "cannot access attribute {name:?} on an array; use a splat"
            ))),
            other => Err(Error::type_error(format!(
                "cannot access attribute {name:?} on {} value",
                other.kind()
            ))),
        }
    }

    /// Looks up `[index]` on an array or object.
    pub(crate) fn get_index(&self, index: &Self) -> EvalResult<Self> {
        match self {
            Self::Array(items) => {
                let Self::Int(i) = index else {
                    return Err(Error::type_error(format!(
                        "array index must be an int, not {}",
                        index.kind()
                    )));
                };
                i.to_usize()
                    .and_then(|i| items.get(i))
                    .cloned()
                    .ok_or_else(|| {
                        Error::key_error(format!(
                            "array index {i} out of range for length {}",
                            items.len()
                        ))
                    })
            }
            Self::Object(map) => {
                let key = index.coerce_to_string()?;
                map.get(&key)
                    .cloned()
                    .ok_or_else(|| Error::key_error(format!("object has no key {key:?}")))
            }
            other => Err(Error::type_error(format!(
                "cannot index {} value",
                other.kind()
            ))),
        }
    }

    /// Converts to the natural `serde_json` representation.
    ///
    /// Total: every value maps. Integers that fit an i64/u64 become JSON
    /// integers; larger ones and non-finite floats degrade to the nearest
    /// representable JSON number or null.
    pub fn to_native(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => (*b).into(),
            Self::Int(i) => {
                if let Some(v) = i.to_i64() {
                    v.into()
                } else if let Some(v) = i.to_u64() {
                    v.into()
                } else {
                    serde_json::Number::from_f64(big_to_f64(i))
                        .map_or(serde_json::Value::Null, serde_json::Value::Number)
                }
            }
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(s) => s.clone().into(),
            Self::Array(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_native).collect())
            }
            Self::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_native())).collect(),
            ),
        }
    }

    /// Converts from the natural `serde_json` representation.
    ///
    /// Total: null, booleans, numbers (integral ones become `Int`), strings,
    /// arrays, and objects all map onto the obvious variants.
    pub fn from_native(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i.into())
                } else if let Some(u) = n.as_u64() {
                    Self::Int(u.into())
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from_native).collect())
            }
            serde_json::Value::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_native(v)))
                    .collect(),
            ),
        }
    }
}

fn big_to_f64(i: &BigInt) -> f64 {
    i.to_f64().unwrap_or(f64::NAN)
}

fn float_of(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(big_to_f64(i)),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

/// Applies a binary operator to two evaluated operands.
///
/// `&&` and `||` are handled here eagerly for completeness; the evaluator
/// short-circuits them and only reaches this path with both operands ready.
pub(crate) fn binary_op(op: BinaryOperator, left: &Value, right: &Value) -> EvalResult<Value> {
    match op {
        BinaryOperator::Add
        | BinaryOperator::Sub
        | BinaryOperator::Mul
        | BinaryOperator::Div
        | BinaryOperator::Mod => arith(op, left, right),
        BinaryOperator::Eq => Ok(Value::Bool(left == right)),
        BinaryOperator::NotEq => Ok(Value::Bool(left != right)),
        BinaryOperator::Lt | BinaryOperator::LtE | BinaryOperator::Gt | BinaryOperator::GtE => {
            compare(op, left, right)
        }
        BinaryOperator::And | BinaryOperator::Or => logic(op, left, right),
    }
}

fn arith(op: BinaryOperator, left: &Value, right: &Value) -> EvalResult<Value> {
    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        return int_arith(op, a, b);
    }
    if let (Some(a), Some(b)) = (float_of(left), float_of(right)) {
        return float_arith(op, a, b);
    }
    if op == BinaryOperator::Add
        && matches!(left, Value::String(_))
        && matches!(right, Value::String(_))
    {
        return Err(Error::type_error(
            "cannot concatenate strings with '+'; use template interpolation",
        ));
    }
    Err(Error::type_error(format!(
        "unsupported operand types for '{op}': {} and {}",
        left.kind(),
        right.kind()
    )))
}

fn int_arith(op: BinaryOperator, a: &BigInt, b: &BigInt) -> EvalResult<Value> {
    let result = match op {
        BinaryOperator::Add => a + b,
        BinaryOperator::Sub => a - b,
        BinaryOperator::Mul => a * b,
        // BigInt division truncates toward zero, matching the int semantics.
        BinaryOperator::Div => {
            if b.is_zero() {
                return Err(Error::type_error("division by zero"));
            }
            a / b
        }
        BinaryOperator::Mod => {
            if b.is_zero() {
                return Err(Error::type_error("modulo by zero"));
            }
            a % b
        }
        _ => unreachable!("int_arith only receives arithmetic operators"),
    };
    Ok(Value::Int(result))
}

fn float_arith(op: BinaryOperator, a: f64, b: f64) -> EvalResult<Value> {
    let result = match op {
        BinaryOperator::Add => a + b,
        BinaryOperator::Sub => a - b,
        BinaryOperator::Mul => a * b,
        BinaryOperator::Div => {
            if b == 0.0 {
                return Err(Error::type_error("division by zero"));
            }
            a / b
        }
        BinaryOperator::Mod => {
            if b == 0.0 {
                return Err(Error::type_error("modulo by zero"));
            }
            a % b
        }
        _ => unreachable!("float_arith only receives arithmetic operators"),
    };
    Ok(Value::Float(result))
}

fn compare(op: BinaryOperator, left: &Value, right: &Value) -> EvalResult<Value> {
    let ordering = match (left, right) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (a, b) = (float_of(left), float_of(right));
            match a.zip(b).and_then(|(a, b)| a.partial_cmp(&b)) {
                Some(ordering) => ordering,
                None => {
                    return Err(Error::type_error("cannot order NaN values"));
                }
            }
        }
        (a, b) => {
            return Err(Error::type_error(format!(
                "cannot compare {} and {} values",
                a.kind(),
                b.kind()
            )));
        }
    };
    let result = match op {
        BinaryOperator::Lt => ordering.is_lt(),
        BinaryOperator::LtE => ordering.is_le(),
        BinaryOperator::Gt => ordering.is_gt(),
        BinaryOperator::GtE => ordering.is_ge(),
        _ => unreachable!("compare only receives ordering operators"),
    };
    Ok(Value::Bool(result))
}

fn logic(op: BinaryOperator, left: &Value, right: &Value) -> EvalResult<Value> {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(match op {
            BinaryOperator::And => *a && *b,
            BinaryOperator::Or => *a || *b,
            _ => unreachable!("logic only receives boolean operators"),
        })),
        (a, b) => Err(Error::type_error(format!(
            "'{op}' requires bool operands, got {} and {}",
            a.kind(),
            b.kind()
        ))),
    }
}

/// Applies a unary operator to an evaluated operand.
pub(crate) fn unary_op(op: UnaryOperator, operand: &Value) -> EvalResult<Value> {
    match (op, operand) {
        (UnaryOperator::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOperator::Neg, Value::Int(i)) => Ok(Value::Int(-i.clone())),
        (UnaryOperator::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (op, operand) => Err(Error::type_error(format!(
            "unsupported operand type for '{op}': {}",
            operand.kind()
        ))),
    }
}
