//! Parameter types and the conversion of resolved values into them.

use crate::resolver::is_falsey_str;
use crate::value::Value;
use std::fmt;
use thiserror::Error;

/// Declared type of a command parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Float,
    Boolean,
    /// Anything with a JSON representation.
    Json,
    /// Passed through untouched.
    Any,
    /// `None` is accepted as is; anything else is coerced to the inner type.
    Optional(Box<ParamType>),
    /// Takes every remaining positional argument, untouched.
    Variadic,
}

impl ParamType {
    /// Shorthand for `Optional(Box::new(inner))`.
    pub fn optional(inner: ParamType) -> Self {
        ParamType::Optional(Box::new(inner))
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::String => f.write_str("str"),
            ParamType::Integer => f.write_str("int"),
            ParamType::Float => f.write_str("float"),
            ParamType::Boolean => f.write_str("bool"),
            ParamType::Json => f.write_str("json"),
            ParamType::Any => f.write_str("any"),
            ParamType::Optional(inner) => write!(f, "optional<{}>", inner),
            ParamType::Variadic => f.write_str("*args"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot convert {found} {value} to {expected}")]
pub struct CoercionError {
    pub expected: ParamType,
    pub found: &'static str,
    pub value: String,
}

impl CoercionError {
    fn new(expected: &ParamType, value: &Value) -> Self {
        Self {
            expected: expected.clone(),
            found: value.type_name(),
            value: value.repr(),
        }
    }
}

/// Convert `value` to the declared type `ty`.
///
/// Pure: depends only on its arguments. The caller decides what to do with a
/// failure; the executor reports it and keeps the original value.
pub fn coerce(ty: &ParamType, value: &Value) -> Result<Value, CoercionError> {
    match ty {
        ParamType::Any | ParamType::Variadic => Ok(value.clone()),
        ParamType::Optional(_) if *value == Value::None => Ok(Value::None),
        ParamType::Optional(inner) => coerce(inner, value),
        ParamType::String => Ok(Value::Str(value.to_string())),
        ParamType::Boolean => Ok(Value::Bool(match value {
            Value::Str(s) => !is_falsey_str(s),
            other => other.is_truthy(),
        })),
        ParamType::Integer => to_integer(value)
            .map(Value::Int)
            .ok_or_else(|| CoercionError::new(ty, value)),
        ParamType::Float => to_float(value)
            .map(Value::Float)
            .ok_or_else(|| CoercionError::new(ty, value)),
        ParamType::Json => match value.to_json() {
            Some(_) => Ok(value.clone()),
            None => Err(CoercionError::new(ty, value)),
        },
    }
}

fn to_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Float(f) if f.is_finite() && f.trunc().abs() < i64::MAX as f64 => {
            Some(f.trunc() as i64)
        }
        Value::Str(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Float(f) => Some(*f),
        Value::Int(i) => Some(*i as f64),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Str(s) => s.trim().parse().ok(),
        _ => None,
    }
}
