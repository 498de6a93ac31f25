//! The dynamic value model shared by the resolver, commands and the
//! environment.

use serde_json::Value as JsonValue;
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// An object handed out by a collaborator that the shell can carry around
/// (store in a variable, pipe into another command) but cannot look into.
///
/// Typical examples are identifiers issued by an external store. The shell
/// only knows how to print it; serializing it needs a host-supplied fallback
/// (see [`crate::env::Environment::save_file`]).
#[derive(Clone)]
pub struct Foreign {
    type_name: &'static str,
    display: String,
    inner: Rc<dyn Any>,
}

impl Foreign {
    /// Wraps `value`, remembering its display form and type name.
    pub fn new<T: Any + fmt::Display>(value: T) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            display: value.to_string(),
            inner: Rc::new(value),
        }
    }

    /// Fully qualified Rust type name of the wrapped object.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Gives the wrapped object back to code that knows its type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref()
    }
}

impl fmt::Debug for Foreign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.type_name, self.display)
    }
}

impl fmt::Display for Foreign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl PartialEq for Foreign {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Dynamically typed value flowing through the shell.
///
/// Produced by the resolver from raw tokens, narrowed by coercion, returned by
/// command handlers and stored in the environment.
///
/// `Json` only ever holds arrays and objects: JSON scalars are collapsed into
/// the matching scalar variant by [`Value::from_json`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absent value: an undefined variable, a command without a result.
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Json(JsonValue),
    /// A handler failure captured as the result of a stage.
    Error(String),
    Foreign(Foreign),
}

impl Value {
    /// Converts parsed JSON. `null`, booleans, numbers and strings become
    /// the native scalar variants; arrays and objects stay [`Value::Json`].
    pub fn from_json(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::None,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::Str(n.to_string())
                }
            }
            JsonValue::String(s) => Value::Str(s),
            other => Value::Json(other),
        }
    }

    /// Native JSON form of the value, or `None` when the value has no JSON
    /// representation (foreign objects, captured errors, non-finite floats).
    pub fn to_json(&self) -> Option<JsonValue> {
        match self {
            Value::None => Some(JsonValue::Null),
            Value::Bool(b) => Some(JsonValue::Bool(*b)),
            Value::Int(i) => Some(JsonValue::from(*i)),
            Value::Float(f) => serde_json::Number::from_f64(*f).map(JsonValue::Number),
            Value::Str(s) => Some(JsonValue::String(s.clone())),
            Value::Json(j) => Some(j.clone()),
            Value::Error(_) | Value::Foreign(_) => None,
        }
    }

    /// Like [`Value::to_json`] but never fails: anything without a JSON form
    /// is rendered as its display string.
    pub fn to_json_lossy(&self) -> JsonValue {
        self.to_json()
            .unwrap_or_else(|| JsonValue::String(self.to_string()))
    }

    /// Loose truthiness: empty, zero, `none` and errors are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None | Value::Error(_) => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Json(JsonValue::Array(a)) => !a.is_empty(),
            Value::Json(JsonValue::Object(o)) => !o.is_empty(),
            Value::Json(_) | Value::Foreign(_) => true,
        }
    }

    /// Short type name as shown in signatures and coercion errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Json(_) => "json",
            Value::Error(_) => "error",
            Value::Foreign(_) => "foreign",
        }
    }

    /// The string content of a [`Value::Str`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Unambiguous rendering used when echoing a result back (`< ...`):
    /// strings are quoted, everything else prints like [`fmt::Display`].
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("{:?}", s),
            Value::Error(msg) => format!("error({:?})", msg),
            Value::Foreign(f) => format!("{:?}", f),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("none"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Str(s) => f.write_str(s),
            Value::Json(j) => write!(f, "{}", j),
            Value::Error(msg) => f.write_str(msg),
            Value::Foreign(x) => write!(f, "{}", x),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        Value::from_json(json)
    }
}

impl From<Foreign> for Value {
    fn from(f: Foreign) -> Self {
        Value::Foreign(f)
    }
}
