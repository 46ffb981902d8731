//! Runtime values and their static types.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Runtime value produced by literals and referenced members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    /// Absence of a value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating-point number.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Heterogeneous list.
    List(Vec<Value>),
}

/// Static type of an expression, fixed at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// Unchecked; verified against the produced value at runtime.
    Any,
    /// Result is discarded.
    Unit,
    /// Boolean.
    Bool,
    /// Integer.
    Int,
    /// Float (integers widen into it).
    Float,
    /// String.
    Str,
    /// List.
    List,
}

impl ValueType {
    /// Whether an expression of static type `found` may be used where `self` is expected.
    pub fn accepts(self, found: ValueType) -> bool {
        match (self, found) {
            (ValueType::Any, _) | (_, ValueType::Any) | (ValueType::Unit, _) => true,
            (ValueType::Float, ValueType::Int) => true,
            (expected, found) => expected == found,
        }
    }

    /// Common type of two alternatives (conditional bodies).
    pub fn unify(self, other: ValueType) -> ValueType {
        match (self, other) {
            (a, b) if a == b => a,
            (ValueType::Int, ValueType::Float) | (ValueType::Float, ValueType::Int) => {
                ValueType::Float
            }
            _ => ValueType::Any,
        }
    }

    /// Numeric types support ordering against each other.
    pub fn is_numeric(self) -> bool {
        matches!(self, ValueType::Int | ValueType::Float)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Any => "Any",
            ValueType::Unit => "Unit",
            ValueType::Bool => "Bool",
            ValueType::Int => "Int",
            ValueType::Float => "Float",
            ValueType::Str => "String",
            ValueType::List => "List",
        };
        f.write_str(name)
    }
}

impl Value {
    /// Dynamic type of this value; `Null` reports `Any`.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Any,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Str(_) => ValueType::Str,
            Value::List(_) => ValueType::List,
        }
    }

    /// Convert into a value assignable to `expected`, widening integers to
    /// floats and discarding values expected as `Unit`. Returns the value
    /// back unchanged in `Err` when it does not fit.
    pub fn coerce(self, expected: ValueType) -> Result<Value, Value> {
        match (expected, self) {
            (ValueType::Unit, _) => Ok(Value::Null),
            (ValueType::Any, value) => Ok(value),
            (ValueType::Bool, Value::Null) => Err(Value::Null),
            (_, Value::Null) => Ok(Value::Null),
            (ValueType::Float, Value::Int(num)) => Ok(Value::Float(num as f64)),
            (expected, value) if value.value_type() == expected => Ok(value),
            (_, value) => Err(value),
        }
    }

    /// Boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    /// String payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(text) => Some(text),
            _ => None,
        }
    }

    /// Integer payload, if any.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(num) => Some(*num),
            _ => None,
        }
    }

    /// Numeric payload as a float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(num) => Some(*num as f64),
            Value::Float(num) => Some(*num),
            _ => None,
        }
    }

    /// True for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Equality used by `==` and `!=`; integers and floats compare numerically.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (a, b) => a == b,
        }
    }

    /// Ordering used by `<`, `<=`, `>` and `>=`.
    pub fn partial_order(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (a, b) => a.as_float()?.partial_cmp(&b.as_float()?),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(flag) => write!(f, "{}", flag),
            Value::Int(num) => write!(f, "{}", num),
            Value::Float(num) => write!(f, "{}", num),
            Value::Str(text) => f.write_str(text),
            Value::List(items) => {
                f.write_str("[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Value::Bool(flag)
    }
}

impl From<i64> for Value {
    fn from(num: i64) -> Self {
        Value::Int(num)
    }
}

impl From<f64> for Value {
    fn from(num: f64) -> Self {
        Value::Float(num)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Str(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Str(text)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
