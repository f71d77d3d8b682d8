//! Bound parameter values and parameter types
//!
//! `Value` is the driver-neutral representation of a single SQL value, used both
//! for bound parameters and for the cells of a [`ResultSet`](crate::database::driver::ResultSet).
//! `ParamType` mirrors the binding types a driver understands.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single SQL value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Return the integer content, converting from text or booleans where possible
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Real(f) => Some(*f as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Convert this value into the representation a driver expects for `param_type`
    ///
    /// Values that cannot be converted are passed through unchanged.
    pub fn coerce(self, param_type: ParamType) -> Value {
        match (param_type, self) {
            (ParamType::Auto, value) => value,
            (ParamType::Null, _) => Value::Null,
            (_, Value::Null) => Value::Null,
            (ParamType::Integer, Value::Bool(b)) => Value::Integer(i64::from(b)),
            (ParamType::Integer, Value::Text(s)) => match s.trim().parse::<i64>() {
                Ok(i) => Value::Integer(i),
                Err(_) => Value::Text(s),
            },
            (ParamType::Boolean, Value::Integer(i)) => Value::Bool(i != 0),
            (ParamType::Boolean, Value::Text(s)) => {
                Value::Bool(!(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false")))
            }
            (ParamType::String | ParamType::Ascii, Value::Integer(i)) => Value::Text(i.to_string()),
            (ParamType::String | ParamType::Ascii, Value::Real(f)) => Value::Text(f.to_string()),
            (ParamType::String | ParamType::Ascii, Value::Bool(b)) => {
                Value::Text(if b { "1" } else { "" }.to_string())
            }
            (ParamType::LargeObject | ParamType::Binary, Value::Text(s)) => {
                Value::Blob(s.into_bytes())
            }
            (_, value) => value,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => write!(f, "{}", s),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Binding type of a parameter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    /// Bind the value with its own storage class
    #[default]
    Auto,
    Null,
    Integer,
    String,
    LargeObject,
    Boolean,
    Binary,
    Ascii,
}

/// Parameter types supplied alongside a set of bound values
///
/// Types are either given by position, in bind order, or keyed by column name.
/// Named types are resolved against the columns a statement binds; columns
/// without an entry bind as [`ParamType::Auto`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParamTypes {
    Positional(Vec<ParamType>),
    Named(Vec<(String, ParamType)>),
}

impl Default for ParamTypes {
    fn default() -> Self {
        ParamTypes::Positional(Vec::new())
    }
}

impl ParamTypes {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn positional(types: &[ParamType]) -> Self {
        ParamTypes::Positional(types.to_vec())
    }

    pub fn named(types: &[(&str, ParamType)]) -> Self {
        ParamTypes::Named(
            types
                .iter()
                .map(|(name, ty)| (name.to_string(), *ty))
                .collect(),
        )
    }

    /// Resolve to positional types for the given bound columns
    pub fn resolve(&self, columns: &[&str]) -> Vec<ParamType> {
        match self {
            ParamTypes::Positional(types) => types.clone(),
            ParamTypes::Named(types) => columns
                .iter()
                .map(|column| {
                    types
                        .iter()
                        .find(|(name, _)| name == column)
                        .map(|(_, ty)| *ty)
                        .unwrap_or_default()
                })
                .collect(),
        }
    }

    /// Positional view, used by statements that bind no named columns
    pub fn as_positional(&self) -> Vec<ParamType> {
        match self {
            ParamTypes::Positional(types) => types.clone(),
            ParamTypes::Named(types) => types.iter().map(|(_, ty)| *ty).collect(),
        }
    }
}
