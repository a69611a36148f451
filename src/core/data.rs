//! Data types for the tag gateway.
//!
//! Drivers speak in [`DriverValue`]s keyed by raw address. The gateway turns
//! them into per-tag [`Reading`]s, which is what clients see: either the
//! value, the fault quality code, or the `UNDF` sentinel.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use crate::core::quality::Quality;

/// Sentinel reported for tags with no value (unresolved, or missing from a read).
pub const UNDEFINED: &str = "UNDF";

/// A protocol-agnostic value representation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean value (digital I/O)
    Bool(bool),

    /// Integer value
    Integer(i64),

    /// Floating-point number (analog values)
    Float(f64),

    /// String value
    String(String),

    /// Null/missing value
    #[default]
    Null,
}

impl Value {
    /// Try to get the value as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            Self::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Try to get the value as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            Self::Float(v) => Some(*v as i64),
            Self::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            Self::Integer(v) => Some(*v != 0),
            Self::Float(v) => Some(*v != 0.0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::String(v) => f.write_str(v),
            Self::Null => f.write_str("null"),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<serde_json::Value> for Value {
    /// Arrays and objects have no scalar equivalent and are kept as their JSON text.
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::String(s),
            other => Self::String(other.to_string()),
        }
    }
}

/// A value as returned by a driver: the raw value plus its quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverValue {
    pub value: Value,
    #[serde(default)]
    pub quality: Quality,
}

impl DriverValue {
    /// A value with good quality.
    pub fn good(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            quality: Quality::Good,
        }
    }

    /// A value carrying a fault quality code.
    pub fn bad(value: impl Into<Value>, code: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            quality: Quality::bad(code),
        }
    }

    /// Convert to the reading a client receives.
    pub fn into_reading(self) -> Reading {
        match self.quality {
            Quality::Good => Reading::Value(self.value),
            Quality::Bad(code) => Reading::Quality(code),
        }
    }
}

/// What a client receives for one tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    /// The driver returned the value with quality OK.
    Value(Value),

    /// The driver returned a non-OK quality; the code replaces the value.
    Quality(String),

    /// No value: the tag is unresolved or its address was missing from the read.
    Undefined,
}

impl Reading {
    /// Map an optional driver value, substituting `Undefined` when absent.
    pub fn from_driver(value: Option<DriverValue>) -> Self {
        value.map_or(Self::Undefined, DriverValue::into_reading)
    }

    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// The value, when the reading carries one.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{}", v),
            Self::Quality(code) => f.write_str(code),
            Self::Undefined => f.write_str(UNDEFINED),
        }
    }
}

impl Serialize for Reading {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Value(v) => v.serialize(serializer),
            Self::Quality(code) => serializer.serialize_str(code),
            Self::Undefined => serializer.serialize_str(UNDEFINED),
        }
    }
}

/// Merged result of a read: tag name to reading.
pub type TagValues = HashMap<String, Reading>;
