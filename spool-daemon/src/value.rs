//! Parameter types and the values handlers produce and consume.
//!
//! Raw arguments always arrive as strings (command line, IPC payloads) and
//! are coerced to a [`ParamType`] before a handler sees them.

use crate::client::{Directory, File};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a command parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Int,
    Float,
    Bool,
}

impl ParamType {
    /// Human-readable description used in binding errors
    #[must_use]
    pub fn expectation(self) -> &'static str {
        match self {
            ParamType::String => "a string",
            ParamType::Int => "an integer",
            ParamType::Float => "a number",
            ParamType::Bool => "a boolean (true/false/yes/no/1/0)",
        }
    }

    /// Coerce a raw string into a value of this type.
    ///
    /// Returns `None` when the raw value cannot be represented.
    #[must_use]
    pub fn coerce(self, raw: &str) -> Option<Value> {
        match self {
            ParamType::String => Some(Value::String(raw.to_string())),
            ParamType::Int => raw.trim().parse::<i64>().ok().map(Value::Int),
            ParamType::Float => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::Float),
            ParamType::Bool => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(Value::Bool(true)),
                "false" | "no" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::String => write!(f, "string"),
            ParamType::Int => write!(f, "int"),
            ParamType::Float => write!(f, "float"),
            ParamType::Bool => write!(f, "bool"),
        }
    }
}

impl std::str::FromStr for ParamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "str" | "string" => Ok(Self::String),
            "int" | "integer" => Ok(Self::Int),
            "float" | "number" => Ok(Self::Float),
            "bool" | "boolean" => Ok(Self::Bool),
            _ => Err(format!("Unknown parameter type: {s}")),
        }
    }
}

/// A value produced by a handler or bound from a raw argument
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    File(File),
    Directory(Directory),
}

impl Value {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::String(_) => "string",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::File(_) => "file",
            Value::Directory(_) => "directory",
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_file(&self) -> Option<&File> {
        match self {
            Value::File(file) => Some(file),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_directory(&self) -> Option<&Directory> {
        match self {
            Value::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    /// JSON form handed back to callers
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Unit => serde_json::Value::Null,
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(i) => serde_json::json!(i),
            Value::Float(f) => serde_json::json!(f),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::File(file) => file.to_json(),
            Value::Directory(dir) => dir.to_json(),
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<File> for Value {
    fn from(file: File) -> Self {
        Value::File(file)
    }
}

impl From<Directory> for Value {
    fn from(dir: Directory) -> Self {
        Value::Directory(dir)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Unit
    }
}
