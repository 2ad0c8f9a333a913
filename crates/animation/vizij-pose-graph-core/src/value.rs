//! Variable values: the runtime inputs read by conditions and bound pose parameters.
//! Only numbers and booleans exist; a variable's kind is fixed at creation.

use serde::{Deserialize, Serialize};

/// Lightweight kind enum used for binding checks.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Float,
    Bool,
}

impl ValueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Float => "float",
            ValueKind::Bool => "bool",
        }
    }

    /// Neutral value for this kind.
    pub fn default_value(self) -> Value {
        match self {
            ValueKind::Float => Value::Float(0.0),
            ValueKind::Bool => Value::Bool(false),
        }
    }
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    /// Scalar float
    Float(f32),

    /// Boolean
    Bool(bool),
}

impl Value {
    /// Return the coarse kind of this value.
    #[inline]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Float(_) => ValueKind::Float,
            Value::Bool(_) => ValueKind::Bool,
        }
    }

    /// Truthiness: non-zero floats and `true`.
    #[inline]
    pub fn truthy(&self) -> bool {
        match *self {
            Value::Float(f) => f != 0.0 && !f.is_nan(),
            Value::Bool(b) => b,
        }
    }

    #[inline]
    pub fn as_float(&self) -> Option<f32> {
        match *self {
            Value::Float(f) => Some(f),
            Value::Bool(_) => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(b) => Some(b),
            Value::Float(_) => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Float(0.0)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// An authored variable. The kind never changes after creation.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    kind: ValueKind,
    value: Value,
}

impl Variable {
    pub fn new(kind: ValueKind) -> Self {
        Self {
            kind,
            value: kind.default_value(),
        }
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn value(&self) -> Value {
        self.value
    }

    /// Store `value`, returning the declared kind when it does not match.
    pub fn set(&mut self, value: Value) -> Result<(), ValueKind> {
        if value.kind() != self.kind {
            return Err(self.kind);
        }
        self.value = value;
        Ok(())
    }
}
