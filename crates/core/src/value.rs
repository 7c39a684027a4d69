use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric handle identifying a variable within one value kind.
///
/// References are only unique per kind: a Real and an Integer variable may
/// share the same number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct ValueRef(pub u32);

impl fmt::Display for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The four scalar types a component exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Real,
    Integer,
    Boolean,
    String,
}

impl ValueKind {
    /// Returns true for kinds whose values change only at events.
    #[must_use]
    pub fn is_discrete(self) -> bool {
        !matches!(self, Self::Real)
    }
}

/// A single scalar value.
///
/// Deserializes untagged so that configuration files can write plain
/// literals. Integers are tried before reals, so use [`Value::coerce`] to
/// convert a literal to the kind of the variable it targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Integer(i32),
    Real(f64),
    String(String),
}

impl Value {
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Real(_) => ValueKind::Real,
            Self::Integer(_) => ValueKind::Integer,
            Self::Boolean(_) => ValueKind::Boolean,
            Self::String(_) => ValueKind::String,
        }
    }

    /// Returns the value as a result-table number.
    ///
    /// Booleans map to `0.0` and `1.0`; strings have no numeric form.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Real(v) => Some(*v),
            Self::Integer(v) => Some(f64::from(*v)),
            Self::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::String(_) => None,
        }
    }

    /// Converts the value to `kind` where the conversion is lossless.
    ///
    /// Integers widen to reals, and reals with no fractional part narrow to
    /// integers when they fit. Returns `None` for any other mismatch.
    #[must_use]
    pub fn coerce(&self, kind: ValueKind) -> Option<Value> {
        if self.kind() == kind {
            return Some(self.clone());
        }
        match (self, kind) {
            (Self::Integer(v), ValueKind::Real) => Some(Self::Real(f64::from(*v))),
            (Self::Real(v), ValueKind::Integer) => {
                #[allow(clippy::cast_possible_truncation)]
                let narrowed = *v as i32;
                #[allow(clippy::float_cmp)]
                (f64::from(narrowed) == *v).then_some(Self::Integer(narrowed))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Real(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
        }
    }
}

/// A homogeneous batch of values, as exchanged in one native call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Values {
    Real(Vec<f64>),
    Integer(Vec<i32>),
    Boolean(Vec<bool>),
    String(Vec<String>),
}

impl Values {
    /// Creates an empty batch of the given kind with room for `capacity` values.
    #[must_use]
    pub fn with_capacity(kind: ValueKind, capacity: usize) -> Self {
        match kind {
            ValueKind::Real => Self::Real(Vec::with_capacity(capacity)),
            ValueKind::Integer => Self::Integer(Vec::with_capacity(capacity)),
            ValueKind::Boolean => Self::Boolean(Vec::with_capacity(capacity)),
            ValueKind::String => Self::String(Vec::with_capacity(capacity)),
        }
    }

    /// Collects scalar values into a batch of `kind`.
    ///
    /// Returns `None` if any value cannot be coerced to `kind`.
    #[must_use]
    pub fn from_values(kind: ValueKind, values: &[Value]) -> Option<Self> {
        let mut batch = Self::with_capacity(kind, values.len());
        for value in values {
            batch.push(value.coerce(kind)?);
        }
        Some(batch)
    }

    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Real(_) => ValueKind::Real,
            Self::Integer(_) => ValueKind::Integer,
            Self::Boolean(_) => ValueKind::Boolean,
            Self::String(_) => ValueKind::String,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Real(v) => v.len(),
            Self::Integer(v) => v.len(),
            Self::Boolean(v) => v.len(),
            Self::String(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the value at `index` as a scalar.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        match self {
            Self::Real(v) => v.get(index).copied().map(Value::Real),
            Self::Integer(v) => v.get(index).copied().map(Value::Integer),
            Self::Boolean(v) => v.get(index).copied().map(Value::Boolean),
            Self::String(v) => v.get(index).cloned().map(Value::String),
        }
    }

    /// Splits the batch into scalar values.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        match self {
            Self::Real(v) => v.into_iter().map(Value::Real).collect(),
            Self::Integer(v) => v.into_iter().map(Value::Integer).collect(),
            Self::Boolean(v) => v.into_iter().map(Value::Boolean).collect(),
            Self::String(v) => v.into_iter().map(Value::String).collect(),
        }
    }

    // Callers coerce before pushing, so a kind mismatch is dropped silently.
    fn push(&mut self, value: Value) {
        match (self, value) {
            (Self::Real(v), Value::Real(x)) => v.push(x),
            (Self::Integer(v), Value::Integer(x)) => v.push(x),
            (Self::Boolean(v), Value::Boolean(x)) => v.push(x),
            (Self::String(v), Value::String(x)) => v.push(x),
            _ => {}
        }
    }
}
