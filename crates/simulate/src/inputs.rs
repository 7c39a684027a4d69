//! Time-varying values fed into components during a run.
//!
//! [`InputTable`] drives named input variables of a single component from
//! tabulated samples. [`ExternalInputs`] drives the boundary connectors of
//! a coupled system from arbitrary functions of time.

use std::fmt;

use tandem_core::{ModelDescription, Value, ValueKind, ValueRef};
use thiserror::Error;

/// Errors raised when building or applying an [`InputTable`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InputError {
    #[error("sample at t = {time} has {actual} values, expected {expected}")]
    Width {
        time: f64,
        expected: usize,
        actual: usize,
    },

    #[error("sample time {time} precedes previous sample time {previous}")]
    DecreasingTime { previous: f64, time: f64 },

    #[error("sample time must be finite")]
    NonFiniteTime,

    #[error("input `{name}` is not a variable of the component")]
    UnknownVariable { name: String },

    #[error("input `{name}` is a string and cannot be tabulated")]
    StringInput { name: String },
}

/// Tabulated input signals.
///
/// Real columns are linearly interpolated between samples and Integer and
/// Boolean columns hold the most recent sample. Before the first sample
/// and after the last one every column holds its end value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputTable {
    columns: Vec<String>,
    times: Vec<f64>,
    samples: Vec<Vec<f64>>,
}

impl InputTable {
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            times: Vec::new(),
            samples: Vec::new(),
        }
    }

    /// Appends one sample.
    ///
    /// # Errors
    ///
    /// Rejects samples of the wrong width and times earlier than the
    /// previous sample. Equal times are allowed and describe a step change.
    pub fn push(&mut self, time: f64, values: Vec<f64>) -> Result<(), InputError> {
        if !time.is_finite() {
            return Err(InputError::NonFiniteTime);
        }
        if values.len() != self.columns.len() {
            return Err(InputError::Width {
                time,
                expected: self.columns.len(),
                actual: values.len(),
            });
        }
        if let Some(&previous) = self.times.last()
            && time < previous
        {
            return Err(InputError::DecreasingTime { previous, time });
        }
        self.times.push(time);
        self.samples.push(values);
        Ok(())
    }

    /// Builder form of [`push`](Self::push).
    ///
    /// # Errors
    ///
    /// See [`push`](Self::push).
    pub fn with_sample(mut self, time: f64, values: Vec<f64>) -> Result<Self, InputError> {
        self.push(time, values)?;
        Ok(self)
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty() || self.columns.is_empty()
    }

    /// Value of `column` at `time`, interpolated or held.
    #[must_use]
    pub fn value_at(&self, column: usize, time: f64, hold: bool) -> Option<f64> {
        let (first, last) = (self.times.first()?, self.times.last()?);
        let at = |i: usize| self.samples[i].get(column).copied();

        if time <= *first {
            return at(0);
        }
        if time >= *last {
            return at(self.times.len() - 1);
        }

        // Index of the last sample at or before `time`.
        let i = self.times.partition_point(|&t| t <= time) - 1;
        let (t0, t1) = (self.times[i], self.times[i + 1]);
        let (v0, v1) = (at(i)?, at(i + 1)?);
        if hold {
            return Some(v0);
        }
        #[allow(clippy::float_cmp)]
        if t1 == t0 {
            return Some(v1);
        }
        Some(v0 + (v1 - v0) * (time - t0) / (t1 - t0))
    }

    /// Values to set on a component described by `description` at `time`.
    ///
    /// # Errors
    ///
    /// Returns an error if a column names no variable or names a string
    /// variable.
    pub fn assignments(
        &self,
        description: &ModelDescription,
        time: f64,
    ) -> Result<Vec<(ValueRef, Value)>, InputError> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        self.columns
            .iter()
            .enumerate()
            .filter_map(|(index, name)| {
                let Some(variable) = description.variable(name) else {
                    return Some(Err(InputError::UnknownVariable { name: name.clone() }));
                };
                let hold = variable.kind.is_discrete();
                let raw = self.value_at(index, time, hold)?;
                let value = match variable.kind {
                    ValueKind::Real => Value::Real(raw),
                    #[allow(clippy::cast_possible_truncation)]
                    ValueKind::Integer => Value::Integer(raw.round() as i32),
                    ValueKind::Boolean => Value::Boolean(raw != 0.0),
                    ValueKind::String => {
                        return Some(Err(InputError::StringInput { name: name.clone() }));
                    }
                };
                Some(Ok((variable.value_ref, value)))
            })
            .collect()
    }
}

type Signal = Box<dyn Fn(f64) -> Value + Send>;

/// Functions of time driving the top-level input connectors of a system.
#[derive(Default)]
pub struct ExternalInputs {
    signals: Vec<(String, Signal)>,
}

impl ExternalInputs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drives the connector `name` with an arbitrary value.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, signal: impl Fn(f64) -> Value + Send + 'static) -> Self {
        self.signals.push((name.into(), Box::new(signal)));
        self
    }

    /// Drives the Real connector `name`.
    #[must_use]
    pub fn with_real(self, name: impl Into<String>, signal: impl Fn(f64) -> f64 + Send + 'static) -> Self {
        self.with(name, move |t| Value::Real(signal(t)))
    }

    /// Every driven connector with its value at `time`.
    pub fn values_at(&self, time: f64) -> impl Iterator<Item = (&str, Value)> + '_ {
        self.signals
            .iter()
            .map(move |(name, signal)| (name.as_str(), signal(time)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.signals.iter().map(|(name, _)| name.as_str())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

impl fmt::Debug for ExternalInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
