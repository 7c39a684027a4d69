//! Batched, typed variable access by value reference.

mod error;

pub use error::{AccessError, StartValueError};

use crate::{
    description::{Causality, Initial, ScalarVariable, Variability},
    lifecycle::{Instance, LifecycleState, READABLE, WRITABLE},
    value::{Value, ValueKind, ValueRef, Values},
};

const KINDS: [ValueKind; 4] = [
    ValueKind::Real,
    ValueKind::Integer,
    ValueKind::Boolean,
    ValueKind::String,
];

/// Variable access for one instance, borrowed from [`Instance::variables`].
///
/// Every reference is checked against the descriptor before any native call,
/// and every set is checked against the settability rules of the current
/// lifecycle state.
#[derive(Debug)]
pub struct Variables<'a> {
    instance: &'a mut Instance,
}

impl<'a> Variables<'a> {
    pub(crate) fn new(instance: &'a mut Instance) -> Self {
        Self { instance }
    }

    /// Reads the values of `refs`, all of one kind, in one native call.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance is not readable in its current state,
    /// if any reference is unknown for `kind`, or if the component fails.
    pub fn get(&mut self, kind: ValueKind, refs: &[ValueRef]) -> Result<Values, AccessError> {
        self.instance.ensure_allowed(get_operation(kind), READABLE)?;
        for &value_ref in refs {
            self.lookup(kind, value_ref)?;
        }

        let n = refs.len();
        let values = match kind {
            ValueKind::Real => {
                let mut out = vec![0.0; n];
                self.instance.invoke("get_real", READABLE, false, |calls| {
                    calls.get_real(refs, &mut out).map(|s| (s, ()))
                })?;
                Values::Real(out)
            }
            ValueKind::Integer => {
                let mut out = vec![0; n];
                self.instance.invoke("get_integer", READABLE, false, |calls| {
                    calls.get_integer(refs, &mut out).map(|s| (s, ()))
                })?;
                Values::Integer(out)
            }
            ValueKind::Boolean => {
                let mut out = vec![false; n];
                self.instance.invoke("get_boolean", READABLE, false, |calls| {
                    calls.get_boolean(refs, &mut out).map(|s| (s, ()))
                })?;
                Values::Boolean(out)
            }
            ValueKind::String => {
                let mut out = vec![String::new(); n];
                self.instance.invoke("get_string", READABLE, false, |calls| {
                    calls.get_string(refs, &mut out).map(|s| (s, ()))
                })?;
                Values::String(out)
            }
        };
        Ok(values)
    }

    /// Reads Real values.
    ///
    /// # Errors
    ///
    /// See [`Variables::get`].
    pub fn get_real(&mut self, refs: &[ValueRef]) -> Result<Vec<f64>, AccessError> {
        let values = self.get(ValueKind::Real, refs)?;
        Ok(values.into_values().iter().filter_map(Value::as_f64).collect())
    }

    /// Writes `values` to `refs` in one native call.
    ///
    /// # Errors
    ///
    /// Returns an error if the lengths differ, if any reference is unknown,
    /// if any variable is not settable in the current state, or if the
    /// component fails.
    pub fn set(&mut self, refs: &[ValueRef], values: &Values) -> Result<(), AccessError> {
        let kind = values.kind();
        self.instance.ensure_allowed(set_operation(kind), WRITABLE)?;
        if refs.len() != values.len() {
            return Err(AccessError::LengthMismatch {
                refs: refs.len(),
                values: values.len(),
            });
        }

        let state = self.instance.state();
        for &value_ref in refs {
            let variable = self.lookup(kind, value_ref)?;
            check_settable(variable, state)?;
        }

        match values {
            Values::Real(v) => self.instance.invoke("set_real", WRITABLE, false, |calls| {
                calls.set_real(refs, v).map(|s| (s, ()))
            }),
            Values::Integer(v) => self.instance.invoke("set_integer", WRITABLE, false, |calls| {
                calls.set_integer(refs, v).map(|s| (s, ()))
            }),
            Values::Boolean(v) => self.instance.invoke("set_boolean", WRITABLE, false, |calls| {
                calls.set_boolean(refs, v).map(|s| (s, ()))
            }),
            Values::String(v) => self.instance.invoke("set_string", WRITABLE, false, |calls| {
                calls.set_string(refs, v).map(|s| (s, ()))
            }),
        }?;
        Ok(())
    }

    /// Reads a mixed list of references.
    ///
    /// Issues one native call per kind present and returns the values in
    /// request order.
    ///
    /// # Errors
    ///
    /// See [`Variables::get`].
    pub fn get_batch(&mut self, requests: &[(ValueRef, ValueKind)]) -> Result<Vec<Value>, AccessError> {
        let mut out: Vec<Option<Value>> = vec![None; requests.len()];

        for kind in KINDS {
            let (positions, refs): (Vec<usize>, Vec<ValueRef>) = requests
                .iter()
                .enumerate()
                .filter(|(_, (_, k))| *k == kind)
                .map(|(i, (r, _))| (i, *r))
                .unzip();
            if refs.is_empty() {
                continue;
            }
            let values = self.get(kind, &refs)?;
            for (slot, position) in positions.into_iter().enumerate() {
                out[position] = values.get(slot);
            }
        }

        Ok(out.into_iter().flatten().collect())
    }

    /// Writes a mixed list of assignments, one native call per kind present.
    ///
    /// # Errors
    ///
    /// See [`Variables::set`].
    pub fn set_batch(&mut self, assignments: &[(ValueRef, Value)]) -> Result<(), AccessError> {
        for kind in KINDS {
            let (refs, values): (Vec<ValueRef>, Vec<Value>) = assignments
                .iter()
                .filter(|(_, v)| v.kind() == kind)
                .map(|(r, v)| (*r, v.clone()))
                .unzip();
            if refs.is_empty() {
                continue;
            }
            if let Some(batch) = Values::from_values(kind, &values) {
                self.set(&refs, &batch)?;
            }
        }
        Ok(())
    }

    /// Applies values by variable name, converting each literal to the
    /// variable's kind.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::UnknownVariable`] or
    /// [`AccessError::TypeMismatch`] before any native call, otherwise see
    /// [`Variables::set`].
    pub fn set_start_values(&mut self, values: &[(String, Value)]) -> Result<(), AccessError> {
        let description = self.instance.description().clone();
        let mut assignments = Vec::with_capacity(values.len());

        for (name, value) in values {
            let variable = description
                .variable(name)
                .ok_or_else(|| AccessError::UnknownVariable { name: name.clone() })?;
            let value = value
                .coerce(variable.kind)
                .ok_or_else(|| AccessError::TypeMismatch {
                    variable: name.clone(),
                    expected: variable.kind,
                    actual: value.kind(),
                })?;
            assignments.push((variable.value_ref, value));
        }

        self.set_batch(&assignments)
    }

    /// Reads values by variable name, in request order.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::UnknownVariable`] for an unknown name, otherwise
    /// see [`Variables::get`].
    pub fn get_by_name<S: AsRef<str>>(&mut self, names: &[S]) -> Result<Vec<Value>, AccessError> {
        let description = self.instance.description().clone();
        let requests = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                description
                    .variable(name)
                    .map(|v| (v.value_ref, v.kind))
                    .ok_or_else(|| AccessError::UnknownVariable { name: name.into() })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.get_batch(&requests)
    }

    fn lookup(&self, kind: ValueKind, value_ref: ValueRef) -> Result<&ScalarVariable, AccessError> {
        self.instance
            .description()
            .variable_by_ref(kind, value_ref)
            .ok_or(AccessError::UnknownReference { kind, value_ref })
    }
}

/// Checks the settability rules for `state`.
///
/// - `Instantiated`: inputs, and non-constant variables with initial exact or
///   approx.
/// - `InitializationMode`: inputs, and variables with initial exact.
/// - Later modes: inputs and tunable parameters.
fn check_settable(variable: &ScalarVariable, state: LifecycleState) -> Result<(), AccessError> {
    let is_input = variable.causality == Causality::Input;
    let initial = variable.effective_initial();

    let settable = match state {
        LifecycleState::Instantiated => {
            is_input
                || (variable.variability != Variability::Constant
                    && matches!(initial, Some(Initial::Exact | Initial::Approx)))
        }
        LifecycleState::InitializationMode => is_input || initial == Some(Initial::Exact),
        _ => {
            is_input
                || (variable.causality == Causality::Parameter
                    && variable.variability == Variability::Tunable)
        }
    };

    match (settable, state) {
        (true, _) => Ok(()),
        (false, LifecycleState::Instantiated | LifecycleState::InitializationMode) => {
            Err(StartValueError {
                variable: variable.name.clone(),
                state,
            }
            .into())
        }
        (false, _) => Err(AccessError::NotSettable {
            variable: variable.name.clone(),
            state,
        }),
    }
}

fn get_operation(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Real => "get_real",
        ValueKind::Integer => "get_integer",
        ValueKind::Boolean => "get_boolean",
        ValueKind::String => "get_string",
    }
}

fn set_operation(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Real => "set_real",
        ValueKind::Integer => "set_integer",
        ValueKind::Boolean => "set_boolean",
        ValueKind::String => "set_string",
    }
}
