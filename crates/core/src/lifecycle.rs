//! Lifecycle state machine for one component instance.
//!
//! Every operation is checked against the tracked state before the native
//! call is made. An illegal call fails with [`SequenceError`] and the
//! component never sees it.

mod error;

pub use error::{CallError, LifecycleError, SequenceError};

use std::{fmt, sync::Arc};

use crate::{
    access::Variables,
    callbacks::{CallbackSink, DiagnosticSink, TracingSink},
    calls::{AdapterError, CallResult, EventInfo, FmiCalls, FmuStateId, InstantiateRequest, IntegratorStepOutcome},
    description::{InterfaceKind, ModelDescription},
    status::{Status, StatusKind},
};

/// Lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Instantiated,
    InitializationMode,
    /// Co-simulation stepping.
    StepMode,
    /// Model exchange discrete phase.
    EventMode,
    /// Model exchange continuous phase.
    ContinuousTimeMode,
    Terminated,
    Freed,
    /// Absorbing state after a fatal status or a lost channel.
    Fatal,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

use LifecycleState::{
    ContinuousTimeMode, EventMode, Fatal, Freed, InitializationMode, Instantiated, StepMode,
    Terminated,
};

const LIVE: &[LifecycleState] = &[
    Instantiated,
    InitializationMode,
    StepMode,
    EventMode,
    ContinuousTimeMode,
    Terminated,
];
const ME_READABLE: &[LifecycleState] =
    &[InitializationMode, EventMode, ContinuousTimeMode, Terminated];
pub(crate) const READABLE: &[LifecycleState] = &[
    InitializationMode,
    StepMode,
    EventMode,
    ContinuousTimeMode,
    Terminated,
];
pub(crate) const WRITABLE: &[LifecycleState] = &[
    Instantiated,
    InitializationMode,
    StepMode,
    EventMode,
    ContinuousTimeMode,
];

/// Options for [`Instance::instantiate`].
#[derive(Clone)]
pub struct InstanceOptions {
    name: String,
    kind: Option<InterfaceKind>,
    resource_location: String,
    visible: bool,
    logging_on: bool,
    sink: Arc<dyn CallbackSink>,
}

impl InstanceOptions {
    /// Creates options for an instance named `name`.
    ///
    /// The interface kind defaults to the descriptor's preferred kind and
    /// component log messages go to [`TracingSink`].
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            resource_location: String::new(),
            visible: false,
            logging_on: false,
            sink: Arc::new(TracingSink),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(mut self, kind: InterfaceKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn resource_location(mut self, location: impl Into<String>) -> Self {
        self.resource_location = location.into();
        self
    }

    #[must_use]
    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    #[must_use]
    pub fn logging_on(mut self, logging_on: bool) -> Self {
        self.logging_on = logging_on;
        self
    }

    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn CallbackSink>) -> Self {
        self.sink = sink;
        self
    }
}

impl fmt::Debug for InstanceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceOptions")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("resource_location", &self.resource_location)
            .field("visible", &self.visible)
            .field("logging_on", &self.logging_on)
            .finish_non_exhaustive()
    }
}

/// One live component instance.
///
/// Owns the call surface it was created with and frees the native instance
/// when dropped, unless [`Instance::free_instance`] already did. Dropping
/// never calls `terminate`.
pub struct Instance {
    calls: Box<dyn FmiCalls>,
    description: Arc<ModelDescription>,
    kind: InterfaceKind,
    name: String,
    state: LifecycleState,
    diagnostics: Arc<DiagnosticSink>,
    last_time: Option<f64>,
}

impl Instance {
    /// Creates a native instance through `calls`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::UnsupportedInterface`] if the descriptor lacks
    /// the requested interface, or [`LifecycleError::Adapter`] if the
    /// component refuses to instantiate.
    pub fn instantiate(
        mut calls: Box<dyn FmiCalls>,
        description: Arc<ModelDescription>,
        options: InstanceOptions,
    ) -> Result<Self, LifecycleError> {
        let kind = match options.kind {
            Some(kind) if description.supports(kind) => kind,
            Some(kind) => return Err(LifecycleError::UnsupportedInterface { kind }),
            None => description
                .default_kind()
                .ok_or(LifecycleError::NoInterface)?,
        };

        let diagnostics = Arc::new(DiagnosticSink::new(options.sink));
        let request = InstantiateRequest {
            instance_name: options.name.clone(),
            kind,
            guid: description.guid.clone(),
            resource_location: options.resource_location,
            visible: options.visible,
            logging_on: options.logging_on,
        };

        calls
            .instantiate(&request, diagnostics.clone())
            .map_err(|source| LifecycleError::Adapter {
                instance: options.name.clone(),
                operation: "instantiate",
                source,
            })?;

        tracing::debug!(instance = %options.name, kind = ?kind, "instantiated");

        Ok(Self {
            calls,
            description,
            kind,
            name: options.name,
            state: Instantiated,
            diagnostics,
            last_time: None,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> InterfaceKind {
        self.kind
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    #[must_use]
    pub fn description(&self) -> &Arc<ModelDescription> {
        &self.description
    }

    /// Time of the last successful time-advancing call.
    #[must_use]
    pub fn last_time(&self) -> Option<f64> {
        self.last_time
    }

    /// Latest non-OK message the component logged.
    #[must_use]
    pub fn last_diagnostic(&self) -> Option<String> {
        self.diagnostics.last()
    }

    /// Returns true if the component can save and restore its state.
    #[must_use]
    pub fn can_rollback(&self) -> bool {
        self.description
            .interface(self.kind)
            .is_some_and(|i| i.can_get_and_set_fmu_state)
    }

    /// Returns the variable access layer for this instance.
    pub fn variables(&mut self) -> Variables<'_> {
        Variables::new(self)
    }

    /// # Errors
    ///
    /// Fails unless the instance is in `Instantiated`, or if the component
    /// reports an error.
    pub fn setup_experiment(
        &mut self,
        tolerance: Option<f64>,
        start_time: f64,
        stop_time: Option<f64>,
    ) -> Result<(), LifecycleError> {
        self.invoke("setup_experiment", &[Instantiated], false, |calls| {
            calls
                .setup_experiment(tolerance, start_time, stop_time)
                .map(with_unit)
        })?;
        self.last_time = Some(start_time);
        Ok(())
    }

    /// # Errors
    ///
    /// Fails unless the instance is in `Instantiated`, or if the component
    /// reports an error.
    pub fn enter_initialization_mode(&mut self) -> Result<(), LifecycleError> {
        self.invoke("enter_initialization_mode", &[Instantiated], false, |calls| {
            calls.enter_initialization_mode().map(with_unit)
        })?;
        self.transition(InitializationMode);
        Ok(())
    }

    /// Leaves initialization for `StepMode` or `EventMode` depending on the
    /// interface kind.
    ///
    /// # Errors
    ///
    /// Fails unless the instance is in `InitializationMode`, or if the
    /// component reports an error.
    pub fn exit_initialization_mode(&mut self) -> Result<(), LifecycleError> {
        self.invoke("exit_initialization_mode", &[InitializationMode], false, |calls| {
            calls.exit_initialization_mode().map(with_unit)
        })?;
        let next = match self.kind {
            InterfaceKind::CoSimulation => StepMode,
            InterfaceKind::ModelExchange => EventMode,
        };
        self.transition(next);
        Ok(())
    }

    /// Advances a co-simulation instance over one communication step.
    ///
    /// Returns the component status, which is `Ok`, `Warning`, or `Discard`.
    /// A discarded step leaves the last successful time unchanged.
    ///
    /// # Errors
    ///
    /// Fails unless the instance is in `StepMode`, or if the component
    /// reports an error or fatal status.
    pub fn do_step(
        &mut self,
        current_time: f64,
        step_size: f64,
        no_set_prior_state: bool,
    ) -> Result<Status, LifecycleError> {
        let (status, ()) = self.invoke("do_step", &[StepMode], true, |calls| {
            calls
                .do_step(current_time, step_size, no_set_prior_state)
                .map(with_unit)
        })?;
        if status.is_success() {
            self.last_time = Some(current_time + step_size);
        }
        Ok(status)
    }

    /// # Errors
    ///
    /// Fails unless the instance is in `StepMode` or `Terminated`.
    pub fn get_boolean_status(&mut self, kind: StatusKind) -> Result<(Status, bool), LifecycleError> {
        self.invoke("get_boolean_status", &[StepMode, Terminated], true, |calls| {
            calls.get_boolean_status(kind)
        })
    }

    /// # Errors
    ///
    /// Fails unless the instance is in `StepMode` or `Terminated`.
    pub fn get_real_status(&mut self, kind: StatusKind) -> Result<(Status, f64), LifecycleError> {
        self.invoke("get_real_status", &[StepMode, Terminated], true, |calls| {
            calls.get_real_status(kind)
        })
    }

    /// # Errors
    ///
    /// Fails unless the instance is in `EventMode` or `ContinuousTimeMode`.
    pub fn set_time(&mut self, time: f64) -> Result<(), LifecycleError> {
        self.invoke("set_time", &[EventMode, ContinuousTimeMode], false, |calls| {
            calls.set_time(time).map(with_unit)
        })?;
        self.last_time = Some(time);
        Ok(())
    }

    /// # Errors
    ///
    /// Fails unless the instance is in `ContinuousTimeMode`, or if `states`
    /// does not have one entry per continuous state.
    pub fn set_continuous_states(&mut self, states: &[f64]) -> Result<(), LifecycleError> {
        const OPERATION: &str = "set_continuous_states";
        self.ensure_allowed(OPERATION, &[ContinuousTimeMode])?;
        self.check_state_len(OPERATION, states.len())?;
        self.invoke(OPERATION, &[ContinuousTimeMode], false, |calls| {
            calls.set_continuous_states(states).map(with_unit)
        })?;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails unless the instance has completed `enter_initialization_mode`.
    pub fn get_continuous_states(&mut self) -> Result<Vec<f64>, LifecycleError> {
        let n = self.description.number_of_continuous_states;
        self.read_vector("get_continuous_states", n, |calls, out| {
            calls.get_continuous_states(out)
        })
    }

    /// # Errors
    ///
    /// Fails unless the instance has completed `enter_initialization_mode`.
    pub fn get_derivatives(&mut self) -> Result<Vec<f64>, LifecycleError> {
        let n = self.description.number_of_continuous_states;
        self.read_vector("get_derivatives", n, |calls, out| calls.get_derivatives(out))
    }

    /// # Errors
    ///
    /// Fails unless the instance has completed `enter_initialization_mode`.
    pub fn get_event_indicators(&mut self) -> Result<Vec<f64>, LifecycleError> {
        let n = self.description.number_of_event_indicators;
        self.read_vector("get_event_indicators", n, |calls, out| {
            calls.get_event_indicators(out)
        })
    }

    /// # Errors
    ///
    /// Fails unless the instance has completed `enter_initialization_mode`.
    pub fn get_nominals_of_continuous_states(&mut self) -> Result<Vec<f64>, LifecycleError> {
        let n = self.description.number_of_continuous_states;
        self.read_vector("get_nominals_of_continuous_states", n, |calls, out| {
            calls.get_nominals_of_continuous_states(out)
        })
    }

    /// Reports an accepted integrator step.
    ///
    /// # Errors
    ///
    /// Fails unless the instance is in `ContinuousTimeMode`.
    pub fn completed_integrator_step(
        &mut self,
        no_set_prior_state: bool,
    ) -> Result<IntegratorStepOutcome, LifecycleError> {
        let (_, outcome) = self.invoke(
            "completed_integrator_step",
            &[ContinuousTimeMode],
            false,
            |calls| calls.completed_integrator_step(no_set_prior_state),
        )?;
        Ok(outcome)
    }

    /// # Errors
    ///
    /// Fails unless the instance is in `ContinuousTimeMode` or `EventMode`.
    pub fn enter_event_mode(&mut self) -> Result<(), LifecycleError> {
        self.invoke("enter_event_mode", &[ContinuousTimeMode, EventMode], false, |calls| {
            calls.enter_event_mode().map(with_unit)
        })?;
        self.transition(EventMode);
        Ok(())
    }

    /// # Errors
    ///
    /// Fails unless the instance is in `EventMode`.
    pub fn new_discrete_states(&mut self) -> Result<EventInfo, LifecycleError> {
        let (_, info) = self.invoke("new_discrete_states", &[EventMode], false, |calls| {
            calls.new_discrete_states()
        })?;
        Ok(info)
    }

    /// # Errors
    ///
    /// Fails unless the instance is in `EventMode`.
    pub fn enter_continuous_time_mode(&mut self) -> Result<(), LifecycleError> {
        self.invoke("enter_continuous_time_mode", &[EventMode], false, |calls| {
            calls.enter_continuous_time_mode().map(with_unit)
        })?;
        self.transition(ContinuousTimeMode);
        Ok(())
    }

    /// Captures the component state, reusing `existing` when given.
    ///
    /// # Errors
    ///
    /// Fails if the instance is freed or fatal, or if the component cannot
    /// save its state.
    pub fn get_fmu_state(&mut self, existing: Option<FmuStateId>) -> Result<FmuStateId, LifecycleError> {
        self.require_rollback("get_fmu_state")?;
        let (_, id) = self.invoke("get_fmu_state", LIVE, false, |calls| {
            calls.get_fmu_state(existing)
        })?;
        Ok(id)
    }

    /// # Errors
    ///
    /// Fails if the instance is freed or fatal, or if the component cannot
    /// restore its state.
    pub fn set_fmu_state(&mut self, state: FmuStateId) -> Result<(), LifecycleError> {
        self.require_rollback("set_fmu_state")?;
        self.invoke("set_fmu_state", LIVE, false, |calls| {
            calls.set_fmu_state(state).map(with_unit)
        })?;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails if the instance is freed or fatal.
    pub fn free_fmu_state(&mut self, state: FmuStateId) -> Result<(), LifecycleError> {
        self.require_rollback("free_fmu_state")?;
        self.invoke("free_fmu_state", LIVE, false, |calls| {
            calls.free_fmu_state(state).map(with_unit)
        })?;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails if the instance is already terminated, freed, or fatal, or if the
    /// component reports an error.
    pub fn terminate(&mut self) -> Result<(), LifecycleError> {
        self.invoke(
            "terminate",
            &[Instantiated, InitializationMode, StepMode, EventMode, ContinuousTimeMode],
            false,
            |calls| calls.terminate().map(with_unit),
        )?;
        self.transition(Terminated);
        Ok(())
    }

    /// Returns the instance to `Instantiated`.
    ///
    /// # Errors
    ///
    /// Fails if the instance is freed or fatal, or if the component reports
    /// an error.
    pub fn reset(&mut self) -> Result<(), LifecycleError> {
        self.invoke("reset", LIVE, false, |calls| calls.reset().map(with_unit))?;
        self.last_time = None;
        self.transition(Instantiated);
        Ok(())
    }

    /// Releases the native instance.
    ///
    /// Legal from every state except `Freed`, including `Fatal`. The
    /// instance is considered freed even if the adapter fails.
    ///
    /// # Errors
    ///
    /// Fails if the instance is already freed, or with the adapter failure.
    pub fn free_instance(&mut self) -> Result<(), LifecycleError> {
        if self.state == Freed {
            return Err(self.sequence_error("free_instance").into());
        }
        let result = self.calls.free_instance();
        self.transition(Freed);
        result.map_err(|source| LifecycleError::Adapter {
            instance: self.name.clone(),
            operation: "free_instance",
            source,
        })
    }

    /// Guards, calls, and interprets the status of one native call.
    ///
    /// `Warning` is logged and treated as success. `Discard` is returned when
    /// `accept_discard` is set and is an error otherwise. `Fatal` and channel
    /// failures move the instance to `Fatal`.
    pub(crate) fn invoke<T>(
        &mut self,
        operation: &'static str,
        allowed: &[LifecycleState],
        accept_discard: bool,
        call: impl FnOnce(&mut dyn FmiCalls) -> CallResult<(Status, T)>,
    ) -> Result<(Status, T), LifecycleError> {
        self.ensure_allowed(operation, allowed)?;

        let (status, value) = match call(self.calls.as_mut()) {
            Ok(reply) => reply,
            Err(source) => {
                if source.is_channel() {
                    self.transition(Fatal);
                }
                return Err(LifecycleError::Adapter {
                    instance: self.name.clone(),
                    operation,
                    source,
                });
            }
        };

        match status {
            Status::Ok => Ok((status, value)),
            Status::Warning => {
                tracing::warn!(instance = %self.name, operation, "component returned a warning");
                Ok((status, value))
            }
            Status::Discard if accept_discard => {
                tracing::debug!(instance = %self.name, operation, "component discarded the call");
                Ok((status, value))
            }
            Status::Fatal => {
                self.transition(Fatal);
                Err(self.call_error(operation, status).into())
            }
            Status::Discard | Status::Error | Status::Pending => {
                Err(self.call_error(operation, status).into())
            }
        }
    }

    pub(crate) fn ensure_allowed(
        &self,
        operation: &'static str,
        allowed: &[LifecycleState],
    ) -> Result<(), SequenceError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(self.sequence_error(operation))
        }
    }

    fn read_vector(
        &mut self,
        operation: &'static str,
        len: usize,
        call: impl FnOnce(&mut dyn FmiCalls, &mut [f64]) -> CallResult<Status>,
    ) -> Result<Vec<f64>, LifecycleError> {
        let mut out = vec![0.0; len];
        self.invoke(operation, ME_READABLE, false, |calls| {
            call(calls, &mut out).map(with_unit)
        })?;
        Ok(out)
    }

    fn check_state_len(&self, operation: &'static str, actual: usize) -> Result<(), LifecycleError> {
        let expected = self.description.number_of_continuous_states;
        if actual == expected {
            Ok(())
        } else {
            Err(LifecycleError::LengthMismatch {
                operation,
                expected,
                actual,
            })
        }
    }

    fn require_rollback(&self, operation: &'static str) -> Result<(), LifecycleError> {
        if self.can_rollback() {
            Ok(())
        } else {
            Err(LifecycleError::Adapter {
                instance: self.name.clone(),
                operation,
                source: AdapterError::Unsupported { function: operation },
            })
        }
    }

    fn transition(&mut self, next: LifecycleState) {
        if self.state != next {
            tracing::debug!(instance = %self.name, from = %self.state, to = %next, "state change");
            self.state = next;
        }
    }

    fn sequence_error(&self, operation: &'static str) -> SequenceError {
        SequenceError {
            instance: self.name.clone(),
            operation,
            state: self.state,
        }
    }

    fn call_error(&self, operation: &'static str, status: Status) -> CallError {
        CallError {
            instance: self.name.clone(),
            operation,
            status,
            diagnostic: self.diagnostics.last(),
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("last_time", &self.last_time)
            .finish_non_exhaustive()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        if self.state != Freed {
            if let Err(error) = self.free_instance() {
                tracing::warn!(instance = %self.name, %error, "free on drop failed");
            }
        }
    }
}

fn with_unit(status: Status) -> (Status, ()) {
    (status, ())
}

#[cfg(test)]
mod tests;
