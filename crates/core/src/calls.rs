use std::sync::Arc;

use thiserror::Error;

use crate::{
    callbacks::CallbackSink,
    description::InterfaceKind,
    status::{Status, StatusKind},
    value::ValueRef,
};

/// Result of a call through an [`FmiCalls`] implementation.
///
/// `Ok` carries whatever status the component reported, including `Error`
/// and `Fatal`. `Err` is reserved for failures of the adapter itself.
pub type CallResult<T> = Result<T, AdapterError>;

/// Failure of the transport between a proxy and its companion process.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel i/o failed")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("companion closed the channel")]
    Closed,

    #[error("channel is unusable after an earlier failure")]
    Poisoned,
}

/// Failure of an adapter, as opposed to a status reported by the component.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("component refused to instantiate: {reason}")]
    Instantiate { reason: String },

    #[error("`{function}` is not provided by this component")]
    Unsupported { function: &'static str },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("companion reported: {reason}")]
    Remote { reason: String },
}

impl AdapterError {
    pub(crate) fn unsupported(function: &'static str) -> Self {
        Self::Unsupported { function }
    }

    /// Returns true if the failure leaves the adapter unusable.
    #[must_use]
    pub fn is_channel(&self) -> bool {
        matches!(self, Self::Channel(_))
    }
}

/// Arguments passed to the component's instantiate entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstantiateRequest {
    pub instance_name: String,
    pub kind: InterfaceKind,
    pub guid: String,
    /// URI of the unpacked resources directory, possibly empty.
    pub resource_location: String,
    pub visible: bool,
    pub logging_on: bool,
}

/// Outcome of a discrete-state update during event iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EventInfo {
    pub new_discrete_states_needed: bool,
    pub terminate_simulation: bool,
    pub nominals_of_continuous_states_changed: bool,
    pub values_of_continuous_states_changed: bool,
    pub next_event_time: Option<f64>,
}

/// Flags returned by `completed_integrator_step`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegratorStepOutcome {
    pub enter_event_mode: bool,
    pub terminate_simulation: bool,
}

/// Opaque handle to a component state snapshot.
///
/// Handles are only meaningful to the adapter that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FmuStateId(pub u64);

/// The native call surface of one component instance.
///
/// Implemented by the in-process adapter and by the remote proxy, so the
/// lifecycle layer never knows which one it drives. Methods map one-to-one
/// onto the component's exported functions and perform no sequencing
/// checks of their own.
///
/// Interface-specific functions default to [`AdapterError::Unsupported`];
/// implementations override the ones they provide.
pub trait FmiCalls: Send {
    /// Creates the native instance.
    ///
    /// The sink receives every log message and asynchronous step
    /// notification for the lifetime of the instance.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Instantiate`] if the component returns no
    /// instance.
    fn instantiate(
        &mut self,
        request: &InstantiateRequest,
        sink: Arc<dyn CallbackSink>,
    ) -> CallResult<()>;

    fn setup_experiment(
        &mut self,
        tolerance: Option<f64>,
        start_time: f64,
        stop_time: Option<f64>,
    ) -> CallResult<Status>;

    fn enter_initialization_mode(&mut self) -> CallResult<Status>;

    fn exit_initialization_mode(&mut self) -> CallResult<Status>;

    fn terminate(&mut self) -> CallResult<Status>;

    fn reset(&mut self) -> CallResult<Status>;

    /// Releases the native instance. The component reports no status.
    fn free_instance(&mut self) -> CallResult<()>;

    fn get_real(&mut self, refs: &[ValueRef], values: &mut [f64]) -> CallResult<Status>;

    fn get_integer(&mut self, refs: &[ValueRef], values: &mut [i32]) -> CallResult<Status>;

    fn get_boolean(&mut self, refs: &[ValueRef], values: &mut [bool]) -> CallResult<Status>;

    fn get_string(&mut self, _refs: &[ValueRef], _values: &mut [String]) -> CallResult<Status> {
        Err(AdapterError::unsupported("get_string"))
    }

    fn set_real(&mut self, refs: &[ValueRef], values: &[f64]) -> CallResult<Status>;

    fn set_integer(&mut self, refs: &[ValueRef], values: &[i32]) -> CallResult<Status>;

    fn set_boolean(&mut self, refs: &[ValueRef], values: &[bool]) -> CallResult<Status>;

    fn set_string(&mut self, _refs: &[ValueRef], _values: &[String]) -> CallResult<Status> {
        Err(AdapterError::unsupported("set_string"))
    }

    fn do_step(
        &mut self,
        _current_time: f64,
        _step_size: f64,
        _no_set_prior_state: bool,
    ) -> CallResult<Status> {
        Err(AdapterError::unsupported("do_step"))
    }

    fn get_boolean_status(&mut self, _kind: StatusKind) -> CallResult<(Status, bool)> {
        Err(AdapterError::unsupported("get_boolean_status"))
    }

    fn get_real_status(&mut self, _kind: StatusKind) -> CallResult<(Status, f64)> {
        Err(AdapterError::unsupported("get_real_status"))
    }

    fn set_time(&mut self, _time: f64) -> CallResult<Status> {
        Err(AdapterError::unsupported("set_time"))
    }

    fn set_continuous_states(&mut self, _states: &[f64]) -> CallResult<Status> {
        Err(AdapterError::unsupported("set_continuous_states"))
    }

    fn get_continuous_states(&mut self, _states: &mut [f64]) -> CallResult<Status> {
        Err(AdapterError::unsupported("get_continuous_states"))
    }

    fn get_derivatives(&mut self, _derivatives: &mut [f64]) -> CallResult<Status> {
        Err(AdapterError::unsupported("get_derivatives"))
    }

    fn get_event_indicators(&mut self, _indicators: &mut [f64]) -> CallResult<Status> {
        Err(AdapterError::unsupported("get_event_indicators"))
    }

    fn get_nominals_of_continuous_states(&mut self, _nominals: &mut [f64]) -> CallResult<Status> {
        Err(AdapterError::unsupported("get_nominals_of_continuous_states"))
    }

    fn completed_integrator_step(
        &mut self,
        _no_set_prior_state: bool,
    ) -> CallResult<(Status, IntegratorStepOutcome)> {
        Err(AdapterError::unsupported("completed_integrator_step"))
    }

    fn enter_event_mode(&mut self) -> CallResult<Status> {
        Err(AdapterError::unsupported("enter_event_mode"))
    }

    fn new_discrete_states(&mut self) -> CallResult<(Status, EventInfo)> {
        Err(AdapterError::unsupported("new_discrete_states"))
    }

    fn enter_continuous_time_mode(&mut self) -> CallResult<Status> {
        Err(AdapterError::unsupported("enter_continuous_time_mode"))
    }

    /// Captures the component state, reusing `existing` when given.
    fn get_fmu_state(&mut self, _existing: Option<FmuStateId>) -> CallResult<(Status, FmuStateId)> {
        Err(AdapterError::unsupported("get_fmu_state"))
    }

    fn set_fmu_state(&mut self, _state: FmuStateId) -> CallResult<Status> {
        Err(AdapterError::unsupported("set_fmu_state"))
    }

    fn free_fmu_state(&mut self, _state: FmuStateId) -> CallResult<Status> {
        Err(AdapterError::unsupported("free_fmu_state"))
    }
}

impl<T: FmiCalls + ?Sized> FmiCalls for Box<T> {
    fn instantiate(
        &mut self,
        request: &InstantiateRequest,
        sink: Arc<dyn CallbackSink>,
    ) -> CallResult<()> {
        (**self).instantiate(request, sink)
    }

    fn setup_experiment(
        &mut self,
        tolerance: Option<f64>,
        start_time: f64,
        stop_time: Option<f64>,
    ) -> CallResult<Status> {
        (**self).setup_experiment(tolerance, start_time, stop_time)
    }

    fn enter_initialization_mode(&mut self) -> CallResult<Status> {
        (**self).enter_initialization_mode()
    }

    fn exit_initialization_mode(&mut self) -> CallResult<Status> {
        (**self).exit_initialization_mode()
    }

    fn terminate(&mut self) -> CallResult<Status> {
        (**self).terminate()
    }

    fn reset(&mut self) -> CallResult<Status> {
        (**self).reset()
    }

    fn free_instance(&mut self) -> CallResult<()> {
        (**self).free_instance()
    }

    fn get_real(&mut self, refs: &[ValueRef], values: &mut [f64]) -> CallResult<Status> {
        (**self).get_real(refs, values)
    }

    fn get_integer(&mut self, refs: &[ValueRef], values: &mut [i32]) -> CallResult<Status> {
        (**self).get_integer(refs, values)
    }

    fn get_boolean(&mut self, refs: &[ValueRef], values: &mut [bool]) -> CallResult<Status> {
        (**self).get_boolean(refs, values)
    }

    fn get_string(&mut self, refs: &[ValueRef], values: &mut [String]) -> CallResult<Status> {
        (**self).get_string(refs, values)
    }

    fn set_real(&mut self, refs: &[ValueRef], values: &[f64]) -> CallResult<Status> {
        (**self).set_real(refs, values)
    }

    fn set_integer(&mut self, refs: &[ValueRef], values: &[i32]) -> CallResult<Status> {
        (**self).set_integer(refs, values)
    }

    fn set_boolean(&mut self, refs: &[ValueRef], values: &[bool]) -> CallResult<Status> {
        (**self).set_boolean(refs, values)
    }

    fn set_string(&mut self, refs: &[ValueRef], values: &[String]) -> CallResult<Status> {
        (**self).set_string(refs, values)
    }

    fn do_step(
        &mut self,
        current_time: f64,
        step_size: f64,
        no_set_prior_state: bool,
    ) -> CallResult<Status> {
        (**self).do_step(current_time, step_size, no_set_prior_state)
    }

    fn get_boolean_status(&mut self, kind: StatusKind) -> CallResult<(Status, bool)> {
        (**self).get_boolean_status(kind)
    }

    fn get_real_status(&mut self, kind: StatusKind) -> CallResult<(Status, f64)> {
        (**self).get_real_status(kind)
    }

    fn set_time(&mut self, time: f64) -> CallResult<Status> {
        (**self).set_time(time)
    }

    fn set_continuous_states(&mut self, states: &[f64]) -> CallResult<Status> {
        (**self).set_continuous_states(states)
    }

    fn get_continuous_states(&mut self, states: &mut [f64]) -> CallResult<Status> {
        (**self).get_continuous_states(states)
    }

    fn get_derivatives(&mut self, derivatives: &mut [f64]) -> CallResult<Status> {
        (**self).get_derivatives(derivatives)
    }

    fn get_event_indicators(&mut self, indicators: &mut [f64]) -> CallResult<Status> {
        (**self).get_event_indicators(indicators)
    }

    fn get_nominals_of_continuous_states(&mut self, nominals: &mut [f64]) -> CallResult<Status> {
        (**self).get_nominals_of_continuous_states(nominals)
    }

    fn completed_integrator_step(
        &mut self,
        no_set_prior_state: bool,
    ) -> CallResult<(Status, IntegratorStepOutcome)> {
        (**self).completed_integrator_step(no_set_prior_state)
    }

    fn enter_event_mode(&mut self) -> CallResult<Status> {
        (**self).enter_event_mode()
    }

    fn new_discrete_states(&mut self) -> CallResult<(Status, EventInfo)> {
        (**self).new_discrete_states()
    }

    fn enter_continuous_time_mode(&mut self) -> CallResult<Status> {
        (**self).enter_continuous_time_mode()
    }

    fn get_fmu_state(&mut self, existing: Option<FmuStateId>) -> CallResult<(Status, FmuStateId)> {
        (**self).get_fmu_state(existing)
    }

    fn set_fmu_state(&mut self, state: FmuStateId) -> CallResult<Status> {
        (**self).set_fmu_state(state)
    }

    fn free_fmu_state(&mut self, state: FmuStateId) -> CallResult<Status> {
        (**self).free_fmu_state(state)
    }
}
