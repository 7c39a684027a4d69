//! Scripted call surface shared by the unit tests of this crate.

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;

use crate::{
    callbacks::{CallbackSink, LogMessage},
    calls::{CallResult, EventInfo, FmiCalls, FmuStateId, InstantiateRequest, IntegratorStepOutcome},
    description::{Causality, Interface, ModelDescription, ScalarVariable, Variability},
    status::{Status, StatusKind},
    value::{Value, ValueKind, ValueRef},
};

#[derive(Default)]
pub(crate) struct Shared {
    pub calls: Vec<&'static str>,
    pub statuses: HashMap<&'static str, Status>,
    pub reals: HashMap<u32, f64>,
    pub integers: HashMap<u32, i32>,
    pub booleans: HashMap<u32, bool>,
    pub sink: Option<Arc<dyn CallbackSink>>,
}

/// Records every call and answers with scripted statuses (default `Ok`).
#[derive(Clone, Default)]
pub(crate) struct FakeCalls(pub Arc<Mutex<Shared>>);

impl FakeCalls {
    pub fn calls(&self) -> Vec<&'static str> {
        self.0.lock().calls.clone()
    }

    pub fn script(&self, function: &'static str, status: Status) {
        self.0.lock().statuses.insert(function, status);
    }

    fn record(&self, function: &'static str) -> Status {
        let mut shared = self.0.lock();
        shared.calls.push(function);
        let status = shared.statuses.get(function).copied().unwrap_or(Status::Ok);
        let sink = shared.sink.clone();
        drop(shared);
        if status == Status::Error
            && let Some(sink) = sink
        {
            sink.log(&LogMessage {
                instance: "fake".into(),
                status,
                category: "logStatusError".into(),
                message: format!("{function} failed"),
            });
        }
        status
    }
}

impl FmiCalls for FakeCalls {
    fn instantiate(&mut self, _: &InstantiateRequest, sink: Arc<dyn CallbackSink>) -> CallResult<()> {
        self.0.lock().sink = Some(sink);
        self.record("instantiate");
        Ok(())
    }

    fn setup_experiment(&mut self, _: Option<f64>, _: f64, _: Option<f64>) -> CallResult<Status> {
        Ok(self.record("setup_experiment"))
    }

    fn enter_initialization_mode(&mut self) -> CallResult<Status> {
        Ok(self.record("enter_initialization_mode"))
    }

    fn exit_initialization_mode(&mut self) -> CallResult<Status> {
        Ok(self.record("exit_initialization_mode"))
    }

    fn terminate(&mut self) -> CallResult<Status> {
        Ok(self.record("terminate"))
    }

    fn reset(&mut self) -> CallResult<Status> {
        Ok(self.record("reset"))
    }

    fn free_instance(&mut self) -> CallResult<()> {
        self.record("free_instance");
        Ok(())
    }

    fn get_real(&mut self, refs: &[ValueRef], values: &mut [f64]) -> CallResult<Status> {
        let status = self.record("get_real");
        let shared = self.0.lock();
        for (r, v) in refs.iter().zip(values.iter_mut()) {
            *v = shared.reals.get(&r.0).copied().unwrap_or_default();
        }
        Ok(status)
    }

    fn get_integer(&mut self, refs: &[ValueRef], values: &mut [i32]) -> CallResult<Status> {
        let status = self.record("get_integer");
        let shared = self.0.lock();
        for (r, v) in refs.iter().zip(values.iter_mut()) {
            *v = shared.integers.get(&r.0).copied().unwrap_or_default();
        }
        Ok(status)
    }

    fn get_boolean(&mut self, refs: &[ValueRef], values: &mut [bool]) -> CallResult<Status> {
        let status = self.record("get_boolean");
        let shared = self.0.lock();
        for (r, v) in refs.iter().zip(values.iter_mut()) {
            *v = shared.booleans.get(&r.0).copied().unwrap_or_default();
        }
        Ok(status)
    }

    fn set_real(&mut self, refs: &[ValueRef], values: &[f64]) -> CallResult<Status> {
        let status = self.record("set_real");
        let mut shared = self.0.lock();
        for (r, v) in refs.iter().zip(values) {
            shared.reals.insert(r.0, *v);
        }
        Ok(status)
    }

    fn set_integer(&mut self, refs: &[ValueRef], values: &[i32]) -> CallResult<Status> {
        let status = self.record("set_integer");
        let mut shared = self.0.lock();
        for (r, v) in refs.iter().zip(values) {
            shared.integers.insert(r.0, *v);
        }
        Ok(status)
    }

    fn set_boolean(&mut self, refs: &[ValueRef], values: &[bool]) -> CallResult<Status> {
        let status = self.record("set_boolean");
        let mut shared = self.0.lock();
        for (r, v) in refs.iter().zip(values) {
            shared.booleans.insert(r.0, *v);
        }
        Ok(status)
    }

    fn do_step(&mut self, _: f64, _: f64, _: bool) -> CallResult<Status> {
        Ok(self.record("do_step"))
    }

    fn get_boolean_status(&mut self, _: StatusKind) -> CallResult<(Status, bool)> {
        Ok((self.record("get_boolean_status"), true))
    }

    fn set_time(&mut self, _: f64) -> CallResult<Status> {
        Ok(self.record("set_time"))
    }

    fn set_continuous_states(&mut self, _: &[f64]) -> CallResult<Status> {
        Ok(self.record("set_continuous_states"))
    }

    fn get_continuous_states(&mut self, states: &mut [f64]) -> CallResult<Status> {
        states.fill(1.0);
        Ok(self.record("get_continuous_states"))
    }

    fn get_derivatives(&mut self, derivatives: &mut [f64]) -> CallResult<Status> {
        derivatives.fill(-1.0);
        Ok(self.record("get_derivatives"))
    }

    fn get_event_indicators(&mut self, indicators: &mut [f64]) -> CallResult<Status> {
        indicators.fill(0.5);
        Ok(self.record("get_event_indicators"))
    }

    fn completed_integrator_step(&mut self, _: bool) -> CallResult<(Status, IntegratorStepOutcome)> {
        Ok((self.record("completed_integrator_step"), IntegratorStepOutcome::default()))
    }

    fn enter_event_mode(&mut self) -> CallResult<Status> {
        Ok(self.record("enter_event_mode"))
    }

    fn new_discrete_states(&mut self) -> CallResult<(Status, EventInfo)> {
        Ok((self.record("new_discrete_states"), EventInfo::default()))
    }

    fn enter_continuous_time_mode(&mut self) -> CallResult<Status> {
        Ok(self.record("enter_continuous_time_mode"))
    }

    fn get_fmu_state(&mut self, _: Option<FmuStateId>) -> CallResult<(Status, FmuStateId)> {
        Ok((self.record("get_fmu_state"), FmuStateId(7)))
    }

    fn set_fmu_state(&mut self, _: FmuStateId) -> CallResult<Status> {
        Ok(self.record("set_fmu_state"))
    }

    fn free_fmu_state(&mut self, _: FmuStateId) -> CallResult<Status> {
        Ok(self.record("free_fmu_state"))
    }
}

fn variable(
    name: &str,
    kind: ValueKind,
    vr: u32,
    causality: Causality,
    variability: Variability,
) -> ScalarVariable {
    ScalarVariable {
        name: name.into(),
        kind,
        value_ref: ValueRef(vr),
        causality,
        variability,
        initial: None,
        start: None,
        unit: None,
        description: None,
    }
}

/// Descriptor offering both interfaces, two states, and one indicator.
///
/// Variables: `k` (fixed Real parameter, #0), `u` (Real input, #1),
/// `y` (calculated Real output, #2), `n` (tunable Integer parameter, #0),
/// `flag` (Boolean input, #0).
pub(crate) fn description() -> Arc<ModelDescription> {
    use Causality::*;
    use Variability::*;

    let interface = Interface {
        model_identifier: "fake".into(),
        can_get_and_set_fmu_state: true,
        can_handle_variable_communication_step_size: true,
        needs_execution_tool: false,
    };
    let mut k = variable("k", ValueKind::Real, 0, Parameter, Fixed);
    k.start = Some(Value::Real(1.0));

    Arc::new(ModelDescription {
        fmi_version: "2.0".into(),
        model_name: "Fake".into(),
        guid: "{fake}".into(),
        description: None,
        model_exchange: Some(interface.clone()),
        co_simulation: Some(interface),
        default_experiment: None,
        variables: vec![
            k,
            variable("u", ValueKind::Real, 1, Input, Continuous),
            variable("y", ValueKind::Real, 2, Output, Continuous),
            variable("n", ValueKind::Integer, 0, Parameter, Tunable),
            variable("flag", ValueKind::Boolean, 0, Input, Discrete),
        ],
        number_of_continuous_states: 2,
        number_of_event_indicators: 1,
    })
}
