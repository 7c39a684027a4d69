//! Small scripted components for the unit tests of this crate.

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tandem_core::{
    CallResult, CallbackSink, Causality, EventInfo, FmiCalls, FmuStateId, Instance,
    InstanceOptions, InstantiateRequest, IntegratorStepOutcome, Interface, InterfaceKind,
    ModelDescription, ScalarVariable, Status, StatusKind, Value, ValueKind, ValueRef, Variability,
};

pub(crate) fn variable(
    name: &str,
    kind: ValueKind,
    value_ref: u32,
    causality: Causality,
    variability: Variability,
    start: Option<Value>,
) -> ScalarVariable {
    ScalarVariable {
        name: name.into(),
        kind,
        value_ref: ValueRef(value_ref),
        causality,
        variability,
        initial: None,
        start,
        unit: None,
        description: None,
    }
}

fn interface(id: &str, rollback: bool) -> Interface {
    Interface {
        model_identifier: id.into(),
        can_get_and_set_fmu_state: rollback,
        can_handle_variable_communication_step_size: true,
        needs_execution_tool: false,
    }
}

/// Creates an instance of `calls` and takes it through initialization.
pub(crate) fn initialized(
    calls: impl FmiCalls + 'static,
    description: ModelDescription,
    start: f64,
) -> Instance {
    let mut instance = Instance::instantiate(
        Box::new(calls),
        Arc::new(description),
        InstanceOptions::new("test"),
    )
    .unwrap();
    instance.setup_experiment(None, start, None).unwrap();
    instance.enter_initialization_mode().unwrap();
    instance.exit_initialization_mode().unwrap();
    instance
}

#[derive(Debug, Default)]
pub(crate) struct RampState {
    pub calls: Vec<&'static str>,
    pub time: f64,
    pub gain: f64,
    pub u: f64,
    pub steps: i32,
    /// Steps longer than this are discarded.
    pub max_step: Option<f64>,
    /// Steps reaching past this time terminate the component.
    pub terminate_at: Option<f64>,
    pub terminated: bool,
    saved: HashMap<u64, (f64, i32)>,
}

/// Co-simulation component with `y = gain * t + u`.
///
/// Variables: `y` (output, Real #0), `gain` (parameter, Real #1),
/// `u` (input, Real #2), `steps` (output, Integer #0).
#[derive(Clone, Default)]
pub(crate) struct Ramp(pub Arc<Mutex<RampState>>);

impl Ramp {
    pub fn new() -> Self {
        let ramp = Self::default();
        ramp.0.lock().gain = 1.0;
        ramp
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.0.lock().calls.clone()
    }

    pub fn description(rollback: bool) -> ModelDescription {
        ModelDescription {
            fmi_version: "2.0".into(),
            model_name: "Ramp".into(),
            guid: "{ramp}".into(),
            description: None,
            model_exchange: None,
            co_simulation: Some(interface("Ramp", rollback)),
            default_experiment: None,
            variables: vec![
                variable("y", ValueKind::Real, 0, Causality::Output, Variability::Continuous, None),
                variable("gain", ValueKind::Real, 1, Causality::Parameter, Variability::Fixed, Some(Value::Real(1.0))),
                variable("u", ValueKind::Real, 2, Causality::Input, Variability::Continuous, Some(Value::Real(0.0))),
                variable("steps", ValueKind::Integer, 0, Causality::Output, Variability::Discrete, None),
            ],
            number_of_continuous_states: 0,
            number_of_event_indicators: 0,
        }
    }

    fn record(&self, function: &'static str) {
        self.0.lock().calls.push(function);
    }
}

impl FmiCalls for Ramp {
    fn instantiate(&mut self, _: &InstantiateRequest, _: Arc<dyn CallbackSink>) -> CallResult<()> {
        self.record("instantiate");
        Ok(())
    }

    fn setup_experiment(&mut self, _: Option<f64>, start: f64, _: Option<f64>) -> CallResult<Status> {
        self.record("setup_experiment");
        self.0.lock().time = start;
        Ok(Status::Ok)
    }

    fn enter_initialization_mode(&mut self) -> CallResult<Status> {
        self.record("enter_initialization_mode");
        Ok(Status::Ok)
    }

    fn exit_initialization_mode(&mut self) -> CallResult<Status> {
        self.record("exit_initialization_mode");
        Ok(Status::Ok)
    }

    fn terminate(&mut self) -> CallResult<Status> {
        self.record("terminate");
        Ok(Status::Ok)
    }

    fn reset(&mut self) -> CallResult<Status> {
        self.record("reset");
        Ok(Status::Ok)
    }

    fn free_instance(&mut self) -> CallResult<()> {
        self.record("free_instance");
        Ok(())
    }

    fn get_real(&mut self, refs: &[ValueRef], values: &mut [f64]) -> CallResult<Status> {
        let state = self.0.lock();
        for (vr, out) in refs.iter().zip(values) {
            *out = match vr.0 {
                0 => state.gain * state.time + state.u,
                1 => state.gain,
                _ => state.u,
            };
        }
        Ok(Status::Ok)
    }

    fn get_integer(&mut self, _: &[ValueRef], values: &mut [i32]) -> CallResult<Status> {
        values.fill(self.0.lock().steps);
        Ok(Status::Ok)
    }

    fn get_boolean(&mut self, _: &[ValueRef], _: &mut [bool]) -> CallResult<Status> {
        Ok(Status::Ok)
    }

    fn set_real(&mut self, refs: &[ValueRef], values: &[f64]) -> CallResult<Status> {
        let mut state = self.0.lock();
        for (vr, value) in refs.iter().zip(values) {
            match vr.0 {
                1 => state.gain = *value,
                2 => state.u = *value,
                _ => {}
            }
        }
        Ok(Status::Ok)
    }

    fn set_integer(&mut self, _: &[ValueRef], _: &[i32]) -> CallResult<Status> {
        Ok(Status::Ok)
    }

    fn set_boolean(&mut self, _: &[ValueRef], _: &[bool]) -> CallResult<Status> {
        Ok(Status::Ok)
    }

    fn do_step(&mut self, t: f64, h: f64, _: bool) -> CallResult<Status> {
        let mut state = self.0.lock();
        state.calls.push("do_step");
        if let Some(stop) = state.terminate_at
            && t + h > stop + 1e-12
        {
            state.time = stop;
            state.terminated = true;
            return Ok(Status::Discard);
        }
        if state.max_step.is_some_and(|max| h > max + 1e-12) {
            return Ok(Status::Discard);
        }
        state.time = t + h;
        state.steps += 1;
        Ok(Status::Ok)
    }

    fn get_boolean_status(&mut self, kind: StatusKind) -> CallResult<(Status, bool)> {
        let state = self.0.lock();
        Ok((Status::Ok, kind == StatusKind::Terminated && state.terminated))
    }

    fn get_real_status(&mut self, _: StatusKind) -> CallResult<(Status, f64)> {
        Ok((Status::Ok, self.0.lock().time))
    }

    fn get_fmu_state(&mut self, existing: Option<FmuStateId>) -> CallResult<(Status, FmuStateId)> {
        let mut state = self.0.lock();
        state.calls.push("get_fmu_state");
        let id = existing.map_or(state.saved.len() as u64 + 1, |id| id.0);
        let snapshot = (state.time, state.steps);
        state.saved.insert(id, snapshot);
        Ok((Status::Ok, FmuStateId(id)))
    }

    fn set_fmu_state(&mut self, id: FmuStateId) -> CallResult<Status> {
        let mut state = self.0.lock();
        state.calls.push("set_fmu_state");
        if let Some(&(time, steps)) = state.saved.get(&id.0) {
            state.time = time;
            state.steps = steps;
        }
        Ok(Status::Ok)
    }
}

#[derive(Debug, Default)]
pub(crate) struct SawtoothState {
    pub calls: Vec<&'static str>,
    pub time: f64,
    pub x: f64,
    pub resets: i32,
    pub ticks: i32,
    /// Period of the component's time events.
    pub tick: Option<f64>,
    next_tick: Option<f64>,
}

/// Model-exchange component with `x' = 1` and a reset to zero whenever
/// `x` reaches one half.
///
/// Variables: `x` (output, Real #0), `resets` (output, Integer #0),
/// `ticks` (output, Integer #1). The indicator is `0.5 - x`. With a tick
/// period set, a time event every period increments `ticks`. A stateless
/// variant has no continuous states and only time events.
#[derive(Clone, Default)]
pub(crate) struct Sawtooth(pub Arc<Mutex<SawtoothState>>);

impl Sawtooth {
    pub fn with_tick(period: f64) -> Self {
        let sawtooth = Self::default();
        sawtooth.0.lock().tick = Some(period);
        sawtooth
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.0.lock().calls.clone()
    }

    pub fn description(stateless: bool) -> ModelDescription {
        let mut variables = vec![
            variable("x", ValueKind::Real, 0, Causality::Output, Variability::Continuous, None),
            variable("resets", ValueKind::Integer, 0, Causality::Output, Variability::Discrete, None),
            variable("ticks", ValueKind::Integer, 1, Causality::Output, Variability::Discrete, None),
        ];
        if stateless {
            variables.remove(0);
        }
        ModelDescription {
            fmi_version: "2.0".into(),
            model_name: "Sawtooth".into(),
            guid: "{sawtooth}".into(),
            description: None,
            model_exchange: Some(interface("Sawtooth", false)),
            co_simulation: None,
            default_experiment: None,
            variables,
            number_of_continuous_states: usize::from(!stateless),
            number_of_event_indicators: usize::from(!stateless),
        }
    }

    fn record(&self, function: &'static str) {
        self.0.lock().calls.push(function);
    }
}

impl FmiCalls for Sawtooth {
    fn instantiate(&mut self, _: &InstantiateRequest, _: Arc<dyn CallbackSink>) -> CallResult<()> {
        self.record("instantiate");
        Ok(())
    }

    fn setup_experiment(&mut self, _: Option<f64>, start: f64, _: Option<f64>) -> CallResult<Status> {
        let mut state = self.0.lock();
        state.time = start;
        state.next_tick = state.tick.map(|p| start + p);
        Ok(Status::Ok)
    }

    fn enter_initialization_mode(&mut self) -> CallResult<Status> {
        Ok(Status::Ok)
    }

    fn exit_initialization_mode(&mut self) -> CallResult<Status> {
        Ok(Status::Ok)
    }

    fn terminate(&mut self) -> CallResult<Status> {
        self.record("terminate");
        Ok(Status::Ok)
    }

    fn reset(&mut self) -> CallResult<Status> {
        Ok(Status::Ok)
    }

    fn free_instance(&mut self) -> CallResult<()> {
        self.record("free_instance");
        Ok(())
    }

    fn get_real(&mut self, _: &[ValueRef], values: &mut [f64]) -> CallResult<Status> {
        values.fill(self.0.lock().x);
        Ok(Status::Ok)
    }

    fn get_integer(&mut self, refs: &[ValueRef], values: &mut [i32]) -> CallResult<Status> {
        let state = self.0.lock();
        for (vr, out) in refs.iter().zip(values) {
            *out = if vr.0 == 0 { state.resets } else { state.ticks };
        }
        Ok(Status::Ok)
    }

    fn get_boolean(&mut self, _: &[ValueRef], _: &mut [bool]) -> CallResult<Status> {
        Ok(Status::Ok)
    }

    fn set_real(&mut self, _: &[ValueRef], _: &[f64]) -> CallResult<Status> {
        Ok(Status::Ok)
    }

    fn set_integer(&mut self, _: &[ValueRef], _: &[i32]) -> CallResult<Status> {
        Ok(Status::Ok)
    }

    fn set_boolean(&mut self, _: &[ValueRef], _: &[bool]) -> CallResult<Status> {
        Ok(Status::Ok)
    }

    fn set_time(&mut self, time: f64) -> CallResult<Status> {
        self.0.lock().time = time;
        Ok(Status::Ok)
    }

    fn set_continuous_states(&mut self, states: &[f64]) -> CallResult<Status> {
        self.0.lock().x = states[0];
        Ok(Status::Ok)
    }

    fn get_continuous_states(&mut self, states: &mut [f64]) -> CallResult<Status> {
        self.record("get_continuous_states");
        states[0] = self.0.lock().x;
        Ok(Status::Ok)
    }

    fn get_derivatives(&mut self, derivatives: &mut [f64]) -> CallResult<Status> {
        derivatives[0] = 1.0;
        Ok(Status::Ok)
    }

    fn get_event_indicators(&mut self, indicators: &mut [f64]) -> CallResult<Status> {
        indicators[0] = 0.5 - self.0.lock().x;
        Ok(Status::Ok)
    }

    fn completed_integrator_step(&mut self, _: bool) -> CallResult<(Status, IntegratorStepOutcome)> {
        Ok((Status::Ok, IntegratorStepOutcome::default()))
    }

    fn enter_event_mode(&mut self) -> CallResult<Status> {
        self.record("enter_event_mode");
        Ok(Status::Ok)
    }

    fn new_discrete_states(&mut self) -> CallResult<(Status, EventInfo)> {
        let mut state = self.0.lock();
        state.calls.push("new_discrete_states");
        if state.x >= 0.5 - 1e-6 {
            state.x = 0.0;
            state.resets += 1;
        }
        if let (Some(period), Some(next)) = (state.tick, state.next_tick)
            && state.time >= next - 1e-9
        {
            state.ticks += 1;
            state.next_tick = Some(next + period);
        }
        Ok((
            Status::Ok,
            EventInfo {
                values_of_continuous_states_changed: true,
                next_event_time: state.next_tick,
                ..EventInfo::default()
            },
        ))
    }

    fn enter_continuous_time_mode(&mut self) -> CallResult<Status> {
        self.record("enter_continuous_time_mode");
        Ok(Status::Ok)
    }
}
