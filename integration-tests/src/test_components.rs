//! In-process components with known closed-form behavior.
//!
//! Each one implements [`FmiCalls`] directly, so the tests exercise the
//! lifecycle, drivers, coupling, and remoting layers without a native
//! library on disk.

use std::sync::Arc;

use parking_lot::Mutex;
use tandem_core::{
    Causality, Interface, ModelDescription, ScalarVariable, Value, ValueKind, ValueRef, Variability,
};

/// Names of the lifecycle functions a component saw, in call order.
pub type CallLog = Arc<Mutex<Vec<&'static str>>>;

fn variable(
    name: &str,
    kind: ValueKind,
    value_ref: u32,
    causality: Causality,
    variability: Variability,
    start: Option<f64>,
) -> ScalarVariable {
    ScalarVariable {
        name: name.into(),
        kind,
        value_ref: ValueRef(value_ref),
        causality,
        variability,
        initial: None,
        start: start.map(Value::Real),
        unit: None,
        description: None,
    }
}

fn real(name: &str, value_ref: u32, causality: Causality, start: Option<f64>) -> ScalarVariable {
    let variability = match causality {
        Causality::Parameter => Variability::Fixed,
        _ => Variability::Continuous,
    };
    variable(name, ValueKind::Real, value_ref, causality, variability, start)
}

fn interface(id: &str) -> Interface {
    Interface {
        model_identifier: id.into(),
        can_get_and_set_fmu_state: false,
        can_handle_variable_communication_step_size: true,
        needs_execution_tool: false,
    }
}

fn description(name: &str, co_simulation: bool, variables: Vec<ScalarVariable>) -> ModelDescription {
    let interface = interface(name);
    ModelDescription {
        fmi_version: "2.0".into(),
        model_name: name.into(),
        guid: format!("{{{}}}", name.to_lowercase()),
        description: None,
        model_exchange: (!co_simulation).then(|| interface.clone()),
        co_simulation: co_simulation.then_some(interface),
        default_experiment: None,
        variables,
        number_of_continuous_states: 0,
        number_of_event_indicators: 0,
    }
}

pub mod ball {
    use std::sync::Arc;

    use tandem_core::{
        CallResult, CallbackSink, Causality, EventInfo, FmiCalls, InstantiateRequest,
        IntegratorStepOutcome, ModelDescription, Status, ValueKind, ValueRef, Variability,
    };

    use super::{description, real, variable};

    pub const GRAVITY: f64 = 9.81;
    pub const RESTITUTION: f64 = 0.7;
    /// Rebound speed below which the ball comes to rest.
    pub const REST_SPEED: f64 = 0.1;

    /// A ball dropped from one meter onto a floor that returns 70% of its
    /// speed.
    ///
    /// States are height `h` and velocity `v`, and the single event
    /// indicator is the height. The integer output `bounces` counts floor
    /// contacts. A bounce slower than [`REST_SPEED`] leaves the ball resting
    /// on the floor, which keeps the bounce times from accumulating.
    #[derive(Debug, Clone)]
    pub struct BouncingBall {
        h: f64,
        v: f64,
        g: f64,
        e: f64,
        bounces: i32,
        resting: bool,
    }

    impl Default for BouncingBall {
        fn default() -> Self {
            Self {
                h: 1.0,
                v: 0.0,
                g: GRAVITY,
                e: RESTITUTION,
                bounces: 0,
                resting: false,
            }
        }
    }

    impl BouncingBall {
        #[must_use]
        pub fn description() -> ModelDescription {
            let mut description = description(
                "BouncingBall",
                false,
                vec![
                    real("h", 0, Causality::Output, Some(1.0)),
                    real("v", 1, Causality::Output, Some(0.0)),
                    real("der(h)", 2, Causality::Local, None),
                    real("der(v)", 3, Causality::Local, None),
                    real("g", 4, Causality::Parameter, Some(GRAVITY)),
                    real("e", 5, Causality::Parameter, Some(RESTITUTION)),
                    variable("bounces", ValueKind::Integer, 0, Causality::Output, Variability::Discrete, None),
                ],
            );
            description.number_of_continuous_states = 2;
            description.number_of_event_indicators = 1;
            description
        }

        fn acceleration(&self) -> f64 {
            if self.resting { 0.0 } else { -self.g }
        }
    }

    impl FmiCalls for BouncingBall {
        fn instantiate(&mut self, _: &InstantiateRequest, _: Arc<dyn CallbackSink>) -> CallResult<()> {
            Ok(())
        }

        fn setup_experiment(&mut self, _: Option<f64>, _: f64, _: Option<f64>) -> CallResult<Status> {
            Ok(Status::Ok)
        }

        fn enter_initialization_mode(&mut self) -> CallResult<Status> {
            Ok(Status::Ok)
        }

        fn exit_initialization_mode(&mut self) -> CallResult<Status> {
            Ok(Status::Ok)
        }

        fn terminate(&mut self) -> CallResult<Status> {
            Ok(Status::Ok)
        }

        fn reset(&mut self) -> CallResult<Status> {
            *self = Self {
                g: self.g,
                e: self.e,
                ..Self::default()
            };
            Ok(Status::Ok)
        }

        fn free_instance(&mut self) -> CallResult<()> {
            Ok(())
        }

        fn get_real(&mut self, refs: &[ValueRef], values: &mut [f64]) -> CallResult<Status> {
            for (vr, out) in refs.iter().zip(values) {
                *out = match vr.0 {
                    0 => self.h,
                    1 | 2 => self.v,
                    3 => self.acceleration(),
                    4 => self.g,
                    _ => self.e,
                };
            }
            Ok(Status::Ok)
        }

        fn get_integer(&mut self, _: &[ValueRef], values: &mut [i32]) -> CallResult<Status> {
            values.fill(self.bounces);
            Ok(Status::Ok)
        }

        fn get_boolean(&mut self, _: &[ValueRef], _: &mut [bool]) -> CallResult<Status> {
            Ok(Status::Ok)
        }

        fn set_real(&mut self, refs: &[ValueRef], values: &[f64]) -> CallResult<Status> {
            for (vr, &value) in refs.iter().zip(values) {
                match vr.0 {
                    0 => self.h = value,
                    1 => self.v = value,
                    4 => self.g = value,
                    5 => self.e = value,
                    _ => return Ok(Status::Error),
                }
            }
            Ok(Status::Ok)
        }

        fn set_integer(&mut self, _: &[ValueRef], _: &[i32]) -> CallResult<Status> {
            Ok(Status::Error)
        }

        fn set_boolean(&mut self, _: &[ValueRef], _: &[bool]) -> CallResult<Status> {
            Ok(Status::Error)
        }

        fn set_time(&mut self, _: f64) -> CallResult<Status> {
            Ok(Status::Ok)
        }

        fn set_continuous_states(&mut self, states: &[f64]) -> CallResult<Status> {
            self.h = states[0];
            self.v = states[1];
            Ok(Status::Ok)
        }

        fn get_continuous_states(&mut self, states: &mut [f64]) -> CallResult<Status> {
            states.copy_from_slice(&[self.h, self.v]);
            Ok(Status::Ok)
        }

        fn get_derivatives(&mut self, derivatives: &mut [f64]) -> CallResult<Status> {
            derivatives.copy_from_slice(&[self.v, self.acceleration()]);
            Ok(Status::Ok)
        }

        fn get_event_indicators(&mut self, indicators: &mut [f64]) -> CallResult<Status> {
            indicators[0] = self.h;
            Ok(Status::Ok)
        }

        fn get_nominals_of_continuous_states(&mut self, nominals: &mut [f64]) -> CallResult<Status> {
            nominals.fill(1.0);
            Ok(Status::Ok)
        }

        fn completed_integrator_step(&mut self, _: bool) -> CallResult<(Status, IntegratorStepOutcome)> {
            Ok((Status::Ok, IntegratorStepOutcome::default()))
        }

        fn enter_event_mode(&mut self) -> CallResult<Status> {
            Ok(Status::Ok)
        }

        fn new_discrete_states(&mut self) -> CallResult<(Status, EventInfo)> {
            let bounced = self.h <= 0.0 && self.v < 0.0;
            if bounced {
                self.h = 0.0;
                self.v = -self.e * self.v;
                self.bounces += 1;
                if self.v < REST_SPEED {
                    self.v = 0.0;
                    self.resting = true;
                }
            }
            Ok((
                Status::Ok,
                EventInfo {
                    values_of_continuous_states_changed: bounced,
                    ..EventInfo::default()
                },
            ))
        }

        fn enter_continuous_time_mode(&mut self) -> CallResult<Status> {
            Ok(Status::Ok)
        }
    }
}

pub mod decay {
    use std::sync::Arc;

    use tandem_core::{
        CallResult, CallbackSink, Causality, EventInfo, FmiCalls, InstantiateRequest,
        IntegratorStepOutcome, ModelDescription, Status, ValueRef,
    };

    use super::{CallLog, description, real};

    /// `x' = -k x` with `x(0) = 1` and `k = 1` unless set otherwise.
    #[derive(Debug, Clone)]
    pub struct Decay {
        pub log: CallLog,
        x: f64,
        k: f64,
    }

    impl Default for Decay {
        fn default() -> Self {
            Self {
                log: CallLog::default(),
                x: 1.0,
                k: 1.0,
            }
        }
    }

    impl Decay {
        #[must_use]
        pub fn description() -> ModelDescription {
            let mut description = description(
                "Decay",
                false,
                vec![
                    real("x", 0, Causality::Output, Some(1.0)),
                    real("k", 1, Causality::Parameter, Some(1.0)),
                    real("der(x)", 2, Causality::Local, None),
                ],
            );
            description.number_of_continuous_states = 1;
            description
        }

        fn record(&self, function: &'static str) {
            self.log.lock().push(function);
        }
    }

    impl FmiCalls for Decay {
        fn instantiate(&mut self, _: &InstantiateRequest, _: Arc<dyn CallbackSink>) -> CallResult<()> {
            self.record("instantiate");
            Ok(())
        }

        fn setup_experiment(&mut self, _: Option<f64>, _: f64, _: Option<f64>) -> CallResult<Status> {
            self.record("setup_experiment");
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
            self.x = 1.0;
            Ok(Status::Ok)
        }

        fn free_instance(&mut self) -> CallResult<()> {
            self.record("free_instance");
            Ok(())
        }

        fn get_real(&mut self, refs: &[ValueRef], values: &mut [f64]) -> CallResult<Status> {
            for (vr, out) in refs.iter().zip(values) {
                *out = match vr.0 {
                    0 => self.x,
                    1 => self.k,
                    _ => -self.k * self.x,
                };
            }
            Ok(Status::Ok)
        }

        fn get_integer(&mut self, _: &[ValueRef], _: &mut [i32]) -> CallResult<Status> {
            Ok(Status::Ok)
        }

        fn get_boolean(&mut self, _: &[ValueRef], _: &mut [bool]) -> CallResult<Status> {
            Ok(Status::Ok)
        }

        fn set_real(&mut self, refs: &[ValueRef], values: &[f64]) -> CallResult<Status> {
            self.record("set_real");
            for (vr, &value) in refs.iter().zip(values) {
                match vr.0 {
                    0 => self.x = value,
                    1 => self.k = value,
                    _ => return Ok(Status::Error),
                }
            }
            Ok(Status::Ok)
        }

        fn set_integer(&mut self, _: &[ValueRef], _: &[i32]) -> CallResult<Status> {
            Ok(Status::Error)
        }

        fn set_boolean(&mut self, _: &[ValueRef], _: &[bool]) -> CallResult<Status> {
            Ok(Status::Error)
        }

        fn set_time(&mut self, _: f64) -> CallResult<Status> {
            Ok(Status::Ok)
        }

        fn set_continuous_states(&mut self, states: &[f64]) -> CallResult<Status> {
            self.x = states[0];
            Ok(Status::Ok)
        }

        fn get_continuous_states(&mut self, states: &mut [f64]) -> CallResult<Status> {
            states[0] = self.x;
            Ok(Status::Ok)
        }

        fn get_derivatives(&mut self, derivatives: &mut [f64]) -> CallResult<Status> {
            derivatives[0] = -self.k * self.x;
            Ok(Status::Ok)
        }

        fn get_event_indicators(&mut self, _: &mut [f64]) -> CallResult<Status> {
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
            self.record("new_discrete_states");
            Ok((Status::Ok, EventInfo::default()))
        }

        fn enter_continuous_time_mode(&mut self) -> CallResult<Status> {
            self.record("enter_continuous_time_mode");
            Ok(Status::Ok)
        }
    }
}

pub mod signals {
    use std::sync::Arc;

    use tandem_core::{
        CallResult, CallbackSink, Causality, FmiCalls, InstantiateRequest, ModelDescription,
        Status, ValueRef,
    };

    use super::{CallLog, description, real};

    /// Co-simulation source with `y = amplitude * sin(omega * t)`.
    #[derive(Debug, Clone)]
    pub struct Sine {
        time: f64,
        amplitude: f64,
        omega: f64,
    }

    impl Default for Sine {
        fn default() -> Self {
            Self {
                time: 0.0,
                amplitude: 1.0,
                omega: 1.0,
            }
        }
    }

    impl Sine {
        #[must_use]
        pub fn description() -> ModelDescription {
            description(
                "Sine",
                true,
                vec![
                    real("y", 0, Causality::Output, None),
                    real("amplitude", 1, Causality::Parameter, Some(1.0)),
                    real("omega", 2, Causality::Parameter, Some(1.0)),
                ],
            )
        }
    }

    impl FmiCalls for Sine {
        fn instantiate(&mut self, _: &InstantiateRequest, _: Arc<dyn CallbackSink>) -> CallResult<()> {
            Ok(())
        }

        fn setup_experiment(&mut self, _: Option<f64>, start: f64, _: Option<f64>) -> CallResult<Status> {
            self.time = start;
            Ok(Status::Ok)
        }

        fn enter_initialization_mode(&mut self) -> CallResult<Status> {
            Ok(Status::Ok)
        }

        fn exit_initialization_mode(&mut self) -> CallResult<Status> {
            Ok(Status::Ok)
        }

        fn terminate(&mut self) -> CallResult<Status> {
            Ok(Status::Ok)
        }

        fn reset(&mut self) -> CallResult<Status> {
            self.time = 0.0;
            Ok(Status::Ok)
        }

        fn free_instance(&mut self) -> CallResult<()> {
            Ok(())
        }

        fn get_real(&mut self, refs: &[ValueRef], values: &mut [f64]) -> CallResult<Status> {
            for (vr, out) in refs.iter().zip(values) {
                *out = match vr.0 {
                    0 => self.amplitude * (self.omega * self.time).sin(),
                    1 => self.amplitude,
                    _ => self.omega,
                };
            }
            Ok(Status::Ok)
        }

        fn get_integer(&mut self, _: &[ValueRef], _: &mut [i32]) -> CallResult<Status> {
            Ok(Status::Ok)
        }

        fn get_boolean(&mut self, _: &[ValueRef], _: &mut [bool]) -> CallResult<Status> {
            Ok(Status::Ok)
        }

        fn set_real(&mut self, refs: &[ValueRef], values: &[f64]) -> CallResult<Status> {
            for (vr, &value) in refs.iter().zip(values) {
                match vr.0 {
                    1 => self.amplitude = value,
                    2 => self.omega = value,
                    _ => return Ok(Status::Error),
                }
            }
            Ok(Status::Ok)
        }

        fn set_integer(&mut self, _: &[ValueRef], _: &[i32]) -> CallResult<Status> {
            Ok(Status::Error)
        }

        fn set_boolean(&mut self, _: &[ValueRef], _: &[bool]) -> CallResult<Status> {
            Ok(Status::Error)
        }

        fn do_step(&mut self, time: f64, step: f64, _: bool) -> CallResult<Status> {
            self.time = time + step;
            Ok(Status::Ok)
        }
    }

    /// Co-simulation block with `y = k * u`, logging its lifecycle calls.
    #[derive(Debug, Clone)]
    pub struct Gain {
        pub log: CallLog,
        u: f64,
        k: f64,
    }

    impl Default for Gain {
        fn default() -> Self {
            Self {
                log: CallLog::default(),
                u: 0.0,
                k: 1.0,
            }
        }
    }

    impl Gain {
        #[must_use]
        pub fn description() -> ModelDescription {
            description(
                "Gain",
                true,
                vec![
                    real("y", 0, Causality::Output, None),
                    real("u", 1, Causality::Input, Some(0.0)),
                    real("k", 2, Causality::Parameter, Some(1.0)),
                ],
            )
        }

        fn record(&self, function: &'static str) {
            self.log.lock().push(function);
        }
    }

    impl FmiCalls for Gain {
        fn instantiate(&mut self, _: &InstantiateRequest, _: Arc<dyn CallbackSink>) -> CallResult<()> {
            self.record("instantiate");
            Ok(())
        }

        fn setup_experiment(&mut self, _: Option<f64>, _: f64, _: Option<f64>) -> CallResult<Status> {
            self.record("setup_experiment");
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
            self.u = 0.0;
            Ok(Status::Ok)
        }

        fn free_instance(&mut self) -> CallResult<()> {
            self.record("free_instance");
            Ok(())
        }

        fn get_real(&mut self, refs: &[ValueRef], values: &mut [f64]) -> CallResult<Status> {
            for (vr, out) in refs.iter().zip(values) {
                *out = match vr.0 {
                    0 => self.k * self.u,
                    1 => self.u,
                    _ => self.k,
                };
            }
            Ok(Status::Ok)
        }

        fn get_integer(&mut self, _: &[ValueRef], _: &mut [i32]) -> CallResult<Status> {
            Ok(Status::Ok)
        }

        fn get_boolean(&mut self, _: &[ValueRef], _: &mut [bool]) -> CallResult<Status> {
            Ok(Status::Ok)
        }

        fn set_real(&mut self, refs: &[ValueRef], values: &[f64]) -> CallResult<Status> {
            self.record("set_real");
            for (vr, &value) in refs.iter().zip(values) {
                match vr.0 {
                    1 => self.u = value,
                    2 => self.k = value,
                    _ => return Ok(Status::Error),
                }
            }
            Ok(Status::Ok)
        }

        fn set_integer(&mut self, _: &[ValueRef], _: &[i32]) -> CallResult<Status> {
            Ok(Status::Error)
        }

        fn set_boolean(&mut self, _: &[ValueRef], _: &[bool]) -> CallResult<Status> {
            Ok(Status::Error)
        }

        fn do_step(&mut self, _: f64, _: f64, _: bool) -> CallResult<Status> {
            self.record("do_step");
            Ok(Status::Ok)
        }
    }
}
