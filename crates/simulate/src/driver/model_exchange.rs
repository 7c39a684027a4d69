use std::{cell::RefCell, time::Instant};

use tandem_core::{EventKind, EventRecord, FmuStateId, Instance, ModelDescription, Row};
use tandem_solvers::{Advance, ContinuousSystem, Integrator, SystemError};

use crate::sampler::Sampler;

use super::{Driver, Progress, StepError};

const DEFAULT_MAX_EVENT_ITERATIONS: usize = 100;
const DEFAULT_MAX_EVENTS_PER_STEP: usize = 10_000;

/// Integrating driver for model-exchange components.
///
/// The integrator sees the component through [`InstanceSystem`]. After
/// every accepted integrator step the component is told about it and
/// decides, together with root crossings and its own time events, whether
/// event iteration runs. Each event restarts the integrator at the event
/// time, since its step history is no longer valid.
///
/// Components without continuous states are driven with a single dummy
/// state whose derivative is zero.
pub struct ModelExchange {
    integrator: Box<dyn Integrator>,
    states: usize,
    indicators: usize,
    time: f64,
    next_event_time: Option<f64>,
    max_event_iterations: usize,
    max_events_per_step: usize,
    deadline: Option<Instant>,
    saved: Option<(FmuStateId, f64)>,
}

impl ModelExchange {
    #[must_use]
    pub fn new(description: &ModelDescription, integrator: Box<dyn Integrator>) -> Self {
        Self {
            integrator,
            states: description.number_of_continuous_states,
            indicators: description.number_of_event_indicators,
            time: 0.0,
            next_event_time: None,
            max_event_iterations: DEFAULT_MAX_EVENT_ITERATIONS,
            max_events_per_step: DEFAULT_MAX_EVENTS_PER_STEP,
            deadline: None,
            saved: None,
        }
    }

    /// Caps the discrete-state updates allowed within one event.
    #[must_use]
    pub fn with_max_event_iterations(mut self, iterations: usize) -> Self {
        self.max_event_iterations = iterations.max(1);
        self
    }

    /// Caps the events handled within one call to [`Driver::step`].
    #[must_use]
    pub fn with_max_events_per_step(mut self, events: usize) -> Self {
        self.max_events_per_step = events.max(1);
        self
    }

    /// Time of the next component-scheduled event, if any.
    #[must_use]
    pub fn next_event_time(&self) -> Option<f64> {
        self.next_event_time
    }

    fn state_vector(&self, instance: &mut Instance) -> Result<Vec<f64>, StepError> {
        if self.states == 0 {
            Ok(vec![0.0])
        } else {
            Ok(instance.get_continuous_states()?)
        }
    }

    /// Updates discrete states until the component settles.
    ///
    /// Returns true if the component asked to end the simulation.
    fn iterate_discrete_states(&mut self, instance: &mut Instance, time: f64) -> Result<bool, StepError> {
        for _ in 0..self.max_event_iterations {
            let info = instance.new_discrete_states()?;
            if info.terminate_simulation {
                return Ok(true);
            }
            if !info.new_discrete_states_needed {
                self.next_event_time = info.next_event_time.filter(|&te| te > time);
                if info.next_event_time.is_some() && self.next_event_time.is_none() {
                    tracing::warn!(instance = %instance.name(), time, "ignoring next event time that is not in the future");
                }
                return Ok(false);
            }
        }
        Err(StepError::EventIteration {
            time,
            iterations: self.max_event_iterations,
        })
    }

    /// Handles one event at the current time.
    ///
    /// Returns true if the component asked to end the simulation.
    fn handle_event(
        &mut self,
        instance: &mut Instance,
        kind: EventKind,
        sampler: Option<&Sampler>,
        progress: &mut Progress,
    ) -> Result<bool, StepError> {
        let time = self.time;
        let before = sampler.map(|p| p.sample(instance)).transpose()?;

        instance.enter_event_mode()?;
        let terminated = self.iterate_discrete_states(instance, time)?;
        if !terminated {
            instance.enter_continuous_time_mode()?;
            let state = self.state_vector(instance)?;
            self.integrator.reset(time, &state);
        }

        let after = sampler.map(|p| p.sample(instance)).transpose()?;
        if let (Some(before), Some(after)) = (before, after) {
            let after = Row::new(time, after);
            // Events at one instant share a single bracket.
            #[allow(clippy::float_cmp)]
            match progress.brackets.last_mut() {
                Some((_, last)) if last.time == time => *last = after,
                _ => progress.brackets.push((Row::new(time, before), after)),
            }
        }

        tracing::debug!(instance = %instance.name(), time, ?kind, "event handled");
        progress.events.push(EventRecord::new(time, kind));
        if progress.events.len() > self.max_events_per_step {
            return Err(StepError::TooManyEvents {
                time,
                events: progress.events.len(),
            });
        }
        Ok(terminated)
    }

    fn time_event_due(&self, eps: f64) -> bool {
        self.next_event_time.is_some_and(|te| te <= self.time + eps)
    }

    fn check_deadline(&self) -> Result<(), StepError> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Err(StepError::DeadlinePassed { time: self.time })
            }
            _ => Ok(()),
        }
    }
}

impl Driver for ModelExchange {
    fn start(&mut self, instance: &mut Instance, time: f64) -> Result<Progress, StepError> {
        self.time = time;
        if self.iterate_discrete_states(instance, time)? {
            return Ok(Progress {
                terminated: true,
                ..Progress::at(time)
            });
        }
        instance.enter_continuous_time_mode()?;
        let state = self.state_vector(instance)?;
        self.integrator.reset(time, &state);
        Ok(Progress::at(time))
    }

    fn step(
        &mut self,
        instance: &mut Instance,
        t_end: f64,
        sampler: Option<&Sampler>,
    ) -> Result<Progress, StepError> {
        let eps = 1e-12 * t_end.abs().max(1.0);
        let mut progress = Progress::at(self.time);

        loop {
            self.check_deadline()?;
            if self.time_event_due(eps) {
                self.next_event_time = None;
                if self.handle_event(instance, EventKind::Time, sampler, &mut progress)? {
                    progress.terminated = true;
                    break;
                }
                continue;
            }
            if t_end - self.time <= eps {
                break;
            }

            let target = match self.next_event_time {
                Some(te) if te < t_end => te,
                _ => t_end,
            };
            let advance = {
                let system = InstanceSystem::new(instance, self.states, self.indicators);
                self.integrator.step(&system, target)?
            };

            let time = advance.time();
            let state = self.integrator.state().to_vec();
            instance.set_time(time)?;
            if self.states > 0 {
                instance.set_continuous_states(&state)?;
            }
            self.time = time;

            let outcome = instance.completed_integrator_step(true)?;
            if outcome.terminate_simulation {
                progress.terminated = true;
                break;
            }

            let kind = match advance {
                Advance::Root { crossings, .. } => Some(EventKind::State { roots: crossings }),
                Advance::Accepted { .. } if self.time_event_due(eps) => {
                    self.next_event_time = None;
                    Some(EventKind::Time)
                }
                Advance::Accepted { .. } if outcome.enter_event_mode => Some(EventKind::Step),
                Advance::Accepted { .. } => None,
            };
            if let Some(kind) = kind
                && self.handle_event(instance, kind, sampler, &mut progress)?
            {
                progress.terminated = true;
                break;
            }
        }

        progress.time = self.time;
        Ok(progress)
    }

    fn snapshot(&mut self, instance: &mut Instance) -> Result<FmuStateId, StepError> {
        let id = instance.get_fmu_state(self.saved.map(|(id, _)| id))?;
        self.saved = Some((id, self.time));
        Ok(id)
    }

    fn restore(&mut self, instance: &mut Instance, state: FmuStateId) -> Result<(), StepError> {
        instance.set_fmu_state(state)?;
        if let Some((id, time)) = self.saved
            && id == state
        {
            self.time = time;
        }
        instance.set_time(self.time)?;
        let state = self.state_vector(instance)?;
        self.integrator.reset(self.time, &state);
        Ok(())
    }

    fn time(&self) -> f64 {
        self.time
    }

    fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }
}

/// Presents an instance in continuous-time mode as a [`ContinuousSystem`].
///
/// Integrators only hold shared references to their system, so the
/// instance is borrowed mutably for each callback through a `RefCell`.
struct InstanceSystem<'a> {
    instance: RefCell<&'a mut Instance>,
    states: usize,
    indicators: usize,
}

impl<'a> InstanceSystem<'a> {
    fn new(instance: &'a mut Instance, states: usize, indicators: usize) -> Self {
        Self {
            instance: RefCell::new(instance),
            states,
            indicators,
        }
    }
}

impl ContinuousSystem for InstanceSystem<'_> {
    fn state_len(&self) -> usize {
        self.states.max(1)
    }

    fn indicator_len(&self) -> usize {
        self.indicators
    }

    fn apply_state(&self, time: f64, state: &[f64]) -> Result<(), SystemError> {
        let mut instance = self.instance.borrow_mut();
        instance.set_time(time)?;
        if self.states > 0 {
            instance.set_continuous_states(state)?;
        }
        Ok(())
    }

    fn derivatives(&self, out: &mut [f64]) -> Result<(), SystemError> {
        if self.states == 0 {
            out.fill(0.0);
            return Ok(());
        }
        let derivatives = self.instance.borrow_mut().get_derivatives()?;
        out.copy_from_slice(&derivatives);
        Ok(())
    }

    fn event_indicators(&self, out: &mut [f64]) -> Result<(), SystemError> {
        if self.indicators == 0 {
            return Ok(());
        }
        let indicators = self.instance.borrow_mut().get_event_indicators()?;
        out.copy_from_slice(&indicators);
        Ok(())
    }
}
