//! Single-instance simulation runs.
//!
//! [`simulate`] owns one instance from instantiation to teardown:
//!
//! 1. apply start values and set up the experiment
//! 2. initialize, with table inputs at the start time
//! 3. advance with the driver chosen for the interface kind, sampling rows
//!    on the output grid and bracketing events
//! 4. terminate and free, also when the run fails
//!
//! An [`Observer`] sees every row and event as it is produced and may stop
//! the run early.

mod error;

#[cfg(test)]
mod tests;

pub use error::{RunError, SimulationError};

use std::{
    ops::ControlFlow,
    sync::Arc,
    time::{Duration, Instant},
};

use tandem_core::{
    EventRecord, FmiCalls, Instance, InstanceOptions, InterfaceKind, LifecycleError,
    LifecycleState, ModelDescription, Observer, Row, SimulationResult,
};

use crate::{
    config::SimulationConfig,
    driver::{Driver, Progress, driver_for},
    grid::OutputGrid,
    inputs::InputTable,
    sampler::Sampler,
};

/// Control actions supported by a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// End the run after the current row or event.
    StopEarly,
}

/// Something a run produced, in the order it was produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Row(Row),
    Event(EventRecord),
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Reached the stop time.
    Complete,
    /// The component ended the simulation before the stop time.
    Terminated,
    /// An observer stopped the run.
    StoppedByObserver,
}

/// The result of a successful run.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub result: SimulationResult,
    /// Handled events, empty unless the configuration records them.
    pub events: Vec<EventRecord>,
    pub status: Completion,
    /// Time of the last recorded row.
    pub final_time: f64,
}

/// Runs one component from instantiation to teardown.
///
/// The instance is terminated and freed on every path. A failure during
/// the run takes precedence over a failure during teardown.
///
/// # Errors
///
/// Returns a [`SimulationError`] naming the instance and the last time it
/// reached.
pub fn simulate<O>(
    calls: Box<dyn FmiCalls>,
    description: Arc<ModelDescription>,
    options: InstanceOptions,
    config: &SimulationConfig,
    inputs: Option<&InputTable>,
    observer: O,
) -> Result<Outcome, SimulationError>
where
    O: Observer<RunEvent, Action>,
{
    let name = options.name().to_owned();
    let fail = |source: RunError, last_time: Option<f64>| SimulationError {
        instance: name.clone(),
        last_time,
        source,
    };

    config.validate().map_err(|err| fail(err.into(), None))?;
    let sampler = Sampler::named(&description, &config.outputs).map_err(|err| fail(err.into(), None))?;
    let options = if config.logging_on {
        options.logging_on(true)
    } else {
        options
    };
    let mut instance =
        Instance::instantiate(calls, description, options).map_err(|err| fail(err.into(), None))?;

    tracing::info!(
        instance = %name,
        kind = ?instance.kind(),
        start = config.start_time,
        stop = config.stop_time,
        "simulation started"
    );

    let run = Run::new(config, inputs, sampler, observer);
    match run.execute(&mut instance) {
        Ok(outcome) => {
            teardown(&mut instance).map_err(|err| fail(err.into(), Some(outcome.final_time)))?;
            tracing::info!(
                instance = %name,
                time = outcome.final_time,
                status = ?outcome.status,
                rows = outcome.result.len(),
                "simulation finished"
            );
            Ok(outcome)
        }
        Err(source) => {
            let last_time = instance.last_time();
            if let Err(err) = teardown(&mut instance) {
                tracing::warn!(instance = %name, error = %err, "teardown after failed run also failed");
            }
            Err(fail(source, last_time))
        }
    }
}

/// Terminates, when the state allows it, and frees `instance`.
///
/// Both steps are attempted. Returns the first failure.
pub(crate) fn teardown(instance: &mut Instance) -> Result<(), LifecycleError> {
    use LifecycleState::{
        ContinuousTimeMode, EventMode, Freed, InitializationMode, Instantiated, StepMode,
    };

    let terminated = match instance.state() {
        Instantiated | InitializationMode | StepMode | EventMode | ContinuousTimeMode => {
            instance.terminate()
        }
        _ => Ok(()),
    };
    let freed = if instance.state() == Freed {
        Ok(())
    } else {
        instance.free_instance()
    };
    terminated.and(freed)
}

struct Run<'a, O> {
    config: &'a SimulationConfig,
    inputs: Option<&'a InputTable>,
    sampler: Sampler,
    observer: O,
    result: SimulationResult,
    events: Vec<EventRecord>,
    started: Instant,
    timeout: Option<Duration>,
}

impl<'a, O> Run<'a, O>
where
    O: Observer<RunEvent, Action>,
{
    fn new(
        config: &'a SimulationConfig,
        inputs: Option<&'a InputTable>,
        sampler: Sampler,
        observer: O,
    ) -> Self {
        let result = SimulationResult::new(sampler.columns().to_vec());
        Self {
            config,
            inputs,
            sampler,
            observer,
            result,
            events: Vec::new(),
            started: Instant::now(),
            timeout: config.timeout(),
        }
    }

    fn execute(mut self, instance: &mut Instance) -> Result<Outcome, RunError> {
        let start = self.config.start_time;

        instance
            .variables()
            .set_start_values(&self.config.start_value_list())?;
        instance.setup_experiment(self.config.tolerance, start, Some(self.config.stop_time))?;
        instance.enter_initialization_mode()?;
        self.apply_inputs(instance, start)?;
        instance.exit_initialization_mode()?;

        let mut driver = driver_for(instance, self.config)?;
        driver.set_deadline(self.timeout.map(|limit| self.started + limit));
        let progress = driver.start(instance, start)?;

        let values = self.sampler.sample(instance)?;
        if let ControlFlow::Break(status) = self.push_row(Row::new(start, values))? {
            return Ok(self.finish(status));
        }
        if progress.terminated {
            return Ok(self.finish(Completion::Terminated));
        }

        let status = match instance.kind() {
            InterfaceKind::CoSimulation => self.co_simulation(instance, driver.as_mut())?,
            InterfaceKind::ModelExchange => self.model_exchange(instance, driver.as_mut())?,
        };
        Ok(self.finish(status))
    }

    /// Steps on the communication grid and fills the output grid.
    ///
    /// Output points between communication points are interpolated.
    fn co_simulation(
        &mut self,
        instance: &mut Instance,
        driver: &mut dyn Driver,
    ) -> Result<Completion, RunError> {
        let config = self.config;
        let steps = OutputGrid::new(config.start_time, config.stop_time, config.step_size)?;
        let outputs = OutputGrid::new(config.start_time, config.stop_time, config.output_interval())?;
        let eps = outputs.epsilon();

        let mut previous = (config.start_time, self.sampler.sample(instance)?);
        let mut next_output = 1;

        for t_end in steps.iter().skip(1) {
            let time = driver.time();
            self.check_timeout(time)?;
            self.apply_inputs(instance, time)?;

            let progress = driver
                .step(instance, t_end, None)
                .map_err(|err| RunError::from_step(err, self.timeout))?;
            let current = (progress.time, self.sampler.sample(instance)?);

            while next_output < outputs.len() && outputs.time(next_output) <= current.0 + eps {
                let t = outputs.time(next_output);
                let values = if (t - current.0).abs() <= eps {
                    current.1.clone()
                } else {
                    self.sampler
                        .interpolate(t, (previous.0, &previous.1), (current.0, &current.1))
                };
                next_output += 1;
                if let ControlFlow::Break(status) = self.push_row(Row::new(t, values))? {
                    return Ok(status);
                }
            }

            if progress.terminated {
                if let ControlFlow::Break(status) = self.push_row(Row::new(current.0, current.1))? {
                    return Ok(status);
                }
                return Ok(Completion::Terminated);
            }
            previous = current;
        }

        Ok(Completion::Complete)
    }

    /// Integrates output interval by output interval.
    fn model_exchange(
        &mut self,
        instance: &mut Instance,
        driver: &mut dyn Driver,
    ) -> Result<Completion, RunError> {
        let config = self.config;
        let outputs = OutputGrid::new(config.start_time, config.stop_time, config.output_interval())?;

        for t_end in outputs.iter().skip(1) {
            let time = driver.time();
            self.check_timeout(time)?;
            self.apply_inputs(instance, time)?;

            let progress = driver
                .step(instance, t_end, Some(&self.sampler))
                .map_err(|err| RunError::from_step(err, self.timeout))?;
            if let ControlFlow::Break(status) = self.record_progress(&progress)? {
                return Ok(status);
            }

            let time = if progress.terminated { progress.time } else { t_end };
            let values = self.sampler.sample(instance)?;
            if let ControlFlow::Break(status) = self.push_row(Row::new(time, values))? {
                return Ok(status);
            }
            if progress.terminated {
                return Ok(Completion::Terminated);
            }
        }

        Ok(Completion::Complete)
    }

    fn apply_inputs(&self, instance: &mut Instance, time: f64) -> Result<(), RunError> {
        let Some(inputs) = self.inputs else {
            return Ok(());
        };
        let assignments = inputs.assignments(instance.description(), time)?;
        if !assignments.is_empty() {
            instance.variables().set_batch(&assignments)?;
        }
        Ok(())
    }

    fn check_timeout(&self, time: f64) -> Result<(), RunError> {
        match self.timeout {
            Some(limit) if self.started.elapsed() > limit => Err(RunError::Timeout { limit, time }),
            _ => Ok(()),
        }
    }

    /// Appends an output row, unless a row already exists at its time.
    fn push_row(&mut self, row: Row) -> Result<ControlFlow<Completion>, RunError> {
        #[allow(clippy::float_cmp)]
        if self.result.last().is_some_and(|last| last.time == row.time) {
            return Ok(ControlFlow::Continue(()));
        }
        self.result.push(row.clone())?;
        Ok(self.notify(RunEvent::Row(row)))
    }

    /// Appends event brackets and records events.
    fn record_progress(&mut self, progress: &Progress) -> Result<ControlFlow<Completion>, RunError> {
        for (before, after) in &progress.brackets {
            #[allow(clippy::float_cmp)]
            let seen = self.result.last().is_some_and(|last| last.time == before.time);
            if !seen {
                self.result.push(before.clone())?;
                if let ControlFlow::Break(status) = self.notify(RunEvent::Row(before.clone())) {
                    return Ok(ControlFlow::Break(status));
                }
            }
            self.result.push(after.clone())?;
            if let ControlFlow::Break(status) = self.notify(RunEvent::Row(after.clone())) {
                return Ok(ControlFlow::Break(status));
            }
        }

        for event in &progress.events {
            if self.config.record_events {
                self.events.push(event.clone());
            }
            if let ControlFlow::Break(status) = self.notify(RunEvent::Event(event.clone())) {
                return Ok(ControlFlow::Break(status));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    fn notify(&mut self, event: RunEvent) -> ControlFlow<Completion> {
        match self.observer.observe(&event) {
            Some(Action::StopEarly) => ControlFlow::Break(Completion::StoppedByObserver),
            None => ControlFlow::Continue(()),
        }
    }

    fn finish(self, status: Completion) -> Outcome {
        let final_time = self.result.last().map_or(self.config.start_time, |row| row.time);
        Outcome {
            result: self.result,
            events: self.events,
            status,
            final_time,
        }
    }
}
