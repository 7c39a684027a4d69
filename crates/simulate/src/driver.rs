//! Time advancement for one instance.
//!
//! A [`Driver`] moves an initialized instance forward in time. The variant
//! is picked once from the interface the instance was created with:
//!
//! - [`CoSimulation`]: the component integrates itself; the driver calls
//!   `do_step` and retries discarded steps when the component can roll back
//! - [`ModelExchange`]: the driver integrates the component's continuous
//!   states with an [`Integrator`] and runs event iteration at roots, time
//!   events, and step events

mod co_simulation;
mod error;
mod model_exchange;

#[cfg(test)]
mod tests;

pub use co_simulation::CoSimulation;
pub use error::StepError;
pub use model_exchange::ModelExchange;

use std::time::Instant;

use tandem_core::{EventRecord, FmuStateId, Instance, InterfaceKind, Row};
use tandem_solvers::{Dopri5, Euler, Integrator};

use crate::{
    config::{SimulationConfig, SolverChoice},
    sampler::Sampler,
};

/// What happened during one call to [`Driver::step`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Progress {
    /// Time the instance reached.
    pub time: f64,
    /// Events handled on the way, in time order.
    pub events: Vec<EventRecord>,
    /// Row pairs sampled just before and just after each event.
    pub brackets: Vec<(Row, Row)>,
    /// The component asked to end the simulation.
    pub terminated: bool,
}

impl Progress {
    #[must_use]
    pub fn at(time: f64) -> Self {
        Self {
            time,
            ..Self::default()
        }
    }
}

/// Advances one initialized instance.
pub trait Driver {
    /// Prepares the instance right after it leaves initialization mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance fails to settle its initial state.
    fn start(&mut self, instance: &mut Instance, time: f64) -> Result<Progress, StepError>;

    /// Advances the instance from its current time to `t_end`.
    ///
    /// Stops early, with [`Progress::terminated`] set, if the component asks
    /// to end the simulation. When `sampler` is given, each event yields a
    /// bracket of rows.
    ///
    /// # Errors
    ///
    /// Returns an error if a native call fails, a discarded step cannot be
    /// recovered, or the integrator fails.
    fn step(
        &mut self,
        instance: &mut Instance,
        t_end: f64,
        sampler: Option<&Sampler>,
    ) -> Result<Progress, StepError>;

    /// Saves the instance state, reusing the previous snapshot's slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the component cannot save its state.
    fn snapshot(&mut self, instance: &mut Instance) -> Result<FmuStateId, StepError>;

    /// Returns the instance to a saved state.
    ///
    /// # Errors
    ///
    /// Returns an error if the component cannot restore the state.
    fn restore(&mut self, instance: &mut Instance, state: FmuStateId) -> Result<(), StepError>;

    /// Time the instance has reached.
    fn time(&self) -> f64;

    /// Sets a wall-clock deadline checked inside [`Driver::step`].
    ///
    /// Drivers whose steps always return promptly may ignore it.
    fn set_deadline(&mut self, _deadline: Option<Instant>) {}
}

/// Picks the driver for the interface `instance` was created with.
///
/// # Errors
///
/// Returns [`StepError::Integrator`] if the configured solver settings are
/// rejected.
pub fn driver_for(instance: &Instance, config: &SimulationConfig) -> Result<Box<dyn Driver>, StepError> {
    match instance.kind() {
        InterfaceKind::CoSimulation => Ok(Box::new(CoSimulation::new(config.retry))),
        InterfaceKind::ModelExchange => {
            let integrator = integrator_for(config)?;
            Ok(Box::new(ModelExchange::new(instance.description(), integrator)))
        }
    }
}

/// Builds the integrator chosen in `config`.
///
/// # Errors
///
/// Returns [`StepError::Integrator`] if the solver settings are rejected.
pub fn integrator_for(config: &SimulationConfig) -> Result<Box<dyn Integrator>, StepError> {
    let integrator: Box<dyn Integrator> = match config.solver {
        SolverChoice::Euler { step } => Box::new(Euler::new(step.unwrap_or(config.step_size))?),
        SolverChoice::Dopri5 { rel_tol, abs_tol } => Box::new(Dopri5::new(rel_tol, abs_tol)?),
    };
    Ok(integrator)
}
