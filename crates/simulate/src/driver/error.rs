use tandem_core::{AccessError, LifecycleError};
use tandem_solvers::IntegratorError;
use thiserror::Error;

/// Errors raised while advancing an instance.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("integration failed")]
    Integrator(#[from] IntegratorError),

    #[error("step of {step} at t = {time} was discarded and the component cannot roll back")]
    Discarded { time: f64, step: f64 },

    #[error("step at t = {time} was still discarded after {retries} retries")]
    RetriesExhausted { time: f64, retries: usize },

    #[error("retry step {step} at t = {time} is below the minimum step")]
    StepTooSmall { time: f64, step: f64 },

    #[error("event iteration at t = {time} did not settle after {iterations} updates")]
    EventIteration { time: f64, iterations: usize },

    #[error("{events} events handled by t = {time} within a single step")]
    TooManyEvents { time: f64, events: usize },

    #[error("wall-clock deadline passed at t = {time}")]
    DeadlinePassed { time: f64 },
}
