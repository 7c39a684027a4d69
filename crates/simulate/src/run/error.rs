use std::time::Duration;

use tandem_core::{AccessError, LifecycleError, ResultError};
use thiserror::Error;

use crate::{config::ConfigError, driver::StepError, inputs::InputError};

/// A failed run, with the instance it failed on and how far it got.
#[derive(Debug, Error)]
#[error("simulation of `{instance}` failed{}", at_time(*.last_time))]
pub struct SimulationError {
    pub instance: String,
    /// Last time the instance reached successfully, if it got that far.
    pub last_time: Option<f64>,
    #[source]
    pub source: RunError,
}

fn at_time(time: Option<f64>) -> String {
    time.map(|t| format!(" after t = {t}")).unwrap_or_default()
}

/// What went wrong during a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("step failed")]
    Step(#[from] StepError),

    #[error("input table rejected")]
    Input(#[from] InputError),

    #[error("result rejected a row")]
    Result(#[from] ResultError),

    #[error("wall-clock limit of {limit:?} exceeded at t = {time}")]
    Timeout { limit: Duration, time: f64 },
}

impl RunError {
    /// Wraps a driver failure, reporting a passed deadline as a timeout.
    pub(crate) fn from_step(source: StepError, limit: Option<Duration>) -> Self {
        match (source, limit) {
            (StepError::DeadlinePassed { time }, Some(limit)) => Self::Timeout { limit, time },
            (source, _) => Self::Step(source),
        }
    }
}
