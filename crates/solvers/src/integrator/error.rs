use ode_solvers::dop_shared::IntegrationError;
use thiserror::Error;

use crate::{
    root::{BracketError, LocateError},
    system::SystemError,
};

/// Errors that can occur while integrating a continuous system.
#[derive(Debug, Error)]
pub enum IntegratorError {
    #[error("system evaluation failed at t = {time}")]
    System {
        time: f64,
        #[source]
        source: SystemError,
    },

    #[error(transparent)]
    Integration(#[from] IntegrationError),

    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),

    #[error("invalid event bracket: {0}")]
    Bracket(#[from] BracketError),

    #[error("end time {t_end} is not after current time {time}")]
    EmptyInterval { time: f64, t_end: f64 },

    #[error("no step was accepted before {t_end}")]
    NoProgress { t_end: f64 },
}

impl IntegratorError {
    pub(crate) fn system(time: f64) -> impl FnOnce(SystemError) -> Self {
        move |source| Self::System { time, source }
    }
}

impl From<LocateError<IntegratorError>> for IntegratorError {
    fn from(err: LocateError<IntegratorError>) -> Self {
        match err {
            LocateError::InvalidConfig(reason) => Self::InvalidConfig(reason),
            LocateError::Bracket(err) => Self::Bracket(err),
            LocateError::Eval(err) => err,
        }
    }
}
