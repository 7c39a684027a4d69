mod error;

pub use error::IntegratorError;

use tandem_core::Crossing;

use crate::system::ContinuousSystem;

/// Result of one accepted integrator step.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// The step completed without an indicator sign change.
    Accepted { time: f64 },
    /// One or more indicators changed sign.
    ///
    /// `time` is the right end of the converged root bracket, so the
    /// integrator state is already past the crossing.
    Root { time: f64, crossings: Vec<Crossing> },
}

impl Advance {
    #[must_use]
    pub fn time(&self) -> f64 {
        match self {
            Self::Accepted { time } | Self::Root { time, .. } => *time,
        }
    }
}

/// A one-step-at-a-time integrator with event detection.
///
/// The integrator owns the continuous state between steps. After an event
/// changes the state, the caller must [`reset`](Integrator::reset) it.
pub trait Integrator {
    /// Restarts integration from `(time, state)`, discarding step history.
    fn reset(&mut self, time: f64, state: &[f64]);

    fn time(&self) -> f64;

    fn state(&self) -> &[f64];

    /// Takes one accepted step toward `t_end`, never past it.
    ///
    /// # Errors
    ///
    /// Returns an error if `t_end` is not after the current time, if the
    /// system fails, or if the underlying method fails.
    fn step(&mut self, system: &dyn ContinuousSystem, t_end: f64) -> Result<Advance, IntegratorError>;
}
