use std::error::Error as StdError;

/// Error returned by a [`ContinuousSystem`] callback.
pub type SystemError = Box<dyn StdError + Send + Sync>;

/// The continuous part of a hybrid model, as seen by an integrator.
///
/// Callbacks take `&self` so that integrators which only hand out shared
/// references to their right-hand side can still drive a stateful model;
/// implementations use interior mutability.
pub trait ContinuousSystem {
    fn state_len(&self) -> usize;

    fn indicator_len(&self) -> usize;

    /// Sets time and continuous states for the evaluations that follow.
    ///
    /// # Errors
    ///
    /// Returns an error if the model rejects the state.
    fn apply_state(&self, time: f64, state: &[f64]) -> Result<(), SystemError>;

    /// Writes the state derivatives at the applied state into `out`.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot evaluate its derivatives.
    fn derivatives(&self, out: &mut [f64]) -> Result<(), SystemError>;

    /// Writes the event indicators at the applied state into `out`.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot evaluate its indicators.
    fn event_indicators(&self, out: &mut [f64]) -> Result<(), SystemError>;
}

/// Evaluates the indicators at `(time, state)`.
pub(crate) fn indicators_at(
    system: &dyn ContinuousSystem,
    time: f64,
    state: &[f64],
) -> Result<Vec<f64>, SystemError> {
    let mut z = vec![0.0; system.indicator_len()];
    system.apply_state(time, state)?;
    system.event_indicators(&mut z)?;
    Ok(z)
}

/// Evaluates the derivatives at `(time, state)`.
pub(crate) fn derivatives_at(
    system: &dyn ContinuousSystem,
    time: f64,
    state: &[f64],
) -> Result<Vec<f64>, SystemError> {
    let mut dx = vec![0.0; system.state_len()];
    system.apply_state(time, state)?;
    system.derivatives(&mut dx)?;
    Ok(dx)
}
