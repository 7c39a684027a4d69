//! Event-time localization by bisection.
//!
//! An integrator that sees an indicator change sign over a step calls
//! [`locate`] with the indicators at both ends of the step and a closure that
//! evaluates the indicators at any time inside it. Bisection narrows the
//! interval to the earliest crossing and returns its right end, so the caller
//! resumes from a point just past the event.

mod bracket;
mod config;

pub use bracket::{Bracket, BracketError, Sign};
pub use config::RootConfig;

use tandem_core::{Crossing, Direction};

/// Indicators sampled at one time, with whatever payload produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<S> {
    pub time: f64,
    pub indicators: Vec<f64>,
    pub payload: S,
}

/// A localized event.
#[derive(Debug, Clone, PartialEq)]
pub struct Located<S> {
    /// Sample at the right end of the converged bracket.
    pub after: Sample<S>,
    pub crossings: Vec<Crossing>,
}

/// Returns the indicators whose sign differs between `before` and `after`.
#[must_use]
pub fn crossings(before: &[f64], after: &[f64]) -> Vec<Crossing> {
    before
        .iter()
        .zip(after)
        .enumerate()
        .filter_map(|(index, (&z0, &z1))| match (Sign::of(z0), Sign::of(z1)) {
            (Sign::Negative, Sign::Positive) => Some(Crossing {
                index,
                direction: Direction::Rising,
            }),
            (Sign::Positive, Sign::Negative) => Some(Crossing {
                index,
                direction: Direction::Falling,
            }),
            _ => None,
        })
        .collect()
}

/// Narrows `[before.time, after.time]` to the earliest indicator crossing.
///
/// Only indicators that change sign between the two samples are tracked.
/// A trial point counts as past the event if any of them has left its starting
/// sign. Iteration stops when the bracket meets the time tolerances or after
/// `max_iters` bisections, whichever comes first.
///
/// Returns `Ok(None)` if no indicator changes sign between the samples.
///
/// # Errors
///
/// Returns an error if the config is invalid, the samples do not form a
/// bracket, or `eval` fails.
pub fn locate<S, E, F>(
    config: &RootConfig,
    before: &Sample<S>,
    after: Sample<S>,
    mut eval: F,
) -> Result<Option<Located<S>>, LocateError<E>>
where
    F: FnMut(f64) -> Result<Sample<S>, E>,
{
    config.validate().map_err(LocateError::InvalidConfig)?;

    let tracked: Vec<usize> = crossings(&before.indicators, &after.indicators)
        .into_iter()
        .map(|c| c.index)
        .collect();
    if tracked.is_empty() {
        return Ok(None);
    }

    let crossed = |sample: &Sample<S>| {
        tracked
            .iter()
            .any(|&i| Sign::of(sample.indicators[i]) != Sign::of(before.indicators[i]))
    };

    let mut bracket = Bracket::new(before.time, after.time, Sign::Negative, Sign::Positive)?;
    let mut right = after;

    for _ in 0..config.max_iters {
        if bracket.is_converged(config.t_abs_tol, config.t_rel_tol) {
            break;
        }
        let t = bracket.midpoint();
        if t <= bracket.left() || t >= bracket.right() {
            break;
        }
        let trial = eval(t).map_err(LocateError::Eval)?;
        if crossed(&trial) {
            bracket.shrink(t, Sign::Positive);
            right = trial;
        } else {
            bracket.shrink(t, Sign::Negative);
        }
    }

    let crossings = crossings(&before.indicators, &right.indicators);
    Ok(Some(Located {
        after: right,
        crossings,
    }))
}

/// Errors that can occur during [`locate`].
#[derive(Debug, thiserror::Error)]
pub enum LocateError<E> {
    #[error("invalid root config: {0}")]
    InvalidConfig(&'static str),

    #[error("invalid bracket: {0}")]
    Bracket(#[from] BracketError),

    #[error("indicator evaluation failed")]
    Eval(#[source] E),
}
