//! Fixed-step forward Euler integrator.
//!
//! Each step advances the state with
//!
//! ```text
//! state_{n+1} = state_n + derivative_n * dt
//! ```
//!
//! where `dt` is the configured step, shortened so that no step passes the
//! requested end time. An indicator sign change over a step is localized by
//! bisection along the same straight line.

use crate::{
    integrator::{Advance, Integrator, IntegratorError},
    root::{self, RootConfig, Sample},
    system::{derivatives_at, indicators_at, ContinuousSystem},
};

#[derive(Debug, Clone)]
pub struct Euler {
    step: f64,
    root: RootConfig,
    time: f64,
    state: Vec<f64>,
    indicators: Option<Vec<f64>>,
}

impl Euler {
    /// Creates an Euler integrator with a fixed step size.
    ///
    /// # Errors
    ///
    /// Returns [`IntegratorError::InvalidConfig`] if `step` is not a positive
    /// finite number.
    pub fn new(step: f64) -> Result<Self, IntegratorError> {
        if !step.is_finite() || step <= 0.0 {
            return Err(IntegratorError::InvalidConfig(
                "step must be finite and positive",
            ));
        }
        Ok(Self {
            step,
            root: RootConfig::default(),
            time: 0.0,
            state: Vec::new(),
            indicators: None,
        })
    }

    /// Replaces the event localization config.
    ///
    /// # Errors
    ///
    /// Returns [`IntegratorError::InvalidConfig`] if the config is invalid.
    pub fn with_root_config(mut self, root: RootConfig) -> Result<Self, IntegratorError> {
        root.validate().map_err(IntegratorError::InvalidConfig)?;
        self.root = root;
        Ok(self)
    }
}

impl Integrator for Euler {
    fn reset(&mut self, time: f64, state: &[f64]) {
        self.time = time;
        self.state = state.to_vec();
        self.indicators = None;
    }

    fn time(&self) -> f64 {
        self.time
    }

    fn state(&self) -> &[f64] {
        &self.state
    }

    fn step(&mut self, system: &dyn ContinuousSystem, t_end: f64) -> Result<Advance, IntegratorError> {
        let t0 = self.time;
        if t_end <= t0 {
            return Err(IntegratorError::EmptyInterval { time: t0, t_end });
        }

        let z0 = match self.indicators.take() {
            Some(z) => z,
            None => indicators_at(system, t0, &self.state).map_err(IntegratorError::system(t0))?,
        };
        let dx = derivatives_at(system, t0, &self.state).map_err(IntegratorError::system(t0))?;

        let x0 = self.state.clone();
        let along = |t: f64| -> Vec<f64> {
            let dt = t - t0;
            x0.iter().zip(&dx).map(|(x, d)| x + d * dt).collect()
        };

        let t1 = if t_end - t0 < self.step { t_end } else { t0 + self.step };
        let x1 = along(t1);
        let z1 = indicators_at(system, t1, &x1).map_err(IntegratorError::system(t1))?;

        let before = Sample {
            time: t0,
            indicators: z0,
            payload: x0.clone(),
        };
        let after = Sample {
            time: t1,
            indicators: z1,
            payload: x1,
        };

        let located = root::locate(&self.root, &before, after.clone(), |t| {
            let x = along(t);
            let z = indicators_at(system, t, &x).map_err(IntegratorError::system(t))?;
            Ok(Sample {
                time: t,
                indicators: z,
                payload: x,
            })
        })?;

        let (landing, outcome) = match located {
            Some(event) => {
                let time = event.after.time;
                (
                    event.after,
                    Advance::Root {
                        time,
                        crossings: event.crossings,
                    },
                )
            }
            None => (after, Advance::Accepted { time: t1 }),
        };

        self.time = landing.time;
        self.state = landing.payload;
        self.indicators = Some(landing.indicators);
        Ok(outcome)
    }
}
