//! Adaptive Dormand–Prince 5(4) integrator built on `ode_solvers`.
//!
//! Each call to [`Integrator::step`] runs an `ode_solvers::Dopri5` stepper
//! from the current point toward the end time and stops it after its first
//! accepted step. Event localization re-integrates from the start of that
//! step to each bisection point with a single classic Runge–Kutta step.

use std::cell::RefCell;

use ode_solvers::{DVector, System, dop_shared::OutputType};

use crate::{
    integrator::{Advance, Integrator, IntegratorError},
    root::{self, RootConfig, Sample},
    system::{indicators_at, ContinuousSystem, SystemError},
};

// Step size controller settings, the `ode_solvers` defaults.
const SAFETY_FACTOR: f64 = 0.9;
const BETA: f64 = 0.04;
const FAC_MIN: f64 = 0.2;
const FAC_MAX: f64 = 10.0;
const MAX_STEPS: u32 = 100_000;
const STIFFNESS_CHECK: u32 = 1000;

#[derive(Debug, Clone)]
pub struct Dopri5 {
    rel_tol: f64,
    abs_tol: f64,
    root: RootConfig,
    time: f64,
    state: Vec<f64>,
    indicators: Option<Vec<f64>>,
}

impl Dopri5 {
    /// Creates an adaptive integrator with the given tolerances.
    ///
    /// # Errors
    ///
    /// Returns [`IntegratorError::InvalidConfig`] if a tolerance is not a
    /// positive finite number.
    pub fn new(rel_tol: f64, abs_tol: f64) -> Result<Self, IntegratorError> {
        if !rel_tol.is_finite() || rel_tol <= 0.0 {
            return Err(IntegratorError::InvalidConfig(
                "rel_tol must be finite and positive",
            ));
        }
        if !abs_tol.is_finite() || abs_tol <= 0.0 {
            return Err(IntegratorError::InvalidConfig(
                "abs_tol must be finite and positive",
            ));
        }
        Ok(Self {
            rel_tol,
            abs_tol,
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

    /// Takes one adaptive step from `(t0, x0)` toward `t_end`.
    fn adaptive_step(
        &self,
        system: &dyn ContinuousSystem,
        t0: f64,
        x0: &[f64],
        t_end: f64,
    ) -> Result<(f64, Vec<f64>), IntegratorError> {
        let error = RefCell::new(None);
        let accepted = RefCell::new(None);
        let bridge = OdeBridge {
            system,
            error: &error,
            accepted: Some(&accepted),
            t0,
        };

        // Sparse output records accepted steps only. The dense default would
        // sample every `dx` and never advance with a zero spacing.
        let y0 = DVector::from_column_slice(x0);
        let mut stepper = ode_solvers::Dopri5::from_param(
            bridge,
            t0,
            t_end,
            t_end - t0,
            y0,
            self.rel_tol,
            self.abs_tol,
            SAFETY_FACTOR,
            BETA,
            FAC_MIN,
            FAC_MAX,
            t_end - t0,
            0.0,
            MAX_STEPS,
            STIFFNESS_CHECK,
            OutputType::Sparse,
        );
        let outcome = stepper.integrate();

        if let Some((time, source)) = error.borrow_mut().take() {
            return Err(IntegratorError::System { time, source });
        }
        outcome?;

        let (t1, x1) = accepted
            .borrow_mut()
            .take()
            .ok_or(IntegratorError::NoProgress { t_end })?;

        // The stepper's final step can miss `t_end` by an ulp.
        let t1 = if t_end - t1 <= 1e-12 * t_end.abs().max(1.0) {
            t_end
        } else {
            t1
        };
        Ok((t1, x1))
    }

    /// Re-integrates from `(t0, x0)` to `t` with one fourth-order step.
    fn reintegrate(
        system: &dyn ContinuousSystem,
        t0: f64,
        x0: &[f64],
        t: f64,
    ) -> Result<Vec<f64>, IntegratorError> {
        if t <= t0 {
            return Ok(x0.to_vec());
        }

        let error = RefCell::new(None);
        let bridge = OdeBridge {
            system,
            error: &error,
            accepted: None,
            t0,
        };

        let y0 = DVector::from_column_slice(x0);
        let mut stepper = ode_solvers::Rk4::new(bridge, t0, y0, t, t - t0);
        let outcome = stepper.integrate();

        if let Some((time, source)) = error.borrow_mut().take() {
            return Err(IntegratorError::System { time, source });
        }
        outcome?;

        stepper
            .y_out()
            .last()
            .map(|y| y.iter().copied().collect())
            .ok_or(IntegratorError::NoProgress { t_end: t })
    }
}

impl Integrator for Dopri5 {
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

        let x0 = self.state.clone();
        let z0 = match self.indicators.take() {
            Some(z) => z,
            None => indicators_at(system, t0, &x0).map_err(IntegratorError::system(t0))?,
        };

        let (t1, x1) = self.adaptive_step(system, t0, &x0, t_end)?;
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
            let x = Self::reintegrate(system, t0, &x0, t)?;
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
                tracing::trace!(time, crossings = event.crossings.len(), "event located");
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

/// Adapts a [`ContinuousSystem`] to the `ode_solvers` right-hand side.
///
/// The first failing evaluation is stored in `error` and the stepper is
/// stopped at its next accepted step. When `accepted` is set, the first
/// accepted step is recorded there and the stepper is stopped.
struct OdeBridge<'a> {
    system: &'a dyn ContinuousSystem,
    error: &'a RefCell<Option<(f64, SystemError)>>,
    accepted: Option<&'a RefCell<Option<(f64, Vec<f64>)>>>,
    t0: f64,
}

impl System<f64, DVector<f64>> for OdeBridge<'_> {
    fn system(&self, x: f64, y: &DVector<f64>, dy: &mut DVector<f64>) {
        if self.error.borrow().is_some() {
            dy.fill(0.0);
            return;
        }

        let result = self
            .system
            .apply_state(x, y.as_slice())
            .and_then(|()| self.system.derivatives(dy.as_mut_slice()));

        if let Err(source) = result {
            *self.error.borrow_mut() = Some((x, source));
            dy.fill(0.0);
        }
    }

    fn solout(&mut self, x: f64, y: &DVector<f64>, _dy: &DVector<f64>) -> bool {
        if self.error.borrow().is_some() {
            return true;
        }
        match self.accepted {
            Some(accepted) if x > self.t0 => {
                *accepted.borrow_mut() = Some((x, y.iter().copied().collect()));
                true
            }
            _ => false,
        }
    }
}
