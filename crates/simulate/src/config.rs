use std::{collections::BTreeMap, time::Duration};

use serde::Deserialize;
use tandem_core::{DefaultExperiment, ModelDescription, Value};
use thiserror::Error;

/// Settings for one simulation run.
///
/// Deserializes from TOML with every field optional:
///
/// ```toml
/// stop_time = 5.0
/// step_size = 0.01
///
/// [solver]
/// kind = "dopri5"
/// rel_tol = 1e-8
///
/// [start_values]
/// k = 2.5
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub start_time: f64,
    pub stop_time: f64,
    /// Communication step for co-simulation and macro step for coupled systems.
    pub step_size: f64,
    /// Spacing of result rows. Defaults to the step size.
    pub output_interval: Option<f64>,
    /// Relative tolerance passed to the component at setup.
    pub tolerance: Option<f64>,
    pub solver: SolverChoice,
    pub retry: RetryPolicy,
    /// Wall-clock limit checked between steps.
    pub timeout_secs: Option<f64>,
    /// Keep an [`EventRecord`](tandem_core::EventRecord) for every event.
    pub record_events: bool,
    pub logging_on: bool,
    /// Variables sampled into the result. Empty means every output.
    pub outputs: Vec<String>,
    /// Values applied by name before initialization.
    pub start_values: BTreeMap<String, Value>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            stop_time: 1.0,
            step_size: 1e-2,
            output_interval: None,
            tolerance: None,
            solver: SolverChoice::default(),
            retry: RetryPolicy::default(),
            timeout_secs: None,
            record_events: true,
            logging_on: false,
            outputs: Vec::new(),
            start_values: BTreeMap::new(),
        }
    }
}

/// Integrator used for model-exchange components.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", deny_unknown_fields)]
pub enum SolverChoice {
    /// Fixed-step explicit Euler. The step defaults to the run's step size.
    Euler {
        #[serde(default)]
        step: Option<f64>,
    },
    /// Adaptive Dormand–Prince 5(4).
    Dopri5 {
        #[serde(default = "default_rel_tol")]
        rel_tol: f64,
        #[serde(default = "default_abs_tol")]
        abs_tol: f64,
    },
}

fn default_rel_tol() -> f64 {
    1e-6
}

fn default_abs_tol() -> f64 {
    1e-8
}

impl Default for SolverChoice {
    fn default() -> Self {
        Self::Dopri5 {
            rel_tol: default_rel_tol(),
            abs_tol: default_abs_tol(),
        }
    }
}

/// How a co-simulation step discarded by the component is retried.
///
/// Retries need a component that can save and restore its state. Each
/// retry multiplies the step by `reduction_factor`; the step never drops
/// below `min_step`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub reduction_factor: f64,
    pub min_step: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            reduction_factor: 0.5,
            min_step: 1e-9,
        }
    }
}

impl RetryPolicy {
    /// Never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// # Errors
    ///
    /// Returns an error if the reduction factor is outside `(0, 1)` or the
    /// minimum step is not positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.reduction_factor > 0.0 && self.reduction_factor < 1.0) {
            return Err(ConfigError::ReductionFactor);
        }
        if !self.min_step.is_finite() || self.min_step <= 0.0 {
            return Err(ConfigError::MinStep);
        }
        Ok(())
    }
}

/// Errors raised when loading or validating a [`SimulationConfig`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("start_time must be finite")]
    StartTime,

    #[error("stop_time must be finite and after start_time")]
    StopTime,

    #[error("step_size must be finite and positive")]
    StepSize,

    #[error("output_interval must be finite and positive")]
    OutputInterval,

    #[error("tolerance must be finite and positive")]
    Tolerance,

    #[error("solver settings must be finite and positive")]
    Solver,

    #[error("retry reduction_factor must lie strictly between 0 and 1")]
    ReductionFactor,

    #[error("retry min_step must be finite and positive")]
    MinStep,

    #[error("timeout_secs must be finite and positive")]
    Timeout,

    #[error("invalid config file: {0}")]
    Parse(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        Self::Parse(err.message().to_owned())
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

impl SimulationConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys, or
    /// the first failed validation.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Uses the component's default experiment for every value it defines.
    #[must_use]
    pub fn for_model(description: &ModelDescription) -> Self {
        let mut config = Self::default();
        if let Some(experiment) = &description.default_experiment {
            config.apply_default_experiment(experiment);
        }
        config
    }

    fn apply_default_experiment(&mut self, experiment: &DefaultExperiment) {
        if let Some(start) = experiment.start_time {
            self.start_time = start;
        }
        if let Some(stop) = experiment.stop_time {
            self.stop_time = stop;
        }
        if let Some(step) = experiment.step_size {
            self.step_size = step;
        }
        if experiment.tolerance.is_some() {
            self.tolerance = experiment.tolerance;
        }
    }

    /// # Errors
    ///
    /// Returns the first setting that is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.start_time.is_finite() {
            return Err(ConfigError::StartTime);
        }
        if !self.stop_time.is_finite() || self.stop_time <= self.start_time {
            return Err(ConfigError::StopTime);
        }
        if !positive(self.step_size) {
            return Err(ConfigError::StepSize);
        }
        if self.output_interval.is_some_and(|i| !positive(i)) {
            return Err(ConfigError::OutputInterval);
        }
        if self.tolerance.is_some_and(|t| !positive(t)) {
            return Err(ConfigError::Tolerance);
        }
        let solver_ok = match self.solver {
            SolverChoice::Euler { step } => step.is_none_or(positive),
            SolverChoice::Dopri5 { rel_tol, abs_tol } => positive(rel_tol) && positive(abs_tol),
        };
        if !solver_ok {
            return Err(ConfigError::Solver);
        }
        self.retry.validate()?;
        if self.timeout_secs.is_some_and(|t| !positive(t)) {
            return Err(ConfigError::Timeout);
        }
        Ok(())
    }

    /// Spacing of result rows.
    #[must_use]
    pub fn output_interval(&self) -> f64 {
        self.output_interval.unwrap_or(self.step_size)
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs_f64)
    }

    /// Start values as name and value pairs, in name order.
    #[must_use]
    pub fn start_value_list(&self) -> Vec<(String, Value)> {
        self.start_values
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(SimulationConfig::default().validate(), Ok(()));
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = SimulationConfig::from_toml_str(
            r#"
            stop_time = 5.0
            output_interval = 0.01
            timeout_secs = 30

            [solver]
            kind = "euler"
            step = 1e-3

            [retry]
            max_retries = 2

            [start_values]
            k = 2.5
            n = 3
            flag = true
            "#,
        )
        .unwrap();

        assert_relative_eq!(config.stop_time, 5.0);
        assert_relative_eq!(config.output_interval(), 0.01);
        assert_eq!(config.solver, SolverChoice::Euler { step: Some(1e-3) });
        assert_eq!(config.retry.max_retries, 2);
        assert_relative_eq!(config.retry.reduction_factor, 0.5);
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.start_values["k"], Value::Real(2.5));
        assert_eq!(config.start_values["n"], Value::Integer(3));
        assert_eq!(config.start_values["flag"], Value::Boolean(true));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = SimulationConfig::from_toml_str("stop_tme = 2.0").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let check = |edit: fn(&mut SimulationConfig), expected: ConfigError| {
            let mut config = SimulationConfig::default();
            edit(&mut config);
            assert_eq!(config.validate(), Err(expected));
        };

        check(|c| c.stop_time = c.start_time, ConfigError::StopTime);
        check(|c| c.step_size = 0.0, ConfigError::StepSize);
        check(|c| c.output_interval = Some(-1.0), ConfigError::OutputInterval);
        check(|c| c.solver = SolverChoice::Euler { step: Some(f64::NAN) }, ConfigError::Solver);
        check(|c| c.retry.reduction_factor = 1.0, ConfigError::ReductionFactor);
        check(|c| c.timeout_secs = Some(0.0), ConfigError::Timeout);
    }

    #[test]
    fn default_experiment_seeds_the_config() {
        let description: ModelDescription = serde_json::from_str(
            r#"{
                "fmi_version": "2.0",
                "model_name": "m",
                "guid": "{g}",
                "default_experiment": { "stop_time": 3.0, "step_size": 0.1 }
            }"#,
        )
        .unwrap();
        let config = SimulationConfig::for_model(&description);
        assert_relative_eq!(config.stop_time, 3.0);
        assert_relative_eq!(config.step_size, 0.1);
        assert_relative_eq!(config.start_time, 0.0);
    }
}
