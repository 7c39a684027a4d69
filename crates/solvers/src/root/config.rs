/// Configuration for event-time localization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootConfig {
    pub max_iters: usize,
    pub t_abs_tol: f64,
    pub t_rel_tol: f64,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            max_iters: 100,
            t_abs_tol: 1e-12,
            t_rel_tol: 1e-12,
        }
    }
}

impl RootConfig {
    /// Validates that all tolerances are finite and non-negative and that at
    /// least one iteration is allowed.
    ///
    /// # Errors
    ///
    /// Returns an error if any tolerance is negative or non-finite.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.max_iters == 0 {
            return Err("max_iters must be positive");
        }
        if !self.t_abs_tol.is_finite() || self.t_abs_tol < 0.0 {
            return Err("t_abs_tol must be finite and non-negative");
        }
        if !self.t_rel_tol.is_finite() || self.t_rel_tol < 0.0 {
            return Err("t_rel_tol must be finite and non-negative");
        }
        Ok(())
    }
}
