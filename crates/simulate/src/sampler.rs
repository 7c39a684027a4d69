use tandem_core::{
    AccessError, Instance, ModelDescription, ScalarVariable, ValueKind, ValueRef, Variability,
};

/// The variables sampled into result rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sampler {
    columns: Vec<String>,
    requests: Vec<(ValueRef, ValueKind)>,
    held: Vec<bool>,
}

impl Sampler {
    /// Samples every output of the component.
    #[must_use]
    pub fn outputs(description: &ModelDescription) -> Self {
        Self::from_variables(description.outputs())
    }

    /// Samples the named variables, or every output if `names` is empty.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::UnknownVariable`] for a name the component
    /// does not define.
    pub fn named<S: AsRef<str>>(description: &ModelDescription, names: &[S]) -> Result<Self, AccessError> {
        if names.is_empty() {
            return Ok(Self::outputs(description));
        }
        let variables = names
            .iter()
            .map(|name| {
                description
                    .variable(name.as_ref())
                    .ok_or_else(|| AccessError::UnknownVariable {
                        name: name.as_ref().to_owned(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_variables(variables))
    }

    fn from_variables<'a>(variables: impl IntoIterator<Item = &'a ScalarVariable>) -> Self {
        let mut sampler = Self::default();
        for variable in variables {
            sampler.columns.push(variable.name.clone());
            sampler.requests.push((variable.value_ref, variable.kind));
            sampler.held.push(
                variable.kind.is_discrete() || variable.variability != Variability::Continuous,
            );
        }
        sampler
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether column `index` only changes at events and is held, not
    /// interpolated, between samples.
    #[must_use]
    pub fn is_held(&self, index: usize) -> bool {
        self.held.get(index).copied().unwrap_or(true)
    }

    /// Reads the current values. Strings sample as `NaN`.
    ///
    /// # Errors
    ///
    /// Propagates access failures.
    pub fn sample(&self, instance: &mut Instance) -> Result<Vec<f64>, AccessError> {
        if self.requests.is_empty() {
            return Ok(Vec::new());
        }
        let values = instance.variables().get_batch(&self.requests)?;
        Ok(values
            .iter()
            .map(|v| v.as_f64().unwrap_or(f64::NAN))
            .collect())
    }

    /// Values between two samples at `time`.
    ///
    /// Continuous columns are interpolated linearly and held columns keep
    /// the earlier sample.
    #[must_use]
    pub fn interpolate(&self, time: f64, before: (f64, &[f64]), after: (f64, &[f64])) -> Vec<f64> {
        let (t0, v0) = before;
        let (t1, v1) = after;
        let span = t1 - t0;
        v0.iter()
            .zip(v1)
            .enumerate()
            .map(|(i, (&a, &b))| {
                if self.is_held(i) || span <= 0.0 {
                    a
                } else {
                    a + (b - a) * (time - t0) / span
                }
            })
            .collect()
    }
}
