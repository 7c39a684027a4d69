use serde::{Deserialize, Serialize};

use crate::value::{Value, ValueKind, ValueRef};

/// Read-only descriptor of a component.
///
/// Produced by an external parser and shared by every instance of the same
/// component. Nothing in this workspace mutates it after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescription {
    pub fmi_version: String,
    pub model_name: String,
    /// Instantiation token checked by the component at instantiate time.
    pub guid: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub model_exchange: Option<Interface>,
    #[serde(default)]
    pub co_simulation: Option<Interface>,
    #[serde(default)]
    pub default_experiment: Option<DefaultExperiment>,
    #[serde(default)]
    pub variables: Vec<ScalarVariable>,
    #[serde(default)]
    pub number_of_continuous_states: usize,
    #[serde(default)]
    pub number_of_event_indicators: usize,
}

impl ModelDescription {
    /// Returns the capability block for `kind`, if the component supports it.
    #[must_use]
    pub fn interface(&self, kind: InterfaceKind) -> Option<&Interface> {
        match kind {
            InterfaceKind::ModelExchange => self.model_exchange.as_ref(),
            InterfaceKind::CoSimulation => self.co_simulation.as_ref(),
        }
    }

    #[must_use]
    pub fn supports(&self, kind: InterfaceKind) -> bool {
        self.interface(kind).is_some()
    }

    /// Returns the interface used when the caller expresses no preference.
    ///
    /// Co-simulation is preferred because it needs no host integrator.
    #[must_use]
    pub fn default_kind(&self) -> Option<InterfaceKind> {
        if self.co_simulation.is_some() {
            Some(InterfaceKind::CoSimulation)
        } else if self.model_exchange.is_some() {
            Some(InterfaceKind::ModelExchange)
        } else {
            None
        }
    }

    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&ScalarVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    #[must_use]
    pub fn variable_by_ref(&self, kind: ValueKind, value_ref: ValueRef) -> Option<&ScalarVariable> {
        self.variables
            .iter()
            .find(|v| v.kind == kind && v.value_ref == value_ref)
    }

    /// Iterates over the variables with output causality.
    pub fn outputs(&self) -> impl Iterator<Item = &ScalarVariable> {
        self.variables
            .iter()
            .filter(|v| v.causality == Causality::Output)
    }
}

/// Capability block for one interface kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    /// Base name of the shared library and prefix of its exported symbols.
    pub model_identifier: String,
    #[serde(default)]
    pub can_get_and_set_fmu_state: bool,
    #[serde(default)]
    pub can_handle_variable_communication_step_size: bool,
    #[serde(default)]
    pub needs_execution_tool: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceKind {
    ModelExchange = 0,
    CoSimulation = 1,
}

impl InterfaceKind {
    #[must_use]
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::ModelExchange),
            1 => Some(Self::CoSimulation),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_raw(self) -> i32 {
        self as i32
    }
}

/// Experiment defaults suggested by the component author.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultExperiment {
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub stop_time: Option<f64>,
    #[serde(default)]
    pub tolerance: Option<f64>,
    #[serde(default)]
    pub step_size: Option<f64>,
}

/// One variable of a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarVariable {
    pub name: String,
    pub kind: ValueKind,
    pub value_ref: ValueRef,
    #[serde(default)]
    pub causality: Causality,
    #[serde(default)]
    pub variability: Variability,
    #[serde(default)]
    pub initial: Option<Initial>,
    #[serde(default)]
    pub start: Option<Value>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ScalarVariable {
    /// Returns the declared `initial` attribute, or its default for the
    /// causality and variability combination.
    ///
    /// Inputs and the independent variable have no `initial` attribute.
    #[must_use]
    pub fn effective_initial(&self) -> Option<Initial> {
        if self.initial.is_some() {
            return self.initial;
        }
        match (self.causality, self.variability) {
            (Causality::Input | Causality::Independent, _) => None,
            (Causality::Parameter, _) => Some(Initial::Exact),
            (Causality::CalculatedParameter, _) => Some(Initial::Calculated),
            (Causality::Output | Causality::Local, Variability::Constant) => Some(Initial::Exact),
            (Causality::Output | Causality::Local, _) => Some(Initial::Calculated),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Causality {
    Parameter,
    CalculatedParameter,
    Input,
    Output,
    #[default]
    Local,
    Independent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Variability {
    Constant,
    Fixed,
    Tunable,
    Discrete,
    #[default]
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Initial {
    Exact,
    Approx,
    Calculated,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable(causality: Causality, variability: Variability) -> ScalarVariable {
        ScalarVariable {
            name: "x".into(),
            kind: ValueKind::Real,
            value_ref: ValueRef(0),
            causality,
            variability,
            initial: None,
            start: None,
            unit: None,
            description: None,
        }
    }

    #[test]
    fn initial_defaults_follow_causality_and_variability() {
        use Causality::*;
        use Variability::*;

        assert_eq!(variable(Parameter, Fixed).effective_initial(), Some(Initial::Exact));
        assert_eq!(
            variable(CalculatedParameter, Tunable).effective_initial(),
            Some(Initial::Calculated)
        );
        assert_eq!(variable(Output, Continuous).effective_initial(), Some(Initial::Calculated));
        assert_eq!(variable(Local, Constant).effective_initial(), Some(Initial::Exact));
        assert_eq!(variable(Input, Continuous).effective_initial(), None);
        assert_eq!(variable(Independent, Continuous).effective_initial(), None);
    }

    #[test]
    fn declared_initial_wins() {
        let mut v = variable(Causality::Output, Variability::Continuous);
        v.initial = Some(Initial::Exact);
        assert_eq!(v.effective_initial(), Some(Initial::Exact));
    }

    #[test]
    fn descriptor_deserializes_with_defaults() {
        let json = r#"{
            "fmi_version": "2.0",
            "model_name": "Gain",
            "guid": "{gain}",
            "co_simulation": { "model_identifier": "gain", "can_get_and_set_fmu_state": true },
            "variables": [
                { "name": "u", "kind": "real", "value_ref": 0, "causality": "input", "start": 0.0 },
                { "name": "k", "kind": "real", "value_ref": 1, "causality": "parameter",
                  "variability": "fixed", "start": 2 }
            ]
        }"#;
        let md: ModelDescription = serde_json::from_str(json).unwrap();

        assert_eq!(md.default_kind(), Some(InterfaceKind::CoSimulation));
        assert!(!md.supports(InterfaceKind::ModelExchange));
        assert_eq!(md.number_of_continuous_states, 0);
        assert_eq!(md.variable("k").unwrap().start, Some(Value::Integer(2)));
        assert_eq!(
            md.variable_by_ref(ValueKind::Real, ValueRef(0)).unwrap().name,
            "u"
        );
        assert!(md.variable_by_ref(ValueKind::Integer, ValueRef(0)).is_none());
    }
}
