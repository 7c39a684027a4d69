use serde::{Deserialize, Serialize};
use tandem_core::{Value, ValueKind};

/// Declarative structure of a coupled system.
///
/// Systems nest: an element is either a component or another system.
/// Connections inside a system refer to connectors of its own elements by
/// element name, or to the system's own boundary connectors when the
/// element is omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SystemDescriptor {
    pub name: String,
    #[serde(default)]
    pub elements: Vec<Element>,
    /// Boundary connectors of this system.
    #[serde(default)]
    pub connectors: Vec<Connector>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    /// Values for connectors or variables, addressed relative to this system.
    #[serde(default)]
    pub parameter_bindings: Vec<ParameterBinding>,
}

impl SystemDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_element(mut self, element: impl Into<Element>) -> Self {
        self.elements.push(element.into());
        self
    }

    #[must_use]
    pub fn with_connector(mut self, connector: Connector) -> Self {
        self.connectors.push(connector);
        self
    }

    #[must_use]
    pub fn with_connection(mut self, connection: Connection) -> Self {
        self.connections.push(connection);
        self
    }

    #[must_use]
    pub fn with_binding(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameter_bindings.push(ParameterBinding::new(name, value));
        self
    }
}

/// One member of a system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Element {
    Component(ComponentElement),
    System(SystemDescriptor),
}

impl Element {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Component(component) => &component.name,
            Self::System(system) => &system.name,
        }
    }
}

impl From<ComponentElement> for Element {
    fn from(component: ComponentElement) -> Self {
        Self::Component(component)
    }
}

impl From<SystemDescriptor> for Element {
    fn from(system: SystemDescriptor) -> Self {
        Self::System(system)
    }
}

/// A component instance within a system.
///
/// Connector names are the names of the component's variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentElement {
    pub name: String,
    /// Where the component lives inside the system's archive.
    pub source: String,
    #[serde(default)]
    pub connectors: Vec<Connector>,
    /// Values for the component's variables, by variable name.
    #[serde(default)]
    pub parameter_bindings: Vec<ParameterBinding>,
}

impl ComponentElement {
    #[must_use]
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_connector(mut self, connector: Connector) -> Self {
        self.connectors.push(connector);
        self
    }

    #[must_use]
    pub fn with_binding(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameter_bindings.push(ParameterBinding::new(name, value));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connector {
    pub name: String,
    pub kind: ConnectorKind,
    #[serde(rename = "type")]
    pub value_kind: ValueKind,
}

impl Connector {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ConnectorKind, value_kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            value_kind,
        }
    }

    #[must_use]
    pub fn real_input(name: impl Into<String>) -> Self {
        Self::new(name, ConnectorKind::Input, ValueKind::Real)
    }

    #[must_use]
    pub fn real_output(name: impl Into<String>) -> Self {
        Self::new(name, ConnectorKind::Output, ValueKind::Real)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorKind {
    Input,
    Output,
    Parameter,
    CalculatedParameter,
}

/// A directed link from one connector to another.
///
/// A missing element refers to the enclosing system's own connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Connection {
    #[serde(default)]
    pub start_element: Option<String>,
    pub start_connector: String,
    #[serde(default)]
    pub end_element: Option<String>,
    pub end_connector: String,
    #[serde(default)]
    pub transformation: Option<LinearTransformation>,
}

impl Connection {
    /// Connects `start_element.start_connector` to
    /// `end_element.end_connector`.
    #[must_use]
    pub fn new(
        start_element: &str,
        start_connector: &str,
        end_element: &str,
        end_connector: &str,
    ) -> Self {
        Self {
            start_element: Some(start_element.to_owned()),
            start_connector: start_connector.to_owned(),
            end_element: Some(end_element.to_owned()),
            end_connector: end_connector.to_owned(),
            transformation: None,
        }
    }

    /// Connects a boundary connector of the system to an element.
    #[must_use]
    pub fn from_boundary(connector: &str, end_element: &str, end_connector: &str) -> Self {
        Self {
            start_element: None,
            ..Self::new("", connector, end_element, end_connector)
        }
    }

    /// Connects an element to a boundary connector of the system.
    #[must_use]
    pub fn to_boundary(start_element: &str, start_connector: &str, connector: &str) -> Self {
        Self {
            end_element: None,
            ..Self::new(start_element, start_connector, "", connector)
        }
    }

    #[must_use]
    pub fn transformed(mut self, factor: f64, offset: f64) -> Self {
        self.transformation = Some(LinearTransformation { factor, offset });
        self
    }
}

/// `factor * x + offset`, applied to Real values only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearTransformation {
    #[serde(default = "unit_factor")]
    pub factor: f64,
    #[serde(default)]
    pub offset: f64,
}

fn unit_factor() -> f64 {
    1.0
}

impl LinearTransformation {
    #[must_use]
    pub fn apply(&self, x: f64) -> f64 {
        self.factor * x + self.offset
    }
}

/// A value for a connector or variable, applied before initialization.
///
/// Inside a system, `name` is either one of the system's connectors or a
/// dotted path through its elements (`pump.speed`, `sub.gain.k`). Inside a
/// component it is a variable name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterBinding {
    pub name: String,
    pub value: Value,
}

impl ParameterBinding {
    #[must_use]
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}
