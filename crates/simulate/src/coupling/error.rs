use tandem_core::{LifecycleError, ValueKind};
use thiserror::Error;

use crate::{config::ConfigError, run::SimulationError};

use super::collaborators::CollaboratorError;

/// Structural problems in a system descriptor.
///
/// All of these are found before anything is instantiated, except the
/// variable checks, which need the loaded component's descriptor.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SystemError {
    #[error("system `{system}` declares `{name}` more than once")]
    DuplicateElement { system: String, name: String },

    #[error("system `{system}` has no element `{element}`")]
    UnknownElement { system: String, element: String },

    #[error("`{element}` has no connector `{connector}`")]
    UnknownConnector { element: String, connector: String },

    #[error("cannot connect {from_kind:?} `{from}` to {to_kind:?} `{to}`")]
    ConnectionTypeMismatch {
        from: String,
        from_kind: ValueKind,
        to: String,
        to_kind: ValueKind,
    },

    #[error("connection `{from}` -> `{to}` carries {kind:?} values and cannot be transformed")]
    InvalidTransform {
        from: String,
        to: String,
        kind: ValueKind,
    },

    #[error("connection `{from}` -> `{to}` runs against the connector directions")]
    ConnectionDirection { from: String, to: String },

    #[error("`{connector}` is the end of more than one connection")]
    MultipleSources { connector: String },

    #[error("connections form a cycle through `{connector}`")]
    ConnectionCycle { connector: String },

    #[error("component `{component}` has no variable `{name}`")]
    UnknownVariable { component: String, name: String },

    #[error("connector `{connector}` is {declared:?} but the variable is {actual:?}")]
    VariableTypeMismatch {
        connector: String,
        declared: ValueKind,
        actual: ValueKind,
    },

    #[error("`{name}` is not an input connector of the system")]
    UnknownInput { name: String },
}

/// Errors raised while building, running, or tearing down a coupled system.
#[derive(Debug, Error)]
pub enum CouplingError {
    #[error("invalid system structure")]
    Structure(#[from] SystemError),

    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    #[error("failed to extract `{archive}`")]
    Extract {
        archive: String,
        #[source]
        source: CollaboratorError,
    },

    #[error("failed to load component `{component}`")]
    Load {
        component: String,
        #[source]
        source: CollaboratorError,
    },

    #[error(transparent)]
    Component(#[from] SimulationError),

    #[error("failed to tear down `{component}`")]
    Teardown {
        component: String,
        #[source]
        source: LifecycleError,
    },

    #[error("failed to release the extracted archive")]
    Release(#[source] CollaboratorError),

    #[error("the system has already been torn down")]
    TornDown,
}
