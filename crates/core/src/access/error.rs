use thiserror::Error;

use crate::{
    lifecycle::{LifecycleError, LifecycleState, SequenceError},
    value::{ValueKind, ValueRef},
};

/// A variable cannot be given a value during setup.
///
/// Raised in `Instantiated` and `InitializationMode` for variables whose
/// value the component calculates.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("`{variable}` cannot be set in state {state}")]
pub struct StartValueError {
    pub variable: String,
    pub state: LifecycleState,
}

/// Errors raised by the variable access layer.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error("no {kind:?} variable with reference {value_ref}")]
    UnknownReference { kind: ValueKind, value_ref: ValueRef },

    #[error("no variable named `{name}`")]
    UnknownVariable { name: String },

    #[error("{refs} references but {values} values")]
    LengthMismatch { refs: usize, values: usize },

    #[error("`{variable}` is {expected:?}, got a {actual:?} value")]
    TypeMismatch {
        variable: String,
        expected: ValueKind,
        actual: ValueKind,
    },

    #[error(transparent)]
    StartValue(#[from] StartValueError),

    #[error("`{variable}` is not settable in state {state}")]
    NotSettable {
        variable: String,
        state: LifecycleState,
    },

    #[error("native access failed")]
    Native(#[source] LifecycleError),
}

impl From<LifecycleError> for AccessError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Sequence(err) => Self::Sequence(err),
            other => Self::Native(other),
        }
    }
}
