use thiserror::Error;

use crate::{calls::AdapterError, description::InterfaceKind, status::Status};

use super::LifecycleState;

/// An operation was called in a state where it is not allowed.
///
/// No native call is made when this error is returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("`{operation}` is not allowed in state {state} (instance `{instance}`)")]
pub struct SequenceError {
    pub instance: String,
    pub operation: &'static str,
    pub state: LifecycleState,
}

/// The component returned `Error` or `Fatal` (or a status the caller does not
/// accept) from a lifecycle call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("`{operation}` returned {status} (instance `{instance}`){}", diagnostic_suffix(.diagnostic))]
pub struct CallError {
    pub instance: String,
    pub operation: &'static str,
    pub status: Status,
    /// Latest non-OK message the component logged before failing.
    pub diagnostic: Option<String>,
}

fn diagnostic_suffix(diagnostic: &Option<String>) -> String {
    diagnostic
        .as_ref()
        .map(|d| format!(": {d}"))
        .unwrap_or_default()
}

/// Errors raised by [`Instance`](super::Instance) operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error(transparent)]
    Call(#[from] CallError),

    #[error("adapter failed during `{operation}` (instance `{instance}`)")]
    Adapter {
        instance: String,
        operation: &'static str,
        #[source]
        source: AdapterError,
    },

    #[error("component does not provide the {kind:?} interface")]
    UnsupportedInterface { kind: InterfaceKind },

    #[error("component provides neither model exchange nor co-simulation")]
    NoInterface,

    #[error("`{operation}` expected {expected} values, got {actual}")]
    LengthMismatch {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },
}

impl LifecycleError {
    /// Returns true if the error left the instance in `Fatal`.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Call(err) => err.status == Status::Fatal,
            Self::Adapter { source, .. } => source.is_channel(),
            _ => false,
        }
    }
}
