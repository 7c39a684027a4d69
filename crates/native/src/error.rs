use std::path::PathBuf;

use thiserror::Error;

/// Errors raised when mapping a shared library.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no binary at {path}")]
    Missing { path: PathBuf },

    #[error("{path} was built for {found}, host is {host}")]
    IncompatibleArchitecture {
        path: PathBuf,
        found: String,
        host: &'static str,
    },

    #[error("failed to load {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
}

/// A required entry point is missing from a loaded library.
///
/// `source` is `None` when the handle was already released.
#[derive(Debug, Error)]
#[error("`{name}` not found in {path}")]
pub struct SymbolError {
    pub name: &'static str,
    pub path: PathBuf,
    #[source]
    pub source: Option<libloading::Error>,
}

/// Errors raised by [`NativeFmu::load`](crate::NativeFmu::load).
#[derive(Debug, Error)]
pub enum NativeError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Symbol(#[from] SymbolError),
}
