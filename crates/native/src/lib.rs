//! In-process adapter for FMI 2.0 shared libraries.
//!
//! [`LibraryRegistry`] maps each binary at most once and reference-counts
//! its users, [`CallTable`] resolves the exported entry points, and
//! [`NativeFmu`] marshals the typed [`FmiCalls`](tandem_core::FmiCalls)
//! surface onto them.

mod adapter;
mod callbacks;
mod error;
mod ffi;
mod memory;
pub mod platform;
mod registry;
mod symbols;

pub use adapter::NativeFmu;
pub use error::{LoadError, NativeError, SymbolError};
pub use registry::{LibraryHandle, LibraryRegistry};
pub use symbols::CallTable;
