//! Core types for hosting pre-compiled simulation components.
//!
//! This crate defines the shared abstractions that adapters, drivers, and the
//! coupling engine build on:
//!
//! - [`ModelDescription`]: the read-only descriptor of a component
//! - [`FmiCalls`]: the native call surface, implemented by the in-process
//!   adapter and by the remote proxy
//! - [`Instance`]: one component instance guarded by the lifecycle rules
//! - [`Variables`]: batched, typed get/set by value reference
//! - [`SimulationResult`] and [`EventRecord`]: what a run produces
//! - [`Observer`]: receives run events and optionally returns control actions

mod access;
mod callbacks;
mod calls;
mod description;
mod event;
mod lifecycle;
mod observer;
mod result;
mod status;
mod value;

#[cfg(test)]
mod testing;

pub use access::{AccessError, StartValueError, Variables};
pub use callbacks::{CallbackSink, LogMessage, TracingSink};
pub use calls::{
    AdapterError, CallResult, ChannelError, EventInfo, FmiCalls, FmuStateId, InstantiateRequest,
    IntegratorStepOutcome,
};
pub use description::{
    Causality, DefaultExperiment, Initial, Interface, InterfaceKind, ModelDescription,
    ScalarVariable, Variability,
};
pub use event::{Crossing, Direction, EventKind, EventRecord};
pub use lifecycle::{
    CallError, Instance, InstanceOptions, LifecycleError, LifecycleState, SequenceError,
};
pub use observer::Observer;
pub use result::{CsvSink, ResultError, ResultSink, Row, SimulationResult};
pub use status::{Status, StatusKind};
pub use value::{Value, ValueKind, ValueRef, Values};
