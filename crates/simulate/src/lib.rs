//! Runs hosted components over time.
//!
//! - [`simulate`]: one instance from instantiation to teardown, with a
//!   co-simulation or model-exchange [`Driver`] picked from its interface
//! - [`CoupledSystem`]: several instances stepped together and connected
//!   through a declarative [`SystemDescriptor`]
//!
//! Runs are configured by a [`SimulationConfig`], usually read from TOML.

pub mod config;
pub mod coupling;
pub mod driver;
mod grid;
mod inputs;
mod run;
mod sampler;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, RetryPolicy, SimulationConfig, SolverChoice};
pub use coupling::{CoupledSystem, CouplingError, SystemDescriptor, SystemError};
pub use driver::{CoSimulation, Driver, ModelExchange, Progress, StepError, driver_for};
pub use grid::OutputGrid;
pub use inputs::{ExternalInputs, InputError, InputTable};
pub use run::{Action, Completion, Outcome, RunError, RunEvent, SimulationError, simulate};
pub use sampler::Sampler;
