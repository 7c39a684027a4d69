//! Integrators that drive a [`ContinuousSystem`] one accepted step at a time
//! and stop at the first event-indicator sign change.
//!
//! - [`Euler`]: fixed-step explicit Euler
//! - [`Dopri5`]: adaptive Dormand–Prince 5(4), via `ode_solvers`
//!
//! Both localize indicator roots by bisection (see [`root`]).

mod dopri5;
mod euler;
mod integrator;
pub mod root;
mod system;

pub use dopri5::Dopri5;
pub use euler::Euler;
pub use integrator::{Advance, Integrator, IntegratorError};
pub use system::{ContinuousSystem, SystemError};
