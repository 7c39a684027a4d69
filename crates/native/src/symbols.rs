//! Entry points resolved from a loaded component library.

use std::path::Path;

use libloading::Library;
use tandem_core::InterfaceKind;

use crate::{error::SymbolError, ffi::*, registry::LibraryHandle};

/// Function pointers for one interface of a component library.
///
/// The pointers are valid for as long as the [`LibraryHandle`] they were
/// resolved from stays acquired.
#[derive(Clone, Copy)]
pub struct CallTable {
    kind: InterfaceKind,
    pub(crate) get_version: fmi2GetVersionTYPE,
    pub(crate) instantiate: fmi2InstantiateTYPE,
    pub(crate) free_instance: fmi2FreeInstanceTYPE,
    pub(crate) setup_experiment: fmi2SetupExperimentTYPE,
    pub(crate) enter_initialization_mode: fmi2ComponentCallTYPE,
    pub(crate) exit_initialization_mode: fmi2ComponentCallTYPE,
    pub(crate) terminate: fmi2ComponentCallTYPE,
    pub(crate) reset: fmi2ComponentCallTYPE,
    pub(crate) get_real: fmi2GetRealTYPE,
    pub(crate) get_integer: fmi2GetIntegerTYPE,
    pub(crate) get_boolean: fmi2GetBooleanTYPE,
    pub(crate) get_string: fmi2GetStringTYPE,
    pub(crate) set_real: fmi2SetRealTYPE,
    pub(crate) set_integer: fmi2SetIntegerTYPE,
    pub(crate) set_boolean: fmi2SetBooleanTYPE,
    pub(crate) set_string: fmi2SetStringTYPE,
    pub(crate) fmu_state: Option<FmuStateCalls>,
    pub(crate) co_simulation: Option<CoSimulationCalls>,
    pub(crate) model_exchange: Option<ModelExchangeCalls>,
}

#[derive(Clone, Copy)]
pub(crate) struct FmuStateCalls {
    pub get: fmi2GetFMUstateTYPE,
    pub set: fmi2SetFMUstateTYPE,
    pub free: fmi2FreeFMUstateTYPE,
}

#[derive(Clone, Copy)]
pub(crate) struct CoSimulationCalls {
    pub do_step: fmi2DoStepTYPE,
    pub get_boolean_status: fmi2GetBooleanStatusTYPE,
    pub get_real_status: fmi2GetRealStatusTYPE,
}

#[derive(Clone, Copy)]
pub(crate) struct ModelExchangeCalls {
    pub set_time: fmi2SetTimeTYPE,
    pub set_continuous_states: fmi2SetContinuousStatesTYPE,
    pub get_continuous_states: fmi2GetRealArrayTYPE,
    pub get_derivatives: fmi2GetRealArrayTYPE,
    pub get_event_indicators: fmi2GetRealArrayTYPE,
    pub get_nominals_of_continuous_states: fmi2GetRealArrayTYPE,
    pub completed_integrator_step: fmi2CompletedIntegratorStepTYPE,
    pub enter_event_mode: fmi2ComponentCallTYPE,
    pub new_discrete_states: fmi2NewDiscreteStatesTYPE,
    pub enter_continuous_time_mode: fmi2ComponentCallTYPE,
}

impl CallTable {
    /// Resolves the common entry points and those of `kind`.
    ///
    /// State snapshot functions are optional; every other entry point for
    /// the interface must be exported.
    ///
    /// # Errors
    ///
    /// Returns a [`SymbolError`] naming the first missing entry point.
    pub fn resolve(handle: &LibraryHandle, kind: InterfaceKind) -> Result<Self, SymbolError> {
        let path = handle.path();
        let Some(library) = handle.library() else {
            return Err(SymbolError {
                name: "fmi2GetVersion",
                path: path.to_path_buf(),
                source: None,
            });
        };
        let lookup = Lookup { library, path };

        let fmu_state = match (
            lookup.optional("fmi2GetFMUstate"),
            lookup.optional("fmi2SetFMUstate"),
            lookup.optional("fmi2FreeFMUstate"),
        ) {
            (Some(get), Some(set), Some(free)) => Some(FmuStateCalls { get, set, free }),
            _ => None,
        };

        let co_simulation = match kind {
            InterfaceKind::CoSimulation => Some(CoSimulationCalls {
                do_step: lookup.required("fmi2DoStep")?,
                get_boolean_status: lookup.required("fmi2GetBooleanStatus")?,
                get_real_status: lookup.required("fmi2GetRealStatus")?,
            }),
            InterfaceKind::ModelExchange => None,
        };

        let model_exchange = match kind {
            InterfaceKind::ModelExchange => Some(ModelExchangeCalls {
                set_time: lookup.required("fmi2SetTime")?,
                set_continuous_states: lookup.required("fmi2SetContinuousStates")?,
                get_continuous_states: lookup.required("fmi2GetContinuousStates")?,
                get_derivatives: lookup.required("fmi2GetDerivatives")?,
                get_event_indicators: lookup.required("fmi2GetEventIndicators")?,
                get_nominals_of_continuous_states: lookup
                    .required("fmi2GetNominalsOfContinuousStates")?,
                completed_integrator_step: lookup.required("fmi2CompletedIntegratorStep")?,
                enter_event_mode: lookup.required("fmi2EnterEventMode")?,
                new_discrete_states: lookup.required("fmi2NewDiscreteStates")?,
                enter_continuous_time_mode: lookup.required("fmi2EnterContinuousTimeMode")?,
            }),
            InterfaceKind::CoSimulation => None,
        };

        let table = Self {
            kind,
            get_version: lookup.required("fmi2GetVersion")?,
            instantiate: lookup.required("fmi2Instantiate")?,
            free_instance: lookup.required("fmi2FreeInstance")?,
            setup_experiment: lookup.required("fmi2SetupExperiment")?,
            enter_initialization_mode: lookup.required("fmi2EnterInitializationMode")?,
            exit_initialization_mode: lookup.required("fmi2ExitInitializationMode")?,
            terminate: lookup.required("fmi2Terminate")?,
            reset: lookup.required("fmi2Reset")?,
            get_real: lookup.required("fmi2GetReal")?,
            get_integer: lookup.required("fmi2GetInteger")?,
            get_boolean: lookup.required("fmi2GetBoolean")?,
            get_string: lookup.required("fmi2GetString")?,
            set_real: lookup.required("fmi2SetReal")?,
            set_integer: lookup.required("fmi2SetInteger")?,
            set_boolean: lookup.required("fmi2SetBoolean")?,
            set_string: lookup.required("fmi2SetString")?,
            fmu_state,
            co_simulation,
            model_exchange,
        };
        tracing::debug!(
            path = %path.display(),
            ?kind,
            rollback = table.fmu_state.is_some(),
            "entry points resolved"
        );
        Ok(table)
    }

    #[must_use]
    pub fn kind(&self) -> InterfaceKind {
        self.kind
    }

    /// Whether the library exports the state snapshot functions.
    #[must_use]
    pub fn supports_fmu_state(&self) -> bool {
        self.fmu_state.is_some()
    }
}

struct Lookup<'a> {
    library: &'a Library,
    path: &'a Path,
}

impl Lookup<'_> {
    fn required<T: Copy>(&self, name: &'static str) -> Result<T, SymbolError> {
        // SAFETY: `T` is the FMI 2.0 signature of `name`.
        unsafe { self.library.get::<T>(name.as_bytes()) }
            .map(|symbol| *symbol)
            .map_err(|source| SymbolError {
                name,
                path: self.path.to_path_buf(),
                source: Some(source),
            })
    }

    fn optional<T: Copy>(&self, name: &'static str) -> Option<T> {
        self.required(name).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::registry::{system_library, LibraryRegistry};

    #[test]
    #[cfg_attr(
        not(all(target_os = "linux", target_env = "gnu")),
        ignore = "needs a file-backed C library in the test process"
    )]
    fn missing_entry_point_is_named() {
        let path = system_library();
        let registry = LibraryRegistry::new();
        let handle = registry.acquire(&path).unwrap();

        let Err(err) = CallTable::resolve(&handle, InterfaceKind::CoSimulation) else {
            panic!("a system library does not export FMI entry points");
        };
        assert!(err.name.starts_with("fmi2"));
        assert!(err.to_string().contains(err.name));
        assert!(err.source.is_some());
    }

    #[test]
    #[cfg_attr(
        not(all(target_os = "linux", target_env = "gnu")),
        ignore = "needs a file-backed C library in the test process"
    )]
    fn released_handle_resolves_nothing() {
        let path = system_library();
        let registry = LibraryRegistry::new();
        let mut handle = registry.acquire(&path).unwrap();
        registry.release(&mut handle);

        let Err(err) = CallTable::resolve(&handle, InterfaceKind::ModelExchange) else {
            panic!("released handle resolved");
        };
        assert!(err.source.is_none());
    }
}
