use std::{
    collections::HashMap,
    ffi::{CStr, CString},
    fmt,
    path::Path,
    ptr,
    sync::Arc,
};

use tandem_core::{
    AdapterError, CallResult, CallbackSink, EventInfo, FmiCalls, FmuStateId, InstantiateRequest,
    IntegratorStepOutcome, InterfaceKind, Status, StatusKind, ValueRef,
};

use crate::{
    callbacks::{callback_functions, CallbackContext},
    error::NativeError,
    ffi::*,
    registry::{LibraryHandle, LibraryRegistry},
    symbols::{CallTable, CoSimulationCalls, FmuStateCalls, ModelExchangeCalls},
};

/// A component library driven in this process.
///
/// Holds the library handle for as long as the native instance may run,
/// and frees a still-live instance on drop.
pub struct NativeFmu {
    table: CallTable,
    component: fmi2Component,
    callbacks: Option<Box<fmi2CallbackFunctions>>,
    context: Option<Box<CallbackContext>>,
    states: HashMap<u64, fmi2FMUstate>,
    next_state: u64,
    handle: LibraryHandle,
}

// SAFETY: the component pointer and state snapshots are only touched
// through `&mut self`, so the instance is used from one thread at a time.
unsafe impl Send for NativeFmu {}

impl NativeFmu {
    /// Wraps an acquired library, resolving the entry points for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`NativeError::Symbol`] if a required entry point is missing.
    pub fn new(handle: LibraryHandle, kind: InterfaceKind) -> Result<Self, NativeError> {
        let table = CallTable::resolve(&handle, kind)?;
        Ok(Self {
            table,
            component: ptr::null_mut(),
            callbacks: None,
            context: None,
            states: HashMap::new(),
            next_state: 1,
            handle,
        })
    }

    /// Acquires the library at `path` from `registry` and wraps it.
    ///
    /// # Errors
    ///
    /// Returns [`NativeError::Load`] if the library cannot be mapped, or
    /// [`NativeError::Symbol`] if a required entry point is missing.
    pub fn load(
        registry: &LibraryRegistry,
        path: impl AsRef<Path>,
        kind: InterfaceKind,
    ) -> Result<Self, NativeError> {
        let handle = registry.acquire(path)?;
        Self::new(handle, kind)
    }

    /// The FMI version string reported by the library.
    #[must_use]
    pub fn version(&self) -> String {
        // SAFETY: `fmi2GetVersion` takes no arguments and returns a static string.
        let raw = unsafe { (self.table.get_version)() };
        copy_string(raw)
    }

    #[must_use]
    pub fn library_path(&self) -> &Path {
        self.handle.path()
    }

    #[must_use]
    pub fn kind(&self) -> InterfaceKind {
        self.table.kind()
    }

    fn component(&self) -> CallResult<fmi2Component> {
        if self.component.is_null() {
            Err(AdapterError::InvalidArgument("no live native instance".into()))
        } else {
            Ok(self.component)
        }
    }

    fn co_simulation(&self, function: &'static str) -> CallResult<CoSimulationCalls> {
        self.table
            .co_simulation
            .ok_or(AdapterError::Unsupported { function })
    }

    fn model_exchange(&self, function: &'static str) -> CallResult<ModelExchangeCalls> {
        self.table
            .model_exchange
            .ok_or(AdapterError::Unsupported { function })
    }

    fn fmu_state(&self, function: &'static str) -> CallResult<FmuStateCalls> {
        self.table.fmu_state.ok_or(AdapterError::Unsupported { function })
    }

    /// Calls a no-argument entry point on the live instance.
    fn call(&mut self, f: fmi2ComponentCallTYPE) -> CallResult<Status> {
        let c = self.component()?;
        // SAFETY: `c` is a live instance created by this library.
        Ok(status(unsafe { f(c) }))
    }

    fn release_instance(&mut self) {
        if !self.component.is_null() {
            if let Some(calls) = self.table.fmu_state {
                // SAFETY: every held snapshot was captured from this live instance.
                let freed = unsafe { free_snapshots(calls.free, self.component, &mut self.states) };
                if freed > 0 {
                    tracing::debug!(snapshots = freed, "state snapshots freed");
                }
            }
            // SAFETY: the instance is live and freed exactly once.
            unsafe { (self.table.free_instance)(self.component) };
            self.component = ptr::null_mut();
            tracing::debug!(path = %self.handle.path().display(), "native instance freed");
        }
        self.states.clear();
        self.callbacks = None;
        self.context = None;
    }
}

impl Drop for NativeFmu {
    fn drop(&mut self) {
        self.release_instance();
    }
}

impl fmt::Debug for NativeFmu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFmu")
            .field("path", &self.handle.path())
            .field("kind", &self.table.kind())
            .field("live", &!self.component.is_null())
            .finish_non_exhaustive()
    }
}

fn status(raw: fmi2Status) -> Status {
    Status::from_raw(raw).unwrap_or_else(|| {
        tracing::warn!(raw, "component returned an unknown status");
        Status::Error
    })
}

fn c_string(value: &str) -> CallResult<CString> {
    CString::new(value)
        .map_err(|_| AdapterError::InvalidArgument(format!("{value:?} contains a NUL byte")))
}

fn copy_string(raw: fmi2String) -> String {
    if raw.is_null() {
        String::new()
    } else {
        // SAFETY: the component returns null-terminated strings.
        unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned()
    }
}

fn check_len(refs: &[ValueRef], values: usize) -> CallResult<()> {
    if refs.len() == values {
        Ok(())
    } else {
        Err(AdapterError::InvalidArgument(format!(
            "{} references but {values} values",
            refs.len()
        )))
    }
}

fn refs_ptr(refs: &[ValueRef]) -> *const fmi2ValueReference {
    // `ValueRef` is a transparent `u32`.
    refs.as_ptr().cast()
}

impl FmiCalls for NativeFmu {
    fn instantiate(
        &mut self,
        request: &InstantiateRequest,
        sink: Arc<dyn CallbackSink>,
    ) -> CallResult<()> {
        if !self.component.is_null() {
            return Err(AdapterError::InvalidArgument(
                "native instance already created".into(),
            ));
        }
        if request.kind != self.table.kind() {
            return Err(AdapterError::InvalidArgument(format!(
                "entry points were resolved for {:?}",
                self.table.kind()
            )));
        }

        let name = c_string(&request.instance_name)?;
        let guid = c_string(&request.guid)?;
        let resources = c_string(&request.resource_location)?;

        let context = Box::new(CallbackContext {
            instance_name: request.instance_name.clone(),
            sink,
        });
        let callbacks = callback_functions(&context);

        // SAFETY: all strings are null-terminated and the callback record
        // and its context are kept alive until after the instance is freed.
        let component = unsafe {
            (self.table.instantiate)(
                name.as_ptr(),
                request.kind.to_raw(),
                guid.as_ptr(),
                resources.as_ptr(),
                ptr::from_ref(callbacks.as_ref()),
                to_fmi_bool(request.visible),
                to_fmi_bool(request.logging_on),
            )
        };
        if component.is_null() {
            return Err(AdapterError::Instantiate {
                reason: format!("fmi2Instantiate returned no instance for {:?}", request.instance_name),
            });
        }

        self.component = component;
        self.callbacks = Some(callbacks);
        self.context = Some(context);
        tracing::debug!(
            instance = %request.instance_name,
            path = %self.handle.path().display(),
            "native instance created"
        );
        Ok(())
    }

    fn setup_experiment(
        &mut self,
        tolerance: Option<f64>,
        start_time: f64,
        stop_time: Option<f64>,
    ) -> CallResult<Status> {
        let c = self.component()?;
        // SAFETY: `c` is live.
        let raw = unsafe {
            (self.table.setup_experiment)(
                c,
                to_fmi_bool(tolerance.is_some()),
                tolerance.unwrap_or_default(),
                start_time,
                to_fmi_bool(stop_time.is_some()),
                stop_time.unwrap_or_default(),
            )
        };
        Ok(status(raw))
    }

    fn enter_initialization_mode(&mut self) -> CallResult<Status> {
        self.call(self.table.enter_initialization_mode)
    }

    fn exit_initialization_mode(&mut self) -> CallResult<Status> {
        self.call(self.table.exit_initialization_mode)
    }

    fn terminate(&mut self) -> CallResult<Status> {
        self.call(self.table.terminate)
    }

    fn reset(&mut self) -> CallResult<Status> {
        self.call(self.table.reset)
    }

    fn free_instance(&mut self) -> CallResult<()> {
        self.component()?;
        self.release_instance();
        Ok(())
    }

    fn get_real(&mut self, refs: &[ValueRef], values: &mut [f64]) -> CallResult<Status> {
        check_len(refs, values.len())?;
        let c = self.component()?;
        // SAFETY: both buffers hold `refs.len()` elements.
        let raw = unsafe { (self.table.get_real)(c, refs_ptr(refs), refs.len(), values.as_mut_ptr()) };
        Ok(status(raw))
    }

    fn get_integer(&mut self, refs: &[ValueRef], values: &mut [i32]) -> CallResult<Status> {
        check_len(refs, values.len())?;
        let c = self.component()?;
        // SAFETY: both buffers hold `refs.len()` elements.
        let raw =
            unsafe { (self.table.get_integer)(c, refs_ptr(refs), refs.len(), values.as_mut_ptr()) };
        Ok(status(raw))
    }

    fn get_boolean(&mut self, refs: &[ValueRef], values: &mut [bool]) -> CallResult<Status> {
        check_len(refs, values.len())?;
        let c = self.component()?;
        let mut raw_values = vec![fmi2False; refs.len()];
        // SAFETY: both buffers hold `refs.len()` elements.
        let raw = unsafe {
            (self.table.get_boolean)(c, refs_ptr(refs), refs.len(), raw_values.as_mut_ptr())
        };
        for (out, raw) in values.iter_mut().zip(raw_values) {
            *out = from_fmi_bool(raw);
        }
        Ok(status(raw))
    }

    fn get_string(&mut self, refs: &[ValueRef], values: &mut [String]) -> CallResult<Status> {
        check_len(refs, values.len())?;
        let c = self.component()?;
        let mut raw_values: Vec<fmi2String> = vec![ptr::null(); refs.len()];
        // SAFETY: both buffers hold `refs.len()` elements. The returned
        // strings belong to the component and are copied before the next call.
        let raw = unsafe {
            (self.table.get_string)(c, refs_ptr(refs), refs.len(), raw_values.as_mut_ptr())
        };
        for (out, raw) in values.iter_mut().zip(raw_values) {
            *out = copy_string(raw);
        }
        Ok(status(raw))
    }

    fn set_real(&mut self, refs: &[ValueRef], values: &[f64]) -> CallResult<Status> {
        check_len(refs, values.len())?;
        let c = self.component()?;
        // SAFETY: both buffers hold `refs.len()` elements.
        let raw = unsafe { (self.table.set_real)(c, refs_ptr(refs), refs.len(), values.as_ptr()) };
        Ok(status(raw))
    }

    fn set_integer(&mut self, refs: &[ValueRef], values: &[i32]) -> CallResult<Status> {
        check_len(refs, values.len())?;
        let c = self.component()?;
        // SAFETY: both buffers hold `refs.len()` elements.
        let raw = unsafe { (self.table.set_integer)(c, refs_ptr(refs), refs.len(), values.as_ptr()) };
        Ok(status(raw))
    }

    fn set_boolean(&mut self, refs: &[ValueRef], values: &[bool]) -> CallResult<Status> {
        check_len(refs, values.len())?;
        let c = self.component()?;
        let raw_values: Vec<fmi2Boolean> = values.iter().map(|&v| to_fmi_bool(v)).collect();
        // SAFETY: both buffers hold `refs.len()` elements.
        let raw = unsafe {
            (self.table.set_boolean)(c, refs_ptr(refs), refs.len(), raw_values.as_ptr())
        };
        Ok(status(raw))
    }

    fn set_string(&mut self, refs: &[ValueRef], values: &[String]) -> CallResult<Status> {
        check_len(refs, values.len())?;
        let c = self.component()?;
        let arena = values
            .iter()
            .map(|v| c_string(v))
            .collect::<CallResult<Vec<_>>>()?;
        let pointers: Vec<fmi2String> = arena.iter().map(|s| s.as_ptr()).collect();
        // SAFETY: `arena` outlives the call; the component copies the strings.
        let raw =
            unsafe { (self.table.set_string)(c, refs_ptr(refs), refs.len(), pointers.as_ptr()) };
        Ok(status(raw))
    }

    fn do_step(
        &mut self,
        current_time: f64,
        step_size: f64,
        no_set_prior_state: bool,
    ) -> CallResult<Status> {
        let cs = self.co_simulation("do_step")?;
        let c = self.component()?;
        // SAFETY: `c` is live.
        let raw = unsafe {
            (cs.do_step)(c, current_time, step_size, to_fmi_bool(no_set_prior_state))
        };
        Ok(status(raw))
    }

    fn get_boolean_status(&mut self, kind: StatusKind) -> CallResult<(Status, bool)> {
        let cs = self.co_simulation("get_boolean_status")?;
        let c = self.component()?;
        let mut value = fmi2False;
        // SAFETY: `value` is a valid out pointer.
        let raw = unsafe { (cs.get_boolean_status)(c, kind.to_raw(), &raw mut value) };
        Ok((status(raw), from_fmi_bool(value)))
    }

    fn get_real_status(&mut self, kind: StatusKind) -> CallResult<(Status, f64)> {
        let cs = self.co_simulation("get_real_status")?;
        let c = self.component()?;
        let mut value = 0.0;
        // SAFETY: `value` is a valid out pointer.
        let raw = unsafe { (cs.get_real_status)(c, kind.to_raw(), &raw mut value) };
        Ok((status(raw), value))
    }

    fn set_time(&mut self, time: f64) -> CallResult<Status> {
        let me = self.model_exchange("set_time")?;
        let c = self.component()?;
        // SAFETY: `c` is live.
        Ok(status(unsafe { (me.set_time)(c, time) }))
    }

    fn set_continuous_states(&mut self, states: &[f64]) -> CallResult<Status> {
        let me = self.model_exchange("set_continuous_states")?;
        let c = self.component()?;
        // SAFETY: `states` holds `states.len()` elements.
        let raw = unsafe { (me.set_continuous_states)(c, states.as_ptr(), states.len()) };
        Ok(status(raw))
    }

    fn get_continuous_states(&mut self, states: &mut [f64]) -> CallResult<Status> {
        let me = self.model_exchange("get_continuous_states")?;
        let c = self.component()?;
        // SAFETY: `states` holds `states.len()` elements.
        let raw = unsafe { (me.get_continuous_states)(c, states.as_mut_ptr(), states.len()) };
        Ok(status(raw))
    }

    fn get_derivatives(&mut self, derivatives: &mut [f64]) -> CallResult<Status> {
        let me = self.model_exchange("get_derivatives")?;
        let c = self.component()?;
        // SAFETY: `derivatives` holds `derivatives.len()` elements.
        let raw =
            unsafe { (me.get_derivatives)(c, derivatives.as_mut_ptr(), derivatives.len()) };
        Ok(status(raw))
    }

    fn get_event_indicators(&mut self, indicators: &mut [f64]) -> CallResult<Status> {
        let me = self.model_exchange("get_event_indicators")?;
        let c = self.component()?;
        // SAFETY: `indicators` holds `indicators.len()` elements.
        let raw =
            unsafe { (me.get_event_indicators)(c, indicators.as_mut_ptr(), indicators.len()) };
        Ok(status(raw))
    }

    fn get_nominals_of_continuous_states(&mut self, nominals: &mut [f64]) -> CallResult<Status> {
        let me = self.model_exchange("get_nominals_of_continuous_states")?;
        let c = self.component()?;
        // SAFETY: `nominals` holds `nominals.len()` elements.
        let raw = unsafe {
            (me.get_nominals_of_continuous_states)(c, nominals.as_mut_ptr(), nominals.len())
        };
        Ok(status(raw))
    }

    fn completed_integrator_step(
        &mut self,
        no_set_prior_state: bool,
    ) -> CallResult<(Status, IntegratorStepOutcome)> {
        let me = self.model_exchange("completed_integrator_step")?;
        let c = self.component()?;
        let mut enter_event_mode = fmi2False;
        let mut terminate_simulation = fmi2False;
        // SAFETY: both flags are valid out pointers.
        let raw = unsafe {
            (me.completed_integrator_step)(
                c,
                to_fmi_bool(no_set_prior_state),
                &raw mut enter_event_mode,
                &raw mut terminate_simulation,
            )
        };
        Ok((
            status(raw),
            IntegratorStepOutcome {
                enter_event_mode: from_fmi_bool(enter_event_mode),
                terminate_simulation: from_fmi_bool(terminate_simulation),
            },
        ))
    }

    fn enter_event_mode(&mut self) -> CallResult<Status> {
        let me = self.model_exchange("enter_event_mode")?;
        self.call(me.enter_event_mode)
    }

    fn new_discrete_states(&mut self) -> CallResult<(Status, EventInfo)> {
        let me = self.model_exchange("new_discrete_states")?;
        let c = self.component()?;
        let mut info = fmi2EventInfo::default();
        // SAFETY: `info` is a valid out pointer.
        let raw = unsafe { (me.new_discrete_states)(c, &raw mut info) };
        Ok((
            status(raw),
            EventInfo {
                new_discrete_states_needed: from_fmi_bool(info.newDiscreteStatesNeeded),
                terminate_simulation: from_fmi_bool(info.terminateSimulation),
                nominals_of_continuous_states_changed: from_fmi_bool(
                    info.nominalsOfContinuousStatesChanged,
                ),
                values_of_continuous_states_changed: from_fmi_bool(
                    info.valuesOfContinuousStatesChanged,
                ),
                next_event_time: from_fmi_bool(info.nextEventTimeDefined)
                    .then_some(info.nextEventTime),
            },
        ))
    }

    fn enter_continuous_time_mode(&mut self) -> CallResult<Status> {
        let me = self.model_exchange("enter_continuous_time_mode")?;
        self.call(me.enter_continuous_time_mode)
    }

    fn get_fmu_state(&mut self, existing: Option<FmuStateId>) -> CallResult<(Status, FmuStateId)> {
        let calls = self.fmu_state("get_fmu_state")?;
        let c = self.component()?;

        let (id, mut state) = match existing {
            Some(id) => {
                let state = *self.states.get(&id.0).ok_or_else(|| {
                    AdapterError::InvalidArgument(format!("unknown state snapshot {}", id.0))
                })?;
                (id.0, state)
            }
            None => {
                let id = self.next_state;
                self.next_state += 1;
                (id, ptr::null_mut())
            }
        };

        // SAFETY: `state` is null or a snapshot of this instance.
        let raw = unsafe { (calls.get)(c, &raw mut state) };
        let status = status(raw);
        if status.is_success() && !state.is_null() {
            self.states.insert(id, state);
        }
        Ok((status, FmuStateId(id)))
    }

    fn set_fmu_state(&mut self, state: FmuStateId) -> CallResult<Status> {
        let calls = self.fmu_state("set_fmu_state")?;
        let c = self.component()?;
        let snapshot = *self.states.get(&state.0).ok_or_else(|| {
            AdapterError::InvalidArgument(format!("unknown state snapshot {}", state.0))
        })?;
        // SAFETY: `snapshot` was captured from this instance.
        Ok(status(unsafe { (calls.set)(c, snapshot) }))
    }

    fn free_fmu_state(&mut self, state: FmuStateId) -> CallResult<Status> {
        let calls = self.fmu_state("free_fmu_state")?;
        let c = self.component()?;
        let mut snapshot = self.states.remove(&state.0).ok_or_else(|| {
            AdapterError::InvalidArgument(format!("unknown state snapshot {}", state.0))
        })?;
        // SAFETY: `snapshot` was captured from this instance and is freed once.
        Ok(status(unsafe { (calls.free)(c, &raw mut snapshot) }))
    }
}

/// Frees and forgets every snapshot in `states`, returning how many there
/// were.
///
/// # Safety
///
/// `component` must be live and every snapshot must have been captured
/// from it by the library that provided `free`.
unsafe fn free_snapshots(
    free: fmi2FreeFMUstateTYPE,
    component: fmi2Component,
    states: &mut HashMap<u64, fmi2FMUstate>,
) -> usize {
    let count = states.len();
    for (id, mut snapshot) in states.drain() {
        // SAFETY: guaranteed by the caller; each snapshot is freed once.
        let status = status(unsafe { free(component, &raw mut snapshot) });
        if !status.is_success() {
            tracing::warn!(snapshot = id, ?status, "component failed to free a state snapshot");
        }
    }
    count
}
