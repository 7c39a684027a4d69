//! FMI 2.0 C types and function signatures.

#![allow(non_camel_case_types, non_snake_case)]

use std::ffi::{c_char, c_int, c_uint, c_void};

pub(crate) type fmi2Component = *mut c_void;
pub(crate) type fmi2ComponentEnvironment = *mut c_void;
pub(crate) type fmi2FMUstate = *mut c_void;
pub(crate) type fmi2ValueReference = c_uint;
pub(crate) type fmi2Real = f64;
pub(crate) type fmi2Integer = c_int;
pub(crate) type fmi2Boolean = c_int;
pub(crate) type fmi2String = *const c_char;
pub(crate) type fmi2Status = c_int;
pub(crate) type fmi2Type = c_int;
pub(crate) type fmi2StatusKind = c_int;

pub(crate) const fmi2True: fmi2Boolean = 1;
pub(crate) const fmi2False: fmi2Boolean = 0;

pub(crate) fn to_fmi_bool(value: bool) -> fmi2Boolean {
    if value { fmi2True } else { fmi2False }
}

pub(crate) fn from_fmi_bool(value: fmi2Boolean) -> bool {
    value != fmi2False
}

/// Logger callback.
///
/// The C signature is variadic. Only the fixed arguments are read, so the
/// format string is forwarded without expanding its arguments.
pub(crate) type fmi2CallbackLogger = unsafe extern "C" fn(
    env: fmi2ComponentEnvironment,
    instance_name: fmi2String,
    status: fmi2Status,
    category: fmi2String,
    message: fmi2String,
);
pub(crate) type fmi2CallbackAllocateMemory = extern "C" fn(nobj: usize, size: usize) -> *mut c_void;
pub(crate) type fmi2CallbackFreeMemory = unsafe extern "C" fn(obj: *mut c_void);
pub(crate) type fmi2StepFinished =
    unsafe extern "C" fn(env: fmi2ComponentEnvironment, status: fmi2Status);

#[repr(C)]
pub(crate) struct fmi2CallbackFunctions {
    pub logger: fmi2CallbackLogger,
    pub allocateMemory: fmi2CallbackAllocateMemory,
    pub freeMemory: fmi2CallbackFreeMemory,
    pub stepFinished: Option<fmi2StepFinished>,
    pub componentEnvironment: fmi2ComponentEnvironment,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct fmi2EventInfo {
    pub newDiscreteStatesNeeded: fmi2Boolean,
    pub terminateSimulation: fmi2Boolean,
    pub nominalsOfContinuousStatesChanged: fmi2Boolean,
    pub valuesOfContinuousStatesChanged: fmi2Boolean,
    pub nextEventTimeDefined: fmi2Boolean,
    pub nextEventTime: fmi2Real,
}

pub(crate) type fmi2GetVersionTYPE = unsafe extern "C" fn() -> fmi2String;
pub(crate) type fmi2InstantiateTYPE = unsafe extern "C" fn(
    instance_name: fmi2String,
    fmu_type: fmi2Type,
    guid: fmi2String,
    resource_location: fmi2String,
    functions: *const fmi2CallbackFunctions,
    visible: fmi2Boolean,
    logging_on: fmi2Boolean,
) -> fmi2Component;
pub(crate) type fmi2FreeInstanceTYPE = unsafe extern "C" fn(c: fmi2Component);
pub(crate) type fmi2SetupExperimentTYPE = unsafe extern "C" fn(
    c: fmi2Component,
    tolerance_defined: fmi2Boolean,
    tolerance: fmi2Real,
    start_time: fmi2Real,
    stop_time_defined: fmi2Boolean,
    stop_time: fmi2Real,
) -> fmi2Status;
pub(crate) type fmi2ComponentCallTYPE = unsafe extern "C" fn(c: fmi2Component) -> fmi2Status;

pub(crate) type fmi2GetRealTYPE = unsafe extern "C" fn(
    c: fmi2Component,
    vr: *const fmi2ValueReference,
    nvr: usize,
    value: *mut fmi2Real,
) -> fmi2Status;
pub(crate) type fmi2GetIntegerTYPE = unsafe extern "C" fn(
    c: fmi2Component,
    vr: *const fmi2ValueReference,
    nvr: usize,
    value: *mut fmi2Integer,
) -> fmi2Status;
pub(crate) type fmi2GetBooleanTYPE = unsafe extern "C" fn(
    c: fmi2Component,
    vr: *const fmi2ValueReference,
    nvr: usize,
    value: *mut fmi2Boolean,
) -> fmi2Status;
pub(crate) type fmi2GetStringTYPE = unsafe extern "C" fn(
    c: fmi2Component,
    vr: *const fmi2ValueReference,
    nvr: usize,
    value: *mut fmi2String,
) -> fmi2Status;
pub(crate) type fmi2SetRealTYPE = unsafe extern "C" fn(
    c: fmi2Component,
    vr: *const fmi2ValueReference,
    nvr: usize,
    value: *const fmi2Real,
) -> fmi2Status;
pub(crate) type fmi2SetIntegerTYPE = unsafe extern "C" fn(
    c: fmi2Component,
    vr: *const fmi2ValueReference,
    nvr: usize,
    value: *const fmi2Integer,
) -> fmi2Status;
pub(crate) type fmi2SetBooleanTYPE = unsafe extern "C" fn(
    c: fmi2Component,
    vr: *const fmi2ValueReference,
    nvr: usize,
    value: *const fmi2Boolean,
) -> fmi2Status;
pub(crate) type fmi2SetStringTYPE = unsafe extern "C" fn(
    c: fmi2Component,
    vr: *const fmi2ValueReference,
    nvr: usize,
    value: *const fmi2String,
) -> fmi2Status;

pub(crate) type fmi2GetFMUstateTYPE =
    unsafe extern "C" fn(c: fmi2Component, state: *mut fmi2FMUstate) -> fmi2Status;
pub(crate) type fmi2SetFMUstateTYPE =
    unsafe extern "C" fn(c: fmi2Component, state: fmi2FMUstate) -> fmi2Status;
pub(crate) type fmi2FreeFMUstateTYPE =
    unsafe extern "C" fn(c: fmi2Component, state: *mut fmi2FMUstate) -> fmi2Status;

pub(crate) type fmi2DoStepTYPE = unsafe extern "C" fn(
    c: fmi2Component,
    current_communication_point: fmi2Real,
    communication_step_size: fmi2Real,
    no_set_fmu_state_prior_to_current_point: fmi2Boolean,
) -> fmi2Status;
pub(crate) type fmi2GetBooleanStatusTYPE = unsafe extern "C" fn(
    c: fmi2Component,
    kind: fmi2StatusKind,
    value: *mut fmi2Boolean,
) -> fmi2Status;
pub(crate) type fmi2GetRealStatusTYPE =
    unsafe extern "C" fn(c: fmi2Component, kind: fmi2StatusKind, value: *mut fmi2Real) -> fmi2Status;

pub(crate) type fmi2SetTimeTYPE = unsafe extern "C" fn(c: fmi2Component, time: fmi2Real) -> fmi2Status;
pub(crate) type fmi2SetContinuousStatesTYPE =
    unsafe extern "C" fn(c: fmi2Component, x: *const fmi2Real, nx: usize) -> fmi2Status;
pub(crate) type fmi2GetRealArrayTYPE =
    unsafe extern "C" fn(c: fmi2Component, values: *mut fmi2Real, n: usize) -> fmi2Status;
pub(crate) type fmi2NewDiscreteStatesTYPE =
    unsafe extern "C" fn(c: fmi2Component, info: *mut fmi2EventInfo) -> fmi2Status;
pub(crate) type fmi2CompletedIntegratorStepTYPE = unsafe extern "C" fn(
    c: fmi2Component,
    no_set_fmu_state_prior_to_current_point: fmi2Boolean,
    enter_event_mode: *mut fmi2Boolean,
    terminate_simulation: *mut fmi2Boolean,
) -> fmi2Status;
