/// Identifies the call a request frame carries.
///
/// The discriminants are the wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Instantiate = 1,
    SetupExperiment = 2,
    EnterInitializationMode = 3,
    ExitInitializationMode = 4,
    Terminate = 5,
    Reset = 6,
    FreeInstance = 7,
    GetReal = 8,
    GetInteger = 9,
    GetBoolean = 10,
    GetString = 11,
    SetReal = 12,
    SetInteger = 13,
    SetBoolean = 14,
    SetString = 15,
    DoStep = 16,
    GetBooleanStatus = 17,
    GetRealStatus = 18,
    SetTime = 19,
    SetContinuousStates = 20,
    GetContinuousStates = 21,
    GetDerivatives = 22,
    GetEventIndicators = 23,
    GetNominalsOfContinuousStates = 24,
    CompletedIntegratorStep = 25,
    EnterEventMode = 26,
    NewDiscreteStates = 27,
    EnterContinuousTimeMode = 28,
    GetFmuState = 29,
    SetFmuState = 30,
    FreeFmuState = 31,
    /// Ends the companion's serve loop. Has no reply.
    Shutdown = 255,
}

impl Function {
    const ALL: [Self; 32] = [
        Self::Instantiate,
        Self::SetupExperiment,
        Self::EnterInitializationMode,
        Self::ExitInitializationMode,
        Self::Terminate,
        Self::Reset,
        Self::FreeInstance,
        Self::GetReal,
        Self::GetInteger,
        Self::GetBoolean,
        Self::GetString,
        Self::SetReal,
        Self::SetInteger,
        Self::SetBoolean,
        Self::SetString,
        Self::DoStep,
        Self::GetBooleanStatus,
        Self::GetRealStatus,
        Self::SetTime,
        Self::SetContinuousStates,
        Self::GetContinuousStates,
        Self::GetDerivatives,
        Self::GetEventIndicators,
        Self::GetNominalsOfContinuousStates,
        Self::CompletedIntegratorStep,
        Self::EnterEventMode,
        Self::NewDiscreteStates,
        Self::EnterContinuousTimeMode,
        Self::GetFmuState,
        Self::SetFmuState,
        Self::FreeFmuState,
        Self::Shutdown,
    ];

    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|function| function.to_raw() == raw)
    }

    #[must_use]
    pub fn to_raw(self) -> u32 {
        self as u32
    }

    /// The name of the matching [`FmiCalls`](tandem_core::FmiCalls) method.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Instantiate => "instantiate",
            Self::SetupExperiment => "setup_experiment",
            Self::EnterInitializationMode => "enter_initialization_mode",
            Self::ExitInitializationMode => "exit_initialization_mode",
            Self::Terminate => "terminate",
            Self::Reset => "reset",
            Self::FreeInstance => "free_instance",
            Self::GetReal => "get_real",
            Self::GetInteger => "get_integer",
            Self::GetBoolean => "get_boolean",
            Self::GetString => "get_string",
            Self::SetReal => "set_real",
            Self::SetInteger => "set_integer",
            Self::SetBoolean => "set_boolean",
            Self::SetString => "set_string",
            Self::DoStep => "do_step",
            Self::GetBooleanStatus => "get_boolean_status",
            Self::GetRealStatus => "get_real_status",
            Self::SetTime => "set_time",
            Self::SetContinuousStates => "set_continuous_states",
            Self::GetContinuousStates => "get_continuous_states",
            Self::GetDerivatives => "get_derivatives",
            Self::GetEventIndicators => "get_event_indicators",
            Self::GetNominalsOfContinuousStates => "get_nominals_of_continuous_states",
            Self::CompletedIntegratorStep => "completed_integrator_step",
            Self::EnterEventMode => "enter_event_mode",
            Self::NewDiscreteStates => "new_discrete_states",
            Self::EnterContinuousTimeMode => "enter_continuous_time_mode",
            Self::GetFmuState => "get_fmu_state",
            Self::SetFmuState => "set_fmu_state",
            Self::FreeFmuState => "free_fmu_state",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Unsolicited frames the companion sends while a call is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    Log = 1,
    StepFinished = 2,
}

impl CallbackKind {
    #[must_use]
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Log),
            2 => Some(Self::StepFinished),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_raw(self) -> u8 {
        self as u8
    }
}

/// Reply status for a call the companion could not make.
///
/// Component statuses are never negative, so these cannot collide with
/// them. The payload is a reason string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Failure {
    /// The adapter in the companion failed.
    Adapter = -1,
    Instantiate = -2,
    Unsupported = -3,
    InvalidArgument = -4,
}

impl Failure {
    pub(crate) fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            -1 => Some(Self::Adapter),
            -2 => Some(Self::Instantiate),
            -3 => Some(Self::Unsupported),
            -4 => Some(Self::InvalidArgument),
            _ => None,
        }
    }

    pub(crate) fn to_raw(self) -> i32 {
        self as i32
    }
}
