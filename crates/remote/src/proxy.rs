use std::{
    fmt,
    io::{BufReader, BufWriter, Read, Write},
    net::{TcpStream, ToSocketAddrs},
    process::{ChildStdin, ChildStdout},
    sync::Arc,
};

use tandem_core::{
    AdapterError, CallResult, CallbackSink, ChannelError, EventInfo, FmiCalls, FmuStateId,
    InstantiateRequest, IntegratorStepOutcome, LogMessage, Status, StatusKind, ValueRef,
};

use crate::{
    codec::{Decoder, Encoder, Frame, ProtocolError, read_frame, write_frame},
    companion::Companion,
    error::RemoteError,
    function::{CallbackKind, Failure, Function},
};

/// Proxy for a component served over TCP.
pub type TcpRemote = RemoteFmu<BufReader<TcpStream>, BufWriter<TcpStream>>;

/// Proxy for a component hosted by a spawned companion process.
pub type PipeRemote = RemoteFmu<BufReader<ChildStdout>, BufWriter<ChildStdin>>;

/// [`FmiCalls`] forwarded to a component in another process.
///
/// Each call writes one request frame and blocks until the matching reply.
/// Callback frames that arrive first are handed to the sink given at
/// instantiation. The first transport failure or malformed frame poisons
/// the proxy, and every later call fails with [`ChannelError::Poisoned`].
pub struct RemoteFmu<R, W>
where
    R: Read,
    W: Write,
{
    reader: R,
    writer: W,
    sink: Option<Arc<dyn CallbackSink>>,
    poisoned: bool,
    process: Option<Companion>,
}

impl<R: Read, W: Write> RemoteFmu<R, W> {
    /// Wraps a channel whose companion is already serving.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            sink: None,
            poisoned: false,
            process: None,
        }
    }

    pub(crate) fn with_process(mut self, process: Companion) -> Self {
        self.process = Some(process);
        self
    }

    /// Waits for the companion to report that its component is loaded.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Rejected`] with the companion's reason if the
    /// component could not be loaded, and [`RemoteError::Channel`] if the
    /// channel fails first.
    pub fn handshake(mut self) -> Result<Self, RemoteError> {
        match read_frame(&mut self.reader).map_err(ChannelError::from)? {
            Frame::Reply { status: 0, payload } if payload.is_empty() => Ok(self),
            Frame::Reply { status, payload } if status < 0 => {
                let reason = Decoder::new(&payload)
                    .string()
                    .unwrap_or_else(|_| "no reason given".into());
                self.poisoned = true;
                Err(RemoteError::Rejected { reason })
            }
            frame => {
                self.poisoned = true;
                Err(ChannelError::Malformed(format!("expected a ready reply, got a {} frame", frame.kind())).into())
            }
        }
    }

    /// True once the channel has failed.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Sends one request and decodes its reply.
    ///
    /// Negative reply statuses carry a failure reason instead of a payload.
    fn request<T>(
        &mut self,
        function: Function,
        payload: Vec<u8>,
        decode: impl FnOnce(&mut Decoder<'_>) -> Result<T, ProtocolError>,
    ) -> CallResult<(Status, T)> {
        if self.poisoned {
            return Err(ChannelError::Poisoned.into());
        }
        match self.exchange(function, payload, decode) {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(function = function.name(), error = %err, "remote channel failed");
                self.poisoned = true;
                Err(ChannelError::from(err).into())
            }
        }
    }

    fn exchange<T>(
        &mut self,
        function: Function,
        payload: Vec<u8>,
        decode: impl FnOnce(&mut Decoder<'_>) -> Result<T, ProtocolError>,
    ) -> Result<CallResult<(Status, T)>, ProtocolError> {
        write_frame(&mut self.writer, &Frame::Request { function, payload })?;

        let (status, payload) = loop {
            match read_frame(&mut self.reader)? {
                Frame::Reply { status, payload } => break (status, payload),
                Frame::Callback { kind, payload } => self.dispatch(kind, &payload)?,
                Frame::Request { .. } => return Err(ProtocolError::Unexpected("request")),
            }
        };

        let mut decoder = Decoder::new(&payload);
        if let Some(failure) = Failure::from_raw(status) {
            let reason = decoder.string()?;
            decoder.finish()?;
            return Ok(Err(match failure {
                Failure::Instantiate => AdapterError::Instantiate { reason },
                Failure::Unsupported => AdapterError::Unsupported {
                    function: function.name(),
                },
                Failure::InvalidArgument => AdapterError::InvalidArgument(reason),
                Failure::Adapter => AdapterError::Remote { reason },
            }));
        }

        let status = Status::from_raw(status).ok_or(ProtocolError::InvalidValue {
            what: "status",
            raw: i64::from(status),
        })?;
        let value = decode(&mut decoder)?;
        decoder.finish()?;
        Ok(Ok((status, value)))
    }

    fn dispatch(&self, kind: CallbackKind, payload: &[u8]) -> Result<(), ProtocolError> {
        let mut decoder = Decoder::new(payload);
        match kind {
            CallbackKind::Log => {
                let instance = decoder.string()?;
                let status = decode_status(&mut decoder)?;
                let category = decoder.string()?;
                let message = decoder.string()?;
                decoder.finish()?;
                if let Some(sink) = &self.sink {
                    sink.log(&LogMessage {
                        instance,
                        status,
                        category,
                        message,
                    });
                }
            }
            CallbackKind::StepFinished => {
                let status = decode_status(&mut decoder)?;
                decoder.finish()?;
                if let Some(sink) = &self.sink {
                    sink.step_finished(status);
                }
            }
        }
        Ok(())
    }

    fn status_call(&mut self, function: Function, payload: Vec<u8>) -> CallResult<Status> {
        self.request(function, payload, |_| Ok(())).map(|(status, ())| status)
    }

    fn get_array<T>(
        &mut self,
        function: Function,
        payload: Vec<u8>,
        out: &mut [T],
        decode: impl FnOnce(&mut Decoder<'_>) -> Result<Vec<T>, ProtocolError>,
    ) -> CallResult<Status> {
        let expected = out.len();
        let (status, values) = self.request(function, payload, |decoder| {
            let values = decode(decoder)?;
            if values.len() == expected {
                Ok(values)
            } else {
                Err(ProtocolError::Count {
                    expected,
                    actual: values.len(),
                })
            }
        })?;
        for (slot, value) in out.iter_mut().zip(values) {
            *slot = value;
        }
        Ok(status)
    }
}

impl TcpRemote {
    /// Connects to a companion listening on `addr` and waits until it is
    /// ready.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or the companion could not
    /// load its component.
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, RemoteError> {
        let stream = TcpStream::connect(addr).map_err(RemoteError::Connect)?;
        stream.set_nodelay(true).map_err(RemoteError::Connect)?;
        let reader = stream.try_clone().map_err(RemoteError::Connect)?;
        Self::new(BufReader::new(reader), BufWriter::new(stream)).handshake()
    }
}

fn decode_status(decoder: &mut Decoder<'_>) -> Result<Status, ProtocolError> {
    let raw = decoder.i32()?;
    Status::from_raw(raw).ok_or(ProtocolError::InvalidValue {
        what: "status",
        raw: i64::from(raw),
    })
}

fn count(n: usize) -> Vec<u8> {
    Encoder::new().u32(u32::try_from(n).unwrap_or(u32::MAX)).finish()
}

impl<R, W> FmiCalls for RemoteFmu<R, W>
where
    R: Read + Send,
    W: Write + Send,
{
    fn instantiate(&mut self, request: &InstantiateRequest, sink: Arc<dyn CallbackSink>) -> CallResult<()> {
        self.sink = Some(sink);
        let payload = Encoder::new()
            .str(&request.instance_name)
            .i32(request.kind.to_raw())
            .str(&request.guid)
            .str(&request.resource_location)
            .bool(request.visible)
            .bool(request.logging_on)
            .finish();
        self.request(Function::Instantiate, payload, |_| Ok(()))?;
        Ok(())
    }

    fn setup_experiment(&mut self, tolerance: Option<f64>, start_time: f64, stop_time: Option<f64>) -> CallResult<Status> {
        let payload = Encoder::new()
            .option_f64(tolerance)
            .f64(start_time)
            .option_f64(stop_time)
            .finish();
        self.status_call(Function::SetupExperiment, payload)
    }

    fn enter_initialization_mode(&mut self) -> CallResult<Status> {
        self.status_call(Function::EnterInitializationMode, Vec::new())
    }

    fn exit_initialization_mode(&mut self) -> CallResult<Status> {
        self.status_call(Function::ExitInitializationMode, Vec::new())
    }

    fn terminate(&mut self) -> CallResult<Status> {
        self.status_call(Function::Terminate, Vec::new())
    }

    fn reset(&mut self) -> CallResult<Status> {
        self.status_call(Function::Reset, Vec::new())
    }

    fn free_instance(&mut self) -> CallResult<()> {
        self.status_call(Function::FreeInstance, Vec::new())?;
        Ok(())
    }

    fn get_real(&mut self, refs: &[ValueRef], values: &mut [f64]) -> CallResult<Status> {
        let payload = Encoder::new().refs(refs).finish();
        self.get_array(Function::GetReal, payload, values, |decoder| decoder.reals())
    }

    fn get_integer(&mut self, refs: &[ValueRef], values: &mut [i32]) -> CallResult<Status> {
        let payload = Encoder::new().refs(refs).finish();
        self.get_array(Function::GetInteger, payload, values, |decoder| decoder.integers())
    }

    fn get_boolean(&mut self, refs: &[ValueRef], values: &mut [bool]) -> CallResult<Status> {
        let payload = Encoder::new().refs(refs).finish();
        self.get_array(Function::GetBoolean, payload, values, |decoder| decoder.booleans())
    }

    fn get_string(&mut self, refs: &[ValueRef], values: &mut [String]) -> CallResult<Status> {
        let payload = Encoder::new().refs(refs).finish();
        self.get_array(Function::GetString, payload, values, |decoder| decoder.strings())
    }

    fn set_real(&mut self, refs: &[ValueRef], values: &[f64]) -> CallResult<Status> {
        let payload = Encoder::new().refs(refs).reals(values).finish();
        self.status_call(Function::SetReal, payload)
    }

    fn set_integer(&mut self, refs: &[ValueRef], values: &[i32]) -> CallResult<Status> {
        let payload = Encoder::new().refs(refs).integers(values).finish();
        self.status_call(Function::SetInteger, payload)
    }

    fn set_boolean(&mut self, refs: &[ValueRef], values: &[bool]) -> CallResult<Status> {
        let payload = Encoder::new().refs(refs).booleans(values).finish();
        self.status_call(Function::SetBoolean, payload)
    }

    fn set_string(&mut self, refs: &[ValueRef], values: &[String]) -> CallResult<Status> {
        let payload = Encoder::new().refs(refs).strings(values).finish();
        self.status_call(Function::SetString, payload)
    }

    fn do_step(&mut self, current_time: f64, step_size: f64, no_set_prior_state: bool) -> CallResult<Status> {
        let payload = Encoder::new()
            .f64(current_time)
            .f64(step_size)
            .bool(no_set_prior_state)
            .finish();
        self.status_call(Function::DoStep, payload)
    }

    fn get_boolean_status(&mut self, kind: StatusKind) -> CallResult<(Status, bool)> {
        let payload = Encoder::new().i32(kind.to_raw()).finish();
        self.request(Function::GetBooleanStatus, payload, |decoder| decoder.bool())
    }

    fn get_real_status(&mut self, kind: StatusKind) -> CallResult<(Status, f64)> {
        let payload = Encoder::new().i32(kind.to_raw()).finish();
        self.request(Function::GetRealStatus, payload, |decoder| decoder.f64())
    }

    fn set_time(&mut self, time: f64) -> CallResult<Status> {
        self.status_call(Function::SetTime, Encoder::new().f64(time).finish())
    }

    fn set_continuous_states(&mut self, states: &[f64]) -> CallResult<Status> {
        self.status_call(Function::SetContinuousStates, Encoder::new().reals(states).finish())
    }

    fn get_continuous_states(&mut self, states: &mut [f64]) -> CallResult<Status> {
        let payload = count(states.len());
        self.get_array(Function::GetContinuousStates, payload, states, |decoder| decoder.reals())
    }

    fn get_derivatives(&mut self, derivatives: &mut [f64]) -> CallResult<Status> {
        let payload = count(derivatives.len());
        self.get_array(Function::GetDerivatives, payload, derivatives, |decoder| decoder.reals())
    }

    fn get_event_indicators(&mut self, indicators: &mut [f64]) -> CallResult<Status> {
        let payload = count(indicators.len());
        self.get_array(Function::GetEventIndicators, payload, indicators, |decoder| decoder.reals())
    }

    fn get_nominals_of_continuous_states(&mut self, nominals: &mut [f64]) -> CallResult<Status> {
        let payload = count(nominals.len());
        self.get_array(Function::GetNominalsOfContinuousStates, payload, nominals, |decoder| decoder.reals())
    }

    fn completed_integrator_step(&mut self, no_set_prior_state: bool) -> CallResult<(Status, IntegratorStepOutcome)> {
        let payload = Encoder::new().bool(no_set_prior_state).finish();
        self.request(Function::CompletedIntegratorStep, payload, |decoder| {
            Ok(IntegratorStepOutcome {
                enter_event_mode: decoder.bool()?,
                terminate_simulation: decoder.bool()?,
            })
        })
    }

    fn enter_event_mode(&mut self) -> CallResult<Status> {
        self.status_call(Function::EnterEventMode, Vec::new())
    }

    fn new_discrete_states(&mut self) -> CallResult<(Status, EventInfo)> {
        self.request(Function::NewDiscreteStates, Vec::new(), |decoder| {
            Ok(EventInfo {
                new_discrete_states_needed: decoder.bool()?,
                terminate_simulation: decoder.bool()?,
                nominals_of_continuous_states_changed: decoder.bool()?,
                values_of_continuous_states_changed: decoder.bool()?,
                next_event_time: decoder.option_f64()?,
            })
        })
    }

    fn enter_continuous_time_mode(&mut self) -> CallResult<Status> {
        self.status_call(Function::EnterContinuousTimeMode, Vec::new())
    }

    fn get_fmu_state(&mut self, existing: Option<FmuStateId>) -> CallResult<(Status, FmuStateId)> {
        let payload = Encoder::new()
            .bool(existing.is_some())
            .u64(existing.map_or(0, |id| id.0))
            .finish();
        self.request(Function::GetFmuState, payload, |decoder| decoder.u64().map(FmuStateId))
    }

    fn set_fmu_state(&mut self, state: FmuStateId) -> CallResult<Status> {
        self.status_call(Function::SetFmuState, Encoder::new().u64(state.0).finish())
    }

    fn free_fmu_state(&mut self, state: FmuStateId) -> CallResult<Status> {
        self.status_call(Function::FreeFmuState, Encoder::new().u64(state.0).finish())
    }
}

impl<R: Read, W: Write> fmt::Debug for RemoteFmu<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteFmu")
            .field("poisoned", &self.poisoned)
            .field("process", &self.process)
            .finish_non_exhaustive()
    }
}

impl<R: Read, W: Write> Drop for RemoteFmu<R, W> {
    fn drop(&mut self) {
        if self.poisoned {
            return;
        }
        let shutdown = Frame::Request {
            function: Function::Shutdown,
            payload: Vec::new(),
        };
        if let Err(err) = write_frame(&mut self.writer, &shutdown) {
            tracing::debug!(error = %err, "companion already gone at shutdown");
        }
    }
}
