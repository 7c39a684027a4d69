use std::{
    io::{Read, Write},
    sync::Arc,
};

use parking_lot::Mutex;
use tandem_core::{
    AdapterError, CallResult, CallbackSink, FmiCalls, FmuStateId, InstantiateRequest,
    InterfaceKind, LogMessage, Status, StatusKind,
};

use crate::{
    codec::{Decoder, Encoder, Frame, ProtocolError, read_frame, write_frame},
    function::{CallbackKind, Failure, Function},
};

/// Announces whether the component loaded, then serves it if it did.
///
/// This is the whole life of a companion: the proxy's handshake waits for
/// the announcement.
///
/// # Errors
///
/// Returns an error if the channel fails or a request is malformed.
pub fn host<C, R, W>(component: Result<C, String>, reader: R, mut writer: W) -> Result<(), ProtocolError>
where
    C: FmiCalls,
    R: Read,
    W: Write + Send + 'static,
{
    match component {
        Ok(calls) => {
            write_frame(&mut writer, &reply(Ok((Status::Ok, Vec::new()))))?;
            serve(calls, reader, writer)
        }
        Err(reason) => {
            tracing::error!(%reason, "component could not be loaded");
            let rejected = Frame::Reply {
                status: Failure::Adapter.to_raw(),
                payload: Encoder::new().str(&reason).finish(),
            };
            write_frame(&mut writer, &rejected)
        }
    }
}

/// Serves requests for `calls` until the proxy shuts down or disconnects.
///
/// Component log messages and step notifications are forwarded as callback
/// frames as soon as they arrive.
///
/// # Errors
///
/// Returns an error if the channel fails or a request is malformed.
pub fn serve<C, R, W>(mut calls: C, mut reader: R, writer: W) -> Result<(), ProtocolError>
where
    C: FmiCalls,
    R: Read,
    W: Write + Send + 'static,
{
    let writer = Arc::new(Mutex::new(writer));
    let sink: Arc<dyn CallbackSink> = Arc::new(ForwardingSink {
        writer: Arc::clone(&writer),
    });

    loop {
        let (function, payload) = match read_frame(&mut reader) {
            Ok(Frame::Request { function, payload }) => (function, payload),
            Ok(frame) => return Err(ProtocolError::Unexpected(frame.kind())),
            Err(err) if err.is_eof() => {
                tracing::info!("proxy disconnected");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        if function == Function::Shutdown {
            tracing::info!("shutdown requested");
            return Ok(());
        }

        tracing::trace!(function = function.name(), "request");
        let response = handle(&mut calls, function, &payload, &sink)?;
        write_frame(&mut *writer.lock(), &response)?;
    }
}

fn handle<C: FmiCalls>(
    calls: &mut C,
    function: Function,
    payload: &[u8],
    sink: &Arc<dyn CallbackSink>,
) -> Result<Frame, ProtocolError> {
    let mut args = Decoder::new(payload);
    let result = match function {
        Function::Instantiate => {
            let instance_name = args.string()?;
            let raw_kind = args.i32()?;
            let kind = InterfaceKind::from_raw(raw_kind).ok_or(ProtocolError::InvalidValue {
                what: "interface kind",
                raw: i64::from(raw_kind),
            })?;
            let request = InstantiateRequest {
                instance_name,
                kind,
                guid: args.string()?,
                resource_location: args.string()?,
                visible: args.bool()?,
                logging_on: args.bool()?,
            };
            args.finish()?;
            calls.instantiate(&request, Arc::clone(sink)).map(|()| (Status::Ok, Vec::new()))
        }
        Function::SetupExperiment => {
            let tolerance = args.option_f64()?;
            let start = args.f64()?;
            let stop = args.option_f64()?;
            args.finish()?;
            plain(calls.setup_experiment(tolerance, start, stop))
        }
        Function::EnterInitializationMode => no_args(args, || calls.enter_initialization_mode())?,
        Function::ExitInitializationMode => no_args(args, || calls.exit_initialization_mode())?,
        Function::Terminate => no_args(args, || calls.terminate())?,
        Function::Reset => no_args(args, || calls.reset())?,
        Function::FreeInstance => {
            args.finish()?;
            calls.free_instance().map(|()| (Status::Ok, Vec::new()))
        }
        Function::GetReal => {
            let refs = args.refs()?;
            args.finish()?;
            let mut values = vec![0.0; refs.len()];
            with(calls.get_real(&refs, &mut values), |out| out.reals(&values))
        }
        Function::GetInteger => {
            let refs = args.refs()?;
            args.finish()?;
            let mut values = vec![0; refs.len()];
            with(calls.get_integer(&refs, &mut values), |out| out.integers(&values))
        }
        Function::GetBoolean => {
            let refs = args.refs()?;
            args.finish()?;
            let mut values = vec![false; refs.len()];
            with(calls.get_boolean(&refs, &mut values), |out| out.booleans(&values))
        }
        Function::GetString => {
            let refs = args.refs()?;
            args.finish()?;
            let mut values = vec![String::new(); refs.len()];
            with(calls.get_string(&refs, &mut values), |out| out.strings(&values))
        }
        Function::SetReal => {
            let (refs, values) = (args.refs()?, args.reals()?);
            args.finish()?;
            plain(calls.set_real(&refs, &values))
        }
        Function::SetInteger => {
            let (refs, values) = (args.refs()?, args.integers()?);
            args.finish()?;
            plain(calls.set_integer(&refs, &values))
        }
        Function::SetBoolean => {
            let (refs, values) = (args.refs()?, args.booleans()?);
            args.finish()?;
            plain(calls.set_boolean(&refs, &values))
        }
        Function::SetString => {
            let (refs, values) = (args.refs()?, args.strings()?);
            args.finish()?;
            plain(calls.set_string(&refs, &values))
        }
        Function::DoStep => {
            let (time, step, no_set_prior_state) = (args.f64()?, args.f64()?, args.bool()?);
            args.finish()?;
            plain(calls.do_step(time, step, no_set_prior_state))
        }
        Function::GetBooleanStatus => {
            let kind = status_kind(&mut args)?;
            args.finish()?;
            calls
                .get_boolean_status(kind)
                .map(|(status, value)| (status, Encoder::new().bool(value).finish()))
        }
        Function::GetRealStatus => {
            let kind = status_kind(&mut args)?;
            args.finish()?;
            calls
                .get_real_status(kind)
                .map(|(status, value)| (status, Encoder::new().f64(value).finish()))
        }
        Function::SetTime => {
            let time = args.f64()?;
            args.finish()?;
            plain(calls.set_time(time))
        }
        Function::SetContinuousStates => {
            let states = args.reals()?;
            args.finish()?;
            plain(calls.set_continuous_states(&states))
        }
        Function::GetContinuousStates => {
            let mut values = sized(args)?;
            with(calls.get_continuous_states(&mut values), |out| out.reals(&values))
        }
        Function::GetDerivatives => {
            let mut values = sized(args)?;
            with(calls.get_derivatives(&mut values), |out| out.reals(&values))
        }
        Function::GetEventIndicators => {
            let mut values = sized(args)?;
            with(calls.get_event_indicators(&mut values), |out| out.reals(&values))
        }
        Function::GetNominalsOfContinuousStates => {
            let mut values = sized(args)?;
            with(calls.get_nominals_of_continuous_states(&mut values), |out| out.reals(&values))
        }
        Function::CompletedIntegratorStep => {
            let no_set_prior_state = args.bool()?;
            args.finish()?;
            calls.completed_integrator_step(no_set_prior_state).map(|(status, outcome)| {
                let payload = Encoder::new()
                    .bool(outcome.enter_event_mode)
                    .bool(outcome.terminate_simulation)
                    .finish();
                (status, payload)
            })
        }
        Function::EnterEventMode => no_args(args, || calls.enter_event_mode())?,
        Function::NewDiscreteStates => {
            args.finish()?;
            calls.new_discrete_states().map(|(status, info)| {
                let payload = Encoder::new()
                    .bool(info.new_discrete_states_needed)
                    .bool(info.terminate_simulation)
                    .bool(info.nominals_of_continuous_states_changed)
                    .bool(info.values_of_continuous_states_changed)
                    .option_f64(info.next_event_time)
                    .finish();
                (status, payload)
            })
        }
        Function::EnterContinuousTimeMode => no_args(args, || calls.enter_continuous_time_mode())?,
        Function::GetFmuState => {
            let present = args.bool()?;
            let id = args.u64()?;
            args.finish()?;
            calls
                .get_fmu_state(present.then_some(FmuStateId(id)))
                .map(|(status, state)| (status, Encoder::new().u64(state.0).finish()))
        }
        Function::SetFmuState => {
            let id = args.u64()?;
            args.finish()?;
            plain(calls.set_fmu_state(FmuStateId(id)))
        }
        Function::FreeFmuState => {
            let id = args.u64()?;
            args.finish()?;
            plain(calls.free_fmu_state(FmuStateId(id)))
        }
        Function::Shutdown => return Err(ProtocolError::Unexpected("shutdown")),
    };

    if let Err(err) = &result {
        tracing::debug!(function = function.name(), error = %err, "call failed in the companion");
    }
    Ok(reply(result))
}

fn plain(result: CallResult<Status>) -> CallResult<(Status, Vec<u8>)> {
    result.map(|status| (status, Vec::new()))
}

fn no_args(
    args: Decoder<'_>,
    call: impl FnOnce() -> CallResult<Status>,
) -> Result<CallResult<(Status, Vec<u8>)>, ProtocolError> {
    args.finish()?;
    Ok(plain(call()))
}

fn with(
    result: CallResult<Status>,
    encode: impl FnOnce(&mut Encoder) -> &mut Encoder,
) -> CallResult<(Status, Vec<u8>)> {
    result.map(|status| (status, encode(&mut Encoder::new()).finish()))
}

/// Allocates an output array of the length the proxy asked for.
fn sized(mut args: Decoder<'_>) -> Result<Vec<f64>, ProtocolError> {
    let len = args.requested_len(size_of::<f64>())?;
    args.finish()?;
    Ok(vec![0.0; len])
}

fn status_kind(args: &mut Decoder<'_>) -> Result<StatusKind, ProtocolError> {
    let raw = args.i32()?;
    StatusKind::from_raw(raw).ok_or(ProtocolError::InvalidValue {
        what: "status kind",
        raw: i64::from(raw),
    })
}

fn reply(result: CallResult<(Status, Vec<u8>)>) -> Frame {
    match result {
        Ok((status, payload)) => Frame::Reply {
            status: status.to_raw(),
            payload,
        },
        Err(err) => {
            let (failure, reason) = match err {
                AdapterError::Instantiate { reason } => (Failure::Instantiate, reason),
                AdapterError::Unsupported { function } => (Failure::Unsupported, function.to_owned()),
                AdapterError::InvalidArgument(reason) => (Failure::InvalidArgument, reason),
                err => (Failure::Adapter, err.to_string()),
            };
            Frame::Reply {
                status: failure.to_raw(),
                payload: Encoder::new().str(&reason).finish(),
            }
        }
    }
}

/// Sends component callbacks to the proxy as they happen.
struct ForwardingSink<W> {
    writer: Arc<Mutex<W>>,
}

impl<W: Write> ForwardingSink<W> {
    fn send(&self, kind: CallbackKind, payload: Vec<u8>) {
        let frame = Frame::Callback { kind, payload };
        if let Err(err) = write_frame(&mut *self.writer.lock(), &frame) {
            tracing::warn!(error = %err, "failed to forward callback");
        }
    }
}

impl<W: Write + Send> CallbackSink for ForwardingSink<W> {
    fn log(&self, message: &LogMessage) {
        let payload = Encoder::new()
            .str(&message.instance)
            .i32(message.status.to_raw())
            .str(&message.category)
            .str(&message.message)
            .finish();
        self.send(CallbackKind::Log, payload);
    }

    fn step_finished(&self, status: Status) {
        self.send(CallbackKind::StepFinished, Encoder::new().i32(status.to_raw()).finish());
    }
}
