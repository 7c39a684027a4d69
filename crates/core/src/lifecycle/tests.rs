use super::*;

use crate::testing::{self, FakeCalls};

fn instance(kind: InterfaceKind) -> (Instance, FakeCalls) {
    let fake = FakeCalls::default();
    let instance = Instance::instantiate(
        Box::new(fake.clone()),
        testing::description(),
        InstanceOptions::new("inst").kind(kind),
    )
    .expect("instantiate succeeds");
    (instance, fake)
}

fn initialized(kind: InterfaceKind) -> (Instance, FakeCalls) {
    let (mut instance, fake) = instance(kind);
    instance.setup_experiment(None, 0.0, Some(1.0)).unwrap();
    instance.enter_initialization_mode().unwrap();
    instance.exit_initialization_mode().unwrap();
    (instance, fake)
}

#[test]
fn co_simulation_happy_path() {
    let (mut instance, fake) = initialized(InterfaceKind::CoSimulation);
    assert_eq!(instance.state(), StepMode);

    assert_eq!(instance.do_step(0.0, 0.1, true).unwrap(), Status::Ok);
    assert_eq!(instance.last_time(), Some(0.1));

    instance.terminate().unwrap();
    assert_eq!(instance.state(), Terminated);
    instance.free_instance().unwrap();
    assert_eq!(instance.state(), Freed);

    assert_eq!(
        fake.calls(),
        [
            "instantiate",
            "setup_experiment",
            "enter_initialization_mode",
            "exit_initialization_mode",
            "do_step",
            "terminate",
            "free_instance",
        ]
    );
}

#[test]
fn step_before_initialization_is_rejected_without_native_call() {
    let (mut instance, fake) = instance(InterfaceKind::CoSimulation);

    let err = instance.do_step(0.0, 0.1, true).unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::Sequence(SequenceError {
            operation: "do_step",
            state: Instantiated,
            ..
        })
    ));
    assert_eq!(fake.calls(), ["instantiate"]);
}

#[test]
fn model_exchange_enters_event_mode_after_initialization() {
    let (mut instance, _) = initialized(InterfaceKind::ModelExchange);
    assert_eq!(instance.state(), EventMode);

    assert!(instance.do_step(0.0, 0.1, true).is_err());
    instance.new_discrete_states().unwrap();
    instance.enter_continuous_time_mode().unwrap();
    assert_eq!(instance.state(), ContinuousTimeMode);

    assert_eq!(instance.get_continuous_states().unwrap(), vec![1.0, 1.0]);
    assert_eq!(instance.get_event_indicators().unwrap(), vec![0.5]);
    instance.set_time(0.25).unwrap();
    assert_eq!(instance.last_time(), Some(0.25));
}

#[test]
fn continuous_state_length_is_checked() {
    let (mut instance, fake) = initialized(InterfaceKind::ModelExchange);
    instance.enter_continuous_time_mode().unwrap();

    let err = instance.set_continuous_states(&[1.0]).unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::LengthMismatch {
            expected: 2,
            actual: 1,
            ..
        }
    ));
    assert!(!fake.calls().contains(&"set_continuous_states"));
}

#[test]
fn sequence_is_checked_before_state_length() {
    let (mut instance, fake) = initialized(InterfaceKind::ModelExchange);
    assert_eq!(instance.state(), EventMode);

    let err = instance.set_continuous_states(&[1.0]).unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::Sequence(SequenceError {
            operation: "set_continuous_states",
            state: EventMode,
            ..
        })
    ));
    assert!(!fake.calls().contains(&"set_continuous_states"));
}

#[test]
fn error_status_keeps_prior_state_and_captures_diagnostic() {
    let (mut instance, fake) = instance(InterfaceKind::CoSimulation);
    fake.script("enter_initialization_mode", Status::Error);

    let err = instance.enter_initialization_mode().unwrap_err();
    let LifecycleError::Call(call) = err else {
        panic!("expected a call error, got {err:?}");
    };
    assert_eq!(call.status, Status::Error);
    assert_eq!(
        call.diagnostic.as_deref(),
        Some("[logStatusError] enter_initialization_mode failed")
    );
    assert_eq!(instance.state(), Instantiated);
}

#[test]
fn fatal_status_only_allows_free() {
    let (mut instance, fake) = initialized(InterfaceKind::CoSimulation);
    fake.script("do_step", Status::Fatal);

    let err = instance.do_step(0.0, 0.1, true).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(instance.state(), Fatal);

    assert!(matches!(
        instance.terminate(),
        Err(LifecycleError::Sequence(_))
    ));
    assert!(matches!(instance.reset(), Err(LifecycleError::Sequence(_))));
    instance.free_instance().unwrap();
    assert_eq!(instance.state(), Freed);
}

#[test]
fn discard_is_returned_from_do_step_but_rejected_elsewhere() {
    let (mut instance, fake) = initialized(InterfaceKind::CoSimulation);
    fake.script("do_step", Status::Discard);
    fake.script("terminate", Status::Discard);

    assert_eq!(instance.do_step(0.0, 0.1, true).unwrap(), Status::Discard);
    assert_eq!(instance.last_time(), Some(0.0));
    assert!(matches!(instance.terminate(), Err(LifecycleError::Call(_))));
    assert_eq!(instance.state(), StepMode);
}

#[test]
fn reset_returns_to_instantiated() {
    let (mut instance, _) = initialized(InterfaceKind::CoSimulation);
    instance.reset().unwrap();
    assert_eq!(instance.state(), Instantiated);
    assert_eq!(instance.last_time(), None);
    instance.enter_initialization_mode().unwrap();
}

#[test]
fn fmu_state_calls_are_allowed_in_any_live_state() {
    let (mut instance, fake) = initialized(InterfaceKind::CoSimulation);
    let id = instance.get_fmu_state(None).unwrap();
    instance.set_fmu_state(id).unwrap();
    instance.free_fmu_state(id).unwrap();
    assert!(fake.calls().ends_with(&["get_fmu_state", "set_fmu_state", "free_fmu_state"]));
}

#[test]
fn drop_frees_exactly_once_without_terminating() {
    let (instance, fake) = initialized(InterfaceKind::CoSimulation);
    drop(instance);
    let calls = fake.calls();
    assert_eq!(calls.iter().filter(|c| **c == "free_instance").count(), 1);
    assert!(!calls.contains(&"terminate"));

    let (mut instance, fake) = initialized(InterfaceKind::CoSimulation);
    instance.free_instance().unwrap();
    drop(instance);
    assert_eq!(
        fake.calls().iter().filter(|c| **c == "free_instance").count(),
        1
    );
}

#[test]
fn requested_interface_must_be_described() {
    let mut description = (*testing::description()).clone();
    description.model_exchange = None;

    let err = Instance::instantiate(
        Box::new(FakeCalls::default()),
        Arc::new(description),
        InstanceOptions::new("cs-only").kind(InterfaceKind::ModelExchange),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::UnsupportedInterface {
            kind: InterfaceKind::ModelExchange
        }
    ));
}
