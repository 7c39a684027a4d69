use approx::{assert_abs_diff_eq, assert_relative_eq};
use tandem_core::Value;

use crate::{
    config::SolverChoice,
    driver::StepError,
    testing::{Ramp, Sawtooth},
};

use super::*;

fn ramp_config(step: f64) -> SimulationConfig {
    SimulationConfig {
        stop_time: 1.0,
        step_size: step,
        outputs: vec!["y".into(), "steps".into()],
        ..SimulationConfig::default()
    }
}

fn run_ramp(
    ramp: &Ramp,
    rollback: bool,
    config: &SimulationConfig,
    inputs: Option<&InputTable>,
) -> Result<Outcome, SimulationError> {
    simulate(
        Box::new(ramp.clone()),
        Arc::new(Ramp::description(rollback)),
        InstanceOptions::new("ramp"),
        config,
        inputs,
        (),
    )
}

fn ends_with_teardown(calls: &[&str]) -> bool {
    calls.ends_with(&["terminate", "free_instance"])
}

#[test]
fn co_simulation_records_one_row_per_step() {
    let ramp = Ramp::new();
    let outcome = run_ramp(&ramp, false, &ramp_config(0.1), None).unwrap();

    assert_eq!(outcome.status, Completion::Complete);
    assert_relative_eq!(outcome.final_time, 1.0);
    assert_eq!(outcome.result.len(), 11);
    assert_eq!(outcome.result.columns(), ["y", "steps"]);

    for (i, row) in outcome.result.rows().iter().enumerate() {
        assert_abs_diff_eq!(row.time, i as f64 * 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(row.values[0], row.time, epsilon = 1e-12);
        assert_relative_eq!(row.values[1], i as f64);
    }
    assert!(ends_with_teardown(&ramp.calls()));
}

#[test]
fn finer_output_grid_interpolates_between_steps() {
    let ramp = Ramp::new();
    let config = SimulationConfig {
        output_interval: Some(0.05),
        ..ramp_config(0.1)
    };
    let outcome = run_ramp(&ramp, false, &config, None).unwrap();

    assert_eq!(outcome.result.len(), 21);
    let row = &outcome.result.rows()[3];
    assert_abs_diff_eq!(row.time, 0.15, epsilon = 1e-12);
    assert_abs_diff_eq!(row.values[0], 0.15, epsilon = 1e-12);
    // The step counter is held, not interpolated.
    assert_relative_eq!(row.values[1], 1.0);
    assert_relative_eq!(outcome.result.last().unwrap().time, 1.0);
}

#[test]
fn start_values_apply_before_initialization() {
    let ramp = Ramp::new();
    let mut config = ramp_config(0.25);
    config.start_values.insert("gain".into(), Value::Real(2.0));
    let outcome = run_ramp(&ramp, false, &config, None).unwrap();

    let y = outcome.result.column("y").unwrap();
    assert_relative_eq!(*y.last().unwrap(), 2.0, epsilon = 1e-12);
}

#[test]
fn table_inputs_are_applied_before_each_step() {
    let ramp = Ramp::new();
    let inputs = InputTable::new(vec!["u".into()])
        .with_sample(0.0, vec![0.0])
        .unwrap()
        .with_sample(1.0, vec![1.0])
        .unwrap();
    let outcome = run_ramp(&ramp, false, &ramp_config(0.1), Some(&inputs)).unwrap();

    // The last step starts at 0.9 and sees u = 0.9.
    let y = outcome.result.column("y").unwrap();
    assert_abs_diff_eq!(*y.last().unwrap(), 1.9, epsilon = 1e-12);
}

#[test]
fn observer_can_stop_the_run() {
    let ramp = Ramp::new();
    let mut rows = 0;
    let observer = |event: &RunEvent| {
        if matches!(event, RunEvent::Row(_)) {
            rows += 1;
        }
        (rows == 3).then_some(Action::StopEarly)
    };

    let outcome = simulate(
        Box::new(ramp.clone()),
        Arc::new(Ramp::description(false)),
        InstanceOptions::new("ramp"),
        &ramp_config(0.1),
        None,
        observer,
    )
    .unwrap();

    assert_eq!(outcome.status, Completion::StoppedByObserver);
    assert_eq!(outcome.result.len(), 3);
    assert_abs_diff_eq!(outcome.final_time, 0.2, epsilon = 1e-12);
    assert!(ends_with_teardown(&ramp.calls()));
}

#[test]
fn component_termination_ends_the_run_normally() {
    let ramp = Ramp::new();
    ramp.0.lock().terminate_at = Some(0.35);
    let outcome = run_ramp(&ramp, true, &ramp_config(0.1), None).unwrap();

    assert_eq!(outcome.status, Completion::Terminated);
    assert_relative_eq!(outcome.final_time, 0.35);
    let times: Vec<f64> = outcome.result.times().collect();
    assert_eq!(times.len(), 5);
    assert_relative_eq!(times[4], 0.35);
    assert!(ends_with_teardown(&ramp.calls()));
}

#[test]
fn failed_step_reports_instance_and_tears_down() {
    let ramp = Ramp::new();
    ramp.0.lock().max_step = Some(0.05);
    let err = run_ramp(&ramp, false, &ramp_config(0.1), None).unwrap_err();

    assert_eq!(err.instance, "ramp");
    assert_eq!(err.last_time, Some(0.0));
    assert!(matches!(
        err.source,
        RunError::Step(StepError::Discarded { .. })
    ));
    assert!(ends_with_teardown(&ramp.calls()));
}

#[test]
fn invalid_config_fails_before_instantiation() {
    let ramp = Ramp::new();
    let config = SimulationConfig {
        stop_time: -1.0,
        ..SimulationConfig::default()
    };
    let err = run_ramp(&ramp, false, &config, None).unwrap_err();

    assert!(matches!(err.source, RunError::Config(_)));
    assert_eq!(err.last_time, None);
    assert!(ramp.calls().is_empty());
}

#[test]
fn timeout_tears_down_every_instance() {
    let ramp = Ramp::new();
    let config = SimulationConfig {
        timeout_secs: Some(1e-9),
        ..ramp_config(0.1)
    };
    let err = run_ramp(&ramp, false, &config, None).unwrap_err();

    assert!(matches!(err.source, RunError::Timeout { .. }));
    assert!(ends_with_teardown(&ramp.calls()));
}

#[test]
fn timeout_interrupts_a_long_integrator_step() {
    let sawtooth = Sawtooth::default();
    let config = SimulationConfig {
        stop_time: 1.2,
        output_interval: Some(1.2),
        solver: SolverChoice::Euler { step: Some(1e-8) },
        timeout_secs: Some(0.2),
        ..SimulationConfig::default()
    };

    let err = simulate(
        Box::new(sawtooth.clone()),
        Arc::new(Sawtooth::description(false)),
        InstanceOptions::new("saw"),
        &config,
        None,
        (),
    )
    .unwrap_err();

    let RunError::Timeout { limit, time } = err.source else {
        panic!("expected a timeout, got {:?}", err.source);
    };
    assert_eq!(limit, Duration::from_secs_f64(0.2));
    assert!(time > 0.0 && time < 1.2);
    assert!(ends_with_teardown(&sawtooth.calls()));
}

fn sawtooth_config(record_events: bool) -> SimulationConfig {
    SimulationConfig {
        stop_time: 1.2,
        step_size: 0.01,
        output_interval: Some(0.15),
        solver: SolverChoice::Euler { step: None },
        record_events,
        ..SimulationConfig::default()
    }
}

#[test]
fn model_exchange_brackets_each_event() {
    let sawtooth = Sawtooth::default();
    let mut seen = Vec::new();
    let observer = |event: &RunEvent| -> Option<Action> {
        if let RunEvent::Event(record) = event {
            seen.push(record.time);
        }
        None
    };

    let outcome = simulate(
        Box::new(sawtooth.clone()),
        Arc::new(Sawtooth::description(false)),
        InstanceOptions::new("saw"),
        &sawtooth_config(true),
        None,
        observer,
    )
    .unwrap();

    assert_eq!(outcome.status, Completion::Complete);
    assert_eq!(outcome.events.len(), 2);
    assert_eq!(seen.len(), 2);

    // Nine grid rows plus two rows per event.
    let rows = outcome.result.rows();
    assert_eq!(rows.len(), 13);
    #[allow(clippy::float_cmp)]
    let pairs: Vec<(&Row, &Row)> = rows
        .windows(2)
        .filter(|w| w[0].time == w[1].time)
        .map(|w| (&w[0], &w[1]))
        .collect();
    assert_eq!(pairs.len(), 2);
    for ((before, after), expected) in pairs.iter().zip([0.5, 1.0]) {
        assert_abs_diff_eq!(before.time, expected, epsilon = 1e-9);
        assert_abs_diff_eq!(before.values[0], 0.5, epsilon = 1e-9);
        assert_relative_eq!(after.values[0], 0.0);
        assert_relative_eq!(after.values[1], before.values[1] + 1.0);
    }

    let times: Vec<f64> = outcome.result.times().collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
    assert!(ends_with_teardown(&sawtooth.calls()));
}

#[test]
fn unrecorded_events_still_bracket_rows() {
    let outcome = simulate(
        Box::new(Sawtooth::default()),
        Arc::new(Sawtooth::description(false)),
        InstanceOptions::new("saw"),
        &sawtooth_config(false),
        None,
        (),
    )
    .unwrap();

    assert!(outcome.events.is_empty());
    assert_eq!(outcome.result.len(), 13);
}

#[test]
fn teardown_skips_terminate_once_terminated() {
    let ramp = Ramp::new();
    let mut instance = crate::testing::initialized(ramp.clone(), Ramp::description(false), 0.0);
    instance.terminate().unwrap();

    teardown(&mut instance).unwrap();
    teardown(&mut instance).unwrap();

    let calls = ramp.calls();
    assert_eq!(calls.iter().filter(|&&c| c == "terminate").count(), 1);
    assert_eq!(calls.iter().filter(|&&c| c == "free_instance").count(), 1);
    assert_eq!(instance.state(), LifecycleState::Freed);
}
