use std::time::{Duration, Instant};

use approx::{assert_abs_diff_eq, assert_relative_eq};
use tandem_core::{Crossing, Direction, EventKind, ValueRef};
use tandem_solvers::Euler;

use crate::{
    config::RetryPolicy,
    sampler::Sampler,
    testing::{Ramp, Sawtooth, initialized},
};

use super::*;

fn read_y(instance: &mut Instance) -> f64 {
    instance.variables().get_real(&[ValueRef(0)]).unwrap()[0]
}

#[test]
fn co_simulation_steps_to_each_target() {
    let ramp = Ramp::new();
    let mut instance = initialized(ramp.clone(), Ramp::description(false), 0.0);
    let mut driver = CoSimulation::new(RetryPolicy::default());
    driver.start(&mut instance, 0.0).unwrap();

    for i in 1..=10 {
        let t_end = f64::from(i) * 0.1;
        let progress = driver.step(&mut instance, t_end, None).unwrap();
        assert_relative_eq!(progress.time, t_end);
        assert!(!progress.terminated);
    }

    assert_relative_eq!(driver.time(), 1.0);
    assert_relative_eq!(read_y(&mut instance), 1.0, epsilon = 1e-12);
    assert_eq!(ramp.0.lock().steps, 10);
    assert!(!ramp.calls().contains(&"get_fmu_state"));
}

#[test]
fn discarded_step_is_retried_with_smaller_steps() {
    let ramp = Ramp::new();
    ramp.0.lock().max_step = Some(0.03);
    let mut instance = initialized(ramp.clone(), Ramp::description(true), 0.0);
    let mut driver = CoSimulation::new(RetryPolicy::default());
    driver.start(&mut instance, 0.0).unwrap();

    let progress = driver.step(&mut instance, 0.1, None).unwrap();

    assert_relative_eq!(progress.time, 0.1);
    assert_eq!(ramp.0.lock().steps, 4);
    assert_relative_eq!(read_y(&mut instance), 0.1, epsilon = 1e-12);
    let restores = ramp
        .calls()
        .iter()
        .filter(|&&call| call == "set_fmu_state")
        .count();
    assert_eq!(restores, 2);
}

#[test]
fn retries_stop_at_the_policy_limit() {
    let ramp = Ramp::new();
    ramp.0.lock().max_step = Some(0.001);
    let mut instance = initialized(ramp, Ramp::description(true), 0.0);
    let policy = RetryPolicy {
        max_retries: 2,
        ..RetryPolicy::default()
    };
    let mut driver = CoSimulation::new(policy);
    driver.start(&mut instance, 0.0).unwrap();

    let err = driver.step(&mut instance, 0.1, None).unwrap_err();
    assert!(matches!(err, StepError::RetriesExhausted { retries: 2, .. }));
}

#[test]
fn discard_without_rollback_is_an_error() {
    let ramp = Ramp::new();
    ramp.0.lock().max_step = Some(0.03);
    let mut instance = initialized(ramp, Ramp::description(false), 0.0);
    let mut driver = CoSimulation::new(RetryPolicy::default());
    driver.start(&mut instance, 0.0).unwrap();

    let err = driver.step(&mut instance, 0.1, None).unwrap_err();
    let StepError::Discarded { time, step } = err else {
        panic!("expected a discarded step");
    };
    assert_relative_eq!(time, 0.0);
    assert_relative_eq!(step, 0.1);
}

#[test]
fn terminated_component_ends_at_last_successful_time() {
    let ramp = Ramp::new();
    ramp.0.lock().terminate_at = Some(0.35);
    let mut instance = initialized(ramp, Ramp::description(true), 0.0);
    let mut driver = CoSimulation::new(RetryPolicy::default());
    driver.start(&mut instance, 0.0).unwrap();

    for t_end in [0.1, 0.2, 0.3] {
        assert!(!driver.step(&mut instance, t_end, None).unwrap().terminated);
    }
    let progress = driver.step(&mut instance, 0.4, None).unwrap();

    assert!(progress.terminated);
    assert_relative_eq!(progress.time, 0.35);
    assert_relative_eq!(driver.time(), 0.35);
}

#[test]
fn sawtooth_resets_at_each_root() {
    let sawtooth = Sawtooth::default();
    let description = Sawtooth::description(false);
    let sampler = Sampler::outputs(&description);
    let mut instance = initialized(sawtooth.clone(), description.clone(), 0.0);
    let euler = Euler::new(0.01).unwrap();
    let mut driver = ModelExchange::new(&description, Box::new(euler));
    driver.start(&mut instance, 0.0).unwrap();

    let progress = driver.step(&mut instance, 1.2, Some(&sampler)).unwrap();

    assert_relative_eq!(progress.time, 1.2);
    assert_eq!(progress.events.len(), 2);
    assert_abs_diff_eq!(progress.events[0].time, 0.5, epsilon = 1e-9);
    assert_abs_diff_eq!(progress.events[1].time, 1.0, epsilon = 1e-9);
    let falling = EventKind::State {
        roots: vec![Crossing {
            index: 0,
            direction: Direction::Falling,
        }],
    };
    assert_eq!(progress.events[0].kind, falling);

    assert_eq!(progress.brackets.len(), 2);
    let (before, after) = &progress.brackets[0];
    assert_relative_eq!(before.time, after.time);
    assert_abs_diff_eq!(before.values[0], 0.5, epsilon = 1e-9);
    assert_relative_eq!(before.values[1], 0.0);
    assert_relative_eq!(after.values[0], 0.0);
    assert_relative_eq!(after.values[1], 1.0);

    assert_eq!(sawtooth.0.lock().resets, 2);
    assert_abs_diff_eq!(sawtooth.0.lock().x, 0.2, epsilon = 1e-9);
}

#[test]
fn events_are_not_bracketed_without_a_sampler() {
    let description = Sawtooth::description(false);
    let mut instance = initialized(Sawtooth::default(), description.clone(), 0.0);
    let mut driver = ModelExchange::new(&description, Box::new(Euler::new(0.01).unwrap()));
    driver.start(&mut instance, 0.0).unwrap();

    let progress = driver.step(&mut instance, 0.75, None).unwrap();

    assert_eq!(progress.events.len(), 1);
    assert!(progress.brackets.is_empty());
}

#[test]
fn time_events_fire_on_schedule_without_states() {
    let sawtooth = Sawtooth::with_tick(0.25);
    let description = Sawtooth::description(true);
    let mut instance = initialized(sawtooth.clone(), description.clone(), 0.0);
    let mut driver = ModelExchange::new(&description, Box::new(Euler::new(0.01).unwrap()));
    driver.start(&mut instance, 0.0).unwrap();
    assert_eq!(driver.next_event_time(), Some(0.25));

    let progress = driver.step(&mut instance, 1.0, None).unwrap();

    let times: Vec<f64> = progress.events.iter().map(|e| e.time).collect();
    assert_eq!(times.len(), 4);
    for (time, expected) in times.iter().zip([0.25, 0.5, 0.75, 1.0]) {
        assert_abs_diff_eq!(*time, expected, epsilon = 1e-12);
    }
    assert!(progress.events.iter().all(|e| e.kind == EventKind::Time));
    assert_eq!(sawtooth.0.lock().ticks, 4);
    assert!(!sawtooth.calls().contains(&"get_continuous_states"));
}

#[test]
fn driver_for_follows_the_instance_interface() {
    let config = SimulationConfig::default();

    let instance = initialized(Ramp::new(), Ramp::description(false), 0.0);
    assert!(driver_for(&instance, &config).is_ok());

    let instance = initialized(Sawtooth::default(), Sawtooth::description(false), 0.0);
    assert!(driver_for(&instance, &config).is_ok());

    let config = SimulationConfig {
        solver: SolverChoice::Euler { step: Some(-1.0) },
        ..SimulationConfig::default()
    };
    assert!(matches!(
        driver_for(&instance, &config),
        Err(StepError::Integrator(_))
    ));
}

#[test]
fn passed_deadline_stops_a_model_exchange_step() {
    let description = Sawtooth::description(false);
    let mut instance = initialized(Sawtooth::default(), description.clone(), 0.0);
    let mut driver = ModelExchange::new(&description, Box::new(Euler::new(0.01).unwrap()));
    driver.start(&mut instance, 0.0).unwrap();
    assert!(driver.step(&mut instance, 0.1, None).is_ok());

    driver.set_deadline(Some(Instant::now()));
    let err = driver.step(&mut instance, 0.2, None).unwrap_err();

    let StepError::DeadlinePassed { time } = err else {
        panic!("expected the deadline to pass");
    };
    assert_abs_diff_eq!(time, 0.1, epsilon = 1e-12);
}

#[test]
fn future_deadline_leaves_steps_alone() {
    let description = Sawtooth::description(false);
    let mut instance = initialized(Sawtooth::default(), description.clone(), 0.0);
    let mut driver = ModelExchange::new(&description, Box::new(Euler::new(0.01).unwrap()));
    driver.set_deadline(Some(Instant::now() + Duration::from_secs(3600)));
    driver.start(&mut instance, 0.0).unwrap();

    let progress = driver.step(&mut instance, 0.75, None).unwrap();
    assert_relative_eq!(progress.time, 0.75);
}

#[test]
fn event_storm_is_cut_off_within_one_step() {
    let description = Sawtooth::description(true);
    let mut instance = initialized(Sawtooth::with_tick(1e-6), description.clone(), 0.0);
    let mut driver = ModelExchange::new(&description, Box::new(Euler::new(0.01).unwrap()))
        .with_max_events_per_step(50);
    driver.start(&mut instance, 0.0).unwrap();

    let err = driver.step(&mut instance, 1.0, None).unwrap_err();

    assert!(matches!(err, StepError::TooManyEvents { events: 51, .. }));
}
