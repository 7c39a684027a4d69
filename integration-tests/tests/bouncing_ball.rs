use std::sync::Arc;

use approx::{assert_abs_diff_eq, assert_relative_eq};
use integration_tests::test_components::ball::{BouncingBall, GRAVITY, REST_SPEED, RESTITUTION};
use tandem_core::{Crossing, Direction, EventKind, InstanceOptions, Row};
use tandem_simulate::{Completion, Outcome, SimulationConfig, SolverChoice, simulate};

fn run(solver: SolverChoice, stop_time: f64) -> Outcome {
    let config = SimulationConfig {
        stop_time,
        step_size: 0.01,
        solver,
        outputs: vec!["h".into(), "v".into(), "bounces".into()],
        timeout_secs: Some(30.0),
        ..SimulationConfig::default()
    };
    simulate(
        Box::new(BouncingBall::default()),
        Arc::new(BouncingBall::description()),
        InstanceOptions::new("ball"),
        &config,
        None,
        (),
    )
    .unwrap()
}

/// Impact times of a ball dropped from one meter.
fn impacts(count: usize) -> Vec<f64> {
    let mut time = (2.0 / GRAVITY).sqrt();
    let mut speed = GRAVITY * time;
    let mut times = vec![time];
    while times.len() < count {
        speed *= RESTITUTION;
        time += 2.0 * speed / GRAVITY;
        times.push(time);
    }
    times
}

/// Highest recorded height before the first event, between each pair of
/// events, and after the last one.
fn peaks(outcome: &Outcome) -> Vec<f64> {
    let mut bounds: Vec<f64> = outcome.events.iter().map(|event| event.time).collect();
    bounds.push(f64::INFINITY);

    let mut lower = f64::NEG_INFINITY;
    bounds
        .into_iter()
        .map(|upper| {
            let peak = outcome
                .result
                .rows()
                .iter()
                .filter(|row| row.time > lower && row.time < upper)
                .map(|row| row.values[0])
                .fold(f64::NEG_INFINITY, f64::max);
            lower = upper;
            peak
        })
        .collect()
}

/// Pairs of rows sharing a time, which bracket an event.
#[allow(clippy::float_cmp)]
fn brackets(outcome: &Outcome) -> Vec<(&Row, &Row)> {
    outcome
        .result
        .rows()
        .windows(2)
        .filter(|w| w[0].time == w[1].time)
        .map(|w| (&w[0], &w[1]))
        .collect()
}

#[test]
fn adaptive_solver_brackets_every_bounce_until_rest() {
    let outcome = run(SolverChoice::default(), 3.0);

    assert_eq!(outcome.status, Completion::Complete);
    assert_relative_eq!(outcome.final_time, 3.0);
    assert_eq!(outcome.events.len(), 11);

    let expected = [0.451_524, 1.083_657, 1.526_150, 1.835_895];
    for (event, expected) in outcome.events.iter().zip(expected) {
        assert_abs_diff_eq!(event.time, expected, epsilon = 1e-5);
    }
    for (event, expected) in outcome.events.iter().zip(impacts(11)) {
        assert_abs_diff_eq!(event.time, expected, epsilon = 1e-6);
        assert_eq!(
            event.kind,
            EventKind::State {
                roots: vec![Crossing {
                    index: 0,
                    direction: Direction::Falling,
                }],
            }
        );
    }

    // 301 grid rows plus a before and after row per bounce.
    assert_eq!(outcome.result.len(), 323);
    let brackets = brackets(&outcome);
    assert_eq!(brackets.len(), 11);

    let (before, after) = brackets[0];
    let impact_speed = (2.0 * GRAVITY).sqrt();
    assert_abs_diff_eq!(before.values[0], 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(before.values[1], -impact_speed, epsilon = 1e-6);
    assert_abs_diff_eq!(after.values[0], 0.0);
    assert_abs_diff_eq!(after.values[1], RESTITUTION * impact_speed, epsilon = 1e-6);

    for (i, (before, after)) in brackets.iter().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let count = i as f64;
        assert_abs_diff_eq!(before.values[2], count);
        assert_abs_diff_eq!(after.values[2], count + 1.0);
        assert!(before.values[1] < 0.0);
        if i + 1 < brackets.len() {
            assert!(after.values[1] > REST_SPEED);
        } else {
            assert_abs_diff_eq!(after.values[1], 0.0);
        }
    }

    let peaks = peaks(&outcome);
    assert_eq!(peaks.len(), 12);
    assert_abs_diff_eq!(peaks[0], 1.0);
    assert!(
        peaks.windows(2).all(|w| w[0] > w[1]),
        "peak heights {peaks:?} do not decrease"
    );

    let times: Vec<f64> = outcome.result.times().collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn ball_never_falls_through_the_floor() {
    let outcome = run(SolverChoice::default(), 3.0);

    for value in outcome.result.column("h").unwrap() {
        assert!(value > -1e-9, "height {value} below the floor");
    }
}

#[test]
fn fixed_step_solver_finds_the_first_bounce() {
    let outcome = run(SolverChoice::Euler { step: Some(1e-3) }, 1.0);

    assert_eq!(outcome.status, Completion::Complete);
    assert_eq!(outcome.events.len(), 1);
    assert_abs_diff_eq!(outcome.events[0].time, impacts(1)[0], epsilon = 1e-2);

    let (before, after) = brackets(&outcome)[0];
    assert!(before.values[1] < -4.3);
    assert_abs_diff_eq!(after.values[1], -RESTITUTION * before.values[1], epsilon = 1e-9);
    assert_abs_diff_eq!(after.values[2], 1.0);
}
