use serde::{Deserialize, Serialize};

/// Direction of an event-indicator sign change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Negative to non-negative.
    Rising,
    /// Non-negative to negative.
    Falling,
}

/// One event indicator that changed sign during a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crossing {
    pub index: usize,
    pub direction: Direction,
}

/// What caused an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// The component scheduled the event through `next_event_time`.
    Time,
    /// One or more event indicators changed sign.
    State { roots: Vec<Crossing> },
    /// The component requested event mode after an integrator step.
    Step,
}

/// A handled event, as recorded in the run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub time: f64,
    pub kind: EventKind,
}

impl EventRecord {
    #[must_use]
    pub fn new(time: f64, kind: EventKind) -> Self {
        Self { time, kind }
    }
}
