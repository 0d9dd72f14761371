//! External event stream and ad-hoc update scheduling.
//!
//! The world consumes an already-parsed, time-ordered stream of external
//! events (message creations, emergency periods). Producing that stream is
//! someone else's job; here it is only validated once at load time and then
//! drained in time order as the simulation advances.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use opportune_core::message::{HostId, Recipients};

/// Errors in the external event stream, fatal before the run starts.
#[derive(Debug, Error, PartialEq)]
pub enum EventError {
    /// An event is scheduled before the one preceding it in the stream.
    #[error("event at t={time} arrives out of order (previous event at t={previous})")]
    OutOfOrder { time: f64, previous: f64 },

    /// An emergency period ends before it starts.
    #[error("emergency {id} ends at t={end} before its start at t={start}")]
    EmergencyEndsBeforeStart { id: u32, start: f64, end: f64 },

    /// A message creation event with a non-positive size.
    #[error("message {id} has size 0")]
    EmptyMessage { id: String },
}

/// A scheduled message creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub time: f64,
    pub id: String,
    pub from: HostId,
    pub recipients: Recipients,
    pub size: u64,
    #[serde(default)]
    pub response_size: u64,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub ttl: Option<f64>,
}

/// One entry of the external event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExternalEvent {
    CreateMessage(MessageEvent),
    /// An emergency period; expands into a start and an end occurrence.
    Emergency { id: u32, start: f64, end: f64 },
}

impl ExternalEvent {
    /// The time this event first takes effect.
    pub fn time(&self) -> f64 {
        match self {
            ExternalEvent::CreateMessage(event) => event.time,
            ExternalEvent::Emergency { start, .. } => *start,
        }
    }
}

/// A single timed occurrence after expanding emergency periods.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOccurrence {
    CreateMessage(MessageEvent),
    EmergencyStart { id: u32 },
    EmergencyEnd { id: u32 },
}

/// The validated, time-ordered event stream of one run.
#[derive(Debug, Default)]
pub struct EventQueue {
    occurrences: VecDeque<(f64, EventOccurrence)>,
}

impl EventQueue {
    /// Validate and load a stream of external events.
    ///
    /// The input must already be ordered by effect time; emergency periods
    /// must not end before they start.
    pub fn load(events: Vec<ExternalEvent>) -> Result<Self, EventError> {
        let mut previous = f64::NEG_INFINITY;
        let mut occurrences = Vec::new();
        for event in events {
            let time = event.time();
            if time < previous {
                return Err(EventError::OutOfOrder { time, previous });
            }
            previous = time;
            match event {
                ExternalEvent::CreateMessage(message) => {
                    if message.size == 0 {
                        return Err(EventError::EmptyMessage { id: message.id });
                    }
                    occurrences.push((message.time, EventOccurrence::CreateMessage(message)));
                }
                ExternalEvent::Emergency { id, start, end } => {
                    if end < start {
                        return Err(EventError::EmergencyEndsBeforeStart { id, start, end });
                    }
                    occurrences.push((start, EventOccurrence::EmergencyStart { id }));
                    occurrences.push((end, EventOccurrence::EmergencyEnd { id }));
                }
            }
        }
        // emergency ends interleave with later starts
        occurrences.sort_by(|(a, _), (b, _)| a.total_cmp(b));
        Ok(Self { occurrences: occurrences.into() })
    }

    /// Time of the next occurrence, if any.
    pub fn next_time(&self) -> Option<f64> {
        self.occurrences.front().map(|(time, _)| *time)
    }

    /// Drain every occurrence due at or before `now`, in time order.
    pub fn drain_due(&mut self, now: f64) -> Vec<(f64, EventOccurrence)> {
        let mut due = Vec::new();
        while let Some((time, _)) = self.occurrences.front() {
            if *time > now {
                break;
            }
            if let Some(entry) = self.occurrences.pop_front() {
                due.push(entry);
            }
        }
        due
    }

    pub fn is_empty(&self) -> bool {
        self.occurrences.is_empty()
    }
}

/// One-shot update requests finer than the regular tick.
///
/// Event-processing code queues a time here when it needs a topology or
/// router refresh sooner than the next scheduled tick; the world then ticks
/// at that time too, without changing the regular interval.
#[derive(Debug, Default)]
pub struct ScheduledUpdatesQueue {
    times: Vec<f64>,
}

impl ScheduledUpdatesQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an extra tick at `time`. Duplicate requests collapse.
    pub fn request(&mut self, time: f64) {
        match self.times.binary_search_by(|t| t.total_cmp(&time)) {
            Ok(_) => {}
            Err(index) => self.times.insert(index, time),
        }
    }

    /// The earliest pending request, if any.
    pub fn next_time(&self) -> Option<f64> {
        self.times.first().copied()
    }

    /// Remove every request due at or before `now`.
    pub fn pop_due(&mut self, now: f64) {
        self.times.retain(|time| *time > now);
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}
