//! Cancellable reset-on-activity timer
//!
//! The main loop polls [`Debouncer::fire_if_due`] each tick, the same way the
//! editor polls its hover and auto-revert timers. Every call to
//! [`Debouncer::arm`] pushes the deadline out by the full delay, so the timer
//! fires once after the last burst of activity.

use super::time_source::SharedTimeSource;
use std::time::{Duration, Instant};

pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
    time_source: SharedTimeSource,
}

impl Debouncer {
    pub fn new(delay: Duration, time_source: SharedTimeSource) -> Self {
        Self {
            delay,
            deadline: None,
            time_source,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// (Re)start the countdown from now
    pub fn arm(&mut self) {
        self.deadline = Some(self.time_source.now() + self.delay);
    }

    /// Drop the pending deadline without firing.
    /// Returns true if the timer was armed.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Time left before the timer fires, if armed
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(self.time_source.now()))
    }

    /// Returns true exactly once per arming, when the deadline has passed
    pub fn fire_if_due(&mut self) -> bool {
        match self.deadline {
            Some(deadline) if self.time_source.now() >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
