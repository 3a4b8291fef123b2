//! # Link lifecycle: connection states and the reconnect schedule.
//!
//! The serial connection is a small state machine owned by the writer task
//! and published through a `watch` channel for `query_status`:
//!
//! ```text
//! Closed ──open()──► Opening ──► Open ──spontaneous failure──► Reconnecting
//!                       │                                          │
//!                       └── startup failure aborts                 ├─ reopen ok ──► Open (attempts reset)
//!                                                                  └─ attempts exhausted ──► Closed
//! ```
//!
//! The reconnect schedule is deliberately a fixed exponential; no caller
//! drives it. First delay 2 s, doubling per attempt, at most 10 attempts.

use std::time::Duration;

use serde::Serialize;

/// Connection state of the serial link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// No connection; enqueues are rejected.
    Closed,
    /// Initial open in progress.
    Opening,
    /// Connected; jobs dispatch.
    Open,
    /// Graceful shutdown in progress.
    Closing,
    /// Spontaneous failure; the reconnect schedule is running.
    Reconnecting,
}

impl LinkState {
    /// Short stable label for logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            LinkState::Closed => "closed",
            LinkState::Opening => "opening",
            LinkState::Open => "open",
            LinkState::Closing => "closing",
            LinkState::Reconnecting => "reconnecting",
        }
    }
}

/// Reconnect schedule: fixed exponential growth, bounded attempts.
#[derive(Clone, Copy, Debug)]
pub struct ReconnectPolicy {
    /// Delay before the first reopen attempt.
    pub first: Duration,
    /// Multiplicative growth factor per attempt.
    pub factor: f64,
    /// Cap on any single delay.
    pub max: Duration,
    /// Attempts before the link is abandoned as [`LinkState::Closed`].
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    /// Returns the documented schedule:
    /// `first = 2s`, `factor = 2.0`, `max = 60s`, `max_attempts = 10`.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(2),
            factor: 2.0,
            max: Duration::from_secs(60),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Computes the next delay from the previous one.
    ///
    /// `None` yields `first`; otherwise the previous delay grows by `factor`
    /// and caps at `max`.
    pub fn next(&self, prev: Option<Duration>) -> Duration {
        let unclamped = match prev {
            None => self.first,
            Some(d) => {
                let grown = d.as_secs_f64() * self.factor;
                if !grown.is_finite() {
                    self.max
                } else {
                    d.mul_f64(self.factor)
                }
            }
        };
        unclamped.min(self.max)
    }
}
