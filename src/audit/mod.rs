//! # Audit: rolling command and session logs.
//!
//! The storage collaborator owns persistence; the core keeps bounded
//! in-memory buffers it can drain. Three artifacts:
//!
//! - [`CommandLog`] — one record per facade operation: timestamp, source,
//!   command label, target, success, optional error, execution time.
//! - [`SessionLog`] — login/logout events with the opaque agent id.
//! - [`WireAudit`] — a [`FrameObserver`] keeping the last emitted frames for
//!   diagnostics (raw bytes, source, simulated flag).
//!
//! Buffers are capacity-bounded ring buffers; `prune` additionally drops
//! records older than the configured retention.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::Serialize;

use crate::transport::{EmittedFrame, FrameObserver};

/// One audited facade operation.
#[derive(Debug, Clone, Serialize)]
pub struct CommandRecord {
    /// When the operation started.
    pub at: SystemTime,
    /// Producer label ("resolver", "session", ...).
    pub source: &'static str,
    /// Operation label ("light_entity", "off_all", ...).
    pub command: &'static str,
    /// Target description (entity id, "broadcast", ...).
    pub target: String,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error message when it did not.
    pub error: Option<String>,
    /// Wall time the operation took.
    pub elapsed: Duration,
}

/// Bounded rolling log of facade operations.
pub struct CommandLog {
    entries: Mutex<VecDeque<CommandRecord>>,
    capacity: usize,
}

impl CommandLog {
    /// Creates a log holding at most `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            capacity: capacity.max(1),
        }
    }

    /// Appends one record, evicting the oldest beyond capacity.
    pub fn record(&self, record: CommandRecord) {
        let mut entries = self.entries.lock().expect("command log lock");
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(record);
    }

    /// The most recent `n` records, newest last.
    pub fn recent(&self, n: usize) -> Vec<CommandRecord> {
        let entries = self.entries.lock().expect("command log lock");
        entries.iter().rev().take(n).rev().cloned().collect()
    }

    /// Drops records older than `retention`. Returns how many were dropped.
    pub fn prune(&self, retention: Duration) -> usize {
        let cutoff = SystemTime::now()
            .checked_sub(retention)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut entries = self.entries.lock().expect("command log lock");
        let before = entries.len();
        entries.retain(|r| r.at >= cutoff);
        before - entries.len()
    }

    /// Takes everything, leaving the log empty (storage drain).
    pub fn drain(&self) -> Vec<CommandRecord> {
        let mut entries = self.entries.lock().expect("command log lock");
        entries.drain(..).collect()
    }

    /// Current record count.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("command log lock").len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A login or logout event.
#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    /// When it happened.
    pub at: SystemTime,
    /// Opaque agent identifier.
    pub agent: String,
    /// True for login, false for logout.
    pub login: bool,
}

/// Bounded rolling log of session events.
pub struct SessionLog {
    entries: Mutex<VecDeque<SessionEvent>>,
    capacity: usize,
}

impl SessionLog {
    /// Creates a log holding at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            capacity: capacity.max(1),
        }
    }

    /// Records a login.
    pub fn login(&self, agent: &str) {
        self.push(agent, true);
    }

    /// Records a logout.
    pub fn logout(&self, agent: &str) {
        self.push(agent, false);
    }

    fn push(&self, agent: &str, login: bool) {
        let mut entries = self.entries.lock().expect("session log lock");
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(SessionEvent {
            at: SystemTime::now(),
            agent: agent.to_string(),
            login,
        });
    }

    /// The most recent `n` events, newest last.
    pub fn recent(&self, n: usize) -> Vec<SessionEvent> {
        let entries = self.entries.lock().expect("session log lock");
        entries.iter().rev().take(n).rev().cloned().collect()
    }

    /// Takes everything, leaving the log empty (storage drain).
    pub fn drain(&self) -> Vec<SessionEvent> {
        let mut entries = self.entries.lock().expect("session log lock");
        entries.drain(..).collect()
    }
}

/// One captured wire frame.
#[derive(Debug, Clone, Serialize)]
pub struct WireRecord {
    /// Transport sequence number.
    pub seq: u64,
    /// Emission time.
    pub at: SystemTime,
    /// Raw wire bytes, framing included.
    pub bytes: Vec<u8>,
    /// Producer label.
    pub source: &'static str,
    /// True when the simulated sink carried it.
    pub simulated: bool,
}

/// Frame observer keeping the last emitted frames for diagnostics.
pub struct WireAudit {
    entries: Mutex<VecDeque<WireRecord>>,
    capacity: usize,
}

impl WireAudit {
    /// Creates an audit ring of `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            capacity: capacity.max(1),
        }
    }

    /// The most recent `n` frames, newest last.
    pub fn recent(&self, n: usize) -> Vec<WireRecord> {
        let entries = self.entries.lock().expect("wire audit lock");
        entries.iter().rev().take(n).rev().cloned().collect()
    }
}

#[async_trait]
impl FrameObserver for WireAudit {
    async fn on_frame(&self, frame: &EmittedFrame) {
        let mut entries = self.entries.lock().expect("wire audit lock");
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(WireRecord {
            seq: frame.seq,
            at: frame.at,
            bytes: frame.bytes.clone(),
            source: frame.source.as_label(),
            simulated: frame.simulated,
        });
    }

    fn name(&self) -> &'static str {
        "wire-audit"
    }
}
