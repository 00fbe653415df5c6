//! A bounded ring buffer of observability records, trimmed from the front
//! with `VecDeque::pop_front` as new ones arrive. Writers are always the
//! owning endpoint; readers only ever get a cloned snapshot.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub const DEFAULT_CAPACITY: usize = 500;

/// Closed set of event kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    SynSent,
    SynAckReceived,
    AckSent,
    AckReceived,
    PacketSent,
    PacketDrop,
    Timeout,
    Retransmit,
    ChecksumError,
    FinSent,
    FinAckReceived,
    TransferComplete,
    Error,
    Warning,
}

#[derive(Clone, Debug)]
pub struct EventRecord {
    /// Time of the event relative to the log's own creation (or last
    /// `clear()`), so snapshots stay comparable without exposing a raw
    /// `Instant` (which has no meaningful absolute value) to observers.
    pub monotonic_timestamp: Duration,
    pub kind: EventKind,
    pub message: String,
}

pub struct EventLog {
    epoch: Instant,
    capacity: usize,
    records: VecDeque<EventRecord>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        EventLog {
            epoch: Instant::now(),
            capacity,
            records: VecDeque::with_capacity(capacity.min(64)),
        }
    }

    pub fn push(&mut self, kind: EventKind, message: impl Into<String>) {
        if self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(EventRecord {
            monotonic_timestamp: self.epoch.elapsed(),
            kind,
            message: message.into(),
        });
    }

    pub fn clear(&mut self) {
        self.epoch = Instant::now();
        self.records.clear();
    }

    /// The most recent `n` records, oldest first, as an owned snapshot —
    /// readers never see a live reference into the log.
    pub fn snapshot(&self, n: usize) -> Vec<EventRecord> {
        let skip = self.records.len().saturating_sub(n);
        self.records.iter().skip(skip).cloned().collect()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
