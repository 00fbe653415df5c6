//! Fragmentation, in-flight accounting, and the per-discipline ACK/retransmit
//! policy shared by Stop-and-Wait, Go-Back-N, and Selective Repeat.

use std::collections::{BTreeSet, VecDeque};
use std::time::{Duration, Instant};

use crate::error::ProtocolError;
use crate::packet::Packet;
use crate::seq::SeqNo;

/// Which ARQ discipline a `SendWindow` enforces. One struct parameterized by
/// this enum rather than three separate types: the fragmentation and
/// in-flight bookkeeping are identical across all three, only the ACK
/// interpretation and retransmission scope differ.
#[derive(Clone, Copy, Debug, PartialEq, Eq, derive_more::Display)]
pub enum Protocol {
    #[display(fmt = "stop-and-wait")]
    StopWait,
    #[display(fmt = "go-back-n")]
    GoBackN,
    #[display(fmt = "selective-repeat")]
    SelectiveRepeat,
}

impl Protocol {
    /// Stop-and-Wait is Go-Back-N with a window fixed at one segment.
    pub fn effective_window(self, configured: u32) -> u32 {
        match self {
            Protocol::StopWait => 1,
            Protocol::GoBackN | Protocol::SelectiveRepeat => configured,
        }
    }
}

/// A segment awaiting acknowledgment. `initial_tx` is set once, on first
/// transmission, and never touched again: RTT samples are only ever taken
/// against it (Karn's algorithm), while `last_tx` tracks the most recent
/// send for timeout scheduling.
#[derive(Clone, Debug)]
struct UnackedSegment {
    seq: SeqNo,
    packet: Packet,
    initial_tx: Option<Instant>,
    last_tx: Instant,
    retries: u32,
}

pub struct SendWindow {
    protocol: Protocol,
    base: SeqNo,
    next_seq: SeqNo,
    window_size: u32,
    unacked: VecDeque<UnackedSegment>,
    acked: BTreeSet<u32>,
    max_retries: u32,
}

/// A segment due for retransmission, with the RTT sample withheld (it is a
/// retransmission, so Karn's algorithm forbids timing it).
pub struct Retransmission {
    pub seq: SeqNo,
    pub packet: Packet,
}

impl SendWindow {
    pub fn new(protocol: Protocol, base: SeqNo, window_size: u32, max_retries: u32) -> Self {
        SendWindow {
            protocol,
            base,
            next_seq: base,
            window_size: protocol.effective_window(window_size),
            unacked: VecDeque::new(),
            acked: BTreeSet::new(),
            max_retries,
        }
    }

    pub fn base(&self) -> SeqNo {
        self.base
    }

    pub fn next_seq(&self) -> SeqNo {
        self.next_seq
    }

    /// In-flight count, derived from the window bounds rather than tracked
    /// as a separate counter incremented on every (re)transmission — see
    /// the design note on in-flight accounting.
    pub fn in_flight(&self) -> u32 {
        self.base.distance_to(self.next_seq)
    }

    /// Whether another fragment can be admitted right now: the congestion
    /// controller's current `effective_window` is intersected with the
    /// protocol's own `window_size`.
    pub fn has_room(&self, effective_window: u32) -> bool {
        self.in_flight() < self.window_size.min(effective_window)
    }

    pub fn is_empty(&self) -> bool {
        self.unacked.is_empty()
    }

    /// Admit a freshly-fragmented packet into the window, marking it sent
    /// now. Caller must have already checked `has_room()`.
    pub fn push(&mut self, seq: SeqNo, packet: Packet, now: Instant) {
        self.unacked.push_back(UnackedSegment {
            seq,
            packet,
            initial_tx: Some(now),
            last_tx: now,
            retries: 0,
        });
        self.next_seq = seq.advance(1);
    }

    /// Apply an incoming ACK. `ack_no` is the cumulative "next expected" for
    /// Stop-and-Wait/Go-Back-N, or `seq + 1` of the one segment being
    /// acknowledged for Selective Repeat. Returns the RTT sample for the
    /// *oldest* segment the ACK newly retires, if that segment was never
    /// retransmitted (Karn's algorithm) — `None` otherwise, including when
    /// the ACK retires nothing new.
    pub fn on_ack(&mut self, ack_no: SeqNo, now: Instant) -> Option<Duration> {
        match self.protocol {
            Protocol::StopWait | Protocol::GoBackN => self.on_cumulative_ack(ack_no, now),
            Protocol::SelectiveRepeat => self.on_selective_ack(ack_no, now),
        }
    }

    fn on_cumulative_ack(&mut self, ack_no: SeqNo, now: Instant) -> Option<Duration> {
        if ack_no <= self.base {
            return None;
        }
        let mut rtt = None;
        while let Some(front) = self.unacked.front() {
            if front.seq >= ack_no {
                break;
            }
            let seg = self.unacked.pop_front().unwrap();
            if rtt.is_none() {
                if let Some(tx) = seg.initial_tx {
                    if seg.retries == 0 {
                        rtt = Some(now.saturating_duration_since(tx));
                    }
                }
            }
        }
        self.base = ack_no;
        rtt
    }

    fn on_selective_ack(&mut self, ack_no: SeqNo, now: Instant) -> Option<Duration> {
        // `ack_no` is `seq + 1` of the segment being acked; recover the
        // acked sequence number itself before touching the acked-set.
        let acked_seq = ack_no.advance(u32::MAX);

        // A late or repeat ACK for a sequence already below `base` is a
        // pure duplicate: the receiver re-acks anything it sees below its
        // own expected sequence to repair a lost ACK, so this arrives
        // routinely, not just on some rare corner case. Recording it would
        // leave a stale entry in `acked` that the drain loop below can
        // never remove (it only pops from the front of `unacked`, which no
        // longer holds that sequence), so it must be a no-op here instead.
        if !(self.base.distance_to(acked_seq) < self.base.distance_to(self.next_seq)) {
            return None;
        }

        let rtt = self
            .unacked
            .iter()
            .find(|seg| seg.seq == acked_seq)
            .and_then(|seg| {
                if seg.retries == 0 {
                    seg.initial_tx.map(|tx| now.saturating_duration_since(tx))
                } else {
                    None
                }
            });

        self.acked.insert(acked_seq.value());
        while let Some(front) = self.unacked.front() {
            if self.acked.remove(&front.seq.value()) {
                self.unacked.pop_front();
                self.base = front.seq.advance(1);
            } else {
                break;
            }
        }
        rtt
    }

    /// Scan for overdue segments and produce the batch that needs
    /// retransmitting right now, per the discipline's retransmission scope.
    /// Returns `TransferAborted` the first time any segment's retry count
    /// would exceed `max_retries`.
    pub fn check_timeouts(
        &mut self,
        now: Instant,
        rto: Duration,
    ) -> Result<Vec<Retransmission>, ProtocolError> {
        match self.protocol {
            Protocol::StopWait | Protocol::GoBackN => self.check_batch_timeout(now, rto),
            Protocol::SelectiveRepeat => self.check_individual_timeouts(now, rto),
        }
    }

    /// Go-Back-N (and Stop-and-Wait, its one-segment special case): a
    /// single retransmit deadline anchored on the oldest unacked segment;
    /// firing it retransmits every outstanding segment in seq order.
    fn check_batch_timeout(
        &mut self,
        now: Instant,
        rto: Duration,
    ) -> Result<Vec<Retransmission>, ProtocolError> {
        let overdue = match self.unacked.front() {
            Some(front) => now.saturating_duration_since(front.last_tx) >= rto,
            None => false,
        };
        if !overdue {
            return Ok(Vec::new());
        }

        let mut batch = Vec::with_capacity(self.unacked.len());
        for seg in self.unacked.iter_mut() {
            seg.retries += 1;
            if seg.retries > self.max_retries {
                return Err(ProtocolError::TransferAborted { seq: seg.seq.value() });
            }
            seg.last_tx = now;
            batch.push(Retransmission {
                seq: seg.seq,
                packet: seg.packet.clone(),
            });
        }
        Ok(batch)
    }

    /// Selective Repeat: each segment carries its own deadline, so only the
    /// segments that have actually timed out are retransmitted.
    fn check_individual_timeouts(
        &mut self,
        now: Instant,
        rto: Duration,
    ) -> Result<Vec<Retransmission>, ProtocolError> {
        let mut batch = Vec::new();
        for seg in self.unacked.iter_mut() {
            if now.saturating_duration_since(seg.last_tx) < rto {
                continue;
            }
            seg.retries += 1;
            if seg.retries > self.max_retries {
                return Err(ProtocolError::TransferAborted { seq: seg.seq.value() });
            }
            seg.last_tx = now;
            batch.push(Retransmission {
                seq: seg.seq,
                packet: seg.packet.clone(),
            });
        }
        Ok(batch)
    }
}
