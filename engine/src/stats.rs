//! Monotone counters plus a bounded RTT reservoir, exposed only as cloned
//! snapshots. Derived quantities (throughput, average RTT) are computed by
//! readers from the snapshot, never stored.

use std::collections::VecDeque;
use std::time::Duration;

use crate::connection::ConnectionState;

/// Cap on the RTT sample reservoir.
pub const RTT_RESERVOIR_CAPACITY: usize = 1000;

#[derive(Clone, Debug, Default)]
pub struct Stats {
    /// Sender-side: DATA segments transmitted (first transmission only).
    pub packets_sent: u64,
    pub acks_received: u64,
    pub retransmissions: u64,
    pub timeouts: u64,
    pub checksum_errors: u64,
    pub out_of_order: u64,
    pub duplicate_arrivals: u64,
    pub packets_dropped: u64,
    pub bytes_transferred: u64,
    /// Receiver-side: checksum-valid packets admitted for processing.
    pub packets_received: u64,
    /// Receiver-side: ACKs sent (one per admitted DATA packet).
    pub acks_sent: u64,
    rtt_samples: VecDeque<Duration>,
}

impl Stats {
    pub fn record_rtt(&mut self, sample: Duration) {
        if self.rtt_samples.len() >= RTT_RESERVOIR_CAPACITY {
            self.rtt_samples.pop_front();
        }
        self.rtt_samples.push_back(sample);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            packets_sent: self.packets_sent,
            acks_received: self.acks_received,
            retransmissions: self.retransmissions,
            timeouts: self.timeouts,
            checksum_errors: self.checksum_errors,
            out_of_order: self.out_of_order,
            duplicate_arrivals: self.duplicate_arrivals,
            packets_dropped: self.packets_dropped,
            bytes_transferred: self.bytes_transferred,
            packets_received: self.packets_received,
            acks_sent: self.acks_sent,
            rtt_samples: self.rtt_samples.iter().copied().collect(),
        }
    }
}

/// Owned, read-only view of `Stats`, safe to hand to an external observer.
#[derive(Clone, Debug, Default)]
pub struct StatsSnapshot {
    pub packets_sent: u64,
    pub acks_received: u64,
    pub retransmissions: u64,
    pub timeouts: u64,
    pub checksum_errors: u64,
    pub out_of_order: u64,
    pub duplicate_arrivals: u64,
    pub packets_dropped: u64,
    pub bytes_transferred: u64,
    pub packets_received: u64,
    pub acks_sent: u64,
    pub rtt_samples: Vec<Duration>,
}

impl StatsSnapshot {
    pub fn average_rtt(&self) -> Option<Duration> {
        if self.rtt_samples.is_empty() {
            return None;
        }
        let total: Duration = self.rtt_samples.iter().sum();
        Some(total / self.rtt_samples.len() as u32)
    }

    /// Application-visible bytes per second over `elapsed`, `None` when
    /// `elapsed` is zero.
    pub fn throughput_bps(&self, elapsed: Duration) -> Option<f64> {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return None;
        }
        Some((self.bytes_transferred as f64 * 8.0) / secs)
    }
}

/// Flat status snapshot combining connection, window, and congestion
/// summaries: state, counters, window positions, congestion summary.
#[derive(Clone, Debug)]
pub struct StatusSnapshot {
    pub state: ConnectionState,
    pub base: u32,
    pub next_seq: u32,
    pub total_chunks: usize,
    pub window_size: u32,
    pub cwnd: u32,
    pub ssthresh: f64,
    pub rto: Duration,
    pub in_slow_start: bool,
    pub stats: StatsSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservoir_caps_and_drops_oldest() {
        let mut stats = Stats::default();
        for i in 0..(RTT_RESERVOIR_CAPACITY + 10) {
            stats.record_rtt(Duration::from_millis(i as u64));
        }
        let snap = stats.snapshot();
        assert_eq!(snap.rtt_samples.len(), RTT_RESERVOIR_CAPACITY);
        assert_eq!(snap.rtt_samples[0], Duration::from_millis(10));
    }

    #[test]
    fn average_rtt_and_throughput() {
        let mut stats = Stats::default();
        stats.record_rtt(Duration::from_millis(100));
        stats.record_rtt(Duration::from_millis(200));
        stats.bytes_transferred = 1_000_000;
        let snap = stats.snapshot();
        assert_eq!(snap.average_rtt(), Some(Duration::from_millis(150)));
        assert_eq!(snap.throughput_bps(Duration::from_secs(1)), Some(8_000_000.0));
    }

    #[test]
    fn empty_reservoir_has_no_average() {
        let snap = Stats::default().snapshot();
        assert!(snap.average_rtt().is_none());
        assert!(snap.throughput_bps(Duration::from_secs(0)).is_none());
    }
}
