//! TCP-Tahoe-style slow start and congestion avoidance over a window
//! expressed in packets, with Jacobson/Karels RTT estimation feeding an RTO
//! used by the retransmission engine.

use float_duration::FloatDuration;
use std::time::Duration;

/// RTO floor and ceiling: never let the estimator collapse to an unusably
/// tight timeout, nor blow out to an unusably slack one.
const RTO_MIN_SECS: f64 = 0.2;
const RTO_MAX_SECS: f64 = 60.0;

const ALPHA: f64 = 1.0 / 8.0;
const BETA: f64 = 1.0 / 4.0;

#[derive(Clone, Debug)]
pub struct CongestionController {
    cwnd: f64,
    ssthresh: f64,
    min_cwnd: f64,
    max_cwnd: f64,
    srtt: Option<f64>,
    rttvar: Option<f64>,
    rto: Duration,
    /// The connection's configured static timeout. Used verbatim as `rto()`
    /// whenever congestion control is disabled, instead of the
    /// dynamically-estimated `rto` field above.
    static_rto: Duration,
    packets_in_flight: u32,
    enabled: bool,
}

impl Default for CongestionController {
    fn default() -> Self {
        Self::new(true, Duration::from_secs(1))
    }
}

impl CongestionController {
    pub fn new(enabled: bool, static_rto: Duration) -> Self {
        CongestionController {
            cwnd: 1.0,
            ssthresh: 64.0,
            min_cwnd: 1.0,
            max_cwnd: 1024.0,
            srtt: None,
            rttvar: None,
            rto: static_rto,
            static_rto,
            packets_in_flight: 0,
            enabled,
        }
    }

    /// Effective window in whole packets, never below `min_cwnd`. When
    /// congestion control is disabled the window is simply `max_cwnd`, i.e.
    /// bounded only by the protocol's own advertised window.
    pub fn window(&self) -> u32 {
        if !self.enabled {
            return self.max_cwnd as u32;
        }
        self.cwnd.max(self.min_cwnd) as u32
    }

    /// The retransmission timeout to arm for the next segment. This is the
    /// configured static timeout whenever congestion control is disabled,
    /// and the live Jacobson/Karels estimate otherwise.
    pub fn rto(&self) -> Duration {
        if !self.enabled {
            return self.static_rto;
        }
        self.rto
    }

    pub fn ssthresh(&self) -> f64 {
        self.ssthresh
    }

    pub fn in_flight(&self) -> u32 {
        self.packets_in_flight
    }

    pub fn in_slow_start(&self) -> bool {
        self.cwnd < self.ssthresh
    }

    pub fn on_packet_sent(&mut self) {
        self.packets_in_flight = self.packets_in_flight.saturating_add(1);
    }

    /// Called once per ACK that advances the send window. `rtt_sample` is
    /// `Some` only for ACKs of segments that were never retransmitted
    /// (Karn's algorithm — the sender is responsible for withholding the
    /// sample otherwise).
    pub fn on_ack_received(&mut self, rtt_sample: Option<Duration>) {
        self.packets_in_flight = self.packets_in_flight.saturating_sub(1);

        if !self.enabled {
            return;
        }

        if self.in_slow_start() {
            self.cwnd += 1.0;
        } else {
            self.cwnd += 1.0 / self.cwnd;
        }
        self.cwnd = self.cwnd.clamp(self.min_cwnd, self.max_cwnd);

        if let Some(sample) = rtt_sample {
            self.update_rto(sample);
        }
    }

    /// Called on a retransmission timeout: Tahoe always drops to slow start
    /// from scratch, halving ssthresh to the window size at the moment of
    /// loss (floored at 2, not `min_cwnd`, which may be 1).
    pub fn on_timeout(&mut self) {
        if self.enabled {
            self.ssthresh = (self.cwnd / 2.0).max(2.0);
            self.cwnd = self.min_cwnd;
        }
    }

    /// Jacobson/Karels SRTT/RTTVAR update (RFC 6298), executed once per RTT
    /// sample admitted by Karn's algorithm.
    fn update_rto(&mut self, sample: Duration) {
        let sample_secs = FloatDuration::from_std(sample).as_seconds();

        let (srtt, rttvar) = match (self.srtt, self.rttvar) {
            (Some(srtt), Some(rttvar)) => {
                let rttvar = (1.0 - BETA) * rttvar + BETA * (srtt - sample_secs).abs();
                let srtt = (1.0 - ALPHA) * srtt + ALPHA * sample_secs;
                (srtt, rttvar)
            }
            _ => (sample_secs, sample_secs / 2.0),
        };
        self.srtt = Some(srtt);
        self.rttvar = Some(rttvar);

        let rto_secs = (srtt + (4.0 * rttvar).max(0.0)).clamp(RTO_MIN_SECS, RTO_MAX_SECS);
        self.rto = FloatDuration::seconds(rto_secs)
            .to_std()
            .unwrap_or_else(|_| Duration::from_secs_f64(RTO_MIN_SECS));
    }
}
