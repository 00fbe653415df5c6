//! Configuration record, validated eagerly at construction — `Result` rather
//! than `assert!`, since this crate's configuration arrives from an
//! external, untrusted configuration layer rather than compiled-in constants.

use std::time::Duration;

use crate::error::ConfigError;
use crate::send_window::Protocol;

/// Default per-segment retransmission cap before a transfer is abandoned.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Default handshake retry budget, separate from the data-phase cap.
pub const DEFAULT_HANDSHAKE_RETRIES: u32 = 5;

/// Bounded wait for FIN+ACK before the sender gives up and completes anyway.
pub const DEFAULT_FIN_WAIT: Duration = Duration::from_secs(2);

const MIN_WINDOW_SIZE: u32 = 1;
const MAX_WINDOW_SIZE: u32 = 100;
const MIN_TIMEOUT_SECS: f64 = 0.1;
const MAX_TIMEOUT_SECS: f64 = 10.0;

#[derive(Clone, Debug)]
pub struct Config {
    pub protocol_mode: Protocol,
    pub window_size: u32,
    pub timeout: Duration,
    pub packet_loss_rate: f64,
    pub congestion_enabled: bool,
    pub max_retries: u32,
    pub handshake_retries: u32,
    pub fin_wait: Duration,
}

impl Config {
    /// Validate raw configuration values, rejecting anything outside the
    /// allowed ranges. Callers that don't care about `max_retries`/
    /// `handshake_retries`/`fin_wait` get sensible defaults via `Config::new`.
    pub fn new(
        protocol_mode: Protocol,
        window_size: u32,
        timeout: Duration,
        packet_loss_rate: f64,
        congestion_enabled: bool,
    ) -> Result<Self, ConfigError> {
        Self::with_overrides(
            protocol_mode,
            window_size,
            timeout,
            packet_loss_rate,
            congestion_enabled,
            DEFAULT_MAX_RETRIES,
            DEFAULT_HANDSHAKE_RETRIES,
            DEFAULT_FIN_WAIT,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        protocol_mode: Protocol,
        window_size: u32,
        timeout: Duration,
        packet_loss_rate: f64,
        congestion_enabled: bool,
        max_retries: u32,
        handshake_retries: u32,
        fin_wait: Duration,
    ) -> Result<Self, ConfigError> {
        if !(MIN_WINDOW_SIZE..=MAX_WINDOW_SIZE).contains(&window_size) {
            return Err(ConfigError::InvalidConfiguration {
                field: "window_size",
                detail: format!(
                    "{} outside [{}, {}]",
                    window_size, MIN_WINDOW_SIZE, MAX_WINDOW_SIZE
                ),
            });
        }

        // Selective Repeat's acked-set validity requires the window to be
        // at most half the sequence space. With 32-bit sequence numbers and
        // window_size <= 100 this is always true, but it is checked
        // explicitly rather than assumed.
        if (window_size as u64) * 2 > (u32::MAX as u64) + 1 {
            return Err(ConfigError::InvalidConfiguration {
                field: "window_size",
                detail: "window_size exceeds half the sequence-number space".into(),
            });
        }

        let timeout_secs = timeout.as_secs_f64();
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&timeout_secs) {
            return Err(ConfigError::InvalidConfiguration {
                field: "timeout",
                detail: format!(
                    "{} outside [{}, {}] seconds",
                    timeout_secs, MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS
                ),
            });
        }

        if !(0.0..=1.0).contains(&packet_loss_rate) {
            return Err(ConfigError::InvalidConfiguration {
                field: "packet_loss_rate",
                detail: format!("{} outside [0.0, 1.0]", packet_loss_rate),
            });
        }

        if max_retries == 0 {
            return Err(ConfigError::InvalidConfiguration {
                field: "max_retries",
                detail: "must be at least 1".into(),
            });
        }

        if handshake_retries == 0 {
            return Err(ConfigError::InvalidConfiguration {
                field: "handshake_retries",
                detail: "must be at least 1".into(),
            });
        }

        Ok(Config {
            protocol_mode,
            window_size,
            timeout,
            packet_loss_rate,
            congestion_enabled,
            max_retries,
            handshake_retries,
            fin_wait,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_in_range_values() {
        let cfg = Config::new(
            Protocol::SelectiveRepeat,
            10,
            Duration::from_secs_f64(1.0),
            0.0,
            true,
        )
        .unwrap();
        assert_eq!(cfg.window_size, 10);
        assert_eq!(cfg.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn rejects_window_size_out_of_range() {
        let err = Config::new(
            Protocol::GoBackN,
            0,
            Duration::from_secs_f64(1.0),
            0.0,
            true,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidConfiguration { field: "window_size", .. }
        ));

        assert!(Config::new(
            Protocol::GoBackN,
            101,
            Duration::from_secs_f64(1.0),
            0.0,
            true,
        )
        .is_err());
    }

    #[test]
    fn rejects_timeout_out_of_range() {
        assert!(Config::new(
            Protocol::StopWait,
            1,
            Duration::from_secs_f64(0.01),
            0.0,
            true,
        )
        .is_err());
        assert!(Config::new(
            Protocol::StopWait,
            1,
            Duration::from_secs_f64(20.0),
            0.0,
            true,
        )
        .is_err());
    }

    #[test]
    fn rejects_loss_rate_out_of_range() {
        assert!(Config::new(
            Protocol::StopWait,
            1,
            Duration::from_secs_f64(1.0),
            1.5,
            true,
        )
        .is_err());
    }
}
