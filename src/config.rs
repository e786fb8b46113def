//! Engine timing and retry parameters.

use std::time::Duration;

/// How long a frame we sent waits for ACK/NAK before it is resent.
pub const ACK_TIMEOUT_INBOUND: Duration = Duration::from_millis(500);

/// How long the panel waits for our ACK to its frames. Informational only.
pub const ACK_TIMEOUT_OUTBOUND: Duration = Duration::from_secs(2);

/// Total transmissions of one frame before it is dropped.
pub const MAX_RESENDS: u32 = 3;

pub const READ_TIMEOUT: Duration = Duration::from_millis(500);

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// Tunable parameters of a [`crate::Engine`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// Per-byte read timeout on the channel, also the idle nap of the
    /// continuous loop.
    pub read_timeout: Duration,
    pub ack_timeout_inbound: Duration,
    pub ack_timeout_outbound: Duration,
    pub max_attempts: u32,
    /// Minimum spacing of the continuous loop's "alive" log line.
    pub heartbeat_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            read_timeout: READ_TIMEOUT,
            ack_timeout_inbound: ACK_TIMEOUT_INBOUND,
            ack_timeout_outbound: ACK_TIMEOUT_OUTBOUND,
            max_attempts: MAX_RESENDS,
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }
}

impl EngineConfig {
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout_inbound = timeout;
        self
    }

    /// Clamped to at least one attempt.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}
