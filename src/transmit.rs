//! Outbound queue and the single-outstanding-frame retry state machine.
//!
//! ```text
//! Idle --next()--> Pending(attempt 1)
//! Pending --ACK--> Idle
//! Pending --NAK | timeout--> Pending(attempt + 1)  or  Idle (dropped)
//! ```
//!
//! The manager never touches the channel. It returns [`Action`]s and the
//! engine performs the writes. Time is passed in so tests can control it.

use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use tracing::{debug, error, warn};

use crate::config::EngineConfig;
use crate::error::{Fault, hex_preview};
use crate::frame::Control;

/// An entry in the transmit queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A complete, checksummed frame.
    Frame(Vec<u8>),
    /// Close the channel once everything queued ahead of it has gone out.
    Shutdown,
}

/// What the engine must do next on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write `frame`; `attempt` is 1 for a first transmission.
    Send { frame: Vec<u8>, attempt: u32 },
    /// The frame ran out of attempts and was abandoned.
    Drop { frame: Vec<u8> },
    /// The shutdown sentinel reached the head of the queue.
    Shutdown,
}

#[derive(Debug)]
struct Pending {
    frame: Vec<u8>,
    attempt: u32,
    sent_at: Instant,
}

pub struct TransmitManager {
    queue: Receiver<Outbound>,
    pending: Option<Pending>,
    ack_timeout: Duration,
    max_attempts: u32,
}

impl TransmitManager {
    pub fn new(queue: Receiver<Outbound>, config: &EngineConfig) -> Self {
        Self {
            queue,
            pending: None,
            ack_timeout: config.ack_timeout_inbound,
            max_attempts: config.max_attempts,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_none()
    }

    /// Attempt number of the frame awaiting acknowledgement.
    pub fn attempt(&self) -> Option<u32> {
        self.pending.as_ref().map(|p| p.attempt)
    }

    pub fn pending_frame(&self) -> Option<&[u8]> {
        self.pending.as_ref().map(|p| p.frame.as_slice())
    }

    /// Number of frames waiting for their first transmission.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Feed an ACK or NAK read from the wire.
    pub fn on_control(&mut self, c: Control, now: Instant) -> Option<Action> {
        match (c, self.pending.is_some()) {
            (Control::Ack, true) => {
                debug!("expected ACK");
                self.pending = None;
                None
            }
            (Control::Nak, true) => self.retry(now, "NAK"),
            (_, false) => {
                debug!(%c, "spurious control char while idle");
                None
            }
        }
    }

    /// Resend or drop the pending frame if its acknowledgement is overdue.
    pub fn service_timeout(&mut self, now: Instant) -> Option<Action> {
        let overdue = self
            .pending
            .as_ref()
            .is_some_and(|p| now.saturating_duration_since(p.sent_at) > self.ack_timeout);
        if overdue { self.retry(now, "timeout") } else { None }
    }

    /// Pop the next queued item when idle.
    ///
    /// A frame becomes pending at attempt 1; the shutdown sentinel is
    /// returned as [`Action::Shutdown`].
    pub fn next(&mut self, now: Instant) -> Option<Action> {
        if self.pending.is_some() {
            return None;
        }
        match self.queue.try_recv().ok()? {
            Outbound::Shutdown => Some(Action::Shutdown),
            Outbound::Frame(frame) => {
                debug!(frame = %hex_preview(&frame), "sending frame");
                self.pending = Some(Pending { frame: frame.clone(), attempt: 1, sent_at: now });
                Some(Action::Send { frame, attempt: 1 })
            }
        }
    }

    fn retry(&mut self, now: Instant, reason: &'static str) -> Option<Action> {
        let p = self.pending.as_mut()?;
        p.attempt += 1;
        if p.attempt > self.max_attempts {
            let p = self.pending.take()?;
            error!(
                fault = %Fault::RetryExhausted,
                reason,
                attempts = self.max_attempts,
                frame = %hex_preview(&p.frame),
                "unable to send frame, too many attempts"
            );
            return Some(Action::Drop { frame: p.frame });
        }
        p.sent_at = now;
        warn!(reason, attempt = p.attempt, frame = %hex_preview(&p.frame), "resending frame");
        Some(Action::Send { frame: p.frame.clone(), attempt: p.attempt })
    }
}
