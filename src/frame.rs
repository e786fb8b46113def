//! Wire constants and frame construction.
//!
//! Wire format:
//! ```text
//! 0A HEX( LEN PAYLOAD... CS )
//! ```
//!
//! `LEN` counts every byte after itself, checksum included. ACK (0x06) and
//! NAK (0x15) travel unframed and may appear anywhere in the stream, even in
//! the middle of a frame.

use std::fmt;

use crate::error::{Error, Result};

/// Start-of-frame marker (line feed).
pub const START: u8 = 0x0A;
pub const ACK: u8 = 0x06;
pub const NAK: u8 = 0x15;

/// Smallest frame worth dispatching: length, one command byte, checksum.
pub const MIN_FRAME_LEN: usize = 3;

/// Largest length byte plus payload the panel accepts (checksum excluded).
pub const MAX_FRAME_LEN: usize = 58;

/// An unframed control character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Control {
    Ack = ACK,
    Nak = NAK,
}

impl Control {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            ACK => Some(Self::Ack),
            NAK => Some(Self::Nak),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ack => write!(f, "ACK"),
            Self::Nak => write!(f, "NAK"),
        }
    }
}

/// Prefix `payload` with its length byte, producing a frame ready for
/// checksumming (`[LEN, payload...]`).
///
/// The length byte accounts for the checksum that will be appended later.
pub fn with_length(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.is_empty() {
        return Err(Error::EmptyFrame);
    }
    let len = payload.len() + 1;
    if len > MAX_FRAME_LEN {
        return Err(Error::FrameTooLong { len, max: MAX_FRAME_LEN });
    }
    let mut frame = Vec::with_capacity(len + 1);
    frame.push(len as u8);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Command byte(s) of a frame: the byte after the length, and the next one
/// when the frame is long enough to carry a two-byte command ahead of the
/// checksum.
pub fn command_bytes(frame: &[u8]) -> Option<(u8, Option<u8>)> {
    let first = *frame.get(1)?;
    let second = if frame.len() > MIN_FRAME_LEN { Some(frame[2]) } else { None };
    Some((first, second))
}
