use std::fmt;
use std::io;

use thiserror::Error;

/// Boxed error returned by external decode functions and handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced to callers of the driver.
///
/// Per-frame problems found while ticking are [`Fault`]s and are logged
/// instead of returned.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unable to open serial device {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error("channel I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("timed out waiting for data from the panel")]
    Timeout,

    #[error("invalid hex in {field}: {detail}")]
    BadEncoding { field: &'static str, detail: String },

    #[error("no such command id {0}")]
    UnknownCommandId(String),

    #[error("frame is empty")]
    EmptyFrame,

    #[error("frame too long ({len} bytes, maximum {max})")]
    FrameTooLong { len: usize, max: usize },

    #[error("engine is shut down")]
    Closed,
}

impl Error {
    pub(crate) fn bad_encoding(field: &'static str, err: hex::FromHexError) -> Self {
        Self::BadEncoding { field, detail: err.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A problem with a single frame, handled inside the tick that found it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Timeout,
    BadEncoding,
    TooShort,
    BadChecksum,
    UnknownCommand,
    DecodeFailure,
    HandlerFailure,
    RetryExhausted,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::BadEncoding => "bad encoding",
            Self::TooShort => "too short",
            Self::BadChecksum => "bad checksum",
            Self::UnknownCommand => "unknown command",
            Self::DecodeFailure => "decode failure",
            Self::HandlerFailure => "handler failure",
            Self::RetryExhausted => "retries exhausted",
        };
        f.write_str(s)
    }
}

/// Format frame bytes as uppercase hex, truncated like " | 0105..." for long frames.
pub(crate) fn hex_preview(raw: &[u8]) -> String {
    let limit = 32;
    let mut s = hex::encode_upper(&raw[..raw.len().min(limit)]);
    if raw.len() > limit {
        s.push_str("...");
    }
    s
}
