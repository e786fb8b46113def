//! ASCII hex codec for frames on the wire.
//!
//! Every binary byte travels as two uppercase hex characters.

use crate::error::{Error, Result};

/// Render a binary frame as uppercase ASCII hex.
pub fn encode(frame: &[u8]) -> String {
    hex::encode_upper(frame)
}

/// Decode ASCII hex (either case) back to binary.
///
/// Fails with [`Error::BadEncoding`] on odd length or non-hex characters.
pub fn decode(ascii: &[u8]) -> Result<Vec<u8>> {
    decode_field(ascii, "frame")
}

/// Decode a single two-character hex byte.
pub fn decode_byte(pair: [u8; 2]) -> Result<u8> {
    let mut out = [0u8; 1];
    hex::decode_to_slice(pair, &mut out).map_err(|e| Error::bad_encoding("length", e))?;
    Ok(out[0])
}

pub(crate) fn decode_field(ascii: &[u8], field: &'static str) -> Result<Vec<u8>> {
    hex::decode(ascii).map_err(|e| Error::bad_encoding(field, e))
}
