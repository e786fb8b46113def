//! Frame scanning and assembly on top of a [`ByteChannel`].
//!
//! Control characters are pulled out of the stream wherever they appear and
//! handed to the callback captured at construction. While scanning for a
//! start marker the callback runs as soon as the byte is seen; inside a
//! frame the characters are held until the frame read finishes.

use tracing::trace;

use crate::channel::ByteChannel;
use crate::codec;
use crate::error::{Error, Result};
use crate::frame::{Control, START};

/// Result of scanning for a start marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    Found,
    Timeout,
}

/// Callback receiving control characters pulled from the stream.
pub type ControlFn = Box<dyn FnMut(Control) + Send>;

pub struct FrameReader<C> {
    channel: C,
    on_control: ControlFn,
}

impl<C: ByteChannel> FrameReader<C> {
    pub fn new(channel: C, on_control: impl FnMut(Control) + Send + 'static) -> Self {
        Self { channel, on_control: Box::new(on_control) }
    }

    /// Discard bytes until the start marker arrives or a read times out.
    ///
    /// Only channel I/O failures are returned as errors.
    pub fn wait_for_start(&mut self) -> Result<Scan> {
        loop {
            let Some(b) = self.read_byte()? else {
                return Ok(Scan::Timeout);
            };
            if let Some(c) = Control::from_byte(b) {
                trace!(%c, "control char while scanning");
                (self.on_control)(c);
            } else if b == START {
                return Ok(Scan::Found);
            } else {
                trace!(byte = b, "discarding byte outside frame");
            }
        }
    }

    /// Read one frame body, assuming the start marker was just consumed.
    ///
    /// Returns the binary frame `[LEN, payload..., CS]` without checking the
    /// checksum. A timeout or bad hex anywhere discards the partial frame;
    /// control characters seen along the way are still delivered.
    pub fn read_frame(&mut self) -> Result<Vec<u8>> {
        let mut controls = Vec::new();
        let frame = self.read_frame_inner(&mut controls);
        for c in controls {
            (self.on_control)(c);
        }
        frame
    }

    fn read_frame_inner(&mut self, controls: &mut Vec<Control>) -> Result<Vec<u8>> {
        let mut ascii = self.read_chars(2, controls)?;
        let len = codec::decode_byte([ascii[0], ascii[1]])?;
        ascii.extend(self.read_chars(len as usize * 2, controls)?);
        codec::decode_field(&ascii, "frame body")
    }

    /// Collect `n` frame characters, setting aside control characters.
    fn read_chars(&mut self, n: usize, controls: &mut Vec<Control>) -> Result<Vec<u8>> {
        let mut chars = Vec::with_capacity(n);
        while chars.len() < n {
            let Some(b) = self.read_byte()? else {
                return Err(Error::Timeout);
            };
            match Control::from_byte(b) {
                Some(c) => controls.push(c),
                None => chars.push(b),
            }
        }
        Ok(chars)
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.channel.read(&mut buf)? {
            0 => Ok(None),
            _ => Ok(Some(buf[0])),
        }
    }

    /// Write a complete binary frame: start marker then uppercase hex.
    pub fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        let mut wire = Vec::with_capacity(1 + frame.len() * 2);
        wire.push(START);
        wire.extend_from_slice(codec::encode(frame).as_bytes());
        self.channel.write_all(&wire)?;
        Ok(())
    }

    /// Write a single unframed byte.
    pub fn write_raw(&mut self, byte: u8) -> Result<()> {
        self.channel.write_all(&[byte])?;
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.channel.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::channel::testing::{Probe, ScriptedChannel};
    use crate::frame::{ACK, NAK};

    fn reader() -> (FrameReader<ScriptedChannel>, Probe, Arc<Mutex<Vec<Control>>>) {
        let (ch, probe) = ScriptedChannel::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let r = FrameReader::new(ch, move |c| sink.lock().unwrap().push(c));
        (r, probe, seen)
    }

    #[test]
    fn skips_junk_before_start() {
        let (mut r, probe, _) = reader();
        probe.feed(b"xy\n020507");
        assert_eq!(r.wait_for_start().unwrap(), Scan::Found);
        assert_eq!(r.read_frame().unwrap(), vec![0x02, 0x05, 0x07]);
    }

    #[test]
    fn scan_times_out_on_silence() {
        let (mut r, probe, _) = reader();
        probe.feed(b"junk");
        assert_eq!(r.wait_for_start().unwrap(), Scan::Timeout);
    }

    #[test]
    fn control_chars_while_scanning_fire_immediately() {
        let (mut r, probe, seen) = reader();
        probe.feed(&[ACK, b'z', NAK]);
        probe.feed_timeout();
        assert_eq!(r.wait_for_start().unwrap(), Scan::Timeout);
        assert_eq!(*seen.lock().unwrap(), vec![Control::Ack, Control::Nak]);
    }

    #[test]
    fn control_chars_inside_frame_are_deferred() {
        let (mut r, probe, seen) = reader();
        probe.feed(&[START, b'0', ACK, b'2', b'0', NAK, b'5', b'0', b'7']);
        assert_eq!(r.wait_for_start().unwrap(), Scan::Found);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(r.read_frame().unwrap(), vec![0x02, 0x05, 0x07]);
        assert_eq!(*seen.lock().unwrap(), vec![Control::Ack, Control::Nak]);
    }

    #[test]
    fn lowercase_hex_accepted() {
        let (mut r, probe, _) = reader();
        probe.feed(b"\n02abad");
        r.wait_for_start().unwrap();
        assert_eq!(r.read_frame().unwrap(), vec![0x02, 0xAB, 0xAD]);
    }

    #[test]
    fn bad_length_field() {
        let (mut r, probe, _) = reader();
        probe.feed(b"\nZZ0506");
        r.wait_for_start().unwrap();
        assert!(matches!(r.read_frame(), Err(Error::BadEncoding { field: "length", .. })));
    }

    #[test]
    fn bad_body_hex() {
        let (mut r, probe, _) = reader();
        probe.feed(b"\n01Q6");
        r.wait_for_start().unwrap();
        assert!(matches!(r.read_frame(), Err(Error::BadEncoding { .. })));
    }

    #[test]
    fn timeout_mid_frame_still_delivers_controls() {
        let (mut r, probe, seen) = reader();
        probe.feed(&[START, b'0', b'3', b'2', ACK]);
        probe.feed_timeout();
        r.wait_for_start().unwrap();
        assert!(matches!(r.read_frame(), Err(Error::Timeout)));
        assert_eq!(*seen.lock().unwrap(), vec![Control::Ack]);
    }

    #[test]
    fn zero_length_yields_single_byte() {
        let (mut r, probe, _) = reader();
        probe.feed(b"\n00");
        r.wait_for_start().unwrap();
        assert_eq!(r.read_frame().unwrap(), vec![0x00]);
    }

    #[test]
    fn write_frame_and_raw() {
        let (mut r, probe, _) = reader();
        r.write_frame(&[0x01, 0x05, 0x06]).unwrap();
        r.write_raw(ACK).unwrap();
        assert_eq!(probe.take_written(), b"\n010506\x06".to_vec());
    }

    #[test]
    fn io_failure_is_an_error() {
        let (mut r, probe, _) = reader();
        probe.fail_reads();
        assert!(matches!(r.wait_for_start(), Err(Error::Io(_))));
    }
}
