//! Byte-level access to the panel's serial link.
//!
//! The link parameters are fixed by the automation module: 9600 baud, 8 data
//! bits, odd parity, 1 stop bit, no flow control.

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::debug;

use crate::error::{Error, Result};

pub const BAUD_RATE: u32 = 9600;
pub const DATA_BITS: DataBits = DataBits::Eight;
pub const PARITY: Parity = Parity::Odd;
pub const STOP_BITS: StopBits = StopBits::One;
pub const FLOW_CONTROL: FlowControl = FlowControl::None;

/// A byte stream with bounded, blocking reads.
///
/// The engine owns its channel exclusively and never touches it from more
/// than one thread at a time.
pub trait ByteChannel: Send {
    /// Read up to `buf.len()` bytes, blocking at most the channel's read
    /// timeout. Returns `Ok(0)` when nothing arrived in time.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write every byte of `bytes`.
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Release the underlying device. Later reads and writes fail.
    fn close(&mut self) -> io::Result<()>;
}

/// A [`ByteChannel`] over a physical serial port.
pub struct SerialChannel {
    port: Option<Box<dyn SerialPort>>,
}

impl SerialChannel {
    /// Open `path` with the fixed link parameters and the given per-read timeout.
    pub fn open(path: &str, read_timeout: Duration) -> Result<Self> {
        let port = serialport::new(path, BAUD_RATE)
            .data_bits(DATA_BITS)
            .parity(PARITY)
            .stop_bits(STOP_BITS)
            .flow_control(FLOW_CONTROL)
            .timeout(read_timeout)
            .open()
            .map_err(|source| Error::Open { path: path.to_string(), source })?;
        debug!(path, ?read_timeout, "serial port opened");
        Ok(Self::from_port(port))
    }

    /// Wrap an already-configured port.
    pub fn from_port(port: Box<dyn SerialPort>) -> Self {
        Self { port: Some(port) }
    }

    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port closed"))
    }
}

impl ByteChannel for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port()?.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if is_timeout(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let port = self.port()?;
        port.write_all(bytes)?;
        port.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(port) = self.port.take() {
            debug!(name = ?port.name(), "serial port closed");
        }
        Ok(())
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

/// In-memory channel used to drive the reader and engine in tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::ByteChannel;

    #[derive(Default)]
    struct Shared {
        /// `None` entries simulate a read timeout.
        input: VecDeque<Option<u8>>,
        written: Vec<u8>,
        closed: bool,
        fail_reads: bool,
    }

    /// Scripted channel; its [`Probe`] stays with the test after the channel
    /// moves into an engine.
    pub struct ScriptedChannel {
        shared: Arc<Mutex<Shared>>,
    }

    #[derive(Clone)]
    pub struct Probe {
        shared: Arc<Mutex<Shared>>,
    }

    impl ScriptedChannel {
        pub fn new() -> (Self, Probe) {
            let shared = Arc::new(Mutex::new(Shared::default()));
            (Self { shared: shared.clone() }, Probe { shared })
        }
    }

    impl Probe {
        pub fn feed(&self, bytes: &[u8]) {
            self.shared.lock().unwrap().input.extend(bytes.iter().copied().map(Some));
        }

        /// Queue a frame on the wire: start marker plus hex body.
        pub fn feed_frame(&self, frame: &[u8]) {
            self.feed(&[crate::frame::START]);
            self.feed(crate::codec::encode(frame).as_bytes());
        }

        pub fn feed_timeout(&self) {
            self.shared.lock().unwrap().input.push_back(None);
        }

        pub fn fail_reads(&self) {
            self.shared.lock().unwrap().fail_reads = true;
        }

        /// Drain and return everything written so far.
        pub fn take_written(&self) -> Vec<u8> {
            std::mem::take(&mut self.shared.lock().unwrap().written)
        }

        pub fn is_closed(&self) -> bool {
            self.shared.lock().unwrap().closed
        }
    }

    impl ByteChannel for ScriptedChannel {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut shared = self.shared.lock().unwrap();
            if shared.fail_reads {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
            }
            let mut n = 0;
            while n < buf.len() {
                match shared.input.front() {
                    Some(Some(b)) => {
                        buf[n] = *b;
                        n += 1;
                        shared.input.pop_front();
                    }
                    Some(None) => {
                        if n == 0 {
                            shared.input.pop_front();
                        }
                        break;
                    }
                    None => break,
                }
            }
            Ok(n)
        }

        fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
            let mut shared = self.shared.lock().unwrap();
            if shared.closed {
                return Err(io::Error::new(io::ErrorKind::NotConnected, "closed"));
            }
            shared.written.extend_from_slice(bytes);
            Ok(())
        }

        fn close(&mut self) -> io::Result<()> {
            self.shared.lock().unwrap().closed = true;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedChannel;
    use super::*;

    #[test]
    fn scripted_reads_stop_at_timeout() {
        let (mut ch, probe) = ScriptedChannel::new();
        probe.feed(b"AB");
        probe.feed_timeout();
        probe.feed(b"C");

        let mut buf = [0u8; 4];
        assert_eq!(ch.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"AB");
        assert_eq!(ch.read(&mut buf).unwrap(), 0);
        assert_eq!(ch.read(&mut buf).unwrap(), 1);
        assert_eq!(ch.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn scripted_close_blocks_writes() {
        let (mut ch, probe) = ScriptedChannel::new();
        ch.write_all(&[0x06]).unwrap();
        ch.close().unwrap();
        assert!(probe.is_closed());
        assert!(ch.write_all(&[0x06]).is_err());
        assert_eq!(probe.take_written(), vec![0x06]);
    }

    #[test]
    fn open_missing_device_fails() {
        let err = SerialChannel::open("/dev/does-not-exist-alarmlink", Duration::from_millis(10));
        assert!(matches!(err, Err(Error::Open { .. })));
    }

    #[test]
    fn timeout_kinds() {
        assert!(is_timeout(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(is_timeout(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(!is_timeout(&io::Error::from(io::ErrorKind::BrokenPipe)));
    }
}
