//! The protocol engine: one tick reads, acknowledges, retries and dispatches.
//!
//! Two drivers share [`Engine::tick`]:
//!
//! - [`Engine::run`] / [`Engine::spawn`] loop on a dedicated thread and nap
//!   for the read timeout whenever a tick saw no traffic.
//! - Callers with their own scheduler call [`Engine::tick`] directly.
//!
//! Other threads talk to a running engine only through an [`EngineHandle`].
//!
//! # Example
//!
//! ```no_run
//! use alarmlink::{CommandCode, CommandTable, Engine, EngineConfig};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum Cmd { ZoneStatus }
//!
//! fn zone(frame: &[u8]) -> Result<u8, alarmlink::BoxError> {
//!     frame.get(2).copied().ok_or_else(|| "short".into())
//! }
//!
//! let table = CommandTable::new()
//!     .with(CommandCode::Single(0x21), Cmd::ZoneStatus, "Zone Status", Some(zone));
//! let mut engine = Engine::open("/dev/ttyUSB0", table, EngineConfig::default())?;
//! engine.register_handler(Cmd::ZoneStatus, |d| {
//!     println!("zone {}", d.record);
//!     Ok(())
//! })?;
//! let (handle, thread) = engine.spawn()?;
//! handle.enqueue_outbound(vec![0x02, 0x20, 0x22])?;
//! handle.request_shutdown()?;
//! thread.join().expect("engine thread panicked")?;
//! # Ok::<(), alarmlink::Error>(())
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, error, info};

use crate::channel::{ByteChannel, SerialChannel};
use crate::checksum;
use crate::command::{CommandId, CommandTable, Decoded};
use crate::config::EngineConfig;
use crate::dispatch::{Dispatch, HandlerRegistry};
use crate::error::{BoxError, Error, Fault, Result, hex_preview};
use crate::frame::{ACK, Control, MIN_FRAME_LEN, NAK};
use crate::reader::{FrameReader, Scan};
use crate::transmit::{Action, Outbound, TransmitManager};

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Inbound or outbound traffic was handled.
    Busy,
    /// Nothing arrived and nothing was sent.
    Idle,
    /// The shutdown sentinel was reached and the channel is closed.
    Shutdown,
}

/// Thread-safe access to a running engine's queues.
///
/// Every operation fails with [`Error::Closed`] once the engine has shut
/// down or been dropped.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    outbound: Sender<Outbound>,
    loopback: Sender<Vec<u8>>,
    closed: Arc<AtomicBool>,
}

impl EngineHandle {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) { Err(Error::Closed) } else { Ok(()) }
    }

    /// Append the checksum to `frame` (`[LEN, payload...]`) and queue it for
    /// transmission.
    pub fn enqueue_outbound(&self, mut frame: Vec<u8>) -> Result<()> {
        self.ensure_open()?;
        if frame.is_empty() {
            return Err(Error::EmptyFrame);
        }
        checksum::append(&mut frame);
        debug!(frame = %hex_preview(&frame), "frame queued for transmission");
        self.outbound.send(Outbound::Frame(frame)).map_err(|_| Error::Closed)
    }

    /// Append the checksum to `frame` and have the engine receive it as if it
    /// came from the panel. Nothing is written to the channel.
    pub fn inject_loopback(&self, mut frame: Vec<u8>) -> Result<()> {
        self.ensure_open()?;
        if frame.is_empty() {
            return Err(Error::EmptyFrame);
        }
        checksum::append(&mut frame);
        self.loopback.send(frame).map_err(|_| Error::Closed)
    }

    /// Close the channel once every frame queued so far has been sent.
    pub fn request_shutdown(&self) -> Result<()> {
        self.ensure_open()?;
        self.outbound.send(Outbound::Shutdown).map_err(|_| Error::Closed)
    }
}

pub struct Engine<C, Id, R> {
    reader: FrameReader<C>,
    controls: Receiver<Control>,
    loopback: Receiver<Vec<u8>>,
    transmit: TransmitManager,
    registry: HandlerRegistry<Id, R>,
    handle: EngineHandle,
    config: EngineConfig,
    closed: bool,
}

impl<Id: CommandId, R> Engine<SerialChannel, Id, R> {
    /// Open the serial device at `path` and build an engine on it.
    ///
    /// Fails if the device cannot be opened; retrying is up to the caller.
    pub fn open(path: &str, table: CommandTable<Id, R>, config: EngineConfig) -> Result<Self> {
        let channel = SerialChannel::open(path, config.read_timeout)?;
        Ok(Self::new(channel, table, config))
    }
}

impl<C: ByteChannel, Id: CommandId, R> Engine<C, Id, R> {
    pub fn new(channel: C, table: CommandTable<Id, R>, config: EngineConfig) -> Self {
        let (control_tx, controls) = unbounded();
        let reader = FrameReader::new(channel, move |c| {
            // The receiver lives as long as the engine that owns this reader.
            let _ = control_tx.send(c);
        });
        let (outbound_tx, outbound_rx) = unbounded();
        let (loopback_tx, loopback) = unbounded();
        Self {
            reader,
            controls,
            loopback,
            transmit: TransmitManager::new(outbound_rx, &config),
            registry: HandlerRegistry::new(table),
            handle: EngineHandle {
                outbound: outbound_tx,
                loopback: loopback_tx,
                closed: Arc::new(AtomicBool::new(false)),
            },
            config,
            closed: false,
        }
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn transmit(&self) -> &TransmitManager {
        &self.transmit
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Subscribe `handler` to every decoded frame for `id`.
    ///
    /// Fails with [`Error::UnknownCommandId`] if the command table has no
    /// entry for `id`.
    pub fn register_handler(
        &mut self,
        id: Id,
        handler: impl FnMut(&Decoded<Id, R>) -> std::result::Result<(), BoxError> + Send + 'static,
    ) -> Result<()> {
        self.registry.register(id, handler)
    }

    pub fn enqueue_outbound(&self, frame: Vec<u8>) -> Result<()> {
        self.handle.enqueue_outbound(frame)
    }

    pub fn inject_loopback(&self, frame: Vec<u8>) -> Result<()> {
        self.handle.inject_loopback(frame)
    }

    pub fn request_shutdown(&self) -> Result<()> {
        self.handle.request_shutdown()
    }

    /// Run one pass: loopback, inbound frame, outbound queue.
    ///
    /// Frame-level problems are logged and absorbed. Only channel I/O
    /// failures are returned, and [`Error::Closed`] once shut down.
    pub fn tick(&mut self) -> Result<Tick> {
        if self.closed {
            return Err(Error::Closed);
        }
        let mut busy = false;

        if let Ok(frame) = self.loopback.try_recv() {
            busy = true;
            debug!(frame = %hex_preview(&frame), "received synthetic frame");
            self.registry.dispatch(&frame);
        }

        let scan = self.reader.wait_for_start()?;
        busy |= self.drain_controls()?;
        if scan == Scan::Found {
            busy = true;
            self.receive()?;
        }

        let now = Instant::now();
        if let Some(action) = self.transmit.service_timeout(now) {
            busy = true;
            self.perform(action)?;
        }
        if let Some(action) = self.transmit.next(now) {
            busy = true;
            self.perform(action)?;
        }

        Ok(match (self.closed, busy) {
            (true, _) => Tick::Shutdown,
            (false, true) => Tick::Busy,
            (false, false) => Tick::Idle,
        })
    }

    /// Tick until shutdown, napping after idle ticks.
    pub fn run(mut self) -> Result<()> {
        let started = Instant::now();
        let mut last_beat = started;
        info!("engine loop started");
        loop {
            match self.tick()? {
                Tick::Shutdown => {
                    info!("engine loop stopped");
                    return Ok(());
                }
                Tick::Idle => thread::sleep(self.config.read_timeout),
                Tick::Busy => {}
            }
            if last_beat.elapsed() > self.config.heartbeat_interval {
                debug!(uptime_secs = started.elapsed().as_secs(), "engine loop alive");
                last_beat = Instant::now();
            }
        }
    }

    /// Move the engine onto its own thread running [`run`](Self::run).
    pub fn spawn(self) -> Result<(EngineHandle, JoinHandle<Result<()>>)>
    where
        C: 'static,
        R: 'static,
    {
        let handle = self.handle();
        let thread = thread::Builder::new()
            .name("alarmlink-engine".into())
            .spawn(move || {
                let result = self.run();
                if let Err(e) = &result {
                    error!("engine loop failed: {e}");
                }
                result
            })?;
        Ok((handle, thread))
    }

    /// Read the frame whose start marker was just seen, then ACK/NAK it.
    fn receive(&mut self) -> Result<()> {
        let frame = match self.reader.read_frame() {
            Ok(frame) => {
                self.drain_controls()?;
                frame
            }
            Err(Error::Io(e)) => return Err(Error::Io(e)),
            Err(e) => {
                self.drain_controls()?;
                let fault = if matches!(e, Error::Timeout) { Fault::Timeout } else { Fault::BadEncoding };
                self.reader.write_raw(NAK)?;
                error!(%fault, "discarding frame: {e}");
                return Ok(());
            }
        };

        if frame.len() < MIN_FRAME_LEN {
            self.reader.write_raw(NAK)?;
            error!(fault = %Fault::TooShort, frame = %hex_preview(&frame), "message too short");
        }

        if checksum::validate(&frame) {
            self.reader.write_raw(ACK)?;
            if let Dispatch::Rejected(fault) = self.registry.dispatch(&frame) {
                debug!(%fault, "frame acknowledged but not delivered");
            }
        } else {
            self.reader.write_raw(NAK)?;
            error!(fault = %Fault::BadChecksum, frame = %hex_preview(&frame), "bad checksum");
        }
        Ok(())
    }

    /// Feed control characters collected by the reader to the transmit state
    /// machine. Returns true if any of them led to a resend or drop.
    fn drain_controls(&mut self) -> Result<bool> {
        let mut acted = false;
        while let Ok(c) = self.controls.try_recv() {
            debug!(%c, "control char");
            if let Some(action) = self.transmit.on_control(c, Instant::now()) {
                acted = true;
                self.perform(action)?;
            }
        }
        Ok(acted)
    }

    fn perform(&mut self, action: Action) -> Result<()> {
        match action {
            Action::Send { frame, .. } => self.reader.write_frame(&frame),
            Action::Drop { .. } => Ok(()),
            Action::Shutdown => {
                info!("shutdown requested, closing channel");
                self.closed = true;
                self.handle.closed.store(true, Ordering::Release);
                self.reader.close()
            }
        }
    }
}
