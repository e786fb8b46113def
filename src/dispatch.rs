//! Handler registry and delivery of validated frames.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error};

use crate::command::{CommandId, CommandTable, Decoded};
use crate::error::{BoxError, Error, Fault, Result, hex_preview};
use crate::frame::MIN_FRAME_LEN;

/// Callback invoked with every decoded frame of the command it was
/// registered for. Runs on the engine's thread.
pub type Handler<Id, R> = Box<dyn FnMut(&Decoded<Id, R>) -> std::result::Result<(), BoxError> + Send>;

/// What became of one frame handed to [`HandlerRegistry::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Decoded and passed to this many handlers.
    Delivered(usize),
    /// Recognised command with no decode function.
    NoDecoder,
    Rejected(Fault),
}

pub struct HandlerRegistry<Id, R> {
    table: CommandTable<Id, R>,
    handlers: HashMap<Id, Vec<Handler<Id, R>>>,
}

impl<Id: CommandId, R> HandlerRegistry<Id, R> {
    /// Build a registry whose accepted ids are exactly those in `table`.
    pub fn new(table: CommandTable<Id, R>) -> Self {
        let handlers = table.ids().map(|id| (id, Vec::new())).collect();
        Self { table, handlers }
    }

    pub fn table(&self) -> &CommandTable<Id, R> {
        &self.table
    }

    /// Append `handler` to the list for `id`. Handlers run in registration order.
    pub fn register(
        &mut self,
        id: Id,
        handler: impl FnMut(&Decoded<Id, R>) -> std::result::Result<(), BoxError> + Send + 'static,
    ) -> Result<()> {
        let list = self
            .handlers
            .get_mut(&id)
            .ok_or_else(|| Error::UnknownCommandId(format!("{id:?}")))?;
        list.push(Box::new(handler));
        Ok(())
    }

    pub fn handler_count(&self, id: Id) -> usize {
        self.handlers.get(&id).map_or(0, Vec::len)
    }

    /// Decode `frame` and run its handlers.
    ///
    /// Nothing escapes: decode errors, handler errors and panics are logged
    /// and stop delivery of this frame only.
    pub fn dispatch(&mut self, frame: &[u8]) -> Dispatch {
        if frame.len() < MIN_FRAME_LEN {
            debug!(frame = %hex_preview(frame), "frame too short to dispatch");
            return Dispatch::Rejected(Fault::TooShort);
        }
        let Some((code, entry)) = self.table.resolve(frame) else {
            debug!(fault = %Fault::UnknownCommand, frame = %hex_preview(frame), "unknown command");
            return Dispatch::Rejected(Fault::UnknownCommand);
        };
        let Some(decode) = entry.decode else {
            debug!(%code, name = entry.name, "no decoder for command");
            return Dispatch::NoDecoder;
        };
        debug!(%code, id = ?entry.id, name = entry.name, "handling command");

        let record = match guarded(|| decode(frame)) {
            Ok(record) => record,
            Err(e) => {
                report(Fault::DecodeFailure, entry.name, frame, &e);
                return Dispatch::Rejected(Fault::DecodeFailure);
            }
        };
        let decoded = Decoded { command_id: entry.id, code, name: entry.name, record };

        let handlers = self.handlers.entry(entry.id).or_default();
        if handlers.is_empty() {
            debug!(id = ?entry.id, "no handlers registered");
        }
        for (n, handler) in handlers.iter_mut().enumerate() {
            if let Err(e) = guarded(|| handler(&decoded)) {
                report(Fault::HandlerFailure, entry.name, frame, &e);
                debug!(handler = n, "skipping remaining handlers for this frame");
                return Dispatch::Rejected(Fault::HandlerFailure);
            }
        }
        debug!(id = ?entry.id, "finished handling command");
        Dispatch::Delivered(handlers.len())
    }
}

/// Run a fallible callback, turning a panic into an error.
fn guarded<T>(f: impl FnOnce() -> std::result::Result<T, BoxError>) -> std::result::Result<T, BoxError> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(panic_message(payload).into()))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

fn report(fault: Fault, name: &str, frame: &[u8], err: &BoxError) {
    error!(%fault, command = name, frame = %hex_preview(frame), "problem handling command: {err}");
    let mut source = std::error::Error::source(err.as_ref());
    while let Some(cause) = source {
        debug!("caused by: {cause}");
        source = cause.source();
    }
}
