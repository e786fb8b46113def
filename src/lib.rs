pub mod channel;
pub mod checksum;
pub mod codec;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod frame;
pub mod reader;
pub mod transmit;

pub use channel::{ByteChannel, SerialChannel};
pub use command::{CommandCode, CommandId, CommandTable, Decoded, DecodeFn};
pub use config::EngineConfig;
pub use dispatch::HandlerRegistry;
pub use engine::{Engine, EngineHandle, Tick};
pub use error::{BoxError, Error, Fault, Result};
pub use frame::Control;
pub use reader::FrameReader;
pub use transmit::TransmitManager;
