//! Open the panel's serial link, ask for a state refresh and print every
//! frame the panel sends until the process is stopped.
//!
//! Usage: cargo run --example monitor -- /dev/ttyUSB0
//!
//! Set `RUST_LOG=alarmlink=debug` to watch the link-level traffic.

use std::process;

use alarmlink::{BoxError, CommandCode, CommandTable, Engine, EngineConfig, frame};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Cmd {
    PanelType,
    ZoneStatus,
    ArmingLevel,
    TouchpadDisplay,
}

/// Payload bytes between the command code and the checksum.
fn payload(frame: &[u8]) -> Result<Vec<u8>, BoxError> {
    match frame.len() {
        n if n >= 3 => Ok(frame[2..n - 1].to_vec()),
        n => Err(format!("frame of {n} bytes has no payload").into()),
    }
}

fn table() -> CommandTable<Cmd, Vec<u8>> {
    CommandTable::new()
        .with(CommandCode::Single(0x01), Cmd::PanelType, "Panel Type", Some(payload))
        .with(CommandCode::Single(0x21), Cmd::ZoneStatus, "Zone Status", Some(payload))
        .with(CommandCode::Pair(0x22, 0x01), Cmd::ArmingLevel, "Arming Level", Some(payload))
        .with(CommandCode::Pair(0x22, 0x09), Cmd::TouchpadDisplay, "Touchpad Display", None)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: monitor <serial-device>");
        process::exit(2);
    };

    let mut engine = match Engine::open(&path, table(), EngineConfig::default()) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    for id in [Cmd::PanelType, Cmd::ZoneStatus, Cmd::ArmingLevel] {
        if let Err(e) = engine.register_handler(id, |d| {
            println!("{:<14} {} | {}", d.name, d.code, hex::encode_upper(&d.record));
            Ok(())
        }) {
            eprintln!("{e}");
            process::exit(1);
        }
    }

    // Dynamic data refresh request.
    let refresh = frame::with_length(&[0x20]).and_then(|f| engine.enqueue_outbound(f));
    if let Err(e) = refresh {
        eprintln!("{e}");
        process::exit(1);
    }

    if let Err(e) = engine.run() {
        eprintln!("{e}");
        process::exit(1);
    }
}
