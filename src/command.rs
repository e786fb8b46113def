//! Command lookup table supplied by the payload codec.
//!
//! The driver does not understand payloads. A codec hands it a table keyed
//! by one- or two-byte command codes, each entry naming the command and
//! optionally providing a decode function.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use crate::error::BoxError;
use crate::frame;

/// Identifier a codec assigns to a command; handlers are registered by it.
pub trait CommandId: Copy + Eq + Hash + fmt::Debug + Send + 'static {}

impl<T: Copy + Eq + Hash + fmt::Debug + Send + 'static> CommandId for T {}

/// Decode a full frame (`[LEN, payload..., CS]`) into a record.
pub type DecodeFn<R> = fn(&[u8]) -> Result<R, BoxError>;

/// Wire command code: the byte after the length, or that byte and the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCode {
    Single(u8),
    Pair(u8, u8),
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(a) => write!(f, "0x{a:02X}"),
            Self::Pair(a, b) => write!(f, "0x{a:02X}/0x{b:02X}"),
        }
    }
}

pub struct CommandEntry<Id, R> {
    pub id: Id,
    pub name: &'static str,
    /// `None` for commands that are recognised but deliberately not parsed.
    pub decode: Option<DecodeFn<R>>,
}

impl<Id: fmt::Debug, R> fmt::Debug for CommandEntry<Id, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("decode", &self.decode.is_some())
            .finish()
    }
}

/// A decoded frame tagged with the command it resolved to.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<Id, R> {
    pub command_id: Id,
    pub code: CommandCode,
    pub name: &'static str,
    pub record: R,
}

pub struct CommandTable<Id, R> {
    entries: HashMap<CommandCode, CommandEntry<Id, R>>,
}

impl<Id: CommandId, R> CommandTable<Id, R> {
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Add an entry, replacing any previous one for `code`.
    pub fn insert(&mut self, code: CommandCode, id: Id, name: &'static str, decode: Option<DecodeFn<R>>) {
        self.entries.insert(code, CommandEntry { id, name, decode });
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, code: CommandCode, id: Id, name: &'static str, decode: Option<DecodeFn<R>>) -> Self {
        self.insert(code, id, name, decode);
        self
    }

    pub fn get(&self, code: CommandCode) -> Option<&CommandEntry<Id, R>> {
        self.entries.get(&code)
    }

    /// Find the entry for a frame: the single command byte first, then the
    /// two-byte pair when the frame carries one.
    pub fn resolve(&self, frame: &[u8]) -> Option<(CommandCode, &CommandEntry<Id, R>)> {
        let (first, second) = frame::command_bytes(frame)?;
        let single = CommandCode::Single(first);
        if let Some(entry) = self.entries.get(&single) {
            return Some((single, entry));
        }
        let pair = CommandCode::Pair(first, second?);
        self.entries.get(&pair).map(|entry| (pair, entry))
    }

    /// Every command id in the table (duplicates possible when several
    /// codes share an id).
    pub fn ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.entries.values().map(|e| e.id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<Id: CommandId, R> Default for CommandTable<Id, R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Cmd {
        PanelType,
        ZoneStatus,
        ArmLevel,
    }

    fn first_payload_byte(frame: &[u8]) -> Result<u8, BoxError> {
        frame.get(2).copied().ok_or_else(|| "missing byte".into())
    }

    fn table() -> CommandTable<Cmd, u8> {
        CommandTable::new()
            .with(CommandCode::Single(0x01), Cmd::PanelType, "Panel Type", Some(first_payload_byte))
            .with(CommandCode::Single(0x21), Cmd::ZoneStatus, "Zone Status", None)
            .with(CommandCode::Pair(0x22, 0x01), Cmd::ArmLevel, "Arm Level", Some(first_payload_byte))
    }

    #[test]
    fn resolves_single_byte() {
        let t = table();
        let (code, entry) = t.resolve(&[0x03, 0x01, 0x14, 0x18]).unwrap();
        assert_eq!(code, CommandCode::Single(0x01));
        assert_eq!(entry.id, Cmd::PanelType);
    }

    #[test]
    fn falls_back_to_pair() {
        let t = table();
        let (code, entry) = t.resolve(&[0x04, 0x22, 0x01, 0x02, 0x29]).unwrap();
        assert_eq!(code, CommandCode::Pair(0x22, 0x01));
        assert_eq!(entry.id, Cmd::ArmLevel);
    }

    #[test]
    fn pair_needs_room_before_checksum() {
        // [LEN, 0x22, CS]: the byte after 0x22 is the checksum, not a command byte.
        assert!(table().resolve(&[0x02, 0x22, 0x01]).is_none());
    }

    #[test]
    fn unknown_code() {
        assert!(table().resolve(&[0x02, 0x7F, 0x81]).is_none());
        assert!(table().resolve(&[0x00]).is_none());
    }

    #[test]
    fn ids_cover_table() {
        let t = table();
        let mut ids: Vec<_> = t.ids().collect();
        ids.sort_by_key(|id| format!("{id:?}"));
        assert_eq!(ids, vec![Cmd::ArmLevel, Cmd::PanelType, Cmd::ZoneStatus]);
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn code_display() {
        assert_eq!(CommandCode::Single(0x21).to_string(), "0x21");
        assert_eq!(CommandCode::Pair(0x22, 0x01).to_string(), "0x22/0x01");
    }
}
