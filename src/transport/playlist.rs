use crate::midi::{MidiFile, MidiFileError};
use std::fmt;
use std::path::PathBuf;

/// One song queued on the player
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistItem {
    /// Path to a Standard MIDI File, read when the song comes up.
    File(PathBuf),
    /// A complete Standard MIDI File held in memory.
    Memory(Vec<u8>),
}

impl PlaylistItem {
    pub fn load(&self) -> Result<MidiFile, MidiFileError> {
        match self {
            PlaylistItem::File(path) => MidiFile::load(path),
            PlaylistItem::Memory(bytes) => MidiFile::from_bytes(bytes),
        }
    }
}

impl fmt::Display for PlaylistItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaylistItem::File(path) => write!(f, "{}", path.display()),
            PlaylistItem::Memory(bytes) => write!(f, "<memory, {} bytes>", bytes.len()),
        }
    }
}
