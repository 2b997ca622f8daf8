//! MIDI decoding and I/O
//!
//! This module turns raw MIDI bytes into [`MidiEvent`]s:
//! - [`MidiEventParser`] decodes live wire streams and file track data
//! - [`MidiFile`] loads Standard MIDI Files into tracks
//! - [`LiveInput`] decodes bytes arriving from an input port on its own thread
//! - `MidiOutSynth` (feature `midir`) forwards events to an output port

mod event;
mod file;
pub mod input;
#[cfg(feature = "midir")]
pub mod output;
mod parser;

pub use event::*;
pub use file::{is_midi_file, MidiFile, MidiFileError, MAX_TRACKS};
pub use input::{LiveInput, LiveInputError};
#[cfg(feature = "midir")]
pub use output::MidiOutSynth;
pub use parser::{MidiEventParser, ParseMode, DEFAULT_SCRATCH_CAPACITY};
