//! MIDI file sequencer
//!
//! Decodes MIDI byte streams and Standard MIDI Files, plays playlists of
//! songs against a [`Synth`] with sample-accurate or wall-clock timing, and
//! renders the synth through a pluggable audio driver.

pub mod audio;
pub mod cli;
pub mod config;
pub mod logging;
pub mod midi;
pub mod state;
pub mod synth;
pub mod transport;
pub mod ui;

pub use audio::{AudioCallback, AudioDriver, AudioDriverRegistry, AudioError, RenderSource};
pub use cli::{validate_device, validate_driver, Args};
pub use config::Settings;
pub use midi::{EventType, MidiEvent, MidiEventParser, MidiFile, MidiFileError, ParseMode};
pub use state::{PlayerStatus, TransportState};
pub use synth::{NullSynth, Synth, SynthError};
pub use transport::{Player, PlayerClock, PlayerError, PlayerOptions, PlaylistItem, Tempo};
