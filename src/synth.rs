//! Boundary to the synthesis engine
//!
//! The player and the live input path only ever talk to a [`Synth`]. The
//! engine is shared between the control thread, the time-driven context and
//! the audio thread, so every method takes `&self`.

use crate::midi::MidiEvent;
use log::{debug, trace};
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Error raised by a synthesis engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthError(pub String);

impl SynthError {
    pub fn new(msg: impl Into<String>) -> Self {
        SynthError(msg.into())
    }
}

impl fmt::Display for SynthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Synth error: {}", self.0)
    }
}

impl Error for SynthError {}

pub type Result<T> = std::result::Result<T, SynthError>;

/// Trait implemented by synthesis engines
pub trait Synth: Send + Sync {
    /// Applies a decoded event (note, controller, program, sysex...).
    fn handle_event(&self, event: &MidiEvent) -> Result<()>;

    /// Releases every note playing on `channel`.
    fn all_notes_off(&self, channel: u8) -> Result<()>;

    /// Silences `channel` immediately, release phases included.
    fn all_sounds_off(&self, channel: u8) -> Result<()> {
        self.all_notes_off(channel)
    }

    /// Returns every channel to its power-on state.
    fn system_reset(&self) -> Result<()>;

    fn sample_rate(&self) -> f64;

    /// Renders `frames` frames into the effects and dry buffers.
    fn process(&self, frames: usize, fx: &mut [&mut [f32]], out: &mut [&mut [f32]]) -> Result<()>;
}

/// Engine that renders silence and only logs what it receives
#[derive(Debug)]
pub struct NullSynth {
    sample_rate: f64,
    events: AtomicU64,
    frames: AtomicU64,
}

impl NullSynth {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            events: AtomicU64::new(0),
            frames: AtomicU64::new(0),
        }
    }

    /// Number of events received so far.
    pub fn event_count(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    /// Number of frames rendered so far.
    pub fn rendered_frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl Synth for NullSynth {
    fn handle_event(&self, event: &MidiEvent) -> Result<()> {
        trace!("NullSynth event: {}", event);
        self.events.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn all_notes_off(&self, channel: u8) -> Result<()> {
        debug!("NullSynth all notes off: ch={}", channel);
        Ok(())
    }

    fn system_reset(&self) -> Result<()> {
        debug!("NullSynth system reset");
        Ok(())
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn process(&self, frames: usize, _fx: &mut [&mut [f32]], out: &mut [&mut [f32]]) -> Result<()> {
        for buffer in out.iter_mut() {
            let len = frames.min(buffer.len());
            buffer[..len].fill(0.0);
        }
        self.frames.fetch_add(frames as u64, Ordering::Relaxed);
        Ok(())
    }
}
