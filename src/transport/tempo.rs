//! Tempo model shared by the player and its clients

/// Tempo in effect until the first Set-Tempo event, in µs per quarter note
pub const DEFAULT_TEMPO: u32 = 500_000;

pub const MIN_TEMPO_VALUE: f64 = 1.0;
pub const MAX_TEMPO_VALUE: f64 = 60_000_000.0;
pub const MIN_TEMPO_MULTIPLIER: f64 = 0.001;
pub const MAX_TEMPO_MULTIPLIER: f64 = 1000.0;

/// Which tempo drives tick time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Tempo follows the Set-Tempo events of the song.
    Internal,
    /// Tempo is fixed by the caller and file tempo events are ignored.
    External,
}

/// A tempo request made through the player API
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tempo {
    /// Follow the song's own tempo events.
    Internal,
    /// Fixed tempo in beats per minute.
    ExternalBpm(f64),
    /// Fixed tempo in microseconds per quarter note.
    ExternalMidi(f64),
}

impl Tempo {
    /// Resolves the request to a sync mode and an external tempo in µs per
    /// quarter, or `None` if the value is out of range.
    pub(crate) fn resolve(self) -> Option<(SyncMode, Option<f64>)> {
        match self {
            Tempo::Internal => Some((SyncMode::Internal, None)),
            Tempo::ExternalBpm(bpm) if in_range(bpm) => {
                Some((SyncMode::External, Some(60_000_000.0 / bpm)))
            }
            Tempo::ExternalMidi(micros) if in_range(micros) => {
                Some((SyncMode::External, Some(micros)))
            }
            _ => None,
        }
    }

    pub(crate) fn value(self) -> f64 {
        match self {
            Tempo::Internal => 0.0,
            Tempo::ExternalBpm(value) | Tempo::ExternalMidi(value) => value,
        }
    }
}

fn in_range(value: f64) -> bool {
    value.is_finite() && (MIN_TEMPO_VALUE..=MAX_TEMPO_VALUE).contains(&value)
}

pub fn is_valid_multiplier(multiplier: f64) -> bool {
    multiplier.is_finite() && (MIN_TEMPO_MULTIPLIER..=MAX_TEMPO_MULTIPLIER).contains(&multiplier)
}

/// Milliseconds per MIDI tick.
pub fn msec_per_tick(tempo_us: f64, division: u16, multiplier: f64) -> f64 {
    tempo_us / f64::from(division.max(1)) / 1000.0 / multiplier
}

/// Beats per minute for a tempo in µs per quarter note.
pub fn bpm_from_tempo(tempo_us: f64) -> f64 {
    60_000_000.0 / tempo_us
}

/// Brings a tempo read from a file into the accepted range.
pub fn clamp_tempo(tempo_us: u32) -> u32 {
    (tempo_us as f64).clamp(MIN_TEMPO_VALUE, MAX_TEMPO_VALUE) as u32
}
