//! Transport functionality
//!
//! This module plays MIDI songs against a clock:
//! - [`Track`] holds decoded events behind a play cursor
//! - [`Player`] merges tracks in tick order and walks a playlist
//! - [`SystemTimer`] and [`SampleTimer`] drive the player's steps
//!
//! Tick time follows the song's tempo: one tick lasts
//! `tempo / division / 1000 / multiplier` milliseconds.

mod player;
mod playlist;
pub mod tempo;
mod timing;
mod track;

pub use player::{
    EventCallback, Player, PlayerClock, PlayerError, PlayerOptions, TickCallback,
};
pub use playlist::PlaylistItem;
pub use tempo::{SyncMode, Tempo};
pub use timing::{SampleTimer, SystemTimer, TimingSource};
pub use track::Track;
