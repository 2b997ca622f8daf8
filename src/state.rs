use crate::transport::tempo::{
    SyncMode, DEFAULT_TEMPO, MAX_TEMPO_MULTIPLIER, MIN_TEMPO_MULTIPLIER,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU32, AtomicU64, AtomicU8, Ordering};

/// Lifecycle of the player
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    Ready = 0,
    Playing = 1,
    Stopping = 2,
    Done = 3,
}

impl PlayerStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PlayerStatus::Ready,
            1 => PlayerStatus::Playing,
            2 => PlayerStatus::Stopping,
            _ => PlayerStatus::Done,
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, PlayerStatus::Playing | PlayerStatus::Stopping)
    }
}

impl fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlayerStatus::Ready => "ready",
            PlayerStatus::Playing => "playing",
            PlayerStatus::Stopping => "stopping",
            PlayerStatus::Done => "done",
        };
        f.write_str(name)
    }
}

const NO_SEEK: i64 = -1;

/// Scalars shared between the control API and the time-driven context
///
/// The control side stores with `Release`, the time-driven step loads with
/// `Acquire`. Status changes go through compare-and-swap so the two sides
/// never overwrite each other's transition.
pub struct TransportState {
    status: AtomicU8,
    seek_ticks: AtomicI64,
    cur_ticks: AtomicU64,
    total_ticks: AtomicU64,
    song_loaded: AtomicBool,
    loop_count: AtomicI32,
    queued_items: AtomicU32,
    division: AtomicU32,
    midi_tempo: AtomicU32,
    external_tempo: AtomicU64,
    multiplier: AtomicU64,
    sync_mode: AtomicU8,
    tempo_dirty: AtomicBool,
}

impl Default for TransportState {
    fn default() -> Self {
        Self {
            status: AtomicU8::new(PlayerStatus::Ready as u8),
            seek_ticks: AtomicI64::new(NO_SEEK),
            cur_ticks: AtomicU64::new(0),
            total_ticks: AtomicU64::new(0),
            song_loaded: AtomicBool::new(false),
            loop_count: AtomicI32::new(0),
            queued_items: AtomicU32::new(0),
            division: AtomicU32::new(0),
            midi_tempo: AtomicU32::new(DEFAULT_TEMPO),
            external_tempo: AtomicU64::new(f64::from(DEFAULT_TEMPO).to_bits()),
            multiplier: AtomicU64::new(1.0f64.to_bits()),
            sync_mode: AtomicU8::new(SyncMode::Internal as u8),
            tempo_dirty: AtomicBool::new(false),
        }
    }
}

impl TransportState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> PlayerStatus {
        PlayerStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Moves from `from` to `to`; fails if another transition got there first.
    pub fn transition(&self, from: PlayerStatus, to: PlayerStatus) -> bool {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn set_seek(&self, tick: u64) {
        self.seek_ticks
            .store(i64::try_from(tick).unwrap_or(i64::MAX), Ordering::Release);
    }

    pub fn pending_seek(&self) -> Option<u64> {
        u64::try_from(self.seek_ticks.load(Ordering::Acquire)).ok()
    }

    pub fn clear_seek(&self) {
        self.seek_ticks.store(NO_SEEK, Ordering::Release);
    }

    pub fn set_tick_count(&self, ticks: u64) {
        self.cur_ticks.store(ticks, Ordering::Release);
    }

    pub fn get_tick_count(&self) -> u64 {
        self.cur_ticks.load(Ordering::Acquire)
    }

    pub fn set_total_ticks(&self, ticks: u64) {
        self.total_ticks.store(ticks, Ordering::Release);
    }

    pub fn get_total_ticks(&self) -> u64 {
        self.total_ticks.load(Ordering::Acquire)
    }

    /// Whether a step has loaded the current playlist item. `total_ticks`
    /// only describes the current song while this is set.
    pub fn set_song_loaded(&self, loaded: bool) {
        self.song_loaded.store(loaded, Ordering::Release);
    }

    pub fn is_song_loaded(&self) -> bool {
        self.song_loaded.load(Ordering::Acquire)
    }

    pub fn set_loop_count(&self, count: i32) {
        self.loop_count.store(count, Ordering::Release);
    }

    pub fn loop_count(&self) -> i32 {
        self.loop_count.load(Ordering::Acquire)
    }

    /// Uses up one loop iteration. Returns false when none remain.
    pub fn consume_loop(&self) -> bool {
        self.loop_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| match count {
                0 => None,
                -1 => Some(-1),
                n => Some(n - 1),
            })
            .is_ok()
    }

    pub fn add_queued_item(&self) {
        self.queued_items.fetch_add(1, Ordering::AcqRel);
    }

    pub fn queued_items(&self) -> u32 {
        self.queued_items.load(Ordering::Acquire)
    }

    pub fn set_division(&self, division: u16) {
        self.division.store(u32::from(division), Ordering::Release);
    }

    pub fn division(&self) -> u16 {
        self.division.load(Ordering::Acquire) as u16
    }

    /// Tempo taken from the song's Set-Tempo events, in µs per quarter.
    pub fn set_midi_tempo(&self, tempo_us: u32) {
        self.midi_tempo.store(tempo_us, Ordering::Release);
    }

    pub fn midi_tempo(&self) -> u32 {
        self.midi_tempo.load(Ordering::Acquire)
    }

    /// Records an API tempo change for the next step to pick up.
    pub fn set_tempo(&self, mode: SyncMode, external_tempo: Option<f64>, multiplier: f64) {
        if let Some(tempo) = external_tempo {
            self.external_tempo.store(tempo.to_bits(), Ordering::Release);
        }
        self.sync_mode.store(mode as u8, Ordering::Release);
        self.multiplier.store(
            multiplier
                .clamp(MIN_TEMPO_MULTIPLIER, MAX_TEMPO_MULTIPLIER)
                .to_bits(),
            Ordering::Release,
        );
        self.tempo_dirty.store(true, Ordering::Release);
    }

    pub fn take_tempo_change(&self) -> bool {
        self.tempo_dirty.swap(false, Ordering::AcqRel)
    }

    pub fn external_tempo(&self) -> f64 {
        f64::from_bits(self.external_tempo.load(Ordering::Acquire))
    }

    pub fn multiplier(&self) -> f64 {
        f64::from_bits(self.multiplier.load(Ordering::Acquire))
    }

    pub fn sync_mode(&self) -> SyncMode {
        match self.sync_mode.load(Ordering::Acquire) {
            value if value == SyncMode::External as u8 => SyncMode::External,
            _ => SyncMode::Internal,
        }
    }

    pub fn is_sync_external(&self) -> bool {
        self.sync_mode() == SyncMode::External
    }

    /// Tempo that currently drives tick time, in µs per quarter.
    pub fn active_tempo(&self) -> f64 {
        if self.is_sync_external() {
            self.external_tempo()
        } else {
            f64::from(self.midi_tempo())
        }
    }
}
