//! Song player
//!
//! A [`Player`] is driven from two sides. The control API (`play`, `stop`,
//! `seek`, `set_tempo`...) only writes atomics in [`TransportState`] and sends
//! commands over a channel. The time-driven context, either the system timer
//! thread or the audio thread through [`PlayerClock`], runs one step per call:
//! it drains the commands, applies pending requests and dispatches every event
//! that is due.

use super::playlist::PlaylistItem;
use super::tempo::{
    self, clamp_tempo, is_valid_multiplier, msec_per_tick, SyncMode, Tempo, DEFAULT_TEMPO,
};
use super::timing::{SampleTimer, SystemTimer, TimingSource};
use super::track::Track;
use crate::config::Settings;
use crate::midi::{MidiEvent, MidiFile, CHANNEL_COUNT};
use crate::state::{PlayerStatus, TransportState};
use crate::synth::{Synth, SynthError};
use crossbeam::channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, trace, warn};
use std::error::Error;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

/// Receives every event the player dispatches, in place of the synth
pub type EventCallback = Box<dyn FnMut(&MidiEvent) -> Result<(), SynthError> + Send>;

/// Receives the current tick whenever it changes
pub type TickCallback = Box<dyn FnMut(u64) + Send>;

/// Error type for player operations
#[derive(Debug)]
pub enum PlayerError {
    InvalidTempo(f64),
    InvalidMultiplier(f64),
    InvalidLoopCount(i32),
    SeekOutOfRange { tick: u64, total: u64 },
    SeekPending,
    EmptyPlaylist,
    InvalidTransition(PlayerStatus),
    Config(::config::ConfigError),
    Timer(io::Error),
}

impl fmt::Display for PlayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerError::InvalidTempo(value) => write!(f, "Tempo {} is out of range", value),
            PlayerError::InvalidMultiplier(value) => {
                write!(f, "Tempo multiplier {} is out of range", value)
            }
            PlayerError::InvalidLoopCount(count) => write!(f, "Invalid loop count {}", count),
            PlayerError::SeekOutOfRange { tick, total } => {
                write!(f, "Cannot seek to tick {}, song has {} ticks", tick, total)
            }
            PlayerError::SeekPending => write!(f, "A seek is already pending"),
            PlayerError::EmptyPlaylist => write!(f, "Playlist is empty"),
            PlayerError::InvalidTransition(status) => {
                write!(f, "Cannot start playback while {}", status)
            }
            PlayerError::Config(err) => write!(f, "Player configuration error: {}", err),
            PlayerError::Timer(err) => write!(f, "Failed to start player timer: {}", err),
        }
    }
}

impl Error for PlayerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PlayerError::Config(err) => Some(err),
            PlayerError::Timer(err) => Some(err),
            _ => None,
        }
    }
}

impl From<::config::ConfigError> for PlayerError {
    fn from(err: ::config::ConfigError) -> Self {
        PlayerError::Config(err)
    }
}

impl From<io::Error> for PlayerError {
    fn from(err: io::Error) -> Self {
        PlayerError::Timer(err)
    }
}

/// Player behaviour taken from the settings
#[derive(Debug, Clone)]
pub struct PlayerOptions {
    pub timing_source: TimingSource,
    /// Send a system reset to the synth whenever a song ends.
    pub reset_synth: bool,
    /// Step period of the system timer.
    pub timer_interval: Duration,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            timing_source: TimingSource::Sample,
            reset_synth: true,
            timer_interval: Duration::from_millis(4),
        }
    }
}

impl PlayerOptions {
    pub fn from_settings(settings: &Settings) -> Result<Self, PlayerError> {
        let source = settings.get_string("player.timing_source")?;
        let timing_source = TimingSource::from_name(&source).ok_or_else(|| {
            ::config::ConfigError::Message(format!(
                "player.timing_source must be \"sample\" or \"system\", got \"{}\"",
                source
            ))
        })?;
        let interval = settings.get_int("player.timer_interval_ms")?.max(1);

        Ok(Self {
            timing_source,
            reset_synth: settings.get_bool("player.reset_synth")?,
            timer_interval: Duration::from_millis(interval as u64),
        })
    }
}

enum Command {
    Enqueue(PlaylistItem),
    EventCallback(Option<EventCallback>),
    TickCallback(Option<TickCallback>),
}

struct PlayerShared {
    state: TransportState,
    commands: Sender<Command>,
    transport: Mutex<Transport>,
    synth: Arc<dyn Synth>,
    sample_timer: SampleTimer,
    options: PlayerOptions,
}

impl PlayerShared {
    /// One tick-processing step. Skipped if another step holds the transport.
    fn step(&self, msec: f64) {
        let Ok(mut transport) = self.transport.try_lock() else {
            trace!("Player step skipped, transport busy");
            return;
        };
        transport.step(msec, self);
    }
}

/// Time-driven state, only touched from inside a step
struct Transport {
    commands: Receiver<Command>,
    playlist: Vec<PlaylistItem>,
    current: Option<usize>,
    next_item: usize,
    tracks: Vec<Track>,
    division: u16,
    msec_per_tick: f64,
    start_ticks: u64,
    cur_ticks: u64,
    start_msec: f64,
    cur_msec: f64,
    begin_msec: f64,
    last_reported_ticks: Option<u64>,
    channel_sounded: [bool; CHANNEL_COUNT],
    event_callback: Option<EventCallback>,
    tick_callback: Option<TickCallback>,
    was_playing: bool,
}

impl Transport {
    fn new(commands: Receiver<Command>) -> Self {
        Self {
            commands,
            playlist: Vec::new(),
            current: None,
            next_item: 0,
            tracks: Vec::new(),
            division: 0,
            msec_per_tick: 1.0,
            start_ticks: 0,
            cur_ticks: 0,
            start_msec: 0.0,
            cur_msec: 0.0,
            begin_msec: 0.0,
            last_reported_ticks: None,
            channel_sounded: [false; CHANNEL_COUNT],
            event_callback: None,
            tick_callback: None,
            was_playing: false,
        }
    }

    fn step(&mut self, msec: f64, shared: &PlayerShared) {
        self.drain_commands();
        self.cur_msec = msec;
        let state = &shared.state;

        match state.status() {
            PlayerStatus::Playing => {}
            PlayerStatus::Stopping => {
                self.silence_sounded(shared.synth.as_ref());
                self.was_playing = false;
                if state.transition(PlayerStatus::Stopping, PlayerStatus::Done) {
                    info!("Playback stopped at tick {}", self.cur_ticks);
                }
                return;
            }
            PlayerStatus::Ready | PlayerStatus::Done => {
                self.was_playing = false;
                return;
            }
        }

        if !self.was_playing {
            // Started or resumed: pick up from where the ticks are now
            self.was_playing = true;
            self.start_ticks = self.cur_ticks;
            self.start_msec = msec;
            self.refresh_tempo(state);
            state.take_tempo_change();
        } else if state.take_tempo_change() {
            // Events already due belong to the old tempo, including file
            // tempo changes that move the anchor themselves.
            if self.current.is_some() && state.pending_seek().is_none() {
                self.dispatch_due(msec, shared);
            }
            self.start_ticks = self.cur_ticks;
            self.start_msec = msec;
            self.refresh_tempo(state);
            debug!(
                "Tempo changed to {:.1} us/quarter (x{})",
                state.active_tempo(),
                state.multiplier()
            );
        }

        self.run(msec, shared);

        if self.last_reported_ticks != Some(self.cur_ticks) {
            self.last_reported_ticks = Some(self.cur_ticks);
            if let Some(callback) = self.tick_callback.as_mut() {
                callback(self.cur_ticks);
            }
        }
        state.set_tick_count(self.cur_ticks);
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Enqueue(item) => {
                    debug!("Queued {}", item);
                    self.playlist.push(item);
                }
                Command::EventCallback(callback) => self.event_callback = callback,
                Command::TickCallback(callback) => self.tick_callback = callback,
            }
        }
    }

    /// Loads, seeks and dispatches. A song is never both loaded and ended
    /// within the same step, so an empty song cannot spin here.
    fn run(&mut self, msec: f64, shared: &PlayerShared) {
        let state = &shared.state;
        let mut reloaded = false;

        loop {
            if self.current.is_none() {
                if !self.load_next(msec, state) {
                    self.finish(state);
                    return;
                }
                reloaded = true;
            }

            if let Some(target) = state.pending_seek() {
                state.clear_seek();
                self.seek_to(target, msec, shared);
            }

            self.dispatch_due(msec, shared);

            if reloaded || !self.tracks.iter().all(Track::is_exhausted) {
                return;
            }
            self.end_of_song(msec, shared);
            reloaded = true;
        }
    }

    fn load_next(&mut self, msec: f64, state: &TransportState) -> bool {
        while self.next_item < self.playlist.len() {
            let index = self.next_item;
            self.next_item += 1;
            match self.playlist[index].load() {
                Ok(file) => {
                    info!("Playing {}", self.playlist[index]);
                    self.start_song(index, file, msec, state);
                    return true;
                }
                Err(err) => warn!("Skipping {}: {}", self.playlist[index], err),
            }
        }
        false
    }

    fn start_song(&mut self, index: usize, file: MidiFile, msec: f64, state: &TransportState) {
        self.division = file.division();
        state.set_division(self.division);
        state.set_total_ticks(file.duration_ticks());
        state.set_song_loaded(true);
        self.tracks = file.into_tracks();
        for track in &self.tracks {
            debug!(
                "Track {} ({}): {} events, {} ticks",
                track.index(),
                track.name().unwrap_or("unnamed"),
                track.len(),
                track.duration_ticks()
            );
        }
        self.current = Some(index);
        self.begin_msec = msec;
        self.reset_position(msec, state);
    }

    /// Back to tick 0 at `msec`, with the song's default tempo.
    fn reset_position(&mut self, msec: f64, state: &TransportState) {
        self.tracks.iter_mut().for_each(Track::rewind);
        self.cur_ticks = 0;
        self.start_ticks = 0;
        self.start_msec = msec;
        state.set_midi_tempo(DEFAULT_TEMPO);
        self.refresh_tempo(state);
    }

    fn end_of_song(&mut self, msec: f64, shared: &PlayerShared) {
        let state = &shared.state;
        debug!(
            "Song ended at tick {} after {:.0} ms",
            self.cur_ticks,
            self.cur_msec - self.begin_msec
        );
        if shared.options.reset_synth {
            if let Err(err) = shared.synth.system_reset() {
                warn!("Synth reset failed: {}", err);
            }
        }

        if state.consume_loop() {
            info!("Looping, {} iterations left", state.loop_count());
            self.begin_msec = msec;
            self.reset_position(msec, state);
        } else {
            self.current = None;
            state.set_song_loaded(false);
        }
    }

    fn finish(&mut self, state: &TransportState) {
        self.current = None;
        self.next_item = 0;
        self.was_playing = false;
        state.set_song_loaded(false);
        if state.transition(PlayerStatus::Playing, PlayerStatus::Done) {
            info!("Playlist finished");
        }
    }

    fn refresh_tempo(&mut self, state: &TransportState) {
        self.msec_per_tick = msec_per_tick(state.active_tempo(), self.division, state.multiplier());
    }

    fn ticks_at(&self, msec: f64) -> u64 {
        let elapsed = (msec - self.start_msec).max(0.0);
        self.start_ticks + (elapsed / self.msec_per_tick).round() as u64
    }

    /// Track holding the earliest pending event; ties go to the lower index.
    fn next_due(&self) -> Option<(usize, u64)> {
        let mut best: Option<(usize, u64)> = None;
        for (index, track) in self.tracks.iter().enumerate() {
            if let Some(tick) = track.next_event_tick() {
                if best.map_or(true, |(_, best_tick)| tick < best_tick) {
                    best = Some((index, tick));
                }
            }
        }
        best
    }

    fn dispatch_due(&mut self, msec: f64, shared: &PlayerShared) {
        let state = &shared.state;
        let mut target = self.ticks_at(msec);

        while let Some((index, tick)) = self.next_due() {
            if tick > target {
                break;
            }
            let tempo = {
                let Some(event) = self.tracks[index].advance() else {
                    break;
                };
                if event.is_end_of_track() {
                    continue;
                }
                dispatch(
                    event,
                    &mut self.event_callback,
                    shared.synth.as_ref(),
                    &mut self.channel_sounded,
                );
                event.tempo_value()
            };

            if let Some(tempo) = tempo {
                state.set_midi_tempo(clamp_tempo(tempo));
                if state.sync_mode() == SyncMode::Internal {
                    // The change happened at `tick`, not now
                    let anchor = tick.max(self.start_ticks);
                    self.start_msec += (anchor - self.start_ticks) as f64 * self.msec_per_tick;
                    self.start_ticks = anchor;
                    self.refresh_tempo(state);
                    target = self.ticks_at(msec);
                    trace!("Tempo {} at tick {}", tempo, tick);
                }
            }
        }

        self.cur_ticks = target;
    }

    fn seek_to(&mut self, target: u64, msec: f64, shared: &PlayerShared) {
        let state = &shared.state;
        info!("Seeking to tick {}", target);

        for channel in 0..CHANNEL_COUNT as u8 {
            if let Err(err) = shared.synth.all_sounds_off(channel) {
                warn!("All sounds off failed on channel {}: {}", channel, err);
            }
        }
        self.channel_sounded = [false; CHANNEL_COUNT];

        if self.cur_ticks > target
            || self
                .tracks
                .iter()
                .any(|track| track.current_tick() > target)
        {
            self.tracks.iter_mut().for_each(Track::rewind);
            state.set_midi_tempo(DEFAULT_TEMPO);
        }

        // Replay state-changing events so controllers, programs and tempo
        // match the new position. Notes before the target are skipped.
        while let Some((index, tick)) = self.next_due() {
            if tick >= target {
                break;
            }
            let Some(event) = self.tracks[index].advance() else {
                break;
            };
            if event.is_note() || event.is_end_of_track() {
                continue;
            }
            if let Some(tempo) = event.tempo_value() {
                state.set_midi_tempo(clamp_tempo(tempo));
            }
            dispatch(
                event,
                &mut self.event_callback,
                shared.synth.as_ref(),
                &mut self.channel_sounded,
            );
        }

        self.cur_ticks = target;
        self.start_ticks = target;
        self.start_msec = msec;
        self.refresh_tempo(state);
        self.last_reported_ticks = None;
    }

    fn silence_sounded(&mut self, synth: &dyn Synth) {
        for (channel, sounded) in self.channel_sounded.iter_mut().enumerate() {
            if std::mem::take(sounded) {
                if let Err(err) = synth.all_notes_off(channel as u8) {
                    warn!("All notes off failed on channel {}: {}", channel, err);
                }
            }
        }
    }
}

fn dispatch(
    event: &MidiEvent,
    callback: &mut Option<EventCallback>,
    synth: &dyn Synth,
    channel_sounded: &mut [bool; CHANNEL_COUNT],
) {
    if event.is_sounding_note_on() {
        channel_sounded[usize::from(event.channel())] = true;
    }
    let result = match callback.as_mut() {
        Some(callback) => callback(event),
        None => synth.handle_event(event),
    };
    if let Err(err) = result {
        error!("Failed to dispatch {}: {}", event, err);
    }
}

/// Handle given to the time-driven context
///
/// Every call runs one player step. Use [`PlayerClock::advance`] with a
/// millisecond clock of your own, or [`PlayerClock::process_samples`] from an
/// audio callback.
#[derive(Clone)]
pub struct PlayerClock {
    shared: Arc<PlayerShared>,
}

impl PlayerClock {
    /// Runs a step at `msec` milliseconds.
    pub fn advance(&self, msec: f64) {
        self.shared.step(msec);
    }

    /// Counts `frames` rendered frames and runs a step at the start of the
    /// block.
    pub fn process_samples(&self, frames: usize) {
        let msec = self.shared.sample_timer.advance(frames);
        self.shared.step(msec);
    }
}

/// MIDI file player
pub struct Player {
    shared: Arc<PlayerShared>,
    timer: Option<SystemTimer>,
}

impl Player {
    pub fn new(synth: Arc<dyn Synth>, options: PlayerOptions) -> Result<Self, PlayerError> {
        let (commands, receiver) = unbounded();
        let shared = Arc::new(PlayerShared {
            state: TransportState::new(),
            commands,
            transport: Mutex::new(Transport::new(receiver)),
            sample_timer: SampleTimer::new(synth.sample_rate()),
            synth,
            options,
        });

        let timer = match shared.options.timing_source {
            TimingSource::System => {
                let weak: Weak<PlayerShared> = Arc::downgrade(&shared);
                let timer = SystemTimer::start(shared.options.timer_interval, move |msec| {
                    match weak.upgrade() {
                        Some(shared) => {
                            shared.step(msec);
                            true
                        }
                        None => false,
                    }
                })?;
                Some(timer)
            }
            TimingSource::Sample => None,
        };

        info!(
            "Player created ({:?} timing)",
            shared.options.timing_source
        );
        Ok(Self { shared, timer })
    }

    pub fn options(&self) -> &PlayerOptions {
        &self.shared.options
    }

    /// Handle for driving the player from an external clock.
    pub fn clock(&self) -> PlayerClock {
        PlayerClock {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Appends a song to the playlist.
    pub fn add(&self, item: PlaylistItem) {
        self.send(Command::Enqueue(item));
        self.shared.state.add_queued_item();
    }

    pub fn add_file<P: AsRef<Path>>(&self, path: P) {
        self.add(PlaylistItem::File(path.as_ref().to_path_buf()));
    }

    pub fn add_mem(&self, bytes: impl Into<Vec<u8>>) {
        self.add(PlaylistItem::Memory(bytes.into()));
    }

    /// Starts playback, or resumes it after a stop. After the playlist has
    /// finished, starts it over from the first song.
    pub fn play(&self) -> Result<(), PlayerError> {
        let state = &self.shared.state;
        match state.status() {
            PlayerStatus::Playing => Ok(()),
            PlayerStatus::Stopping => Err(PlayerError::InvalidTransition(PlayerStatus::Stopping)),
            from @ (PlayerStatus::Ready | PlayerStatus::Done) => {
                if state.queued_items() == 0 {
                    return Err(PlayerError::EmptyPlaylist);
                }
                if state.transition(from, PlayerStatus::Playing) {
                    info!("Playback started");
                    Ok(())
                } else {
                    Err(PlayerError::InvalidTransition(state.status()))
                }
            }
        }
    }

    /// Requests a stop. The next step silences the sounding channels and
    /// moves the player to `Done`.
    pub fn stop(&self) {
        if self
            .shared
            .state
            .transition(PlayerStatus::Playing, PlayerStatus::Stopping)
        {
            info!("Stop requested");
        }
    }

    /// Moves playback to `tick` at the next step. Until a step has loaded
    /// the song the target cannot be checked against its length.
    pub fn seek(&self, tick: u64) -> Result<(), PlayerError> {
        let state = &self.shared.state;
        let status = state.status();
        if state.is_song_loaded() {
            let total = state.get_total_ticks();
            if tick > total {
                return Err(PlayerError::SeekOutOfRange { tick, total });
            }
        }
        if status == PlayerStatus::Playing && state.pending_seek().is_some() {
            return Err(PlayerError::SeekPending);
        }
        state.set_seek(tick);
        Ok(())
    }

    /// Selects the tempo source and speed multiplier. Takes effect at the
    /// next step.
    pub fn set_tempo(&self, tempo: Tempo, multiplier: f64) -> Result<(), PlayerError> {
        if !is_valid_multiplier(multiplier) {
            return Err(PlayerError::InvalidMultiplier(multiplier));
        }
        let (mode, external) = tempo
            .resolve()
            .ok_or(PlayerError::InvalidTempo(tempo.value()))?;
        self.shared.state.set_tempo(mode, external, multiplier);
        debug!("Tempo set to {:?} x{}", tempo, multiplier);
        Ok(())
    }

    /// Number of extra iterations of the current song; -1 loops forever.
    pub fn set_loop(&self, count: i32) -> Result<(), PlayerError> {
        if count < -1 {
            return Err(PlayerError::InvalidLoopCount(count));
        }
        self.shared.state.set_loop_count(count);
        Ok(())
    }

    /// Routes events to `callback` instead of the synth.
    pub fn set_playback_callback<F>(&self, callback: F)
    where
        F: FnMut(&MidiEvent) -> Result<(), SynthError> + Send + 'static,
    {
        self.send(Command::EventCallback(Some(Box::new(callback))));
    }

    pub fn clear_playback_callback(&self) {
        self.send(Command::EventCallback(None));
    }

    pub fn set_tick_callback<F>(&self, callback: F)
    where
        F: FnMut(u64) + Send + 'static,
    {
        self.send(Command::TickCallback(Some(Box::new(callback))));
    }

    fn send(&self, command: Command) {
        // The receiver lives as long as `shared`, which we hold
        if self.shared.commands.send(command).is_err() {
            error!("Player command channel closed");
        }
    }

    pub fn status(&self) -> PlayerStatus {
        self.shared.state.status()
    }

    pub fn current_tick(&self) -> u64 {
        self.shared.state.get_tick_count()
    }

    pub fn total_ticks(&self) -> u64 {
        self.shared.state.get_total_ticks()
    }

    pub fn loop_count(&self) -> i32 {
        self.shared.state.loop_count()
    }

    /// Ticks per quarter note of the current song, 0 before the first load.
    pub fn division(&self) -> u16 {
        self.shared.state.division()
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.shared.state.sync_mode()
    }

    /// Effective tempo in µs per quarter note, multiplier included.
    pub fn midi_tempo(&self) -> u32 {
        let state = &self.shared.state;
        (state.active_tempo() / state.multiplier()).round() as u32
    }

    pub fn bpm(&self) -> f64 {
        let state = &self.shared.state;
        tempo::bpm_from_tempo(state.active_tempo()) * state.multiplier()
    }

    /// Blocks until playback is neither playing nor stopping.
    pub fn join(&self) {
        while self.status().is_active() {
            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if let Some(mut timer) = self.timer.take() {
            timer.stop();
        }
    }
}
