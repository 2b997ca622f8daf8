//! Audio output
//!
//! Drivers own a real-time thread that calls an [`AudioCallback`] once per
//! period. The callback fills a set of effects buffers and a pair of dry
//! buffers; the driver then hands the dry pair to its device.
//!
//! Drivers are picked by name through the [`AudioDriverRegistry`].

mod file;
mod null;
mod registry;

#[cfg(feature = "cpal")]
mod cpal_driver;

pub use registry::{AudioBackend, AudioDriver, AudioDriverRegistry};

use crate::synth::{Synth, SynthError};
use crate::transport::PlayerClock;
use log::{debug, error};
use std::error::Error;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Effects buffers handed to every callback
pub const FX_BUFFERS: usize = 4;
/// Dry (left, right) buffers handed to every callback
pub const OUT_BUFFERS: usize = 2;

/// Error type for audio drivers
#[derive(Debug)]
pub enum AudioError {
    /// No backend with this name is compiled in
    UnknownDriver(String),
    /// The backend lacks a capability the caller asked for
    Unsupported {
        driver: String,
        capability: &'static str,
    },
    Settings(::config::ConfigError),
    Io(io::Error),
    /// The device or host API refused the request
    Backend(String),
    /// A render callback failed
    Callback(String),
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioError::UnknownDriver(name) => write!(f, "Unknown audio driver '{}'", name),
            AudioError::Unsupported { driver, capability } => {
                write!(f, "Audio driver '{}' does not support {}", driver, capability)
            }
            AudioError::Settings(err) => write!(f, "Audio settings error: {}", err),
            AudioError::Io(err) => write!(f, "Audio I/O error: {}", err),
            AudioError::Backend(msg) => write!(f, "Audio backend error: {}", msg),
            AudioError::Callback(msg) => write!(f, "Audio callback error: {}", msg),
        }
    }
}

impl Error for AudioError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AudioError::Settings(err) => Some(err),
            AudioError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<::config::ConfigError> for AudioError {
    fn from(err: ::config::ConfigError) -> Self {
        AudioError::Settings(err)
    }
}

impl From<io::Error> for AudioError {
    fn from(err: io::Error) -> Self {
        AudioError::Io(err)
    }
}

impl From<SynthError> for AudioError {
    fn from(err: SynthError) -> Self {
        AudioError::Callback(err.to_string())
    }
}

/// Renders one period of audio
///
/// `fx` and `out` arrive zeroed, `frames` samples long each, and are only
/// valid for the duration of the call.
pub trait AudioCallback: Send {
    fn render(
        &mut self,
        frames: usize,
        fx: &mut [&mut [f32]],
        out: &mut [&mut [f32]],
    ) -> Result<(), AudioError>;
}

impl<F> AudioCallback for F
where
    F: FnMut(usize, &mut [&mut [f32]], &mut [&mut [f32]]) -> Result<(), AudioError> + Send,
{
    fn render(
        &mut self,
        frames: usize,
        fx: &mut [&mut [f32]],
        out: &mut [&mut [f32]],
    ) -> Result<(), AudioError> {
        self(frames, fx, out)
    }
}

/// Renders a synth
pub struct SynthCallback {
    synth: Arc<dyn Synth>,
}

impl SynthCallback {
    pub fn new(synth: Arc<dyn Synth>) -> Self {
        Self { synth }
    }
}

impl AudioCallback for SynthCallback {
    fn render(
        &mut self,
        frames: usize,
        fx: &mut [&mut [f32]],
        out: &mut [&mut [f32]],
    ) -> Result<(), AudioError> {
        Ok(self.synth.process(frames, fx, out)?)
    }
}

/// Advances the player by each period's frames, then renders the synth
///
/// Timing follows the rendered sample count. Each step runs at the start time
/// of its period, so an event due inside a period is dispatched at the start
/// of the next one.
pub struct PlayerRenderCallback {
    clock: PlayerClock,
    synth: Arc<dyn Synth>,
}

impl PlayerRenderCallback {
    pub fn new(clock: PlayerClock, synth: Arc<dyn Synth>) -> Self {
        Self { clock, synth }
    }
}

impl AudioCallback for PlayerRenderCallback {
    fn render(
        &mut self,
        frames: usize,
        fx: &mut [&mut [f32]],
        out: &mut [&mut [f32]],
    ) -> Result<(), AudioError> {
        self.clock.process_samples(frames);
        Ok(self.synth.process(frames, fx, out)?)
    }
}

/// Synth wrapper whose rendering also drives a player clock
///
/// Lets drivers that only accept a synth keep the player in step with the
/// audio they produce.
pub struct ClockedSynth {
    synth: Arc<dyn Synth>,
    clock: PlayerClock,
}

impl ClockedSynth {
    pub fn new(synth: Arc<dyn Synth>, clock: PlayerClock) -> Self {
        Self { synth, clock }
    }
}

impl Synth for ClockedSynth {
    fn handle_event(&self, event: &crate::midi::MidiEvent) -> Result<(), SynthError> {
        self.synth.handle_event(event)
    }

    fn all_notes_off(&self, channel: u8) -> Result<(), SynthError> {
        self.synth.all_notes_off(channel)
    }

    fn all_sounds_off(&self, channel: u8) -> Result<(), SynthError> {
        self.synth.all_sounds_off(channel)
    }

    fn system_reset(&self) -> Result<(), SynthError> {
        self.synth.system_reset()
    }

    fn sample_rate(&self) -> f64 {
        self.synth.sample_rate()
    }

    fn process(
        &self,
        frames: usize,
        fx: &mut [&mut [f32]],
        out: &mut [&mut [f32]],
    ) -> Result<(), SynthError> {
        self.clock.process_samples(frames);
        self.synth.process(frames, fx, out)
    }
}

/// What a driver renders
pub enum RenderSource {
    /// The host owns the synth and the driver renders it directly.
    Synth(Arc<dyn Synth>),
    /// A user callback fills the buffers.
    Callback(Box<dyn AudioCallback>),
}

impl RenderSource {
    pub fn is_callback(&self) -> bool {
        matches!(self, RenderSource::Callback(_))
    }

    pub(crate) fn into_callback(self) -> Box<dyn AudioCallback> {
        match self {
            RenderSource::Synth(synth) => Box::new(SynthCallback::new(synth)),
            RenderSource::Callback(callback) => callback,
        }
    }
}

/// Buffers owned by a driver thread, allocated once
pub(crate) struct AudioBuffers {
    fx: [Vec<f32>; FX_BUFFERS],
    out: [Vec<f32>; OUT_BUFFERS],
}

impl AudioBuffers {
    pub(crate) fn new(max_frames: usize) -> Self {
        Self {
            fx: std::array::from_fn(|_| vec![0.0; max_frames]),
            out: std::array::from_fn(|_| vec![0.0; max_frames]),
        }
    }

    pub(crate) fn max_frames(&self) -> usize {
        self.out[0].len()
    }

    /// Zeroes the first `frames` samples of every buffer and renders into them.
    pub(crate) fn render(
        &mut self,
        callback: &mut dyn AudioCallback,
        frames: usize,
    ) -> Result<(), AudioError> {
        let frames = frames.min(self.max_frames());
        let mut fx = self.fx.each_mut().map(|buffer| {
            let buffer = &mut buffer[..frames];
            buffer.fill(0.0);
            buffer
        });
        let mut out = self.out.each_mut().map(|buffer| {
            let buffer = &mut buffer[..frames];
            buffer.fill(0.0);
            buffer
        });
        callback.render(frames, &mut fx, &mut out)
    }

    /// Dry output of the last render as (left, right) samples.
    pub(crate) fn frames(&self, frames: usize) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.out[0][..frames]
            .iter()
            .copied()
            .zip(self.out[1][..frames].iter().copied())
    }
}

/// Period settings shared by every driver
#[derive(Debug, Clone, Copy)]
pub(crate) struct PeriodConfig {
    pub sample_rate: f64,
    pub period_size: usize,
    pub periods: usize,
}

impl PeriodConfig {
    pub(crate) fn from_settings(settings: &crate::config::Settings) -> Result<Self, AudioError> {
        let sample_rate = settings.get_float("synth.sample_rate")?;
        let period_size = settings.get_int("audio.period_size")?;
        let periods = settings.get_int("audio.periods")?;
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(AudioError::Backend(format!("invalid sample rate {}", sample_rate)));
        }
        if period_size < 1 || periods < 1 {
            return Err(AudioError::Backend(format!(
                "invalid period configuration {}x{}",
                periods, period_size
            )));
        }
        Ok(Self {
            sample_rate,
            period_size: period_size as usize,
            periods: periods as usize,
        })
    }

    pub(crate) fn period(&self) -> Duration {
        Duration::from_secs_f64(self.period_size as f64 / self.sample_rate)
    }
}

/// Thread that runs a render step once per period, at real-time pace
pub(crate) struct RenderThread {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RenderThread {
    pub(crate) fn spawn<F>(name: &str, period: Duration, mut step: F) -> Result<Self, AudioError>
    where
        F: FnMut() + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);

        let handle = thread::Builder::new().name(name.into()).spawn(move || {
            let mut deadline = Instant::now();
            while thread_running.load(Ordering::Acquire) {
                step();
                deadline += period;
                let now = Instant::now();
                if deadline > now {
                    thread::sleep(deadline - now);
                } else {
                    deadline = now;
                }
            }
            debug!("Render thread finished");
        })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub(crate) fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Render thread panicked");
            }
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Renders one period, logging failures without stopping the thread.
pub(crate) fn render_period(
    buffers: &mut AudioBuffers,
    callback: &mut dyn AudioCallback,
    frames: usize,
) {
    if let Err(err) = buffers.render(callback, frames) {
        error!("Audio render failed: {}", err);
    }
}
