use super::{render_period, AudioBuffers, AudioError, PeriodConfig, RenderSource, RenderThread};
use crate::config::{Settings, SettingsBuilder};
use ::config::ConfigError;
use log::{error, info};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// PCM encoding of the output file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Signed 16-bit little-endian
    S16,
    /// 32-bit float little-endian
    Float,
}

impl SampleFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "s16" => Some(SampleFormat::S16),
            "float" => Some(SampleFormat::Float),
            _ => None,
        }
    }

    fn encode(self, sample: f32, dst: &mut Vec<u8>) {
        match self {
            SampleFormat::S16 => {
                let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
                dst.extend_from_slice(&value.to_le_bytes());
            }
            SampleFormat::Float => dst.extend_from_slice(&sample.to_le_bytes()),
        }
    }
}

/// Interleaved stereo writer, flushed when dropped
struct PcmWriter {
    out: BufWriter<File>,
    format: SampleFormat,
    scratch: Vec<u8>,
}

impl PcmWriter {
    fn write(&mut self, buffers: &AudioBuffers, frames: usize) {
        self.scratch.clear();
        for (left, right) in buffers.frames(frames) {
            self.format.encode(left, &mut self.scratch);
            self.format.encode(right, &mut self.scratch);
        }
        if let Err(err) = self.out.write_all(&self.scratch) {
            error!("Failed to write audio file: {}", err);
        }
    }
}

impl Drop for PcmWriter {
    fn drop(&mut self) {
        if let Err(err) = self.out.flush() {
            error!("Failed to flush audio file: {}", err);
        }
    }
}

/// Renders the synth to a raw PCM file in real time
pub struct FileDriver {
    thread: RenderThread,
}

impl FileDriver {
    pub fn register_options(builder: SettingsBuilder) -> Result<SettingsBuilder, ConfigError> {
        builder
            .set_default("audio.file.name", "midiseqrs.raw")?
            .set_default("audio.file.format", "s16")
    }

    pub fn new(settings: &Settings, source: RenderSource) -> Result<Self, AudioError> {
        if source.is_callback() {
            return Err(AudioError::Unsupported {
                driver: "file".to_string(),
                capability: "callback rendering",
            });
        }
        let config = PeriodConfig::from_settings(settings)?;
        let path = PathBuf::from(settings.get_string("audio.file.name")?);
        let format_name = settings.get_string("audio.file.format")?;
        let format = SampleFormat::from_name(&format_name).ok_or_else(|| {
            AudioError::Backend(format!("unknown audio.file.format '{}'", format_name))
        })?;

        let mut writer = PcmWriter {
            out: BufWriter::new(File::create(&path)?),
            format,
            scratch: Vec::with_capacity(config.period_size * 8),
        };
        let mut callback = source.into_callback();
        let mut buffers = AudioBuffers::new(config.period_size);
        let frames = config.period_size;

        info!(
            "Writing {:?} audio at {} Hz to {}",
            format,
            config.sample_rate,
            path.display()
        );
        let thread = RenderThread::spawn("midiseqrs-audio-file", config.period(), move || {
            render_period(&mut buffers, callback.as_mut(), frames);
            writer.write(&buffers, frames);
        })?;
        Ok(Self { thread })
    }

    pub fn stop(&mut self) {
        self.thread.stop();
    }
}
