use super::{render_period, AudioBuffers, AudioError, PeriodConfig, RenderSource};
use crate::config::{Settings, SettingsBuilder};
use ::config::ConfigError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam::channel::{bounded, Sender};
use log::{error, info};
use std::thread::{self, JoinHandle};

/// Plays through a cpal output device
///
/// `cpal::Stream` is not `Send`, so the stream lives on its own thread, which
/// holds it until the driver is stopped.
pub struct CpalDriver {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CpalDriver {
    pub fn register_options(builder: SettingsBuilder) -> Result<SettingsBuilder, ConfigError> {
        builder.set_default("audio.cpal.device", "default")
    }

    pub fn new(settings: &Settings, source: RenderSource) -> Result<Self, AudioError> {
        let config = PeriodConfig::from_settings(settings)?;
        let device_name = settings.get_string("audio.cpal.device")?;
        let callback = source.into_callback();

        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("midiseqrs-audio-cpal".into())
            .spawn(move || {
                let stream = match open_stream(&device_name, config, callback) {
                    Ok(stream) => stream,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Blocks until stop() sends or drops the sender
                let _ = stop_rx.recv();
                drop(stream);
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                stop_tx: Some(stop_tx),
                handle: Some(handle),
            }),
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(AudioError::Backend("cpal stream thread exited".into()))
            }
        }
    }

    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("cpal stream thread panicked");
            }
        }
    }
}

fn find_device(name: &str) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    if name == "default" {
        return host
            .default_output_device()
            .ok_or_else(|| AudioError::Backend("No default output device found".into()));
    }
    let devices = host
        .output_devices()
        .map_err(|e| AudioError::Backend(format!("Failed to enumerate devices: {}", e)))?;
    for device in devices {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(device);
        }
    }
    Err(AudioError::Backend(format!("Device '{}' not found", name)))
}

fn open_stream(
    device_name: &str,
    config: PeriodConfig,
    mut callback: Box<dyn super::AudioCallback>,
) -> Result<cpal::Stream, AudioError> {
    let device = find_device(device_name)?;
    let stream_config = cpal::StreamConfig {
        channels: 2,
        sample_rate: cpal::SampleRate(config.sample_rate as u32),
        buffer_size: cpal::BufferSize::Fixed(config.period_size as u32),
    };
    info!(
        "Opening cpal device '{}': {} Hz, {} frames per period",
        device.name().unwrap_or_default(),
        config.sample_rate,
        config.period_size
    );

    let channels = usize::from(stream_config.channels);
    let mut buffers = AudioBuffers::new(config.period_size);
    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                // The device may ask for more than one period at a time
                for chunk in data.chunks_mut(buffers.max_frames() * channels) {
                    let frames = chunk.len() / channels;
                    render_period(&mut buffers, callback.as_mut(), frames);
                    for (frame, (left, right)) in
                        chunk.chunks_mut(channels).zip(buffers.frames(frames))
                    {
                        frame[0] = left;
                        if channels > 1 {
                            frame[1] = right;
                        }
                        frame.iter_mut().skip(2).for_each(|sample| *sample = 0.0);
                    }
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::Backend(format!("Failed to build output stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| AudioError::Backend(format!("Failed to start stream: {}", e)))?;
    Ok(stream)
}
