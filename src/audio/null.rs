use super::{render_period, AudioBuffers, AudioError, PeriodConfig, RenderSource, RenderThread};
use crate::config::Settings;
use log::info;

/// Headless driver: renders every period in real time and drops the result
pub struct NullDriver {
    thread: RenderThread,
}

impl NullDriver {
    pub fn new(settings: &Settings, source: RenderSource) -> Result<Self, AudioError> {
        let config = PeriodConfig::from_settings(settings)?;
        let mut callback = source.into_callback();
        let mut buffers = AudioBuffers::new(config.period_size);
        let frames = config.period_size;

        info!(
            "Null audio driver: {} frames per period at {} Hz",
            frames, config.sample_rate
        );
        let thread = RenderThread::spawn("midiseqrs-audio-null", config.period(), move || {
            render_period(&mut buffers, callback.as_mut(), frames);
        })?;
        Ok(Self { thread })
    }

    pub fn stop(&mut self) {
        self.thread.stop();
    }
}
