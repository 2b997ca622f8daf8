use super::file::FileDriver;
use super::null::NullDriver;
use super::{AudioCallback, AudioError, RenderSource};
use crate::config::{Settings, SettingsBuilder};
use crate::synth::Synth;
use ::config::ConfigError;
use log::{debug, info};
use std::sync::Arc;

#[cfg(feature = "cpal")]
use super::cpal_driver::CpalDriver;

/// An audio backend compiled into this build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioBackend {
    /// Renders on a paced thread and discards the output.
    Null,
    /// Writes raw PCM to a file.
    File,
    /// Plays through the default output device.
    #[cfg(feature = "cpal")]
    Cpal,
}

impl AudioBackend {
    pub fn name(self) -> &'static str {
        match self {
            AudioBackend::Null => "null",
            AudioBackend::File => "file",
            #[cfg(feature = "cpal")]
            AudioBackend::Cpal => "cpal",
        }
    }

    /// Whether the backend can render a user callback instead of a synth.
    pub fn supports_callback(self) -> bool {
        match self {
            AudioBackend::Null => true,
            AudioBackend::File => false,
            #[cfg(feature = "cpal")]
            AudioBackend::Cpal => true,
        }
    }

    /// Adds the backend's settings and their defaults.
    pub fn register_options(self, builder: SettingsBuilder) -> Result<SettingsBuilder, ConfigError> {
        match self {
            AudioBackend::Null => Ok(builder),
            AudioBackend::File => FileDriver::register_options(builder),
            #[cfg(feature = "cpal")]
            AudioBackend::Cpal => CpalDriver::register_options(builder),
        }
    }

    /// Starts a driver instance rendering `source`.
    pub fn create(self, settings: &Settings, source: RenderSource) -> Result<AudioDriver, AudioError> {
        if source.is_callback() && !self.supports_callback() {
            return Err(self.unsupported_callback());
        }
        let instance = match self {
            AudioBackend::Null => BackendInstance::Null(NullDriver::new(settings, source)?),
            AudioBackend::File => BackendInstance::File(FileDriver::new(settings, source)?),
            #[cfg(feature = "cpal")]
            AudioBackend::Cpal => BackendInstance::Cpal(CpalDriver::new(settings, source)?),
        };
        info!("Audio driver '{}' started", self.name());
        Ok(AudioDriver {
            backend: self,
            instance: Some(instance),
        })
    }

    fn destroy(self, instance: BackendInstance) {
        match instance {
            BackendInstance::Null(mut driver) => driver.stop(),
            BackendInstance::File(mut driver) => driver.stop(),
            #[cfg(feature = "cpal")]
            BackendInstance::Cpal(mut driver) => driver.stop(),
        }
        info!("Audio driver '{}' stopped", self.name());
    }

    fn unsupported_callback(self) -> AudioError {
        AudioError::Unsupported {
            driver: self.name().to_string(),
            capability: "callback rendering",
        }
    }
}

enum BackendInstance {
    Null(NullDriver),
    File(FileDriver),
    #[cfg(feature = "cpal")]
    Cpal(CpalDriver),
}

/// A running audio driver
///
/// Dropping the driver stops it through the backend that created it.
pub struct AudioDriver {
    backend: AudioBackend,
    instance: Option<BackendInstance>,
}

impl AudioDriver {
    pub fn backend(&self) -> AudioBackend {
        self.backend
    }

    pub fn name(&self) -> &'static str {
        self.backend.name()
    }

    /// Stops the driver and waits for its thread to finish.
    pub fn destroy(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(instance) = self.instance.take() {
            self.backend.destroy(instance);
        }
    }
}

impl Drop for AudioDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Backends available in this build, looked up by name
#[derive(Debug, Clone)]
pub struct AudioDriverRegistry {
    backends: Vec<AudioBackend>,
}

impl Default for AudioDriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDriverRegistry {
    pub fn new() -> Self {
        #[allow(unused_mut)]
        let mut backends = vec![AudioBackend::Null, AudioBackend::File];
        #[cfg(feature = "cpal")]
        backends.push(AudioBackend::Cpal);
        debug!("Audio backends: {:?}", backends);
        Self { backends }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|backend| backend.name()).collect()
    }

    pub fn lookup(&self, name: &str) -> Option<AudioBackend> {
        self.backends
            .iter()
            .copied()
            .find(|backend| backend.name() == name)
    }

    /// Registers the shared audio settings and every backend's own.
    pub fn register_options(&self, builder: SettingsBuilder) -> Result<SettingsBuilder, ConfigError> {
        let builder = builder
            .set_default("audio.driver", "null")?
            .set_default("audio.period_size", 64)?
            .set_default("audio.periods", 16)?;
        self.backends
            .iter()
            .try_fold(builder, |builder, backend| backend.register_options(builder))
    }

    /// Starts the driver named by `audio.driver`, rendering `synth`.
    pub fn create(&self, settings: &Settings, synth: Arc<dyn Synth>) -> Result<AudioDriver, AudioError> {
        self.selected(settings)?
            .create(settings, RenderSource::Synth(synth))
    }

    /// Starts the driver named by `audio.driver`, rendering `callback`.
    pub fn create_with_callback(
        &self,
        settings: &Settings,
        callback: Box<dyn AudioCallback>,
    ) -> Result<AudioDriver, AudioError> {
        self.selected(settings)?
            .create(settings, RenderSource::Callback(callback))
    }

    fn selected(&self, settings: &Settings) -> Result<AudioBackend, AudioError> {
        let name = settings.get_string("audio.driver")?;
        self.lookup(&name).ok_or(AudioError::UnknownDriver(name))
    }
}
