// config.rs

use crate::audio::AudioDriverRegistry;
use ::config::builder::DefaultState;
use ::config::{Config, ConfigBuilder, ConfigError, Environment, File};
use log::{debug, info};
use std::path::Path;

/// Builder the player and the audio drivers register their defaults into
pub type SettingsBuilder = ConfigBuilder<DefaultState>;

/// Prefix of environment variables read as settings, e.g.
/// `MIDISEQRS_AUDIO__DRIVER=file`
pub const ENV_PREFIX: &str = "MIDISEQRS";

pub const DEFAULT_SAMPLE_RATE: f64 = 44_100.0;

/// Layered settings: registered defaults, then an optional file, then
/// the environment, then command-line overrides.
#[derive(Debug, Clone)]
pub struct Settings {
    inner: Config,
}

impl Settings {
    /// Builder holding every registered default.
    pub fn builder(registry: &AudioDriverRegistry) -> Result<SettingsBuilder, ConfigError> {
        let builder = Config::builder()
            .set_default("player.timing_source", "sample")?
            .set_default("player.reset_synth", true)?
            .set_default("player.timer_interval_ms", 4)?
            .set_default("synth.sample_rate", DEFAULT_SAMPLE_RATE)?
            .set_default("synth.midi_out", "")?;
        registry.register_options(builder)
    }

    /// Defaults layered with `path` (if given) and the environment. Further
    /// overrides can be set on the returned builder.
    pub fn load(
        registry: &AudioDriverRegistry,
        path: Option<&Path>,
    ) -> Result<SettingsBuilder, ConfigError> {
        let mut builder = Self::builder(registry)?;
        if let Some(path) = path {
            info!("Reading settings from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }
        Ok(builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        ))
    }

    pub fn build(builder: SettingsBuilder) -> Result<Self, ConfigError> {
        let inner = builder.build()?;
        debug!("Settings loaded");
        Ok(Self { inner })
    }

    /// Registered defaults only.
    pub fn defaults(registry: &AudioDriverRegistry) -> Result<Self, ConfigError> {
        Self::build(Self::builder(registry)?)
    }

    pub fn get_string(&self, key: &str) -> Result<String, ConfigError> {
        self.inner.get_string(key)
    }

    pub fn get_int(&self, key: &str) -> Result<i64, ConfigError> {
        self.inner.get_int(key)
    }

    pub fn get_float(&self, key: &str) -> Result<f64, ConfigError> {
        self.inner.get_float(key)
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, ConfigError> {
        self.inner.get_bool(key)
    }
}
