//! Configuration types for Vocalis
//!
//! [`VocalisConfig`] describes the output format, block rendering and the
//! effect chain. Conversion to and from TOML text lives here; reading and
//! writing files is left to the embedding application.

use crate::domain::audio::{AudioError, AudioFormat};
use crate::domain::dsp::{build_effects, EffectSpec, SharedEffect};
use crate::domain::playback::RenderConfig;
use crate::domain::preset::VoicePreset;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error(transparent)]
    Audio(#[from] AudioError),
}

/// Effect chain applied while rendering
///
/// An explicit `effects` list takes precedence over the voice preset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub preset: VoicePreset,
    pub effects: Vec<EffectSpec>,
}

impl ChainConfig {
    /// Parse a chain and check that it resolves to a valid stage list
    pub fn from_toml(contents: &str) -> Result<Self> {
        let chain: Self = toml::from_str(contents)?;
        chain.specs()?;
        Ok(chain)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// The stage list this chain resolves to
    pub fn specs(&self) -> Result<Vec<EffectSpec>> {
        if self.effects.is_empty() {
            Ok(self.preset.specs()?)
        } else {
            Ok(self.effects.clone())
        }
    }
}

/// Complete Vocalis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocalisConfig {
    #[serde(default)]
    pub render: RenderConfig,
    pub format: AudioFormat,
    #[serde(default)]
    pub chain: ChainConfig,
}

impl Default for VocalisConfig {
    fn default() -> Self {
        Self::factory_default()
    }
}

impl VocalisConfig {
    /// Parse and validate a TOML document
    #[instrument(skip(contents), fields(len = contents.len()))]
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        debug!("Configuration parsed");
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// 44.1 kHz / 16-bit / stereo / little-endian, 2048-frame blocks, neutral voice preset
    pub fn factory_default() -> Self {
        Self {
            render: RenderConfig::default(),
            format: AudioFormat::default(),
            chain: ChainConfig::default(),
        }
    }

    /// Check format, block size and every chain parameter
    pub fn validate(&self) -> Result<()> {
        self.format.validate()?;
        self.render.validate()?;
        self.build_effects(self.format.sample_rate).map(|_| ())
    }

    /// Instantiate the configured chain for `sample_rate`
    pub fn build_effects(&self, sample_rate: f32) -> Result<Vec<SharedEffect>> {
        let specs = self.chain.specs()?;
        Ok(build_effects(&specs, sample_rate)?)
    }
}
