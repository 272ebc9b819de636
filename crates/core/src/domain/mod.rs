//! Domain entities and business rules

pub mod analysis;
pub mod audio;
pub mod buffer;
pub mod codec;
pub mod config;
pub mod dsp;
pub mod level;
pub mod playback;
pub mod preset;

pub(crate) mod parallel;

// Re-export specific items to avoid ambiguous glob imports (both `audio` and
// `config` define `Result`)
pub use analysis::{
    log_sweep, peak_overview, single_frequency_dbfs, spectrum_sweep, SpectrumMeter, SpectrumPoint,
    METER_FLOOR_DBFS,
};
pub use audio::{AudioError, AudioFormat, ByteOrder, Encoding};
pub use buffer::AudioBuffer;
pub use codec::{decode, encode, SampleMatrix};
pub use config::{ChainConfig, ConfigError, VocalisConfig};
pub use dsp::{
    bell, build_effects, high_pass, high_shelf, rms_compressor, AudioEffect, BiquadCoeffs,
    BiquadFilter, BiquadState, CompressorState, EffectChain, EffectSpec, RmsCompressor,
    SharedEffect,
};
pub use playback::{BlockRenderer, PlaybackSink, RenderConfig, RenderedBlock};
pub use preset::{EffectRack, VoicePreset, VoiceProfile};
