//! Audio format descriptors and the engine-wide error type
//!
//! The container layer (WAV/AIFF readers, device sinks) lives outside this
//! crate. It hands us raw PCM bytes together with an [`AudioFormat`], and the
//! format is re-validated on every decode and encode.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in the audio engine
///
/// Every variant is a failed precondition. Nothing here is transient, so
/// callers should reject the offending input instead of retrying.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AudioError {
    /// Unsupported encoding, channel count, bit depth or sample rate
    #[error("Format violation: {0}")]
    FormatViolation(String),

    /// Invalid filter, compressor or analyzer parameter
    #[error("Parameter violation: {0}")]
    ParameterViolation(String),

    /// Splice, fade or seek bounds outside the buffer
    #[error("Range violation: {0}")]
    RangeViolation(String),

    /// Reported by an external playback sink
    #[error("Stream error: {0}")]
    StreamError(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Blocks longer than this are logged at a louder level than playback windows
pub(crate) const VERBOSE_LOG_FRAMES: usize = 4096;

/// Sample encoding as reported by the container layer
///
/// Only [`Encoding::PcmSigned`] can be decoded; the other variants exist so a
/// provider can describe what it found and get a precise error back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    PcmSigned,
    PcmUnsigned,
    PcmFloat,
}

/// Byte order of a multi-byte sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    BigEndian,
    LittleEndian,
}

/// Description of an interleaved PCM byte stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub encoding: Encoding,
    pub sample_rate: f32,
    pub bits_per_sample: u16,
    pub channels: u16,
    pub byte_order: ByteOrder,
}

impl AudioFormat {
    /// Bit depths the codec can read and write
    pub const SUPPORTED_BIT_DEPTHS: [u16; 3] = [16, 24, 32];

    /// Highest sample rate accepted by the codec and the effects
    pub const MAX_SAMPLE_RATE: f32 = 768_000.0;

    /// Create a signed-PCM format
    pub fn pcm_signed(sample_rate: f32, bits_per_sample: u16, channels: u16, byte_order: ByteOrder) -> Self {
        Self {
            encoding: Encoding::PcmSigned,
            sample_rate,
            bits_per_sample,
            channels,
            byte_order,
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_per_sample / 8)
    }

    /// Bytes occupied by one sample of every channel
    pub fn frame_size(&self) -> usize {
        self.bytes_per_sample() * usize::from(self.channels)
    }

    /// Check every constraint the codec relies on
    pub fn validate(&self) -> Result<()> {
        if self.encoding != Encoding::PcmSigned {
            return Err(AudioError::FormatViolation(format!(
                "only signed PCM is supported, got {:?}",
                self.encoding
            )));
        }
        if self.channels < 1 {
            return Err(AudioError::FormatViolation(
                "at least one channel is required".to_string(),
            ));
        }
        if !Self::SUPPORTED_BIT_DEPTHS.contains(&self.bits_per_sample) {
            return Err(AudioError::FormatViolation(format!(
                "unsupported bit depth {} (expected 16, 24 or 32)",
                self.bits_per_sample
            )));
        }
        if !(self.sample_rate > 0.0 && self.sample_rate <= Self::MAX_SAMPLE_RATE) {
            return Err(AudioError::FormatViolation(format!(
                "sample rate must be within (0, {}], got {}",
                Self::MAX_SAMPLE_RATE,
                self.sample_rate
            )));
        }
        Ok(())
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::pcm_signed(44100.0, 16, 2, ByteOrder::LittleEndian)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size() {
        let format = AudioFormat::pcm_signed(48000.0, 24, 2, ByteOrder::BigEndian);
        assert_eq!(format.bytes_per_sample(), 3);
        assert_eq!(format.frame_size(), 6);
    }

    #[test]
    fn test_default_format_is_valid() {
        let format = AudioFormat::default();
        assert!(format.validate().is_ok());
        assert_eq!(format.frame_size(), 4);
    }

    #[test]
    fn test_rejects_unsigned_encoding() {
        let format = AudioFormat {
            encoding: Encoding::PcmUnsigned,
            ..AudioFormat::default()
        };
        assert!(matches!(format.validate(), Err(AudioError::FormatViolation(_))));
    }

    #[test]
    fn test_rejects_bad_bit_depth_and_channels() {
        let format = AudioFormat::pcm_signed(44100.0, 8, 1, ByteOrder::LittleEndian);
        assert!(matches!(format.validate(), Err(AudioError::FormatViolation(_))));

        let format = AudioFormat::pcm_signed(44100.0, 16, 0, ByteOrder::LittleEndian);
        assert!(matches!(format.validate(), Err(AudioError::FormatViolation(_))));
    }

    #[test]
    fn test_rejects_bad_sample_rate() {
        for rate in [0.0, -44100.0, f32::NAN, f32::INFINITY, 1.0e6] {
            let format = AudioFormat::pcm_signed(rate, 16, 2, ByteOrder::LittleEndian);
            assert!(matches!(format.validate(), Err(AudioError::FormatViolation(_))));
        }
    }

    #[test]
    fn test_format_toml_round_trip() {
        let format = AudioFormat::pcm_signed(48000.0, 24, 2, ByteOrder::BigEndian);
        let text = toml::to_string(&format).unwrap();
        assert!(text.contains("big_endian"));
        let parsed: AudioFormat = toml::from_str(&text).unwrap();
        assert_eq!(parsed, format);
    }
}
