//! The immutable audio buffer
//!
//! [`AudioBuffer`] holds decoded samples, their sample rate and one effect
//! chain per channel. Every operation returns a new buffer; sample storage is
//! shared between buffers until an operation actually produces new samples.

use std::fmt;
use std::sync::Arc;

use tracing::{info, trace, warn};

use super::analysis::single_frequency_dbfs;
use super::audio::{AudioError, AudioFormat, Result, VERBOSE_LOG_FRAMES};
use super::codec::{self, SampleMatrix};
use super::dsp::{EffectChain, SharedEffect};
use super::level::{db_to_factor, peak_amplitude, peak_to_dbfs, time_factor, RECOMMENDED_PEAK_DBFS};
use super::parallel::fan_out;

#[derive(Debug, Clone)]
pub struct AudioBuffer {
    samples: Arc<SampleMatrix>,
    sample_rate: f32,
    chain: EffectChain,
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBuffer {
    /// Buffer without channels or samples
    pub fn new() -> Self {
        Self {
            samples: Arc::new(Vec::new()),
            sample_rate: f32::NAN,
            chain: EffectChain::new(),
        }
    }

    /// Decode `bytes` and configure `effects` on every channel
    pub fn from_pcm(bytes: &[u8], format: &AudioFormat, effects: &[SharedEffect]) -> Result<Self> {
        Ok(Self::new().load(bytes, format)?.with_effects(effects))
    }

    /// Wrap already decoded samples
    pub fn from_samples(samples: SampleMatrix, sample_rate: f32) -> Result<Self> {
        if !(sample_rate > 0.0 && sample_rate <= AudioFormat::MAX_SAMPLE_RATE) {
            return Err(AudioError::FormatViolation(format!(
                "sample rate must be within (0, {}], got {sample_rate}",
                AudioFormat::MAX_SAMPLE_RATE
            )));
        }
        if samples.is_empty() {
            return Err(AudioError::FormatViolation(
                "at least one channel is required".to_string(),
            ));
        }
        let frames = samples[0].len();
        if samples.iter().any(|channel| channel.len() != frames) {
            return Err(AudioError::FormatViolation(
                "channels have differing sample counts".to_string(),
            ));
        }
        Ok(Self {
            samples: Arc::new(samples),
            sample_rate,
            chain: EffectChain::new(),
        })
    }

    fn derive(&self, samples: SampleMatrix) -> Self {
        Self {
            samples: Arc::new(samples),
            sample_rate: self.sample_rate,
            chain: self.chain.clone(),
        }
    }

    fn map_channels<F>(&self, job: F) -> Self
    where
        F: Fn(&[i32]) -> Vec<i32> + Sync,
    {
        let samples = &self.samples;
        let matrix = fan_out(samples.len(), self.sample_count(), |channel| job(&samples[channel]));
        self.derive(matrix)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn samples(&self) -> &[Vec<i32>] {
        &self.samples
    }

    pub fn channel(&self, index: usize) -> Option<&[i32]> {
        self.samples.get(index).map(Vec::as_slice)
    }

    pub fn channel_count(&self) -> usize {
        self.samples.len()
    }

    /// Samples per channel
    pub fn frame_count(&self) -> usize {
        self.samples.first().map_or(0, Vec::len)
    }

    fn sample_count(&self) -> usize {
        self.channel_count() * self.frame_count()
    }

    /// `NaN` for a buffer that never loaded anything
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate.is_finite() && self.sample_rate > 0.0 {
            self.frame_count() as f64 / f64::from(self.sample_rate)
        } else {
            0.0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frame_count() == 0
    }

    /// Snapshot of the per-channel effect chain
    pub fn effect_chain(&self) -> EffectChain {
        self.chain.clone()
    }

    // ------------------------------------------------------------------------
    // Transformations
    // ------------------------------------------------------------------------

    /// Decode new samples, keeping the chain when channel count and sample
    /// rate are unchanged
    pub fn load(&self, bytes: &[u8], format: &AudioFormat) -> Result<Self> {
        let samples = codec::decode(bytes, format)?;
        let frames = samples.first().map_or(0, Vec::len);
        if frames > VERBOSE_LOG_FRAMES {
            info!(
                bytes = bytes.len(),
                channels = samples.len(),
                frames,
                sample_rate = format.sample_rate,
                "Loaded audio"
            );
        } else {
            trace!(bytes = bytes.len(), frames, "Loaded audio");
        }

        let keep_chain = samples.len() == self.chain.channel_count()
            && format.sample_rate == self.sample_rate;
        Ok(Self {
            samples: Arc::new(samples),
            sample_rate: format.sample_rate,
            chain: if keep_chain {
                self.chain.clone()
            } else {
                EffectChain::new()
            },
        })
    }

    /// Replace the chain with `effects` on every channel
    pub fn with_effects(&self, effects: &[SharedEffect]) -> Self {
        Self {
            samples: Arc::clone(&self.samples),
            sample_rate: self.sample_rate,
            chain: EffectChain::replicated(effects, self.channel_count()),
        }
    }

    /// Replace the chain with explicit per-channel effect lists
    pub fn with_chain(&self, chain: EffectChain) -> Result<Self> {
        if chain.channel_count() != self.channel_count() {
            return Err(AudioError::ParameterViolation(format!(
                "chain has {} channels, buffer has {}",
                chain.channel_count(),
                self.channel_count()
            )));
        }
        Ok(Self {
            samples: Arc::clone(&self.samples),
            sample_rate: self.sample_rate,
            chain,
        })
    }

    /// Run the samples through the chain
    ///
    /// The result holds the processed samples and the advanced effects.
    pub fn apply_effects(&self) -> Self {
        let frames = self.frame_count();
        if frames > VERBOSE_LOG_FRAMES {
            info!(frames, stages = self.chain.stage_count(), "Applying effects");
        }

        let (chain, samples) = self.chain.process(&self.samples);

        trace!(frames, stages = chain.stage_count(), "Effects applied");
        Self {
            samples: Arc::new(samples),
            sample_rate: self.sample_rate,
            chain,
        }
    }

    /// Scale so that the peak sits at [`RECOMMENDED_PEAK_DBFS`]
    ///
    /// Silence cannot be normalized and is returned unchanged.
    pub fn normalize(&self) -> Self {
        let peak = self.peak_dbfs();
        if !peak.is_finite() {
            warn!("Cannot normalize a silent buffer");
            return self.clone();
        }

        let factor = db_to_factor(RECOMMENDED_PEAK_DBFS - peak);
        if self.frame_count() > VERBOSE_LOG_FRAMES {
            info!(factor, peak_dbfs = peak, "Normalizing");
        } else {
            trace!(factor, "Normalizing");
        }

        self.map_channels(|samples| {
            samples
                .iter()
                .map(|&s| (f64::from(s) * factor) as i32)
                .collect()
        })
    }

    /// Reverse the sample order of every channel
    pub fn reverse(&self) -> Self {
        self.map_channels(|samples| samples.iter().rev().copied().collect())
    }

    /// Exponential fade in that is within 5% of full level after `seconds`
    ///
    /// `seconds` must be positive and shorter than the buffer.
    pub fn fade_in(&self, seconds: f64) -> Result<Self> {
        let duration = self.duration_seconds();
        if !(seconds > 0.0 && seconds < duration) {
            return Err(AudioError::RangeViolation(format!(
                "fade of {seconds} s does not fit in {duration} s of audio"
            )));
        }

        let factor = time_factor(seconds, self.sample_rate);
        Ok(self.map_channels(|samples| {
            let mut gain = 0.0;
            samples
                .iter()
                .map(|&s| {
                    gain += (1.0 - gain) * factor;
                    (f64::from(s) * gain) as i32
                })
                .collect()
        }))
    }

    pub fn fade_out(&self, seconds: f64) -> Result<Self> {
        Ok(self.reverse().fade_in(seconds)?.reverse())
    }

    /// Fade in and out over `seconds` each
    pub fn fade(&self, seconds: f64) -> Result<Self> {
        self.fade_in(seconds)?.fade_out(seconds)
    }

    /// Extract `num_samples` frames starting at `from_sample`
    ///
    /// With a `donor` whose chain has the same shape, the extracted chain
    /// continues from the donor's effect state. Otherwise the own chain is
    /// kept as is.
    pub fn splice(&self, from_sample: usize, num_samples: usize, donor: Option<&AudioBuffer>) -> Result<Self> {
        let frames = self.frame_count();
        let end = from_sample.checked_add(num_samples);
        if from_sample >= frames || num_samples == 0 || end.map_or(true, |end| end > frames) {
            return Err(AudioError::RangeViolation(format!(
                "cannot splice {num_samples} samples from {from_sample} out of {frames}"
            )));
        }

        let end = from_sample + num_samples;
        let samples: SampleMatrix = self
            .samples
            .iter()
            .map(|channel| channel[from_sample..end].to_vec())
            .collect();

        let chain = donor
            .and_then(|donor| self.chain.continue_from(&donor.chain))
            .unwrap_or_else(|| self.chain.clone());

        Ok(Self {
            samples: Arc::new(samples),
            sample_rate: self.sample_rate,
            chain,
        })
    }

    // ------------------------------------------------------------------------
    // Output and queries
    // ------------------------------------------------------------------------

    /// Encode the samples; the format's sample rate must match the buffer's
    pub fn encode(&self, format: &AudioFormat) -> Result<Vec<u8>> {
        format.validate()?;
        if format.sample_rate != self.sample_rate {
            return Err(AudioError::FormatViolation(format!(
                "output sample rate {} differs from buffer sample rate {}",
                format.sample_rate, self.sample_rate
            )));
        }

        let bytes = codec::encode(&self.samples, format)?;
        if self.frame_count() > VERBOSE_LOG_FRAMES {
            info!(bytes = bytes.len(), frame_size = format.frame_size(), "Encoded audio");
        } else {
            trace!(bytes = bytes.len(), "Encoded audio");
        }
        Ok(bytes)
    }

    /// Highest absolute sample in dBFS, negative infinity for silence
    pub fn peak_dbfs(&self) -> f64 {
        let peaks = fan_out(self.channel_count(), self.sample_count(), |channel| {
            peak_amplitude(&self.samples[channel])
        });
        peak_to_dbfs(peaks.into_iter().max().unwrap_or(0))
    }

    /// Intensity of one frequency in dBFS
    ///
    /// `frequency` must lie in `(0, sample_rate / 2]`.
    pub fn spectral_intensity(&self, frequency: f64) -> Result<f64> {
        single_frequency_dbfs(&self.samples, self.sample_rate, frequency)
    }
}

impl fmt::Display for AudioBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2} s, {} channel(s), peak {:.1} dBFS",
            self.duration_seconds(),
            self.channel_count(),
            self.peak_dbfs()
        )
    }
}
