//! Immutable audio effects and the per-channel effect chain
//!
//! This module provides:
//! - Biquad IIR filters (high-pass, bell, high shelf)
//! - An RMS compressor with automatic make-up gain
//! - [`EffectChain`], one ordered list of effects per channel
//!
//! Effects never change after construction. Processing a block returns a new
//! instance that carries the updated filter state and the block's output, so
//! the same ancestor can feed several independent futures.

use std::any::Any;
use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::audio::{AudioError, AudioFormat, Result, VERBOSE_LOG_FRAMES};
use super::codec::SampleMatrix;
use super::level::{dbfs_to_int, time_factor};
use super::parallel::fan_out;

/// Shared handle to an immutable effect instance
pub type SharedEffect = Arc<dyn AudioEffect>;

/// Core trait for all audio effects
///
/// Implementations are immutable values. New effect kinds plug in by
/// implementing this trait; nothing in the chain or buffer code matches on
/// concrete types.
pub trait AudioEffect: fmt::Debug + Send + Sync {
    /// Process a block and return a new instance holding the output and the
    /// advanced state. `self` is left untouched.
    fn process_samples(&self, samples: &[i32]) -> SharedEffect;

    /// Output of the block that produced this instance (empty for a fresh effect)
    fn processed_samples(&self) -> &[i32];

    /// Copy of `self` carrying the runtime state of `previous`
    ///
    /// Configuration (coefficients, thresholds) stays that of `self`. If
    /// `previous` is a different kind of effect, `self` is returned unchanged.
    fn continue_from(&self, previous: &dyn AudioEffect) -> SharedEffect;

    /// Effect name for logs and display
    fn name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;
}

fn parameter_error(message: impl Into<String>) -> AudioError {
    AudioError::ParameterViolation(message.into())
}

/// Bounds the compressor window and the filter math
fn validate_sample_rate(sample_rate: f32) -> Result<()> {
    if sample_rate > 0.0 && sample_rate <= AudioFormat::MAX_SAMPLE_RATE {
        Ok(())
    } else {
        Err(parameter_error(format!(
            "sample rate must be within (0, {}], got {sample_rate}",
            AudioFormat::MAX_SAMPLE_RATE
        )))
    }
}

fn validate_filter(sample_rate: f32, frequency: f64, q: f64) -> Result<()> {
    validate_sample_rate(sample_rate)?;
    let nyquist = f64::from(sample_rate) / 2.0;
    if !(frequency > 0.0 && frequency <= nyquist) {
        return Err(parameter_error(format!(
            "frequency {frequency} Hz is outside (0, {nyquist}]"
        )));
    }
    if !(q > 0.0 && q.is_finite()) {
        return Err(parameter_error(format!("Q must be positive, got {q}")));
    }
    Ok(())
}

fn validate_gain(gain_db: f64) -> Result<()> {
    if gain_db.is_finite() {
        Ok(())
    } else {
        Err(parameter_error(format!("gain must be finite, got {gain_db}")))
    }
}

// ============================================================================
// BIQUAD FILTER
// ============================================================================

/// Biquad filter coefficients, normalized so that a0 = 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        // Unity gain
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

impl BiquadCoeffs {
    /// Two-pole high-pass, 12 dB per octave below `frequency`
    ///
    /// Q of 0.71 is the narrowest transition without a resonant bump.
    pub fn high_pass(sample_rate: f32, frequency: f64, q: f64) -> Result<Self> {
        validate_filter(sample_rate, frequency, q)?;

        let omega = 2.0 * PI * frequency / f64::from(sample_rate);
        let cos = omega.cos();
        let alpha = omega.sin() / (2.0 * q);
        let a0 = 1.0 + alpha;

        Ok(Self {
            b0: (1.0 + cos) / (2.0 * a0),
            b1: -(1.0 + cos) / a0,
            b2: (1.0 + cos) / (2.0 * a0),
            a1: -2.0 * cos / a0,
            a2: (1.0 - alpha) / a0,
        })
    }

    /// Parametric bell boosting or cutting around `frequency`
    ///
    /// A gain of exactly 0 dB yields the identity filter.
    pub fn bell(sample_rate: f32, frequency: f64, q: f64, gain_db: f64) -> Result<Self> {
        validate_filter(sample_rate, frequency, q)?;
        validate_gain(gain_db)?;
        if gain_db == 0.0 {
            return Ok(Self::default());
        }

        let amount = 10.0_f64.powf(gain_db / 40.0);
        let omega = 2.0 * PI * frequency / f64::from(sample_rate);
        let cos = omega.cos();
        let alpha = omega.sin() / (q * 2.0_f64.sqrt());
        let a0 = 1.0 + alpha / amount;

        Ok(Self {
            b0: (1.0 + alpha * amount) / a0,
            b1: -2.0 * cos / a0,
            b2: (1.0 - alpha * amount) / a0,
            a1: -2.0 * cos / a0,
            a2: (1.0 - alpha / amount) / a0,
        })
    }

    /// High shelf boosting or cutting everything above `frequency`
    pub fn high_shelf(sample_rate: f32, frequency: f64, q: f64, gain_db: f64) -> Result<Self> {
        validate_filter(sample_rate, frequency, q)?;
        validate_gain(gain_db)?;
        if gain_db == 0.0 {
            return Ok(Self::default());
        }

        let a = 10.0_f64.powf(gain_db / 40.0);
        let omega = 2.0 * PI * frequency / f64::from(sample_rate);
        let cos = omega.cos();
        let alpha = omega.sin() / (2.0 * q);
        let root = 2.0 * a.sqrt() * alpha;

        let b0 = a * ((a + 1.0) + (a - 1.0) * cos + root);
        let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos);
        let b2 = a * ((a + 1.0) + (a - 1.0) * cos - root);
        let a0 = (a + 1.0) - (a - 1.0) * cos + root;
        let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos);
        let a2 = (a + 1.0) - (a - 1.0) * cos - root;

        Ok(Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        })
    }
}

/// Delay line of a biquad: the last two inputs and outputs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BiquadState {
    pub x1: i32,
    pub x2: i32,
    pub y1: i32,
    pub y2: i32,
}

/// Immutable biquad filter using Direct Form I
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    name: &'static str,
    coeffs: BiquadCoeffs,
    state: BiquadState,
    processed: Arc<[i32]>,
}

impl BiquadFilter {
    /// Create a filter with a cleared delay line
    pub fn new(name: &'static str, coeffs: BiquadCoeffs) -> Self {
        debug!(
            filter = name,
            a1 = coeffs.a1,
            a2 = coeffs.a2,
            b0 = coeffs.b0,
            b1 = coeffs.b1,
            b2 = coeffs.b2,
            "Created biquad filter"
        );
        Self {
            name,
            coeffs,
            state: BiquadState::default(),
            processed: Arc::from(Vec::new()),
        }
    }

    pub fn coeffs(&self) -> BiquadCoeffs {
        self.coeffs
    }

    pub fn state(&self) -> BiquadState {
        self.state
    }

    /// Typed form of [`AudioEffect::process_samples`]
    pub fn process(&self, samples: &[i32]) -> Self {
        let c = self.coeffs;
        let mut s = self.state;
        let mut output = Vec::with_capacity(samples.len());

        for &x in samples {
            // y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2] - a1*y[n-1] - a2*y[n-2]
            let y = (c.b0 * f64::from(x) + c.b1 * f64::from(s.x1) + c.b2 * f64::from(s.x2)
                - c.a1 * f64::from(s.y1)
                - c.a2 * f64::from(s.y2)) as i32;

            s.x2 = s.x1;
            s.x1 = x;
            s.y2 = s.y1;
            s.y1 = y;
            output.push(y);
        }

        if samples.len() > VERBOSE_LOG_FRAMES {
            debug!(filter = self.name, samples = samples.len(), "Applied biquad filter");
        } else {
            trace!(filter = self.name, samples = samples.len(), "Applied biquad filter");
        }

        Self {
            name: self.name,
            coeffs: self.coeffs,
            state: s,
            processed: Arc::from(output),
        }
    }
}

impl AudioEffect for BiquadFilter {
    fn process_samples(&self, samples: &[i32]) -> SharedEffect {
        Arc::new(self.process(samples))
    }

    fn processed_samples(&self) -> &[i32] {
        &self.processed
    }

    fn continue_from(&self, previous: &dyn AudioEffect) -> SharedEffect {
        match previous.as_any().downcast_ref::<BiquadFilter>() {
            Some(other) => Arc::new(Self {
                name: self.name,
                coeffs: self.coeffs,
                state: other.state,
                processed: Arc::clone(&other.processed),
            }),
            None => Arc::new(self.clone()),
        }
    }

    fn name(&self) -> &str {
        self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// RMS COMPRESSOR
// ============================================================================

/// Length of the RMS measurement window in seconds
pub const RMS_WINDOW_SECONDS: f64 = 0.002;

/// Running state of an [`RmsCompressor`]
#[derive(Debug, Clone, PartialEq)]
pub struct CompressorState {
    /// Current gain factor, 1.0 when nothing is being reduced
    pub gain_reduction: f64,
    /// Most recent raw input samples
    pub window: Arc<[i32]>,
    /// Slot holding the newest sample
    pub index: usize,
}

/// Compressor driven by a short RMS window
///
/// Above the threshold the level is reduced by `ratio`; attack and release
/// times are the time the gain factor needs to get within 5% of its target.
/// A fixed make-up gain derived from ratio and threshold restores the
/// average loudness.
#[derive(Debug, Clone)]
pub struct RmsCompressor {
    ratio: f64,
    threshold: f64,
    attack_factor: f64,
    release_factor: f64,
    auto_gain: f64,
    state: CompressorState,
    processed: Arc<[i32]>,
}

impl RmsCompressor {
    pub fn new(
        ratio: f64,
        threshold_db: f64,
        attack_seconds: f64,
        release_seconds: f64,
        sample_rate: f32,
    ) -> Result<Self> {
        validate_sample_rate(sample_rate)?;
        if !(ratio > 0.0 && ratio.is_finite()) {
            return Err(parameter_error(format!("ratio must be positive, got {ratio}")));
        }
        if !(threshold_db <= 0.0) {
            return Err(parameter_error(format!(
                "threshold must not exceed 0 dBFS, got {threshold_db}"
            )));
        }
        if !(attack_seconds > 0.0 && release_seconds > 0.0) {
            return Err(parameter_error(format!(
                "attack and release must be positive, got {attack_seconds} / {release_seconds}"
            )));
        }

        let threshold = f64::from(dbfs_to_int(threshold_db)) / 2.0_f64.sqrt();
        let window_len = ((RMS_WINDOW_SECONDS * f64::from(sample_rate)) as usize).max(1);
        let auto_gain = 1.0 + 0.175 * ratio * (-20.0 * threshold / f64::from(i32::MAX)).exp2();
        let compressor = Self {
            ratio,
            threshold,
            attack_factor: time_factor(attack_seconds, sample_rate),
            release_factor: time_factor(release_seconds, sample_rate),
            auto_gain,
            state: CompressorState {
                gain_reduction: 1.0,
                window: Arc::from(vec![0; window_len]),
                index: 0,
            },
            processed: Arc::from(Vec::new()),
        };

        debug!(
            threshold = compressor.threshold,
            attack_factor = compressor.attack_factor,
            release_factor = compressor.release_factor,
            auto_gain,
            window = window_len,
            "Created RMS compressor"
        );
        Ok(compressor)
    }

    pub fn state(&self) -> &CompressorState {
        &self.state
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Threshold as an integer-scale amplitude
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn auto_gain(&self) -> f64 {
        self.auto_gain
    }

    /// Typed form of [`AudioEffect::process_samples`]
    pub fn process(&self, samples: &[i32]) -> Self {
        let mut window = self.state.window.to_vec();
        let len = window.len();
        let divisor = len as i64;
        let mut index = self.state.index;
        let mut reduction = self.state.gain_reduction;
        let mut output = Vec::with_capacity(samples.len());

        for &sample in samples {
            index = (index + 1) % len;
            window[index] = sample;

            // (s / n) * s keeps the sum of squares inside i64
            let mean_square: i64 = window
                .iter()
                .map(|&s| (i64::from(s) / divisor) * i64::from(s))
                .sum();
            let rms = (mean_square as f64).sqrt();

            let target = if rms < self.threshold {
                rms
            } else {
                self.threshold + (rms - self.threshold) / self.ratio
            };

            if rms * reduction > target {
                reduction -= self.attack_factor * (target / (rms * reduction));
            } else {
                reduction += (1.0 - reduction) * self.release_factor;
            }

            output.push((f64::from(sample) * reduction * self.auto_gain) as i32);
        }

        if samples.len() > VERBOSE_LOG_FRAMES {
            debug!(
                samples = samples.len(),
                gain_reduction = reduction,
                auto_gain = self.auto_gain,
                "Applied RMS compressor"
            );
        } else {
            trace!(samples = samples.len(), gain_reduction = reduction, "Applied RMS compressor");
        }

        Self {
            state: CompressorState {
                gain_reduction: reduction,
                window: Arc::from(window),
                index,
            },
            processed: Arc::from(output),
            ..self.clone()
        }
    }
}

impl AudioEffect for RmsCompressor {
    fn process_samples(&self, samples: &[i32]) -> SharedEffect {
        Arc::new(self.process(samples))
    }

    fn processed_samples(&self) -> &[i32] {
        &self.processed
    }

    fn continue_from(&self, previous: &dyn AudioEffect) -> SharedEffect {
        match previous.as_any().downcast_ref::<RmsCompressor>() {
            Some(other) => Arc::new(Self {
                state: other.state.clone(),
                processed: Arc::clone(&other.processed),
                ..self.clone()
            }),
            None => Arc::new(self.clone()),
        }
    }

    fn name(&self) -> &str {
        "rms-compressor"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// FACTORIES
// ============================================================================

/// High-pass filter removing content below `frequency`
pub fn high_pass(sample_rate: f32, frequency: f64, q: f64) -> Result<SharedEffect> {
    let coeffs = BiquadCoeffs::high_pass(sample_rate, frequency, q)?;
    Ok(Arc::new(BiquadFilter::new("high-pass", coeffs)))
}

/// Bell filter boosting or cutting `gain_db` around `frequency`
pub fn bell(sample_rate: f32, frequency: f64, q: f64, gain_db: f64) -> Result<SharedEffect> {
    let coeffs = BiquadCoeffs::bell(sample_rate, frequency, q, gain_db)?;
    Ok(Arc::new(BiquadFilter::new("bell", coeffs)))
}

/// Shelf boosting or cutting `gain_db` above `frequency`
pub fn high_shelf(sample_rate: f32, frequency: f64, q: f64, gain_db: f64) -> Result<SharedEffect> {
    let coeffs = BiquadCoeffs::high_shelf(sample_rate, frequency, q, gain_db)?;
    Ok(Arc::new(BiquadFilter::new("high-shelf", coeffs)))
}

/// RMS compressor; `threshold_db` in dBFS, times in seconds
pub fn rms_compressor(
    ratio: f64,
    threshold_db: f64,
    attack_seconds: f64,
    release_seconds: f64,
    sample_rate: f32,
) -> Result<SharedEffect> {
    let compressor = RmsCompressor::new(ratio, threshold_db, attack_seconds, release_seconds, sample_rate)?;
    Ok(Arc::new(compressor))
}

/// Serializable description of one effect stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EffectSpec {
    HighPass {
        frequency: f64,
        q: f64,
    },
    Bell {
        frequency: f64,
        q: f64,
        gain_db: f64,
    },
    HighShelf {
        frequency: f64,
        q: f64,
        gain_db: f64,
    },
    Compressor {
        ratio: f64,
        threshold_db: f64,
        attack_seconds: f64,
        release_seconds: f64,
    },
}

impl EffectSpec {
    pub fn name(&self) -> &str {
        match self {
            EffectSpec::HighPass { .. } => "high-pass",
            EffectSpec::Bell { .. } => "bell",
            EffectSpec::HighShelf { .. } => "high-shelf",
            EffectSpec::Compressor { .. } => "rms-compressor",
        }
    }

    /// Instantiate the effect for a given sample rate
    pub fn build(&self, sample_rate: f32) -> Result<SharedEffect> {
        match *self {
            EffectSpec::HighPass { frequency, q } => high_pass(sample_rate, frequency, q),
            EffectSpec::Bell { frequency, q, gain_db } => bell(sample_rate, frequency, q, gain_db),
            EffectSpec::HighShelf { frequency, q, gain_db } => {
                high_shelf(sample_rate, frequency, q, gain_db)
            }
            EffectSpec::Compressor {
                ratio,
                threshold_db,
                attack_seconds,
                release_seconds,
            } => rms_compressor(ratio, threshold_db, attack_seconds, release_seconds, sample_rate),
        }
    }
}

/// Build every stage description in order, failing on the first invalid one
pub fn build_effects(specs: &[EffectSpec], sample_rate: f32) -> Result<Vec<SharedEffect>> {
    specs.iter().map(|spec| spec.build(sample_rate)).collect()
}

// ============================================================================
// EFFECT CHAIN
// ============================================================================

/// One ordered list of effects per channel
///
/// All channels hold the same number of stages. What each stage means is up
/// to the caller.
#[derive(Debug, Clone, Default)]
pub struct EffectChain {
    channels: Vec<Vec<SharedEffect>>,
}

impl EffectChain {
    /// Chain with no channels
    pub fn new() -> Self {
        Self::default()
    }

    /// The same effect list for each of `channels` channels
    pub fn replicated(effects: &[SharedEffect], channels: usize) -> Self {
        Self {
            channels: vec![effects.to_vec(); channels],
        }
    }

    /// Build from explicit per-channel lists, which must be equally long
    pub fn from_channels(channels: Vec<Vec<SharedEffect>>) -> Result<Self> {
        if let Some(first) = channels.first() {
            if channels.iter().any(|stages| stages.len() != first.len()) {
                return Err(parameter_error("every channel needs the same number of stages"));
            }
        }
        Ok(Self { channels })
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn stage_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// True when no channel has any stage
    pub fn is_empty(&self) -> bool {
        self.stage_count() == 0
    }

    pub fn channel(&self, index: usize) -> Option<&[SharedEffect]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<SharedEffect>] {
        &self.channels
    }

    /// Same number of channels and of stages per channel
    pub fn same_shape(&self, other: &EffectChain) -> bool {
        self.channel_count() == other.channel_count()
            && self
                .channels
                .iter()
                .zip(&other.channels)
                .all(|(a, b)| a.len() == b.len())
    }

    /// Graft the runtime state of `donor` onto this chain's configuration
    ///
    /// Returns `None` when the shapes differ.
    pub fn continue_from(&self, donor: &EffectChain) -> Option<EffectChain> {
        if !self.same_shape(donor) {
            return None;
        }
        let channels = self
            .channels
            .iter()
            .zip(&donor.channels)
            .map(|(own, theirs)| {
                own.iter()
                    .zip(theirs)
                    .map(|(effect, previous)| effect.continue_from(previous.as_ref()))
                    .collect()
            })
            .collect();
        Some(Self { channels })
    }

    /// Run every channel through its stages
    ///
    /// Stages run in order within a channel; channels run concurrently. A
    /// channel without a stage list passes through untouched.
    pub fn process(&self, samples: &[Vec<i32>]) -> (EffectChain, SampleMatrix) {
        let work = samples.iter().map(Vec::len).sum::<usize>() * self.stage_count().max(1);
        let results = fan_out(samples.len(), work, |channel| {
            let stages = self.channel(channel).unwrap_or(&[]);
            process_stages(stages, &samples[channel])
        });

        let mut advanced = Vec::with_capacity(results.len());
        let mut output = Vec::with_capacity(results.len());
        for (stages, processed) in results {
            advanced.push(stages);
            output.push(processed);
        }

        let chain = if self.channels.is_empty() {
            self.clone()
        } else {
            Self { channels: advanced }
        };
        (chain, output)
    }
}

fn process_stages(stages: &[SharedEffect], input: &[i32]) -> (Vec<SharedEffect>, Vec<i32>) {
    let mut advanced: Vec<SharedEffect> = Vec::with_capacity(stages.len());
    for stage in stages {
        let source = advanced.last().map_or(input, |previous| previous.processed_samples());
        let next = stage.process_samples(source);
        advanced.push(next);
    }
    let output = advanced
        .last()
        .map_or_else(|| input.to_vec(), |last| last.processed_samples().to_vec());
    (advanced, output)
}

// ============================================================================
// TESTS
// ============================================================================
