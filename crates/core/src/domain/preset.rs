//! Voice-oriented effect presets and the slot-based effect rack

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::audio::{AudioError, Result};
use super::buffer::AudioBuffer;
use super::dsp::{build_effects, EffectSpec, SharedEffect};

/// Register of the voices in a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceProfile {
    /// Low voices only
    Low,
    /// Mixed registers
    #[default]
    Medium,
    /// High voices only
    High,
}

/// Seven-stage voice chain driven by a handful of amounts
///
/// The tonal amounts are bipolar (`-1..=1`, 0 is neutral); `leveling` goes
/// from 0 (gentle) to 1 (heavy compression).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VoicePreset {
    /// Keep low end for music beds
    pub music: bool,
    pub voice: VoiceProfile,
    pub lightness: f64,
    pub tone: f64,
    pub clarity: f64,
    pub proximity: f64,
    pub leveling: f64,
}

impl VoicePreset {
    /// Number of stages in the built chain
    pub const STAGES: usize = 7;

    /// Map a linear control position in `-1..=1` onto an amount
    pub fn slider_curve(position: f64) -> f64 {
        0.75 * position.powi(3) + 0.25 * position
    }

    pub fn validate(&self) -> Result<()> {
        let tonal = [
            ("lightness", self.lightness),
            ("tone", self.tone),
            ("clarity", self.clarity),
            ("proximity", self.proximity),
        ];
        for (name, amount) in tonal {
            if !(-1.0..=1.0).contains(&amount) {
                return Err(AudioError::ParameterViolation(format!(
                    "{name} must be within [-1, 1], got {amount}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.leveling) {
            return Err(AudioError::ParameterViolation(format!(
                "leveling must be within [0, 1], got {}",
                self.leveling
            )));
        }
        Ok(())
    }

    fn high_pass_frequency(&self) -> f64 {
        if self.music {
            return 36.0;
        }
        match self.voice {
            VoiceProfile::Low => 90.0,
            VoiceProfile::Medium => 100.0,
            VoiceProfile::High => 160.0,
        }
    }

    /// Effect descriptions in stage order
    pub fn specs(&self) -> Result<Vec<EffectSpec>> {
        self.validate()?;

        let (lightness_frequency, tone_frequency) = match self.voice {
            VoiceProfile::Low => (150.0, 450.0),
            VoiceProfile::Medium => (180.0, 500.0),
            VoiceProfile::High => (250.0, 550.0),
        };
        let leveling = self.leveling;

        Ok(vec![
            EffectSpec::HighPass {
                frequency: self.high_pass_frequency(),
                q: 0.71,
            },
            EffectSpec::Bell {
                frequency: lightness_frequency,
                q: 2.0,
                gain_db: -12.0 * self.lightness,
            },
            EffectSpec::Bell {
                frequency: tone_frequency,
                q: 2.0,
                gain_db: -14.0 * self.tone,
            },
            EffectSpec::Bell {
                frequency: 1800.0,
                q: 2.0,
                gain_db: 12.0 * self.tone,
            },
            EffectSpec::Bell {
                frequency: 3500.0,
                q: 2.0,
                gain_db: 12.0 * self.clarity,
            },
            EffectSpec::Bell {
                frequency: 8000.0,
                q: 1.0,
                gain_db: 10.0 * self.proximity,
            },
            EffectSpec::Compressor {
                ratio: 3.0 + 3.0 * leveling * leveling,
                threshold_db: (-6.0 - 30.0 * leveling) * (1.0 - 1e7_f64.powf(-leveling)),
                attack_seconds: 0.01,
                release_seconds: 0.6,
            },
        ])
    }

    /// Instantiate the chain for `sample_rate`
    pub fn build(&self, sample_rate: f32) -> Result<Vec<SharedEffect>> {
        let effects = build_effects(&self.specs()?, sample_rate)?;
        debug!(preset = ?self, sample_rate, "Built voice chain");
        Ok(effects)
    }
}

/// Fixed number of effect slots that can be filled one at a time
///
/// The rack only yields a chain once every slot is filled. While bypassed it
/// yields an empty chain.
#[derive(Debug, Clone)]
pub struct EffectRack {
    slots: Vec<Option<SharedEffect>>,
    bypassed: bool,
}

impl EffectRack {
    pub fn new(slots: usize) -> Self {
        Self {
            slots: vec![None; slots],
            bypassed: false,
        }
    }

    /// Rack sized for [`VoicePreset`]
    pub fn voice() -> Self {
        Self::new(VoicePreset::STAGES)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn slot(&self, index: usize) -> Option<&SharedEffect> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn set_slot(&mut self, index: usize, effect: SharedEffect) -> Result<()> {
        let len = self.slots.len();
        let slot = self.slots.get_mut(index).ok_or_else(|| {
            AudioError::RangeViolation(format!("slot {index} does not exist in a rack of {len}"))
        })?;
        *slot = Some(effect);
        Ok(())
    }

    pub fn bypass(&mut self, bypassed: bool) {
        self.bypassed = bypassed;
    }

    /// Fill every slot from a preset
    pub fn load_preset(&mut self, preset: &VoicePreset, sample_rate: f32) -> Result<()> {
        let effects = preset.build(sample_rate)?;
        if effects.len() != self.slots.len() {
            return Err(AudioError::RangeViolation(format!(
                "preset has {} stages, rack has {} slots",
                effects.len(),
                self.slots.len()
            )));
        }
        self.slots = effects.into_iter().map(Some).collect();
        Ok(())
    }

    /// The effects in slot order
    pub fn effects(&self) -> Result<Vec<SharedEffect>> {
        if self.bypassed {
            return Ok(Vec::new());
        }
        self.slots
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.clone().ok_or_else(|| {
                    AudioError::ParameterViolation(format!("effect slot {index} is empty"))
                })
            })
            .collect()
    }

    /// Configure `buffer` with this rack's chain
    pub fn apply_to(&self, buffer: &AudioBuffer) -> Result<AudioBuffer> {
        Ok(buffer.with_effects(&self.effects()?))
    }
}
