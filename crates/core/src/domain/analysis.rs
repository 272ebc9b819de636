//! Single-frequency spectral analysis and level overviews
//!
//! The analyzer evaluates one frequency at a time by direct summation. It is
//! most accurate on short windows (a few dozen samples up to ~0.1 s); long
//! windows over changing material lose energy to phase cancellation.

use std::f64::consts::PI;

use num_complex::Complex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::audio::{AudioError, Result};
use super::buffer::AudioBuffer;
use super::level::{int_to_dbfs, peak_amplitude, peak_to_dbfs, HEADROOM_DIVISOR};
use super::parallel::fan_out;

/// Floor of every meter reading
pub const METER_FLOOR_DBFS: f64 = -60.0;

/// Samples faded at each edge of a metered window
pub const METER_EDGE_SAMPLES: f64 = 100.0;

/// Intensity of `frequency` in dBFS over the given channels
///
/// Each channel is summed as `Σ s[i] · e^(j·2π·k·i/N)` with `k = N·f/fs`,
/// the magnitudes are averaged over channels and scaled by `2/N` and the
/// headroom divisor. A full-scale sine at `frequency` reads 0 dBFS.
pub fn single_frequency_dbfs(samples: &[Vec<i32>], sample_rate: f32, frequency: f64) -> Result<f64> {
    let nyquist = f64::from(sample_rate) / 2.0;
    if !(frequency > 0.0 && frequency <= nyquist) {
        return Err(AudioError::ParameterViolation(format!(
            "frequency {frequency} Hz is outside (0, {nyquist}]"
        )));
    }

    let frames = samples.first().map_or(0, Vec::len);
    if frames == 0 {
        return Ok(f64::NEG_INFINITY);
    }

    let n = frames as f64;
    let k = n * frequency / f64::from(sample_rate);
    let magnitudes = fan_out(samples.len(), samples.len() * frames, |channel| {
        samples[channel]
            .iter()
            .enumerate()
            .map(|(i, &s)| Complex::from_polar(f64::from(s), 2.0 * PI * k * i as f64 / n))
            .sum::<Complex<f64>>()
            .norm()
    });

    // Kept fractional; truncating to an integer first only loses precision
    let average = magnitudes.iter().sum::<f64>() / magnitudes.len() as f64;
    let dbfs = int_to_dbfs(f64::from(HEADROOM_DIVISOR) * average * 2.0 / n);
    trace!(frequency, dbfs, "Measured spectral intensity");
    Ok(dbfs)
}

/// `steps + 1` logarithmically spaced frequencies from `from` to `to`
pub fn log_sweep(from: f64, to: f64, steps: usize) -> Result<Vec<f64>> {
    if !(from > 0.0 && to > from && to.is_finite()) || steps == 0 {
        return Err(AudioError::ParameterViolation(format!(
            "invalid sweep from {from} Hz to {to} Hz in {steps} steps"
        )));
    }
    let ratio = to / from;
    Ok((0..=steps)
        .map(|step| from * ratio.powf(step as f64 / steps as f64))
        .collect())
}

/// One point of a measured spectrum
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectrumPoint {
    pub frequency: f64,
    pub dbfs: f64,
}

/// Measure every frequency up to the Nyquist limit of `buffer`
///
/// Frequencies above Nyquist are skipped.
pub fn spectrum_sweep(buffer: &AudioBuffer, frequencies: &[f64]) -> Result<Vec<SpectrumPoint>> {
    let nyquist = f64::from(buffer.sample_rate()) / 2.0;
    frequencies
        .iter()
        .filter(|&&frequency| frequency <= nyquist)
        .map(|&frequency| {
            Ok(SpectrumPoint {
                frequency,
                dbfs: buffer.spectral_intensity(frequency)?,
            })
        })
        .collect()
}

/// Peak dBFS of `segments` equally long parts of the buffer
pub fn peak_overview(buffer: &AudioBuffer, segments: usize) -> Result<Vec<f64>> {
    let frames = buffer.frame_count();
    if segments == 0 || segments > frames {
        return Err(AudioError::RangeViolation(format!(
            "cannot split {frames} frames into {segments} segments"
        )));
    }

    let samples = buffer.samples();
    Ok(fan_out(segments, frames * samples.len(), |segment| {
        let start = segment * frames / segments;
        let end = (segment + 1) * frames / segments;
        let peak = samples
            .iter()
            .map(|channel| peak_amplitude(&channel[start..end]))
            .max()
            .unwrap_or(0);
        peak_to_dbfs(peak)
    }))
}

/// Spectrum display whose levels fall off slowly
///
/// Each update keeps the louder of the new reading and the decayed old one.
#[derive(Debug, Clone)]
pub struct SpectrumMeter {
    frequencies: Vec<f64>,
    levels: Vec<f64>,
    decay_db: f64,
}

impl SpectrumMeter {
    pub fn new(frequencies: Vec<f64>, decay_db: f64) -> Self {
        let levels = vec![METER_FLOOR_DBFS; frequencies.len()];
        Self {
            frequencies,
            levels,
            decay_db,
        }
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    pub fn points(&self) -> Vec<SpectrumPoint> {
        self.frequencies
            .iter()
            .zip(&self.levels)
            .map(|(&frequency, &dbfs)| SpectrumPoint { frequency, dbfs })
            .collect()
    }

    /// Measure `buffer` and raise levels where it is louder
    ///
    /// Frequencies above the buffer's Nyquist limit only decay.
    pub fn update(&mut self, buffer: &AudioBuffer) -> Result<()> {
        let edge = METER_EDGE_SAMPLES / f64::from(buffer.sample_rate());
        let window = if edge < buffer.duration_seconds() {
            buffer.fade(edge)?
        } else {
            buffer.clone()
        };

        let nyquist = f64::from(buffer.sample_rate()) / 2.0;
        for (frequency, level) in self.frequencies.iter().zip(self.levels.iter_mut()) {
            let decayed = *level - self.decay_db;
            let measured = if *frequency <= nyquist {
                window.spectral_intensity(*frequency)?
            } else {
                f64::NEG_INFINITY
            };
            *level = measured.max(decayed).max(METER_FLOOR_DBFS);
        }
        Ok(())
    }

    /// Lower every level by one decay step
    pub fn decay(&mut self) {
        for level in &mut self.levels {
            *level = (*level - self.decay_db).max(METER_FLOOR_DBFS);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::level::dbfs_to_int;

    const SAMPLE_RATE: f32 = 44100.0;

    fn sine(frames: usize, frequency: f64, dbfs: f64) -> Vec<i32> {
        let amplitude = f64::from(dbfs_to_int(dbfs) / HEADROOM_DIVISOR);
        (0..frames)
            .map(|i| (amplitude * (2.0 * PI * frequency * i as f64 / f64::from(SAMPLE_RATE)).sin()) as i32)
            .collect()
    }

    #[test]
    fn test_sine_reads_its_own_level() {
        let samples = vec![sine(44100, 1000.0, -1.0)];
        let dbfs = single_frequency_dbfs(&samples, SAMPLE_RATE, 1000.0).unwrap();
        assert!((dbfs + 1.0).abs() < 0.1, "measured {dbfs}");
    }

    #[test]
    fn test_channels_are_averaged() {
        let loud = sine(4410, 1000.0, -6.0);
        let silent = vec![0; 4410];
        let dbfs = single_frequency_dbfs(&[loud, silent], SAMPLE_RATE, 1000.0).unwrap();
        assert!((dbfs + 12.0).abs() < 0.1, "measured {dbfs}");
    }

    #[test]
    fn test_empty_and_silent_input() {
        let empty: Vec<Vec<i32>> = vec![Vec::new()];
        assert_eq!(single_frequency_dbfs(&empty, SAMPLE_RATE, 100.0).unwrap(), f64::NEG_INFINITY);
        let silent = vec![vec![0; 100]];
        assert_eq!(single_frequency_dbfs(&silent, SAMPLE_RATE, 100.0).unwrap(), f64::NEG_INFINITY);
    }

    #[test]
    fn test_frequency_out_of_range() {
        let samples = vec![vec![0; 10]];
        assert!(single_frequency_dbfs(&samples, SAMPLE_RATE, -1.0).is_err());
        assert!(single_frequency_dbfs(&samples, SAMPLE_RATE, 30_000.0).is_err());
    }

    #[test]
    fn test_log_sweep() {
        let sweep = log_sweep(62.5, 16000.0, 8).unwrap();
        assert_eq!(sweep.len(), 9);
        assert_eq!(sweep[0], 62.5);
        assert!((sweep[4] - 1000.0).abs() < 1e-9);
        assert!((sweep[8] - 16000.0).abs() < 1e-9);
        assert!(log_sweep(100.0, 50.0, 4).is_err());
        assert!(log_sweep(0.0, 50.0, 4).is_err());
        assert!(log_sweep(10.0, 50.0, 0).is_err());
    }

    #[test]
    fn test_spectrum_sweep_skips_above_nyquist() {
        let buffer = AudioBuffer::from_samples(vec![sine(800, 1000.0, -6.0)], 8000.0).unwrap();
        let points = spectrum_sweep(&buffer, &[500.0, 1000.0, 4000.0, 6000.0]).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[2].frequency, 4000.0);
    }

    #[test]
    fn test_peak_overview() {
        let mut samples = vec![0; 1000];
        samples[750] = dbfs_to_int(-6.0) / HEADROOM_DIVISOR;
        let buffer = AudioBuffer::from_samples(vec![samples], SAMPLE_RATE).unwrap();

        let overview = peak_overview(&buffer, 4).unwrap();
        assert_eq!(overview.len(), 4);
        assert_eq!(overview[0], f64::NEG_INFINITY);
        assert!((overview[3] + 6.0).abs() < 1e-6);

        assert!(matches!(peak_overview(&buffer, 0), Err(AudioError::RangeViolation(_))));
        assert!(matches!(peak_overview(&buffer, 1001), Err(AudioError::RangeViolation(_))));
    }

    #[test]
    fn test_peak_overview_one_segment_per_frame() {
        let buffer = AudioBuffer::from_samples(vec![vec![1000; 200_000]], SAMPLE_RATE).unwrap();
        let overview = peak_overview(&buffer, 200_000).unwrap();
        assert_eq!(overview.len(), 200_000);
        let expected = peak_to_dbfs(1000);
        assert!(overview.iter().all(|&dbfs| dbfs == expected));
    }

    #[test]
    fn test_meter_rises_and_decays() {
        let buffer = AudioBuffer::from_samples(vec![sine(2048, 1000.0, -3.0)], SAMPLE_RATE).unwrap();
        let mut meter = SpectrumMeter::new(vec![1000.0, 30_000.0], 10.0 / 30.0);
        assert_eq!(meter.levels(), &[METER_FLOOR_DBFS, METER_FLOOR_DBFS]);

        meter.update(&buffer).unwrap();
        let peak = meter.levels()[0];
        assert!(peak > -10.0, "meter read {peak}");
        assert_eq!(meter.levels()[1], METER_FLOOR_DBFS);

        meter.decay();
        assert!((meter.levels()[0] - (peak - 10.0 / 30.0)).abs() < 1e-9);

        let silent = AudioBuffer::from_samples(vec![vec![0; 2048]], SAMPLE_RATE).unwrap();
        meter.update(&silent).unwrap();
        assert!(meter.levels()[0] < peak && meter.levels()[0] > peak - 1.0);

        for _ in 0..1000 {
            meter.decay();
        }
        assert_eq!(meter.points()[0].dbfs, METER_FLOOR_DBFS);
    }
}
