//! Integration tests for measuring processed audio

use crate::sine;
use vocalis_core::{
    bell, high_pass, log_sweep, peak_overview, spectrum_sweep, AudioBuffer, AudioFormat, ByteOrder,
    SpectrumMeter, METER_FLOOR_DBFS,
};

const SAMPLE_RATE: f32 = 44100.0;

fn tone(frequency: f64, dbfs: f64) -> AudioBuffer {
    AudioBuffer::from_samples(vec![sine(frequency, SAMPLE_RATE, 44100, dbfs)], SAMPLE_RATE).unwrap()
}

#[test]
fn test_pure_tone_across_log_sweep() {
    let buffer = tone(1000.0, -1.0);
    let sweep = log_sweep(62.5, 16000.0, 64).unwrap();

    for point in spectrum_sweep(&buffer, &sweep).unwrap() {
        let distance = (point.frequency - 1000.0).abs() / 1000.0;
        if distance < 1e-9 {
            assert!(point.dbfs > -2.0, "{} Hz read {}", point.frequency, point.dbfs);
        } else if distance > 0.05 {
            assert!(point.dbfs < -30.0, "{} Hz read {}", point.frequency, point.dbfs);
        }
    }
}

#[test]
fn test_tone_survives_codec() {
    let format = AudioFormat::pcm_signed(SAMPLE_RATE, 16, 2, ByteOrder::LittleEndian);
    let left = sine(1000.0, SAMPLE_RATE, 4410, -1.0);
    let right = left.clone();
    let bytes = vocalis_core::encode(&[left, right], &format).unwrap();

    let buffer = AudioBuffer::from_pcm(&bytes, &format, &[]).unwrap();
    let dbfs = buffer.spectral_intensity(1000.0).unwrap();
    assert!((dbfs + 1.0).abs() < 0.2, "measured {dbfs}");
    assert!((buffer.peak_dbfs() + 1.0).abs() < 0.1);
}

#[test]
fn test_high_pass_removes_rumble() {
    let buffer = tone(62.5, -6.0);
    let filtered = buffer
        .with_effects(&[high_pass(SAMPLE_RATE, 160.0, 0.71).unwrap()])
        .apply_effects();

    let before = buffer.spectral_intensity(62.5).unwrap();
    let after = filtered.spectral_intensity(62.5).unwrap();
    assert!(before - after > 10.0, "attenuated by {}", before - after);
}

#[test]
fn test_bell_boost_is_measurable() {
    let buffer = tone(3500.0, -13.0);
    let boosted = buffer
        .with_effects(&[bell(SAMPLE_RATE, 3500.0, 2.0, 12.0).unwrap()])
        .apply_effects();

    let gain = boosted.spectral_intensity(3500.0).unwrap() - buffer.spectral_intensity(3500.0).unwrap();
    assert!((gain - 12.0).abs() < 1.5, "boost measured as {gain} dB");
}

#[test]
fn test_normalized_overview_peaks_at_target() {
    let mut samples = sine(440.0, SAMPLE_RATE, 8820, -20.0);
    samples.extend(sine(440.0, SAMPLE_RATE, 8820, -8.0));
    let buffer = AudioBuffer::from_samples(vec![samples], SAMPLE_RATE).unwrap().normalize();

    let overview = peak_overview(&buffer, 2).unwrap();
    assert!((overview[1] + 1.0).abs() < 0.05, "loud half at {}", overview[1]);
    assert!((overview[0] + 13.0).abs() < 0.1, "quiet half at {}", overview[0]);
}

#[test]
fn test_meter_follows_stream_of_blocks() {
    let buffer = tone(1000.0, -3.0);
    let sweep = log_sweep(62.5, 16000.0, 64).unwrap();
    let mut meter = SpectrumMeter::new(sweep, 0.5);

    for start in (0..8192).step_by(2048) {
        meter.update(&buffer.splice(start, 2048, None).unwrap()).unwrap();
    }
    let peak = meter
        .points()
        .into_iter()
        .max_by(|a, b| a.dbfs.total_cmp(&b.dbfs))
        .unwrap();
    assert!((peak.frequency - 1000.0).abs() < 1e-6, "loudest at {} Hz", peak.frequency);

    let silence = AudioBuffer::from_samples(vec![vec![0; 2048]], SAMPLE_RATE).unwrap();
    for _ in 0..200 {
        meter.update(&silence).unwrap();
    }
    assert!(meter.levels().iter().all(|&level| level == METER_FLOOR_DBFS));
}
