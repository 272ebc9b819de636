//! Level conversions shared by the codec, effects and analyzer
//!
//! Samples are 32-bit signed integers aligned to the top of the word, so
//! `i32::MAX` is full scale regardless of the source bit depth. Decibels use
//! the "6 dB per doubling" convention throughout.

/// Fixed scale-down applied on decode and undone on encode (6 dB of headroom)
pub const HEADROOM_DIVISOR: i32 = 2;

/// Peak level targeted by normalization
pub const RECOMMENDED_PEAK_DBFS: f64 = -1.0;

/// Remaining distance at which an exponential ramp counts as settled
pub const SETTLE_FRACTION: f64 = 0.05;

/// Convert a gain in dB to a linear factor: `2^(db / 6)`
#[inline]
pub fn db_to_factor(db: f64) -> f64 {
    (db / 6.0).exp2()
}

/// Convert an integer amplitude to dBFS
///
/// `i32::MAX` maps to 0 dBFS, half of it to -6 dBFS. Zero maps to negative
/// infinity.
#[inline]
pub fn int_to_dbfs(value: f64) -> f64 {
    (value.abs() / f64::from(i32::MAX)).ln() / (1.0_f64 / 6.0).exp2().ln()
}

/// Convert dBFS to an integer amplitude, saturating at full scale
#[inline]
pub fn dbfs_to_int(dbfs: f64) -> i32 {
    (f64::from(i32::MAX) * db_to_factor(dbfs)) as i32
}

/// Largest absolute sample value, 0 for no samples
pub fn peak_amplitude<'a>(samples: impl IntoIterator<Item = &'a i32>) -> u32 {
    samples.into_iter().map(|s| s.unsigned_abs()).max().unwrap_or(0)
}

/// dBFS of a decoded peak, with the headroom divisor undone
#[inline]
pub fn peak_to_dbfs(peak: u32) -> f64 {
    int_to_dbfs(f64::from(peak) * f64::from(HEADROOM_DIVISOR))
}

/// Per-sample factor of an exponential ramp that settles in `seconds`
///
/// `(1 - factor)^(seconds * sample_rate)` equals [`SETTLE_FRACTION`], so a
/// value approaching its target by `factor` of the remaining distance each
/// sample is within 5% after the given time.
#[inline]
pub fn time_factor(seconds: f64, sample_rate: f32) -> f64 {
    1.0 - SETTLE_FRACTION.powf(1.0 / (seconds * f64::from(sample_rate)))
}
