//! Cross-module integration tests for the Vocalis engine

#[cfg(test)]
mod analysis_integration;
#[cfg(test)]
mod pipeline_integration;

/// Sine tone at `dbfs`, scaled the way decoded samples are
#[cfg(test)]
pub(crate) fn sine(frequency: f64, sample_rate: f32, frames: usize, dbfs: f64) -> Vec<i32> {
    use vocalis_core::domain::level::{dbfs_to_int, HEADROOM_DIVISOR};

    let amplitude = f64::from(dbfs_to_int(dbfs) / HEADROOM_DIVISOR);
    (0..frames)
        .map(|i| {
            let phase = 2.0 * std::f64::consts::PI * frequency * i as f64 / f64::from(sample_rate);
            (amplitude * phase.sin()) as i32
        })
        .collect()
}
