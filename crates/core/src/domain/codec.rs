//! Sample codec: interleaved PCM bytes <-> per-channel integer samples
//!
//! Each sample is assembled into the top bytes of a 32-bit word, so a 16-bit
//! full-scale value and a 24-bit full-scale value end up with the same
//! magnitude. The word is then divided by [`HEADROOM_DIVISOR`] to leave room
//! for effects that add gain; encoding multiplies it back.

use tracing::trace;

use super::audio::{AudioError, AudioFormat, ByteOrder, Result};
use super::level::HEADROOM_DIVISOR;
use super::parallel::{fan_out, for_each_chunk_mut, worker_count, PARALLEL_MIN_SAMPLES};

/// Decoded samples, one `Vec` per channel, all of equal length
pub type SampleMatrix = Vec<Vec<i32>>;

/// Bit offset of byte `n` of a sample inside the 32-bit word
#[inline]
fn byte_shift(n: usize, bytes_per_sample: usize, order: ByteOrder) -> u32 {
    let position = match order {
        ByteOrder::BigEndian => 3 - n,
        ByteOrder::LittleEndian => 4 - bytes_per_sample + n,
    };
    (position * 8) as u32
}

#[inline]
fn read_sample(bytes: &[u8], order: ByteOrder) -> i32 {
    let bytes_per_sample = bytes.len();
    let word = bytes.iter().enumerate().fold(0u32, |word, (n, &byte)| {
        word | (u32::from(byte) << byte_shift(n, bytes_per_sample, order))
    });
    (word as i32) / HEADROOM_DIVISOR
}

#[inline]
fn write_sample(sample: i32, out: &mut [u8], order: ByteOrder) {
    let bytes_per_sample = out.len();
    let word = sample.wrapping_mul(HEADROOM_DIVISOR) as u32;
    for (n, byte) in out.iter_mut().enumerate() {
        *byte = (word >> byte_shift(n, bytes_per_sample, order)) as u8;
    }
}

/// Decode interleaved PCM bytes into a sample matrix
///
/// Fails with [`AudioError::FormatViolation`] when the format is unsupported
/// or the byte count is not a whole number of frames.
pub fn decode(bytes: &[u8], format: &AudioFormat) -> Result<SampleMatrix> {
    format.validate()?;

    let frame_size = format.frame_size();
    if bytes.len() % frame_size != 0 {
        return Err(AudioError::FormatViolation(format!(
            "{} bytes is not a multiple of the {}-byte frame size",
            bytes.len(),
            frame_size
        )));
    }

    let channels = usize::from(format.channels);
    let bytes_per_sample = format.bytes_per_sample();
    let frames = bytes.len() / frame_size;
    trace!(frames, channels, bits = format.bits_per_sample, "Decoding PCM");

    let matrix = fan_out(channels, frames * channels, |channel| {
        let offset = channel * bytes_per_sample;
        bytes
            .chunks_exact(frame_size)
            .map(|frame| read_sample(&frame[offset..offset + bytes_per_sample], format.byte_order))
            .collect::<Vec<i32>>()
    });

    Ok(matrix)
}

/// Encode a sample matrix into interleaved PCM bytes
///
/// The matrix must have one row per channel of `format`, all rows of equal
/// length.
pub fn encode(samples: &[Vec<i32>], format: &AudioFormat) -> Result<Vec<u8>> {
    format.validate()?;

    let channels = usize::from(format.channels);
    if samples.len() != channels {
        return Err(AudioError::FormatViolation(format!(
            "format has {} channels but {} were supplied",
            channels,
            samples.len()
        )));
    }

    let frames = samples.first().map_or(0, Vec::len);
    if samples.iter().any(|channel| channel.len() != frames) {
        return Err(AudioError::FormatViolation(
            "channels have differing sample counts".to_string(),
        ));
    }

    let frame_size = format.frame_size();
    let bytes_per_sample = format.bytes_per_sample();
    let mut out = vec![0u8; frames * frame_size];
    trace!(frames, channels, bits = format.bits_per_sample, "Encoding PCM");

    let frames_per_chunk = if frames * channels < PARALLEL_MIN_SAMPLES {
        frames.max(1)
    } else {
        frames.div_ceil(worker_count()).max(1)
    };

    for_each_chunk_mut(&mut out, frames_per_chunk * frame_size, |chunk_index, chunk| {
        let first_frame = chunk_index * frames_per_chunk;
        for (i, frame) in chunk.chunks_exact_mut(frame_size).enumerate() {
            let position = first_frame + i;
            for (channel, slot) in frame.chunks_exact_mut(bytes_per_sample).enumerate() {
                write_sample(samples[channel][position], slot, format.byte_order);
            }
        }
    });

    Ok(out)
}
