//! Block-wise rendering for real-time playback
//!
//! A [`BlockRenderer`] walks a root buffer in fixed-size windows. Each window
//! is spliced with the previous processed window as continuity donor, run
//! through the effect chain and encoded, so consecutive blocks join without
//! clicks even when the chain is swapped mid-stream.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::audio::{AudioError, AudioFormat, Result};
use super::buffer::AudioBuffer;
use super::dsp::SharedEffect;

/// Destination for encoded blocks, usually an audio device
pub trait PlaybackSink {
    fn write_block(&mut self, bytes: &[u8]) -> Result<()>;
}

impl PlaybackSink for Vec<u8> {
    fn write_block(&mut self, bytes: &[u8]) -> Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Frames per block
    pub block_frames: usize,
    /// Fade in at the start of a run and out at the end
    pub fade_edges: bool,
}

impl RenderConfig {
    pub const DEFAULT_BLOCK_FRAMES: usize = 2048;

    pub fn validate(&self) -> Result<()> {
        if self.block_frames == 0 {
            return Err(AudioError::ParameterViolation(
                "block size must be at least one frame".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            block_frames: Self::DEFAULT_BLOCK_FRAMES,
            fade_edges: true,
        }
    }
}

/// One rendered window
#[derive(Debug, Clone)]
pub struct RenderedBlock {
    /// First frame of the window in the root buffer
    pub start_frame: usize,
    /// Spliced input, before effects
    pub dry: AudioBuffer,
    /// Processed output, including edge fades
    pub wet: AudioBuffer,
    /// `wet` encoded in the output format
    pub bytes: Vec<u8>,
}

/// Streams a buffer through its effect chain block by block
#[derive(Debug)]
pub struct BlockRenderer {
    root: AudioBuffer,
    format: AudioFormat,
    config: RenderConfig,
    position: usize,
    previous: Option<AudioBuffer>,
    fade_next: bool,
}

impl BlockRenderer {
    pub fn new(root: AudioBuffer, format: AudioFormat, config: RenderConfig) -> Result<Self> {
        format.validate()?;
        config.validate()?;
        if usize::from(format.channels) != root.channel_count() || format.sample_rate != root.sample_rate() {
            return Err(AudioError::FormatViolation(format!(
                "output format ({} channels, {} Hz) does not match the buffer ({} channels, {} Hz)",
                format.channels,
                format.sample_rate,
                root.channel_count(),
                root.sample_rate()
            )));
        }

        debug!(
            frames = root.frame_count(),
            block_frames = config.block_frames,
            fade_edges = config.fade_edges,
            "Created block renderer"
        );
        Ok(Self {
            root,
            format,
            config,
            position: 0,
            previous: None,
            fade_next: true,
        })
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining_frames(&self) -> usize {
        self.root.frame_count().saturating_sub(self.position)
    }

    pub fn is_finished(&self) -> bool {
        self.remaining_frames() == 0
    }

    /// Swap the effect chain; the next block continues from the running state
    pub fn set_effects(&mut self, effects: &[SharedEffect]) {
        debug!(stages = effects.len(), position = self.position, "Replacing effects");
        self.root = self.root.with_effects(effects);
    }

    /// Continue playback from `frame`, fading the next block in
    pub fn seek(&mut self, frame: usize) -> Result<()> {
        let frames = self.root.frame_count();
        if frame > frames {
            return Err(AudioError::RangeViolation(format!(
                "cannot seek to frame {frame} of {frames}"
            )));
        }
        debug!(from = self.position, to = frame, "Seeking");
        self.position = frame;
        self.fade_next = true;
        Ok(())
    }

    /// Render the next block, `None` once the end is reached
    pub fn render_next(&mut self) -> Option<Result<RenderedBlock>> {
        if self.is_finished() {
            return None;
        }
        let result = self.render_block();
        if result.is_err() {
            self.position = self.root.frame_count();
        }
        Some(result)
    }

    fn render_block(&mut self) -> Result<RenderedBlock> {
        let start_frame = self.position;
        let frames = self.config.block_frames.min(self.remaining_frames());

        let dry = self.root.splice(start_frame, frames, self.previous.as_ref())?;
        let processed = dry.apply_effects();

        let mut wet = processed.clone();
        if self.config.fade_edges && frames > 1 {
            let seconds = (frames - 1) as f64 / f64::from(self.root.sample_rate());
            if self.fade_next {
                wet = wet.fade_in(seconds)?;
            }
            if start_frame + frames == self.root.frame_count() {
                wet = wet.fade_out(seconds)?;
            }
        }

        let bytes = wet.encode(&self.format)?;
        trace!(start_frame, frames, bytes = bytes.len(), "Rendered block");

        self.previous = Some(processed);
        self.position += frames;
        self.fade_next = false;

        Ok(RenderedBlock {
            start_frame,
            dry,
            wet,
            bytes,
        })
    }

    /// Drain all remaining blocks into `sink`, returning the frames written
    pub fn render_to<S: PlaybackSink + ?Sized>(&mut self, sink: &mut S) -> Result<usize> {
        let mut written = 0;
        while let Some(block) = self.render_next() {
            let block = block?;
            sink.write_block(&block.bytes)?;
            written += block.wet.frame_count();
        }
        Ok(written)
    }
}

impl Iterator for BlockRenderer {
    type Item = Result<RenderedBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        self.render_next()
    }
}
