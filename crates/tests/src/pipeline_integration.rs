//! Integration tests for the decode → effects → streaming → encode pipeline
//!
//! These tests drive the engine the way a playback loop does: raw PCM in,
//! consecutive spliced windows through a stateful chain, raw PCM out.

use crate::sine;
use proptest::prelude::*;
use vocalis_core::domain::config::VocalisConfig;
use vocalis_core::domain::dsp::{BiquadFilter, RmsCompressor};
use vocalis_core::domain::preset::{EffectRack, VoicePreset, VoiceProfile};
use vocalis_core::{
    decode, encode, high_pass, AudioBuffer, AudioError, AudioFormat, BlockRenderer, ByteOrder,
    RenderConfig,
};

const SAMPLE_RATE: f32 = 48000.0;

fn voice_preset() -> VoicePreset {
    VoicePreset {
        voice: VoiceProfile::High,
        lightness: 0.4,
        tone: -0.2,
        clarity: 0.7,
        proximity: 0.3,
        leveling: 0.8,
        ..VoicePreset::default()
    }
}

fn stereo_pcm(format: &AudioFormat, frames: usize) -> Vec<u8> {
    let left = sine(220.0, format.sample_rate, frames, -3.0);
    let right = sine(3300.0, format.sample_rate, frames, -9.0);
    encode(&[left, right], format).unwrap()
}

// ============================================================================
// CODEC
// ============================================================================

#[test]
fn test_reference_byte_layouts() {
    let stereo_24 = AudioFormat::pcm_signed(48000.0, 24, 2, ByteOrder::LittleEndian);
    let bytes = [
        0x0C, 0x0B, 0x0A, 0x33, 0x22, 0x11, 0x0F, 0x0E, 0x0D, 0x66, 0x55, 0x44,
    ];
    let buffer = AudioBuffer::from_pcm(&bytes, &stereo_24, &[]).unwrap();
    assert_eq!(
        buffer.samples(),
        &[
            vec![0x0A0B_0C00 / 2, 0x0D0E_0F00 / 2],
            vec![0x1122_3300 / 2, 0x4455_6600 / 2],
        ]
    );
    assert_eq!(buffer.encode(&stereo_24).unwrap(), bytes);

    let mono_16 = AudioFormat::pcm_signed(44100.0, 16, 1, ByteOrder::BigEndian);
    let bytes = [0x12, 0x34, 0x76, 0x54];
    let buffer = AudioBuffer::from_pcm(&bytes, &mono_16, &[]).unwrap();
    assert_eq!(buffer.samples(), &[vec![0x1234_0000 / 2, 0x7654_0000 / 2]]);
    assert_eq!(buffer.encode(&mono_16).unwrap(), bytes);
}

#[test]
fn test_bypassed_rack_round_trips_bytes() {
    let format = AudioFormat::pcm_signed(SAMPLE_RATE, 24, 2, ByteOrder::BigEndian);
    let bytes = stereo_pcm(&format, 3000);

    let mut rack = EffectRack::voice();
    rack.load_preset(&voice_preset(), SAMPLE_RATE).unwrap();
    rack.bypass(true);

    let buffer = rack.apply_to(&AudioBuffer::from_pcm(&bytes, &format, &[]).unwrap()).unwrap();
    let mut renderer = BlockRenderer::new(
        buffer,
        format,
        RenderConfig {
            block_frames: 700,
            fade_edges: false,
        },
    )
    .unwrap();

    let mut sink = Vec::new();
    renderer.render_to(&mut sink).unwrap();
    assert_eq!(sink, bytes);
}

// ============================================================================
// STREAMING
// ============================================================================

#[test]
fn test_streamed_voice_chain_matches_whole_buffer() {
    let format = AudioFormat::pcm_signed(SAMPLE_RATE, 16, 2, ByteOrder::LittleEndian);
    let bytes = stereo_pcm(&format, 10_000);
    let effects = voice_preset().build(SAMPLE_RATE).unwrap();
    let root = AudioBuffer::from_pcm(&bytes, &format, &effects).unwrap();

    let whole = root.apply_effects().encode(&format).unwrap();

    let config = RenderConfig {
        block_frames: 1024,
        fade_edges: false,
    };
    let mut streamed = Vec::new();
    let written = BlockRenderer::new(root, format, config)
        .unwrap()
        .render_to(&mut streamed)
        .unwrap();

    assert_eq!(written, 10_000);
    assert_eq!(streamed, whole);
}

#[test]
fn test_manual_splice_loop_carries_compressor_state() {
    let format = AudioFormat::pcm_signed(SAMPLE_RATE, 16, 1, ByteOrder::LittleEndian);
    let samples = sine(440.0, SAMPLE_RATE, 4800, -1.0);
    let effects = voice_preset().build(SAMPLE_RATE).unwrap();
    let root = AudioBuffer::from_samples(vec![samples], SAMPLE_RATE)
        .unwrap()
        .with_effects(&effects);

    let mut previous: Option<AudioBuffer> = None;
    let mut output = Vec::new();
    for start in (0..4800).step_by(480) {
        let block = root.splice(start, 480, previous.as_ref()).unwrap();
        if let Some(donor) = &previous {
            let expected = donor.effect_chain();
            let actual = block.effect_chain();
            let donor_comp = expected.channels()[0][6].as_any().downcast_ref::<RmsCompressor>().unwrap();
            let block_comp = actual.channels()[0][6].as_any().downcast_ref::<RmsCompressor>().unwrap();
            assert_eq!(donor_comp.state(), block_comp.state());
        }
        let processed = block.apply_effects();
        output.extend(processed.encode(&format).unwrap());
        previous = Some(processed);
    }

    assert_eq!(output, root.apply_effects().encode(&format).unwrap());
}

#[test]
fn test_slider_change_mid_stream_keeps_filter_state() {
    let format = AudioFormat::pcm_signed(SAMPLE_RATE, 16, 2, ByteOrder::LittleEndian);
    let bytes = stereo_pcm(&format, 4096);
    let root = AudioBuffer::from_pcm(&bytes, &format, &voice_preset().build(SAMPLE_RATE).unwrap()).unwrap();
    let config = RenderConfig {
        block_frames: 1024,
        fade_edges: false,
    };
    let mut renderer = BlockRenderer::new(root, format, config).unwrap();
    let first = renderer.next().unwrap().unwrap();

    let moved = VoicePreset {
        clarity: VoicePreset::slider_curve(-0.5),
        ..voice_preset()
    };
    renderer.set_effects(&moved.build(SAMPLE_RATE).unwrap());
    let second = renderer.next().unwrap().unwrap();

    let before = first.wet.effect_chain();
    let after = second.dry.effect_chain();
    for channel in 0..2 {
        let old = before.channels()[channel][4].as_any().downcast_ref::<BiquadFilter>().unwrap();
        let new = after.channels()[channel][4].as_any().downcast_ref::<BiquadFilter>().unwrap();
        assert_eq!(old.state(), new.state());
        assert_ne!(old.coeffs(), new.coeffs());
    }
    assert_eq!(renderer.position(), 2048);
}

#[test]
fn test_faded_render_starts_and_ends_quietly() {
    let format = AudioFormat::pcm_signed(SAMPLE_RATE, 16, 1, ByteOrder::LittleEndian);
    let root = AudioBuffer::from_samples(vec![sine(1000.0, SAMPLE_RATE, 3000, -1.0)], SAMPLE_RATE).unwrap();
    let blocks: Vec<_> = BlockRenderer::new(root, format, RenderConfig::default())
        .unwrap()
        .collect::<Result<_, AudioError>>()
        .unwrap();

    assert_eq!(blocks.len(), 2);
    let head = blocks[0].wet.channel(0).unwrap();
    let tail = blocks[1].wet.channel(0).unwrap();
    assert!(head[0].unsigned_abs() < 1 << 20);
    assert!(tail[tail.len() - 1].unsigned_abs() < 1 << 24);
    assert_eq!(blocks[1].start_frame, 2048);
}

// ============================================================================
// CONFIG DRIVEN
// ============================================================================

#[test]
fn test_pipeline_from_config_document() {
    let config = VocalisConfig::from_toml(
        r#"
            [render]
            block_frames = 256

            [format]
            encoding = "pcm_signed"
            sample_rate = 48000.0
            bits_per_sample = 16
            channels = 2
            byte_order = "little_endian"

            [[chain.effects]]
            type = "high_pass"
            frequency = 100.0
            q = 0.71

            [[chain.effects]]
            type = "compressor"
            ratio = 4.0
            threshold_db = -12.0
            attack_seconds = 0.005
            release_seconds = 0.2
        "#,
    )
    .unwrap();

    let bytes = stereo_pcm(&config.format, 2000);
    let effects = config.build_effects(config.format.sample_rate).unwrap();
    let root = AudioBuffer::from_pcm(&bytes, &config.format, &effects).unwrap();
    assert_eq!(root.effect_chain().stage_count(), 2);

    let blocks = BlockRenderer::new(root, config.format, config.render)
        .unwrap()
        .count();
    assert_eq!(blocks, 8);
}

#[test]
fn test_incomplete_rack_is_rejected() {
    let mut rack = EffectRack::voice();
    rack.set_slot(0, high_pass(SAMPLE_RATE, 90.0, 0.71).unwrap()).unwrap();
    let buffer = AudioBuffer::from_samples(vec![vec![0; 16]], SAMPLE_RATE).unwrap();
    assert!(matches!(rack.apply_to(&buffer), Err(AudioError::ParameterViolation(_))));
}

#[test]
fn test_reload_drops_mismatched_chain() {
    let format = AudioFormat::pcm_signed(SAMPLE_RATE, 16, 2, ByteOrder::LittleEndian);
    let effects = voice_preset().build(SAMPLE_RATE).unwrap();
    let configured = AudioBuffer::from_pcm(&stereo_pcm(&format, 100), &format, &effects).unwrap();

    let same = configured.load(&stereo_pcm(&format, 50), &format).unwrap();
    assert_eq!(same.effect_chain().stage_count(), VoicePreset::STAGES);

    let mono = AudioFormat::pcm_signed(SAMPLE_RATE, 16, 1, ByteOrder::LittleEndian);
    let mono_bytes = encode(&[sine(100.0, SAMPLE_RATE, 50, -6.0)], &mono).unwrap();
    let reloaded = configured.load(&mono_bytes, &mono).unwrap();
    assert!(reloaded.effect_chain().is_empty());
    assert_eq!(decode(&mono_bytes, &mono).unwrap(), reloaded.samples());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_stream_is_independent_of_block_size(block_frames in 1usize..600) {
        let format = AudioFormat::pcm_signed(SAMPLE_RATE, 16, 2, ByteOrder::BigEndian);
        let bytes = stereo_pcm(&format, 1200);
        let root = AudioBuffer::from_pcm(&bytes, &format, &voice_preset().build(SAMPLE_RATE).unwrap()).unwrap();
        let whole = root.apply_effects().encode(&format).unwrap();

        let config = RenderConfig { block_frames, fade_edges: false };
        let mut streamed = Vec::new();
        BlockRenderer::new(root, format, config).unwrap().render_to(&mut streamed).unwrap();
        prop_assert_eq!(streamed, whole);
    }
}
