//! Example walking through configuration, presets and block rendering
//!
//! Run with: cargo run --package vocalis-core --example preset_demo

use std::f64::consts::PI;

use vocalis_core::domain::config::{ChainConfig, VocalisConfig};
use vocalis_core::domain::preset::{EffectRack, VoicePreset, VoiceProfile};
use vocalis_core::{AudioBuffer, BlockRenderer, RenderConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("vocalis_core=debug,info")
        .init();

    println!("=== Vocalis Preset Demo ===\n");

    // 1. Factory default configuration
    println!("1. Creating factory default configuration...");
    let mut config = VocalisConfig::factory_default();
    config.chain.preset = VoicePreset {
        voice: VoiceProfile::Low,
        clarity: VoicePreset::slider_curve(0.6),
        proximity: VoicePreset::slider_curve(-0.3),
        leveling: 0.5,
        ..VoicePreset::default()
    };
    println!(
        "   ✓ {} Hz, {} bit, {} channel(s)",
        config.format.sample_rate, config.format.bits_per_sample, config.format.channels
    );

    // 2. Round trip through TOML text
    println!("\n2. Serializing and reparsing configuration...");
    let text = config.to_toml()?;
    let loaded = VocalisConfig::from_toml(&text)?;
    println!("   ✓ {} bytes of TOML, identical: {}", text.len(), loaded == config);

    // 3. The chain alone, as a preset document
    println!("\n3. Chain presets:");
    let saved = loaded.chain.to_toml()?;
    for line in saved.lines() {
        println!("   | {line}");
    }
    let flat = ChainConfig::from_toml(&ChainConfig::default().to_toml()?)?;
    println!("   ✓ Flat preset resolves to {} stages", flat.specs()?.len());

    // 4. Load the preset into a rack and render a test tone
    println!("\n4. Rendering a test tone through the rack...");
    let chain = ChainConfig::from_toml(&saved)?;
    let sample_rate = loaded.format.sample_rate;
    let mut rack = EffectRack::voice();
    rack.load_preset(&chain.preset, sample_rate)?;

    let tone: Vec<i32> = (0..sample_rate as usize)
        .map(|i| (4e8 * (2.0 * PI * 220.0 * i as f64 / f64::from(sample_rate)).sin()) as i32)
        .collect();
    let buffer = AudioBuffer::from_samples(vec![tone.clone(), tone], sample_rate)?
        .with_effects(&rack.effects()?);
    println!("   Input:  {buffer}");

    let renderer = BlockRenderer::new(buffer, loaded.format, RenderConfig::default())?;
    let mut blocks = 0;
    let mut bytes = 0;
    for block in renderer {
        let block = block?;
        blocks += 1;
        bytes += block.bytes.len();
    }
    println!("   ✓ Rendered {blocks} blocks, {bytes} bytes");

    println!("\n=== Demo Complete ===");

    Ok(())
}
