//! Vocalis CLI Application

mod store;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use store::{load_config_file, save_config_file, ConfigManager};
use vocalis_core::VocalisConfig;
use vocalis_core::{
    log_sweep, peak_overview, AudioBuffer, BlockRenderer, SpectrumMeter, SpectrumPoint,
};

const SWEEP_FROM_HZ: f64 = 62.5;
const SWEEP_TO_HZ: f64 = 16000.0;
const SWEEP_STEPS: usize = 64;

#[derive(Parser)]
#[command(name = "vocalis")]
#[command(about = "Voice processing for raw PCM audio", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream raw PCM through the configured effect chain
    Render {
        /// Raw PCM input, laid out as the configured format
        #[arg(short, long)]
        input: PathBuf,
        /// Raw PCM output
        #[arg(short, long)]
        output: PathBuf,
        /// Configuration file (defaults to the user config)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Saved preset replacing the configured chain
        #[arg(short, long)]
        preset: Option<String>,
        /// Normalize the input before processing
        #[arg(long)]
        normalize: bool,
    },
    /// Print levels and a spectrum of raw PCM
    Analyze {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Saved preset replacing the configured chain
        #[arg(short, long)]
        preset: Option<String>,
        /// Number of waveform overview segments
        #[arg(short, long, default_value_t = 32)]
        segments: usize,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Write the factory default configuration
    InitConfig {
        /// Target file (defaults to the user config)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
    /// Manage saved effect chains
    Preset {
        #[command(subcommand)]
        action: PresetAction,
    },
}

#[derive(Subcommand)]
enum PresetAction {
    /// List saved presets
    List,
    /// Save the chain of a configuration under a name
    Save {
        name: String,
        /// Configuration file (defaults to the user config)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Delete a saved preset
    Delete { name: String },
}

#[derive(Serialize)]
struct Report {
    duration_seconds: f64,
    channels: usize,
    peak_dbfs: f64,
    overview: Vec<f64>,
    spectrum: Vec<SpectrumPoint>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Render {
            input,
            output,
            config,
            preset,
            normalize,
        } => {
            let config = load_config(config.as_deref(), preset.as_deref()).await?;
            render(&input, &output, &config, normalize).await
        }
        Commands::Analyze {
            input,
            config,
            preset,
            segments,
            json,
        } => {
            let config = load_config(config.as_deref(), preset.as_deref()).await?;
            analyze(&input, &config, segments, json).await
        }
        Commands::InitConfig { path } => init_config(path).await,
        Commands::Preset { action } => manage_presets(action).await,
    }
}

fn user_config() -> anyhow::Result<ConfigManager> {
    Ok(ConfigManager::new(ConfigManager::default_config_dir()?))
}

async fn load_config(path: Option<&Path>, preset: Option<&str>) -> anyhow::Result<VocalisConfig> {
    let mut config = match path {
        Some(path) => load_config_file(path)
            .await
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => {
            let manager = user_config()?;
            if manager.exists() {
                manager.load().await
            } else {
                VocalisConfig::factory_default()
            }
        }
    };

    if let Some(name) = preset {
        config.chain = user_config()?
            .presets()
            .load_preset(name)
            .await
            .with_context(|| format!("failed to load preset '{name}'"))?;
    }
    Ok(config)
}

async fn load_input(path: &Path, config: &VocalisConfig) -> anyhow::Result<AudioBuffer> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let effects = config.build_effects(config.format.sample_rate)?;
    let buffer = AudioBuffer::from_pcm(&bytes, &config.format, &effects)
        .with_context(|| format!("failed to decode {}", path.display()))?;
    tracing::info!(input = %path.display(), "Loaded {buffer}");
    Ok(buffer)
}

async fn render(input: &Path, output: &Path, config: &VocalisConfig, normalize: bool) -> anyhow::Result<()> {
    let mut buffer = load_input(input, config).await?;
    if normalize {
        buffer = buffer.normalize();
    }

    let mut renderer = BlockRenderer::new(buffer, config.format, config.render)?;
    let mut sink = Vec::new();
    let frames = renderer.render_to(&mut sink)?;

    tokio::fs::write(output, &sink)
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;
    tracing::info!(frames, bytes = sink.len(), output = %output.display(), "Render complete");
    Ok(())
}

async fn analyze(input: &Path, config: &VocalisConfig, segments: usize, json: bool) -> anyhow::Result<()> {
    let buffer = load_input(input, config).await?;

    let frames = buffer.frame_count();
    let overview = if frames == 0 {
        Vec::new()
    } else {
        peak_overview(&buffer, segments.clamp(1, frames))?
    };

    // Peak-hold spectrum over short windows
    let mut meter = SpectrumMeter::new(log_sweep(SWEEP_FROM_HZ, SWEEP_TO_HZ, SWEEP_STEPS)?, 0.0);
    let window = config.render.block_frames;
    let mut start = 0;
    while start < frames {
        let length = window.min(frames - start);
        meter.update(&buffer.splice(start, length, None)?)?;
        start += length;
    }

    let report = Report {
        duration_seconds: buffer.duration_seconds(),
        channels: buffer.channel_count(),
        peak_dbfs: buffer.peak_dbfs(),
        overview,
        spectrum: meter.points(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{buffer}");
        println!("Overview (dBFS per segment):");
        for (i, dbfs) in report.overview.iter().enumerate() {
            println!("  {:>3}: {:>7.1}", i, dbfs);
        }
        println!("Spectrum (peak hold):");
        for point in &report.spectrum {
            println!("  {:>8.1} Hz: {:>7.1} dBFS", point.frequency, point.dbfs);
        }
    }
    Ok(())
}

async fn init_config(path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = VocalisConfig::factory_default();
    let path = match path {
        Some(path) => {
            save_config_file(&config, &path).await?;
            path
        }
        None => {
            let manager = user_config()?;
            manager.save(&config).await?;
            manager.config_path().to_path_buf()
        }
    };
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

async fn manage_presets(action: PresetAction) -> anyhow::Result<()> {
    let presets = user_config()?.presets();
    match action {
        PresetAction::List => {
            let names = match presets.list_presets().await {
                Ok(names) => names,
                Err(store::StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
                Err(e) => return Err(e.into()),
            };
            for name in names {
                println!("{name}");
            }
        }
        PresetAction::Save { name, config } => {
            let config = load_config(config.as_deref(), None).await?;
            if presets.preset_exists(&name).await {
                tracing::warn!(name, "Overwriting existing preset");
            }
            presets.save_preset(&name, &config.chain).await?;
            println!("Saved preset '{name}'");
        }
        PresetAction::Delete { name } => {
            presets.delete_preset(&name).await?;
            println!("Deleted preset '{name}'");
        }
    }
    Ok(())
}
