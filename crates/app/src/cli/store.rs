//! On-disk configuration for the CLI
//!
//! This module provides:
//! - Reading and writing a [`VocalisConfig`] as a TOML file
//! - Named chain presets stored as `*.toml` files
//! - A config manager owning the per-user configuration file

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument};
use vocalis_core::{ChainConfig, ConfigError, VocalisConfig};

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid preset name '{0}'")]
    InvalidName(String),

    #[error("Preset not found: {0}")]
    PresetNotFound(String),

    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Load and validate configuration from a TOML file
#[instrument(skip(path))]
pub async fn load_config_file<P: AsRef<Path>>(path: P) -> Result<VocalisConfig> {
    let path = path.as_ref();
    info!(path = %path.display(), "Loading configuration");

    let contents = fs::read_to_string(path).await?;
    let config = VocalisConfig::from_toml(&contents)?;

    debug!("Configuration loaded successfully");
    Ok(config)
}

/// Save configuration to a TOML file, creating parent directories
#[instrument(skip(config, path))]
pub async fn save_config_file<P: AsRef<Path>>(config: &VocalisConfig, path: P) -> Result<()> {
    let path = path.as_ref();
    info!(path = %path.display(), "Saving configuration");

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, config.to_toml()?).await?;

    debug!("Configuration saved successfully");
    Ok(())
}

/// Named chain presets in a directory
pub struct PresetManager {
    preset_dir: PathBuf,
}

impl PresetManager {
    pub fn new(preset_dir: PathBuf) -> Self {
        Self { preset_dir }
    }

    fn preset_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.preset_dir.join(format!("{name}.toml")))
    }

    /// List all available presets, sorted by name
    #[instrument(skip(self))]
    pub async fn list_presets(&self) -> Result<Vec<String>> {
        let mut presets = Vec::new();

        let mut entries = fs::read_dir(&self.preset_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "toml") {
                if let Some(name) = path.file_stem().and_then(|n| n.to_str()) {
                    presets.push(name.to_string());
                }
            }
        }

        presets.sort();
        debug!(count = presets.len(), "Listed presets");
        Ok(presets)
    }

    #[instrument(skip(self))]
    pub async fn load_preset(&self, name: &str) -> Result<ChainConfig> {
        let path = self.preset_path(name)?;
        if !fs::try_exists(&path).await? {
            return Err(StoreError::PresetNotFound(name.to_string()));
        }

        let chain = ChainConfig::from_toml(&fs::read_to_string(&path).await?)?;
        debug!(name, "Preset loaded");
        Ok(chain)
    }

    #[instrument(skip(self, chain))]
    pub async fn save_preset(&self, name: &str, chain: &ChainConfig) -> Result<()> {
        let path = self.preset_path(name)?;
        fs::create_dir_all(&self.preset_dir).await?;
        fs::write(&path, chain.to_toml()?).await?;
        info!(name, "Preset saved");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_preset(&self, name: &str) -> Result<()> {
        let path = self.preset_path(name)?;
        if !fs::try_exists(&path).await? {
            return Err(StoreError::PresetNotFound(name.to_string()));
        }

        fs::remove_file(&path).await?;
        info!(name, "Preset deleted");
        Ok(())
    }

    pub async fn preset_exists(&self, name: &str) -> bool {
        match self.preset_path(name) {
            Ok(path) => fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }
}

/// Owner of the main configuration file
///
/// Lives at `~/.config/vocalis/config.toml` unless another directory is given.
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");
        Self {
            config_dir,
            config_path,
        }
    }

    /// `~/.config/vocalis` on Linux, the platform equivalent elsewhere
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("vocalis"))
            .ok_or(StoreError::NoConfigDir)
    }

    /// Presets live next to the config file
    pub fn presets(&self) -> PresetManager {
        PresetManager::new(self.config_dir.join("presets"))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file
    ///
    /// A missing file yields (and writes) the factory default. A corrupt file
    /// is copied to `config.toml.corrupt` and the factory default is returned.
    #[instrument(skip(self))]
    pub async fn load(&self) -> VocalisConfig {
        if !self.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, creating factory default"
            );

            let config = VocalisConfig::factory_default();
            if let Err(e) = self.save(&config).await {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save factory default config"
                );
            }
            return config;
        }

        match load_config_file(&self.config_path).await {
            Ok(config) => config,
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using factory default"
                );

                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                VocalisConfig::factory_default()
            }
        }
    }

    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &VocalisConfig) -> Result<()> {
        fs::create_dir_all(&self.config_dir).await?;
        save_config_file(config, &self.config_path).await
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}
