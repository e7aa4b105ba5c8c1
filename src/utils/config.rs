//! Configuration management
//!
//! Provides unified configuration for building and growing the networks.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::model::{DiscriminatorConfig, GeneratorConfig, LayerOptions};
use crate::training::TransitionSchedule;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Network architecture
    pub model: ModelConfig,
    /// Growth schedule
    pub growth: GrowthConfig,
    /// Execution settings
    pub runtime: RuntimeConfig,
}

/// Model-related configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Latent dimension size
    pub noise_dim: i64,
    /// Image channels (1 for grayscale, 3 for RGB)
    pub image_channels: i64,
    /// Feature width of the 4x4 base stage
    pub base_channels: i64,
    /// Input resolution of the discriminator before growth
    pub start_imsize: i64,
    /// Negative slope of every leaky ReLU
    pub leaky_slope: f64,
    /// Pixel norm denominator used for all-zero channel vectors
    pub pixel_norm_eps: f64,
    /// Number of landmark values kept per sample
    pub pose_size: usize,
}

/// Growth-related configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthConfig {
    /// Width of each successive stage; one entry per resolution doubling
    pub channel_schedule: Vec<i64>,
    /// Images shown while a new stage fades in
    pub transition_images: u64,
    /// Images shown at full strength before the next growth
    pub stable_images: u64,
}

/// Execution configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Device: "cpu" or "cuda"
    pub device: String,
    /// Seed for tch's random number generator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    /// Batch size
    pub batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: ModelConfig {
                noise_dim: 128,
                image_channels: 1,
                base_channels: 128,
                start_imsize: 4,
                leaky_slope: 0.2,
                pixel_norm_eps: 1e-8,
                pose_size: 14,
            },
            growth: GrowthConfig {
                channel_schedule: vec![128, 64, 32],
                transition_images: 600_000,
                stable_images: 600_000,
            },
            runtime: RuntimeConfig {
                device: "cpu".to_string(),
                seed: None,
                batch_size: 64,
            },
        }
    }
}

impl Config {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from TOML file
    pub fn from_toml<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from JSON file
    pub fn from_json<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from TOML or JSON depending on the file extension
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if is_toml(path) {
            Self::from_toml(path)
        } else {
            Self::from_json(path)
        }
    }

    /// Save as TOML or JSON depending on the file extension
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        if is_toml(path) {
            self.save_toml(path)
        } else {
            self.save_json(path)
        }
    }

    /// Get device from configuration
    ///
    /// Falls back to the CPU when CUDA is requested but not present.
    pub fn device(&self) -> tch::Device {
        match self.runtime.device.to_lowercase().as_str() {
            "cuda" | "gpu" => {
                if tch::Cuda::is_available() {
                    tch::Device::Cuda(0)
                } else {
                    tracing::warn!("CUDA requested but not available, falling back to CPU");
                    tch::Device::Cpu
                }
            }
            _ => tch::Device::Cpu,
        }
    }

    fn layer_options(&self) -> LayerOptions {
        LayerOptions {
            leaky_slope: self.model.leaky_slope,
            pixel_norm_eps: self.model.pixel_norm_eps,
        }
    }

    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            noise_dim: self.model.noise_dim,
            image_channels: self.model.image_channels,
            base_channels: self.model.base_channels,
            layers: self.layer_options(),
        }
    }

    pub fn discriminator_config(&self) -> DiscriminatorConfig {
        DiscriminatorConfig {
            image_channels: self.model.image_channels,
            imsize: self.model.start_imsize,
            base_channels: self.model.base_channels,
            layers: self.layer_options(),
        }
    }

    pub fn schedule(&self) -> TransitionSchedule {
        TransitionSchedule::new(self.growth.transition_images, self.growth.stable_images)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let model = &self.model;
        if model.noise_dim <= 0 {
            anyhow::bail!("Noise dimension must be > 0");
        }
        if model.image_channels <= 0 || model.base_channels <= 0 {
            anyhow::bail!("Channel counts must be > 0");
        }
        if model.start_imsize != crate::model::BASE_RESOLUTION {
            anyhow::bail!(
                "Start resolution must be {} to match the generator's base stage",
                crate::model::BASE_RESOLUTION
            );
        }
        if !(0.0..=1.0).contains(&model.leaky_slope) {
            anyhow::bail!("Leaky ReLU slope must be in [0, 1]");
        }
        if model.pixel_norm_eps <= 0.0 {
            anyhow::bail!("Pixel norm epsilon must be > 0");
        }
        if self.growth.channel_schedule.iter().any(|&c| c <= 0) {
            anyhow::bail!("Every stage in the channel schedule must have > 0 channels");
        }
        if self.runtime.batch_size == 0 {
            anyhow::bail!("Batch size must be > 0");
        }
        match self.runtime.device.to_lowercase().as_str() {
            "cpu" | "cuda" | "gpu" => {}
            other => anyhow::bail!("Unknown device '{}'", other),
        }
        Ok(())
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().map(|ext| ext == "toml").unwrap_or(false)
}

/// Create default configuration file if it doesn't exist
pub fn ensure_config_exists<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    if path.exists() {
        Config::load(path)
    } else {
        let config = Config::default();
        config.save(path)?;
        Ok(config)
    }
}
