//! Progressive GAN command line interface
//!
//! Main entry point providing CLI interface for:
//! - Writing a default configuration
//! - Building and growing the networks according to the configuration
//! - Growing a saved checkpoint by one resolution
//! - Generating samples from a checkpoint

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tch::{Kind, Tensor};
use tracing::info;

use deep_privacy_pgan::{
    data::denormalize_images,
    model::ProgressiveGan,
    utils::{
        ensure_config_exists, find_latest_checkpoint, load_checkpoint, save_checkpoint,
        setup_logging, Config,
    },
};

/// Progressive-growing GAN for face de-identification
#[derive(Parser)]
#[command(name = "deep_privacy_pgan")]
#[command(version = "0.1.0")]
#[command(about = "Build, grow and sample progressive GAN networks")]
struct Cli {
    /// Path to configuration file (.toml or .json)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Verbosity level
    #[arg(short, long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize default configuration file
    Init {
        /// Output configuration file path
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },

    /// Build both networks, replay the channel schedule and check shapes at every stage
    Summary {
        /// Batch size for the shape check
        #[arg(short, long, default_value = "4")]
        batch_size: i64,

        /// Save a checkpoint of the fully grown model to this directory
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Grow a checkpoint by one resolution and save the result
    Grow {
        /// Checkpoint directory (or a directory of checkpoints, the latest is used)
        #[arg(short, long)]
        checkpoint: PathBuf,

        /// Width of the new stage
        #[arg(long)]
        channels: i64,

        /// Where to save the grown checkpoint (defaults to the checkpoint's parent)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate samples from a checkpoint
    Sample {
        /// Checkpoint directory (or a directory of checkpoints, the latest is used)
        #[arg(short, long)]
        checkpoint: PathBuf,

        /// Number of samples to generate
        #[arg(short, long, default_value = "16")]
        num_samples: i64,

        /// Transition value of the newest stage
        #[arg(short, long, default_value = "1.0")]
        transition: f64,

        /// Output tensor file, pixel values in [0, 1]
        #[arg(short, long, default_value = "samples.pt")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.verbosity)?;

    match cli.command {
        Commands::Init { output } => {
            let config = Config::default();
            config.save(&output)?;
            info!("Wrote default configuration to {}", output.display());
        }
        Commands::Summary { batch_size, save } => {
            let config = ensure_config_exists(&cli.config)?;
            summary(&config, batch_size, save)?;
        }
        Commands::Grow {
            checkpoint,
            channels,
            output,
        } => {
            let config = ensure_config_exists(&cli.config)?;
            grow(&config, &checkpoint, channels, output)?;
        }
        Commands::Sample {
            checkpoint,
            num_samples,
            transition,
            output,
        } => {
            let config = ensure_config_exists(&cli.config)?;
            sample(&config, &checkpoint, num_samples, transition, &output)?;
        }
    }

    Ok(())
}

fn build_model(config: &Config) -> Result<ProgressiveGan> {
    config.validate()?;
    if let Some(seed) = config.runtime.seed {
        tch::manual_seed(seed);
    }
    let device = config.device();
    info!("Using device {:?}", device);
    Ok(ProgressiveGan::new(
        config.generator_config(),
        config.discriminator_config(),
        device,
    ))
}

/// Run a batch through both networks at t = 0, 0.5 and 1 and log the shapes
fn check_shapes(model: &ProgressiveGan, batch_size: i64) -> Result<()> {
    let noise = Tensor::randn(
        [batch_size, model.noise_dim(), 1, 1],
        (Kind::Float, model.device),
    );
    for &t in &[0.0, 0.5, 1.0] {
        let images = model.generate_from_noise(&noise, t)?;
        let logits = model.discriminate(&images, t)?;
        info!(
            "  t={:.1}: images {:?} -> logits {:?}",
            t,
            images.size(),
            logits.size()
        );
    }
    Ok(())
}

fn summary(config: &Config, batch_size: i64, save: Option<PathBuf>) -> Result<()> {
    let mut model = build_model(config)?;
    let schedule = config.schedule();

    info!(
        "Base resolution {}x{}, {} channels",
        model.resolution(),
        model.resolution(),
        config.model.base_channels
    );
    check_shapes(&model, batch_size)?;

    for &channels in &config.growth.channel_schedule {
        model.grow(channels)?;
        check_shapes(&model, batch_size)?;
    }

    info!(
        "Final resolution {}x{} after {} extensions; each stage fades in over {} images and trains {} more",
        model.resolution(),
        model.resolution(),
        config.growth.channel_schedule.len(),
        schedule.transition_images,
        schedule.stable_images
    );
    info!(
        "Generator: {} trainable tensors, discriminator: {} trainable tensors",
        model.gen_vs.trainable_variables().len(),
        model.disc_vs.trainable_variables().len()
    );

    if let Some(dir) = save {
        save_checkpoint(&model, &dir)?;
    }
    Ok(())
}

fn resolve_checkpoint(path: &Path) -> PathBuf {
    if path.join("meta.json").exists() {
        path.to_path_buf()
    } else {
        find_latest_checkpoint(path).unwrap_or_else(|| path.to_path_buf())
    }
}

fn grow(config: &Config, checkpoint: &Path, channels: i64, output: Option<PathBuf>) -> Result<()> {
    let checkpoint = resolve_checkpoint(checkpoint);
    let (mut model, _) = load_checkpoint(&checkpoint, config.device())?;

    model.grow(channels)?;

    let output = output
        .or_else(|| checkpoint.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."));
    save_checkpoint(&model, &output)?;
    Ok(())
}

fn sample(
    config: &Config,
    checkpoint: &Path,
    num_samples: i64,
    transition: f64,
    output: &Path,
) -> Result<()> {
    let checkpoint = resolve_checkpoint(checkpoint);
    let (model, _) = load_checkpoint(&checkpoint, config.device())?;

    let images = tch::no_grad(|| model.generate(num_samples, transition))?;
    let images = denormalize_images(&images);
    images.save(output)?;

    info!(
        "Saved {} samples of size {}x{} to {}",
        num_samples,
        model.resolution(),
        model.resolution(),
        output.display()
    );
    Ok(())
}
