//! Checkpoint save/load utilities
//!
//! A checkpoint stores both networks' weights together with their growth
//! history. Loading rebuilds the topology by replaying the recorded
//! extensions on fresh networks and only then loads the weights.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tch::Device;

use crate::model::{DiscriminatorConfig, GeneratorConfig, GrowthState, ProgressiveGan};

const CHECKPOINT_PREFIX: &str = "stage_";

/// Checkpoint metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// Generator architecture
    pub generator_config: GeneratorConfig,
    /// Discriminator architecture
    pub discriminator_config: DiscriminatorConfig,
    /// Generator resolution and extension widths
    pub generator: GrowthState,
    /// Discriminator resolution and extension widths
    pub discriminator: GrowthState,
    /// Timestamp of checkpoint
    pub timestamp: String,
}

/// Save a complete checkpoint (weights + growth history)
///
/// # Arguments
///
/// * `model` - Model to save
/// * `dir` - Directory holding one sub-directory per resolution
///
/// # Returns
///
/// Path to saved checkpoint
pub fn save_checkpoint<P: AsRef<Path>>(model: &ProgressiveGan, dir: P) -> anyhow::Result<PathBuf> {
    let checkpoint_dir = dir
        .as_ref()
        .join(format!("{}{:04}", CHECKPOINT_PREFIX, model.resolution()));
    std::fs::create_dir_all(&checkpoint_dir)?;

    model.save(
        checkpoint_dir.join("generator.pt"),
        checkpoint_dir.join("discriminator.pt"),
    )?;

    let meta = CheckpointMeta {
        generator_config: model.generator.config().clone(),
        discriminator_config: model.discriminator.config().clone(),
        generator: model.generator_growth(),
        discriminator: model.discriminator_growth(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    let meta_json = serde_json::to_string_pretty(&meta)?;
    std::fs::write(checkpoint_dir.join("meta.json"), meta_json)?;

    tracing::info!("Saved checkpoint to {}", checkpoint_dir.display());
    Ok(checkpoint_dir)
}

/// Load checkpoint metadata
pub fn load_checkpoint_meta<P: AsRef<Path>>(checkpoint_dir: P) -> anyhow::Result<CheckpointMeta> {
    let content = std::fs::read_to_string(checkpoint_dir.as_ref().join("meta.json"))?;
    let meta: CheckpointMeta = serde_json::from_str(&content)?;
    Ok(meta)
}

/// Load a complete checkpoint onto `device`
///
/// # Returns
///
/// Tuple of (model, metadata)
pub fn load_checkpoint<P: AsRef<Path>>(
    checkpoint_dir: P,
    device: Device,
) -> anyhow::Result<(ProgressiveGan, CheckpointMeta)> {
    let checkpoint_dir = checkpoint_dir.as_ref();
    let meta = load_checkpoint_meta(checkpoint_dir)?;

    let mut model = ProgressiveGan::from_growth(
        meta.generator_config.clone(),
        meta.discriminator_config.clone(),
        &meta.generator,
        &meta.discriminator,
        device,
    )?;
    if model.generator_growth() != meta.generator
        || model.discriminator_growth() != meta.discriminator
    {
        anyhow::bail!(
            "Replayed growth does not match checkpoint {}",
            checkpoint_dir.display()
        );
    }

    model.load(
        checkpoint_dir.join("generator.pt"),
        checkpoint_dir.join("discriminator.pt"),
    )?;

    tracing::info!(
        "Loaded checkpoint from {} ({}x{})",
        checkpoint_dir.display(),
        model.resolution(),
        model.resolution()
    );
    Ok((model, meta))
}

/// Find the highest-resolution checkpoint in a directory
pub fn find_latest_checkpoint<P: AsRef<Path>>(dir: P) -> Option<PathBuf> {
    let path = dir.as_ref();
    if !path.exists() {
        return None;
    }

    std::fs::read_dir(path)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().ok().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|e| {
            let imsize = e.file_name().to_str().and_then(checkpoint_resolution)?;
            Some((imsize, e.path()))
        })
        .max_by_key(|(imsize, _)| *imsize)
        .map(|(_, path)| path)
}

/// Resolution encoded in a `stage_<imsize>` directory name
fn checkpoint_resolution(name: &str) -> Option<u64> {
    name.strip_prefix(CHECKPOINT_PREFIX)?.parse().ok()
}
