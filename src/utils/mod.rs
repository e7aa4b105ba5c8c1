//! Utility module with helper functions
//!
//! This module provides:
//! - Configuration handling
//! - Checkpoint save/load utilities
//! - Logging setup

mod config;
mod checkpoint;
mod logging;

pub use checkpoint::{
    find_latest_checkpoint, load_checkpoint, load_checkpoint_meta, save_checkpoint, CheckpointMeta,
};
pub use config::{ensure_config_exists, Config, GrowthConfig, ModelConfig, RuntimeConfig};
pub use logging::setup_logging;
