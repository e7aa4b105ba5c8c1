//! # Progressive GAN for Face De-identification
//!
//! This crate provides a progressive-growing generative adversarial network:
//! a generator and discriminator whose topology is extended at runtime, one
//! resolution doubling at a time, while trained weights are kept and the new
//! layers are faded in with a transition value.
//!
//! ## Modules
//!
//! - `model`: Layer primitives, transition blending, growable Generator and Discriminator
//! - `data`: Data source boundary and image preprocessing
//! - `training`: Transition schedule and gradient sanitation
//! - `utils`: Configuration, checkpoints and logging
//!
//! ## Example
//!
//! ```no_run
//! use deep_privacy_pgan::{Config, ProgressiveGan};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let mut model = ProgressiveGan::new(
//!         config.generator_config(),
//!         config.discriminator_config(),
//!         config.device(),
//!     );
//!
//!     // 4x4 -> 8x8; at t = 0 the grown generator reproduces the old output.
//!     model.grow(128)?;
//!     let images = model.generate(16, 0.0)?;
//!     let logits = model.discriminate(&images, 0.0)?;
//!     assert_eq!(logits.size(), vec![16, 1]);
//!     Ok(())
//! }
//! ```

pub mod data;
pub mod error;
pub mod model;
pub mod training;
pub mod utils;

pub use data::{DataLoader, DataSource, RawBatch, Sample};
pub use error::{PganError, Result};
pub use model::{Discriminator, DiscriminatorConfig, Generator, GeneratorConfig, ProgressiveGan};
pub use training::{finite_check, TransitionSchedule};
pub use utils::{load_checkpoint, save_checkpoint, setup_logging, Config};
