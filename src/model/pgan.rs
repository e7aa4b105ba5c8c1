//! ProgressiveGan wrapper combining Generator and Discriminator
//!
//! Owns one VarStore per network and grows both in lockstep.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tch::{nn, nn::OptimizerConfig, nn::VarStore, Device, Kind, Tensor};
use tracing::info;

use super::discriminator::{Discriminator, DiscriminatorConfig};
use super::generator::{Generator, GeneratorConfig};
use crate::error::Result;

/// Everything needed to rebuild a network's topology: its resolution and the
/// width handed to each `extend` call, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrowthState {
    pub imsize: i64,
    pub history: Vec<i64>,
}

/// Complete progressive GAN model
pub struct ProgressiveGan {
    /// Generator network
    pub generator: Generator,
    /// Discriminator network
    pub discriminator: Discriminator,
    /// Variable store for generator
    pub gen_vs: VarStore,
    /// Variable store for discriminator
    pub disc_vs: VarStore,
    /// Device holding every parameter
    pub device: Device,
}

impl ProgressiveGan {
    /// Create both networks at their base resolution on `device`
    pub fn new(gen_config: GeneratorConfig, disc_config: DiscriminatorConfig, device: Device) -> Self {
        let gen_vs = VarStore::new(device);
        let disc_vs = VarStore::new(device);

        let generator = Generator::new(&gen_vs.root(), gen_config);
        let discriminator = Discriminator::new(&disc_vs.root(), disc_config);

        Self {
            generator,
            discriminator,
            gen_vs,
            disc_vs,
            device,
        }
    }

    /// Rebuild a grown model by replaying recorded growth on fresh networks.
    ///
    /// Variable names depend only on stage order, so weights saved from the
    /// original model can be loaded into the result.
    pub fn from_growth(
        gen_config: GeneratorConfig,
        disc_config: DiscriminatorConfig,
        generator_growth: &GrowthState,
        discriminator_growth: &GrowthState,
        device: Device,
    ) -> Result<Self> {
        let mut model = Self::new(gen_config, disc_config, device);
        for &width in &generator_growth.history {
            model.generator.extend(&model.gen_vs.root(), width)?;
        }
        for &width in &discriminator_growth.history {
            model.discriminator.extend(&model.disc_vs.root(), width)?;
        }
        Ok(model)
    }

    /// Grow both networks to twice the current resolution with a stage of `channels` features
    pub fn grow(&mut self, channels: i64) -> Result<()> {
        self.generator.extend(&self.gen_vs.root(), channels)?;
        self.discriminator.extend(&self.disc_vs.root(), channels)?;
        info!(
            "Grew model to {}x{} with {} channels",
            self.resolution(),
            self.resolution(),
            channels
        );
        Ok(())
    }

    /// Generate `num_samples` images at the given transition value
    pub fn generate(&self, num_samples: i64, transition: f64) -> Result<Tensor> {
        let noise = Tensor::randn(
            [num_samples, self.noise_dim(), 1, 1],
            (Kind::Float, self.device),
        );
        self.generator.forward(&noise, transition)
    }

    /// Generate images from specific noise vectors
    pub fn generate_from_noise(&self, noise: &Tensor, transition: f64) -> Result<Tensor> {
        self.generator.forward(noise, transition)
    }

    /// Discriminator logits for a batch of images
    pub fn discriminate(&self, images: &Tensor, transition: f64) -> Result<Tensor> {
        self.discriminator.forward(images, transition)
    }

    /// Adam optimizer over the generator's parameters.
    ///
    /// Must be rebuilt after `grow`, since the new stage's parameters did not
    /// exist when an earlier optimizer was created.
    pub fn gen_optimizer(&self, lr: f64) -> Result<nn::Optimizer> {
        Ok(Self::adam().build(&self.gen_vs, lr)?)
    }

    /// Adam optimizer over the discriminator's parameters
    pub fn disc_optimizer(&self, lr: f64) -> Result<nn::Optimizer> {
        Ok(Self::adam().build(&self.disc_vs, lr)?)
    }

    fn adam() -> nn::Adam {
        nn::Adam {
            beta1: 0.0,
            beta2: 0.99,
            ..Default::default()
        }
    }

    /// Save both networks' weights
    pub fn save<P: AsRef<Path>>(&self, gen_path: P, disc_path: P) -> Result<()> {
        self.gen_vs.save(gen_path)?;
        self.disc_vs.save(disc_path)?;
        Ok(())
    }

    /// Load weights into networks that already have the saved topology
    pub fn load<P: AsRef<Path>>(&mut self, gen_path: P, disc_path: P) -> Result<()> {
        self.gen_vs.load(gen_path)?;
        self.disc_vs.load(disc_path)?;
        Ok(())
    }

    pub fn generator_growth(&self) -> GrowthState {
        GrowthState {
            imsize: self.generator.current_imsize(),
            history: self.generator.growth_history().to_vec(),
        }
    }

    pub fn discriminator_growth(&self) -> GrowthState {
        GrowthState {
            imsize: self.discriminator.current_imsize(),
            history: self.discriminator.growth_history().to_vec(),
        }
    }

    /// Current image resolution produced by the generator
    pub fn resolution(&self) -> i64 {
        self.generator.current_imsize()
    }

    pub fn noise_dim(&self) -> i64 {
        self.generator.config().noise_dim
    }
}
