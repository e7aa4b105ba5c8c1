//! Growable generator
//!
//! Maps a latent vector to an image. The network starts at 4x4 and doubles
//! its output resolution every time [`Generator::extend`] is called. The most
//! recently added stage is faded in with a transition value so that growing
//! never changes what the network produces at `t = 0`.

use serde::{Deserialize, Serialize};
use tch::{nn, nn::Module, Tensor};
use tracing::{debug, info};

use super::layers::{conv_norm_act, EqualizedConv2d, LayerOptions, StageStack, Upsample2x};
use super::transition::{blend, check_transition};
use crate::error::{PganError, Result};

/// Side length of the feature volume produced by the first block
pub const BASE_RESOLUTION: i64 = 4;

/// Generator network configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Size of the latent noise vector
    pub noise_dim: i64,
    /// Channels of the produced image
    pub image_channels: i64,
    /// Feature width of the 4x4 base stage
    pub base_channels: i64,
    /// Activation and normalization settings
    pub layers: LayerOptions,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            noise_dim: 128,
            image_channels: 1,
            base_channels: 128,
            layers: LayerOptions::default(),
        }
    }
}

/// Generator network
///
/// Forward pass:
/// 1. Linear projection of the latent vector to a 4x4 feature volume
/// 2. The stable core (every fully faded-in stage, each followed by 2x upsampling)
/// 3. Two image candidates, `to_rgb_old(core)` and `to_rgb_new(new_block(core))`,
///    blended with the transition value
#[derive(Debug)]
pub struct Generator {
    config: GeneratorConfig,
    first_block: nn::Linear,
    core_model: StageStack,
    new_block: StageStack,
    /// `None` until the first extension: old and new projection coincide.
    to_rgb_old: Option<EqualizedConv2d>,
    to_rgb_new: EqualizedConv2d,
    current_imsize: i64,
    growth_history: Vec<i64>,
}

impl Generator {
    /// Create a 4x4 generator whose parameters live under `vs`
    pub fn new(vs: &nn::Path, config: GeneratorConfig) -> Self {
        let noise_dim = config.noise_dim;
        let first_block = nn::linear(
            vs / "first_block",
            noise_dim,
            noise_dim * BASE_RESOLUTION * BASE_RESOLUTION,
            Default::default(),
        );

        let mut core_model = StageStack::new();
        core_model.push(conv_norm_act(
            &vs.sub("stage_0"),
            noise_dim,
            config.base_channels,
            3,
            1,
            config.layers,
        ));

        let to_rgb_new = EqualizedConv2d::new(
            &vs.sub("to_rgb_0"),
            config.base_channels,
            config.image_channels,
            1,
            0,
        );

        Self {
            config,
            first_block,
            core_model,
            new_block: StageStack::new(),
            to_rgb_old: None,
            to_rgb_new,
            current_imsize: BASE_RESOLUTION,
            growth_history: Vec::new(),
        }
    }

    /// Generate images from latent vectors
    ///
    /// # Arguments
    ///
    /// * `latent` - Tensor with `noise_dim` elements per sample, e.g. (batch, noise_dim, 1, 1)
    /// * `transition` - Fade-in progress of the newest stage, in [0, 1]
    ///
    /// # Returns
    ///
    /// Tensor of shape (batch, image_channels, imsize, imsize)
    pub fn forward(&self, latent: &Tensor, transition: f64) -> Result<Tensor> {
        check_transition(transition)?;

        let size = latent.size();
        if size.len() < 2 {
            return Err(PganError::InvalidArgument(format!(
                "latent must have a batch dimension and a feature dimension, got shape {:?}",
                size
            )));
        }
        let batch_size = size[0];
        if batch_size == 0 {
            return Err(PganError::InvalidArgument("latent batch is empty".to_string()));
        }
        let x = latent.view([batch_size, -1]);
        let latent_dim = x.size()[1];
        if latent_dim != self.config.noise_dim {
            return Err(PganError::InvalidArgument(format!(
                "latent has {} features per sample, generator expects {}",
                latent_dim, self.config.noise_dim
            )));
        }

        let x = self.first_block.forward(&x);
        let x = x.view([batch_size, -1, BASE_RESOLUTION, BASE_RESOLUTION]);
        let x = self.core_model.forward(&x);

        let x_new = self.to_rgb_new.forward(&self.new_block.forward(&x));
        match &self.to_rgb_old {
            Some(to_rgb_old) => blend(&to_rgb_old.forward(&x), &x_new, transition),
            None => Ok(x_new),
        }
    }

    /// Double the output resolution by adding a stage of `output_channels` features.
    ///
    /// The stage that was fading in becomes part of the stable core, followed by
    /// a 2x upsample. The current `to_rgb_new` becomes `to_rgb_old`, so running
    /// the grown network at `t = 0` reproduces the previous output upsampled.
    ///
    /// `vs` must point into the same VarStore the generator was built with; new
    /// parameters are created on that store's device. Calling this twice
    /// without training in between grows the network twice.
    pub fn extend(&mut self, vs: &nn::Path, output_channels: i64) -> Result<()> {
        if output_channels <= 0 {
            return Err(PganError::InvalidArgument(format!(
                "stage width must be positive, got {}",
                output_channels
            )));
        }

        let input_channels = self.to_rgb_new.in_channels();
        let stage = self.growth_history.len() + 1;

        let finished = std::mem::take(&mut self.new_block);
        self.core_model.push(finished);
        self.core_model.push(Upsample2x);

        let path = vs.sub(format!("stage_{}", stage));
        let mut new_block = StageStack::new();
        new_block.push(conv_norm_act(
            &path.sub("conv_0"),
            input_channels,
            output_channels,
            3,
            1,
            self.config.layers,
        ));
        new_block.push(conv_norm_act(
            &path.sub("conv_1"),
            output_channels,
            output_channels,
            3,
            1,
            self.config.layers,
        ));
        self.new_block = new_block;

        let to_rgb = EqualizedConv2d::new(
            &vs.sub(format!("to_rgb_{}", stage)),
            output_channels,
            self.config.image_channels,
            1,
            0,
        );
        self.to_rgb_old = Some(std::mem::replace(&mut self.to_rgb_new, to_rgb));

        self.current_imsize *= 2;
        self.growth_history.push(output_channels);

        debug!("Generator stage {} allocated on {:?}", stage, vs.device());
        info!(
            "Generator extended to {}x{} ({} -> {} channels)",
            self.current_imsize, self.current_imsize, input_channels, output_channels
        );
        Ok(())
    }

    /// Output resolution when fully faded in
    pub fn current_imsize(&self) -> i64 {
        self.current_imsize
    }

    /// Feature width entering the newest projection
    pub fn current_channels(&self) -> i64 {
        self.to_rgb_new.in_channels()
    }

    /// Widths passed to every `extend` call so far
    pub fn growth_history(&self) -> &[i64] {
        &self.growth_history
    }

    /// True while a newly added stage is being faded in
    pub fn is_transitioning(&self) -> bool {
        self.to_rgb_old.is_some()
    }

    /// Number of stages in the stable core
    pub fn num_stable_stages(&self) -> usize {
        self.core_model.len()
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }
}
