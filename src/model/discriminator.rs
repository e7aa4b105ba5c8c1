//! Growable discriminator
//!
//! Mirrors the generator in the opposite direction: image in, one logit out.
//! Each extension doubles the expected input resolution. The new entry
//! projection and down-sampling stage are faded in, while the old path first
//! average-pools the larger image and then runs the previously trained
//! pipeline unchanged.

use serde::{Deserialize, Serialize};
use tch::{nn, nn::Module, Tensor};
use tracing::{debug, info};

use super::layers::{conv_act, conv_norm_act, AvgPool2x, ConvBlock, LayerOptions, StageStack};
use super::transition::{blend, check_transition};
use crate::error::{PganError, Result};

/// Discriminator network configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscriminatorConfig {
    /// Channels of the input image
    pub image_channels: i64,
    /// Input resolution before any growth
    pub imsize: i64,
    /// Feature width of the base stage and of the pooled output vector
    pub base_channels: i64,
    /// Activation and normalization settings
    pub layers: LayerOptions,
}

impl Default for DiscriminatorConfig {
    fn default() -> Self {
        Self {
            image_channels: 1,
            imsize: 4,
            base_channels: 128,
            layers: LayerOptions::default(),
        }
    }
}

/// Discriminator network
///
/// Forward pass:
/// 1. Two feature candidates, `from_rgb_old(image)` and
///    `new_block(from_rgb_new(image))`, blended with the transition value
/// 2. The stable core (every fully faded-in stage, high to low resolution)
/// 3. Flatten to `base_channels` features and project to a single logit
#[derive(Debug)]
pub struct Discriminator {
    config: DiscriminatorConfig,
    /// `None` until the first extension: old and new projection coincide.
    from_rgb_old: Option<StageStack>,
    from_rgb_new: ConvBlock,
    new_block: StageStack,
    core_model: StageStack,
    output_layer: nn::Linear,
    current_imsize: i64,
    growth_history: Vec<i64>,
}

impl Discriminator {
    /// Create a discriminator for `config.imsize` inputs whose parameters live under `vs`
    pub fn new(vs: &nn::Path, config: DiscriminatorConfig) -> Self {
        let base = config.base_channels;

        let from_rgb_new = conv_act(
            &vs.sub("from_rgb_0"),
            config.image_channels,
            base,
            1,
            0,
            config.layers,
        );

        // The last convolution spans the whole base resolution, leaving 1x1.
        let path = vs.sub("stage_0");
        let mut core_model = StageStack::new();
        core_model.push(conv_act(&path.sub("conv_0"), base, base, 3, 1, config.layers));
        core_model.push(conv_act(
            &path.sub("conv_1"),
            base,
            base,
            config.imsize,
            0,
            config.layers,
        ));

        let output_layer = nn::linear(vs / "output_layer", base, 1, Default::default());

        Self {
            current_imsize: config.imsize,
            config,
            from_rgb_old: None,
            from_rgb_new,
            new_block: StageStack::new(),
            core_model,
            output_layer,
            growth_history: Vec::new(),
        }
    }

    /// Score a batch of images
    ///
    /// # Arguments
    ///
    /// * `images` - Tensor of shape (batch, image_channels, imsize, imsize)
    /// * `transition` - Fade-in progress of the newest stage, in [0, 1]
    ///
    /// # Returns
    ///
    /// Tensor of shape (batch, 1) with logits
    pub fn forward(&self, images: &Tensor, transition: f64) -> Result<Tensor> {
        check_transition(transition)?;

        let size = images.size();
        if size.len() != 4 {
            return Err(PganError::InvalidArgument(format!(
                "expected a (batch, channels, height, width) image batch, got shape {:?}",
                size
            )));
        }
        if size[0] == 0 {
            return Err(PganError::InvalidArgument("image batch is empty".to_string()));
        }
        if size[1] != self.config.image_channels {
            return Err(PganError::InvalidArgument(format!(
                "expected {} image channels, got {}",
                self.config.image_channels, size[1]
            )));
        }
        if size[2] != self.current_imsize || size[3] != self.current_imsize {
            return Err(PganError::ResolutionMismatch {
                expected: self.current_imsize,
                actual: size[2],
            });
        }

        let x_new = self.new_block.forward(&self.from_rgb_new.forward(images));
        let x = match &self.from_rgb_old {
            Some(from_rgb_old) => blend(&from_rgb_old.forward(images), &x_new, transition)?,
            None => x_new,
        };

        let x = self.core_model.forward(&x);
        let x = x.view([-1, self.config.base_channels]);
        Ok(self.output_layer.forward(&x))
    }

    /// Double the input resolution by adding a stage that reads `input_channels` features.
    ///
    /// The stage that was fading in is committed in front of the stable core.
    /// The old entry path becomes "average-pool 2x, then the previous
    /// `from_rgb_new`", so at `t = 0` a doubled-resolution image is scored
    /// exactly like its downsampled version was before the extension.
    ///
    /// `vs` must point into the same VarStore the discriminator was built with.
    pub fn extend(&mut self, vs: &nn::Path, input_channels: i64) -> Result<()> {
        if input_channels <= 0 {
            return Err(PganError::InvalidArgument(format!(
                "stage width must be positive, got {}",
                input_channels
            )));
        }

        self.current_imsize *= 2;
        let output_channels = self.from_rgb_new.out_channels();
        let stage = self.growth_history.len() + 1;

        let finished = std::mem::take(&mut self.new_block);
        self.core_model.prepend_boxed(Box::new(finished));

        let from_rgb = conv_act(
            &vs.sub(format!("from_rgb_{}", stage)),
            self.config.image_channels,
            input_channels,
            1,
            0,
            self.config.layers,
        );
        let previous = std::mem::replace(&mut self.from_rgb_new, from_rgb);
        let mut from_rgb_old = StageStack::new();
        from_rgb_old.push(AvgPool2x);
        from_rgb_old.push(previous);
        self.from_rgb_old = Some(from_rgb_old);

        let path = vs.sub(format!("stage_{}", stage));
        let mut new_block = StageStack::new();
        new_block.push(conv_norm_act(
            &path.sub("conv_0"),
            input_channels,
            input_channels,
            3,
            1,
            self.config.layers,
        ));
        new_block.push(conv_norm_act(
            &path.sub("conv_1"),
            input_channels,
            output_channels,
            3,
            1,
            self.config.layers,
        ));
        new_block.push(AvgPool2x);
        self.new_block = new_block;

        self.growth_history.push(input_channels);

        debug!("Discriminator stage {} allocated on {:?}", stage, vs.device());
        info!(
            "Discriminator extended to {}x{} ({} -> {} channels)",
            self.current_imsize, self.current_imsize, input_channels, output_channels
        );
        Ok(())
    }

    /// Classify samples, returning the probability of being real
    pub fn classify(&self, images: &Tensor, transition: f64) -> Result<Tensor> {
        Ok(self.forward(images, transition)?.sigmoid())
    }

    /// Input resolution the network currently expects
    pub fn current_imsize(&self) -> i64 {
        self.current_imsize
    }

    /// Feature width produced by the newest entry projection
    pub fn current_channels(&self) -> i64 {
        self.from_rgb_new.out_channels()
    }

    /// Widths passed to every `extend` call so far
    pub fn growth_history(&self) -> &[i64] {
        &self.growth_history
    }

    /// True while a newly added stage is being faded in
    pub fn is_transitioning(&self) -> bool {
        self.from_rgb_old.is_some()
    }

    pub fn config(&self) -> &DiscriminatorConfig {
        &self.config
    }
}
