//! Model module containing the progressive GAN architecture
//!
//! This module provides:
//! - Layer primitives (equalized convolution, pixel norm, resampling, stage stacks)
//! - The transition blender used to fade new stages in
//! - Growable Generator and Discriminator networks
//! - ProgressiveGan wrapper growing both networks in lockstep

pub mod layers;
pub mod transition;
mod generator;
mod discriminator;
mod pgan;

pub use discriminator::{Discriminator, DiscriminatorConfig};
pub use generator::{Generator, GeneratorConfig, BASE_RESOLUTION};
pub use layers::{
    conv_act, conv_norm_act, AvgPool2x, ConvBlock, EqualizedConv2d, LayerOptions, LeakyRelu,
    PixelwiseNorm, StageStack, Upsample2x,
};
pub use pgan::{GrowthState, ProgressiveGan};
pub use transition::blend;
