//! Building blocks shared by the growable generator and discriminator
//!
//! Every stage a network grows is assembled from these pieces: an equalized
//! convolution, per-pixel feature normalization, a leaky ReLU and fixed 2x
//! resampling. Stages are kept as boxed `nn::Module` values in a [`StageStack`]
//! so that growth can move them between the "new" and "stable" parts of a
//! network without rebuilding anything.

use serde::{Deserialize, Serialize};
use tch::{nn, nn::Module, Kind, Tensor};

/// Gain of the He initializer for leaky ReLU networks.
///
/// Used as the initial per-channel magnitude of every [`EqualizedConv2d`].
pub const HE_GAIN: f64 = std::f64::consts::SQRT_2;

/// Activation and normalization settings shared by every grown stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerOptions {
    /// Negative slope of the leaky ReLU
    pub leaky_slope: f64,
    /// Stands in for a zero mean square in pixel norm; must be positive
    pub pixel_norm_eps: f64,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            leaky_slope: 0.2,
            pixel_norm_eps: 1e-8,
        }
    }
}

/// 2D convolution with weight-norm reparametrization.
///
/// The kernel is stored as a direction `weight_v` (drawn from N(0, 1), so its
/// magnitude does not depend on the kernel size) and a per-output-channel
/// magnitude `weight_g`. The kernel actually applied is
/// `g * v / ||v||`, recomputed on every forward pass. With `g` starting at
/// [`HE_GAIN`] each element of the effective kernel has scale
/// `sqrt(2 / fan_in)`, which is the equalized learning rate constant.
#[derive(Debug)]
pub struct EqualizedConv2d {
    weight_v: Tensor,
    weight_g: Tensor,
    bias: Tensor,
    in_channels: i64,
    out_channels: i64,
    kernel_size: i64,
    padding: i64,
}

impl EqualizedConv2d {
    /// Create a convolution with a standard normal direction tensor
    pub fn new(
        vs: &nn::Path,
        in_channels: i64,
        out_channels: i64,
        kernel_size: i64,
        padding: i64,
    ) -> Self {
        Self::with_init(
            vs,
            in_channels,
            out_channels,
            kernel_size,
            padding,
            nn::Init::Randn {
                mean: 0.0,
                stdev: 1.0,
            },
        )
    }

    /// Create a convolution whose direction tensor uses the given initializer
    pub fn with_init(
        vs: &nn::Path,
        in_channels: i64,
        out_channels: i64,
        kernel_size: i64,
        padding: i64,
        init: nn::Init,
    ) -> Self {
        let weight_v = vs.var(
            "weight_v",
            &[out_channels, in_channels, kernel_size, kernel_size],
            init,
        );
        let weight_g = vs.var("weight_g", &[out_channels, 1, 1, 1], nn::Init::Const(HE_GAIN));
        let bias = vs.zeros("bias", &[out_channels]);

        Self {
            weight_v,
            weight_g,
            bias,
            in_channels,
            out_channels,
            kernel_size,
            padding,
        }
    }

    /// Kernel applied at forward time: `g * v / ||v||`
    pub fn effective_weight(&self) -> Tensor {
        let norm = self
            .weight_v
            .square()
            .sum_dim_intlist([1i64, 2, 3].as_slice(), true, Kind::Float)
            .sqrt();
        &self.weight_g * &self.weight_v / norm
    }

    /// Stored parameter pair `(direction, magnitude)` seen by the optimizer
    pub fn parameters(&self) -> (&Tensor, &Tensor) {
        (&self.weight_v, &self.weight_g)
    }

    pub fn bias(&self) -> &Tensor {
        &self.bias
    }

    pub fn in_channels(&self) -> i64 {
        self.in_channels
    }

    pub fn out_channels(&self) -> i64 {
        self.out_channels
    }

    pub fn kernel_size(&self) -> i64 {
        self.kernel_size
    }

    /// Number of inputs feeding each output element
    pub fn fan_in(&self) -> i64 {
        self.in_channels * self.kernel_size * self.kernel_size
    }
}

impl Module for EqualizedConv2d {
    fn forward(&self, xs: &Tensor) -> Tensor {
        xs.conv2d(
            &self.effective_weight(),
            Some(&self.bias),
            [1, 1],
            [self.padding, self.padding],
            [1, 1],
            1,
        )
    }
}

/// Divides each pixel's channel vector by its root mean square.
///
/// `eps` is only added where the mean square is exactly zero, so every
/// non-zero vector comes out with unit RMS however small it is, and a zero
/// vector stays zero.
#[derive(Debug, Clone, Copy)]
pub struct PixelwiseNorm {
    eps: f64,
}

impl PixelwiseNorm {
    pub fn new(eps: f64) -> Self {
        Self { eps }
    }
}

impl Default for PixelwiseNorm {
    fn default() -> Self {
        Self::new(LayerOptions::default().pixel_norm_eps)
    }
}

impl Module for PixelwiseNorm {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let mean_square = xs
            .square()
            .mean_dim(Some([1i64].as_slice()), true, Kind::Float);
        let zero = mean_square.eq(0.0).to_kind(mean_square.kind());
        xs / (&mean_square + zero * self.eps).sqrt()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LeakyRelu {
    slope: f64,
}

impl LeakyRelu {
    /// `slope` must lie in [0, 1]
    pub fn new(slope: f64) -> Self {
        Self { slope }
    }
}

impl Module for LeakyRelu {
    fn forward(&self, xs: &Tensor) -> Tensor {
        xs.maximum(&(xs * self.slope))
    }
}

/// Nearest-neighbour 2x spatial upsampling
#[derive(Debug, Clone, Copy, Default)]
pub struct Upsample2x;

impl Module for Upsample2x {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let size = xs.size();
        let (height, width) = (size[size.len() - 2], size[size.len() - 1]);
        xs.upsample_nearest2d([height * 2, width * 2], 2.0, 2.0)
    }
}

/// 2x2 average pooling with stride 2
#[derive(Debug, Clone, Copy, Default)]
pub struct AvgPool2x;

impl Module for AvgPool2x {
    fn forward(&self, xs: &Tensor) -> Tensor {
        xs.avg_pool2d([2, 2], [2, 2], [0, 0], false, true, None::<i64>)
    }
}

/// Convolution followed by optional pixel norm and a leaky ReLU
#[derive(Debug)]
pub struct ConvBlock {
    conv: EqualizedConv2d,
    norm: Option<PixelwiseNorm>,
    activation: LeakyRelu,
}

impl ConvBlock {
    pub fn conv(&self) -> &EqualizedConv2d {
        &self.conv
    }

    pub fn out_channels(&self) -> i64 {
        self.conv.out_channels()
    }

    pub fn is_normalized(&self) -> bool {
        self.norm.is_some()
    }
}

impl Module for ConvBlock {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let xs = self.conv.forward(xs);
        let xs = match &self.norm {
            Some(norm) => norm.forward(&xs),
            None => xs,
        };
        self.activation.forward(&xs)
    }
}

/// Conv -> PixelwiseNorm -> LeakyReLU, the unit every grown stage is made of
pub fn conv_norm_act(
    vs: &nn::Path,
    in_channels: i64,
    out_channels: i64,
    kernel_size: i64,
    padding: i64,
    options: LayerOptions,
) -> ConvBlock {
    ConvBlock {
        conv: EqualizedConv2d::new(vs, in_channels, out_channels, kernel_size, padding),
        norm: Some(PixelwiseNorm::new(options.pixel_norm_eps)),
        activation: LeakyRelu::new(options.leaky_slope),
    }
}

/// Conv -> LeakyReLU, used for discriminator entry projections and its base stage
pub fn conv_act(
    vs: &nn::Path,
    in_channels: i64,
    out_channels: i64,
    kernel_size: i64,
    padding: i64,
    options: LayerOptions,
) -> ConvBlock {
    ConvBlock {
        conv: EqualizedConv2d::new(vs, in_channels, out_channels, kernel_size, padding),
        norm: None,
        activation: LeakyRelu::new(options.leaky_slope),
    }
}

/// Ordered list of stages applied one after another.
///
/// An empty stack is the identity. Growth moves whole stacks around with
/// [`StageStack::push_boxed`] and [`StageStack::prepend_boxed`].
#[derive(Debug, Default)]
pub struct StageStack {
    stages: Vec<Box<dyn Module>>,
}

impl StageStack {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a stage to the end of the stack
    pub fn push<M>(&mut self, stage: M)
    where
        M: Module + 'static,
    {
        self.stages.push(Box::new(stage));
    }

    pub fn push_boxed(&mut self, stage: Box<dyn Module>) {
        self.stages.push(stage);
    }

    /// Insert a stage so that it runs before everything already in the stack
    pub fn prepend_boxed(&mut self, stage: Box<dyn Module>) {
        self.stages.insert(0, stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Module for StageStack {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let mut out = xs.shallow_clone();
        for stage in &self.stages {
            out = stage.forward(&out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn::VarStore, Device};

    fn opts() -> (Kind, Device) {
        (Kind::Float, Device::Cpu)
    }

    #[test]
    fn test_equalized_conv_output_shape() {
        let vs = VarStore::new(Device::Cpu);
        let conv = EqualizedConv2d::new(&vs.root(), 8, 16, 3, 1);

        let x = Tensor::randn([2, 8, 6, 6], opts());
        assert_eq!(conv.forward(&x).size(), vec![2, 16, 6, 6]);

        let conv = EqualizedConv2d::new(&vs.root().sub("valid"), 8, 4, 4, 0);
        let x = Tensor::randn([2, 8, 4, 4], opts());
        assert_eq!(conv.forward(&x).size(), vec![2, 4, 1, 1]);
    }

    #[test]
    fn test_equalized_conv_starts_with_zero_bias_and_he_norm() {
        let vs = VarStore::new(Device::Cpu);
        let conv = EqualizedConv2d::new(&vs.root(), 32, 8, 3, 1);

        assert_eq!(conv.bias().abs().sum(Kind::Float).double_value(&[]), 0.0);

        // Each output filter of the effective kernel has L2 norm equal to g.
        let norms = conv
            .effective_weight()
            .square()
            .sum_dim_intlist([1i64, 2, 3].as_slice(), false, Kind::Float)
            .sqrt();
        let expected = Tensor::full([8], HE_GAIN, opts());
        assert!(norms.allclose(&expected, 1e-5, 1e-5, false));
        assert_eq!(conv.fan_in(), 32 * 9);
    }

    #[test]
    fn test_equalized_conv_scale_independent_of_raw_magnitude() {
        let vs = VarStore::new(Device::Cpu);
        let conv = EqualizedConv2d::new(&vs.root(), 4, 4, 3, 1);
        let before = conv.effective_weight();

        let (v, _) = conv.parameters();
        tch::no_grad(|| {
            let scaled = v * 10.0;
            let _ = v.shallow_clone().copy_(&scaled);
        });

        let after = conv.effective_weight();
        assert!(before.allclose(&after, 1e-5, 1e-6, false));
    }

    #[test]
    fn test_pixelwise_norm_unit_rms() {
        let x = Tensor::randn([3, 16, 5, 5], opts()) * 7.0;
        let y = PixelwiseNorm::default().forward(&x);

        let rms = y
            .square()
            .mean_dim(Some([1i64].as_slice()), false, Kind::Float)
            .sqrt();
        let ones = Tensor::ones([3, 5, 5], opts());
        assert!(rms.allclose(&ones, 1e-4, 1e-4, false));
    }

    #[test]
    fn test_pixelwise_norm_tiny_vectors_reach_unit_rms() {
        let x = Tensor::full([2, 8, 3, 3], 1e-5, opts());
        let y = PixelwiseNorm::default().forward(&x);

        let rms = y
            .square()
            .mean_dim(Some([1i64].as_slice()), false, Kind::Float)
            .sqrt();
        let ones = Tensor::ones([2, 3, 3], opts());
        assert!(rms.allclose(&ones, 1e-4, 1e-4, false));
    }

    #[test]
    fn test_pixelwise_norm_zero_vector_stays_zero() {
        let x = Tensor::zeros([1, 4, 2, 2], opts());
        let y = PixelwiseNorm::default().forward(&x);

        assert_eq!(y.isfinite().all().int64_value(&[]), 1);
        assert_eq!(y.abs().sum(Kind::Float).double_value(&[]), 0.0);
    }

    #[test]
    fn test_leaky_relu() {
        let x = Tensor::from_slice(&[-2.0f32, -0.5, 0.0, 3.0]);
        let y = LeakyRelu::new(0.2).forward(&x);
        let expected = Tensor::from_slice(&[-0.4f32, -0.1, 0.0, 3.0]);
        assert!(y.allclose(&expected, 1e-6, 1e-6, false));
    }

    #[test]
    fn test_resampling_shapes_and_values() {
        let x = Tensor::arange(16, opts()).view([1, 1, 4, 4]);

        let up = Upsample2x.forward(&x);
        assert_eq!(up.size(), vec![1, 1, 8, 8]);
        assert_eq!(up.double_value(&[0, 0, 1, 1]), x.double_value(&[0, 0, 0, 0]));
        assert_eq!(up.double_value(&[0, 0, 7, 6]), x.double_value(&[0, 0, 3, 3]));

        // Pooling an upsampled tensor gives back the original.
        let down = AvgPool2x.forward(&up);
        assert_eq!(down.size(), vec![1, 1, 4, 4]);
        assert!(down.allclose(&x, 1e-6, 1e-6, false));
    }

    #[test]
    fn test_conv_blocks() {
        let vs = VarStore::new(Device::Cpu);
        let options = LayerOptions::default();
        let normalized = conv_norm_act(&vs.root().sub("a"), 3, 8, 3, 1, options);
        let plain = conv_act(&vs.root().sub("b"), 3, 8, 1, 0, options);

        assert!(normalized.is_normalized());
        assert!(!plain.is_normalized());
        assert_eq!(normalized.out_channels(), 8);

        let x = Tensor::randn([2, 3, 4, 4], opts());
        assert_eq!(normalized.forward(&x).size(), vec![2, 8, 4, 4]);
        assert_eq!(plain.forward(&x).size(), vec![2, 8, 4, 4]);
    }

    #[test]
    fn test_stage_stack_order() {
        let x = Tensor::ones([1, 1, 2, 2], opts());

        let empty = StageStack::new();
        assert!(empty.is_empty());
        assert!(empty.forward(&x).equal(&x));

        let mut stack = StageStack::new();
        stack.push(Upsample2x);
        stack.prepend_boxed(Box::new(AvgPool2x));
        assert_eq!(stack.len(), 2);

        // Pool first (2x2 -> 1x1), then upsample (1x1 -> 2x2).
        assert_eq!(stack.forward(&x).size(), vec![1, 1, 2, 2]);
    }
}
