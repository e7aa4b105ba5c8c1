//! Image preprocessing for progressive GAN training
//!
//! This module provides functions for:
//! - Moving NCHW batches between `ndarray` and tensors
//! - Normalizing pixels to [-1, 1] and back
//! - Fading real images between resolutions in step with the networks

use ndarray::Array4;
use tch::{kind::Element, nn::Module, Device, Kind, Tensor};

use super::loader::RawBatch;
use crate::error::{PganError, Result};
use crate::model::{blend, AvgPool2x, Upsample2x};

/// One preprocessed training sample batch, ready for the networks
#[derive(Debug)]
pub struct Sample {
    /// Real images in [-1, 1], (batch, channels, height, width)
    pub image: Tensor,
    /// Condition images in [-1, 1], same shape as `image`
    pub condition: Tensor,
    /// Landmark coordinates truncated to the pose size, (batch, pose_size)
    pub landmark: Tensor,
}

/// Copy a (batch, channels, height, width) array into a tensor
pub fn array_to_tensor<T: Element + Clone>(array: &Array4<T>) -> Result<Tensor> {
    let (n, c, h, w) = array.dim();
    let contiguous = array.as_standard_layout();
    let data = contiguous
        .as_slice()
        .ok_or_else(|| PganError::InvalidArgument("array is not contiguous".to_string()))?;
    Ok(Tensor::from_slice(data).view([n as i64, c as i64, h as i64, w as i64]))
}

/// Copy a 4-D tensor into a float array on the host
pub fn tensor_to_array(tensor: &Tensor) -> Result<Array4<f32>> {
    let tensor = tensor
        .to_device(Device::Cpu)
        .to_kind(Kind::Float)
        .contiguous();
    let (n, c, h, w) = tensor.size4()?;
    let numel = tensor.numel();

    let mut data = vec![0f32; numel];
    tensor.f_copy_data(&mut data, numel)?;

    Array4::from_shape_vec((n as usize, c as usize, h as usize, w as usize), data)
        .map_err(|e| PganError::InvalidArgument(e.to_string()))
}

/// Map pixel values from [0, 255] to [-1, 1]
pub fn normalize_images(images: &Tensor) -> Tensor {
    images.to_kind(Kind::Float) / 255.0 * 2.0 - 1.0
}

/// Map network output from [-1, 1] back to [0, 1], clipping anything outside
pub fn denormalize_images(images: &Tensor) -> Tensor {
    ((images + 1.0) / 2.0).clamp_min(0.0).clamp_max(1.0)
}

/// Fade the finest level of detail of real images in with the transition value.
///
/// At `t = 0` every 2x2 block is replaced by its mean, matching what a
/// generator that has just grown can produce; at `t = 1` images pass through
/// unchanged.
pub fn interpolate_image(images: &Tensor, transition: f64) -> Result<Tensor> {
    let coarse = Upsample2x.forward(&AvgPool2x.forward(images));
    blend(&coarse, images, transition)
}

/// Normalize a raw batch, fade its images, and move it to `device`.
///
/// Landmarks are truncated to their first `pose_size` values.
pub fn preprocess_batch(
    batch: &RawBatch,
    transition: f64,
    pose_size: usize,
    device: Device,
) -> Result<Sample> {
    let image = normalize_images(&array_to_tensor(&batch.images)?.to_device(device));
    let condition = normalize_images(&array_to_tensor(&batch.conditions)?.to_device(device));

    let (rows, cols) = batch.landmarks.dim();
    let contiguous = batch.landmarks.as_standard_layout();
    let values = contiguous
        .as_slice()
        .ok_or_else(|| PganError::InvalidArgument("landmarks are not contiguous".to_string()))?;
    let landmark = Tensor::from_slice(values)
        .view([rows as i64, cols as i64])
        .narrow(1, 0, pose_size.min(cols) as i64)
        .to_device(device);

    Ok(Sample {
        image: interpolate_image(&image, transition)?,
        condition: interpolate_image(&condition, transition)?,
        landmark,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_array_tensor_roundtrip_preserves_layout() {
        let array = Array4::<f32>::from_shape_fn((2, 3, 4, 5), |(n, c, h, w)| {
            (n * 1000 + c * 100 + h * 10 + w) as f32
        });
        let tensor = array_to_tensor(&array).unwrap();

        assert_eq!(tensor.size(), vec![2, 3, 4, 5]);
        assert_eq!(tensor.double_value(&[1, 2, 3, 4]), 1234.0);
        assert_eq!(tensor_to_array(&tensor).unwrap(), array);
    }

    #[test]
    fn test_normalize_denormalize() {
        let pixels = Tensor::from_slice(&[0u8, 255, 51]);
        let normalized = normalize_images(&pixels);
        let expected = Tensor::from_slice(&[-1.0f32, 1.0, -0.6]);
        assert!(normalized.allclose(&expected, 1e-5, 1e-6, false));

        let back = denormalize_images(&Tensor::from_slice(&[-1.5f32, -1.0, 0.0, 1.0, 2.0]));
        let expected = Tensor::from_slice(&[0.0f32, 0.0, 0.5, 1.0, 1.0]);
        assert!(back.allclose(&expected, 1e-6, 1e-6, false));
    }

    #[test]
    fn test_interpolate_image_endpoints() {
        let images = Tensor::randn([2, 1, 8, 8], (Kind::Float, Device::Cpu));

        let full = interpolate_image(&images, 1.0).unwrap();
        assert!(full.allclose(&images, 1e-6, 1e-7, false));

        let coarse = interpolate_image(&images, 0.0).unwrap();
        let block_mean = AvgPool2x.forward(&images);
        assert!(AvgPool2x.forward(&coarse).allclose(&block_mean, 1e-5, 1e-6, false));
        // Every 2x2 block of the coarse image is constant.
        assert!(coarse.allclose(&Upsample2x.forward(&block_mean), 1e-6, 1e-7, false));
    }

    #[test]
    fn test_preprocess_batch() {
        let batch = RawBatch {
            images: Array4::<u8>::from_elem((3, 1, 4, 4), 255),
            conditions: Array4::<u8>::zeros((3, 1, 4, 4)),
            landmarks: Array2::<f32>::from_shape_fn((3, 14), |(_, j)| j as f32),
        };

        let sample = preprocess_batch(&batch, 0.5, 7, Device::Cpu).unwrap();
        assert_eq!(sample.image.size(), vec![3, 1, 4, 4]);
        assert_eq!(sample.landmark.size(), vec![3, 7]);
        assert_eq!(sample.image.double_value(&[0, 0, 0, 0]), 1.0);
        assert_eq!(sample.condition.double_value(&[2, 0, 3, 3]), -1.0);
        assert_eq!(sample.landmark.double_value(&[1, 6]), 6.0);
    }
}
