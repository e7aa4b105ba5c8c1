//! Data module for feeding real images to the networks
//!
//! This module provides:
//! - The `DataSource` boundary and an in-memory `DataLoader`
//! - Image normalization and resolution fading

mod loader;
mod preprocessing;

pub use loader::{DataLoader, DataLoaderIter, DataSource, RawBatch};
pub use preprocessing::{
    array_to_tensor, denormalize_images, interpolate_image, normalize_images, preprocess_batch,
    tensor_to_array, Sample,
};
