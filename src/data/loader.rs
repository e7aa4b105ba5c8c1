//! Data sources for progressive GAN training
//!
//! The training loop only needs something that hands out batches of
//! `(image, condition, landmark)` triples. [`DataLoader`] serves them from
//! memory with optional shuffling:
//! - Random shuffling
//! - Drop last incomplete batch
//! - Iteration over batches

use ndarray::{Array2, Array4, Axis};
use rand::seq::SliceRandom;

use crate::error::{PganError, Result};

/// One batch of raw samples, images as (batch, channels, height, width) in [0, 255]
#[derive(Debug, Clone)]
pub struct RawBatch {
    pub images: Array4<u8>,
    pub conditions: Array4<u8>,
    pub landmarks: Array2<f32>,
}

impl RawBatch {
    pub fn len(&self) -> usize {
        self.images.shape()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Anything that produces training batches
pub trait DataSource {
    /// Next batch of the current epoch, `None` when the epoch is done
    fn next_batch(&mut self) -> Option<RawBatch>;

    /// Start a new epoch
    fn reset(&mut self);

    /// Number of batches per epoch
    fn num_batches(&self) -> usize;
}

/// In-memory data source
pub struct DataLoader {
    images: Array4<u8>,
    conditions: Array4<u8>,
    landmarks: Array2<f32>,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    indices: Vec<usize>,
    current_idx: usize,
}

impl DataLoader {
    /// Create a new DataLoader
    ///
    /// # Arguments
    ///
    /// * `images` - Array of shape (num_samples, channels, height, width)
    /// * `conditions` - Condition images, same number of samples as `images`
    /// * `landmarks` - Array of shape (num_samples, num_landmark_values)
    /// * `batch_size` - Number of samples per batch
    /// * `shuffle` - Whether to shuffle data each epoch
    /// * `drop_last` - Whether to drop incomplete final batch
    pub fn new(
        images: Array4<u8>,
        conditions: Array4<u8>,
        landmarks: Array2<f32>,
        batch_size: usize,
        shuffle: bool,
        drop_last: bool,
    ) -> Result<Self> {
        let num_samples = images.shape()[0];
        if conditions.shape()[0] != num_samples || landmarks.nrows() != num_samples {
            return Err(PganError::InvalidArgument(format!(
                "sample counts differ: {} images, {} conditions, {} landmarks",
                num_samples,
                conditions.shape()[0],
                landmarks.nrows()
            )));
        }
        if batch_size == 0 {
            return Err(PganError::InvalidArgument("batch size must be > 0".to_string()));
        }

        let mut loader = Self {
            images,
            conditions,
            landmarks,
            batch_size,
            shuffle,
            drop_last,
            indices: (0..num_samples).collect(),
            current_idx: 0,
        };

        if shuffle {
            loader.shuffle_indices();
        }

        Ok(loader)
    }

    pub fn num_samples(&self) -> usize {
        self.indices.len()
    }

    /// Side length of the stored images
    pub fn imsize(&self) -> usize {
        self.images.shape()[2]
    }

    fn shuffle_indices(&mut self) {
        let mut rng = rand::thread_rng();
        self.indices.shuffle(&mut rng);
    }

    /// Iterate over the batches of one epoch
    pub fn iter(&mut self) -> DataLoaderIter<'_> {
        self.reset();
        DataLoaderIter { loader: self }
    }
}

impl DataSource for DataLoader {
    fn next_batch(&mut self) -> Option<RawBatch> {
        let num_samples = self.indices.len();
        let start = self.current_idx;

        if start >= num_samples {
            return None;
        }

        let end = (start + self.batch_size).min(num_samples);
        if self.drop_last && end - start < self.batch_size {
            return None;
        }

        let picked = &self.indices[start..end];
        let batch = RawBatch {
            images: self.images.select(Axis(0), picked),
            conditions: self.conditions.select(Axis(0), picked),
            landmarks: self.landmarks.select(Axis(0), picked),
        };

        self.current_idx = end;
        Some(batch)
    }

    fn reset(&mut self) {
        self.current_idx = 0;
        if self.shuffle {
            self.shuffle_indices();
        }
    }

    fn num_batches(&self) -> usize {
        let num_samples = self.indices.len();
        if self.drop_last {
            num_samples / self.batch_size
        } else {
            (num_samples + self.batch_size - 1) / self.batch_size
        }
    }
}

/// Iterator adapter for DataLoader
pub struct DataLoaderIter<'a> {
    loader: &'a mut DataLoader,
}

impl<'a> Iterator for DataLoaderIter<'a> {
    type Item = RawBatch;

    fn next(&mut self) -> Option<Self::Item> {
        self.loader.next_batch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader(num_samples: usize, batch_size: usize, shuffle: bool, drop_last: bool) -> DataLoader {
        let images = Array4::<u8>::from_shape_fn((num_samples, 1, 4, 4), |(n, _, _, _)| n as u8);
        let conditions = Array4::<u8>::zeros((num_samples, 1, 4, 4));
        let landmarks = Array2::<f32>::zeros((num_samples, 14));
        DataLoader::new(images, conditions, landmarks, batch_size, shuffle, drop_last).unwrap()
    }

    #[test]
    fn test_dataloader_basic() {
        let mut loader = loader(10, 3, false, false);

        assert_eq!(loader.num_batches(), 4);
        assert_eq!(loader.num_samples(), 10);
        assert_eq!(loader.imsize(), 4);

        let sizes: Vec<usize> = loader.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![3, 3, 3, 1]);
    }

    #[test]
    fn test_dataloader_drop_last() {
        let mut loader = loader(10, 3, false, true);

        assert_eq!(loader.num_batches(), 3);
        let batches: Vec<_> = loader.iter().collect();
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.len() == 3));
    }

    #[test]
    fn test_shuffle_keeps_triples_aligned() {
        let num_samples = 8;
        let images = Array4::<u8>::from_shape_fn((num_samples, 1, 2, 2), |(n, _, _, _)| n as u8);
        let conditions =
            Array4::<u8>::from_shape_fn((num_samples, 1, 2, 2), |(n, _, _, _)| 100 + n as u8);
        let landmarks = Array2::<f32>::from_shape_fn((num_samples, 2), |(n, _)| n as f32);
        let mut loader = DataLoader::new(images, conditions, landmarks, 4, true, false).unwrap();

        let mut seen = Vec::new();
        for batch in loader.iter() {
            for i in 0..batch.len() {
                let id = batch.images[[i, 0, 0, 0]];
                assert_eq!(batch.conditions[[i, 0, 0, 0]], 100 + id);
                assert_eq!(batch.landmarks[[i, 0]], id as f32);
                seen.push(id);
            }
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..num_samples as u8).collect::<Vec<_>>());
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let images = Array4::<u8>::zeros((4, 1, 2, 2));
        let conditions = Array4::<u8>::zeros((3, 1, 2, 2));
        let landmarks = Array2::<f32>::zeros((4, 2));
        assert!(DataLoader::new(images, conditions, landmarks, 2, false, false).is_err());
    }
}
