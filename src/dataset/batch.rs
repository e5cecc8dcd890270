//! Burn Dataset Integration
//!
//! Implements Burn's `Dataset` trait and `Batcher` for the mask data.
//! Two dataset flavors exist:
//!
//! - [`MaskBurnDataset`] yields preprocessed items (resized, rescaled) and can
//!   cache them in memory. Used for validation and test partitions.
//! - [`RawMaskDataset`] yields decoded images without preprocessing so the
//!   [`AugmentingBatcher`] can apply fresh random transforms on every epoch.
//!   Used for the training partition.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::DynamicImage;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::augmentation::Augmenter;
use crate::dataset::loader::load_image;
use crate::IMAGE_SIZE;

/// A single preprocessed sample ready for batching
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MaskItem {
    /// Image data as flattened CHW float array [3 * H * W], values in [0, 1]
    pub image: Vec<f32>,
    /// Class label (0-2); 0 for unlabeled test items
    pub label: usize,
    /// Image path (for debugging/logging)
    pub path: String,
}

impl MaskItem {
    /// Create an item by loading, resizing, and rescaling an image
    pub fn from_path(path: &PathBuf, label: usize, image_size: usize) -> crate::utils::Result<Self> {
        let img = load_image(path, (image_size as u32, image_size as u32))?;
        let augmenter = Augmenter::no_augmentation(image_size as u32);
        let image = augmenter.to_tensor_data(&img);

        Ok(Self {
            image,
            label,
            path: path.to_string_lossy().to_string(),
        })
    }

    /// Create from pre-loaded image data
    pub fn from_data(image: Vec<f32>, label: usize, path: String) -> Self {
        Self { image, label, path }
    }
}

/// A decoded but not yet preprocessed sample
#[derive(Clone, Debug)]
pub struct RawMaskItem {
    /// The decoded image at its resized dimensions
    pub image: DynamicImage,
    /// Class label (0-2)
    pub label: usize,
}

/// Preprocessed dataset implementing Burn's `Dataset` trait
///
/// Loads lazily by default; `new_cached` preloads every item into memory.
#[derive(Debug, Clone)]
pub struct MaskBurnDataset {
    samples: Vec<(PathBuf, usize)>,
    image_size: usize,
    cached_items: Option<Vec<MaskItem>>,
}

impl MaskBurnDataset {
    /// Create a lazily-loading dataset from (path, label) pairs
    pub fn new(samples: Vec<(PathBuf, usize)>, image_size: usize) -> Self {
        Self {
            samples,
            image_size,
            cached_items: None,
        }
    }

    /// Create a dataset with all items preloaded into memory
    pub fn new_cached(
        samples: Vec<(PathBuf, usize)>,
        image_size: usize,
    ) -> crate::utils::Result<Self> {
        let cached_items: crate::utils::Result<Vec<_>> = samples
            .iter()
            .map(|(path, label)| MaskItem::from_path(path, *label, image_size))
            .collect();

        Ok(Self {
            samples,
            image_size,
            cached_items: Some(cached_items?),
        })
    }

    /// Samples per class count
    pub fn class_distribution(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0usize; num_classes];
        for (_, label) in &self.samples {
            if *label < num_classes {
                counts[*label] += 1;
            }
        }
        counts
    }
}

impl Dataset<MaskItem> for MaskBurnDataset {
    fn get(&self, index: usize) -> Option<MaskItem> {
        if index >= self.samples.len() {
            return None;
        }

        if let Some(ref cached) = self.cached_items {
            return cached.get(index).cloned();
        }

        let (path, label) = &self.samples[index];
        MaskItem::from_path(path, *label, self.image_size).ok()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Raw-image dataset for the augmenting training path
///
/// Always loads from disk so every epoch sees a freshly decoded image for the
/// batcher to transform.
#[derive(Debug, Clone)]
pub struct RawMaskDataset {
    samples: Vec<(PathBuf, usize)>,
    image_size: usize,
}

impl RawMaskDataset {
    /// Create a raw dataset from (path, label) pairs
    pub fn new(samples: Vec<(PathBuf, usize)>, image_size: usize) -> Self {
        Self {
            samples,
            image_size,
        }
    }
}

impl Dataset<RawMaskItem> for RawMaskDataset {
    fn get(&self, index: usize) -> Option<RawMaskItem> {
        let (path, label) = self.samples.get(index)?;
        let image = load_image(path, (self.image_size as u32, self.image_size as u32)).ok()?;

        Some(RawMaskItem {
            image,
            label: *label,
        })
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of mask images for training or inference
#[derive(Clone, Debug)]
pub struct MaskBatch<B: Backend> {
    /// Batch of images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Batch of labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher for preprocessed items
///
/// Items carry pixels already rescaled to [0, 1]; this batcher only stacks
/// them into a tensor.
#[derive(Clone, Debug)]
pub struct MaskBatcher {
    image_size: usize,
}

impl MaskBatcher {
    /// Create a new batcher for the default image size
    pub fn new() -> Self {
        Self {
            image_size: IMAGE_SIZE,
        }
    }

    /// Create a batcher with a custom image size
    pub fn with_image_size(image_size: usize) -> Self {
        Self { image_size }
    }
}

impl Default for MaskBatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Batcher<B, MaskItem, MaskBatch<B>> for MaskBatcher {
    fn batch(&self, items: Vec<MaskItem>, device: &B::Device) -> MaskBatch<B> {
        let batch_size = items.len();
        let channels = 3;
        let height = self.image_size;
        let width = self.image_size;

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.clone()).collect();

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, channels, height, width]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        MaskBatch { images, targets }
    }
}

/// Batcher that applies on-the-fly augmentation to raw images
///
/// Used during training so each epoch sees different random transforms.
pub struct AugmentingBatcher {
    image_size: usize,
    augmenter: Augmenter,
    /// Base seed for per-batch RNGs
    seed: u64,
    /// Monotonic batch counter; combined with the seed for fresh randomness
    counter: AtomicU64,
}

impl Clone for AugmentingBatcher {
    fn clone(&self) -> Self {
        Self {
            image_size: self.image_size,
            augmenter: self.augmenter.clone(),
            seed: self.seed,
            counter: AtomicU64::new(self.counter.load(Ordering::Relaxed)),
        }
    }
}

impl std::fmt::Debug for AugmentingBatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AugmentingBatcher")
            .field("image_size", &self.image_size)
            .field("seed", &self.seed)
            .finish()
    }
}

impl AugmentingBatcher {
    /// Create a new augmenting batcher
    pub fn new(augmenter: Augmenter, image_size: usize, seed: u64) -> Self {
        Self {
            image_size,
            augmenter,
            seed,
            counter: AtomicU64::new(0),
        }
    }
}

impl<B: Backend> Batcher<B, RawMaskItem, MaskBatch<B>> for AugmentingBatcher {
    fn batch(&self, items: Vec<RawMaskItem>, device: &B::Device) -> MaskBatch<B> {
        let batch_size = items.len();
        let channels = 3;
        let height = self.image_size;
        let width = self.image_size;

        let batch_index = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(batch_index));

        let mut images_data = Vec::with_capacity(batch_size * channels * height * width);
        let mut targets_data = Vec::with_capacity(batch_size);

        for item in items {
            let tensor_data = self.augmenter.preprocess(item.image, Some(&mut rng));
            images_data.extend(tensor_data);
            targets_data.push(item.label as i64);
        }

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, channels, height, width]),
            device,
        );

        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        MaskBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::augmentation::AugmentationConfig;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn test_mask_item_from_data() {
        let image = vec![0.5f32; 3 * 32 * 32];
        let item = MaskItem::from_data(image, 2, "test.jpg".to_string());

        assert_eq!(item.label, 2);
        assert_eq!(item.image.len(), 3 * 32 * 32);
    }

    #[test]
    fn test_batcher_shapes_and_range() {
        let size = 32;
        let items: Vec<MaskItem> = (0..4)
            .map(|i| MaskItem::from_data(vec![0.25f32; 3 * size * size], i % 3, format!("{}.jpg", i)))
            .collect();

        let batcher = MaskBatcher::with_image_size(size);
        let device = Default::default();
        let batch: MaskBatch<TestBackend> = batcher.batch(items, &device);

        assert_eq!(batch.images.dims(), [4, 3, size, size]);
        assert_eq!(batch.targets.dims(), [4]);

        let values: Vec<f32> = batch.images.into_data().to_vec().unwrap();
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_augmenting_batcher_shapes_and_range() {
        let size = 32;
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            48,
            48,
            image::Rgb([200, 100, 50]),
        ));
        let items: Vec<RawMaskItem> = (0..3)
            .map(|i| RawMaskItem {
                image: img.clone(),
                label: i,
            })
            .collect();

        let augmenter = Augmenter::new(AugmentationConfig::default(), size as u32);
        let batcher = AugmentingBatcher::new(augmenter, size, 1234);
        let device = Default::default();
        let batch: MaskBatch<TestBackend> = batcher.batch(items, &device);

        assert_eq!(batch.images.dims(), [3, 3, size, size]);

        let values: Vec<f32> = batch.images.into_data().to_vec().unwrap();
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_dataset_class_distribution() {
        let samples = vec![
            (PathBuf::from("a.jpg"), 0),
            (PathBuf::from("b.jpg"), 0),
            (PathBuf::from("c.jpg"), 2),
        ];

        let dataset = MaskBurnDataset::new(samples, 32);

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.class_distribution(3), vec![2, 0, 1]);
    }

    #[test]
    fn test_dataset_get_out_of_range() {
        let dataset = MaskBurnDataset::new(Vec::new(), 32);
        assert!(dataset.get(0).is_none());
    }
}
