//! # masknet
//!
//! Face-mask usage classification with the Burn framework. Trains
//! convolutional classifiers that sort photographs into three classes
//! (everyone masked, no one masked, partially masked) and exports
//! predictions for a held-out test set.
//!
//! ## Modules
//!
//! - `dataset`: label table, train/validation split, augmentation, batching
//! - `model`: the architecture families (sequential, multi-tower, transfer)
//! - `training`: fit loop, callbacks, history, and the training driver
//! - `inference`: run reloading, test-set prediction, submission export
//! - `utils`: errors, logging, metrics

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::labels::{LabelTable, LabeledImage};
pub use dataset::loader::MaskDataset;
pub use dataset::split::{SplitConfig, TrainValSplit};
pub use dataset::{AugmentationConfig, Augmenter, MaskBatch, MaskBatcher, MaskBurnDataset};
pub use inference::{predict_test_set, write_submission, Prediction};
pub use model::{Architecture, MaskClassifier, ModelConfig};
pub use training::{run_training, TrainOptions, TrainingConfig};
pub use utils::error::{MasknetError, Result};
pub use utils::metrics::{ConfusionMatrix, Metrics};

/// Number of mask classes
pub const NUM_CLASSES: usize = dataset::NUM_CLASSES;

/// Default input image size (square)
pub const IMAGE_SIZE: usize = 299;

/// Default random seed for shuffling, splitting, and augmentation
pub const DEFAULT_SEED: u64 = 1234;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
