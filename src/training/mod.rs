//! Training module
//!
//! The training driver compiles the configured model with cross-entropy loss
//! and Adam, then runs a custom epoch loop governed by four callbacks:
//! per-epoch checkpointing, history logging, early stopping on a
//! validation-loss plateau, and learning-rate reduction on plateau.

pub mod callbacks;
pub mod history;
pub mod run;
pub mod trainer;

pub use callbacks::{EarlyStopping, EarlyStoppingConfig, ReduceLrConfig, ReduceLrOnPlateau};
pub use history::{EpochRecord, TrainingHistory};
pub use run::{run_training, TrainOptions};
pub use trainer::{fit, FitOutcome};

use serde::{Deserialize, Serialize};

use crate::utils::error::{MasknetError, Result};

/// Default number of training epochs
pub const DEFAULT_EPOCHS: usize = 50;

/// Default batch size
pub const DEFAULT_BATCH_SIZE: usize = 16;

/// Default learning rate
pub const DEFAULT_LEARNING_RATE: f64 = 1e-4;

/// Training hyperparameters and callback configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Number of training epochs
    pub epochs: usize,
    /// Batch size
    pub batch_size: usize,
    /// Initial learning rate for Adam
    pub learning_rate: f64,
    /// Fraction of the label table held out for validation
    pub validation_fraction: f64,
    /// Random seed for shuffling, splitting, and augmentation
    pub seed: u64,
    /// Whether to augment the training stream
    pub augmentation: bool,
    /// Early stopping on validation-loss plateau; None disables it
    pub early_stopping: Option<EarlyStoppingConfig>,
    /// Learning-rate reduction on plateau; None disables it
    pub reduce_lr: Option<ReduceLrConfig>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: DEFAULT_EPOCHS,
            batch_size: DEFAULT_BATCH_SIZE,
            learning_rate: DEFAULT_LEARNING_RATE,
            validation_fraction: 0.2,
            seed: crate::DEFAULT_SEED,
            augmentation: true,
            early_stopping: Some(EarlyStoppingConfig::default()),
            reduce_lr: Some(ReduceLrConfig::default()),
        }
    }
}

impl TrainingConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(MasknetError::Config("epochs must be greater than 0".to_string()));
        }
        if self.batch_size == 0 {
            return Err(MasknetError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.learning_rate <= 0.0 {
            return Err(MasknetError::Config(
                "learning_rate must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.validation_fraction) {
            return Err(MasknetError::Config(
                "validation_fraction must be in [0.0, 1.0)".to_string(),
            ));
        }
        Ok(())
    }
}
