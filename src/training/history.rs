//! Training history
//!
//! Per-epoch loss/accuracy records, persisted as JSON in the run directory.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::error::Result;

/// Metrics recorded for one epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochRecord {
    /// Epoch number, 1-based
    pub epoch: usize,
    /// Average training loss over the epoch
    pub train_loss: f64,
    /// Training accuracy over the epoch
    pub train_accuracy: f64,
    /// Average validation loss
    pub val_loss: f64,
    /// Validation accuracy
    pub val_accuracy: f64,
    /// Learning rate used this epoch
    pub learning_rate: f64,
}

/// Full per-epoch history of a training run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochRecord>,
}

impl TrainingHistory {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record
    pub fn push(&mut self, record: EpochRecord) {
        self.epochs.push(record);
    }

    /// Number of recorded epochs
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    /// Whether no epochs have been recorded
    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Epoch with the lowest validation loss
    pub fn best_epoch(&self) -> Option<&EpochRecord> {
        self.epochs
            .iter()
            .min_by(|a, b| a.val_loss.partial_cmp(&b.val_loss).unwrap())
    }

    /// Save the history as JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a history from JSON
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(epoch: usize, val_loss: f64) -> EpochRecord {
        EpochRecord {
            epoch,
            train_loss: 1.0,
            train_accuracy: 0.5,
            val_loss,
            val_accuracy: 0.5,
            learning_rate: 1e-4,
        }
    }

    #[test]
    fn test_best_epoch() {
        let mut history = TrainingHistory::new();
        history.push(record(1, 0.9));
        history.push(record(2, 0.4));
        history.push(record(3, 0.6));

        assert_eq!(history.best_epoch().unwrap().epoch, 2);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let path = std::env::temp_dir().join("masknet_history_test.json");

        let mut history = TrainingHistory::new();
        history.push(record(1, 0.9));
        history.push(record(2, 0.7));

        history.save(&path).unwrap();
        let loaded = TrainingHistory::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.epochs[1].epoch, 2);
    }
}
