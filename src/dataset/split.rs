//! Train/validation split of the shuffled label table
//!
//! The table is shuffled deterministically, then partitioned into disjoint
//! training and validation sets according to the configured fraction.
//! Stratified mode splits each class proportionally so that the validation
//! set keeps the class balance of the full table.

use std::collections::HashMap;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::labels::LabeledImage;
use crate::utils::error::{MasknetError, Result};

/// Configuration for dataset splitting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of data held out for validation
    pub validation_fraction: f64,
    /// Random seed for reproducibility
    pub seed: u64,
    /// Ensure class balance in the split
    pub stratified: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            validation_fraction: 0.2,
            seed: crate::DEFAULT_SEED,
            stratified: true,
        }
    }
}

impl SplitConfig {
    /// Create a split configuration, validating the fraction
    pub fn new(validation_fraction: f64, seed: u64) -> Result<Self> {
        if !(0.0..1.0).contains(&validation_fraction) {
            return Err(MasknetError::Config(
                "Validation fraction must be in [0.0, 1.0)".to_string(),
            ));
        }

        Ok(Self {
            validation_fraction,
            seed,
            stratified: true,
        })
    }
}

/// Disjoint training and validation partitions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainValSplit {
    /// Training partition
    pub train: Vec<LabeledImage>,
    /// Validation partition
    pub validation: Vec<LabeledImage>,
    /// Configuration used to create the split
    pub config: SplitConfig,
}

impl TrainValSplit {
    /// Split a label table into train and validation partitions
    ///
    /// Entries are shuffled with the configured seed first, so the same table
    /// and configuration always produce the same partitions. The partitions
    /// are disjoint and together cover every entry.
    pub fn from_entries(entries: Vec<LabeledImage>, config: SplitConfig) -> Result<Self> {
        if entries.is_empty() {
            return Err(MasknetError::Dataset(
                "No labeled images provided for splitting".to_string(),
            ));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mut shuffled = entries;
        shuffled.shuffle(&mut rng);

        let (train, validation) = if config.stratified {
            Self::stratified_split(shuffled, config.validation_fraction, &mut rng)
        } else {
            Self::tail_split(shuffled, config.validation_fraction)
        };

        Ok(Self {
            train,
            validation,
            config,
        })
    }

    /// Split each class proportionally, keeping class balance
    fn stratified_split(
        entries: Vec<LabeledImage>,
        fraction: f64,
        rng: &mut ChaCha8Rng,
    ) -> (Vec<LabeledImage>, Vec<LabeledImage>) {
        let mut by_class: HashMap<usize, Vec<LabeledImage>> = HashMap::new();
        for entry in entries {
            by_class.entry(entry.label).or_default().push(entry);
        }

        let mut classes: Vec<usize> = by_class.keys().copied().collect();
        classes.sort_unstable();

        let mut train = Vec::new();
        let mut validation = Vec::new();

        for class in classes {
            let mut class_entries = by_class.remove(&class).unwrap_or_default();
            class_entries.shuffle(rng);

            let n_val = (class_entries.len() as f64 * fraction).round() as usize;
            let n_val = n_val.min(class_entries.len());

            validation.extend(class_entries.drain(..n_val));
            train.extend(class_entries);
        }

        (train, validation)
    }

    /// Take the trailing fraction of the shuffled list as validation
    fn tail_split(
        entries: Vec<LabeledImage>,
        fraction: f64,
    ) -> (Vec<LabeledImage>, Vec<LabeledImage>) {
        let n = entries.len();
        let n_val = ((n as f64 * fraction).round() as usize).min(n);
        let split_at = n - n_val;

        let mut train = entries;
        let validation = train.split_off(split_at);

        (train, validation)
    }

    /// Total number of entries across both partitions
    pub fn total(&self) -> usize {
        self.train.len() + self.validation.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn make_entries(per_class: usize) -> Vec<LabeledImage> {
        let mut entries = Vec::new();
        for class in 0..3 {
            for i in 0..per_class {
                entries.push(LabeledImage {
                    filename: format!("{}_{:04}.jpg", class, i),
                    label: class,
                });
            }
        }
        entries
    }

    #[test]
    fn test_split_is_disjoint_and_covering() {
        let entries = make_entries(100);
        let config = SplitConfig::default();
        let split = TrainValSplit::from_entries(entries, config).unwrap();

        assert_eq!(split.total(), 300);

        let train_names: HashSet<&str> =
            split.train.iter().map(|e| e.filename.as_str()).collect();
        let val_names: HashSet<&str> = split
            .validation
            .iter()
            .map(|e| e.filename.as_str())
            .collect();

        assert_eq!(train_names.len() + val_names.len(), 300);
        assert!(train_names.is_disjoint(&val_names));
    }

    #[test]
    fn test_split_fraction() {
        let entries = make_entries(100);
        let config = SplitConfig {
            validation_fraction: 0.2,
            seed: 42,
            stratified: true,
        };
        let split = TrainValSplit::from_entries(entries, config).unwrap();

        // 20 of each class held out
        assert_eq!(split.validation.len(), 60);
        assert_eq!(split.train.len(), 240);
    }

    #[test]
    fn test_stratified_keeps_class_balance() {
        let entries = make_entries(50);
        let config = SplitConfig::default();
        let split = TrainValSplit::from_entries(entries, config).unwrap();

        let mut val_counts = [0usize; 3];
        for entry in &split.validation {
            val_counts[entry.label] += 1;
        }

        assert_eq!(val_counts, [10, 10, 10]);
    }

    #[test]
    fn test_reproducibility() {
        let entries = make_entries(40);
        let config = SplitConfig::default();

        let a = TrainValSplit::from_entries(entries.clone(), config.clone()).unwrap();
        let b = TrainValSplit::from_entries(entries, config).unwrap();

        assert_eq!(a.train, b.train);
        assert_eq!(a.validation, b.validation);
    }

    #[test]
    fn test_rejects_invalid_fraction() {
        assert!(SplitConfig::new(1.0, 42).is_err());
        assert!(SplitConfig::new(-0.1, 42).is_err());
        assert!(SplitConfig::new(0.15, 42).is_ok());
    }

    #[test]
    fn test_rejects_empty_table() {
        let result = TrainValSplit::from_entries(Vec::new(), SplitConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_tail_split() {
        let entries = make_entries(10);
        let config = SplitConfig {
            validation_fraction: 0.5,
            seed: 7,
            stratified: false,
        };
        let split = TrainValSplit::from_entries(entries, config).unwrap();

        assert_eq!(split.train.len(), 15);
        assert_eq!(split.validation.len(), 15);
    }
}
