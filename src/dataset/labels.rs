//! Label Table
//!
//! Loads the ground-truth label file (`train_gt.json`, a JSON object mapping
//! image filename to class index) into a tabular structure, validates it
//! against the training image directory, and shuffles it before splitting.

use std::collections::HashMap;
use std::path::Path;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::NUM_CLASSES;
use crate::utils::error::{MasknetError, Result};

/// A single labeled image: filename plus class index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabeledImage {
    /// Image filename relative to the training directory
    pub filename: String,
    /// Class label index (0-2)
    pub label: usize,
}

/// The full label table parsed from the ground-truth file
#[derive(Debug, Clone)]
pub struct LabelTable {
    entries: Vec<LabeledImage>,
}

impl LabelTable {
    /// Load the label table from a JSON file
    ///
    /// The file is a single object of the form:
    /// ```json
    /// { "10005.jpg": 0, "10012.jpg": "2", ... }
    /// ```
    /// Class indices may be JSON numbers or digit strings; both are accepted.
    /// Entries are sorted by filename so that shuffling is deterministic for a
    /// given seed regardless of JSON map ordering.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MasknetError::PathNotFound(path.to_path_buf()));
        }

        let raw = std::fs::read_to_string(path)?;
        let map: HashMap<String, serde_json::Value> = serde_json::from_str(&raw)?;

        let mut entries = Vec::with_capacity(map.len());
        for (filename, value) in map {
            let label = parse_label(&value).ok_or_else(|| {
                MasknetError::Dataset(format!(
                    "Invalid class label {:?} for '{}'",
                    value, filename
                ))
            })?;

            if label >= NUM_CLASSES {
                return Err(MasknetError::Dataset(format!(
                    "Class label {} for '{}' is out of range (expected 0-{})",
                    label,
                    filename,
                    NUM_CLASSES - 1
                )));
            }

            entries.push(LabeledImage { filename, label });
        }

        entries.sort_by(|a, b| a.filename.cmp(&b.filename));

        info!("Loaded {} labeled images from {:?}", entries.len(), path);

        Ok(Self { entries })
    }

    /// Build a table directly from entries (used by tests and tooling)
    pub fn from_entries(mut entries: Vec<LabeledImage>) -> Self {
        entries.sort_by(|a, b| a.filename.cmp(&b.filename));
        Self { entries }
    }

    /// Number of labeled images
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Access the entries
    pub fn entries(&self) -> &[LabeledImage] {
        &self.entries
    }

    /// Consume the table and return its entries
    pub fn into_entries(self) -> Vec<LabeledImage> {
        self.entries
    }

    /// Verify that every referenced filename exists under the image directory
    pub fn validate_against<P: AsRef<Path>>(&self, image_dir: P) -> Result<()> {
        let image_dir = image_dir.as_ref();
        if !image_dir.exists() {
            return Err(MasknetError::PathNotFound(image_dir.to_path_buf()));
        }

        let missing: Vec<&str> = self
            .entries
            .iter()
            .filter(|e| !image_dir.join(&e.filename).is_file())
            .map(|e| e.filename.as_str())
            .collect();

        if let Some(first) = missing.first() {
            return Err(MasknetError::MissingImages {
                count: missing.len(),
                first: (*first).to_string(),
            });
        }

        Ok(())
    }

    /// Shuffle the table in place with a given seed
    pub fn shuffle(&mut self, seed: u64) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        self.entries.shuffle(&mut rng);
    }

    /// Count samples per class
    pub fn class_counts(&self) -> [usize; NUM_CLASSES] {
        let mut counts = [0usize; NUM_CLASSES];
        for entry in &self.entries {
            counts[entry.label] += 1;
        }
        counts
    }
}

fn parse_label(value: &serde_json::Value) -> Option<usize> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().map(|v| v as usize),
        serde_json::Value::String(s) => s.trim().parse::<usize>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp_label_file(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("masknet_labels_{}.json", name));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_numeric_and_string_labels() {
        let path = write_temp_label_file(
            "mixed",
            r#"{"b.jpg": 1, "a.jpg": "2", "c.jpg": 0}"#,
        );

        let table = LabelTable::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(table.len(), 3);
        // Sorted by filename
        assert_eq!(table.entries()[0].filename, "a.jpg");
        assert_eq!(table.entries()[0].label, 2);
        assert_eq!(table.entries()[1].label, 1);
        assert_eq!(table.entries()[2].label, 0);
    }

    #[test]
    fn test_load_rejects_out_of_range_label() {
        let path = write_temp_label_file("bad", r#"{"a.jpg": 7}"#);
        let result = LabelTable::load(&path);
        std::fs::remove_file(&path).ok();

        assert!(result.is_err());
    }

    #[test]
    fn test_shuffle_is_deterministic() {
        let entries: Vec<LabeledImage> = (0..50)
            .map(|i| LabeledImage {
                filename: format!("{:05}.jpg", i),
                label: i % 3,
            })
            .collect();

        let mut a = LabelTable::from_entries(entries.clone());
        let mut b = LabelTable::from_entries(entries);
        a.shuffle(1234);
        b.shuffle(1234);

        assert_eq!(a.entries(), b.entries());
    }

    #[test]
    fn test_validate_against_reports_missing() {
        let dir = std::env::temp_dir().join("masknet_validate_test");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("exists.jpg"), b"fake").unwrap();

        let table = LabelTable::from_entries(vec![
            LabeledImage {
                filename: "exists.jpg".to_string(),
                label: 0,
            },
            LabeledImage {
                filename: "missing.jpg".to_string(),
                label: 1,
            },
        ]);

        let err = table.validate_against(&dir).unwrap_err();
        std::fs::remove_dir_all(&dir).ok();

        match err {
            MasknetError::MissingImages { count, first } => {
                assert_eq!(count, 1);
                assert_eq!(first, "missing.jpg");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_class_counts() {
        let table = LabelTable::from_entries(vec![
            LabeledImage {
                filename: "a.jpg".to_string(),
                label: 0,
            },
            LabeledImage {
                filename: "b.jpg".to_string(),
                label: 2,
            },
            LabeledImage {
                filename: "c.jpg".to_string(),
                label: 2,
            },
        ]);

        assert_eq!(table.class_counts(), [1, 0, 2]);
    }
}
