//! Mask Dataset Loader
//!
//! Handles the on-disk layout of the mask dataset:
//!
//! ```text
//! root_dir/
//! ├── training/        labeled images, referenced by train_gt.json
//! ├── test/            unlabeled images for the final prediction export
//! └── train_gt.json    filename -> class index
//! ```

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};
use tracing::info;
use walkdir::WalkDir;

use crate::dataset::labels::LabelTable;
use crate::dataset::{CLASS_NAMES, NUM_CLASSES};
use crate::utils::error::{MasknetError, Result};
use crate::IMAGE_SIZE;

/// File extensions recognized as images
const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// The mask dataset rooted at a directory with `training/`, `test/` and
/// `train_gt.json`
#[derive(Debug)]
pub struct MaskDataset {
    /// Root directory of the dataset
    pub root_dir: PathBuf,
    /// Directory holding the labeled training images
    pub training_dir: PathBuf,
    /// Directory holding the unlabeled test images
    pub test_dir: PathBuf,
    /// Label table, validated against the training directory
    pub labels: LabelTable,
    /// Target image size (width, height)
    pub image_size: (u32, u32),
}

impl MaskDataset {
    /// Open a dataset directory, load the label file, and validate that every
    /// labeled filename exists under `training/`
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!("Loading mask dataset from: {:?}", root_dir);

        if !root_dir.exists() {
            return Err(MasknetError::PathNotFound(root_dir));
        }

        let training_dir = root_dir.join("training");
        let test_dir = root_dir.join("test");
        let label_file = root_dir.join("train_gt.json");

        if !training_dir.is_dir() {
            return Err(MasknetError::PathNotFound(training_dir));
        }

        let labels = LabelTable::load(&label_file)?;
        labels.validate_against(&training_dir)?;

        info!(
            "Dataset ready: {} labeled training images",
            labels.len()
        );

        Ok(Self {
            root_dir,
            training_dir,
            test_dir,
            labels,
            image_size: (IMAGE_SIZE as u32, IMAGE_SIZE as u32),
        })
    }

    /// Number of labeled samples
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the dataset has no labeled samples
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Test image filenames in file-listing (lexicographic) order
    ///
    /// The export file is written in exactly this order.
    pub fn test_files(&self) -> Result<Vec<String>> {
        if !self.test_dir.is_dir() {
            return Err(MasknetError::PathNotFound(self.test_dir.clone()));
        }

        let mut files: Vec<String> = WalkDir::new(&self.test_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| is_image(e.path()))
            .filter_map(|e| e.file_name().to_str().map(|s| s.to_string()))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(MasknetError::Dataset(format!(
                "No test images found under {:?}",
                self.test_dir
            )));
        }

        Ok(files)
    }

    /// Load an image from the training directory and resize it
    pub fn load_training_image(&self, filename: &str) -> Result<DynamicImage> {
        load_image(&self.training_dir.join(filename), self.image_size)
    }

    /// Load an image from the test directory and resize it
    pub fn load_test_image(&self, filename: &str) -> Result<DynamicImage> {
        load_image(&self.test_dir.join(filename), self.image_size)
    }

    /// Get statistics about the labeled portion of the dataset
    pub fn stats(&self) -> DatasetStats {
        DatasetStats {
            total_samples: self.labels.len(),
            num_classes: NUM_CLASSES,
            class_counts: self.labels.class_counts().to_vec(),
        }
    }
}

/// Open, decode, and resize an image
pub fn load_image(path: &Path, image_size: (u32, u32)) -> Result<DynamicImage> {
    let img = ImageReader::open(path)
        .map_err(|e| MasknetError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .decode()
        .map_err(|e| MasknetError::ImageLoad(path.to_path_buf(), e.to_string()))?;

    Ok(img.resize_exact(
        image_size.0,
        image_size.1,
        image::imageops::FilterType::Triangle,
    ))
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Statistics about the dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    pub num_classes: usize,
    pub class_counts: Vec<usize>,
}

impl DatasetStats {
    /// Print statistics to console
    pub fn print(&self) {
        println!("\nDataset Statistics:");
        println!("  Total samples: {}", self.total_samples);
        println!("  Number of classes: {}", self.num_classes);
        println!("\n  Samples per class:");

        for (idx, name) in CLASS_NAMES.iter().enumerate() {
            let count = self.class_counts[idx];
            let bar_len = if self.total_samples > 0 {
                (count as f32 / self.total_samples as f32 * 40.0) as usize
            } else {
                0
            };
            let bar: String = "#".repeat(bar_len);
            println!("    {}. {:20} {:5} {}", idx, name, count, bar);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_dataset_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("masknet_loader_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join("training")).unwrap();
        std::fs::create_dir_all(dir.join("test")).unwrap();
        dir
    }

    fn write_png(path: &Path) {
        let img = image::RgbImage::from_pixel(8, 8, image::Rgb([10, 20, 30]));
        img.save(path).unwrap();
    }

    #[test]
    fn test_dataset_loads_and_validates() {
        let dir = make_dataset_dir("ok");
        write_png(&dir.join("training/10001.png"));
        std::fs::write(dir.join("train_gt.json"), r#"{"10001.png": 1}"#).unwrap();

        let dataset = MaskDataset::new(&dir).unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.stats().class_counts, vec![0, 1, 0]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_dataset_rejects_missing_image() {
        let dir = make_dataset_dir("missing");
        std::fs::write(dir.join("train_gt.json"), r#"{"nope.jpg": 0}"#).unwrap();

        let result = MaskDataset::new(&dir);
        assert!(result.is_err());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_test_files_sorted() {
        let dir = make_dataset_dir("testfiles");
        std::fs::write(dir.join("train_gt.json"), r#"{}"#).unwrap();
        write_png(&dir.join("test/10003.png"));
        write_png(&dir.join("test/10001.png"));
        write_png(&dir.join("test/10002.png"));
        // Non-image files are ignored
        std::fs::write(dir.join("test/notes.txt"), b"ignore me").unwrap();

        let dataset = MaskDataset::new(&dir).unwrap();
        let files = dataset.test_files().unwrap();
        assert_eq!(files, vec!["10001.png", "10002.png", "10003.png"]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_image_resizes() {
        let dir = make_dataset_dir("resize");
        std::fs::write(dir.join("train_gt.json"), r#"{}"#).unwrap();
        write_png(&dir.join("training/a.png"));
        write_png(&dir.join("test/b.png"));

        let dataset = MaskDataset::new(&dir).unwrap();
        let img = dataset.load_training_image("a.png").unwrap();
        assert_eq!(img.width(), IMAGE_SIZE as u32);
        assert_eq!(img.height(), IMAGE_SIZE as u32);

        let img = dataset.load_test_image("b.png").unwrap();
        assert_eq!(img.width(), IMAGE_SIZE as u32);

        std::fs::remove_dir_all(&dir).ok();
    }
}
