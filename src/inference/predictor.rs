//! Inference
//!
//! Reloads a trained run (weights + model configuration) and predicts class
//! indices for the test partition in file-listing order, or for a single
//! image.

use std::path::Path;

use burn::record::CompactRecorder;
use burn::tensor::backend::Backend;
use burn::{data::dataloader::batcher::Batcher, module::Module};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::batch::{MaskBatcher, MaskItem};
use crate::dataset::loader::MaskDataset;
use crate::model::{
    Architecture, MaskClassifier, ModelConfig, MultiTowerNet, SequentialNet, TransferNet,
};
use crate::utils::error::{MasknetError, Result};

/// Result of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// Image filename
    pub filename: String,
    /// Predicted class index (arg-max)
    pub class_index: usize,
    /// Probability of the predicted class
    pub confidence: f32,
    /// Full probability distribution over the classes
    pub probabilities: Vec<f32>,
}

impl Prediction {
    fn from_probabilities(filename: String, probabilities: Vec<f32>) -> Self {
        let (class_index, &confidence) = probabilities
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap_or((0, &0.0));

        Self {
            filename,
            class_index,
            confidence,
            probabilities,
        }
    }
}

/// Load the model of a run directory, dispatching on its saved configuration
pub fn load_model<B: Backend>(
    run_dir: &Path,
    device: &B::Device,
) -> Result<(Box<dyn MaskClassifier<B>>, ModelConfig)> {
    let config = ModelConfig::load(&run_dir.join("model.json"))?;
    let weights = run_dir.join("model");
    let recorder = CompactRecorder::new();

    info!(
        "Loading {} model from {:?}",
        config.architecture.name(),
        run_dir
    );

    let model: Box<dyn MaskClassifier<B>> = match &config.architecture {
        Architecture::Sequential(arch) => {
            let model = SequentialNet::<B>::new(
                arch,
                config.image_size,
                config.num_classes,
                device,
            )
            .load_file(&weights, &recorder, device)
            .map_err(|e| MasknetError::Inference(format!("Failed to load model: {:?}", e)))?;
            Box::new(model)
        }
        Architecture::MultiTower(arch) => {
            let model = MultiTowerNet::<B>::new(
                arch,
                config.image_size,
                config.num_classes,
                device,
            )
            .load_file(&weights, &recorder, device)
            .map_err(|e| MasknetError::Inference(format!("Failed to load model: {:?}", e)))?;
            Box::new(model)
        }
        Architecture::Transfer(arch) => {
            let model = TransferNet::<B>::new(arch, config.num_classes, device)?
                .load_file(&weights, &recorder, device)
                .map_err(|e| MasknetError::Inference(format!("Failed to load model: {:?}", e)))?;
            Box::new(model)
        }
    };

    Ok((model, config))
}

/// Predict classes for the whole test partition, in file-listing order
pub fn predict_test_set<B: Backend>(
    data_dir: &Path,
    run_dir: &Path,
    batch_size: usize,
) -> Result<Vec<Prediction>> {
    let device = B::Device::default();
    let (model, config) = load_model::<B>(run_dir, &device)?;

    let dataset = MaskDataset::new(data_dir)?;
    let files = dataset.test_files()?;

    info!("Predicting {} test images", files.len());

    let batcher = MaskBatcher::with_image_size(config.image_size);
    let mut predictions = Vec::with_capacity(files.len());

    for chunk in files.chunks(batch_size.max(1)) {
        let items: Result<Vec<MaskItem>> = chunk
            .iter()
            .map(|name| {
                MaskItem::from_path(&dataset.test_dir.join(name), 0, config.image_size)
            })
            .collect();
        let items = items?;

        let batch = batcher.batch(items, &device);
        let probs = model.forward_softmax(batch.images);
        let flat: Vec<f32> = probs
            .into_data()
            .to_vec()
            .map_err(|e| MasknetError::Inference(format!("Failed to read output: {:?}", e)))?;

        for (name, row) in chunk.iter().zip(flat.chunks(config.num_classes)) {
            predictions.push(Prediction::from_probabilities(name.clone(), row.to_vec()));
        }
    }

    Ok(predictions)
}

/// Predict the class of a single image
pub fn infer_image<B: Backend>(run_dir: &Path, image_path: &Path) -> Result<Prediction> {
    if !image_path.exists() {
        return Err(MasknetError::PathNotFound(image_path.to_path_buf()));
    }

    let device = B::Device::default();
    let (model, config) = load_model::<B>(run_dir, &device)?;

    let item = MaskItem::from_path(&image_path.to_path_buf(), 0, config.image_size)?;
    let batcher = MaskBatcher::with_image_size(config.image_size);
    let batch = batcher.batch(vec![item], &device);

    let probs = model.forward_softmax(batch.images);
    let flat: Vec<f32> = probs
        .into_data()
        .to_vec()
        .map_err(|e| MasknetError::Inference(format!("Failed to read output: {:?}", e)))?;

    let filename = image_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(Prediction::from_probabilities(filename, flat))
}
