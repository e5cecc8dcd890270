//! Training driver
//!
//! Wires the full pipeline together: load the label table, split it, build
//! the augmenting data stream and the configured model, run the fit loop,
//! and save the run artifacts (model weights, model config, per-epoch
//! checkpoints, history, validation metrics) into a timestamped run
//! directory.

use std::path::{Path, PathBuf};

use burn::{
    data::dataloader::batcher::Batcher,
    data::dataset::Dataset,
    module::AutodiffModule,
    record::CompactRecorder,
    tensor::backend::{AutodiffBackend, Backend},
};
use chrono::Local;
use colored::Colorize;
use tracing::info;

use crate::dataset::augmentation::{AugmentationConfig, Augmenter};
use crate::dataset::batch::{AugmentingBatcher, MaskBatcher, MaskBurnDataset, RawMaskDataset};
use crate::dataset::loader::MaskDataset;
use crate::dataset::split::{SplitConfig, TrainValSplit};
use crate::model::{
    Architecture, MaskClassifier, ModelConfig, MultiTowerNet, SequentialNet, TransferNet,
};
use crate::training::trainer::fit;
use crate::training::TrainingConfig;
use crate::utils::error::{MasknetError, Result};
use crate::utils::metrics::Metrics;
use crate::NUM_CLASSES;

/// Everything a training run needs
#[derive(Debug, Clone)]
pub struct TrainOptions {
    /// Dataset root (with `training/`, `test/`, `train_gt.json`)
    pub data_dir: PathBuf,
    /// Directory under which the timestamped run directory is created
    pub output_dir: PathBuf,
    /// Model configuration
    pub model: ModelConfig,
    /// Training hyperparameters and callbacks
    pub training: TrainingConfig,
}

/// Run a full training session; returns the run directory
pub fn run_training<B: AutodiffBackend>(options: &TrainOptions) -> Result<PathBuf> {
    options.model.validate()?;
    options.training.validate()?;

    let device = B::Device::default();
    let image_size = options.model.image_size;

    println!("{}", "Initializing Training...".green().bold());
    println!("  Architecture: {}", options.model.architecture.name());
    println!("  Device: {:?}", device);

    // Load and validate the dataset
    println!("{}", "Loading Dataset...".cyan());
    let dataset = MaskDataset::new(&options.data_dir)?;
    dataset.stats().print();

    // Shuffle and split the label table
    let split_config = SplitConfig {
        validation_fraction: options.training.validation_fraction,
        seed: options.training.seed,
        stratified: true,
    };
    let split = TrainValSplit::from_entries(dataset.labels.entries().to_vec(), split_config)?;

    println!();
    println!("{}", "Dataset Splits:".cyan().bold());
    println!("  Training samples:   {}", split.train.len());
    println!("  Validation samples: {}", split.validation.len());

    let train_samples: Vec<(PathBuf, usize)> = split
        .train
        .iter()
        .map(|e| (dataset.training_dir.join(&e.filename), e.label))
        .collect();
    let val_samples: Vec<(PathBuf, usize)> = split
        .validation
        .iter()
        .map(|e| (dataset.training_dir.join(&e.filename), e.label))
        .collect();

    // Training stream with on-the-fly augmentation; validation is cached
    let augmentation = if options.training.augmentation {
        AugmentationConfig::default()
    } else {
        AugmentationConfig::none()
    };
    let augmenter = Augmenter::new(augmentation, image_size as u32);

    let train_dataset = RawMaskDataset::new(train_samples, image_size);
    let train_batcher = AugmentingBatcher::new(augmenter, image_size, options.training.seed);

    println!();
    println!("{}", "Pre-loading Validation Data...".cyan().bold());
    let val_dataset = MaskBurnDataset::new_cached(val_samples, image_size)?;
    let val_batcher = MaskBatcher::with_image_size(image_size);

    // Timestamped run directory
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let run_dir = options
        .output_dir
        .join(format!("{}_{}", options.model.architecture.name(), timestamp));
    let checkpoint_dir = run_dir.join("ckpts");
    std::fs::create_dir_all(&checkpoint_dir)?;

    options.model.save(&run_dir.join("model.json"))?;

    info!("Run directory: {:?}", run_dir);

    println!();
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Epochs:        {}", options.training.epochs);
    println!("  Batch size:    {}", options.training.batch_size);
    println!("  Learning rate: {}", options.training.learning_rate);
    println!("  Augmentation:  {}", options.training.augmentation);
    println!();
    println!("{}", "Starting Training...".green().bold());

    // Build the configured architecture and train it
    match &options.model.architecture {
        Architecture::Sequential(config) => {
            let model = SequentialNet::<B>::new(
                config,
                image_size,
                options.model.num_classes,
                &device,
            );
            train_and_save::<B, _>(
                model,
                &train_dataset,
                &train_batcher,
                &val_dataset,
                &val_batcher,
                &options.training,
                &run_dir,
                &checkpoint_dir,
                &device,
            )?;
        }
        Architecture::MultiTower(config) => {
            let model = MultiTowerNet::<B>::new(
                config,
                image_size,
                options.model.num_classes,
                &device,
            );
            train_and_save::<B, _>(
                model,
                &train_dataset,
                &train_batcher,
                &val_dataset,
                &val_batcher,
                &options.training,
                &run_dir,
                &checkpoint_dir,
                &device,
            )?;
        }
        Architecture::Transfer(config) => {
            let model = TransferNet::<B>::new(config, options.model.num_classes, &device)?;
            train_and_save::<B, _>(
                model,
                &train_dataset,
                &train_batcher,
                &val_dataset,
                &val_batcher,
                &options.training,
                &run_dir,
                &checkpoint_dir,
                &device,
            )?;
        }
    }

    println!();
    println!("{}", "Training Complete!".green().bold());
    println!("  Saved to: {:?}", run_dir);
    println!();
    println!("{}", "Next steps:".cyan().bold());
    println!(
        "  masknet predict --data-dir {:?} --run {:?} --output predictions.csv",
        options.data_dir, run_dir
    );

    Ok(run_dir)
}

/// Fit a concrete model, then persist weights, history, and final metrics
#[allow(clippy::too_many_arguments)]
fn train_and_save<B, M>(
    model: M,
    train_dataset: &RawMaskDataset,
    train_batcher: &AugmentingBatcher,
    val_dataset: &MaskBurnDataset,
    val_batcher: &MaskBatcher,
    config: &TrainingConfig,
    run_dir: &Path,
    checkpoint_dir: &Path,
    device: &B::Device,
) -> Result<()>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + MaskClassifier<B>,
    M::InnerModule: MaskClassifier<B::InnerBackend>,
{
    let outcome = fit(
        model,
        train_dataset,
        train_batcher,
        val_dataset,
        val_batcher,
        config,
        checkpoint_dir,
        device,
    )?;

    // Final validation metrics with the trained weights
    let (predictions, ground_truth) =
        predict_labeled::<B, M>(&outcome.model, val_dataset, val_batcher, config.batch_size);
    let metrics = Metrics::from_predictions(&predictions, &ground_truth, NUM_CLASSES);
    println!();
    println!("{}", metrics);

    let metrics_json = serde_json::to_string_pretty(&metrics)?;
    std::fs::write(run_dir.join("metrics.json"), metrics_json)?;

    outcome.history.save(&run_dir.join("history.json"))?;

    outcome
        .model
        .save_file(run_dir.join("model"), &CompactRecorder::new())
        .map_err(|e| MasknetError::Training(format!("Failed to save model: {:?}", e)))?;

    println!("  Best validation loss:     {:.4}", outcome.best_val_loss);
    println!(
        "  Best validation accuracy: {:.2}%",
        outcome.best_val_accuracy * 100.0
    );
    if outcome.stopped_early {
        println!(
            "  Stopped early after {} epochs",
            outcome.epochs_run
        );
    }

    Ok(())
}

/// Run arg-max prediction over a labeled dataset on the inner backend
fn predict_labeled<B, M>(
    model: &M,
    dataset: &MaskBurnDataset,
    batcher: &MaskBatcher,
    batch_size: usize,
) -> (Vec<usize>, Vec<usize>)
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + MaskClassifier<B>,
    M::InnerModule: MaskClassifier<B::InnerBackend>,
{
    let device = <B::InnerBackend as Backend>::Device::default();
    let inner_model = model.valid();

    let mut predictions = Vec::with_capacity(dataset.len());
    let mut ground_truth = Vec::with_capacity(dataset.len());

    let len = dataset.len();
    for start in (0..len).step_by(batch_size) {
        let end = (start + batch_size).min(len);
        let items: Vec<_> = (start..end).filter_map(|i| dataset.get(i)).collect();

        if items.is_empty() {
            continue;
        }

        ground_truth.extend(items.iter().map(|item| item.label));

        let batch = batcher.batch(items, &device);
        let output = inner_model.forward(batch.images);
        let argmax = output.argmax(1).flatten::<1>(0, 1);
        let indices: Vec<i64> = argmax.into_data().to_vec().unwrap_or_default();
        predictions.extend(indices.into_iter().map(|i| i as usize));
    }

    (predictions, ground_truth)
}
