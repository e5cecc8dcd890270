//! Training loop
//!
//! A custom epoch loop over Burn's lower-level API: forward, cross-entropy
//! loss, backward, Adam step. Validation runs after every epoch on the inner
//! (non-autodiff) backend; callbacks decide the learning rate and when to
//! stop, and weights are checkpointed each epoch.

use std::path::Path;

use burn::{
    data::dataloader::batcher::Batcher,
    data::dataset::Dataset,
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    record::CompactRecorder,
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::dataset::batch::{AugmentingBatcher, MaskBatcher, MaskBurnDataset, RawMaskDataset};
use crate::model::MaskClassifier;
use crate::training::callbacks::{EarlyStopping, ReduceLrOnPlateau};
use crate::training::history::{EpochRecord, TrainingHistory};
use crate::training::TrainingConfig;
use crate::utils::error::{MasknetError, Result};
use crate::utils::logging::TrainingLogger;
use crate::utils::metrics::{AccuracyTracker, RunningAverage};

/// Result of a completed training run
pub struct FitOutcome<M> {
    /// The trained model (final epoch weights)
    pub model: M,
    /// Per-epoch history
    pub history: TrainingHistory,
    /// Lowest validation loss observed
    pub best_val_loss: f64,
    /// Highest validation accuracy observed
    pub best_val_accuracy: f64,
    /// Number of epochs actually run
    pub epochs_run: usize,
    /// Whether early stopping ended the run
    pub stopped_early: bool,
}

/// Train a model against the given datasets
///
/// The training stream is re-shuffled and re-augmented each epoch. Weights
/// are checkpointed into `checkpoint_dir` after every epoch as `cp_NN`.
pub fn fit<B, M>(
    mut model: M,
    train_dataset: &RawMaskDataset,
    train_batcher: &AugmentingBatcher,
    val_dataset: &MaskBurnDataset,
    val_batcher: &MaskBatcher,
    config: &TrainingConfig,
    checkpoint_dir: &Path,
    device: &B::Device,
) -> Result<FitOutcome<M>>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + MaskClassifier<B>,
    M::InnerModule: MaskClassifier<B::InnerBackend>,
{
    config.validate()?;

    if train_dataset.len() < config.batch_size {
        return Err(MasknetError::Training(format!(
            "Not enough training data ({}) for batch size {}",
            train_dataset.len(),
            config.batch_size
        )));
    }

    std::fs::create_dir_all(checkpoint_dir)?;

    let mut optimizer = AdamConfig::new().init();
    let recorder = CompactRecorder::new();

    let mut early_stopping = config
        .early_stopping
        .as_ref()
        .map(EarlyStopping::new);
    let mut reduce_lr = config
        .reduce_lr
        .as_ref()
        .map(|c| ReduceLrOnPlateau::new(c, config.learning_rate));

    let mut history = TrainingHistory::new();
    let mut logger = TrainingLogger::new(config.epochs);

    let mut best_val_loss = f64::INFINITY;
    let mut best_val_accuracy = 0.0f64;
    let mut stopped_early = false;
    let mut epochs_run = 0;

    let mut epoch_rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut learning_rate = config.learning_rate;

    for epoch in 0..config.epochs {
        logger.start_epoch(epoch);
        epochs_run = epoch + 1;

        let mut epoch_loss = RunningAverage::new();
        let mut train_accuracy = AccuracyTracker::new();

        let mut indices: Vec<usize> = (0..train_dataset.len()).collect();
        indices.shuffle(&mut epoch_rng);

        let num_batches = indices.len().div_ceil(config.batch_size);

        for batch_idx in 0..num_batches {
            let start = batch_idx * config.batch_size;
            let end = (start + config.batch_size).min(indices.len());
            let items: Vec<_> = indices[start..end]
                .iter()
                .filter_map(|&i| train_dataset.get(i))
                .collect();

            if items.is_empty() {
                continue;
            }

            let batch = train_batcher.batch(items, device);

            let output = model.forward(batch.images.clone());

            let loss = CrossEntropyLossConfig::new()
                .init(&output.device())
                .forward(output.clone(), batch.targets.clone());

            let loss_value: f64 = loss.clone().into_scalar().elem();
            epoch_loss.add(loss_value);

            let batch_size = batch.targets.dims()[0];
            let correct = count_correct(&output, &batch.targets);
            train_accuracy.add(correct, batch_size);

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optimizer.step(learning_rate, model, grads);

            if (batch_idx + 1) % 10 == 0 || batch_idx == num_batches - 1 {
                debug!(
                    "  batch {:>4}/{}: loss = {:.4}, acc = {:.2}%",
                    batch_idx + 1,
                    num_batches,
                    loss_value,
                    train_accuracy.accuracy() * 100.0
                );
            }
        }

        let (val_loss, val_accuracy) =
            evaluate(&model, val_dataset, val_batcher, config.batch_size);

        if val_loss < best_val_loss {
            best_val_loss = val_loss;
            logger.log_new_best(val_loss);
        }
        if val_accuracy > best_val_accuracy {
            best_val_accuracy = val_accuracy;
        }

        history.push(EpochRecord {
            epoch: epoch + 1,
            train_loss: epoch_loss.average(),
            train_accuracy: train_accuracy.accuracy(),
            val_loss,
            val_accuracy,
            learning_rate,
        });

        logger.end_epoch(epoch_loss.average(), val_loss, val_accuracy, learning_rate);

        let checkpoint_path = checkpoint_dir.join(format!("cp_{:02}", epoch + 1));
        model
            .clone()
            .save_file(checkpoint_path, &recorder)
            .map_err(|e| MasknetError::Training(format!("Failed to save checkpoint: {:?}", e)))?;

        if let Some(rlr) = reduce_lr.as_mut() {
            let (new_lr, reduced) = rlr.step(val_loss);
            if reduced {
                logger.log_lr_reduced(new_lr);
            }
            learning_rate = new_lr;
        }

        if let Some(es) = early_stopping.as_mut() {
            if es.observe(val_loss) {
                logger.log_early_stop(es.patience());
                stopped_early = true;
                break;
            }
        }
    }

    logger.log_complete(epochs_run, best_val_accuracy);

    Ok(FitOutcome {
        model,
        history,
        best_val_loss,
        best_val_accuracy,
        epochs_run,
        stopped_early,
    })
}

/// Evaluate a model on a dataset, returning (average loss, accuracy)
pub fn evaluate<B, M>(
    model: &M,
    dataset: &MaskBurnDataset,
    batcher: &MaskBatcher,
    batch_size: usize,
) -> (f64, f64)
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + MaskClassifier<B>,
    M::InnerModule: MaskClassifier<B::InnerBackend>,
{
    let device = <B::InnerBackend as Backend>::Device::default();
    let inner_model = model.valid();

    let mut loss_avg = RunningAverage::new();
    let mut accuracy = AccuracyTracker::new();

    let len = dataset.len();
    for start in (0..len).step_by(batch_size) {
        let end = (start + batch_size).min(len);
        let items: Vec<_> = (start..end).filter_map(|i| dataset.get(i)).collect();

        if items.is_empty() {
            continue;
        }

        let batch = batcher.batch(items, &device);
        let output = inner_model.forward(batch.images);

        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), batch.targets.clone());
        loss_avg.add(loss.into_scalar().elem());

        let correct = count_correct(&output, &batch.targets);
        accuracy.add(correct, end - start);
    }

    (loss_avg.average(), accuracy.accuracy())
}

/// Count arg-max predictions matching the targets
fn count_correct<B: Backend>(output: &Tensor<B, 2>, targets: &Tensor<B, 1, Int>) -> usize {
    let predictions = output.clone().argmax(1).flatten::<1>(0, 1);
    let correct: i64 = predictions
        .equal(targets.clone())
        .int()
        .sum()
        .into_scalar()
        .elem();
    correct as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn test_count_correct() {
        let device = Default::default();

        // Logits picking classes [0, 2, 1]
        let output = Tensor::<TestBackend, 2>::from_floats(
            TensorData::new(
                vec![5.0f32, 1.0, 0.0, 0.0, 1.0, 5.0, 0.0, 5.0, 1.0],
                [3, 3],
            ),
            &device,
        );
        let targets = Tensor::<TestBackend, 1, Int>::from_data(
            TensorData::new(vec![0i64, 2, 2], [3]),
            &device,
        );

        assert_eq!(count_correct(&output, &targets), 2);
    }
}
