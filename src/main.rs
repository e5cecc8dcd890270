//! masknet CLI
//!
//! Train convolutional mask-usage classifiers and export predictions for the
//! held-out test set.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing::info;

use masknet::backend::{backend_name, TrainingBackend};
use masknet::dataset::{class_name, MaskDataset};
use masknet::model::{
    Architecture, ModelConfig, MultiTowerConfig, SequentialConfig, TransferConfig,
};
use masknet::training::{
    run_training, EarlyStoppingConfig, ReduceLrConfig, TrainOptions, TrainingConfig,
};
use masknet::utils::logging::{init_logging, LogConfig};

/// Face-mask usage classification with Burn
#[derive(Parser, Debug)]
#[command(name = "masknet")]
#[command(version)]
#[command(about = "Train mask-usage classifiers and export test predictions", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Architecture variants selectable from the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ArchChoice {
    /// Four conv stages with wide pooling
    Sequential,
    /// Five conv stages with doubling filters (256x256 input)
    SequentialDeep,
    /// Parallel convolutional towers
    MultiTower,
    /// VGG-style backbone with a deep head
    Vggface,
    /// Separable-conv backbone with a compact head
    Xception,
    /// Densely connected backbone
    Densenet,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show dataset statistics
    Stats {
        /// Path to the dataset directory
        #[arg(short, long, default_value = "data/MaskDataset")]
        data_dir: PathBuf,
    },

    /// Train a model
    Train {
        /// Path to the dataset directory
        #[arg(short, long, default_value = "data/MaskDataset")]
        data_dir: PathBuf,

        /// Output directory for run artifacts
        #[arg(short, long, default_value = "output/models")]
        output_dir: PathBuf,

        /// Architecture to train
        #[arg(short, long, value_enum, default_value = "xception")]
        arch: ArchChoice,

        /// Number of training epochs
        #[arg(short, long, default_value = "50")]
        epochs: usize,

        /// Batch size
        #[arg(short, long, default_value = "16")]
        batch_size: usize,

        /// Learning rate
        #[arg(short, long, default_value = "0.0001")]
        learning_rate: f64,

        /// Fraction of labeled data held out for validation
        #[arg(long, default_value = "0.2")]
        validation_split: f64,

        /// Random seed
        #[arg(long, default_value = "1234")]
        seed: u64,

        /// Disable training-stream augmentation
        #[arg(long, default_value = "false")]
        no_augmentation: bool,

        /// Disable early stopping
        #[arg(long, default_value = "false")]
        no_early_stop: bool,

        /// Early-stopping patience in epochs
        #[arg(long, default_value = "10")]
        patience: usize,

        /// Number of leading backbone stages to freeze (transfer variants)
        #[arg(long)]
        freeze_stages: Option<usize>,

        /// Burn record file with pretrained backbone weights (transfer variants)
        #[arg(long)]
        weights: Option<PathBuf>,
    },

    /// Predict the test set and write the submission file
    Predict {
        /// Path to the dataset directory
        #[arg(short, long, default_value = "data/MaskDataset")]
        data_dir: PathBuf,

        /// Run directory produced by `train`
        #[arg(short, long)]
        run: PathBuf,

        /// Output submission file
        #[arg(short, long, default_value = "output/predictions.csv")]
        output: PathBuf,

        /// Batch size for inference
        #[arg(short, long, default_value = "16")]
        batch_size: usize,
    },

    /// Classify a single image
    Infer {
        /// Run directory produced by `train`
        #[arg(short, long)]
        run: PathBuf,

        /// Path to the input image
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    let _ = init_logging(&log_config);

    println!(
        "{}",
        format!("masknet {} | backend: {}", masknet::VERSION, backend_name()).green()
    );

    match cli.command {
        Commands::Stats { data_dir } => cmd_stats(&data_dir),
        Commands::Train {
            data_dir,
            output_dir,
            arch,
            epochs,
            batch_size,
            learning_rate,
            validation_split,
            seed,
            no_augmentation,
            no_early_stop,
            patience,
            freeze_stages,
            weights,
        } => cmd_train(TrainArgs {
            data_dir,
            output_dir,
            arch,
            epochs,
            batch_size,
            learning_rate,
            validation_split,
            seed,
            no_augmentation,
            no_early_stop,
            patience,
            freeze_stages,
            weights,
        }),
        Commands::Predict {
            data_dir,
            run,
            output,
            batch_size,
        } => cmd_predict(&data_dir, &run, &output, batch_size),
        Commands::Infer { run, input } => cmd_infer(&run, &input),
    }
}

struct TrainArgs {
    data_dir: PathBuf,
    output_dir: PathBuf,
    arch: ArchChoice,
    epochs: usize,
    batch_size: usize,
    learning_rate: f64,
    validation_split: f64,
    seed: u64,
    no_augmentation: bool,
    no_early_stop: bool,
    patience: usize,
    freeze_stages: Option<usize>,
    weights: Option<PathBuf>,
}

fn build_model_config(args: &TrainArgs) -> ModelConfig {
    let transfer = |mut config: TransferConfig| {
        if let Some(freeze) = args.freeze_stages {
            config.freeze_stages = freeze;
        }
        config.weights = args.weights.clone();
        Architecture::Transfer(config)
    };

    match args.arch {
        ArchChoice::Sequential => {
            ModelConfig::new(Architecture::Sequential(SequentialConfig::wide_pool()))
        }
        ArchChoice::SequentialDeep => {
            let mut config =
                ModelConfig::new(Architecture::Sequential(SequentialConfig::doubling(5, 15)));
            // The deep preset was tuned for a smaller input
            config.image_size = 256;
            config
        }
        ArchChoice::MultiTower => {
            ModelConfig::new(Architecture::MultiTower(MultiTowerConfig::default()))
        }
        ArchChoice::Vggface => ModelConfig::new(transfer(TransferConfig::vggface())),
        ArchChoice::Xception => ModelConfig::new(transfer(TransferConfig::xception())),
        ArchChoice::Densenet => ModelConfig::new(transfer(TransferConfig::densenet())),
    }
}

fn cmd_train(args: TrainArgs) -> Result<()> {
    let model = build_model_config(&args);

    let training = TrainingConfig {
        epochs: args.epochs,
        batch_size: args.batch_size,
        learning_rate: args.learning_rate,
        validation_fraction: args.validation_split,
        seed: args.seed,
        augmentation: !args.no_augmentation,
        early_stopping: (!args.no_early_stop).then(|| EarlyStoppingConfig {
            patience: args.patience,
        }),
        reduce_lr: Some(ReduceLrConfig::default()),
    };

    let options = TrainOptions {
        data_dir: args.data_dir,
        output_dir: args.output_dir,
        model,
        training,
    };

    let run_dir = run_training::<TrainingBackend>(&options)?;
    info!("Run artifacts in {:?}", run_dir);

    Ok(())
}

fn cmd_stats(data_dir: &PathBuf) -> Result<()> {
    let dataset = MaskDataset::new(data_dir)?;
    dataset.stats().print();

    match dataset.test_files() {
        Ok(files) => println!("\n  Test images: {}", files.len()),
        Err(_) => println!("\n  Test images: none found"),
    }

    Ok(())
}

fn cmd_predict(
    data_dir: &PathBuf,
    run: &PathBuf,
    output: &PathBuf,
    batch_size: usize,
) -> Result<()> {
    use masknet::backend::DefaultBackend;

    println!("{}", "Predicting test set...".cyan());
    let predictions =
        masknet::inference::predict_test_set::<DefaultBackend>(data_dir, run, batch_size)?;

    masknet::inference::write_submission(output, &predictions)?;

    println!(
        "{} {} predictions written to {:?}",
        "Done:".green().bold(),
        predictions.len(),
        output
    );

    Ok(())
}

fn cmd_infer(run: &PathBuf, input: &PathBuf) -> Result<()> {
    use masknet::backend::DefaultBackend;

    let prediction = masknet::inference::infer_image::<DefaultBackend>(run, input)?;

    println!("Image: {}", prediction.filename);
    println!(
        "Prediction: {} (class {})",
        class_name(prediction.class_index).unwrap_or("unknown"),
        prediction.class_index
    );
    println!("Confidence: {:.1}%", prediction.confidence * 100.0);
    println!("Probabilities:");
    for (idx, prob) in prediction.probabilities.iter().enumerate() {
        println!(
            "  {} {:20} {:.1}%",
            idx,
            class_name(idx).unwrap_or("unknown"),
            prob * 100.0
        );
    }

    Ok(())
}
