//! Utility modules: error types, logging, and evaluation metrics.

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{MasknetError, Result};
pub use logging::{init_logging, LogConfig, LogLevel, TrainingLogger};
pub use metrics::{AccuracyTracker, ConfusionMatrix, Metrics, RunningAverage};
