//! Inference and export: reload a trained run, predict over the test
//! partition, and write the submission file.

pub mod predictor;
pub mod submission;

pub use predictor::{infer_image, load_model, predict_test_set, Prediction};
pub use submission::{format_submission, write_submission, SUBMISSION_HEADER};
