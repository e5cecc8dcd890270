//! Error Handling Module
//!
//! Defines custom error types for the masknet library.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for masknet operations
#[derive(Error, Debug)]
pub enum MasknetError {
    /// Error loading or processing an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// The label file references images that do not exist on disk
    #[error("Label file references {count} missing image(s), first: '{first}'")]
    MissingImages { count: usize, first: String },

    /// Error with model operations
    #[error("Model error: {0}")]
    Model(String),

    /// Error with training
    #[error("Training error: {0}")]
    Training(String),

    /// Error with inference
    #[error("Inference error: {0}")]
    Inference(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

/// Convenience Result type for masknet operations
pub type Result<T> = std::result::Result<T, MasknetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MasknetError::Dataset("test error".to_string());
        assert_eq!(format!("{}", err), "Dataset error: test error");
    }

    #[test]
    fn test_missing_images_error() {
        let err = MasknetError::MissingImages {
            count: 3,
            first: "10001.jpg".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("3 missing"));
        assert!(msg.contains("10001.jpg"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: MasknetError = io.into();
        assert!(matches!(err, MasknetError::Io(_)));
    }
}
