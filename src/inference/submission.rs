//! Submission export
//!
//! Writes the predicted class indices to the competition text format:
//! a header line followed by one `<filename>,<class index>` row per test
//! image, in the order the predictions were produced. The row count is the
//! number of predictions, never a fixed constant.

use std::path::Path;

use tracing::info;

use crate::inference::predictor::Prediction;
use crate::utils::error::{MasknetError, Result};

/// Header line of the submission file
pub const SUBMISSION_HEADER: &str = "Id,Category";

/// Render predictions into the submission text format
pub fn format_submission(predictions: &[Prediction]) -> String {
    let mut out = String::with_capacity((predictions.len() + 1) * 16);
    out.push_str(SUBMISSION_HEADER);
    out.push('\n');

    for prediction in predictions {
        out.push_str(&prediction.filename);
        out.push(',');
        out.push_str(&prediction.class_index.to_string());
        out.push('\n');
    }

    out
}

/// Write predictions to a submission file
pub fn write_submission(path: &Path, predictions: &[Prediction]) -> Result<()> {
    if predictions.is_empty() {
        return Err(MasknetError::Inference(
            "No predictions to write".to_string(),
        ));
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    std::fs::write(path, format_submission(predictions))?;
    info!("Wrote {} predictions to {:?}", predictions.len(), path);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(filename: &str, class_index: usize) -> Prediction {
        Prediction {
            filename: filename.to_string(),
            class_index,
            confidence: 0.9,
            probabilities: vec![0.05, 0.05, 0.9],
        }
    }

    #[test]
    fn test_format_has_header_and_one_row_per_prediction() {
        let predictions = vec![
            prediction("10001.jpg", 2),
            prediction("10002.jpg", 0),
            prediction("10003.jpg", 1),
        ];

        let text = format_submission(&predictions);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 1 + predictions.len());
        assert_eq!(lines[0], "Id,Category");
        assert_eq!(lines[1], "10001.jpg,2");
        assert_eq!(lines[3], "10003.jpg,1");
    }

    #[test]
    fn test_rows_match_expected_pattern() {
        let predictions: Vec<Prediction> = (0..450)
            .map(|i| prediction(&format!("{}.jpg", 10001 + i), i % 3))
            .collect();

        let text = format_submission(&predictions);
        for line in text.lines().skip(1) {
            let (filename, class) = line.split_once(',').expect("row must contain a comma");
            assert!(filename.ends_with(".jpg"));
            let class: usize = class.parse().expect("class must be an integer");
            assert!(class < 3);
        }
        assert_eq!(text.lines().count(), 451);
    }

    #[test]
    fn test_write_submission_roundtrip() {
        let path = std::env::temp_dir().join("masknet_submission_test.csv");
        let predictions = vec![prediction("10001.jpg", 1)];

        write_submission(&path, &predictions).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(written, "Id,Category\n10001.jpg,1\n");
    }

    #[test]
    fn test_write_submission_rejects_empty() {
        let path = std::env::temp_dir().join("masknet_submission_empty.csv");
        assert!(write_submission(&path, &[]).is_err());
    }
}
