//! Model Configuration
//!
//! A single explicit configuration object selects the architecture variant
//! and its hyperparameters. The configuration is saved as JSON beside every
//! checkpoint so a run can be reloaded for inference without guessing which
//! network produced it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::backbone::TransferConfig;
use crate::model::multi_tower::MultiTowerConfig;
use crate::model::sequential::SequentialConfig;
use crate::utils::error::{MasknetError, Result};
use crate::{IMAGE_SIZE, NUM_CLASSES};

/// Architecture variant with its hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Architecture {
    /// Straight conv + max-pool stack
    Sequential(SequentialConfig),
    /// Parallel convolutional towers per depth level
    MultiTower(MultiTowerConfig),
    /// Pretrained-style backbone with a new classification head
    Transfer(TransferConfig),
}

impl Architecture {
    /// Short name used in logs and run metadata
    pub fn name(&self) -> &'static str {
        match self {
            Architecture::Sequential(_) => "sequential",
            Architecture::MultiTower(_) => "multi_tower",
            Architecture::Transfer(config) => config.backbone.name(),
        }
    }
}

/// Full model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Selected architecture variant
    pub architecture: Architecture,
    /// Number of output classes
    pub num_classes: usize,
    /// Input image size (square)
    pub image_size: usize,
}

impl ModelConfig {
    /// Create a configuration with the default class count and image size
    pub fn new(architecture: Architecture) -> Self {
        Self {
            architecture,
            num_classes: NUM_CLASSES,
            image_size: IMAGE_SIZE,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.num_classes == 0 {
            return Err(MasknetError::Config(
                "num_classes must be greater than 0".to_string(),
            ));
        }
        if self.image_size == 0 {
            return Err(MasknetError::Config(
                "image_size must be greater than 0".to_string(),
            ));
        }

        match &self.architecture {
            Architecture::Sequential(config) => config
                .validate(self.image_size)
                .map_err(MasknetError::Config),
            Architecture::MultiTower(config) => {
                config.validate().map_err(MasknetError::Config)
            }
            Architecture::Transfer(config) => config.validate(),
        }
    }

    /// Save the configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MasknetError::PathNotFound(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::backbone::BackboneKind;

    #[test]
    fn test_validate_default_variants() {
        for architecture in [
            Architecture::Sequential(SequentialConfig::wide_pool()),
            Architecture::MultiTower(MultiTowerConfig::default()),
            Architecture::Transfer(TransferConfig::xception()),
        ] {
            let config = ModelConfig::new(architecture);
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn test_architecture_names() {
        assert_eq!(
            Architecture::Sequential(SequentialConfig::wide_pool()).name(),
            "sequential"
        );
        assert_eq!(
            Architecture::Transfer(TransferConfig::densenet()).name(),
            "densenet"
        );
    }

    #[test]
    fn test_save_load_roundtrip() {
        let path = std::env::temp_dir().join("masknet_model_config_test.json");

        let config = ModelConfig::new(Architecture::Transfer(TransferConfig::vggface()));
        config.save(&path).unwrap();
        let loaded = ModelConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.num_classes, config.num_classes);
        match loaded.architecture {
            Architecture::Transfer(t) => {
                assert_eq!(t.backbone, BackboneKind::VggFace);
                assert_eq!(t.head_units, vec![1024, 512, 256, 128, 64]);
            }
            other => panic!("unexpected architecture: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = ModelConfig::new(Architecture::MultiTower(MultiTowerConfig {
            num_towers: 0,
            ..Default::default()
        }));
        assert!(config.validate().is_err());

        config = ModelConfig::new(Architecture::Sequential(SequentialConfig::wide_pool()));
        config.num_classes = 0;
        assert!(config.validate().is_err());
    }
}
