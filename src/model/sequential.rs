//! Sequential CNN
//!
//! A straight stack of convolution + max-pool stages with filter count
//! growing with depth, terminated by two dense layers. Two presets are
//! provided: a wide-pooling four-stage net and a deeper filter-doubling net.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};

use crate::model::{pad_same, valid_out, MaskClassifier};

/// One convolution + pooling stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvStageConfig {
    /// Number of convolution filters
    pub filters: usize,
    /// Square convolution kernel size (same padding)
    pub kernel: usize,
    /// Square pooling window; stride equals the window size
    pub pool: usize,
}

/// Configuration for [`SequentialNet`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequentialConfig {
    /// Convolution stages, applied in order
    pub stages: Vec<ConvStageConfig>,
    /// Units in the hidden dense layer
    pub hidden_units: usize,
}

impl SequentialConfig {
    /// Four stages with shrinking kernels and aggressive pooling
    pub fn wide_pool() -> Self {
        Self {
            stages: vec![
                ConvStageConfig { filters: 16, kernel: 5, pool: 5 },
                ConvStageConfig { filters: 32, kernel: 3, pool: 3 },
                ConvStageConfig { filters: 64, kernel: 2, pool: 2 },
                ConvStageConfig { filters: 64, kernel: 2, pool: 2 },
            ],
            hidden_units: 256,
        }
    }

    /// `depth` stages of 3x3 convolutions, filter count doubling per stage
    pub fn doubling(depth: usize, start_filters: usize) -> Self {
        let mut filters = start_filters;
        let mut stages = Vec::with_capacity(depth);
        for _ in 0..depth {
            stages.push(ConvStageConfig {
                filters,
                kernel: 3,
                pool: 2,
            });
            filters *= 2;
        }

        Self {
            stages,
            hidden_units: 64,
        }
    }

    /// Number of flattened features after the final stage
    pub fn feature_size(&self, image_size: usize) -> usize {
        let mut size = image_size;
        for stage in &self.stages {
            // Convolution keeps dims (same padding); pooling is valid
            size = valid_out(size, stage.pool, stage.pool);
        }

        let channels = self.stages.last().map(|s| s.filters).unwrap_or(0);
        channels * size * size
    }

    /// Validate the configuration against an input size
    pub fn validate(&self, image_size: usize) -> Result<(), String> {
        if self.stages.is_empty() {
            return Err("Sequential net needs at least one conv stage".to_string());
        }

        let mut size = image_size;
        for (i, stage) in self.stages.iter().enumerate() {
            if stage.filters == 0 || stage.kernel == 0 || stage.pool == 0 {
                return Err(format!("Stage {} has a zero-sized parameter", i));
            }
            if size < stage.pool {
                return Err(format!(
                    "Stage {}: spatial size {} is smaller than pool window {}",
                    i, size, stage.pool
                ));
            }
            size = valid_out(size, stage.pool, stage.pool);
        }

        if self.hidden_units == 0 {
            return Err("hidden_units must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// A conv + relu + max-pool stage
#[derive(Module, Debug)]
pub struct ConvStage<B: Backend> {
    conv: Conv2d<B>,
    pool: MaxPool2d,
    kernel: usize,
}

impl<B: Backend> ConvStage<B> {
    fn new(in_channels: usize, stage: &ConvStageConfig, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new(
            [in_channels, stage.filters],
            [stage.kernel, stage.kernel],
        )
        .with_padding(PaddingConfig2d::Valid)
        .init(device);

        let pool = MaxPool2dConfig::new([stage.pool, stage.pool])
            .with_strides([stage.pool, stage.pool])
            .init();

        Self {
            conv,
            pool,
            kernel: stage.kernel,
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = pad_same(x, [self.kernel, self.kernel], [1, 1]);
        let x = self.conv.forward(x);
        let x = Relu::new().forward(x);
        self.pool.forward(x)
    }
}

/// Sequential mask classifier
#[derive(Module, Debug)]
pub struct SequentialNet<B: Backend> {
    stages: Vec<ConvStage<B>>,
    fc1: Linear<B>,
    fc2: Linear<B>,
}

impl<B: Backend> SequentialNet<B> {
    /// Create a new sequential net for the given input size and class count
    pub fn new(
        config: &SequentialConfig,
        image_size: usize,
        num_classes: usize,
        device: &B::Device,
    ) -> Self {
        let mut stages = Vec::with_capacity(config.stages.len());
        let mut in_channels = 3;
        for stage in &config.stages {
            stages.push(ConvStage::new(in_channels, stage, device));
            in_channels = stage.filters;
        }

        let features = config.feature_size(image_size);
        let fc1 = LinearConfig::new(features, config.hidden_units).init(device);
        let fc2 = LinearConfig::new(config.hidden_units, num_classes).init(device);

        Self { stages, fc1, fc2 }
    }
}

impl<B: Backend> MaskClassifier<B> for SequentialNet<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = images;
        for stage in &self.stages {
            x = stage.forward(x);
        }

        let x = x.flatten::<2>(1, 3);
        let x = self.fc1.forward(x);
        let x = Relu::new().forward(x);
        self.fc2.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn test_wide_pool_feature_size() {
        // 299 -> 59 -> 19 -> 9 -> 4, 64 channels
        let config = SequentialConfig::wide_pool();
        assert_eq!(config.feature_size(299), 64 * 4 * 4);
    }

    #[test]
    fn test_doubling_feature_size() {
        // 256 -> 128 -> 64 -> 32 -> 16 -> 8, filters 15..240
        let config = SequentialConfig::doubling(5, 15);
        assert_eq!(config.stages.len(), 5);
        assert_eq!(config.stages.last().unwrap().filters, 240);
        assert_eq!(config.feature_size(256), 240 * 8 * 8);
    }

    #[test]
    fn test_validate() {
        let config = SequentialConfig::wide_pool();
        assert!(config.validate(299).is_ok());
        // Too small for the pooling chain
        assert!(config.validate(8).is_err());
    }

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let config = SequentialConfig::doubling(2, 4);
        let model = SequentialNet::<TestBackend>::new(&config, 32, 3, &device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 3]);
    }

    #[test]
    fn test_wide_pool_output_shape_small_input() {
        let device = Default::default();
        let config = SequentialConfig::wide_pool();
        // 60 -> 12 -> 4 -> 2 -> 1
        let model = SequentialNet::<TestBackend>::new(&config, 60, 3, &device);

        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 60, 60], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [1, 3]);
    }
}
