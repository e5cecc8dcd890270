//! Multi-Tower CNN
//!
//! At each depth level, `num_towers` parallel convolutional towers with
//! varying kernel sizes are computed and concatenated channel-wise before the
//! next pooling stage. Kernel sizes and filter counts are derived from the
//! tower index by fixed arithmetic formulas; some towers skip one or both of
//! their convolutions and only pool.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};

use crate::model::{pad_same, same_out, MaskClassifier};

/// Configuration for [`MultiTowerNet`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiTowerConfig {
    /// Number of parallel towers per depth level
    pub num_towers: usize,
    /// Number of depth levels
    pub depth: usize,
    /// Dropout rate before the hidden dense layer
    pub dropout_rate: f64,
    /// Units in the hidden dense layer
    pub hidden_units: usize,
}

impl Default for MultiTowerConfig {
    fn default() -> Self {
        Self {
            num_towers: 8,
            depth: 2,
            dropout_rate: 0.5,
            hidden_units: 1024,
        }
    }
}

impl MultiTowerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.num_towers == 0 {
            return Err("num_towers must be greater than 0".to_string());
        }
        if self.depth == 0 {
            return Err("depth must be greater than 0".to_string());
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err("dropout_rate must be in [0.0, 1.0)".to_string());
        }
        if self.hidden_units == 0 {
            return Err("hidden_units must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Kernel size of tower `j`'s first convolution
    fn kernel(&self, j: usize) -> [usize; 2] {
        let ks_x = self.num_towers - j + 3;
        let ks_y = ks_x * self.num_towers;
        [ks_x, ks_y]
    }

    /// Kernel size of tower `j`'s second convolution
    fn second_kernel(&self, j: usize) -> [usize; 2] {
        let [ks_x, ks_y] = self.kernel(j);
        [
            ks_x.saturating_sub(2).max(1),
            ks_y.saturating_sub(2 * self.num_towers).max(1),
        ]
    }

    /// Filter count of tower `j`'s first convolution
    fn filters(&self, j: usize) -> usize {
        (j + 1) * 2 + 10
    }

    /// Whether tower `j` has its first convolution
    fn has_conv1(&self, j: usize) -> bool {
        j < self.num_towers / 2
    }

    /// Whether tower `j` has its second convolution
    fn has_conv2(&self, j: usize) -> bool {
        j % 2 == 0
    }

    /// Output channels of tower `j` for a given input channel count
    fn tower_out_channels(&self, in_channels: usize, j: usize) -> usize {
        let after_first = if self.has_conv1(j) {
            self.filters(j)
        } else {
            in_channels
        };

        if self.has_conv2(j) {
            self.filters(j) * 2
        } else {
            after_first
        }
    }

    /// Concatenated channel count after one level
    fn level_out_channels(&self, in_channels: usize) -> usize {
        (0..self.num_towers)
            .map(|j| self.tower_out_channels(in_channels, j))
            .sum()
    }

    /// Number of flattened features after all levels
    pub fn feature_size(&self, image_size: usize) -> usize {
        let mut channels = 3;
        let mut size = image_size;

        for _ in 0..self.depth {
            channels = self.level_out_channels(channels);
            // Two pooled blocks per tower plus the level pool, stride 2 each
            size = same_out(size, 2);
            size = same_out(size, 2);
            size = same_out(size, 2);
        }

        channels * size * size
    }
}

/// One conv-or-pool block inside a tower: optional convolution, then a
/// 3x3 stride-2 pooling stage
#[derive(Module, Debug)]
pub struct TowerBlock<B: Backend> {
    conv: Option<Conv2d<B>>,
    kernel_h: usize,
    kernel_w: usize,
    pool: MaxPool2d,
}

impl<B: Backend> TowerBlock<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: [usize; 2],
        with_conv: bool,
        device: &B::Device,
    ) -> Self {
        let conv = with_conv.then(|| {
            Conv2dConfig::new([in_channels, out_channels], kernel)
                .with_padding(PaddingConfig2d::Valid)
                .init(device)
        });

        let pool = MaxPool2dConfig::new([3, 3]).with_strides([2, 2]).init();

        Self {
            conv,
            kernel_h: kernel[0],
            kernel_w: kernel[1],
            pool,
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.conv {
            Some(conv) => {
                let x = pad_same(x, [self.kernel_h, self.kernel_w], [1, 1]);
                Relu::new().forward(conv.forward(x))
            }
            None => x,
        };

        let x = pad_same(x, [3, 3], [2, 2]);
        self.pool.forward(x)
    }
}

/// One parallel tower: two blocks, the second with doubled filters and a
/// reduced kernel
#[derive(Module, Debug)]
pub struct Tower<B: Backend> {
    block1: TowerBlock<B>,
    block2: TowerBlock<B>,
}

impl<B: Backend> Tower<B> {
    fn new(config: &MultiTowerConfig, in_channels: usize, j: usize, device: &B::Device) -> Self {
        let filters = config.filters(j);
        let after_first = if config.has_conv1(j) {
            filters
        } else {
            in_channels
        };

        let block1 = TowerBlock::new(
            in_channels,
            filters,
            config.kernel(j),
            config.has_conv1(j),
            device,
        );
        let block2 = TowerBlock::new(
            after_first,
            filters * 2,
            config.second_kernel(j),
            config.has_conv2(j),
            device,
        );

        Self { block1, block2 }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.block1.forward(x);
        self.block2.forward(x)
    }
}

/// One depth level: parallel towers concatenated, then pooled
#[derive(Module, Debug)]
pub struct TowerLevel<B: Backend> {
    towers: Vec<Tower<B>>,
    pool: MaxPool2d,
}

impl<B: Backend> TowerLevel<B> {
    fn new(config: &MultiTowerConfig, in_channels: usize, device: &B::Device) -> Self {
        let towers = (0..config.num_towers)
            .map(|j| Tower::new(config, in_channels, j, device))
            .collect();

        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        Self { towers, pool }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let branches: Vec<Tensor<B, 4>> = self
            .towers
            .iter()
            .map(|tower| tower.forward(x.clone()))
            .collect();

        let x = Tensor::cat(branches, 1);
        let x = pad_same(x, [2, 2], [2, 2]);
        self.pool.forward(x)
    }

    /// Number of parallel towers in this level
    pub fn num_towers(&self) -> usize {
        self.towers.len()
    }
}

/// Multi-tower mask classifier
#[derive(Module, Debug)]
pub struct MultiTowerNet<B: Backend> {
    levels: Vec<TowerLevel<B>>,
    dropout: Dropout,
    fc1: Linear<B>,
    fc2: Linear<B>,
}

impl<B: Backend> MultiTowerNet<B> {
    /// Create a new multi-tower net for the given input size and class count
    pub fn new(
        config: &MultiTowerConfig,
        image_size: usize,
        num_classes: usize,
        device: &B::Device,
    ) -> Self {
        let mut levels = Vec::with_capacity(config.depth);
        let mut channels = 3;
        for _ in 0..config.depth {
            levels.push(TowerLevel::new(config, channels, device));
            channels = config.level_out_channels(channels);
        }

        let features = config.feature_size(image_size);
        let dropout = DropoutConfig::new(config.dropout_rate).init();
        let fc1 = LinearConfig::new(features, config.hidden_units).init(device);
        let fc2 = LinearConfig::new(config.hidden_units, num_classes).init(device);

        Self {
            levels,
            dropout,
            fc1,
            fc2,
        }
    }

    /// Access the depth levels (each holds its parallel towers)
    pub fn levels(&self) -> &[TowerLevel<B>] {
        &self.levels
    }
}

impl<B: Backend> MaskClassifier<B> for MultiTowerNet<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = images;
        for level in &self.levels {
            x = level.forward(x);
        }

        let x = x.flatten::<2>(1, 3);
        let x = self.dropout.forward(x);
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
    fn test_tower_out_channels() {
        let config = MultiTowerConfig::default();

        // j even with both convs: doubled filters
        assert_eq!(config.tower_out_channels(3, 0), 24);
        // j odd below num_towers/2: first conv only
        assert_eq!(config.tower_out_channels(3, 1), 14);
        // j even above num_towers/2: second conv only
        assert_eq!(config.tower_out_channels(3, 4), 40);
        // j odd above num_towers/2: pooling only, channels unchanged
        assert_eq!(config.tower_out_channels(3, 5), 3);
    }

    #[test]
    fn test_level_out_channels() {
        let config = MultiTowerConfig::default();

        // 24 + 14 + 32 + 18 + 40 + 3 + 48 + 3
        assert_eq!(config.level_out_channels(3), 182);
        assert_eq!(config.level_out_channels(182), 540);
    }

    #[test]
    fn test_feature_size() {
        let config = MultiTowerConfig::default();

        // Spatial: 299 -> 38 after level 1, -> 5 after level 2
        assert_eq!(config.feature_size(299), 540 * 5 * 5);
    }

    #[test]
    fn test_kernel_formulas() {
        let config = MultiTowerConfig::default();

        assert_eq!(config.kernel(0), [11, 88]);
        assert_eq!(config.kernel(7), [4, 32]);
        assert_eq!(config.second_kernel(0), [9, 72]);
        assert_eq!(config.second_kernel(7), [2, 16]);
    }

    #[test]
    fn test_each_level_has_num_towers_branches() {
        let device = Default::default();
        let config = MultiTowerConfig {
            num_towers: 4,
            depth: 2,
            dropout_rate: 0.5,
            hidden_units: 32,
        };
        let model = MultiTowerNet::<TestBackend>::new(&config, 32, 3, &device);

        assert_eq!(model.levels().len(), 2);
        for level in model.levels() {
            assert_eq!(level.num_towers(), config.num_towers);
        }
    }

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let config = MultiTowerConfig {
            num_towers: 2,
            depth: 1,
            dropout_rate: 0.5,
            hidden_units: 16,
        };
        let model = MultiTowerNet::<TestBackend>::new(&config, 24, 3, &device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 24, 24], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 3]);
    }

    #[test]
    fn test_validate() {
        assert!(MultiTowerConfig::default().validate().is_ok());

        let bad = MultiTowerConfig {
            num_towers: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
