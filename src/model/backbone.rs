//! Transfer-learning models
//!
//! A backbone feature extractor wrapped with a new classification head
//! (dropout + dense stack). Three backbone families are provided:
//!
//! - `VggFace`: plain 3x3 conv blocks, as in VGG-style face networks
//! - `Xception`: depthwise-separable conv blocks
//! - `DenseNet`: densely connected blocks with 1x1 transitions
//!
//! Backbone weights can be loaded from a Burn record file, and the first
//! `freeze_stages` stages can be frozen so only the remaining layers train.

use std::path::PathBuf;

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    record::CompactRecorder,
    tensor::{backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};

use crate::model::MaskClassifier;
use crate::utils::error::{MasknetError, Result};

/// Supported backbone families
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BackboneKind {
    /// VGG-style plain convolution blocks (face-recognition lineage)
    VggFace,
    /// Depthwise-separable convolution blocks
    Xception,
    /// Densely connected convolution blocks
    DenseNet,
}

impl BackboneKind {
    /// Short name used in logs and run metadata
    pub fn name(&self) -> &'static str {
        match self {
            BackboneKind::VggFace => "vggface",
            BackboneKind::Xception => "xception",
            BackboneKind::DenseNet => "densenet",
        }
    }

    /// Number of backbone stages this family is built with
    pub fn stage_count(&self) -> usize {
        match self {
            BackboneKind::VggFace => 5,
            BackboneKind::Xception | BackboneKind::DenseNet => 4,
        }
    }
}

/// Configuration for [`TransferNet`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Backbone family
    pub backbone: BackboneKind,
    /// Number of leading backbone stages to freeze (0 trains everything)
    pub freeze_stages: usize,
    /// Optional Burn record file with pretrained backbone weights
    pub weights: Option<PathBuf>,
    /// Hidden units of the classification head, applied in order
    pub head_units: Vec<usize>,
    /// Dropout rate applied before each hidden head layer
    pub dropout_rate: f64,
}

impl TransferConfig {
    /// VGG-style backbone with the deep head used for face-network transfer
    pub fn vggface() -> Self {
        Self {
            backbone: BackboneKind::VggFace,
            freeze_stages: 3,
            weights: None,
            head_units: vec![1024, 512, 256, 128, 64],
            dropout_rate: 0.5,
        }
    }

    /// Separable-conv backbone with a compact head, trained end to end
    pub fn xception() -> Self {
        Self {
            backbone: BackboneKind::Xception,
            freeze_stages: 0,
            weights: None,
            head_units: vec![256],
            dropout_rate: 0.5,
        }
    }

    /// Densely connected backbone with a two-layer head
    pub fn densenet() -> Self {
        Self {
            backbone: BackboneKind::DenseNet,
            freeze_stages: 0,
            weights: None,
            head_units: vec![1024, 512],
            dropout_rate: 0.5,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(MasknetError::Config(
                "dropout_rate must be in [0.0, 1.0)".to_string(),
            ));
        }

        let stages = self.backbone.stage_count();
        if self.freeze_stages > stages {
            return Err(MasknetError::Config(format!(
                "freeze_stages {} exceeds the {} stages of {}",
                self.freeze_stages,
                stages,
                self.backbone.name()
            )));
        }

        Ok(())
    }
}

/// One backbone stage
///
/// Covers the three block styles through its construction: plain conv
/// stacks, separable convs (depthwise + pointwise pairs), and dense blocks
/// (concatenated growth layers with a 1x1 transition).
#[derive(Module, Debug)]
pub struct BackboneStage<B: Backend> {
    convs: Vec<Conv2d<B>>,
    pointwise: Vec<Conv2d<B>>,
    // Present only on dense blocks, which also selects dense connectivity
    transition: Option<Conv2d<B>>,
    pool: Option<MaxPool2d>,
}

fn conv3x3<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    groups: usize,
    device: &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [3, 3])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_groups(groups)
        .init(device)
}

fn conv1x1<B: Backend>(in_channels: usize, out_channels: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [1, 1]).init(device)
}

fn pool2() -> MaxPool2d {
    MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init()
}

impl<B: Backend> BackboneStage<B> {
    /// Plain conv block: `n_convs` 3x3 convolutions, then 2x2 pooling
    fn plain(in_channels: usize, out_channels: usize, n_convs: usize, device: &B::Device) -> Self {
        let mut convs = Vec::with_capacity(n_convs);
        let mut channels = in_channels;
        for _ in 0..n_convs {
            convs.push(conv3x3(channels, out_channels, 1, device));
            channels = out_channels;
        }

        Self {
            convs,
            pointwise: Vec::new(),
            transition: None,
            pool: Some(pool2()),
        }
    }

    /// Separable block: `n` depthwise 3x3 + pointwise 1x1 pairs, then pooling
    fn separable(in_channels: usize, out_channels: usize, n: usize, device: &B::Device) -> Self {
        let mut convs = Vec::with_capacity(n);
        let mut pointwise = Vec::with_capacity(n);
        let mut channels = in_channels;
        for _ in 0..n {
            convs.push(conv3x3(channels, channels, channels, device));
            pointwise.push(conv1x1(channels, out_channels, device));
            channels = out_channels;
        }

        Self {
            convs,
            pointwise,
            transition: None,
            pool: Some(pool2()),
        }
    }

    /// Dense block: `n_layers` growth convolutions over the concatenated
    /// features, then a 1x1 transition and pooling
    fn dense_block(
        in_channels: usize,
        growth: usize,
        n_layers: usize,
        transition_out: usize,
        device: &B::Device,
    ) -> Self {
        let mut convs = Vec::with_capacity(n_layers);
        let mut channels = in_channels;
        for _ in 0..n_layers {
            convs.push(conv3x3(channels, growth, 1, device));
            channels += growth;
        }

        Self {
            convs,
            pointwise: Vec::new(),
            transition: Some(conv1x1(channels, transition_out, device)),
            pool: Some(pool2()),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let relu = Relu::new();

        let mut x = if self.transition.is_some() {
            let mut features = x;
            for conv in &self.convs {
                let new = relu.forward(conv.forward(features.clone()));
                features = Tensor::cat(vec![features, new], 1);
            }
            features
        } else if self.pointwise.is_empty() {
            let mut x = x;
            for conv in &self.convs {
                x = relu.forward(conv.forward(x));
            }
            x
        } else {
            let mut x = x;
            for (dw, pw) in self.convs.iter().zip(self.pointwise.iter()) {
                x = relu.forward(pw.forward(dw.forward(x)));
            }
            x
        };

        if let Some(transition) = &self.transition {
            x = relu.forward(transition.forward(x));
        }

        match &self.pool {
            Some(pool) => pool.forward(x),
            None => x,
        }
    }
}

/// Backbone feature extractor: a sequence of stages
#[derive(Module, Debug)]
pub struct Backbone<B: Backend> {
    stages: Vec<BackboneStage<B>>,
}

impl<B: Backend> Backbone<B> {
    /// Build a backbone, returning it with its output channel count
    pub fn new(kind: BackboneKind, device: &B::Device) -> (Self, usize) {
        let (stages, out_channels) = match kind {
            BackboneKind::VggFace => {
                let channels = [64, 128, 256, 512, 512];
                let mut stages = Vec::with_capacity(channels.len());
                let mut in_ch = 3;
                for out_ch in channels {
                    stages.push(BackboneStage::plain(in_ch, out_ch, 2, device));
                    in_ch = out_ch;
                }
                (stages, 512)
            }
            BackboneKind::Xception => {
                let mut stages = vec![BackboneStage::plain(3, 64, 1, device)];
                let mut in_ch = 64;
                for out_ch in [128, 256, 512] {
                    stages.push(BackboneStage::separable(in_ch, out_ch, 2, device));
                    in_ch = out_ch;
                }
                (stages, 512)
            }
            BackboneKind::DenseNet => {
                let stages = vec![
                    BackboneStage::plain(3, 64, 1, device),
                    BackboneStage::dense_block(64, 32, 4, 128, device),
                    BackboneStage::dense_block(128, 32, 4, 160, device),
                    BackboneStage::dense_block(160, 32, 4, 192, device),
                ];
                (stages, 192)
            }
        };

        (Self { stages }, out_channels)
    }

    /// Freeze the first `n` stages so their parameters stop updating
    pub fn freeze_stages(mut self, n: usize) -> Self {
        self.stages = self
            .stages
            .into_iter()
            .enumerate()
            .map(|(i, stage)| if i < n { stage.no_grad() } else { stage })
            .collect();
        self
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = x;
        for stage in &self.stages {
            x = stage.forward(x);
        }
        x
    }
}

/// Classification head: dropout + dense stack over pooled features
#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    hidden: Vec<Linear<B>>,
    dropout: Dropout,
    output: Linear<B>,
}

impl<B: Backend> ClassifierHead<B> {
    fn new(
        in_features: usize,
        units: &[usize],
        num_classes: usize,
        dropout_rate: f64,
        device: &B::Device,
    ) -> Self {
        let mut hidden = Vec::with_capacity(units.len());
        let mut features = in_features;
        for &u in units {
            hidden.push(LinearConfig::new(features, u).init(device));
            features = u;
        }

        Self {
            hidden,
            dropout: DropoutConfig::new(dropout_rate).init(),
            output: LinearConfig::new(features, num_classes).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let relu = Relu::new();

        let mut x = x;
        for fc in &self.hidden {
            x = self.dropout.forward(x);
            x = relu.forward(fc.forward(x));
        }
        self.output.forward(x)
    }
}

/// Transfer-learning mask classifier
#[derive(Module, Debug)]
pub struct TransferNet<B: Backend> {
    backbone: Backbone<B>,
    global_pool: AdaptiveAvgPool2d,
    head: ClassifierHead<B>,
}

impl<B: Backend> TransferNet<B> {
    /// Build the backbone + head, load pretrained backbone weights if
    /// configured, and apply stage freezing
    pub fn new(config: &TransferConfig, num_classes: usize, device: &B::Device) -> Result<Self> {
        let (backbone, out_channels) = Backbone::new(config.backbone, device);

        let backbone = match &config.weights {
            Some(path) => backbone
                .load_file(path, &CompactRecorder::new(), device)
                .map_err(|e| {
                    MasknetError::Model(format!(
                        "Failed to load backbone weights from {:?}: {:?}",
                        path, e
                    ))
                })?,
            None => backbone,
        };

        let backbone = backbone.freeze_stages(config.freeze_stages);

        let head = ClassifierHead::new(
            out_channels,
            &config.head_units,
            num_classes,
            config.dropout_rate,
            device,
        );

        Ok(Self {
            backbone,
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            head,
        })
    }
}

impl<B: Backend> MaskClassifier<B> for TransferNet<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.backbone.forward(images);
        let x = self.global_pool.forward(x);

        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        self.head.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn test_vggface_output_shape() {
        let device = Default::default();
        let config = TransferConfig::vggface();
        let model = TransferNet::<TestBackend>::new(&config, 3, &device).unwrap();

        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 64, 64], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [1, 3]);
    }

    #[test]
    fn test_xception_output_shape() {
        let device = Default::default();
        let config = TransferConfig::xception();
        let model = TransferNet::<TestBackend>::new(&config, 3, &device).unwrap();

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 48, 48], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 3]);
    }

    #[test]
    fn test_densenet_output_shape() {
        let device = Default::default();
        let config = TransferConfig::densenet();
        let model = TransferNet::<TestBackend>::new(&config, 3, &device).unwrap();

        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 48, 48], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [1, 3]);
    }

    #[test]
    fn test_freeze_stages_bounds() {
        let mut config = TransferConfig::vggface();
        assert!(config.validate().is_ok());

        config.freeze_stages = 9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_weights_file() {
        let device = Default::default();
        let config = TransferConfig {
            weights: Some(PathBuf::from("/nonexistent/backbone")),
            ..TransferConfig::xception()
        };

        let result = TransferNet::<TestBackend>::new(&config, 3, &device);
        assert!(result.is_err());
    }
}
