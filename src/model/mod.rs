//! Model architectures for mask classification
//!
//! Three families are provided, selected by [`config::Architecture`]:
//! - [`sequential::SequentialNet`]: a straight stack of conv + max-pool blocks
//! - [`multi_tower::MultiTowerNet`]: parallel convolutional towers per depth
//!   level, concatenated before pooling
//! - [`backbone::TransferNet`]: a backbone feature extractor with a new
//!   classification head, optionally partially frozen

pub mod backbone;
pub mod config;
pub mod multi_tower;
pub mod sequential;

pub use backbone::{BackboneKind, TransferConfig, TransferNet};
pub use config::{Architecture, ModelConfig};
pub use multi_tower::{MultiTowerConfig, MultiTowerNet};
pub use sequential::{SequentialConfig, SequentialNet};

use burn::tensor::activation::softmax;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Common interface over the architecture families
///
/// `forward` returns raw logits; `forward_softmax` is used at inference time.
pub trait MaskClassifier<B: Backend> {
    /// Forward pass producing logits of shape [batch, num_classes]
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Forward pass with softmax for inference
    fn forward_softmax(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }
}

/// Padding amounts (before, after) so that a strided window op yields
/// `ceil(size / stride)` outputs, matching the framework-default "same"
/// behavior the architectures were designed with
pub(crate) fn same_pad_amounts(size: usize, kernel: usize, stride: usize) -> (usize, usize) {
    let out = size.div_ceil(stride);
    let total = ((out - 1) * stride + kernel).saturating_sub(size);
    let before = total / 2;
    (before, total - before)
}

/// Zero-pad the last two dimensions for a "same" window op
pub(crate) fn pad_same<B: Backend>(
    x: Tensor<B, 4>,
    kernel: [usize; 2],
    stride: [usize; 2],
) -> Tensor<B, 4> {
    let [_, _, h, w] = x.dims();
    let (top, bottom) = same_pad_amounts(h, kernel[0], stride[0]);
    let (left, right) = same_pad_amounts(w, kernel[1], stride[1]);

    if top + bottom + left + right == 0 {
        return x;
    }

    x.pad((left, right, top, bottom), 0.0)
}

/// Output size of a "same" window op
pub(crate) fn same_out(size: usize, stride: usize) -> usize {
    size.div_ceil(stride)
}

/// Output size of a "valid" (unpadded) window op
pub(crate) fn valid_out(size: usize, kernel: usize, stride: usize) -> usize {
    (size - kernel) / stride + 1
}
