//! Convolution and transposed-convolution blocks with a per-layer
//! normalization selector.
//!
//! Both block kinds bundle the operator with its (optional) normalization so
//! the owning network decides the policy per stage. The initializer split is
//! deliberate and must stay as-is: forward convolutions use a small-stddev
//! normal, transposed convolutions use Xavier.

use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::{
    BatchNorm, BatchNormConfig, Initializer, InstanceNorm, InstanceNormConfig, PaddingConfig2d,
};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

/// L2 penalty coefficient attached to unnormalized weights.
pub const WEIGHT_DECAY: f64 = 1e-5;

/// Per-layer normalization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormKind {
    /// No normalization; the weight carries an L2 decay penalty instead.
    None,
    /// Batch normalization (training-mode statistics during training).
    Batch,
    /// Per-instance normalization.
    Instance,
}

impl NormKind {
    /// Normalization mode derived from the batch size: a single-sample batch
    /// has no batch statistics worth tracking, so it normalizes per instance.
    pub fn for_batch_size(batch_size: usize) -> Self {
        if batch_size == 1 {
            Self::Instance
        } else {
            Self::Batch
        }
    }
}

impl std::fmt::Display for NormKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Batch => write!(f, "batch"),
            Self::Instance => write!(f, "instance"),
        }
    }
}

/// Normalization applied after a convolution, selected by [`NormKind`].
#[derive(Module, Debug)]
pub struct Norm2d<B: Backend> {
    batch: Option<BatchNorm<B, 2>>,
    instance: Option<InstanceNorm<B>>,
}

impl<B: Backend> Norm2d<B> {
    fn new(kind: NormKind, channels: usize, device: &B::Device) -> Self {
        match kind {
            NormKind::None => Self {
                batch: None,
                instance: None,
            },
            NormKind::Batch => Self {
                batch: Some(BatchNormConfig::new(channels).init(device)),
                instance: None,
            },
            NormKind::Instance => Self {
                batch: None,
                instance: Some(InstanceNormConfig::new(channels).init(device)),
            },
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match (&self.batch, &self.instance) {
            (Some(bn), _) => bn.forward(x),
            (_, Some(inorm)) => inorm.forward(x),
            _ => x,
        }
    }
}

/// 4x4 convolution followed by the selected normalization.
///
/// Output is pre-activation; the owning network applies its own activation
/// (the U-Net skip connections need the pre-activation tensor).
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    norm: Norm2d<B>,
    decay: bool,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(
        channels: [usize; 2],
        stride: [usize; 2],
        padding: PaddingConfig2d,
        norm: NormKind,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new(channels, [4, 4])
            .with_stride(stride)
            .with_padding(padding)
            .with_initializer(Initializer::Normal {
                mean: 0.0,
                std: 0.02,
            })
            .init(device);
        Self {
            conv,
            norm: Norm2d::new(norm, channels[1], device),
            decay: norm == NormKind::None,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.norm.forward(self.conv.forward(x))
    }

    /// L2 decay term for the weight, present only when the block is
    /// unnormalized. Aggregated into the owning network's loss.
    pub fn weight_penalty(&self) -> Option<Tensor<B, 1>> {
        self.decay
            .then(|| self.conv.weight.val().powf_scalar(2.0).sum() * WEIGHT_DECAY)
    }

    pub fn device(&self) -> B::Device {
        self.conv.weight.val().device()
    }
}

/// 4x4 stride-2 transposed convolution (exact spatial doubling) followed by
/// the selected normalization. Xavier-initialized, unlike [`ConvBlock`].
#[derive(Module, Debug)]
pub struct DeconvBlock<B: Backend> {
    conv: ConvTranspose2d<B>,
    norm: Norm2d<B>,
    decay: bool,
}

impl<B: Backend> DeconvBlock<B> {
    pub fn new(channels: [usize; 2], norm: NormKind, device: &B::Device) -> Self {
        let conv = ConvTranspose2dConfig::new(channels, [4, 4])
            .with_stride([2, 2])
            .with_padding([1, 1])
            .with_initializer(Initializer::XavierNormal { gain: 1.0 })
            .init(device);
        Self {
            conv,
            norm: Norm2d::new(norm, channels[1], device),
            decay: norm == NormKind::None,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.norm.forward(self.conv.forward(x))
    }

    pub fn weight_penalty(&self) -> Option<Tensor<B, 1>> {
        self.decay
            .then(|| self.conv.weight.val().powf_scalar(2.0).sum() * WEIGHT_DECAY)
    }
}
