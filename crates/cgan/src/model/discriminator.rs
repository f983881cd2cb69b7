//! Patch-level discriminator (PatchGAN): judges (image, condition) pairs as
//! a spatial map of per-patch realism scores.
//!
//! The stride/padding sequence reproduces a specific receptive-field size and
//! must not be altered: three stride-2 SAME stages, a manual 1px zero pad,
//! a stride-1 VALID stage, another 1px pad, then a stride-1 VALID output
//! convolution. For a 256x256 pair the score map is 30x30x1.

use burn::nn::{LeakyRelu, LeakyReluConfig, PaddingConfig2d, Sigmoid};
use burn::prelude::*;

use crate::model::layers::{ConvBlock, NormKind};

#[derive(Config, Debug)]
pub struct DiscriminatorConfig {
    /// Channels of the judged image.
    #[config(default = 3)]
    pub in_channels: usize,
    /// Channels of the conditioning input.
    #[config(default = 3)]
    pub cond_channels: usize,
    /// Base channel width (first stage).
    #[config(default = 64)]
    pub ndf: usize,
    /// Normalization applied to stages 2-4. Stage 1 and the output
    /// convolution are never normalized.
    pub norm: NormKind,
}

#[derive(Module, Debug)]
pub struct Discriminator<B: Backend> {
    conv1: ConvBlock<B>,
    conv2: ConvBlock<B>,
    conv3: ConvBlock<B>,
    conv4: ConvBlock<B>,
    out: ConvBlock<B>,
    lrelu: LeakyRelu,
    sigmoid: Sigmoid,
}

impl DiscriminatorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Discriminator<B> {
        let c = self.ndf;
        let same = || PaddingConfig2d::Explicit(1, 1);
        Discriminator {
            conv1: ConvBlock::new(
                [self.in_channels + self.cond_channels, c],
                [2, 2],
                same(),
                NormKind::None,
                device,
            ),
            conv2: ConvBlock::new([c, 2 * c], [2, 2], same(), self.norm, device),
            conv3: ConvBlock::new([2 * c, 4 * c], [2, 2], same(), self.norm, device),
            conv4: ConvBlock::new(
                [4 * c, 8 * c],
                [1, 1],
                PaddingConfig2d::Valid,
                self.norm,
                device,
            ),
            out: ConvBlock::new([8 * c, 1], [1, 1], PaddingConfig2d::Valid, NormKind::None, device),
            lrelu: LeakyReluConfig::new().with_negative_slope(0.2).init(),
            sigmoid: Sigmoid::new(),
        }
    }
}

impl<B: Backend> Discriminator<B> {
    /// Score an (image, condition) pair: one sigmoid realism score per patch.
    pub fn forward(&self, image: Tensor<B, 4>, cond: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = Tensor::cat(vec![image, cond], 1);
        let x = self.lrelu.forward(self.conv1.forward(x));
        let x = self.lrelu.forward(self.conv2.forward(x));
        // 1px zero pad before the activation, then again after the VALID
        // stage: this is what lands a 256x256 pair on a 30x30 map.
        let x = self.lrelu.forward(self.conv3.forward(x).pad((1, 1, 1, 1), 0.0));
        let x = self.lrelu.forward(self.conv4.forward(x).pad((1, 1, 1, 1), 0.0));
        self.sigmoid.forward(self.out.forward(x))
    }

    /// Sum of the L2 decay penalties of the unnormalized blocks.
    pub fn weight_penalty(&self) -> Tensor<B, 1> {
        let device = self.conv1.device();
        [
            self.conv1.weight_penalty(),
            self.conv2.weight_penalty(),
            self.conv3.weight_penalty(),
            self.conv4.weight_penalty(),
            self.out.weight_penalty(),
        ]
        .into_iter()
        .flatten()
        .fold(Tensor::zeros([1], &device), |acc, p| acc + p)
    }
}
