//! U-Net generator: 8-stage strided-convolution encoder mirrored by an
//! 8-stage transposed-convolution decoder with channel-wise skip connections.
//!
//! ```text
//! cond (batch, in, H, W)
//!   encoder: ngf, 2ngf, 4ngf, 8ngf, 8ngf, 8ngf, 8ngf, 8ngf   (each stage halves H, W)
//!   decoder mirrors the encoder, concatenating each stage's output with the
//!   pre-activation output of its symmetric encoder stage
//!   -> tanh, (batch, out, H, W) in [-1, 1]
//! ```
//!
//! Encoder activations are leaky ReLU (slope 0.2), decoder activations are
//! ReLU, the output is tanh. The first encoder stage, the bottleneck, and the
//! final decoder stage are unnormalized; decoder stages 1-3 apply dropout 0.5
//! after the deconv, before concatenation.

use burn::nn::{Dropout, DropoutConfig, LeakyRelu, LeakyReluConfig, PaddingConfig2d, Relu, Tanh};
use burn::prelude::*;

use crate::model::layers::{ConvBlock, DeconvBlock, NormKind};

#[derive(Config, Debug)]
pub struct GeneratorConfig {
    /// Conditioning input channels.
    #[config(default = 3)]
    pub in_channels: usize,
    /// Synthesized image channels.
    #[config(default = 3)]
    pub out_channels: usize,
    /// Base channel width (first encoder stage).
    #[config(default = 64)]
    pub ngf: usize,
    /// Normalization applied to the inner stages.
    pub norm: NormKind,
}

#[derive(Module, Debug)]
pub struct Generator<B: Backend> {
    enc1: ConvBlock<B>,
    enc2: ConvBlock<B>,
    enc3: ConvBlock<B>,
    enc4: ConvBlock<B>,
    enc5: ConvBlock<B>,
    enc6: ConvBlock<B>,
    enc7: ConvBlock<B>,
    enc8: ConvBlock<B>,
    dec1: DeconvBlock<B>,
    dec2: DeconvBlock<B>,
    dec3: DeconvBlock<B>,
    dec4: DeconvBlock<B>,
    dec5: DeconvBlock<B>,
    dec6: DeconvBlock<B>,
    dec7: DeconvBlock<B>,
    dec8: DeconvBlock<B>,
    dropout: Dropout,
    lrelu: LeakyRelu,
    relu: Relu,
    tanh: Tanh,
}

impl GeneratorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Generator<B> {
        let c = self.ngf;
        let norm = self.norm;
        let enc = |cin, cout, n: NormKind| {
            ConvBlock::new([cin, cout], [2, 2], PaddingConfig2d::Explicit(1, 1), n, device)
        };
        Generator {
            enc1: enc(self.in_channels, c, NormKind::None),
            enc2: enc(c, 2 * c, norm),
            enc3: enc(2 * c, 4 * c, norm),
            enc4: enc(4 * c, 8 * c, norm),
            enc5: enc(8 * c, 8 * c, norm),
            enc6: enc(8 * c, 8 * c, norm),
            enc7: enc(8 * c, 8 * c, norm),
            enc8: enc(8 * c, 8 * c, NormKind::None),
            dec1: DeconvBlock::new([8 * c, 8 * c], norm, device),
            dec2: DeconvBlock::new([16 * c, 8 * c], norm, device),
            dec3: DeconvBlock::new([16 * c, 8 * c], norm, device),
            dec4: DeconvBlock::new([16 * c, 8 * c], norm, device),
            dec5: DeconvBlock::new([16 * c, 4 * c], norm, device),
            dec6: DeconvBlock::new([8 * c, 2 * c], norm, device),
            dec7: DeconvBlock::new([4 * c, c], norm, device),
            dec8: DeconvBlock::new([2 * c, self.out_channels], NormKind::None, device),
            dropout: DropoutConfig::new(0.5).init(),
            lrelu: LeakyReluConfig::new().with_negative_slope(0.2).init(),
            relu: Relu::new(),
            tanh: Tanh::new(),
        }
    }
}

impl<B: Backend> Generator<B> {
    /// Translate a conditioning batch into images in [-1, 1].
    ///
    /// Input spatial dims must be divisible by 256 (eight stride-2 stages).
    pub fn forward(&self, cond: Tensor<B, 4>) -> Tensor<B, 4> {
        let e1 = self.enc1.forward(cond);
        let e2 = self.enc2.forward(self.lrelu.forward(e1.clone()));
        let e3 = self.enc3.forward(self.lrelu.forward(e2.clone()));
        let e4 = self.enc4.forward(self.lrelu.forward(e3.clone()));
        let e5 = self.enc5.forward(self.lrelu.forward(e4.clone()));
        let e6 = self.enc6.forward(self.lrelu.forward(e5.clone()));
        let e7 = self.enc7.forward(self.lrelu.forward(e6.clone()));
        let e8 = self.enc8.forward(self.lrelu.forward(e7.clone()));

        let d = self.dec1.forward(self.relu.forward(e8));
        let d = cat_skip(self.dropout.forward(d), e7);
        let d = self.dec2.forward(self.relu.forward(d));
        let d = cat_skip(self.dropout.forward(d), e6);
        let d = self.dec3.forward(self.relu.forward(d));
        let d = cat_skip(self.dropout.forward(d), e5);
        let d = self.dec4.forward(self.relu.forward(d));
        let d = cat_skip(d, e4);
        let d = self.dec5.forward(self.relu.forward(d));
        let d = cat_skip(d, e3);
        let d = self.dec6.forward(self.relu.forward(d));
        let d = cat_skip(d, e2);
        let d = self.dec7.forward(self.relu.forward(d));
        let d = cat_skip(d, e1);
        let out = self.dec8.forward(self.relu.forward(d));
        self.tanh.forward(out)
    }

    /// Sum of the L2 decay penalties of the unnormalized blocks.
    pub fn weight_penalty(&self) -> Tensor<B, 1> {
        let device = self.enc1.device();
        let conv_penalties = [
            self.enc1.weight_penalty(),
            self.enc2.weight_penalty(),
            self.enc3.weight_penalty(),
            self.enc4.weight_penalty(),
            self.enc5.weight_penalty(),
            self.enc6.weight_penalty(),
            self.enc7.weight_penalty(),
            self.enc8.weight_penalty(),
        ];
        let deconv_penalties = [
            self.dec1.weight_penalty(),
            self.dec2.weight_penalty(),
            self.dec3.weight_penalty(),
            self.dec4.weight_penalty(),
            self.dec5.weight_penalty(),
            self.dec6.weight_penalty(),
            self.dec7.weight_penalty(),
            self.dec8.weight_penalty(),
        ];
        conv_penalties
            .into_iter()
            .chain(deconv_penalties)
            .flatten()
            .fold(Tensor::zeros([1], &device), |acc, p| acc + p)
    }
}

/// Channel-wise skip concatenation. A spatial mismatch between a decoder
/// stage and its paired encoder stage is a programming error.
fn cat_skip<B: Backend>(decoded: Tensor<B, 4>, skip: Tensor<B, 4>) -> Tensor<B, 4> {
    let d = decoded.dims();
    let s = skip.dims();
    assert!(
        d[0] == s[0] && d[2] == s[2] && d[3] == s[3],
        "skip connection shape mismatch: decoder stage {d:?} vs encoder stage {s:?}"
    );
    Tensor::cat(vec![decoded, skip], 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    fn small_generator(device: &<TestBackend as Backend>::Device) -> Generator<TestBackend> {
        GeneratorConfig::new(NormKind::Batch)
            .with_ngf(2)
            .init(device)
    }

    #[test]
    fn test_encoder_halves_each_stage() {
        let device = Default::default();
        let g = small_generator(&device);
        let x = Tensor::random([2, 3, 256, 256], Distribution::Normal(0.0, 1.0), &device);
        let e1 = g.enc1.forward(x);
        assert_eq!(e1.dims(), [2, 2, 128, 128]);
        let e2 = g.enc2.forward(g.lrelu.forward(e1));
        assert_eq!(e2.dims(), [2, 4, 64, 64]);
        let e3 = g.enc3.forward(g.lrelu.forward(e2));
        assert_eq!(e3.dims(), [2, 8, 32, 32]);
    }

    #[test]
    fn test_forward_preserves_spatial_dims_and_output_channels() {
        let device = Default::default();
        let g = small_generator(&device);
        let cond = Tensor::random([2, 3, 256, 256], Distribution::Normal(0.0, 1.0), &device);
        let out = g.forward(cond);
        assert_eq!(out.dims(), [2, 3, 256, 256]);
    }

    #[test]
    fn test_output_is_tanh_bounded() {
        let device = Default::default();
        let g = small_generator(&device);
        let cond = Tensor::random([1, 3, 256, 256], Distribution::Normal(0.0, 3.0), &device);
        let out = g.forward(cond);
        let max: f32 = out.clone().max().into_scalar().elem();
        let min: f32 = out.min().into_scalar().elem();
        assert!(max <= 1.0 && min >= -1.0, "tanh output out of range: [{min}, {max}]");
    }

    #[test]
    fn test_instance_norm_single_sample() {
        let device = Default::default();
        let g = GeneratorConfig::new(NormKind::Instance)
            .with_ngf(2)
            .init::<TestBackend>(&device);
        let cond = Tensor::random([1, 3, 256, 256], Distribution::Normal(0.0, 1.0), &device);
        assert_eq!(g.forward(cond).dims(), [1, 3, 256, 256]);
    }

    #[test]
    fn test_weight_penalty_positive_for_edge_stages() {
        let device = Default::default();
        let g = small_generator(&device);
        // enc1, enc8 and dec8 are unnormalized, so the aggregate is non-zero
        // even under batch norm.
        let penalty: f64 = g.weight_penalty().into_scalar().elem();
        assert!(penalty > 0.0, "expected positive penalty, got {penalty}");
    }
}
