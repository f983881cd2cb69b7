//! Model components: convolution/deconvolution blocks with selectable
//! normalization, the U-Net generator, and the patch discriminator.

pub mod discriminator;
pub mod generator;
pub mod layers;

use burn::prelude::*;

use discriminator::DiscriminatorConfig;
use generator::GeneratorConfig;
use layers::NormKind;

/// Channel-width configuration shared by both networks.
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// Channels of the images being synthesized (generator output).
    #[config(default = 3)]
    pub image_channels: usize,
    /// Channels of the conditioning input.
    #[config(default = 3)]
    pub cond_channels: usize,
    /// Base channel width of the generator (first encoder stage).
    #[config(default = 64)]
    pub ngf: usize,
    /// Base channel width of the discriminator (first stage).
    #[config(default = 64)]
    pub ndf: usize,
}

impl ModelConfig {
    /// Generator config for this model under the given normalization mode.
    pub fn generator(&self, norm: NormKind) -> GeneratorConfig {
        GeneratorConfig::new(norm)
            .with_in_channels(self.cond_channels)
            .with_out_channels(self.image_channels)
            .with_ngf(self.ngf)
    }

    /// Discriminator config for this model under the given normalization mode.
    pub fn discriminator(&self, norm: NormKind) -> DiscriminatorConfig {
        DiscriminatorConfig::new(norm)
            .with_in_channels(self.image_channels)
            .with_cond_channels(self.cond_channels)
            .with_ndf(self.ndf)
    }
}
