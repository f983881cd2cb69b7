//! Inference over a trained generator, loaded from the generator-only
//! artifact tree. The discriminator never enters the picture here.

use std::path::Path;

use burn::prelude::*;
use tracing::info;

use crate::checkpoint::CheckpointManager;
use crate::model::generator::Generator;

/// A trained generator ready to translate conditioning batches.
pub struct Translator<B: Backend> {
    generator: Generator<B>,
    epoch: usize,
}

impl<B: Backend> Translator<B> {
    /// Load the latest "Generator" snapshot of `model_name` under
    /// `checkpoint_root`. Fails when no snapshot exists.
    pub fn load(
        checkpoint_root: &Path,
        model_name: &str,
        device: &B::Device,
    ) -> anyhow::Result<Self> {
        let manager = CheckpointManager::new(checkpoint_root, model_name);
        let (epoch, generator) = manager.restore_generator::<B>(device)?;
        info!(model = %model_name, epoch, "loaded generator for inference");
        Ok(Self { generator, epoch })
    }

    /// Epoch the loaded snapshot was written at.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Translate a conditioning batch (batch, channels, height, width) into
    /// images in [-1, 1]. Spatial dims must be multiples of 256.
    pub fn translate(&self, cond: Tensor<B, 4>) -> anyhow::Result<Tensor<B, 4>> {
        let [_, _, height, width] = cond.dims();
        anyhow::ensure!(
            height % 256 == 0 && width % 256 == 0,
            "conditioning input must have spatial dims divisible by 256, got {height}x{width}"
        );
        Ok(self.generator.forward(cond))
    }
}
