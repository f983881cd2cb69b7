//! Dataset collaborator boundary.
//!
//! The trainer only needs two things from a dataset: its size and mini-batches
//! of (image, condition) pairs at requested indices. Real ingestion lives
//! outside this crate; [`SyntheticPairs`] is the in-crate implementation used
//! by tests and dry runs.

use burn::prelude::*;
use burn::tensor::TensorData;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// One mini-batch of paired tensors, NCHW, values in [-1, 1].
#[derive(Debug)]
pub struct PairBatch<B: Backend> {
    /// Target images the generator should reproduce.
    pub images: Tensor<B, 4>,
    /// Conditioning inputs fed to the generator.
    pub conditions: Tensor<B, 4>,
}

/// Supplier of (image, condition) pairs.
pub trait PairedImageSource<B: Backend> {
    /// Total number of examples available.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Assemble a batch for the given example indices.
    fn batch(&self, indices: &[usize], device: &B::Device) -> anyhow::Result<PairBatch<B>>;
}

/// Deterministic synthetic pair source (seeded uniform noise in [-1, 1]).
pub struct SyntheticPairs {
    examples: Vec<(Vec<f32>, Vec<f32>)>,
    height: usize,
    width: usize,
    image_channels: usize,
    cond_channels: usize,
}

impl SyntheticPairs {
    pub fn new(
        count: usize,
        height: usize,
        width: usize,
        image_channels: usize,
        cond_channels: usize,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let examples = (0..count)
            .map(|_| {
                let image = (0..image_channels * height * width)
                    .map(|_| rng.gen_range(-1.0..1.0))
                    .collect();
                let cond = (0..cond_channels * height * width)
                    .map(|_| rng.gen_range(-1.0..1.0))
                    .collect();
                (image, cond)
            })
            .collect();
        Self {
            examples,
            height,
            width,
            image_channels,
            cond_channels,
        }
    }
}

impl<B: Backend> PairedImageSource<B> for SyntheticPairs {
    fn len(&self) -> usize {
        self.examples.len()
    }

    fn batch(&self, indices: &[usize], device: &B::Device) -> anyhow::Result<PairBatch<B>> {
        anyhow::ensure!(!indices.is_empty(), "requested an empty batch");
        let n = indices.len();
        let mut images = Vec::with_capacity(n * self.image_channels * self.height * self.width);
        let mut conditions = Vec::with_capacity(n * self.cond_channels * self.height * self.width);
        for &idx in indices {
            let (image, cond) = self
                .examples
                .get(idx)
                .ok_or_else(|| {
                    anyhow::anyhow!("example index {idx} out of range ({} examples)", self.examples.len())
                })?;
            images.extend_from_slice(image);
            conditions.extend_from_slice(cond);
        }
        Ok(PairBatch {
            images: Tensor::from_data(
                TensorData::new(images, [n, self.image_channels, self.height, self.width]),
                device,
            ),
            conditions: Tensor::from_data(
                TensorData::new(conditions, [n, self.cond_channels, self.height, self.width]),
                device,
            ),
        })
    }
}
