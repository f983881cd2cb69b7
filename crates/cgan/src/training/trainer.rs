//! Two-optimizer adversarial training loop.
//!
//! Each batch takes one discriminator step on detached generator output,
//! then one generator step through a fresh forward pass. Checkpoints are
//! written on a configurable epoch cadence into the dual artifact trees,
//! and training resumes from the latest "All" snapshot when one exists.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer, RmsPropConfig, SgdConfig};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::checkpoint::CheckpointManager;
use crate::model::discriminator::Discriminator;
use crate::model::generator::Generator;
use crate::model::layers::NormKind;
use crate::model::ModelConfig;
use crate::training::data::PairedImageSource;
use crate::training::loss::{discriminator_loss, generator_loss, DistanceLoss};
use crate::training::metrics::{EpochMetrics, EventLog, MetricsHistory};
use crate::viz;

/// Optimizer family used for both networks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OptimizerKind {
    Adam { beta1: f32, beta2: f32 },
    RmsProp { decay: f32, momentum: f32 },
    Sgd,
}

impl Default for OptimizerKind {
    fn default() -> Self {
        Self::Adam {
            beta1: 0.9,
            beta2: 0.999,
        }
    }
}

impl FromStr for OptimizerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Adam" | "adam" => Ok(Self::default()),
            "RMSP" | "rmsp" | "rmsprop" => Ok(Self::RmsProp {
                decay: 0.999,
                momentum: 0.9,
            }),
            "SGD" | "sgd" => Ok(Self::Sgd),
            other => anyhow::bail!(
                "unknown optimizer {other:?} (expected \"Adam\", \"RMSP\" or \"SGD\")"
            ),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adam { .. } => write!(f, "Adam"),
            Self::RmsProp { .. } => write!(f, "RMSP"),
            Self::Sgd => write!(f, "SGD"),
        }
    }
}

/// Full training-run configuration.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    pub model: ModelConfig,
    /// Pixel-distance term of the generator objective.
    #[config(default = "DistanceLoss::L2")]
    pub distance_loss: DistanceLoss,
    /// Weight of the distance term.
    #[config(default = 100.0)]
    pub distance_weight: f64,
    #[config(default = "OptimizerKind::default()")]
    pub optimizer: OptimizerKind,
    /// Learning rate shared by both optimizers.
    #[config(default = 2e-4)]
    pub learning_rate: f64,
    #[config(default = 100)]
    pub epochs: usize,
    #[config(default = 4)]
    pub batch_size: usize,
    /// Checkpoint (and event log) cadence, in epochs.
    #[config(default = 1)]
    pub checkpoint_every: usize,
    #[config(default = "String::from(\"checkpoints\")")]
    pub checkpoint_root: String,
    #[config(default = "String::from(\"runs\")")]
    pub run_dir: String,
    /// Seed for batch shuffling and the synthetic data paths.
    #[config(default = 42)]
    pub seed: u64,
}

impl TrainingConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.epochs >= 1, "epochs must be at least 1");
        anyhow::ensure!(self.batch_size >= 1, "batch_size must be at least 1");
        anyhow::ensure!(
            self.checkpoint_every >= 1,
            "checkpoint_every must be at least 1"
        );
        anyhow::ensure!(
            self.learning_rate.is_finite() && self.learning_rate > 0.0,
            "learning_rate must be positive, got {}",
            self.learning_rate
        );
        anyhow::ensure!(
            self.distance_weight.is_finite() && self.distance_weight >= 0.0,
            "distance_weight must be non-negative, got {}",
            self.distance_weight
        );
        Ok(())
    }

    /// Normalization mode derived from the batch size: a single-example
    /// batch gets instance norm, anything larger gets batch norm.
    pub fn norm_kind(&self) -> NormKind {
        NormKind::for_batch_size(self.batch_size)
    }

    /// Artifact-tree name derived from the generator objective.
    pub fn model_name(&self) -> String {
        match self.distance_loss {
            DistanceLoss::None => "ConditionalGAN".to_string(),
            DistanceLoss::L1 => "ConditionalGAN_L1".to_string(),
            DistanceLoss::L2 => "ConditionalGAN_L2".to_string(),
        }
    }
}

/// Summary of a completed training run. The final losses are `None` when no
/// epoch ran (a resumed run that was already at its target).
#[derive(Debug)]
pub struct TrainingReport {
    pub epochs_run: usize,
    pub d_updates: usize,
    pub g_updates: usize,
    pub final_d_loss: Option<f64>,
    pub final_g_loss: Option<f64>,
    pub history: MetricsHistory,
}

/// Run the adversarial loop over `source` with the configured optimizer.
pub fn train<B, D>(
    config: &TrainingConfig,
    source: &D,
    device: &B::Device,
) -> anyhow::Result<TrainingReport>
where
    B: AutodiffBackend,
    D: PairedImageSource<B> + ?Sized,
{
    config.validate()?;
    match config.optimizer {
        OptimizerKind::Adam { beta1, beta2 } => {
            let builder = AdamConfig::new().with_beta_1(beta1).with_beta_2(beta2);
            run_loop(
                config,
                source,
                device,
                builder.init::<B, Generator<B>>(),
                builder.init::<B, Discriminator<B>>(),
            )
        }
        OptimizerKind::RmsProp { decay, momentum } => {
            let builder = RmsPropConfig::new().with_alpha(decay).with_momentum(momentum);
            run_loop(
                config,
                source,
                device,
                builder.init::<B, Generator<B>>(),
                builder.init::<B, Discriminator<B>>(),
            )
        }
        OptimizerKind::Sgd => {
            let builder = SgdConfig::new();
            run_loop(
                config,
                source,
                device,
                builder.init::<B, Generator<B>>(),
                builder.init::<B, Discriminator<B>>(),
            )
        }
    }
}

fn run_loop<B, D, OG, OD>(
    config: &TrainingConfig,
    source: &D,
    device: &B::Device,
    mut optim_gen: OG,
    mut optim_disc: OD,
) -> anyhow::Result<TrainingReport>
where
    B: AutodiffBackend,
    D: PairedImageSource<B> + ?Sized,
    OG: Optimizer<Generator<B>, B> + Clone,
    OD: Optimizer<Discriminator<B>, B> + Clone,
{
    let norm = config.norm_kind();
    let gen_config = config.model.generator(norm);
    let mut generator = gen_config.init::<B>(device);
    let mut discriminator = config.model.discriminator(norm).init::<B>(device);

    let total_batches = source.len() / config.batch_size;
    anyhow::ensure!(
        total_batches >= 1,
        "dataset of {} examples yields no full batch of {}",
        source.len(),
        config.batch_size
    );

    let model_name = config.model_name();
    let checkpoints = CheckpointManager::new(Path::new(&config.checkpoint_root), &model_name);
    let start_epoch = checkpoints
        .restore_all(
            device,
            &mut generator,
            &mut discriminator,
            &mut optim_gen,
            &mut optim_disc,
        )?
        .map(|epoch| {
            info!(epoch, "resuming from checkpoint");
            epoch
        })
        .unwrap_or(0);

    let event_log = EventLog::create(Path::new(&config.run_dir), &model_name)?;
    let mut history = MetricsHistory::new();
    let mut d_updates = 0;
    let mut g_updates = 0;

    if start_epoch >= config.epochs {
        info!(
            start_epoch,
            target = config.epochs,
            "checkpoint already at target epoch, nothing to train"
        );
    } else {
        info!(
            model = %model_name,
            optimizer = %config.optimizer,
            norm = %norm,
            total_batches,
            "starting training"
        );
    }

    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(start_epoch as u64));
    let mut indices: Vec<usize> = (0..source.len()).collect();

    for epoch in (start_epoch + 1)..=config.epochs {
        indices.shuffle(&mut rng);
        let mut d_loss_epoch = 0.0;
        let mut g_loss_epoch = 0.0;

        let bar = ProgressBar::new(total_batches as u64).with_style(
            ProgressStyle::with_template(
                "epoch {msg} [{bar:30}] {pos}/{len} batches ({elapsed})",
            )?
            .progress_chars("=> "),
        );
        bar.set_message(format!("{epoch}/{}", config.epochs));

        for (batch_idx, chunk) in indices.chunks_exact(config.batch_size).enumerate() {
            let batch = source.batch(chunk, device)?;

            // Discriminator step on detached generator output.
            let fake = generator.forward(batch.conditions.clone()).detach();
            let d_real = discriminator.forward(batch.images.clone(), batch.conditions.clone());
            let d_fake = discriminator.forward(fake, batch.conditions.clone());
            let d_loss = discriminator_loss(d_real, d_fake) + discriminator.weight_penalty();
            let d_val: f64 = d_loss.clone().into_scalar().elem();
            anyhow::ensure!(
                d_val.is_finite(),
                "non-finite discriminator loss at epoch {epoch}, batch {batch_idx}"
            );
            let grads = GradientsParams::from_grads(d_loss.backward(), &discriminator);
            discriminator = optim_disc.step(config.learning_rate, discriminator, grads);
            d_updates += 1;

            // Generator step through a fresh forward pass.
            let fake = generator.forward(batch.conditions.clone());
            let d_fake = discriminator.forward(fake.clone(), batch.conditions);
            let g_loss = generator_loss(
                d_fake,
                config.distance_loss,
                fake,
                batch.images,
                config.distance_weight,
            ) + generator.weight_penalty();
            let g_val: f64 = g_loss.clone().into_scalar().elem();
            anyhow::ensure!(
                g_val.is_finite(),
                "non-finite generator loss at epoch {epoch}, batch {batch_idx}"
            );
            let grads = GradientsParams::from_grads(g_loss.backward(), &generator);
            generator = optim_gen.step(config.learning_rate, generator, grads);
            g_updates += 1;

            d_loss_epoch += d_val / total_batches as f64;
            g_loss_epoch += g_val / total_batches as f64;
            bar.inc(1);
        }
        bar.finish_and_clear();

        let metrics = EpochMetrics {
            epoch,
            d_loss: d_loss_epoch,
            g_loss: g_loss_epoch,
        };
        info!(
            epoch,
            d_loss = metrics.d_loss,
            g_loss = metrics.g_loss,
            "epoch complete"
        );
        history.push(metrics);

        if epoch % config.checkpoint_every == 0 {
            event_log.append(&metrics)?;
            checkpoints.save_all(epoch, &generator, &discriminator, &optim_gen, &optim_disc)?;
            checkpoints.save_generator(epoch, &generator, &gen_config)?;
            if let Err(e) = save_samples(config, source, device, &generator, epoch) {
                warn!(epoch, error = %e, "failed to save sample grid");
            }
        }
    }

    let final_d_loss = history.latest().map(|m| m.d_loss);
    let final_g_loss = history.latest().map(|m| m.g_loss);
    Ok(TrainingReport {
        epochs_run: config.epochs.saturating_sub(start_epoch),
        d_updates,
        g_updates,
        final_d_loss,
        final_g_loss,
        history,
    })
}

/// Render a small grid of translated probe examples next to the event log.
fn save_samples<B, D>(
    config: &TrainingConfig,
    source: &D,
    device: &B::Device,
    generator: &Generator<B>,
    epoch: usize,
) -> anyhow::Result<()>
where
    B: AutodiffBackend,
    D: PairedImageSource<B> + ?Sized,
{
    let probe: Vec<usize> = (0..config.batch_size.min(source.len())).collect();
    let batch = source.batch(&probe, device)?;
    let translated = generator.valid().forward(batch.conditions.inner());
    let path = Path::new(&config.run_dir)
        .join(config.model_name())
        .join(format!("samples_epoch_{epoch}.png"));
    viz::save_grid(translated, &path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimizer_kind_from_str() {
        assert_eq!(
            "Adam".parse::<OptimizerKind>().unwrap(),
            OptimizerKind::Adam {
                beta1: 0.9,
                beta2: 0.999
            }
        );
        assert_eq!(
            "RMSP".parse::<OptimizerKind>().unwrap(),
            OptimizerKind::RmsProp {
                decay: 0.999,
                momentum: 0.9
            }
        );
        assert_eq!("sgd".parse::<OptimizerKind>().unwrap(), OptimizerKind::Sgd);
        let err = "adagrad".parse::<OptimizerKind>().unwrap_err().to_string();
        assert!(err.contains("adagrad"), "error should name the selector: {err}");
    }

    #[test]
    fn test_model_name_tracks_distance_loss() {
        let config = TrainingConfig::new(ModelConfig::new());
        assert_eq!(config.model_name(), "ConditionalGAN_L2");
        assert_eq!(
            config
                .clone()
                .with_distance_loss(DistanceLoss::L1)
                .model_name(),
            "ConditionalGAN_L1"
        );
        assert_eq!(
            config
                .with_distance_loss(DistanceLoss::None)
                .model_name(),
            "ConditionalGAN"
        );
    }

    #[test]
    fn test_norm_kind_follows_batch_size() {
        let config = TrainingConfig::new(ModelConfig::new());
        assert_eq!(config.clone().with_batch_size(1).norm_kind(), NormKind::Instance);
        assert_eq!(config.with_batch_size(4).norm_kind(), NormKind::Batch);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = TrainingConfig::new(ModelConfig::new());
        assert!(config.clone().with_epochs(0).validate().is_err());
        assert!(config.clone().with_batch_size(0).validate().is_err());
        assert!(config.clone().with_learning_rate(-1.0).validate().is_err());
        assert!(config.clone().with_distance_weight(f64::NAN).validate().is_err());
        assert!(config.validate().is_ok());
    }
}
