//! TOML config loading for the translation CLI.
//!
//! Deserializes `configs/train.toml` with `[model]` and `[training]`
//! sections, then merges with CLI overrides.

use std::path::Path;

use cgan::model::ModelConfig;
use cgan::training::loss::DistanceLoss;
use cgan::training::trainer::{OptimizerKind, TrainingConfig};
use serde::Deserialize;

/// Top-level structure matching `configs/train.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct TrainToml {
    #[serde(default)]
    pub model: ModelOverrides,
    #[serde(default)]
    pub training: TrainOverrides,
}

/// Optional overrides for the network widths.
#[derive(Debug, Default, Deserialize)]
pub struct ModelOverrides {
    pub image_channels: Option<usize>,
    pub cond_channels: Option<usize>,
    pub ngf: Option<usize>,
    pub ndf: Option<usize>,
}

/// Optional overrides for the training run. Selector strings ("L1",
/// "Adam", ...) are parsed when the config is built; the optimizer
/// hyperparameters apply to whichever optimizer kind is selected
/// (beta1/beta2 for Adam, decay/momentum for RMSProp).
#[derive(Debug, Default, Deserialize)]
pub struct TrainOverrides {
    pub distance_loss: Option<String>,
    pub distance_weight: Option<f64>,
    pub optimizer: Option<String>,
    pub beta1: Option<f32>,
    pub beta2: Option<f32>,
    pub decay: Option<f32>,
    pub momentum: Option<f32>,
    pub learning_rate: Option<f64>,
    pub epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub checkpoint_every: Option<usize>,
    pub checkpoint_root: Option<String>,
    pub run_dir: Option<String>,
    pub seed: Option<u64>,
}

/// CLI flags that override both the defaults and the TOML file.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub distance_loss: Option<String>,
    pub distance_weight: Option<f64>,
    pub optimizer: Option<String>,
    pub beta1: Option<f32>,
    pub beta2: Option<f32>,
    pub decay: Option<f32>,
    pub momentum: Option<f32>,
    pub learning_rate: Option<f64>,
    pub epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub checkpoint_every: Option<usize>,
    pub checkpoint_root: Option<String>,
    pub run_dir: Option<String>,
    pub seed: Option<u64>,
}

/// Fill the selected optimizer's hyperparameters from override values.
/// Values for the other optimizer kind are ignored, matching how the
/// original training driver treats its unused hyperparameter knobs.
fn apply_optimizer_hyperparams(
    kind: &mut OptimizerKind,
    beta1: Option<f32>,
    beta2: Option<f32>,
    decay: Option<f32>,
    momentum: Option<f32>,
) {
    match kind {
        OptimizerKind::Adam { beta1: b1, beta2: b2 } => {
            if let Some(v) = beta1 {
                *b1 = v;
            }
            if let Some(v) = beta2 {
                *b2 = v;
            }
        }
        OptimizerKind::RmsProp { decay: d, momentum: m } => {
            if let Some(v) = decay {
                *d = v;
            }
            if let Some(v) = momentum {
                *m = v;
            }
        }
        OptimizerKind::Sgd => {}
    }
}

/// Load and deserialize a `TrainToml` from a TOML file. A missing file is
/// not an error; it means the built-in defaults apply.
pub fn load_train_toml(path: &Path) -> anyhow::Result<TrainToml> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "no config file, using defaults");
        return Ok(TrainToml::default());
    }
    let contents = std::fs::read_to_string(path)?;
    let config: TrainToml = toml::from_str(&contents)?;
    tracing::info!(path = %path.display(), "loaded training config");
    Ok(config)
}

/// Build a validated `TrainingConfig` from the defaults, TOML values and
/// CLI flags, in that priority order.
pub fn build_training_config(toml: &TrainToml, cli: &CliOverrides) -> anyhow::Result<TrainingConfig> {
    let mut model = ModelConfig::new();
    if let Some(n) = toml.model.image_channels {
        model.image_channels = n;
    }
    if let Some(n) = toml.model.cond_channels {
        model.cond_channels = n;
    }
    if let Some(n) = toml.model.ngf {
        model.ngf = n;
    }
    if let Some(n) = toml.model.ndf {
        model.ndf = n;
    }

    let mut config = TrainingConfig::new(model);

    // TOML overrides
    let t = &toml.training;
    if let Some(s) = &t.distance_loss {
        config.distance_loss = s.parse::<DistanceLoss>()?;
    }
    if let Some(w) = t.distance_weight {
        config.distance_weight = w;
    }
    if let Some(s) = &t.optimizer {
        config.optimizer = s.parse::<OptimizerKind>()?;
    }
    apply_optimizer_hyperparams(&mut config.optimizer, t.beta1, t.beta2, t.decay, t.momentum);
    if let Some(lr) = t.learning_rate {
        config.learning_rate = lr;
    }
    if let Some(n) = t.epochs {
        config.epochs = n;
    }
    if let Some(n) = t.batch_size {
        config.batch_size = n;
    }
    if let Some(n) = t.checkpoint_every {
        config.checkpoint_every = n;
    }
    if let Some(s) = &t.checkpoint_root {
        config.checkpoint_root = s.clone();
    }
    if let Some(s) = &t.run_dir {
        config.run_dir = s.clone();
    }
    if let Some(s) = t.seed {
        config.seed = s;
    }

    // CLI overrides take highest priority
    if let Some(s) = &cli.distance_loss {
        config.distance_loss = s.parse::<DistanceLoss>()?;
    }
    if let Some(w) = cli.distance_weight {
        config.distance_weight = w;
    }
    if let Some(s) = &cli.optimizer {
        config.optimizer = s.parse::<OptimizerKind>()?;
    }
    apply_optimizer_hyperparams(
        &mut config.optimizer,
        cli.beta1,
        cli.beta2,
        cli.decay,
        cli.momentum,
    );
    if let Some(lr) = cli.learning_rate {
        config.learning_rate = lr;
    }
    if let Some(n) = cli.epochs {
        config.epochs = n;
    }
    if let Some(n) = cli.batch_size {
        config.batch_size = n;
    }
    if let Some(n) = cli.checkpoint_every {
        config.checkpoint_every = n;
    }
    if let Some(s) = &cli.checkpoint_root {
        config.checkpoint_root = s.clone();
    }
    if let Some(s) = &cli.run_dir {
        config.run_dir = s.clone();
    }
    if let Some(s) = cli.seed {
        config.seed = s;
    }

    config.validate()?;
    Ok(config)
}
