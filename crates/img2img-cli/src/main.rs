mod config;

use std::path::PathBuf;

use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use burn::prelude::*;
use burn::tensor::TensorData;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cgan::inference::Translator;
use cgan::training::data::SyntheticPairs;
use cgan::training::trainer;
use cgan::viz;

use config::CliOverrides;

type InferBackend = NdArray<f32>;
type TrainBackend = Autodiff<InferBackend>;

/// img2img: conditional image-to-image translation with a U-Net generator
/// and a patch discriminator.
#[derive(Parser)]
#[command(name = "img2img", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run adversarial training, checkpointing on an epoch cadence.
    Train {
        /// Path to training config TOML file.
        #[arg(long, default_value = "configs/train.toml")]
        config: PathBuf,
        /// Number of synthetic training pairs to generate.
        #[arg(long, default_value_t = 64)]
        examples: usize,
        /// Side length of the synthetic pairs (must be a multiple of 256).
        #[arg(long, default_value_t = 256)]
        image_size: usize,
        /// Override the number of epochs.
        #[arg(long)]
        epochs: Option<usize>,
        /// Override the batch size.
        #[arg(long)]
        batch_size: Option<usize>,
        /// Override the learning rate.
        #[arg(long)]
        learning_rate: Option<f64>,
        /// Override the distance loss ("none", "L1" or "L2").
        #[arg(long)]
        distance_loss: Option<String>,
        /// Override the weight of the distance term.
        #[arg(long)]
        distance_weight: Option<f64>,
        /// Override the optimizer ("Adam", "RMSP" or "SGD").
        #[arg(long)]
        optimizer: Option<String>,
        /// Override Adam's first-moment coefficient.
        #[arg(long)]
        beta1: Option<f32>,
        /// Override Adam's second-moment coefficient.
        #[arg(long)]
        beta2: Option<f32>,
        /// Override RMSProp's decay coefficient.
        #[arg(long)]
        decay: Option<f32>,
        /// Override RMSProp's momentum.
        #[arg(long)]
        momentum: Option<f32>,
        /// Override the checkpoint cadence, in epochs.
        #[arg(long)]
        checkpoint_every: Option<usize>,
        /// Override the checkpoint root directory.
        #[arg(long)]
        checkpoint_root: Option<String>,
        /// Override the run (event log, samples) directory.
        #[arg(long)]
        run_dir: Option<String>,
        /// Override the shuffle seed.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Translate an image with the latest trained generator.
    Infer {
        /// Checkpoint root directory the generator was trained into.
        #[arg(long, default_value = "checkpoints")]
        checkpoint_root: PathBuf,
        /// Artifact-tree name of the trained model.
        #[arg(long, default_value = "ConditionalGAN_L2")]
        model_name: String,
        /// Conditioning image to translate (spatial dims must be multiples of 256).
        #[arg(long)]
        input: PathBuf,
        /// Path for the translated PNG.
        #[arg(long)]
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Train {
            config,
            examples,
            image_size,
            epochs,
            batch_size,
            learning_rate,
            distance_loss,
            distance_weight,
            optimizer,
            beta1,
            beta2,
            decay,
            momentum,
            checkpoint_every,
            checkpoint_root,
            run_dir,
            seed,
        } => run_train(
            config,
            examples,
            image_size,
            CliOverrides {
                distance_loss,
                distance_weight,
                optimizer,
                beta1,
                beta2,
                decay,
                momentum,
                learning_rate,
                epochs,
                batch_size,
                checkpoint_every,
                checkpoint_root,
                run_dir,
                seed,
            },
        ),
        Command::Infer {
            checkpoint_root,
            model_name,
            input,
            output,
        } => run_infer(checkpoint_root, model_name, input, output),
    }
}

fn run_train(
    config_path: PathBuf,
    examples: usize,
    image_size: usize,
    overrides: CliOverrides,
) -> anyhow::Result<()> {
    anyhow::ensure!(
        image_size > 0 && image_size % 256 == 0,
        "image size must be a positive multiple of 256, got {image_size}"
    );
    let toml = config::load_train_toml(&config_path)?;
    let config = config::build_training_config(&toml, &overrides)?;

    let source = SyntheticPairs::new(
        examples,
        image_size,
        image_size,
        config.model.image_channels,
        config.model.cond_channels,
        config.seed,
    );

    let device = Default::default();
    let report = trainer::train::<TrainBackend, _>(&config, &source, &device)?;
    info!(
        epochs = report.epochs_run,
        d_loss = ?report.final_d_loss,
        g_loss = ?report.final_g_loss,
        "training finished"
    );
    Ok(())
}

fn run_infer(
    checkpoint_root: PathBuf,
    model_name: String,
    input: PathBuf,
    output: PathBuf,
) -> anyhow::Result<()> {
    let device = Default::default();
    let translator = Translator::<InferBackend>::load(&checkpoint_root, &model_name, &device)?;
    let cond = load_condition(&input, &device)?;
    let translated = translator.translate(cond)?;
    viz::save_grid(translated, &output)?;
    info!(output = %output.display(), "wrote translated image");
    Ok(())
}

/// Read an RGB image into a (1, 3, height, width) tensor in [-1, 1].
fn load_condition(
    path: &std::path::Path,
    device: &<InferBackend as Backend>::Device,
) -> anyhow::Result<Tensor<InferBackend, 4>> {
    let img = image::open(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?
        .to_rgb8();
    let (width, height) = img.dimensions();
    let (width, height) = (width as usize, height as usize);

    let plane = width * height;
    let mut values = vec![0.0f32; 3 * plane];
    for (x, y, pixel) in img.enumerate_pixels() {
        let offset = y as usize * width + x as usize;
        for c in 0..3 {
            values[c * plane + offset] = f32::from(pixel[c]) / 127.5 - 1.0;
        }
    }
    Ok(Tensor::from_data(
        TensorData::new(values, [1, 3, height, width]),
        device,
    ))
}
