//! End-to-end tests: adversarial training over synthetic pairs, checkpoint
//! layout and resume, and generator-only inference.

use std::collections::HashSet;

use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use burn::module::{Module, ModuleVisitor, ParamId};
use burn::prelude::*;
use tempfile::TempDir;

use cgan::checkpoint::CheckpointManager;
use cgan::inference::Translator;
use cgan::model::generator::GeneratorConfig;
use cgan::model::layers::NormKind;
use cgan::model::ModelConfig;
use cgan::training::data::SyntheticPairs;
use cgan::training::trainer::{train, TrainingConfig};

type TestBackend = Autodiff<NdArray<f32>>;
type InnerBackend = NdArray<f32>;

fn small_config(root: &TempDir) -> TrainingConfig {
    TrainingConfig::new(ModelConfig::new().with_ngf(2).with_ndf(2))
        .with_epochs(1)
        .with_batch_size(4)
        .with_checkpoint_root(root.path().join("checkpoints").to_string_lossy().into_owned())
        .with_run_dir(root.path().join("runs").to_string_lossy().into_owned())
}

struct ParamCollector {
    ids: HashSet<String>,
}

impl<B: Backend> ModuleVisitor<B> for ParamCollector {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        self.ids.insert(format!("{id:?}"));
    }
}

#[test]
fn test_generator_and_discriminator_parameters_are_disjoint() {
    let device = Default::default();
    let model = ModelConfig::new().with_ngf(2).with_ndf(2);
    let generator = model.generator(NormKind::Batch).init::<InnerBackend>(&device);
    let discriminator = model.discriminator(NormKind::Batch).init::<InnerBackend>(&device);

    let mut gen_params = ParamCollector { ids: HashSet::new() };
    generator.visit(&mut gen_params);
    let mut disc_params = ParamCollector { ids: HashSet::new() };
    discriminator.visit(&mut disc_params);

    assert!(!gen_params.ids.is_empty());
    assert!(!disc_params.ids.is_empty());
    assert!(
        gen_params.ids.is_disjoint(&disc_params.ids),
        "an optimizer step on one network must never touch the other"
    );
}

#[test]
fn test_single_epoch_run_produces_both_artifacts() {
    let dir = TempDir::new().unwrap();
    let device = Default::default();
    let source = SyntheticPairs::new(8, 256, 256, 3, 3, 9);
    let config = small_config(&dir);

    let report = train::<TestBackend, _>(&config, &source, &device).unwrap();

    // 8 examples at batch size 4: two update steps per network.
    assert_eq!(report.epochs_run, 1);
    assert_eq!(report.d_updates, 2);
    assert_eq!(report.g_updates, 2);
    assert!(report.final_d_loss.unwrap().is_finite());
    assert!(report.final_g_loss.unwrap().is_finite());

    let base = dir.path().join("checkpoints").join("ConditionalGAN_L2");
    assert!(base.join("All/epoch_1/generator.mpk").exists());
    assert!(base.join("All/epoch_1/discriminator.mpk").exists());
    assert!(base.join("All/epoch_1/optim_gen.mpk").exists());
    assert!(base.join("All/epoch_1/optim_disc.mpk").exists());
    assert!(base.join("Generator/epoch_1/generator.mpk").exists());
    assert!(base.join("Generator/epoch_1/config.json").exists());

    let run_dir = dir.path().join("runs").join("ConditionalGAN_L2");
    let events = std::fs::read_to_string(run_dir.join("events.jsonl")).unwrap();
    assert_eq!(events.lines().count(), 1);
    assert!(events.contains("\"epoch\":1"));
    assert!(run_dir.join("samples_epoch_1.png").exists());

    // The Generator artifact alone is enough for inference.
    let translator = Translator::<InnerBackend>::load(
        &dir.path().join("checkpoints"),
        "ConditionalGAN_L2",
        &device,
    )
    .unwrap();
    assert_eq!(translator.epoch(), 1);
    let cond = Tensor::random(
        [2, 3, 256, 256],
        burn::tensor::Distribution::Uniform(-1.0, 1.0),
        &device,
    );
    let out = translator.translate(cond).unwrap();
    assert_eq!(out.dims(), [2, 3, 256, 256]);
    let max: f32 = out.clone().max().into_scalar().elem();
    let min: f32 = out.min().into_scalar().elem();
    assert!(max <= 1.0 && min >= -1.0);
}

#[test]
fn test_training_resumes_from_latest_all_snapshot() {
    let dir = TempDir::new().unwrap();
    let device = Default::default();
    let source = SyntheticPairs::new(4, 256, 256, 3, 3, 5);
    let config = small_config(&dir);

    let first = train::<TestBackend, _>(&config, &source, &device).unwrap();
    assert_eq!(first.epochs_run, 1);

    // Same trees, higher target: only the missing epoch runs.
    let resumed = train::<TestBackend, _>(&config.clone().with_epochs(2), &source, &device).unwrap();
    assert_eq!(resumed.epochs_run, 1);
    assert_eq!(resumed.d_updates, 1);
    assert_eq!(resumed.history.latest().unwrap().epoch, 2);

    let base = dir.path().join("checkpoints").join("ConditionalGAN_L2");
    assert!(base.join("All/epoch_2/meta.json").exists());
    let events =
        std::fs::read_to_string(dir.path().join("runs/ConditionalGAN_L2/events.jsonl")).unwrap();
    assert_eq!(events.lines().count(), 2);

    // Already at the target epoch: nothing runs and no loss is reported.
    let done = train::<TestBackend, _>(&config.clone().with_epochs(2), &source, &device).unwrap();
    assert_eq!(done.epochs_run, 0);
    assert_eq!(done.d_updates, 0);
    assert!(done.final_d_loss.is_none());
    assert!(done.final_g_loss.is_none());
}

#[test]
fn test_corrupt_pointer_aborts_instead_of_restarting() {
    let dir = TempDir::new().unwrap();
    let device = Default::default();
    let source = SyntheticPairs::new(4, 256, 256, 3, 3, 5);
    let config = small_config(&dir);

    let all = dir.path().join("checkpoints/ConditionalGAN_L2/All");
    std::fs::create_dir_all(&all).unwrap();
    std::fs::write(all.join("latest.json"), b"{ not json").unwrap();

    let err = train::<TestBackend, _>(&config, &source, &device)
        .unwrap_err()
        .to_string();
    assert!(err.contains("corrupt"), "unexpected error: {err}");
}

#[test]
fn test_generator_tree_rotation_and_round_trip() {
    let dir = TempDir::new().unwrap();
    let device = Default::default();
    let manager = CheckpointManager::new(dir.path(), "ConditionalGAN_L1");

    let gen_config = GeneratorConfig::new(NormKind::Batch).with_ngf(1);
    let generator = gen_config.init::<InnerBackend>(&device);
    for epoch in 1..=4 {
        manager.save_generator(epoch, &generator, &gen_config).unwrap();
    }

    let tree = dir.path().join("ConditionalGAN_L1/Generator");
    assert!(!tree.join("epoch_1").exists(), "oldest snapshot should rotate out");
    for epoch in 2..=4 {
        assert!(tree.join(format!("epoch_{epoch}")).exists());
    }

    let (epoch, restored) = manager.restore_generator::<InnerBackend>(&device).unwrap();
    assert_eq!(epoch, 4);
    let cond = Tensor::random(
        [1, 3, 256, 256],
        burn::tensor::Distribution::Uniform(-1.0, 1.0),
        &device,
    );
    let diff: f32 = (restored.forward(cond.clone()) - generator.forward(cond))
        .abs()
        .max()
        .into_scalar()
        .elem();
    assert_eq!(diff, 0.0, "restored weights must match the saved ones exactly");
}
