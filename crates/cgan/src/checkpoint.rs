//! Dual-artifact checkpoint persistence.
//!
//! Two independent trees live under `<root>/<model_name>/`:
//!
//! - `All/epoch_<N>/` — generator, discriminator, both optimizer records and
//!   metadata; restoring it resumes training in full, discriminator included.
//! - `Generator/epoch_<N>/` — generator weights plus its config; enough to
//!   deploy inference without ever constructing a discriminator.
//!
//! Each tree carries a `latest.json` pointer and keeps the three most recent
//! snapshots; older epochs are removed on commit. A pointer that names an
//! unreadable snapshot is a fatal startup error, never a silent fresh start.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use burn::module::Module;
use burn::optim::Optimizer;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use crate::model::discriminator::Discriminator;
use crate::model::generator::{Generator, GeneratorConfig};

/// Snapshots retained per artifact tree.
pub const KEEP_SNAPSHOTS: usize = 3;

#[derive(Debug, Serialize, Deserialize)]
struct LatestPointer {
    epoch: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotMeta {
    epoch: usize,
    model_name: String,
}

/// One rotated snapshot directory tree (`epoch_<N>/` dirs + `latest.json`).
struct CheckpointTree {
    root: PathBuf,
}

impl CheckpointTree {
    fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn epoch_dir(&self, epoch: usize) -> PathBuf {
        self.root.join(format!("epoch_{epoch}"))
    }

    /// Probe the latest pointer. `None` means the tree has never been
    /// written; a present but unreadable pointer is an error.
    fn latest_epoch(&self) -> anyhow::Result<Option<usize>> {
        let path = self.root.join("latest.json");
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(&path)
            .with_context(|| format!("failed to open checkpoint pointer {}", path.display()))?;
        let pointer: LatestPointer = serde_json::from_reader(file)
            .with_context(|| format!("corrupt checkpoint pointer {}", path.display()))?;
        Ok(Some(pointer.epoch))
    }

    /// Update the latest pointer and drop snapshots beyond the retained
    /// window.
    fn commit(&self, epoch: usize) -> anyhow::Result<()> {
        let path = self.root.join("latest.json");
        serde_json::to_writer(
            File::create(&path)
                .with_context(|| format!("failed to write {}", path.display()))?,
            &LatestPointer { epoch },
        )?;
        self.rotate()
    }

    fn rotate(&self) -> anyhow::Result<()> {
        let mut epochs: Vec<usize> = std::fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.strip_prefix("epoch_"))
                    .and_then(|suffix| suffix.parse().ok())
            })
            .collect();
        epochs.sort_unstable();
        for &old in epochs.iter().rev().skip(KEEP_SNAPSHOTS) {
            let dir = self.epoch_dir(old);
            std::fs::remove_dir_all(&dir)
                .with_context(|| format!("failed to rotate out {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Manager for the two artifact trees of one model.
pub struct CheckpointManager {
    all: CheckpointTree,
    generator: CheckpointTree,
    model_name: String,
}

impl CheckpointManager {
    pub fn new(root: &Path, model_name: &str) -> Self {
        let base = root.join(model_name);
        Self {
            all: CheckpointTree::new(base.join("All")),
            generator: CheckpointTree::new(base.join("Generator")),
            model_name: model_name.to_string(),
        }
    }

    fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
        NamedMpkFileRecorder::<FullPrecisionSettings>::new()
    }

    /// Persist the full training state: both networks and both optimizers.
    pub fn save_all<B, OG, OD>(
        &self,
        epoch: usize,
        generator: &Generator<B>,
        discriminator: &Discriminator<B>,
        optim_gen: &OG,
        optim_disc: &OD,
    ) -> anyhow::Result<()>
    where
        B: AutodiffBackend,
        OG: Optimizer<Generator<B>, B>,
        OD: Optimizer<Discriminator<B>, B>,
    {
        let dir = self.all.epoch_dir(epoch);
        std::fs::create_dir_all(&dir)?;
        let recorder = Self::recorder();
        generator
            .clone()
            .save_file(dir.join("generator"), &recorder)
            .map_err(|e| anyhow::anyhow!("failed to save generator at epoch {epoch}: {e}"))?;
        discriminator
            .clone()
            .save_file(dir.join("discriminator"), &recorder)
            .map_err(|e| anyhow::anyhow!("failed to save discriminator at epoch {epoch}: {e}"))?;
        recorder
            .record(optim_gen.to_record(), dir.join("optim_gen"))
            .map_err(|e| anyhow::anyhow!("failed to save generator optimizer: {e}"))?;
        recorder
            .record(optim_disc.to_record(), dir.join("optim_disc"))
            .map_err(|e| anyhow::anyhow!("failed to save discriminator optimizer: {e}"))?;
        serde_json::to_writer(
            File::create(dir.join("meta.json"))?,
            &SnapshotMeta {
                epoch,
                model_name: self.model_name.clone(),
            },
        )?;
        self.all.commit(epoch)
    }

    /// Persist the generator-only artifact, with the config needed to
    /// rebuild it for inference.
    pub fn save_generator<B: Backend>(
        &self,
        epoch: usize,
        generator: &Generator<B>,
        config: &GeneratorConfig,
    ) -> anyhow::Result<()> {
        let dir = self.generator.epoch_dir(epoch);
        std::fs::create_dir_all(&dir)?;
        generator
            .clone()
            .save_file(dir.join("generator"), &Self::recorder())
            .map_err(|e| anyhow::anyhow!("failed to save generator at epoch {epoch}: {e}"))?;
        config
            .save(dir.join("config.json"))
            .with_context(|| format!("failed to save generator config at epoch {epoch}"))?;
        serde_json::to_writer(
            File::create(dir.join("meta.json"))?,
            &SnapshotMeta {
                epoch,
                model_name: self.model_name.clone(),
            },
        )?;
        self.generator.commit(epoch)
    }

    /// Restore the full training state from the latest "All" snapshot.
    ///
    /// Returns the restored epoch, or `None` when the tree is empty. A
    /// pointer naming a snapshot that cannot be loaded aborts startup.
    pub fn restore_all<B, OG, OD>(
        &self,
        device: &B::Device,
        generator: &mut Generator<B>,
        discriminator: &mut Discriminator<B>,
        optim_gen: &mut OG,
        optim_disc: &mut OD,
    ) -> anyhow::Result<Option<usize>>
    where
        B: AutodiffBackend,
        OG: Optimizer<Generator<B>, B> + Clone,
        OD: Optimizer<Discriminator<B>, B> + Clone,
    {
        let Some(epoch) = self.all.latest_epoch()? else {
            return Ok(None);
        };
        let dir = self.all.epoch_dir(epoch);
        let recorder = Self::recorder();

        let record = recorder
            .load(dir.join("generator"), device)
            .map_err(|e| anyhow::anyhow!("failed to restore generator from {}: {e}", dir.display()))?;
        *generator = generator.clone().load_record(record);

        let record = recorder.load(dir.join("discriminator"), device).map_err(|e| {
            anyhow::anyhow!("failed to restore discriminator from {}: {e}", dir.display())
        })?;
        *discriminator = discriminator.clone().load_record(record);

        let record = recorder.load(dir.join("optim_gen"), device).map_err(|e| {
            anyhow::anyhow!("failed to restore generator optimizer from {}: {e}", dir.display())
        })?;
        *optim_gen = optim_gen.clone().load_record(record);

        let record = recorder.load(dir.join("optim_disc"), device).map_err(|e| {
            anyhow::anyhow!(
                "failed to restore discriminator optimizer from {}: {e}",
                dir.display()
            )
        })?;
        *optim_disc = optim_disc.clone().load_record(record);

        Ok(Some(epoch))
    }

    /// Probe the "Generator" tree without loading anything.
    pub fn latest_generator_epoch(&self) -> anyhow::Result<Option<usize>> {
        self.generator.latest_epoch()
    }

    /// Load the latest generator-only snapshot: rebuilds the module from its
    /// saved config and loads the weights on top. Errors when the tree is
    /// empty or the snapshot is unreadable.
    pub fn restore_generator<B: Backend>(
        &self,
        device: &B::Device,
    ) -> anyhow::Result<(usize, Generator<B>)> {
        let epoch = self.generator.latest_epoch()?.ok_or_else(|| {
            anyhow::anyhow!(
                "no Generator checkpoint found under {}",
                self.generator.root.display()
            )
        })?;
        let dir = self.generator.epoch_dir(epoch);
        let config = GeneratorConfig::load(dir.join("config.json")).map_err(|e| {
            anyhow::anyhow!("failed to load generator config from {}: {e}", dir.display())
        })?;
        let generator = config
            .init::<B>(device)
            .load_file(dir.join("generator"), &Self::recorder(), device)
            .map_err(|e| {
                anyhow::anyhow!("failed to restore generator from {}: {e}", dir.display())
            })?;
        Ok((epoch, generator))
    }
}
