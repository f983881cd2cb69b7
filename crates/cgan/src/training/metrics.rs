//! Per-epoch loss metrics and the append-only training-progress sink.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Accumulated batch-mean losses for one epoch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub d_loss: f64,
    pub g_loss: f64,
}

/// In-memory loss series for the run.
#[derive(Debug, Default)]
pub struct MetricsHistory {
    entries: Vec<EpochMetrics>,
}

impl MetricsHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, metrics: EpochMetrics) {
        self.entries.push(metrics);
    }

    pub fn latest(&self) -> Option<&EpochMetrics> {
        self.entries.last()
    }

    pub fn entries(&self) -> &[EpochMetrics] {
        &self.entries
    }
}

/// Append-only JSONL event log under `<run_dir>/<model_name>/events.jsonl`.
///
/// The directory is keyed by the model-configuration-derived name, so runs
/// with different loss kinds never interleave.
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn create(run_dir: &Path, model_name: &str) -> anyhow::Result<Self> {
        let dir = run_dir.join(model_name);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create event log dir {}", dir.display()))?;
        Ok(Self {
            path: dir.join("events.jsonl"),
        })
    }

    pub fn append(&self, metrics: &EpochMetrics) -> anyhow::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open event log {}", self.path.display()))?;
        serde_json::to_writer(&mut file, metrics)?;
        writeln!(file)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
