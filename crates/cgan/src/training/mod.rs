//! Training pipeline: adversarial + distance losses, the dataset collaborator
//! boundary, epoch metrics with an append-only event log, and the
//! two-optimizer epoch/batch loop.

pub mod data;
pub mod loss;
pub mod metrics;
pub mod trainer;
