//! Conditional image-to-image translation (pix2pix-style) on burn.
//!
//! A U-Net generator maps conditioning images to synthetic images; a
//! patch-level discriminator judges (image, condition) pairs at local
//! receptive-field granularity. Training runs the adversarial two-optimizer
//! loop and persists two independent checkpoint artifacts: a full snapshot
//! ("All") for resuming training and a generator-only snapshot ("Generator")
//! for inference deployment.

pub mod checkpoint;
pub mod inference;
pub mod model;
pub mod training;
pub mod viz;
