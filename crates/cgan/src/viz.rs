//! Rendering of generated batches to image files for eyeballing progress.

use std::path::Path;

use anyhow::Context;
use burn::prelude::*;
use image::{imageops, Rgb, RgbImage};

/// Convert a batch of tanh-range tensors (batch, channels, height, width)
/// into RGB images. Single-channel input is replicated across RGB.
pub fn to_rgb_images<B: Backend>(images: Tensor<B, 4>) -> anyhow::Result<Vec<RgbImage>> {
    let [n, channels, height, width] = images.dims();
    anyhow::ensure!(
        channels == 1 || channels == 3,
        "cannot render {channels}-channel tensors as RGB"
    );
    let values = images
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("failed to read tensor data: {e:?}"))?;

    let plane = height * width;
    let to_byte = |v: f32| (((v + 1.0) / 2.0).clamp(0.0, 1.0) * 255.0) as u8;
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let base = i * channels * plane;
        let mut img = RgbImage::new(width as u32, height as u32);
        for y in 0..height {
            for x in 0..width {
                let at = |c: usize| to_byte(values[base + c * plane + y * width + x]);
                let pixel = if channels == 3 {
                    Rgb([at(0), at(1), at(2)])
                } else {
                    let v = at(0);
                    Rgb([v, v, v])
                };
                img.put_pixel(x as u32, y as u32, pixel);
            }
        }
        out.push(img);
    }
    Ok(out)
}

/// Render a batch as a single-row grid PNG at `path`, creating parent
/// directories as needed.
pub fn save_grid<B: Backend>(images: Tensor<B, 4>, path: &Path) -> anyhow::Result<()> {
    let tiles = to_rgb_images(images)?;
    anyhow::ensure!(!tiles.is_empty(), "nothing to render");
    let tile_w = tiles[0].width();
    let tile_h = tiles[0].height();
    let mut grid = RgbImage::new(tile_w * tiles.len() as u32, tile_h);
    for (i, tile) in tiles.iter().enumerate() {
        imageops::replace(&mut grid, tile, i as i64 * tile_w as i64, 0);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    grid.save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}
