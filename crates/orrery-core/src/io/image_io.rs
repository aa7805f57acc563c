use std::path::Path;

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageFormat, Luma};
use ndarray::Array2;

use crate::consts::{EPSILON, RASTER_HIGH_PERCENTILE, RASTER_LOW_PERCENTILE};
use crate::error::{OrreryError, Result};

/// Black and white points at the given percentiles of the finite pixels.
///
/// `low_percentile` and `high_percentile` are in [0.0, 1.0].
pub fn percentile_levels(
    data: &Array2<f32>,
    low_percentile: f32,
    high_percentile: f32,
) -> Option<(f32, f32)> {
    let mut sorted: Vec<f32> = data.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f32::total_cmp);

    let n = sorted.len();
    let lo_idx = ((n as f32 * low_percentile) as usize).min(n - 1);
    let hi_idx = ((n as f32 * high_percentile) as usize).min(n - 1);
    Some((sorted[lo_idx], sorted[hi_idx]))
}

/// Convert an image plane to an 8-bit `size`x`size` raster.
///
/// Levels are stretched between the 0.25% and 99.75% percentiles. FITS stores
/// the bottom row first, so rows are flipped for display.
pub fn to_raster(data: &Array2<f32>, size: u32) -> Result<GrayImage> {
    let (h, w) = data.dim();
    if h == 0 || w == 0 || size == 0 {
        return Err(OrreryError::InvalidFits(format!(
            "cannot rasterise a {w}x{h} image at {size}px"
        )));
    }
    let (black, white) = percentile_levels(data, RASTER_LOW_PERCENTILE, RASTER_HIGH_PERCENTILE)
        .ok_or_else(|| OrreryError::InvalidFits("image has no finite pixels".into()))?;
    let range = white - black;
    let range = if range.abs() < EPSILON { 1.0 } else { range };

    let mut img = GrayImage::new(w as u32, h as u32);
    for row in 0..h {
        for col in 0..w {
            let v = data[[row, col]];
            let v = if v.is_finite() { v } else { black };
            let val = (((v - black) / range).clamp(0.0, 1.0) * 255.0) as u8;
            img.put_pixel(col as u32, (h - 1 - row) as u32, Luma([val]));
        }
    }

    Ok(imageops::resize(&img, size, size, FilterType::Triangle))
}

/// Save a raster frame as 8-bit grayscale PNG.
pub fn save_png(frame: &GrayImage, path: &Path) -> Result<()> {
    frame.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}
