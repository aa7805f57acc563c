//! Per-frame image transforms applied before rasterising.

use ndarray::{s, Array2, Axis};
use rayon::prelude::*;

use crate::consts::{
    BACKGROUND_CLIP_ITERATIONS, BACKGROUND_CLIP_SIGMA, COSMIC_RAY_SIGMA, EPSILON,
    PARALLEL_PIXEL_THRESHOLD,
};
use crate::error::TransformError;

/// Keep the centred region spanning `scale` of each axis.
///
/// The half extents are `floor(dim * 0.5 * scale)` around `dim / 2`, so a
/// 6x10 image at scale 0.5 becomes 2x4.
pub fn crop_centre(data: &Array2<f32>, scale: f64) -> Result<Array2<f32>, TransformError> {
    let (h, w) = data.dim();
    let half_h = (h as f64 * 0.5 * scale).floor() as usize;
    let half_w = (w as f64 * 0.5 * scale).floor() as usize;
    if half_h == 0 || half_w == 0 {
        return Err(TransformError::EmptyCrop {
            width: w,
            height: h,
            scale,
        });
    }
    let (cy, cx) = (h / 2, w / 2);
    Ok(data
        .slice(s![cy - half_h..cy + half_h, cx - half_w..cx + half_w])
        .to_owned())
}

/// Robust location and spread of a pixel population.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClippedStats {
    pub mean: f32,
    pub median: f32,
    pub stddev: f32,
}

/// Iteratively reject values more than `sigma` standard deviations from the
/// mean, then describe the survivors.
pub fn sigma_clipped_stats(values: &[f32], sigma: f32, iterations: usize) -> Option<ClippedStats> {
    if values.is_empty() {
        return None;
    }
    let mut mask = vec![true; values.len()];
    for _ in 0..iterations {
        let (mean, stddev) = mean_stddev(values, &mask);
        if stddev < EPSILON {
            break;
        }
        let lo = mean - sigma * stddev;
        let hi = mean + sigma * stddev;
        let mut changed = false;
        for (keep, &v) in mask.iter_mut().zip(values) {
            if *keep && (v < lo || v > hi) {
                *keep = false;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let mut survivors: Vec<f32> = values
        .iter()
        .zip(&mask)
        .filter_map(|(&v, &keep)| keep.then_some(v))
        .collect();
    if survivors.is_empty() {
        survivors = values.to_vec();
        mask.fill(true);
    }
    let (mean, stddev) = mean_stddev(values, &mask);
    Some(ClippedStats {
        mean,
        median: median(&mut survivors),
        stddev,
    })
}

fn mean_stddev(values: &[f32], mask: &[bool]) -> (f32, f32) {
    let mut sum = 0.0f64;
    let mut count = 0u32;
    for (&v, &keep) in values.iter().zip(mask) {
        if keep {
            sum += v as f64;
            count += 1;
        }
    }
    if count == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / count as f64;

    let mut var_sum = 0.0f64;
    for (&v, &keep) in values.iter().zip(mask) {
        if keep {
            let d = v as f64 - mean;
            var_sum += d * d;
        }
    }
    (mean as f32, (var_sum / count as f64).sqrt() as f32)
}

fn median(values: &mut [f32]) -> f32 {
    let n = values.len();
    values.sort_unstable_by(f32::total_cmp);
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) * 0.5
    }
}

/// Median of the up-to-eight neighbours of `(row, col)`.
fn neighbour_median(data: &Array2<f32>, row: usize, col: usize) -> f32 {
    let (h, w) = data.dim();
    let mut window = [0.0f32; 8];
    let mut n = 0;
    for r in row.saturating_sub(1)..(row + 2).min(h) {
        for c in col.saturating_sub(1)..(col + 2).min(w) {
            if (r, c) != (row, col) {
                window[n] = data[[r, c]];
                n += 1;
            }
        }
    }
    if n == 0 {
        return data[[row, col]];
    }
    median(&mut window[..n])
}

/// Replace pixels standing more than `threshold` above their neighbourhood
/// median with that median.
fn clean_outliers(data: &Array2<f32>, threshold: f32) -> Array2<f32> {
    let (h, w) = data.dim();
    let mut out = data.clone();
    let clean_row = |row: usize, mut out_row: ndarray::ArrayViewMut1<f32>| {
        for col in 0..w {
            let v = data[[row, col]];
            let m = neighbour_median(data, row, col);
            if v - m > threshold {
                out_row[col] = m;
            }
        }
    };
    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        out.axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(row, out_row)| clean_row(row, out_row));
    } else {
        out.axis_iter_mut(Axis(0))
            .enumerate()
            .for_each(|(row, out_row)| clean_row(row, out_row));
    }
    out
}

/// Flatten the sky level of a frame.
///
/// Negative and non-finite pixels are clipped to zero, isolated hot pixels
/// (cosmic rays) are replaced by their local median, and the sigma-clipped
/// background median is subtracted.
pub fn normalise_background(data: &Array2<f32>) -> Result<Array2<f32>, TransformError> {
    if data.is_empty() {
        return Err(TransformError::Empty);
    }
    if !data.iter().any(|v| v.is_finite()) {
        return Err(TransformError::NoFinitePixels);
    }
    let clipped = data.mapv(|v| if v.is_finite() { v.max(0.0) } else { 0.0 });

    let flat: Vec<f32> = clipped.iter().copied().collect();
    let noise = sigma_clipped_stats(&flat, BACKGROUND_CLIP_SIGMA, BACKGROUND_CLIP_ITERATIONS)
        .ok_or(TransformError::Empty)?;
    let cleaned = if noise.stddev > EPSILON {
        clean_outliers(&clipped, COSMIC_RAY_SIGMA * noise.stddev)
    } else {
        clipped
    };

    let flat: Vec<f32> = cleaned.iter().copied().collect();
    let background =
        sigma_clipped_stats(&flat, BACKGROUND_CLIP_SIGMA, BACKGROUND_CLIP_ITERATIONS)
            .ok_or(TransformError::Empty)?;
    Ok(cleaned.mapv(|v| v - background.median))
}
