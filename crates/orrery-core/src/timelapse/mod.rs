//! Animated timelapse built from a set of FITS frames.

pub mod encode;
pub mod sort;
pub mod transform;

use std::path::Path;

use image::GrayImage;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::TimelapseSettings;
use crate::consts::TIMELAPSE_TAG;
use crate::error::{OrreryError, ProcessError, Result};
use crate::io::fits::{write_image, FitsReader};
use crate::io::image_io::to_raster;
use crate::pipeline::{Flags, OutputDescriptor, OutputKind, Pipeline, PipelineStage, RunContext};

pub use encode::{encoder_for, ffmpeg_available, AnimationEncoder};
pub use sort::{parse_obs_date, sort_frames, TimelapseFrame};
pub use transform::{crop_centre, normalise_background, sigma_clipped_stats, ClippedStats};

/// Class path the built-in catalogue registers [`TimelapsePipeline`] under.
pub const TIMELAPSE_CLASS_PATH: &str = "orrery_core::timelapse::TimelapsePipeline";

/// Orders frames by `DATE-OBS`, optionally crops and flattens each one, and
/// encodes them as a GIF, MP4 or WebM animation.
///
/// Format, frame rate, frame size and crop scale come from
/// [`TimelapseSettings`]; cropping and background normalisation are flags.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimelapsePipeline;

impl Pipeline for TimelapsePipeline {
    fn short_name(&self) -> &str {
        "timelapse"
    }

    fn flags(&self) -> Option<Value> {
        Some(json!({
            "normalise_background": {
                "default": false,
                "long_name": "Normalise background",
            },
            "crop": {
                "default": false,
                "long_name": "Crop to the centre of each frame",
            },
        }))
    }

    fn do_pipeline(
        &self,
        ctx: &mut RunContext<'_>,
        workspace: &Path,
        flags: &Flags,
    ) -> Result<Vec<OutputDescriptor>> {
        let settings = ctx.settings().timelapse.clone();
        let options = FrameOptions::new(&settings, flags)?;

        let products = ctx.input_files()?;
        if products.is_empty() {
            return Err(ProcessError::new("Empty data products list").into());
        }
        let total = products.len();

        ctx.begin_stage(PipelineStage::SortingFrames, Some(total))?;
        let mut frames = Vec::with_capacity(total);
        for (i, product) in products.into_iter().enumerate() {
            let bytes = ctx.read_input(&product)?;
            frames.push(TimelapseFrame::load(product, bytes)?);
            ctx.advance(i + 1);
        }
        sort_frames(&mut frames);
        ctx.finish_stage();

        ctx.begin_stage(PipelineStage::ProcessingFrames, Some(total))?;
        let mut encoder = encoder_for(settings.format, settings.fps, workspace)?;
        for (i, frame) in frames.iter().enumerate() {
            let bytes = ctx.read_input(&frame.product)?;
            let raster = options.render(frame, bytes, i, workspace)?;
            encoder.append(&raster)?;
            ctx.log(format!("Processing frame {}/{}", i + 1, total))?;
            ctx.advance(i + 1);
        }
        ctx.finish_stage();

        ctx.begin_stage(PipelineStage::Encoding, None)?;
        let path = encoder.finish()?;
        ctx.finish_stage();
        info!(
            identifier = ctx.identifier(),
            format = %settings.format,
            frames = total,
            "Encoded timelapse"
        );

        Ok(vec![OutputDescriptor::new(path, OutputKind::DataProduct)
            .with_classification(TIMELAPSE_TAG)])
    }
}

/// Per-frame work decided before any frame is touched.
struct FrameOptions {
    crop_scale: Option<f64>,
    normalise: bool,
    size: u32,
}

impl FrameOptions {
    fn new(settings: &TimelapseSettings, flags: &Flags) -> Result<Self> {
        if !(settings.fps > 0.0) {
            return Err(ProcessError::new("FPS must be positive").into());
        }
        let crop_scale = if flags.enabled("crop") {
            if !(0.0..=1.0).contains(&settings.crop_scale) {
                return Err(ProcessError::new(format!(
                    "Crop scale must be between 0 and 1, got {}",
                    settings.crop_scale
                ))
                .into());
            }
            Some(settings.crop_scale)
        } else {
            None
        };
        Ok(Self {
            crop_scale,
            normalise: flags.enabled("normalise_background"),
            size: settings.size,
        })
    }

    fn transforms(&self) -> bool {
        self.crop_scale.is_some() || self.normalise
    }

    /// Rasterise one frame from its file contents. Transformed frames are
    /// round-tripped through an intermediate FITS file in `workspace` first.
    fn render(
        &self,
        frame: &TimelapseFrame,
        bytes: Vec<u8>,
        index: usize,
        workspace: &Path,
    ) -> Result<GrayImage> {
        let name = frame.product.filename.as_str();
        let mut image = FitsReader::from_bytes(bytes)
            .and_then(|fits| fits.read_image())
            .map_err(|e| frame_error(name, e))?;
        if self.transforms() {
            if let Some(scale) = self.crop_scale {
                image.data = crop_centre(&image.data, scale).map_err(|e| frame_error(name, e))?;
            }
            if self.normalise {
                image.data =
                    normalise_background(&image.data).map_err(|e| frame_error(name, e))?;
            }

            let path = workspace.join(format!("frame_{index}.fits"));
            write_image(&path, &image)?;
            debug!(file = name, path = %path.display(), "Wrote intermediate frame");
            image = FitsReader::open(&path)?.read_image()?;
        }
        to_raster(&image.data, self.size).map_err(|e| frame_error(name, e))
    }
}

/// Attribute an image problem to the input file it came from.
fn frame_error(name: &str, err: impl Into<FrameProblem>) -> OrreryError {
    match err.into() {
        FrameProblem::Other(e) => e,
        FrameProblem::Message(msg) => {
            ProcessError::new(format!("Error processing file '{name}': {msg}")).into()
        }
    }
}

enum FrameProblem {
    Message(String),
    Other(OrreryError),
}

impl From<OrreryError> for FrameProblem {
    fn from(e: OrreryError) -> Self {
        match e {
            OrreryError::InvalidFits(msg) => Self::Message(msg),
            other => Self::Other(other),
        }
    }
}

impl From<crate::error::TransformError> for FrameProblem {
    fn from(e: crate::error::TransformError) -> Self {
        Self::Message(e.to_string())
    }
}
