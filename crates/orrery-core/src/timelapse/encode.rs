//! Animation writers for the supported timelapse containers.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, DynamicImage, Frame, GrayImage};
use tracing::debug;

use crate::config::TimelapseFormat;
use crate::error::{OrreryError, ProcessError, Result};
use crate::io::image_io::save_png;

/// NeuQuant sampling factor; 1 is best quality, 30 fastest.
const GIF_QUANTISER_SPEED: i32 = 10;

/// Sink for equally spaced animation frames.
pub trait AnimationEncoder {
    fn append(&mut self, frame: &GrayImage) -> Result<()>;

    /// Write any buffered output and return the finished file.
    fn finish(self: Box<Self>) -> Result<PathBuf>;
}

/// Create an encoder writing `timelapse.<ext>` under `dir`.
pub fn encoder_for(
    format: TimelapseFormat,
    fps: f64,
    dir: &Path,
) -> Result<Box<dyn AnimationEncoder>> {
    let output = dir.join(format!("timelapse.{}", format.extension()));
    Ok(match format {
        TimelapseFormat::Gif => Box::new(GifAnimation::create(&output, fps)?),
        TimelapseFormat::Mp4 | TimelapseFormat::Webm => {
            Box::new(FfmpegAnimation::create(dir, output, format, fps)?)
        }
    })
}

/// Last byte of every complete GIF stream.
const GIF_TRAILER: u8 = 0x3B;

/// Looping GIF written frame by frame.
pub struct GifAnimation {
    encoder: GifEncoder<File>,
    path: PathBuf,
    delay: Delay,
    count: usize,
}

impl GifAnimation {
    pub fn create(path: &Path, fps: f64) -> Result<Self> {
        let mut encoder = GifEncoder::new_with_speed(File::create(path)?, GIF_QUANTISER_SPEED);
        encoder.set_repeat(Repeat::Infinite)?;
        Ok(Self {
            encoder,
            path: path.to_path_buf(),
            delay: Delay::from_saturating_duration(
                Duration::try_from_secs_f64(1.0 / fps).unwrap_or(Duration::MAX),
            ),
            count: 0,
        })
    }
}

impl AnimationEncoder for GifAnimation {
    fn append(&mut self, frame: &GrayImage) -> Result<()> {
        let rgba = DynamicImage::ImageLuma8(frame.clone()).to_rgba8();
        self.encoder
            .encode_frame(Frame::from_parts(rgba, 0, 0, self.delay))?;
        self.count += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<PathBuf> {
        let Self {
            encoder,
            path,
            count,
            ..
        } = *self;
        if count == 0 {
            return Err(OrreryError::Encoder("no frames to encode".into()));
        }
        // The encoder writes the trailer on drop and discards any I/O error,
        // so check the file for it.
        drop(encoder);
        let mut file = File::open(&path)?;
        file.seek(SeekFrom::End(-1))?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last)?;
        if last[0] != GIF_TRAILER {
            return Err(OrreryError::Encoder(format!(
                "GIF trailer missing from {}",
                path.display()
            )));
        }
        Ok(path)
    }
}

/// MP4 or WebM produced by handing a PNG sequence to `ffmpeg`.
pub struct FfmpegAnimation {
    frames_dir: PathBuf,
    output: PathBuf,
    format: TimelapseFormat,
    fps: f64,
    count: usize,
}

impl FfmpegAnimation {
    pub fn create(dir: &Path, output: PathBuf, format: TimelapseFormat, fps: f64) -> Result<Self> {
        let frames_dir = dir.join("frames");
        std::fs::create_dir_all(&frames_dir)?;
        Ok(Self {
            frames_dir,
            output,
            format,
            fps,
            count: 0,
        })
    }

    fn codec_args(&self) -> [&'static str; 4] {
        match self.format {
            TimelapseFormat::Webm => ["-f", "webm", "-c:v", "libvpx"],
            _ => ["-f", "mp4", "-c:v", "libx264"],
        }
    }
}

impl AnimationEncoder for FfmpegAnimation {
    fn append(&mut self, frame: &GrayImage) -> Result<()> {
        let path = self.frames_dir.join(format!("frame_{:05}.png", self.count));
        save_png(frame, &path)?;
        self.count += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<PathBuf> {
        if self.count == 0 {
            return Err(OrreryError::Encoder("no frames to encode".into()));
        }
        let pattern = self.frames_dir.join("frame_%05d.png");
        let fps = self.fps.to_string();
        debug!(format = %self.format, frames = self.count, "Running ffmpeg");

        let output = Command::new("ffmpeg")
            .args(["-y", "-v", "error", "-framerate", &fps, "-i"])
            .arg(&pattern)
            .args(["-vf", "scale=trunc(iw/2)*2:trunc(ih/2)*2"])
            .args(self.codec_args())
            .args(["-pix_fmt", "yuv420p"])
            .arg(&self.output)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                ProcessError::new(format!(
                    "Could not encode {} timelapse: ffmpeg is not available ({e})",
                    self.format
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OrreryError::Encoder(format!("ffmpeg error: {}", stderr.trim())));
        }
        Ok(self.output)
    }
}

/// Whether an `ffmpeg` executable can be run from `PATH`.
pub fn ffmpeg_available() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}
