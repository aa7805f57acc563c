/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f32 = 1e-10;

/// Status of a process that has not started or is still queued.
pub const STATUS_PENDING: &str = "pending";

/// Terminal status after a successful run.
pub const STATUS_CREATED: &str = "created";

/// Terminal status after a failed run or a failed submission.
pub const STATUS_FAILED: &str = "failed";

/// Failure message used when the job queue rejects a submission.
pub const SUBMIT_FAILED_MESSAGE: &str = "Failed to submit job";

/// Failure message for errors that are not `ProcessError`s.
pub const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error occurred";

/// Failure message written by the orphan sweep.
pub const WORKER_LOST_MESSAGE: &str = "Process did not complete: worker lost";

/// FITS header keyword holding the observation start time.
pub const FITS_DATE_FIELD: &str = "DATE-OBS";

/// FITS logical record size in bytes.
pub const FITS_BLOCK_SIZE: usize = 2880;

/// FITS header card size in bytes.
pub const FITS_CARD_SIZE: usize = 80;

/// Classification given to encoded timelapse outputs.
pub const TIMELAPSE_TAG: &str = "timelapse";

/// Default timelapse frame edge length in pixels.
pub const DEFAULT_TIMELAPSE_SIZE: u32 = 500;

/// Default timelapse frame rate.
pub const DEFAULT_TIMELAPSE_FPS: f64 = 10.0;

/// Default fraction of each axis kept when cropping timelapse frames.
pub const DEFAULT_CROP_SCALE: f64 = 0.5;

/// Percentiles used to stretch FITS data into 8-bit raster frames.
pub const RASTER_LOW_PERCENTILE: f32 = 0.0025;
pub const RASTER_HIGH_PERCENTILE: f32 = 0.9975;

/// Sigma threshold and iteration count for background estimation.
pub const BACKGROUND_CLIP_SIGMA: f32 = 3.0;
pub const BACKGROUND_CLIP_ITERATIONS: usize = 5;

/// Outlier threshold (in units of background noise) for cosmic-ray cleaning.
pub const COSMIC_RAY_SIGMA: f32 = 5.0;
