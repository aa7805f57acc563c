//! Ordering of timelapse frames by observation time.

use chrono::{NaiveDate, NaiveDateTime};

use crate::consts::FITS_DATE_FIELD;
use crate::error::{OrreryError, ProcessError, Result};
use crate::io::fits::FitsReader;
use crate::store::DataProduct;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO-8601 style `DATE-OBS` value.
///
/// A trailing `Z` is ignored; all frames are assumed to share a time scale.
pub fn parse_obs_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    let value = value.strip_suffix('Z').unwrap_or(value);
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// An input product placed in time order. Pixel data is not kept; it is
/// read again when the frame is rendered.
#[derive(Clone, Debug)]
pub struct TimelapseFrame {
    pub product: DataProduct,
    pub observed: NaiveDateTime,
}

impl TimelapseFrame {
    /// Decode the headers in `bytes` and read the observation time from the
    /// first HDU that carries one.
    pub fn load(product: DataProduct, bytes: Vec<u8>) -> Result<Self> {
        let fits = FitsReader::from_bytes(bytes).map_err(|e| match e {
            OrreryError::InvalidFits(msg) => ProcessError::new(format!(
                "Could not read FITS file '{}': {msg}",
                product.filename
            ))
            .into(),
            other => other,
        })?;
        let value = fits.find_keyword(FITS_DATE_FIELD).ok_or_else(|| {
            ProcessError::new(format!(
                "Could not find observation date in FITS header '{FITS_DATE_FIELD}' in file '{}'",
                product.filename
            ))
        })?;
        let observed = parse_obs_date(value).ok_or_else(|| {
            ProcessError::new(format!(
                "Invalid observation date '{value}' in FITS header '{FITS_DATE_FIELD}' in file '{}'",
                product.filename
            ))
        })?;
        Ok(Self { product, observed })
    }
}

/// Stable sort by observation time; frames with equal times keep their
/// input order.
pub fn sort_frames(frames: &mut [TimelapseFrame]) {
    frames.sort_by_key(|f| f.observed);
}
