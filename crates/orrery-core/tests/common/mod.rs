use std::sync::Arc;

use ndarray::Array2;
use orrery_core::config::Settings;
use orrery_core::io::fits::{encode_image, Card, CardValue, FitsHeader, FitsImage};
use orrery_core::pipeline::{NewPipelineProcess, PipelineProcess, Runtime};
use orrery_core::store::{DataProductId, MemoryStore, NewDataProduct, Store, Target};

/// Synthetic frame: a smooth gradient with a bright blob whose position
/// depends on `seed`, so consecutive frames differ.
pub fn synthetic_frame(width: usize, height: usize, seed: usize) -> Array2<f32> {
    let cy = (height / 2) as f32;
    let cx = ((width / 4) + seed * 3 % (width / 2).max(1)) as f32;
    Array2::from_shape_fn((height, width), |(r, c)| {
        let d2 = (r as f32 - cy).powi(2) + (c as f32 - cx).powi(2);
        100.0 + r as f32 + c as f32 * 0.5 + 1000.0 * (-d2 / 8.0).exp()
    })
}

/// Single-HDU FITS file holding `data`, with `DATE-OBS` set when given.
pub fn fits_bytes(data: Array2<f32>, date_obs: Option<&str>) -> Vec<u8> {
    let mut header = FitsHeader::default();
    if let Some(date) = date_obs {
        header.push(Card::new("DATE-OBS", CardValue::Str(date)));
    }
    header.push(Card::new("EXPTIME", CardValue::Float(30.0)));
    encode_image(&FitsImage { header, data })
}

/// FITS file with an empty primary HDU and the image plus `DATE-OBS` in an
/// IMAGE extension.
pub fn fits_bytes_in_extension(data: Array2<f32>, date_obs: &str) -> Vec<u8> {
    let mut out = Vec::new();
    for text in [
        "SIMPLE  =                    T",
        "BITPIX  =                    8",
        "NAXIS   =                    0",
        "EXTEND  =                    T",
        "END",
    ] {
        out.extend_from_slice(&card(text));
    }
    out.resize(2880, b' ');

    let mut ext = fits_bytes(data, Some(date_obs));
    ext[..80].copy_from_slice(&card("XTENSION= 'IMAGE   '"));
    out.extend_from_slice(&ext);
    out
}

/// FITS file made of the given header cards and one zeroed data block.
pub fn raw_fits(cards: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    for text in cards.iter().copied().chain(["END"]) {
        out.extend_from_slice(&card(text));
    }
    out.resize(out.len().div_ceil(2880) * 2880, b' ');
    out.resize(out.len() + 2880, 0);
    out
}

fn card(text: &str) -> [u8; 80] {
    let mut buf = [b' '; 80];
    buf[..text.len()].copy_from_slice(text.as_bytes());
    buf
}

pub fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.timelapse.size = 32;
    settings
}

pub fn runtime(store: &Arc<MemoryStore>, settings: Settings) -> Runtime {
    let store: Arc<dyn Store> = store.clone();
    Runtime::new(store, Arc::new(settings))
}

pub fn target(store: &MemoryStore) -> Target {
    store.create_target("m31", "Andromeda").unwrap()
}

pub fn add_product(
    store: &MemoryStore,
    target: &Target,
    filename: &str,
    data: Vec<u8>,
) -> DataProductId {
    store
        .create_data_product(NewDataProduct {
            product_id: filename.to_string(),
            target: Some(target.id),
            tag: None,
            filename: filename.to_string(),
            data,
        })
        .unwrap()
        .id
}

/// Dated FITS inputs named `frame<i>.fits`, in the order given.
pub fn add_frames(store: &MemoryStore, target: &Target, dates: &[&str]) -> Vec<DataProductId> {
    dates
        .iter()
        .enumerate()
        .map(|(i, date)| {
            let bytes = fits_bytes(synthetic_frame(24, 16, i), Some(date));
            add_product(store, target, &format!("frame{i}.fits"), bytes)
        })
        .collect()
}

pub fn pipeline_process(
    store: &MemoryStore,
    identifier: &str,
    pipeline: &str,
    target: Option<&Target>,
    input_files: Vec<DataProductId>,
) -> PipelineProcess {
    store
        .create_pipeline(NewPipelineProcess {
            identifier: identifier.to_string(),
            target: target.map(|t| t.id),
            pipeline: pipeline.to_string(),
            input_files,
            flags_json: None,
        })
        .unwrap()
}
