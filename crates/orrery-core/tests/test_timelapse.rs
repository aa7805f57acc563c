#[allow(dead_code)]
mod common;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ndarray::Array2;
use orrery_core::config::{Settings, TimelapseFormat};
use orrery_core::error::Result;
use orrery_core::pipeline::{
    Flags, OutputDescriptor, Pipeline, PipelineStage, ProgressReporter, RunContext,
};
use orrery_core::process::Status;
use orrery_core::queue::run_process;
use orrery_core::store::{DataProductId, MemoryStore, Store, Target};
use orrery_core::timelapse::{
    crop_centre, ffmpeg_available, sort_frames, TimelapseFrame, TimelapsePipeline,
};

const DATES: [&str; 4] = [
    "2019-01-02T03:04:00",
    "2019-01-02T03:05:00",
    "2019-01-02T03:07:00",
    "2019-01-02T03:06:00",
];

/// Runs the timelapse pipeline and remembers the workspace it was given.
#[derive(Default)]
struct Observed {
    workspace: Mutex<Option<PathBuf>>,
}

impl Pipeline for Observed {
    fn short_name(&self) -> &str {
        "timelapse"
    }

    fn flags(&self) -> Option<serde_json::Value> {
        TimelapsePipeline.flags()
    }

    fn do_pipeline(
        &self,
        ctx: &mut RunContext<'_>,
        workspace: &Path,
        flags: &Flags,
    ) -> Result<Vec<OutputDescriptor>> {
        *self.workspace.lock().unwrap() = Some(workspace.to_path_buf());
        TimelapsePipeline.do_pipeline(ctx, workspace, flags)
    }
}

fn setup() -> (Arc<MemoryStore>, Target) {
    let store = Arc::new(MemoryStore::new());
    let target = common::target(&store);
    (store, target)
}

fn with_format(format: TimelapseFormat, fps: f64) -> Settings {
    let mut settings = common::settings();
    settings.timelapse.format = format;
    settings.timelapse.fps = fps;
    settings
}

/// Run a timelapse over `dates` and return the stored process and output
/// bytes, if any.
fn run_timelapse(
    settings: Settings,
    dates: &[&str],
    flags_json: Option<&str>,
) -> (orrery_core::pipeline::PipelineProcess, Option<Vec<u8>>, Arc<MemoryStore>) {
    let (store, target) = setup();
    let inputs = common::add_frames(&store, &target, dates);
    let mut process = common::pipeline_process(&store, "tl", "timelapse", Some(&target), inputs);
    process.flags_json = flags_json.map(str::to_string);
    let runtime = common::runtime(&store, settings);

    run_process(&mut process, &TimelapsePipeline, &runtime);
    let stored = store.get_pipeline(process.process.id).unwrap();
    let output = stored.group.map(|group| {
        let products = store.data_products_in_group(group);
        assert_eq!(products.len(), 1);
        store.read_data(products[0].id).unwrap()
    });
    (stored, output, store)
}

#[test]
fn test_frames_sorted_by_observation_date() {
    let (store, target) = setup();
    let ids = common::add_frames(&store, &target, &DATES);
    let mut frames: Vec<TimelapseFrame> = ids
        .iter()
        .map(|id| {
            let product = store.get_data_product(*id).unwrap();
            let bytes = store.read_data(*id).unwrap();
            TimelapseFrame::load(product, bytes).unwrap()
        })
        .collect();

    sort_frames(&mut frames);
    let order: Vec<_> = frames.iter().map(|f| f.product.filename.as_str()).collect();
    assert_eq!(order, ["frame0.fits", "frame1.fits", "frame3.fits", "frame2.fits"]);
}

#[test]
fn test_equal_dates_keep_input_order() {
    let (store, target) = setup();
    let ids = common::add_frames(
        &store,
        &target,
        &["2019-01-02T03:05", "2019-01-02T03:04", "2019-01-02T03:05"],
    );
    let mut frames: Vec<TimelapseFrame> = ids
        .iter()
        .map(|id| {
            TimelapseFrame::load(
                store.get_data_product(*id).unwrap(),
                store.read_data(*id).unwrap(),
            )
            .unwrap()
        })
        .collect();
    sort_frames(&mut frames);
    let order: Vec<_> = frames.iter().map(|f| f.product.filename.as_str()).collect();
    assert_eq!(order, ["frame1.fits", "frame0.fits", "frame2.fits"]);
}

#[test]
fn test_date_read_from_extension_header() {
    let (store, target) = setup();
    let bytes = common::fits_bytes_in_extension(
        common::synthetic_frame(8, 8, 0),
        "2020-05-06T07:08:09",
    );
    let id = common::add_product(&store, &target, "ext.fits", bytes);
    let frame = TimelapseFrame::load(
        store.get_data_product(id).unwrap(),
        store.read_data(id).unwrap(),
    )
    .unwrap();
    assert_eq!(frame.observed.to_string(), "2020-05-06 07:08:09");
    assert_eq!(frame.product.filename, "ext.fits");
}

#[test]
fn test_gif_output_has_signature() {
    let (stored, output, _) = run_timelapse(with_format(TimelapseFormat::Gif, 10.0), &DATES, None);
    assert_eq!(stored.process.status, Status::Created, "{}", stored.process.failure_message);
    assert!(output.unwrap().starts_with(b"GIF89a"));
}

#[test]
fn test_mp4_output_has_signature() {
    if !ffmpeg_available() {
        eprintln!("skipping: ffmpeg not found");
        return;
    }
    let (stored, output, _) = run_timelapse(with_format(TimelapseFormat::Mp4, 10.0), &DATES, None);
    assert_eq!(stored.process.status, Status::Created, "{}", stored.process.failure_message);
    assert_eq!(&output.unwrap()[4..12], b"ftypisom");
}

#[test]
fn test_webm_output_has_signature() {
    if !ffmpeg_available() {
        eprintln!("skipping: ffmpeg not found");
        return;
    }
    let (stored, output, _) =
        run_timelapse(with_format(TimelapseFormat::Webm, 10.0), &DATES, None);
    assert_eq!(stored.process.status, Status::Created, "{}", stored.process.failure_message);
    assert!(output.unwrap().starts_with(&[0x1A, 0x45, 0xDF, 0xA3]));
}

#[test]
fn test_non_positive_fps_rejected_before_any_frame() {
    for fps in [0.0, -1.0] {
        let (stored, output, _) = run_timelapse(with_format(TimelapseFormat::Gif, fps), &DATES, None);
        assert_eq!(stored.process.status, Status::Failed);
        assert_eq!(stored.process.failure_message, "FPS must be positive");
        assert!(stored.process.terminal_timestamp.is_some());
        assert!(stored.logs.is_empty());
        assert!(output.is_none());
    }
}

#[test]
fn test_missing_date_names_file_and_cleans_workspace() {
    let (store, target) = setup();
    let mut inputs = common::add_frames(&store, &target, &DATES[..2]);
    let undated = common::fits_bytes(common::synthetic_frame(24, 16, 9), None);
    inputs.push(common::add_product(&store, &target, "undated.fits", undated));
    let mut process = common::pipeline_process(&store, "tl", "timelapse", Some(&target), inputs);
    let runtime = common::runtime(&store, common::settings());
    let observed = Observed::default();

    let status = run_process(&mut process, &observed, &runtime);
    assert_eq!(status, Status::Failed);
    assert_eq!(
        process.process.failure_message,
        "Could not find observation date in FITS header 'DATE-OBS' in file 'undated.fits'"
    );
    let workspace = observed.workspace.lock().unwrap().clone().unwrap();
    assert!(!workspace.exists());
}

#[test]
fn test_successful_run_cleans_workspace() {
    let (store, target) = setup();
    let inputs = common::add_frames(&store, &target, &DATES[..2]);
    let mut process = common::pipeline_process(&store, "tl", "timelapse", Some(&target), inputs);
    let runtime = common::runtime(&store, common::settings());
    let observed = Observed::default();

    assert_eq!(run_process(&mut process, &observed, &runtime), Status::Created);
    let workspace = observed.workspace.lock().unwrap().clone().unwrap();
    assert!(!workspace.exists());
}

#[test]
fn test_crop_geometry() {
    let data = Array2::<f32>::zeros((6, 10));
    assert_eq!(crop_centre(&data, 0.5).unwrap().dim(), (2, 4));
}

#[test]
fn test_crop_and_normalise_flags_run() {
    let flags = r#"{"crop": true, "normalise_background": true}"#;
    let (stored, output, _) =
        run_timelapse(with_format(TimelapseFormat::Gif, 5.0), &DATES, Some(flags));
    assert_eq!(stored.process.status, Status::Created, "{}", stored.process.failure_message);
    assert!(output.unwrap().starts_with(b"GIF89a"));
}

#[test]
fn test_crop_scale_outside_unit_interval_rejected() {
    let mut settings = with_format(TimelapseFormat::Gif, 5.0);
    settings.timelapse.crop_scale = 1.5;
    let (stored, _, _) = run_timelapse(settings, &DATES, Some(r#"{"crop": true}"#));
    assert_eq!(stored.process.status, Status::Failed);
    assert!(stored.process.failure_message.starts_with("Crop scale must be between 0 and 1"));
    assert!(stored.logs.is_empty());
}

#[test]
fn test_unreadable_frame_reported_with_filename() {
    let (store, target) = setup();
    let mut inputs = common::add_frames(&store, &target, &DATES[..1]);
    inputs.push(common::add_product(&store, &target, "notes.fits", b"hello".to_vec()));
    let mut process = common::pipeline_process(&store, "tl", "timelapse", Some(&target), inputs);
    let runtime = common::runtime(&store, common::settings());

    assert_eq!(run_process(&mut process, &TimelapsePipeline, &runtime), Status::Failed);
    assert!(process.process.failure_message.contains("notes.fits"));
}

#[test]
fn test_malformed_headers_fail_with_filename() {
    let cases = [
        (
            "bitpix4.fits",
            "BITPIX  =                    4",
            "NAXIS1  =                    8",
            "unsupported BITPIX 4",
        ),
        (
            "huge.fits",
            "BITPIX  =                  -32",
            "NAXIS1  =  9223372036854775807",
            "data size overflows",
        ),
    ];
    for (name, bitpix, naxis1, reason) in cases {
        let (store, target) = setup();
        let mut inputs = common::add_frames(&store, &target, &DATES[..1]);
        let bad = common::raw_fits(&[
            "SIMPLE  =                    T",
            bitpix,
            "NAXIS   =                    2",
            naxis1,
            "NAXIS2  =                    3",
            "DATE-OBS= '2019-01-02T03:05:00'",
        ]);
        inputs.push(common::add_product(&store, &target, name, bad));
        let mut process = common::pipeline_process(&store, "tl", "timelapse", Some(&target), inputs);
        let runtime = common::runtime(&store, common::settings());

        assert_eq!(run_process(&mut process, &TimelapsePipeline, &runtime), Status::Failed);
        let stored = store.get_process(process.process.id).unwrap();
        assert_eq!(stored.status, Status::Failed);
        assert!(stored.terminal_timestamp.is_some());
        assert_eq!(
            stored.failure_message,
            format!("Could not read FITS file '{name}': {reason}")
        );
    }
}

#[test]
fn test_frames_read_again_when_rendered() {
    let (store, target) = setup();
    let inputs = common::add_frames(&store, &target, &DATES[..2]);
    let mut process =
        common::pipeline_process(&store, "tl", "timelapse", Some(&target), inputs.clone());
    let reporter = RemoveOnStage {
        store: Arc::clone(&store),
        product: inputs[1],
    };
    let runtime = common::runtime(&store, common::settings()).with_reporter(Arc::new(reporter));

    assert_eq!(run_process(&mut process, &TimelapsePipeline, &runtime), Status::Failed);
    let stored = store.get_pipeline(process.process.id).unwrap();
    assert_eq!(stored.process.failure_message, "An unexpected error occurred");
    assert!(stored.logs.contains("Processing frame 1/2"), "{}", stored.logs);
    assert!(!stored.logs.contains("Processing frame 2/2"), "{}", stored.logs);
}

/// Deletes one input once frames have been sorted.
struct RemoveOnStage {
    store: Arc<MemoryStore>,
    product: DataProductId,
}

impl ProgressReporter for RemoveOnStage {
    fn begin_stage(&self, stage: PipelineStage, _total_items: Option<usize>) {
        if stage == PipelineStage::ProcessingFrames {
            self.store.delete_data_product(self.product).unwrap();
        }
    }
}

#[test]
fn test_timelapse_scenario() {
    let settings = with_format(TimelapseFormat::Gif, 16.0);
    let (stored, output, store) = run_timelapse(
        settings,
        &["2019-01-02T03:04", "2019-01-02T03:05", "2019-01-02T03:07"],
        None,
    );

    assert_eq!(stored.process.status, Status::Created, "{}", stored.process.failure_message);
    assert!(stored.process.failure_message.is_empty());
    for i in 1..=3 {
        assert!(stored.logs.contains(&format!("Processing frame {i}/3")), "{}", stored.logs);
    }

    let group = stored.group.unwrap();
    let products = store.data_products_in_group(group);
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].tag.as_deref(), Some("timelapse"));
    assert!(products[0].product_id.contains(&stored.process.identifier));
    assert_eq!(products[0].product_id, "tl_timelapse.gif");
    assert!(output.unwrap().starts_with(b"GIF89a"));
}
