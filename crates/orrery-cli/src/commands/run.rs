use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use orrery_core::pipeline::{Catalogue, PipelineProcess, Registry, Runtime};
use orrery_core::process::{PipelineSummary, Status};
use orrery_core::queue::{send_task, Task, ThreadQueue, Worker};
use orrery_core::store::{DataProductId, MemoryStore, NewDataProduct, Store, Target};
use serde_json::Value;
use tracing::info;

use super::load_settings;
use crate::progress::BarReporter;
use crate::summary::print_run_summary;

#[derive(Args)]
pub struct RunArgs {
    /// Configured pipeline name, e.g. "timelapse"
    pub pipeline: String,

    /// Input files
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Identifier of the target the inputs belong to
    #[arg(long, default_value = "target")]
    pub target: String,

    /// Flag override as NAME=VALUE; VALUE is parsed as JSON, else a string
    #[arg(long = "flag", value_name = "NAME=VALUE")]
    pub flags: Vec<String>,

    /// Directory that produced data products are written to
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Print the final status as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &RunArgs, config: Option<&Path>) -> Result<()> {
    let settings = Arc::new(load_settings(config)?);
    let registry = Registry::new(&settings, Catalogue::builtin());
    let resolved = registry.get_subclass(&args.pipeline)?;
    let overrides = parse_flags(&args.flags)?;

    let store = Arc::new(MemoryStore::new());
    let target = store.create_target(&args.target, &args.target)?;
    let inputs = ingest(store.as_ref(), &target, &args.files)?;

    let process = PipelineProcess::create_timestamped(
        store.as_ref(),
        &resolved,
        &target,
        &inputs,
        &overrides,
    )?;
    info!(identifier = %process.process.identifier, inputs = inputs.len(), "Submitting");

    let dyn_store: Arc<dyn Store> = store.clone();
    let runtime = Runtime::new(dyn_store, Arc::clone(&settings))
        .with_reporter(Arc::new(BarReporter::new()));
    let queue = ThreadQueue::spawn(Worker::new(runtime, Arc::new(registry)))
        .context("Failed to start worker")?;
    let mut record = process.process.clone();
    let args_for_job = [resolved.name.as_str()];
    send_task(&queue, store.as_ref(), Task::RunPipeline, &mut record, &args_for_job)?;
    queue.shutdown();

    let finished = store.get_pipeline(process.process.id)?;
    let exported = export_outputs(store.as_ref(), &finished, &args.output)?;
    let summary = PipelineSummary::new(&finished, store.as_ref());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_run_summary(&summary, &exported);
    }

    match finished.process.status {
        Status::Created => Ok(()),
        _ => bail!(
            "{} did not complete: {}",
            finished.process.identifier,
            finished.process.failure_message
        ),
    }
}

fn parse_flags(raw: &[String]) -> Result<BTreeMap<String, Value>> {
    raw.iter()
        .map(|item| {
            let (name, value) = item
                .split_once('=')
                .with_context(|| format!("Flag '{item}' is not of the form NAME=VALUE"))?;
            let value =
                serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.into()));
            Ok((name.trim().to_string(), value))
        })
        .collect()
}

fn ingest(store: &dyn Store, target: &Target, files: &[PathBuf]) -> Result<Vec<DataProductId>> {
    files
        .iter()
        .map(|path| {
            let data = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let product = store.create_data_product(NewDataProduct {
                product_id: filename.clone(),
                target: Some(target.id),
                tag: None,
                filename,
                data,
            })?;
            Ok(product.id)
        })
        .collect()
}

/// Copy every data product in the run's output group into `dir`.
fn export_outputs(
    store: &dyn Store,
    process: &PipelineProcess,
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    let Some(group) = process.group else {
        return Ok(Vec::new());
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let mut written = Vec::new();
    for product in store.data_products_in_group(group) {
        let path = dir.join(&product.filename);
        std::fs::write(&path, store.read_data(product.id)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}
