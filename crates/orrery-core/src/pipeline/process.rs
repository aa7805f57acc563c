use std::collections::BTreeMap;
use std::path::Path;

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{InvalidPipelineError, ProcessError, RegistryError, Result, StoreError};
use crate::process::{AsyncProcess, Status};
use crate::store::{
    DataProduct, DataProductId, GroupId, NewDataProduct, NewReducedDatum, ReducedDatumId, Store,
    Target, TargetId,
};
use crate::workspace::Workspace;

use super::context::{RunContext, Runtime};
use super::flags::{validate_flags, Flags};
use super::output::{OutputDescriptor, OutputKind};
use super::registry::ResolvedPipeline;
use super::types::PipelineStage;
use super::Pipeline;

/// A process that runs a [`Pipeline`] over a fixed set of input data
/// products and stores whatever the pipeline produces.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineProcess {
    pub process: AsyncProcess,
    /// Registry short name of the pipeline to run.
    pub pipeline: String,
    pub input_files: Vec<DataProductId>,
    /// Group collecting the data products created by the run.
    pub group: Option<GroupId>,
    pub logs: String,
    /// User-supplied flag values as a JSON object.
    pub flags_json: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct NewPipelineProcess {
    pub identifier: String,
    pub target: Option<TargetId>,
    pub pipeline: String,
    pub input_files: Vec<DataProductId>,
    pub flags_json: Option<String>,
}

/// Everything written by one materialisation pass, kept so it can be undone.
#[derive(Default)]
struct Materialized {
    products: Vec<DataProduct>,
    reduced: Vec<ReducedDatumId>,
    group: Option<GroupId>,
}

impl Materialized {
    fn rollback(self, store: &dyn Store) {
        for product in &self.products {
            if let Err(e) = store.delete_data_product(product.id) {
                warn!(product = %product.id, error = %e, "Failed to roll back data product");
            }
        }
        for id in self.reduced {
            if let Err(e) = store.delete_reduced_datum(id) {
                warn!(datum = %id, error = %e, "Failed to roll back reduced datum");
            }
        }
        if let Some(group) = self.group {
            if let Err(e) = store.delete_group(group) {
                warn!(group = %group, error = %e, "Failed to roll back output group");
            }
        }
    }
}

impl PipelineProcess {
    /// Create a pending pipeline process named
    /// `<short_name>_<target pk>_<YYYYmmddHHMMSS>`.
    ///
    /// `overrides` are checked against the pipeline's flag schema before the
    /// record is written.
    pub fn create_timestamped(
        store: &dyn Store,
        resolved: &ResolvedPipeline,
        target: &Target,
        products: &[DataProductId],
        overrides: &BTreeMap<String, Value>,
    ) -> Result<Self> {
        if let Some(schema) = &resolved.flags {
            schema.resolve(overrides)?;
        }
        let date_str = Local::now().format("%Y%m%d%H%M%S");
        let identifier = format!(
            "{}_{}_{}",
            resolved.pipeline.short_name(),
            target.id,
            date_str
        );
        let flags_json = if overrides.is_empty() {
            None
        } else {
            Some(serde_json::to_string(overrides)?)
        };
        let pipe = store.create_pipeline(NewPipelineProcess {
            identifier,
            target: Some(target.id),
            pipeline: resolved.name.clone(),
            input_files: products.to_vec(),
            flags_json,
        })?;
        debug!(identifier = %pipe.process.identifier, inputs = products.len(), "Created pipeline process");
        Ok(pipe)
    }

    /// Append `msg` and a newline to the logs and persist.
    pub fn log(&mut self, store: &dyn Store, msg: &str) -> std::result::Result<(), StoreError> {
        self.logs.push_str(msg);
        self.logs.push('\n');
        store.save_pipeline(self)
    }

    /// Validate, run the pipeline in a fresh workspace, store its outputs and
    /// mark the process `created`.
    ///
    /// Precondition failures return a [`ProcessError`] before anything is
    /// written. Status is left untouched on error; the job wrapper records
    /// the failure.
    pub fn run(&mut self, pipeline: &dyn Pipeline, runtime: &Runtime) -> Result<()> {
        let store = runtime.store.as_ref();

        let target = self
            .process
            .target
            .ok_or_else(|| ProcessError::new("Process must have an associated target"))?;
        if self.input_files.is_empty() {
            return Err(ProcessError::new("No input files to process").into());
        }
        if let Some(allowed) = pipeline.allowed_suffixes() {
            for id in &self.input_files {
                let product = store.get_data_product(*id)?;
                let name = base_name(&product.filename);
                if let Err(msg) = check_suffix(name, &allowed) {
                    return Err(ProcessError::new(format!("Error running pipeline {msg}")).into());
                }
            }
        }
        let flags = self.resolve_flags(pipeline)?;

        let workspace = Workspace::acquire()?;
        info!(
            identifier = %self.process.identifier,
            pipeline = pipeline.short_name(),
            inputs = self.input_files.len(),
            "Running pipeline"
        );
        let result = self.execute(pipeline, runtime, workspace.path(), &flags, target);
        let path = workspace.path().to_path_buf();
        if let Err(e) = workspace.release() {
            warn!(path = %path.display(), error = %e, "Failed to remove workspace");
        }
        result?;

        self.process.status = Status::Created;
        store.save_pipeline(self)?;
        info!(identifier = %self.process.identifier, "Pipeline complete");
        Ok(())
    }

    fn resolve_flags(&self, pipeline: &dyn Pipeline) -> Result<Flags> {
        let overrides: BTreeMap<String, Value> = match self.flags_json.as_deref() {
            Some(json) if !json.trim().is_empty() => serde_json::from_str(json)?,
            _ => BTreeMap::new(),
        };
        let schema = validate_flags(pipeline.flags().as_ref()).map_err(|source| {
            RegistryError::Invalid(InvalidPipelineError::InvalidFlags {
                class: pipeline.short_name().to_string(),
                source,
            })
        })?;
        match schema {
            Some(schema) => schema
                .resolve(&overrides)
                .map_err(|e| ProcessError::new(format!("Invalid flags: {e}")).into()),
            None => Ok(Flags(overrides)),
        }
    }

    fn execute(
        &mut self,
        pipeline: &dyn Pipeline,
        runtime: &Runtime,
        workspace: &Path,
        flags: &Flags,
        target: TargetId,
    ) -> Result<()> {
        let outputs = {
            let mut ctx = RunContext::new(self, runtime);
            pipeline.do_pipeline(&mut ctx, workspace, flags)?
        };
        if outputs.is_empty() {
            return Ok(());
        }

        let store = runtime.store.as_ref();
        self.process.status = Status::Transient(PipelineStage::SavingOutputs.to_string());
        store.save_pipeline(self)?;
        runtime
            .reporter
            .begin_stage(PipelineStage::SavingOutputs, Some(outputs.len()));

        let mut created = Materialized::default();
        let saved = self.materialize(&outputs, target, store, &mut created);
        runtime.reporter.finish_stage();
        if let Err(e) = saved {
            warn!(identifier = %self.process.identifier, error = %e, "Rolling back pipeline outputs");
            self.group = None;
            created.rollback(store);
            return Err(e);
        }
        Ok(())
    }

    fn materialize(
        &mut self,
        outputs: &[OutputDescriptor],
        target: TargetId,
        store: &dyn Store,
        created: &mut Materialized,
    ) -> Result<()> {
        let identifier = self.process.identifier.clone();
        for output in outputs {
            let name = format!("{identifier}_{}", output.file_name());
            match &output.output_type {
                OutputKind::DataProduct => {
                    let data = std::fs::read(&output.path)?;
                    let product = store.create_data_product(NewDataProduct {
                        product_id: name.clone(),
                        target: Some(target),
                        tag: output.classification.clone(),
                        filename: name,
                        data,
                    })?;
                    debug!(product = %product.product_id, "Saved data product");
                    created.products.push(product);
                }
                OutputKind::ReducedDatum => {
                    let value = std::fs::read_to_string(&output.path)?;
                    let datum = store.create_reduced_datum(NewReducedDatum {
                        target,
                        data_type: output.classification.clone(),
                        source_name: name,
                        timestamp: Utc::now(),
                        value,
                    })?;
                    debug!(datum = %datum.id, "Saved reduced datum");
                    created.reduced.push(datum.id);
                }
                OutputKind::Other(kind) => {
                    return Err(ProcessError::new(format!("Invalid output type '{kind}'")).into());
                }
            }
        }

        if !created.products.is_empty() {
            let group = store.create_group(&format!("{identifier}_outputs"))?;
            created.group = Some(group.id);
            for product in &mut created.products {
                product.groups.insert(group.id);
                store.save_data_product(product)?;
            }
            self.group = Some(group.id);
            store.save_pipeline(self)?;
        }
        Ok(())
    }
}

fn base_name(filename: &str) -> &str {
    Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename)
}

/// Check that `filename` ends with one of `allowed`.
pub fn check_suffix(filename: &str, allowed: &[String]) -> std::result::Result<(), String> {
    if allowed.iter().any(|suffix| filename.ends_with(suffix.as_str())) {
        Ok(())
    } else {
        Err(format!(
            "File '{}' does not end an allowed filename suffix ({})",
            filename,
            allowed.join(", ")
        ))
    }
}
