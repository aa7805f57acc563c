use std::sync::Arc;

use crate::config::Settings;
use crate::error::Result;
use crate::process::Status;
use crate::store::{DataProduct, Store, TargetId};

use super::process::PipelineProcess;
use super::types::{NoOpReporter, PipelineStage, ProgressReporter};

/// Shared collaborators handed to every run on a worker.
#[derive(Clone)]
pub struct Runtime {
    pub store: Arc<dyn Store>,
    pub settings: Arc<Settings>,
    pub reporter: Arc<dyn ProgressReporter>,
}

impl Runtime {
    pub fn new(store: Arc<dyn Store>, settings: Arc<Settings>) -> Self {
        Self {
            store,
            settings,
            reporter: Arc::new(NoOpReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }
}

/// What a pipeline's work method can see and touch while it runs.
///
/// Status and log writes are persisted immediately so that status readers
/// observe progress during long steps.
pub struct RunContext<'a> {
    process: &'a mut PipelineProcess,
    runtime: &'a Runtime,
}

impl<'a> RunContext<'a> {
    pub fn new(process: &'a mut PipelineProcess, runtime: &'a Runtime) -> Self {
        Self { process, runtime }
    }

    pub fn process(&self) -> &PipelineProcess {
        self.process
    }

    pub fn identifier(&self) -> &str {
        &self.process.process.identifier
    }

    pub fn target(&self) -> Option<TargetId> {
        self.process.process.target
    }

    pub fn settings(&self) -> &Settings {
        &self.runtime.settings
    }

    pub fn store(&self) -> &dyn Store {
        self.runtime.store.as_ref()
    }

    /// Input data products in the order they were attached.
    pub fn input_files(&self) -> Result<Vec<DataProduct>> {
        let store = self.store();
        let products = self
            .process
            .input_files
            .iter()
            .map(|id| store.get_data_product(*id))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(products)
    }

    pub fn read_input(&self, product: &DataProduct) -> Result<Vec<u8>> {
        Ok(self.store().read_data(product.id)?)
    }

    /// Append a line to the process logs.
    pub fn log(&mut self, msg: impl AsRef<str>) -> Result<()> {
        let store = self.runtime.store.as_ref();
        self.process.log(store, msg.as_ref())?;
        Ok(())
    }

    /// Write a progress label as the process status.
    pub fn set_status(&mut self, label: impl Into<String>) -> Result<()> {
        self.process.process.status = Status::from(label.into());
        self.runtime.store.save_pipeline(self.process)?;
        Ok(())
    }

    /// Persist `stage` as the status and notify the reporter.
    pub fn begin_stage(&mut self, stage: PipelineStage, total_items: Option<usize>) -> Result<()> {
        self.set_status(stage.to_string())?;
        self.runtime.reporter.begin_stage(stage, total_items);
        Ok(())
    }

    pub fn advance(&self, items_done: usize) {
        self.runtime.reporter.advance(items_done);
    }

    pub fn finish_stage(&self) {
        self.runtime.reporter.finish_stage();
    }
}
