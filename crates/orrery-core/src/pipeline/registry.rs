use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::Settings;
use crate::error::{InvalidPipelineError, RegistryError};
use crate::timelapse::{TimelapsePipeline, TIMELAPSE_CLASS_PATH};

use super::flags::{validate_flags, FlagSchema};
use super::Pipeline;

/// Class path of the plain process record, which is not a pipeline.
pub const ASYNC_PROCESS_CLASS_PATH: &str = "orrery_core::process::AsyncProcess";

/// Something a class path can refer to.
#[derive(Clone)]
pub enum Exported {
    Pipeline(Arc<dyn Pipeline>),
    /// A process class that does not run a pipeline.
    Process,
    /// A name that is not a class at all.
    Function,
}

/// Every class path that configuration may refer to.
#[derive(Clone, Default)]
pub struct Catalogue {
    entries: BTreeMap<String, Exported>,
}

impl Catalogue {
    /// Empty catalogue; see [`Catalogue::builtin`] for the shipped classes.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut catalogue = Self::new();
        catalogue.register(
            TIMELAPSE_CLASS_PATH,
            Exported::Pipeline(Arc::new(TimelapsePipeline)),
        );
        catalogue.register(ASYNC_PROCESS_CLASS_PATH, Exported::Process);
        catalogue.register("orrery_core::queue::send_task", Exported::Function);
        catalogue
    }

    pub fn register(&mut self, path: impl Into<String>, item: Exported) {
        self.entries.insert(path.into(), item);
    }

    pub fn register_pipeline(&mut self, path: impl Into<String>, pipeline: Arc<dyn Pipeline>) {
        self.register(path, Exported::Pipeline(pipeline));
    }

    fn import(&self, path: &str) -> Result<&Exported, InvalidPipelineError> {
        self.entries
            .get(path)
            .ok_or_else(|| InvalidPipelineError::Import {
                path: path.to_string(),
            })
    }
}

/// A configured pipeline that passed validation.
#[derive(Clone)]
pub struct ResolvedPipeline {
    /// Configured short name.
    pub name: String,
    pub class_path: String,
    pub pipeline: Arc<dyn Pipeline>,
    pub flags: Option<FlagSchema>,
}

impl std::fmt::Debug for ResolvedPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedPipeline")
            .field("name", &self.name)
            .field("class_path", &self.class_path)
            .field("flags", &self.flags)
            .finish()
    }
}

/// Maps configured pipeline names to their classes.
pub struct Registry {
    available: BTreeMap<String, String>,
    catalogue: Catalogue,
}

impl Registry {
    pub fn new(settings: &Settings, catalogue: Catalogue) -> Self {
        Self {
            available: settings.pipelines.clone(),
            catalogue,
        }
    }

    /// Configured pipeline names, sorted.
    pub fn get_available(&self) -> Vec<&str> {
        self.available.keys().map(String::as_str).collect()
    }

    /// Look up and validate the pipeline configured under `name`.
    pub fn get_subclass(&self, name: &str) -> Result<ResolvedPipeline, RegistryError> {
        let path = self
            .available
            .get(name)
            .ok_or_else(|| RegistryError::UnknownPipeline(name.to_string()))?;

        let pipeline = match self.catalogue.import(path)? {
            Exported::Pipeline(pipeline) => Arc::clone(pipeline),
            Exported::Process | Exported::Function => {
                return Err(InvalidPipelineError::NotAPipeline(path.clone()).into());
            }
        };

        let flags = validate_flags(pipeline.flags().as_ref()).map_err(|source| {
            InvalidPipelineError::InvalidFlags {
                class: path.clone(),
                source,
            }
        })?;
        debug!(name, class = %path, "Resolved pipeline");

        Ok(ResolvedPipeline {
            name: name.to_string(),
            class_path: path.clone(),
            pipeline,
            flags,
        })
    }

    /// Resolve every configured pipeline, failing on the first bad entry.
    pub fn validate_all(&self) -> Result<Vec<ResolvedPipeline>, RegistryError> {
        self.available
            .keys()
            .map(|name| self.get_subclass(name))
            .collect()
    }
}
