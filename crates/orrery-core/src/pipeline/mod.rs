//! Pipeline processes: validated runs of a [`Pipeline`] over stored data
//! products, with outputs saved back to the store.

mod context;
mod flags;
mod output;
mod process;
mod registry;
mod types;

use std::path::Path;

use serde_json::Value;

use crate::error::Result;

pub use context::{RunContext, Runtime};
pub use flags::{validate_flags, FlagSchema, FlagSpec, Flags};
pub use output::{OutputDescriptor, OutputKind};
pub use process::{check_suffix, NewPipelineProcess, PipelineProcess};
pub use registry::{Catalogue, Exported, Registry, ResolvedPipeline, ASYNC_PROCESS_CLASS_PATH};
pub use types::{NoOpReporter, PipelineStage, ProgressReporter};

/// A kind of processing that can be run by a [`PipelineProcess`].
pub trait Pipeline: Send + Sync {
    /// Prefix of generated process identifiers.
    fn short_name(&self) -> &str {
        "pipeline"
    }

    /// Declared options, as a JSON mapping of
    /// `name -> {"default": .., "long_name": ..}`. See [`validate_flags`].
    fn flags(&self) -> Option<Value> {
        None
    }

    /// Filename suffixes every input must end with, if restricted.
    fn allowed_suffixes(&self) -> Option<Vec<String>> {
        None
    }

    /// Do the actual work inside `workspace` and describe the files to keep.
    ///
    /// Should return a [`ProcessError`](crate::error::ProcessError) for
    /// failures the user can act on.
    fn do_pipeline(
        &self,
        ctx: &mut RunContext<'_>,
        workspace: &Path,
        flags: &Flags,
    ) -> Result<Vec<OutputDescriptor>>;
}
