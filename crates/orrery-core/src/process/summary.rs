use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pipeline::PipelineProcess;
use crate::store::Store;

use super::AsyncProcess;

/// Status view of a process for API consumers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProcessSummary {
    pub identifier: String,
    /// Seconds since the Unix epoch.
    pub created: f64,
    pub status: String,
    pub terminal_timestamp: Option<f64>,
    pub failure_message: Option<String>,
}

impl From<&AsyncProcess> for ProcessSummary {
    fn from(process: &AsyncProcess) -> Self {
        Self {
            identifier: process.identifier.clone(),
            created: epoch_seconds(process.created),
            status: process.status.to_string(),
            terminal_timestamp: process.terminal_timestamp.map(epoch_seconds),
            failure_message: (!process.failure_message.is_empty())
                .then(|| process.failure_message.clone()),
        }
    }
}

/// [`ProcessSummary`] plus the pipeline-specific fields.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PipelineSummary {
    #[serde(flatten)]
    pub process: ProcessSummary,
    pub logs: String,
    pub group_name: Option<String>,
}

impl PipelineSummary {
    pub fn new(pipeline: &PipelineProcess, store: &dyn Store) -> Self {
        let group_name = pipeline
            .group
            .and_then(|id| store.get_group(id).ok())
            .map(|g| g.name);
        Self {
            process: ProcessSummary::from(&pipeline.process),
            logs: pipeline.logs.clone(),
            group_name,
        }
    }
}

fn epoch_seconds(dt: DateTime<Utc>) -> f64 {
    dt.timestamp_micros() as f64 / 1_000_000.0
}
