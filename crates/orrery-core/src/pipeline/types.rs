/// Coarse step of a pipeline run.
///
/// The display string doubles as the transient process status written while
/// the step is running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    SortingFrames,
    ProcessingFrames,
    Encoding,
    SavingOutputs,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SortingFrames => write!(f, "Sorting frames"),
            Self::ProcessingFrames => write!(f, "Processing frames"),
            Self::Encoding => write!(f, "Encoding timelapse"),
            Self::SavingOutputs => write!(f, "Saving outputs"),
        }
    }
}

/// Thread-safe progress reporting for pipeline runs.
///
/// Implementors can use this to drive progress bars, logging, or any other
/// UI feedback. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new stage has started. `total_items` is the number of work items in
    /// this stage (e.g., frame count), if known.
    fn begin_stage(&self, _stage: PipelineStage, _total_items: Option<usize>) {}

    /// One work item within the current stage has completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// Reporter that ignores every event.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}
