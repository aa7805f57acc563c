//! Deferred execution of processes through a job queue.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::consts::{SUBMIT_FAILED_MESSAGE, UNEXPECTED_ERROR_MESSAGE, WORKER_LOST_MESSAGE};
use crate::error::{OrreryError, QueueError, Result, StoreError};
use crate::pipeline::{Pipeline, PipelineProcess, Registry, Runtime};
use crate::process::{AsyncProcess, ProcessId, Status};
use crate::store::Store;

/// Work a queued job performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Task {
    /// Args: `[pipeline short name]`.
    RunPipeline,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub task: Task,
    pub process_id: ProcessId,
    pub args: Vec<String>,
}

/// Transport that delivers jobs to a worker, possibly in another process.
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, job: Job) -> std::result::Result<(), QueueError>;
}

/// Queue `task` for `process`.
///
/// A transport failure is not returned to the caller: the process is marked
/// failed and saved instead, so it never sits in `pending` forever. The only
/// error returned is a failure to save that state.
pub fn send_task(
    queue: &dyn JobQueue,
    store: &dyn Store,
    task: Task,
    process: &mut AsyncProcess,
    args: &[&str],
) -> std::result::Result<(), StoreError> {
    let job = Job {
        task,
        process_id: process.id,
        args: args.iter().map(|a| a.to_string()).collect(),
    };
    match queue.enqueue(job) {
        Ok(()) => {
            info!(identifier = %process.identifier, ?task, "Submitted job");
            Ok(())
        }
        Err(e) => {
            error!(identifier = %process.identifier, error = %e, "Failed to submit job");
            process.mark_failed(SUBMIT_FAILED_MESSAGE);
            store.save_process(process)
        }
    }
}

/// Run a pipeline process to a terminal state.
///
/// A [`ProcessError`](crate::error::ProcessError) becomes the failure
/// message as-is; anything else, a panic included, is logged and replaced
/// with a generic message.
pub fn run_process(
    process: &mut PipelineProcess,
    pipeline: &dyn Pipeline,
    runtime: &Runtime,
) -> Status {
    let store = runtime.store.as_ref();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| process.run(pipeline, runtime)));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(OrreryError::Process(e))) => {
            warn!(identifier = %process.process.identifier, error = %e, "Pipeline failed");
            process.process.mark_failed(e.message());
            save_failure(process, store);
        }
        Ok(Err(e)) => {
            error!(identifier = %process.process.identifier, error = %e, "Unexpected pipeline error");
            process.process.mark_failed(UNEXPECTED_ERROR_MESSAGE);
            save_failure(process, store);
        }
        Err(payload) => {
            error!(
                identifier = %process.process.identifier,
                panic = panic_message(payload.as_ref()),
                "Pipeline panicked"
            );
            process.process.mark_failed(UNEXPECTED_ERROR_MESSAGE);
            save_failure(process, store);
        }
    }
    process.process.status.clone()
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn save_failure(process: &mut PipelineProcess, store: &dyn Store) {
    if let Err(e) = store.save_pipeline(process) {
        error!(identifier = %process.process.identifier, error = %e, "Failed to record failure");
    }
}

/// Executes jobs against a store using the configured pipelines.
#[derive(Clone)]
pub struct Worker {
    runtime: Runtime,
    registry: Arc<Registry>,
}

impl Worker {
    pub fn new(runtime: Runtime, registry: Arc<Registry>) -> Self {
        Self { runtime, registry }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Load the job's process and run it. Only lookup failures that leave no
    /// record to update are returned as errors.
    pub fn execute(&self, job: &Job) -> Result<Status> {
        match job.task {
            Task::RunPipeline => {
                let store = self.runtime.store.as_ref();
                let mut process = store.get_pipeline(job.process_id)?;
                if process.process.is_terminal() {
                    warn!(identifier = %process.process.identifier, "Skipping job for finished process");
                    return Ok(process.process.status);
                }
                let name = job
                    .args
                    .first()
                    .cloned()
                    .unwrap_or_else(|| process.pipeline.clone());
                let resolved = match self.registry.get_subclass(&name) {
                    Ok(resolved) => resolved,
                    Err(e) => {
                        error!(identifier = %process.process.identifier, error = %e, "Cannot resolve pipeline");
                        process.process.mark_failed(UNEXPECTED_ERROR_MESSAGE);
                        store.save_pipeline(&mut process)?;
                        return Ok(Status::Failed);
                    }
                };
                Ok(run_process(
                    &mut process,
                    resolved.pipeline.as_ref(),
                    &self.runtime,
                ))
            }
        }
    }
}

/// Runs each job immediately on the submitting thread.
pub struct InlineQueue {
    worker: Worker,
}

impl InlineQueue {
    pub fn new(worker: Worker) -> Self {
        Self { worker }
    }
}

impl JobQueue for InlineQueue {
    fn enqueue(&self, job: Job) -> std::result::Result<(), QueueError> {
        if let Err(e) = self.worker.execute(&job) {
            error!(process = %job.process_id, error = %e, "Job failed");
        }
        Ok(())
    }
}

/// Runs jobs one at a time on a dedicated worker thread.
pub struct ThreadQueue {
    tx: Mutex<Option<mpsc::Sender<Job>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadQueue {
    pub fn spawn(worker: Worker) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Job>();
        let handle = std::thread::Builder::new()
            .name("orrery-worker".into())
            .spawn(move || {
                for job in rx {
                    if let Err(e) = worker.execute(&job) {
                        error!(process = %job.process_id, error = %e, "Job failed");
                    }
                }
            })?;
        Ok(Self {
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Stop accepting jobs and wait for queued ones to finish.
    pub fn shutdown(&self) {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Worker thread panicked");
            }
        }
    }
}

impl JobQueue for ThreadQueue {
    fn enqueue(&self, job: Job) -> std::result::Result<(), QueueError> {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let tx = guard
            .as_ref()
            .ok_or_else(|| QueueError("worker has shut down".into()))?;
        tx.send(job)
            .map_err(|_| QueueError("worker thread has exited".into()))
    }
}

impl Drop for ThreadQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Fail every non-terminal process that has not been saved for `lease`.
///
/// Runs are synchronous and write their status as they go, so a record that
/// stays quiet past the lease belongs to a worker that died mid-run.
pub fn reap_orphans(
    store: &dyn Store,
    lease: Duration,
    now: DateTime<Utc>,
) -> std::result::Result<Vec<ProcessId>, StoreError> {
    let mut reaped = Vec::new();
    for mut process in store.processes() {
        if process.is_terminal() || now - process.last_update < lease {
            continue;
        }
        warn!(identifier = %process.identifier, status = %process.status, "Reaping orphaned process");
        process.mark_failed(WORKER_LOST_MESSAGE);
        store.save_process(&mut process)?;
        reaped.push(process.id);
    }
    Ok(reaped)
}
