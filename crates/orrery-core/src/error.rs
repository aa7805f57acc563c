use thiserror::Error;

use crate::process::ProcessId;

/// An expected failure inside a process run.
///
/// The message is copied verbatim into the process's `failure_message`, so it
/// must be suitable for showing to users.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ProcessError(pub String);

impl ProcessError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Problems with a declared flags schema.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlagsError {
    #[error("flags must be a mapping")]
    NotAMapping,

    #[error("flag name '{0}' is empty or contains whitespace")]
    InvalidName(String),

    #[error("flag '{0}' must be described by a mapping")]
    NotADescription(String),

    #[error("flag '{name}' is missing the '{key}' key")]
    MissingKey { name: String, key: &'static str },

    #[error("flag '{0}' has a non-string long_name")]
    InvalidLongName(String),

    #[error("unknown flag '{0}'")]
    UnknownFlag(String),
}

/// A configured pipeline entry that cannot be used.
#[derive(Error, Debug)]
pub enum InvalidPipelineError {
    #[error("cannot import '{path}': no such class")]
    Import { path: String },

    #[error("{0} does not look like a PipelineProcess sub-class")]
    NotAPipeline(String),

    #[error("Invalid 'flags' attribute in {class}: {source}")]
    InvalidFlags {
        class: String,
        #[source]
        source: FlagsError,
    },
}

/// Errors from looking a pipeline up by its short name.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid pipeline name '{0}'")]
    UnknownPipeline(String),

    #[error(transparent)]
    Invalid(#[from] InvalidPipelineError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{kind} {id} does not exist")]
    NotFound { kind: &'static str, id: u64 },

    #[error("a process with identifier '{0}' already exists")]
    DuplicateIdentifier(String),

    #[error("process {id} is already '{from}' and cannot become '{to}'")]
    TerminalState {
        id: ProcessId,
        from: String,
        to: String,
    },
}

/// A per-frame image transform that cannot be applied.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("image is empty")]
    Empty,

    #[error("image has no finite pixels")]
    NoFinitePixels,

    #[error("crop scale {scale} leaves nothing of a {width}x{height} image")]
    EmptyCrop {
        width: usize,
        height: usize,
        scale: f64,
    },
}

/// Failure to hand a job to the queue transport.
#[derive(Error, Debug)]
#[error("job queue unavailable: {0}")]
pub struct QueueError(pub String);

#[derive(Error, Debug)]
pub enum OrreryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("Invalid FITS file: {0}")]
    InvalidFits(String),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Invalid flags: {0}")]
    Flags(#[from] FlagsError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Encoder error: {0}")]
    Encoder(String),
}

pub type Result<T> = std::result::Result<T, OrreryError>;
