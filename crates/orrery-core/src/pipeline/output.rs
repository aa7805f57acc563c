use std::path::{Path, PathBuf};

/// How a produced file is stored once a run finishes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputKind {
    /// A standalone data product owned by the target.
    DataProduct,
    /// A time-series measurement whose value is the file's text.
    ReducedDatum,
    /// Anything else; rejected at materialisation time.
    Other(String),
}

impl From<&str> for OutputKind {
    fn from(s: &str) -> Self {
        match s {
            "data_product" | "DataProduct" => Self::DataProduct,
            "reduced_datum" | "ReducedDatum" => Self::ReducedDatum,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DataProduct => write!(f, "data_product"),
            Self::ReducedDatum => write!(f, "reduced_datum"),
            Self::Other(name) => write!(f, "{name}"),
        }
    }
}

/// A file left in the workspace by a pipeline, plus how to store it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputDescriptor {
    pub path: PathBuf,
    pub output_type: OutputKind,
    pub classification: Option<String>,
}

impl OutputDescriptor {
    pub fn new(path: impl Into<PathBuf>, output_type: OutputKind) -> Self {
        Self {
            path: path.into(),
            output_type,
            classification: None,
        }
    }

    pub fn with_classification(mut self, tag: impl Into<String>) -> Self {
        self.classification = Some(tag.into());
        self
    }

    /// Final path component, used to name the stored entity.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl From<(PathBuf, OutputKind)> for OutputDescriptor {
    fn from((path, output_type): (PathBuf, OutputKind)) -> Self {
        Self::new(path, output_type)
    }
}

impl From<(PathBuf, OutputKind, &str)> for OutputDescriptor {
    fn from((path, output_type, tag): (PathBuf, OutputKind, &str)) -> Self {
        let descriptor = Self::new(path, output_type);
        if tag.is_empty() {
            descriptor
        } else {
            descriptor.with_classification(tag)
        }
    }
}

impl From<(&Path, &str, &str)> for OutputDescriptor {
    fn from((path, output_type, tag): (&Path, &str, &str)) -> Self {
        Self::from((path.to_path_buf(), OutputKind::from(output_type), tag))
    }
}
