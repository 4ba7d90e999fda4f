//! Error types for the opcost-model crate.

use std::backtrace::Backtrace;
use std::fmt;
use std::path::{Path, PathBuf};

/// Error type for training, artifact persistence and estimation.
///
/// Uses the canonical struct pattern with backtrace capture and `is_xxx()`
/// helper methods.
///
/// Why: training and inference share artifacts and inputs, so one error
/// type lets the CLI report either phase without matching on internals.
#[derive(Debug)]
pub struct ModelError {
    kind: ModelErrorKind,
    backtrace: Backtrace,
}

/// Internal error variants. Not exposed publicly; use `is_xxx()` methods.
///
/// Why: keeps the public API stable while allowing precise categorization
/// for diagnostics and tests.
#[derive(Debug)]
pub(crate) enum ModelErrorKind {
    /// A required input path does not exist.
    MissingFile(PathBuf),
    /// No block with a positive cycle cost was found in the training data.
    EmptyTrainingSet,
    /// A model artifact is missing from the model directory.
    ModelNotFound(PathBuf),
    /// An input document is unparseable or lacks a required field.
    MalformedInput {
        path: Option<PathBuf>,
        reason: String,
    },
    /// Training options are out of range.
    InvalidConfig(String),
    /// An artifact parsed but is inconsistent with the others.
    InvalidArtifact {
        path: Option<PathBuf>,
        reason: String,
    },
    /// Failed to serialize an artifact to JSON.
    Serialization(serde_json::Error),
    /// Failed to deserialize an artifact from JSON.
    Deserialization {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// Failed to render the cluster plot.
    Render(askama::Error),
    /// I/O error when reading input or writing artifacts.
    Io(std::io::Error),
}

impl ModelError {
    /// Creates an error from an error kind, capturing a backtrace.
    ///
    /// Why: ensures every error instance carries a backtrace for diagnostics.
    pub(crate) fn new(kind: ModelErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    pub(crate) fn missing_file(path: &Path) -> Self {
        Self::new(ModelErrorKind::MissingFile(path.to_path_buf()))
    }

    pub(crate) fn malformed(
        path: Option<&Path>,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(ModelErrorKind::MalformedInput {
            path: path.map(Path::to_path_buf),
            reason: reason.into(),
        })
    }

    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        Self::new(ModelErrorKind::InvalidConfig(reason.into()))
    }

    pub(crate) fn invalid_artifact(
        path: Option<&Path>,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(ModelErrorKind::InvalidArtifact {
            path: path.map(Path::to_path_buf),
            reason: reason.into(),
        })
    }

    /// Attaches the document path to a malformed-input error that was
    /// raised before the path was known.
    pub(crate) fn in_document(mut self, document: &Path) -> Self {
        if let ModelErrorKind::MalformedInput { path, .. } = &mut self.kind
            && path.is_none()
        {
            *path = Some(document.to_path_buf());
        }
        self
    }

    /// Returns true if a required input path does not exist.
    ///
    /// Why: callers distinguish a typo in a path from a bad document.
    pub fn is_missing_file(&self) -> bool {
        matches!(self.kind, ModelErrorKind::MissingFile(_))
    }

    /// Returns true if training found no usable examples.
    pub fn is_empty_training_set(&self) -> bool {
        matches!(self.kind, ModelErrorKind::EmptyTrainingSet)
    }

    /// Returns true if a model artifact is missing.
    ///
    /// Why: the CLI suggests running `train` first in this case.
    pub fn is_model_not_found(&self) -> bool {
        matches!(self.kind, ModelErrorKind::ModelNotFound(_))
    }

    /// Returns true if an input document is malformed.
    ///
    /// Why: batch estimation skips such documents instead of aborting.
    pub fn is_malformed_input(&self) -> bool {
        matches!(self.kind, ModelErrorKind::MalformedInput { .. })
    }

    /// Returns true if the training options were rejected.
    pub fn is_invalid_config(&self) -> bool {
        matches!(self.kind, ModelErrorKind::InvalidConfig(_))
    }

    /// Returns true if the stored artifacts are inconsistent.
    pub fn is_invalid_artifact(&self) -> bool {
        matches!(self.kind, ModelErrorKind::InvalidArtifact { .. })
    }

    /// Returns true if this error is due to serialization failure.
    pub fn is_serialization(&self) -> bool {
        matches!(self.kind, ModelErrorKind::Serialization(_))
    }

    /// Returns true if this error is due to deserialization failure.
    pub fn is_deserialization(&self) -> bool {
        matches!(self.kind, ModelErrorKind::Deserialization { .. })
    }

    /// Returns true if rendering the cluster plot failed.
    pub fn is_render(&self) -> bool {
        matches!(self.kind, ModelErrorKind::Render(_))
    }

    /// Returns true if this error is due to I/O failure.
    ///
    /// Why: separates transport failures from schema/logic errors.
    pub fn is_io(&self) -> bool {
        matches!(self.kind, ModelErrorKind::Io(_))
    }

    /// Returns the file the error is about, when one is known.
    pub fn path(&self) -> Option<&Path> {
        match &self.kind {
            ModelErrorKind::MissingFile(path)
            | ModelErrorKind::ModelNotFound(path)
            | ModelErrorKind::Deserialization { path, .. } => Some(path),
            ModelErrorKind::MalformedInput { path, .. }
            | ModelErrorKind::InvalidArtifact { path, .. } => path.as_deref(),
            _ => None,
        }
    }

    /// Returns the backtrace captured when this error was created.
    ///
    /// Why: preserves context when errors are surfaced to the CLI or logs.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Display for ModelErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelErrorKind::MissingFile(path) => {
                write!(f, "file not found: {}", path.display())
            }
            ModelErrorKind::EmptyTrainingSet => {
                write!(f, "no basic block with a positive cycle cost to train on")
            }
            ModelErrorKind::ModelNotFound(path) => {
                write!(f, "model artifact not found: {}", path.display())
            }
            ModelErrorKind::MalformedInput { path, reason } => match path {
                Some(path) => {
                    write!(f, "malformed input {}: {reason}", path.display())
                }
                None => write!(f, "malformed input: {reason}"),
            },
            ModelErrorKind::InvalidConfig(reason) => {
                write!(f, "invalid training options: {reason}")
            }
            ModelErrorKind::InvalidArtifact { path, reason } => match path {
                Some(path) => {
                    write!(f, "invalid artifact {}: {reason}", path.display())
                }
                None => write!(f, "invalid artifact: {reason}"),
            },
            ModelErrorKind::Serialization(err) => {
                write!(f, "failed to serialize artifact: {err}")
            }
            ModelErrorKind::Deserialization { path, source } => {
                write!(f, "failed to deserialize {}: {source}", path.display())
            }
            ModelErrorKind::Render(err) => {
                write!(f, "failed to render cluster plot: {err}")
            }
            ModelErrorKind::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl fmt::Display for ModelError {
    /// Formats the error with a summary and captured backtrace.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.kind)?;

        // Backtrace (will be empty unless RUST_BACKTRACE is set).
        write!(f, "{}", self.backtrace)
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ModelErrorKind::Serialization(err)
            | ModelErrorKind::Deserialization { source: err, .. } => Some(err),
            ModelErrorKind::Render(err) => Some(err),
            ModelErrorKind::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ModelError {
    /// Converts an I/O error into the structured model error type.
    ///
    /// Why: standardizes I/O errors under the same backtrace-capturing path.
    fn from(err: std::io::Error) -> Self {
        Self::new(ModelErrorKind::Io(err))
    }
}
