//! Error types for the opcost-merge crate.

use std::backtrace::Backtrace;
use std::fmt;
use std::path::{Path, PathBuf};

/// Error type for the histogram/cycle merge.
///
/// Uses the canonical struct pattern with backtrace capture and `is_xxx()`
/// helper methods.
///
/// Why: the CLI reports merge failures without depending on the internal
/// error enum.
#[derive(Debug)]
pub struct MergeError {
    kind: MergeErrorKind,
    backtrace: Backtrace,
}

/// Internal error variants. Not exposed publicly; use `is_xxx()` methods.
#[derive(Debug)]
pub(crate) enum MergeErrorKind {
    /// An input file does not exist.
    MissingFile(PathBuf),
    /// An input file is not a valid document of the expected shape.
    Deserialization {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    /// Failed to serialize the merged document.
    Serialization(serde_yaml::Error),
    /// I/O error when reading input or writing output.
    Io(std::io::Error),
}

impl MergeError {
    /// Creates an error from an error kind, capturing a backtrace.
    ///
    /// Why: ensures every error instance carries a backtrace for diagnostics.
    pub(crate) fn new(kind: MergeErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    /// Returns true if an input file does not exist.
    pub fn is_missing_file(&self) -> bool {
        matches!(self.kind, MergeErrorKind::MissingFile(_))
    }

    /// Returns true if an input file failed to parse.
    pub fn is_deserialization(&self) -> bool {
        matches!(self.kind, MergeErrorKind::Deserialization { .. })
    }

    /// Returns true if the merged document failed to serialize.
    pub fn is_serialization(&self) -> bool {
        matches!(self.kind, MergeErrorKind::Serialization(_))
    }

    /// Returns true if this error is due to I/O failure.
    ///
    /// Why: separates transport failures from schema/logic errors.
    pub fn is_io(&self) -> bool {
        matches!(self.kind, MergeErrorKind::Io(_))
    }

    /// Returns the input file the error is about, when one is known.
    pub fn path(&self) -> Option<&Path> {
        match &self.kind {
            MergeErrorKind::MissingFile(path)
            | MergeErrorKind::Deserialization { path, .. } => Some(path),
            MergeErrorKind::Serialization(_) | MergeErrorKind::Io(_) => None,
        }
    }

    /// Returns the backtrace captured when this error was created.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Display for MergeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeErrorKind::MissingFile(path) => {
                write!(f, "file {} not found", path.display())
            }
            MergeErrorKind::Deserialization { path, source } => {
                write!(f, "failed to parse {}: {source}", path.display())
            }
            MergeErrorKind::Serialization(err) => {
                write!(f, "failed to serialize merged document: {err}")
            }
            MergeErrorKind::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.kind)?;

        // Backtrace (will be empty unless RUST_BACKTRACE is set).
        write!(f, "{}", self.backtrace)
    }
}

impl std::error::Error for MergeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            MergeErrorKind::MissingFile(_) => None,
            MergeErrorKind::Deserialization { source: err, .. }
            | MergeErrorKind::Serialization(err) => Some(err),
            MergeErrorKind::Io(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for MergeError {
    fn from(err: std::io::Error) -> Self {
        Self::new(MergeErrorKind::Io(err))
    }
}
