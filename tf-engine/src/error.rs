//! Error types for the extraction/injection pipeline.

use std::fmt;
use std::path::PathBuf;

/// Errors that abort a pipeline run.
///
/// Recoverable conditions (missing blocks, unknown styles, a cleanup pass
/// that hits its iteration budget) are reported on stderr via `log::warn!`
/// and never surface here; anything that would leave the persisted state
/// inconsistent does.
#[derive(Debug)]
pub enum Error {
    /// The input file could not be read.
    InputMissing(String),
    /// The work directory could not be created or written.
    WorkDirUnavailable(String),
    /// Format auto-detection failed and no `--format` was given.
    FormatUnknown(String),
    /// The input document failed to parse.
    ParseMalformed(String),
    /// The state store failed.
    Store(rusqlite::Error),
    /// An existing state store did not match the expected schema.
    StoreCorrupt(String),
    /// The stream dialect could not be detected on inject.
    StreamFormatUnknown,
    /// The work directory lacks the expected state files.
    StateMissing(PathBuf),
    /// The rehydrated document failed to reparse after injection.
    RehydratedMalformed(String),
    /// An archive payload could not be read or repacked.
    Archive(String),
    /// The post-inject hook failed.
    Hook(String),
    /// Underlying I/O failure.
    Io(std::io::Error),
}

/// Pipeline result alias.
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InputMissing(p) => write!(f, "Could not read input {p}"),
            Error::WorkDirUnavailable(msg) => {
                write!(f, "Could not create or write state folder: {msg}")
            }
            Error::FormatUnknown(p) => {
                write!(f, "Could not auto-detect input file format for {p}")
            }
            Error::ParseMalformed(msg) => write!(f, "Could not parse document: {msg}"),
            Error::Store(e) => write!(f, "State store error: {e}"),
            Error::StoreCorrupt(msg) => write!(f, "State store schema mismatch: {msg}"),
            Error::StreamFormatUnknown => write!(f, "Could not detect input stream format"),
            Error::StateMissing(dir) => write!(
                f,
                "Folder {} did not have the expected state files",
                dir.display()
            ),
            Error::RehydratedMalformed(msg) => {
                write!(f, "Could not parse rehydrated XML: {msg}")
            }
            Error::Archive(msg) => write!(f, "Archive error: {msg}"),
            Error::Hook(msg) => write!(f, "Inject hook failed: {msg}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Store(e)
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        Error::Archive(e.to_string())
    }
}
