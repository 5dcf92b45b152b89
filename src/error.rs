//! Error types for archive operations

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Archive operation result type
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Archive operation errors
///
/// Every variant is fatal for the operation that produced it. Nothing in this
/// crate retries; retry policy belongs to the caller.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Output directory or one of the archive files could not be opened
    #[error("Session '{session}': failed to open {path:?} for writing: {source}")]
    Configuration {
        session: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Configuration values are unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Fixed index or binary header could not be written
    #[error("Session '{session}': failed while writing header to {path:?}: {source}")]
    HeaderWrite {
        session: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Image field requested for a format version that has no image encoding
    #[error("Unsupported data format version: {0}")]
    UnsupportedVersion(i64),

    /// Image view is malformed or cannot be copied
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Image compression failed
    #[error("Image compression failed: {0}")]
    Compression(String),

    /// Frame record fields cannot be encoded
    #[error("Invalid frame record: {0}")]
    InvalidRecord(String),

    /// I/O failure while appending a frame
    #[error("Write to {path:?} failed: {source}")]
    RuntimeWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Write attempted after `close()`
    #[error("Archive session is closed")]
    SessionClosed,

    /// Write attempted after an earlier fatal failure
    #[error("Archive session stopped after a previous failure")]
    SessionPoisoned,

    /// I/O error while reading an archive
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Binary content does not match the record layout
    #[error("Corrupt archive: {0}")]
    Corrupt(String),

    /// Index file does not match the index grammar
    #[error("Invalid index at line {line}: {reason}")]
    InvalidIndex { line: usize, reason: String },
}

impl ArchiveError {
    /// True for the errors raised while turning a frame into bytes
    pub fn is_encoding(&self) -> bool {
        matches!(
            self,
            ArchiveError::UnsupportedVersion(_)
                | ArchiveError::InvalidImage(_)
                | ArchiveError::Compression(_)
                | ArchiveError::InvalidRecord(_)
        )
    }

    /// True for errors raised by `ArchiveSession::open`
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ArchiveError::Configuration { .. }
                | ArchiveError::InvalidConfig(_)
                | ArchiveError::ConfigParse(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_grouping() {
        assert!(ArchiveError::UnsupportedVersion(7).is_encoding());
        assert!(ArchiveError::Compression("boom".into()).is_encoding());
        assert!(!ArchiveError::SessionClosed.is_encoding());
        assert!(ArchiveError::InvalidConfig("x".into()).is_configuration());
    }

    #[test]
    fn test_configuration_error_names_path_and_session() {
        let err = ArchiveError::Configuration {
            session: "run1".into(),
            path: PathBuf::from("/nope/run1.index"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("run1"));
        assert!(msg.contains("/nope/run1.index"));
    }
}
