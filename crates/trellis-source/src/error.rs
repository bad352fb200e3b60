//! Error types for content sources.

use std::io;
use std::path::PathBuf;

/// Errors that can occur while reading or watching template content.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Nothing is registered under the requested name.
    #[error("template not found: {name}")]
    NotFound { name: String },

    /// Reading the backing file failed.
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The watcher could not be created, or could not watch a path.
    #[error("watch error: {0}")]
    Watch(String),

    /// The source was closed and no longer serves content.
    #[error("content source is closed")]
    Closed,
}

impl SourceError {
    /// Create an I/O error for the given path.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true when the error means the content does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            SourceError::NotFound { .. } => true,
            SourceError::Io { source, .. } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<notify::Error> for SourceError {
    fn from(err: notify::Error) -> Self {
        SourceError::Watch(err.to_string())
    }
}
