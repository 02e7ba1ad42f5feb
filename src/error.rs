//! Poster error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a posting run
///
/// Connection loss is not represented here: a disconnected connection is
/// recovered by the reconnect supervisor and never fails the run on its own.
#[derive(Error, Debug)]
pub enum PostError {
    /// IO error outside of a specific source file (e.g. resolving an absolute path)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Source directory is missing or unreadable
    #[error("Cannot read directory {}: {source}", path.display())]
    Directory {
        /// Directory as given by the caller
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Reading an article chunk from a source file failed
    #[error("Cannot read {}: {source}", path.display())]
    FileRead {
        /// Source file path
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Source file returned fewer bytes than scheduled (it shrank or was replaced)
    #[error("Source file {} changed during posting: expected {expected} bytes, read {actual}", path.display())]
    SourceChanged {
        /// Source file path
        path: PathBuf,
        /// Bytes the part should contain
        expected: u64,
        /// Bytes actually read
        actual: u64,
    },

    /// A part was built while the file's read cursor was at another offset
    #[error("Part {part} of {} built out of order (read cursor at byte {offset})", path.display())]
    PartOutOfOrder {
        /// Source file path
        path: PathBuf,
        /// Part number being built
        part: u64,
        /// Current read offset of the open handle
        offset: u64,
    },

    /// Invalid poster configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Every connection was abandoned while articles were still queued
    #[error("All connections lost with {remaining} articles still queued")]
    AllConnectionsLost {
        /// Articles left in the queue
        remaining: usize,
    },
}

/// Result type alias using PostError
pub type Result<T> = std::result::Result<T, PostError>;
