//! Filesystem service
//!
//! Directory listing, text file read/write, mkdir and delete against the host
//! filesystem, optionally confined to a single root directory.

mod explorer;
mod path;

pub use explorer::*;
pub use path::*;

use thiserror::Error;

/// Errors returned by filesystem operations
///
/// Messages are user-facing; the HTTP layer forwards them as-is.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("Empty path is only valid for listing roots")]
    EmptyPath,

    #[error("{}", INVALID_PATH_MESSAGE)]
    InvalidPath,

    #[error("Not found")]
    NotFound,

    #[error("Not a directory")]
    NotADirectory,

    #[error("Not a file")]
    NotAFile,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Directory not empty (or in use)")]
    DirectoryNotEmpty,

    #[error("Path is outside the allowed root")]
    OutsideRoot,

    #[error("I/O error: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for FsError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => FsError::NotFound,
            std::io::ErrorKind::PermissionDenied => FsError::PermissionDenied,
            _ => FsError::Io(err),
        }
    }
}

/// Result type for filesystem operations
pub type FsResult<T> = Result<T, FsError>;
