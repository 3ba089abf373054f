//! Process supervisor
//!
//! Keeps named console programs running in PTYs independently of any client
//! connection, with a rolling log buffer and persisted metadata.

mod log_buffer;
mod managed;
mod manager;

pub use log_buffer::*;
pub use managed::*;
pub use manager::*;

use thiserror::Error;

use crate::pty::PtyError;

/// Errors that can occur while supervising processes
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Process '{0}' is unknown")]
    NotFound(String),

    #[error("Process '{0}' already exists")]
    AlreadyExists(String),

    #[error("Invalid process definition: {0}")]
    InvalidSpec(String),

    #[error("Failed to prepare working directory: {0}")]
    WorkingDir(#[from] std::io::Error),

    #[error("Failed to start process: {0}")]
    Spawn(#[from] PtyError),
}

/// Result type for supervisor operations
pub type ProcessResult<T> = Result<T, ProcessError>;
