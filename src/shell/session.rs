//! Individual shell session
//!
//! Owns one interactive shell running in a PTY for the lifetime of a terminal
//! connection.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::files::to_api_path;
use crate::pty::{ProcessExit, PtyError, PtyOutput, PtyProcess, TerminalSize};
use crate::server::{ProcessState, SessionInfo, DEFAULT_TERMINAL_COLS, DEFAULT_TERMINAL_ROWS};

/// Errors that can occur during shell session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to start shell: {0}")]
    SpawnFailed(String),

    #[error("Shell not running")]
    NotRunning,

    #[error("PTY error: {0}")]
    PtyError(#[from] PtyError),

    #[error("Invalid working directory: {0}")]
    InvalidPath(String),
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Configuration for spawning a shell
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Shell program
    pub program: String,
    /// Shell arguments
    pub args: Vec<String>,
    /// Working directory
    pub cwd: PathBuf,
    /// Terminal columns
    pub cols: u16,
    /// Terminal rows
    pub rows: u16,
}

impl ShellConfig {
    /// Create a new shell config with default terminal size
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            cols: DEFAULT_TERMINAL_COLS,
            rows: DEFAULT_TERMINAL_ROWS,
        }
    }

    /// Set shell arguments
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Set terminal dimensions
    pub fn with_size(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }
}

/// A live shell bound to one terminal connection
pub struct ShellSession {
    /// Client supplied identifier
    id: String,
    /// Identifies the connection that owns this session
    connection_id: Uuid,
    /// Shell program
    program: String,
    /// Working directory the shell started in
    cwd: PathBuf,
    /// Seconds since the Unix epoch when the shell started
    opened_at: u64,
    /// Set once a close has been requested
    closing: AtomicBool,
    /// The shell process
    process: PtyProcess,
}

impl ShellSession {
    /// Spawn a shell for the given session id
    ///
    /// Returns the session and its output stream; the stream ends when the
    /// shell exits or is killed.
    pub fn spawn(
        id: impl Into<String>,
        config: ShellConfig,
    ) -> SessionResult<(Self, mpsc::Receiver<PtyOutput>)> {
        validate_cwd(&config.cwd)?;

        let size = TerminalSize::new(config.cols, config.rows);
        let (process, output_rx) =
            PtyProcess::spawn(&config.program, &config.args, &config.cwd, size)
                .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        let opened_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Ok((
            Self {
                id: id.into(),
                connection_id: Uuid::new_v4(),
                program: config.program,
                cwd: config.cwd,
                opened_at,
                closing: AtomicBool::new(false),
                process,
            },
            output_rx,
        ))
    }

    /// Get the session ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the owning connection's ID
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Get the working directory
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Get the current state
    pub fn state(&self) -> ProcessState {
        if self.process.has_exited() {
            ProcessState::Stopped
        } else if self.closing.load(Ordering::SeqCst) {
            ProcessState::Stopping
        } else {
            ProcessState::Running
        }
    }

    /// Check if the shell is running
    pub fn is_running(&self) -> bool {
        self.state() == ProcessState::Running
    }

    /// Write raw input to the shell
    pub async fn write_input(&self, input: &[u8]) -> SessionResult<()> {
        if !self.is_running() {
            return Err(SessionError::NotRunning);
        }
        self.process.write(input).await?;
        Ok(())
    }

    /// Resize the terminal
    pub async fn resize(&self, cols: u16, rows: u16) -> SessionResult<()> {
        if !self.is_running() {
            return Err(SessionError::NotRunning);
        }
        self.process.resize(cols, rows).await?;
        Ok(())
    }

    /// Kill the shell
    pub fn close(&self) -> SessionResult<()> {
        self.closing.store(true, Ordering::SeqCst);
        self.process.kill()?;
        Ok(())
    }

    /// Get exit information if the shell has exited
    pub fn exit_info(&self) -> Option<ProcessExit> {
        self.process.exit_info()
    }

    /// Describe the session for listings
    pub async fn info(&self) -> SessionInfo {
        let size = self.process.size().await;
        SessionInfo {
            session_id: self.id().to_string(),
            shell: self.program.clone(),
            cwd: to_api_path(&self.cwd),
            pid: self.process.pid(),
            status: self.state(),
            cols: size.cols,
            rows: size.rows,
            opened_at: self.opened_at,
        }
    }
}

fn validate_cwd(cwd: &Path) -> SessionResult<()> {
    if !cwd.exists() {
        return Err(SessionError::InvalidPath(format!(
            "Working directory does not exist: {}",
            cwd.display()
        )));
    }
    if !cwd.is_dir() {
        return Err(SessionError::InvalidPath(format!(
            "Working directory is not a directory: {}",
            cwd.display()
        )));
    }
    Ok(())
}
