//! Protocol message definitions
//!
//! JSON request and response bodies exchanged with the frontend, plus the
//! limits every request is validated against. Error bodies use a `detail`
//! field, which is what the frontend reads.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Maximum terminal dimensions
pub const MAX_TERMINAL_COLS: u16 = 500;
pub const MAX_TERMINAL_ROWS: u16 = 200;

/// Default terminal dimensions
pub const DEFAULT_TERMINAL_COLS: u16 = 80;
pub const DEFAULT_TERMINAL_ROWS: u16 = 24;

/// Maximum input length (1MB)
pub const MAX_INPUT_LENGTH: usize = 1024 * 1024;

/// Maximum session / process id length
pub const MAX_ID_LENGTH: usize = 128;

/// Maximum graceful stop timeout for managed processes
pub const MAX_STOP_TIMEOUT_SECS: u64 = 600;

// ============================================================================
// Error Types
// ============================================================================

/// Protocol-related errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Error codes for programmatic error handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed or out-of-range request
    InvalidRequest,
    /// Target does not exist
    NotFound,
    /// Target already exists or is busy
    Conflict,
    /// Authentication required
    AuthRequired,
    /// Authentication failed
    AuthFailed,
    /// Caller or path not allowed
    Forbidden,
    /// Failed to start a process
    SpawnFailed,
    /// Internal server error
    InternalError,
}

/// Body of every error response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    /// Human readable message
    pub detail: String,
    /// Error code for programmatic handling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

// ============================================================================
// Validation helpers
// ============================================================================

/// Validate a client supplied session or process id
pub fn validate_id(kind: &str, id: &str) -> ProtocolResult<()> {
    if id.is_empty() {
        return Err(ProtocolError::ValidationError(format!(
            "{} cannot be empty",
            kind
        )));
    }
    if id.len() > MAX_ID_LENGTH {
        return Err(ProtocolError::ValidationError(format!(
            "{} exceeds maximum length of {} characters",
            kind, MAX_ID_LENGTH
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(ProtocolError::ValidationError(format!(
            "{} may only contain letters, digits, '-', '_' and '.'",
            kind
        )));
    }
    Ok(())
}

/// Validate terminal dimensions
pub fn validate_terminal_size(cols: u16, rows: u16) -> ProtocolResult<()> {
    if cols == 0 || cols > MAX_TERMINAL_COLS {
        return Err(ProtocolError::ValidationError(format!(
            "cols must be between 1 and {}",
            MAX_TERMINAL_COLS
        )));
    }
    if rows == 0 || rows > MAX_TERMINAL_ROWS {
        return Err(ProtocolError::ValidationError(format!(
            "rows must be between 1 and {}",
            MAX_TERMINAL_ROWS
        )));
    }
    Ok(())
}

// ============================================================================
// Generic responses
// ============================================================================

/// `{"status": "..."}` acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }

    /// Health check response
    pub fn running() -> Self {
        Self::new("running")
    }
}

// ============================================================================
// Filesystem requests
// ============================================================================

/// Query string shared by the filesystem routes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathQuery {
    /// Target path; empty lists the roots
    #[serde(default)]
    pub path: String,
    /// File content for writes sent as a query parameter
    #[serde(default)]
    pub content: Option<String>,
}

/// JSON body accepted by file writes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteFileBody {
    #[serde(default)]
    pub content: String,
}

/// File read response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentResponse {
    pub content: String,
}

// ============================================================================
// Terminal sessions
// ============================================================================

/// Query string accepted when opening a terminal
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TerminalQuery {
    /// Initial terminal columns
    pub cols: Option<u16>,
    /// Initial terminal rows
    pub rows: Option<u16>,
    /// Working directory for the shell
    pub cwd: Option<String>,
}

impl TerminalQuery {
    /// Validate the requested size, returning it with defaults filled in
    pub fn size(&self) -> ProtocolResult<(u16, u16)> {
        let cols = self.cols.unwrap_or(DEFAULT_TERMINAL_COLS);
        let rows = self.rows.unwrap_or(DEFAULT_TERMINAL_ROWS);
        validate_terminal_size(cols, rows)?;
        Ok((cols, rows))
    }
}

/// Resize request body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResizeRequest {
    pub cols: u16,
    pub rows: u16,
}

impl ResizeRequest {
    pub fn validate(&self) -> ProtocolResult<()> {
        validate_terminal_size(self.cols, self.rows)
    }
}

/// Lifecycle states shared by terminal sessions and managed processes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// Running and accepting input
    Running,
    /// Shutting down
    Stopping,
    /// Not running
    Stopped,
}

/// Information about a live terminal session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionInfo {
    /// Client supplied session id
    pub session_id: String,
    /// Shell program
    pub shell: String,
    /// Shell working directory
    pub cwd: String,
    /// OS process id of the shell
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Current state
    pub status: ProcessState,
    /// Terminal columns
    pub cols: u16,
    /// Terminal rows
    pub rows: u16,
    /// Unix timestamp (seconds) when the session opened
    pub opened_at: u64,
}

// ============================================================================
// Managed processes
// ============================================================================

fn default_autostart() -> bool {
    true
}

/// Request to register and start a managed process
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateProcessRequest {
    /// Unique process id
    pub id: String,
    /// Directory the process runs in (created when missing)
    pub working_dir: PathBuf,
    /// Program followed by its arguments
    pub command: Vec<String>,
    /// Start automatically when the server starts
    #[serde(default = "default_autostart")]
    pub autostart: bool,
    /// Line written to the process to ask it to stop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_command: Option<String>,
    /// How long to wait after `stop_command` before killing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_timeout_secs: Option<u64>,
}

impl CreateProcessRequest {
    pub fn validate(&self) -> ProtocolResult<()> {
        validate_id("process id", &self.id)?;

        match self.command.first() {
            None => {
                return Err(ProtocolError::ValidationError(
                    "command cannot be empty".to_string(),
                ))
            }
            Some(program) if program.trim().is_empty() => {
                return Err(ProtocolError::ValidationError(
                    "command program cannot be blank".to_string(),
                ))
            }
            Some(_) => {}
        }

        if self.working_dir.as_os_str().is_empty() {
            return Err(ProtocolError::ValidationError(
                "working_dir cannot be empty".to_string(),
            ));
        }

        if let Some(timeout) = self.stop_timeout_secs {
            if timeout > MAX_STOP_TIMEOUT_SECS {
                return Err(ProtocolError::ValidationError(format!(
                    "stop_timeout_secs cannot exceed {}",
                    MAX_STOP_TIMEOUT_SECS
                )));
            }
        }

        Ok(())
    }
}

/// Input sent to a managed process
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputRequest {
    pub input: String,
}

impl InputRequest {
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.input.len() > MAX_INPUT_LENGTH {
            return Err(ProtocolError::ValidationError(format!(
                "input exceeds maximum length of {} bytes",
                MAX_INPUT_LENGTH
            )));
        }
        Ok(())
    }
}

/// Information about a managed process
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessInfo {
    pub id: String,
    pub working_dir: PathBuf,
    pub command: Vec<String>,
    pub autostart: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_command: Option<String>,
    pub stop_timeout_secs: u64,
    pub status: ProcessState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

/// Snapshot of a managed process's log buffer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogsResponse {
    pub id: String,
    pub lines: Vec<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id() {
        assert!(validate_id("session id", "tab-1_main.2").is_ok());
        assert!(validate_id("session id", "").is_err());
        assert!(validate_id("session id", "has space").is_err());
        assert!(validate_id("session id", "../escape").is_err());
        assert!(validate_id("session id", &"a".repeat(MAX_ID_LENGTH)).is_ok());
        assert!(validate_id("session id", &"a".repeat(MAX_ID_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_terminal_size_limits() {
        assert!(validate_terminal_size(1, 1).is_ok());
        assert!(validate_terminal_size(MAX_TERMINAL_COLS, MAX_TERMINAL_ROWS).is_ok());
        assert!(validate_terminal_size(0, 24).is_err());
        assert!(validate_terminal_size(80, 0).is_err());
        assert!(validate_terminal_size(MAX_TERMINAL_COLS + 1, 24).is_err());
        assert!(validate_terminal_size(80, MAX_TERMINAL_ROWS + 1).is_err());
    }

    #[test]
    fn test_terminal_query_defaults() {
        let query = TerminalQuery::default();
        assert_eq!(query.size().unwrap(), (80, 24));

        let query = TerminalQuery {
            cols: Some(600),
            ..Default::default()
        };
        assert!(query.size().is_err());
    }

    #[test]
    fn test_error_body_serialization() {
        let body = ErrorBody {
            detail: "Not found".to_string(),
            code: Some(ErrorCode::NotFound),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"detail":"Not found","code":"not_found"}"#);

        let bare = ErrorBody {
            detail: "x".to_string(),
            code: None,
        };
        assert_eq!(serde_json::to_string(&bare).unwrap(), r#"{"detail":"x"}"#);
    }

    #[test]
    fn test_create_process_defaults() {
        let json = r#"{"id":"mc","working_dir":"/srv/mc","command":["java","-jar","server.jar"]}"#;
        let req: CreateProcessRequest = serde_json::from_str(json).unwrap();
        assert!(req.autostart);
        assert!(req.stop_command.is_none());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_create_process_validation() {
        let mut req = CreateProcessRequest {
            id: "mc".to_string(),
            working_dir: PathBuf::from("/srv/mc"),
            command: vec![],
            autostart: false,
            stop_command: None,
            stop_timeout_secs: None,
        };
        assert!(req.validate().is_err());

        req.command = vec!["  ".to_string()];
        assert!(req.validate().is_err());

        req.command = vec!["java".to_string()];
        req.stop_timeout_secs = Some(MAX_STOP_TIMEOUT_SECS + 1);
        assert!(req.validate().is_err());

        req.stop_timeout_secs = Some(30);
        req.id = "bad id".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_input_max_length() {
        let req = InputRequest {
            input: "x".repeat(MAX_INPUT_LENGTH + 1),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_process_state_serialization() {
        assert_eq!(
            serde_json::to_string(&ProcessState::Running).unwrap(),
            "\"running\""
        );
    }

    #[test]
    fn test_session_info_skips_missing_pid() {
        let info = SessionInfo {
            session_id: "main".to_string(),
            shell: "/bin/sh".to_string(),
            cwd: "/tmp".to_string(),
            pid: None,
            status: ProcessState::Running,
            cols: 80,
            rows: 24,
            opened_at: 0,
        };
        let json = serde_json::to_string(&info).unwrap();
        assert!(!json.contains("pid"));
        assert!(json.contains("\"session_id\":\"main\""));
    }
}
