//! A single supervised process
//!
//! The PTY and the log buffer live here, independently of any client. Output
//! keeps accumulating while nobody is watching.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{LogBuffer, ProcessError, ProcessResult};
use crate::pty::{PtyProcess, TerminalSize, Utf8Decoder};
use crate::server::CreateProcessRequest;

/// Default wait between the stop command and a forced kill
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 30;

/// Interval at which a stopping process is polled
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Wide terminal so console programs do not wrap their log lines
const SUPERVISED_TERMINAL: TerminalSize = TerminalSize {
    cols: 200,
    rows: 50,
};

fn default_stop_timeout() -> u64 {
    DEFAULT_STOP_TIMEOUT_SECS
}

/// Persisted definition of a supervised process
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessSpec {
    /// Unique id
    pub id: String,
    /// Directory the process runs in
    pub working_dir: PathBuf,
    /// Program followed by its arguments
    pub command: Vec<String>,
    /// Start when the server starts
    #[serde(default)]
    pub autostart: bool,
    /// Line written to ask the process to stop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_command: Option<String>,
    /// Seconds to wait after `stop_command` before killing
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,
}

impl From<CreateProcessRequest> for ProcessSpec {
    fn from(req: CreateProcessRequest) -> Self {
        Self {
            id: req.id,
            working_dir: req.working_dir,
            command: req.command,
            autostart: req.autostart,
            stop_command: req.stop_command,
            stop_timeout_secs: req.stop_timeout_secs.unwrap_or(DEFAULT_STOP_TIMEOUT_SECS),
        }
    }
}

/// A running (or finished) supervised process and its output
pub struct ManagedProcess {
    spec: ProcessSpec,
    process: PtyProcess,
    logs: Arc<StdMutex<LogBuffer>>,
}

impl ManagedProcess {
    /// Spawn the process described by `spec`
    ///
    /// Creates the working directory when missing. Must be called from within
    /// a tokio runtime: output is pumped into the log buffer by a task.
    pub fn start(spec: ProcessSpec) -> ProcessResult<Self> {
        let (program, args) = spec
            .command
            .split_first()
            .ok_or_else(|| ProcessError::InvalidSpec("command cannot be empty".to_string()))?;

        std::fs::create_dir_all(&spec.working_dir)?;

        let (process, mut output_rx) = PtyProcess::spawn(
            program,
            args,
            &spec.working_dir,
            SUPERVISED_TERMINAL,
        )?;

        let logs = Arc::new(StdMutex::new(LogBuffer::default()));
        let pump_logs = Arc::clone(&logs);
        let id = spec.id.clone();

        tokio::spawn(async move {
            let mut decoder = Utf8Decoder::new();
            while let Some(output) = output_rx.recv().await {
                let text = decoder.decode(&output.data);
                pump_logs
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(&text);
            }
            let tail = decoder.finish();
            let mut logs = pump_logs.lock().unwrap_or_else(|e| e.into_inner());
            logs.push(&tail);
            logs.flush();
            debug!("Output stream for process '{}' ended", id);
        });

        info!(
            "Started process '{}' (pid {:?}) in {}",
            spec.id,
            process.pid(),
            spec.working_dir.display()
        );

        Ok(Self {
            spec,
            process,
            logs,
        })
    }

    /// OS process id
    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    /// Whether the process is still alive
    pub fn is_running(&self) -> bool {
        !self.process.has_exited()
    }

    /// Write a line of input, appending a newline when missing
    ///
    /// Input sent to a process that is no longer running is dropped.
    pub async fn write_line(&self, input: &str) -> ProcessResult<()> {
        if !self.is_running() {
            debug!("Dropping input for stopped process '{}'", self.spec.id);
            return Ok(());
        }

        let mut line = input.to_string();
        if !line.ends_with('\n') {
            line.push('\n');
        }
        self.process.write_str(&line).await?;
        Ok(())
    }

    /// Snapshot of the log buffer
    pub fn log_lines(&self) -> Vec<String> {
        self.logs.lock().unwrap_or_else(|e| e.into_inner()).lines()
    }

    /// Stop the process
    ///
    /// Sends the stop command (if any) and waits up to the stop timeout for
    /// the process to exit before killing it.
    pub async fn stop(&self) {
        if !self.is_running() {
            return;
        }

        if let Some(command) = &self.spec.stop_command {
            if let Err(e) = self.write_line(command).await {
                warn!("Failed to send stop command to '{}': {}", self.spec.id, e);
            }

            let deadline = Instant::now() + Duration::from_secs(self.spec.stop_timeout_secs);
            while self.is_running() && Instant::now() < deadline {
                tokio::time::sleep(STOP_POLL_INTERVAL).await;
            }
        }

        if self.is_running() {
            info!("Killing process '{}'", self.spec.id);
            if let Err(e) = self.process.kill() {
                warn!("Error killing process '{}': {}", self.spec.id, e);
            }
        } else {
            info!("Process '{}' stopped", self.spec.id);
        }
    }
}
