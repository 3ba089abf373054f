//! PTY process management
//!
//! Handles spawning processes with PTY terminal emulation, including:
//! - Configurable terminal size
//! - Stdin/stdout streaming
//! - Terminal resize support
//! - Killing the child and recording how it exited

use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Size of a single PTY read
const READ_CHUNK: usize = 4096;

/// Capacity of the output channel between the reader thread and async consumers
const OUTPUT_CHANNEL_CAPACITY: usize = 1024;

/// Errors that can occur during PTY operations
#[derive(Error, Debug)]
pub enum PtyError {
    #[error("Failed to open PTY: {0}")]
    OpenFailed(String),

    #[error("Failed to spawn process: {0}")]
    SpawnFailed(String),

    #[error("Failed to write to PTY: {0}")]
    WriteFailed(String),

    #[error("Failed to resize PTY: {0}")]
    ResizeFailed(String),

    #[error("Failed to kill process: {0}")]
    KillFailed(String),

    #[error("Process already exited")]
    ProcessExited,

    #[error("PTY system error: {0}")]
    SystemError(String),
}

/// Result type for PTY operations
pub type PtyResult<T> = Result<T, PtyError>;

/// Terminal size configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

impl TerminalSize {
    /// Create a new terminal size
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    /// Convert to portable-pty PtySize
    fn to_pty_size(self) -> PtySize {
        PtySize {
            rows: self.rows,
            cols: self.cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

/// Output data from the PTY
#[derive(Debug, Clone)]
pub struct PtyOutput {
    /// The output data
    pub data: Vec<u8>,
}

/// Event recorded when a process exits
#[derive(Debug, Clone)]
pub struct ProcessExit {
    /// The process ID
    pub id: Uuid,
    /// Exit code if available
    pub exit_code: Option<u32>,
    /// Exit reason
    pub reason: ExitReason,
}

/// Reason for process exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Process exited on its own
    Normal,
    /// Process was killed by request
    Killed,
    /// The PTY closed but no exit status could be collected
    Unknown,
}

type SharedChild = Arc<StdMutex<Box<dyn Child + Send + Sync>>>;
type SharedExit = Arc<StdMutex<Option<ProcessExit>>>;

/// Handle to a running PTY process
///
/// Output is delivered through the receiver returned by [`PtyProcess::spawn`];
/// the handle itself is shareable behind an `Arc` for writes, resizes and kills.
pub struct PtyProcess {
    /// Unique identifier
    id: Uuid,
    /// OS process id, when the platform reports one
    pid: Option<u32>,
    /// The master PTY handle
    master: Arc<Mutex<Box<dyn MasterPty + Send>>>,
    /// Current terminal size
    size: Arc<RwLock<TerminalSize>>,
    /// Writer for sending input; the lock serializes writers
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    /// The spawned child
    child: SharedChild,
    /// Set once a kill has been requested
    killed: Arc<AtomicBool>,
    /// Exit information, filled by the reader thread or by `kill`
    exit_info: SharedExit,
}

impl PtyProcess {
    /// Spawn a new process with PTY
    ///
    /// # Arguments
    /// * `command` - The command to run
    /// * `args` - Command arguments
    /// * `working_dir` - Working directory for the process
    /// * `size` - Initial terminal size
    ///
    /// # Returns
    /// The process handle and the receiving end of its output stream. The
    /// stream ends once the PTY closes.
    pub fn spawn(
        command: &str,
        args: &[String],
        working_dir: &Path,
        size: TerminalSize,
    ) -> PtyResult<(Self, mpsc::Receiver<PtyOutput>)> {
        let id = Uuid::new_v4();

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(size.to_pty_size())
            .map_err(|e| PtyError::OpenFailed(e.to_string()))?;

        let mut cmd = CommandBuilder::new(command);
        cmd.args(args);
        cmd.cwd(working_dir);

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;
        let pid = child.process_id();

        // Drop the slave so the reader sees EOF/EIO once the child exits
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::SystemError(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::SystemError(e.to_string()))?;

        let (output_tx, output_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);

        let child: SharedChild = Arc::new(StdMutex::new(child));
        let killed = Arc::new(AtomicBool::new(false));
        let exit_info: SharedExit = Arc::new(StdMutex::new(None));

        let reader_child = Arc::clone(&child);
        let reader_killed = Arc::clone(&killed);
        let reader_exit = Arc::clone(&exit_info);

        std::thread::Builder::new()
            .name(format!("pty-reader-{}", id))
            .spawn(move || {
                Self::reader_loop(
                    reader,
                    output_tx,
                    reader_child,
                    reader_killed,
                    reader_exit,
                    id,
                );
            })
            .map_err(|e| PtyError::SystemError(e.to_string()))?;

        debug!("Spawned PTY process {} (pid {:?}): {}", id, pid, command);

        Ok((
            Self {
                id,
                pid,
                master: Arc::new(Mutex::new(pair.master)),
                size: Arc::new(RwLock::new(size)),
                writer: Arc::new(Mutex::new(writer)),
                child,
                killed,
                exit_info,
            },
            output_rx,
        ))
    }

    /// Reader loop that runs in a dedicated OS thread
    fn reader_loop(
        mut reader: Box<dyn Read + Send>,
        output_tx: mpsc::Sender<PtyOutput>,
        child: SharedChild,
        killed: Arc<AtomicBool>,
        exit_info: SharedExit,
        id: Uuid,
    ) {
        let mut buffer = [0u8; READ_CHUNK];

        loop {
            match reader.read(&mut buffer) {
                // EOF - the PTY closed
                Ok(0) => break,
                Ok(n) => {
                    let output = PtyOutput {
                        data: buffer[..n].to_vec(),
                    };
                    if output_tx.blocking_send(output).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(10));
                    continue;
                }
                // EIO on Linux once the child has gone away
                Err(_) => break,
            }
        }

        let exit_code = collect_exit_code(&child);
        let reason = if killed.load(Ordering::SeqCst) {
            ExitReason::Killed
        } else if exit_code.is_some() {
            ExitReason::Normal
        } else {
            ExitReason::Unknown
        };

        let mut guard = exit_info.lock().unwrap_or_else(|e| e.into_inner());
        // kill() may have recorded the exit first; keep its reason, fill in the code
        let entry = guard.get_or_insert(ProcessExit {
            id,
            exit_code,
            reason,
        });
        if entry.exit_code.is_none() {
            entry.exit_code = exit_code;
        }
        debug!("PTY reader for {} finished ({:?})", id, reason);
    }

    /// Get the OS process id
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Get the current terminal size
    pub async fn size(&self) -> TerminalSize {
        *self.size.read().await
    }

    /// Check if the process has exited
    pub fn has_exited(&self) -> bool {
        if self
            .exit_info
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
        {
            return true;
        }
        let mut child = self.child.lock().unwrap_or_else(|e| e.into_inner());
        !matches!(child.try_wait(), Ok(None))
    }

    /// Get exit information if process has exited
    pub fn exit_info(&self) -> Option<ProcessExit> {
        self.exit_info
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Write input to the PTY (stdin)
    pub async fn write(&self, data: &[u8]) -> PtyResult<()> {
        if self.has_exited() {
            return Err(PtyError::ProcessExited);
        }

        // PTY writes block while the child is not reading its input
        let mut writer = Arc::clone(&self.writer).lock_owned().await;
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || {
            writer.write_all(&data)?;
            writer.flush()
        })
        .await
        .map_err(|e| PtyError::WriteFailed(e.to_string()))?
        .map_err(|e| PtyError::WriteFailed(e.to_string()))
    }

    /// Write a string to the PTY
    pub async fn write_str(&self, s: &str) -> PtyResult<()> {
        self.write(s.as_bytes()).await
    }

    /// Resize the terminal
    pub async fn resize(&self, cols: u16, rows: u16) -> PtyResult<()> {
        if self.has_exited() {
            return Err(PtyError::ProcessExited);
        }

        let new_size = TerminalSize::new(cols, rows);
        let master = self.master.lock().await;

        master
            .resize(new_size.to_pty_size())
            .map_err(|e| PtyError::ResizeFailed(e.to_string()))?;

        *self.size.write().await = new_size;

        Ok(())
    }

    /// Kill the process
    ///
    /// Killing a process that already exited is not an error.
    pub fn kill(&self) -> PtyResult<()> {
        self.killed.store(true, Ordering::SeqCst);

        {
            let mut child = self.child.lock().unwrap_or_else(|e| e.into_inner());
            if let Ok(None) = child.try_wait() {
                child
                    .kill()
                    .map_err(|e| PtyError::KillFailed(e.to_string()))?;
            }
        }

        let mut guard = self.exit_info.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            *guard = Some(ProcessExit {
                id: self.id,
                exit_code: None,
                reason: ExitReason::Killed,
            });
        }

        Ok(())
    }
}

impl Drop for PtyProcess {
    fn drop(&mut self) {
        let mut child = self.child.lock().unwrap_or_else(|e| e.into_inner());
        if let Ok(None) = child.try_wait() {
            let _ = child.kill();
        }
    }
}

/// Poll the child for an exit status for up to a second after its PTY closed
fn collect_exit_code(child: &SharedChild) -> Option<u32> {
    for _ in 0..50 {
        {
            let mut guard = child.lock().unwrap_or_else(|e| e.into_inner());
            match guard.try_wait() {
                Ok(Some(status)) => return Some(status.exit_code()),
                Ok(None) => {}
                Err(_) => return None,
            }
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    None
}
