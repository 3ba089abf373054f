//! Shell session registry
//!
//! Maintains the live terminal sessions keyed by their client supplied id and
//! routes input, resizes and closes to them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{SessionError, ShellConfig, ShellSession};
use crate::config::ShellSettings;
use crate::pty::{PtyOutput, TerminalSize};
use crate::server::{validate_id, SessionInfo};

/// Errors that can occur during session registry operations
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session already active: {0}")]
    SessionExists(String),

    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Result type for manager operations
pub type ManagerResult<T> = Result<T, ManagerError>;

/// Manages all live shell sessions
pub struct ShellManager {
    /// Registry of live sessions
    sessions: Arc<RwLock<HashMap<String, Arc<ShellSession>>>>,
    /// Shell launched for new sessions
    shell: ShellSettings,
}

impl ShellManager {
    /// Create a new shell manager
    pub fn new(shell: ShellSettings) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            shell,
        }
    }

    /// Get the number of live sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Open a new session
    ///
    /// `cwd` overrides the configured working directory. Fails when the id is
    /// malformed or already live.
    pub async fn open(
        &self,
        session_id: &str,
        cwd: Option<PathBuf>,
        size: TerminalSize,
    ) -> ManagerResult<(Arc<ShellSession>, mpsc::Receiver<PtyOutput>)> {
        validate_id("session id", session_id)
            .map_err(|e| ManagerError::InvalidSessionId(e.to_string()))?;

        // Hold the write lock across the spawn so two connections cannot
        // claim the same id
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(session_id) {
            return Err(ManagerError::SessionExists(session_id.to_string()));
        }

        let config = ShellConfig::new(
            self.shell.program.clone(),
            cwd.unwrap_or_else(|| self.shell.cwd.clone()),
        )
        .with_args(self.shell.args.clone())
        .with_size(size.cols, size.rows);

        let (session, output_rx) = ShellSession::spawn(session_id, config)?;
        let session = Arc::new(session);
        sessions.insert(session_id.to_string(), Arc::clone(&session));

        info!(
            "Opened shell session {} ({} in {})",
            session_id,
            self.shell.program,
            session.cwd().display()
        );
        Ok((session, output_rx))
    }

    /// Get a live session
    pub async fn get(&self, session_id: &str) -> Option<Arc<ShellSession>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Close a session on request, killing its shell
    pub async fn close(&self, session_id: &str) -> ManagerResult<()> {
        let session = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| ManagerError::SessionNotFound(session_id.to_string()))?;

        session.close()?;
        info!("Closed shell session {}", session_id);
        Ok(())
    }

    /// Release a session when its connection ends
    ///
    /// Only removes the entry if it still belongs to `connection_id`.
    pub async fn release(&self, session_id: &str, connection_id: Uuid) {
        let removed = {
            let mut sessions = self.sessions.write().await;
            match sessions.get(session_id) {
                Some(s) if s.connection_id() == connection_id => sessions.remove(session_id),
                _ => None,
            }
        };

        if let Some(session) = removed {
            if let Err(e) = session.close() {
                warn!("Error killing shell for session {}: {}", session_id, e);
            }
            debug!("Released shell session {}", session_id);
        }
    }

    /// Resize a session's terminal
    pub async fn resize(&self, session_id: &str, cols: u16, rows: u16) -> ManagerResult<()> {
        let session = self
            .get(session_id)
            .await
            .ok_or_else(|| ManagerError::SessionNotFound(session_id.to_string()))?;

        session.resize(cols, rows).await?;
        debug!("Session {} resized to {}x{}", session_id, cols, rows);
        Ok(())
    }

    /// List all live sessions, ordered by id
    pub async fn list(&self) -> Vec<SessionInfo> {
        let sessions: Vec<Arc<ShellSession>> =
            self.sessions.read().await.values().cloned().collect();

        let mut infos = Vec::with_capacity(sessions.len());
        for session in sessions {
            infos.push(session.info().await);
        }
        infos.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        infos
    }

    /// Kill every live session. Used during server shutdown.
    pub async fn shutdown_all(&self) {
        let drained: Vec<(String, Arc<ShellSession>)> =
            self.sessions.write().await.drain().collect();

        if !drained.is_empty() {
            info!("Closing {} shell sessions", drained.len());
        }
        for (session_id, session) in drained {
            if let Err(e) = session.close() {
                warn!("Error closing session {} during shutdown: {}", session_id, e);
            }
        }
    }
}
