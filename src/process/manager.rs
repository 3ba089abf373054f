//! Managed process registry
//!
//! Holds the persisted process definitions and the running instances started
//! from them. Definitions survive restarts in a JSON file keyed by id.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{ManagedProcess, ProcessError, ProcessResult, ProcessSpec};
use crate::server::{validate_id, ProcessInfo, ProcessState};

/// Supervises every managed process
pub struct ProcessManager {
    /// File the definitions are persisted to
    metadata_file: PathBuf,
    /// Registered definitions, ordered by id
    specs: RwLock<BTreeMap<String, ProcessSpec>>,
    /// Started instances; stopped ones stay so their logs remain readable
    instances: RwLock<HashMap<String, Arc<ManagedProcess>>>,
}

impl ProcessManager {
    /// Load definitions from `metadata_file`
    ///
    /// A missing file yields an empty registry. So does a corrupt one, with a
    /// warning; it is overwritten on the next save.
    pub async fn load(metadata_file: impl Into<PathBuf>) -> Self {
        let metadata_file = metadata_file.into();
        let specs = read_metadata(&metadata_file).await;
        debug!(
            "Loaded {} process definitions from {}",
            specs.len(),
            metadata_file.display()
        );

        Self {
            metadata_file,
            specs: RwLock::new(specs),
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Start every definition marked `autostart`
    ///
    /// Failures are logged and skipped.
    pub async fn autostart(&self) {
        let ids: Vec<String> = self
            .specs
            .read()
            .await
            .values()
            .filter(|spec| spec.autostart)
            .map(|spec| spec.id.clone())
            .collect();

        for id in ids {
            if let Err(e) = self.start(&id).await {
                warn!("Autostart of process '{}' failed: {}", id, e);
            }
        }
    }

    /// Register a new process, start it and persist the definition
    pub async fn create(&self, spec: ProcessSpec) -> ProcessResult<ProcessInfo> {
        let mut specs = self.specs.write().await;
        if specs.contains_key(&spec.id) {
            return Err(ProcessError::AlreadyExists(spec.id));
        }

        let process = Arc::new(ManagedProcess::start(spec.clone())?);
        self.instances
            .write()
            .await
            .insert(spec.id.clone(), Arc::clone(&process));

        info!("Registered process '{}'", spec.id);
        let info = describe(&spec, Some(&process));
        specs.insert(spec.id.clone(), spec);
        self.save(&specs).await;

        Ok(info)
    }

    /// Start a registered process; does nothing if it is already running
    pub async fn start(&self, id: &str) -> ProcessResult<ProcessInfo> {
        let spec = self
            .specs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ProcessError::NotFound(id.to_string()))?;

        let mut instances = self.instances.write().await;
        if let Some(existing) = instances.get(id) {
            if existing.is_running() {
                debug!("Process '{}' already running", id);
                return Ok(describe(&spec, Some(existing)));
            }
        }

        let process = Arc::new(ManagedProcess::start(spec.clone())?);
        instances.insert(id.to_string(), Arc::clone(&process));
        Ok(describe(&spec, Some(&process)))
    }

    /// Stop a registered process; the definition is kept
    pub async fn stop(&self, id: &str) -> ProcessResult<ProcessInfo> {
        let spec = self
            .specs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ProcessError::NotFound(id.to_string()))?;

        let process = self.instances.read().await.get(id).cloned();
        if let Some(process) = &process {
            process.stop().await;
        }
        Ok(describe(&spec, process.as_ref()))
    }

    /// Send a line of input to a registered process
    pub async fn send_input(&self, id: &str, input: &str) -> ProcessResult<()> {
        if !self.specs.read().await.contains_key(id) {
            return Err(ProcessError::NotFound(id.to_string()));
        }

        match self.instances.read().await.get(id).cloned() {
            Some(process) => process.write_line(input).await,
            None => {
                debug!("Dropping input for process '{}' that never started", id);
                Ok(())
            }
        }
    }

    /// Snapshot of a process's log buffer
    pub async fn logs(&self, id: &str) -> ProcessResult<Vec<String>> {
        if !self.specs.read().await.contains_key(id) {
            return Err(ProcessError::NotFound(id.to_string()));
        }

        Ok(self
            .instances
            .read()
            .await
            .get(id)
            .map(|process| process.log_lines())
            .unwrap_or_default())
    }

    /// Describe one registered process
    pub async fn get(&self, id: &str) -> ProcessResult<ProcessInfo> {
        let specs = self.specs.read().await;
        let spec = specs
            .get(id)
            .ok_or_else(|| ProcessError::NotFound(id.to_string()))?;
        let instances = self.instances.read().await;
        Ok(describe(spec, instances.get(id)))
    }

    /// Describe every registered process, ordered by id
    pub async fn list(&self) -> Vec<ProcessInfo> {
        let specs = self.specs.read().await;
        let instances = self.instances.read().await;
        specs
            .values()
            .map(|spec| describe(spec, instances.get(&spec.id)))
            .collect()
    }

    /// Stop every running process. Used during server shutdown.
    pub async fn shutdown_all(&self) {
        let running: Vec<Arc<ManagedProcess>> = self
            .instances
            .read()
            .await
            .values()
            .filter(|p| p.is_running())
            .cloned()
            .collect();

        if !running.is_empty() {
            info!("Stopping {} managed processes", running.len());
        }
        let stops = running.iter().map(|process| process.stop());
        futures_util::future::join_all(stops).await;
    }

    /// Persist the definitions, logging rather than failing on errors
    async fn save(&self, specs: &BTreeMap<String, ProcessSpec>) {
        let json = match serde_json::to_string_pretty(specs) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize process metadata: {}", e);
                return;
            }
        };

        if let Some(parent) = self.metadata_file.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    warn!("Failed to create {}: {}", parent.display(), e);
                    return;
                }
            }
        }

        if let Err(e) = tokio::fs::write(&self.metadata_file, json).await {
            warn!(
                "Failed to write process metadata to {}: {}",
                self.metadata_file.display(),
                e
            );
        }
    }
}

/// Read the metadata file, tolerating a missing or corrupt file
async fn read_metadata(path: &Path) -> BTreeMap<String, ProcessSpec> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            return BTreeMap::new();
        }
    };

    let mut specs: BTreeMap<String, ProcessSpec> = match serde_json::from_str(&content) {
        Ok(specs) => specs,
        Err(e) => {
            warn!("Ignoring corrupt process metadata {}: {}", path.display(), e);
            return BTreeMap::new();
        }
    };

    // The map key is authoritative; ids the routes cannot address are dropped
    specs.retain(|key, spec| match validate_id("process id", key) {
        Ok(()) => {
            spec.id = key.clone();
            true
        }
        Err(e) => {
            warn!("Skipping process definition '{}': {}", key, e);
            false
        }
    });
    specs
}

fn describe(spec: &ProcessSpec, process: Option<&Arc<ManagedProcess>>) -> ProcessInfo {
    let running = process.filter(|p| p.is_running());
    ProcessInfo {
        id: spec.id.clone(),
        working_dir: spec.working_dir.clone(),
        command: spec.command.clone(),
        autostart: spec.autostart,
        stop_command: spec.stop_command.clone(),
        stop_timeout_secs: spec.stop_timeout_secs,
        status: if running.is_some() {
            ProcessState::Running
        } else {
            ProcessState::Stopped
        },
        pid: running.and_then(|p| p.pid()),
    }
}
