//! Server settings
//!
//! Settings are layered: built-in defaults, then a TOML file passed with
//! `--config`, then environment variables and flags (clap merges those two).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default bind address (all interfaces, so overlay VPN peers can reach it)
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_PORT: u16 = 5000;

/// Default location of the managed process metadata
pub const DEFAULT_PROCESSES_FILE: &str = "processes.json";

/// Errors that can occur while loading settings
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// One layer of optional settings
///
/// Used both for the TOML file and for the flag/env overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsLayer {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub token: Option<String>,
    pub shell: Option<String>,
    pub shell_args: Option<Vec<String>>,
    pub shell_cwd: Option<PathBuf>,
    pub root: Option<PathBuf>,
    pub processes_file: Option<PathBuf>,
    pub allow_public_peers: Option<bool>,
}

impl SettingsLayer {
    /// Load a layer from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let layer: SettingsLayer = toml::from_str(&content)?;
        Ok(layer)
    }

    /// Overlay `other` on top of `self`; values set in `other` win
    pub fn merge(self, other: SettingsLayer) -> SettingsLayer {
        SettingsLayer {
            host: other.host.or(self.host),
            port: other.port.or(self.port),
            token: other.token.or(self.token),
            shell: other.shell.or(self.shell),
            shell_args: other.shell_args.or(self.shell_args),
            shell_cwd: other.shell_cwd.or(self.shell_cwd),
            root: other.root.or(self.root),
            processes_file: other.processes_file.or(self.processes_file),
            allow_public_peers: other.allow_public_peers.or(self.allow_public_peers),
        }
    }
}

/// Shell launched for each terminal session
#[derive(Debug, Clone, PartialEq)]
pub struct ShellSettings {
    /// Program to run
    pub program: String,
    /// Arguments passed to the program
    pub args: Vec<String>,
    /// Working directory used when a session does not ask for one
    pub cwd: PathBuf,
}

/// Fully resolved server settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Shared secret required from callers, if any
    pub token: Option<String>,
    /// Shell configuration
    pub shell: ShellSettings,
    /// Directory every filesystem path must stay inside, if any
    pub root: Option<PathBuf>,
    /// Where managed process metadata is persisted
    pub processes_file: PathBuf,
    /// Accept peers outside loopback/private/overlay ranges
    pub allow_public_peers: bool,
}

impl Settings {
    /// Resolve settings from a merged layer, filling in defaults
    pub fn resolve(layer: SettingsLayer) -> Result<Self, ConfigError> {
        let host = layer
            .host
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = layer.port.unwrap_or(DEFAULT_PORT);

        // An empty token (e.g. `SERVER_TOKEN=`) disables authentication
        let token = layer.token.filter(|t| !t.trim().is_empty());

        let root = match layer.root {
            Some(root) => {
                let canonical = std::fs::canonicalize(&root).map_err(|e| {
                    ConfigError::Invalid(format!("root {}: {}", root.display(), e))
                })?;
                if !canonical.is_dir() {
                    return Err(ConfigError::Invalid(format!(
                        "root {} is not a directory",
                        root.display()
                    )));
                }
                Some(canonical)
            }
            None => None,
        };

        if let (Some(root), Some(cwd)) = (&root, &layer.shell_cwd) {
            let inside = std::fs::canonicalize(cwd)
                .map(|real| real.starts_with(root))
                .unwrap_or(false);
            if !inside {
                return Err(ConfigError::Invalid(format!(
                    "shell_cwd {} is not a directory under root {}",
                    cwd.display(),
                    root.display()
                )));
            }
        }

        let cwd = layer
            .shell_cwd
            .or_else(|| root.clone())
            .or_else(dirs::home_dir)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        let shell = ShellSettings {
            program: layer.shell.unwrap_or_else(default_shell),
            args: layer.shell_args.unwrap_or_default(),
            cwd,
        };

        Ok(Self {
            host,
            port,
            token,
            shell,
            root,
            processes_file: layer
                .processes_file
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PROCESSES_FILE)),
            allow_public_peers: layer.allow_public_peers.unwrap_or(false),
        })
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether the bind address accepts connections on every interface
    pub fn binds_all_interfaces(&self) -> bool {
        matches!(self.host.as_str(), "0.0.0.0" | "::" | "[::]")
    }
}

/// Shell used when none is configured
#[cfg(windows)]
pub fn default_shell() -> String {
    "powershell.exe".to_string()
}

/// Shell used when none is configured
#[cfg(not(windows))]
pub fn default_shell() -> String {
    std::env::var("SHELL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "/bin/sh".to_string())
}
