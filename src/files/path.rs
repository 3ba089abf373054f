//! Path handling for the filesystem API
//!
//! Clients send forward-slash paths. On Windows they look like `C:` or
//! `C:/Users`; elsewhere they are plain absolute paths.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use super::{FsError, FsResult};

/// Message returned for paths the platform cannot accept
#[cfg(windows)]
pub const INVALID_PATH_MESSAGE: &str = "Path must look like C: or C:/Something";

/// Message returned for paths the platform cannot accept
#[cfg(not(windows))]
pub const INVALID_PATH_MESSAGE: &str = "Path must be absolute, like /home/user";

/// A client path after syntax normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiPath {
    /// `C:` or `C:/rest`, letter upper-cased
    Drive { letter: char, rest: String },
    /// `/rest`
    Absolute(String),
}

/// Parse a client path
///
/// Trims whitespace and turns backslashes into forward slashes before
/// recognizing drive and absolute forms.
pub fn parse_api_path(raw: &str) -> FsResult<ApiPath> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(FsError::EmptyPath);
    }

    let normalized = trimmed.replace('\\', "/");
    let bytes = normalized.as_bytes();

    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        let letter = (bytes[0] as char).to_ascii_uppercase();
        if bytes.len() == 2 {
            return Ok(ApiPath::Drive {
                letter,
                rest: String::new(),
            });
        }
        if bytes[2] == b'/' {
            return Ok(ApiPath::Drive {
                letter,
                rest: normalized[3..].to_string(),
            });
        }
        return Err(FsError::InvalidPath);
    }

    if normalized.starts_with('/') {
        return Ok(ApiPath::Absolute(normalized));
    }

    Err(FsError::InvalidPath)
}

impl ApiPath {
    /// Convert to a native path for the current platform
    #[cfg(windows)]
    pub fn to_native(&self) -> FsResult<PathBuf> {
        match self {
            ApiPath::Drive { letter, rest } => Ok(PathBuf::from(format!("{}:/{}", letter, rest))),
            ApiPath::Absolute(_) => Err(FsError::InvalidPath),
        }
    }

    /// Convert to a native path for the current platform
    #[cfg(not(windows))]
    pub fn to_native(&self) -> FsResult<PathBuf> {
        match self {
            ApiPath::Drive { .. } => Err(FsError::InvalidPath),
            ApiPath::Absolute(path) => Ok(PathBuf::from(path)),
        }
    }
}

/// Render a native path the way clients expect it: forward slashes, no
/// Windows verbatim prefix
pub fn to_api_path(path: &Path) -> String {
    let text = path.to_string_lossy();
    let text = text.strip_prefix(r"\\?\").unwrap_or(&text);
    text.replace('\\', "/")
}

/// Resolve `.` and `..` without touching the filesystem
///
/// `..` never climbs above the path's root.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                let at_root = out.parent().is_none();
                if !at_root {
                    out.pop();
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// Symlink hops followed before a path is treated as a loop
const MAX_SYMLINK_HOPS: usize = 40;

fn split_components(path: &Path) -> impl Iterator<Item = PathBuf> + '_ {
    path.components().rev().map(|c| PathBuf::from(c.as_os_str()))
}

/// Follow every symlink along `path`, including dangling ones
///
/// Components past the first missing one are appended as-is. Returns `None`
/// on a symlink loop or an unreadable link.
fn follow_symlinks(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    let mut pending: Vec<PathBuf> = split_components(path).collect();
    let mut hops = 0;
    let mut missing = false;

    while let Some(next) = pending.pop() {
        match next.components().next() {
            None | Some(Component::CurDir) => {}
            Some(Component::ParentDir) => {
                out.pop();
            }
            Some(Component::Prefix(_)) | Some(Component::RootDir) => out.push(&next),
            Some(Component::Normal(part)) => {
                let candidate = out.join(part);
                if missing {
                    out = candidate;
                    continue;
                }
                match std::fs::symlink_metadata(&candidate) {
                    Ok(meta) if meta.file_type().is_symlink() => {
                        hops += 1;
                        if hops > MAX_SYMLINK_HOPS {
                            return None;
                        }
                        let target = std::fs::read_link(&candidate).ok()?;
                        if target.is_absolute() {
                            out = PathBuf::new();
                        }
                        pending.extend(split_components(&target));
                    }
                    Ok(_) => out = candidate,
                    Err(_) => {
                        missing = true;
                        out = candidate;
                    }
                }
            }
        }
    }
    Some(out)
}

/// Canonicalize the deepest existing ancestor of `path` and re-append the
/// components that do not exist yet
fn canonicalize_existing_prefix(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut missing: Vec<OsString> = Vec::new();

    loop {
        if let Ok(real) = std::fs::canonicalize(&existing) {
            let mut out = real;
            for part in missing.iter().rev() {
                out.push(part);
            }
            return out;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => return path.to_path_buf(),
        }
    }
}

/// Where `path` really points, with every symlink resolved
fn real_path(path: &Path) -> FsResult<PathBuf> {
    let followed = follow_symlinks(path).ok_or(FsError::OutsideRoot)?;
    Ok(canonicalize_existing_prefix(&followed))
}

/// Turns client paths into native paths, enforcing the optional root
#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    root: Option<PathBuf>,
}

impl PathResolver {
    /// Create a resolver; `root` confines every resolved path when set
    pub fn new(root: Option<PathBuf>) -> Self {
        let root = root.map(|r| std::fs::canonicalize(&r).unwrap_or(r));
        Self { root }
    }

    /// The confinement root, if any
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Resolve a client path to a native path
    ///
    /// With a root set, symlinks are followed (dangling ones too) and the
    /// target must stay under the root.
    pub fn resolve(&self, raw: &str) -> FsResult<PathBuf> {
        let normalized = normalize_lexically(&parse_api_path(raw)?.to_native()?);
        if self.root.is_none() {
            return Ok(normalized);
        }
        self.confine(real_path(&normalized)?)
    }

    /// Resolve a client path without following a symlink in its last
    /// component, so the link itself can be acted on
    pub fn resolve_entry(&self, raw: &str) -> FsResult<PathBuf> {
        let normalized = normalize_lexically(&parse_api_path(raw)?.to_native()?);
        if self.root.is_none() {
            return Ok(normalized);
        }
        match (normalized.parent(), normalized.file_name()) {
            (Some(parent), Some(name)) => self.confine(real_path(parent)?.join(name)),
            _ => self.confine(real_path(&normalized)?),
        }
    }

    /// Whether `path` is the confinement root itself
    pub fn is_root(&self, path: &Path) -> bool {
        self.root.as_deref() == Some(path)
    }

    fn confine(&self, path: PathBuf) -> FsResult<PathBuf> {
        match &self.root {
            Some(root) if !path.starts_with(root) => Err(FsError::OutsideRoot),
            _ => Ok(path),
        }
    }
}
