//! Mapping of decoded resource paths onto the local filesystem.
use std::fmt;
use std::path::{Path, PathBuf};

/// Why a resource path could not be mapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The path has a `.` or `..` segment.
    DotSegment(String),
    /// A path segment contains characters the filesystem cannot represent.
    InvalidSegment(String),
    /// No root directory was configured.
    NoRoot,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::DotSegment(p) => write!(f, "dot segment in path: {p}"),
            ResolveError::InvalidSegment(s) => write!(f, "invalid path segment: {s:?}"),
            ResolveError::NoRoot => write!(f, "no root directory configured"),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Maps a decoded, slash separated relative path to a filesystem path.
pub trait PathResolver: Send + Sync {
    fn resolve(&self, relative_path: &str) -> Result<PathBuf, ResolveError>;
}

/// Resolves paths below a fixed root directory.
///
/// The default value has no root, and every path fails to resolve.
#[derive(Debug, Clone, Default)]
pub struct RootPathResolver {
    root: Option<PathBuf>,
}

impl RootPathResolver {
    pub fn new(root: impl Into<PathBuf>) -> RootPathResolver {
        RootPathResolver {
            root: Some(root.into()),
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }
}

fn valid_segment(segment: &str) -> bool {
    if segment.contains('\0') {
        return false;
    }
    #[cfg(windows)]
    if segment.contains(['\\', ':']) {
        return false;
    }
    true
}

impl PathResolver for RootPathResolver {
    fn resolve(&self, relative_path: &str) -> Result<PathBuf, ResolveError> {
        let root = self.root.as_ref().ok_or(ResolveError::NoRoot)?;
        let mut segments: Vec<&str> = Vec::new();
        for segment in relative_path.split('/') {
            match segment {
                "" => {}
                "." | ".." => return Err(ResolveError::DotSegment(relative_path.to_string())),
                s if !valid_segment(s) => {
                    return Err(ResolveError::InvalidSegment(s.to_string()));
                }
                s => segments.push(s),
            }
        }
        let mut path = root.clone();
        path.extend(segments);
        Ok(path)
    }
}
