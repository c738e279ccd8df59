//! Filesystem capability interface.
//!
//! All filesystem access of the adapter goes through a [`DavFileSystem`].
//! Paths handed to it are absolute paths that were produced by a
//! [`PathResolver`](crate::resolver::PathResolver), so an implementation
//! does not have to care about the URL space at all.
//!
//! The included implementation is [`LocalFs`].
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};

mod localfs;

pub use localfs::LocalFs;

/// Future returned by almost all of the DavFileSystem methods.
pub type FsFuture<'a, T> = BoxFuture<'a, FsResult<T>>;
/// Convenience alias for a result with FsError.
pub type FsResult<T> = std::result::Result<T, FsError>;

/// Byte source returned by [`DavFileSystem::open_read`].
pub type FsReader = Pin<Box<dyn AsyncRead + Send>>;
/// Byte sink returned by [`DavFileSystem::create_truncate`].
pub type FsWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Errors generated by a filesystem implementation.
#[derive(Debug)]
pub enum FsError {
    NotFound,
    Exists,
    /// The name (or the whole path) is longer than the filesystem allows.
    PathTooLong,
    Io(io::Error),
}

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        #[cfg(unix)]
        match e.raw_os_error() {
            Some(libc::ENAMETOOLONG) => return FsError::PathTooLong,
            // "a/file.txt/b" does not exist either.
            Some(libc::ENOTDIR) => return FsError::NotFound,
            _ => {}
        }
        // ERROR_FILENAME_EXCED_RANGE
        #[cfg(windows)]
        if e.raw_os_error() == Some(206) {
            return FsError::PathTooLong;
        }
        match e.kind() {
            io::ErrorKind::NotFound => FsError::NotFound,
            io::ErrorKind::AlreadyExists => FsError::Exists,
            _ => FsError::Io(e),
        }
    }
}

impl From<FsError> for io::Error {
    fn from(e: FsError) -> Self {
        match e {
            FsError::NotFound => io::Error::new(io::ErrorKind::NotFound, "not found"),
            FsError::Exists => io::Error::new(io::ErrorKind::AlreadyExists, "already exists"),
            FsError::PathTooLong => io::Error::new(io::ErrorKind::InvalidInput, "path too long"),
            FsError::Io(e) => e,
        }
    }
}

impl std::error::Error for FsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FsError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::NotFound => write!(f, "not found"),
            FsError::Exists => write!(f, "already exists"),
            FsError::PathTooLong => write!(f, "path too long"),
            FsError::Io(e) => write!(f, "{e}"),
        }
    }
}

/// What kind of filesystem object an entry is.
///
/// Symbolic links are never followed, so a link shows up as `Symlink`
/// and the adapter does not expose it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Dir,
    File,
    Symlink,
    Other,
}

/// Basic attributes of a filesystem entry.
#[derive(Debug, Clone)]
pub struct Meta {
    pub kind: FileKind,
    pub len: u64,
    pub modified: SystemTime,
    pub accessed: Option<SystemTime>,
    pub created: Option<SystemTime>,
    /// Inode number or similar, used in the entity tag.
    pub ino: Option<u64>,
}

impl Meta {
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Dir
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    /// Entity tag, same format as the default apache etag.
    pub fn etag(&self) -> String {
        let t = self
            .modified
            .duration_since(UNIX_EPOCH)
            .map(|t| t.as_secs() * 1000000 + t.subsec_nanos() as u64 / 1000)
            .unwrap_or(0);
        match (self.ino, self.is_file()) {
            (Some(ino), true) => format!("{:x}-{:x}-{:x}", ino, self.len, t),
            (Some(ino), false) => format!("{ino:x}-{t:x}"),
            (None, true) => format!("{:x}-{:x}", self.len, t),
            (None, false) => format!("{t:x}"),
        }
    }
}

/// Space information of the filesystem a path lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceInfo {
    /// Bytes available to an unprivileged user.
    pub usable: u64,
    /// Total size of the filesystem in bytes.
    pub total: u64,
}

/// The filesystem operations the adapter needs.
///
/// Every method returns a boxed future, so the trait stays object safe and
/// can be shared as `Arc<dyn DavFileSystem>`.
pub trait DavFileSystem: Send + Sync {
    /// Attributes of `path`, not following symbolic links.
    fn symlink_metadata<'a>(&'a self, path: &'a Path) -> FsFuture<'a, Meta>;

    /// Full paths of the entries in directory `path`.
    fn read_dir<'a>(&'a self, path: &'a Path) -> FsFuture<'a, Vec<PathBuf>>;

    /// Open a file for reading, positioned at `offset`.
    fn open_read<'a>(&'a self, path: &'a Path, offset: u64) -> FsFuture<'a, FsReader>;

    /// Create a file (or truncate an existing one) for writing.
    fn create_truncate<'a>(&'a self, path: &'a Path) -> FsFuture<'a, FsWriter>;

    /// Create a single directory. The parent must exist.
    fn create_dir<'a>(&'a self, path: &'a Path) -> FsFuture<'a, ()>;

    /// Atomic rename, replacing the destination if it exists.
    fn rename_replace<'a>(&'a self, from: &'a Path, to: &'a Path) -> FsFuture<'a, ()>;

    /// Copy a single file, replacing the destination if it exists.
    fn copy_replace<'a>(&'a self, from: &'a Path, to: &'a Path) -> FsFuture<'a, ()>;

    /// Remove a file, or a directory with everything below it.
    fn remove_all<'a>(&'a self, path: &'a Path) -> FsFuture<'a, ()>;

    /// Set the modification time, and optionally the access and creation
    /// time. Where the platform cannot set a creation time it is ignored.
    fn set_times<'a>(
        &'a self,
        path: &'a Path,
        modified: SystemTime,
        accessed: Option<SystemTime>,
        created: Option<SystemTime>,
    ) -> FsFuture<'a, ()>;

    /// Space information for the filesystem that `path` lives on.
    fn space<'a>(&'a self, path: &'a Path) -> FsFuture<'a, SpaceInfo>;
}
