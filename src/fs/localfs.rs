//! Local filesystem access.
//!
//! This implementation is stateless. All paths it gets are already
//! absolute, the mapping from URL to path is done by the resolver.

use std::fs::FileTimes;
use std::io;
#[cfg(unix)]
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use futures_util::FutureExt;
use tokio::io::AsyncSeekExt;

use crate::fs::*;

/// Local Filesystem implementation.
#[derive(Debug, Clone, Default)]
pub struct LocalFs {
    /// Create files and directories publically readable (0644/0755).
    public: bool,
}

impl LocalFs {
    /// Create a new LocalFs DavFileSystem.
    ///
    /// If "public" is set to true, all files and directories created will be
    /// publically readable (mode 644/755), otherwise they will be private
    /// (mode 600/700). Umask still overrides this.
    pub fn new(public: bool) -> Arc<LocalFs> {
        Arc::new(LocalFs { public })
    }
}

// run a blocking std::fs call on the blocking threadpool.
async fn blocking<F, T>(func: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(func).await {
        Ok(res) => res,
        Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
    }
}

impl DavFileSystem for LocalFs {
    fn symlink_metadata<'a>(&'a self, path: &'a Path) -> FsFuture<'a, Meta> {
        async move {
            let meta = tokio::fs::symlink_metadata(path).await?;
            Ok(Meta::from(&meta))
        }
        .boxed()
    }

    fn read_dir<'a>(&'a self, path: &'a Path) -> FsFuture<'a, Vec<PathBuf>> {
        async move {
            trace!("FS: read_dir {path:?}");
            let mut read_dir = tokio::fs::read_dir(path).await?;
            let mut entries = Vec::new();
            while let Some(entry) = read_dir.next_entry().await? {
                entries.push(entry.path());
            }
            Ok(entries)
        }
        .boxed()
    }

    fn open_read<'a>(&'a self, path: &'a Path, offset: u64) -> FsFuture<'a, FsReader> {
        async move {
            trace!("FS: open_read {path:?} @ {offset}");
            let mut file = tokio::fs::File::open(path).await?;
            if offset > 0 {
                file.seek(io::SeekFrom::Start(offset)).await?;
            }
            Ok(Box::pin(file) as FsReader)
        }
        .boxed()
    }

    fn create_truncate<'a>(&'a self, path: &'a Path) -> FsFuture<'a, FsWriter> {
        async move {
            trace!("FS: create_truncate {path:?}");
            let mut opt = tokio::fs::OpenOptions::new();
            opt.write(true).create(true).truncate(true);
            #[cfg(unix)]
            opt.mode(if self.public { 0o644 } else { 0o600 });
            let file = opt.open(path).await?;
            Ok(Box::pin(file) as FsWriter)
        }
        .boxed()
    }

    fn create_dir<'a>(&'a self, path: &'a Path) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: create_dir {path:?}");
            #[allow(unused_mut)]
            let mut dir = tokio::fs::DirBuilder::new();
            #[cfg(unix)]
            dir.mode(if self.public { 0o755 } else { 0o700 });
            Ok(dir.create(path).await?)
        }
        .boxed()
    }

    fn rename_replace<'a>(&'a self, from: &'a Path, to: &'a Path) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: rename {from:?} {to:?}");
            match tokio::fs::rename(from, to).await {
                Ok(v) => Ok(v),
                Err(e) => {
                    // webdav allows a rename from a directory to a file.
                    // note that this check is racy.
                    #[cfg(unix)]
                    if e.raw_os_error() == Some(libc::ENOTDIR) && from.is_dir() {
                        let _ = tokio::fs::remove_file(to).await;
                        return Ok(tokio::fs::rename(from, to).await?);
                    }
                    Err(e.into())
                }
            }
        }
        .boxed()
    }

    fn copy_replace<'a>(&'a self, from: &'a Path, to: &'a Path) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: copy {from:?} {to:?}");
            if let Err(e) = tokio::fs::copy(from, to).await {
                debug!("copy({from:?}, {to:?}) failed: {e}");
                return Err(e.into());
            }
            Ok(())
        }
        .boxed()
    }

    fn remove_all<'a>(&'a self, path: &'a Path) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: remove_all {path:?}");
            let meta = tokio::fs::symlink_metadata(path).await?;
            if meta.is_dir() {
                tokio::fs::remove_dir_all(path).await?;
            } else {
                tokio::fs::remove_file(path).await?;
            }
            Ok(())
        }
        .boxed()
    }

    fn set_times<'a>(
        &'a self,
        path: &'a Path,
        modified: SystemTime,
        accessed: Option<SystemTime>,
        created: Option<SystemTime>,
    ) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: set_times {path:?}");
            let path = path.to_path_buf();
            blocking(move || {
                let mut times = FileTimes::new().set_modified(modified);
                if let Some(accessed) = accessed {
                    times = times.set_accessed(accessed);
                }
                if let Some(created) = created {
                    times = set_created(times, created);
                }
                std::fs::File::open(path)?.set_times(times)
            })
            .await?;
            Ok(())
        }
        .boxed()
    }

    fn space<'a>(&'a self, path: &'a Path) -> FsFuture<'a, SpaceInfo> {
        async move {
            let path = path.to_path_buf();
            Ok(blocking(move || statvfs(&path)).await?)
        }
        .boxed()
    }
}

#[cfg(target_os = "macos")]
fn set_created(times: FileTimes, created: SystemTime) -> FileTimes {
    use std::os::macos::fs::FileTimesExt;
    times.set_created(created)
}

#[cfg(windows)]
fn set_created(times: FileTimes, created: SystemTime) -> FileTimes {
    use std::os::windows::fs::FileTimesExt;
    times.set_created(created)
}

// the birth time of a file cannot be changed here.
#[cfg(not(any(target_os = "macos", windows)))]
fn set_created(times: FileTimes, _created: SystemTime) -> FileTimes {
    times
}

#[cfg(unix)]
fn statvfs(path: &Path) -> io::Result<SpaceInfo> {
    let st = nix::sys::statvfs::statvfs(path)?;
    let frsize = st.fragment_size() as u64;
    Ok(SpaceInfo {
        usable: st.blocks_available() as u64 * frsize,
        total: st.blocks() as u64 * frsize,
    })
}

#[cfg(not(unix))]
fn statvfs(_path: &Path) -> io::Result<SpaceInfo> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "statvfs"))
}

impl From<&std::fs::Metadata> for Meta {
    fn from(meta: &std::fs::Metadata) -> Meta {
        let ft = meta.file_type();
        let kind = if ft.is_symlink() {
            FileKind::Symlink
        } else if ft.is_dir() {
            FileKind::Dir
        } else if ft.is_file() {
            FileKind::File
        } else {
            FileKind::Other
        };
        #[cfg(unix)]
        let ino = Some(meta.ino());
        #[cfg(not(unix))]
        let ino = None;
        Meta {
            kind,
            len: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            accessed: meta.accessed().ok(),
            created: meta.created().ok(),
            ino,
        }
    }
}
