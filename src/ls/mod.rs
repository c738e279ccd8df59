//! Contains the structs and traits that define a `locksystem` backend.
//!
//! Locks are keyed by the resource path of a
//! [`ResourceLocator`](crate::locator::ResourceLocator), so `""` is the
//! root and `"a/b"` is a member of `"a"`.
use std::fmt::Debug;
use std::time::{Duration, SystemTime};

use xmltree::Element;

mod memls;

pub use memls::MemLs;

/// Scope of a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockScope {
    Exclusive,
    Shared,
}

/// Type of a lock. WebDAV only defines write locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockType {
    Write,
}

/// Parameters of a lock request.
#[derive(Debug, Clone)]
pub struct LockInfo {
    pub scope: LockScope,
    pub kind: LockType,
    /// Depth infinity.
    pub deep: bool,
    pub owner: Option<Element>,
    pub timeout: Option<Duration>,
}

/// A granted lock.
#[derive(Debug, Clone)]
pub struct ActiveLock {
    /// `opaquelocktoken:<uuid>`.
    pub token: String,
    /// Resource path the lock is rooted at.
    pub path: String,
    pub scope: LockScope,
    pub kind: LockType,
    pub deep: bool,
    pub owner: Option<Element>,
    pub timeout: Option<Duration>,
    pub timeout_at: Option<SystemTime>,
}

impl ActiveLock {
    /// Does this lock apply to `path`.
    pub fn covers(&self, path: &str) -> bool {
        self.path == path || (self.deep && is_ancestor(&self.path, path))
    }
}

// `ancestor` is a strict ancestor of `path`.
pub(crate) fn is_ancestor(ancestor: &str, path: &str) -> bool {
    if ancestor.is_empty() {
        return !path.is_empty();
    }
    path.strip_prefix(ancestor)
        .map(|rest| rest.starts_with('/'))
        .unwrap_or(false)
}

/// The trait that defines a locksystem.
pub trait DavLockSystem: Debug + Send + Sync {
    /// Lock `path`. If a conflicting lock exists it is returned as the error.
    fn lock(&self, path: &str, info: LockInfo) -> Result<ActiveLock, ActiveLock>;

    /// Refresh the lock with token `token` that covers `path`.
    fn refresh(&self, path: &str, token: &str, timeout: Option<Duration>) -> Option<ActiveLock>;

    /// Release the lock with token `token`, if it covers `path`.
    fn unlock(&self, path: &str, token: &str) -> bool;

    /// All locks that apply to `path`, including inherited deep locks.
    fn discover(&self, path: &str) -> Vec<ActiveLock>;

    /// Locks rooted at `path` or anywhere below it.
    fn held(&self, path: &str) -> Vec<ActiveLock>;

    /// Is `path` covered by a lock of the given type and scope.
    fn has_lock(&self, path: &str, kind: LockType, scope: LockScope) -> bool {
        self.discover(path)
            .iter()
            .any(|l| l.kind == kind && l.scope == scope)
    }
}
