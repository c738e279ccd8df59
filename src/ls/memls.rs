//! Simple in-memory locksystem.
//!
//! Locks do not survive a restart. Expired locks are pruned lazily
//! whenever the lock table is touched.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::ls::*;

/// Locks never live longer than this, and this is the default.
pub(crate) const MAX_TIMEOUT: Duration = Duration::from_secs(3600);

/// Ephemeral in-memory LockSystem.
#[derive(Debug, Default)]
pub struct MemLs {
    // resource path -> locks rooted at that path.
    locks: Mutex<HashMap<String, Vec<ActiveLock>>>,
}

impl MemLs {
    /// Create a new "memls" locksystem.
    pub fn new() -> Arc<MemLs> {
        Arc::new(MemLs::default())
    }
}

fn clamp_timeout(timeout: Option<Duration>) -> Duration {
    timeout.map(|t| t.min(MAX_TIMEOUT)).unwrap_or(MAX_TIMEOUT)
}

fn prune(locks: &mut HashMap<String, Vec<ActiveLock>>) {
    let now = SystemTime::now();
    locks.retain(|_, v| {
        v.retain(|l| l.timeout_at.map(|t| t > now).unwrap_or(true));
        !v.is_empty()
    });
}

impl DavLockSystem for MemLs {
    fn lock(&self, path: &str, info: LockInfo) -> Result<ActiveLock, ActiveLock> {
        let mut locks = self.locks.lock();
        prune(&mut locks);

        // Locks on the path itself or inherited from above, and when
        // asking for a deep lock, also everything below.
        let conflict = locks
            .values()
            .flatten()
            .filter(|l| l.covers(path) || (info.deep && is_ancestor(path, &l.path)))
            .find(|l| info.scope == LockScope::Exclusive || l.scope == LockScope::Exclusive);
        if let Some(conflict) = conflict {
            debug!("lock {path}: conflicts with {}", conflict.token);
            return Err(conflict.clone());
        }

        let timeout = clamp_timeout(info.timeout);
        let lock = ActiveLock {
            token: format!("opaquelocktoken:{}", Uuid::new_v4()),
            path: path.to_string(),
            scope: info.scope,
            kind: info.kind,
            deep: info.deep,
            owner: info.owner,
            timeout: Some(timeout),
            timeout_at: Some(SystemTime::now() + timeout),
        };
        locks
            .entry(path.to_string())
            .or_default()
            .push(lock.clone());
        Ok(lock)
    }

    fn refresh(&self, path: &str, token: &str, timeout: Option<Duration>) -> Option<ActiveLock> {
        let mut locks = self.locks.lock();
        prune(&mut locks);
        let lock = locks
            .values_mut()
            .flatten()
            .find(|l| l.token == token && l.covers(path))?;
        let timeout = clamp_timeout(timeout);
        lock.timeout = Some(timeout);
        lock.timeout_at = Some(SystemTime::now() + timeout);
        Some(lock.clone())
    }

    fn unlock(&self, path: &str, token: &str) -> bool {
        let mut locks = self.locks.lock();
        prune(&mut locks);
        let root = locks
            .values()
            .flatten()
            .find(|l| l.token == token && l.covers(path))
            .map(|l| l.path.clone());
        let Some(root) = root else {
            return false;
        };
        if let Some(v) = locks.get_mut(&root) {
            v.retain(|l| l.token != token);
            if v.is_empty() {
                locks.remove(&root);
            }
        }
        true
    }

    fn discover(&self, path: &str) -> Vec<ActiveLock> {
        let mut locks = self.locks.lock();
        prune(&mut locks);
        locks
            .values()
            .flatten()
            .filter(|l| l.covers(path))
            .cloned()
            .collect()
    }

    fn held(&self, path: &str) -> Vec<ActiveLock> {
        let mut locks = self.locks.lock();
        prune(&mut locks);
        locks
            .values()
            .flatten()
            .filter(|l| l.path == path || is_ancestor(path, &l.path))
            .cloned()
            .collect()
    }
}
