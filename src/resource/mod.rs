//! The resource tree.
//!
//! A request works on [`DavResource`]s, which are a closed set of
//! variants. All variants share a [`DavNode`] that carries the
//! locator, the resolved filesystem path and the attributes snapshot
//! taken when the resource was created. The snapshot is never refreshed
//! during a request.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use http::StatusCode;

use crate::errors::{DavError, DavResult};
use crate::fs::{DavFileSystem, Meta};
use crate::locator::ResourceLocator;
use crate::ls::{ActiveLock, DavLockSystem, LockInfo, LockScope, LockType};
use crate::session::DavSession;
use crate::util::{systemtime_to_httpdate, systemtime_to_rfc3339};

mod factory;
mod file;
mod folder;

pub(crate) use factory::ResourceFactory;
pub(crate) use file::{DavFile, RangedFile};
pub(crate) use folder::{DavFolder, Member};

pub(crate) const NS_DAV_URI: &str = "DAV:";
pub(crate) const NS_MS_URI: &str = "urn:schemas-microsoft-com:";

/// Name of a property: namespace plus local name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PropName {
    pub namespace: Option<String>,
    pub name: String,
}

impl PropName {
    pub(crate) fn dav(name: &str) -> PropName {
        PropName {
            namespace: Some(NS_DAV_URI.to_string()),
            name: name.to_string(),
        }
    }

    pub(crate) fn is_dav(&self, name: &str) -> bool {
        self.namespace.as_deref() == Some(NS_DAV_URI) && self.name == name
    }

    pub(crate) fn is_ms(&self, name: &str) -> bool {
        self.namespace.as_deref() == Some(NS_MS_URI) && self.name == name
    }
}

/// Value of a live property.
#[derive(Debug, Clone)]
pub(crate) enum PropValue {
    Text(String),
    /// `<D:resourcetype>`, with `<D:collection/>` if true.
    ResourceType(bool),
    LockDiscovery(Vec<ActiveLock>),
    SupportedLock,
}

// properties every resource has, also the "allprop" set.
const BASE_PROPS: &[&str] = &[
    "creationdate",
    "displayname",
    "getetag",
    "getlastmodified",
    "lockdiscovery",
    "resourcetype",
    "supportedlock",
];

/// State shared by every resource variant.
pub(crate) struct DavNode {
    pub(crate) factory: Arc<ResourceFactory>,
    pub(crate) locator: ResourceLocator,
    pub(crate) path: PathBuf,
    pub(crate) attr: Option<Meta>,
    pub(crate) session: Arc<DavSession>,
}

impl DavNode {
    pub(crate) fn fs(&self) -> &dyn DavFileSystem {
        &*self.factory.fs
    }

    pub(crate) fn ls(&self) -> &dyn DavLockSystem {
        &*self.factory.ls
    }

    pub(crate) fn exists(&self) -> bool {
        self.attr.is_some()
    }

    pub(crate) fn resource_path(&self) -> &str {
        self.locator.resource_path()
    }

    pub(crate) fn modified(&self) -> Option<SystemTime> {
        self.attr.as_ref().map(|a| a.modified)
    }

    pub(crate) fn etag(&self) -> Option<String> {
        self.attr.as_ref().map(|a| format!("\"{}\"", a.etag()))
    }

    /// Active locks, queried from the lock system every time.
    pub(crate) fn locks(&self) -> Vec<ActiveLock> {
        self.ls().discover(self.resource_path())
    }

    pub(crate) fn has_lock(&self, kind: LockType, scope: LockScope) -> bool {
        self.ls().has_lock(self.resource_path(), kind, scope)
    }

    /// Grant a lock, `Locked` if it conflicts with an existing one.
    pub(crate) fn lock(&self, info: LockInfo) -> DavResult<ActiveLock> {
        match self.ls().lock(self.resource_path(), info) {
            Ok(lock) => Ok(lock),
            Err(conflict) => {
                debug!("{}: lock conflicts with {}", self.locator, conflict.token);
                Err(DavError::Status(StatusCode::LOCKED))
            }
        }
    }

    pub(crate) fn unlock(&self, token: &str) -> bool {
        self.ls().unlock(self.resource_path(), token)
    }

    /// The lock records rooted at this node or below it. A lock further
    /// down whose token the request does not present makes it `Locked`.
    pub(crate) fn subtree_locks(&self) -> DavResult<Vec<ActiveLock>> {
        let path = self.resource_path();
        let held = self.ls().held(path);
        if let Some(lock) = held
            .iter()
            .find(|l| l.path != path && !self.session.has_token(&l.token))
        {
            debug!("{}: {} is locked by {}", self.locator, lock.path, lock.token);
            return Err(StatusCode::LOCKED.into());
        }
        Ok(held)
    }

    /// Drop lock records whose resource is gone.
    pub(crate) fn release_locks(&self, locks: Vec<ActiveLock>) {
        let ls = self.ls();
        for lock in locks {
            ls.unlock(&lock.path, &lock.token);
        }
    }

    /// Is the parent of `dest` an existing directory.
    pub(crate) async fn parent_is_dir(&self, dest: &Path) -> bool {
        let Some(parent) = dest.parent() else {
            return false;
        };
        self.fs()
            .symlink_metadata(parent)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    fn property(&self, name: &PropName, collection: bool) -> Option<PropValue> {
        if name.namespace.as_deref() != Some(NS_DAV_URI) {
            return None;
        }
        let attr = self.attr.as_ref();
        let value = match name.name.as_str() {
            "resourcetype" => PropValue::ResourceType(collection),
            "displayname" => PropValue::Text(self.locator.name().to_string()),
            "getlastmodified" => PropValue::Text(systemtime_to_httpdate(attr?.modified)),
            "creationdate" => {
                let a = attr?;
                PropValue::Text(systemtime_to_rfc3339(a.created.unwrap_or(a.modified)))
            }
            "getetag" => PropValue::Text(self.etag()?),
            "lockdiscovery" => PropValue::LockDiscovery(self.locks()),
            "supportedlock" => PropValue::SupportedLock,
            _ => return None,
        };
        Some(value)
    }
}

/// A resource, as materialized by the [`ResourceFactory`].
pub(crate) enum DavResource {
    File(DavFile),
    Folder(DavFolder),
    RangedFile(RangedFile),
}

impl DavResource {
    pub(crate) fn node(&self) -> &DavNode {
        match self {
            DavResource::File(f) => &f.node,
            DavResource::Folder(f) => &f.node,
            DavResource::RangedFile(r) => &r.file.node,
        }
    }

    pub(crate) fn locator(&self) -> &ResourceLocator {
        &self.node().locator
    }

    pub(crate) fn path(&self) -> &Path {
        &self.node().path
    }

    pub(crate) fn exists(&self) -> bool {
        self.node().exists()
    }

    pub(crate) fn is_collection(&self) -> bool {
        matches!(self, DavResource::Folder(_))
    }

    pub(crate) fn href(&self) -> String {
        self.locator().href(self.is_collection())
    }

    pub(crate) async fn move_to(&self, dest: &DavResource) -> DavResult<()> {
        match self {
            DavResource::File(f) => f.move_to(dest).await,
            DavResource::RangedFile(r) => r.file.move_to(dest).await,
            DavResource::Folder(f) => f.move_to(dest).await,
        }
    }

    pub(crate) async fn copy_to(&self, dest: &DavResource, shallow: bool) -> DavResult<()> {
        match self {
            DavResource::File(f) => f.copy_to(dest, shallow).await,
            DavResource::RangedFile(r) => r.file.copy_to(dest, shallow).await,
            DavResource::Folder(f) => f.copy_to(dest, shallow).await,
        }
    }

    /// Names of the live properties. Without `all`, only the set that
    /// is returned for `<allprop/>`.
    pub(crate) fn property_names(&self, all: bool) -> Vec<PropName> {
        let mut names: Vec<PropName> = BASE_PROPS.iter().map(|n| PropName::dav(n)).collect();
        match self {
            DavResource::File(_) | DavResource::RangedFile(_) => {
                names.push(PropName::dav("getcontentlength"));
                names.push(PropName::dav("getcontenttype"));
            }
            DavResource::Folder(_) => {
                names.push(PropName::dav("iscollection"));
                if all {
                    names.push(PropName::dav("quota-available-bytes"));
                    names.push(PropName::dav("quota-used-bytes"));
                }
            }
        }
        names
    }

    /// Value of a live property, `None` if the resource does not have it.
    pub(crate) async fn property(&self, name: &PropName) -> Option<PropValue> {
        match self {
            DavResource::File(f) => f.property(name),
            DavResource::RangedFile(r) => r.file.property(name),
            DavResource::Folder(f) => f.property(name).await,
        }
    }
}
