use std::io;
use std::path::PathBuf;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use http::StatusCode;
use tokio::io::AsyncWriteExt;

use crate::errors::{DavError, DavResult};
use crate::fs::{FileKind, FsError};
use crate::resource::{DavFile, DavNode, DavResource, PropName, PropValue};

/// A directory.
pub(crate) struct DavFolder {
    pub(crate) node: DavNode,
}

/// What to add to a folder.
pub(crate) enum Member<'a, S> {
    Folder(&'a DavFolder),
    /// The file plus its content.
    File(&'a DavFile, S),
}

/// Content of a member that has none.
type NoInput = futures_util::stream::Empty<io::Result<Bytes>>;

impl<'a> Member<'a, NoInput> {
    pub(crate) fn folder(folder: &'a DavFolder) -> Self {
        Member::Folder(folder)
    }
}

// creating members: a too long name is the request URI's fault.
fn member_error(e: FsError) -> DavError {
    match e {
        FsError::PathTooLong => DavError::Status(StatusCode::URI_TOO_LONG),
        FsError::Io(e) => DavError::IoError(e),
        other => DavError::IoError(other.into()),
    }
}

impl DavFolder {
    pub(crate) async fn add_member<S>(&self, member: Member<'_, S>) -> DavResult<()>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        match member {
            Member::Folder(folder) => {
                trace!("{}: mkdir {}", self.node.locator, folder.node.locator);
                self.node
                    .fs()
                    .create_dir(&folder.node.path)
                    .await
                    .map_err(member_error)
            }
            Member::File(file, input) => {
                trace!("{}: write {}", self.node.locator, file.node.locator);
                let mut out = self
                    .node
                    .fs()
                    .create_truncate(&file.node.path)
                    .await
                    .map_err(member_error)?;
                pin_utils::pin_mut!(input);
                while let Some(chunk) = input.next().await {
                    out.write_all(&chunk?).await?;
                }
                out.flush().await?;
                Ok(())
            }
        }
    }

    /// The direct children, in whatever order the filesystem lists them.
    /// Anything that is not a file or a directory is skipped.
    pub(crate) async fn get_members(&self) -> DavResult<Vec<DavResource>> {
        let fs = self.node.fs();
        let factory = &self.node.factory;
        let mut members = Vec::new();
        for child in fs.read_dir(&self.node.path).await? {
            let Some(name) = child.file_name().and_then(|n| n.to_str()) else {
                warn!("skipping entry with a non UTF-8 name: {child:?}");
                continue;
            };
            let locator = self.node.locator.resolve_child(name);
            let attr = match fs.symlink_metadata(&child).await {
                Ok(attr) => attr,
                // raced with a delete.
                Err(FsError::NotFound) => continue,
                Err(e) => return Err(e.into()),
            };
            match attr.kind {
                FileKind::Dir => {
                    let folder = factory.create_folder(locator, child, Some(attr), &self.node.session);
                    members.push(DavResource::Folder(folder));
                }
                FileKind::File => {
                    let file = factory.create_file(locator, child, Some(attr), &self.node.session);
                    members.push(DavResource::File(file));
                }
                _ => warn!("encountered unsupported node: {child:?}"),
            }
        }
        Ok(members)
    }

    /// Drop the lock records rooted in a member, then delete it,
    /// recursively. Locks on ancestors are left alone, and a lock below
    /// the member needs its token in the request.
    pub(crate) async fn remove_member(&self, member: &DavResource) -> DavResult<()> {
        let locks = member.node().subtree_locks()?;
        member.node().release_locks(locks);
        match self.node.fs().remove_all(member.path()).await {
            Ok(()) => Ok(()),
            Err(FsError::NotFound) => Err(StatusCode::NOT_FOUND.into()),
            Err(e) => Err(DavError::IoError(e.into())),
        }
    }

    pub(crate) async fn move_to(&self, dest: &DavResource) -> DavResult<()> {
        if !self.node.exists() {
            return Err(StatusCode::NOT_FOUND.into());
        }
        if !self.node.parent_is_dir(dest.path()).await {
            debug!("move {}: destination parent does not exist", self.node.locator);
            return Err(StatusCode::CONFLICT.into());
        }
        self.node
            .fs()
            .rename_replace(&self.node.path, dest.path())
            .await
            .map_err(DavError::from_destination)
    }

    /// Copy the folder. A shallow copy onto a folder only creates the
    /// directory and carries over its timestamps, the creation time only
    /// where the platform can set it.
    pub(crate) async fn copy_to(&self, dest: &DavResource, shallow: bool) -> DavResult<()> {
        let Some(attr) = &self.node.attr else {
            return Err(StatusCode::NOT_FOUND.into());
        };
        if !self.node.parent_is_dir(dest.path()).await {
            debug!("copy {}: destination parent does not exist", self.node.locator);
            return Err(StatusCode::CONFLICT.into());
        }
        let fs = self.node.fs();
        match dest {
            DavResource::Folder(_) if shallow => {
                fs.create_dir(dest.path())
                    .await
                    .map_err(DavError::from_destination)?;
                fs.set_times(dest.path(), attr.modified, attr.accessed, attr.created)
                    .await
                    .map_err(DavError::from_destination)
            }
            _ => self.copy_tree(dest.path().to_path_buf()).await,
        }
    }

    // walk the source tree, replicating directories and files.
    async fn copy_tree(&self, dest: PathBuf) -> DavResult<()> {
        let fs = self.node.fs();
        let mut todo = vec![(self.node.path.clone(), dest)];
        while let Some((from, to)) = todo.pop() {
            match fs.create_dir(&to).await {
                Ok(()) | Err(FsError::Exists) => {}
                Err(e) => return Err(DavError::from_destination(e)),
            }
            for child in fs.read_dir(&from).await.map_err(DavError::from_destination)? {
                let Some(name) = child.file_name() else {
                    continue;
                };
                let target = to.join(name);
                let attr = fs
                    .symlink_metadata(&child)
                    .await
                    .map_err(DavError::from_destination)?;
                match attr.kind {
                    FileKind::Dir => todo.push((child, target)),
                    FileKind::File => fs
                        .copy_replace(&child, &target)
                        .await
                        .map_err(DavError::from_destination)?,
                    _ => debug!("copy: skipping {child:?}"),
                }
            }
        }
        Ok(())
    }

    pub(crate) async fn property(&self, name: &PropName) -> Option<PropValue> {
        if name.is_dav("iscollection") {
            return Some(PropValue::Text("1".to_string()));
        }
        if name.is_dav("quota-available-bytes") || name.is_dav("quota-used-bytes") {
            // no quota information is not an error.
            let space = match self.node.fs().space(&self.node.path).await {
                Ok(space) => space,
                Err(e) => {
                    debug!("{}: no quota: {e}", self.node.locator);
                    return None;
                }
            };
            let value = if name.name == "quota-available-bytes" {
                space.usable
            } else {
                space.total.saturating_sub(space.usable)
            };
            return Some(PropValue::Text(value.to_string()));
        }
        self.node.property(name, true)
    }
}
