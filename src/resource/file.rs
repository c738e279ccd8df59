use std::io;

use async_stream::stream;
use bytes::Bytes;
use headers::HeaderMapExt;
use http::{header, HeaderValue, Response, StatusCode};
use tokio::io::AsyncReadExt;

use crate::body::Body;
use crate::errors::{DavError, DavResult};
use crate::fs::{FsError, FsReader};
use crate::ls::{ActiveLock, LockInfo};
use crate::range::ByteRange;
use crate::resource::{DavNode, DavResource, Member, PropName, PropValue};

/// A regular file, or the place where one is about to be created.
pub(crate) struct DavFile {
    pub(crate) node: DavNode,
}

/// A file that is read partially, for GET with a satisfied `Range:`.
pub(crate) struct RangedFile {
    pub(crate) file: DavFile,
    pub(crate) range: ByteRange,
}

// stream `remaining` bytes from `reader`.
fn file_body(mut reader: FsReader, mut remaining: u64, buf_size: usize) -> Body {
    Body::stream(stream! {
        let mut buf = vec![0u8; buf_size];
        while remaining > 0 {
            let want = std::cmp::min(remaining, buf_size as u64) as usize;
            match reader.read(&mut buf[..want]).await {
                // file got shorter while we were reading it.
                Ok(0) => break,
                Ok(n) => {
                    remaining -= n as u64;
                    yield Ok::<Bytes, io::Error>(Bytes::copy_from_slice(&buf[..n]));
                },
                Err(e) => {
                    yield Err(e);
                    break;
                },
            }
        }
    })
}

impl DavFile {
    // headers that are the same for full and ranged reads.
    fn set_headers(&self, res: &mut Response<Body>) {
        let Some(attr) = self.node.attr.as_ref() else {
            return;
        };
        let h = res.headers_mut();
        h.typed_insert(headers::LastModified::from(attr.modified));
        h.typed_insert(headers::ContentType::octet_stream());
        h.typed_insert(headers::AcceptRanges::bytes());
        if let Some(etag) = self.node.etag().and_then(|e| e.parse::<headers::ETag>().ok()) {
            h.typed_insert(etag);
        }
        h.insert(header::CONTENT_DISPOSITION, HeaderValue::from_static("attachment"));
        h.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
    }

    /// Send the file. With `head` only the metadata is set.
    pub(crate) async fn read(
        &self,
        res: &mut Response<Body>,
        head: bool,
        buf_size: usize,
    ) -> DavResult<()> {
        let len = match &self.node.attr {
            Some(attr) => attr.len,
            None => return Err(StatusCode::NOT_FOUND.into()),
        };
        self.set_headers(res);
        res.headers_mut().typed_insert(headers::ContentLength(len));
        if head {
            return Ok(());
        }
        let reader = self.node.fs().open_read(&self.node.path, 0).await?;
        *res.body_mut() = file_body(reader, len, buf_size);
        Ok(())
    }

    pub(crate) async fn move_to(&self, dest: &DavResource) -> DavResult<()> {
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

    /// `shallow` makes no difference for a file.
    pub(crate) async fn copy_to(&self, dest: &DavResource, _shallow: bool) -> DavResult<()> {
        if !self.node.parent_is_dir(dest.path()).await {
            debug!("copy {}: destination parent does not exist", self.node.locator);
            return Err(StatusCode::CONFLICT.into());
        }
        self.node
            .fs()
            .copy_replace(&self.node.path, dest.path())
            .await
            .map_err(DavError::from_destination)
    }

    pub(crate) fn property(&self, name: &PropName) -> Option<PropValue> {
        if name.is_dav("getcontentlength") {
            if let Some(attr) = &self.node.attr {
                return Some(PropValue::Text(attr.len.to_string()));
            }
        }
        if name.is_dav("getcontenttype") {
            return Some(PropValue::Text("application/octet-stream".to_string()));
        }
        self.node.property(name, false)
    }

    /// Lock the file. If it did not exist yet, an empty file is created
    /// in the parent folder. Returns the lock, and whether the file was created.
    pub(crate) async fn lock(&self, info: LockInfo) -> DavResult<(ActiveLock, bool)> {
        let lock = self.node.lock(info)?;
        if self.node.exists() {
            return Ok((lock, false));
        }
        match self.create_placeholder().await {
            Ok(()) => Ok((lock, true)),
            Err(e) => {
                self.node.unlock(&lock.token);
                Err(e)
            }
        }
    }

    async fn create_placeholder(&self) -> DavResult<()> {
        let parent = match self.node.locator.resolve_parent() {
            Some(parent) => parent,
            None => return Err(StatusCode::CONFLICT.into()),
        };
        let parent = match self
            .node
            .factory
            .create_resource(&parent, &self.node.session)
            .await
        {
            Ok(DavResource::Folder(folder)) => folder,
            Ok(_) | Err(DavError::Status(StatusCode::NOT_FOUND)) => {
                return Err(StatusCode::CONFLICT.into());
            }
            Err(e) => return Err(e),
        };
        debug!("{}: creating lock placeholder", self.node.locator);
        parent
            .add_member(Member::File(self, futures_util::stream::empty::<io::Result<Bytes>>()))
            .await
    }
}

impl RangedFile {
    /// Send the part of the file selected by the range.
    pub(crate) async fn read(
        &self,
        res: &mut Response<Body>,
        head: bool,
        buf_size: usize,
    ) -> DavResult<()> {
        let len = match &self.file.node.attr {
            Some(attr) => attr.len,
            None => return Err(StatusCode::NOT_FOUND.into()),
        };
        self.file.set_headers(res);

        if !self.range.is_satisfiable(len) {
            *res.status_mut() = StatusCode::RANGE_NOT_SATISFIABLE;
            res.headers_mut()
                .typed_insert(headers::ContentRange::unsatisfied_bytes(len));
            res.headers_mut().typed_insert(headers::ContentLength(0));
            return Ok(());
        }

        let first = self.range.effective_first_byte(len);
        let last = self.range.effective_last_byte(len);
        let count = last - first + 1;
        *res.status_mut() = StatusCode::PARTIAL_CONTENT;
        if let Ok(range) = headers::ContentRange::bytes(first..=last, len) {
            res.headers_mut().typed_insert(range);
        }
        res.headers_mut().typed_insert(headers::ContentLength(count));
        if head {
            return Ok(());
        }
        let reader = match self.file.node.fs().open_read(&self.file.node.path, first).await {
            Ok(reader) => reader,
            Err(FsError::NotFound) => return Err(StatusCode::NOT_FOUND.into()),
            Err(e) => return Err(e.into()),
        };
        *res.body_mut() = file_body(reader, count, buf_size);
        Ok(())
    }
}
