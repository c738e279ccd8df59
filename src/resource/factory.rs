use std::path::{Path, PathBuf};
use std::sync::Arc;

use http::{header, Request, StatusCode};

use crate::errors::{DavError, DavResult};
use crate::fs::{DavFileSystem, FileKind, FsError, Meta};
use crate::locator::ResourceLocator;
use crate::ls::DavLockSystem;
use crate::range::{ByteRange, RangeError};
use crate::resolver::PathResolver;
use crate::resource::{DavFile, DavFolder, DavNode, DavResource, RangedFile};
use crate::session::DavSession;
use crate::util::{httpdate_to_systemtime, truncate_to_secs, DavMethod};

/// Decides which kind of resource a request is about.
///
/// Constructed once per handler; resources keep a handle to it so they
/// can materialize their parent or children.
pub(crate) struct ResourceFactory {
    pub(crate) fs: Arc<dyn DavFileSystem>,
    pub(crate) ls: Arc<dyn DavLockSystem>,
    resolver: Arc<dyn PathResolver>,
}

impl ResourceFactory {
    pub(crate) fn new(
        fs: Arc<dyn DavFileSystem>,
        ls: Arc<dyn DavLockSystem>,
        resolver: Arc<dyn PathResolver>,
    ) -> Arc<ResourceFactory> {
        Arc::new(ResourceFactory { fs, ls, resolver })
    }

    /// Map a locator to a filesystem path. Paths outside the root do not exist.
    pub(crate) fn resolve(&self, locator: &ResourceLocator) -> DavResult<PathBuf> {
        self.resolver
            .resolve(locator.resource_path())
            .map_err(|e| {
                debug!("cannot resolve {locator}: {e}");
                DavError::Status(StatusCode::NOT_FOUND)
            })
    }

    /// Attributes of `path`, `None` if there is nothing there.
    pub(crate) async fn read_attributes(&self, path: &Path) -> DavResult<Option<Meta>> {
        match self.fs.symlink_metadata(path).await {
            Ok(attr) => Ok(Some(attr)),
            Err(FsError::NotFound) => Ok(None),
            Err(FsError::PathTooLong) => Err(StatusCode::URI_TOO_LONG.into()),
            Err(e) => Err(DavError::IoError(e.into())),
        }
    }

    fn node(
        self: &Arc<Self>,
        locator: ResourceLocator,
        path: PathBuf,
        attr: Option<Meta>,
        session: &Arc<DavSession>,
    ) -> DavNode {
        DavNode {
            factory: self.clone(),
            locator,
            path,
            attr,
            session: session.clone(),
        }
    }

    pub(crate) fn create_folder(
        self: &Arc<Self>,
        locator: ResourceLocator,
        path: PathBuf,
        attr: Option<Meta>,
        session: &Arc<DavSession>,
    ) -> DavFolder {
        DavFolder {
            node: self.node(locator, path, attr, session),
        }
    }

    pub(crate) fn create_file(
        self: &Arc<Self>,
        locator: ResourceLocator,
        path: PathBuf,
        attr: Option<Meta>,
        session: &Arc<DavSession>,
    ) -> DavFile {
        DavFile {
            node: self.node(locator, path, attr, session),
        }
    }

    /// The resource a request is about.
    pub(crate) async fn create_request_resource(
        self: &Arc<Self>,
        method: DavMethod,
        locator: &ResourceLocator,
        req: &Request<()>,
        session: &Arc<DavSession>,
    ) -> DavResult<DavResource> {
        let path = self.resolve(locator)?;
        let attr = self.read_attributes(&path).await?;
        let locator = locator.clone();

        match (method, attr) {
            (DavMethod::Put, Some(attr)) if attr.kind != FileKind::File => {
                debug!("PUT {locator}: not a regular file");
                Err(StatusCode::CONFLICT.into())
            }
            (DavMethod::Put, _) => Ok(DavResource::File(self.create_file(locator, path, None, session))),
            (DavMethod::MkCol, Some(_)) => Err(StatusCode::METHOD_NOT_ALLOWED.into()),
            (DavMethod::MkCol, None) => {
                Ok(DavResource::Folder(self.create_folder(locator, path, None, session)))
            }
            (DavMethod::Lock, None) => Ok(DavResource::File(self.create_file(locator, path, None, session))),
            (_, None) => Err(StatusCode::NOT_FOUND.into()),
            (_, Some(attr)) if attr.is_dir() => {
                Ok(DavResource::Folder(self.create_folder(locator, path, Some(attr), session)))
            }
            (DavMethod::Get, Some(attr)) if attr.is_file() && req.headers().contains_key(header::RANGE) => {
                let file = self.create_file(locator, path, Some(attr), session);
                self.create_ranged_file(file, req)
            }
            (_, Some(attr)) if attr.is_file() => {
                Ok(DavResource::File(self.create_file(locator, path, Some(attr), session)))
            }
            (_, Some(_)) => {
                debug!("{locator}: not a file or directory");
                Err(StatusCode::NOT_FOUND.into())
            }
        }
    }

    /// The destination of a MOVE or COPY, typed after the source.
    pub(crate) async fn create_destination_resource(
        self: &Arc<Self>,
        src: &ResourceLocator,
        dst: &ResourceLocator,
        session: &Arc<DavSession>,
    ) -> DavResult<DavResource> {
        let src_path = self.resolve(src)?;
        let dst_path = self.resolve(dst)?;
        let src_attr = match self.read_attributes(&src_path).await? {
            Some(attr) => attr,
            None => return Err(StatusCode::NOT_FOUND.into()),
        };
        let dst_attr = self.read_attributes(&dst_path).await?;
        let dst = dst.clone();
        if src_attr.is_dir() {
            Ok(DavResource::Folder(self.create_folder(dst, dst_path, dst_attr, session)))
        } else {
            Ok(DavResource::File(self.create_file(dst, dst_path, dst_attr, session)))
        }
    }

    /// Any existing resource, regardless of the request method.
    pub(crate) async fn create_resource(
        self: &Arc<Self>,
        locator: &ResourceLocator,
        session: &Arc<DavSession>,
    ) -> DavResult<DavResource> {
        let path = self.resolve(locator)?;
        let attr = match self.read_attributes(&path).await? {
            Some(attr) => attr,
            None => return Err(StatusCode::NOT_FOUND.into()),
        };
        let locator = locator.clone();
        if attr.is_dir() {
            Ok(DavResource::Folder(self.create_folder(locator, path, Some(attr), session)))
        } else {
            Ok(DavResource::File(self.create_file(locator, path, Some(attr), session)))
        }
    }

    // GET with a Range: header. Falls back to the full file where allowed.
    fn create_ranged_file(&self, file: DavFile, req: &Request<()>) -> DavResult<DavResource> {
        if let Some(if_range) = req.headers().get(header::IF_RANGE) {
            let expected = if_range.to_str().ok().and_then(httpdate_to_systemtime);
            let Some(expected) = expected else {
                debug!("{}: unparseable If-Range {if_range:?}", file.node.locator);
                return Err(StatusCode::BAD_REQUEST.into());
            };
            let actual = file.node.modified().map(truncate_to_secs);
            if actual != Some(expected) {
                trace!("{}: If-Range does not match, sending full file", file.node.locator);
                return Ok(DavResource::File(file));
            }
        }

        let range = req
            .headers()
            .get(header::RANGE)
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default();
        match ByteRange::parse(range) {
            Ok(range) => Ok(DavResource::RangedFile(RangedFile { file, range })),
            Err(RangeError::Unsupported) => {
                trace!("{}: ignoring unsupported range {range}", file.node.locator);
                Ok(DavResource::File(file))
            }
            Err(RangeError::Malformed) => {
                debug!("{}: malformed range {range}", file.node.locator);
                Err(StatusCode::BAD_REQUEST.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFs;
    use crate::locator::LocatorFactory;
    use crate::ls::MemLs;
    use crate::resolver::RootPathResolver;
    use crate::util::systemtime_to_httpdate;

    struct Fixture {
        dir: tempfile::TempDir,
        factory: Arc<ResourceFactory>,
        session: Arc<DavSession>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("folder")).unwrap();
        std::fs::write(dir.path().join("file.txt"), b"0123456789").unwrap();
        let factory = ResourceFactory::new(
            LocalFs::new(false),
            MemLs::new(),
            Arc::new(RootPathResolver::new(dir.path())),
        );
        Fixture {
            dir,
            factory,
            session: Arc::new(DavSession::default()),
        }
    }

    fn locator(path: &str) -> ResourceLocator {
        LocatorFactory.create_locator("/", path).unwrap()
    }

    fn get(headers: &[(&str, &str)]) -> Request<()> {
        let mut req = Request::builder().method("GET").uri("/file.txt");
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        req.body(()).unwrap()
    }

    async fn create(
        f: &Fixture,
        method: DavMethod,
        path: &str,
        req: &Request<()>,
    ) -> DavResult<DavResource> {
        f.factory
            .create_request_resource(method, &locator(path), req, &f.session)
            .await
    }

    fn status(res: DavResult<DavResource>) -> StatusCode {
        match res {
            Ok(_) => StatusCode::OK,
            Err(e) => e.statuscode(),
        }
    }

    #[tokio::test]
    async fn put_onto_folder_conflicts() {
        let f = fixture();
        let req = get(&[]);
        assert_eq!(status(create(&f, DavMethod::Put, "/folder", &req).await), StatusCode::CONFLICT);
        let res = create(&f, DavMethod::Put, "/file.txt", &req).await.unwrap();
        assert!(matches!(res, DavResource::File(_)));
        assert!(!res.exists());
    }

    #[tokio::test]
    async fn mkcol_onto_anything_is_not_allowed() {
        let f = fixture();
        let req = get(&[]);
        for path in ["/folder", "/file.txt"] {
            let res = create(&f, DavMethod::MkCol, path, &req).await;
            assert_eq!(status(res), StatusCode::METHOD_NOT_ALLOWED, "{path}");
        }
        let res = create(&f, DavMethod::MkCol, "/new", &req).await.unwrap();
        assert!(matches!(res, DavResource::Folder(_)));
    }

    #[tokio::test]
    async fn lock_on_missing_is_a_file() {
        let f = fixture();
        let req = get(&[]);
        let res = create(&f, DavMethod::Lock, "/new.txt", &req).await.unwrap();
        assert!(matches!(res, DavResource::File(_)));
        assert_eq!(status(create(&f, DavMethod::Get, "/new.txt", &req).await), StatusCode::NOT_FOUND);
        assert_eq!(status(create(&f, DavMethod::Get, "/../etc", &req).await), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ranges() {
        let f = fixture();
        let res = create(&f, DavMethod::Get, "/file.txt", &get(&[("range", "bytes=2-3")])).await;
        assert!(matches!(res, Ok(DavResource::RangedFile(_))));
        let res = create(&f, DavMethod::Get, "/file.txt", &get(&[("range", "cats=2-3")])).await;
        assert!(matches!(res, Ok(DavResource::File(_))));
        let res = create(&f, DavMethod::Get, "/file.txt", &get(&[("range", "bytes=3-2")])).await;
        assert_eq!(status(res), StatusCode::BAD_REQUEST);
        let res = create(&f, DavMethod::Head, "/file.txt", &get(&[("range", "bytes=2-3")])).await;
        assert!(matches!(res, Ok(DavResource::File(_))));
    }

    #[tokio::test]
    async fn if_range() {
        let f = fixture();
        let mtime = std::fs::metadata(f.dir.path().join("file.txt")).unwrap().modified().unwrap();
        let date = systemtime_to_httpdate(mtime);
        let h = [("range", "bytes=2-3"), ("if-range", date.as_str())];
        let res = create(&f, DavMethod::Get, "/file.txt", &get(&h)).await;
        assert!(matches!(res, Ok(DavResource::RangedFile(_))));

        let h = [("range", "bytes=2-3"), ("if-range", "Sun, 06 Nov 1994 08:49:37 GMT")];
        let res = create(&f, DavMethod::Get, "/file.txt", &get(&h)).await;
        assert!(matches!(res, Ok(DavResource::File(_))));

        let h = [("range", "bytes=2-3"), ("if-range", "\"some-etag\"")];
        let res = create(&f, DavMethod::Get, "/file.txt", &get(&h)).await;
        assert_eq!(status(res), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn destination_is_typed_after_source() {
        let f = fixture();
        let res = f
            .factory
            .create_destination_resource(&locator("/folder"), &locator("/copy"), &f.session)
            .await
            .unwrap();
        assert!(matches!(res, DavResource::Folder(_)));
        assert!(!res.exists());
        let res = f
            .factory
            .create_destination_resource(&locator("/file.txt"), &locator("/folder"), &f.session)
            .await
            .unwrap();
        assert!(matches!(res, DavResource::File(_)));
        assert!(res.exists());
        let res = f
            .factory
            .create_destination_resource(&locator("/missing"), &locator("/x"), &f.session)
            .await;
        assert_eq!(status(res), StatusCode::NOT_FOUND);
    }
}
