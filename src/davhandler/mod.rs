//
// This module contains the main entry point of the library,
// DavHandler.
//
use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Buf;
use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};
use http_body::Body as HttpBody;

use crate::body::Body;
use crate::conditional::{self, IfState};
use crate::davheaders;
use crate::errors::{DavError, DavResult};
use crate::fs::{DavFileSystem, LocalFs};
use crate::locator::{LocatorFactory, ResourceLocator};
use crate::ls::{DavLockSystem, LockScope, LockType, MemLs};
use crate::resolver::{PathResolver, RootPathResolver};
use crate::resource::{DavFolder, DavResource, ResourceFactory};
use crate::session::DavSession;
use crate::util::{dav_method, DavMethod, DavMethodSet};

mod handle_copymove;
mod handle_delete;
mod handle_gethead;
mod handle_lock;
mod handle_mkcol;
mod handle_options;
mod handle_props;
mod handle_put;

/// Default read buffer size for GET, in bytes.
pub(crate) const READ_BUF_SIZE: usize = 16384;

// largest request body we buffer (PROPFIND, PROPPATCH, LOCK).
const MAX_XML_BODY: usize = 65536;

/// Configuration of the handler.
#[derive(Clone)]
pub struct DavBuilder {
    /// Prefix to be stripped off when handling request.
    prefix: String,
    /// Directory that is exposed.
    root: Option<PathBuf>,
    /// Overrides `root`.
    resolver: Option<Arc<dyn PathResolver>>,
    /// Filesystem backend. Defaults to `LocalFs`.
    fs: Option<Arc<dyn DavFileSystem>>,
    /// Locksystem backend.
    ls: LockSystem,
    /// Set of allowed methods (Defaults to "all methods")
    allow: DavMethodSet,
    /// read buffer size in bytes
    read_buf_size: usize,
}

/// Lock system backend.
#[derive(Default, Clone, Debug)]
pub enum LockSystem {
    /// In-memory locks, lost on restart.
    #[default]
    Mem,
    Custom(Arc<dyn DavLockSystem>),
}

impl LockSystem {
    fn build(self) -> Arc<dyn DavLockSystem> {
        match self {
            LockSystem::Mem => MemLs::new(),
            LockSystem::Custom(ls) => ls,
        }
    }
}

impl Default for DavBuilder {
    fn default() -> Self {
        DavBuilder::new()
    }
}

impl DavBuilder {
    /// Create a new configuration builder.
    pub fn new() -> DavBuilder {
        Self {
            prefix: String::new(),
            root: None,
            resolver: None,
            fs: None,
            ls: LockSystem::default(),
            allow: DavMethodSet::all(),
            read_buf_size: READ_BUF_SIZE,
        }
    }

    /// Use the configuration that was built to generate a DavHandler.
    pub fn build(self) -> DavHandler {
        self.into()
    }

    /// The directory that is served. Without one, every request fails
    /// with 404.
    pub fn root(self, root: impl Into<PathBuf>) -> Self {
        let mut this = self;
        this.root = Some(root.into());
        this
    }

    /// Prefix to be stripped off before translating the rest of
    /// the request path to a filesystem path.
    pub fn strip_prefix(self, prefix: impl Into<String>) -> Self {
        let mut this = self;
        this.prefix = prefix.into();
        this
    }

    /// Map request paths with a custom resolver instead of `root`.
    pub fn resolver(self, resolver: Arc<dyn PathResolver>) -> Self {
        let mut this = self;
        this.resolver = Some(resolver);
        this
    }

    /// Set the filesystem backend.
    pub fn filesystem(self, fs: Arc<dyn DavFileSystem>) -> Self {
        let mut this = self;
        this.fs = Some(fs);
        this
    }

    /// Set the locksystem to use.
    pub fn locksystem(self, ls: LockSystem) -> Self {
        let mut this = self;
        this.ls = ls;
        this
    }

    /// Which methods to allow (default is all methods).
    pub fn methods(self, allow: DavMethodSet) -> Self {
        let mut this = self;
        this.allow = allow;
        this
    }

    /// Read buffer size in bytes
    pub fn read_buf_size(self, size: usize) -> Self {
        let mut this = self;
        this.read_buf_size = size;
        this
    }
}

/// The webdav handler struct.
///
/// The `builder` method is used to instantiate a handler, `handle`
/// does the actual work. Cloning is cheap, and all clones share the
/// same lock system.
#[derive(Clone)]
pub struct DavHandler {
    /// Always starts and ends with a slash.
    pub(crate) prefix: Arc<String>,
    pub(crate) factory: Arc<ResourceFactory>,
    pub(crate) allow: DavMethodSet,
    pub(crate) read_buf_size: usize,
}

// "", "/", "dav", "/dav/" -> "/" or "/dav/".
fn canonical_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

impl From<DavBuilder> for DavHandler {
    fn from(cfg: DavBuilder) -> Self {
        let resolver: Arc<dyn PathResolver> = match (cfg.resolver, cfg.root) {
            (Some(resolver), _) => resolver,
            (None, Some(root)) => Arc::new(RootPathResolver::new(root)),
            (None, None) => Arc::new(RootPathResolver::default()),
        };
        let fs: Arc<dyn DavFileSystem> = match cfg.fs {
            Some(fs) => fs,
            None => LocalFs::new(false),
        };
        Self {
            prefix: Arc::new(canonical_prefix(&cfg.prefix)),
            factory: ResourceFactory::new(fs, cfg.ls.build(), resolver),
            allow: cfg.allow,
            read_buf_size: cfg.read_buf_size,
        }
    }
}

impl DavHandler {
    /// Return a configuration builder.
    pub fn builder() -> DavBuilder {
        DavBuilder::new()
    }

    /// Handle a webdav request.
    pub async fn handle<ReqBody, ReqData, ReqError>(&self, req: Request<ReqBody>) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
    {
        self.handle_inner(req).await
    }
}

// the path part of an href, which may be a full URL.
pub(crate) fn href_path(href: &str) -> Option<String> {
    if href.starts_with('/') {
        return Some(href.to_string());
    }
    url::Url::parse(href).ok().map(|url| url.path().to_string())
}

impl DavHandler {
    /// Locator for an encoded absolute path. Paths that are not below
    /// our prefix are an `IllegalPath`.
    pub(crate) fn href_to_locator(&self, href: &str) -> DavResult<ResourceLocator> {
        let mount_point = &self.prefix[..self.prefix.len() - 1];
        if !href.starts_with(self.prefix.as_str()) && href != mount_point {
            return Err(DavError::IllegalPath);
        }
        Ok(LocatorFactory.create_locator(&self.prefix, href)?)
    }

    // the Destination: header, as a locator.
    pub(crate) fn destination_locator(&self, dest: &str) -> DavResult<ResourceLocator> {
        let path = match href_path(dest) {
            Some(path) => path,
            None => {
                debug!("unparseable destination {dest}");
                return Err(StatusCode::BAD_REQUEST.into());
            }
        };
        self.href_to_locator(&path)
    }

    /// The folder `locator` lives in. A missing parent is a conflict.
    pub(crate) async fn parent_folder(
        &self,
        locator: &ResourceLocator,
        session: &Arc<DavSession>,
    ) -> DavResult<DavFolder> {
        let Some(parent) = locator.resolve_parent() else {
            return Err(StatusCode::CONFLICT.into());
        };
        match self.factory.create_resource(&parent, session).await {
            Ok(DavResource::Folder(folder)) => Ok(folder),
            Ok(_) | Err(DavError::Status(StatusCode::NOT_FOUND)) => {
                debug!("{locator}: parent is not a collection");
                Err(StatusCode::CONFLICT.into())
            }
            Err(e) => Err(e),
        }
    }

    /// Refuse to touch a write-locked resource, unless the request
    /// carries the token of one of its locks.
    pub(crate) fn check_locks(&self, res: &DavResource) -> DavResult<()> {
        let node = res.node();
        let locked = node.has_lock(LockType::Write, LockScope::Exclusive)
            || node.has_lock(LockType::Write, LockScope::Shared);
        if !locked {
            return Ok(());
        }
        if node.locks().iter().any(|l| node.session.has_token(&l.token)) {
            return Ok(());
        }
        debug!("{}: locked, and no matching lock token", node.locator);
        Err(StatusCode::LOCKED.into())
    }

    // entity tag and locks of the resource an If: list is about.
    async fn if_state(&self, locator: &ResourceLocator) -> IfState {
        let etag = match self.factory.resolve(locator) {
            Ok(path) => self
                .factory
                .read_attributes(&path)
                .await
                .ok()
                .flatten()
                .map(|attr| format!("\"{}\"", attr.etag())),
            Err(_) => None,
        };
        let lock_tokens = self
            .factory
            .ls
            .discover(locator.resource_path())
            .into_iter()
            .map(|l| l.token)
            .collect();
        IfState { etag, lock_tokens }
    }

    // evaluate the If: header, if any. One matching list is enough.
    async fn check_if_header(&self, req: &Request<()>, locator: &ResourceLocator) -> DavResult<()> {
        let ifh = match req.headers().typed_try_get::<davheaders::If>() {
            Ok(Some(ifh)) => ifh,
            Ok(None) => return Ok(()),
            Err(_) => {
                debug!("{locator}: malformed If header");
                return Err(StatusCode::BAD_REQUEST.into());
            }
        };
        let matched = match conditional::no_lock_override(&ifh) {
            Some(matched) => matched,
            None => {
                let mut matched = false;
                for list in &ifh.0 {
                    let target = match &list.resource_tag {
                        Some(tag) => match href_path(tag).and_then(|p| self.href_to_locator(&p).ok()) {
                            Some(target) => target,
                            None => continue,
                        },
                        None => locator.clone(),
                    };
                    if conditional::list_matches(list, &self.if_state(&target).await) {
                        matched = true;
                        break;
                    }
                }
                matched
            }
        };
        if matched {
            Ok(())
        } else {
            debug!("{locator}: If header does not match");
            Err(StatusCode::PRECONDITION_FAILED.into())
        }
    }

    // drain request body and return it.
    pub(crate) async fn read_request<ReqBody, ReqData, ReqError>(
        &self,
        body: ReqBody,
        max_size: usize,
    ) -> DavResult<Vec<u8>>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let mut data = Vec::new();
        pin_utils::pin_mut!(body);
        while let Some(res) = body.data().await {
            let mut buf = res.map_err(|_| {
                DavError::IoError(io::Error::new(io::ErrorKind::UnexpectedEof, "UnexpectedEof"))
            })?;
            while buf.has_remaining() {
                if data.len() + buf.remaining() > max_size {
                    return Err(StatusCode::PAYLOAD_TOO_LARGE.into());
                }
                let b = buf.chunk();
                let l = b.len();
                data.extend_from_slice(b);
                buf.advance(l);
            }
        }
        Ok(data)
    }

    // internal dispatcher.
    async fn handle_inner<ReqBody, ReqData, ReqError>(&self, req: Request<ReqBody>) -> Response<Body>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let method = req.method().clone();
        let uri = req.uri().clone();

        // Turn any DavError results into a HTTP error response.
        match self.handle2(req).await {
            Ok(resp) => {
                debug!("== END REQUEST result OK");
                resp
            }
            Err(err) => {
                let status = err.statuscode();
                if status.is_server_error() {
                    error!("{method} {uri}: {err}: {err:?}");
                } else {
                    debug!("== END REQUEST result {:?}", err);
                }
                let mut resp = Response::new(Body::empty());
                *resp.status_mut() = status;
                resp.headers_mut().typed_insert(headers::ContentLength(0));
                if err.must_close() {
                    resp.headers_mut().typed_insert(headers::Connection::close());
                }
                resp
            }
        }
    }

    // internal dispatcher part 2.
    async fn handle2<ReqBody, ReqData, ReqError>(&self, req: Request<ReqBody>) -> DavResult<Response<Body>>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let (req, body) = {
            let (parts, body) = req.into_parts();
            (Request::from_parts(parts, ()), body)
        };

        // translate HTTP method to Webdav method.
        let method = match dav_method(req.method()) {
            Ok(m) => m,
            Err(e) => {
                debug!("refusing method {} request {}", req.method(), req.uri());
                return Err(e);
            }
        };

        // see if method is allowed.
        if !self.allow.contains_method(method) {
            debug!("method {} not allowed on request {}", req.method(), req.uri());
            return Err(DavError::StatusClose(StatusCode::METHOD_NOT_ALLOWED));
        }

        // make sure the request path is ours.
        let locator = match self.href_to_locator(req.uri().path()) {
            Ok(locator) => locator,
            Err(DavError::IllegalPath) => {
                debug!("{} is outside of {}", req.uri().path(), self.prefix);
                return Err(StatusCode::NOT_FOUND.into());
            }
            Err(e) => return Err(e),
        };

        let session = Arc::new(DavSession::from_request(&req));
        if method != DavMethod::Options {
            self.check_if_header(&req, &locator).await?;
        }

        debug!("== START REQUEST {:?} {}", method, locator);

        // PUT is the only handler that reads the body itself. All the
        // other handlers either expected no body, or a pre-read Vec<u8>.
        if method == DavMethod::Put {
            return self.handle_put(&req, &locator, &session, body).await;
        }
        let body_data = self.read_request(body, MAX_XML_BODY).await?;

        // Not all methods accept a body.
        match method {
            DavMethod::PropFind | DavMethod::PropPatch | DavMethod::Lock => {}
            _ => {
                if !body_data.is_empty() {
                    return Err(StatusCode::UNSUPPORTED_MEDIA_TYPE.into());
                }
            }
        }

        match method {
            DavMethod::Options => self.handle_options(&req, &locator).await,
            DavMethod::PropFind => self.handle_propfind(&req, &locator, &session, &body_data).await,
            DavMethod::PropPatch => self.handle_proppatch(&req, &locator, &session, &body_data).await,
            DavMethod::MkCol => self.handle_mkcol(&req, &locator, &session).await,
            DavMethod::Delete => self.handle_delete(&req, &locator, &session).await,
            DavMethod::Lock => self.handle_lock(&req, &locator, &session, &body_data).await,
            DavMethod::Unlock => self.handle_unlock(&req, &locator, &session).await,
            DavMethod::Head | DavMethod::Get => self.handle_gethead(&req, method, &locator, &session).await,
            DavMethod::Copy | DavMethod::Move => {
                self.handle_copymove(&req, method, &locator, &session).await
            }
            DavMethod::Put => unreachable!("PUT is handled above"),
        }
    }
}
