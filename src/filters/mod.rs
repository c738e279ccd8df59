//! Compatibility filters around the `DavHandler`.
//!
//! `DavServer` runs every request through, in order:
//!
//! - request/response logging (debug level),
//! - the chunked PUT filter (`X-Expected-Entity-Length`),
//! - Unicode normalization of the request path, the `Destination:`
//!   header and the hrefs in multistatus responses.
//!
//! Each of them can be switched off in the `DavServerBuilder`.
use std::error::Error as StdError;
use std::sync::Arc;

use bytes::Buf;
use http::{Request, Response};
use http_body::Body as HttpBody;

use crate::body::Body;
use crate::DavHandler;

mod chunked_put;
mod logging;
mod unicode;

pub use chunked_put::LengthBoundedBody;
pub use unicode::{normalize, normalize_href, transform, AllClients, ClientQuirks, Form, UserAgentQuirks};

/// A `DavHandler` wrapped in the compatibility filters.
#[derive(Clone)]
pub struct DavServer {
    handler: DavHandler,
    filesystem_form: Form,
    client_form: Form,
    chunked_put_compat: bool,
    normalize_unicode: bool,
    log_requests: bool,
    quirks: Arc<dyn ClientQuirks>,
}

/// Configuration of the filter chain.
pub struct DavServerBuilder {
    handler: DavHandler,
    filesystem_form: Form,
    client_form: Option<Form>,
    chunked_put_compat: bool,
    normalize_unicode: bool,
    log_requests: bool,
    quirks: Arc<dyn ClientQuirks>,
}

impl DavServerBuilder {
    /// The normalization form of the names on disk. Default `Nfc`.
    pub fn filesystem_form(self, form: Form) -> Self {
        let mut this = self;
        this.filesystem_form = form;
        this
    }

    /// The normalization form of hrefs sent to clients. Defaults to
    /// the opposite of the filesystem form.
    pub fn client_form(self, form: Form) -> Self {
        let mut this = self;
        this.client_form = Some(form);
        this
    }

    pub fn chunked_put_compat(self, on: bool) -> Self {
        let mut this = self;
        this.chunked_put_compat = on;
        this
    }

    pub fn normalize_unicode(self, on: bool) -> Self {
        let mut this = self;
        this.normalize_unicode = on;
        this
    }

    pub fn log_requests(self, on: bool) -> Self {
        let mut this = self;
        this.log_requests = on;
        this
    }

    /// Decides which clients get normalized multistatus responses.
    /// Default is all of them.
    pub fn quirks(self, quirks: Arc<dyn ClientQuirks>) -> Self {
        let mut this = self;
        this.quirks = quirks;
        this
    }

    pub fn build(self) -> DavServer {
        DavServer {
            handler: self.handler,
            filesystem_form: self.filesystem_form,
            client_form: self.client_form.unwrap_or(self.filesystem_form.opposite()),
            chunked_put_compat: self.chunked_put_compat,
            normalize_unicode: self.normalize_unicode,
            log_requests: self.log_requests,
            quirks: self.quirks,
        }
    }
}

impl DavServer {
    pub fn builder(handler: DavHandler) -> DavServerBuilder {
        DavServerBuilder {
            handler,
            filesystem_form: Form::Nfc,
            client_form: None,
            chunked_put_compat: true,
            normalize_unicode: true,
            log_requests: true,
            quirks: Arc::new(AllClients),
        }
    }

    /// The wrapped handler.
    pub fn handler(&self) -> &DavHandler {
        &self.handler
    }

    /// Handle a webdav request.
    pub async fn handle<ReqBody, ReqData, ReqError>(&self, req: Request<ReqBody>) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
    {
        let log_id = if self.log_requests {
            logging::log_request(&req)
        } else {
            None
        };

        let req = if self.chunked_put_compat {
            match chunked_put::filter(req) {
                Ok(req) => req,
                Err(res) => {
                    if let Some(id) = log_id {
                        logging::log_response(id, &res);
                    }
                    return res;
                }
            }
        } else {
            req.map(LengthBoundedBody::unbounded)
        };

        let (mut parts, body) = req.into_parts();
        let mut client_form = None;
        if self.normalize_unicode {
            let mut head = Request::new(());
            *head.method_mut() = parts.method.clone();
            *head.uri_mut() = parts.uri.clone();
            *head.headers_mut() = parts.headers.clone();
            if self.quirks.multistatus_needs_normalization(&head) {
                client_form = Some(self.client_form);
            }
            unicode::normalize_request(&mut parts, self.filesystem_form);
        }

        let mut res = self.handler.handle(Request::from_parts(parts, body)).await;
        if let Some(form) = client_form {
            res = unicode::normalize_response(res, form);
        }
        if let Some(id) = log_id {
            logging::log_response(id, &res);
        }
        res
    }
}
