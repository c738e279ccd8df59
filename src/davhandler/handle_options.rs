use headers::HeaderMapExt;
use http::{HeaderValue, Request, Response, StatusCode};

use crate::body::Body;
use crate::errors::DavResult;
use crate::locator::ResourceLocator;
use crate::util::DavMethod;
use crate::DavHandler;

impl DavHandler {
    pub(crate) async fn handle_options(
        &self,
        _req: &Request<()>,
        locator: &ResourceLocator,
    ) -> DavResult<Response<Body>> {
        let mut res = Response::new(Body::empty());

        let h = res.headers_mut();

        // We advertise class 2 even if LOCK is not in the allowed set,
        // clients then simply get a 405 when they try.
        h.insert("dav", HeaderValue::from_static("1, 2"));
        h.insert("ms-author-via", HeaderValue::from_static("DAV"));
        h.typed_insert(headers::ContentLength(0));

        // Helper to add method to array if method is in fact allowed.
        let mm = |v: &mut Vec<&str>, m: &'static str, y: DavMethod| {
            if self.allow.contains_method(y) {
                v.push(m);
            }
        };

        let attr = match self.factory.resolve(locator) {
            Ok(path) => self.factory.read_attributes(&path).await?,
            Err(_) => None,
        };
        let is_unmapped = attr.is_none();
        let is_file = attr.map(|m| m.is_file()).unwrap_or_default();

        let mut v = Vec::new();
        if is_unmapped {
            mm(&mut v, "OPTIONS", DavMethod::Options);
            mm(&mut v, "MKCOL", DavMethod::MkCol);
            mm(&mut v, "PUT", DavMethod::Put);
            mm(&mut v, "LOCK", DavMethod::Lock);
        } else {
            if is_file {
                mm(&mut v, "HEAD", DavMethod::Head);
                mm(&mut v, "GET", DavMethod::Get);
                mm(&mut v, "PUT", DavMethod::Put);
            }
            mm(&mut v, "OPTIONS", DavMethod::Options);
            mm(&mut v, "PROPFIND", DavMethod::PropFind);
            mm(&mut v, "PROPPATCH", DavMethod::PropPatch);
            mm(&mut v, "COPY", DavMethod::Copy);
            if !locator.is_root() {
                mm(&mut v, "MOVE", DavMethod::Move);
                mm(&mut v, "DELETE", DavMethod::Delete);
            }
            mm(&mut v, "LOCK", DavMethod::Lock);
            mm(&mut v, "UNLOCK", DavMethod::Unlock);
        }

        let a = HeaderValue::from_str(&v.join(",")).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        res.headers_mut().insert(http::header::ALLOW, a);

        Ok(res)
    }
}
