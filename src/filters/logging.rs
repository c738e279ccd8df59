//! Request and response logging at debug level.
use std::sync::atomic::{AtomicU64, Ordering};

use http::{HeaderMap, Request, Response};

use crate::body::Body;

static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

fn log_headers(headers: &HeaderMap) {
    for (name, value) in headers {
        debug!("  {}: {}", name, String::from_utf8_lossy(value.as_bytes()));
    }
}

/// Log the request line and headers. Returns the id to pass to
/// `log_response`, or `None` when debug logging is off.
pub(crate) fn log_request<B>(req: &Request<B>) -> Option<u64> {
    if !log_enabled!(log::Level::Debug) {
        return None;
    }
    let id = REQUEST_ID.fetch_add(1, Ordering::Relaxed);
    debug!("REQUEST {id}: {} {} {:?}", req.method(), req.uri(), req.version());
    log_headers(req.headers());
    Some(id)
}

pub(crate) fn log_response(id: u64, res: &Response<Body>) {
    debug!("RESPONSE {id}: {}", res.status());
    log_headers(res.headers());
}
