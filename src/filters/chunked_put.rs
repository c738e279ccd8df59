//! Chunked PUT requests from clients that announce the real length in
//! `X-Expected-Entity-Length` (the macOS Finder does this).
//!
//! The request body is cut off after the announced number of bytes.
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use futures_util::ready;
use headers::HeaderMapExt;
use http::{header, HeaderMap, Method, Request, Response, StatusCode};
use http_body::{Body as HttpBody, SizeHint};
use pin_project::pin_project;

use crate::body::Body;
use crate::davheaders::XExpectedEntityLength;

/// A request body that ends after at most `limit` bytes.
#[pin_project]
pub struct LengthBoundedBody<B> {
    #[pin]
    inner: B,
    remaining: Option<u64>,
}

impl<B> LengthBoundedBody<B> {
    pub fn new(inner: B, limit: u64) -> Self {
        LengthBoundedBody {
            inner,
            remaining: Some(limit),
        }
    }

    /// Pass everything through.
    pub fn unbounded(inner: B) -> Self {
        LengthBoundedBody {
            inner,
            remaining: None,
        }
    }
}

impl<B> HttpBody for LengthBoundedBody<B>
where
    B: HttpBody,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_data(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Self::Data, Self::Error>>> {
        let this = self.project();
        if *this.remaining == Some(0) {
            return Poll::Ready(None);
        }
        match ready!(this.inner.poll_data(cx)) {
            Some(Ok(mut buf)) => {
                let mut n = buf.remaining();
                if let Some(remaining) = this.remaining {
                    n = std::cmp::min(n as u64, *remaining) as usize;
                    *remaining -= n as u64;
                }
                Poll::Ready(Some(Ok(buf.copy_to_bytes(n))))
            }
            Some(Err(e)) => Poll::Ready(Some(Err(e))),
            None => Poll::Ready(None),
        }
    }

    fn poll_trailers(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<HeaderMap>, Self::Error>> {
        self.project().inner.poll_trailers(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.remaining == Some(0) || self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        let hint = self.inner.size_hint();
        let Some(remaining) = self.remaining else {
            return hint;
        };
        let mut bounded = SizeHint::new();
        bounded.set_lower(std::cmp::min(hint.lower(), remaining));
        bounded.set_upper(hint.upper().map_or(remaining, |u| std::cmp::min(u, remaining)));
        bounded
    }
}

fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get(header::TRANSFER_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("chunked")))
        .unwrap_or(false)
}

/// Bound the body of a chunked PUT. An unparseable expected length
/// is answered with 400 right away.
pub(crate) fn filter<B>(req: Request<B>) -> Result<Request<LengthBoundedBody<B>>, Response<Body>> {
    let (parts, body) = req.into_parts();
    if parts.method != Method::PUT || !is_chunked(&parts.headers) {
        return Ok(Request::from_parts(parts, LengthBoundedBody::unbounded(body)));
    }
    match parts.headers.typed_try_get::<XExpectedEntityLength>() {
        Ok(Some(XExpectedEntityLength(len))) => {
            trace!("chunked PUT {}: expecting {len} bytes", parts.uri);
            Ok(Request::from_parts(parts, LengthBoundedBody::new(body, len)))
        }
        Ok(None) => Ok(Request::from_parts(parts, LengthBoundedBody::unbounded(body))),
        Err(_) => {
            debug!("chunked PUT {}: invalid X-Expected-Entity-Length", parts.uri);
            let mut res = Response::new(Body::empty());
            *res.status_mut() = StatusCode::BAD_REQUEST;
            res.headers_mut().typed_insert(headers::ContentLength(0));
            Err(res)
        }
    }
}
