use std::error::Error as StdError;
use std::io;
use std::sync::Arc;

use async_stream::stream;
use bytes::{Buf, Bytes};
use futures_util::Stream;
use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};
use http_body::Body as HttpBody;

use crate::body::Body;
use crate::errors::{DavError, DavResult};
use crate::locator::ResourceLocator;
use crate::resource::{DavResource, Member};
use crate::session::DavSession;
use crate::util::DavMethod;
use crate::DavHandler;

// the request body as a stream of byte chunks. A broken body counts as
// a short read.
fn body_stream<ReqBody, ReqData, ReqError>(body: ReqBody) -> impl Stream<Item = io::Result<Bytes>>
where
    ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
    ReqData: Buf + Send + 'static,
    ReqError: StdError + Send + Sync + 'static,
{
    stream! {
        pin_utils::pin_mut!(body);
        while let Some(chunk) = body.data().await {
            match chunk {
                Ok(mut buf) => {
                    let n = buf.remaining();
                    yield Ok(buf.copy_to_bytes(n));
                }
                Err(e) => {
                    yield Err(io::Error::new(io::ErrorKind::UnexpectedEof, e));
                    break;
                }
            }
        }
    }
}

impl DavHandler {
    pub(crate) async fn handle_put<ReqBody, ReqData, ReqError>(
        &self,
        req: &Request<()>,
        locator: &ResourceLocator,
        session: &Arc<DavSession>,
        body: ReqBody,
    ) -> DavResult<Response<Body>>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let resource = self
            .factory
            .create_request_resource(DavMethod::Put, locator, req, session)
            .await?;
        let DavResource::File(file) = &resource else {
            return Err(DavError::Status(StatusCode::CONFLICT));
        };
        self.check_locks(&resource)?;
        let parent = self.parent_folder(locator, session).await?;

        // the factory does not look at files it is about to overwrite.
        let existed = self.factory.read_attributes(&file.node.path).await?.is_some();
        parent.add_member(Member::File(file, body_stream(body))).await?;

        let mut res = Response::new(Body::empty());
        *res.status_mut() = if existed {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::CREATED
        };
        res.headers_mut().typed_insert(headers::ContentLength(0));
        Ok(res)
    }
}
