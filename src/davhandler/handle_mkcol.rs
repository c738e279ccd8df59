use std::sync::Arc;

use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::errors::{DavError, DavResult};
use crate::locator::ResourceLocator;
use crate::resource::{DavResource, Member};
use crate::session::DavSession;
use crate::util::DavMethod;
use crate::DavHandler;

impl DavHandler {
    pub(crate) async fn handle_mkcol(
        &self,
        req: &Request<()>,
        locator: &ResourceLocator,
        session: &Arc<DavSession>,
    ) -> DavResult<Response<Body>> {
        let resource = self
            .factory
            .create_request_resource(DavMethod::MkCol, locator, req, session)
            .await?;
        let DavResource::Folder(folder) = &resource else {
            return Err(DavError::Status(StatusCode::METHOD_NOT_ALLOWED));
        };
        let parent = self.parent_folder(locator, session).await?;
        parent.add_member(Member::folder(folder)).await?;

        let mut res = Response::new(Body::empty());
        *res.status_mut() = StatusCode::CREATED;
        res.headers_mut().typed_insert(headers::ContentLength(0));
        Ok(res)
    }
}
