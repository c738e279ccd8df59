use std::sync::Arc;

use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::errors::DavResult;
use crate::locator::ResourceLocator;
use crate::session::DavSession;
use crate::util::DavMethod;
use crate::DavHandler;

impl DavHandler {
    /// DELETE is always depth infinity, whatever the Depth: header says.
    pub(crate) async fn handle_delete(
        &self,
        req: &Request<()>,
        locator: &ResourceLocator,
        session: &Arc<DavSession>,
    ) -> DavResult<Response<Body>> {
        let resource = self
            .factory
            .create_request_resource(DavMethod::Delete, locator, req, session)
            .await?;
        self.check_locks(&resource)?;
        if locator.is_root() {
            debug!("refusing to delete the root");
            return Err(StatusCode::FORBIDDEN.into());
        }
        let parent = self.parent_folder(locator, session).await?;
        parent.remove_member(&resource).await?;

        let mut res = Response::new(Body::empty());
        *res.status_mut() = StatusCode::NO_CONTENT;
        res.headers_mut().typed_insert(headers::ContentLength(0));
        Ok(res)
    }
}
