use std::sync::Arc;

use headers::HeaderMapExt;
use http::{Request, Response};

use crate::body::Body;
use crate::errors::DavResult;
use crate::locator::ResourceLocator;
use crate::resource::DavResource;
use crate::session::DavSession;
use crate::util::DavMethod;
use crate::DavHandler;

impl DavHandler {
    pub(crate) async fn handle_gethead(
        &self,
        req: &Request<()>,
        method: DavMethod,
        locator: &ResourceLocator,
        session: &Arc<DavSession>,
    ) -> DavResult<Response<Body>> {
        let head = method == DavMethod::Head;
        let resource = self
            .factory
            .create_request_resource(method, locator, req, session)
            .await?;

        let mut res = Response::new(Body::empty());
        match &resource {
            // no directory listings, just the metadata.
            DavResource::Folder(folder) => {
                if let Some(modified) = folder.node.modified() {
                    res.headers_mut().typed_insert(headers::LastModified::from(modified));
                }
                res.headers_mut().typed_insert(headers::ContentLength(0));
            }
            DavResource::File(file) => file.read(&mut res, head, self.read_buf_size).await?,
            DavResource::RangedFile(ranged) => ranged.read(&mut res, head, self.read_buf_size).await?,
        }
        Ok(res)
    }
}
