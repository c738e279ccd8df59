use std::sync::Arc;

use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::davheaders::{Depth, Destination, Overwrite};
use crate::errors::DavResult;
use crate::locator::ResourceLocator;
use crate::session::DavSession;
use crate::util::DavMethod;
use crate::DavHandler;

impl DavHandler {
    pub(crate) async fn handle_copymove(
        &self,
        req: &Request<()>,
        method: DavMethod,
        locator: &ResourceLocator,
        session: &Arc<DavSession>,
    ) -> DavResult<Response<Body>> {
        // only COPY may be shallow.
        let deep = match req.headers().typed_try_get::<Depth>() {
            Ok(None) | Ok(Some(Depth::Infinity)) => true,
            Ok(Some(Depth::Zero)) if method == DavMethod::Copy => false,
            _ => return Err(StatusCode::BAD_REQUEST.into()),
        };
        let overwrite = match req.headers().typed_try_get::<Overwrite>() {
            Ok(o) => o.map(|Overwrite(o)| o).unwrap_or(true),
            Err(_) => return Err(StatusCode::BAD_REQUEST.into()),
        };
        let dest = match req.headers().typed_try_get::<Destination>() {
            Ok(Some(Destination(dest))) => dest,
            _ => {
                debug!("{method:?} {locator}: missing or invalid Destination");
                return Err(StatusCode::BAD_REQUEST.into());
            }
        };
        let dest = self.destination_locator(&dest)?;

        let source = self
            .factory
            .create_request_resource(method, locator, req, session)
            .await?;
        if method == DavMethod::Move {
            self.check_locks(&source)?;
        }
        let target = self
            .factory
            .create_destination_resource(locator, &dest, session)
            .await?;
        self.check_locks(&target)?;

        // onto itself, or into itself.
        if dest.is_within(locator) {
            debug!("{method:?} {locator}: destination {dest} is inside the source");
            return Err(StatusCode::FORBIDDEN.into());
        }
        // overwriting the destination would remove the source.
        if target.exists() && locator.is_within(&dest) {
            debug!("{method:?} {locator}: source is inside destination {dest}");
            return Err(StatusCode::FORBIDDEN.into());
        }

        // locks do not travel with the resource.
        let held = match method {
            DavMethod::Move => source.node().subtree_locks()?,
            _ => Vec::new(),
        };

        let existed = target.exists();
        if existed {
            if !overwrite {
                debug!("{method:?} {locator}: {dest} exists, Overwrite: F");
                return Err(StatusCode::PRECONDITION_FAILED.into());
            }
            let parent = self.parent_folder(&dest, session).await?;
            parent.remove_member(&target).await?;
        }

        match method {
            DavMethod::Move => {
                source.move_to(&target).await?;
                source.node().release_locks(held);
            }
            _ => source.copy_to(&target, !deep).await?,
        }

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
