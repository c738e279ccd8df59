use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};
use xml::common::XmlVersion;
use xml::writer::{EmitterConfig, EventWriter, XmlEvent as XmlWEvent};
use xmltree::{Element, XMLNode};

use crate::body::Body;
use crate::davheaders::{self, Depth};
use crate::errors::{DavError, DavResult};
use crate::locator::ResourceLocator;
use crate::ls::{ActiveLock, LockInfo, LockScope, LockType};
use crate::resource::DavResource;
use crate::session::DavSession;
use crate::util::{dav_xml_error, DavMethod, MemBuffer};
use crate::DavHandler;

impl DavHandler {
    pub(crate) async fn handle_lock(
        &self,
        req: &Request<()>,
        locator: &ResourceLocator,
        session: &Arc<DavSession>,
        xmldata: &[u8],
    ) -> DavResult<Response<Body>> {
        // an unknown timeout means we pick one.
        let timeout = req
            .headers()
            .typed_try_get::<davheaders::Timeout>()
            .ok()
            .flatten()
            .and_then(|t| t.duration());

        if xmldata.is_empty() {
            return self.refresh_lock(locator, session, timeout).await;
        }

        let deep = match req.headers().typed_try_get::<Depth>() {
            Ok(None) | Ok(Some(Depth::Infinity)) => true,
            Ok(Some(Depth::Zero)) => false,
            _ => return Err(StatusCode::BAD_REQUEST.into()),
        };
        let mut info = parse_lockinfo(xmldata)?;
        info.deep = deep;
        info.timeout = timeout;

        let resource = self
            .factory
            .create_request_resource(DavMethod::Lock, locator, req, session)
            .await?;
        let (lock, created) = match &resource {
            DavResource::Folder(folder) => (folder.node.lock(info)?, false),
            DavResource::File(file) => file.lock(info).await?,
            DavResource::RangedFile(ranged) => ranged.file.lock(info).await?,
        };
        debug!("{locator}: granted {}", lock.token);

        let mut res = lock_response(&lock, locator)?;
        if created {
            *res.status_mut() = StatusCode::CREATED;
        }
        res.headers_mut()
            .typed_insert(davheaders::LockToken(lock.token.clone()));
        Ok(res)
    }

    // LOCK without a body: refresh one of the locks named in the If: header.
    async fn refresh_lock(
        &self,
        locator: &ResourceLocator,
        session: &Arc<DavSession>,
        timeout: Option<Duration>,
    ) -> DavResult<Response<Body>> {
        self.factory.create_resource(locator, session).await?;
        if session.lock_tokens().is_empty() {
            debug!("{locator}: lock refresh without a token");
            return Err(StatusCode::BAD_REQUEST.into());
        }
        let lock = session
            .lock_tokens()
            .iter()
            .find_map(|token| self.factory.ls.refresh(locator.resource_path(), token, timeout));
        match lock {
            Some(lock) => lock_response(&lock, locator),
            None => {
                debug!("{locator}: no lock to refresh");
                Err(StatusCode::PRECONDITION_FAILED.into())
            }
        }
    }

    pub(crate) async fn handle_unlock(
        &self,
        req: &Request<()>,
        locator: &ResourceLocator,
        session: &Arc<DavSession>,
    ) -> DavResult<Response<Body>> {
        let token = match req.headers().typed_try_get::<davheaders::LockToken>() {
            Ok(Some(davheaders::LockToken(token))) => token,
            _ => return Err(StatusCode::BAD_REQUEST.into()),
        };
        let resource = self
            .factory
            .create_request_resource(DavMethod::Unlock, locator, req, session)
            .await?;

        let mut res = Response::new(Body::empty());
        if resource.node().unlock(&token) {
            *res.status_mut() = StatusCode::NO_CONTENT;
            res.headers_mut().typed_insert(headers::ContentLength(0));
        } else {
            debug!("{locator}: {token} is not a lock on this resource");
            *res.status_mut() = StatusCode::CONFLICT;
            res.headers_mut().typed_insert(headers::ContentType::xml());
            *res.body_mut() = dav_xml_error("<D:lock-token-matches-request-uri/>");
        }
        Ok(res)
    }
}

fn parse_lockinfo(xmldata: &[u8]) -> DavResult<LockInfo> {
    let root = Element::parse(xmldata)?;
    if root.name != "lockinfo" {
        return Err(DavError::XmlParseError);
    }
    let mut scope = None;
    let mut write = false;
    let mut owner = None;
    for elem in root.children.iter().filter_map(XMLNode::as_element) {
        match elem.name.as_str() {
            "lockscope" => {
                scope = elem
                    .children
                    .iter()
                    .filter_map(XMLNode::as_element)
                    .find_map(|e| match e.name.as_str() {
                        "exclusive" => Some(LockScope::Exclusive),
                        "shared" => Some(LockScope::Shared),
                        _ => None,
                    })
            }
            "locktype" => {
                write = elem
                    .children
                    .iter()
                    .filter_map(XMLNode::as_element)
                    .any(|e| e.name == "write")
            }
            "owner" => owner = Some(elem.clone()),
            _ => {}
        }
    }
    match (scope, write) {
        (Some(scope), true) => Ok(LockInfo {
            scope,
            kind: LockType::Write,
            deep: true,
            owner,
            timeout: None,
        }),
        _ => Err(DavError::XmlParseError),
    }
}

// 200 with a lockdiscovery body.
fn lock_response(lock: &ActiveLock, locator: &ResourceLocator) -> DavResult<Response<Body>> {
    let mut emitter = EmitterConfig::new().create_writer(MemBuffer::new());
    emitter.write(XmlWEvent::StartDocument {
        version: XmlVersion::Version10,
        encoding: Some("utf-8"),
        standalone: None,
    })?;
    emitter.write(XmlWEvent::start_element("D:prop").ns("D", "DAV:"))?;
    emitter.write(XmlWEvent::start_element("D:lockdiscovery"))?;
    emit_activelock(&mut emitter, lock, locator.prefix())?;
    emitter.write(XmlWEvent::end_element())?;
    emitter.write(XmlWEvent::end_element())?;

    let mut res = Response::new(Body::from(emitter.into_inner().take()));
    res.headers_mut().typed_insert(headers::ContentType::xml());
    Ok(res)
}

fn emit_text<W: Write>(emitter: &mut EventWriter<W>, name: &str, text: &str) -> DavResult<()> {
    emitter.write(XmlWEvent::start_element(name))?;
    emitter.write(XmlWEvent::characters(text))?;
    emitter.write(XmlWEvent::end_element())?;
    Ok(())
}

fn emit_empty<W: Write>(emitter: &mut EventWriter<W>, outer: &str, inner: &str) -> DavResult<()> {
    emitter.write(XmlWEvent::start_element(outer))?;
    emitter.write(XmlWEvent::start_element(inner))?;
    emitter.write(XmlWEvent::end_element())?;
    emitter.write(XmlWEvent::end_element())?;
    Ok(())
}

// copy an element we got from the client.
fn emit_element<W: Write>(emitter: &mut EventWriter<W>, elem: &Element) -> DavResult<()> {
    let mut start = XmlWEvent::start_element(elem.name.as_str());
    if let Some(ns) = &elem.namespace {
        start = start.default_ns(ns.as_str());
    }
    for (name, value) in &elem.attributes {
        start = start.attr(name.as_str(), value.as_str());
    }
    emitter.write(start)?;
    for child in &elem.children {
        match child {
            XMLNode::Element(e) => emit_element(emitter, e)?,
            XMLNode::Text(t) => emitter.write(XmlWEvent::characters(t))?,
            XMLNode::CData(t) => emitter.write(XmlWEvent::cdata(t))?,
            _ => {}
        }
    }
    emitter.write(XmlWEvent::end_element())?;
    Ok(())
}

/// Write a `<D:activelock>`. The `D` prefix must be bound already.
pub(crate) fn emit_activelock<W: Write>(
    emitter: &mut EventWriter<W>,
    lock: &ActiveLock,
    prefix: &str,
) -> DavResult<()> {
    emitter.write(XmlWEvent::start_element("D:activelock"))?;
    match lock.kind {
        LockType::Write => emit_empty(emitter, "D:locktype", "D:write")?,
    }
    match lock.scope {
        LockScope::Exclusive => emit_empty(emitter, "D:lockscope", "D:exclusive")?,
        LockScope::Shared => emit_empty(emitter, "D:lockscope", "D:shared")?,
    }
    emit_text(emitter, "D:depth", if lock.deep { "infinity" } else { "0" })?;
    if let Some(owner) = &lock.owner {
        emitter.write(XmlWEvent::start_element("D:owner"))?;
        for child in &owner.children {
            match child {
                XMLNode::Element(e) => emit_element(emitter, e)?,
                XMLNode::Text(t) => emitter.write(XmlWEvent::characters(t))?,
                _ => {}
            }
        }
        emitter.write(XmlWEvent::end_element())?;
    }
    let timeout = match lock.timeout_at {
        Some(at) => {
            let left = at.duration_since(SystemTime::now()).unwrap_or_default();
            format!("Second-{}", left.as_secs())
        }
        None => "Infinite".to_string(),
    };
    emit_text(emitter, "D:timeout", &timeout)?;

    emitter.write(XmlWEvent::start_element("D:locktoken"))?;
    emit_text(emitter, "D:href", &lock.token)?;
    emitter.write(XmlWEvent::end_element())?;

    let root = ResourceLocator::new(prefix, lock.path.as_str())?;
    emitter.write(XmlWEvent::start_element("D:lockroot"))?;
    emit_text(emitter, "D:href", &root.href(false))?;
    emitter.write(XmlWEvent::end_element())?;

    emitter.write(XmlWEvent::end_element())?;
    Ok(())
}
