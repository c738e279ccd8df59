use std::io;
use std::sync::Arc;

use async_stream::stream;
use bytes::Bytes;
use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};
use xml::common::XmlVersion;
use xml::writer::{EmitterConfig, EventWriter, XmlEvent as XmlWEvent};
use xmltree::{Element, XMLNode};

use super::handle_lock::emit_activelock;
use crate::body::Body;
use crate::davheaders::Depth;
use crate::errors::{DavError, DavResult};
use crate::locator::ResourceLocator;
use crate::resource::{DavResource, PropName, PropValue, NS_DAV_URI, NS_MS_URI};
use crate::session::DavSession;
use crate::util::{dav_xml_error, httpdate_to_systemtime, DavMethod, MemBuffer};
use crate::DavHandler;

// what a PROPFIND asks for.
enum PropFind {
    AllProp,
    PropName,
    Prop(Vec<PropName>),
}

fn propname(elem: &Element) -> PropName {
    PropName {
        namespace: elem.namespace.clone(),
        name: elem.name.clone(),
    }
}

// an empty body means allprop.
fn parse_propfind(xmldata: &[u8]) -> DavResult<PropFind> {
    if xmldata.is_empty() {
        return Ok(PropFind::AllProp);
    }
    let root = Element::parse(xmldata)?;
    if root.name != "propfind" {
        return Err(DavError::XmlParseError);
    }
    for elem in root.children.iter().filter_map(XMLNode::as_element) {
        match elem.name.as_str() {
            "allprop" => return Ok(PropFind::AllProp),
            "propname" => return Ok(PropFind::PropName),
            "prop" => {
                let names = elem
                    .children
                    .iter()
                    .filter_map(XMLNode::as_element)
                    .map(propname)
                    .collect();
                return Ok(PropFind::Prop(names));
            }
            _ => {}
        }
    }
    Err(DavError::XmlParseError)
}

// properties grouped by the status they get in a propstat.
type PropStat = (StatusCode, Vec<(PropName, Option<PropValue>)>);

/// Writes a multistatus document piecewise.
struct MultiStatus {
    emitter: EventWriter<MemBuffer>,
    prefix: String,
}

impl MultiStatus {
    fn new(prefix: &str) -> DavResult<MultiStatus> {
        let mut emitter = EmitterConfig::new().create_writer(MemBuffer::new());
        emitter.write(XmlWEvent::StartDocument {
            version: XmlVersion::Version10,
            encoding: Some("utf-8"),
            standalone: None,
        })?;
        emitter.write(XmlWEvent::start_element("D:multistatus").ns("D", NS_DAV_URI))?;
        Ok(MultiStatus {
            emitter,
            prefix: prefix.to_string(),
        })
    }

    // one <D:response>, returns everything written since the last call.
    fn response(&mut self, href: &str, propstats: &[PropStat]) -> DavResult<Bytes> {
        self.emitter.write(XmlWEvent::start_element("D:response"))?;
        self.text("D:href", href)?;
        for (status, props) in propstats.iter().filter(|(_, p)| !p.is_empty()) {
            self.emitter.write(XmlWEvent::start_element("D:propstat"))?;
            self.emitter.write(XmlWEvent::start_element("D:prop"))?;
            for (name, value) in props {
                self.prop(name, value.as_ref())?;
            }
            self.emitter.write(XmlWEvent::end_element())?;
            self.text("D:status", &format!("HTTP/1.1 {status}"))?;
            self.emitter.write(XmlWEvent::end_element())?;
        }
        self.emitter.write(XmlWEvent::end_element())?;
        Ok(self.emitter.inner_mut().take())
    }

    fn finish(mut self) -> DavResult<Bytes> {
        self.emitter.write(XmlWEvent::end_element())?;
        Ok(self.emitter.inner_mut().take())
    }

    fn text(&mut self, name: &str, text: &str) -> DavResult<()> {
        self.emitter.write(XmlWEvent::start_element(name))?;
        self.emitter.write(XmlWEvent::characters(text))?;
        self.emitter.write(XmlWEvent::end_element())?;
        Ok(())
    }

    fn empty(&mut self, name: &str) -> DavResult<()> {
        self.emitter.write(XmlWEvent::start_element(name))?;
        self.emitter.write(XmlWEvent::end_element())?;
        Ok(())
    }

    fn prop(&mut self, name: &PropName, value: Option<&PropValue>) -> DavResult<()> {
        let (qname, ns) = match name.namespace.as_deref() {
            Some(NS_DAV_URI) => (format!("D:{}", name.name), None),
            Some(NS_MS_URI) => (format!("Z:{}", name.name), Some(("Z", NS_MS_URI))),
            Some(other) => (format!("X:{}", name.name), Some(("X", other))),
            None => (name.name.clone(), None),
        };
        let mut start = XmlWEvent::start_element(qname.as_str());
        if let Some((prefix, uri)) = ns {
            start = start.ns(prefix, uri);
        }
        self.emitter.write(start)?;
        match value {
            None | Some(PropValue::ResourceType(false)) => {}
            Some(PropValue::Text(t)) => self.emitter.write(XmlWEvent::characters(t))?,
            Some(PropValue::ResourceType(true)) => self.empty("D:collection")?,
            Some(PropValue::LockDiscovery(locks)) => {
                for lock in locks {
                    emit_activelock(&mut self.emitter, lock, &self.prefix)?;
                }
            }
            Some(PropValue::SupportedLock) => {
                for scope in ["D:exclusive", "D:shared"] {
                    self.emitter.write(XmlWEvent::start_element("D:lockentry"))?;
                    self.emitter.write(XmlWEvent::start_element("D:lockscope"))?;
                    self.empty(scope)?;
                    self.emitter.write(XmlWEvent::end_element())?;
                    self.emitter.write(XmlWEvent::start_element("D:locktype"))?;
                    self.empty("D:write")?;
                    self.emitter.write(XmlWEvent::end_element())?;
                    self.emitter.write(XmlWEvent::end_element())?;
                }
            }
        }
        self.emitter.write(XmlWEvent::end_element())?;
        Ok(())
    }
}

// look up the requested properties of one resource.
async fn propstats(res: &DavResource, what: &PropFind) -> Vec<PropStat> {
    let mut found = Vec::new();
    let mut missing = Vec::new();
    match what {
        PropFind::AllProp => {
            for name in res.property_names(false) {
                if let Some(value) = res.property(&name).await {
                    found.push((name, Some(value)));
                }
            }
        }
        PropFind::PropName => {
            found = res.property_names(true).into_iter().map(|n| (n, None)).collect();
        }
        PropFind::Prop(names) => {
            for name in names {
                match res.property(name).await {
                    Some(value) => found.push((name.clone(), Some(value))),
                    None => missing.push((name.clone(), None)),
                }
            }
        }
    }
    vec![(StatusCode::OK, found), (StatusCode::NOT_FOUND, missing)]
}

fn multistatus_response(body: Body) -> Response<Body> {
    let mut res = Response::new(body);
    *res.status_mut() = StatusCode::MULTI_STATUS;
    res.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/xml; charset=utf-8"),
    );
    res
}

impl DavHandler {
    pub(crate) async fn handle_propfind(
        &self,
        req: &Request<()>,
        locator: &ResourceLocator,
        session: &Arc<DavSession>,
        xmldata: &[u8],
    ) -> DavResult<Response<Body>> {
        let depth = match req.headers().typed_try_get::<Depth>() {
            Ok(Some(Depth::Zero)) => Depth::Zero,
            Ok(Some(Depth::One)) => Depth::One,
            Ok(None) | Ok(Some(Depth::Infinity)) => {
                debug!("{locator}: refusing PROPFIND with depth infinity");
                let mut res = Response::new(dav_xml_error("<D:propfind-finite-depth/>"));
                *res.status_mut() = StatusCode::FORBIDDEN;
                res.headers_mut().typed_insert(headers::ContentType::xml());
                return Ok(res);
            }
            Err(_) => return Err(StatusCode::BAD_REQUEST.into()),
        };
        let what = parse_propfind(xmldata)?;
        let resource = self
            .factory
            .create_request_resource(DavMethod::PropFind, locator, req, session)
            .await?;
        let mut members = Vec::new();
        if let (Depth::One, DavResource::Folder(folder)) = (depth, &resource) {
            members = folder.get_members().await?;
        }
        let mut ms = MultiStatus::new(&self.prefix)?;

        let body = Body::stream(stream! {
            let mut failed = false;
            for res in std::iter::once(resource).chain(members) {
                let propstats = propstats(&res, &what).await;
                match ms.response(&res.href(), &propstats) {
                    Ok(chunk) => yield Ok::<Bytes, io::Error>(chunk),
                    Err(e) => {
                        error!("PROPFIND {}: {e:?}", res.locator());
                        yield Err(io::Error::new(io::ErrorKind::Other, e.to_string()));
                        failed = true;
                        break;
                    }
                }
            }
            if !failed {
                match ms.finish() {
                    Ok(chunk) => yield Ok(chunk),
                    Err(e) => yield Err(io::Error::new(io::ErrorKind::Other, e.to_string())),
                }
            }
        });
        Ok(multistatus_response(body))
    }

    pub(crate) async fn handle_proppatch(
        &self,
        req: &Request<()>,
        locator: &ResourceLocator,
        session: &Arc<DavSession>,
        xmldata: &[u8],
    ) -> DavResult<Response<Body>> {
        let resource = self
            .factory
            .create_request_resource(DavMethod::PropPatch, locator, req, session)
            .await?;
        self.check_locks(&resource)?;

        let root = Element::parse(xmldata)?;
        if root.name != "propertyupdate" {
            return Err(DavError::XmlParseError);
        }

        // only the modification time can be changed, there is
        // no storage for other properties.
        let mut results = Vec::new();
        let mut mtime = None;
        for elem in root.children.iter().filter_map(XMLNode::as_element) {
            let set = match elem.name.as_str() {
                "set" => true,
                "remove" => false,
                _ => continue,
            };
            let props = elem
                .get_child("prop")
                .into_iter()
                .flat_map(|p| p.children.iter().filter_map(XMLNode::as_element));
            for prop in props {
                let name = propname(prop);
                let settable = name.is_dav("getlastmodified") || name.is_ms("Win32LastModifiedTime");
                let status = if set && settable {
                    match prop.get_text().and_then(|t| httpdate_to_systemtime(&t)) {
                        Some(t) => {
                            mtime = Some(t);
                            StatusCode::OK
                        }
                        None => StatusCode::CONFLICT,
                    }
                } else {
                    StatusCode::FORBIDDEN
                };
                results.push((name, status));
            }
        }

        // all or nothing.
        if results.iter().any(|(_, s)| *s != StatusCode::OK) {
            for (_, status) in results.iter_mut() {
                if *status == StatusCode::OK {
                    *status = StatusCode::FAILED_DEPENDENCY;
                }
            }
        } else if let Some(t) = mtime {
            self.factory.fs.set_times(resource.path(), t, None, None).await?;
        }

        let mut propstats: Vec<PropStat> = Vec::new();
        for (name, status) in results {
            match propstats.iter_mut().find(|(s, _)| *s == status) {
                Some((_, props)) => props.push((name, None)),
                None => propstats.push((status, vec![(name, None)])),
            }
        }
        let mut ms = MultiStatus::new(&self.prefix)?;
        let mut xml = ms.response(&resource.href(), &propstats)?.to_vec();
        xml.extend_from_slice(&ms.finish()?);
        Ok(multistatus_response(Body::from(xml)))
    }
}
