use std::io::{Cursor, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use bitflags::bitflags;
use bytes::Bytes;
use headers::Header;
use http::header::HeaderValue;
use time::format_description::well_known::Rfc3339;
use time::macros::offset;

use crate::body::Body;
use crate::errors::{DavError, DavResult};

/// HTTP and WebDAV methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DavMethod {
    Head,
    Get,
    Put,
    Options,
    PropFind,
    PropPatch,
    MkCol,
    Copy,
    Move,
    Delete,
    Lock,
    Unlock,
}

bitflags! {
    /// A set of allowed [`DavMethod`]s.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DavMethodSet: u32 {
        const HEAD = 0x0001;
        const GET = 0x0002;
        const PUT = 0x0004;
        const OPTIONS = 0x0010;
        const PROPFIND = 0x0020;
        const PROPPATCH = 0x0040;
        const MKCOL = 0x0080;
        const COPY = 0x0100;
        const MOVE = 0x0200;
        const DELETE = 0x0400;
        const LOCK = 0x0800;
        const UNLOCK = 0x1000;

        const HTTP_RO = Self::HEAD.bits() | Self::GET.bits() | Self::OPTIONS.bits();
        const HTTP_RW = Self::HTTP_RO.bits() | Self::PUT.bits();
        const WEBDAV_RO = Self::HTTP_RO.bits() | Self::PROPFIND.bits();
    }
}

impl DavMethodSet {
    pub const WEBDAV_RW: Self = Self::all();

    /// Is `m` a member of this set.
    pub fn contains_method(&self, m: DavMethod) -> bool {
        self.contains(DavMethodSet::from(m))
    }
}

impl From<DavMethod> for DavMethodSet {
    fn from(m: DavMethod) -> DavMethodSet {
        match m {
            DavMethod::Head => DavMethodSet::HEAD,
            DavMethod::Get => DavMethodSet::GET,
            DavMethod::Put => DavMethodSet::PUT,
            DavMethod::Options => DavMethodSet::OPTIONS,
            DavMethod::PropFind => DavMethodSet::PROPFIND,
            DavMethod::PropPatch => DavMethodSet::PROPPATCH,
            DavMethod::MkCol => DavMethodSet::MKCOL,
            DavMethod::Copy => DavMethodSet::COPY,
            DavMethod::Move => DavMethodSet::MOVE,
            DavMethod::Delete => DavMethodSet::DELETE,
            DavMethod::Lock => DavMethodSet::LOCK,
            DavMethod::Unlock => DavMethodSet::UNLOCK,
        }
    }
}

// translate method into our own enum that has webdav methods as well.
pub(crate) fn dav_method(m: &http::Method) -> DavResult<DavMethod> {
    let m = match *m {
        http::Method::HEAD => DavMethod::Head,
        http::Method::GET => DavMethod::Get,
        http::Method::PUT => DavMethod::Put,
        http::Method::DELETE => DavMethod::Delete,
        http::Method::OPTIONS => DavMethod::Options,
        _ => match m.as_str() {
            "PROPFIND" => DavMethod::PropFind,
            "PROPPATCH" => DavMethod::PropPatch,
            "MKCOL" => DavMethod::MkCol,
            "COPY" => DavMethod::Copy,
            "MOVE" => DavMethod::Move,
            "LOCK" => DavMethod::Lock,
            "UNLOCK" => DavMethod::Unlock,
            _ => {
                return Err(DavError::UnknownDavMethod);
            }
        },
    };
    Ok(m)
}

pub(crate) fn dav_xml_error(body: &str) -> Body {
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\" ?>\n\
        <D:error xmlns:D=\"DAV:\">\n\
        {body}\n\
        </D:error>\n"
    );
    Body::from(xml)
}

pub(crate) fn systemtime_to_offsetdatetime(t: SystemTime) -> time::OffsetDateTime {
    let secs = match t.duration_since(UNIX_EPOCH) {
        Ok(t) => t.as_secs() as i64,
        Err(_) => 0,
    };
    time::OffsetDateTime::from_unix_timestamp(secs)
        .unwrap_or(time::OffsetDateTime::UNIX_EPOCH)
        .to_offset(offset!(UTC))
}

pub(crate) fn systemtime_to_httpdate(t: SystemTime) -> String {
    let d = headers::Date::from(t);
    let mut v = Vec::new();
    d.encode(&mut v);
    v.first()
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned()
}

/// Parse an RFC 1123 style HTTP date.
pub(crate) fn httpdate_to_systemtime(s: &str) -> Option<SystemTime> {
    let value = HeaderValue::from_str(s.trim()).ok()?;
    headers::Date::decode(&mut std::iter::once(&value))
        .ok()
        .map(SystemTime::from)
}

pub(crate) fn systemtime_to_rfc3339(t: SystemTime) -> String {
    // 1996-12-19T16:39:57Z
    systemtime_to_offsetdatetime(t)
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Drop the sub-second part, HTTP dates only have second resolution.
pub(crate) fn truncate_to_secs(t: SystemTime) -> SystemTime {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => UNIX_EPOCH + std::time::Duration::from_secs(d.as_secs()),
        Err(_) => t,
    }
}

// A buffer that implements "Write".
#[derive(Clone, Default)]
pub(crate) struct MemBuffer(Cursor<Vec<u8>>);

impl MemBuffer {
    pub(crate) fn new() -> MemBuffer {
        MemBuffer(Cursor::new(Vec::new()))
    }

    pub(crate) fn take(&mut self) -> Bytes {
        let buf = std::mem::take(self.0.get_mut());
        self.0.set_position(0);
        Bytes::from(buf)
    }
}

impl Write for MemBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_rfc3339() {
        assert!(systemtime_to_rfc3339(UNIX_EPOCH) == "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_httpdate() {
        let t = UNIX_EPOCH + Duration::from_secs(784111777);
        let s = systemtime_to_httpdate(t);
        assert_eq!(s, "Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(httpdate_to_systemtime(&s), Some(t));
        assert_eq!(httpdate_to_systemtime("yesterday"), None);
    }

    #[test]
    fn method_set() {
        assert!(DavMethodSet::HTTP_RO.contains_method(DavMethod::Get));
        assert!(!DavMethodSet::HTTP_RO.contains_method(DavMethod::Put));
        assert!(DavMethodSet::WEBDAV_RW.contains_method(DavMethod::Unlock));
    }
}
