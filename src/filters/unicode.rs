//! Unicode normalization of paths.
//!
//! Some clients (macOS) send and expect decomposed (NFD) names, while
//! most filesystems store composed (NFC) names. Request paths and the
//! `Destination:` header are normalized to the filesystem's form on the
//! way in. On the way out, the hrefs in a multistatus body are
//! normalized to the client's form, without buffering the whole body.
use std::fmt;
use std::io::{self, Write};

use async_stream::stream;
use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::request::Parts;
use http::uri::{PathAndQuery, Uri};
use http::{Request, Response, StatusCode};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesText, Event};
use quick_xml::{Reader, Writer};
use tokio_util::io::StreamReader;
use unicode_normalization::UnicodeNormalization;

use crate::body::Body;

// Everything but unreserved characters, sub-delims, ':', '@', '/' and
// the IPv6 brackets is encoded.
const HREF_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=')
    .remove(b':')
    .remove(b'@')
    .remove(b'/')
    .remove(b'[')
    .remove(b']');

// flush rewritten output when this much has accumulated.
const CHUNK_SIZE: usize = 8192;

/// A Unicode normalization form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    /// Composed.
    Nfc,
    /// Decomposed.
    Nfd,
}

impl Form {
    pub fn opposite(self) -> Form {
        match self {
            Form::Nfc => Form::Nfd,
            Form::Nfd => Form::Nfc,
        }
    }
}

/// Tells whether a client needs the hrefs in multistatus responses
/// normalized to the client form.
pub trait ClientQuirks: Send + Sync {
    fn multistatus_needs_normalization(&self, _req: &Request<()>) -> bool {
        true
    }
}

/// Normalize for every client.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllClients;

impl ClientQuirks for AllClients {}

/// Normalize only for the macOS WebDAV client.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserAgentQuirks;

impl ClientQuirks for UserAgentQuirks {
    fn multistatus_needs_normalization(&self, req: &Request<()>) -> bool {
        req.headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|ua| ua.contains("WebDAVFS") || ua.contains("Darwin"))
            .unwrap_or(false)
    }
}

pub fn normalize(s: &str, form: Form) -> String {
    match form {
        Form::Nfc => s.nfc().collect(),
        Form::Nfd => s.nfd().collect(),
    }
}

// percent-encode, with lowercase hex digits.
fn encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for chunk in utf8_percent_encode(s, HREF_ENCODE_SET) {
        if chunk.starts_with('%') {
            out.push_str(&chunk.to_ascii_lowercase());
        } else {
            out.push_str(chunk);
        }
    }
    out
}

/// Decode, normalize and re-encode an href. Surrounding whitespace is
/// kept as is. An href that is not valid percent-encoded UTF-8 is
/// returned unchanged.
pub fn normalize_href(href: &str, form: Form) -> String {
    let core = href.trim();
    let Ok(decoded) = percent_decode_str(core).decode_utf8() else {
        return href.to_string();
    };
    let start = href.len() - href.trim_start().len();
    let end = start + core.len();
    format!("{}{}{}", &href[..start], encode(&normalize(&decoded, form)), &href[end..])
}

// like normalize_href, but None if normalizing changes nothing.
fn normalize_encoded(s: &str, form: Form) -> Option<String> {
    let decoded = percent_decode_str(s).decode_utf8().ok()?;
    let normalized = normalize(&decoded, form);
    if normalized == decoded {
        return None;
    }
    Some(encode(&normalized))
}

fn rewrite_uri(uri: &Uri, form: Form) -> Option<Uri> {
    let path = normalize_encoded(uri.path(), form)?;
    let path_and_query = match uri.query() {
        Some(q) => format!("{path}?{q}"),
        None => path,
    };
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query.parse::<PathAndQuery>().ok()?);
    Uri::from_parts(parts).ok()
}

/// Normalize the request path and the Destination: header to `form`.
pub(crate) fn normalize_request(parts: &mut Parts, form: Form) {
    if let Some(uri) = rewrite_uri(&parts.uri, form) {
        trace!("normalized {} to {uri}", parts.uri);
        parts.uri = uri;
    }
    let dest = parts
        .headers
        .get("destination")
        .and_then(|v| std::str::from_utf8(v.as_bytes()).ok())
        .and_then(|d| normalize_encoded(d, form));
    if let Some(value) = dest.and_then(|d| HeaderValue::from_str(&d).ok()) {
        parts.headers.insert("destination", value);
    }
}

fn invalid(e: impl fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e.to_string())
}

// Copies XML events, diverting the text inside <href> elements.
struct HrefRewriter {
    form: Form,
    in_href: bool,
    text: String,
}

impl HrefRewriter {
    fn new(form: Form) -> HrefRewriter {
        HrefRewriter {
            form,
            in_href: false,
            text: String::new(),
        }
    }

    fn handle<W: Write>(&mut self, event: Event<'_>, writer: &mut Writer<W>) -> io::Result<()> {
        match &event {
            Event::Start(e) if e.local_name().as_ref() == b"href" => {
                self.flush(writer)?;
                self.in_href = true;
            }
            Event::End(e) if e.local_name().as_ref() == b"href" => {
                self.flush(writer)?;
                self.in_href = false;
            }
            Event::Text(t) if self.in_href => {
                let text = t.unescape().map_err(invalid)?;
                self.text.push_str(&text);
                return Ok(());
            }
            _ => self.flush(writer)?,
        }
        writer.write_event(event).map_err(invalid)
    }

    fn flush<W: Write>(&mut self, writer: &mut Writer<W>) -> io::Result<()> {
        if self.text.is_empty() {
            return Ok(());
        }
        let href = normalize_href(&self.text, self.form);
        self.text.clear();
        writer
            .write_event(Event::Text(BytesText::from_escaped(partial_escape(&href))))
            .map_err(invalid)
    }
}

/// Rewrite the hrefs in a complete XML document.
pub fn transform(input: &[u8], form: Form) -> io::Result<Vec<u8>> {
    let mut reader = Reader::from_reader(input);
    let mut writer = Writer::new(Vec::new());
    let mut rewriter = HrefRewriter::new(form);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(invalid)? {
            Event::Eof => break,
            event => rewriter.handle(event, &mut writer)?,
        }
        buf.clear();
    }
    Ok(writer.into_inner())
}

// the streaming version of transform().
fn transform_body(body: Body, form: Form) -> Body {
    Body::stream(stream! {
        let mut reader = Reader::from_reader(StreamReader::new(body));
        let mut writer = Writer::new(Vec::new());
        let mut rewriter = HrefRewriter::new(form);
        let mut buf = Vec::new();
        let mut failed = false;
        loop {
            let res = match reader.read_event_into_async(&mut buf).await {
                Ok(Event::Eof) => break,
                Ok(event) => rewriter.handle(event, &mut writer),
                Err(e) => Err(invalid(e)),
            };
            buf.clear();
            if let Err(e) = res {
                debug!("rewriting multistatus: {e}");
                yield Err::<Bytes, io::Error>(e);
                failed = true;
                break;
            }
            if writer.get_ref().len() >= CHUNK_SIZE {
                yield Ok(Bytes::from(std::mem::take(writer.get_mut())));
            }
        }
        if !failed {
            let rest = writer.into_inner();
            if !rest.is_empty() {
                yield Ok(Bytes::from(rest));
            }
        }
    })
}

fn is_xml(res: &Response<Body>) -> bool {
    res.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("xml"))
        .unwrap_or(false)
}

/// Normalize the hrefs of a multistatus response to `form`. Other
/// responses are returned untouched.
pub(crate) fn normalize_response(res: Response<Body>, form: Form) -> Response<Body> {
    if res.status() != StatusCode::MULTI_STATUS || !is_xml(&res) {
        return res;
    }
    let (mut parts, body) = res.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, transform_body(body, form))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn transform_str(s: &str, form: Form) -> String {
        String::from_utf8(transform(s.as_bytes(), form).unwrap()).unwrap()
    }

    #[test]
    fn normalizes_both_ways() {
        let composed = "\u{fc}ber";
        let decomposed = "u\u{308}ber";
        assert_eq!(normalize(composed, Form::Nfd), decomposed);
        assert_eq!(normalize(decomposed, Form::Nfc), composed);
        assert_eq!(normalize(decomposed, Form::Nfd), decomposed);
        assert_eq!(normalize(composed, Form::Nfc), composed);
        assert_eq!(normalize(&normalize(composed, Form::Nfd), Form::Nfc), composed);
    }

    #[test]
    fn hrefs() {
        assert_eq!(
            normalize_href("http://example.com/%C3%BC/", Form::Nfd),
            "http://example.com/u%cc%88/"
        );
        assert_eq!(
            normalize_href("http://example.com/u%CC%88/", Form::Nfc),
            "http://example.com/%c3%bc/"
        );
        assert_eq!(normalize_href("  /a%20b/ \n", Form::Nfc), "  /a%20b/ \n");
        assert_eq!(normalize_href("/bad%ff", Form::Nfc), "/bad%ff");
    }

    #[test]
    fn keeps_structure() {
        let xml = "<l:foo xmlns:l=\"LOL\"><l:bar>bar</l:bar><l:href>http://example.com/ascii/</l:href></l:foo>";
        assert_eq!(transform_str(xml, Form::Nfd), xml);

        let xml = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<D:multistatus xmlns:D=\"DAV:\">\
            <D:response><D:href>/%C3%BC/</D:href><D:propstat attr='x'><D:status>\u{fc}</D:status>\
            </D:propstat></D:response></D:multistatus>";
        let expected = xml.replace("/%C3%BC/", "/u%cc%88/");
        assert_eq!(transform_str(xml, Form::Nfd), expected);
    }

    #[test]
    fn malformed_xml_fails() {
        assert!(transform(b"<a><href>x</b></a>", Form::Nfc).is_err());
    }

    #[test]
    fn request_paths() {
        let req = Request::builder()
            .uri("http://host:8080/dav/u%CC%88ber.txt?x=1")
            .header("destination", "http://host:8080/dav/u%CC%88ber-2.txt")
            .body(())
            .unwrap();
        let (mut parts, _) = req.into_parts();
        normalize_request(&mut parts, Form::Nfc);
        assert_eq!(parts.uri, "http://host:8080/dav/%c3%bcber.txt?x=1");
        assert_eq!(parts.headers["destination"], "http://host:8080/dav/%c3%bcber-2.txt");

        let (mut parts, _) = Request::get("/plain/a%20b").body(()).unwrap().into_parts();
        normalize_request(&mut parts, Form::Nfc);
        assert_eq!(parts.uri, "/plain/a%20b");
    }

    #[test]
    fn quirks() {
        let mac = Request::get("/").header("user-agent", "WebDAVFS/3.0.0 (03008000) Darwin/21.6.0").body(()).unwrap();
        let other = Request::get("/").header("user-agent", "curl/8.0").body(()).unwrap();
        assert!(UserAgentQuirks.multistatus_needs_normalization(&mac));
        assert!(!UserAgentQuirks.multistatus_needs_normalization(&other));
        assert!(AllClients.multistatus_needs_normalization(&other));
    }

    #[tokio::test]
    async fn rewrites_multistatus_stream() {
        let xml = "<D:multistatus xmlns:D=\"DAV:\"><D:response><D:href>/u%CC%88/</D:href></D:response></D:multistatus>";
        let chunks: Vec<io::Result<Bytes>> = xml
            .as_bytes()
            .chunks(7)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let mut res = Response::new(Body::stream(futures_util::stream::iter(chunks)));
        *res.status_mut() = StatusCode::MULTI_STATUS;
        res.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static("application/xml"));
        res.headers_mut().insert(header::CONTENT_LENGTH, HeaderValue::from_static("91"));

        let res = normalize_response(res, Form::Nfc);
        assert!(res.headers().get(header::CONTENT_LENGTH).is_none());
        let mut body = res.into_body();
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(String::from_utf8(out).unwrap(), xml.replace("/u%CC%88/", "/%c3%bc/"));
    }

    #[tokio::test]
    async fn leaves_other_responses_alone() {
        let res = Response::new(Body::from("<D:href>/u%CC%88/</D:href>"));
        let res = normalize_response(res, Form::Nfc);
        assert_eq!(res.status(), StatusCode::OK);
        let mut body = res.into_body();
        let chunk = body.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"<D:href>/u%CC%88/</D:href>");
    }
}
