use std::path::Path;

use futures_util::StreamExt;
use http::{HeaderMap, Request, StatusCode};
use tempfile::TempDir;

use vault_dav::body::Body;
use vault_dav::{DavHandler, DavServer};

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Reply {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }
}

fn setup() -> (TempDir, DavServer) {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().unwrap();
    let server = server_for(dir.path(), "/");
    (dir, server)
}

fn server_for(root: &Path, prefix: &str) -> DavServer {
    let handler = DavHandler::builder().root(root).strip_prefix(prefix).build();
    DavServer::builder(handler).build()
}

async fn send(
    server: &DavServer,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: &str,
) -> Reply {
    let mut req = Request::builder().method(method).uri(path);
    for (k, v) in headers {
        req = req.header(*k, *v);
    }
    let req = req.body(Body::from(body)).unwrap();
    let res = server.handle(req).await;
    let (parts, mut body) = res.into_parts();
    let mut data = Vec::new();
    while let Some(chunk) = body.next().await {
        data.extend_from_slice(&chunk.unwrap());
    }
    Reply {
        status: parts.status,
        headers: parts.headers,
        body: data,
    }
}

const LOCKINFO: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:lockinfo xmlns:D="DAV:">
  <D:lockscope><D:exclusive/></D:lockscope>
  <D:locktype><D:write/></D:locktype>
  <D:owner>tester</D:owner>
</D:lockinfo>"#;

#[tokio::test]
async fn put_and_get() {
    let (dir, server) = setup();

    let r = send(&server, "PUT", "/a.txt", &[], "hello world").await;
    assert_eq!(r.status, StatusCode::CREATED);
    assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"hello world");

    let r = send(&server, "PUT", "/a.txt", &[], "hello again").await;
    assert_eq!(r.status, StatusCode::NO_CONTENT);

    let r = send(&server, "GET", "/a.txt", &[], "").await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.text(), "hello again");
    assert_eq!(r.header("content-length"), "11");
    assert_eq!(r.header("accept-ranges"), "bytes");

    let r = send(&server, "HEAD", "/a.txt", &[], "").await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.header("content-length"), "11");
    assert!(r.body.is_empty());

    let r = send(&server, "GET", "/missing.txt", &[], "").await;
    assert_eq!(r.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ranged_get() {
    let (_dir, server) = setup();
    send(&server, "PUT", "/r.txt", &[], "0123456789").await;

    let r = send(&server, "GET", "/r.txt", &[("range", "bytes=2-5")], "").await;
    assert_eq!(r.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(r.text(), "2345");
    assert_eq!(r.header("content-range"), "bytes 2-5/10");

    let r = send(&server, "GET", "/r.txt", &[("range", "bytes=-3")], "").await;
    assert_eq!(r.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(r.text(), "789");

    let r = send(&server, "GET", "/r.txt", &[("range", "bytes=7-100")], "").await;
    assert_eq!(r.text(), "789");

    let r = send(&server, "GET", "/r.txt", &[("range", "bytes=3-2")], "").await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);

    // more than one range: the whole file.
    let r = send(&server, "GET", "/r.txt", &[("range", "bytes=0-1,4-5")], "").await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.text(), "0123456789");

    let r = send(&server, "GET", "/r.txt", &[("range", "bytes=20-")], "").await;
    assert_eq!(r.status, StatusCode::RANGE_NOT_SATISFIABLE);

    let r = send(
        &server,
        "GET",
        "/r.txt",
        &[("range", "bytes=0-1"), ("if-range", "Wed, 21 Oct 2015 07:28:00 GMT")],
        "",
    )
    .await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.text(), "0123456789");

    let r = send(&server, "GET", "/r.txt", &[("range", "bytes=0-1"), ("if-range", "yesterday")], "").await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn collections() {
    let (dir, server) = setup();

    let r = send(&server, "MKCOL", "/d", &[], "").await;
    assert_eq!(r.status, StatusCode::CREATED);
    assert!(dir.path().join("d").is_dir());

    let r = send(&server, "MKCOL", "/d", &[], "").await;
    assert_eq!(r.status, StatusCode::METHOD_NOT_ALLOWED);

    let r = send(&server, "MKCOL", "/x/y", &[], "").await;
    assert_eq!(r.status, StatusCode::CONFLICT);

    let r = send(&server, "PUT", "/x/y.txt", &[], "data").await;
    assert_eq!(r.status, StatusCode::CONFLICT);

    let r = send(&server, "PUT", "/d", &[], "data").await;
    assert_eq!(r.status, StatusCode::CONFLICT);

    let r = send(&server, "GET", "/d/", &[], "").await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.header("content-length"), "0");
}

#[tokio::test]
async fn copy_move_delete() {
    let (dir, server) = setup();
    send(&server, "PUT", "/src.txt", &[], "payload").await;

    let r = send(&server, "COPY", "/src.txt", &[("destination", "http://localhost/dst.txt")], "").await;
    assert_eq!(r.status, StatusCode::CREATED);
    assert_eq!(std::fs::read(dir.path().join("dst.txt")).unwrap(), b"payload");

    let r = send(
        &server,
        "COPY",
        "/src.txt",
        &[("destination", "/dst.txt"), ("overwrite", "F")],
        "",
    )
    .await;
    assert_eq!(r.status, StatusCode::PRECONDITION_FAILED);

    let r = send(&server, "COPY", "/src.txt", &[("destination", "/dst.txt")], "").await;
    assert_eq!(r.status, StatusCode::NO_CONTENT);

    let r = send(&server, "MOVE", "/dst.txt", &[("destination", "/moved.txt")], "").await;
    assert_eq!(r.status, StatusCode::CREATED);
    assert!(!dir.path().join("dst.txt").exists());

    let r = send(&server, "MOVE", "/moved.txt", &[("destination", "/nowhere/m.txt")], "").await;
    assert_eq!(r.status, StatusCode::CONFLICT);

    let r = send(&server, "COPY", "/src.txt", &[], "").await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);

    let r = send(&server, "DELETE", "/moved.txt", &[], "").await;
    assert_eq!(r.status, StatusCode::NO_CONTENT);
    let r = send(&server, "DELETE", "/moved.txt", &[], "").await;
    assert_eq!(r.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn folder_copy_and_move() {
    let (dir, server) = setup();
    send(&server, "MKCOL", "/a", &[], "").await;
    send(&server, "MKCOL", "/a/b", &[], "").await;
    send(&server, "PUT", "/a/b/f.txt", &[], "deep").await;

    let r = send(&server, "COPY", "/a", &[("destination", "/c")], "").await;
    assert_eq!(r.status, StatusCode::CREATED);
    assert_eq!(std::fs::read(dir.path().join("c/b/f.txt")).unwrap(), b"deep");

    let r = send(&server, "COPY", "/a", &[("destination", "/shallow"), ("depth", "0")], "").await;
    assert_eq!(r.status, StatusCode::CREATED);
    assert!(dir.path().join("shallow").is_dir());
    assert!(!dir.path().join("shallow/b").exists());

    let r = send(&server, "MOVE", "/a", &[("destination", "/a/b/inside")], "").await;
    assert_eq!(r.status, StatusCode::FORBIDDEN);

    let r = send(&server, "MOVE", "/a", &[("destination", "/e")], "").await;
    assert_eq!(r.status, StatusCode::CREATED);
    assert!(dir.path().join("e/b/f.txt").exists());

    let r = send(&server, "DELETE", "/e", &[], "").await;
    assert_eq!(r.status, StatusCode::NO_CONTENT);
    assert!(!dir.path().join("e").exists());

    let r = send(&server, "DELETE", "/", &[], "").await;
    assert_eq!(r.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn locking() {
    let (dir, server) = setup();

    let r = send(&server, "LOCK", "/new.txt", &[("timeout", "Second-600")], LOCKINFO).await;
    assert_eq!(r.status, StatusCode::CREATED);
    let token = r.header("lock-token").to_string();
    assert!(token.starts_with("<opaquelocktoken:"), "{token}");
    assert!(r.text().contains("lockdiscovery"));
    assert!(dir.path().join("new.txt").is_file());

    let r = send(&server, "GET", "/new.txt", &[], "").await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.header("content-length"), "0");

    let r = send(&server, "PUT", "/new.txt", &[], "content").await;
    assert_eq!(r.status, StatusCode::LOCKED);

    let r = send(&server, "DELETE", "/new.txt", &[], "").await;
    assert_eq!(r.status, StatusCode::LOCKED);

    let r = send(&server, "LOCK", "/new.txt", &[], LOCKINFO).await;
    assert_eq!(r.status, StatusCode::LOCKED);

    let if_header = format!("({token})");
    let r = send(&server, "PUT", "/new.txt", &[("if", &if_header)], "content").await;
    assert_eq!(r.status, StatusCode::NO_CONTENT);

    // refresh
    let r = send(&server, "LOCK", "/new.txt", &[("if", &if_header)], "").await;
    assert_eq!(r.status, StatusCode::OK);

    let r = send(&server, "UNLOCK", "/new.txt", &[("lock-token", "<opaquelocktoken:bogus>")], "").await;
    assert_eq!(r.status, StatusCode::CONFLICT);

    let r = send(&server, "UNLOCK", "/new.txt", &[("lock-token", &token)], "").await;
    assert_eq!(r.status, StatusCode::NO_CONTENT);

    let r = send(&server, "PUT", "/new.txt", &[], "unlocked").await;
    assert_eq!(r.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn if_header() {
    let (_dir, server) = setup();
    send(&server, "PUT", "/f.txt", &[], "x").await;

    let r = send(&server, "PUT", "/f.txt", &[("if", "(<opaquelocktoken:nope>)")], "y").await;
    assert_eq!(r.status, StatusCode::PRECONDITION_FAILED);

    let r = send(&server, "PUT", "/f.txt", &[("if", "(Not <DAV:no-lock>)")], "y").await;
    assert_eq!(r.status, StatusCode::NO_CONTENT);

    let r = send(&server, "PUT", "/f.txt", &[("if", "(<DAV:no-lock>)")], "y").await;
    assert_eq!(r.status, StatusCode::PRECONDITION_FAILED);

    let r = send(&server, "PUT", "/f.txt", &[("if", "garbage")], "y").await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn propfind() {
    let (_dir, server) = setup();
    send(&server, "MKCOL", "/dir", &[], "").await;
    send(&server, "PUT", "/dir/f.txt", &[], "12345").await;

    let r = send(&server, "PROPFIND", "/dir/", &[("depth", "1")], "").await;
    assert_eq!(r.status, StatusCode::MULTI_STATUS);
    let xml = r.text();
    assert!(xml.contains("<D:href>/dir/</D:href>"), "{xml}");
    assert!(xml.contains("<D:href>/dir/f.txt</D:href>"), "{xml}");
    assert!(xml.contains("<D:getcontentlength>5</D:getcontentlength>"), "{xml}");

    let body = r#"<?xml version="1.0"?><D:propfind xmlns:D="DAV:"><D:prop><D:getcontentlength/><D:nosuchprop/></D:prop></D:propfind>"#;
    let r = send(&server, "PROPFIND", "/dir/f.txt", &[("depth", "0")], body).await;
    assert_eq!(r.status, StatusCode::MULTI_STATUS);
    let xml = r.text();
    assert!(xml.contains("404"), "{xml}");
    assert!(xml.contains("nosuchprop"), "{xml}");

    let r = send(&server, "PROPFIND", "/dir/", &[("depth", "infinity")], "").await;
    assert_eq!(r.status, StatusCode::FORBIDDEN);
    assert!(r.text().contains("propfind-finite-depth"));

    let r = send(&server, "PROPFIND", "/nope", &[("depth", "0")], "").await;
    assert_eq!(r.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn proppatch() {
    let (dir, server) = setup();
    send(&server, "PUT", "/t.txt", &[], "x").await;

    let body = r#"<?xml version="1.0"?>
        <D:propertyupdate xmlns:D="DAV:">
          <D:set><D:prop><D:getlastmodified>Wed, 21 Oct 2015 07:28:00 GMT</D:getlastmodified></D:prop></D:set>
        </D:propertyupdate>"#;
    let r = send(&server, "PROPPATCH", "/t.txt", &[], body).await;
    assert_eq!(r.status, StatusCode::MULTI_STATUS);
    assert!(r.text().contains("200"), "{}", r.text());
    let modified = std::fs::metadata(dir.path().join("t.txt")).unwrap().modified().unwrap();
    let secs = modified.duration_since(std::time::UNIX_EPOCH).unwrap().as_secs();
    assert_eq!(secs, 1445412480);

    let body = r#"<?xml version="1.0"?>
        <D:propertyupdate xmlns:D="DAV:" xmlns:Z="urn:example">
          <D:set><D:prop><Z:color>red</Z:color></D:prop></D:set>
        </D:propertyupdate>"#;
    let r = send(&server, "PROPPATCH", "/t.txt", &[], body).await;
    assert_eq!(r.status, StatusCode::MULTI_STATUS);
    assert!(r.text().contains("403"), "{}", r.text());
}

#[tokio::test]
async fn options() {
    let (_dir, server) = setup();
    send(&server, "PUT", "/o.txt", &[], "x").await;

    let r = send(&server, "OPTIONS", "/", &[], "").await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.header("dav"), "1, 2");
    assert_eq!(r.header("ms-author-via"), "DAV");
    assert!(r.header("allow").contains("PROPFIND"));
    assert!(!r.header("allow").contains("DELETE"));

    let r = send(&server, "OPTIONS", "/o.txt", &[], "").await;
    assert!(r.header("allow").contains("GET"));
    assert!(r.header("allow").contains("DELETE"));

    let r = send(&server, "OPTIONS", "/unmapped", &[], "").await;
    assert!(r.header("allow").contains("MKCOL"));
    assert!(!r.header("allow").contains("GET"));
}

#[tokio::test]
async fn chunked_put() {
    let (dir, server) = setup();

    let headers = [("transfer-encoding", "chunked"), ("x-expected-entity-length", "5")];
    let r = send(&server, "PUT", "/c.txt", &headers, "hello world").await;
    assert_eq!(r.status, StatusCode::CREATED);
    assert_eq!(std::fs::read(dir.path().join("c.txt")).unwrap(), b"hello");

    let headers = [("transfer-encoding", "chunked"), ("x-expected-entity-length", "NaN")];
    let r = send(&server, "PUT", "/d.txt", &headers, "hello world").await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    assert!(!dir.path().join("d.txt").exists());
}

#[tokio::test]
async fn unicode_names() {
    let (dir, server) = setup();

    // composed on the way in
    let r = send(&server, "PUT", "/u%CC%88ber.txt", &[], "x").await;
    assert_eq!(r.status, StatusCode::CREATED);
    assert!(dir.path().join("\u{fc}ber.txt").exists());

    let r = send(&server, "GET", "/%C3%BCber.txt", &[], "").await;
    assert_eq!(r.status, StatusCode::OK);

    let r = send(&server, "COPY", "/%C3%BCber.txt", &[("destination", "/a%CC%88.txt")], "").await;
    assert_eq!(r.status, StatusCode::CREATED);
    assert!(dir.path().join("\u{e4}.txt").exists());

    // decomposed on the way out
    let r = send(&server, "PROPFIND", "/", &[("depth", "1")], "").await;
    assert_eq!(r.status, StatusCode::MULTI_STATUS);
    let xml = r.text();
    assert!(xml.contains("/u%cc%88ber.txt"), "{xml}");
    assert!(xml.contains("/a%cc%88.txt"), "{xml}");
}

#[tokio::test]
async fn prefix_and_root() {
    let dir = TempDir::new().unwrap();
    let server = server_for(dir.path(), "/dav");
    send(&server, "PUT", "/dav/p.txt", &[], "x").await;
    assert!(dir.path().join("p.txt").exists());

    let r = send(&server, "GET", "/other/p.txt", &[], "").await;
    assert_eq!(r.status, StatusCode::NOT_FOUND);

    let r = send(&server, "COPY", "/dav/p.txt", &[("destination", "/other/q.txt")], "").await;
    assert_eq!(r.status, StatusCode::BAD_GATEWAY);

    let r = send(&server, "GET", "/dav/../p.txt", &[], "").await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);

    let unrooted = DavServer::builder(DavHandler::builder().build()).build();
    let r = send(&unrooted, "GET", "/p.txt", &[], "").await;
    assert_eq!(r.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dot_segments() {
    let (dir, server) = setup();
    send(&server, "MKCOL", "/a", &[], "").await;
    send(&server, "PUT", "/a/f.txt", &[], "x").await;
    send(&server, "PUT", "/keep.txt", &[], "k").await;

    for path in ["/a/..", "/a/%2e%2e", "/a/%2E%2E/", "/a/./f.txt"] {
        let r = send(&server, "DELETE", path, &[], "").await;
        assert_eq!(r.status, StatusCode::BAD_REQUEST, "{path}");
    }
    assert!(dir.path().join("keep.txt").exists());
    assert!(dir.path().join("a/f.txt").exists());

    for dest in ["/x/../a/b", "/a/%2e%2e/a/b"] {
        let r = send(&server, "COPY", "/a", &[("destination", dest)], "").await;
        assert_eq!(r.status, StatusCode::BAD_REQUEST, "{dest}");
        assert!(!dir.path().join("a/b").exists());
    }

    // a full URL is resolved by the URL parser first.
    let r = send(&server, "COPY", "/a", &[("destination", "http://localhost/x/../a/b")], "").await;
    assert_eq!(r.status, StatusCode::FORBIDDEN);
    assert!(!dir.path().join("a/b").exists());

    let r = send(&server, "MOVE", "/a", &[("destination", "/a/b/../../c")], "").await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    assert!(dir.path().join("a/f.txt").exists());
    assert!(!dir.path().join("c").exists());
}

#[tokio::test]
async fn locked_sources_and_destinations() {
    let (dir, server) = setup();
    send(&server, "PUT", "/m.txt", &[], "move me").await;
    send(&server, "PUT", "/c.txt", &[], "copy me").await;

    let r = send(&server, "LOCK", "/m.txt", &[], LOCKINFO).await;
    assert_eq!(r.status, StatusCode::OK);
    let source_token = r.header("lock-token").to_string();

    let r = send(&server, "MOVE", "/m.txt", &[("destination", "/m2.txt")], "").await;
    assert_eq!(r.status, StatusCode::LOCKED);
    assert!(dir.path().join("m.txt").exists());

    // copying only reads the source.
    let r = send(&server, "COPY", "/m.txt", &[("destination", "/m3.txt")], "").await;
    assert_eq!(r.status, StatusCode::CREATED);

    let r = send(&server, "LOCK", "/locked.txt", &[], LOCKINFO).await;
    assert_eq!(r.status, StatusCode::CREATED);
    let dest_token = r.header("lock-token").to_string();

    let r = send(&server, "COPY", "/c.txt", &[("destination", "/locked.txt")], "").await;
    assert_eq!(r.status, StatusCode::LOCKED);
    let r = send(&server, "MOVE", "/c.txt", &[("destination", "/locked.txt")], "").await;
    assert_eq!(r.status, StatusCode::LOCKED);
    assert!(dir.path().join("c.txt").exists());
    assert_eq!(std::fs::read(dir.path().join("locked.txt")).unwrap(), b"");

    let body = r#"<?xml version="1.0"?>
        <D:propertyupdate xmlns:D="DAV:">
          <D:set><D:prop><D:getlastmodified>Wed, 21 Oct 2015 07:28:00 GMT</D:getlastmodified></D:prop></D:set>
        </D:propertyupdate>"#;
    let r = send(&server, "PROPPATCH", "/locked.txt", &[], body).await;
    assert_eq!(r.status, StatusCode::LOCKED);

    let if_header = format!("({dest_token})");
    let r = send(&server, "PROPPATCH", "/locked.txt", &[("if", &if_header)], body).await;
    assert_eq!(r.status, StatusCode::MULTI_STATUS);

    let if_header = format!("({source_token})");
    let r = send(&server, "MOVE", "/m.txt", &[("destination", "/m2.txt"), ("if", &if_header)], "").await;
    assert_eq!(r.status, StatusCode::CREATED);
    // the lock stayed behind.
    let r = send(&server, "PUT", "/m.txt", &[], "again").await;
    assert_eq!(r.status, StatusCode::CREATED);
}

#[tokio::test]
async fn locks_below_a_deleted_folder() {
    let (dir, server) = setup();
    send(&server, "MKCOL", "/d", &[], "").await;
    send(&server, "PUT", "/d/f.txt", &[], "f").await;

    let r = send(&server, "LOCK", "/d/f.txt", &[], LOCKINFO).await;
    let token = r.header("lock-token").to_string();

    // someone else's lock below the folder.
    let r = send(&server, "DELETE", "/d", &[], "").await;
    assert_eq!(r.status, StatusCode::LOCKED);
    let r = send(&server, "MOVE", "/d", &[("destination", "/d2")], "").await;
    assert_eq!(r.status, StatusCode::LOCKED);
    assert!(dir.path().join("d/f.txt").exists());
    let r = send(&server, "PUT", "/d/f.txt", &[], "g").await;
    assert_eq!(r.status, StatusCode::LOCKED);

    let if_header = format!("</d/f.txt> ({token})");
    let r = send(&server, "DELETE", "/d", &[("if", &if_header)], "").await;
    assert_eq!(r.status, StatusCode::NO_CONTENT);
    assert!(!dir.path().join("d").exists());

    // the lock record went with it.
    send(&server, "MKCOL", "/d", &[], "").await;
    let r = send(&server, "PUT", "/d/f.txt", &[], "new").await;
    assert_eq!(r.status, StatusCode::CREATED);

    // a deep lock on the parent outlives its members.
    send(&server, "MKCOL", "/e", &[], "").await;
    send(&server, "PUT", "/e/x.txt", &[], "x").await;
    let r = send(&server, "LOCK", "/e", &[], LOCKINFO).await;
    assert_eq!(r.status, StatusCode::OK);
    let token = r.header("lock-token").to_string();
    let if_header = format!("({token})");
    let r = send(&server, "DELETE", "/e/x.txt", &[("if", &if_header)], "").await;
    assert_eq!(r.status, StatusCode::NO_CONTENT);
    let r = send(&server, "PUT", "/e/y.txt", &[], "y").await;
    assert_eq!(r.status, StatusCode::LOCKED);
}

fn prop_value<'a>(xml: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<D:{name}>");
    let close = format!("</D:{name}>");
    let start = xml.find(&open)? + open.len();
    let len = xml[start..].find(&close)?;
    Some(&xml[start..start + len])
}

#[cfg(unix)]
#[tokio::test]
async fn folder_quota() {
    let (_dir, server) = setup();
    let body = r#"<?xml version="1.0"?>
        <D:propfind xmlns:D="DAV:">
          <D:prop><D:quota-available-bytes/><D:quota-used-bytes/></D:prop>
        </D:propfind>"#;
    let r = send(&server, "PROPFIND", "/", &[("depth", "0")], body).await;
    assert_eq!(r.status, StatusCode::MULTI_STATUS);
    let xml = r.text();
    let available = prop_value(&xml, "quota-available-bytes").expect(&xml);
    let used = prop_value(&xml, "quota-used-bytes").expect(&xml);
    assert!(available.parse::<u64>().is_ok(), "{xml}");
    assert!(used.parse::<u64>().is_ok(), "{xml}");
}

#[cfg(unix)]
#[tokio::test]
async fn symlinks_are_not_listed() {
    let (dir, server) = setup();
    send(&server, "PUT", "/real.txt", &[], "real").await;
    send(&server, "MKCOL", "/realdir", &[], "").await;
    std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("link.txt")).unwrap();
    std::os::unix::fs::symlink(dir.path().join("realdir"), dir.path().join("linkdir")).unwrap();

    let r = send(&server, "PROPFIND", "/", &[("depth", "1")], "").await;
    assert_eq!(r.status, StatusCode::MULTI_STATUS);
    let xml = r.text();
    assert!(xml.contains("<D:href>/real.txt</D:href>"), "{xml}");
    assert!(xml.contains("<D:href>/realdir/</D:href>"), "{xml}");
    assert!(!xml.contains("link"), "{xml}");
}

#[cfg(unix)]
#[tokio::test]
async fn shallow_copy_keeps_times() {
    let (dir, server) = setup();
    send(&server, "MKCOL", "/a", &[], "").await;
    let old = std::time::UNIX_EPOCH + std::time::Duration::from_secs(1445412480);
    std::fs::File::open(dir.path().join("a"))
        .unwrap()
        .set_times(std::fs::FileTimes::new().set_modified(old))
        .unwrap();

    let r = send(&server, "COPY", "/a", &[("destination", "/b"), ("depth", "0")], "").await;
    assert_eq!(r.status, StatusCode::CREATED);
    let modified = std::fs::metadata(dir.path().join("b")).unwrap().modified().unwrap();
    assert_eq!(modified, old);
}
