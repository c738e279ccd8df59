//! ## WebDAV adapter for a local directory
//!
//! This crate serves one directory of the local filesystem over
//! [WebDAV] (RFC4918): GET/HEAD/PUT/DELETE plus MKCOL, COPY, MOVE,
//! PROPFIND, PROPPATCH, LOCK, UNLOCK and OPTIONS.
//!
//! The request path below a configurable prefix is mapped onto the
//! directory by a [`PathResolver`][resolver::PathResolver]. Every path
//! is turned into a resource (a file, a folder, or a byte range of a
//! file) which implements the protocol operations on top of a
//! [filesystem backend][fs::DavFileSystem]. Locks are kept by a
//! [lock manager][ls::DavLockSystem]; the included one keeps them in memory.
//!
//! The handler works with the standard http types from the `http` and
//! `http_body` crates, so it can be used straight away with hyper.
//!
//! ## Client compatibility.
//!
//! [`DavServer`] wraps the handler with filters for the quirks of the
//! WebDAV clients built into operating systems:
//!
//! - chunked PUT requests that carry the real length in
//!   `X-Expected-Entity-Length` (macOS Finder),
//! - Unicode normalization of paths: clients may use decomposed (NFD)
//!   names while the filesystem stores composed (NFC) ones.
//!
//! ## Example.
//!
//! Serve /tmp on port 4918 with hyper:
//!
//! ```no_run
//! use std::convert::Infallible;
//! use vault_dav::{DavHandler, DavServer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let dir = "/tmp";
//!     let addr = ([127, 0, 0, 1], 4918).into();
//!
//!     let handler = DavHandler::builder().root(dir).build();
//!     let dav_server = DavServer::builder(handler).build();
//!
//!     let make_service = hyper::service::make_service_fn(move |_| {
//!         let dav_server = dav_server.clone();
//!         async move {
//!             let func = move |req| {
//!                 let dav_server = dav_server.clone();
//!                 async move {
//!                     Ok::<_, Infallible>(dav_server.handle(req).await)
//!                 }
//!             };
//!             Ok::<_, Infallible>(hyper::service::service_fn(func))
//!         }
//!     });
//!
//!     println!("Serving {} on {}", dir, addr);
//!     let _ = hyper::Server::bind(&addr)
//!         .serve(make_service)
//!         .await
//!         .map_err(|e| eprintln!("server error: {}", e));
//! }
//! ```
//!
//! [WebDAV]: https://datatracker.ietf.org/doc/html/rfc4918

#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

mod conditional;
mod davhandler;
mod davheaders;
mod errors;
mod resource;
mod session;
mod util;

pub mod body;
pub mod filters;
pub mod fs;
pub mod locator;
pub mod ls;
pub mod range;
pub mod resolver;

pub use crate::davhandler::{DavBuilder, DavHandler, LockSystem};
pub use crate::filters::{DavServer, DavServerBuilder};
pub use crate::util::{DavMethod, DavMethodSet};
