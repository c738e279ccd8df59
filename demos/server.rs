//
//  Sample application.
//
//  Serves a local directory on localhost:4918, plain http, no ssl.
//  Connect to http://localhost:4918/
//

use std::convert::Infallible;
use std::error::Error;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use futures_util::future::TryFutureExt;

use vault_dav::body::Body;
use vault_dav::filters::UserAgentQuirks;
use vault_dav::{DavHandler, DavServer};

#[derive(Debug, clap::Parser)]
#[command(about, version)]
struct Cli {
    /// port to listen on
    #[arg(short, long, default_value = "4918")]
    port: u16,
    /// local directory to serve
    #[arg(short, long, default_value = ".")]
    dir: String,
    /// url prefix the share is mounted on
    #[arg(long, default_value = "/")]
    prefix: String,
    /// only normalize multistatus hrefs for macOS clients
    #[arg(long)]
    macos_only: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let Cli {
        port,
        dir,
        prefix,
        macos_only,
    } = Cli::parse();

    let handler = DavHandler::builder()
        .root(dir.as_str())
        .strip_prefix(prefix.as_str())
        .build();
    let mut builder = DavServer::builder(handler);
    if macos_only {
        builder = builder.quirks(Arc::new(UserAgentQuirks));
    }
    let dav_server = builder.build();

    let make_service = hyper::service::make_service_fn(|_| {
        let dav_server = dav_server.clone();
        async move {
            let func = move |req: hyper::Request<hyper::Body>| {
                let dav_server = dav_server.clone();
                async move { Ok::<hyper::Response<Body>, Infallible>(dav_server.handle(req).await) }
            };
            Ok::<_, hyper::Error>(hyper::service::service_fn(func))
        }
    });

    let addr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))?;
    let server = hyper::Server::try_bind(&addr)?
        .serve(make_service)
        .map_err(|e| eprintln!("server error: {}", e));

    println!("Serving {} on {}{}", dir, port, prefix);
    let _ = server.await;
    Ok(())
}
