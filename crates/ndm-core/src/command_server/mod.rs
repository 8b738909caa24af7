//! Loopback command server for the browser extension.
//!
//! Two routes: `GET /interception/status` and `POST /downloads/intercepted`, plus
//! `OPTIONS` preflight for any path. One request per connection; every response is
//! well-formed and closes the socket.

mod request;
mod response;

pub use request::{parse, Request, RequestError, MAX_BODY_BYTES, MAX_HEADER_BYTES};
pub use response::Response;

use std::net::SocketAddr;
use std::sync::Arc;

use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::manager::{AddRequest, ManagerHandle};

/// `type` value the extension sends for a forwarded download.
pub const INTERCEPTED_TYPE: &str = "download.intercepted";

/// Payload of `POST /downloads/intercepted`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IncomingDownload {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub url: String,
    #[serde(default)]
    pub filename: Option<String>,
}

/// What the routes need from the rest of the application.
pub trait CommandHandler: Send + Sync + 'static {
    fn interception_enabled(&self) -> bool;
    /// Hands the download to the manager. False if it could not be queued.
    fn add_intercepted(&self, download: IncomingDownload) -> bool;
}

impl CommandHandler for ManagerHandle {
    fn interception_enabled(&self) -> bool {
        ManagerHandle::interception_enabled(self)
    }

    fn add_intercepted(&self, download: IncomingDownload) -> bool {
        let request = AddRequest {
            url: download.url,
            file_name: download.filename.filter(|f| !f.trim().is_empty()),
            ..AddRequest::default()
        };
        self.submit(request).is_ok()
    }
}

/// Maps one parsed request to its response.
pub fn route<H: CommandHandler + ?Sized>(req: &Request, handler: &H) -> Response {
    match (req.method.as_str(), req.path.as_str()) {
        ("OPTIONS", _) => Response::text(204, ""),
        ("GET", "/interception/status") => Response::json(
            200,
            &serde_json::json!({ "chromeInterceptionEnabled": handler.interception_enabled() }),
        ),
        ("POST", "/downloads/intercepted") => intercepted(&req.body, handler),
        _ => Response::text(404, "not found"),
    }
}

fn intercepted<H: CommandHandler + ?Sized>(body: &[u8], handler: &H) -> Response {
    if !handler.interception_enabled() {
        return Response::text(403, "interception disabled");
    }
    if body.is_empty() {
        return Response::text(400, "invalid body");
    }
    let download: IncomingDownload = match serde_json::from_slice(body) {
        Ok(d) => d,
        Err(e) => {
            tracing::debug!("intercepted download rejected: {}", e);
            return Response::text(400, "invalid json");
        }
    };
    if download.kind.as_deref().is_some_and(|k| k != INTERCEPTED_TYPE) {
        return Response::text(202, "ignored");
    }
    tracing::info!(url = %download.url, "intercepted download received");
    if handler.add_intercepted(download) {
        Response::text(200, "ok")
    } else {
        Response::text(500, "manager unavailable")
    }
}

/// Bound listener; call [`CommandServer::run`] (or spawn it) to serve.
pub struct CommandServer {
    listener: TcpListener,
    handler: Arc<dyn CommandHandler>,
}

impl CommandServer {
    /// Binds `127.0.0.1:port` (port 0 picks a free one).
    pub async fn bind(port: u16, handler: Arc<dyn CommandHandler>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        Ok(Self { listener, handler })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts forever, one task per connection.
    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!(%addr, "command server listening");
        }
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let handler = Arc::clone(&self.handler);
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, handler.as_ref()).await {
                            tracing::debug!(%peer, "command connection: {}", e);
                        }
                    });
                }
                Err(e) => tracing::debug!("command server accept: {}", e),
            }
        }
    }
}

async fn serve_connection(mut stream: TcpStream, handler: &dyn CommandHandler) -> std::io::Result<()> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 8192];
    let response = loop {
        match parse(&buf) {
            Ok(Some(req)) => break route(&req, handler),
            Ok(None) => {}
            Err(e) => {
                tracing::debug!("bad command request: {}", e);
                break Response::text(400, "invalid request");
            }
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break Response::text(400, "incomplete request");
        }
        buf.extend_from_slice(&chunk[..n]);
    };
    stream.write_all(&response.to_bytes()).await?;
    stream.shutdown().await
}
