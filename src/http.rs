//! Minimal read-only HTTP: `GET /health`, `GET /snapshot`.

use crate::service::SnapshotService;
use anyhow::{Context, Result};
use snapshot_cache::KvStore;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status_line: &'static str,
    pub content_type: &'static str,
    pub body: String,
}

impl HttpReply {
    fn text(status_line: &'static str, body: &str) -> Self {
        Self {
            status_line,
            content_type: "text/plain; charset=utf-8",
            body: body.to_string(),
        }
    }

    fn to_wire(&self) -> String {
        format!(
            "{}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.status_line,
            self.content_type,
            self.body.len(),
            self.body
        )
    }
}

pub async fn route<S: KvStore + 'static>(method: &str, path: &str, service: &SnapshotService<S>) -> HttpReply {
    match (method, path) {
        ("GET", "/health") => HttpReply::text("HTTP/1.1 200 OK", "ok"),
        ("GET", "/snapshot") => match service.get_snapshot().await {
            Ok(snap) => match serde_json::to_string(&snap) {
                Ok(json) => HttpReply {
                    status_line: "HTTP/1.1 200 OK",
                    content_type: "application/json; charset=utf-8",
                    body: json,
                },
                Err(e) => {
                    warn!("snapshot serialize failed: {e}");
                    HttpReply::text("HTTP/1.1 500 Internal Server Error", "snapshot unavailable")
                }
            },
            Err(e) => {
                warn!("snapshot request failed: {e:#}");
                HttpReply::text("HTTP/1.1 500 Internal Server Error", "snapshot unavailable")
            }
        },
        _ => HttpReply::text("HTTP/1.1 404 Not Found", "not found"),
    }
}

async fn handle_http_connection<S: KvStore + 'static>(mut stream: TcpStream, service: SnapshotService<S>) -> Result<()> {
    let mut buf = vec![0u8; 8192];
    let n = stream.read(&mut buf).await.context("http read")?;
    if n == 0 {
        return Ok(());
    }

    let req = String::from_utf8_lossy(&buf[..n]);
    let first_line = req.lines().next().unwrap_or_default();
    let mut parts = first_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("").split('?').next().unwrap_or("");

    let reply = route(method, path, &service).await;
    stream.write_all(reply.to_wire().as_bytes()).await.context("http write")?;
    Ok(())
}

pub async fn serve<S: KvStore + 'static>(listener: TcpListener, service: SnapshotService<S>) -> Result<()> {
    info!(
        "ev-observer http listening on http://{} (GET /health, /snapshot)",
        listener.local_addr().context("http local addr")?
    );

    loop {
        let (stream, peer) = listener.accept().await.context("http accept")?;
        let service = service.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_http_connection(stream, service).await {
                debug!("http handler err {}: {}", peer, e);
            }
        });
    }
}

pub async fn start_http_server<S: KvStore + 'static>(service: SnapshotService<S>, bind: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(bind).await.context("http bind")?;
    serve(listener, service).await
}
