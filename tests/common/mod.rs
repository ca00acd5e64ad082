//! Shared utilities for integration tests.

use std::future::Future;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Path,
    http::{header, HeaderMap, Method, Uri},
    routing::{get, post},
    Json, Router,
};
use flate2::{write::GzEncoder, Compression};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use shape_sampler::config::SamplerConfig;
use shape_sampler::lifecycle::{Sampler, Shutdown};
use shape_sampler::storage::Repository;

/// Start a JSON API on an ephemeral port.
///
/// - `GET /users/{id}` → user object
/// - `POST /login` → object with a token
/// - `GET /text` → plain text
/// - `GET /slow` → JSON after three seconds
/// - `GET /gzip` → gzip-encoded user object
/// - `GET /deep` → 200 nested arrays
/// - `GET /large` → JSON array of [`LARGE_ITEMS`] objects
/// - anything else → echo of method, path and query
pub async fn start_json_upstream() -> SocketAddr {
    let app = Router::new()
        .route(
            "/users/{id}",
            get(|Path(id): Path<u64>| async move {
                Json(json!({"id": id, "name": format!("user-{id}"), "roles": ["reader"]}))
            }),
        )
        .route(
            "/login",
            post(|Json(body): Json<Value>| async move {
                Json(json!({
                    "token": "tok-123",
                    "user": {"name": body["username"].clone()}
                }))
            }),
        )
        .route("/text", get(|| async { "plain text" }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Json(json!({"ok": true}))
            }),
        )
        .route(
            "/gzip",
            get(|| async {
                (
                    [
                        (header::CONTENT_TYPE, "application/json"),
                        (header::CONTENT_ENCODING, "gzip"),
                    ],
                    gzip(br#"{"id":1,"name":"a"}"#),
                )
            }),
        )
        .route(
            "/deep",
            get(|| async { ([(header::CONTENT_TYPE, "application/json")], deep_json(200)) }),
        )
        .route("/large", get(|| async { Json(large_json()) }))
        .fallback(|method: Method, uri: Uri, headers: HeaderMap| async move {
            Json(json!({
                "method": method.as_str(),
                "path": uri.path(),
                "query": uri.query(),
                "request_id": headers.get("x-request-id").is_some(),
            }))
        });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Number of objects in the `/large` body.
pub const LARGE_ITEMS: usize = 300;

pub fn large_json() -> Value {
    Value::Array((0..LARGE_ITEMS).map(|n| json!({"n": n, "label": "item"})).collect())
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// `depth` nested arrays around a single number.
pub fn deep_json(depth: usize) -> String {
    format!("{}1{}", "[".repeat(depth), "]".repeat(depth))
}

/// Raw HTTP/1.1 upstream that answers every connection with `body` sent in
/// small chunks and no Content-Length.
#[allow(dead_code)]
pub async fn start_chunked_upstream(body: String) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let body = body.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let head = "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                            transfer-encoding: chunked\r\nconnection: close\r\n\r\n";
                let _ = stream.write_all(head.as_bytes()).await;
                for chunk in body.as_bytes().chunks(128) {
                    let _ = stream.write_all(format!("{:x}\r\n", chunk.len()).as_bytes()).await;
                    let _ = stream.write_all(chunk).await;
                    let _ = stream.write_all(b"\r\n").await;
                }
                let _ = stream.write_all(b"0\r\n\r\n").await;
                let _ = stream.shutdown().await;
            });
        }
    });
    addr
}

/// Defaults pointed at `upstream`.
pub fn test_config(upstream: SocketAddr) -> SamplerConfig {
    let mut config = SamplerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.url = format!("http://{upstream}");
    config
}

/// Run a sampler over `repository` on an ephemeral port.
pub async fn start_sampler(config: SamplerConfig, repository: Arc<dyn Repository>) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let sampler = Sampler::with_repository(config, repository);
    let signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = sampler.run(listener, &signal).await;
    });

    (addr, shutdown)
}

/// A free local port, released before return.
#[allow(dead_code)]
pub async fn free_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Poll `check` for up to two seconds.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
