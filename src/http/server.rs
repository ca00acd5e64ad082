//! HTTP server setup and the sampling proxy handler.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all proxy handler
//! - Wire up middleware (request ID, tracing, body limit, concurrency limit)
//! - Forward requests to the upstream API and buffer the response
//! - Stream responses above the body limit without inspecting them
//! - Hand each completed exchange to the interceptor off the serving path
//! - Observability (metrics, correlation IDs)

use std::future::poll_fn;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, Request},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use chrono::Utc;
use hyper::body::{Body as _, Incoming};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::task::TaskTracker;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use url::Url;

use crate::collector::{CapturedExchange, Interceptor, ObservationQueue};
use crate::config::SamplerConfig;
use crate::http::request::{request_id, request_id_header, restrict_accept_encoding, upstream_uri};
use crate::http::response::{strip_hop_by_hop, ForwardError, ResumedBody};
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::security::Redactor;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: Client<HttpConnector, Body>,
    pub upstream: Arc<Url>,
    pub interceptor: Arc<Interceptor>,
    pub queue: ObservationQueue,
    /// Inspection tasks spawned after each response.
    pub inspections: TaskTracker,
    pub max_body_size: usize,
    pub request_timeout: Duration,
}

/// HTTP server for the sampling proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    ///
    /// Inspection tasks are spawned on `inspections`; close and wait on it
    /// after [`HttpServer::run`] returns to be sure every capture was queued.
    pub fn new(
        config: &SamplerConfig,
        queue: ObservationQueue,
        inspections: TaskTracker,
    ) -> Result<Self, url::ParseError> {
        let upstream = Url::parse(&config.upstream.url)?;

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.timeouts.connect()));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let redactor = Redactor::new(
            &config.redaction.extra_headers,
            &config.redaction.extra_fields,
        );
        let interceptor = Interceptor::new(
            redactor,
            config.collector.fingerprint_budget(),
            config.security.max_body_size,
        );

        let state = AppState {
            client,
            upstream: Arc::new(upstream),
            interceptor: Arc::new(interceptor),
            queue,
            inspections,
            max_body_size: config.security.max_body_size,
            request_timeout: config.timeouts.request(),
        };

        Ok(Self {
            router: Self::build_router(config, state),
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &SamplerConfig, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler));

        if let Some(path) = config.proxy.health_path.as_deref().filter(|p| !p.is_empty()) {
            router = router.route(path, get(health_handler));
        }

        router.with_state(state).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id_header(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id_header()))
                .layer(GlobalConcurrencyLimitLayer::new(config.listener.max_connections))
                .layer(RequestBodyLimitLayer::new(config.security.max_body_size)),
        )
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: ShutdownSignal) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.recv().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Forward one request upstream, return the upstream response unchanged and
/// queue the exchange for inspection.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request_id(request.headers());
    let method = request.method().clone();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %request.uri().path(),
        "Proxying request"
    );

    let exchange = match forward(&state, request, request_id.clone(), start).await {
        Ok(Forwarded::Captured(exchange)) => exchange,
        Ok(Forwarded::Streamed(response)) => {
            metrics::record_request(method.as_str(), response.status().as_u16(), start);
            return response;
        }
        Err(e) => {
            let status = e.status();
            tracing::warn!(request_id = %request_id, error = %e, status = %status, "Forwarding failed");
            metrics::record_request(method.as_str(), status.as_u16(), start);
            return e.into_response();
        }
    };

    metrics::record_request(method.as_str(), exchange.status.as_u16(), start);

    let mut response = Response::new(Body::from(exchange.response_body.clone()));
    *response.status_mut() = exchange.status;
    *response.headers_mut() = exchange.response_headers.clone();

    let interceptor = state.interceptor.clone();
    let queue = state.queue.clone();
    state.inspections.spawn(async move {
        let request_id = exchange.request_id.clone();
        if let Some(observation) = interceptor.inspect(exchange) {
            if let Err(reason) = queue.submit(observation) {
                tracing::debug!(request_id = %request_id, reason = ?reason, "Observation dropped");
            }
        }
    });

    response
}

/// Outcome of a successful upstream round trip.
enum Forwarded {
    /// Body fully buffered; the exchange can be inspected.
    Captured(CapturedExchange),
    /// Body above the limit; relayed as a stream and not inspected.
    Streamed(Response),
}

/// Upstream response body, buffered when it fits within the limit.
enum UpstreamBody {
    Buffered(Bytes),
    Streamed(Body),
}

async fn forward(
    state: &AppState,
    request: Request<Body>,
    request_id: String,
    start: Instant,
) -> Result<Forwarded, ForwardError> {
    let timestamp = Utc::now();
    let (parts, body) = request.into_parts();

    let request_body = axum::body::to_bytes(body, state.max_body_size)
        .await
        .map_err(|_| ForwardError::RequestTooLarge(state.max_body_size))?;

    let mut headers = parts.headers.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    restrict_accept_encoding(&mut headers);

    let mut upstream_request = Request::builder()
        .method(parts.method.clone())
        .uri(upstream_uri(&state.upstream, &parts.uri)?)
        .body(Body::from(request_body.clone()))?;
    *upstream_request.headers_mut() = headers;

    let (response_parts, upstream_body) = tokio::time::timeout(state.request_timeout, async {
        let response: hyper::Response<Incoming> = state
            .client
            .request(upstream_request)
            .await
            .map_err(|e| ForwardError::Upstream(e.to_string()))?;
        let (parts, body) = response.into_parts();
        let body = read_body(body, state.max_body_size).await?;
        Ok::<_, ForwardError>((parts, body))
    })
    .await
    .map_err(|_| ForwardError::Timeout)??;

    let mut response_headers = response_parts.headers;
    strip_hop_by_hop(&mut response_headers);

    let response_body = match upstream_body {
        UpstreamBody::Buffered(bytes) => bytes,
        UpstreamBody::Streamed(body) => {
            tracing::debug!(
                request_id = %request_id,
                limit = state.max_body_size,
                "Upstream response exceeds body limit, streaming without sampling"
            );
            let mut response = Response::new(body);
            *response.status_mut() = response_parts.status;
            *response.headers_mut() = response_headers;
            return Ok(Forwarded::Streamed(response));
        }
    };

    Ok(Forwarded::Captured(CapturedExchange {
        request_id,
        method: parts.method,
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        request_headers: parts.headers,
        request_body,
        status: response_parts.status,
        response_headers,
        response_body,
        response_time: start.elapsed(),
        timestamp,
    }))
}

/// Buffer `body` up to `limit` bytes. A body that declares or reaches a
/// larger size is handed back as a stream, already-read bytes first.
async fn read_body(mut body: Incoming, limit: usize) -> Result<UpstreamBody, ForwardError> {
    if body.size_hint().lower() > limit as u64 {
        return Ok(UpstreamBody::Streamed(Body::new(body)));
    }

    let mut buffered: Vec<u8> = Vec::new();
    while let Some(frame) = poll_fn(|cx| Pin::new(&mut body).poll_frame(cx)).await {
        let frame = frame.map_err(|e| ForwardError::Upstream(e.to_string()))?;
        let Ok(data) = frame.into_data() else {
            continue;
        };
        buffered.extend_from_slice(&data);
        if buffered.len() > limit {
            let resumed = ResumedBody::new(Bytes::from(buffered), body);
            return Ok(UpstreamBody::Streamed(Body::new(resumed)));
        }
    }
    Ok(UpstreamBody::Buffered(Bytes::from(buffered)))
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "shape-sampler",
        "upstream": state.upstream.as_str(),
    }))
}
