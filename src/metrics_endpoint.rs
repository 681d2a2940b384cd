//! Metrics HTTP Endpoint
//!
//! Serves the proxy's Prometheus registry on a separate port so scraping
//! never competes with streaming traffic.

use crate::metrics::ProxyMetrics;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Metrics endpoint server
pub struct MetricsEndpoint {
    metrics: ProxyMetrics,
    addr: SocketAddr,
}

impl MetricsEndpoint {
    /// Create a new metrics endpoint
    ///
    /// # Example
    /// ```no_run
    /// use feedit::metrics::ProxyMetrics;
    /// use feedit::metrics_endpoint::MetricsEndpoint;
    ///
    /// let metrics = ProxyMetrics::new().unwrap();
    /// let endpoint = MetricsEndpoint::new(metrics, "127.0.0.1:9090".parse().unwrap());
    /// ```
    pub fn new(metrics: ProxyMetrics, addr: SocketAddr) -> Self {
        Self { metrics, addr }
    }

    /// Bind and serve `/metrics` and `/health` until the task is dropped
    pub async fn start(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("Metrics endpoint listening on http://{}", self.addr);
        info!("Metrics available at http://{}/metrics", self.addr);

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let metrics = self.metrics.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let metrics = metrics.clone();
                    async move { handle_request(req, &metrics) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving metrics connection: {:?}", err);
                }
            });
        }
    }
}

fn handle_request<B>(
    req: Request<B>,
    metrics: &ProxyMetrics,
) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(match req.uri().path() {
        "/metrics" => metrics_response(metrics),
        "/health" => text_response(StatusCode::OK, "application/json", r#"{"status":"healthy"}"#),
        _ => text_response(StatusCode::NOT_FOUND, "text/plain", "404 Not Found"),
    })
}

fn metrics_response(metrics: &ProxyMetrics) -> Response<Full<Bytes>> {
    match metrics.gather_text() {
        Ok(body) => text_response(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            body,
        ),
        Err(e) => {
            warn!("Failed to encode metrics: {}", e);
            text_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain",
                "failed to encode metrics",
            )
        }
    }
}

fn text_response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
