//! HTTP front end
//!
//! Exposes [`StreamingProxy::stream`] over HTTP/1.1:
//!
//! - `GET|HEAD /stream?url=<encoded upstream url>` relays one window of the
//!   upstream resource. The client's `Range` header is honored and
//!   `min_buffer_size`, `max_buffer_size` and `debug` query parameters
//!   override the configured values for that request.
//! - `GET /health` answers 200.

use crate::error::{FeedError, Result};
use crate::models::{ByteStream, StreamOptions, StreamResponse};
use crate::streaming_proxy::StreamingProxy;
use futures::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::{Bytes, Frame};
use hyper::header::{HeaderValue, CONTENT_TYPE, RANGE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use reqwest::Url;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Response body type served to clients
pub type ProxyBody = UnsyncBoxBody<Bytes, FeedError>;

/// HTTP server relaying stream requests to a [`StreamingProxy`]
pub struct StreamServer {
    proxy: Arc<StreamingProxy>,
}

impl StreamServer {
    pub fn new(proxy: Arc<StreamingProxy>) -> Self {
        Self { proxy }
    }

    /// Bind `addr` and serve until the task is dropped
    pub async fn start(self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve connections accepted from an already bound listener
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        info!("Stream server listening on http://{}", listener.local_addr()?);

        loop {
            let (stream, peer) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let proxy = Arc::clone(&self.proxy);

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let proxy = Arc::clone(&proxy);
                    async move { Ok::<_, Infallible>(handle_request(&proxy, req).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Connection from {} ended with error: {:?}", peer, err);
                }
            });
        }
    }
}

/// Route a single request
pub async fn handle_request<B>(proxy: &StreamingProxy, req: Request<B>) -> Response<ProxyBody> {
    let opts = match (req.method(), req.uri().path()) {
        (&Method::GET, "/health") => return text_response(StatusCode::OK, "ok"),
        (&Method::GET | &Method::HEAD, "/stream") => stream_options(&req),
        (_, "/stream") => {
            return text_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
        }
        _ => return text_response(StatusCode::NOT_FOUND, "not found"),
    };
    drop(req);

    let result = match opts {
        Ok(opts) => relay(proxy, opts).await,
        Err(e) => Err(e),
    };
    result.unwrap_or_else(|e| error_response(&e))
}

fn stream_options<B>(req: &Request<B>) -> Result<StreamOptions> {
    let mut opts = parse_stream_query(req.uri().path_and_query().map_or("", |pq| pq.as_str()))?
        .with_method(req.method().clone());

    if let Some(range) = req.headers().get(RANGE) {
        let range = range
            .to_str()
            .map_err(|_| FeedError::InvalidRange("Range header is not ASCII".to_string()))?;
        opts = opts.with_range(range);
    }
    Ok(opts)
}

async fn relay(proxy: &StreamingProxy, opts: StreamOptions) -> Result<Response<ProxyBody>> {
    let metrics = proxy.metrics().clone();
    proxy
        .stream(opts, move |body, head| {
            let body = match body {
                Some(stream) => counted_body(stream, move |n| metrics.record_bytes_to_client(n)),
                None => Empty::<Bytes>::new()
                    .map_err(|never| match never {})
                    .boxed_unsync(),
            };
            into_response(head, body)
        })
        .await
}

/// Build [`StreamOptions`] from a `/stream?...` request target
pub fn parse_stream_query(target: &str) -> Result<StreamOptions> {
    let parsed = Url::parse(&format!("http://localhost{}", target))
        .map_err(|e| FeedError::ParseError(format!("Invalid request target: {}", e)))?;

    let mut url = None;
    let mut min = None;
    let mut max = None;
    let mut debug = None;

    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "url" => url = Some(value.into_owned()),
            "min_buffer_size" => min = Some(parse_size("min_buffer_size", &value)?),
            "max_buffer_size" => max = Some(parse_size("max_buffer_size", &value)?),
            "debug" => debug = Some(parse_flag(&value)?),
            _ => {}
        }
    }

    let url = url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| FeedError::ParseError("Missing url query parameter".to_string()))?;

    let upstream = Url::parse(&url)
        .map_err(|e| FeedError::ParseError(format!("Invalid upstream url {:?}: {}", url, e)))?;
    if !matches!(upstream.scheme(), "http" | "https") {
        return Err(FeedError::ParseError(format!(
            "Unsupported upstream scheme: {}",
            upstream.scheme()
        )));
    }

    let mut opts = StreamOptions::new(url).with_buffer_sizes(min, max);
    if let Some(debug) = debug {
        opts = opts.with_debug(debug);
    }
    Ok(opts)
}

fn parse_size(name: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| FeedError::ParseError(format!("{} must be a byte count, got {:?}", name, value)))
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim() {
        "1" | "true" | "yes" | "on" | "" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(FeedError::ParseError(format!("Invalid debug flag: {:?}", other))),
    }
}

fn counted_body<F>(stream: ByteStream, on_chunk: F) -> ProxyBody
where
    F: Fn(u64) + Send + 'static,
{
    let frames = stream
        .inspect_ok(move |chunk| on_chunk(chunk.len() as u64))
        .map_ok(Frame::data);
    StreamBody::new(frames).boxed_unsync()
}

fn into_response(head: StreamResponse, body: ProxyBody) -> Response<ProxyBody> {
    let mut response = Response::new(body);
    *response.status_mut() = head.status;
    *response.headers_mut() = head.headers;
    response
}

fn text_response(status: StatusCode, message: &str) -> Response<ProxyBody> {
    let body = Full::new(Bytes::from(format!("{}\n", message)))
        .map_err(|never| match never {})
        .boxed_unsync();
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn error_response(err: &FeedError) -> Response<ProxyBody> {
    let status = StatusCode::from_u16(err.to_http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!("Stream request failed: {}", err);
    } else {
        warn!("Stream request rejected: {}", err);
    }
    text_response(status, &err.to_string())
}
