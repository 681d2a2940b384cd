//! Streaming proxy
//!
//! Relays a byte window of a remote resource to the caller without buffering
//! it. Every request runs the same short pipeline:
//!
//! ```text
//! HEAD origin ──► size, content type
//!      │
//!      ├─ HEAD request ──► deliver(None, 200 + headers)
//!      │
//!      └─ GET request ──► window size (bitrate cache)
//!                           │
//!                           ▼
//!                       byte range ──► GET origin with Range
//!                                          │
//!                                          ▼
//!                              deliver(Some(stream), 206 + headers)
//! ```
//!
//! Upstream failures are returned to the caller. Bitrate cache failures never
//! are; they only cost the request its adaptive window.

use crate::bitrate_cache::{cache_key, BitrateCache};
use crate::buffer_size::{BufferSizeSelector, WindowSource};
use crate::config::FeedConfig;
use crate::error::{FeedError, Result};
use crate::metadata_fetcher::MetadataFetcher;
use crate::metrics::ProxyMetrics;
use crate::models::{
    ByteRange, ByteStream, ResourceMetadata, StreamOptions, StreamResponse, DEFAULT_CONTENT_TYPE,
};
use crate::probe::{BitrateProbe, FfprobeProbe};
use crate::range_resolver::RangeResolver;
use futures::TryStreamExt;
use http::header::{
    HeaderName, HeaderValue, ACCEPT_RANGES, CONNECTION, CONTENT_LENGTH, CONTENT_RANGE,
    CONTENT_TYPE, RANGE,
};
use http::{HeaderMap, Method, StatusCode};
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Diagnostic header echoing the resolved window as `start-end`
pub const X_RANGE: HeaderName = HeaderName::from_static("x-range");

/// Main streaming proxy structure
pub struct StreamingProxy {
    config: Arc<FeedConfig>,
    fetcher: MetadataFetcher,
    client: Client,
    selector: BufferSizeSelector,
    metrics: ProxyMetrics,
}

/// Per-request state for one [`StreamingProxy::stream`] call
///
/// Created fresh for every call so concurrent requests for different URLs
/// never see each other's window size.
#[derive(Debug, Clone)]
pub struct RequestContext {
    url: String,
    method: Method,
    cache_key: String,
    cache_dir: PathBuf,
    debug: bool,
    window_size: u64,
    window_source: Option<WindowSource>,
}

impl StreamingProxy {
    /// Create a proxy probing bitrates with the configured ffprobe
    pub fn new(config: Arc<FeedConfig>) -> Result<Self> {
        let probe = Arc::new(FfprobeProbe::from_config(&config.probe));
        Self::with_probe(config, probe)
    }

    /// Create a proxy with a custom bitrate probe
    pub fn with_probe(config: Arc<FeedConfig>, probe: Arc<dyn BitrateProbe>) -> Result<Self> {
        config.validate()?;

        let metrics = ProxyMetrics::new()
            .map_err(|e| FeedError::InternalError(format!("Failed to create metrics: {}", e)))?;

        let fetcher = MetadataFetcher::with_timeout(config.metadata_timeout())?;

        // no overall timeout: bodies may stream for a long time
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| FeedError::HttpError(format!("Failed to create HTTP client: {}", e)))?;

        let selector = if config.enable_bitrate_cache {
            BufferSizeSelector::new(BitrateCache::new(probe, metrics.clone()))
        } else {
            BufferSizeSelector::disabled()
        };

        info!("Creating StreamingProxy");
        info!("  Default window: {} bytes", config.default_window_size);
        info!(
            "  Buffer bounds: {}-{} bytes",
            config.min_buffer_size, config.max_buffer_size
        );
        info!(
            "  Bitrate cache: {} ({})",
            config.enable_bitrate_cache,
            config.cache_dir.display()
        );

        Ok(StreamingProxy {
            config,
            fetcher,
            client,
            selector,
            metrics,
        })
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn metrics(&self) -> &ProxyMetrics {
        &self.metrics
    }

    /// The bitrate cache, if enabled
    pub fn bitrate_cache(&self) -> Option<&BitrateCache> {
        self.selector.cache()
    }

    /// Build the per-request context from call options and configuration
    pub fn new_ctx(&self, opts: &StreamOptions) -> RequestContext {
        RequestContext {
            url: opts.url.clone(),
            method: opts.method.clone(),
            cache_key: cache_key(&opts.url),
            cache_dir: opts
                .cache_dir
                .clone()
                .unwrap_or_else(|| self.config.cache_dir.clone()),
            debug: opts.debug.unwrap_or(self.config.debug),
            window_size: self.config.default_window_size,
            window_source: None,
        }
    }

    /// Stream a resource, handing the caller the body and synthesized headers
    ///
    /// `deliver` receives `None` and a 200 response for HEAD requests, or the
    /// upstream body stream and a 206 response for everything else. Its
    /// return value is passed through.
    ///
    /// # Errors
    /// Upstream transport failures and error statuses, invalid client ranges
    /// and invalid per-call buffer bounds. Bitrate cache problems are never
    /// reported here.
    pub async fn stream<F, T>(&self, opts: StreamOptions, deliver: F) -> Result<T>
    where
        F: FnOnce(Option<ByteStream>, StreamResponse) -> T,
    {
        let mut ctx = self.new_ctx(&opts);
        self.metrics.record_request(ctx.method.as_str());
        info!("Processing request: {} {}", ctx.method, ctx.url);

        let metadata = self
            .fetcher
            .fetch_metadata(&ctx.url)
            .await
            .inspect_err(|_| self.metrics.record_upstream_error())?;

        let mut headers = base_headers(&metadata);

        if ctx.method == Method::HEAD {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(metadata.size));
            debug!("HEAD {} answered from metadata: size={}", ctx.url, metadata.size);
            return Ok(deliver(
                None,
                StreamResponse {
                    status: StatusCode::OK,
                    headers,
                },
            ));
        }

        // a bad client range must not reach the selector and start a probe
        let spec = opts
            .range
            .as_deref()
            .map(RangeResolver::parse_range_spec)
            .transpose()
            .and_then(|spec| {
                RangeResolver::check_satisfiable(spec.as_ref(), metadata.size)?;
                Ok(spec)
            })
            .inspect_err(|e| warn!("Rejecting range {:?} for {}: {}", opts.range, ctx.url, e))?;

        let bounds = self
            .config
            .bounds_with_overrides(opts.min_buffer_size, opts.max_buffer_size)?;

        let selection = self
            .selector
            .select(&ctx.url, bounds, &ctx.cache_dir, ctx.debug, ctx.window_size)
            .await;
        ctx.set_window(selection.window_size, selection.source);
        debug!(
            "Window for {}: {} bytes ({:?}, entry {})",
            ctx.url,
            selection.window_size,
            selection.source,
            ctx.cache_key
        );

        let range = RangeResolver::resolve_spec(spec, metadata.size, ctx.window_size)?;

        headers.insert(
            CONTENT_RANGE,
            header_value(&range.content_range(metadata.size))?,
        );
        headers.insert(CONTENT_LENGTH, HeaderValue::from(range.size()));
        headers.insert(X_RANGE, header_value(&range.to_x_range())?);

        let body = self
            .fetch_range(&ctx.url, &range)
            .await
            .inspect_err(|_| self.metrics.record_upstream_error())?;

        info!(
            "Relaying {} bytes {} of {} for {}",
            range.size(),
            range.to_x_range(),
            metadata.size,
            ctx.url
        );

        Ok(deliver(
            Some(body),
            StreamResponse {
                status: StatusCode::PARTIAL_CONTENT,
                headers,
            },
        ))
    }

    /// Issue the ranged GET upstream and return its body stream
    async fn fetch_range(&self, url: &str, range: &ByteRange) -> Result<ByteStream> {
        let response = self
            .client
            .get(url)
            .header(RANGE, range.to_header())
            .header(CONNECTION, "keep-alive")
            .send()
            .await
            .map_err(|e| {
                error!("Ranged GET failed for {}: {}", url, e);
                FeedError::HttpError(format!("Ranged GET failed: {}", e))
            })?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            warn!("Origin returned error for ranged GET {}: status={}", url, status);
            return Err(FeedError::from_http_status(
                status.as_u16(),
                format!("GET {} returned {}", url, status),
            ));
        }
        if status != reqwest::StatusCode::PARTIAL_CONTENT {
            warn!(
                "Origin answered ranged GET {} with {} instead of 206",
                url, status
            );
        }

        Ok(Box::pin(response.bytes_stream().map_err(FeedError::from)))
    }
}

fn base_headers(metadata: &ResourceMetadata) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_str(&metadata.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE)),
    );
    headers
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| FeedError::InternalError(format!("Invalid header value {:?}: {}", value, e)))
}

impl RequestContext {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Name of this URL's bitrate entry
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    pub fn cache_dir(&self) -> &std::path::Path {
        &self.cache_dir
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn window_size(&self) -> u64 {
        self.window_size
    }

    pub fn window_source(&self) -> Option<WindowSource> {
        self.window_source
    }

    pub fn set_window(&mut self, window_size: u64, source: WindowSource) {
        self.window_size = window_size;
        self.window_source = Some(source);
    }
}
