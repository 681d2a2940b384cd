//! Feedit
//!
//! A byte-range streaming proxy for remote media. Each request relays one
//! window of an upstream resource to the client without buffering it, and
//! the window grows or shrinks with the resource's measured bitrate.
//!
//! # Overview
//!
//! For every request the proxy learns the resource's size and content type
//! with a HEAD request to the origin. HEAD requests are answered from that
//! metadata alone. GET requests resolve the client's `Range` header against
//! a window size, issue one ranged GET upstream and hand the body stream and
//! synthesized `206 Partial Content` headers to the caller.
//!
//! The window size comes from a small on-disk bitrate cache. The first
//! request for a URL uses the default window and starts an `ffprobe` run in
//! the background; later requests read the stored bitrate and clamp it into
//! the configured bounds.
//!
//! # Features
//!
//! - **Zero-copy relay**: Upstream chunks flow straight to the client
//! - **Adaptive windows**: Bitrate-sized windows clamped to min/max bounds
//! - **Single-flight probing**: At most one probe per URL at a time
//! - **Range support**: Open-ended, explicit and missing ranges
//! - **Metrics**: Prometheus counters on a separate endpoint
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use feedit::{FeedConfig, StreamOptions, StreamingProxy};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let proxy = StreamingProxy::new(Arc::new(FeedConfig::default()))?;
//!
//! let opts = StreamOptions::new("http://origin.example.com/movie.mp4")
//!     .with_range("bytes=0-");
//!
//! let (body, response) = proxy.stream(opts, |body, response| (body, response)).await?;
//! println!("{} {:?}", response.status, response.header("content-range"));
//! assert!(body.is_some());
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`StreamingProxy`]: Runs the per-request pipeline
//! - [`MetadataFetcher`]: HEAD requests for size and content type
//! - [`RangeResolver`]: Turns a `Range` header into a concrete byte range
//! - [`BufferSizeSelector`]: Picks the window size from the bitrate cache
//! - [`BitrateCache`]: Hashed on-disk bitrate entries and background probes
//! - [`FfprobeProbe`]: Measures bitrates with `ffprobe`
//! - [`StreamServer`]: HTTP front end
//! - [`ProxyMetrics`]: Prometheus counters
//!
//! # Configuration
//!
//! Configuration is loaded from a YAML file; every field is optional:
//!
//! ```yaml
//! listen_address: "127.0.0.1:8080"
//! default_window_size: 1024000
//! min_buffer_size: 1048576
//! max_buffer_size: 10485760
//! cache_dir: ".feedit"
//! enable_bitrate_cache: true
//! debug: false
//! probe:
//!   program: "ffprobe"
//!   timeout_secs: 30
//! metrics_endpoint:
//!   enabled: true
//!   address: "127.0.0.1:9090"
//! ```
//!
//! See [`FeedConfig`] for all options.
//!
//! # Error Handling
//!
//! All fallible operations return [`FeedError`]. Upstream failures and bad
//! ranges reach the caller; bitrate cache failures never do.
//!
//! ```rust,no_run
//! use feedit::{FeedConfig, FeedError};
//!
//! match FeedConfig::from_file("feedit.yaml") {
//!     Ok(_) => println!("Config loaded"),
//!     Err(FeedError::ConfigError(msg)) => eprintln!("Config error: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

pub mod bitrate_cache;
pub mod buffer_size;
pub mod config;
pub mod error;
pub mod metadata_fetcher;
pub mod metrics;
pub mod metrics_endpoint;
pub mod models;
pub mod probe;
pub mod range_resolver;
pub mod server;
pub mod streaming_proxy;

// Re-export commonly used types
pub use bitrate_cache::{cache_key, parse_bitrate, BitrateCache, CacheLookup};
pub use buffer_size::{BufferSizeSelector, WindowSelection, WindowSource};
pub use config::FeedConfig;
pub use error::{FeedError, Result};
pub use metadata_fetcher::MetadataFetcher;
pub use metrics::{MetricsSnapshot, ProxyMetrics};
pub use metrics_endpoint::MetricsEndpoint;
pub use models::{
    BufferSizeBounds, ByteRange, ByteStream, ResourceMetadata, StreamOptions, StreamResponse,
};
pub use probe::{BitrateProbe, FfprobeProbe};
pub use range_resolver::{RangeResolver, RangeSpec};
pub use server::StreamServer;
pub use streaming_proxy::{RequestContext, StreamingProxy};
