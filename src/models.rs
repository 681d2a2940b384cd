//! Core data models for the feedit proxy

use crate::error::{FeedError, Result};
use bytes::Bytes;
use futures::Stream;
use http::{HeaderMap, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::pin::Pin;

/// Content type used when the origin does not report one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Size reported for resources whose origin omits Content-Length
///
/// One rather than zero so `size - 1` stays a valid last byte index.
pub const UNKNOWN_SIZE: u64 = 1;

/// Live body relayed from the upstream ranged fetch
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Represents a byte range for HTTP Range requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    /// Starting byte position (inclusive)
    pub start: u64,
    /// Ending byte position (inclusive)
    pub end: u64,
}

impl ByteRange {
    /// Create a new ByteRange
    ///
    /// # Returns
    /// * `Ok(ByteRange)` if the range is valid
    /// * `Err(FeedError)` if start > end
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(FeedError::InvalidRange(format!(
                "start ({}) must be <= end ({})",
                start, end
            )));
        }
        Ok(ByteRange { start, end })
    }

    /// Get the size of this byte range in bytes
    ///
    /// Saturates at `u64::MAX` for the one range (`0..=u64::MAX`) whose
    /// length does not fit in a u64.
    pub fn size(&self) -> u64 {
        self.end.saturating_sub(self.start).saturating_add(1)
    }

    /// Convert this ByteRange to an HTTP Range header value (`bytes=start-end`)
    pub fn to_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }

    /// Content-Range header value for a resource of `total` bytes
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }

    /// Value of the `x-range` diagnostic header (`start-end`)
    pub fn to_x_range(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }
}

/// Metadata about a resource, learned from a HEAD request to the origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMetadata {
    /// Total size in bytes, or [`UNKNOWN_SIZE`] when the origin omits it
    pub size: u64,
    /// MIME type, [`DEFAULT_CONTENT_TYPE`] when the origin omits it
    pub content_type: String,
}

impl ResourceMetadata {
    pub fn new(size: u64, content_type: impl Into<String>) -> Self {
        ResourceMetadata {
            size,
            content_type: content_type.into(),
        }
    }

    /// Build metadata from optional header values, applying the fallbacks
    pub fn from_headers(content_length: Option<u64>, content_type: Option<String>) -> Self {
        ResourceMetadata {
            size: content_length.unwrap_or(UNKNOWN_SIZE),
            content_type: content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        }
    }
}

/// Lower and upper bound for a bitrate-derived window size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferSizeBounds {
    pub min: u64,
    pub max: u64,
}

impl BufferSizeBounds {
    /// 1 MiB
    pub const DEFAULT_MIN: u64 = 1024 * 1024;
    /// 10 MiB
    pub const DEFAULT_MAX: u64 = 10 * 1024 * 1024;

    /// Create bounds, rejecting `min == 0` and `min > max`
    pub fn new(min: u64, max: u64) -> Result<Self> {
        if min == 0 {
            return Err(FeedError::InvalidBounds(
                "min buffer size must be greater than 0".to_string(),
            ));
        }
        if min > max {
            return Err(FeedError::InvalidBounds(format!(
                "min buffer size ({}) must be <= max buffer size ({})",
                min, max
            )));
        }
        Ok(BufferSizeBounds { min, max })
    }

    /// Clamp a value into `[min, max]`
    pub fn clamp(&self, value: u64) -> u64 {
        value.clamp(self.min, self.max)
    }
}

impl Default for BufferSizeBounds {
    fn default() -> Self {
        BufferSizeBounds {
            min: Self::DEFAULT_MIN,
            max: Self::DEFAULT_MAX,
        }
    }
}

/// Options for a single [`crate::StreamingProxy::stream`] call
///
/// Unset overrides fall back to the proxy configuration.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub url: String,
    /// Client `Range` header value
    pub range: Option<String>,
    pub method: Method,
    pub max_buffer_size: Option<u64>,
    pub min_buffer_size: Option<u64>,
    pub cache_dir: Option<PathBuf>,
    /// Raise bitrate cache diagnostics to info level
    pub debug: Option<bool>,
}

impl StreamOptions {
    /// GET request for `url` without a client range
    pub fn new(url: impl Into<String>) -> Self {
        StreamOptions {
            url: url.into(),
            range: None,
            method: Method::GET,
            max_buffer_size: None,
            min_buffer_size: None,
            cache_dir: None,
            debug: None,
        }
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_buffer_sizes(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.min_buffer_size = min;
        self.max_buffer_size = max;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }
}

/// Status and synthesized headers handed to the caller's deliver callback
#[derive(Debug, Clone)]
pub struct StreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl StreamResponse {
    /// Header value as a string, if present and visible ASCII
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_range_new() {
        let range = ByteRange::new(0, 1023).unwrap();
        assert_eq!(range.start, 0);
        assert_eq!(range.end, 1023);
        assert_eq!(range.size(), 1024);
    }

    #[test]
    fn test_byte_range_invalid() {
        assert!(ByteRange::new(100, 50).is_err());
    }

    #[test]
    fn test_byte_range_size_at_u64_limit() {
        assert_eq!(ByteRange::new(1, u64::MAX).unwrap().size(), u64::MAX);
        assert_eq!(ByteRange { start: 0, end: u64::MAX }.size(), u64::MAX);
    }

    #[test]
    fn test_byte_range_header_forms() {
        let range = ByteRange::new(900, 999).unwrap();
        assert_eq!(range.to_header(), "bytes=900-999");
        assert_eq!(range.content_range(1000), "bytes 900-999/1000");
        assert_eq!(range.to_x_range(), "900-999");
    }

    #[test]
    fn test_metadata_fallbacks() {
        let metadata = ResourceMetadata::from_headers(None, None);
        assert_eq!(metadata.size, UNKNOWN_SIZE);
        assert_eq!(metadata.content_type, DEFAULT_CONTENT_TYPE);

        let metadata = ResourceMetadata::from_headers(Some(2048), Some("video/mp4".to_string()));
        assert_eq!(metadata, ResourceMetadata::new(2048, "video/mp4"));
    }

    #[test]
    fn test_bounds_validation() {
        assert!(BufferSizeBounds::new(0, 10).is_err());
        assert!(BufferSizeBounds::new(20, 10).is_err());
        assert!(BufferSizeBounds::new(10, 10).is_ok());
    }

    #[test]
    fn test_bounds_clamp() {
        let bounds = BufferSizeBounds::new(100, 1000).unwrap();
        assert_eq!(bounds.clamp(0), 100);
        assert_eq!(bounds.clamp(500), 500);
        assert_eq!(bounds.clamp(5000), 1000);
    }

    #[test]
    fn test_default_bounds() {
        let bounds = BufferSizeBounds::default();
        assert_eq!(bounds.min, 1_048_576);
        assert_eq!(bounds.max, 10_485_760);
    }

    #[test]
    fn test_stream_options_builder() {
        let opts = StreamOptions::new("http://example.com/a.mp4")
            .with_range("bytes=0-1")
            .with_method(Method::HEAD)
            .with_buffer_sizes(Some(1), Some(2))
            .with_debug(true);
        assert_eq!(opts.range.as_deref(), Some("bytes=0-1"));
        assert_eq!(opts.method, Method::HEAD);
        assert_eq!(opts.min_buffer_size, Some(1));
        assert_eq!(opts.max_buffer_size, Some(2));
        assert_eq!(opts.debug, Some(true));
        assert!(opts.cache_dir.is_none());
    }
}
