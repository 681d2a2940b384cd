//! Range Resolver
//!
//! Turns a client `Range` header into the concrete inclusive byte window that
//! is requested from the origin.

use crate::error::{FeedError, Result};
use crate::models::ByteRange;
use tracing::debug;

/// Bounds parsed from a single-range specifier, either side optional
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

/// Resolves client range specifiers against a resource size and window size
pub struct RangeResolver;

impl RangeResolver {
    /// Parse `bytes=<start>-<end>` with either bound optional
    ///
    /// Only the first comma-separated segment is considered. The `bytes=`
    /// prefix is optional. Non-numeric bounds are rejected.
    pub fn parse_range_spec(spec: &str) -> Result<RangeSpec> {
        let spec = spec.trim();
        let spec = spec.strip_prefix("bytes=").unwrap_or(spec);
        let first = spec.split(',').next().unwrap_or_default().trim();

        let (left, right) = first.split_once('-').ok_or_else(|| {
            FeedError::InvalidRange(format!("expected 'start-end', got: {}", first))
        })?;

        let parsed = RangeSpec {
            start: Self::parse_bound(left, "start")?,
            end: Self::parse_bound(right, "end")?,
        };

        // An explicit window must be ordered and its length must fit in a u64
        if let Some(end) = parsed.end {
            let start = parsed.start.unwrap_or(0);
            if end.checked_sub(start).and_then(|d| d.checked_add(1)).is_none() {
                return Err(FeedError::InvalidRange(format!(
                    "range {}-{} has no representable length",
                    start, end
                )));
            }
        }

        Ok(parsed)
    }

    fn parse_bound(token: &str, which: &str) -> Result<Option<u64>> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(None);
        }
        token
            .parse::<u64>()
            .map(Some)
            .map_err(|e| FeedError::InvalidRange(format!("invalid {} value '{}': {}", which, token, e)))
    }

    /// Compute the inclusive window to request
    ///
    /// # Arguments
    /// * `range_spec` - Client `Range` header value, if any
    /// * `size` - Total resource size in bytes
    /// * `window_size` - Bytes to request when the client gave no end
    ///
    /// # Behavior
    /// - No range: `0 ..= min(window_size - 1, size - 1)`
    /// - Open end: `start ..= min(start + window_size - 1, size - 1)`
    /// - Explicit end: passed through verbatim, not clamped to the size
    /// - Missing start defaults to 0
    pub fn resolve(range_spec: Option<&str>, size: u64, window_size: u64) -> Result<ByteRange> {
        let spec = range_spec.map(Self::parse_range_spec).transpose()?;
        Self::resolve_spec(spec, size, window_size)
    }

    /// Reject an open-ended spec that starts at or past the resource end
    ///
    /// Depends only on the size, so callers can check before a window is
    /// chosen.
    pub fn check_satisfiable(spec: Option<&RangeSpec>, size: u64) -> Result<()> {
        let (start, end) = spec.map_or((None, None), |s| (s.start, s.end));
        let start = start.unwrap_or(0);
        if end.is_none() && start >= size {
            debug!("Unsatisfiable range: start={} size={}", start, size);
            return Err(FeedError::UnsatisfiableRange(format!(
                "range start {} is beyond resource size {}",
                start, size
            )));
        }
        Ok(())
    }

    /// Same as [`RangeResolver::resolve`] for an already parsed spec
    pub fn resolve_spec(spec: Option<RangeSpec>, size: u64, window_size: u64) -> Result<ByteRange> {
        Self::check_satisfiable(spec.as_ref(), size)?;

        let span = window_size.max(1) - 1;
        let start = spec.and_then(|s| s.start).unwrap_or(0);

        let range = match spec.and_then(|s| s.end) {
            Some(end) => ByteRange::new(start, end)?,
            None => ByteRange::new(start, std::cmp::min(start.saturating_add(span), size - 1))?,
        };

        debug!(
            "Resolved range {:?} -> {}-{} (size={}, window_size={})",
            spec, range.start, range.end, size, window_size
        );
        Ok(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_without_range() {
        let range = RangeResolver::resolve(None, 1000, 500).unwrap();
        assert_eq!((range.start, range.end), (0, 499));
        assert_eq!(range.size(), 500);
    }

    #[test]
    fn test_resolve_without_range_small_resource() {
        let range = RangeResolver::resolve(None, 100, 500).unwrap();
        assert_eq!((range.start, range.end), (0, 99));
    }

    #[test]
    fn test_resolve_open_end_clamped_by_size() {
        let range = RangeResolver::resolve(Some("bytes=900-"), 1000, 500).unwrap();
        assert_eq!((range.start, range.end), (900, 999));
        assert_eq!(range.size(), 100);
    }

    #[test]
    fn test_resolve_open_end_window_added_to_start() {
        let range = RangeResolver::resolve(Some("bytes=1000-"), 1_000_000, 500).unwrap();
        assert_eq!((range.start, range.end), (1000, 1499));
    }

    #[test]
    fn test_resolve_explicit_bounds_pass_through() {
        let range = RangeResolver::resolve(Some("bytes=0-1"), 1000, 500).unwrap();
        assert_eq!((range.start, range.end), (0, 1));

        // explicit end past the resource is not clamped
        let range = RangeResolver::resolve(Some("bytes=10-5000"), 1000, 500).unwrap();
        assert_eq!((range.start, range.end), (10, 5000));
    }

    #[test]
    fn test_resolve_missing_start() {
        let range = RangeResolver::resolve(Some("bytes=-300"), 1000, 500).unwrap();
        assert_eq!((range.start, range.end), (0, 300));
    }

    #[test]
    fn test_resolve_multi_range_uses_first_segment() {
        let range = RangeResolver::resolve(Some("bytes=10-20, 30-40"), 1000, 500).unwrap();
        assert_eq!((range.start, range.end), (10, 20));
    }

    #[test]
    fn test_resolve_without_prefix() {
        let range = RangeResolver::resolve(Some("5-"), 1000, 10).unwrap();
        assert_eq!((range.start, range.end), (5, 14));
    }

    #[test]
    fn test_resolve_unknown_size_sentinel() {
        let range = RangeResolver::resolve(None, 1, 1_024_000).unwrap();
        assert_eq!((range.start, range.end), (0, 0));
    }

    #[test]
    fn test_resolve_malformed_numbers() {
        assert!(matches!(
            RangeResolver::resolve(Some("bytes=abc-"), 1000, 500),
            Err(FeedError::InvalidRange(_))
        ));
        assert!(matches!(
            RangeResolver::resolve(Some("bytes=0-xyz"), 1000, 500),
            Err(FeedError::InvalidRange(_))
        ));
        assert!(matches!(
            RangeResolver::resolve(Some("bytes=100"), 1000, 500),
            Err(FeedError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_resolve_reversed_bounds() {
        assert!(matches!(
            RangeResolver::resolve(Some("bytes=50-10"), 1000, 500),
            Err(FeedError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_resolve_length_overflow() {
        assert!(matches!(
            RangeResolver::resolve(Some("bytes=0-18446744073709551615"), 1000, 500),
            Err(FeedError::InvalidRange(_))
        ));
        assert!(matches!(
            RangeResolver::resolve(Some("bytes=-18446744073709551615"), 1000, 500),
            Err(FeedError::InvalidRange(_))
        ));

        let range = RangeResolver::resolve(Some("bytes=1-18446744073709551615"), 1000, 500).unwrap();
        assert_eq!(range.size(), u64::MAX);
    }

    #[test]
    fn test_check_satisfiable() {
        let open = RangeResolver::parse_range_spec("bytes=1000-").unwrap();
        assert!(RangeResolver::check_satisfiable(Some(&open), 1000).is_err());
        assert!(RangeResolver::check_satisfiable(Some(&open), 1001).is_ok());

        // explicit ends are never unsatisfiable, even past the size
        let explicit = RangeResolver::parse_range_spec("bytes=5000-6000").unwrap();
        assert!(RangeResolver::check_satisfiable(Some(&explicit), 1000).is_ok());

        assert!(RangeResolver::check_satisfiable(None, 0).is_err());
    }

    #[test]
    fn test_resolve_start_beyond_size() {
        assert!(matches!(
            RangeResolver::resolve(Some("bytes=1000-"), 1000, 500),
            Err(FeedError::UnsatisfiableRange(_))
        ));
    }

    #[test]
    fn test_resolve_empty_resource() {
        assert!(matches!(
            RangeResolver::resolve(None, 0, 500),
            Err(FeedError::UnsatisfiableRange(_))
        ));
    }

    #[test]
    fn test_parse_range_spec() {
        assert_eq!(
            RangeResolver::parse_range_spec("bytes=1-2").unwrap(),
            RangeSpec { start: Some(1), end: Some(2) }
        );
        assert_eq!(
            RangeResolver::parse_range_spec(" bytes=- ").unwrap(),
            RangeSpec { start: None, end: None }
        );
    }
}
