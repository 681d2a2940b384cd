//! Buffer size selection
//!
//! Chooses the window requested from the origin when the client did not ask
//! for an explicit end byte. A cached bitrate is clamped into the configured
//! bounds; without one the caller's current window is kept and a probe is
//! started in the background for future requests.

use crate::bitrate_cache::{BitrateCache, CacheLookup};
use crate::models::BufferSizeBounds;
use std::path::Path;

/// Where a selected window size came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSource {
    /// Clamped from a cached bitrate
    Cached { bitrate: u64 },
    /// No cached bitrate yet; a probe may have been started
    Pending,
    /// The cache directory could not be used
    CacheUnavailable,
    /// The bitrate cache is turned off
    Disabled,
}

/// Result of a window size selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSelection {
    pub window_size: u64,
    pub source: WindowSource,
}

/// Combines the bitrate cache with min/max bounds to pick a window size
pub struct BufferSizeSelector {
    cache: Option<BitrateCache>,
}

impl BufferSizeSelector {
    pub fn new(cache: BitrateCache) -> Self {
        BufferSizeSelector { cache: Some(cache) }
    }

    /// Selector that always keeps the caller's window
    pub fn disabled() -> Self {
        BufferSizeSelector { cache: None }
    }

    pub fn cache(&self) -> Option<&BitrateCache> {
        self.cache.as_ref()
    }

    /// Select the window size for `url`
    ///
    /// # Arguments
    /// * `url` - Upstream resource URL
    /// * `bounds` - Clamp bounds for cached bitrates
    /// * `cache_dir` - Directory holding bitrate entries
    /// * `debug` - Raise cache diagnostics to info level
    /// * `current_window` - Window to keep when no cached bitrate applies
    ///
    /// Never fails: every cache problem falls back to `current_window`.
    pub async fn select(
        &self,
        url: &str,
        bounds: BufferSizeBounds,
        cache_dir: &Path,
        debug: bool,
        current_window: u64,
    ) -> WindowSelection {
        let Some(cache) = &self.cache else {
            return WindowSelection {
                window_size: current_window,
                source: WindowSource::Disabled,
            };
        };

        if !cache.prepare_dir(cache_dir, debug).await {
            return WindowSelection {
                window_size: current_window,
                source: WindowSource::CacheUnavailable,
            };
        }

        match cache.lookup(cache_dir, url, debug).await {
            CacheLookup::Hit(bitrate) => WindowSelection {
                window_size: bounds.clamp(bitrate),
                source: WindowSource::Cached { bitrate },
            },
            CacheLookup::Miss => {
                // detached: only later requests see the result
                let _ = cache.spawn_probe(cache_dir, url, debug);
                WindowSelection {
                    window_size: current_window,
                    source: WindowSource::Pending,
                }
            }
        }
    }
}
