//! Persistent per-URL bitrate cache
//!
//! One file per probed URL lives in the cache directory. The file name is the
//! HMAC-SHA256 of the URL under a fixed application secret and the content is
//! the raw bits/sec value printed by the probe. Entries are never updated or
//! expired; [`BitrateCache::invalidate`] and [`BitrateCache::clear`] remove
//! them manually.
//!
//! A miss starts a detached probe whose result only benefits later calls.
//! Probes for the same entry are single-flighted within the process.

use crate::metrics::ProxyMetrics;
use crate::probe::BitrateProbe;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashSet;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;
use tokio::task::JoinHandle;

/// Secret keying the cache file names
pub const CACHE_KEY_SECRET: &[u8] = b"feedit";

type HmacSha256 = Hmac<Sha256>;

/// Emit a diagnostic at info level when `debug` is set, debug level otherwise
macro_rules! diag {
    ($debug:expr, $($arg:tt)+) => {
        if $debug {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}

/// Compute the on-disk cache key for a URL (lowercase hex HMAC-SHA256)
pub fn cache_key(url: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(CACHE_KEY_SECRET)
        .expect("HMAC accepts keys of any length");
    mac.update(url.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Whether a directory entry name belongs to the cache
///
/// Matches finished entries (`<key>`) and temp files left by interrupted
/// writes (`<key>.<random>.tmp`).
fn is_cache_file_name(name: &str) -> bool {
    match (name.get(..64), name.get(64..)) {
        (Some(key), Some(rest)) => {
            key.bytes().all(|b| b.is_ascii_hexdigit())
                && (rest.is_empty() || (rest.starts_with('.') && rest.ends_with(".tmp")))
        }
        _ => false,
    }
}

/// Parse a stored or probed bitrate
///
/// Accepts integers and non-negative finite decimals (truncated).
/// Returns `None` for anything else, including ffprobe's `N/A`.
pub fn parse_bitrate(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<u64>() {
        return Some(value);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Some(value as u64),
        _ => None,
    }
}

/// Outcome of looking up a URL in the cache directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    /// An entry exists; unreadable or non-numeric content reads as 0
    Hit(u64),
    /// No entry for this URL yet
    Miss,
}

/// Removes an entry from the in-flight set when the probe task ends
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
    path: PathBuf,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.path);
    }
}

/// Write through a uniquely named sibling temp file so readers never see a
/// partial value and concurrent writers never share a temp file
async fn write_entry(path: &Path, raw: &str) -> io::Result<()> {
    let path = path.to_path_buf();
    let raw = raw.to_string();

    tokio::task::spawn_blocking(move || {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let prefix = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => format!("{}.", name),
            None => ".".to_string(),
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".tmp")
            .tempfile_in(dir)?;
        tmp.write_all(raw.as_bytes())?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| io::Error::new(ErrorKind::Other, e))?
}

/// Bitrate cache over a directory of per-URL files
#[derive(Clone)]
pub struct BitrateCache {
    probe: Arc<dyn BitrateProbe>,
    metrics: ProxyMetrics,
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
}

impl BitrateCache {
    pub fn new(probe: Arc<dyn BitrateProbe>, metrics: ProxyMetrics) -> Self {
        BitrateCache {
            probe,
            metrics,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Path of the entry for `url` inside `dir`
    pub fn entry_path(dir: &Path, url: &str) -> PathBuf {
        dir.join(cache_key(url))
    }

    /// Make sure `dir` exists
    ///
    /// Returns `false` when the directory cannot be created or is not a
    /// directory; the caller then skips the cache for this call.
    pub async fn prepare_dir(&self, dir: &Path, debug: bool) -> bool {
        match fs::metadata(dir).await {
            Ok(meta) if meta.is_dir() => return true,
            Ok(_) => {
                diag!(debug, "Bitrate cache path is not a directory: {}", dir.display());
                self.metrics.record_cache_error();
                return false;
            }
            Err(_) => {}
        }

        match fs::create_dir_all(dir).await {
            Ok(()) => {
                diag!(debug, "Created bitrate cache directory: {}", dir.display());
                true
            }
            Err(e) => {
                diag!(
                    debug,
                    "Bitrate cache directory unavailable: dir={} error={}",
                    dir.display(),
                    e
                );
                self.metrics.record_cache_error();
                false
            }
        }
    }

    /// Look up the stored bitrate for `url`
    pub async fn lookup(&self, dir: &Path, url: &str, debug: bool) -> CacheLookup {
        let path = Self::entry_path(dir, url);

        match fs::read_to_string(&path).await {
            Ok(content) => {
                let bitrate = parse_bitrate(&content).unwrap_or_else(|| {
                    diag!(debug, "Unparsable bitrate entry {}: {:?}", path.display(), content);
                    0
                });
                diag!(debug, "Bitrate cache hit: url={} bitrate={}", url, bitrate);
                self.metrics.record_cache_hit();
                CacheLookup::Hit(bitrate)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                diag!(debug, "Bitrate cache miss: url={}", url);
                self.metrics.record_cache_miss();
                CacheLookup::Miss
            }
            Err(e) => {
                diag!(
                    debug,
                    "Failed to read bitrate entry {}: {}",
                    path.display(),
                    e
                );
                self.metrics.record_cache_error();
                CacheLookup::Hit(0)
            }
        }
    }

    /// Write a raw bitrate value for `url`
    pub async fn store(&self, dir: &Path, url: &str, raw: &str) -> io::Result<()> {
        write_entry(&Self::entry_path(dir, url), raw).await
    }

    /// Start a detached probe for `url` that writes its result into `dir`
    ///
    /// Returns `None` when a probe for the same entry is already running.
    /// Callers serving a request must not await the returned handle.
    pub fn spawn_probe(&self, dir: &Path, url: &str, debug: bool) -> Option<JoinHandle<()>> {
        let path = Self::entry_path(dir, url);

        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if !in_flight.insert(path.clone()) {
                diag!(debug, "Bitrate probe already running: url={}", url);
                self.metrics.record_probe_skipped();
                return None;
            }
        }

        let guard = InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            path: path.clone(),
        };
        let probe = Arc::clone(&self.probe);
        let metrics = self.metrics.clone();
        let url = url.to_string();

        metrics.record_probe_started();
        diag!(debug, "Starting bitrate probe: url={}", url);

        Some(tokio::spawn(async move {
            let _guard = guard;

            let raw = match probe.probe(&url).await {
                Ok(raw) => raw,
                Err(e) => {
                    diag!(debug, "Bitrate probe failed: url={} error={}", url, e);
                    metrics.record_probe_result(false);
                    return;
                }
            };

            match write_entry(&path, &raw).await {
                Ok(()) => {
                    diag!(debug, "Bitrate probe complete: url={} bitrate={}", url, raw);
                    metrics.record_probe_result(true);
                }
                Err(e) => {
                    diag!(
                        debug,
                        "Failed to write bitrate entry {}: {}",
                        path.display(),
                        e
                    );
                    metrics.record_cache_error();
                    metrics.record_probe_result(false);
                }
            }
        }))
    }

    /// Remove the entry for `url`; returns whether one existed
    pub async fn invalidate(&self, dir: &Path, url: &str) -> io::Result<bool> {
        match fs::remove_file(Self::entry_path(dir, url)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Remove every entry in `dir`, plus temp files from interrupted writes,
    /// leaving unrelated files alone
    ///
    /// Returns the number of files removed.
    pub async fn clear(&self, dir: &Path) -> io::Result<usize> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let is_entry = name.to_str().map(is_cache_file_name).unwrap_or(false);
            if is_entry && entry.file_type().await?.is_file() {
                fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Whether a probe for `url` in `dir` is currently running
    pub fn is_probing(&self, dir: &Path, url: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&Self::entry_path(dir, url))
    }
}
