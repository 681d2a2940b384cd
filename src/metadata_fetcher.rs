//! Metadata fetcher for retrieving resource information from origin servers

use crate::error::{FeedError, Result};
use crate::models::ResourceMetadata;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

/// MetadataFetcher learns a resource's size and content type with a HEAD request
pub struct MetadataFetcher {
    client: Client,
}

impl MetadataFetcher {
    /// Create a new MetadataFetcher with the default 10 second timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(10))
    }

    /// Create a new MetadataFetcher with a custom timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::HttpError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(MetadataFetcher { client })
    }

    /// Fetch metadata for a resource from the origin server
    ///
    /// Extracts:
    /// - Content-Length: total size, [`crate::models::UNKNOWN_SIZE`] when
    ///   missing or unparsable
    /// - Content-Type: MIME type, `application/octet-stream` when missing
    ///
    /// # Returns
    /// * `Ok(ResourceMetadata)` for any 2xx response
    /// * `Err(FeedError)` on transport failures and error statuses
    pub async fn fetch_metadata(&self, url: &str) -> Result<ResourceMetadata> {
        debug!("Fetching metadata for url={}", url);

        let response = self.client.head(url).send().await.map_err(|e| {
            warn!("HEAD request failed for url={}: {}", url, e);
            FeedError::MetadataFetchError(format!("HEAD request failed: {}", e))
        })?;

        let status = response.status();
        debug!("Received HEAD response for url={}, status={}", url, status);

        if status.is_client_error() || status.is_server_error() {
            warn!("Origin returned error for url={}: status={}", url, status);
            return Err(FeedError::from_http_status(
                status.as_u16(),
                format!("HEAD {} returned {}", url, status),
            ));
        }

        if !status.is_success() {
            warn!("Unexpected status code for url={}: status={}", url, status);
            return Err(FeedError::MetadataFetchError(format!(
                "Unexpected status code: {}",
                status
            )));
        }

        let headers = response.headers();

        let content_length = headers
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        if content_length.is_none() {
            debug!("Content-Length missing for url={}, size unknown", url);
        }

        let content_type = headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let metadata = ResourceMetadata::from_headers(content_length, content_type);

        info!(
            "Fetched metadata for url={}: size={}, content_type={}",
            url, metadata.size, metadata.content_type
        );

        Ok(metadata)
    }
}
