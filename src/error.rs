//! Error types for the feedit proxy

use thiserror::Error;

/// Result type alias for feedit operations
pub type Result<T> = std::result::Result<T, FeedError>;

/// Error types that can occur while streaming a resource
#[derive(Error, Debug, Clone)]
pub enum FeedError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Metadata fetch error: {0}")]
    MetadataFetchError(String),

    #[error("Invalid byte range: {0}")]
    InvalidRange(String),

    #[error("Unsatisfiable range: {0}")]
    UnsatisfiableRange(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid buffer size bounds: {0}")]
    InvalidBounds(String),

    #[error("Bitrate probe error: {0}")]
    ProbeError(String),

    #[error("Origin server returned 4xx error: {status} - {message}")]
    OriginClientError { status: u16, message: String },

    #[error("Origin server returned 5xx error: {status} - {message}")]
    OriginServerError { status: u16, message: String },

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        FeedError::HttpError(err.to_string())
    }
}

impl FeedError {
    /// Convert error to the HTTP status code returned by the front end
    ///
    /// - 4xx errors from the origin are passed through
    /// - 5xx errors and transport failures become 502 Bad Gateway
    /// - Bad client ranges become 416 Range Not Satisfiable
    /// - Everything else is a 500
    pub fn to_http_status(&self) -> u16 {
        match self {
            FeedError::OriginClientError { status, .. } => *status,
            FeedError::OriginServerError { .. } => 502,

            FeedError::InvalidRange(_) => 416,
            FeedError::UnsatisfiableRange(_) => 416,

            FeedError::ParseError(_) => 400,
            FeedError::InvalidBounds(_) => 400,

            FeedError::MetadataFetchError(_) => 502,
            FeedError::HttpError(_) => 502,

            FeedError::ConfigError(_) => 500,
            FeedError::ProbeError(_) => 500,
            FeedError::InternalError(_) => 500,
        }
    }

    /// Create an OriginClientError from a status code and message
    pub fn origin_client_error(status: u16, message: impl Into<String>) -> Self {
        FeedError::OriginClientError {
            status,
            message: message.into(),
        }
    }

    /// Create an OriginServerError from a status code and message
    pub fn origin_server_error(status: u16, message: impl Into<String>) -> Self {
        FeedError::OriginServerError {
            status,
            message: message.into(),
        }
    }

    /// Create an error from an HTTP status code
    ///
    /// Automatically categorizes as 4xx or 5xx error
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if (400..500).contains(&status) {
            FeedError::origin_client_error(status, message)
        } else if (500..600).contains(&status) {
            FeedError::origin_server_error(status, message)
        } else {
            FeedError::HttpError(format!("HTTP {}: {}", status, message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_http_status_categorizes() {
        assert!(matches!(
            FeedError::from_http_status(404, "missing"),
            FeedError::OriginClientError { status: 404, .. }
        ));
        assert!(matches!(
            FeedError::from_http_status(503, "down"),
            FeedError::OriginServerError { status: 503, .. }
        ));
        assert!(matches!(
            FeedError::from_http_status(302, "moved"),
            FeedError::HttpError(_)
        ));
    }

    #[test]
    fn test_to_http_status() {
        assert_eq!(FeedError::origin_client_error(403, "no").to_http_status(), 403);
        assert_eq!(FeedError::origin_server_error(500, "boom").to_http_status(), 502);
        assert_eq!(FeedError::InvalidRange("x".into()).to_http_status(), 416);
        assert_eq!(FeedError::UnsatisfiableRange("x".into()).to_http_status(), 416);
        assert_eq!(FeedError::MetadataFetchError("x".into()).to_http_status(), 502);
        assert_eq!(FeedError::ConfigError("x".into()).to_http_status(), 500);
    }
}
