use std::path::PathBuf;

/// Failure of one outbound HTTP exchange.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("Request timeout")]
    Timeout,
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl HttpError {
    pub fn error_code(&self) -> &'static str {
        match self {
            HttpError::Timeout => "HTTP_TIMEOUT",
            HttpError::Network(_) => "HTTP_NETWORK",
            HttpError::Decode(_) => "HTTP_DECODE",
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            HttpError::Timeout => true,
            HttpError::Network(e) => e.is_timeout(),
            HttpError::Decode(_) => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt cache document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Could not lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    pub fn error_code(&self) -> &'static str {
        match self {
            CacheError::Io(_) => "CACHE_IO_ERROR",
            CacheError::Json(_) => "CACHE_CORRUPT",
            CacheError::Lock { .. } => "CACHE_LOCK_FAILED",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid credential file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Credential file is not a JSON object")]
    NotAnObject,
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl DiscoveryError {
    pub fn error_code(&self) -> &'static str {
        match self {
            DiscoveryError::Io(_) => "DISCOVERY_IO_ERROR",
            DiscoveryError::Json(_) | DiscoveryError::NotAnObject => "DISCOVERY_INVALID_JSON",
            DiscoveryError::Database(_) => "DISCOVERY_DATABASE_ERROR",
        }
    }
}
