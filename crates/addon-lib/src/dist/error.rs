use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, DistError>;

/// Errors raised while resolving, downloading or caching a runtime distribution
#[derive(Debug, thiserror::Error)]
pub enum DistError {
    #[error("Unknown runtime: {runtime}")]
    UnknownRuntime { runtime: String },

    #[error("Invalid runtime version '{version}': {source}")]
    InvalidVersion {
        version: String,
        #[source]
        source: semver::Error,
    },

    #[error("Could not create the HTTP client: {source}")]
    HttpClient {
        #[source]
        source: reqwest::Error,
    },

    #[error("Download of {url} failed: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{algorithm} sum of download '{url}' mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        algorithm: &'static str,
        expected: String,
        actual: String,
    },

    #[error("Response from {url} exceeded the size cap of {limit} bytes")]
    PayloadTooLarge { url: String, limit: u64 },

    #[error("Failed to extract archive from {url}: {source}")]
    Extract {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

impl DistError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DistError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for transport level failures (DNS, connection, non-2xx status)
    pub fn is_download_error(&self) -> bool {
        matches!(self, DistError::Download { .. })
    }
}
