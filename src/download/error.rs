//! Error types for segment fetching and assembly.
//!
//! [`DownloadError`] describes one failed HTTP transfer and is what the retry
//! policy classifies. [`AssembleError`] is the hard-failure type of the
//! assembler; remux problems are not in it because they degrade instead of
//! failing (see [`super::RemuxError`]).

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while transferring one URL.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response. Segment URLs are signed, so 401/403 usually means
    /// the manifest has expired.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present (for 429 responses).
        retry_after: Option<String>,
    },

    /// File system error while writing a segment.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Body length does not match the server's declared content length.
    #[error(
        "integrity check failed for {url}: expected {expected_bytes} bytes, got {actual_bytes}"
    )]
    Integrity {
        /// URL whose body was short.
        url: String,
        /// Declared size in bytes.
        expected_bytes: u64,
        /// Received size in bytes.
        actual_bytes: u64,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a short-body error.
    pub fn integrity(url: impl Into<String>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            url: url.into(),
            expected_bytes,
            actual_bytes,
        }
    }
}

/// Hard failures of the assembler.
#[derive(Debug, Error)]
pub enum AssembleError {
    /// A segment could not be fetched, even after retries.
    #[error("segment {index} of {total} failed: {source}")]
    Segment {
        /// Zero-based segment index (0 is the initialization segment).
        index: usize,
        /// Number of segments in the rendition.
        total: usize,
        #[source]
        source: DownloadError,
    },

    /// Local file system failure outside a single transfer.
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The rendition has nothing to assemble.
    #[error("rendition has no segment URLs")]
    EmptyRendition,

    /// A preview needs at least one media segment after the initialization segment.
    #[error("rendition has no media segments to preview")]
    NoMediaSegments,

    /// Segment concurrency outside the supported range.
    #[error("invalid segment concurrency {value}: must be between 1 and {max}")]
    InvalidConcurrency {
        /// The rejected value.
        value: usize,
        /// The upper bound.
        max: usize,
    },
}

impl AssembleError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
