//! Error types for backend session requests.

use thiserror::Error;

use crate::format::SessionKind;

/// Message the backend returns for assets that cannot be streamed in the
/// account's region.
pub const REGION_LOCK_MESSAGE: &str = "Asset is not ready for playback";

/// Errors that can occur while talking to a backend session.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The request never produced a response.
    #[error("backend request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The backend answered with a non-success status.
    #[error("backend returned HTTP {status} for {url}: {message}")]
    Status {
        url: String,
        status: u16,
        /// `userMessage` from the error body, or the raw body.
        message: String,
    },

    /// The asset is not streamable in the current region.
    #[error("Track {track_id} is not available in your region")]
    RegionUnavailable { track_id: String },

    /// No credentials are configured for the requested session kind.
    #[error(
        "no '{kind}' session configured\n  Suggestion: set `{kind}_token` in the config file"
    )]
    SessionUnavailable { kind: SessionKind },

    /// The response body did not have the expected shape.
    #[error("unexpected backend response from {url}: {reason}")]
    UnexpectedResponse { url: String, reason: String },

    /// The endpoint URL could not be built.
    #[error("invalid backend URL: {url}")]
    InvalidUrl { url: String },
}

impl BackendError {
    pub(crate) fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    pub(crate) fn unexpected(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error reports a region lock.
    #[must_use]
    pub fn is_region_lock(&self) -> bool {
        match self {
            Self::RegionUnavailable { .. } => true,
            Self::Status { message, .. } => message.contains(REGION_LOCK_MESSAGE),
            _ => false,
        }
    }
}
