//! Error type for track resolution.

use thiserror::Error;

use crate::backend::BackendError;
use crate::manifest::ManifestError;

/// Hard failures of a resolution attempt.
///
/// Region locks are not errors: they come back as an annotated
/// [`super::ResolvedTrack`] with no source. Nothing here is retried
/// internally; callers retry whole resolutions.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The manifest could not be decoded.
    #[error("malformed manifest: {0}")]
    MalformedManifest(#[from] ManifestError),

    /// The backend request failed.
    #[error(transparent)]
    BackendRequest(#[from] BackendError),
}

impl ResolveError {
    /// Whether a fresh resolution attempt could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::MalformedManifest(_) => false,
            Self::BackendRequest(error) => matches!(
                error,
                BackendError::Network { .. } | BackendError::Status { status: 429 | 500..=599, .. }
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_manifest_is_not_retryable() {
        let error = ResolveError::from(ManifestError::NoAudio);
        assert!(!error.is_retryable());
        assert!(error.to_string().starts_with("malformed manifest"));
    }

    #[test]
    fn test_server_errors_are_retryable() {
        let error = ResolveError::from(BackendError::Status {
            url: "https://api/tracks/1".to_string(),
            status: 503,
            message: String::new(),
        });
        assert!(error.is_retryable());

        let error = ResolveError::from(BackendError::Status {
            url: "https://api/tracks/1".to_string(),
            status: 404,
            message: String::new(),
        });
        assert!(!error.is_retryable());
    }
}
