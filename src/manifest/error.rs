//! Error types for manifest decoding.

use thiserror::Error;

/// The manifest could not be turned into renditions.
///
/// Every variant is fatal to the resolution attempt; none are retried.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Structural problem with an otherwise readable document.
    #[error("malformed manifest: {reason}")]
    Malformed {
        /// What was wrong.
        reason: String,
    },

    /// The segmented manifest is not well-formed XML.
    #[error("malformed manifest: invalid XML: {source}")]
    Xml {
        #[source]
        source: quick_xml::Error,
    },

    /// The direct manifest is not the expected JSON object.
    #[error("malformed manifest: invalid JSON: {source}")]
    Json {
        #[source]
        source: serde_json::Error,
    },

    /// The envelope payload is not valid base64.
    #[error("malformed manifest: invalid base64 payload: {source}")]
    Base64 {
        #[source]
        source: base64::DecodeError,
    },

    /// An adaptation set carries something other than audio.
    #[error("malformed manifest: adaptation set has content type '{content_type}', only audio is supported")]
    NonAudio {
        /// The declared content type.
        content_type: String,
    },

    /// No audio adaptation set was found anywhere in the document.
    #[error("malformed manifest: no audio adaptation set")]
    NoAudio,

    /// The codec string does not name a known codec.
    #[error("malformed manifest: unsupported codec '{codec}'")]
    UnsupportedCodec {
        /// The normalised codec string.
        codec: String,
    },
}

impl ManifestError {
    /// Creates a structural error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    pub(crate) fn xml(source: quick_xml::Error) -> Self {
        Self::Xml { source }
    }
}
