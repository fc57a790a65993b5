//! Stream manifest decoding.
//!
//! The backend wraps every stream description in a [`ManifestEnvelope`]. Two
//! payload kinds exist:
//!
//! - **Segmented** (`application/dash+xml`): an MPEG-DASH document describing
//!   an initialization segment plus a timeline of media segments, parsed by
//!   [`dash::parse`].
//! - **Direct** (anything else, typically a JSON manifest): a
//!   `{"codecs": ..., "urls": [...]}` object naming one or more plain URLs.
//!
//! Payloads usually arrive base64-encoded; plain XML or JSON is accepted too.
//!
//! # Example
//!
//! ```
//! use trackfetch_core::manifest::{Delivery, ManifestEnvelope, MimeKind};
//! use trackfetch_core::Codec;
//!
//! let payload = br#"{"codecs":"mp4a.40.2","urls":["http://x/a.m4a"]}"#.to_vec();
//! let source = ManifestEnvelope::new(MimeKind::DirectJson, payload).decode()?;
//! assert_eq!(source.delivery(), Delivery::Direct);
//! assert_eq!(source.primary().codec, Codec::Aac);
//! # Ok::<(), trackfetch_core::manifest::ManifestError>(())
//! ```

pub mod dash;
mod error;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::Deserialize;
use tracing::debug;

use crate::codec::Codec;

pub use error::ManifestError;

/// MIME type of segmented manifests.
pub const DASH_MIME_TYPE: &str = "application/dash+xml";

/// How the payload of an envelope must be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimeKind {
    SegmentedXml,
    DirectJson,
}

impl MimeKind {
    /// Classifies a backend `manifestMimeType`.
    #[must_use]
    pub fn from_mime_type(mime_type: &str) -> Self {
        if mime_type.trim().eq_ignore_ascii_case(DASH_MIME_TYPE) {
            Self::SegmentedXml
        } else {
            Self::DirectJson
        }
    }
}

/// Opaque manifest as handed back by the backend.
///
/// Decoding consumes the envelope, so a manifest is parsed at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEnvelope {
    pub mime_kind: MimeKind,
    pub payload: Vec<u8>,
}

/// Whether the stream is delivered as segments or as plain URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Segmented,
    Direct,
}

/// One concrete encoding of a track.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioRendition {
    pub codec: Codec,
    /// Declared sample rate, 0 when the manifest does not say.
    pub sample_rate_hz: u32,
    /// Declared bitrate, 0 when the manifest does not say.
    pub bitrate_bps: u64,
    /// Segment URLs in playback order. For segmented delivery element 0 is
    /// the initialization segment.
    pub segment_urls: Vec<String>,
    /// Total duration implied by the segment timeline, when there is one.
    pub duration_secs: Option<f64>,
}

impl AudioRendition {
    /// Media segments, excluding the initialization segment.
    #[must_use]
    pub fn media_urls(&self) -> &[String] {
        self.segment_urls.get(1..).unwrap_or_default()
    }
}

/// Decoded manifest: the delivery mode plus at least one rendition.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSource {
    delivery: Delivery,
    renditions: Vec<AudioRendition>,
}

impl StreamSource {
    fn new(delivery: Delivery, renditions: Vec<AudioRendition>) -> Result<Self, ManifestError> {
        if renditions.is_empty() {
            return Err(ManifestError::NoAudio);
        }
        Ok(Self {
            delivery,
            renditions,
        })
    }

    #[must_use]
    pub fn delivery(&self) -> Delivery {
        self.delivery
    }

    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.delivery == Delivery::Direct
    }

    /// The rendition callers should use: the first in document order.
    #[must_use]
    pub fn primary(&self) -> &AudioRendition {
        &self.renditions[0]
    }

    #[must_use]
    pub fn renditions(&self) -> &[AudioRendition] {
        &self.renditions
    }

    #[must_use]
    pub fn codec(&self) -> Codec {
        self.primary().codec
    }

    /// First URL of a direct source.
    #[must_use]
    pub fn direct_url(&self) -> Option<&str> {
        if self.is_direct() {
            self.primary().segment_urls.first().map(String::as_str)
        } else {
            None
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectManifest {
    codecs: String,
    urls: Vec<String>,
    #[serde(default)]
    encryption_type: Option<String>,
}

impl ManifestEnvelope {
    #[must_use]
    pub fn new(mime_kind: MimeKind, payload: Vec<u8>) -> Self {
        Self { mime_kind, payload }
    }

    /// Decodes the envelope into a [`StreamSource`].
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] when the payload cannot be decoded or describes
    /// no usable audio rendition.
    pub fn decode(self) -> Result<StreamSource, ManifestError> {
        let body = unwrap_payload(&self.payload)?;
        match self.mime_kind {
            MimeKind::SegmentedXml => {
                StreamSource::new(Delivery::Segmented, dash::parse(&body)?)
            }
            MimeKind::DirectJson => {
                StreamSource::new(Delivery::Direct, vec![parse_direct(&body)?])
            }
        }
    }
}

/// Plain XML or JSON is used as-is; anything else is treated as base64.
fn unwrap_payload(payload: &[u8]) -> Result<Vec<u8>, ManifestError> {
    let trimmed = payload.trim_ascii();
    if matches!(trimmed.first(), Some(b'{' | b'<')) {
        return Ok(trimmed.to_vec());
    }
    BASE64
        .decode(trimmed)
        .map_err(|source| ManifestError::Base64 { source })
}

fn parse_direct(body: &[u8]) -> Result<AudioRendition, ManifestError> {
    let manifest: DirectManifest =
        serde_json::from_slice(body).map_err(|source| ManifestError::Json { source })?;

    if let Some(encryption) = manifest.encryption_type.as_deref()
        && !encryption.eq_ignore_ascii_case("NONE")
    {
        return Err(ManifestError::malformed(format!(
            "encrypted stream ({encryption}) is not supported"
        )));
    }
    if manifest.urls.is_empty() {
        return Err(ManifestError::malformed("direct manifest lists no URLs"));
    }

    let name = if manifest.codecs.to_ascii_lowercase().contains("mp4a") {
        "AAC".to_string()
    } else {
        manifest.codecs.trim().to_ascii_uppercase()
    };
    let codec =
        Codec::from_normalized(&name).ok_or(ManifestError::UnsupportedCodec { codec: name })?;

    debug!(%codec, urls = manifest.urls.len(), "parsed direct manifest");
    Ok(AudioRendition {
        codec,
        sample_rate_hz: 0,
        bitrate_bps: 0,
        segment_urls: manifest.urls,
        duration_secs: None,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn encoded(body: &str) -> Vec<u8> {
        BASE64.encode(body).into_bytes()
    }

    #[test]
    fn test_mime_kind_classification() {
        assert_eq!(
            MimeKind::from_mime_type("application/dash+xml"),
            MimeKind::SegmentedXml
        );
        assert_eq!(
            MimeKind::from_mime_type("application/vnd.tidal.bts"),
            MimeKind::DirectJson
        );
    }

    #[test]
    fn test_direct_json_aac_single_url() {
        let envelope = ManifestEnvelope::new(
            MimeKind::DirectJson,
            encoded(r#"{"codecs":"mp4a.40.2","urls":["http://x/a.m4a"]}"#),
        );
        let source = envelope.decode().unwrap();
        assert_eq!(source.delivery(), Delivery::Direct);
        assert_eq!(source.renditions().len(), 1);
        assert_eq!(source.codec(), Codec::Aac);
        assert_eq!(source.primary().segment_urls, vec!["http://x/a.m4a"]);
        assert_eq!(source.direct_url(), Some("http://x/a.m4a"));
    }

    #[test]
    fn test_direct_json_uppercases_other_codecs() {
        let envelope = ManifestEnvelope::new(
            MimeKind::DirectJson,
            encoded(r#"{"mimeType":"audio/flac","codecs":"flac","encryptionType":"NONE","urls":["u"]}"#),
        );
        assert_eq!(envelope.decode().unwrap().codec(), Codec::Flac);
    }

    #[test]
    fn test_direct_json_rejects_encrypted_stream() {
        let envelope = ManifestEnvelope::new(
            MimeKind::DirectJson,
            encoded(r#"{"codecs":"flac","encryptionType":"OLD_AES","urls":["u"]}"#),
        );
        assert!(envelope.decode().unwrap_err().to_string().contains("OLD_AES"));
    }

    #[test]
    fn test_direct_json_rejects_empty_url_list() {
        let envelope = ManifestEnvelope::new(
            MimeKind::DirectJson,
            br#"{"codecs":"flac","urls":[]}"#.to_vec(),
        );
        assert!(matches!(
            envelope.decode(),
            Err(ManifestError::Malformed { .. })
        ));
    }

    #[test]
    fn test_invalid_base64_is_malformed() {
        let envelope = ManifestEnvelope::new(MimeKind::DirectJson, b"!!!not base64".to_vec());
        assert!(matches!(
            envelope.decode(),
            Err(ManifestError::Base64 { .. })
        ));
    }

    #[test]
    fn test_segmented_envelope_base64() {
        let xml = r#"<MPD><Period><AdaptationSet contentType="audio"><Representation codecs="flac">
            <SegmentTemplate initialization="i.mp4" media="$Number$.mp4">
            <SegmentTimeline><S d="1" r="1"/></SegmentTimeline></SegmentTemplate>
            </Representation></AdaptationSet></Period></MPD>"#;
        let source = ManifestEnvelope::new(MimeKind::SegmentedXml, encoded(xml))
            .decode()
            .unwrap();
        assert_eq!(source.delivery(), Delivery::Segmented);
        assert_eq!(source.direct_url(), None);
        assert_eq!(source.primary().media_urls(), ["1.mp4", "2.mp4"]);
    }
}
