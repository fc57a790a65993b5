//! HTTP backend session using an already-issued bearer token.
//!
//! Endpoints, relative to the configured base URL:
//!
//! - `tracks/{id}/playbackinfopostpaywall` for stream manifests
//! - `tracks/{id}` for capability tags and audio modes

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use super::{BackendError, BackendSession, PlaybackManifest, REGION_LOCK_MESSAGE, TrackCapabilities};
use crate::format::{BackendQuality, SessionKind};
use crate::manifest::{ManifestEnvelope, MimeKind};

/// Default catalogue API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.tidal.com/v1/";

// ==================== API Response Types ====================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaybackInfoResponse {
    manifest_mime_type: String,
    manifest: String,
    audio_quality: Option<String>,
    audio_mode: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackResponse {
    media_metadata: Option<MediaMetadata>,
    #[serde(default)]
    audio_modes: Vec<String>,
    audio_quality: Option<String>,
    album: Option<AlbumSummary>,
}

#[derive(Debug, Deserialize)]
struct MediaMetadata {
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlbumSummary {
    number_of_volumes: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    user_message: Option<String>,
}

// ==================== HttpBackendSession ====================

/// Backend session backed by the catalogue's REST API.
pub struct HttpBackendSession {
    kind: SessionKind,
    client: Client,
    base_url: Url,
    token: String,
    country_code: String,
}

impl HttpBackendSession {
    /// Creates a session of `kind` that authenticates with `token`.
    ///
    /// `client` is usually shared with the segment downloader.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::InvalidUrl`] if `base_url` does not parse.
    pub fn new(
        kind: SessionKind,
        client: Client,
        base_url: &str,
        token: impl Into<String>,
        country_code: impl Into<String>,
    ) -> Result<Self, BackendError> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized).map_err(|_| BackendError::InvalidUrl {
            url: base_url.to_string(),
        })?;
        Ok(Self {
            kind,
            client,
            base_url,
            token: token.into(),
            country_code: country_code.into(),
        })
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, BackendError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|_| BackendError::InvalidUrl {
                url: format!("{}{path}", self.base_url),
            })?;
        url.query_pairs_mut()
            .extend_pairs(query)
            .append_pair("countryCode", &self.country_code);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        track_id: &str,
    ) -> Result<T, BackendError> {
        debug!(session = %self.kind, url = %url, "calling backend");
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| BackendError::network(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = user_message(&body);
            debug!(status = status.as_u16(), %message, "backend error");
            if message.contains(REGION_LOCK_MESSAGE) {
                return Err(BackendError::RegionUnavailable {
                    track_id: track_id.to_string(),
                });
            }
            return Err(BackendError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::unexpected(url.as_str(), e.to_string()))
    }
}

impl std::fmt::Debug for HttpBackendSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackendSession")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url.as_str())
            .field("country_code", &self.country_code)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BackendSession for HttpBackendSession {
    fn kind(&self) -> SessionKind {
        self.kind
    }

    #[instrument(skip(self), fields(session = %self.kind))]
    async fn get_stream_manifest(
        &self,
        track_id: &str,
        quality: BackendQuality,
    ) -> Result<PlaybackManifest, BackendError> {
        let url = self.endpoint(
            &format!("tracks/{track_id}/playbackinfopostpaywall"),
            &[
                ("audioquality", quality.as_str()),
                ("playbackmode", "STREAM"),
                ("assetpresentation", "FULL"),
            ],
        )?;
        let info: PlaybackInfoResponse = self.get_json(url, track_id).await?;

        Ok(PlaybackManifest {
            envelope: ManifestEnvelope::new(
                MimeKind::from_mime_type(&info.manifest_mime_type),
                info.manifest.into_bytes(),
            ),
            audio_quality: info
                .audio_quality
                .as_deref()
                .and_then(BackendQuality::from_backend),
            audio_mode: info.audio_mode,
        })
    }

    #[instrument(skip(self), fields(session = %self.kind))]
    async fn get_track_capabilities(
        &self,
        track_id: &str,
    ) -> Result<TrackCapabilities, BackendError> {
        let url = self.endpoint(&format!("tracks/{track_id}"), &[])?;
        let track: TrackResponse = self.get_json(url, track_id).await?;

        Ok(TrackCapabilities {
            tags: track
                .media_metadata
                .map(|metadata| metadata.tags)
                .unwrap_or_default()
                .into_iter()
                .collect(),
            audio_modes: track.audio_modes,
            audio_quality: track
                .audio_quality
                .as_deref()
                .and_then(BackendQuality::from_backend),
            volumes: track
                .album
                .and_then(|album| album.number_of_volumes)
                .unwrap_or(1),
        })
    }
}

/// `userMessage` from a JSON error body, else the body itself.
fn user_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.user_message)
        .unwrap_or_else(|| body.trim().to_string())
}
