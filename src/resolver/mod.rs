//! Track resolution: from a track id to a decoded stream source.
//!
//! A resolution runs these steps in order:
//!
//! 1. [`format::resolve_for`] picks a (session, quality, format) selection
//!    from the requested tier, the track's capability tags and the codec
//!    preferences, restricted to the sessions configured in the pool.
//! 2. The chosen session returns a manifest envelope, which is decoded once.
//! 3. If the codec is a non-spatial proprietary one and proprietary codecs
//!    are disabled, the manifest is discarded and fetched again at
//!    `LOSSLESS` on the same session.
//! 4. A direct MQA source is probed when hi-res recovery is enabled.
//! 5. The [`AudioProfile`] is derived.
//!
//! A region-locked track is not an error: the result carries no source and
//! the backend error as an annotation.
//!
//! # Example
//!
//! ```no_run
//! use trackfetch_core::backend::SessionPool;
//! use trackfetch_core::download::HttpClient;
//! use trackfetch_core::format::{CapabilityTags, CodecPreferences, QualityTier};
//! use trackfetch_core::resolver::TrackResolver;
//!
//! # async fn example(pool: SessionPool) -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = TrackResolver::new(pool, CodecPreferences::default(), HttpClient::new());
//! let tags = CapabilityTags::from_iter(["LOSSLESS"]);
//! let resolved = resolver.resolve_track("12345", QualityTier::Lossless, &tags).await?;
//! println!("{} via {}", resolved.codec, resolved.selection.format);
//! # Ok(())
//! # }
//! ```

mod cache;
mod error;
mod profile;

pub use cache::CapabilityCache;
pub use error::ResolveError;
pub use profile::AudioProfile;

use tracing::{debug, info, instrument, warn};

use crate::backend::{BackendError, PlaybackManifest, SessionPool, TrackCapabilities};
use crate::codec::Codec;
use crate::download::HttpClient;
use crate::format::{self, BackendQuality, CapabilityTags, CodecPreferences, QualityTier, Selection};
use crate::manifest::StreamSource;
use crate::probe::{self, PROBE_PREFIX_BYTES, ProbeResult};

/// Outcome of one resolution attempt.
#[derive(Debug)]
pub struct ResolvedTrack {
    pub track_id: String,
    /// Selection made before the manifest was fetched.
    pub selection: Selection,
    /// Decoded source; `None` when the track is region locked.
    pub source: Option<StreamSource>,
    pub codec: Codec,
    /// Quality the backend reports it actually served.
    pub audio_quality: Option<BackendQuality>,
    pub audio_mode: Option<String>,
    /// Whether the proprietary-codec fallback re-fetched the manifest.
    pub fell_back: bool,
    pub probe: Option<ProbeResult>,
    pub profile: AudioProfile,
    /// Non-fatal annotation, set for region-locked tracks.
    pub error: Option<BackendError>,
}

impl ResolvedTrack {
    fn region_locked(track_id: &str, selection: Selection, error: BackendError) -> Self {
        Self {
            track_id: track_id.to_string(),
            selection,
            source: None,
            codec: Codec::Flac,
            audio_quality: None,
            audio_mode: None,
            fell_back: false,
            probe: None,
            profile: AudioProfile::derive(Codec::Flac, None, None, None, None),
            error: Some(error),
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.source.is_some()
    }
}

/// Resolves tracks against a pool of backend sessions.
#[derive(Debug, Clone)]
pub struct TrackResolver {
    sessions: SessionPool,
    prefs: CodecPreferences,
    fix_mqa: bool,
    http: HttpClient,
}

impl TrackResolver {
    /// Creates a resolver. Hi-res recovery is enabled by default.
    #[must_use]
    pub fn new(sessions: SessionPool, prefs: CodecPreferences, http: HttpClient) -> Self {
        Self {
            sessions,
            prefs,
            fix_mqa: true,
            http,
        }
    }

    #[must_use]
    pub fn with_fix_mqa(mut self, fix_mqa: bool) -> Self {
        self.fix_mqa = fix_mqa;
        self
    }

    #[must_use]
    pub fn preferences(&self) -> &CodecPreferences {
        &self.prefs
    }

    /// Looks up a track's capabilities, consulting and filling `cache`.
    ///
    /// A region-locked lookup yields
    /// [`TrackCapabilities::region_locked_substitute`].
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::BackendRequest`] if no session is configured
    /// or the lookup fails for another reason.
    #[instrument(skip(self, cache))]
    pub async fn lookup_capabilities(
        &self,
        track_id: &str,
        cache: &CapabilityCache,
    ) -> Result<TrackCapabilities, ResolveError> {
        if let Some(cached) = cache.get(track_id) {
            debug!("capabilities served from cache");
            return Ok(cached);
        }

        let session = self.sessions.any().ok_or(BackendError::SessionUnavailable {
            kind: format::SessionKind::Tv,
        })?;
        let capabilities = match session.get_track_capabilities(track_id).await {
            Ok(capabilities) => capabilities,
            Err(error) if error.is_region_lock() => {
                warn!(error = %error, "capability lookup region locked, assuming stereo lossless");
                TrackCapabilities::region_locked_substitute()
            }
            Err(error) => return Err(error.into()),
        };
        cache.insert(track_id, capabilities.clone());
        Ok(capabilities)
    }

    /// Resolves `track_id` at `tier`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when the backend request fails (other than a
    /// region lock) or the manifest is malformed.
    #[instrument(skip(self, tags))]
    pub async fn resolve_track(
        &self,
        track_id: &str,
        tier: QualityTier,
        tags: &CapabilityTags,
    ) -> Result<ResolvedTrack, ResolveError> {
        let selection =
            format::resolve_for(tier, tags, &self.prefs, &self.sessions.available_kinds());
        self.resolve_selection(track_id, selection).await
    }

    /// Resolves a short preview: always a non-spatial rendition at `LOW`.
    ///
    /// # Errors
    ///
    /// Same as [`TrackResolver::resolve_track`].
    #[instrument(skip(self, tags))]
    pub async fn resolve_preview(
        &self,
        track_id: &str,
        tags: &CapabilityTags,
    ) -> Result<ResolvedTrack, ResolveError> {
        let prefs = CodecPreferences {
            allow_spatial_codecs: false,
            ..self.prefs
        };
        let selection = format::resolve_for(
            QualityTier::Low,
            tags,
            &prefs,
            &self.sessions.available_kinds(),
        );
        self.resolve_selection(track_id, selection).await
    }

    async fn resolve_selection(
        &self,
        track_id: &str,
        selection: Selection,
    ) -> Result<ResolvedTrack, ResolveError> {
        let session = self.sessions.get(selection.session)?;
        info!(
            track_id,
            format = %selection.format,
            session = %selection.session,
            quality = %selection.quality,
            "resolving track"
        );

        let playback = match session.get_stream_manifest(track_id, selection.quality).await {
            Ok(playback) => playback,
            Err(error) if error.is_region_lock() => {
                warn!(track_id, "Track {track_id} is not available in your region");
                return Ok(ResolvedTrack::region_locked(track_id, selection, error));
            }
            Err(error) => return Err(error.into()),
        };

        let (mut source, mut audio_quality, mut audio_mode) = decode(playback)?;
        let mut fell_back = false;

        let codec = source.codec();
        if !codec.is_spatial() && !self.prefs.allow_proprietary_codecs && codec.is_proprietary() {
            info!(
                track_id,
                %codec,
                "proprietary codecs are disabled, re-fetching at LOSSLESS"
            );
            let playback = match session
                .get_stream_manifest(track_id, BackendQuality::Lossless)
                .await
            {
                Ok(playback) => playback,
                Err(error) if error.is_region_lock() => {
                    warn!(track_id, "Track {track_id} is not available in your region");
                    return Ok(ResolvedTrack::region_locked(track_id, selection, error));
                }
                Err(error) => return Err(error.into()),
            };
            (source, audio_quality, audio_mode) = decode(playback)?;
            fell_back = true;
        }

        let probe = self.probe_source(&source).await;
        let codec = source.codec();
        let profile = AudioProfile::derive(
            codec,
            Some(&source),
            audio_quality,
            audio_mode.as_deref(),
            probe.as_ref(),
        );
        debug!(track_id, %codec, ?profile, fell_back, "track resolved");

        Ok(ResolvedTrack {
            track_id: track_id.to_string(),
            selection,
            source: Some(source),
            codec,
            audio_quality,
            audio_mode,
            fell_back,
            probe,
            profile,
            error: None,
        })
    }

    /// Probes a direct MQA source when hi-res recovery is enabled.
    async fn probe_source(&self, source: &StreamSource) -> Option<ProbeResult> {
        if !self.fix_mqa || source.codec() != Codec::Mqa {
            return None;
        }
        let url = source.direct_url()?;
        match self.http.fetch_prefix(url, PROBE_PREFIX_BYTES).await {
            Ok(prefix) => {
                let result = probe::probe(&prefix);
                debug!(?result, "probe finished");
                Some(result)
            }
            Err(error) => {
                warn!(error = %error, "could not fetch stream prefix for probing");
                None
            }
        }
    }
}

fn decode(
    playback: PlaybackManifest,
) -> Result<(StreamSource, Option<BackendQuality>, Option<String>), ResolveError> {
    let source = playback.envelope.decode()?;
    Ok((source, playback.audio_quality, playback.audio_mode))
}
