//! Backend session contract.
//!
//! The resolver never talks HTTP itself. It asks a [`BackendSession`] for a
//! track's capabilities and for a stream manifest at a given quality, and
//! picks which session to ask through a [`SessionPool`].
//!
//! Sessions are opaque: authentication, token refresh and rate limiting are
//! the session's business. [`HttpBackendSession`] is the shipped
//! implementation and only consumes already-issued access tokens.
//!
//! # Object Safety
//!
//! The trait uses `async_trait` so that sessions can be stored as
//! `Arc<dyn BackendSession>`. Rust 2024 native async traits are not
//! object-safe.

mod error;
mod http;

pub use error::{BackendError, REGION_LOCK_MESSAGE};
pub use http::{DEFAULT_API_BASE_URL, HttpBackendSession};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::format::{BackendQuality, CapabilityTags, SessionKind};
use crate::manifest::ManifestEnvelope;

/// Stream manifest plus the quality facts the backend reports alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackManifest {
    pub envelope: ManifestEnvelope,
    /// Quality the backend actually served, which may differ from the request.
    pub audio_quality: Option<BackendQuality>,
    /// Audio mode such as `STEREO` or `DOLBY_ATMOS`.
    pub audio_mode: Option<String>,
}

/// What the catalogue says a track can be streamed as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackCapabilities {
    pub tags: CapabilityTags,
    pub audio_modes: Vec<String>,
    pub audio_quality: Option<BackendQuality>,
    pub volumes: u32,
}

impl TrackCapabilities {
    /// Best-effort record used when the real lookup is region locked.
    ///
    /// Assumes a plain stereo lossless track in a single volume. The manifest
    /// request still reports the real outcome.
    #[must_use]
    pub fn region_locked_substitute() -> Self {
        Self {
            tags: CapabilityTags::default(),
            audio_modes: vec!["STEREO".to_string()],
            audio_quality: Some(BackendQuality::Lossless),
            volumes: 1,
        }
    }
}

/// A backend session the resolver can query.
#[async_trait]
pub trait BackendSession: Send + Sync {
    /// Which session kind this is.
    fn kind(&self) -> SessionKind;

    /// Fetches the stream manifest for `track_id` at `quality`.
    async fn get_stream_manifest(
        &self,
        track_id: &str,
        quality: BackendQuality,
    ) -> Result<PlaybackManifest, BackendError>;

    /// Fetches the capability record for `track_id`.
    async fn get_track_capabilities(
        &self,
        track_id: &str,
    ) -> Result<TrackCapabilities, BackendError>;
}

/// Sessions available in this deployment, keyed by kind.
#[derive(Clone, Default)]
pub struct SessionPool {
    sessions: HashMap<SessionKind, Arc<dyn BackendSession>>,
}

impl SessionPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `session` under its own kind, replacing any previous one.
    pub fn insert(&mut self, session: Arc<dyn BackendSession>) {
        self.sessions.insert(session.kind(), session);
    }

    /// Returns the session for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::SessionUnavailable`] if none is configured.
    pub fn get(&self, kind: SessionKind) -> Result<Arc<dyn BackendSession>, BackendError> {
        self.sessions
            .get(&kind)
            .cloned()
            .ok_or(BackendError::SessionUnavailable { kind })
    }

    /// Configured kinds, in baseline fallback order.
    #[must_use]
    pub fn available_kinds(&self) -> Vec<SessionKind> {
        SessionKind::ALL
            .into_iter()
            .filter(|kind| self.sessions.contains_key(kind))
            .collect()
    }

    /// First configured session in baseline fallback order.
    #[must_use]
    pub fn any(&self) -> Option<Arc<dyn BackendSession>> {
        SessionKind::ALL
            .into_iter()
            .find_map(|kind| self.sessions.get(&kind).cloned())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPool")
            .field("kinds", &self.available_kinds())
            .finish()
    }
}
