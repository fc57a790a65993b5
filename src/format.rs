//! Format selection: which rendition to ask the backend for.
//!
//! The decision is a pure function of the requested [`QualityTier`], the
//! track's [`CapabilityTags`] and the user's [`CodecPreferences`]. Each
//! [`Format`] implies a fixed backend session and quality string, so the
//! table below is exhaustively checked by the compiler.
//!
//! | Format | Session | Quality |
//! |--------|---------|---------|
//! | `DirectLossy` | baseline | `LOW` / `HIGH` |
//! | `DirectLossless` | baseline | `LOSSLESS` / `HI_RES` |
//! | `HiResLosslessDash` | mobile default | `HI_RES_LOSSLESS` |
//! | `SpatialCompatible` | TV | tier string |
//! | `SpatialNext` | mobile atmos | tier string |
//! | `SpatialLegacy` | mobile default | tier string |
//!
//! # Example
//!
//! ```
//! use trackfetch_core::format::{
//!     BackendQuality, CapabilityTags, CodecPreferences, Format, QualityTier, resolve,
//! };
//!
//! let tags = CapabilityTags::from_iter(["HIRES_LOSSLESS"]);
//! let prefs = CodecPreferences { allow_spatial_codecs: false, ..CodecPreferences::default() };
//! let selection = resolve(QualityTier::HiFi, &tags, &prefs);
//! assert_eq!(selection.format, Format::HiResLosslessDash);
//! assert_eq!(selection.quality, BackendQuality::HiResLossless);
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

/// Tag advertised by tracks that have an object-based spatial mix.
pub const OBJECT_SPATIAL_TAG: &str = "DOLBY_ATMOS";

/// Tag advertised by tracks that have the alternate (non object-based) spatial mix.
pub const ALTERNATE_SPATIAL_TAG: &str = "SONY_360RA";

/// Tag advertised by tracks that have a hi-res lossless rendition.
pub const HIRES_LOSSLESS_TAG: &str = "HIRES_LOSSLESS";

/// User-requested quality ceiling, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QualityTier {
    Minimum,
    Low,
    Medium,
    High,
    Lossless,
    HiFi,
}

/// Error returned when a quality tier name is not recognised.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown quality tier '{0}'\n  Suggestion: use one of minimum, low, medium, high, lossless, hifi")]
pub struct UnknownQualityTier(pub String);

impl QualityTier {
    /// Maps the tier onto the backend's quality vocabulary.
    #[must_use]
    pub fn backend_quality(self) -> BackendQuality {
        match self {
            Self::Minimum | Self::Low => BackendQuality::Low,
            Self::Medium | Self::High => BackendQuality::High,
            Self::Lossless => BackendQuality::Lossless,
            Self::HiFi => BackendQuality::HiRes,
        }
    }
}

impl FromStr for QualityTier {
    type Err = UnknownQualityTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimum" => Ok(Self::Minimum),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "lossless" => Ok(Self::Lossless),
            "hifi" => Ok(Self::HiFi),
            _ => Err(UnknownQualityTier(s.to_string())),
        }
    }
}

/// Quality strings understood by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendQuality {
    Low,
    High,
    Lossless,
    HiRes,
    HiResLossless,
}

impl BackendQuality {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::High => "HIGH",
            Self::Lossless => "LOSSLESS",
            Self::HiRes => "HI_RES",
            Self::HiResLossless => "HI_RES_LOSSLESS",
        }
    }

    /// Parses a quality string reported back by the backend.
    #[must_use]
    pub fn from_backend(value: &str) -> Option<Self> {
        match value {
            "LOW" => Some(Self::Low),
            "HIGH" => Some(Self::High),
            "LOSSLESS" => Some(Self::Lossless),
            "HI_RES" => Some(Self::HiRes),
            "HI_RES_LOSSLESS" => Some(Self::HiResLossless),
            _ => None,
        }
    }
}

impl fmt::Display for BackendQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability tags attached to a track by the catalogue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityTags(BTreeSet<String>);

impl CapabilityTags {
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    #[must_use]
    pub fn has_object_spatial(&self) -> bool {
        self.contains(OBJECT_SPATIAL_TAG)
    }

    #[must_use]
    pub fn has_alternate_spatial(&self) -> bool {
        self.contains(ALTERNATE_SPATIAL_TAG)
    }

    #[must_use]
    pub fn has_hires_lossless(&self) -> bool {
        self.contains(HIRES_LOSSLESS_TAG)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for CapabilityTags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Codec preferences supplied by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct CodecPreferences {
    pub allow_spatial_codecs: bool,
    pub allow_proprietary_codecs: bool,
    /// Pick the newer spatial codec/session pairing over the widely compatible one.
    pub prefer_secondary_spatial_variant: bool,
}

impl Default for CodecPreferences {
    fn default() -> Self {
        Self {
            allow_spatial_codecs: true,
            allow_proprietary_codecs: false,
            prefer_secondary_spatial_variant: false,
        }
    }
}

/// Backend session kinds. The resolver only uses them to pick which session to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionKind {
    Tv,
    MobileDefault,
    MobileAtmos,
}

impl SessionKind {
    /// Every session kind, in baseline fallback order.
    pub const ALL: [SessionKind; 3] = [Self::Tv, Self::MobileDefault, Self::MobileAtmos];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tv => "tv",
            Self::MobileDefault => "mobile_default",
            Self::MobileAtmos => "mobile_atmos",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutually exclusive streaming formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Single-URL lossy stream at `LOW` or `HIGH`.
    DirectLossy(BackendQuality),
    /// Single-URL lossless stream at `LOSSLESS` or `HI_RES`.
    DirectLossless(BackendQuality),
    /// Segmented hi-res FLAC.
    HiResLosslessDash,
    /// Object-based spatial mix in the widely compatible codec (E-AC-3).
    SpatialCompatible,
    /// Object-based spatial mix in the newer codec (AC-4).
    SpatialNext,
    /// Alternate spatial rendition.
    SpatialLegacy,
}

impl Format {
    /// Session this format is bound to; `None` means the baseline session.
    #[must_use]
    pub fn session_kind(self) -> Option<SessionKind> {
        match self {
            Self::DirectLossy(_) | Self::DirectLossless(_) => None,
            Self::HiResLosslessDash | Self::SpatialLegacy => Some(SessionKind::MobileDefault),
            Self::SpatialCompatible => Some(SessionKind::Tv),
            Self::SpatialNext => Some(SessionKind::MobileAtmos),
        }
    }

    /// Quality string sent to the backend for this format.
    #[must_use]
    pub fn requested_quality(self, tier: QualityTier) -> BackendQuality {
        match self {
            Self::DirectLossy(quality) | Self::DirectLossless(quality) => quality,
            Self::HiResLosslessDash => BackendQuality::HiResLossless,
            Self::SpatialCompatible | Self::SpatialNext | Self::SpatialLegacy => {
                tier.backend_quality()
            }
        }
    }

    #[must_use]
    pub fn is_direct(self) -> bool {
        matches!(self, Self::DirectLossy(_) | Self::DirectLossless(_))
    }

    fn direct_for(tier: QualityTier) -> Self {
        let quality = tier.backend_quality();
        if tier >= QualityTier::Lossless {
            Self::DirectLossless(quality)
        } else {
            Self::DirectLossy(quality)
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DirectLossy(q) => write!(f, "direct-lossy ({q})"),
            Self::DirectLossless(q) => write!(f, "direct-lossless ({q})"),
            Self::HiResLosslessDash => f.write_str("hires-lossless-dash"),
            Self::SpatialCompatible => f.write_str("spatial-compatible"),
            Self::SpatialNext => f.write_str("spatial-next"),
            Self::SpatialLegacy => f.write_str("spatial-legacy"),
        }
    }
}

/// One (session, quality, format) decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub session: SessionKind,
    pub quality: BackendQuality,
    pub format: Format,
}

/// Resolves a selection assuming every session kind is available.
#[must_use]
pub fn resolve(tier: QualityTier, tags: &CapabilityTags, prefs: &CodecPreferences) -> Selection {
    resolve_for(tier, tags, prefs, &SessionKind::ALL)
}

/// Resolves a selection against the session kinds the deployment can actually use.
///
/// A preferred format whose session is missing degrades to the direct format
/// for the tier on the baseline session.
#[must_use]
pub fn resolve_for(
    tier: QualityTier,
    tags: &CapabilityTags,
    prefs: &CodecPreferences,
    available: &[SessionKind],
) -> Selection {
    if let Some(format) = preferred_format(tier, tags, prefs) {
        if let Some(session) = format.session_kind()
            && available.contains(&session)
        {
            return Selection {
                session,
                quality: format.requested_quality(tier),
                format,
            };
        }
        debug!(%format, "session for preferred format unavailable, using direct format");
    }

    let format = Format::direct_for(tier);
    Selection {
        session: baseline_session(tags, available),
        quality: format.requested_quality(tier),
        format,
    }
}

fn preferred_format(
    tier: QualityTier,
    tags: &CapabilityTags,
    prefs: &CodecPreferences,
) -> Option<Format> {
    if prefs.allow_spatial_codecs {
        if tags.has_object_spatial() {
            return Some(if prefs.prefer_secondary_spatial_variant {
                Format::SpatialNext
            } else {
                Format::SpatialCompatible
            });
        }
        if tags.has_alternate_spatial() {
            return Some(Format::SpatialLegacy);
        }
    }
    if tags.has_hires_lossless() && tier == QualityTier::HiFi {
        return Some(Format::HiResLosslessDash);
    }
    None
}

/// The TV session hands back the object-based mix for tracks that have one,
/// so those tracks use the mobile default session for stereo.
fn baseline_session(tags: &CapabilityTags, available: &[SessionKind]) -> SessionKind {
    let preferred = if tags.has_object_spatial() {
        SessionKind::MobileDefault
    } else {
        SessionKind::Tv
    };
    if available.contains(&preferred) {
        return preferred;
    }
    SessionKind::ALL
        .into_iter()
        .find(|kind| available.contains(kind))
        .unwrap_or(preferred)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn no_spatial() -> CodecPreferences {
        CodecPreferences {
            allow_spatial_codecs: false,
            ..CodecPreferences::default()
        }
    }

    // ==================== Tier Mapping Tests ====================

    #[test]
    fn test_tier_maps_many_to_one() {
        assert_eq!(QualityTier::Minimum.backend_quality(), BackendQuality::Low);
        assert_eq!(QualityTier::Low.backend_quality(), BackendQuality::Low);
        assert_eq!(QualityTier::Medium.backend_quality(), BackendQuality::High);
        assert_eq!(QualityTier::High.backend_quality(), BackendQuality::High);
        assert_eq!(
            QualityTier::Lossless.backend_quality(),
            BackendQuality::Lossless
        );
        assert_eq!(QualityTier::HiFi.backend_quality(), BackendQuality::HiRes);
    }

    #[test]
    fn test_tier_parse_is_case_insensitive() {
        assert_eq!("HiFi".parse::<QualityTier>().unwrap(), QualityTier::HiFi);
        assert_eq!(" low ".parse::<QualityTier>().unwrap(), QualityTier::Low);
        let err = "ultra".parse::<QualityTier>().unwrap_err();
        assert!(err.to_string().contains("ultra"));
    }

    // ==================== Decision Table Tests ====================

    #[test]
    fn test_hifi_with_hires_tag_and_no_spatial_selects_dash() {
        let tags = CapabilityTags::from_iter([HIRES_LOSSLESS_TAG]);
        let selection = resolve(QualityTier::HiFi, &tags, &no_spatial());
        assert_eq!(selection.format, Format::HiResLosslessDash);
        assert_eq!(selection.quality.as_str(), "HI_RES_LOSSLESS");
        assert_eq!(selection.session, SessionKind::MobileDefault);
    }

    #[test]
    fn test_lossless_without_tags_selects_direct_lossless() {
        let selection = resolve(
            QualityTier::Lossless,
            &CapabilityTags::default(),
            &CodecPreferences::default(),
        );
        assert_eq!(
            selection.format,
            Format::DirectLossless(BackendQuality::Lossless)
        );
        assert_eq!(selection.quality.as_str(), "LOSSLESS");
        assert_eq!(selection.session, SessionKind::Tv);
    }

    #[test]
    fn test_hires_tag_below_hifi_is_ignored() {
        let tags = CapabilityTags::from_iter([HIRES_LOSSLESS_TAG]);
        let selection = resolve(QualityTier::Lossless, &tags, &no_spatial());
        assert_eq!(
            selection.format,
            Format::DirectLossless(BackendQuality::Lossless)
        );
    }

    #[test]
    fn test_object_spatial_defaults_to_compatible_variant_on_tv() {
        let tags = CapabilityTags::from_iter([OBJECT_SPATIAL_TAG, HIRES_LOSSLESS_TAG]);
        let selection = resolve(QualityTier::HiFi, &tags, &CodecPreferences::default());
        assert_eq!(selection.format, Format::SpatialCompatible);
        assert_eq!(selection.session, SessionKind::Tv);
        assert_eq!(selection.quality, BackendQuality::HiRes);
    }

    #[test]
    fn test_object_spatial_prefers_next_variant_when_flagged() {
        let tags = CapabilityTags::from_iter([OBJECT_SPATIAL_TAG]);
        let prefs = CodecPreferences {
            prefer_secondary_spatial_variant: true,
            ..CodecPreferences::default()
        };
        let selection = resolve(QualityTier::High, &tags, &prefs);
        assert_eq!(selection.format, Format::SpatialNext);
        assert_eq!(selection.session, SessionKind::MobileAtmos);
        assert_eq!(selection.quality, BackendQuality::High);
    }

    #[test]
    fn test_object_spatial_wins_over_alternate_spatial() {
        let tags = CapabilityTags::from_iter([ALTERNATE_SPATIAL_TAG, OBJECT_SPATIAL_TAG]);
        let selection = resolve(QualityTier::Lossless, &tags, &CodecPreferences::default());
        assert_eq!(selection.format, Format::SpatialCompatible);
    }

    #[test]
    fn test_alternate_spatial_selects_legacy_rendition() {
        let tags = CapabilityTags::from_iter([ALTERNATE_SPATIAL_TAG]);
        let selection = resolve(QualityTier::Lossless, &tags, &CodecPreferences::default());
        assert_eq!(selection.format, Format::SpatialLegacy);
        assert_eq!(selection.session, SessionKind::MobileDefault);
    }

    #[test]
    fn test_object_spatial_never_direct_when_spatial_allowed() {
        let tags = CapabilityTags::from_iter([OBJECT_SPATIAL_TAG]);
        for tier in [
            QualityTier::Minimum,
            QualityTier::Low,
            QualityTier::Medium,
            QualityTier::High,
            QualityTier::Lossless,
            QualityTier::HiFi,
        ] {
            for prefer_secondary in [false, true] {
                let prefs = CodecPreferences {
                    prefer_secondary_spatial_variant: prefer_secondary,
                    ..CodecPreferences::default()
                };
                assert!(!resolve(tier, &tags, &prefs).format.is_direct());
            }
        }
    }

    #[test]
    fn test_object_spatial_tag_with_spatial_disallowed_uses_mobile_baseline() {
        let tags = CapabilityTags::from_iter([OBJECT_SPATIAL_TAG]);
        let selection = resolve(QualityTier::Lossless, &tags, &no_spatial());
        assert_eq!(
            selection.format,
            Format::DirectLossless(BackendQuality::Lossless)
        );
        assert_eq!(selection.session, SessionKind::MobileDefault);
    }

    #[test]
    fn test_low_tiers_select_direct_lossy() {
        let selection = resolve(
            QualityTier::Medium,
            &CapabilityTags::default(),
            &CodecPreferences::default(),
        );
        assert_eq!(selection.format, Format::DirectLossy(BackendQuality::High));
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let tags = CapabilityTags::from_iter([HIRES_LOSSLESS_TAG, ALTERNATE_SPATIAL_TAG]);
        let prefs = CodecPreferences::default();
        let first = resolve(QualityTier::HiFi, &tags, &prefs);
        for _ in 0..10 {
            assert_eq!(resolve(QualityTier::HiFi, &tags, &prefs), first);
        }
    }

    // ==================== Availability Tests ====================

    #[test]
    fn test_unavailable_session_degrades_to_direct_format() {
        let tags = CapabilityTags::from_iter([HIRES_LOSSLESS_TAG]);
        let selection = resolve_for(QualityTier::HiFi, &tags, &no_spatial(), &[SessionKind::Tv]);
        assert_eq!(selection.format, Format::DirectLossless(BackendQuality::HiRes));
        assert_eq!(selection.quality.as_str(), "HI_RES");
        assert_eq!(selection.session, SessionKind::Tv);
    }

    #[test]
    fn test_unavailable_next_variant_degrades_to_baseline() {
        let tags = CapabilityTags::from_iter([OBJECT_SPATIAL_TAG]);
        let prefs = CodecPreferences {
            prefer_secondary_spatial_variant: true,
            ..CodecPreferences::default()
        };
        let selection = resolve_for(
            QualityTier::Lossless,
            &tags,
            &prefs,
            &[SessionKind::Tv, SessionKind::MobileDefault],
        );
        assert_eq!(
            selection.format,
            Format::DirectLossless(BackendQuality::Lossless)
        );
        assert_eq!(selection.session, SessionKind::MobileDefault);
    }

    #[test]
    fn test_baseline_falls_back_to_first_available_session() {
        let tags = CapabilityTags::from_iter([OBJECT_SPATIAL_TAG]);
        let selection = resolve_for(QualityTier::Low, &tags, &no_spatial(), &[SessionKind::Tv]);
        assert_eq!(selection.session, SessionKind::Tv);
    }
}
