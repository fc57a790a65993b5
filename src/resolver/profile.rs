//! Bit depth, sample rate and bitrate reported for a resolved track.

use crate::codec::Codec;
use crate::format::{ALTERNATE_SPATIAL_TAG, BackendQuality, OBJECT_SPATIAL_TAG};
use crate::manifest::StreamSource;
use crate::probe::ProbeResult;

const DEFAULT_SAMPLE_RATE_HZ: u32 = 44_100;
const SPATIAL_SAMPLE_RATE_HZ: u32 = 48_000;

/// Audio characteristics of a resolved track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioProfile {
    /// Only known for lossless codecs.
    pub bit_depth: Option<u32>,
    pub sample_rate_hz: u32,
    pub bitrate_kbps: Option<u64>,
}

impl AudioProfile {
    /// Derives the profile from what the backend and the manifest report.
    ///
    /// A recognised probe overrides bit depth and sample rate.
    #[must_use]
    pub fn derive(
        codec: Codec,
        source: Option<&StreamSource>,
        audio_quality: Option<BackendQuality>,
        audio_mode: Option<&str>,
        probe: Option<&ProbeResult>,
    ) -> Self {
        let hires_lossless = audio_quality == Some(BackendQuality::HiResLossless);

        let mut bit_depth = match codec {
            Codec::Flac | Codec::Alac => Some(if hires_lossless { 24 } else { 16 }),
            _ => None,
        };
        let mut sample_rate_hz = match codec {
            Codec::Eac3 | Codec::Ac4 | Codec::Mha1 => SPATIAL_SAMPLE_RATE_HZ,
            _ => DEFAULT_SAMPLE_RATE_HZ,
        };

        let mut bitrate_kbps = audio_quality.and_then(nominal_bitrate_kbps);
        match audio_mode {
            Some(OBJECT_SPATIAL_TAG) => match codec {
                Codec::Eac3 => bitrate_kbps = Some(768),
                Codec::Ac4 => bitrate_kbps = Some(256),
                _ => {}
            },
            Some(ALTERNATE_SPATIAL_TAG) => bitrate_kbps = Some(667),
            _ => {}
        }

        if let Some(source) = source.filter(|source| !source.is_direct()) {
            let rendition = source.primary();
            bitrate_kbps = Some(rendition.bitrate_bps / 1000);
            if hires_lossless && rendition.sample_rate_hz > 0 {
                sample_rate_hz = rendition.sample_rate_hz;
            }
        }

        if let Some(probe) = probe.filter(|probe| probe.is_recognized_encoding) {
            bit_depth = probe.bit_depth.or(bit_depth);
            sample_rate_hz = probe.original_sample_rate_hz.unwrap_or(sample_rate_hz);
        }

        Self {
            bit_depth,
            sample_rate_hz,
            bitrate_kbps,
        }
    }
}

/// Fallback bitrate by backend quality; hi-res qualities have none.
fn nominal_bitrate_kbps(quality: BackendQuality) -> Option<u64> {
    match quality {
        BackendQuality::Low => Some(96),
        BackendQuality::High => Some(320),
        BackendQuality::Lossless => Some(1411),
        BackendQuality::HiRes | BackendQuality::HiResLossless => None,
    }
}
