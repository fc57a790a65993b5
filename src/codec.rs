//! Audio codec and container table.
//!
//! Every codec the catalogue can hand back is described by a static row:
//! which container it lands in after remux, and whether it counts as
//! lossless, spatial, or proprietary for the purposes of format selection.

use std::fmt;

/// Codecs a stream manifest may advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    Aac,
    Flac,
    /// Hi-res encoding folded into a FLAC container.
    Mqa,
    Alac,
    /// E-AC-3, including the joint-object-coding spatial profile.
    Eac3,
    Ac4,
    Ac3,
    /// MPEG-H 3D audio, used by the alternate spatial rendition.
    Mha1,
    Mp3,
    Opus,
}

/// Output containers produced by the remux step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    Flac,
    M4a,
    Mp4,
    Ac3,
    Mp3,
    Ogg,
}

/// Static properties of one codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecData {
    pub container: ContainerKind,
    pub lossless: bool,
    pub spatial: bool,
    pub proprietary: bool,
}

impl Codec {
    /// Returns the static table row for this codec.
    #[must_use]
    #[allow(clippy::match_same_arms)]
    pub fn data(self) -> CodecData {
        let (container, lossless, spatial, proprietary) = match self {
            Self::Aac => (ContainerKind::M4a, false, false, true),
            Self::Flac => (ContainerKind::Flac, true, false, false),
            Self::Mqa => (ContainerKind::Flac, false, false, true),
            Self::Alac => (ContainerKind::M4a, true, false, false),
            Self::Eac3 => (ContainerKind::Mp4, false, true, true),
            Self::Ac4 => (ContainerKind::Mp4, false, true, true),
            Self::Ac3 => (ContainerKind::Ac3, false, false, true),
            Self::Mha1 => (ContainerKind::Mp4, false, true, true),
            Self::Mp3 => (ContainerKind::Mp3, false, false, false),
            Self::Opus => (ContainerKind::Ogg, false, false, false),
        };
        CodecData {
            container,
            lossless,
            spatial,
            proprietary,
        }
    }

    #[must_use]
    pub fn container(self) -> ContainerKind {
        self.data().container
    }

    #[must_use]
    pub fn is_spatial(self) -> bool {
        self.data().spatial
    }

    #[must_use]
    pub fn is_proprietary(self) -> bool {
        self.data().proprietary
    }

    /// Looks up an already-normalised (uppercase) codec name.
    #[must_use]
    pub fn from_normalized(name: &str) -> Option<Self> {
        let codec = match name {
            "AAC" => Self::Aac,
            "FLAC" => Self::Flac,
            "MQA" => Self::Mqa,
            "ALAC" => Self::Alac,
            "EAC3" | "EC-3" => Self::Eac3,
            "AC4" | "AC-4" => Self::Ac4,
            "AC3" | "AC-3" => Self::Ac3,
            "MHA1" => Self::Mha1,
            "MP3" => Self::Mp3,
            "OPUS" => Self::Opus,
            _ => return None,
        };
        Some(codec)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aac => "AAC",
            Self::Flac => "FLAC",
            Self::Mqa => "MQA",
            Self::Alac => "ALAC",
            Self::Eac3 => "EAC3",
            Self::Ac4 => "AC4",
            Self::Ac3 => "AC3",
            Self::Mha1 => "MHA1",
            Self::Mp3 => "MP3",
            Self::Opus => "OPUS",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ContainerKind {
    /// File extension, without the dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Flac => "flac",
            Self::M4a => "m4a",
            Self::Mp4 => "mp4",
            Self::Ac3 => "ac3",
            Self::Mp3 => "mp3",
            Self::Ogg => "ogg",
        }
    }

    /// MP4-family containers get the fast-start layout on remux.
    #[must_use]
    pub fn is_mp4_family(self) -> bool {
        matches!(self, Self::M4a | Self::Mp4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spatial_codecs_are_the_object_and_360_codecs() {
        let spatial: Vec<Codec> = [
            Codec::Aac,
            Codec::Flac,
            Codec::Mqa,
            Codec::Alac,
            Codec::Eac3,
            Codec::Ac4,
            Codec::Ac3,
            Codec::Mha1,
            Codec::Mp3,
            Codec::Opus,
        ]
        .into_iter()
        .filter(|codec| codec.is_spatial())
        .collect();
        assert_eq!(spatial, vec![Codec::Eac3, Codec::Ac4, Codec::Mha1]);
    }

    #[test]
    fn test_mqa_shares_flac_container_but_is_proprietary() {
        assert_eq!(Codec::Mqa.container(), ContainerKind::Flac);
        assert!(Codec::Mqa.is_proprietary());
        assert!(!Codec::Flac.is_proprietary());
    }

    #[test]
    fn test_from_normalized_accepts_dash_spellings() {
        assert_eq!(Codec::from_normalized("EC-3"), Some(Codec::Eac3));
        assert_eq!(Codec::from_normalized("FLAC"), Some(Codec::Flac));
        assert_eq!(Codec::from_normalized("flac"), None);
        assert_eq!(Codec::from_normalized("VORBIS"), None);
    }

    #[test]
    fn test_mp4_family() {
        assert!(ContainerKind::M4a.is_mp4_family());
        assert!(ContainerKind::Mp4.is_mp4_family());
        assert!(!ContainerKind::Flac.is_mp4_family());
    }
}
