//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Single-period audio manifest whose segments live on `base_url`.
///
/// The timeline is one `S` entry with `r = media_segments - 1`.
pub fn segmented_manifest(base_url: &str, codec: &str, media_segments: u32) -> String {
    assert!(media_segments > 0, "timeline needs at least one segment");
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" profiles="urn:mpeg:dash:profile:isoff-main:2011" type="static">
  <Period id="0">
    <AdaptationSet id="0" contentType="audio" mimeType="audio/mp4" segmentAlignment="true">
      <Representation id="{codec}" codecs="{codec}" bandwidth="4610000" audioSamplingRate="96000">
        <SegmentTemplate timescale="96000" initialization="{base_url}/seg/init.mp4" media="{base_url}/seg/$Number$.mp4" startNumber="1">
          <SegmentTimeline>
            <S t="0" d="384000" r="{repeat}"/>
          </SegmentTimeline>
        </SegmentTemplate>
      </Representation>
    </AdaptationSet>
  </Period>
</MPD>"#,
        repeat = media_segments - 1
    )
}

/// Body served for segment `name` (`init` or the segment number).
pub fn segment_body(name: &str) -> Vec<u8> {
    format!("[{name}]").into_bytes()
}

/// Mounts `init.mp4` and `1.mp4..=media_segments.mp4` on `server`.
pub async fn mount_segments(server: &MockServer, media_segments: u32) {
    let names = std::iter::once("init".to_string()).chain((1..=media_segments).map(|n| n.to_string()));
    for name in names {
        Mock::given(method("GET"))
            .and(path(format!("/seg/{name}.mp4")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(segment_body(&name)))
            .mount(server)
            .await;
    }
}

/// Concatenation the assembler must produce for `media_segments` segments.
pub fn expected_concatenation(media_segments: u32) -> Vec<u8> {
    let mut bytes = segment_body("init");
    for n in 1..=media_segments {
        bytes.extend(segment_body(&n.to_string()));
    }
    bytes
}

/// Writes a stand-in for `ffmpeg` that copies the `-i` input to the last
/// argument, or exits with `exit_code` when it is non-zero.
#[cfg(unix)]
pub fn fake_ffmpeg(dir: &Path, exit_code: i32) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = if exit_code == 0 {
        r#"#!/bin/sh
input=""
previous=""
for arg in "$@"; do
  if [ "$previous" = "-i" ]; then input="$arg"; fi
  previous="$arg"
  output="$arg"
done
cp "$input" "$output"
"#
        .to_string()
    } else {
        format!("#!/bin/sh\necho 'Invalid data found when processing input' >&2\nexit {exit_code}\n")
    };

    let program = dir.join("fake-ffmpeg");
    std::fs::write(&program, script).expect("write fake ffmpeg");
    std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755))
        .expect("chmod fake ffmpeg");
    program
}

/// Number of entries left in `dir`.
pub fn entries_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}
