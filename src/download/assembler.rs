//! Segment fetching and reassembly.
//!
//! The assembler turns a decoded [`StreamSource`] into something playable:
//!
//! - a direct source is returned as its URL, untouched;
//! - a segmented source is fetched segment by segment into a private scratch
//!   directory, concatenated in index order (initialization segment first)
//!   and stream-copied into the target container.
//!
//! Segments may be fetched in parallel, bounded by the configured
//! concurrency, but the fetch stream is order-preserving and the
//! concatenation walks the list by index.
//!
//! The scratch directory belongs to one assembly and is deleted when the
//! assembly finishes or its future is dropped. When the remux step fails the
//! concatenated file is moved next to the intended output and returned as a
//! degraded result.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use futures_util::{StreamExt, TryStreamExt, stream};
use tempfile::TempDir;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

use super::constants::{DEFAULT_SEGMENT_CONCURRENCY, MAX_SEGMENT_CONCURRENCY, PREVIEW_MEDIA_SEGMENTS};
use super::remux::{RemuxError, Remuxer};
use super::retry::{RetryDecision, RetryPolicy, classify_error, retry_after_hint};
use super::{AssembleError, DownloadError, HttpClient};
use crate::codec::ContainerKind;
use crate::manifest::StreamSource;

/// Extension of the concatenated intermediate. Segmented renditions are
/// fragmented MP4 regardless of the codec inside.
const MERGED_EXTENSION: &str = "mp4";

/// Result of an assembly.
#[derive(Debug)]
pub enum AssemblyOutcome {
    /// Direct source: nothing was downloaded.
    Direct {
        url: String,
    },
    /// Segments concatenated and remuxed into the target container.
    Remuxed {
        path: PathBuf,
    },
    /// Segments concatenated but the remux step failed; `path` is the
    /// unremuxed concatenation.
    Unremuxed {
        path: PathBuf,
        reason: RemuxError,
    },
    /// Preview concatenation, never remuxed.
    Preview {
        path: PathBuf,
    },
}

impl AssemblyOutcome {
    /// Local file produced, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Direct { .. } => None,
            Self::Remuxed { path } | Self::Unremuxed { path, .. } | Self::Preview { path } => {
                Some(path)
            }
        }
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Unremuxed { .. })
    }
}

/// Fetches, concatenates and remuxes segmented renditions.
#[derive(Debug, Clone)]
pub struct Assembler {
    client: HttpClient,
    policy: RetryPolicy,
    concurrency: usize,
    temp_root: PathBuf,
    remuxer: Remuxer,
}

impl Assembler {
    /// Creates an assembler.
    ///
    /// # Errors
    ///
    /// Returns [`AssembleError::InvalidConcurrency`] unless `concurrency` is
    /// between 1 and 16.
    pub fn new(
        client: HttpClient,
        policy: RetryPolicy,
        concurrency: usize,
    ) -> Result<Self, AssembleError> {
        if !(1..=MAX_SEGMENT_CONCURRENCY).contains(&concurrency) {
            return Err(AssembleError::InvalidConcurrency {
                value: concurrency,
                max: MAX_SEGMENT_CONCURRENCY,
            });
        }
        Ok(Self {
            client,
            policy,
            concurrency,
            temp_root: std::env::temp_dir(),
            remuxer: Remuxer::locate(None),
        })
    }

    /// Assembler with default concurrency and retry policy.
    #[must_use]
    pub fn with_defaults(client: HttpClient) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
            concurrency: DEFAULT_SEGMENT_CONCURRENCY,
            temp_root: std::env::temp_dir(),
            remuxer: Remuxer::locate(None),
        }
    }

    /// Directory under which per-assembly scratch directories are created.
    #[must_use]
    pub fn with_temp_root(mut self, temp_root: impl Into<PathBuf>) -> Self {
        self.temp_root = temp_root.into();
        self
    }

    #[must_use]
    pub fn with_remuxer(mut self, remuxer: Remuxer) -> Self {
        self.remuxer = remuxer;
        self
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Produces the playable form of `source`.
    ///
    /// `output_stem` is the output path without extension; the container's
    /// extension is appended. Direct sources return their URL unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`AssembleError`] when a segment cannot be fetched or local
    /// files cannot be written. A failed remux is not an error: it yields
    /// [`AssemblyOutcome::Unremuxed`].
    #[instrument(skip(self, source), fields(segments = source.primary().segment_urls.len()))]
    pub async fn assemble(
        &self,
        source: &StreamSource,
        container: ContainerKind,
        output_stem: &Path,
    ) -> Result<AssemblyOutcome, AssembleError> {
        if let Some(url) = direct_url(source)? {
            return Ok(AssemblyOutcome::Direct { url });
        }

        let scratch = self.scratch_dir()?;
        let merged = scratch.path().join(format!("merged.{MERGED_EXTENSION}"));
        let urls = &source.primary().segment_urls;
        let bytes = self.fetch_and_concatenate(urls, scratch.path(), &merged).await?;
        debug!(bytes, path = %merged.display(), "segments concatenated");

        let output = append_extension(output_stem, container.extension());
        ensure_parent(&output).await?;

        match self.remuxer.remux(&merged, &output, container).await {
            Ok(()) => {
                info!(path = %output.display(), segments = urls.len(), "track assembled");
                Ok(AssemblyOutcome::Remuxed { path: output })
            }
            Err(reason) => {
                let fallback = append_extension(output_stem, MERGED_EXTENSION);
                move_file(&merged, &fallback).await?;
                warn!(
                    path = %fallback.display(),
                    error = %reason,
                    "remux failed, keeping unremuxed concatenation"
                );
                Ok(AssemblyOutcome::Unremuxed {
                    path: fallback,
                    reason,
                })
            }
        }
    }

    /// Produces a short preview: the initialization segment plus the first
    /// few media segments, concatenated into an `.m4a` without remux.
    ///
    /// # Errors
    ///
    /// Same as [`Assembler::assemble`].
    #[instrument(skip(self, source))]
    pub async fn assemble_preview(
        &self,
        source: &StreamSource,
        output_stem: &Path,
    ) -> Result<AssemblyOutcome, AssembleError> {
        if let Some(url) = direct_url(source)? {
            return Ok(AssemblyOutcome::Direct { url });
        }

        let urls = &source.primary().segment_urls;
        if source.primary().media_urls().is_empty() {
            return Err(AssembleError::NoMediaSegments);
        }
        let limit = urls.len().min(PREVIEW_MEDIA_SEGMENTS + 1);
        let scratch = self.scratch_dir()?;
        let output = append_extension(output_stem, ContainerKind::M4a.extension());
        ensure_parent(&output).await?;

        let staged = scratch.path().join("preview.m4a");
        self.fetch_and_concatenate(&urls[..limit], scratch.path(), &staged)
            .await?;
        move_file(&staged, &output).await?;
        info!(path = %output.display(), segments = limit, "preview assembled");
        Ok(AssemblyOutcome::Preview { path: output })
    }

    fn scratch_dir(&self) -> Result<TempDir, AssembleError> {
        tempfile::Builder::new()
            .prefix("trackfetch-")
            .tempdir_in(&self.temp_root)
            .map_err(|e| AssembleError::io(&self.temp_root, e))
    }

    async fn fetch_and_concatenate(
        &self,
        urls: &[String],
        scratch: &Path,
        merged: &Path,
    ) -> Result<u64, AssembleError> {
        if urls.is_empty() {
            return Err(AssembleError::EmptyRendition);
        }
        let parts = self.fetch_segments(urls, scratch).await?;
        concatenate(&parts, merged).await
    }

    /// Fetches every segment, returning the part files in index order.
    async fn fetch_segments(
        &self,
        urls: &[String],
        scratch: &Path,
    ) -> Result<Vec<PathBuf>, AssembleError> {
        let total = urls.len();
        stream::iter(urls.iter().enumerate())
            .map(|(index, url)| {
                let part = scratch.join(format!("segment-{index:05}.part"));
                async move {
                    self.fetch_with_retry(url, &part)
                        .await
                        .map(|_| part)
                        .map_err(|source| AssembleError::Segment {
                            index,
                            total,
                            source,
                        })
                }
            })
            .buffered(self.concurrency)
            .try_collect()
            .await
    }

    async fn fetch_with_retry(&self, url: &str, part: &Path) -> Result<u64, DownloadError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.client.download_to_path(url, part).await {
                Ok(bytes) => return Ok(bytes),
                Err(error) => match self.policy.should_retry(classify_error(&error), attempt) {
                    RetryDecision::Retry {
                        delay: backoff,
                        attempt: next_attempt,
                    } => {
                        let hinted = retry_after_hint(&error);
                        let delay = hinted.unwrap_or(backoff);
                        info!(
                            url,
                            attempt = next_attempt,
                            max_attempts = self.policy.max_attempts(),
                            delay_ms = delay.as_millis(),
                            using_retry_after = hinted.is_some(),
                            error = %error,
                            "retrying segment"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        debug!(url, %reason, "not retrying segment");
                        return Err(error);
                    }
                },
            }
        }
    }
}

fn direct_url(source: &StreamSource) -> Result<Option<String>, AssembleError> {
    if !source.is_direct() {
        return Ok(None);
    }
    source
        .direct_url()
        .map(|url| Some(url.to_string()))
        .ok_or(AssembleError::EmptyRendition)
}

/// Appends the part files to `merged` in order, deleting each once copied.
async fn concatenate(parts: &[PathBuf], merged: &Path) -> Result<u64, AssembleError> {
    let file = File::create(merged)
        .await
        .map_err(|e| AssembleError::io(merged, e))?;
    let mut writer = BufWriter::new(file);
    let mut total = 0u64;

    for part in parts {
        let mut reader = File::open(part)
            .await
            .map_err(|e| AssembleError::io(part, e))?;
        total += tokio::io::copy(&mut reader, &mut writer)
            .await
            .map_err(|e| AssembleError::io(merged, e))?;
        drop(reader);
        let _ = tokio::fs::remove_file(part).await;
    }

    writer
        .flush()
        .await
        .map_err(|e| AssembleError::io(merged, e))?;
    Ok(total)
}

/// Appends `.extension` to `stem`, keeping any dots already in it.
#[must_use]
pub fn append_extension(stem: &Path, extension: &str) -> PathBuf {
    let mut name = OsString::from(stem.as_os_str());
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

async fn ensure_parent(path: &Path) -> Result<(), AssembleError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AssembleError::io(parent, e)),
        _ => Ok(()),
    }
}

/// Renames `from` to `to`, copying when they are on different file systems.
async fn move_file(from: &Path, to: &Path) -> Result<(), AssembleError> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to)
        .await
        .map_err(|e| AssembleError::io(to, e))?;
    let _ = tokio::fs::remove_file(from).await;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::manifest::{ManifestEnvelope, MimeKind};

    #[test]
    fn test_new_rejects_out_of_range_concurrency() {
        for value in [0, MAX_SEGMENT_CONCURRENCY + 1] {
            let result = Assembler::new(HttpClient::new(), RetryPolicy::default(), value);
            assert!(matches!(
                result,
                Err(AssembleError::InvalidConcurrency { value: v, .. }) if v == value
            ));
        }
        let assembler = Assembler::new(HttpClient::new(), RetryPolicy::default(), 1).unwrap();
        assert_eq!(assembler.concurrency(), 1);
    }

    #[test]
    fn test_append_extension_keeps_dots_in_stem() {
        assert_eq!(
            append_extension(Path::new("out/01. Intro v1.5"), "flac"),
            PathBuf::from("out/01. Intro v1.5.flac")
        );
    }

    #[tokio::test]
    async fn test_concatenate_preserves_part_order() {
        let dir = TempDir::new().unwrap();
        let mut parts = Vec::new();
        for (index, body) in ["init|", "one|", "two"].iter().enumerate() {
            let part = dir.path().join(format!("segment-{index:05}.part"));
            std::fs::write(&part, body).unwrap();
            parts.push(part);
        }
        let merged = dir.path().join("merged.mp4");

        let total = concatenate(&parts, &merged).await.unwrap();
        assert_eq!(total, 13);
        assert_eq!(std::fs::read_to_string(&merged).unwrap(), "init|one|two");
        assert!(parts.iter().all(|part| !part.exists()));
    }

    #[tokio::test]
    async fn test_preview_of_init_only_rendition_is_rejected() {
        let mpd = br#"<MPD><Period><AdaptationSet contentType="audio">
            <Representation codecs="flac"><SegmentTemplate initialization="https://cdn/init.mp4"/></Representation>
            </AdaptationSet></Period></MPD>"#;
        let source = ManifestEnvelope::new(MimeKind::SegmentedXml, mpd.to_vec())
            .decode()
            .unwrap();
        let dir = TempDir::new().unwrap();
        let assembler = Assembler::with_defaults(HttpClient::new()).with_temp_root(dir.path());

        let result = assembler
            .assemble_preview(&source, &dir.path().join("p"))
            .await;
        assert!(matches!(result, Err(AssembleError::NoMediaSegments)));
        assert!(!dir.path().join("p.m4a").exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_outcome_path_and_degraded() {
        let direct = AssemblyOutcome::Direct {
            url: "https://cdn/a.flac".to_string(),
        };
        assert!(direct.path().is_none());
        assert!(!direct.is_degraded());

        let degraded = AssemblyOutcome::Unremuxed {
            path: PathBuf::from("x.mp4"),
            reason: RemuxError::ToolFailed {
                status: "exit status: 1".to_string(),
                stderr: String::new(),
            },
        };
        assert_eq!(degraded.path(), Some(Path::new("x.mp4")));
        assert!(degraded.is_degraded());
    }
}
