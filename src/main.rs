//! CLI entry point for trackfetch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures_util::{StreamExt, stream};
use tracing::{debug, info, warn};
use trackfetch_core::backend::{DEFAULT_API_BASE_URL, HttpBackendSession, SessionPool};
use trackfetch_core::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use trackfetch_core::codec::Codec;
use trackfetch_core::download::{
    Assembler, AssemblyOutcome, DEFAULT_MAX_RETRIES, DEFAULT_SEGMENT_CONCURRENCY, HttpClient,
    Remuxer, RetryPolicy, append_extension,
};
use trackfetch_core::format::{CapabilityTags, CodecPreferences, QualityTier, SessionKind};
use trackfetch_core::manifest::{Delivery, StreamSource};
use trackfetch_core::resolver::{CapabilityCache, ResolvedTrack, TrackResolver};

mod app_config;
mod cli;
mod progress;

use app_config::FileConfig;
use cli::Args;
use progress::BatchProgress;

const DEFAULT_COUNTRY_CODE: &str = "US";

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    init_tracing(&args);
    debug!(?args, "CLI arguments parsed");

    let loaded = app_config::load_config(args.config.as_deref())?;
    debug!(
        path = ?loaded.path,
        loaded_from_file = loaded.config.is_some(),
        "configuration resolved"
    );
    let config = loaded.config.unwrap_or_default();
    debug!(?config, "configuration loaded");

    let http = HttpClient::new_with_timeouts(
        config.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
        config.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS),
    );

    let sessions = build_session_pool(&config, &http)?;
    if sessions.is_empty() {
        bail!(
            "No backend session configured\n  Suggestion: set `tv_token`, `mobile_token` or `mobile_atmos_token` in the config file"
        );
    }
    info!(sessions = ?sessions.available_kinds(), "trackfetch starting");

    let resolver = TrackResolver::new(sessions, codec_preferences(&config), http.clone())
        .with_fix_mqa(config.fix_mqa.unwrap_or(true));

    let max_retries = args
        .max_retries
        .or(config.max_retries)
        .map_or(DEFAULT_MAX_RETRIES, u32::from);
    let segment_concurrency = args
        .segment_concurrency
        .or(config.segment_concurrency)
        .map_or(DEFAULT_SEGMENT_CONCURRENCY, usize::from);
    let mut assembler = Assembler::new(
        http.clone(),
        RetryPolicy::with_max_attempts(max_retries),
        segment_concurrency,
    )?
    .with_remuxer(Remuxer::locate(config.ffmpeg_path.as_deref()));
    if let Some(temp_dir) = &config.temp_dir {
        assembler = assembler.with_temp_root(temp_dir);
    }

    let batch = Batch {
        resolver,
        assembler,
        http,
        cache: CapabilityCache::new(),
        output_dir: args
            .output_dir
            .clone()
            .or_else(|| config.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from(".")),
        tag_override: args.tags.as_deref().map(parse_tags),
        quality: args.quality,
        preview: args.preview,
        dry_run: args.dry_run,
        progress: BatchProgress::new(!args.quiet && !args.dry_run, args.track_ids.len()),
    };

    let batch_ref = &batch;
    let results: Vec<(&String, Result<TrackStatus>)> = stream::iter(&args.track_ids)
        .map(|track_id| async move {
            let result = batch_ref.process(track_id).await;
            batch_ref.progress.track_finished(track_id);
            (track_id, result)
        })
        .buffer_unordered(usize::from(args.concurrency))
        .collect()
        .await;
    batch.progress.finish();

    let mut failed = 0usize;
    for (track_id, result) in &results {
        match result {
            Ok(TrackStatus::Saved | TrackStatus::Described) => {}
            Ok(TrackStatus::Unavailable) => failed += 1,
            Err(error) => {
                failed += 1;
                warn!(track_id = %track_id, error = %format!("{error:#}"), "track failed");
            }
        }
    }

    info!(
        completed = results.len() - failed,
        failed,
        total = results.len(),
        "Batch complete"
    );

    if failed == results.len() {
        bail!("All {failed} track(s) failed");
    }
    Ok(())
}

/// Installs the tracing subscriber.
///
/// Priority: `RUST_LOG` env var > quiet flag > verbose flag > default (info).
fn init_tracing(args: &Args) {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn codec_preferences(config: &FileConfig) -> CodecPreferences {
    let defaults = CodecPreferences::default();
    CodecPreferences {
        allow_spatial_codecs: config
            .spatial_codecs
            .unwrap_or(defaults.allow_spatial_codecs),
        allow_proprietary_codecs: config
            .proprietary_codecs
            .unwrap_or(defaults.allow_proprietary_codecs),
        prefer_secondary_spatial_variant: config
            .prefer_ac4
            .unwrap_or(defaults.prefer_secondary_spatial_variant),
    }
}

/// One session per configured token.
fn build_session_pool(config: &FileConfig, http: &HttpClient) -> Result<SessionPool> {
    let base_url = config
        .api_base_url
        .as_deref()
        .unwrap_or(DEFAULT_API_BASE_URL);
    let country_code = config
        .country_code
        .as_deref()
        .unwrap_or(DEFAULT_COUNTRY_CODE);

    let mut pool = SessionPool::new();
    for (kind, token) in [
        (SessionKind::Tv, &config.tv_token),
        (SessionKind::MobileDefault, &config.mobile_token),
        (SessionKind::MobileAtmos, &config.mobile_atmos_token),
    ] {
        let Some(token) = token else {
            debug!(session = %kind, "no token configured, session unavailable");
            continue;
        };
        let session = HttpBackendSession::new(
            kind,
            http.inner().clone(),
            base_url,
            token.clone(),
            country_code,
        )
        .with_context(|| format!("Failed to create '{kind}' session"))?;
        pool.insert(Arc::new(session));
    }
    Ok(pool)
}

fn parse_tags(raw: &[String]) -> CapabilityTags {
    raw.iter()
        .map(|tag| tag.trim().to_ascii_uppercase())
        .filter(|tag| !tag.is_empty())
        .collect()
}

enum TrackStatus {
    Saved,
    Described,
    Unavailable,
}

struct Batch {
    resolver: TrackResolver,
    assembler: Assembler,
    http: HttpClient,
    cache: CapabilityCache,
    output_dir: PathBuf,
    tag_override: Option<CapabilityTags>,
    quality: QualityTier,
    preview: bool,
    dry_run: bool,
    progress: BatchProgress,
}

impl Batch {
    #[tracing::instrument(skip(self))]
    async fn process(&self, track_id: &str) -> Result<TrackStatus> {
        let tags = match &self.tag_override {
            Some(tags) => tags.clone(),
            None => {
                self.resolver
                    .lookup_capabilities(track_id, &self.cache)
                    .await?
                    .tags
            }
        };

        let resolved = if self.preview {
            self.resolver.resolve_preview(track_id, &tags).await?
        } else {
            self.resolver
                .resolve_track(track_id, self.quality, &tags)
                .await?
        };

        let Some(source) = &resolved.source else {
            debug!(track_id, error = ?resolved.error, "track unavailable");
            return Ok(TrackStatus::Unavailable);
        };

        if self.dry_run {
            println!("{}", describe(&resolved, source));
            return Ok(TrackStatus::Described);
        }

        let stem = self.output_dir.join(track_id);
        let outcome = if self.preview {
            self.assembler.assemble_preview(source, &stem).await?
        } else {
            self.assembler
                .assemble(source, resolved.codec.container(), &stem)
                .await?
        };

        match outcome {
            AssemblyOutcome::Direct { url } => {
                let path = direct_output_path(&stem, resolved.codec);
                self.save_direct(&url, &path).await?;
                info!(track_id, path = %path.display(), "track saved");
            }
            AssemblyOutcome::Remuxed { path } | AssemblyOutcome::Preview { path } => {
                info!(track_id, path = %path.display(), "track saved");
            }
            AssemblyOutcome::Unremuxed { path, reason } => {
                warn!(
                    track_id,
                    path = %path.display(),
                    reason = %reason,
                    "track saved without remux"
                );
            }
        }
        Ok(TrackStatus::Saved)
    }

    async fn save_direct(&self, url: &str, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("Failed to create '{}'", self.output_dir.display()))?;
        let bytes = self.http.download_to_path(url, path).await?;
        debug!(bytes, path = %path.display(), "direct stream saved");
        Ok(())
    }
}

/// Where a direct stream is saved; same naming as assembled outputs.
fn direct_output_path(stem: &Path, codec: Codec) -> PathBuf {
    append_extension(stem, codec.container().extension())
}

/// One-line summary printed in dry-run mode.
fn describe(resolved: &ResolvedTrack, source: &StreamSource) -> String {
    let delivery = match source.delivery() {
        Delivery::Segmented => "segmented",
        Delivery::Direct => "direct",
    };
    let mut line = format!(
        "{}\tformat={}\tsession={}\tquality={}\tcodec={}\tdelivery={}\tsegments={}",
        resolved.track_id,
        resolved.selection.format,
        resolved.selection.session,
        resolved.selection.quality,
        resolved.codec,
        delivery,
        source.primary().segment_urls.len(),
    );
    if let Some(bit_depth) = resolved.profile.bit_depth {
        line.push_str(&format!("\tbit_depth={bit_depth}"));
    }
    line.push_str(&format!("\tsample_rate={}", resolved.profile.sample_rate_hz));
    if resolved.fell_back {
        line.push_str("\tfallback=lossless");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags_normalizes() {
        let tags = parse_tags(&[
            " dolby_atmos".to_string(),
            String::new(),
            "HIRES_LOSSLESS".to_string(),
        ]);
        assert!(tags.has_object_spatial());
        assert!(tags.has_hires_lossless());
        assert_eq!(tags.iter().count(), 2);
    }

    #[test]
    fn test_direct_output_keeps_dotted_track_id() {
        let stem = Path::new("out").join("v1.5");
        assert_eq!(
            direct_output_path(&stem, Codec::Flac),
            Path::new("out").join("v1.5.flac")
        );
        assert_eq!(
            direct_output_path(&stem, Codec::Aac),
            Path::new("out").join("v1.5.m4a")
        );
    }

    #[test]
    fn test_codec_preferences_from_config() {
        let config = FileConfig {
            spatial_codecs: Some(false),
            prefer_ac4: Some(true),
            ..FileConfig::default()
        };
        let prefs = codec_preferences(&config);
        assert!(!prefs.allow_spatial_codecs);
        assert!(!prefs.allow_proprietary_codecs);
        assert!(prefs.prefer_secondary_spatial_variant);
    }

    #[test]
    fn test_session_pool_follows_configured_tokens() {
        let config = FileConfig {
            tv_token: Some("tv".to_string()),
            mobile_atmos_token: Some("atmos".to_string()),
            ..FileConfig::default()
        };
        let pool = build_session_pool(&config, &HttpClient::new()).unwrap_or_default();
        assert_eq!(
            pool.available_kinds(),
            vec![SessionKind::Tv, SessionKind::MobileAtmos]
        );
    }
}
