//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;
use trackfetch_core::format::QualityTier;

/// Resolve, fetch and reassemble tracks from a tiered streaming catalogue.
///
/// For every track id the best allowed format is selected, its manifest is
/// fetched and decoded, and the segments are concatenated and remuxed into
/// the codec's native container.
#[derive(Parser, Debug)]
#[command(name = "trackfetch")]
#[command(author, version, about)]
pub struct Args {
    /// Track ids to fetch
    #[arg(value_name = "TRACK_ID", required = true)]
    pub track_ids: Vec<String>,

    /// Requested quality ceiling (minimum, low, medium, high, lossless, hifi)
    #[arg(short = 'Q', long, default_value = "lossless")]
    pub quality: QualityTier,

    /// Comma-separated capability tags; skips the backend capability lookup
    #[arg(long, value_delimiter = ',', value_name = "TAG,...")]
    pub tags: Option<Vec<String>>,

    /// Directory for finished files (default: config `output_dir`, else current directory)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Print the resolution for each track without downloading
    #[arg(long)]
    pub dry_run: bool,

    /// Fetch a short low-quality preview instead of the full track
    #[arg(long)]
    pub preview: bool,

    /// Tracks processed in parallel (1-16)
    #[arg(short = 'c', long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub concurrency: u8,

    /// Segments fetched in parallel per track (1-16)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub segment_concurrency: Option<u8>,

    /// Maximum retry attempts per segment for transient failures (0-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: Option<u8>,

    /// Config file (default: $XDG_CONFIG_HOME/trackfetch/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
