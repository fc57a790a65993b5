//! Segment transfer, reassembly and remux.
//!
//! This module turns a decoded stream source into a playable file:
//! segments are streamed to a private scratch directory, concatenated in
//! order and handed to `ffmpeg` for a stream-copy remux.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use trackfetch_core::codec::ContainerKind;
//! use trackfetch_core::download::{Assembler, HttpClient, RetryPolicy};
//! use trackfetch_core::manifest::StreamSource;
//!
//! # async fn example(source: StreamSource) -> Result<(), Box<dyn std::error::Error>> {
//! let assembler = Assembler::new(HttpClient::new(), RetryPolicy::default(), 4)?;
//! let outcome = assembler
//!     .assemble(&source, ContainerKind::Flac, Path::new("./music/12345"))
//!     .await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

mod assembler;
mod client;
pub mod constants;
mod error;
mod remux;
mod retry;

pub use assembler::{Assembler, AssemblyOutcome, append_extension};
pub use client::HttpClient;
pub use constants::{DEFAULT_SEGMENT_CONCURRENCY, MAX_SEGMENT_CONCURRENCY};
pub use error::{AssembleError, DownloadError};
pub use remux::{RemuxError, Remuxer, build_remux_args, locate_ffmpeg};
pub use retry::{
    DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error,
    parse_retry_after, retry_after_hint,
};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
