//! Trackfetch Core Library
//!
//! Resolves which concrete audio encoding to fetch for a track from a
//! tiered streaming catalogue, decodes the delivery manifest and reassembles
//! its segments into a single playable file.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`codec`] - Codec and container table
//! - [`format`] - Pure format selection from tier, capability tags and preferences
//! - [`manifest`] - Manifest envelope decoding and the segmented (DASH) parser
//! - [`probe`] - Hi-res (MQA) detection on the leading bytes of a FLAC stream
//! - [`backend`] - Backend session contract and its HTTP implementation
//! - [`download`] - Segment transfer, retry, reassembly and remux
//! - [`resolver`] - Resolution orchestration across the modules above

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod codec;
pub mod download;
pub mod format;
pub mod manifest;
pub mod probe;
pub mod resolver;
mod user_agent;

// Re-export commonly used types
pub use backend::{BackendError, BackendSession, HttpBackendSession, SessionPool};
pub use codec::{Codec, ContainerKind};
pub use download::{
    AssembleError, Assembler, AssemblyOutcome, DownloadError, HttpClient, RemuxError, Remuxer,
    RetryPolicy,
};
pub use format::{CapabilityTags, CodecPreferences, Format, QualityTier, Selection, SessionKind};
pub use manifest::{AudioRendition, ManifestEnvelope, ManifestError, StreamSource};
pub use probe::{ProbeResult, probe};
pub use resolver::{AudioProfile, CapabilityCache, ResolveError, ResolvedTrack, TrackResolver};
