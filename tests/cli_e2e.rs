//! End-to-end CLI tests for the trackfetch binary.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::PathBuf;

use assert_cmd::Command;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn trackfetch() -> Command {
    let mut cmd = Command::cargo_bin("trackfetch").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

/// Writes a config file pointing the TV session at `server`.
fn write_config(dir: &TempDir, server: &MockServer) -> PathBuf {
    let config = dir.path().join("config.toml");
    std::fs::write(
        &config,
        format!(
            "api_base_url = \"{}/v1\"\ntv_token = \"test-token\" # tv session\ncountry_code = \"US\"\n",
            server.uri()
        ),
    )
    .expect("write config");
    config
}

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    trackfetch()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Resolve, fetch and reassemble"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    trackfetch()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("trackfetch"));
}

/// A track id is required.
#[test]
fn test_binary_without_track_ids_fails() {
    trackfetch()
        .assert()
        .failure()
        .stderr(predicate::str::contains("TRACK_ID"));
}

/// Test that invalid flags cause non-zero exit.
#[test]
fn test_binary_invalid_flag_returns_error() {
    trackfetch()
        .args(["--invalid-flag", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_binary_rejects_unknown_quality() {
    trackfetch()
        .args(["-Q", "ultra", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown quality tier"));
}

#[test]
fn test_binary_without_sessions_fails_with_suggestion() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "# nothing configured\n").unwrap();

    trackfetch()
        .arg("--config")
        .arg(&config)
        .arg("1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No backend session configured"))
        .stderr(predicate::str::contains("tv_token"));
}

#[test]
fn test_binary_missing_explicit_config_fails() {
    let dir = TempDir::new().unwrap();
    trackfetch()
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .arg("1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dry_run_prints_resolution_without_downloading() {
    let server = MockServer::start().await;
    let manifest = json!({
        "mimeType": "audio/flac",
        "codecs": "flac",
        "encryptionType": "NONE",
        "urls": [format!("{}/cdn/1.flac", server.uri())]
    })
    .to_string();
    Mock::given(method("GET"))
        .and(path("/v1/tracks/1/playbackinfopostpaywall"))
        .and(query_param("audioquality", "LOSSLESS"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "audioQuality": "LOSSLESS",
            "audioMode": "STEREO",
            "manifestMimeType": "application/vnd.tidal.bts",
            "manifest": BASE64.encode(manifest)
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cdn/1.flac"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, &server);
    let output = dir.path().join("out");

    trackfetch()
        .arg("--config")
        .arg(&config)
        .arg("--output-dir")
        .arg(&output)
        .args(["--dry-run", "--tags", "LOSSLESS", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1\tformat=direct-lossless"))
        .stdout(predicate::str::contains("session=tv"))
        .stdout(predicate::str::contains("codec=FLAC"))
        .stdout(predicate::str::contains("delivery=direct"))
        .stdout(predicate::str::contains("bit_depth=16"));

    assert!(!output.exists(), "dry run must not create the output directory");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_all_region_locked_tracks_exit_non_zero() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "userMessage": "Asset is not ready for playback"
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, &server);

    trackfetch()
        .arg("--config")
        .arg(&config)
        .args(["--dry-run", "-q", "--tags", "LOSSLESS", "1", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("All 2 track(s) failed"));
}
