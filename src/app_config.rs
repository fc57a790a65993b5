//! Configuration file loading.
//!
//! The file is a small `key = value` subset of TOML: double-quoted strings,
//! `true`/`false`, non-negative integers and `#` comments.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use trackfetch_core::download::MAX_SEGMENT_CONCURRENCY;
use url::Url;

/// Values read from the config file. `None` means "not set".
#[derive(Clone, Default)]
pub struct FileConfig {
    /// Allow spatial codecs (E-AC-3, AC-4, MPEG-H).
    pub spatial_codecs: Option<bool>,
    /// Keep proprietary codecs instead of re-fetching at lossless.
    pub proprietary_codecs: Option<bool>,
    /// Prefer AC-4 over E-AC-3 for object-based spatial mixes.
    pub prefer_ac4: Option<bool>,
    /// Probe MQA streams for their original sample rate.
    pub fix_mqa: Option<bool>,
    pub output_dir: Option<PathBuf>,
    /// Root for per-track scratch directories.
    pub temp_dir: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
    pub segment_concurrency: Option<u8>,
    pub max_retries: Option<u8>,
    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    pub api_base_url: Option<String>,
    pub country_code: Option<String>,
    pub tv_token: Option<String>,
    pub mobile_token: Option<String>,
    pub mobile_atmos_token: Option<String>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(value) = self.segment_concurrency {
            let max = MAX_SEGMENT_CONCURRENCY;
            if !(1..=max).contains(&usize::from(value)) {
                bail!(
                    "Invalid config value for `segment_concurrency`: {value}. Expected range: 1..={max}"
                );
            }
        }

        if let Some(value) = self.max_retries
            && value > 10
        {
            bail!("Invalid config value for `max_retries`: {value}. Expected range: 0..=10");
        }

        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;

        if let Some(url) = &self.api_base_url
            && Url::parse(url).is_err()
        {
            bail!("Invalid config value for `api_base_url`: '{url}' is not a URL");
        }

        if let Some(code) = &self.country_code
            && !(code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()))
        {
            bail!("Invalid config value for `country_code`: '{code}'. Expected two letters");
        }

        Ok(())
    }
}

impl fmt::Debug for FileConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |token: &Option<String>| token.as_ref().map(|_| "<redacted>");
        f.debug_struct("FileConfig")
            .field("spatial_codecs", &self.spatial_codecs)
            .field("proprietary_codecs", &self.proprietary_codecs)
            .field("prefer_ac4", &self.prefer_ac4)
            .field("fix_mqa", &self.fix_mqa)
            .field("output_dir", &self.output_dir)
            .field("temp_dir", &self.temp_dir)
            .field("ffmpeg_path", &self.ffmpeg_path)
            .field("segment_concurrency", &self.segment_concurrency)
            .field("max_retries", &self.max_retries)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("read_timeout_secs", &self.read_timeout_secs)
            .field("api_base_url", &self.api_base_url)
            .field("country_code", &self.country_code)
            .field("tv_token", &redact(&self.tv_token))
            .field("mobile_token", &redact(&self.mobile_token))
            .field("mobile_atmos_token", &redact(&self.mobile_atmos_token))
            .finish()
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Path that was (or would have been) read.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/trackfetch/config.toml`
/// 2. `$HOME/.config/trackfetch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("trackfetch")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("trackfetch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file.
///
/// An explicit path must exist; the default path is optional.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
        });
    }

    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(load_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let line_number = line_index + 1;

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_number}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let context = || format!("Invalid `{key}` value on line {line_number}");

        match key {
            "spatial_codecs" => cfg.spatial_codecs = Some(parse_boolean(value).with_context(context)?),
            "proprietary_codecs" => {
                cfg.proprietary_codecs = Some(parse_boolean(value).with_context(context)?);
            }
            "prefer_ac4" => cfg.prefer_ac4 = Some(parse_boolean(value).with_context(context)?),
            "fix_mqa" => cfg.fix_mqa = Some(parse_boolean(value).with_context(context)?),
            "output_dir" => {
                cfg.output_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(context)?,
                ));
            }
            "temp_dir" => {
                cfg.temp_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(context)?,
                ));
            }
            "ffmpeg_path" => {
                cfg.ffmpeg_path = Some(PathBuf::from(
                    parse_string_literal(value).with_context(context)?,
                ));
            }
            "segment_concurrency" => {
                cfg.segment_concurrency = Some(parse_integer_u8(value).with_context(context)?);
            }
            "max_retries" => cfg.max_retries = Some(parse_integer_u8(value).with_context(context)?),
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "api_base_url" => {
                cfg.api_base_url = Some(parse_string_literal(value).with_context(context)?);
            }
            "country_code" => {
                cfg.country_code = Some(parse_string_literal(value).with_context(context)?);
            }
            "tv_token" => cfg.tv_token = Some(parse_string_literal(value).with_context(context)?),
            "mobile_token" => {
                cfg.mobile_token = Some(parse_string_literal(value).with_context(context)?);
            }
            "mobile_atmos_token" => {
                cfg.mobile_atmos_token = Some(parse_string_literal(value).with_context(context)?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_number}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u8(raw_value: &str) -> Result<u8> {
    let value = parse_integer_u64(raw_value)?;
    u8::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u8"))
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_full_file() {
        let cfg = parse_config_str(
            r#"
# codec preferences
spatial_codecs = false
proprietary_codecs = true
prefer_ac4 = true   # newer codec
fix_mqa = false

output_dir = "/music"
temp_dir = "/tmp/trackfetch"
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"
segment_concurrency = 8
max_retries = 5
connect_timeout_secs = 10
read_timeout_secs = 120

api_base_url = "https://api.example/v1/"
country_code = "DE"
tv_token = "tv#secret"
mobile_token = "m"
"#,
        )
        .unwrap();
        assert_eq!(cfg.spatial_codecs, Some(false));
        assert_eq!(cfg.proprietary_codecs, Some(true));
        assert_eq!(cfg.prefer_ac4, Some(true));
        assert_eq!(cfg.fix_mqa, Some(false));
        assert_eq!(cfg.output_dir, Some(PathBuf::from("/music")));
        assert_eq!(cfg.segment_concurrency, Some(8));
        assert_eq!(cfg.max_retries, Some(5));
        assert_eq!(cfg.read_timeout_secs, Some(120));
        assert_eq!(cfg.country_code.as_deref(), Some("DE"));
        assert_eq!(cfg.tv_token.as_deref(), Some("tv#secret"));
        assert!(cfg.mobile_atmos_token.is_none());
    }

    #[test]
    fn test_parse_config_rejects_invalid_segment_concurrency() {
        for raw in ["segment_concurrency = 0", "segment_concurrency = 17"] {
            let err = parse_config_str(raw).unwrap_err();
            assert!(err.to_string().contains("segment_concurrency"), "{raw}");
        }
    }

    #[test]
    fn test_parse_config_rejects_invalid_max_retries() {
        let err = parse_config_str("max_retries = 11").unwrap_err();
        assert!(err.to_string().contains("max_retries"));
    }

    #[test]
    fn test_parse_config_rejects_invalid_timeout_value() {
        let err = parse_config_str("connect_timeout_secs = 0").unwrap_err();
        assert!(err.to_string().contains("connect_timeout_secs"));
    }

    #[test]
    fn test_parse_config_rejects_bad_country_and_url() {
        let err = parse_config_str(r#"country_code = "USA""#).unwrap_err();
        assert!(err.to_string().contains("country_code"));
        let err = parse_config_str(r#"api_base_url = "not a url""#).unwrap_err();
        assert!(err.to_string().contains("api_base_url"));
    }

    #[test]
    fn test_parse_config_rejects_invalid_boolean() {
        let err = parse_config_str("fix_mqa = yes").unwrap_err();
        assert!(format!("{err:#}").contains("fix_mqa"));
    }

    #[test]
    fn test_parse_config_rejects_unquoted_string() {
        let err = parse_config_str("output_dir = /music").unwrap_err();
        assert!(err.to_string().contains("output_dir"));
    }

    #[test]
    fn test_parse_config_rejects_unknown_keys() {
        let err = parse_config_str("unknown_key = 123").unwrap_err();
        assert!(err.to_string().contains("Unknown configuration key"));
        assert!(err.to_string().contains("unknown_key"));
    }

    #[test]
    fn test_parse_config_rejects_missing_equals() {
        let err = parse_config_str("fix_mqa").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let cfg = parse_config_str(r#"tv_token = "abc123""#).unwrap();
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("abc123"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_load_config_explicit_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_retries = 2\n").unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.path.as_deref(), Some(path.as_path()));
        assert_eq!(loaded.config.unwrap().max_retries, Some(2));

        let missing = dir.path().join("missing.toml");
        assert!(load_config(Some(&missing)).is_err());
    }
}
