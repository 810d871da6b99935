//! Export configuration.
//!
//! Loads `config.toml` from a directory, deep-merges it over the stock
//! defaults and validates the result. Command-line flags are applied on top
//! by the binary.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [book]
//! title = "To Be Read"
//! creator = "Tsundoku"
//! language = "en"
//!
//! [images]
//! embed = true               # Fetch and package article images
//! timeout_secs = 20          # Per-request timeout
//! # user_agent = "tsundoku-epub/<version>"
//! max_image_bytes = 15728640 # Larger images are left remote
//!
//! [cover]
//! quality = 92               # JPEG quality (1-100)
//! # seed = 42                # Fixed palette; omit for a random one
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse. Override just the values you want:
//!
//! ```toml
//! [book]
//! title = "Weekend Reading"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::cover::DEFAULT_QUALITY;
use crate::epub::{DEFAULT_CREATOR, DEFAULT_LANGUAGE, DEFAULT_TITLE, ExportOptions};
use crate::images::HttpOptions;
use crate::images::fetch::{DEFAULT_MAX_IMAGE_BYTES, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Everything `config.toml` can set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    /// Book-level metadata.
    pub book: BookConfig,
    /// Image fetching and embedding.
    pub images: ImagesConfig,
    /// Generated cover.
    pub cover: CoverConfig,
}

impl ExportConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.cover.quality) {
            return Err(ConfigError::Validation(
                "cover.quality must be 1-100".into(),
            ));
        }
        if self.images.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "images.timeout_secs must be greater than zero".into(),
            ));
        }
        if self.images.max_image_bytes == 0 {
            return Err(ConfigError::Validation(
                "images.max_image_bytes must be greater than zero".into(),
            ));
        }
        if self.book.language.trim().is_empty() {
            return Err(ConfigError::Validation(
                "book.language must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Export options before any command-line overrides.
    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            title: self.book.title.clone(),
            creator: self.book.creator.clone(),
            exported_at: None,
            language: self.book.language.clone(),
            cover_seed: self.cover.seed,
            cover_quality: self.cover.quality,
            embed_images: self.images.embed,
            max_image_bytes: self.images.max_image_bytes,
        }
    }

    pub fn http_options(&self) -> HttpOptions {
        HttpOptions {
            user_agent: self.images.user_agent.clone(),
            timeout: Duration::from_secs(self.images.timeout_secs),
            max_bytes: self.images.max_image_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BookConfig {
    pub title: String,
    pub creator: String,
    /// BCP 47 tag written to the package and every chapter.
    pub language: String,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            creator: DEFAULT_CREATOR.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Fetch and package images; when false, tags keep their remote URLs.
    pub embed: bool,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Images larger than this are left remote.
    pub max_image_bytes: usize,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            embed: true,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoverConfig {
    /// JPEG quality, 1-100.
    pub quality: u8,
    /// Fixed palette seed. Omitted means a fresh palette every export.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for CoverConfig {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            seed: None,
        }
    }
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged onto.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(ExportConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the directory has no `config.toml`.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join("config.toml");
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    Ok(Some(toml::from_str(&content)?))
}

/// Merge an optional overlay onto the stock defaults, then deserialize and
/// validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<ExportConfig, ConfigError> {
    let base = stock_defaults_value();
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ExportConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `config.toml` in `dir`, or the stock defaults when
/// there is none.
pub fn load_config(dir: &Path) -> Result<ExportConfig, ConfigError> {
    resolve_config(load_raw_config(dir)?)
}

/// A fully commented stock `config.toml`, printed by `gen-config`.
pub fn stock_config_toml() -> &'static str {
    r##"# tsundoku-epub configuration
# ===========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Command-line flags override them.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Book metadata
# ---------------------------------------------------------------------------
[book]
# Title on the cover, in the package metadata and in the output filename.
title = "To Be Read"

# Author shown on the cover and written as dc:creator.
creator = "Tsundoku"

# Language tag for the package and every chapter.
language = "en"

# ---------------------------------------------------------------------------
# Article images
# ---------------------------------------------------------------------------
[images]
# Download images and package them inside the book. When false, image tags
# keep their remote URLs and readers will need a connection to show them.
embed = true

# Per-request timeout in seconds.
timeout_secs = 20

# User-Agent header sent with image requests.
# Defaults to "tsundoku-epub/<version>".
# user_agent = "Mozilla/5.0 (X11; Linux x86_64)"

# Images larger than this many bytes are left remote (default 15 MiB).
max_image_bytes = 15728640

# ---------------------------------------------------------------------------
# Cover
# ---------------------------------------------------------------------------
[cover]
# JPEG quality (1 = smallest, 100 = best).
quality = 92

# Seed for the cover palette. Omit for a different cover on every export.
# seed = 42
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) {
        fs::write(dir.path().join("config.toml"), content).unwrap();
    }

    // =========================================================================
    // Defaults and parsing
    // =========================================================================

    #[test]
    fn default_config_values() {
        let config = ExportConfig::default();
        assert_eq!(config.book.title, "To Be Read");
        assert_eq!(config.book.creator, "Tsundoku");
        assert_eq!(config.book.language, "en");
        assert!(config.images.embed);
        assert_eq!(config.images.timeout_secs, 20);
        assert_eq!(config.cover.quality, 92);
        assert_eq!(config.cover.seed, None);
    }

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config, ExportConfig::default());
    }

    #[test]
    fn partial_override_keeps_defaults() {
        let tmp = TempDir::new().unwrap();
        write_config(
            &tmp,
            r#"
[book]
title = "Weekend Reading"

[cover]
seed = 42
"#,
        );
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.book.title, "Weekend Reading");
        assert_eq!(config.book.creator, "Tsundoku");
        assert_eq!(config.cover.seed, Some(42));
        assert_eq!(config.cover.quality, 92);
        assert!(config.images.embed);
    }

    #[test]
    fn invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        write_config(&tmp, "[book\ntitle = ");
        assert!(matches!(load_config(tmp.path()), Err(ConfigError::Toml(_))));
    }

    // =========================================================================
    // Unknown keys
    // =========================================================================

    #[test]
    fn unknown_key_rejected() {
        let tmp = TempDir::new().unwrap();
        write_config(&tmp, "[book]\ntitel = \"typo\"\n");
        assert!(load_config(tmp.path()).is_err());
    }

    #[test]
    fn unknown_section_rejected() {
        let tmp = TempDir::new().unwrap();
        write_config(&tmp, "[theme]\ncolor = \"red\"\n");
        assert!(load_config(tmp.path()).is_err());
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn validate_default_config_passes() {
        assert!(ExportConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_quality_bounds() {
        let mut config = ExportConfig::default();
        config.cover.quality = 100;
        assert!(config.validate().is_ok());
        config.cover.quality = 1;
        assert!(config.validate().is_ok());
        config.cover.quality = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn load_config_rejects_invalid_quality() {
        let tmp = TempDir::new().unwrap();
        write_config(&tmp, "[cover]\nquality = 101\n");
        let err = load_config(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("cover.quality"));
    }

    #[test]
    fn validate_zero_timeout() {
        let mut config = ExportConfig::default();
        config.images.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    // =========================================================================
    // Merging
    // =========================================================================

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str("a = 1\nb = 2").unwrap();
        let overlay: toml::Value = toml::from_str("b = 3").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("a").unwrap().as_integer(), Some(1));
        assert_eq!(merged.get("b").unwrap().as_integer(), Some(3));
    }

    #[test]
    fn merge_toml_nested_tables() {
        let base: toml::Value = toml::from_str("[x]\na = 1\nb = 2").unwrap();
        let overlay: toml::Value = toml::from_str("[x]\nb = 5").unwrap();
        let merged = merge_toml(base, overlay);
        let x = merged.get("x").unwrap();
        assert_eq!(x.get("a").unwrap().as_integer(), Some(1));
        assert_eq!(x.get("b").unwrap().as_integer(), Some(5));
    }

    // =========================================================================
    // Conversions
    // =========================================================================

    #[test]
    fn export_options_follow_config() {
        let mut config = ExportConfig::default();
        config.book.title = "Queue".into();
        config.images.embed = false;
        config.cover.seed = Some(9);
        let options = config.export_options();
        assert_eq!(options.title, "Queue");
        assert!(!options.embed_images);
        assert_eq!(options.cover_seed, Some(9));
        assert_eq!(options.exported_at, None);
    }

    #[test]
    fn http_options_follow_config() {
        let mut config = ExportConfig::default();
        config.images.timeout_secs = 5;
        let http = config.http_options();
        assert_eq!(http.timeout, Duration::from_secs(5));
        assert_eq!(http.max_bytes, DEFAULT_MAX_IMAGE_BYTES);
    }

    // =========================================================================
    // stock_config_toml
    // =========================================================================

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: ExportConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, ExportConfig::default());
    }

    #[test]
    fn stock_config_toml_contains_all_sections() {
        let content = stock_config_toml();
        assert!(content.contains("[book]"));
        assert!(content.contains("[images]"));
        assert!(content.contains("[cover]"));
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let val = stock_defaults_value();
        assert!(val.get("book").is_some());
        assert!(val.get("images").is_some());
        assert!(val.get("cover").is_some());
    }
}
