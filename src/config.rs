//! Configuration file parser for ~/.config/feedmux/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{Source, SortOrder, SourceKind, MAX_FEED_SIZE};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// A value parsed but is unusable.
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory file sources are resolved against.
    /// `None` means `$HOME/feedmux/xml`.
    pub storage_root: Option<PathBuf>,

    /// Deadline for a whole fetch batch, in seconds. Must be non-zero.
    pub deadline_secs: u64,

    /// Date order of the aggregated feed.
    pub sort_order: SortOrder,

    /// Largest accepted feed document, in bytes.
    pub max_feed_bytes: usize,

    /// Sources registered at startup, in order.
    pub sources: Vec<SourceEntry>,
}

/// One `[[sources]]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceEntry {
    pub path: String,
    /// Display title; defaults to the path.
    #[serde(default)]
    pub title: Option<String>,
    /// Explicit kind; guessed from the path when absent.
    #[serde(default)]
    pub kind: Option<SourceKind>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_root: None,
            deadline_secs: 3,
            sort_order: SortOrder::Descending,
            max_feed_bytes: MAX_FEED_SIZE,
            sources: Vec::new(),
        }
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    /// - Zero deadline or size limit → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading to prevent memory exhaustion
        // from a maliciously large or corrupted config file.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse the TOML content first as a raw table to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "storage_root",
                "deadline_secs",
                "sort_order",
                "max_feed_bytes",
                "sources",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            sources = config.sources.len(),
            deadline_secs = config.deadline_secs,
            "Loaded configuration"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.deadline_secs == 0 {
            return Err(ConfigError::Invalid("deadline_secs must be at least 1".into()));
        }
        if self.max_feed_bytes == 0 {
            return Err(ConfigError::Invalid("max_feed_bytes must be at least 1".into()));
        }
        Ok(())
    }

    /// Batch deadline as a [`Duration`].
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    /// Configured storage root, or `$HOME/feedmux/xml`.
    pub fn storage_root(&self) -> PathBuf {
        match &self.storage_root {
            Some(root) => root.clone(),
            None => {
                let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
                home.join("feedmux").join("xml")
            }
        }
    }

    /// The configured sources as registry records.
    pub fn sources(&self) -> Vec<Source> {
        self.sources
            .iter()
            .map(|entry| {
                let title = entry.title.clone().unwrap_or_else(|| entry.path.clone());
                match entry.kind {
                    Some(kind) => Source::new(entry.path.clone(), title, kind),
                    None => Source::guess(entry.path.clone(), title),
                }
            })
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
