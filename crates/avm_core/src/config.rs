//! Runtime configuration for the AVM store.
//!
//! # Responsibility
//! - Carry tunables shared by connection bootstrap, repositories and services.
//! - Load configuration from JSON with per-field defaults.
//!
//! # Invariants
//! - Missing fields fall back to defaults; unknown fields are rejected.
//! - The name policy derived from one config must be used for every
//!   repository bound to the same database, or name keys drift.

use crate::names::NamePolicy;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_CONTENT_SCAN_BATCH_SIZE: u32 = 500;
const DEFAULT_ORPHAN_BATCH_SIZE: u32 = 1_000;

/// Errors raised while loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read avm config: {err}"),
            Self::Parse(err) => write!(f, "failed to parse avm config: {err}"),
            Self::Invalid(message) => write!(f, "invalid avm config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

/// AVM store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AvmConfig {
    /// Fold child and store names to lowercase before any comparison.
    pub case_insensitive_names: bool,
    /// SQLite busy timeout applied to every opened connection.
    pub busy_timeout_ms: u64,
    /// Rows fetched per page by content locator scans.
    pub content_scan_batch_size: u32,
    /// Maximum orphans handled per reaper pass.
    pub orphan_batch_size: u32,
}

impl Default for AvmConfig {
    fn default() -> Self {
        Self {
            case_insensitive_names: true,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            content_scan_batch_size: DEFAULT_CONTENT_SCAN_BATCH_SIZE,
            orphan_batch_size: DEFAULT_ORPHAN_BATCH_SIZE,
        }
    }
}

impl AvmConfig {
    /// Parses configuration from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_json_str(&raw)
    }

    /// Name normalization policy selected by this configuration.
    pub fn name_policy(&self) -> NamePolicy {
        if self.case_insensitive_names {
            NamePolicy::CaseInsensitive
        } else {
            NamePolicy::CaseSensitive
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.content_scan_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "content_scan_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.orphan_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "orphan_batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
