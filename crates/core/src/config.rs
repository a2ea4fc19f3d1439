//! Configuration for the letarette indexer.
//!
//! Loaded from a TOML file; every section has working defaults so a minimal
//! config only needs to name its spaces.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Failed to parse config: {0}")]
  Parse(#[from] toml::de::Error),
  #[error("No spaces configured - at least one index space is required")]
  NoSpaces,
  #[error("Invalid config: {0}")]
  Invalid(String),
}

/// Index process settings: spaces, chunking and pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
  /// Names of the spaces this indexer maintains. Must be non-empty.
  pub spaces: Vec<String>,

  /// How many document ids to request per chunk (the `limit` field of an
  /// index request).
  pub chunk_size: u16,

  /// Cap on concurrently requested documents per space.
  pub max_outstanding: u16,

  /// Minimum period between busy update cycles (milliseconds).
  pub cycle_wait_ms: u64,

  /// Minimum period between cycles when no interests were active
  /// (milliseconds).
  pub empty_cycle_wait_ms: u64,

  /// Deadline for the synchronous index request round trip (milliseconds).
  pub max_interest_wait_ms: u64,

  /// How long a requested document may stay un-served before the whole
  /// in-flight set is reset to pending (milliseconds). 0 disables the
  /// stall timeout.
  pub max_document_wait_ms: u64,
}

impl Default for IndexConfig {
  fn default() -> Self {
    Self {
      spaces: Vec::new(),
      chunk_size: 250,
      max_outstanding: 25,
      cycle_wait_ms: 100,
      empty_cycle_wait_ms: 5000,
      max_interest_wait_ms: 2000,
      max_document_wait_ms: 15000,
    }
  }
}

impl IndexConfig {
  pub fn cycle_wait(&self) -> Duration {
    Duration::from_millis(self.cycle_wait_ms)
  }

  pub fn empty_cycle_wait(&self) -> Duration {
    Duration::from_millis(self.empty_cycle_wait_ms)
  }

  pub fn max_interest_wait(&self) -> Duration {
    Duration::from_millis(self.max_interest_wait_ms)
  }

  /// `None` when the stall timeout is disabled.
  pub fn max_document_wait(&self) -> Option<Duration> {
    if self.max_document_wait_ms == 0 {
      None
    } else {
      Some(Duration::from_millis(self.max_document_wait_ms))
    }
  }
}

/// Message bus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
  /// Bus server URL. Interpreted by the transport implementation.
  pub url: String,

  /// Topic prefix all cluster subjects are derived from.
  pub topic: String,
}

impl Default for BusConfig {
  fn default() -> Self {
    Self {
      url: "nats://localhost:4222".to_string(),
      topic: "leta".to_string(),
    }
  }
}

/// Database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
  /// Path to the SQLite database file.
  pub path: PathBuf,
}

impl Default for DbConfig {
  fn default() -> Self {
    Self {
      path: PathBuf::from("letarette.db"),
    }
  }
}

/// Tokenizer settings applied to the full-text index. Changing these after
/// documents have been indexed requires a rebuild; the store detects the
/// mismatch at open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StemmerSettings {
  pub languages: Vec<String>,
  pub remove_diacritics: bool,
  pub token_characters: String,
  pub separators: String,
}

impl Default for StemmerSettings {
  fn default() -> Self {
    Self {
      languages: vec!["english".to_string()],
      remove_diacritics: true,
      token_characters: String::new(),
      separators: String::new(),
    }
  }
}

/// Letarette indexer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub index: IndexConfig,
  pub bus: BusConfig,
  pub db: DbConfig,
  pub stemmer: StemmerSettings,
}

impl Config {
  /// Load and validate a config file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
  }

  /// Check the invariants startup relies on.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.index.spaces.is_empty() {
      return Err(ConfigError::NoSpaces);
    }
    if self.index.chunk_size == 0 {
      return Err(ConfigError::Invalid("index.chunk_size must be > 0".to_string()));
    }
    if self.index.max_outstanding == 0 {
      return Err(ConfigError::Invalid("index.max_outstanding must be > 0".to_string()));
    }
    if self.bus.topic.is_empty() {
      return Err(ConfigError::Invalid("bus.topic must not be empty".to_string()));
    }
    Ok(())
  }
}
