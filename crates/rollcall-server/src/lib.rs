//! Configuration and wiring for the `rollcall` server binary.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use chrono::FixedOffset;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState};
use rollcall_engine::{Engine, cache::TtlTable};
use rollcall_store_sqlite::SqliteStore;
use serde::Deserialize;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `rollcall.toml` and
/// `ROLLCALL_*` environment variables (`ROLLCALL_CACHE__IDENTITY` for nested
/// keys).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                String,
  pub port:                u16,
  pub store_path:          PathBuf,
  /// The institution's local time zone as minutes east of UTC.
  pub utc_offset_minutes:  i32,
  /// Period of the background auto-absent sweep. `0` disables it.
  pub sweep_interval_secs: u64,
  pub cache:               CacheConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                "127.0.0.1".into(),
      port:                8080,
      store_path:          PathBuf::from("rollcall.db"),
      utc_offset_minutes:  0,
      sweep_interval_secs: 900,
      cache:               CacheConfig::default(),
    }
  }
}

/// Cache TTLs in seconds per data class.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub identity:    u64,
  pub schedule:    u64,
  pub selections:  u64,
  pub eligibility: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self { identity: 300, schedule: 1800, selections: 300, eligibility: 60 }
  }
}

impl From<CacheConfig> for TtlTable {
  fn from(c: CacheConfig) -> Self {
    Self {
      identity:    Duration::from_secs(c.identity),
      schedule:    Duration::from_secs(c.schedule),
      selections:  Duration::from_secs(c.selections),
      eligibility: Duration::from_secs(c.eligibility),
    }
  }
}

impl ServerConfig {
  /// Read `path` (optional) overlaid with the environment.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    Self::from_builder(Config::builder().add_source(File::from(path).required(false)))
  }

  fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
    builder
      .add_source(
        Environment::with_prefix("ROLLCALL")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()?
      .try_deserialize()
  }

  /// The configured local offset, or `None` when out of range.
  pub fn offset(&self) -> Option<FixedOffset> {
    FixedOffset::east_opt(self.utc_offset_minutes.checked_mul(60)?)
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn sweep_interval(&self) -> Option<Duration> {
    (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
  }
}

// ─── Wiring ───────────────────────────────────────────────────────────────────

/// An engine over `store` configured from `config`.
pub fn build_engine(
  store: SqliteStore,
  config: &ServerConfig,
  offset: FixedOffset,
) -> Engine<SqliteStore> {
  Engine::new(store).with_offset(offset).with_ttl(config.cache.into())
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
