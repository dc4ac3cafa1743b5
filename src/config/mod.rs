mod timeouts;

pub use timeouts::TimeoutsConfig;

use figment::providers::{Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::LazyLock;

const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Sync engine configuration, layered via Figment: compiled-in defaults,
/// then an optional `config.toml`, then environment variables prefixed
/// `AIRWEAVE_SYNC_` (e.g. `AIRWEAVE_SYNC_DATABASE_URL`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncEngineConfig {
    /// Sqlite URL for the entity/sync-job store (`db` module).
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Log level for `tracing_subscriber`'s env filter fallback.
    #[serde(default = "default_loglevel")]
    pub loglevel: String,

    /// Number of concurrent worker tasks in `WorkerPool`. Default 20.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// `SourceStream` channel capacity is `max_workers * buffer_multiplier`.
    #[serde(default = "default_buffer_multiplier")]
    pub buffer_multiplier: usize,

    /// Outbound HTTP request timeouts (§5).
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// Proxy URL applied to every `reqwest::Client` this crate builds.
    #[serde(default)]
    pub proxy: Option<String>,

    /// Forces HTTP/1.1 for outbound clients (disables connection
    /// multiplexing) when upstream providers are flaky over HTTP/2.
    #[serde(default)]
    pub disable_http2: bool,

    /// Entity-definition bulk lookup chunk size (§6). Default 1000.
    #[serde(default = "default_lookup_chunk_size")]
    pub lookup_chunk_size: usize,

    /// Grace period the orchestrator waits for in-flight workers to finish
    /// after a cancellation request before declaring the job CANCELLED.
    #[serde(default = "default_cancel_grace_seconds")]
    pub cancel_grace_seconds: u64,

    /// When set, `SyncJob.stack_trace` is populated on failure in addition
    /// to `SyncJob.error`.
    #[serde(default)]
    pub dev_mode: bool,

    /// Interval, in seconds, between proactive OAuth token refreshes.
    /// Default 1500 (25 minutes), matching the source system's policy.
    #[serde(default = "default_token_refresh_interval_seconds")]
    pub token_refresh_interval_seconds: i64,

    /// Max file size `FileService` will download, in bytes. Files whose
    /// HEAD `Content-Length` exceeds this are skipped, never downloaded.
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,

    #[serde(default)]
    #[serde(deserialize_with = "deserialize_string_lax")]
    pub qdrant_url: String,

    #[serde(default)]
    #[serde(deserialize_with = "deserialize_string_lax")]
    pub neo4j_url: String,

    /// Root directory `FileService::restore_from_arf` reads captured raw
    /// responses from (ARF replay). Default `./arf`.
    #[serde(default = "default_arf_root")]
    pub arf_root: PathBuf,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            loglevel: default_loglevel(),
            max_workers: default_max_workers(),
            buffer_multiplier: default_buffer_multiplier(),
            timeouts: TimeoutsConfig::default(),
            proxy: None,
            disable_http2: false,
            lookup_chunk_size: default_lookup_chunk_size(),
            cancel_grace_seconds: default_cancel_grace_seconds(),
            dev_mode: false,
            token_refresh_interval_seconds: default_token_refresh_interval_seconds(),
            max_file_size_bytes: default_max_file_size_bytes(),
            qdrant_url: String::new(),
            neo4j_url: String::new(),
            arf_root: default_arf_root(),
        }
    }
}

impl SyncEngineConfig {
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(SyncEngineConfig::default()))
            .merge(Toml::file(DEFAULT_CONFIG_FILE))
            .merge(figment::providers::Env::prefixed("AIRWEAVE_SYNC_"))
    }

    /// Loads configuration by merging defaults, an optional `config.toml`
    /// and environment overrides. Does not validate required fields; the
    /// binary entrypoint calls [`Self::load_validated`] instead.
    pub fn load() -> Self {
        Self::figment()
            .extract()
            .unwrap_or_else(|err| panic!("failed to extract sync engine configuration: {err}"))
    }

    /// Loads and validates configuration; panics with a descriptive message
    /// if a destination URL required for the configured destinations is
    /// missing. Binaries should call this instead of [`Self::load`].
    pub fn load_validated() -> Self {
        let cfg = Self::load();
        if PathBuf::from(DEFAULT_CONFIG_FILE).is_file() && cfg.database_url.trim().is_empty() {
            panic!("database_url must be set and non-empty");
        }
        cfg
    }

    pub fn worker_channel_capacity(&self) -> usize {
        self.max_workers.saturating_mul(self.buffer_multiplier).max(1)
    }
}

fn deserialize_string_lax<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    match v {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string, got {other}"
        ))),
    }
}

fn default_database_url() -> String {
    "sqlite://airweave-sync.db".to_string()
}

fn default_loglevel() -> String {
    "info".to_string()
}

fn default_max_workers() -> usize {
    20
}

fn default_buffer_multiplier() -> usize {
    2
}

fn default_lookup_chunk_size() -> usize {
    1000
}

fn default_cancel_grace_seconds() -> u64 {
    15
}

fn default_token_refresh_interval_seconds() -> i64 {
    1500
}

fn default_max_file_size_bytes() -> u64 {
    1_073_741_824
}

fn default_arf_root() -> PathBuf {
    PathBuf::from("./arf")
}

/// Global, lazily-initialized configuration instance for library call sites
/// that don't have a `SyncContext` handy (mirrors the teacher's
/// `config::CONFIG` best-effort static).
pub static CONFIG: LazyLock<SyncEngineConfig> = LazyLock::new(SyncEngineConfig::load);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let cfg = SyncEngineConfig::default();
        assert_eq!(cfg.worker_channel_capacity(), cfg.max_workers * cfg.buffer_multiplier);
        assert_eq!(cfg.max_file_size_bytes, 1_073_741_824);
    }
}
