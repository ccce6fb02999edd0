use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Persistence constants. Bump STORAGE_VERSION when the envelope changes.
pub const STORAGE_KEY: &str = "ai_energy_scheduler_data";
pub const STORAGE_VERSION: u32 = 1;
pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PERSIST_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_BUS_CAPACITY: usize = 256;
pub const DEFAULT_WATCHER_TICK_SECS: u64 = 30;

/// Top-level config (aies.toml + AIES_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AiesConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// Where the schedule document is persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackend {
    /// Single row in a SQLite `documents` table.
    #[default]
    Sqlite,
    /// One JSON file, replaced atomically on every save.
    Json,
    /// Process memory only; nothing survives a restart.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// File path for the sqlite/json backends. Ignored for `memory`.
    #[serde(default = "default_storage_path")]
    pub path: String,
    /// Upper bound on a single save; a timeout counts as a persistence failure.
    #[serde(default = "default_persist_timeout_ms")]
    pub persist_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_storage_path(),
            persist_timeout_ms: DEFAULT_PERSIST_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchemaConfig {
    /// JSON schema file. The built-in schema is used when unset.
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Per-subscriber buffer; slow subscribers lose the oldest events.
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BUS_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_watcher_tick_secs")]
    pub tick_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_secs: DEFAULT_WATCHER_TICK_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueryConfig {
    /// Offset east of UTC, in seconds, that defines local midnight for
    /// "today" aggregations. 0 means UTC days.
    #[serde(default)]
    pub day_offset_secs: i32,
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_persist_timeout_ms() -> u64 {
    DEFAULT_PERSIST_TIMEOUT_MS
}
fn default_bus_capacity() -> usize {
    DEFAULT_BUS_CAPACITY
}
fn default_watcher_tick_secs() -> u64 {
    DEFAULT_WATCHER_TICK_SECS
}
fn default_storage_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.aies/aies.db", home)
}

impl AiesConfig {
    /// Load config from a TOML file with AIES_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `AIES_STORAGE__PERSIST_TIMEOUT_MS=2000`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("AIES_").split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.aies/aies.toml", home)
}
