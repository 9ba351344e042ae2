use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::codec::KeyPair;
use crate::error::ConfigError;
use crate::session::store::{DEFAULT_KEY_PREFIX, DEFAULT_MAX_LENGTH, DEFAULT_RECORD_MAX_AGE};
use crate::session::{Options, SameSite, SerializerKind, DEFAULT_COOKIE_MAX_AGE};

/// Root configuration for kvsession.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub store: StoreConfig,
    pub backend: BackendConfig,
    pub keys: Vec<KeyPairConfig>,
    pub server: ServerConfig,
}

impl Config {
    /// Decode the hex-encoded key pairs, in rotation order.
    pub fn key_pairs(&self) -> Result<Vec<KeyPair>, ConfigError> {
        if self.keys.is_empty() {
            return Err(ConfigError::InvalidKey("no key pairs configured".into()));
        }
        self.keys.iter().map(KeyPairConfig::decode).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    pub key_prefix: String,
    /// Maximum serialized payload size in bytes; 0 means unlimited.
    pub max_length: usize,
    /// Cookie lifetime in seconds, also the codecs' signature time bound.
    pub max_age: i64,
    /// Record TTL for sessions whose max-age is 0.
    pub default_max_age: i64,
    pub serializer: SerializerKind,
    pub cookie: CookieConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            max_length: DEFAULT_MAX_LENGTH,
            max_age: DEFAULT_COOKIE_MAX_AGE,
            default_max_age: DEFAULT_RECORD_MAX_AGE,
            serializer: SerializerKind::default(),
            cookie: CookieConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Session options built from the cookie settings and `max_age`.
    pub fn cookie_options(&self) -> Options {
        Options {
            path: self.cookie.path.clone(),
            domain: self.cookie.domain.clone(),
            max_age: self.max_age,
            secure: self.cookie.secure,
            http_only: self.cookie.http_only,
            same_site: self.cookie.same_site,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CookieConfig {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_site: Option<SameSite>,
}

impl Default for CookieConfig {
    fn default() -> Self {
        let options = Options::default();
        Self {
            path: options.path,
            domain: options.domain,
            secure: options.secure,
            http_only: options.http_only,
            same_site: options.same_site,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Redis,
    Dynamodb,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::Redis => write!(f, "redis"),
            BackendKind::Dynamodb => write!(f, "dynamodb"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "redis" => Ok(BackendKind::Redis),
            "dynamodb" | "dynamo" => Ok(BackendKind::Dynamodb),
            _ => Err(format!("Unknown backend: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub redis_url: String,
    pub table_name: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            table_name: "sessions".to_string(),
        }
    }
}

/// Hex-encoded key material.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyPairConfig {
    pub hash_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_key: Option<String>,
}

impl KeyPairConfig {
    pub fn decode(&self) -> Result<KeyPair, ConfigError> {
        let hash_key = hex::decode(&self.hash_key)
            .map_err(|e| ConfigError::InvalidKey(format!("hashKey: {e}")))?;
        if hash_key.is_empty() {
            return Err(ConfigError::InvalidKey("hashKey is empty".into()));
        }
        let mut pair = KeyPair::new(hash_key);
        if let Some(block) = self.block_key.as_deref().filter(|b| !b.is_empty()) {
            let block_key = hex::decode(block)
                .map_err(|e| ConfigError::InvalidKey(format!("blockKey: {e}")))?;
            pair = pair.with_block_key(block_key);
        }
        Ok(pair)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Load configuration from the environment.
///
/// `KVSESSION_CONFIG` may hold the full JSON document. Otherwise the config file
/// is loaded and individual variables are applied on top.
pub fn load_config_from_env() -> Config {
    if let Ok(json) = std::env::var("KVSESSION_CONFIG") {
        match serde_json::from_str::<Config>(&json) {
            Ok(config) => return config,
            Err(e) => {
                tracing::warn!("Failed to parse KVSESSION_CONFIG: {}", e);
            }
        }
    }

    let mut cfg = load_config(None);
    apply_env_overrides(&mut cfg);
    cfg
}

fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("KVSESSION_BACKEND") {
        match v.parse() {
            Ok(kind) => cfg.backend.kind = kind,
            Err(e) => tracing::warn!("Ignoring KVSESSION_BACKEND: {}", e),
        }
    }
    if let Ok(v) = std::env::var("KVSESSION_REDIS_URL") {
        cfg.backend.redis_url = v;
    }
    if let Ok(v) = std::env::var("KVSESSION_KEY_PREFIX") {
        cfg.store.key_prefix = v;
    }
    if let Ok(v) = std::env::var("KVSESSION_MAX_AGE") {
        match v.parse() {
            Ok(secs) => cfg.store.max_age = secs,
            Err(e) => tracing::warn!("Ignoring KVSESSION_MAX_AGE={}: {}", v, e),
        }
    }
    if let Ok(v) = std::env::var("KVSESSION_PORT") {
        match v.parse() {
            Ok(port) => cfg.server.port = port,
            Err(e) => tracing::warn!("Ignoring KVSESSION_PORT={}: {}", v, e),
        }
    }

    // A key from the environment becomes the primary pair; file keys stay
    // available for decoding older cookies.
    if let Ok(hash_key) = std::env::var("KVSESSION_HASH_KEY") {
        let block_key = std::env::var("KVSESSION_BLOCK_KEY").ok();
        cfg.keys.insert(0, KeyPairConfig { hash_key, block_key });
    }
}

/// Get the default config file path.
pub fn get_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kvsession")
        .join("config.json")
}

/// Load configuration from file or fall back to defaults.
pub fn load_config(config_path: Option<&Path>) -> Config {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if path.exists() {
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Config>(&content) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to parse config from {}: {}", path.display(), e);
                    tracing::warn!("Using default configuration.");
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config from {}: {}", path.display(), e);
                tracing::warn!("Using default configuration.");
            }
        }
    }

    Config::default()
}

/// Save configuration to file.
pub fn save_config(config: &Config, config_path: Option<&Path>) -> Result<(), ConfigError> {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    }

    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    Ok(())
}
