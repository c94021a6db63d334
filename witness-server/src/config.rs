//! Server configuration, read from the environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use witness_core::{MatcherConfig, RetrievalStrategy, WitnessError, WitnessResult};

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;
pub const DEFAULT_EMBEDDING_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_INDEX_NAME: &str = "culpritIndex";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding the store snapshot.
    pub data_path: PathBuf,
    pub api_key: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub embedding_url: String,
    pub embed_timeout: Duration,
    pub store_timeout: Duration,
    pub retrieval: RetrievalStrategy,
    pub index_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let matcher = MatcherConfig::default();
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            data_path: PathBuf::from("./witness_data"),
            api_key: String::new(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            embedding_url: DEFAULT_EMBEDDING_URL.to_string(),
            embed_timeout: matcher.embed_timeout,
            store_timeout: matcher.store_timeout,
            retrieval: RetrievalStrategy::FullScan,
            index_name: DEFAULT_INDEX_NAME.to_string(),
        }
    }
}

impl ServerConfig {
    /// Loads `.env` if present, then reads `WITNESS_*` and `GEMINI_API_KEY`.
    pub fn from_env() -> WitnessResult<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = ?path, "Loaded environment file");
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> WitnessResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ServerConfig::default();
        if let Some(host) = lookup("WITNESS_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("WITNESS_PORT") {
            config.port = parse_value("WITNESS_PORT", &port)?;
        }
        if let Some(path) = lookup("WITNESS_DATA_PATH") {
            config.data_path = PathBuf::from(path);
        }
        config.api_key = lookup("GEMINI_API_KEY").unwrap_or_default();
        if let Some(model) = lookup("WITNESS_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Some(dims) = lookup("WITNESS_EMBEDDING_DIMENSIONS") {
            config.embedding_dimensions = parse_value("WITNESS_EMBEDDING_DIMENSIONS", &dims)?;
        }
        if let Some(url) = lookup("WITNESS_EMBEDDING_URL") {
            config.embedding_url = url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = lookup("WITNESS_EMBED_TIMEOUT_SECS") {
            config.embed_timeout = Duration::from_secs(parse_value("WITNESS_EMBED_TIMEOUT_SECS", &secs)?);
        }
        if let Some(secs) = lookup("WITNESS_STORE_TIMEOUT_SECS") {
            config.store_timeout = Duration::from_secs(parse_value("WITNESS_STORE_TIMEOUT_SECS", &secs)?);
        }
        if let Some(retrieval) = lookup("WITNESS_RETRIEVAL") {
            config.retrieval = retrieval
                .parse()
                .map_err(|e: WitnessError| WitnessError::Configuration(format!("WITNESS_RETRIEVAL: {}", e)))?;
        }
        if let Some(name) = lookup("WITNESS_INDEX_NAME") {
            config.index_name = name;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> WitnessResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(WitnessError::Configuration("GEMINI_API_KEY is not set".to_string()));
        }
        if self.embedding_dimensions == 0 {
            return Err(WitnessError::Configuration("Embedding dimensions must be greater than 0".to_string()));
        }
        if self.index_name.is_empty() {
            return Err(WitnessError::Configuration("Index name must not be empty".to_string()));
        }
        self.matcher_config().validate()
    }

    pub fn matcher_config(&self) -> MatcherConfig {
        MatcherConfig {
            strategy: self.retrieval,
            embed_timeout: self.embed_timeout,
            store_timeout: self.store_timeout,
            ..MatcherConfig::default()
        }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_path.join("store.json")
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> WitnessResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| WitnessError::Configuration(format!("{} has an invalid value: '{}'", key, raw)))
}
