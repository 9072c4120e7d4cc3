// Configuration management module
// All settings come from the environment and are validated once at startup;
// a missing required variable fails the process before any backend is touched.


use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const DEFAULT_COLLECTION: &str = "ocean_data";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Postgres connection string (PostGIS-enabled database).
    pub database_url: String,
    /// Vector collection name; rebuilding under the same name replaces it.
    pub collection: String,
    /// Directory holding the LanceDB dataset.
    pub data_dir: PathBuf,
    /// Bound applied to every external call (embedding, LLM, SQL execution).
    pub timeout_ms: u64,
    pub ollama: OllamaConfig,
    pub gemini: GeminiConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OllamaConfig {
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    /// Override for tests; the real endpoint when `None`.
    pub base_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Home directory could not be determined")]
    DirectoryError,
}

impl Default for OllamaConfig {
    #[inline]
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            batch_size: 64,
        }
    }
}

fn env_var(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required_var(name: &'static str) -> Result<String, ConfigError> {
    env_var(name).ok_or(ConfigError::MissingVar(name))
}

fn parsed_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env_var(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                var: name,
                value: raw,
            }),
    }
}

impl Config {
    /// Read and validate the full configuration from the environment.
    ///
    /// Required: `DATABASE_URL`, `GEMINI_API_KEY`. Everything else has a
    /// default. The process never reads the environment again after this.
    #[inline]
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required_var("DATABASE_URL")?;
        let api_key = required_var("GEMINI_API_KEY")?;

        let collection =
            env_var("TIDEPOOL_COLLECTION").unwrap_or_else(|| DEFAULT_COLLECTION.to_string());
        let data_dir = match env_var("TIDEPOOL_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => Self::default_data_dir()?,
        };
        let timeout_ms = parsed_var::<u64>("TIDEPOOL_TIMEOUT_MS")?.unwrap_or(DEFAULT_TIMEOUT_MS);

        let defaults = OllamaConfig::default();
        let ollama = OllamaConfig {
            host: env_var("OLLAMA_HOST").unwrap_or(defaults.host),
            port: parsed_var::<u16>("OLLAMA_PORT")?.unwrap_or(defaults.port),
            model: env_var("OLLAMA_MODEL").unwrap_or(defaults.model),
            batch_size: parsed_var::<u32>("OLLAMA_BATCH_SIZE")?.unwrap_or(defaults.batch_size),
        };

        let gemini = GeminiConfig {
            api_key,
            model: env_var("GEMINI_MODEL").unwrap_or_else(|| "gemini-1.5-flash".to_string()),
            base_url: env_var("GEMINI_BASE_URL"),
        };

        let config = Self {
            database_url,
            collection,
            data_dir,
            timeout_ms,
            ollama,
            gemini,
        };
        config.validate()?;
        Ok(config)
    }

    #[inline]
    pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".tidepool"))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collection.trim().is_empty()
            || !self
                .collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::InvalidValue {
                var: "TIDEPOOL_COLLECTION",
                value: self.collection.clone(),
            });
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                var: "TIDEPOOL_TIMEOUT_MS",
                value: self.timeout_ms.to_string(),
            });
        }
        self.ollama.validate()
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("http://{}:{}", self.ollama.host, self.ollama.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    /// Path of the LanceDB dataset under the data directory.
    #[inline]
    pub fn vector_db_path(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }
}

impl OllamaConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue {
                var: "OLLAMA_PORT",
                value: self.port.to_string(),
            });
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                var: "OLLAMA_MODEL",
                value: self.model.clone(),
            });
        }
        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }
        let url_str = format!("http://{}:{}", self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;
        Ok(())
    }
}

impl From<ConfigError> for crate::TidepoolError {
    #[inline]
    fn from(e: ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
