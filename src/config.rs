use std::env;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a number, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub registry_path: PathBuf,
    pub corpus_dir: PathBuf,
    pub corpus_source: String,
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            registry_path: PathBuf::from("data/legitimate_invoice_hashes.bin"),
            corpus_dir: PathBuf::from("data/corpus"),
            corpus_source: "donut-data-v1".to_string(),
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse_number("PORT", get("PORT"), defaults.port)?,
            registry_path: get("REGISTRY_PATH").map(PathBuf::from).unwrap_or(defaults.registry_path),
            corpus_dir: get("CORPUS_DIR").map(PathBuf::from).unwrap_or(defaults.corpus_dir),
            corpus_source: get("CORPUS_SOURCE").unwrap_or(defaults.corpus_source),
            max_upload_bytes: parse_number("MAX_UPLOAD_BYTES", get("MAX_UPLOAD_BYTES"), defaults.max_upload_bytes)?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
    }
}
