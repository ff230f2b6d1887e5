//! Runtime configuration from the environment (after `.env` is loaded).

use anyhow::{Result, bail};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_GTFS_URL: &str = "https://mkuran.pl/feed/ztm/ztm-latest.zip";
pub const DEFAULT_BRIGADES_URL: &str = "https://mkuran.pl/feed/ztm/ztm-brigades.json";
pub const DEFAULT_OUTPUT_DIR: &str = "output-rt";
pub const DEFAULT_LOG_FILE_PATH: &str = "logs/warsaw_gtfs_rt.log";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_key: Option<String>,
    pub gtfs_url: String,
    pub brigades_url: String,
    pub output_dir: PathBuf,
    pub log_file_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            gtfs_url: DEFAULT_GTFS_URL.to_string(),
            brigades_url: DEFAULT_BRIGADES_URL.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            log_file_path: PathBuf::from(DEFAULT_LOG_FILE_PATH),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from `lookup`; unset or blank values take the
    /// defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        Self {
            api_key: get("WARSAW_API_KEY"),
            gtfs_url: get("GTFS_URL").unwrap_or(defaults.gtfs_url),
            brigades_url: get("BRIGADES_URL").unwrap_or(defaults.brigades_url),
            output_dir: get("OUTPUT_DIR").map(PathBuf::from).unwrap_or(defaults.output_dir),
            log_file_path: get("LOG_FILE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_file_path),
        }
    }

    /// The open-data API key, required by every command that calls the API.
    pub fn require_api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) => Ok(key),
            None => bail!("Warsaw API key missing: pass --key or set WARSAW_API_KEY"),
        }
    }
}
