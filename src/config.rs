use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::KiraError;

pub const DEFAULT_ARCHIVE_BASE_URL: &str = "https://files.wwpdb.org/pub/pdb";
pub const DEFAULT_DATA_API_URL: &str = "https://data.rcsb.org/rest/v1";
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

const LOCAL_CONFIG_FILE: &str = "kira-pdb.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub archive_base_url: Option<String>,
    #[serde(default)]
    pub data_api_url: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub output_dir: Option<String>,
    pub workers: Option<usize>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub archive_base_url: String,
    pub data_api_url: String,
    pub output_dir: Utf8PathBuf,
    pub workers: usize,
    pub timeout: Duration,
    pub run_timeout: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            archive_base_url: DEFAULT_ARCHIVE_BASE_URL.to_string(),
            data_api_url: DEFAULT_DATA_API_URL.to_string(),
            output_dir: Utf8PathBuf::from("."),
            workers: DEFAULT_WORKERS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            run_timeout: None,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist. Without one, `./kira-pdb.json` and then the
    /// platform config directory are tried; if neither exists defaults apply.
    pub fn resolve(
        path: Option<&str>,
        overrides: SettingsOverrides,
    ) -> Result<Settings, KiraError> {
        let config = match path {
            Some(path) => Self::read(PathBuf::from(path))?,
            None => match Self::discover() {
                Some(found) => Self::read(found)?,
                None => Config::default(),
            },
        };
        Ok(Self::resolve_config(config, overrides))
    }

    pub fn resolve_config(config: Config, overrides: SettingsOverrides) -> Settings {
        let defaults = Settings::default();
        let output_dir = overrides
            .output_dir
            .or(config.output_dir)
            .map(Utf8PathBuf::from)
            .unwrap_or(defaults.output_dir);
        let workers = overrides
            .workers
            .or(config.workers)
            .unwrap_or(DEFAULT_WORKERS)
            .max(1);
        let timeout = overrides
            .timeout_secs
            .or(config.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        Settings {
            archive_base_url: config
                .archive_base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.archive_base_url),
            data_api_url: config
                .data_api_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.data_api_url),
            output_dir,
            workers,
            timeout,
            run_timeout: config.run_timeout_secs.map(Duration::from_secs),
        }
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        ProjectDirs::from("", "", "kira-pdb")
            .map(|dirs| dirs.config_dir().join("config.json"))
            .filter(|path| path.exists())
    }

    fn read(path: PathBuf) -> Result<Config, KiraError> {
        debug!(path = %path.display(), "loading config");
        let content = fs::read_to_string(&path).map_err(|_| KiraError::ConfigRead(path.clone()))?;
        serde_json::from_str(&content).map_err(|err| KiraError::ConfigParse(err.to_string()))
    }
}
