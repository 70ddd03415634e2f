use reqwest::Url;
use std::env;
use std::path::PathBuf;
use tracing::warn;

use crate::error::ConfigError;

const DEFAULT_SITE_URL: &str = "http://localhost:3000";

#[derive(Debug, Clone)]
pub struct AppConfig {
    // None falls back to the placeholder backend
    pub backend: Option<BackendConfig>,
    pub site_url: Url,
    pub log_level: String,
    pub data_dir: PathBuf,
    // collected while loading, before logging is set up
    warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub url: Url,
    pub api_key: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut warnings = Vec::new();

        let backend = match (read("APPLYTRACK_BACKEND_URL"), read("APPLYTRACK_BACKEND_KEY")) {
            (Some(url), Some(api_key)) => match Url::parse(&url) {
                Ok(url) => Some(BackendConfig { url, api_key }),
                Err(_) => {
                    warnings.push(format!(
                        "APPLYTRACK_BACKEND_URL '{}' is not a valid URL, running offline",
                        url
                    ));
                    None
                }
            },
            _ => {
                warnings.push("backend URL or key missing, running offline".to_string());
                None
            }
        };

        let site_url = read("APPLYTRACK_SITE_URL").unwrap_or_else(|| DEFAULT_SITE_URL.to_string());
        let site_url = Url::parse(&site_url).map_err(|_| ConfigError::Invalid {
            name: "APPLYTRACK_SITE_URL",
            value: site_url.clone(),
        })?;

        let log_level = read("APPLYTRACK_LOG").unwrap_or_else(|| "info".to_string());

        let data_dir = match read("APPLYTRACK_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir()?,
        };

        Ok(Self {
            backend,
            site_url,
            log_level,
            data_dir,
            warnings,
        })
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn log_warnings(&self) {
        for message in self.warnings() {
            warn!("{}", message);
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("applytrack.db")
    }

    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join("session.json")
    }
}

fn default_data_dir() -> Result<PathBuf, ConfigError> {
    directories::ProjectDirs::from("", "", "applytrack")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(ConfigError::NoDataDir)
}
