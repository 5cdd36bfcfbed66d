use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::github::DEFAULT_API_URL;
use crate::svg::Theme;

/// Settings read from `config.toml`. Every field is optional in the file;
/// CLI flags and environment variables take precedence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub token: Option<String>,
    pub api_url: String,
    pub user_agent: String,
    pub output_dir: PathBuf,
    pub theme: Theme,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: None,
            api_url: DEFAULT_API_URL.to_string(),
            user_agent: concat!("ghprofile/", env!("CARGO_PKG_VERSION")).to_string(),
            output_dir: PathBuf::from("."),
            theme: Theme::default(),
        }
    }
}

impl Config {
    /// Platform config location, e.g. `~/.config/ghprofile/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "ghprofile").map(|d| d.config_dir().join("config.toml"))
    }

    /// Load from `path`, or the platform location when `None`. A missing
    /// file yields the defaults; nothing is written back.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(p) => p,
            None => return Ok(Self::default()),
        };

        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }
}
