use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::types::Result;

/// Global configuration for the nex CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "Config::default_registry_url")]
    pub registry_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Config {
    pub fn default_registry_url() -> String {
        "http://localhost:5000".to_string()
    }

    /// Registry base URL without a trailing slash
    pub fn registry_base(&self) -> &str {
        self.registry_url.trim_end_matches('/')
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry_url: Self::default_registry_url(),
            token: None,
        }
    }
}

impl Config {
    /// Load configuration from ~/.nex/config.toml
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_dir()?.join("config.toml"))
    }

    /// Save configuration to ~/.nex/config.toml
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_dir()?.join("config.toml"))
    }

    pub fn load_from(config_file: &Path) -> Result<Self> {
        if config_file.exists() {
            let content = std::fs::read_to_string(config_file)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, config_file: &Path) -> Result<()> {
        if let Some(dir) = config_file.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_file, content)?;
        Ok(())
    }

    /// Get the config directory path
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or("Could not find home directory")?;
        Ok(home.join(".nex"))
    }

    /// Where installed package manifests are kept
    pub fn packages_dir() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("packages"))
    }
}
