use serde::{Deserialize, Serialize};

use crate::constants::api::{DEFAULT_HOST, DEFAULT_VERSION};


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Daemon address (unix://, tcp://, http:// or https://)
    #[serde(default = "default_host")]
    pub host: String,

    /// Engine API version to request
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Pin images by digest before creating services
    #[serde(default = "default_query_registry")]
    pub query_registry: bool,

    /// Resolve images against the registry directly instead of via the daemon
    #[serde(default)]
    pub direct_registry: bool,

    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_api_version() -> String {
    DEFAULT_VERSION.to_string()
}

fn default_query_registry() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            api_version: default_api_version(),
            query_registry: default_query_registry(),
            direct_registry: false,
            timeout_secs: None,
        }
    }
}

impl Config {
    /// Load `stowage/config.toml` from the user's config directory, then
    /// apply `DOCKER_HOST` and `DOCKER_API_VERSION` from the environment.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Config::default();
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("stowage").join("config.toml");
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)?;
                config = Self::from_toml_str(&content)?;
            }
        }

        config.apply_overrides(
            std::env::var("DOCKER_HOST").ok(),
            std::env::var("DOCKER_API_VERSION").ok(),
        );
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Empty values are ignored
    pub fn apply_overrides(&mut self, host: Option<String>, api_version: Option<String>) {
        if let Some(host) = host.filter(|h| !h.is_empty()) {
            self.host = host;
        }
        if let Some(version) = api_version.filter(|v| !v.is_empty()) {
            self.api_version = version;
        }
    }
}
