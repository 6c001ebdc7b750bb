//! Keychain implementation for credential management

use super::{AuthConfig, DockerAuthEntry, DockerConfig};
use crate::constants::registry::{DEFAULT_DOMAIN, INDEX_SERVER};
use crate::reference::Reference;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Trait for types that can resolve credentials for an image
pub trait Keychain: Send + Sync {
    /// Resolve credentials for the registry hosting `image`
    fn resolve(&self, image: &str) -> Result<AuthConfig>;
}

/// Keychain backed by Docker config files and credential helpers
pub struct DefaultKeychain {
    /// Cached config to avoid re-reading files
    config_cache: Arc<Mutex<Option<DockerConfig>>>,
}

impl DefaultKeychain {
    pub fn new() -> Self {
        Self {
            config_cache: Arc::new(Mutex::new(None)),
        }
    }

    /// Keychain with a preloaded config, skipping the filesystem
    pub fn with_config(config: DockerConfig) -> Self {
        Self {
            config_cache: Arc::new(Mutex::new(Some(config))),
        }
    }

    /// Get paths to check for Docker config
    fn config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(docker_config) = std::env::var("DOCKER_CONFIG") {
            paths.push(PathBuf::from(docker_config).join("config.json"));
        }

        if let Ok(auth_file) = std::env::var("REGISTRY_AUTH_FILE") {
            paths.push(PathBuf::from(auth_file));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".docker/config.json"));
        }

        paths
    }

    fn load_config(&self) -> DockerConfig {
        let mut cache = match self.config_cache.lock() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(config) = cache.as_ref() {
            return config.clone();
        }

        for path in Self::config_paths() {
            if !path.exists() {
                continue;
            }
            debug!("Checking Docker config at: {}", path.display());
            let parsed = std::fs::read_to_string(&path)
                .context("Failed to read Docker config")
                .and_then(|content| {
                    serde_json::from_str::<DockerConfig>(&content)
                        .context("Failed to parse Docker config")
                });
            match parsed {
                Ok(config) => {
                    debug!("Loaded Docker config from: {}", path.display());
                    *cache = Some(config.clone());
                    return config;
                }
                Err(e) => warn!("Skipping Docker config at {}: {:#}", path.display(), e),
            }
        }

        DockerConfig::default()
    }

    /// Registry domain for an image; Docker Hub when the image has none
    fn registry_for(image: &str) -> String {
        Reference::parse_named(image)
            .ok()
            .and_then(|reference| reference.registry().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_DOMAIN.to_string())
    }

    /// Keys a registry may be stored under in config.json
    fn normalize_registry(registry: &str) -> Vec<String> {
        if registry == DEFAULT_DOMAIN {
            return vec![
                INDEX_SERVER.to_string(),
                "index.docker.io".to_string(),
                "docker.io".to_string(),
                "https://index.docker.io/v2/".to_string(),
            ];
        }

        vec![
            registry.to_string(),
            format!("https://{}", registry),
            format!("http://{}", registry),
            format!("https://{}/v1/", registry),
            format!("https://{}/v2/", registry),
        ]
    }

    fn find_auth_entry(config: &DockerConfig, registry: &str) -> Option<DockerAuthEntry> {
        Self::normalize_registry(registry)
            .iter()
            .find_map(|variant| config.auths.get(variant).cloned())
    }

    fn credential_helper(config: &DockerConfig, registry: &str) -> Option<String> {
        config
            .cred_helpers
            .get(registry)
            .cloned()
            .or_else(|| config.creds_store.clone())
    }

    /// Run `docker-credential-<helper> get` for a registry
    fn execute_credential_helper(helper: &str, server: &str) -> Result<AuthConfig> {
        use std::io::Write;
        use std::process::{Command, Stdio};

        let helper_name = format!("docker-credential-{}", helper);
        debug!("Executing credential helper: {} for {}", helper_name, server);

        let mut child = Command::new(&helper_name)
            .arg("get")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn credential helper: {}", helper_name))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(server.as_bytes())?;
            stdin.write_all(b"\n")?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Credential helper {} failed: {}", helper_name, stderr.trim());
        }

        #[derive(serde::Deserialize)]
        struct HelperResponse {
            #[serde(rename = "Username")]
            username: Option<String>,
            #[serde(rename = "Secret")]
            secret: Option<String>,
        }

        let response: HelperResponse = serde_json::from_slice(&output.stdout)
            .context("Failed to parse credential helper response")?;

        // Helpers report identity tokens with this sentinel username
        if response.username.as_deref() == Some("<token>") {
            return Ok(AuthConfig {
                identity_token: response.secret,
                server_address: Some(server.to_string()),
                ..Default::default()
            });
        }

        Ok(AuthConfig {
            username: response.username,
            password: response.secret,
            server_address: Some(server.to_string()),
            ..Default::default()
        })
    }
}

impl Default for DefaultKeychain {
    fn default() -> Self {
        Self::new()
    }
}

impl Keychain for DefaultKeychain {
    fn resolve(&self, image: &str) -> Result<AuthConfig> {
        let config = self.load_config();
        let registry = Self::registry_for(image);
        let server = if registry == DEFAULT_DOMAIN {
            INDEX_SERVER.to_string()
        } else {
            registry.clone()
        };

        debug!("Resolving auth for image: {} (registry: {})", image, registry);

        if let Some(helper) = Self::credential_helper(&config, &registry) {
            match Self::execute_credential_helper(&helper, &server) {
                Ok(auth) => return Ok(auth),
                Err(e) => warn!("Credential helper failed: {:#}", e),
            }
        }

        if let Some(entry) = Self::find_auth_entry(&config, &registry) {
            debug!("Found auth entry for {}", registry);
            return Ok(entry.to_auth_config(&server));
        }

        debug!("No credentials found for {}, using anonymous", registry);
        Ok(AuthConfig::anonymous())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(registry: &str, auth: &str) -> DockerConfig {
        let mut auths = HashMap::new();
        auths.insert(
            registry.to_string(),
            DockerAuthEntry {
                auth: Some(auth.to_string()),
                username: None,
                password: None,
                identity_token: None,
                registry_token: None,
            },
        );
        DockerConfig {
            auths,
            ..Default::default()
        }
    }

    #[test]
    fn test_registry_for() {
        assert_eq!(DefaultKeychain::registry_for("ubuntu:latest"), "docker.io");
        assert_eq!(DefaultKeychain::registry_for("user/image:tag"), "docker.io");
        assert_eq!(
            DefaultKeychain::registry_for("index.docker.io/library/ubuntu"),
            "docker.io"
        );
        assert_eq!(
            DefaultKeychain::registry_for("gcr.io/project/image:tag"),
            "gcr.io"
        );
        assert_eq!(
            DefaultKeychain::registry_for("localhost:5000/image"),
            "localhost:5000"
        );
        assert_eq!(DefaultKeychain::registry_for("NOT A REF"), "docker.io");
    }

    #[test]
    fn test_normalize_registry() {
        let variants = DefaultKeychain::normalize_registry("docker.io");
        assert_eq!(variants[0], INDEX_SERVER);
        assert!(variants.contains(&"index.docker.io".to_string()));

        let variants = DefaultKeychain::normalize_registry("gcr.io");
        assert!(variants.contains(&"gcr.io".to_string()));
        assert!(variants.contains(&"https://gcr.io".to_string()));
    }

    #[test]
    fn test_resolve_docker_hub_entry() {
        let keychain = DefaultKeychain::with_config(config_with(INDEX_SERVER, "dXNlcjpwYXNz"));

        let auth = keychain.resolve("nginx:1.25").unwrap();
        assert_eq!(auth.auth.as_deref(), Some("dXNlcjpwYXNz"));
        assert_eq!(auth.server_address.as_deref(), Some(INDEX_SERVER));
    }

    #[test]
    fn test_resolve_private_registry_entry() {
        let keychain =
            DefaultKeychain::with_config(config_with("https://ghcr.io", "Z2g6dG9rZW4="));

        let auth = keychain.resolve("ghcr.io/org/app:1.0").unwrap();
        assert_eq!(auth.auth.as_deref(), Some("Z2g6dG9rZW4="));
        assert_eq!(auth.server_address.as_deref(), Some("ghcr.io"));
    }

    #[test]
    fn test_resolve_unknown_registry_is_anonymous() {
        let keychain = DefaultKeychain::with_config(config_with("ghcr.io", "Z2g6dG9rZW4="));

        let auth = keychain.resolve("quay.io/org/app").unwrap();
        assert!(auth.is_anonymous());
    }
}
