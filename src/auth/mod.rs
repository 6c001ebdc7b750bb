//! Registry credentials
//!
//! Credentials travel to the daemon in the `X-Registry-Auth` header as
//! base64url-encoded JSON. This module builds that value from Docker config
//! files and credential helpers, and decodes it again when the client talks
//! to a registry directly.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

mod keychain;

pub use keychain::{DefaultKeychain, Keychain};

/// Authentication configuration containing credentials
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    #[serde(
        rename = "serveraddress",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub server_address: Option<String>,
    #[serde(
        rename = "identitytoken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub identity_token: Option<String>,
    #[serde(
        rename = "registrytoken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub registry_token: Option<String>,
}

impl AuthConfig {
    /// Create a new AuthConfig with username and password
    pub fn new(username: String, password: String) -> Self {
        Self {
            username: Some(username),
            password: Some(password),
            ..Default::default()
        }
    }

    /// Create an anonymous AuthConfig
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Check if this is anonymous authentication
    pub fn is_anonymous(&self) -> bool {
        self.username.is_none()
            && self.password.is_none()
            && self.auth.is_none()
            && self.identity_token.is_none()
            && self.registry_token.is_none()
    }

    /// Encode as an `X-Registry-Auth` header value
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self).map_err(ClientError::Encode)?;
        Ok(base64::engine::general_purpose::URL_SAFE.encode(json))
    }

    /// Decode an `X-Registry-Auth` header value
    pub fn decode(encoded: &str) -> Result<Self> {
        let json = base64::engine::general_purpose::URL_SAFE
            .decode(encoded)
            .or_else(|_| base64::engine::general_purpose::STANDARD.decode(encoded))
            .map_err(|e| ClientError::Auth(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| ClientError::Auth(e.to_string()))
    }

    /// Convert to oci-distribution RegistryAuth
    pub fn to_registry_auth(&self) -> oci_distribution::secrets::RegistryAuth {
        use oci_distribution::secrets::RegistryAuth;

        if self.is_anonymous() {
            return RegistryAuth::Anonymous;
        }

        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            return RegistryAuth::Basic(username.clone(), password.clone());
        }

        if let Some(auth) = &self.auth {
            // Try to decode the base64 auth string
            if let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(auth) {
                if let Ok(decoded_str) = String::from_utf8(decoded) {
                    if let Some((user, pass)) = decoded_str.split_once(':') {
                        return RegistryAuth::Basic(user.to_string(), pass.to_string());
                    }
                }
            }
            debug!("Ignoring malformed auth entry for {}", self.server());
        }

        if let Some(kind) = self.unsupported_token() {
            warn!(
                "Registry {} only has {} credentials, which direct registry access cannot use; continuing anonymously",
                self.server(),
                kind
            );
        }

        RegistryAuth::Anonymous
    }

    /// Token credentials that only the daemon can exchange
    pub(crate) fn unsupported_token(&self) -> Option<&'static str> {
        if self.identity_token.is_some() {
            Some("identity token")
        } else if self.registry_token.is_some() {
            Some("registry token")
        } else {
            None
        }
    }

    fn server(&self) -> &str {
        self.server_address.as_deref().unwrap_or("(unknown)")
    }
}

/// Docker config file structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DockerConfig {
    #[serde(default)]
    pub auths: HashMap<String, DockerAuthEntry>,
    #[serde(rename = "credHelpers", default)]
    pub cred_helpers: HashMap<String, String>,
    #[serde(rename = "credsStore", skip_serializing_if = "Option::is_none")]
    pub creds_store: Option<String>,
}

/// Entry in the Docker config auths section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DockerAuthEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(rename = "identitytoken", skip_serializing_if = "Option::is_none")]
    pub identity_token: Option<String>,
    #[serde(rename = "registrytoken", skip_serializing_if = "Option::is_none")]
    pub registry_token: Option<String>,
}

impl DockerAuthEntry {
    /// Convert to AuthConfig for the given registry
    pub fn to_auth_config(&self, server_address: &str) -> AuthConfig {
        AuthConfig {
            username: self.username.clone(),
            password: self.password.clone(),
            auth: self.auth.clone(),
            server_address: Some(server_address.to_string()),
            identity_token: self.identity_token.clone(),
            registry_token: self.registry_token.clone(),
        }
    }
}
