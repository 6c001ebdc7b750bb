use async_trait::async_trait;
use oci_distribution::client::ClientConfig;
use oci_distribution::manifest::{OciImageManifest, OciManifest};
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::{Client, Reference as OciReference};
use tracing::{debug, info};

use crate::auth::AuthConfig;
use crate::constants::media_type::{ACCEPTED_MANIFESTS, OCI_IMAGE_INDEX, OCI_IMAGE_MANIFEST};
use crate::error::{ClientError, Result};
use crate::manifest::{Descriptor, DistributionInspect, Platform};
use crate::reference::Reference;


/// Looks up the digest and platforms of an image on its registry
#[async_trait]
pub trait DistributionInspector: Send + Sync {
    /// `encoded_auth` is an `X-Registry-Auth` value, if credentials are known
    async fn inspect(
        &self,
        image: &str,
        encoded_auth: Option<&str>,
    ) -> Result<DistributionInspect>;
}

/// Inspects images by talking to their registry directly rather than through
/// the daemon
#[derive(Clone)]
pub struct RegistryClient {
    client: Client,
}

impl RegistryClient {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Use a custom oci-distribution config, e.g. plain HTTP for a local registry
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    /// Fetch the manifest for an image and describe it
    pub async fn inspect_image(
        &self,
        image_ref: &str,
        auth: &RegistryAuth,
    ) -> Result<DistributionInspect> {
        let parsed = Reference::parse_named(image_ref)?;
        let reference = parsed.as_oci().ok_or_else(|| {
            ClientError::Registry(format!("{} does not name a repository", image_ref))
        })?;

        debug!("Fetching manifest for {}", reference);

        let (raw, digest) = self
            .client
            .pull_manifest_raw(reference, auth, ACCEPTED_MANIFESTS)
            .await
            .map_err(|e| ClientError::Registry(format!("failed to fetch manifest: {}", e)))?;
        let manifest: OciManifest = serde_json::from_slice(&raw).map_err(ClientError::Decode)?;

        let (media_type, platforms) = match &manifest {
            OciManifest::ImageIndex(index) => {
                let platforms = index
                    .manifests
                    .iter()
                    .filter_map(|entry| entry.platform.as_ref())
                    .map(Platform::from)
                    .collect();
                let media_type = index
                    .media_type
                    .clone()
                    .unwrap_or_else(|| OCI_IMAGE_INDEX.to_string());
                (media_type, platforms)
            }
            OciManifest::Image(image) => {
                let platform = self.config_platform(reference, image).await?;
                let media_type = image
                    .media_type
                    .clone()
                    .unwrap_or_else(|| OCI_IMAGE_MANIFEST.to_string());
                (media_type, vec![platform])
            }
        };

        info!(
            "Resolved {} to {} ({} platform(s))",
            reference,
            digest,
            platforms.len()
        );

        Ok(DistributionInspect {
            descriptor: Descriptor {
                media_type,
                digest,
                size: raw.len() as i64,
                urls: Vec::new(),
            },
            platforms,
        })
    }

    /// Single-platform images record their platform in the config blob
    /// referenced by the manifest
    async fn config_platform(
        &self,
        reference: &OciReference,
        manifest: &OciImageManifest,
    ) -> Result<Platform> {
        let mut config = Vec::new();
        self.client
            .pull_blob(reference, &manifest.config, &mut config)
            .await
            .map_err(|e| ClientError::Registry(format!("failed to fetch image config: {}", e)))?;

        serde_json::from_slice(&config).map_err(ClientError::Decode)
    }
}

impl Default for RegistryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DistributionInspector for RegistryClient {
    async fn inspect(
        &self,
        image: &str,
        encoded_auth: Option<&str>,
    ) -> Result<DistributionInspect> {
        let auth = match encoded_auth.filter(|auth| !auth.is_empty()) {
            Some(encoded) => AuthConfig::decode(encoded)?.to_registry_auth(),
            None => RegistryAuth::Anonymous,
        };
        self.inspect_image(image, &auth).await
    }
}
