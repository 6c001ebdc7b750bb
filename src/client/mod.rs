//! Engine API client
//!
//! Shapes requests for a specific API version, enforces the configured
//! timeout and turns error responses into [`ClientError::Api`].

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::constants::api::{DEFAULT_VERSION, REGISTRY_AUTH_HEADER, VERSION_HEADER};
use crate::error::{ClientError, Result};
use crate::manifest::DistributionInspect;
use crate::registry::DistributionInspector;
use crate::transport::{ApiRequest, HyperTransport, RawResponse, Transport};


pub struct Client {
    transport: Arc<dyn Transport>,
    version: String,
    timeout: Option<Duration>,
}

impl Client {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            version: DEFAULT_VERSION.to_string(),
            timeout: None,
        }
    }

    /// Connect to the daemon described by `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = HyperTransport::new(&config.host)?;
        let mut client = Self::new(Arc::new(transport)).with_version(&config.api_version);
        if let Some(secs) = config.timeout_secs {
            client = client.with_timeout(Duration::from_secs(secs));
        }
        Ok(client)
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.trim_start_matches('v').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    fn api_path(&self, path: &str) -> String {
        format!("/v{}{}", self.version, path)
    }

    pub(crate) async fn get(
        &self,
        path: &str,
        headers: Vec<(&str, String)>,
    ) -> Result<RawResponse> {
        let mut request = ApiRequest::get(self.api_path(path));
        for (name, value) in headers {
            request = request.with_header(name, value);
        }
        self.send(request).await
    }

    pub(crate) async fn post(
        &self,
        path: &str,
        body: Vec<u8>,
        headers: Vec<(&str, String)>,
    ) -> Result<RawResponse> {
        let mut request = ApiRequest::post(self.api_path(path), body)
            .with_header("Content-Type", "application/json");
        for (name, value) in headers {
            request = request.with_header(name, value);
        }
        self.send(request).await
    }

    async fn send(&self, request: ApiRequest) -> Result<RawResponse> {
        let request = request.with_header(VERSION_HEADER, self.version.clone());
        debug!("Sending {} {}", request.method, request.path);

        let response = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.transport.send(request))
                .await
                .map_err(|_| ClientError::Timeout(timeout))??,
            None => self.transport.send(request).await?,
        };

        check_response(response)
    }
}

/// Turn a non-2xx response into an error carrying the daemon's message
fn check_response(response: RawResponse) -> Result<RawResponse> {
    if response.status.is_success() {
        return Ok(response);
    }

    #[derive(Deserialize)]
    struct ErrorResponse {
        message: String,
    }

    let message = match serde_json::from_slice::<ErrorResponse>(&response.body) {
        Ok(error) => error.message,
        Err(_) if response.body.is_empty() => response
            .status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
        Err(_) => String::from_utf8_lossy(&response.body).trim().to_string(),
    };

    Err(ClientError::Api {
        status: response.status.as_u16(),
        message,
    })
}

/// The daemon resolves images on behalf of the client
#[async_trait]
impl DistributionInspector for Client {
    async fn inspect(
        &self,
        image: &str,
        encoded_auth: Option<&str>,
    ) -> Result<DistributionInspect> {
        let mut headers = Vec::new();
        if let Some(auth) = encoded_auth.filter(|auth| !auth.is_empty()) {
            headers.push((REGISTRY_AUTH_HEADER, auth.to_string()));
        }

        let response = self
            .get(&format!("/distribution/{}/json", image), headers)
            .await?;
        serde_json::from_slice(&response.body).map_err(ClientError::Decode)
    }
}
