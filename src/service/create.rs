//! Service creation
//!
//! Submits a service spec to the daemon. When asked to, the image is first
//! resolved on its registry so that every node runs exactly the same content,
//! and the platforms the image supports are added to the placement.

use thiserror::Error;
use tracing::{debug, info, warn};

use super::platform::update_service_platforms;
use crate::client::Client;
use crate::constants::api::REGISTRY_AUTH_HEADER;
use crate::constants::runtime;
use crate::error::ClientError;
use crate::reference::Reference;
use crate::registry::DistributionInspector;
use crate::swarm::{
    ContainerSpec, ServiceCreateOptions, ServiceCreateResponse, ServiceSpec, TaskSpec,
};

/// Failure to create a service
///
/// The response is kept alongside the cause: when the daemon's reply cannot
/// be decoded, any warnings gathered before that point are still reported.
#[derive(Error, Debug)]
#[error("failed to create service: {source}")]
pub struct ServiceCreateError {
    pub response: ServiceCreateResponse,
    #[source]
    pub source: ClientError,
}

impl ServiceCreateError {
    fn without_response(source: ClientError) -> Self {
        Self {
            response: ServiceCreateResponse::default(),
            source,
        }
    }
}

/// Submits service specs, resolving images through an inspector
pub struct ServiceSubmitter<'a> {
    client: &'a Client,
    inspector: &'a dyn DistributionInspector,
}

impl<'a> ServiceSubmitter<'a> {
    /// Submitter that lets the daemon resolve images
    pub fn new(client: &'a Client) -> Self {
        Self {
            client,
            inspector: client,
        }
    }

    /// Resolve images with a different inspector, e.g. a direct registry client
    pub fn with_inspector(mut self, inspector: &'a dyn DistributionInspector) -> Self {
        self.inspector = inspector;
        self
    }

    pub async fn submit(
        &self,
        mut spec: ServiceSpec,
        options: &ServiceCreateOptions,
    ) -> Result<ServiceCreateResponse, ServiceCreateError> {
        prepare_service_spec(&mut spec).map_err(ServiceCreateError::without_response)?;

        let encoded_auth = options
            .encoded_registry_auth
            .as_deref()
            .filter(|auth| !auth.is_empty());

        let mut headers = Vec::new();
        if let Some(auth) = encoded_auth {
            headers.push((REGISTRY_AUTH_HEADER, auth.to_string()));
        }

        let warning = if options.query_registry {
            self.resolve_image(&mut spec.task_template, encoded_auth)
                .await
        } else {
            None
        };

        let body = serde_json::to_vec(&spec)
            .map_err(|e| ServiceCreateError::without_response(ClientError::Encode(e)))?;
        let response = self
            .client
            .post("/services/create", body, headers)
            .await
            .map_err(ServiceCreateError::without_response)?;

        let (mut created, decode_error) =
            match serde_json::from_slice::<ServiceCreateResponse>(&response.body) {
                Ok(created) => (created, None),
                Err(e) => (
                    ServiceCreateResponse::default(),
                    Some(ClientError::Decode(e)),
                ),
            };
        drop(response);

        if let Some(warning) = warning {
            created.warnings.push(warning);
        }

        match decode_error {
            Some(source) => Err(ServiceCreateError {
                response: created,
                source,
            }),
            None => {
                info!("Created service {}", created.id);
                Ok(created)
            }
        }
    }

    /// Pin the container image by digest and record its platforms.
    ///
    /// Returns a warning for the caller if the registry could not be reached;
    /// the spec is left untouched in that case.
    async fn resolve_image(&self, task: &mut TaskSpec, encoded_auth: Option<&str>) -> Option<String> {
        let container = task.container_spec.as_mut()?;

        match self.inspector.inspect(&container.image, encoded_auth).await {
            Ok(inspect) => {
                if let Some(pinned) = image_with_digest(&container.image, &inspect.descriptor.digest)
                {
                    info!("Pinned image {} to {}", container.image, pinned);
                    container.image = pinned;
                } else {
                    debug!("Leaving image {} as is", container.image);
                }
                task.placement = Some(update_service_platforms(task.placement.take(), &inspect));
                None
            }
            Err(e) => {
                warn!("Unable to resolve image {} on its registry: {}", container.image, e);
                Some(digest_warning(&container.image))
            }
        }
    }
}

impl Client {
    /// Create a service, letting the daemon resolve the image
    pub async fn service_create(
        &self,
        spec: ServiceSpec,
        options: &ServiceCreateOptions,
    ) -> Result<ServiceCreateResponse, ServiceCreateError> {
        ServiceSubmitter::new(self).submit(spec, options).await
    }
}

/// Pin `image` to `digest`.
///
/// Returns `None` when the image cannot be parsed, already carries a digest,
/// does not name a repository, or when `digest` is not a valid digest.
pub fn image_with_digest(image: &str, digest: &str) -> Option<String> {
    let reference = Reference::parse(image).ok()?;
    let pinned = reference.with_digest(digest).ok()??;
    Some(pinned.to_string())
}

/// Warning for an image that could not be pinned by digest
pub fn digest_warning(image: &str) -> String {
    format!(
        "image {} could not be accessed on a registry to record\n\
         its digest. Each node will access {} independently,\n\
         possibly leading to different nodes running different\n\
         versions of the image.\n",
        image, image
    )
}

/// Fill in a container spec where the runtime implies one, and reject task
/// templates whose runtime and spec disagree.
fn prepare_service_spec(spec: &mut ServiceSpec) -> Result<(), ClientError> {
    let task = &mut spec.task_template;
    let container_runtime = task.runtime.is_empty() || task.runtime == runtime::CONTAINER;

    if task.container_spec.is_none() && task.plugin_spec.is_none() && container_runtime {
        task.container_spec = Some(ContainerSpec::default());
    }

    if task.container_spec.is_some() && task.plugin_spec.is_some() {
        return Err(ClientError::InvalidSpec(
            "must not specify both a container spec and a plugin spec in the task template"
                .to_string(),
        ));
    }
    if task.plugin_spec.is_some() && task.runtime != runtime::PLUGIN {
        return Err(ClientError::InvalidSpec(
            "mismatched runtime with plugin spec".to_string(),
        ));
    }
    if task.container_spec.is_some() && !container_runtime {
        return Err(ClientError::InvalidSpec(
            "mismatched runtime with container spec".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{Descriptor, DistributionInspect, Platform as ImagePlatform};
    use crate::swarm::{Placement, Platform};
    use crate::transport::{ApiRequest, RawResponse, Transport};
    use async_trait::async_trait;
    use hyper::StatusCode;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    fn test_digest(seed: &str) -> String {
        format!("sha256:{}", sha256::digest(seed))
    }

    enum Reply {
        Respond(StatusCode, &'static str),
        Refuse,
    }

    struct FakeTransport {
        reply: Reply,
        requests: Mutex<Vec<ApiRequest>>,
    }

    impl FakeTransport {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<ApiRequest> {
            self.requests.lock().unwrap().clone()
        }

        fn sent_spec(&self) -> Value {
            let requests = self.requests();
            let body = requests.last().unwrap().body.clone().unwrap();
            serde_json::from_slice(&body).unwrap()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(&self, request: ApiRequest) -> crate::error::Result<RawResponse> {
            self.requests.lock().unwrap().push(request);
            match &self.reply {
                Reply::Respond(status, body) => Ok(RawResponse::new(*status, *body)),
                Reply::Refuse => Err(ClientError::Connect(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "connection refused",
                ))),
            }
        }
    }

    struct FakeInspector {
        result: Option<DistributionInspect>,
        calls: Mutex<Vec<(String, Option<String>)>>,
    }

    impl FakeInspector {
        fn resolving(digest: &str, platforms: &[(&str, &str)]) -> Self {
            Self {
                result: Some(DistributionInspect {
                    descriptor: Descriptor {
                        media_type: "application/vnd.oci.image.index.v1+json".to_string(),
                        digest: digest.to_string(),
                        size: 1862,
                        urls: Vec::new(),
                    },
                    platforms: platforms
                        .iter()
                        .map(|(os, arch)| ImagePlatform {
                            os: os.to_string(),
                            architecture: arch.to_string(),
                            ..Default::default()
                        })
                        .collect(),
                }),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn unreachable() -> Self {
            Self {
                result: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, Option<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DistributionInspector for FakeInspector {
        async fn inspect(
            &self,
            image: &str,
            encoded_auth: Option<&str>,
        ) -> crate::error::Result<DistributionInspect> {
            self.calls
                .lock()
                .unwrap()
                .push((image.to_string(), encoded_auth.map(str::to_string)));
            self.result.clone().ok_or_else(|| ClientError::Api {
                status: 401,
                message: "unauthorized: authentication required".to_string(),
            })
        }
    }

    fn spec_for(image: &str) -> ServiceSpec {
        ServiceSpec {
            name: "web".to_string(),
            task_template: TaskSpec {
                container_spec: Some(ContainerSpec {
                    image: image.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn resolving_options() -> ServiceCreateOptions {
        ServiceCreateOptions {
            encoded_registry_auth: Some("eyJ1c2VybmFtZSI6InUifQ==".to_string()),
            query_registry: true,
        }
    }

    const CREATED: &str = r#"{"ID": "ak7w3gjqoa3kuz8xcpnyy0pvl", "Warnings": null}"#;

    #[test]
    fn test_image_with_digest_leaves_canonical_reference() {
        let image = format!("nginx:1.25@{}", test_digest("pinned"));
        assert_eq!(image_with_digest(&image, &test_digest("other")), None);
        assert_eq!(image_with_digest(&image, &test_digest("pinned")), None);
    }

    #[test]
    fn test_image_with_digest_pins_tagged_reference() {
        let digest = test_digest("nginx");
        let pinned = image_with_digest("nginx:1.25", &digest).unwrap();
        assert_eq!(pinned, format!("docker.io/library/nginx:1.25@{}", digest));

        let pinned = image_with_digest("ghcr.io/org/app", &digest).unwrap();
        assert_eq!(pinned, format!("ghcr.io/org/app@{}", digest));
    }

    #[test]
    fn test_image_with_digest_rejects_bad_input() {
        let digest = test_digest("nginx");
        assert_eq!(image_with_digest("Not Valid", &digest), None);
        assert_eq!(image_with_digest("nginx:1.25", "sha256:short"), None);
        assert_eq!(image_with_digest(&sha256::digest("image-id"), &digest), None);
    }

    #[test]
    fn test_digest_warning_names_image() {
        let warning = digest_warning("registry.internal/app:2");
        assert!(warning.starts_with("image registry.internal/app:2 could not be accessed"));
        assert!(warning.contains("Each node will access registry.internal/app:2 independently"));
        assert!(warning.ends_with("versions of the image.\n"));
    }

    #[tokio::test]
    async fn test_submit_pins_image_and_merges_platforms() {
        let digest = test_digest("nginx-index");
        let transport = FakeTransport::new(Reply::Respond(StatusCode::CREATED, CREATED));
        let client = Client::new(transport.clone());
        let inspector = FakeInspector::resolving(&digest, &[("linux", "amd64"), ("linux", "arm64")]);

        let mut spec = spec_for("nginx:1.25");
        spec.task_template.placement = Some(Placement {
            platforms: vec![Platform {
                architecture: "s390x".to_string(),
                os: "linux".to_string(),
            }],
            ..Default::default()
        });

        let response = ServiceSubmitter::new(&client)
            .with_inspector(&inspector)
            .submit(spec, &resolving_options())
            .await
            .unwrap();

        assert_eq!(response.id, "ak7w3gjqoa3kuz8xcpnyy0pvl");
        assert!(response.warnings.is_empty());
        assert_eq!(
            inspector.calls(),
            vec![(
                "nginx:1.25".to_string(),
                Some("eyJ1c2VybmFtZSI6InUifQ==".to_string())
            )]
        );

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/v1.41/services/create");
        assert_eq!(requests[0].header("X-Registry-Auth"), Some("eyJ1c2VybmFtZSI6InUifQ=="));
        assert_eq!(requests[0].header("version"), Some("1.41"));
        assert_eq!(requests[0].header("content-type"), Some("application/json"));

        let sent = transport.sent_spec();
        assert_eq!(
            sent["TaskTemplate"]["ContainerSpec"]["Image"],
            json!(format!("docker.io/library/nginx:1.25@{}", digest))
        );
        assert_eq!(
            sent["TaskTemplate"]["Placement"]["Platforms"],
            json!([
                {"Architecture": "s390x", "OS": "linux"},
                {"Architecture": "amd64", "OS": "linux"},
                {"Architecture": "arm64", "OS": "linux"}
            ])
        );
    }

    #[tokio::test]
    async fn test_submit_keeps_canonical_image_but_merges_platforms() {
        let image = format!("nginx@{}", test_digest("pinned"));
        let transport = FakeTransport::new(Reply::Respond(StatusCode::CREATED, CREATED));
        let client = Client::new(transport.clone());
        let inspector = FakeInspector::resolving(&test_digest("latest"), &[("linux", "amd64")]);

        ServiceSubmitter::new(&client)
            .with_inspector(&inspector)
            .submit(spec_for(&image), &resolving_options())
            .await
            .unwrap();

        let sent = transport.sent_spec();
        assert_eq!(sent["TaskTemplate"]["ContainerSpec"]["Image"], json!(image));
        assert_eq!(
            sent["TaskTemplate"]["Placement"]["Platforms"],
            json!([{"Architecture": "amd64", "OS": "linux"}])
        );
    }

    #[tokio::test]
    async fn test_submit_warns_when_registry_lookup_fails() {
        let transport = FakeTransport::new(Reply::Respond(StatusCode::CREATED, CREATED));
        let client = Client::new(transport.clone());
        let inspector = FakeInspector::unreachable();

        let response = ServiceSubmitter::new(&client)
            .with_inspector(&inspector)
            .submit(spec_for("private.example.com/app:3"), &resolving_options())
            .await
            .unwrap();

        assert_eq!(response.id, "ak7w3gjqoa3kuz8xcpnyy0pvl");
        assert_eq!(response.warnings.len(), 1);
        assert!(response.warnings[0].contains("private.example.com/app:3"));

        let sent = transport.sent_spec();
        assert_eq!(
            sent["TaskTemplate"]["ContainerSpec"]["Image"],
            json!("private.example.com/app:3")
        );
        assert!(sent["TaskTemplate"].get("Placement").is_none());
    }

    #[tokio::test]
    async fn test_submit_transport_failure_returns_zero_response() {
        let transport = FakeTransport::new(Reply::Refuse);
        let client = Client::new(transport.clone());
        let inspector = FakeInspector::unreachable();

        let err = ServiceSubmitter::new(&client)
            .with_inspector(&inspector)
            .submit(spec_for("nginx"), &resolving_options())
            .await
            .unwrap_err();

        assert!(matches!(err.source, ClientError::Connect(_)));
        assert_eq!(err.response, ServiceCreateResponse::default());
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_daemon_error_is_fatal() {
        let transport = FakeTransport::new(Reply::Respond(
            StatusCode::SERVICE_UNAVAILABLE,
            r#"{"message": "This node is not a swarm manager."}"#,
        ));
        let client = Client::new(transport.clone());

        let err = client
            .service_create(spec_for("nginx"), &ServiceCreateOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.source.status(), Some(503));
        assert!(err.to_string().contains("This node is not a swarm manager."));
        assert_eq!(err.response, ServiceCreateResponse::default());
    }

    #[tokio::test]
    async fn test_submit_decode_failure_after_successful_lookup() {
        let transport = FakeTransport::new(Reply::Respond(StatusCode::CREATED, "not json"));
        let client = Client::new(transport.clone());
        let inspector = FakeInspector::resolving(&test_digest("nginx"), &[]);

        let err = ServiceSubmitter::new(&client)
            .with_inspector(&inspector)
            .submit(spec_for("nginx"), &resolving_options())
            .await
            .unwrap_err();

        assert!(err.source.is_decode());
        assert!(err.response.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_submit_decode_failure_keeps_lookup_warning() {
        let transport = FakeTransport::new(Reply::Respond(StatusCode::CREATED, ""));
        let client = Client::new(transport.clone());
        let inspector = FakeInspector::unreachable();

        let err = ServiceSubmitter::new(&client)
            .with_inspector(&inspector)
            .submit(spec_for("nginx"), &resolving_options())
            .await
            .unwrap_err();

        assert!(err.source.is_decode());
        assert_eq!(err.response.warnings, vec![digest_warning("nginx")]);
    }

    #[tokio::test]
    async fn test_submit_without_registry_query() {
        let transport = FakeTransport::new(Reply::Respond(StatusCode::CREATED, CREATED));
        let client = Client::new(transport.clone());
        let inspector = FakeInspector::unreachable();

        let response = ServiceSubmitter::new(&client)
            .with_inspector(&inspector)
            .submit(spec_for("nginx"), &ServiceCreateOptions::default())
            .await
            .unwrap();

        assert!(response.warnings.is_empty());
        assert!(inspector.calls().is_empty());
        assert!(transport.requests()[0].header("X-Registry-Auth").is_none());
        assert_eq!(
            transport.sent_spec()["TaskTemplate"]["ContainerSpec"]["Image"],
            json!("nginx")
        );
    }

    #[tokio::test]
    async fn test_submit_uses_daemon_for_inspection_by_default() {
        let transport = FakeTransport::new(Reply::Respond(StatusCode::CREATED, CREATED));
        let client = Client::new(transport.clone()).with_version("v1.43");

        // The fake answers the distribution request with a create response,
        // which lacks a descriptor, so the lookup fails and a warning is added.
        let response = client
            .service_create(spec_for("nginx:1.25"), &resolving_options())
            .await
            .unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, hyper::Method::GET);
        assert_eq!(requests[0].path, "/v1.43/distribution/nginx:1.25/json");
        assert_eq!(requests[0].header("X-Registry-Auth"), Some("eyJ1c2VybmFtZSI6InUifQ=="));
        assert_eq!(requests[1].path, "/v1.43/services/create");
        assert_eq!(response.warnings, vec![digest_warning("nginx:1.25")]);
    }

    #[tokio::test]
    async fn test_submit_looks_up_empty_image() {
        let transport = FakeTransport::new(Reply::Respond(StatusCode::CREATED, CREATED));
        let client = Client::new(transport.clone());
        let inspector = FakeInspector::unreachable();

        let response = ServiceSubmitter::new(&client)
            .with_inspector(&inspector)
            .submit(ServiceSpec::default(), &resolving_options())
            .await
            .unwrap();

        assert_eq!(
            inspector.calls(),
            vec![(String::new(), Some("eyJ1c2VybmFtZSI6InUifQ==".to_string()))]
        );
        assert_eq!(response.warnings, vec![digest_warning("")]);
        assert_eq!(transport.sent_spec()["TaskTemplate"]["ContainerSpec"], json!({}));
    }

    #[tokio::test]
    async fn test_submit_plugin_task_skips_lookup() {
        let transport = FakeTransport::new(Reply::Respond(StatusCode::CREATED, CREATED));
        let client = Client::new(transport.clone());
        let inspector = FakeInspector::unreachable();

        let mut spec = ServiceSpec::default();
        spec.task_template.runtime = runtime::PLUGIN.to_string();
        spec.task_template.plugin_spec = Some(json!({"Name": "vieux/sshfs"}));

        let response = ServiceSubmitter::new(&client)
            .with_inspector(&inspector)
            .submit(spec, &resolving_options())
            .await
            .unwrap();

        assert!(inspector.calls().is_empty());
        assert!(response.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_submit_rejects_container_and_plugin_spec() {
        let transport = FakeTransport::new(Reply::Respond(StatusCode::CREATED, CREATED));
        let client = Client::new(transport.clone());

        let mut spec = spec_for("nginx");
        spec.task_template.plugin_spec = Some(json!({"Name": "vieux/sshfs"}));

        let err = client
            .service_create(spec, &resolving_options())
            .await
            .unwrap_err();

        assert!(matches!(err.source, ClientError::InvalidSpec(_)));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_prepare_service_spec_runtimes() {
        let mut plugin = ServiceSpec::default();
        plugin.task_template.runtime = runtime::PLUGIN.to_string();
        plugin.task_template.plugin_spec = Some(json!({"Name": "vieux/sshfs"}));
        assert!(prepare_service_spec(&mut plugin).is_ok());
        assert!(plugin.task_template.container_spec.is_none());

        let mut mismatched = ServiceSpec::default();
        mismatched.task_template.plugin_spec = Some(json!({}));
        assert!(prepare_service_spec(&mut mismatched).is_err());

        let mut wrong_runtime = spec_for("nginx");
        wrong_runtime.task_template.runtime = runtime::PLUGIN.to_string();
        assert!(prepare_service_spec(&mut wrong_runtime).is_err());

        let mut attachment = ServiceSpec::default();
        attachment.task_template.runtime = "attachment".to_string();
        assert!(prepare_service_spec(&mut attachment).is_ok());
        assert!(attachment.task_template.container_spec.is_none());
    }
}
