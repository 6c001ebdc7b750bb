/// Engine API constants
pub mod api {
    /// API version used when neither the config nor the environment sets one
    pub const DEFAULT_VERSION: &str = "1.41";

    /// Daemon socket used when no host is configured
    pub const DEFAULT_HOST: &str = "unix:///var/run/docker.sock";

    /// Header carrying the client's API version
    pub const VERSION_HEADER: &str = "version";

    /// Header carrying base64url-encoded registry credentials
    pub const REGISTRY_AUTH_HEADER: &str = "X-Registry-Auth";

    /// Host header sent over unix sockets, where there is no real authority
    pub const SOCKET_AUTHORITY: &str = "docker";
}

/// Registry naming constants
pub mod registry {
    /// Domain assumed for references without one
    pub const DEFAULT_DOMAIN: &str = "docker.io";

    /// Key Docker uses for Docker Hub credentials in config.json
    pub const INDEX_SERVER: &str = "https://index.docker.io/v1/";
}

/// Manifest media types
pub mod media_type {
    pub const OCI_IMAGE_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
    pub const OCI_IMAGE_INDEX: &str = "application/vnd.oci.image.index.v1+json";
    pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
    pub const DOCKER_MANIFEST_LIST: &str =
        "application/vnd.docker.distribution.manifest.list.v2+json";

    /// Manifest kinds accepted when inspecting an image on its registry
    pub const ACCEPTED_MANIFESTS: &[&str] = &[
        OCI_IMAGE_INDEX,
        DOCKER_MANIFEST_LIST,
        OCI_IMAGE_MANIFEST,
        DOCKER_MANIFEST,
    ];
}

/// Task runtimes
pub mod runtime {
    pub const CONTAINER: &str = "container";
    pub const PLUGIN: &str = "plugin";
}
